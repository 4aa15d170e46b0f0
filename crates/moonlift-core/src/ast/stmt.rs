//! Statement nodes.

use crate::ast::expr::{CallExpr, Expr, Ident};
use crate::ast::ops::{AssignOp, BranchKind, IncDecOp};
use crate::ids::NodeId;
use crate::span::Span;

/// A statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stmt<'ast> {
    Expr(&'ast ExprStmt<'ast>),
    Assign(&'ast AssignStmt<'ast>),
    IncDec(&'ast IncDecStmt<'ast>),
    VarDecl(&'ast VarDeclStmt<'ast>),
    Return(&'ast ReturnStmt<'ast>),
    Block(&'ast Block<'ast>),
    If(&'ast IfStmt<'ast>),
    For(&'ast ForStmt<'ast>),
    Range(&'ast RangeStmt<'ast>),
    Switch(&'ast SwitchStmt<'ast>),
    Labeled(&'ast LabeledStmt<'ast>),
    Branch(&'ast BranchStmt<'ast>),
    Defer(&'ast DeferStmt<'ast>),
    Go(&'ast GoStmt<'ast>),
    Send(&'ast SendStmt<'ast>),
    Select(&'ast SelectStmt<'ast>),
    Empty(&'ast EmptyStmt),
}

impl Stmt<'_> {
    pub fn id(&self) -> NodeId {
        match self {
            Stmt::Expr(s) => s.id,
            Stmt::Assign(s) => s.id,
            Stmt::IncDec(s) => s.id,
            Stmt::VarDecl(s) => s.id,
            Stmt::Return(s) => s.id,
            Stmt::Block(s) => s.id,
            Stmt::If(s) => s.id,
            Stmt::For(s) => s.id,
            Stmt::Range(s) => s.id,
            Stmt::Switch(s) => s.id,
            Stmt::Labeled(s) => s.id,
            Stmt::Branch(s) => s.id,
            Stmt::Defer(s) => s.id,
            Stmt::Go(s) => s.id,
            Stmt::Send(s) => s.id,
            Stmt::Select(s) => s.id,
            Stmt::Empty(s) => s.id,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Stmt::Expr(s) => s.span,
            Stmt::Assign(s) => s.span,
            Stmt::IncDec(s) => s.span,
            Stmt::VarDecl(s) => s.span,
            Stmt::Return(s) => s.span,
            Stmt::Block(s) => s.span,
            Stmt::If(s) => s.span,
            Stmt::For(s) => s.span,
            Stmt::Range(s) => s.span,
            Stmt::Switch(s) => s.span,
            Stmt::Labeled(s) => s.span,
            Stmt::Branch(s) => s.span,
            Stmt::Defer(s) => s.span,
            Stmt::Go(s) => s.span,
            Stmt::Send(s) => s.span,
            Stmt::Select(s) => s.span,
            Stmt::Empty(s) => s.span,
        }
    }
}

/// A brace-delimited statement list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block<'ast> {
    pub id: NodeId,
    pub stmts: &'ast [Stmt<'ast>],
    pub span: Span,
}

impl Block<'_> {
    /// Whether control cannot fall off the end of this block.
    pub fn ends_in_return(&self) -> bool {
        matches!(self.stmts.last(), Some(Stmt::Return(_)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExprStmt<'ast> {
    pub id: NodeId,
    pub expr: Expr<'ast>,
    pub span: Span,
}

/// `lhs op rhs` for `=`, `:=` and compound assignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignStmt<'ast> {
    pub id: NodeId,
    pub lhs: &'ast [Expr<'ast>],
    pub op: AssignOp,
    pub rhs: &'ast [Expr<'ast>],
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IncDecStmt<'ast> {
    pub id: NodeId,
    pub x: Expr<'ast>,
    pub op: IncDecOp,
    pub span: Span,
}

/// `var a, b T = x, y` (also local `const`). Types come from the defined
/// objects of `names`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarDeclStmt<'ast> {
    pub id: NodeId,
    pub names: &'ast [Ident<'ast>],
    pub values: &'ast [Expr<'ast>],
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnStmt<'ast> {
    pub id: NodeId,
    pub results: &'ast [Expr<'ast>],
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IfStmt<'ast> {
    pub id: NodeId,
    pub init: Option<Stmt<'ast>>,
    pub cond: Expr<'ast>,
    pub then: Block<'ast>,
    /// Either another `if` or a block.
    pub else_: Option<Stmt<'ast>>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForStmt<'ast> {
    pub id: NodeId,
    pub init: Option<Stmt<'ast>>,
    pub cond: Option<Expr<'ast>>,
    pub post: Option<Stmt<'ast>>,
    pub body: Block<'ast>,
    pub span: Span,
}

/// `for k, v := range x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeStmt<'ast> {
    pub id: NodeId,
    pub key: Option<Expr<'ast>>,
    pub value: Option<Expr<'ast>>,
    /// `:=` rather than `=`.
    pub define: bool,
    pub x: Expr<'ast>,
    pub body: Block<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchStmt<'ast> {
    pub id: NodeId,
    pub init: Option<Stmt<'ast>>,
    pub tag: Option<Expr<'ast>>,
    pub clauses: &'ast [CaseClause<'ast>],
    pub span: Span,
}

/// One `case`; `exprs` is `None` for `default`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaseClause<'ast> {
    pub id: NodeId,
    pub exprs: Option<&'ast [Expr<'ast>]>,
    pub body: &'ast [Stmt<'ast>],
    pub span: Span,
}

impl CaseClause<'_> {
    pub fn is_default(&self) -> bool {
        self.exprs.is_none()
    }

    /// Whether the clause ends with `fallthrough`.
    pub fn falls_through(&self) -> bool {
        matches!(
            self.body.last(),
            Some(Stmt::Branch(b)) if b.kind == BranchKind::Fallthrough
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledStmt<'ast> {
    pub id: NodeId,
    pub label: Ident<'ast>,
    pub stmt: Stmt<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchStmt<'ast> {
    pub id: NodeId,
    pub kind: BranchKind,
    pub label: Option<Ident<'ast>>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeferStmt<'ast> {
    pub id: NodeId,
    pub call: &'ast CallExpr<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoStmt<'ast> {
    pub id: NodeId,
    pub call: &'ast CallExpr<'ast>,
    pub span: Span,
}

/// `ch <- value`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendStmt<'ast> {
    pub id: NodeId,
    pub ch: Expr<'ast>,
    pub value: Expr<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectStmt<'ast> {
    pub id: NodeId,
    pub clauses: &'ast [CommClause<'ast>],
    pub span: Span,
}

impl SelectStmt<'_> {
    pub fn has_default(&self) -> bool {
        self.clauses.iter().any(|c| c.comm.is_none())
    }
}

/// One select arm. `comm` is a send, a receive expression statement, or an
/// assignment/definition from a receive; `None` for `default`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommClause<'ast> {
    pub id: NodeId,
    pub comm: Option<Stmt<'ast>>,
    pub body: &'ast [Stmt<'ast>],
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EmptyStmt {
    pub id: NodeId,
    pub span: Span,
}
