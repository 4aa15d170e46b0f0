//! Expression nodes.
//!
//! Every node carries the [`NodeId`] the oracle keys its facts by. Types of
//! expressions, and the objects identifiers resolve to, are not stored here:
//! they live in [`SemanticInfo`](crate::SemanticInfo).

use ordered_float::OrderedFloat;

use crate::ast::ops::{BinaryOp, UnaryOp};
use crate::ast::stmt::Block;
use crate::ids::NodeId;
use crate::span::Span;

/// An identifier occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ident<'ast> {
    pub id: NodeId,
    pub name: &'ast str,
    pub span: Span,
}

impl Ident<'_> {
    pub fn is_blank(&self) -> bool {
        self.name == "_"
    }
}

/// An expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expr<'ast> {
    Ident(Ident<'ast>),
    Lit(&'ast LitExpr<'ast>),
    Binary(&'ast BinaryExpr<'ast>),
    Unary(&'ast UnaryExpr<'ast>),
    Call(&'ast CallExpr<'ast>),
    Selector(&'ast SelectorExpr<'ast>),
    Index(&'ast IndexExpr<'ast>),
    Paren(&'ast ParenExpr<'ast>),
    FuncLit(&'ast FuncLit<'ast>),
    Composite(&'ast CompositeLit<'ast>),
    TypeAssert(&'ast TypeAssertExpr<'ast>),
    /// A type used in expression position (conversion callee, `make` and
    /// `new` arguments). Its meaning comes from the oracle's type map.
    Type(&'ast TypeExpr),
}

impl<'ast> Expr<'ast> {
    pub fn id(&self) -> NodeId {
        match self {
            Expr::Ident(e) => e.id,
            Expr::Lit(e) => e.id,
            Expr::Binary(e) => e.id,
            Expr::Unary(e) => e.id,
            Expr::Call(e) => e.id,
            Expr::Selector(e) => e.id,
            Expr::Index(e) => e.id,
            Expr::Paren(e) => e.id,
            Expr::FuncLit(e) => e.id,
            Expr::Composite(e) => e.id,
            Expr::TypeAssert(e) => e.id,
            Expr::Type(e) => e.id,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Expr::Ident(e) => e.span,
            Expr::Lit(e) => e.span,
            Expr::Binary(e) => e.span,
            Expr::Unary(e) => e.span,
            Expr::Call(e) => e.span,
            Expr::Selector(e) => e.span,
            Expr::Index(e) => e.span,
            Expr::Paren(e) => e.span,
            Expr::FuncLit(e) => e.span,
            Expr::Composite(e) => e.span,
            Expr::TypeAssert(e) => e.span,
            Expr::Type(e) => e.span,
        }
    }

    /// Strip any number of parentheses.
    pub fn unparen(self) -> Expr<'ast> {
        let mut expr = self;
        while let Expr::Paren(p) = expr {
            expr = p.inner;
        }
        expr
    }

    /// The identifier, if this is a plain `_`.
    pub fn is_blank(&self) -> bool {
        matches!(self, Expr::Ident(ident) if ident.is_blank())
    }
}

/// A literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LitExpr<'ast> {
    pub id: NodeId,
    pub kind: LitKind<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LitKind<'ast> {
    Int(i64),
    Float(OrderedFloat<f64>),
    /// Decoded string contents.
    String(&'ast str),
    Char(char),
    Bool(bool),
    Nil,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryExpr<'ast> {
    pub id: NodeId,
    pub op: BinaryOp,
    pub left: Expr<'ast>,
    pub right: Expr<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnaryExpr<'ast> {
    pub id: NodeId,
    pub op: UnaryOp,
    pub operand: Expr<'ast>,
    pub span: Span,
}

/// A call, conversion, or builtin application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallExpr<'ast> {
    pub id: NodeId,
    pub func: Expr<'ast>,
    pub args: &'ast [Expr<'ast>],
    /// `f(xs...)`
    pub ellipsis: bool,
    pub span: Span,
}

/// `x.sel`: a field, method, or package-qualified name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectorExpr<'ast> {
    pub id: NodeId,
    pub x: Expr<'ast>,
    pub sel: Ident<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexExpr<'ast> {
    pub id: NodeId,
    pub x: Expr<'ast>,
    pub index: Expr<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParenExpr<'ast> {
    pub id: NodeId,
    pub inner: Expr<'ast>,
    pub span: Span,
}

/// A function literal. Its signature is the oracle type of the node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuncLit<'ast> {
    pub id: NodeId,
    pub body: Block<'ast>,
    pub span: Span,
}

/// One element of a composite literal, optionally keyed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeElem<'ast> {
    pub key: Option<Expr<'ast>>,
    pub value: Expr<'ast>,
}

/// A composite literal. Its type is the oracle type of the node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeLit<'ast> {
    pub id: NodeId,
    pub elems: &'ast [CompositeElem<'ast>],
    pub span: Span,
}

/// `x.(T)`; `ty` is `None` for the `x.(type)` form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeAssertExpr<'ast> {
    pub id: NodeId,
    pub x: Expr<'ast>,
    pub ty: Option<&'ast TypeExpr>,
    pub span: Span,
}

/// An opaque type expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeExpr {
    pub id: NodeId,
    pub span: Span,
}
