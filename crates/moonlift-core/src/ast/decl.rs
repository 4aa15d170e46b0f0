//! Package-level declarations.

use crate::ast::expr::{Expr, Ident};
use crate::ast::stmt::Block;
use crate::ids::NodeId;
use crate::span::Span;

/// A top-level declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decl<'ast> {
    Func(&'ast FuncDecl<'ast>),
    Type(&'ast TypeDecl<'ast>),
    Var(&'ast ValueDecl<'ast>),
    Const(&'ast ValueDecl<'ast>),
}

impl Decl<'_> {
    pub fn span(&self) -> Span {
        match self {
            Decl::Func(d) => d.span,
            Decl::Type(d) => d.span,
            Decl::Var(d) | Decl::Const(d) => d.span,
        }
    }
}

/// A function or method declaration.
///
/// The signature (receiver, parameters, results) is the type of the object
/// defined by `name`. `body` is `None` for natively implemented functions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuncDecl<'ast> {
    pub id: NodeId,
    pub name: Ident<'ast>,
    pub body: Option<Block<'ast>>,
    pub span: Span,
}

/// `type Name ...`; the type is carried by the defined type name object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeDecl<'ast> {
    pub id: NodeId,
    pub name: Ident<'ast>,
    pub span: Span,
}

/// `var`/`const` specs at package level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueDecl<'ast> {
    pub id: NodeId,
    pub names: &'ast [Ident<'ast>],
    pub values: &'ast [Expr<'ast>],
    pub span: Span,
}

/// `import alias "path"`. The package name object is the oracle definition
/// of `id`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportDecl<'ast> {
    pub id: NodeId,
    pub alias: Option<Ident<'ast>>,
    pub path: &'ast str,
    pub span: Span,
}

/// One package: the unit of translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Package<'ast> {
    pub path: &'ast str,
    pub name: &'ast str,
    pub imports: &'ast [ImportDecl<'ast>],
    pub decls: &'ast [Decl<'ast>],
}
