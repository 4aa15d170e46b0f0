//! Expression lowering.
//!
//! Every expression becomes one Lua expression string. Expressions that
//! need statements first (a suspension, a short-circuit around a blocking
//! operand, a spilled argument) emit them into the current case before
//! returning the text that reads the result.
//!
//! Value representation:
//! - escaping locals are one-slot cells `{v}` read as `x[1]`
//! - structs and arrays are tables; a pointer to one is the table itself
//! - other pointers are `__rt.ptr` objects with `get`/`set`
//! - slices, arrays and maps are runtime objects indexed with `get`/`set`

mod binary;
mod calls;
mod composite;
mod func_lit;
mod selector;

pub use selector::find_selection;

use moonlift_core::ast::{Expr, Ident, LitExpr, LitKind, UnaryOp};
use moonlift_core::{BasicKind, CompilationError, ObjectKind, Result, Type, TypeId};

use crate::emit::{prefix, quote};
use crate::function::FunctionTranslator;
use crate::options::CompilerOptions;

/// An assignable location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LValue {
    /// A name, cell slot or field.
    Place(String),
    /// A local declared here that lives in a fresh cell.
    Fresh(String),
    /// Element of a slice, array or map.
    Element { container: String, index: String },
    /// Target of a pointer object.
    Pointee(String),
    /// A struct or array behind a pointer: stores copy in place.
    Table(String),
    /// The blank identifier; values land in a scratch local.
    Blank(String),
}

impl LValue {
    /// Expression reading the location.
    pub(crate) fn get(&self) -> String {
        match self {
            LValue::Place(p) | LValue::Blank(p) | LValue::Table(p) => p.clone(),
            LValue::Fresh(name) => format!("{name}[1]"),
            LValue::Element { container, index } => format!("{container}:get({index})"),
            LValue::Pointee(ptr) => format!("{ptr}:get()"),
        }
    }

    /// Statement storing `value`.
    pub(crate) fn set(&self, value: &str, options: &CompilerOptions) -> String {
        match self {
            LValue::Place(p) | LValue::Blank(p) => format!("{p} = {value}"),
            LValue::Fresh(name) => format!("{name} = {{{value}}}"),
            LValue::Element { container, index } => format!("{container}:set({index}, {value})"),
            LValue::Pointee(ptr) => format!("{ptr}:set({value})"),
            LValue::Table(table) => format!("{}({table}, {value})", options.rt("store")),
        }
    }

    /// Whether a multiple assignment can target this directly.
    pub(crate) fn is_name(&self) -> bool {
        matches!(self, LValue::Place(_) | LValue::Blank(_))
    }
}

impl<'a, 'ctx, 'p> FunctionTranslator<'a, 'ctx, 'p> {
    /// Translate an expression.
    pub(crate) fn expr<'ast>(&mut self, expr: Expr<'ast>) -> Result<String> {
        match expr {
            Expr::Ident(ident) => self.ident(&ident),
            Expr::Lit(lit) => Ok(literal(lit)),
            Expr::Binary(e) => self.binary(e),
            Expr::Unary(e) => self.unary(e),
            Expr::Call(e) => self.call(e),
            Expr::Selector(e) => self.selector(e),
            Expr::Index(e) => self.index(e),
            Expr::Paren(e) => self.expr(e.inner),
            Expr::FuncLit(e) => self.func_lit(e),
            Expr::Composite(e) => self.composite(e),
            Expr::TypeAssert(e) => self.type_assert(e),
            Expr::Type(t) => {
                let ty = self.pkg.info.type_of(t.id, t.span)?;
                self.pkg.type_desc(ty)
            }
        }
    }

    /// Translate `expr` for a destination of type `target`.
    pub(crate) fn value<'ast>(&mut self, expr: Expr<'ast>, target: TypeId) -> Result<String> {
        let text = self.expr(expr)?;
        let source = self.type_of(&expr)?;
        self.coerce(expr, text, source, target)
    }

    /// Apply assignment semantics: copy struct and array values that are
    /// read from storage, and box values that carry methods when they flow
    /// into an interface.
    pub(crate) fn coerce<'ast>(
        &mut self,
        expr: Expr<'ast>,
        text: String,
        source: TypeId,
        target: TypeId,
    ) -> Result<String> {
        let types = &self.pkg.info.types;
        let copied = if (types.is_struct(source) || types.is_array(source)) && is_addressable(expr) {
            format!("{}({text})", self.rt("clone"))
        } else {
            text
        };
        if types.is_interface(target)
            && !types.is_interface(source)
            && types.basic_kind(source) != Some(BasicKind::UntypedNil)
            && types.is_wrapped(source)
        {
            let desc = self.pkg.type_desc(source)?;
            return Ok(format!("{}.new({copied})", prefix(&desc)));
        }
        Ok(copied)
    }

    fn ident(&mut self, ident: &Ident<'_>) -> Result<String> {
        if ident.is_blank() {
            return Err(CompilationError::unsupported("`_` used as a value", ident.span));
        }
        let info = self.pkg.info;
        let obj = info.object_of(ident)?;
        let object = info.object(obj);
        match object.kind {
            ObjectKind::Nil => Ok("nil".to_string()),
            ObjectKind::TypeName => {
                let ty = object.ty.ok_or_else(|| {
                    CompilationError::semantic_gap(format!("type of `{}`", object.name), ident.span)
                })?;
                self.pkg.type_desc(ty)
            }
            ObjectKind::Builtin => Err(CompilationError::unsupported(
                format!("builtin `{}` used as a value", object.name),
                ident.span,
            )),
            ObjectKind::PkgName | ObjectKind::Label => Err(CompilationError::unsupported(
                format!("`{}` used as a value", object.name),
                ident.span,
            )),
            ObjectKind::Var | ObjectKind::Const | ObjectKind::Func | ObjectKind::Field => {
                self.var_ref(obj)
            }
        }
    }

    fn unary<'ast>(&mut self, e: &moonlift_core::ast::UnaryExpr<'ast>) -> Result<String> {
        match e.op {
            UnaryOp::Recv => self.receive(e),
            UnaryOp::Addr => self.address_of(e.operand),
            UnaryOp::Deref => {
                let ptr = self.expr(e.operand)?;
                let ty = self.type_of(&e.operand)?;
                let types = &self.pkg.info.types;
                match types.pointer_elem(ty) {
                    Some(elem) if types.is_struct(elem) || types.is_array(elem) => Ok(ptr),
                    _ => Ok(format!("{}:get()", prefix(&ptr))),
                }
            }
            UnaryOp::Neg => Ok(format!("-{}", crate::emit::operand(&self.expr(e.operand)?))),
            UnaryOp::Plus => self.expr(e.operand),
            UnaryOp::Not => Ok(format!("not {}", crate::emit::operand(&self.expr(e.operand)?))),
            UnaryOp::BitNot => Ok(format!("{}({})", self.rt("bnot"), self.expr(e.operand)?)),
        }
    }

    /// `<-ch`: a suspension when the oracle flagged it, a direct runtime
    /// call otherwise.
    fn receive<'ast>(&mut self, e: &moonlift_core::ast::UnaryExpr<'ast>) -> Result<String> {
        let ch = self.expr(e.operand)?;
        let operation = format!("{}({ch})", self.rt("recv"));
        let comma_ok = matches!(
            self.pkg.info.types.get(self.type_of(&Expr::Unary(e))?),
            Type::Tuple(_)
        );
        if self.func.is_flattened() && self.func.facts.is_blocking(e.id) {
            let result = self.suspend(&operation)?;
            return Ok(if comma_ok {
                format!("{}({result}, 1, 2)", self.rt("unpack"))
            } else {
                format!("{result}[1]")
            });
        }
        Ok(if comma_ok {
            operation
        } else {
            format!("({operation})")
        })
    }

    /// `&x`.
    pub(crate) fn address_of<'ast>(&mut self, x: Expr<'ast>) -> Result<String> {
        let ty = self.type_of(&x)?;
        let types = &self.pkg.info.types;
        if types.is_struct(ty) || types.is_array(ty) {
            return self.expr(x);
        }
        let place = self.lvalue(x)?;
        self.pointer_to(&place, ty)
    }

    /// A pointer object over an assignable location holding a `ty`.
    pub(crate) fn pointer_to(&mut self, place: &LValue, ty: TypeId) -> Result<String> {
        let desc = self.pkg.type_desc(ty)?;
        Ok(format!(
            "{}(function() return {} end, function(__v) {} end, {desc})",
            self.rt("ptr"),
            place.get(),
            place.set("__v", self.pkg.options)
        ))
    }

    /// Translate an assignment target.
    pub(crate) fn lvalue<'ast>(&mut self, expr: Expr<'ast>) -> Result<LValue> {
        match expr {
            Expr::Ident(ident) if ident.is_blank() => Ok(LValue::Blank(self.tmp("blank"))),
            Expr::Ident(_) | Expr::Selector(_) => Ok(LValue::Place(self.expr(expr)?)),
            Expr::Paren(p) => self.lvalue(p.inner),
            Expr::Index(e) => {
                let x_ty = self.type_of(&e.x)?;
                if self.pkg.info.types.basic_kind(x_ty) == Some(BasicKind::String) {
                    return Err(CompilationError::unsupported(
                        "assignment to a string byte",
                        e.span,
                    ));
                }
                let container = self.expr(e.x)?;
                let container = self.spill(container, &[e.index]);
                let index = self.expr(e.index)?;
                Ok(LValue::Element {
                    container: prefix(&container),
                    index,
                })
            }
            Expr::Unary(u) if u.op == UnaryOp::Deref => {
                let ptr = self.expr(u.operand)?;
                let ty = self.type_of(&u.operand)?;
                let types = &self.pkg.info.types;
                Ok(match types.pointer_elem(ty) {
                    Some(elem) if types.is_struct(elem) || types.is_array(elem) => {
                        LValue::Table(ptr)
                    }
                    _ => LValue::Pointee(prefix(&ptr)),
                })
            }
            other => Err(CompilationError::unsupported(
                "assignment to a non-addressable expression",
                other.span(),
            )),
        }
    }

    /// The assignment target for a variable declared by this statement.
    pub(crate) fn define_target(&mut self, obj: moonlift_core::ObjectId) -> Result<LValue> {
        let object = self.pkg.info.object(obj);
        if object.is_blank() {
            return Ok(LValue::Blank(self.tmp("blank")));
        }
        let name = self.name_of(obj)?;
        Ok(if self.is_cell(obj) {
            LValue::Fresh(name)
        } else {
            LValue::Place(name)
        })
    }
}

/// Whether `expr` denotes storage whose value must be copied when read.
pub(crate) fn is_addressable(expr: Expr<'_>) -> bool {
    match expr.unparen() {
        Expr::Ident(ident) => !ident.is_blank(),
        Expr::Selector(_) | Expr::Index(_) => true,
        Expr::Unary(u) => u.op == UnaryOp::Deref,
        _ => false,
    }
}

fn literal(lit: &LitExpr<'_>) -> String {
    match lit.kind {
        LitKind::Int(v) => v.to_string(),
        LitKind::Float(v) => float_literal(v.into_inner()),
        LitKind::String(s) => quote(s),
        LitKind::Char(c) => (c as u32).to_string(),
        LitKind::Bool(b) => b.to_string(),
        LitKind::Nil => "nil".to_string(),
    }
}

pub(crate) fn float_literal(v: f64) -> String {
    if v.is_nan() {
        "(0/0)".to_string()
    } else if v.is_infinite() {
        if v > 0.0 {
            "math.huge".to_string()
        } else {
            "(-math.huge)".to_string()
        }
    } else {
        format!("{v:?}")
    }
}
