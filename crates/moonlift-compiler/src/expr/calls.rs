//! Calls, conversions, builtins and method dispatch.
//!
//! A call expression is one of four things: a conversion (the callee is a
//! type), a builtin, a method call, or a call of a function value. Method
//! calls are dispatched dynamically (`x:M(...)`) when the receiver carries
//! a method table at run time, and statically through the type's method
//! table otherwise.

use moonlift_core::ast::{CallExpr, Expr, SelectorExpr};
use moonlift_core::{
    BasicKind, CompilationError, ObjectKind, Result, Selection, SelectionKind, Signature, Type,
    TypeId,
};

use crate::emit::{operand, prefix};
use crate::expr::LValue;
use crate::function::FunctionTranslator;
use crate::naming::field_name;

/// What a call expression invokes.
pub(crate) enum Callee<'ast> {
    Conversion(TypeId),
    Builtin(&'ast str),
    Method(&'ast SelectorExpr<'ast>, Selection),
    Value,
}

/// How a method is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MethodTarget {
    /// `recv:name(...)`.
    Dynamic(String),
    /// `func(recv, ...)`.
    Static(String),
}

/// A resolved method call: receiver text plus dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MethodCall {
    pub recv: String,
    pub target: MethodTarget,
}

impl MethodCall {
    /// The call with `args`.
    pub(crate) fn call(&self, args: &[String]) -> String {
        match &self.target {
            MethodTarget::Dynamic(name) => {
                format!("{}:{name}({})", prefix(&self.recv), args.join(", "))
            }
            MethodTarget::Static(func) => {
                let mut all = Vec::with_capacity(args.len() + 1);
                all.push(self.recv.clone());
                all.extend(args.iter().cloned());
                format!("{func}({})", all.join(", "))
            }
        }
    }

    /// A function taking the receiver first, for deferred and `go` calls.
    pub(crate) fn function(&self) -> String {
        match &self.target {
            MethodTarget::Dynamic(name) => {
                format!("function(__x, ...) return __x:{name}(...) end")
            }
            MethodTarget::Static(func) => func.clone(),
        }
    }

    /// A method value: the method bound to the receiver evaluated now.
    pub(crate) fn bound(&self) -> String {
        let call = MethodCall {
            recv: "__x".to_string(),
            target: self.target.clone(),
        }
        .call(&["...".to_string()]);
        format!(
            "(function(__x) return function(...) return {call} end end)({})",
            self.recv
        )
    }
}

/// Runtime functions standing in for builtins in `defer` and `go`.
const DEFERRABLE_BUILTINS: &[&str] = &[
    "close", "copy", "delete", "panic", "print", "println", "recover",
];

impl<'a, 'ctx, 'p> FunctionTranslator<'a, 'ctx, 'p> {
    pub(crate) fn call<'ast>(&mut self, call: &'ast CallExpr<'ast>) -> Result<String> {
        let text = self.call_text(call)?;
        if !(self.func.is_flattened() && self.func.facts.is_blocking(call.id)) {
            return Ok(text);
        }
        // The callee is itself a fiber: its results arrive as the
        // resumption value.
        let result = self.suspend(&text)?;
        let info = self.pkg.info;
        Ok(match info.expr_types.get(&call.id).map(|ty| info.types.get(*ty)) {
            Some(Type::Tuple(elems)) => {
                format!("{}({result}, 1, {})", self.rt("unpack"), elems.len())
            }
            Some(_) => format!("{result}[1]"),
            None => result,
        })
    }

    fn call_text<'ast>(&mut self, call: &'ast CallExpr<'ast>) -> Result<String> {
        match self.callee(call)? {
            Callee::Conversion(target) => self.convert(call, target),
            Callee::Builtin(name) => self.builtin(name, call),
            Callee::Method(sel, selection) => {
                let plan = self.method_call(sel, &selection)?;
                let sig = self.signature(selection.ty, call)?;
                let args = self.call_args(call, &sig)?;
                Ok(plan.call(&args))
            }
            Callee::Value => {
                let func = self.expr(call.func)?;
                let func = self.spill(func, call.args);
                let sig = self.signature(self.type_of(&call.func)?, call)?;
                let args = self.call_args(call, &sig)?;
                Ok(format!("{}({})", prefix(&func), args.join(", ")))
            }
        }
    }

    fn signature(&self, ty: TypeId, call: &CallExpr<'_>) -> Result<Signature> {
        self.pkg
            .info
            .types
            .signature(ty)
            .cloned()
            .ok_or_else(|| CompilationError::semantic_gap("signature of the callee", call.span))
    }

    pub(crate) fn callee<'ast>(&mut self, call: &'ast CallExpr<'ast>) -> Result<Callee<'ast>> {
        let info = self.pkg.info;
        match call.func.unparen() {
            Expr::Type(_) => Ok(Callee::Conversion(self.type_of(&Expr::Call(call))?)),
            Expr::Ident(ident) => match info.lookup_object(ident.id).map(|o| info.object(o)) {
                Some(object) if object.kind == ObjectKind::TypeName => {
                    Ok(Callee::Conversion(self.type_of(&Expr::Call(call))?))
                }
                Some(object) if object.kind == ObjectKind::Builtin => {
                    Ok(Callee::Builtin(ident.name))
                }
                _ => Ok(Callee::Value),
            },
            Expr::Selector(sel) => {
                if let Expr::Ident(pkg) = sel.x.unparen() {
                    let is_pkg = info
                        .lookup_object(pkg.id)
                        .is_some_and(|o| info.object(o).kind == ObjectKind::PkgName);
                    if is_pkg {
                        let member = info.object_of(&sel.sel)?;
                        return Ok(if info.object(member).kind == ObjectKind::TypeName {
                            Callee::Conversion(self.type_of(&Expr::Call(call))?)
                        } else {
                            Callee::Value
                        });
                    }
                }
                let selection = self.resolve_selection(sel)?;
                Ok(match selection.kind {
                    SelectionKind::MethodVal => Callee::Method(sel, selection),
                    _ => Callee::Value,
                })
            }
            _ => Ok(Callee::Value),
        }
    }

    /// Arguments of a call, coerced to their parameter types. Extra
    /// arguments of a variadic call are packed into a slice.
    pub(crate) fn call_args<'ast>(
        &mut self,
        call: &CallExpr<'ast>,
        sig: &Signature,
    ) -> Result<Vec<String>> {
        let info = self.pkg.info;
        if let [only] = call.args {
            if matches!(info.types.get(self.type_of(only)?), Type::Tuple(_)) {
                return Ok(vec![self.expr(*only)?]);
            }
        }
        let param_types: Vec<TypeId> = sig
            .params
            .iter()
            .map(|p| {
                info.object(*p)
                    .ty
                    .ok_or_else(|| CompilationError::semantic_gap("parameter type", call.span))
            })
            .collect::<Result<_>>()?;
        let packs = sig.variadic && !call.ellipsis;
        let fixed = if packs {
            param_types.len().saturating_sub(1)
        } else {
            param_types.len()
        };
        let variadic = param_types.last().copied();
        let elem = match variadic.map(|t| info.types.underlying_type(t)) {
            Some(Type::Slice(elem)) => Some(*elem),
            _ => None,
        };

        let mut args = Vec::with_capacity(call.args.len());
        let mut extra = Vec::new();
        for (i, arg) in call.args.iter().enumerate() {
            let target = if i < fixed {
                param_types.get(i).copied()
            } else {
                elem
            };
            let text = match target {
                Some(target) => self.value(*arg, target)?,
                None => self.expr(*arg)?,
            };
            let text = self.spill(text, &call.args[i + 1..]);
            if i < fixed {
                args.push(text);
            } else {
                extra.push(text);
            }
        }
        if packs {
            let slice = variadic.ok_or_else(|| {
                CompilationError::semantic_gap("variadic parameter type", call.span)
            })?;
            if extra.is_empty() {
                args.push("nil".to_string());
            } else {
                let desc = self.pkg.type_desc(slice)?;
                args.push(format!(
                    "{}({desc}, {{{}}}, {})",
                    self.rt("slice_lit"),
                    extra.join(", "),
                    extra.len()
                ));
            }
        }
        Ok(args)
    }

    /// `T(x)`.
    fn convert<'ast>(&mut self, call: &CallExpr<'ast>, target: TypeId) -> Result<String> {
        let [arg] = call.args else {
            return Err(CompilationError::unsupported(
                "conversion with other than one argument",
                call.span,
            ));
        };
        let info = self.pkg.info;
        let types = &info.types;
        let source = self.type_of(arg)?;
        let text = self.expr(*arg)?;
        if types.is_interface(target) {
            return self.coerce(*arg, text, source, target);
        }
        if types.basic_kind(source) == Some(BasicKind::UntypedNil) {
            return Ok(text);
        }
        let same = types.identical(
            &info.objects,
            types.underlying(source),
            types.underlying(target),
        );
        if same && !types.is_struct(source) {
            return self.coerce(*arg, text, source, target);
        }
        let widening = matches!(
            (types.basic_kind(source), types.basic_kind(target)),
            (Some(s), Some(t)) if s.is_integer() && t.is_float()
        );
        if widening {
            return Ok(text);
        }
        let desc = self.pkg.type_desc(target)?;
        Ok(format!("{}({desc}, {text})", self.rt("convert")))
    }

    fn builtin<'ast>(&mut self, name: &str, call: &'ast CallExpr<'ast>) -> Result<String> {
        let info = self.pkg.info;
        let args = call.args;
        let span = call.span;
        match name {
            "len" => {
                let [x] = args else { return Err(arity(name, span)) };
                let text = self.expr(*x)?;
                if info.types.basic_kind(self.type_of(x)?) == Some(BasicKind::String) {
                    Ok(format!("#{}", operand(&text)))
                } else {
                    Ok(format!("{}({text})", self.rt("len")))
                }
            }
            "cap" => {
                let [x] = args else { return Err(arity(name, span)) };
                let text = self.expr(*x)?;
                Ok(format!("{}({text})", self.rt("cap")))
            }
            "append" => {
                let Some((first, rest)) = args.split_first() else {
                    return Err(arity(name, span));
                };
                let slice_ty = self.type_of(first)?;
                let slice = self.expr(*first)?;
                let slice = self.spill(slice, rest);
                if call.ellipsis {
                    let [more] = rest else { return Err(arity(name, span)) };
                    let more = self.expr(*more)?;
                    return Ok(format!("{}({slice}, {more})", self.rt("append_slice")));
                }
                let elem = match info.types.underlying_type(slice_ty) {
                    Type::Slice(elem) => Some(*elem),
                    _ => None,
                };
                let mut parts = vec![slice];
                for (i, value) in rest.iter().enumerate() {
                    let text = match elem {
                        Some(elem) => self.value(*value, elem)?,
                        None => self.expr(*value)?,
                    };
                    parts.push(self.spill(text, &rest[i + 1..]));
                }
                Ok(format!("{}({})", self.rt("append"), parts.join(", ")))
            }
            "make" => {
                let ty = self.type_of(&Expr::Call(call))?;
                let desc = self.pkg.type_desc(ty)?;
                let mut sizes = Vec::new();
                for (i, size) in args.iter().enumerate().skip(1) {
                    let text = self.expr(*size)?;
                    sizes.push(self.spill(text, &args[i + 1..]));
                }
                let func = match info.types.underlying_type(ty) {
                    Type::Slice(_) => "make_slice",
                    Type::Map { .. } => "make_map",
                    Type::Chan { .. } => {
                        if sizes.is_empty() {
                            sizes.push("0".to_string());
                        }
                        "make_chan"
                    }
                    _ => return Err(CompilationError::unsupported("make of this type", span)),
                };
                let mut parts = vec![desc];
                parts.extend(sizes);
                Ok(format!("{}({})", self.rt(func), parts.join(", ")))
            }
            "new" => {
                let ty = self.type_of(&Expr::Call(call))?;
                let elem = info.types.pointer_elem(ty).ok_or_else(|| {
                    CompilationError::semantic_gap("pointer type of `new`", span)
                })?;
                let desc = self.pkg.type_desc(elem)?;
                Ok(format!("{}({desc})", self.rt("new")))
            }
            "delete" | "copy" | "close" | "panic" | "print" | "println" | "recover" => {
                let parts = self.plain_args(args)?;
                Ok(format!("{}({})", self.rt(name), parts.join(", ")))
            }
            other => Err(CompilationError::unsupported(
                format!("builtin `{other}`"),
                span,
            )),
        }
    }

    fn plain_args<'ast>(&mut self, args: &[Expr<'ast>]) -> Result<Vec<String>> {
        let mut parts = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let text = self.expr(*arg)?;
            parts.push(self.spill(text, &args[i + 1..]));
        }
        Ok(parts)
    }

    /// Dispatch plan for `sel` as a method call.
    pub(crate) fn method_call<'ast>(
        &mut self,
        sel: &'ast SelectorExpr<'ast>,
        selection: &Selection,
    ) -> Result<MethodCall> {
        let info = self.pkg.info;
        let types = &info.types;
        let (recv, recv_ty) = self.embedded_operand(sel.x, selection)?;
        let method = info.object(selection.obj);
        let name = field_name(&method.name);

        let declared = method
            .ty
            .and_then(|ty| types.signature(ty))
            .and_then(|sig| sig.recv)
            .and_then(|r| info.object(r).ty);
        let Some(declared) = declared else {
            return Ok(MethodCall {
                recv,
                target: MethodTarget::Dynamic(name),
            });
        };
        if types.is_interface(recv_ty) {
            return Ok(MethodCall {
                recv,
                target: MethodTarget::Dynamic(name),
            });
        }

        let (base, pointer_method) = match types.get(declared) {
            Type::Pointer(elem) => (*elem, true),
            _ => (declared, false),
        };
        if types.is_struct(base) {
            return Ok(MethodCall {
                recv,
                target: MethodTarget::Dynamic(name),
            });
        }
        let desc = self.pkg.type_desc(base)?;
        let ptr_methods = format!("{}({desc}).methods.{name}", self.rt("ptr_type"));
        let holds_pointer = types.pointer_elem(recv_ty).is_some();
        Ok(match (pointer_method, holds_pointer) {
            (false, false) if types.is_wrapped(base) => MethodCall {
                recv: format!("{}.new({recv})", prefix(&desc)),
                target: MethodTarget::Dynamic(name),
            },
            (false, false) => MethodCall {
                recv,
                target: MethodTarget::Static(format!("{}.methods.{name}", prefix(&desc))),
            },
            (_, true) => MethodCall {
                recv,
                target: MethodTarget::Static(ptr_methods),
            },
            (true, false) => {
                let address = if types.is_array(recv_ty) {
                    recv
                } else if selection.embedded_path().is_empty() {
                    self.address_of(sel.x)?
                } else {
                    self.pointer_to(&LValue::Place(recv), recv_ty)?
                };
                MethodCall {
                    recv: address,
                    target: MethodTarget::Static(ptr_methods),
                }
            }
        })
    }

    /// Function and argument texts of a `defer` or `go` call.
    pub(crate) fn deferred_call<'ast>(
        &mut self,
        call: &'ast CallExpr<'ast>,
    ) -> Result<(String, Vec<String>)> {
        match self.callee(call)? {
            Callee::Method(sel, selection) => {
                let plan = self.method_call(sel, &selection)?;
                let sig = self.signature(selection.ty, call)?;
                let mut args = vec![plan.recv.clone()];
                args.extend(self.call_args(call, &sig)?);
                Ok((plan.function(), args))
            }
            Callee::Builtin(name) if DEFERRABLE_BUILTINS.contains(&name) => {
                let args = self.plain_args(call.args)?;
                Ok((self.rt(name), args))
            }
            Callee::Builtin(name) => Err(CompilationError::unsupported(
                format!("deferred builtin `{name}`"),
                call.span,
            )),
            Callee::Conversion(_) => Err(CompilationError::unsupported(
                "deferred conversion",
                call.span,
            )),
            Callee::Value => {
                let func = self.expr(call.func)?;
                let sig = self.signature(self.type_of(&call.func)?, call)?;
                let args = self.call_args(call, &sig)?;
                Ok((func, args))
            }
        }
    }
}

fn arity(name: &str, span: moonlift_core::Span) -> CompilationError {
    CompilationError::unsupported(format!("`{name}` with this argument count"), span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_and_static_calls() {
        let dynamic = MethodCall {
            recv: "p".into(),
            target: MethodTarget::Dynamic("Area".into()),
        };
        assert_eq!(dynamic.call(&["2".into()]), "p:Area(2)");
        assert_eq!(
            dynamic.function(),
            "function(__x, ...) return __x:Area(...) end"
        );

        let stat = MethodCall {
            recv: "c".into(),
            target: MethodTarget::Static("Celsius.methods.String".into()),
        };
        assert_eq!(stat.call(&[]), "Celsius.methods.String(c)");
        assert_eq!(stat.function(), "Celsius.methods.String");
    }

    #[test]
    fn bound_method_value() {
        let plan = MethodCall {
            recv: "s".into(),
            target: MethodTarget::Dynamic("Len".into()),
        };
        assert_eq!(
            plan.bound(),
            "(function(__x) return function(...) return __x:Len(...) end end)(s)"
        );
    }
}
