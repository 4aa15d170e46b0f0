//! Method dispatch: where a method lives, how its receiver is bound, and the
//! forwarding wrappers that make it reachable through the other receiver
//! form.
//!
//! | receiver            | primary                       | wrapper on `__rt.ptr_type(T)`          |
//! |---------------------|-------------------------------|----------------------------------------|
//! | `T` or `*T`, struct | `T.methods.M`                 | none, structs are reference tables     |
//! | `*T`, array         | `T.methods.M`                 | `T.new(__rt.clone(self)):M(...)`       |
//! | `*T`, other         | `__rt.ptr_type(T).methods.M`  | none                                   |
//! | `T`, other          | `T.methods.M`                 | dereference, wrap if needed, call      |
//!
//! A pointer to an array is the array table itself; other pointers are
//! objects with `get` and `set`.
//!
//! Every primary is registered with `__rt.reg:add_method` and recorded in the
//! archive's method table.

use tracing::debug;

use moonlift_core::ast::FuncDecl;
use moonlift_core::{CompilationError, ObjectId, Result, SemanticInfo, Span, TypeId};
use moonlift_registry::{MethodEntry, ReceiverForm};

use crate::context::PackageContext;
use crate::emit::quote;
use crate::function::{FunctionTranslator, signature_of, translate_decl};
use crate::machine::StateMachine;
use crate::naming::field_name;

/// Where a receiver's methods live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverShape {
    /// The named type owning the method.
    pub named: TypeId,
    pub pointer: bool,
    pub form: ReceiverForm,
}

impl ReceiverShape {
    pub fn of(info: &SemanticInfo, recv_ty: TypeId, span: Span) -> Result<Self> {
        let types = &info.types;
        let (named, pointer) = match types.pointer_elem(recv_ty) {
            Some(elem) => (elem, true),
            None => (recv_ty, false),
        };
        if types.named(named).is_none() {
            return Err(CompilationError::semantic_gap("named receiver type", span));
        }
        let form = if types.is_struct(named) {
            ReceiverForm::Struct
        } else if pointer && types.is_array(named) {
            ReceiverForm::PointerToArray
        } else if pointer {
            ReceiverForm::Pointer
        } else {
            ReceiverForm::Value
        };
        Ok(Self {
            named,
            pointer,
            form,
        })
    }
}

/// A translated method with everything registered for it.
#[derive(Debug, Clone)]
pub struct TranslatedMethod {
    /// Assignments of the primary and its wrapper, then the registration.
    pub code: String,
    pub entry: MethodEntry,
    pub machine: Option<StateMachine>,
}

/// Translate a method declaration into its primary function, forwarding
/// wrapper and registration.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn translate_method(pkg: &mut PackageContext<'_>, decl: &FuncDecl<'_>) -> Result<TranslatedMethod> {
    let info = pkg.info;
    let obj = info.object_of(&decl.name)?;
    let sig = signature_of(pkg, obj, decl.span)?;
    let recv = sig
        .recv
        .ok_or_else(|| CompilationError::internal(format!("`{}` has no receiver", decl.name.name)))?;
    let recv_ty = info.object(recv).ty.ok_or_else(|| {
        CompilationError::semantic_gap(format!("receiver type of `{}`", decl.name.name), decl.span)
    })?;
    let shape = ReceiverShape::of(info, recv_ty, decl.span)?;
    let type_name = pkg.type_desc(shape.named)?;
    let method = field_name(decl.name.name);
    let ptr_methods = format!("{}({type_name}).methods.{method}", pkg.rt("ptr_type"));
    let primary = match shape.form {
        ReceiverForm::Pointer => ptr_methods.clone(),
        _ => format!("{type_name}.methods.{method}"),
    };

    let (func, machine) = match &decl.body {
        Some(body) => {
            let translated = translate_decl(pkg, decl, body, primary.clone())?;
            (translated.code, translated.machine)
        }
        None => {
            let owner = info.types.named(shape.named).map_or(obj, |n| n.obj);
            let full = format!("{}.{}.{}", pkg.pkg_path, info.object(owner).name, decl.name.name);
            (native_stub(pkg, &full), None)
        }
    };

    let pointee = if info.types.is_array(shape.named) {
        "self"
    } else {
        "self:get()"
    };
    let mut lines = vec![format!("{primary} = {func}")];
    match shape.form {
        ReceiverForm::PointerToArray => lines.push(format!(
            "{ptr_methods} = function(self, ...) return {type_name}.new({}({pointee})):{method}(...) end",
            pkg.rt("clone")
        )),
        ReceiverForm::Value => {
            let forward = if info.types.is_wrapped(shape.named) {
                format!("{type_name}.new({pointee}):{method}(...)")
            } else {
                format!("{primary}({pointee}, ...)")
            };
            lines.push(format!("{ptr_methods} = function(self, ...) return {forward} end"));
        }
        ReceiverForm::Struct | ReceiverForm::Pointer => {}
    }
    lines.push(format!(
        "{}:add_method({}, {type_name}, {}, {primary})",
        pkg.rt("reg"),
        quote(shape.form.registry_kind()),
        quote(decl.name.name)
    ));
    debug!(method = %decl.name.name, receiver = %type_name, form = ?shape.form, "method");

    Ok(TranslatedMethod {
        code: lines.join("\n"),
        entry: MethodEntry {
            type_name,
            method: decl.name.name.to_string(),
            form: shape.form,
            func_ref: primary,
        },
        machine,
    })
}

/// Body of a function declared without one.
pub(crate) fn native_stub(pkg: &PackageContext<'_>, full_name: &str) -> String {
    format!(
        "function() {}({}) end",
        pkg.rt("throw_runtime_error"),
        quote(&format!("native function not implemented: {full_name}"))
    )
}

impl<'a, 'ctx, 'p> FunctionTranslator<'a, 'ctx, 'p> {
    /// Bind the receiver's local from `self`.
    pub(crate) fn bind_receiver(&mut self, recv: ObjectId) -> Result<()> {
        let info = self.pkg.info;
        let object = info.object(recv);
        if object.is_blank() {
            return Ok(());
        }
        let ty = object
            .ty
            .ok_or_else(|| CompilationError::semantic_gap("receiver type", object.span))?;
        let shape = ReceiverShape::of(info, ty, object.span)?;
        let types = &info.types;
        let value = match shape.form {
            ReceiverForm::Struct if !shape.pointer => format!("{}(self)", self.rt("clone")),
            // The forwarding wrapper already made a fresh copy.
            ReceiverForm::PointerToArray => "self.__val".to_string(),
            ReceiverForm::Value if types.is_array(shape.named) => {
                format!("{}(self.__val)", self.rt("clone"))
            }
            ReceiverForm::Value if types.is_wrapped(shape.named) => "self.__val".to_string(),
            _ => "self".to_string(),
        };
        let name = self.name_of(recv)?;
        if self.is_cell(recv) {
            self.emit(format!("{name} = {{{value}}}"));
        } else {
            self.emit(format!("{name} = {value}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moonlift_core::{BasicKind, Bump, ProgramBuilder};

    #[test]
    fn receiver_forms() {
        let arena = Bump::new();
        let mut b = ProgramBuilder::new(&arena, "shapes", "shapes");
        let int = b.int();
        let (_, point) = b.named_type("Point");
        let fields = b.struct_type(&[("X", int, false)]);
        b.set_underlying(point, fields);
        let (_, grid) = b.named_type("Grid");
        let arr = b.array_of(int, 4);
        b.set_underlying(grid, arr);
        let (_, celsius) = b.named_type("Celsius");
        let float = b.basic(BasicKind::Float64);
        b.set_underlying(celsius, float);

        let point_ptr = b.pointer(point);
        let grid_ptr = b.pointer(grid);
        let celsius_ptr = b.pointer(celsius);
        let info = b.info();
        let span = Span::default();
        let form = |ty| ReceiverShape::of(info, ty, span).unwrap().form;
        assert_eq!(form(point), ReceiverForm::Struct);
        assert_eq!(form(point_ptr), ReceiverForm::Struct);
        assert_eq!(form(grid_ptr), ReceiverForm::PointerToArray);
        assert_eq!(form(grid), ReceiverForm::Value);
        assert_eq!(form(celsius_ptr), ReceiverForm::Pointer);
        assert_eq!(form(celsius), ReceiverForm::Value);
        assert!(ReceiverShape::of(info, int, span).is_err());
    }
}
