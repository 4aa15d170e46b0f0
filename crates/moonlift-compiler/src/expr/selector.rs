//! Selectors and index expressions.
//!
//! Selections normally come from the oracle. When one is missing the path
//! is recomputed here with a breadth-first search through embedded fields,
//! shallowest match first, and cached for the rest of the unit.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use moonlift_core::ast::{Expr, IndexExpr, SelectorExpr};
use moonlift_core::{
    BasicKind, CompilationError, ObjectKind, Result, Selection, SelectionKind, SemanticInfo, Type,
    TypeId,
};

use crate::emit::{operand, prefix};
use crate::function::FunctionTranslator;
use crate::naming::field_name;

/// Find the field or method `name` reachable from a value of type `recv`.
pub fn find_selection(info: &SemanticInfo, recv: TypeId, name: &str) -> Option<Selection> {
    let types = &info.types;
    let mut queue: VecDeque<(TypeId, Vec<usize>)> = VecDeque::from([(recv, Vec::new())]);
    let mut seen = FxHashSet::default();
    while let Some((ty, path)) = queue.pop_front() {
        let base = types.pointer_elem(ty).unwrap_or(ty);
        if !seen.insert(base) {
            continue;
        }
        let found = |index: usize, obj, kind| {
            let mut index_path = path.clone();
            index_path.push(index);
            info.object(obj).ty.map(|ty| Selection {
                kind,
                recv,
                index: index_path,
                obj,
                ty,
            })
        };
        if let Some(named) = types.named(base) {
            if let Some((i, m)) = named
                .methods
                .iter()
                .enumerate()
                .find(|(_, m)| info.object(**m).name == name)
            {
                return found(i, *m, SelectionKind::MethodVal);
            }
        }
        match types.underlying_type(base) {
            Type::Struct(st) => {
                if let Some((i, f)) = st
                    .fields
                    .iter()
                    .enumerate()
                    .find(|(_, f)| info.object(**f).name == name)
                {
                    return found(i, *f, SelectionKind::FieldVal);
                }
                for (i, field) in st.fields.iter().enumerate() {
                    let object = info.object(*field);
                    if let (true, Some(field_ty)) = (object.embedded, object.ty) {
                        let mut next = path.clone();
                        next.push(i);
                        queue.push_back((field_ty, next));
                    }
                }
            }
            Type::Interface(iface) => {
                if let Some((i, m)) = iface
                    .methods
                    .iter()
                    .enumerate()
                    .find(|(_, m)| info.object(**m).name == name)
                {
                    return found(i, *m, SelectionKind::MethodVal);
                }
            }
            _ => {}
        }
    }
    None
}

impl<'a, 'ctx, 'p> FunctionTranslator<'a, 'ctx, 'p> {
    pub(crate) fn selector<'ast>(&mut self, sel: &'ast SelectorExpr<'ast>) -> Result<String> {
        if let Some(member) = self.qualified_member(sel)? {
            return Ok(member);
        }
        let selection = self.resolve_selection(sel)?;
        match selection.kind {
            SelectionKind::FieldVal => {
                let (base, _) = self.embedded_operand(sel.x, &selection)?;
                let field = self.pkg.info.object(selection.obj);
                Ok(format!("{}.{}", prefix(&base), field_name(&field.name)))
            }
            SelectionKind::MethodVal => {
                let plan = self.method_call(sel, &selection)?;
                Ok(plan.bound())
            }
            SelectionKind::MethodExpr => self.method_expr(&selection),
        }
    }

    /// `pkg.Name` for an imported package member.
    fn qualified_member(&mut self, sel: &SelectorExpr<'_>) -> Result<Option<String>> {
        let info = self.pkg.info;
        let Expr::Ident(x) = sel.x.unparen() else {
            return Ok(None);
        };
        let is_pkg = info
            .lookup_object(x.id)
            .is_some_and(|o| info.object(o).kind == ObjectKind::PkgName);
        if !is_pkg {
            return Ok(None);
        }
        let member = info.object_of(&sel.sel)?;
        let object = info.object(member);
        if object.kind == ObjectKind::TypeName {
            let ty = object.ty.ok_or_else(|| {
                CompilationError::semantic_gap(format!("type `{}`", object.name), sel.span)
            })?;
            return self.pkg.type_desc(ty).map(Some);
        }
        self.pkg.global_name(member).map(Some)
    }

    /// The selection for `sel`, computing and caching it when the oracle
    /// has none.
    pub(crate) fn resolve_selection(&mut self, sel: &SelectorExpr<'_>) -> Result<Selection> {
        if let Some(selection) = self.pkg.selection(sel.id) {
            return Ok(selection.clone());
        }
        let recv = self.type_of(&sel.x)?;
        let selection = find_selection(self.pkg.info, recv, sel.sel.name).ok_or_else(|| {
            CompilationError::semantic_gap(format!("selection of `{}`", sel.sel.name), sel.span)
        })?;
        self.pkg.cache_selection(sel.id, selection.clone());
        Ok(selection)
    }

    /// The operand after walking the embedded fields of `selection`, with
    /// its type.
    pub(crate) fn embedded_operand<'ast>(
        &mut self,
        x: Expr<'ast>,
        selection: &Selection,
    ) -> Result<(String, TypeId)> {
        let info = self.pkg.info;
        let mut text = self.expr(x)?;
        let mut ty = self.type_of(&x)?;
        for &index in selection.embedded_path() {
            let base = info.types.pointer_elem(ty).unwrap_or(ty);
            let Type::Struct(st) = info.types.underlying_type(base) else {
                return Err(CompilationError::semantic_gap(
                    "struct type along an embedded path",
                    x.span(),
                ));
            };
            let field = st.fields.get(index).map(|f| info.object(*f)).ok_or_else(|| {
                CompilationError::semantic_gap("embedded field", x.span())
            })?;
            text = format!("{}.{}", prefix(&text), field_name(&field.name));
            ty = field.ty.ok_or_else(|| {
                CompilationError::semantic_gap("type of an embedded field", x.span())
            })?;
        }
        Ok((text, ty))
    }

    /// `T.M` used as a function.
    fn method_expr(&mut self, selection: &Selection) -> Result<String> {
        let info = self.pkg.info;
        let method = field_name(&info.object(selection.obj).name);
        let (base, pointer) = match info.types.get(selection.recv) {
            Type::Pointer(elem) => (*elem, true),
            _ => (selection.recv, false),
        };
        let desc = self.pkg.type_desc(base)?;
        if pointer && !info.types.is_struct(base) {
            Ok(format!("{}({desc}).methods.{method}", self.rt("ptr_type")))
        } else {
            Ok(format!("{}.methods.{method}", prefix(&desc)))
        }
    }

    pub(crate) fn index<'ast>(&mut self, e: &IndexExpr<'ast>) -> Result<String> {
        let info = self.pkg.info;
        let x_ty = self.type_of(&e.x)?;
        let comma_ok = matches!(
            info.types.get(self.type_of(&Expr::Index(e))?),
            Type::Tuple(_)
        );
        let x = self.expr(e.x)?;
        let x = self.spill(x, &[e.index]);
        let index = self.expr(e.index)?;
        Ok(match info.types.underlying_type(x_ty) {
            Type::Basic(BasicKind::String) => {
                format!("{}:byte({} + 1)", prefix(&x), operand(&index))
            }
            Type::Map { .. } if comma_ok => format!("{}:lookup({index})", prefix(&x)),
            _ => format!("{}:get({index})", prefix(&x)),
        })
    }
}
