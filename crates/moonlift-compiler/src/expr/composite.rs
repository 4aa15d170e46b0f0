//! Composite literals and type assertions.

use moonlift_core::ast::{CompositeLit, Expr, LitKind, TypeAssertExpr};
use moonlift_core::{CompilationError, Result, Type, TypeId};

use crate::emit::prefix;
use crate::function::FunctionTranslator;
use crate::naming::field_name;

impl<'a, 'ctx, 'p> FunctionTranslator<'a, 'ctx, 'p> {
    pub(crate) fn composite<'ast>(&mut self, lit: &CompositeLit<'ast>) -> Result<String> {
        let info = self.pkg.info;
        let ty = info.type_of(lit.id, lit.span)?;
        // `&T{...}` literals are typed as the pointer.
        let ty = info.types.pointer_elem(ty).unwrap_or(ty);
        let desc = self.pkg.type_desc(ty)?;
        let values: Vec<Expr<'ast>> = lit.elems.iter().map(|e| e.value).collect();

        match info.types.underlying_type(ty) {
            Type::Struct(st) => {
                let mut entries = Vec::with_capacity(lit.elems.len());
                for (i, elem) in lit.elems.iter().enumerate() {
                    let field = match elem.key {
                        Some(Expr::Ident(key)) => st
                            .fields
                            .iter()
                            .find(|f| info.object(**f).name == key.name)
                            .copied(),
                        Some(_) => None,
                        None => st.fields.get(i).copied(),
                    }
                    .ok_or_else(|| {
                        CompilationError::semantic_gap("field of a struct literal", lit.span)
                    })?;
                    let object = info.object(field);
                    let value = match object.ty {
                        Some(field_ty) => self.value(elem.value, field_ty)?,
                        None => self.expr(elem.value)?,
                    };
                    let value = self.spill(value, &values[i + 1..]);
                    entries.push(format!("{} = {value}", field_name(&object.name)));
                }
                Ok(format!("{}.new({{{}}})", prefix(&desc), entries.join(", ")))
            }
            Type::Array { elem, .. } => {
                let (table, _) = self.sequence(lit, *elem)?;
                Ok(format!("{}({desc}, {table})", self.rt("array_lit")))
            }
            Type::Slice(elem) => {
                let (table, len) = self.sequence(lit, *elem)?;
                Ok(format!("{}({desc}, {table}, {len})", self.rt("slice_lit")))
            }
            Type::Map { key, value } => {
                let (key, value) = (*key, *value);
                let mut pairs = Vec::with_capacity(lit.elems.len());
                for (i, elem) in lit.elems.iter().enumerate() {
                    let Some(k) = elem.key else {
                        return Err(CompilationError::semantic_gap("key of a map literal", lit.span));
                    };
                    let k = self.value(k, key)?;
                    let k = self.spill(k, &values[i..]);
                    let v = self.value(elem.value, value)?;
                    let v = self.spill(v, &values[i + 1..]);
                    pairs.push(format!("{{{k}, {v}}}"));
                }
                Ok(format!("{}({desc}, {{{}}})", self.rt("map_lit"), pairs.join(", ")))
            }
            _ => Err(CompilationError::unsupported(
                "composite literal of this type",
                lit.span,
            )),
        }
    }

    /// Elements of an array or slice literal as a 1-based Lua table, with
    /// the literal's length.
    fn sequence<'ast>(&mut self, lit: &CompositeLit<'ast>, elem: TypeId) -> Result<(String, u64)> {
        let values: Vec<Expr<'ast>> = lit.elems.iter().map(|e| e.value).collect();
        let keyed = lit.elems.iter().any(|e| e.key.is_some());
        let mut parts = Vec::with_capacity(lit.elems.len());
        let mut position: u64 = 0;
        let mut len: u64 = 0;
        for (i, item) in lit.elems.iter().enumerate() {
            if let Some(key) = item.key {
                position = constant_index(key).ok_or_else(|| {
                    CompilationError::unsupported("non-constant index in a literal", lit.span)
                })?;
            }
            let value = self.value(item.value, elem)?;
            let value = self.spill(value, &values[i + 1..]);
            parts.push(if keyed {
                format!("[{}] = {value}", position + 1)
            } else {
                value
            });
            position += 1;
            len = len.max(position);
        }
        Ok((format!("{{{}}}", parts.join(", ")), len))
    }

    pub(crate) fn type_assert<'ast>(&mut self, e: &TypeAssertExpr<'ast>) -> Result<String> {
        let Some(asserted) = e.ty else {
            return Err(CompilationError::unsupported("type switch", e.span));
        };
        let info = self.pkg.info;
        let x = self.expr(e.x)?;
        let target = info.type_of(asserted.id, asserted.span)?;
        let desc = self.pkg.type_desc(target)?;
        let comma_ok = matches!(info.types.get(info.type_of(e.id, e.span)?), Type::Tuple(_));
        Ok(format!("{}({x}, {desc}, {comma_ok})", self.rt("assert_type")))
    }
}

fn constant_index(key: Expr<'_>) -> Option<u64> {
    match key.unparen() {
        Expr::Lit(lit) => match lit.kind {
            LitKind::Int(v) => u64::try_from(v).ok(),
            LitKind::Char(c) => Some(u64::from(u32::from(c))),
            _ => None,
        },
        _ => None,
    }
}
