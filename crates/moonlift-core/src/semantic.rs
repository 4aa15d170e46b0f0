//! Facts delivered by the semantic oracle.
//!
//! [`SemanticInfo`] is the translator's read-only view of type checking:
//! expression types, definitions and uses, selections, per-function
//! blocking sites, and escape flags. Missing facts surface as
//! [`CompilationError::SemanticGap`]; a missing per-function record is an
//! [`CompilationError::InternalInvariantViolation`] because the oracle
//! promises one for every function it delivers.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::Ident;
use crate::error::{CompilationError, Result};
use crate::ids::{NodeId, ObjectId, TypeId};
use crate::object::{Object, ObjectTable};
use crate::span::Span;
use crate::types::TypeTable;

/// How a selector expression resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionKind {
    /// `x.f` where `f` is a field.
    FieldVal,
    /// `x.m` where `m` is a method bound to `x`.
    MethodVal,
    /// `T.m`, a method used as a function taking the receiver first.
    MethodExpr,
}

/// Resolved access path for a field or method reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub kind: SelectionKind,
    /// Type of the selector's operand.
    pub recv: TypeId,
    /// Field indices through embedded structs; the last entry is the index of
    /// the selected field or method.
    pub index: Vec<usize>,
    /// The selected field or method object.
    pub obj: ObjectId,
    /// Type of the selector expression.
    pub ty: TypeId,
}

impl Selection {
    /// Embedded fields traversed before the final selection.
    pub fn embedded_path(&self) -> &[usize] {
        match self.index.split_last() {
            Some((_, path)) => path,
            None => &[],
        }
    }
}

/// Per-function facts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FuncInfo {
    /// Nodes (expressions or statements) whose evaluation may suspend.
    pub blocking: FxHashSet<NodeId>,
}

impl FuncInfo {
    pub fn is_blocking(&self, node: NodeId) -> bool {
        self.blocking.contains(&node)
    }

    /// A function with no blocking sites never needs flattening.
    pub fn needs_flattening(&self) -> bool {
        !self.blocking.is_empty()
    }
}

/// Everything the oracle knows about one package.
#[derive(Debug, Default)]
pub struct SemanticInfo {
    pub types: TypeTable,
    pub objects: ObjectTable,
    /// Type of each expression.
    pub expr_types: FxHashMap<NodeId, TypeId>,
    /// Objects defined by identifiers (and import declarations).
    pub defs: FxHashMap<NodeId, ObjectId>,
    /// Objects referenced by identifiers.
    pub uses: FxHashMap<NodeId, ObjectId>,
    /// Selector resolutions keyed by selector node.
    pub selections: FxHashMap<NodeId, Selection>,
    /// Facts keyed by `FuncDecl` or `FuncLit` node.
    pub func_infos: FxHashMap<NodeId, FuncInfo>,
    /// Variables captured by a closure that may outlive their scope.
    pub escaping: FxHashSet<ObjectId>,
}

impl SemanticInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// The type of an expression node.
    pub fn type_of(&self, node: NodeId, span: Span) -> Result<TypeId> {
        self.expr_types
            .get(&node)
            .copied()
            .ok_or_else(|| CompilationError::semantic_gap(format!("type of {node}"), span))
    }

    /// The object an identifier defines or references.
    pub fn object_of(&self, ident: &Ident<'_>) -> Result<ObjectId> {
        self.defs
            .get(&ident.id)
            .or_else(|| self.uses.get(&ident.id))
            .copied()
            .ok_or_else(|| {
                CompilationError::semantic_gap(format!("object for `{}`", ident.name), ident.span)
            })
    }

    /// Like [`object_of`](Self::object_of) but `None` when unresolved.
    pub fn lookup_object(&self, node: NodeId) -> Option<ObjectId> {
        self.defs
            .get(&node)
            .or_else(|| self.uses.get(&node))
            .copied()
    }

    pub fn object(&self, id: ObjectId) -> &Object {
        self.objects.get(id)
    }

    pub fn selection(&self, node: NodeId) -> Option<&Selection> {
        self.selections.get(&node)
    }

    /// Per-function facts for a `FuncDecl` or `FuncLit` node.
    pub fn func_info(&self, node: NodeId) -> Result<&FuncInfo> {
        self.func_infos.get(&node).ok_or_else(|| {
            CompilationError::internal(format!("no function facts recorded for {node}"))
        })
    }

    pub fn is_escaping(&self, obj: ObjectId) -> bool {
        self.escaping.contains(&obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKind;

    #[test]
    fn missing_type_is_semantic_gap() {
        let info = SemanticInfo::new();
        let err = info.type_of(NodeId::new(3), Span::point(2, 5)).unwrap_err();
        assert!(matches!(err, CompilationError::SemanticGap { .. }));
        assert_eq!(err.span(), Some(Span::point(2, 5)));
    }

    #[test]
    fn missing_func_info_is_internal() {
        let info = SemanticInfo::new();
        let err = info.func_info(NodeId::new(1)).unwrap_err();
        assert!(matches!(err, CompilationError::InternalInvariantViolation { .. }));
    }

    #[test]
    fn defs_take_priority_over_uses() {
        let mut info = SemanticInfo::new();
        let a = info.objects.add(Object::new("a", ObjectKind::Var));
        let b = info.objects.add(Object::new("b", ObjectKind::Var));
        let ident = Ident {
            id: NodeId::new(7),
            name: "a",
            span: Span::default(),
        };
        info.uses.insert(ident.id, b);
        info.defs.insert(ident.id, a);
        assert_eq!(info.object_of(&ident).unwrap(), a);
    }

    #[test]
    fn selection_embedded_path() {
        let sel = Selection {
            kind: SelectionKind::FieldVal,
            recv: TypeId::new(0),
            index: vec![1, 0, 2],
            obj: ObjectId::new(0),
            ty: TypeId::new(0),
        };
        assert_eq!(sel.embedded_path(), &[1, 0]);
    }
}
