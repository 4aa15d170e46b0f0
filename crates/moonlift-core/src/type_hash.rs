//! Structural type hashing.
//!
//! [`TypeHash`] is a deterministic 64-bit fingerprint of a type's structure.
//! Anonymous composite types that are structurally identical hash equal even
//! when the oracle hands out distinct [`TypeId`]s for them, which lets the
//! type descriptor emitter bucket candidates before an exact identity check.
//! Named types hash nominally (by object and name) so recursion through a
//! named type never loops.

use std::fmt;

use xxhash_rust::xxh64::xxh64;

use crate::ids::{ObjectId, TypeId};
use crate::object::ObjectTable;
use crate::types::{Type, TypeTable};

/// Domain-specific mixing constants so different type constructors with the
/// same components never collide.
pub mod hash_constants {
    pub const SEP: u64 = 0x4bc94d6bd06053ad;
    pub const BASIC: u64 = 0x2fac10b63a6cc57c;
    pub const NAMED: u64 = 0x1a095090689d4647;
    pub const POINTER: u64 = 0x5ea77ffbcdf5f302;
    pub const SLICE: u64 = 0x7d3c8b4a92e15f6d;
    pub const ARRAY: u64 = 0x3e9f5d2a8c7b1403;
    pub const MAP: u64 = 0x9a7f3d5e2b8c4601;
    pub const CHAN: u64 = 0x9e3779b97f4a7c15;
    pub const FUNC: u64 = 0xbf58476d1ce4e5b9;
    pub const STRUCT: u64 = 0x94d049bb133111eb;
    pub const INTERFACE: u64 = 0xd6e8feb86659fd93;
    pub const TUPLE: u64 = 0xe7037ed1a0b428db;
    pub const VARIADIC: u64 = 0xc6a4a7935bd1e995;
    pub const EMBEDDED: u64 = 0x8648dbbc94d49b8d;
}

/// A structural 64-bit type fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Hash of an identifier.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(xxh64(name.as_bytes(), 0))
    }

    /// Structural hash of a type.
    pub fn of(types: &TypeTable, objects: &ObjectTable, id: TypeId) -> Self {
        TypeHash(hash_type(types, objects, id))
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

fn mix(hash: u64, component: u64) -> u64 {
    // Multiplication keeps component order significant.
    hash.wrapping_mul(hash_constants::SEP).wrapping_add(component)
}

fn hash_type(types: &TypeTable, objects: &ObjectTable, id: TypeId) -> u64 {
    match types.get(id) {
        Type::Basic(kind) => hash_constants::BASIC ^ u64::from(u8::from(*kind)),
        Type::Named(named) => {
            let name = &objects.get(named.obj).name;
            mix(
                hash_constants::NAMED ^ xxh64(name.as_bytes(), 0),
                u64::from(named.obj.index()),
            )
        }
        Type::Pointer(elem) => mix(hash_constants::POINTER, hash_type(types, objects, *elem)),
        Type::Slice(elem) => mix(hash_constants::SLICE, hash_type(types, objects, *elem)),
        Type::Array { elem, len } => mix(
            mix(hash_constants::ARRAY, *len),
            hash_type(types, objects, *elem),
        ),
        Type::Map { key, value } => mix(
            mix(hash_constants::MAP, hash_type(types, objects, *key)),
            hash_type(types, objects, *value),
        ),
        Type::Chan { elem, dir } => mix(
            mix(hash_constants::CHAN, u64::from(dir.bits())),
            hash_type(types, objects, *elem),
        ),
        Type::Signature(sig) => {
            let mut hash = hash_constants::FUNC;
            if sig.variadic {
                hash ^= hash_constants::VARIADIC;
            }
            hash = hash_vars(types, objects, hash, &sig.params, false);
            hash = mix(hash, hash_constants::SEP);
            hash_vars(types, objects, hash, &sig.results, false)
        }
        Type::Struct(st) => {
            let mut hash = hash_vars(types, objects, hash_constants::STRUCT, &st.fields, true);
            for tag in &st.tags {
                hash = mix(hash, xxh64(tag.as_bytes(), 0));
            }
            hash
        }
        Type::Interface(iface) => {
            hash_vars(types, objects, hash_constants::INTERFACE, &iface.methods, true)
        }
        Type::Tuple(elems) => elems.iter().fold(hash_constants::TUPLE, |hash, elem| {
            mix(hash, hash_type(types, objects, *elem))
        }),
    }
}

fn hash_vars(
    types: &TypeTable,
    objects: &ObjectTable,
    mut hash: u64,
    vars: &[ObjectId],
    with_names: bool,
) -> u64 {
    for var in vars {
        let object = objects.get(*var);
        if with_names {
            hash = mix(hash, xxh64(object.name.as_bytes(), 0));
        }
        if object.embedded {
            hash ^= hash_constants::EMBEDDED;
        }
        if let Some(ty) = object.ty {
            hash = mix(hash, hash_type(types, objects, ty));
        }
    }
    hash
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Object, ObjectKind};
    use crate::types::{BasicKind, ChanDir, NamedType, StructType};

    #[test]
    fn identical_structures_hash_equal() {
        let objects = ObjectTable::new();
        let mut types = TypeTable::new();
        let int = types.basic(BasicKind::Int);
        let string = types.basic(BasicKind::String);
        let m1 = types.add(Type::Map { key: string, value: int });
        let m2 = types.add(Type::Map { key: string, value: int });
        assert_eq!(
            TypeHash::of(&types, &objects, m1),
            TypeHash::of(&types, &objects, m2)
        );
    }

    #[test]
    fn component_order_matters() {
        let objects = ObjectTable::new();
        let mut types = TypeTable::new();
        let int = types.basic(BasicKind::Int);
        let string = types.basic(BasicKind::String);
        let m1 = types.add(Type::Map { key: string, value: int });
        let m2 = types.add(Type::Map { key: int, value: string });
        assert_ne!(
            TypeHash::of(&types, &objects, m1),
            TypeHash::of(&types, &objects, m2)
        );
    }

    #[test]
    fn channel_direction_changes_hash() {
        let objects = ObjectTable::new();
        let mut types = TypeTable::new();
        let int = types.basic(BasicKind::Int);
        let both = types.add(Type::Chan { elem: int, dir: ChanDir::BOTH });
        let send = types.add(Type::Chan { elem: int, dir: ChanDir::SEND });
        assert_ne!(
            TypeHash::of(&types, &objects, both),
            TypeHash::of(&types, &objects, send)
        );
    }

    #[test]
    fn recursive_named_type_terminates() {
        let mut objects = ObjectTable::new();
        let mut types = TypeTable::new();
        let node_obj = objects.add(Object::new("Node", ObjectKind::TypeName));
        let node = types.add(Type::Named(NamedType {
            obj: node_obj,
            underlying: None,
            methods: vec![],
        }));
        let ptr = types.add(Type::Pointer(node));
        let next = objects.add(Object::new("next", ObjectKind::Field).with_type(ptr));
        let body = types.add(Type::Struct(StructType {
            fields: vec![next],
            tags: vec![String::new()],
        }));
        types.set_underlying(node, body);
        let h = TypeHash::of(&types, &objects, body);
        assert_ne!(h, TypeHash::EMPTY);
    }

    #[test]
    fn field_names_distinguish_structs() {
        let mut objects = ObjectTable::new();
        let mut types = TypeTable::new();
        let int = types.basic(BasicKind::Int);
        let a = objects.add(Object::new("a", ObjectKind::Field).with_type(int));
        let b = objects.add(Object::new("b", ObjectKind::Field).with_type(int));
        let s1 = types.add(Type::Struct(StructType { fields: vec![a], tags: vec![] }));
        let s2 = types.add(Type::Struct(StructType { fields: vec![b], tags: vec![] }));
        assert_ne!(
            TypeHash::of(&types, &objects, s1),
            TypeHash::of(&types, &objects, s2)
        );
    }
}
