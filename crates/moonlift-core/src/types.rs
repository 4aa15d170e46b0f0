//! Source-language types as delivered by the semantic oracle.
//!
//! Types live in a [`TypeTable`] arena and are referred to by [`TypeId`].
//! The table does not intern: the oracle may hand us two distinct ids for two
//! structurally identical anonymous types, and consumers that care about
//! structural identity (the type descriptor emitter) compare with
//! [`TypeTable::identical`].

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use rustc_hash::FxHashMap;

use crate::ids::{ObjectId, TypeId};
use crate::object::ObjectTable;

// ============================================================================
// Basic kinds
// ============================================================================

/// Predeclared basic types.
///
/// The numeric code is emitted into type descriptors so the runtime can pick
/// a value representation without string comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum BasicKind {
    Bool = 1,
    Int = 2,
    Int8 = 3,
    Int16 = 4,
    Int32 = 5,
    Int64 = 6,
    Uint = 7,
    Uint8 = 8,
    Uint16 = 9,
    Uint32 = 10,
    Uint64 = 11,
    Uintptr = 12,
    Float32 = 13,
    Float64 = 14,
    Complex64 = 15,
    Complex128 = 16,
    String = 17,
    UnsafePointer = 18,
    UntypedNil = 19,
}

impl BasicKind {
    /// The source-level spelling, also used as the runtime descriptor key.
    pub fn name(self) -> &'static str {
        match self {
            BasicKind::Bool => "bool",
            BasicKind::Int => "int",
            BasicKind::Int8 => "int8",
            BasicKind::Int16 => "int16",
            BasicKind::Int32 => "int32",
            BasicKind::Int64 => "int64",
            BasicKind::Uint => "uint",
            BasicKind::Uint8 => "uint8",
            BasicKind::Uint16 => "uint16",
            BasicKind::Uint32 => "uint32",
            BasicKind::Uint64 => "uint64",
            BasicKind::Uintptr => "uintptr",
            BasicKind::Float32 => "float32",
            BasicKind::Float64 => "float64",
            BasicKind::Complex64 => "complex64",
            BasicKind::Complex128 => "complex128",
            BasicKind::String => "string",
            BasicKind::UnsafePointer => "unsafe_pointer",
            BasicKind::UntypedNil => "nil",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            BasicKind::Int
                | BasicKind::Int8
                | BasicKind::Int16
                | BasicKind::Int32
                | BasicKind::Int64
                | BasicKind::Uint
                | BasicKind::Uint8
                | BasicKind::Uint16
                | BasicKind::Uint32
                | BasicKind::Uint64
                | BasicKind::Uintptr
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, BasicKind::Float32 | BasicKind::Float64)
    }

    pub fn is_complex(self) -> bool {
        matches!(self, BasicKind::Complex64 | BasicKind::Complex128)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float() || self.is_complex()
    }

    /// 64-bit integers use a boxed runtime representation of their own.
    pub fn is_64bit(self) -> bool {
        matches!(self, BasicKind::Int64 | BasicKind::Uint64)
    }
}

bitflags! {
    /// Channel direction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChanDir: u8 {
        /// Values can be sent.
        const SEND = 0b01;
        /// Values can be received.
        const RECV = 0b10;
        /// Bidirectional channel.
        const BOTH = Self::SEND.bits() | Self::RECV.bits();
    }
}

impl ChanDir {
    /// True for `chan<- T`.
    pub fn is_send_only(self) -> bool {
        self == ChanDir::SEND
    }

    /// True for `<-chan T`.
    pub fn is_recv_only(self) -> bool {
        self == ChanDir::RECV
    }
}

// ============================================================================
// Composite types
// ============================================================================

/// A function signature. Parameters and results are variable objects so
/// named results keep their names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signature {
    /// Receiver variable for methods.
    pub recv: Option<ObjectId>,
    /// Parameter variables in order.
    pub params: Vec<ObjectId>,
    /// Result variables in order (unnamed results have an empty name).
    pub results: Vec<ObjectId>,
    /// Whether the last parameter is variadic.
    pub variadic: bool,
}

/// A struct type. Fields are field objects; `tags[i]` belongs to `fields[i]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructType {
    pub fields: Vec<ObjectId>,
    pub tags: Vec<String>,
}

impl StructType {
    /// Tag of field `index`, empty when absent.
    pub fn tag(&self, index: usize) -> &str {
        self.tags.get(index).map(String::as_str).unwrap_or("")
    }
}

/// An interface type with its method objects.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InterfaceType {
    pub methods: Vec<ObjectId>,
}

/// A defined (named) type.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedType {
    /// The type name object.
    pub obj: ObjectId,
    /// Underlying type; `None` only while the oracle is still building a
    /// recursive declaration.
    pub underlying: Option<TypeId>,
    /// Methods declared on the type (value and pointer receivers).
    pub methods: Vec<ObjectId>,
}

/// A source-language type.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Basic(BasicKind),
    Named(NamedType),
    Pointer(TypeId),
    Slice(TypeId),
    Array { elem: TypeId, len: u64 },
    Map { key: TypeId, value: TypeId },
    Chan { elem: TypeId, dir: ChanDir },
    Signature(Signature),
    Struct(StructType),
    Interface(InterfaceType),
    /// Multiple results of a call.
    Tuple(Vec<TypeId>),
}

// ============================================================================
// TypeTable
// ============================================================================

/// Arena of types for one compilation unit.
#[derive(Debug, Default)]
pub struct TypeTable {
    types: Vec<Type>,
    basics: FxHashMap<BasicKind, TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type and return its id.
    pub fn add(&mut self, ty: Type) -> TypeId {
        let id = TypeId::new(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    /// The shared id for a basic kind.
    pub fn basic(&mut self, kind: BasicKind) -> TypeId {
        if let Some(&id) = self.basics.get(&kind) {
            return id;
        }
        let id = self.add(Type::Basic(kind));
        self.basics.insert(kind, id);
        id
    }

    /// Look up a type.
    ///
    /// Ids are only minted by this table, so lookup cannot miss for ids of
    /// the same unit.
    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index() as usize]
    }

    /// Number of types in the table.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Set the underlying type of a named type.
    pub fn set_underlying(&mut self, named: TypeId, underlying: TypeId) {
        if let Type::Named(n) = &mut self.types[named.index() as usize] {
            n.underlying = Some(underlying);
        }
    }

    /// Attach a method object to a named type.
    pub fn add_method(&mut self, named: TypeId, method: ObjectId) {
        if let Type::Named(n) = &mut self.types[named.index() as usize] {
            n.methods.push(method);
        }
    }

    /// Follow named types down to their underlying type.
    pub fn underlying(&self, mut id: TypeId) -> TypeId {
        // Named chains are short; the bound guards against a malformed cycle.
        for _ in 0..64 {
            match self.get(id) {
                Type::Named(NamedType {
                    underlying: Some(u),
                    ..
                }) => id = *u,
                _ => return id,
            }
        }
        id
    }

    /// The underlying type itself.
    pub fn underlying_type(&self, id: TypeId) -> &Type {
        self.get(self.underlying(id))
    }

    /// The named type record, if `id` is a named type.
    pub fn named(&self, id: TypeId) -> Option<&NamedType> {
        match self.get(id) {
            Type::Named(n) => Some(n),
            _ => None,
        }
    }

    /// Pointer element, if `id` is (underlying) a pointer.
    pub fn pointer_elem(&self, id: TypeId) -> Option<TypeId> {
        match self.underlying_type(id) {
            Type::Pointer(elem) => Some(*elem),
            _ => None,
        }
    }

    /// Underlying signature, if `id` is a function type.
    pub fn signature(&self, id: TypeId) -> Option<&Signature> {
        match self.underlying_type(id) {
            Type::Signature(sig) => Some(sig),
            _ => None,
        }
    }

    pub fn is_struct(&self, id: TypeId) -> bool {
        matches!(self.underlying_type(id), Type::Struct(_))
    }

    pub fn is_array(&self, id: TypeId) -> bool {
        matches!(self.underlying_type(id), Type::Array { .. })
    }

    pub fn is_interface(&self, id: TypeId) -> bool {
        matches!(self.underlying_type(id), Type::Interface(_))
    }

    pub fn basic_kind(&self, id: TypeId) -> Option<BasicKind> {
        match self.underlying_type(id) {
            Type::Basic(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Whether values of this type need a typed wrapper to carry methods.
    ///
    /// Structs are tables that already carry a metatable; basic values,
    /// arrays, channels, maps and functions are bare in the target and must
    /// be wrapped before a method can be dispatched on them.
    pub fn is_wrapped(&self, id: TypeId) -> bool {
        match self.underlying_type(id) {
            Type::Basic(kind) => {
                !kind.is_64bit() && !kind.is_complex() && *kind != BasicKind::UntypedNil
            }
            Type::Array { .. } | Type::Chan { .. } | Type::Map { .. } | Type::Signature(_) => {
                true
            }
            Type::Pointer(elem) => self.is_array(*elem),
            _ => false,
        }
    }

    /// Structural identity. Named types are identical only to themselves.
    pub fn identical(&self, objects: &ObjectTable, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        match (self.get(a), self.get(b)) {
            (Type::Basic(x), Type::Basic(y)) => x == y,
            (Type::Named(x), Type::Named(y)) => x.obj == y.obj,
            (Type::Pointer(x), Type::Pointer(y)) | (Type::Slice(x), Type::Slice(y)) => {
                self.identical(objects, *x, *y)
            }
            (Type::Array { elem: e1, len: l1 }, Type::Array { elem: e2, len: l2 }) => {
                l1 == l2 && self.identical(objects, *e1, *e2)
            }
            (Type::Map { key: k1, value: v1 }, Type::Map { key: k2, value: v2 }) => {
                self.identical(objects, *k1, *k2) && self.identical(objects, *v1, *v2)
            }
            (Type::Chan { elem: e1, dir: d1 }, Type::Chan { elem: e2, dir: d2 }) => {
                d1 == d2 && self.identical(objects, *e1, *e2)
            }
            (Type::Signature(s1), Type::Signature(s2)) => {
                s1.variadic == s2.variadic
                    && self.identical_vars(objects, &s1.params, &s2.params, false)
                    && self.identical_vars(objects, &s1.results, &s2.results, false)
            }
            (Type::Struct(s1), Type::Struct(s2)) => {
                s1.tags == s2.tags
                    && s1.fields.len() == s2.fields.len()
                    && s1.fields.iter().zip(&s2.fields).all(|(f1, f2)| {
                        let (o1, o2) = (objects.get(*f1), objects.get(*f2));
                        o1.embedded == o2.embedded && o1.name == o2.name
                    })
                    && self.identical_vars(objects, &s1.fields, &s2.fields, true)
            }
            (Type::Interface(i1), Type::Interface(i2)) => {
                self.identical_vars(objects, &i1.methods, &i2.methods, true)
            }
            (Type::Tuple(t1), Type::Tuple(t2)) => {
                t1.len() == t2.len()
                    && t1
                        .iter()
                        .zip(t2)
                        .all(|(x, y)| self.identical(objects, *x, *y))
            }
            _ => false,
        }
    }

    fn identical_vars(
        &self,
        objects: &ObjectTable,
        a: &[ObjectId],
        b: &[ObjectId],
        compare_names: bool,
    ) -> bool {
        a.len() == b.len()
            && a.iter().zip(b).all(|(x, y)| {
                let (ox, oy) = (objects.get(*x), objects.get(*y));
                if compare_names && ox.name != oy.name {
                    return false;
                }
                match (ox.ty, oy.ty) {
                    (Some(tx), Some(ty)) => self.identical(objects, tx, ty),
                    (None, None) => true,
                    _ => false,
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Object, ObjectKind};

    #[test]
    fn basic_ids_are_shared() {
        let mut types = TypeTable::new();
        let a = types.basic(BasicKind::Int);
        let b = types.basic(BasicKind::Int);
        assert_eq!(a, b);
        assert_ne!(a, types.basic(BasicKind::String));
    }

    #[test]
    fn basic_kind_codes_roundtrip() {
        let code: u8 = BasicKind::Float64.into();
        assert_eq!(BasicKind::try_from(code), Ok(BasicKind::Float64));
        assert!(BasicKind::try_from(0u8).is_err());
    }

    #[test]
    fn anonymous_slices_are_structurally_identical() {
        let objects = ObjectTable::new();
        let mut types = TypeTable::new();
        let int = types.basic(BasicKind::Int);
        let a = types.add(Type::Slice(int));
        let b = types.add(Type::Slice(int));
        assert_ne!(a, b);
        assert!(types.identical(&objects, a, b));
    }

    #[test]
    fn named_types_are_nominal() {
        let mut objects = ObjectTable::new();
        let mut types = TypeTable::new();
        let int = types.basic(BasicKind::Int);
        let a_obj = objects.add(Object::new("A", ObjectKind::TypeName));
        let b_obj = objects.add(Object::new("B", ObjectKind::TypeName));
        let a = types.add(Type::Named(NamedType {
            obj: a_obj,
            underlying: Some(int),
            methods: vec![],
        }));
        let b = types.add(Type::Named(NamedType {
            obj: b_obj,
            underlying: Some(int),
            methods: vec![],
        }));
        assert!(!types.identical(&objects, a, b));
        assert_eq!(types.underlying(a), int);
    }

    #[test]
    fn chan_direction_flags() {
        assert!(ChanDir::SEND.is_send_only());
        assert!(ChanDir::RECV.is_recv_only());
        assert!(!ChanDir::BOTH.is_send_only());
        assert!(ChanDir::BOTH.contains(ChanDir::RECV));
    }

    #[test]
    fn wrapped_types() {
        let mut types = TypeTable::new();
        let int = types.basic(BasicKind::Int);
        let i64t = types.basic(BasicKind::Int64);
        let arr = types.add(Type::Array { elem: int, len: 3 });
        let ptr_arr = types.add(Type::Pointer(arr));
        let strukt = types.add(Type::Struct(StructType::default()));
        assert!(types.is_wrapped(int));
        assert!(!types.is_wrapped(i64t));
        assert!(types.is_wrapped(arr));
        assert!(types.is_wrapped(ptr_arr));
        assert!(!types.is_wrapped(strukt));
    }
}
