//! Identifier types handed out by the semantic oracle.
//!
//! Every AST node that the oracle annotates carries a [`NodeId`]; resolved
//! entities live in the [`ObjectTable`](crate::ObjectTable) under an
//! [`ObjectId`]; types live in the [`TypeTable`](crate::TypeTable) under a
//! [`TypeId`]. All three are plain indices so they are `Copy` and hash cheaply.

use std::fmt;

macro_rules! index_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Create an identifier from a raw index.
            #[inline]
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            /// Get the underlying index.
            #[inline]
            pub const fn index(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl From<u32> for $name {
            fn from(index: u32) -> Self {
                Self::new(index)
            }
        }
    };
}

index_id!(
    /// Identifies one AST node for oracle lookups (types, definitions, uses).
    NodeId,
    "node_"
);

index_id!(
    /// Identifies a semantic object (variable, function, type name, field...).
    ObjectId,
    "obj_"
);

index_id!(
    /// Identifies a type in the [`TypeTable`](crate::TypeTable).
    TypeId,
    "type_"
);
