//! Compiled package archives.

use std::collections::BTreeMap;

/// How a method's receiver is represented, which decides where the method
/// table entry lives and whether a pointer wrapper is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiverForm {
    /// Receiver is a struct or a pointer to a struct.
    Struct,
    /// Receiver is a pointer to an array type.
    PointerToArray,
    /// Receiver is a pointer to any other type.
    Pointer,
    /// Receiver is a non-struct value.
    Value,
}

impl ReceiverForm {
    /// The kind tag passed to the runtime method registry.
    pub fn registry_kind(self) -> &'static str {
        match self {
            ReceiverForm::Struct => "struct",
            ReceiverForm::PointerToArray => "ptr_array",
            ReceiverForm::Pointer => "ptr",
            ReceiverForm::Value => "value",
        }
    }
}

/// One entry of a package's method table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodEntry {
    /// Generated identifier of the receiver's named type.
    pub type_name: String,
    /// Source method name.
    pub method: String,
    pub form: ReceiverForm,
    /// Target expression that refers to the primary implementation.
    pub func_ref: String,
}

/// One translated package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    pub import_path: String,
    /// Package name (the default binding name for importers).
    pub name: String,
    /// Import paths this package depends on.
    pub imports: Vec<String>,
    /// Generated target source.
    pub code: String,
    /// Source identifier to generated identifier for exported members.
    pub exports: BTreeMap<String, String>,
    /// External objects referenced by the code, as sorted `pkgpath.Name`.
    pub dependencies: Vec<String>,
    pub methods: Vec<MethodEntry>,
}

impl Archive {
    pub fn new(import_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            import_path: import_path.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Generated identifier for an exported source name.
    pub fn export(&self, source_name: &str) -> Option<&str> {
        self.exports.get(source_name).map(String::as_str)
    }

    /// Method table lookup by `(type, name)`.
    pub fn find_method(&self, type_name: &str, method: &str) -> Option<&MethodEntry> {
        self.methods
            .iter()
            .find(|m| m.type_name == type_name && m.method == method)
    }
}
