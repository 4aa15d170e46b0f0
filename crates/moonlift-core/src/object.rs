//! Semantic objects: the named entities the oracle resolves identifiers to.

use crate::ids::{ObjectId, TypeId};
use crate::span::Span;

/// What kind of entity an object is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// A variable, parameter, named result, or receiver.
    Var,
    /// A struct field.
    Field,
    /// A function or method.
    Func,
    /// A type name.
    TypeName,
    /// A named constant.
    Const,
    /// A statement label.
    Label,
    /// An imported package name.
    PkgName,
    /// A predeclared builtin function (`len`, `append`, ...).
    Builtin,
    /// The predeclared `nil`.
    Nil,
}

/// Where an object is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScopeLevel {
    /// Predeclared identifiers.
    Universe,
    /// Package-level declarations.
    Package,
    /// Function-local declarations.
    #[default]
    Local,
}

/// A resolved source-level entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    /// Source identifier (empty for unnamed params and results, `_` for blank).
    pub name: String,
    pub kind: ObjectKind,
    /// Declared type, when the oracle has one.
    pub ty: Option<TypeId>,
    /// Import path of the declaring package (`None` for universe objects).
    pub pkg: Option<String>,
    pub level: ScopeLevel,
    /// Embedded struct field.
    pub embedded: bool,
    /// For package names: the import path the name refers to.
    pub imported: Option<String>,
    pub span: Span,
}

impl Object {
    /// A local object with no type, package, or position.
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ty: None,
            pkg: None,
            level: ScopeLevel::Local,
            embedded: false,
            imported: None,
            span: Span::default(),
        }
    }

    pub fn with_type(mut self, ty: TypeId) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_pkg(mut self, pkg: impl Into<String>) -> Self {
        self.pkg = Some(pkg.into());
        self
    }

    pub fn with_level(mut self, level: ScopeLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    /// Exported identifiers start with an uppercase letter.
    pub fn exported(&self) -> bool {
        self.name.chars().next().is_some_and(char::is_uppercase)
    }

    /// The blank identifier or an unnamed parameter/result.
    pub fn is_blank(&self) -> bool {
        self.name.is_empty() || self.name == "_"
    }

    /// Declared at package level.
    pub fn is_package_level(&self) -> bool {
        self.level == ScopeLevel::Package
    }
}

/// Arena of objects for one compilation unit.
#[derive(Debug, Default)]
pub struct ObjectTable {
    objects: Vec<Object>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object: Object) -> ObjectId {
        let id = ObjectId::new(self.objects.len() as u32);
        self.objects.push(object);
        id
    }

    /// Look up an object minted by this table.
    pub fn get(&self, id: ObjectId) -> &Object {
        &self.objects[id.index() as usize]
    }

    pub fn get_mut(&mut self, id: ObjectId) -> &mut Object {
        &mut self.objects[id.index() as usize]
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, o)| (ObjectId::new(i as u32), o))
    }
}
