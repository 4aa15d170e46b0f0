//! Runtime type descriptors.
//!
//! Every type the generated code needs at run time (for zero values,
//! conversions, interface boxing, composite literals) is referenced through
//! a descriptor. Basic and universe types are fields of `__rt.types`; named
//! types are package locals created by `__rt.types.named` and initialized
//! with their underlying structure; anonymous composite types get one
//! package-level `__type_N` each, shared by all structurally identical
//! occurrences.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;
use tracing::trace;

use moonlift_core::{
    BasicKind, CompilationError, ObjectId, Result, ScopeLevel, SemanticInfo, Span, Type, TypeHash,
    TypeId,
};

use crate::context::PackageContext;
use crate::emit::{prefix, quote};
use crate::naming::field_name;

/// Memo table of anonymous descriptors, bucketed by structural hash.
#[derive(Debug, Default)]
pub struct TypeDescriptors {
    buckets: FxHashMap<TypeHash, Vec<(TypeId, String)>>,
    anonymous: Vec<(String, String)>,
}

impl TypeDescriptors {
    /// `(binding, constructor)` pairs in creation order. A descriptor is
    /// always created after the descriptors it refers to.
    pub fn anonymous(&self) -> &[(String, String)] {
        &self.anonymous
    }

    pub fn len(&self) -> usize {
        self.anonymous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anonymous.is_empty()
    }

    fn find(&self, hash: TypeHash, ty: TypeId, info: &SemanticInfo) -> Option<String> {
        self.buckets.get(&hash).and_then(|bucket| {
            bucket
                .iter()
                .find(|(other, _)| info.types.identical(&info.objects, *other, ty))
                .map(|(_, name)| name.clone())
        })
    }
}

/// Declaration of a named type of the package being compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedTypeDecl {
    pub name: String,
    /// `T = __rt.types.named(...)`.
    pub decl: String,
    /// `T:init(...)`, absent for types over a basic kind.
    pub init: Option<String>,
}

impl PackageContext<'_> {
    /// Descriptor expression for `ty`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn type_desc(&mut self, ty: TypeId) -> Result<String> {
        let info = self.info;
        match info.types.get(ty) {
            Type::Basic(BasicKind::UntypedNil) => Ok(self.rt("types.untyped_nil")),
            Type::Basic(kind) => Ok(self.rt(&format!("types.{}", kind.name()))),
            Type::Named(named) => {
                let object = info.object(named.obj);
                if object.level == ScopeLevel::Universe {
                    Ok(self.rt(&format!("types.{}", object.name)))
                } else {
                    self.global_name(named.obj)
                }
            }
            Type::Tuple(_) => Err(CompilationError::unsupported(
                "multiple values used as a single type",
                Span::default(),
            )),
            _ => self.anonymous_desc(ty),
        }
    }

    fn anonymous_desc(&mut self, ty: TypeId) -> Result<String> {
        let info = self.info;
        let hash = TypeHash::of(&info.types, &info.objects, ty);
        if let Some(name) = self.descriptors.find(hash, ty, info) {
            return Ok(name);
        }
        let (ctor, args) = self.type_ctor(ty)?;
        let name = format!("__type_{}", self.descriptors.len() + 1);
        let value = format!("{}({args})", self.rt(&format!("types.{ctor}")));
        trace!(name = %name, descriptor = %value, "new type descriptor");
        self.descriptors.anonymous.push((name.clone(), value));
        self.descriptors
            .buckets
            .entry(hash)
            .or_default()
            .push((ty, name.clone()));
        Ok(name)
    }

    fn var_desc(&mut self, var: ObjectId) -> Result<String> {
        let object = self.info.object(var);
        let ty = object.ty.ok_or_else(|| {
            CompilationError::semantic_gap(format!("type of `{}`", object.name), object.span)
        })?;
        self.type_desc(ty)
    }

    /// Constructor name and arguments describing a composite type.
    fn type_ctor(&mut self, ty: TypeId) -> Result<(&'static str, String)> {
        let info = self.info;
        let ctor = match info.types.get(ty) {
            Type::Array { elem, len } => ("array", format!("{}, {len}", self.type_desc(*elem)?)),
            Type::Chan { elem, dir } => (
                "chan",
                format!(
                    "{}, {}, {}",
                    self.type_desc(*elem)?,
                    dir.is_send_only(),
                    dir.is_recv_only()
                ),
            ),
            Type::Map { key, value } => (
                "map",
                format!("{}, {}", self.type_desc(*key)?, self.type_desc(*value)?),
            ),
            Type::Pointer(elem) => ("ptr", self.type_desc(*elem)?),
            Type::Slice(elem) => ("slice", self.type_desc(*elem)?),
            Type::Signature(sig) => {
                let params = sig
                    .params
                    .iter()
                    .map(|p| self.var_desc(*p))
                    .collect::<Result<Vec<_>>>()?;
                let results = sig
                    .results
                    .iter()
                    .map(|r| self.var_desc(*r))
                    .collect::<Result<Vec<_>>>()?;
                (
                    "func",
                    format!(
                        "{{{}}}, {{{}}}, {}",
                        params.join(", "),
                        results.join(", "),
                        sig.variadic
                    ),
                )
            }
            Type::Struct(st) => {
                let mut fields = Vec::with_capacity(st.fields.len());
                for (i, field) in st.fields.iter().enumerate() {
                    let object = info.object(*field);
                    let typ = self.var_desc(*field)?;
                    fields.push(format!(
                        "{{prop = {}, name = {}, embedded = {}, exported = {}, pkg = {}, typ = {typ}, tag = {}}}",
                        quote(&field_name(&object.name)),
                        quote(&object.name),
                        object.embedded,
                        object.exported(),
                        quote(self.qualifier(*field)),
                        quote(st.tag(i)),
                    ));
                }
                (
                    "struct",
                    format!("{}, {{{}}}", quote(&self.pkg_path), fields.join(", ")),
                )
            }
            Type::Interface(it) => {
                let mut methods = Vec::with_capacity(it.methods.len());
                for method in &it.methods {
                    let object = info.object(*method);
                    let typ = self.var_desc(*method)?;
                    methods.push(format!(
                        "{{prop = {}, name = {}, pkg = {}, typ = {typ}}}",
                        quote(&field_name(&object.name)),
                        quote(&object.name),
                        quote(self.qualifier(*method)),
                    ));
                }
                ("interface", format!("{{{}}}", methods.join(", ")))
            }
            Type::Basic(_) | Type::Named(_) | Type::Tuple(_) => {
                return Err(CompilationError::internal(format!(
                    "{ty} has no composite descriptor"
                )));
            }
        };
        Ok(ctor)
    }

    /// Owning package of an unexported member, empty for exported ones.
    fn qualifier(&self, member: ObjectId) -> &str {
        let object = self.info.object(member);
        if object.exported() {
            ""
        } else {
            object.pkg.as_deref().unwrap_or("")
        }
    }

    /// Declaration and initialization of a named type of this package.
    pub fn named_type_decl(&mut self, named: TypeId) -> Result<NamedTypeDecl> {
        let info = self.info;
        let record = info
            .types
            .named(named)
            .ok_or_else(|| CompilationError::internal(format!("{named} is not a named type")))?;
        let object = info.object(record.obj);
        let underlying = record.underlying.ok_or_else(|| {
            CompilationError::semantic_gap(
                format!("underlying type of `{}`", object.name),
                object.span,
            )
        })?;
        let name = self.global_name(record.obj)?;
        let base = info.types.underlying(underlying);
        let (kind, args) = match info.types.get(base) {
            Type::Basic(kind) => (kind.name(), None),
            _ => {
                let (ctor, args) = self.type_ctor(base)?;
                (ctor, Some(args))
            }
        };
        Ok(NamedTypeDecl {
            decl: format!(
                "{name} = {}({}, {}, {})",
                self.rt("types.named"),
                quote(&self.pkg_path),
                quote(&object.name),
                quote(kind)
            ),
            init: args.map(|args| format!("{name}:init({args})")),
            name,
        })
    }

    /// Zero value of `ty` as an expression.
    pub fn zero_value(&mut self, ty: TypeId) -> Result<String> {
        let info = self.info;
        Ok(match info.types.underlying_type(ty) {
            Type::Basic(BasicKind::Bool) => "false".to_string(),
            Type::Basic(BasicKind::String) => "\"\"".to_string(),
            Type::Basic(kind) if kind.is_numeric() => "0".to_string(),
            Type::Struct(_) | Type::Array { .. } => {
                format!("{}:zero()", prefix(&self.type_desc(ty)?))
            }
            _ => "nil".to_string(),
        })
    }
}

/// Initialization order for named types: a type whose values contain
/// another named type by value is initialized after it. Cycles keep
/// declaration order.
pub fn init_order(info: &SemanticInfo, named: &[TypeId]) -> Vec<usize> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..named.len()).map(|i| graph.add_node(i)).collect();
    let index: FxHashMap<TypeId, usize> = named.iter().enumerate().map(|(i, t)| (*t, i)).collect();

    for (i, ty) in named.iter().enumerate() {
        let mut deps = Vec::new();
        if let Some(underlying) = info.types.named(*ty).and_then(|n| n.underlying) {
            contained_by_value(info, underlying, &mut deps);
        }
        for dep in deps {
            if let Some(&j) = index.get(&dep) {
                if j != i {
                    graph.update_edge(nodes[j], nodes[i], ());
                }
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => order.into_iter().map(|n| graph[n]).collect(),
        Err(_) => (0..named.len()).collect(),
    }
}

fn contained_by_value(info: &SemanticInfo, ty: TypeId, out: &mut Vec<TypeId>) {
    match info.types.get(ty) {
        Type::Named(_) => out.push(ty),
        Type::Array { elem, .. } => contained_by_value(info, *elem, out),
        Type::Struct(st) => {
            for field in &st.fields {
                if let Some(field_ty) = info.object(*field).ty {
                    contained_by_value(info, field_ty, out);
                }
            }
        }
        _ => {}
    }
}
