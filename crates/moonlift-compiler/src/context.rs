//! Translation state.
//!
//! [`PackageContext`] lives for one compilation unit: it owns the package
//! name scope, the object-to-identifier cache, import bindings, type
//! descriptors and collected diagnostics. [`FuncContext`] lives for one
//! function body and is discarded once the body's code is produced.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use tracing::trace;

use moonlift_core::{
    CompilationError, Diagnostics, NodeId, ObjectId, ObjectKind, Result, ScopeLevel, Selection,
    SemanticInfo, Signature, Span,
};
use moonlift_registry::{ArchiveSource, ImportContext, UNSAFE_PATH};

use crate::analysis::BodyFacts;
use crate::emit::CodeWriter;
use crate::flow::FlowTable;
use crate::machine::CaseBuilder;
use crate::naming::NameTable;
use crate::options::CompilerOptions;
use crate::typedesc::TypeDescriptors;

// ============================================================================
// PackageContext
// ============================================================================

/// State shared by every function of one compilation unit.
pub struct PackageContext<'a> {
    pub info: &'a SemanticInfo,
    pub options: &'a CompilerOptions,
    pub pkg_path: String,
    pub pkg_name: String,
    pub imports: ImportContext<'a>,
    /// `(import path, binding)` in binding order.
    import_vars: Vec<(String, String)>,
    /// Package-level identifiers.
    pub scope: NameTable,
    object_names: FxHashMap<ObjectId, String>,
    dependencies: BTreeSet<String>,
    pub descriptors: TypeDescriptors,
    synthesized: FxHashMap<NodeId, Selection>,
    pub diagnostics: Diagnostics,
}

impl<'a> PackageContext<'a> {
    pub fn new(
        info: &'a SemanticInfo,
        options: &'a CompilerOptions,
        pkg_path: &str,
        pkg_name: &str,
        source: &'a dyn ArchiveSource,
    ) -> Self {
        Self {
            info,
            options,
            pkg_path: pkg_path.to_string(),
            pkg_name: pkg_name.to_string(),
            imports: ImportContext::new(source),
            import_vars: Vec::new(),
            scope: NameTable::new(),
            object_names: FxHashMap::default(),
            dependencies: BTreeSet::new(),
            descriptors: TypeDescriptors::default(),
            synthesized: FxHashMap::default(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// `<runtime>.<member>`.
    pub fn rt(&self, member: &str) -> String {
        self.options.rt(member)
    }

    /// The identifier already assigned to `obj`, if any.
    pub fn cached_name(&self, obj: ObjectId) -> Option<&str> {
        self.object_names.get(&obj).map(String::as_str)
    }

    /// Pin `obj` to `name` for the rest of the unit.
    pub fn set_name(&mut self, obj: ObjectId, name: String) {
        self.object_names.insert(obj, name);
    }

    /// The recorded import failure as a compilation error.
    pub fn import_error(&self) -> CompilationError {
        match self.imports.error() {
            Some(err) => err.clone().into(),
            None => CompilationError::internal("import failed without recording an error"),
        }
    }

    /// Bind an import declaration to a package-level local.
    pub fn bind_import(&mut self, path: &str, name: &str) -> Result<Option<String>> {
        if self.imports.import(path).is_none() {
            return Err(self.import_error());
        }
        if path == UNSAFE_PATH {
            return Ok(None);
        }
        if let Some((_, var)) = self.import_vars.iter().find(|(p, _)| p == path) {
            return Ok(Some(var.clone()));
        }
        let var = self.scope.allocate(name);
        self.import_vars.push((path.to_string(), var.clone()));
        Ok(Some(var))
    }

    /// The local bound to the package at `path`, binding it on first use.
    pub fn import_var(&mut self, path: &str) -> Result<String> {
        if let Some((_, var)) = self.import_vars.iter().find(|(p, _)| p == path) {
            return Ok(var.clone());
        }
        let Some(archive) = self.imports.import(path) else {
            return Err(self.import_error());
        };
        let name = archive.name.clone();
        match self.bind_import(path, &name)? {
            Some(var) => Ok(var),
            None => Err(CompilationError::ImportFailure {
                path: path.to_string(),
                reason: "package has no runtime binding".to_string(),
            }),
        }
    }

    pub fn import_bindings(&self) -> &[(String, String)] {
        &self.import_vars
    }

    /// External objects referenced so far, as sorted `path.Name`.
    pub fn dependencies(&self) -> Vec<String> {
        self.dependencies.iter().cloned().collect()
    }

    /// Identifier for an object that is not function-local.
    ///
    /// Package members get a package-scope identifier; members of other
    /// packages resolve through the importing package's binding and the
    /// exporter's symbol table.
    pub fn global_name(&mut self, obj: ObjectId) -> Result<String> {
        if let Some(name) = self.object_names.get(&obj) {
            return Ok(name.clone());
        }
        let info = self.info;
        let object = info.object(obj);
        let name = match (object.kind, object.level) {
            (ObjectKind::PkgName, _) => {
                let path = object.imported.clone().ok_or_else(|| {
                    CompilationError::semantic_gap(
                        format!("import path of `{}`", object.name),
                        object.span,
                    )
                })?;
                self.import_var(&path)?
            }
            (ObjectKind::Nil, _) => "nil".to_string(),
            (_, ScopeLevel::Universe) => match object.name.as_str() {
                "true" | "false" | "nil" => object.name.clone(),
                other => {
                    return Err(CompilationError::unsupported(
                        format!("predeclared `{other}` as a value"),
                        object.span,
                    ));
                }
            },
            (_, ScopeLevel::Package) => match object.pkg.as_deref() {
                Some(path) if path != self.pkg_path => {
                    let path = path.to_string();
                    let var = self.import_var(&path)?;
                    let Some(generated) = self.imports.resolve_export(&path, &object.name) else {
                        return Err(self.import_error());
                    };
                    self.dependencies.insert(format!("{path}.{}", object.name));
                    format!("{var}.{generated}")
                }
                _ => {
                    let base = if object.is_blank() { "blank" } else { &object.name };
                    self.scope.allocate(base)
                }
            },
            (_, ScopeLevel::Local) => {
                return Err(CompilationError::internal(format!(
                    "local `{}` referenced outside any function",
                    object.name
                )));
            }
        };
        trace!(object = %obj, name = %name, "assigned package identifier");
        if !object.is_blank() || object.kind == ObjectKind::PkgName {
            self.object_names.insert(obj, name.clone());
        }
        Ok(name)
    }

    /// Oracle selection for a selector node, or one computed earlier.
    pub fn selection(&self, node: NodeId) -> Option<&Selection> {
        self.info
            .selection(node)
            .or_else(|| self.synthesized.get(&node))
    }

    pub fn cache_selection(&mut self, node: NodeId, selection: Selection) {
        self.synthesized.insert(node, selection);
    }

    /// Record a function-level error and keep going.
    pub fn report(&mut self, error: CompilationError) {
        tracing::warn!(error = %error, "function skipped");
        self.diagnostics.push(error);
    }
}

// ============================================================================
// FuncContext
// ============================================================================

/// State for translating one function body.
pub struct FuncContext<'p> {
    parent: Option<&'p FuncContext<'p>>,
    pub names: NameTable,
    /// Hoisted locals, declared once at the top of the function.
    pub locals: Vec<String>,
    /// Formal parameters in order.
    pub params: Vec<String>,
    pub flow: FlowTable,
    pub out: CodeWriter,
    /// Lines emitted at the start of the next case to be opened.
    pub delayed: Vec<String>,
    /// Position of the statement being translated.
    pub pos: Span,
    pub sig: Signature,
    pub facts: BodyFacts,
    /// Lvalue text of each named result; empty when results are unnamed.
    pub results: Vec<String>,
    /// Expression that identifies this function to the frame store.
    pub frame_ref: String,
    /// Present when the body is flattened.
    pub machine: Option<CaseBuilder>,
    gensym: u32,
}

impl<'p> FuncContext<'p> {
    /// Context for a top-level function or method.
    pub fn new(names: NameTable, sig: Signature, facts: BodyFacts, frame_ref: String) -> Self {
        let machine = facts.needs_flattening().then(CaseBuilder::new);
        Self {
            parent: None,
            names,
            locals: Vec::new(),
            params: Vec::new(),
            flow: FlowTable::new(),
            out: CodeWriter::new(),
            delayed: Vec::new(),
            pos: Span::default(),
            sig,
            facts,
            results: Vec::new(),
            frame_ref,
            machine,
            gensym: 0,
        }
    }

    /// Context for a function literal inside `parent`. The literal sees a
    /// copy of the parent's names; nothing flows back.
    pub fn nested(
        parent: &'p FuncContext<'p>,
        sig: Signature,
        facts: BodyFacts,
        frame_ref: String,
    ) -> Self {
        let mut ctx = Self::new(parent.names.clone(), sig, facts, frame_ref);
        ctx.parent = Some(parent);
        ctx
    }

    /// Closure nesting depth; zero for top-level functions.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent;
        while let Some(ctx) = current {
            depth += 1;
            current = ctx.parent;
        }
        depth
    }

    pub fn is_flattened(&self) -> bool {
        self.machine.is_some()
    }

    pub fn has_defer(&self) -> bool {
        self.facts.has_defer
    }

    pub fn next_symbol(&mut self) -> u32 {
        self.gensym += 1;
        self.gensym
    }

    /// A function-unique `goto` label.
    pub fn label(&mut self, base: &str) -> String {
        let n = self.next_symbol();
        format!("__{base}_{n}")
    }

    /// Allocate a hoisted local.
    pub fn local(&mut self, base: &str) -> String {
        let name = self.names.allocate(base);
        self.locals.push(name.clone());
        name
    }

    /// Allocate a parameter name.
    pub fn param(&mut self, base: &str) -> String {
        let name = self.names.allocate(base);
        self.params.push(name.clone());
        name
    }
}
