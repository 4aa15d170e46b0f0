//! Package assembly: one oracle-typed package in, one [`Archive`] out.
//!
//! The generated chunk is laid out as
//!
//! ```text
//! local __rt = require("moonlift.runtime")
//! local __pkg = {}
//! local fmt = __rt.import("fmt")        -- import bindings
//! local Point, Origin, Dist              -- package-level identifiers
//! Point = __rt.types.named(...)          -- named types
//! local __type_1 = __rt.types.slice(...) -- anonymous descriptors
//! Point:init(...)                        -- named type structure, dependencies first
//! Dist = function(...) ... end           -- functions and methods, source order
//! Origin = Point.new({...})              -- package variables, source order
//! init()                                 -- package init functions
//! __pkg.Point = Point                    -- exports
//! return __pkg
//! ```
//!
//! Functions come before variable initializers so an initializer may call
//! any function of the package.

use tracing::debug;

use moonlift_core::ast::{Decl, FuncDecl, Package, ValueDecl};
use moonlift_core::{
    CompilationError, Diagnostics, ObjectId, ObjectKind, Result, SemanticInfo, Signature, TypeId,
};
use moonlift_registry::{Archive, ArchiveSource, MethodEntry};

use crate::analysis::BodyFacts;
use crate::context::{FuncContext, PackageContext};
use crate::emit::{CodeWriter, quote};
use crate::expr::LValue;
use crate::function::{FunctionTranslator, signature_of, translate_decl};
use crate::machine::StateMachine;
use crate::methods::{native_stub, translate_method};
use crate::options::CompilerOptions;
use crate::typedesc::init_order;

/// Generated code for one function or method declaration.
#[derive(Debug, Clone)]
pub struct FunctionChunk {
    /// `Name` for functions, `Type.Name` for methods.
    pub name: String,
    /// Target expression the function is assigned to.
    pub func_ref: String,
    /// Assignment of the function, plus wrappers and registration for
    /// methods.
    pub code: String,
    /// Case graph of a flattened body.
    pub machine: Option<StateMachine>,
}

/// The result of compiling one package.
#[derive(Debug)]
pub struct CompiledPackage {
    pub archive: Archive,
    /// Every successfully translated function, in source order.
    pub functions: Vec<FunctionChunk>,
    /// Function-level errors, in the order they were found. The
    /// corresponding declarations are missing from the output.
    pub diagnostics: Diagnostics,
}

impl CompiledPackage {
    pub fn function(&self, name: &str) -> Option<&FunctionChunk> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Compile `package` against the archives visible through `source`.
///
/// Function-level errors are collected in
/// [`CompiledPackage::diagnostics`]; import failures and internal errors
/// abort the unit.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn compile_package<'a>(
    package: &Package<'_>,
    info: &'a SemanticInfo,
    options: &'a CompilerOptions,
    source: &'a dyn ArchiveSource,
) -> Result<CompiledPackage> {
    let mut pkg = PackageContext::new(info, options, package.path, package.name, source);
    pkg.scope.reserve(options.runtime_local.clone());

    let mut imports = Vec::with_capacity(package.imports.len());
    for import in package.imports {
        let name = import
            .alias
            .map(|alias| alias.name)
            .or_else(|| info.defs.get(&import.id).map(|o| info.object(*o).name.as_str()))
            .filter(|name| !matches!(*name, "_" | "."))
            .unwrap_or_else(|| import.path.rsplit('/').next().unwrap_or(import.path));
        pkg.bind_import(import.path, name)?;
        imports.push(import.path.to_string());
    }

    let declared = declare_package_names(&mut pkg, package)?;
    let mut type_decls = Vec::with_capacity(declared.types.len());
    for ty in &declared.types {
        type_decls.push(pkg.named_type_decl(*ty)?);
    }

    let mut functions = Vec::new();
    let mut methods = Vec::new();
    let mut inits = Vec::new();
    let mut failed = Vec::new();
    for decl in package.decls {
        let Decl::Func(func) = decl else { continue };
        match compile_function(&mut pkg, func) {
            Ok((chunk, method)) => {
                if method.is_none() && func.name.name == "init" {
                    inits.push(chunk.func_ref.clone());
                }
                methods.extend(method);
                functions.push(chunk);
            }
            Err(err) if err.is_function_level() => {
                // Methods never reach the export table; keying by object
                // keeps a same-named package function exported.
                failed.extend(info.object_of(&func.name).ok());
                pkg.report(err);
            }
            Err(err) => return Err(err),
        }
    }

    let mut vars = CodeWriter::new();
    for decl in package.decls {
        let (Decl::Var(value) | Decl::Const(value)) = decl else {
            continue;
        };
        match package_vars(&mut pkg, value) {
            Ok(code) => vars.append(code),
            Err(err) if err.is_function_level() => pkg.report(err),
            Err(err) => return Err(err),
        }
    }

    let mut archive = Archive::new(package.path, package.name);
    archive.imports = imports;
    for (obj, source_name, generated) in &declared.exports {
        if failed.contains(obj) {
            continue;
        }
        archive
            .exports
            .insert(source_name.clone(), generated.clone());
    }

    let mut w = CodeWriter::new();
    if !options.minify {
        w.line(format!("-- package {}", package.path));
    }
    w.line(format!(
        "local {} = require({})",
        options.runtime_local,
        quote(&options.runtime_module)
    ));
    w.line("local __pkg = {}");
    for (path, var) in pkg.import_bindings() {
        w.line(format!("local {var} = {}({})", pkg.rt("import"), quote(path)));
    }
    if !declared.names.is_empty() {
        w.line(format!("local {}", declared.names.join(", ")));
    }
    for decl in &type_decls {
        w.line(decl.decl.clone());
    }
    for (name, value) in pkg.descriptors.anonymous() {
        w.line(format!("local {name} = {value}"));
    }
    for i in init_order(info, &declared.types) {
        if let Some(init) = &type_decls[i].init {
            w.line(init.clone());
        }
    }
    for chunk in &functions {
        w.line(chunk.code.clone());
    }
    w.append(vars);
    for init in &inits {
        w.line(format!("{init}()"));
    }
    for generated in archive.exports.values() {
        w.line(format!("__pkg.{generated} = {generated}"));
    }
    w.line("return __pkg");

    archive.code = w.render(&options.indent, options.minify);
    archive.dependencies = pkg.dependencies();
    archive.methods = methods;
    debug!(
        package = %package.path,
        functions = functions.len(),
        descriptors = pkg.descriptors.len(),
        diagnostics = pkg.diagnostics.len(),
        "package assembled"
    );

    Ok(CompiledPackage {
        archive,
        functions,
        diagnostics: std::mem::take(&mut pkg.diagnostics),
    })
}

/// Package-level identifiers, named up front so every function of the unit
/// sees the same package scope.
struct PackageNames {
    /// Identifiers declared as package locals, in source order.
    names: Vec<String>,
    /// Named types declared by the package, in source order.
    types: Vec<TypeId>,
    /// Exported object, its source name and generated identifier.
    exports: Vec<(ObjectId, String, String)>,
}

fn declare_package_names(pkg: &mut PackageContext<'_>, package: &Package<'_>) -> Result<PackageNames> {
    let info = pkg.info;
    let mut declared = PackageNames {
        names: Vec::new(),
        types: Vec::new(),
        exports: Vec::new(),
    };
    for decl in package.decls {
        let idents = match decl {
            Decl::Type(d) => std::slice::from_ref(&d.name),
            Decl::Func(d) => std::slice::from_ref(&d.name),
            Decl::Var(d) | Decl::Const(d) => d.names,
        };
        for ident in idents {
            let obj = info.object_of(ident)?;
            let object = info.object(obj);
            if object.is_blank() {
                continue;
            }
            if object.kind == ObjectKind::Func && signature_of(pkg, obj, object.span)?.recv.is_some() {
                continue;
            }
            let name = pkg.global_name(obj)?;
            if object.kind == ObjectKind::TypeName {
                let ty = object.ty.ok_or_else(|| {
                    CompilationError::semantic_gap(format!("type of `{}`", object.name), object.span)
                })?;
                declared.types.push(ty);
            }
            if object.exported() && object.name != "init" {
                declared.exports.push((obj, object.name.clone(), name.clone()));
            }
            declared.names.push(name);
        }
    }
    Ok(declared)
}

fn compile_function(
    pkg: &mut PackageContext<'_>,
    decl: &FuncDecl<'_>,
) -> Result<(FunctionChunk, Option<MethodEntry>)> {
    let info = pkg.info;
    let obj = info.object_of(&decl.name)?;
    if signature_of(pkg, obj, decl.span)?.recv.is_some() {
        let method = translate_method(pkg, decl)?;
        let chunk = FunctionChunk {
            name: format!("{}.{}", method.entry.type_name, decl.name.name),
            func_ref: method.entry.func_ref.clone(),
            code: method.code,
            machine: method.machine,
        };
        return Ok((chunk, Some(method.entry)));
    }

    let func_ref = pkg.global_name(obj)?;
    let (code, machine) = match &decl.body {
        Some(body) => {
            let translated = translate_decl(pkg, decl, body, func_ref.clone())?;
            (translated.code, translated.machine)
        }
        None => {
            let full = format!("{}.{}", pkg.pkg_path, decl.name.name);
            (native_stub(pkg, &full), None)
        }
    };
    debug!(function = %decl.name.name, flattened = machine.is_some(), "function");
    Ok((
        FunctionChunk {
            name: decl.name.name.to_string(),
            code: format!("{func_ref} = {code}"),
            func_ref,
            machine,
        },
        None,
    ))
}

/// Initialization of one `var` or `const` declaration.
fn package_vars(pkg: &mut PackageContext<'_>, decl: &ValueDecl<'_>) -> Result<CodeWriter> {
    let info = pkg.info;
    let func = FuncContext::new(
        pkg.scope.clone(),
        Signature::default(),
        BodyFacts::default(),
        "nil".to_string(),
    );
    let mut t = FunctionTranslator::new(pkg, func);
    t.func.pos = decl.span;
    let mut targets = Vec::with_capacity(decl.names.len());
    for name in decl.names {
        let obj = info.object_of(name)?;
        let object = info.object(obj);
        let target = if object.is_blank() {
            LValue::Blank(t.tmp("blank"))
        } else {
            LValue::Place(t.name_of(obj)?)
        };
        targets.push((target, object.ty));
    }
    if decl.values.is_empty() {
        for (target, ty) in targets {
            let ty = ty.ok_or_else(|| CompilationError::semantic_gap("type of a variable", decl.span))?;
            let zero = t.pkg.zero_value(ty)?;
            let line = target.set(&zero, t.pkg.options);
            t.emit(line);
        }
    } else {
        t.bind(targets, decl.values)?;
    }

    let mut locals = std::mem::take(&mut t.func.locals);
    let body = std::mem::take(&mut t.func.out);
    if locals.is_empty() {
        return Ok(body);
    }
    locals.sort();
    locals.dedup();
    let mut w = CodeWriter::new();
    w.line("do");
    w.indent();
    w.line(format!("local {}", locals.join(", ")));
    w.append(body);
    w.dedent();
    w.line("end");
    Ok(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use moonlift_core::ast::BranchKind;
    use moonlift_core::{Bump, ProgramBuilder};
    use moonlift_registry::ArchiveRegistry;

    fn position(code: &str, needle: &str) -> usize {
        code.find(needle)
            .unwrap_or_else(|| panic!("`{needle}` not found in:\n{code}"))
    }

    #[test]
    fn chunk_layout() {
        let arena = Bump::new();
        let mut b = ProgramBuilder::new(&arena, "example.com/app", "app");
        let int = b.int();
        let (point_obj, point) = b.named_type("Point");
        let fields = b.struct_type(&[("X", int, false), ("Y", int, false)]);
        b.set_underlying(point, fields);
        let count = b.package_var("Count", int);
        let three = b.int_lit(3);

        let sig = b.signature(&[], &[], false);
        let init = b.func("init", sig);
        let target = b.ident(count);
        let four = b.int_lit(4);
        let store = b.assign(&[target], &[four]);
        let init_body = b.block(&[store]);

        let main_sig = b.signature(&[], &[], false);
        let main = b.func("Main", main_sig);
        let main_body = b.block(&[]);

        let decls = [
            b.type_decl(point_obj),
            b.var_spec(&[count], &[three]),
            b.func_decl(init, Some(init_body)),
            b.func_decl(main, Some(main_body)),
        ];
        let (package, info) = b.finish(&[], &decls);
        let registry = ArchiveRegistry::new();
        let options = CompilerOptions::default();
        let compiled = compile_package(&package, &info, &options, &registry).unwrap();
        let code = &compiled.archive.code;

        let order = [
            "-- package example.com/app",
            "local __rt = require(\"moonlift.runtime\")",
            "local __pkg = {}",
            "local Point, Count, init, Main",
            "Point = __rt.types.named(\"example.com/app\", \"Point\", \"struct\")",
            "Point:init(\"example.com/app\", {",
            "init = function()",
            "Main = function()",
            "Count = 3",
            "init()",
            "__pkg.Count = Count",
            "return __pkg",
        ];
        for pair in order.windows(2) {
            assert!(
                position(code, pair[0]) < position(code, pair[1]),
                "`{}` should come before `{}`",
                pair[0],
                pair[1]
            );
        }
        assert!(code.contains("  Count = 4"));
        assert!(!code.contains("__pkg.init"));
        assert_eq!(compiled.archive.export("Main"), Some("Main"));
        assert_eq!(compiled.archive.export("Point"), Some("Point"));
        assert_eq!(compiled.functions.len(), 2);
        assert!(compiled.function("Main").unwrap().machine.is_none());
    }

    #[test]
    fn function_errors_skip_only_that_function() {
        let arena = Bump::new();
        let mut b = ProgramBuilder::new(&arena, "example.com/app", "app");
        let label = b.label("again");
        let jump = b.branch(BranchKind::Goto, Some(label));
        let bad_body = b.block(&[jump]);
        let bad_sig = b.signature(&[], &[], false);
        let bad = b.func("Bad", bad_sig);
        let good_sig = b.signature(&[], &[], false);
        let good = b.func("Good", good_sig);
        let good_body = b.block(&[]);
        let decls = [
            b.func_decl(bad, Some(bad_body)),
            b.func_decl(good, Some(good_body)),
        ];
        let (package, info) = b.finish(&[], &decls);

        let registry = ArchiveRegistry::new();
        let options = CompilerOptions::default();
        let compiled = compile_package(&package, &info, &options, &registry).unwrap();
        assert_eq!(compiled.diagnostics.len(), 1);
        assert!(matches!(
            compiled.diagnostics.errors()[0],
            CompilationError::UnsupportedConstruct { .. }
        ));
        assert!(compiled.function("Bad").is_none());
        assert!(compiled.function("Good").is_some());
        assert_eq!(compiled.archive.export("Bad"), None);
        assert!(!compiled.archive.code.contains("Bad = function"));
    }

    #[test]
    fn missing_import_aborts_the_unit() {
        let arena = Bump::new();
        let mut b = ProgramBuilder::new(&arena, "example.com/app", "app");
        let (import, _) = b.import("example.com/missing", "missing");
        let (package, info) = b.finish(&[import], &[]);
        let registry = ArchiveRegistry::new();
        let options = CompilerOptions::default();
        let err = compile_package(&package, &info, &options, &registry).unwrap_err();
        assert!(matches!(err, CompilationError::ImportFailure { .. }));
    }

    #[test]
    fn native_function_gets_a_stub() {
        let arena = Bump::new();
        let mut b = ProgramBuilder::new(&arena, "example.com/sys", "sys");
        let sig = b.signature(&[], &[], false);
        let now = b.func("Now", sig);
        let decl = b.func_decl(now, None);
        let (package, info) = b.finish(&[], &[decl]);
        let registry = ArchiveRegistry::new();
        let options = CompilerOptions::default();
        let compiled = compile_package(&package, &info, &options, &registry).unwrap();
        assert!(compiled.archive.code.contains(
            "Now = function() __rt.throw_runtime_error(\"native function not implemented: example.com/sys.Now\") end"
        ));
    }
}
