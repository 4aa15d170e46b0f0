//! Function translator: one body to one Lua function expression.
//!
//! [`FunctionTranslator`] owns a [`FuncContext`] and borrows the unit's
//! [`PackageContext`]. Statement and expression lowering live in the
//! [`stmt`](crate::stmt) and [`expr`](crate::expr) modules as further `impl`
//! blocks on the same type; this module holds the shared helpers and the
//! scaffolding wrapped around a finished body.
//!
//! A body with no suspension point is emitted as straight-line Lua. A body
//! with one is flattened into cases of a dispatch loop:
//!
//! ```text
//! function(params)
//!   local __s, __r, __f, __c, <hoisted locals>
//!   __s, __r = 0, nil
//!   __f, __c = __rt.frame(<ref>), false
//!   if __f ~= nil then <restore state and locals> end
//!   while true do
//!     if __s == 0 then ... elseif __s == 1 then ... elseif __s == -1 then do return end end
//!     ::__next::
//!   end
//!   ::__suspend::
//!   <save state and locals>
//!   do return __rt.suspend(__f) end
//! end
//! ```

use tracing::{debug, trace};

use moonlift_core::ast::{Block, Expr, FuncDecl};
use moonlift_core::{CompilationError, ObjectId, Result, ScopeLevel, Signature, Span, TypeId};

use crate::analysis::BodyFacts;
use crate::context::{FuncContext, PackageContext};
use crate::emit::CodeWriter;
use crate::flow::Jump;
use crate::machine::{CaseBuilder, CaseTarget, StateMachine, TERMINAL_CASE, Transfer};

/// Writer level at which case bodies are emitted.
pub(crate) const CASE_LEVEL: usize = 1;

const RESUME_BINDING: &str = "if __c then __c = false; __r = __f.__value end";

/// Translates one function body.
pub struct FunctionTranslator<'a, 'ctx, 'p> {
    pub(crate) pkg: &'a mut PackageContext<'ctx>,
    pub(crate) func: FuncContext<'p>,
}

/// A translated function.
#[derive(Debug, Clone)]
pub struct TranslatedFunction {
    /// `function(...) ... end`, rendered with the unit's indentation.
    pub code: String,
    /// Case graph, present when the body was flattened.
    pub machine: Option<StateMachine>,
}

/// The signature attached to a function or method object.
pub(crate) fn signature_of(
    pkg: &PackageContext<'_>,
    obj: ObjectId,
    span: Span,
) -> Result<Signature> {
    let info = pkg.info;
    let object = info.object(obj);
    object
        .ty
        .and_then(|ty| info.types.signature(ty))
        .cloned()
        .ok_or_else(|| {
            CompilationError::semantic_gap(format!("signature of `{}`", object.name), span)
        })
}

/// Translate the body of a declared function or method.
///
/// `frame_ref` is the expression the generated code uses to find its own
/// suspended frame.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn translate_decl(
    pkg: &mut PackageContext<'_>,
    decl: &FuncDecl<'_>,
    body: &Block<'_>,
    frame_ref: String,
) -> Result<TranslatedFunction> {
    let info = pkg.info;
    let obj = info.object_of(&decl.name)?;
    let sig = signature_of(pkg, obj, decl.span)?;
    let facts = BodyFacts::analyze(body, info.func_info(decl.id)?);
    let func = FuncContext::new(pkg.scope.clone(), sig, facts, frame_ref);
    FunctionTranslator::new(pkg, func).translate(body)
}

impl<'a, 'ctx, 'p> FunctionTranslator<'a, 'ctx, 'p> {
    pub fn new(pkg: &'a mut PackageContext<'ctx>, func: FuncContext<'p>) -> Self {
        Self { pkg, func }
    }

    /// Translate `body` and wrap it in its function scaffolding.
    pub fn translate(mut self, body: &Block<'_>) -> Result<TranslatedFunction> {
        debug!(
            frame = %self.func.frame_ref,
            flattened = self.func.is_flattened(),
            depth = self.func.depth(),
            "translating function body"
        );
        self.declare_params();
        if self.func.is_flattened() {
            self.emit("if __s == 0 then");
            self.func.out.indent();
        }
        self.entry()?;
        self.stmts(body.stmts)?;
        if self.func.is_flattened() {
            if !self.machine()?.is_terminated() {
                self.emit_return(Vec::new())?;
            }
            let out = &mut self.func.out;
            out.dedent();
            out.line(format!("elseif __s == {TERMINAL_CASE} then"));
            out.indent();
            out.line("do return end");
            out.dedent();
            out.line("end");
        }
        self.finish()
    }

    fn declare_params(&mut self) {
        let info = self.pkg.info;
        if self.func.sig.recv.is_some() {
            self.func.params.push("self".to_string());
        }
        for param in self.func.sig.params.clone() {
            let object = info.object(param);
            if object.name.is_empty() || object.is_blank() {
                self.func.param("param");
            } else {
                let name = self.func.param(&object.name);
                self.pkg.set_name(param, name);
            }
        }
    }

    /// Receiver binding, parameter cells, named results and the deferred
    /// call list. Runs at the start of the entry case.
    fn entry(&mut self) -> Result<()> {
        let info = self.pkg.info;
        if let Some(recv) = self.func.sig.recv {
            self.bind_receiver(recv)?;
        }
        for param in self.func.sig.params.clone() {
            let object = info.object(param);
            if !object.name.is_empty() && !object.is_blank() && self.is_cell(param) {
                let name = self.name_of(param)?;
                self.emit(format!("{name} = {{{name}}}"));
            }
        }
        let results = self.func.sig.results.clone();
        if results.iter().any(|r| !info.object(*r).name.is_empty()) {
            for result in results {
                let object = info.object(result);
                let ty = object.ty.ok_or_else(|| {
                    CompilationError::semantic_gap(
                        format!("type of result `{}`", object.name),
                        object.span,
                    )
                })?;
                let zero = self.pkg.zero_value(ty)?;
                let name = if object.is_blank() {
                    self.func.local("result")
                } else {
                    self.name_of(result)?
                };
                if self.is_cell(result) {
                    self.emit(format!("{name} = {{{zero}}}"));
                    self.func.results.push(format!("{name}[1]"));
                } else {
                    self.emit(format!("{name} = {zero}"));
                    self.func.results.push(name);
                }
            }
        }
        if self.func.has_defer() {
            self.emit("__defers = {}");
        }
        Ok(())
    }

    fn finish(mut self) -> Result<TranslatedFunction> {
        let flattened = self.func.is_flattened();
        let mut body = std::mem::take(&mut self.func.out);
        let machine = match self.func.machine.take() {
            Some(builder) => {
                body.try_map(|line| builder.patch(line))?;
                let machine = builder.finish(true)?;
                trace!(cases = machine.cases().len(), "flattened body");
                Some(machine)
            }
            None => None,
        };

        let mut w = CodeWriter::new();
        w.line(format!("function({})", self.func.params.join(", ")));
        w.indent();

        let mut locals: Vec<String> = Vec::new();
        if flattened {
            locals.extend(["__s", "__r", "__f", "__c"].map(String::from));
        }
        if self.func.has_defer() {
            locals.push("__defers".to_string());
        }
        let mut hoisted = self.func.locals.clone();
        hoisted.sort();
        hoisted.dedup();
        locals.extend(hoisted);
        if !locals.is_empty() {
            w.line(format!("local {}", locals.join(", ")));
        }

        let core = if flattened {
            self.restore_frame(&mut w);
            self.dispatch(body)
        } else {
            body
        };
        if self.func.has_defer() {
            self.protect(&mut w, core, flattened)?;
        } else {
            w.append(core);
        }
        w.dedent();
        w.line("end");

        let options = self.pkg.options;
        let code = w.render(&options.indent, options.minify);
        Ok(TranslatedFunction {
            code: code.trim_end().to_string(),
            machine,
        })
    }

    /// Everything saved in and restored from the frame besides the state.
    fn frame_vars(&self) -> Vec<String> {
        let mut vars = self.func.params.clone();
        if self.func.has_defer() {
            vars.push("__defers".to_string());
        }
        let mut hoisted = self.func.locals.clone();
        hoisted.sort();
        hoisted.dedup();
        vars.extend(hoisted);
        vars
    }

    fn restore_frame(&self, w: &mut CodeWriter) {
        w.line("__s, __r = 0, nil");
        w.line(format!(
            "__f, __c = {}({}), false",
            self.pkg.rt("frame"),
            self.func.frame_ref
        ));
        w.line("if __f ~= nil then");
        w.indent();
        w.line("__c = true");
        w.line("__s = __f.__s");
        w.line("__r = __f.__r");
        for var in self.frame_vars() {
            w.line(format!("{var} = __f.{var}"));
        }
        w.dedent();
        w.line("end");
    }

    fn dispatch(&self, body: CodeWriter) -> CodeWriter {
        let mut w = CodeWriter::new();
        w.line("while true do");
        w.indent();
        w.append(body);
        w.line("::__next::");
        w.dedent();
        w.line("end");
        w.line("::__suspend::");
        w.line(format!(
            "if __f == nil then __f = {}({}) end",
            self.pkg.rt("new_frame"),
            self.func.frame_ref
        ));
        w.line("__f.__s = __s");
        w.line("__f.__r = __r");
        for var in self.frame_vars() {
            w.line(format!("__f.{var} = {var}"));
        }
        w.line(format!("do return {}(__f) end", self.pkg.rt("suspend")));
        w
    }

    /// Run `core` under `pcall` and unwind the deferred calls afterwards.
    fn protect(&mut self, w: &mut CodeWriter, core: CodeWriter, flattened: bool) -> Result<()> {
        w.line("local __res = {pcall(function()");
        w.indent();
        w.append(core);
        w.dedent();
        w.line("end)}");
        if flattened {
            w.line(format!(
                "if __res[1] and {}(__res[2]) then do return __res[2] end end",
                self.pkg.rt("suspended")
            ));
            w.line("if not __res[1] then");
            w.indent();
            w.line(format!("__s = {TERMINAL_CASE}"));
            w.line(format!("if __f ~= nil then __f.__s = {TERMINAL_CASE} end"));
            w.dedent();
            w.line("end");
        }

        let recovered = if self.func.results.is_empty() {
            let mut zeros = Vec::with_capacity(self.func.sig.results.len());
            let info = self.pkg.info;
            for result in self.func.sig.results.clone() {
                let object = info.object(result);
                let ty = object.ty.ok_or_else(|| {
                    CompilationError::semantic_gap("type of result", object.span)
                })?;
                zeros.push(self.pkg.zero_value(ty)?);
            }
            zeros
        } else {
            self.func.results.clone()
        };
        w.line(format!(
            "if {}(__defers, __res[1], __res[2]) then {} end",
            self.pkg.rt("run_deferred"),
            return_line(&recovered)
        ));

        let count = self.func.sig.results.len();
        if !self.func.results.is_empty() {
            w.line(format!("return {}", self.func.results.join(", ")));
        } else if count > 0 {
            w.line(format!(
                "return {}(__res, 2, {})",
                self.pkg.rt("unpack"),
                count + 1
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Output helpers
    // ------------------------------------------------------------------

    pub(crate) fn emit(&mut self, line: impl Into<String>) {
        self.func.out.line(line);
    }

    pub(crate) fn rt(&self, member: &str) -> String {
        self.pkg.rt(member)
    }

    pub(crate) fn type_of(&self, expr: &Expr<'_>) -> Result<TypeId> {
        self.pkg.info.type_of(expr.id(), expr.span())
    }

    /// A hoisted temporary.
    pub(crate) fn tmp(&mut self, base: &str) -> String {
        self.func.local(base)
    }

    /// Evaluate `text` into a temporary when something in `later` may
    /// suspend, so it is not re-evaluated after resumption.
    pub(crate) fn spill(&mut self, text: String, later: &[Expr<'_>]) -> String {
        let suspends_later = self.func.is_flattened()
            && later
                .iter()
                .any(|e| self.func.facts.contains_blocking(e.id()));
        if !suspends_later || is_constant(&text) {
            return text;
        }
        let tmp = self.tmp("_t");
        self.emit(format!("{tmp} = {text}"));
        tmp
    }

    /// Run `f` as code only reached when `condition` holds.
    pub(crate) fn guarded<T>(
        &mut self,
        condition: &str,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if let Some(machine) = self.func.machine.as_mut() {
            machine.push_guard(condition);
        }
        let result = f(self);
        if let Some(machine) = self.func.machine.as_mut() {
            machine.pop_guard();
        }
        result
    }

    /// Emit the lines `f` produces into a separate writer.
    pub(crate) fn capture(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<CodeWriter> {
        let saved = std::mem::take(&mut self.func.out);
        let result = f(self);
        let captured = std::mem::replace(&mut self.func.out, saved);
        result.map(|()| captured)
    }

    // ------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------

    /// Identifier for a source object, allocating a hoisted local on first
    /// sight of a function-local one.
    pub(crate) fn name_of(&mut self, obj: ObjectId) -> Result<String> {
        if let Some(name) = self.pkg.cached_name(obj) {
            return Ok(name.to_string());
        }
        let info = self.pkg.info;
        let object = info.object(obj);
        if object.level != ScopeLevel::Local {
            return self.pkg.global_name(obj);
        }
        if object.is_blank() || object.name.is_empty() {
            return Ok(self.func.local("blank"));
        }
        let name = self.func.local(&object.name);
        self.pkg.set_name(obj, name.clone());
        Ok(name)
    }

    /// Whether `obj` lives in a heap cell.
    pub(crate) fn is_cell(&self, obj: ObjectId) -> bool {
        let info = self.pkg.info;
        info.object(obj).level == ScopeLevel::Local && info.is_escaping(obj)
    }

    /// Expression reading `obj`.
    pub(crate) fn var_ref(&mut self, obj: ObjectId) -> Result<String> {
        let name = self.name_of(obj)?;
        Ok(if self.is_cell(obj) {
            format!("{name}[1]")
        } else {
            name
        })
    }

    // ------------------------------------------------------------------
    // Cases
    // ------------------------------------------------------------------

    pub(crate) fn machine(&mut self) -> Result<&mut CaseBuilder> {
        self.func
            .machine
            .as_mut()
            .ok_or_else(|| CompilationError::internal("case operation in a body that is not flattened"))
    }

    /// Whether `node` must be lowered into cases.
    pub(crate) fn lowers_with_cases(&self, node: moonlift_core::NodeId) -> bool {
        self.func.is_flattened() && self.func.facts.contains_blocking(node)
    }

    pub(crate) fn new_target(&mut self) -> Result<CaseTarget> {
        Ok(self.machine()?.new_target())
    }

    /// Unconditional jump to another case.
    pub(crate) fn jump(&mut self, target: CaseTarget) -> Result<()> {
        let machine = self.machine()?;
        let placeholder = machine.placeholder(target);
        machine.record(Transfer::Goto(target));
        self.emit(format!("__s = {placeholder}; goto __next"));
        Ok(())
    }

    /// Jump to another case when `condition` holds.
    pub(crate) fn jump_if(&mut self, condition: &str, target: CaseTarget) -> Result<()> {
        let machine = self.machine()?;
        let placeholder = machine.placeholder(target);
        machine.push_guard(condition);
        machine.record(Transfer::Goto(target));
        machine.pop_guard();
        self.emit(format!(
            "if {condition} then __s = {placeholder}; goto __next end"
        ));
        Ok(())
    }

    pub(crate) fn jump_to(&mut self, jump: &Jump) -> Result<()> {
        match jump {
            Jump::Label(label) => {
                self.emit(format!("goto {label}"));
                Ok(())
            }
            Jump::Case(target) => self.jump(*target),
        }
    }

    /// Close the current case and open `target`. A case that can still fall
    /// off its end jumps to the new one first.
    pub(crate) fn open_case(&mut self, target: CaseTarget) -> Result<()> {
        if self.func.out.level() != CASE_LEVEL {
            return Err(CompilationError::internal(format!(
                "case opened at nesting level {}",
                self.func.out.level()
            )));
        }
        if !self.machine()?.is_terminated() {
            self.jump(target)?;
        }
        let number = self.machine()?.open(target)?;
        self.func.out.dedent();
        self.emit(format!("elseif __s == {number} then"));
        self.func.out.indent();
        for line in std::mem::take(&mut self.func.delayed) {
            self.emit(line);
        }
        Ok(())
    }

    /// Issue a blocking runtime operation and continue in a new case once
    /// it completes. Returns the temporary holding the operation's results
    /// as a table.
    pub(crate) fn suspend(&mut self, operation: &str) -> Result<String> {
        let resume = self.new_target()?;
        let machine = self.machine()?;
        let placeholder = machine.placeholder(resume);
        machine.record(Transfer::Suspend { resume_at: resume });
        self.emit(format!("__r = {{{operation}}}"));
        self.emit(format!("__s = {placeholder}"));
        self.emit(format!(
            "if {}(__r[1]) then goto __suspend end",
            self.rt("blocked")
        ));
        self.emit("goto __next");
        trace!(operation, "suspension point");
        self.func.delayed.push(RESUME_BINDING.to_string());
        self.open_case(resume)?;
        let result = self.tmp("_r");
        self.emit(format!("{result} = __r"));
        Ok(result)
    }

    /// `return values`, or the named results for a bare return.
    pub(crate) fn emit_return(&mut self, values: Vec<String>) -> Result<()> {
        let named = !self.func.results.is_empty();
        let values = if self.func.has_defer() && named {
            Vec::new()
        } else if values.is_empty() && named {
            self.func.results.clone()
        } else {
            values
        };
        self.emit(return_line(&values));
        if let Some(machine) = self.func.machine.as_mut() {
            machine.record(Transfer::Return);
        }
        Ok(())
    }
}

fn return_line(values: &[String]) -> String {
    if values.is_empty() {
        "do return end".to_string()
    } else {
        format!("do return {} end", values.join(", "))
    }
}

/// Literal text whose value cannot change between evaluations.
pub(crate) fn is_constant(text: &str) -> bool {
    matches!(text, "nil" | "true" | "false")
        || text.parse::<f64>().is_ok()
        || (text.starts_with('"') && text.ends_with('"') && crate::emit::is_atomic(text))
}
