//! `for` and `range` loops.
//!
//! Every loop goes through [`FunctionTranslator::translate_loop`], which
//! takes the loop apart into a test, a per-iteration head, the body and a
//! post step. Normal mode emits
//!
//! ```text
//! while true do
//!   if not (test) then goto __brk_N end
//!   head; body
//!   ::__cont_N::
//!   post
//! end
//! ::__brk_N::
//! ```
//!
//! and a loop containing a suspension point occupies the case range
//! `[BEGIN, END)`: `BEGIN` evaluates the test, `continue` runs the post step
//! and jumps back to `BEGIN`, `break` jumps to `END`.

use moonlift_core::ast::{AssignOp, Expr, ForStmt, RangeStmt, Stmt};
use moonlift_core::{BasicKind, CompilationError, ObjectId, Result, Type, TypeId};

use crate::emit::{operand, prefix};
use crate::flow::FlowData;
use crate::function::FunctionTranslator;

type Step<'f, S> = &'f mut dyn FnMut(&mut S) -> Result<()>;
type Test<'f, S> = &'f mut dyn FnMut(&mut S) -> Result<Option<String>>;

impl<'a, 'ctx, 'p> FunctionTranslator<'a, 'ctx, 'p> {
    pub(crate) fn translate_loop<'ast>(
        &mut self,
        flattened: bool,
        label: Option<ObjectId>,
        test: Test<'_, Self>,
        head: Step<'_, Self>,
        body: &'ast [Stmt<'ast>],
        post: Step<'_, Self>,
    ) -> Result<()> {
        if flattened {
            return self.loop_cases(label, test, head, body, post);
        }
        let brk = self.func.label("brk");
        let cont = self.func.label("cont");
        self.emit("while true do");
        self.func.out.indent();
        let cond = test(self)?;
        if let Some(cond) = &cond {
            self.emit(format!("if not {} then goto {brk} end", operand(cond)));
        }
        let guard = cond.unwrap_or_else(|| "true".to_string());
        let scope = self
            .func
            .flow
            .enter(label, FlowData::labels(brk.clone(), Some(cont.clone())));
        let result = self.guarded(&guard, |t| {
            head(t)?;
            t.stmts(body)
        });
        self.func.flow.leave(scope);
        result?;
        self.emit(format!("::{cont}::"));
        post(self)?;
        self.func.out.dedent();
        self.emit("end");
        self.emit(format!("::{brk}::"));
        Ok(())
    }

    fn loop_cases<'ast>(
        &mut self,
        label: Option<ObjectId>,
        test: Test<'_, Self>,
        head: Step<'_, Self>,
        body: &'ast [Stmt<'ast>],
        post: Step<'_, Self>,
    ) -> Result<()> {
        let begin = self.new_target()?;
        let end = self.new_target()?;
        self.open_case(begin)?;
        if let Some(cond) = test(self)? {
            self.jump_if(&format!("not {}", operand(&cond)), end)?;
        }
        head(self)?;
        let post = self.capture(|t| post(t))?;
        let scope = self
            .func
            .flow
            .enter(label, FlowData::cases(Some(begin), end, Some(post.clone())));
        let result = self.stmts(body);
        self.func.flow.leave(scope);
        result?;
        if !self.machine()?.is_terminated() {
            self.func.out.append(post);
            self.jump(begin)?;
        }
        self.open_case(end)
    }

    pub(crate) fn for_stmt<'ast>(
        &mut self,
        s: &'ast ForStmt<'ast>,
        label: Option<ObjectId>,
    ) -> Result<()> {
        if let Some(init) = s.init {
            self.stmt(init)?;
        }
        if s.post.is_some_and(|p| self.lowers_with_cases(p.id())) {
            return Err(CompilationError::unsupported(
                "blocking operation in a loop post statement",
                s.span,
            ));
        }
        let flattened = s.cond.is_some_and(|c| self.lowers_with_cases(c.id()))
            || self.any_lowers(s.body.stmts);

        // Each iteration gets its own copy of a captured loop variable.
        let mut fresh = Vec::new();
        for obj in s.init.map(|init| self.declared_by(init)).unwrap_or_default() {
            if self.is_cell(obj) {
                fresh.push(self.name_of(obj)?);
            }
        }

        let cond = s.cond;
        let post_stmt = s.post;
        self.translate_loop(
            flattened,
            label,
            &mut |t| cond.map(|c| t.expr(c)).transpose(),
            &mut |_| Ok(()),
            s.body.stmts,
            &mut |t| {
                for name in &fresh {
                    t.emit(format!("{name} = {{{name}[1]}}"));
                }
                match post_stmt {
                    Some(post) => t.stmt(post),
                    None => Ok(()),
                }
            },
        )
    }

    pub(crate) fn range_stmt<'ast>(
        &mut self,
        s: &'ast RangeStmt<'ast>,
        label: Option<ObjectId>,
    ) -> Result<()> {
        let info = self.pkg.info;
        let x_ty = self.type_of(&s.x)?;
        let flattened = self.lowers_with_cases(s.x.id()) || self.any_lowers(s.body.stmts);
        let blocking_recv = self.func.is_flattened() && self.func.facts.is_blocking(s.id);
        let flattened = flattened || blocking_recv;
        let x = self.expr(s.x)?;
        let base = info.types.pointer_elem(x_ty).unwrap_or(x_ty);

        match info.types.underlying_type(base) {
            Type::Basic(kind) if kind.is_integer() => {
                let n = self.tmp("_n");
                let i = self.tmp("_i");
                self.emit(format!("{n}, {i} = {x}, 0"));
                self.translate_loop(
                    flattened,
                    label,
                    &mut |_| Ok(Some(format!("{i} < {n}"))),
                    &mut |t| t.bind_range(s, Some(i.clone()), None),
                    s.body.stmts,
                    &mut |t| {
                        t.emit(format!("{i} = {i} + 1"));
                        Ok(())
                    },
                )
            }
            Type::Basic(BasicKind::String) => {
                let text = self.tmp("_s");
                let i = self.tmp("_i");
                let rune = self.tmp("_c");
                let width = self.tmp("_w");
                self.emit(format!("{text}, {i}, {width} = {x}, 0, 0"));
                let decode = self.rt("decode_rune");
                self.translate_loop(
                    flattened,
                    label,
                    &mut |_| Ok(Some(format!("{i} < #{text}"))),
                    &mut |t| {
                        t.emit(format!("{rune}, {width} = {decode}({text}, {i})"));
                        t.bind_range(s, Some(i.clone()), Some(rune.clone()))
                    },
                    s.body.stmts,
                    &mut |t| {
                        t.emit(format!("{i} = {i} + {width}"));
                        Ok(())
                    },
                )
            }
            Type::Slice(elem) | Type::Array { elem, .. } => {
                let elem = *elem;
                let seq = self.tmp("_x");
                let n = self.tmp("_n");
                let i = self.tmp("_i");
                self.emit(format!("{seq} = {x}"));
                self.emit(format!("{n}, {i} = {}({seq}), 0", self.rt("len")));
                let copies = self.copies_on_read(elem);
                let clone = self.rt("clone");
                self.translate_loop(
                    flattened,
                    label,
                    &mut |_| Ok(Some(format!("{i} < {n}"))),
                    &mut |t| {
                        let element = format!("{}:get({i})", prefix(&seq));
                        let element = if copies {
                            format!("{clone}({element})")
                        } else {
                            element
                        };
                        let value = s.value.is_some().then_some(element);
                        t.bind_range(s, Some(i.clone()), value)
                    },
                    s.body.stmts,
                    &mut |t| {
                        t.emit(format!("{i} = {i} + 1"));
                        Ok(())
                    },
                )
            }
            Type::Map { value, .. } => {
                let copies = self.copies_on_read(*value);
                let map = self.tmp("_m");
                let keys = self.tmp("_k");
                let i = self.tmp("_i");
                self.emit(format!("{map} = {x}"));
                self.emit(format!("{keys}, {i} = {}({map}), 0", self.rt("keys")));
                let clone = self.rt("clone");
                self.translate_loop(
                    flattened,
                    label,
                    &mut |_| Ok(Some(format!("{i} < #{keys}"))),
                    &mut |t| {
                        let key = format!("{keys}[{i} + 1]");
                        let value = s.value.is_some().then(|| {
                            let v = format!("{}:get({key})", prefix(&map));
                            if copies { format!("{clone}({v})") } else { v }
                        });
                        t.bind_range(s, Some(key), value)
                    },
                    s.body.stmts,
                    &mut |t| {
                        t.emit(format!("{i} = {i} + 1"));
                        Ok(())
                    },
                )
            }
            Type::Chan { .. } => {
                let ch = self.tmp("_ch");
                self.emit(format!("{ch} = {x}"));
                let operation = format!("{}({ch})", self.rt("recv"));
                let received = self.tmp("_v");
                self.translate_loop(
                    flattened,
                    label,
                    &mut |t| {
                        if blocking_recv {
                            let result = t.suspend(&operation)?;
                            t.emit(format!("{received} = {result}"));
                        } else {
                            t.emit(format!("{received} = {{{operation}}}"));
                        }
                        Ok(Some(format!("{received}[2]")))
                    },
                    // The single iteration variable of a channel range sits in
                    // the key position.
                    &mut |t| t.bind_range(s, Some(format!("{received}[1]")), None),
                    s.body.stmts,
                    &mut |_| Ok(()),
                )
            }
            _ => Err(CompilationError::unsupported("range over this type", s.span)),
        }
    }

    /// Variables a loop's init statement declares.
    fn declared_by(&self, init: Stmt<'_>) -> Vec<ObjectId> {
        let info = self.pkg.info;
        match init {
            Stmt::Assign(a) if a.op == AssignOp::Define => a
                .lhs
                .iter()
                .filter_map(|e| match e {
                    Expr::Ident(ident) => info.defs.get(&ident.id).copied(),
                    _ => None,
                })
                .collect(),
            Stmt::VarDecl(v) => v
                .names
                .iter()
                .filter_map(|n| info.defs.get(&n.id).copied())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether reading an element of type `ty` out of a container copies it.
    fn copies_on_read(&self, ty: TypeId) -> bool {
        let types = &self.pkg.info.types;
        types.is_struct(ty) || types.is_array(ty)
    }

    /// Assign the iteration values to the range's key and value operands.
    fn bind_range<'ast>(
        &mut self,
        s: &'ast RangeStmt<'ast>,
        key: Option<String>,
        value: Option<String>,
    ) -> Result<()> {
        for (lhs, text) in [(s.key, key), (s.value, value)] {
            let (Some(lhs), Some(text)) = (lhs, text) else {
                continue;
            };
            if lhs.is_blank() {
                continue;
            }
            let (target, _) = self.assign_target(lhs, s.define)?;
            let line = target.set(&text, self.pkg.options);
            self.emit(line);
        }
        Ok(())
    }
}
