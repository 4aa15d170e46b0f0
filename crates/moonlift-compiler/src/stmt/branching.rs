//! `switch` and `select`.
//!
//! Both reduce to a list of [`Arm`]s. Without suspension points the arms
//! become an `if`/`elseif` chain, or, when some arm falls through, a
//! selector variable followed by one `if` per arm so control can run on into
//! the next arm. With suspension points every arm gets its own case and the
//! tests become conditional jumps.

use moonlift_core::ast::{AssignOp, BinaryOp, Expr, SelectStmt, Stmt, SwitchStmt, UnaryOp};
use moonlift_core::{CompilationError, ObjectId, Result, Type, TypeId};

use crate::emit::{operand, quote};
use crate::flow::FlowData;
use crate::function::{FunctionTranslator, is_constant};

/// When an arm is taken.
enum ArmTest<'ast> {
    Default,
    /// Any of `exprs` equals the tag, or holds when there is no tag.
    Match {
        tag: Option<(String, TypeId)>,
        exprs: &'ast [Expr<'ast>],
    },
    /// The runtime chose clause `index` of a select.
    Chosen { result: String, index: usize },
}

/// Values a select arm receives into its operands.
struct Received<'ast> {
    lhs: &'ast [Expr<'ast>],
    define: bool,
    result: String,
}

struct Arm<'ast> {
    test: ArmTest<'ast>,
    body: &'ast [Stmt<'ast>],
    fallthrough: bool,
    received: Option<Received<'ast>>,
}

impl<'a, 'ctx, 'p> FunctionTranslator<'a, 'ctx, 'p> {
    pub(crate) fn switch_stmt<'ast>(
        &mut self,
        s: &'ast SwitchStmt<'ast>,
        label: Option<ObjectId>,
    ) -> Result<()> {
        if let Some(init) = s.init {
            self.stmt(init)?;
        }
        let tag = match s.tag {
            Some(tag) => {
                let ty = self.type_of(&tag)?;
                let text = self.expr(tag)?;
                let text = if is_constant(&text) {
                    text
                } else {
                    let tmp = self.tmp("_tag");
                    self.emit(format!("{tmp} = {text}"));
                    tmp
                };
                Some((text, ty))
            }
            None => None,
        };
        let flattened = s.clauses.iter().any(|c| {
            c.exprs
                .unwrap_or(&[])
                .iter()
                .any(|e| self.lowers_with_cases(e.id()))
                || self.any_lowers(c.body)
        });
        let arms = s
            .clauses
            .iter()
            .map(|clause| Arm {
                test: match clause.exprs {
                    Some(exprs) => ArmTest::Match {
                        tag: tag.clone(),
                        exprs,
                    },
                    None => ArmTest::Default,
                },
                body: clause.body,
                fallthrough: clause.falls_through(),
                received: None,
            })
            .collect();
        self.branches(label, flattened, arms)
    }

    pub(crate) fn select_stmt<'ast>(
        &mut self,
        s: &'ast SelectStmt<'ast>,
        label: Option<ObjectId>,
    ) -> Result<()> {
        let result = self.tmp("_sel");
        let mut ops = Vec::new();
        let mut arms = Vec::with_capacity(s.clauses.len());
        for clause in s.clauses {
            let Some(comm) = clause.comm else {
                arms.push(Arm {
                    test: ArmTest::Default,
                    body: clause.body,
                    fallthrough: false,
                    received: None,
                });
                continue;
            };
            let received = match comm {
                Stmt::Send(send) => {
                    let ch_ty = self.type_of(&send.ch)?;
                    let ch = self.expr(send.ch)?;
                    let value = match self.pkg.info.types.underlying_type(ch_ty) {
                        Type::Chan { elem, .. } => self.value(send.value, *elem)?,
                        _ => self.expr(send.value)?,
                    };
                    ops.push(format!("{{{}, {ch}, {value}}}", quote("send")));
                    None
                }
                Stmt::Expr(e) => {
                    ops.push(self.select_recv(e.expr)?);
                    None
                }
                Stmt::Assign(assign) if matches!(assign.rhs, [rhs] if Self::is_recv(*rhs)) => {
                    ops.push(self.select_recv(assign.rhs[0])?);
                    Some(Received {
                        lhs: assign.lhs,
                        define: assign.op == AssignOp::Define,
                        result: result.clone(),
                    })
                }
                other => {
                    return Err(CompilationError::unsupported(
                        "select clause operation",
                        other.span(),
                    ));
                }
            };
            arms.push(Arm {
                test: ArmTest::Chosen {
                    result: result.clone(),
                    index: ops.len(),
                },
                body: clause.body,
                fallthrough: false,
                received,
            });
        }

        let operation = format!(
            "{}({{{}}}, {})",
            self.rt("select"),
            ops.join(", "),
            s.has_default()
        );
        let blocking = self.func.is_flattened() && self.func.facts.is_blocking(s.id);
        if blocking {
            let resumed = self.suspend(&operation)?;
            self.emit(format!("{result} = {resumed}"));
        } else {
            self.emit(format!("{result} = {{{operation}}}"));
        }
        let flattened = blocking || s.clauses.iter().any(|c| self.any_lowers(c.body));
        self.branches(label, flattened, arms)
    }

    /// `{"recv", ch}` for a receive operand of a select clause.
    fn select_recv<'ast>(&mut self, expr: Expr<'ast>) -> Result<String> {
        match expr.unparen() {
            Expr::Unary(u) if u.op == UnaryOp::Recv => {
                let ch = self.expr(u.operand)?;
                Ok(format!("{{{}, {ch}}}", quote("recv")))
            }
            other => Err(CompilationError::unsupported(
                "select clause operation",
                other.span(),
            )),
        }
    }

    fn branches<'ast>(
        &mut self,
        label: Option<ObjectId>,
        flattened: bool,
        arms: Vec<Arm<'ast>>,
    ) -> Result<()> {
        if flattened {
            return self.branches_flat(label, arms);
        }
        let brk = self.func.label("brk");
        let scope = self.func.flow.enter(label, FlowData::labels(brk.clone(), None));
        let result = if arms.iter().any(|a| a.fallthrough) {
            self.branches_selector(&arms)
        } else {
            self.branches_chain(&arms)
        };
        self.func.flow.leave(scope);
        result?;
        self.emit(format!("::{brk}::"));
        Ok(())
    }

    fn condition(&mut self, test: &ArmTest<'_>) -> Result<String> {
        match test {
            ArmTest::Default => Ok("true".to_string()),
            ArmTest::Chosen { result, index } => Ok(format!("{result}[1] == {index}")),
            ArmTest::Match { tag, exprs } => {
                let mut parts = Vec::with_capacity(exprs.len());
                for e in exprs.iter() {
                    let text = self.expr(*e)?;
                    parts.push(match tag {
                        Some((tag, tag_ty)) => {
                            let ty = self.type_of(e)?;
                            self.binary_op(BinaryOp::Eq, *tag_ty, ty, tag, &text)
                        }
                        None => text,
                    });
                }
                Ok(match parts.as_slice() {
                    [only] => only.clone(),
                    _ => parts
                        .iter()
                        .map(|p| operand(p))
                        .collect::<Vec<_>>()
                        .join(" or "),
                })
            }
        }
    }

    fn arm_body<'ast>(&mut self, arm: &Arm<'ast>) -> Result<()> {
        if let Some(received) = &arm.received {
            let values = [
                format!("{}[2]", received.result),
                format!("{}[3]", received.result),
            ];
            for (lhs, value) in received.lhs.iter().zip(values) {
                if lhs.is_blank() {
                    continue;
                }
                let (target, _) = self.assign_target(*lhs, received.define)?;
                let line = target.set(&value, self.pkg.options);
                self.emit(line);
            }
        }
        self.stmts(arm.body)
    }

    /// ```text
    /// if c1 then ... elseif c2 then ... else <default> end
    /// ```
    fn branches_chain(&mut self, arms: &[Arm<'_>]) -> Result<()> {
        let mut tested = Vec::new();
        for arm in arms.iter().filter(|a| !matches!(a.test, ArmTest::Default)) {
            let cond = self.condition(&arm.test)?;
            let keyword = if tested.is_empty() { "if" } else { "elseif" };
            self.emit(format!("{keyword} {cond} then"));
            self.func.out.indent();
            self.guarded(&cond, |t| t.arm_body(arm))?;
            self.func.out.dedent();
            tested.push(operand(&cond));
        }
        if let Some(default) = arms.iter().find(|a| matches!(a.test, ArmTest::Default)) {
            if tested.is_empty() {
                return self.arm_body(default);
            }
            self.emit("else");
            self.func.out.indent();
            let guard = format!("not ({})", tested.join(" or "));
            self.guarded(&guard, |t| t.arm_body(default))?;
            self.func.out.dedent();
        }
        if !tested.is_empty() {
            self.emit("end");
        }
        Ok(())
    }

    /// ```text
    /// c = 0; if c1 then c = 1 elseif ... end
    /// if c == 1 then ...; c = 2 end   -- falls through
    /// if c == 2 then ... end
    /// ```
    fn branches_selector(&mut self, arms: &[Arm<'_>]) -> Result<()> {
        let chosen = self.tmp("_case");
        self.emit(format!("{chosen} = 0"));
        let mut opened = false;
        for (i, arm) in arms.iter().enumerate() {
            if matches!(arm.test, ArmTest::Default) {
                continue;
            }
            let cond = self.condition(&arm.test)?;
            let keyword = if opened { "elseif" } else { "if" };
            self.emit(format!("{keyword} {cond} then"));
            self.func.out.indent();
            self.emit(format!("{chosen} = {}", i + 1));
            self.func.out.dedent();
            opened = true;
        }
        if let Some(i) = arms.iter().position(|a| matches!(a.test, ArmTest::Default)) {
            if opened {
                self.emit("else");
                self.func.out.indent();
                self.emit(format!("{chosen} = {}", i + 1));
                self.func.out.dedent();
            } else {
                self.emit(format!("{chosen} = {}", i + 1));
            }
        }
        if opened {
            self.emit("end");
        }
        for (i, arm) in arms.iter().enumerate() {
            let cond = format!("{chosen} == {}", i + 1);
            self.emit(format!("if {cond} then"));
            self.func.out.indent();
            self.guarded(&cond, |t| t.arm_body(arm))?;
            if arm.fallthrough {
                self.emit(format!("{chosen} = {}", i + 2));
            }
            self.func.out.dedent();
            self.emit("end");
        }
        Ok(())
    }

    /// ```text
    /// if c1 then goto ARM1; if c2 then goto ARM2; goto DEFAULT (or END)
    /// ARM1: ...; goto END   (or fall into ARM2)
    /// END:
    /// ```
    fn branches_flat<'ast>(&mut self, label: Option<ObjectId>, arms: Vec<Arm<'ast>>) -> Result<()> {
        let end = self.new_target()?;
        let mut targets = Vec::with_capacity(arms.len());
        for _ in &arms {
            targets.push(self.new_target()?);
        }
        let scope = self.func.flow.enter(label, FlowData::cases(None, end, None));
        let result = (|| -> Result<()> {
            for (arm, target) in arms.iter().zip(&targets) {
                if !matches!(arm.test, ArmTest::Default) {
                    let cond = self.condition(&arm.test)?;
                    self.jump_if(&cond, *target)?;
                }
            }
            let fallback = arms
                .iter()
                .position(|a| matches!(a.test, ArmTest::Default))
                .map_or(end, |i| targets[i]);
            self.jump(fallback)?;
            for (i, (arm, target)) in arms.iter().zip(&targets).enumerate() {
                let falls_in = i > 0 && arms[i - 1].fallthrough;
                if !falls_in && !self.machine()?.is_terminated() {
                    self.jump(end)?;
                }
                self.open_case(*target)?;
                self.arm_body(arm)?;
            }
            Ok(())
        })();
        self.func.flow.leave(scope);
        result?;
        self.open_case(end)
    }
}
