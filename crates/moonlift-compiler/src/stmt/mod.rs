//! Statement lowering.
//!
//! A statement that contains no suspension point is emitted as ordinary
//! structured Lua even inside a flattened body; only statements that do are
//! split into cases. Declarations become assignments to hoisted locals.

mod branching;
mod concurrency;
mod if_stmt;
mod loops;

use moonlift_core::ast::{
    AssignOp, AssignStmt, BinaryOp, BranchKind, BranchStmt, Expr, ExprStmt, IncDecOp, IncDecStmt,
    ReturnStmt, Stmt, UnaryOp, VarDeclStmt,
};
use moonlift_core::{CompilationError, ObjectId, Result, TypeId};

use crate::emit::is_atomic;
use crate::expr::LValue;
use crate::function::FunctionTranslator;

impl<'a, 'ctx, 'p> FunctionTranslator<'a, 'ctx, 'p> {
    pub(crate) fn stmts<'ast>(&mut self, stmts: &'ast [Stmt<'ast>]) -> Result<()> {
        for stmt in stmts {
            self.stmt(*stmt)?;
        }
        Ok(())
    }

    pub(crate) fn stmt<'ast>(&mut self, stmt: Stmt<'ast>) -> Result<()> {
        self.labeled_stmt(stmt, None)
    }

    /// Translate `stmt`, which carries `label` when it is the target of a
    /// labeled statement.
    fn labeled_stmt<'ast>(&mut self, stmt: Stmt<'ast>, label: Option<ObjectId>) -> Result<()> {
        let span = stmt.span();
        self.func.pos = span;
        if self.pkg.options.source_positions && !span.is_unknown() && !self.pkg.options.minify {
            self.emit(format!("-- {}:{}", span.line, span.col));
        }
        match stmt {
            Stmt::Expr(s) => self.expr_stmt(s),
            Stmt::Assign(s) => self.assign(s),
            Stmt::IncDec(s) => self.inc_dec(s),
            Stmt::VarDecl(s) => self.var_decl(s),
            Stmt::Return(s) => self.return_stmt(s),
            Stmt::Block(b) => self.stmts(b.stmts),
            Stmt::If(s) => self.if_stmt(s),
            Stmt::For(s) => self.for_stmt(s, label),
            Stmt::Range(s) => self.range_stmt(s, label),
            Stmt::Switch(s) => self.switch_stmt(s, label),
            Stmt::Select(s) => self.select_stmt(s, label),
            Stmt::Labeled(s) => {
                let obj = self.pkg.info.object_of(&s.label)?;
                self.labeled_stmt(s.stmt, Some(obj))
            }
            Stmt::Branch(s) => self.branch(s),
            Stmt::Defer(s) => self.defer_stmt(s),
            Stmt::Go(s) => self.go_stmt(s),
            Stmt::Send(s) => self.send_stmt(s),
            Stmt::Empty(_) => Ok(()),
        }
    }

    /// Whether any of `stmts` must be split into cases.
    pub(crate) fn any_lowers(&self, stmts: &[Stmt<'_>]) -> bool {
        stmts.iter().any(|s| self.lowers_with_cases(s.id()))
    }

    fn expr_stmt<'ast>(&mut self, s: &'ast ExprStmt<'ast>) -> Result<()> {
        let expr = s.expr.unparen();
        let text = self.expr(expr)?;
        // A suspended operation already ran; its value is dropped.
        if self.func.is_flattened() && self.func.facts.is_blocking(expr.id()) {
            return Ok(());
        }
        let call = text
            .strip_prefix('(')
            .and_then(|t| t.strip_suffix(')'))
            .filter(|inner| is_call_statement(inner))
            .map(str::to_string)
            .unwrap_or(text);
        if is_call_statement(&call) {
            self.emit(call);
        } else {
            let scratch = self.tmp("blank");
            self.emit(format!("{scratch} = {call}"));
        }
        Ok(())
    }

    fn assign<'ast>(&mut self, s: &'ast AssignStmt<'ast>) -> Result<()> {
        match s.op {
            AssignOp::Compound(op) => {
                let ([lhs], [rhs]) = (s.lhs, s.rhs) else {
                    return Err(CompilationError::semantic_gap(
                        "operands of a compound assignment",
                        s.span,
                    ));
                };
                let left_ty = self.type_of(lhs)?;
                let right_ty = self.type_of(rhs)?;
                let place = self.lvalue(*lhs)?;
                let right = self.expr(*rhs)?;
                let value = self.binary_op(op, left_ty, right_ty, &place.get(), &right);
                let line = place.set(&value, self.pkg.options);
                self.emit(line);
                Ok(())
            }
            AssignOp::Define | AssignOp::Assign => {
                let define = s.op == AssignOp::Define;
                let mut targets = Vec::with_capacity(s.lhs.len());
                for lhs in s.lhs {
                    targets.push(self.assign_target(*lhs, define)?);
                }
                self.bind(targets, s.rhs)
            }
        }
    }

    /// Target of one left-hand side. Under `:=`, identifiers the statement
    /// defines get fresh storage; redeclared ones are plain assignments.
    pub(crate) fn assign_target<'ast>(
        &mut self,
        lhs: Expr<'ast>,
        define: bool,
    ) -> Result<(LValue, Option<TypeId>)> {
        let info = self.pkg.info;
        let ty = info.expr_types.get(&lhs.id()).copied();
        if define {
            if let Expr::Ident(ident) = lhs {
                if let Some(&obj) = info.defs.get(&ident.id) {
                    return Ok((self.define_target(obj)?, info.object(obj).ty));
                }
            }
        }
        Ok((self.lvalue(lhs)?, ty))
    }

    /// Assign `rhs` to `targets`. Every right-hand value is evaluated before
    /// any target is written.
    pub(crate) fn bind<'ast>(
        &mut self,
        targets: Vec<(LValue, Option<TypeId>)>,
        rhs: &'ast [Expr<'ast>],
    ) -> Result<()> {
        let options = self.pkg.options;
        if let ([value], true) = (rhs, targets.len() > 1) {
            let text = self.expr(*value)?;
            if targets.iter().all(|(t, _)| t.is_name()) {
                let names: Vec<String> = targets.iter().map(|(t, _)| t.get()).collect();
                self.emit(format!("{} = {text}", names.join(", ")));
                return Ok(());
            }
            let temps: Vec<String> = targets.iter().map(|_| self.tmp("_t")).collect();
            self.emit(format!("{} = {text}", temps.join(", ")));
            for ((target, _), temp) in targets.iter().zip(&temps) {
                self.emit(target.set(temp, options));
            }
            return Ok(());
        }
        if rhs.len() != targets.len() {
            return Err(CompilationError::semantic_gap(
                "assignment with mismatched operand counts",
                self.func.pos,
            ));
        }

        let mut values = Vec::with_capacity(rhs.len());
        for (i, (value, (_, ty))) in rhs.iter().zip(&targets).enumerate() {
            let text = match ty {
                Some(ty) => self.value(*value, *ty)?,
                None => self.expr(*value)?,
            };
            values.push(self.spill(text, &rhs[i + 1..]));
        }
        match targets.as_slice() {
            [(target, _)] => {
                let line = target.set(&values[0], options);
                self.emit(line);
            }
            _ if targets.iter().all(|(t, _)| t.is_name()) => {
                let names: Vec<String> = targets.iter().map(|(t, _)| t.get()).collect();
                self.emit(format!("{} = {}", names.join(", "), values.join(", ")));
            }
            _ => {
                let temps: Vec<String> = targets.iter().map(|_| self.tmp("_t")).collect();
                self.emit(format!("{} = {}", temps.join(", "), values.join(", ")));
                for ((target, _), temp) in targets.iter().zip(&temps) {
                    self.emit(target.set(temp, options));
                }
            }
        }
        Ok(())
    }

    fn inc_dec<'ast>(&mut self, s: &'ast IncDecStmt<'ast>) -> Result<()> {
        let ty = self.type_of(&s.x)?;
        let place = self.lvalue(s.x)?;
        let op = match s.op {
            IncDecOp::Inc => BinaryOp::Add,
            IncDecOp::Dec => BinaryOp::Sub,
        };
        let value = self.binary_op(op, ty, ty, &place.get(), "1");
        let line = place.set(&value, self.pkg.options);
        self.emit(line);
        Ok(())
    }

    fn var_decl<'ast>(&mut self, s: &'ast VarDeclStmt<'ast>) -> Result<()> {
        let info = self.pkg.info;
        let mut targets = Vec::with_capacity(s.names.len());
        for name in s.names {
            let obj = info.object_of(name)?;
            targets.push((self.define_target(obj)?, info.object(obj).ty));
        }
        if !s.values.is_empty() {
            return self.bind(targets, s.values);
        }
        for (target, ty) in targets {
            let ty = ty.ok_or_else(|| CompilationError::semantic_gap("type of a variable", s.span))?;
            let zero = self.pkg.zero_value(ty)?;
            let line = target.set(&zero, self.pkg.options);
            self.emit(line);
        }
        Ok(())
    }

    fn return_stmt<'ast>(&mut self, s: &'ast ReturnStmt<'ast>) -> Result<()> {
        if s.results.is_empty() {
            return self.emit_return(Vec::new());
        }
        let info = self.pkg.info;
        let result_types: Vec<Option<TypeId>> = self
            .func
            .sig
            .results
            .iter()
            .map(|r| info.object(*r).ty)
            .collect();

        if !self.func.results.is_empty() {
            let targets = self
                .func
                .results
                .clone()
                .into_iter()
                .zip(result_types)
                .map(|(place, ty)| (LValue::Place(place), ty))
                .collect();
            self.bind(targets, s.results)?;
            return self.emit_return(Vec::new());
        }

        if let ([only], true) = (s.results, result_types.len() > 1) {
            let text = self.expr(*only)?;
            return self.emit_return(vec![text]);
        }
        let mut values = Vec::with_capacity(s.results.len());
        for (i, (value, ty)) in s.results.iter().zip(result_types).enumerate() {
            let text = match ty {
                Some(ty) => self.value(*value, ty)?,
                None => self.expr(*value)?,
            };
            values.push(self.spill(text, &s.results[i + 1..]));
        }
        self.emit_return(values)
    }

    fn branch(&mut self, s: &BranchStmt<'_>) -> Result<()> {
        let label = s
            .label
            .as_ref()
            .map(|l| self.pkg.info.object_of(l))
            .transpose()?;
        match s.kind {
            BranchKind::Goto => Err(CompilationError::unsupported("goto", s.span)),
            // Consumed by the enclosing switch.
            BranchKind::Fallthrough => Ok(()),
            BranchKind::Break => {
                let target = self
                    .func
                    .flow
                    .get(label)
                    .map(|data| data.break_to.clone())
                    .ok_or_else(|| CompilationError::semantic_gap("target of `break`", s.span))?;
                self.jump_to(&target)
            }
            BranchKind::Continue => {
                let (target, post) = self
                    .func
                    .flow
                    .get(label)
                    .and_then(|data| data.continue_to.clone().map(|c| (c, data.post.clone())))
                    .ok_or_else(|| {
                        CompilationError::semantic_gap("target of `continue`", s.span)
                    })?;
                if let Some(post) = post {
                    self.func.out.append(post);
                }
                self.jump_to(&target)
            }
        }
    }

    /// Comma-ok receive used as a statement operand, e.g. `v, ok := <-ch`.
    pub(crate) fn is_recv(expr: Expr<'_>) -> bool {
        matches!(expr.unparen(), Expr::Unary(u) if u.op == UnaryOp::Recv)
    }
}

/// Text that Lua accepts as a statement on its own.
fn is_call_statement(text: &str) -> bool {
    is_atomic(text) && text.ends_with(')') && !text.starts_with('(')
}
