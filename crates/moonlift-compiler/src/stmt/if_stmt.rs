use moonlift_core::Result;
use moonlift_core::ast::{IfStmt, Stmt};

use crate::emit::operand;
use crate::function::FunctionTranslator;

impl<'a, 'ctx, 'p> FunctionTranslator<'a, 'ctx, 'p> {
    pub(crate) fn if_stmt<'ast>(&mut self, s: &'ast IfStmt<'ast>) -> Result<()> {
        if let Some(init) = s.init {
            self.stmt(init)?;
        }
        let else_lowers = s.else_.is_some_and(|e| self.lowers_with_cases(e.id()));
        if self.lowers_with_cases(s.cond.id()) || self.any_lowers(s.then.stmts) || else_lowers {
            return self.if_cases(s);
        }

        let cond = self.expr(s.cond)?;
        self.emit(format!("if {cond} then"));
        self.func.out.indent();
        self.guarded(&cond, |t| t.stmts(s.then.stmts))?;
        self.func.out.dedent();
        if let Some(else_) = s.else_ {
            self.emit("else");
            self.func.out.indent();
            self.guarded(&format!("not {}", operand(&cond)), |t| t.stmt(else_))?;
            self.func.out.dedent();
        }
        self.emit("end");
        Ok(())
    }

    /// ```text
    /// if not c then goto ELSE
    /// <then>; goto END
    /// ELSE: <else>
    /// END:
    /// ```
    fn if_cases<'ast>(&mut self, s: &'ast IfStmt<'ast>) -> Result<()> {
        let cond = self.expr(s.cond)?;
        let end = self.new_target()?;
        let otherwise = match s.else_ {
            Some(_) => self.new_target()?,
            None => end,
        };
        self.jump_if(&format!("not {}", operand(&cond)), otherwise)?;
        self.stmts(s.then.stmts)?;
        if let Some(else_) = s.else_ {
            if !self.machine()?.is_terminated() {
                self.jump(end)?;
            }
            self.open_case(otherwise)?;
            self.else_branch(else_)?;
        }
        self.open_case(end)
    }

    fn else_branch<'ast>(&mut self, else_: Stmt<'ast>) -> Result<()> {
        match else_ {
            Stmt::Block(block) => self.stmts(block.stmts),
            other => self.stmt(other),
        }
    }
}
