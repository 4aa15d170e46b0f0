use moonlift_core::ast::{DeferStmt, GoStmt, SendStmt};
use moonlift_core::{Result, Type};

use crate::function::FunctionTranslator;

impl<'a, 'ctx, 'p> FunctionTranslator<'a, 'ctx, 'p> {
    /// `ch <- v`. Suspends when the oracle says the send may block.
    pub(crate) fn send_stmt<'ast>(&mut self, s: &'ast SendStmt<'ast>) -> Result<()> {
        let ch_ty = self.type_of(&s.ch)?;
        let ch = self.expr(s.ch)?;
        let ch = self.spill(ch, &[s.value]);
        let value = match self.pkg.info.types.underlying_type(ch_ty) {
            Type::Chan { elem, .. } => self.value(s.value, *elem)?,
            _ => self.expr(s.value)?,
        };
        let operation = format!("{}({ch}, {value})", self.rt("send"));
        if self.func.is_flattened() && self.func.facts.is_blocking(s.id) {
            self.suspend(&operation)?;
        } else {
            self.emit(operation);
        }
        Ok(())
    }

    /// `go f(args)`: arguments are evaluated here, the call runs in a new
    /// fiber.
    pub(crate) fn go_stmt<'ast>(&mut self, s: &'ast GoStmt<'ast>) -> Result<()> {
        let (func, args) = self.deferred_call(s.call)?;
        self.emit(format!("{}({func}, {{{}}})", self.rt("go"), args.join(", ")));
        Ok(())
    }

    /// `defer f(args)`: arguments are evaluated here, the call runs when the
    /// function unwinds.
    pub(crate) fn defer_stmt<'ast>(&mut self, s: &'ast DeferStmt<'ast>) -> Result<()> {
        let (func, args) = self.deferred_call(s.call)?;
        self.emit(format!(
            "__defers[#__defers + 1] = {{{func}, {{{}}}}}",
            args.join(", ")
        ));
        Ok(())
    }
}
