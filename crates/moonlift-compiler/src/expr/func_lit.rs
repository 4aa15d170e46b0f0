//! Function literals.
//!
//! A literal becomes a nested Lua function translated with its own
//! [`FuncContext`]. Hoisted locals are shared by every iteration of a loop,
//! so cells the literal captures are rebound through an immediately called
//! wrapper: each closure keeps the cell that was current when it was
//! created. A flattened literal also needs a stable reference to itself to
//! find its suspended frame, which the wrapper provides as `__b`.

use tracing::trace;

use moonlift_core::ast::FuncLit;
use moonlift_core::{CompilationError, Result};

use crate::analysis::{BodyFacts, captured_cells};
use crate::context::FuncContext;
use crate::emit::CodeWriter;
use crate::function::FunctionTranslator;

const SELF_REF: &str = "__b";

impl<'a, 'ctx, 'p> FunctionTranslator<'a, 'ctx, 'p> {
    pub(crate) fn func_lit(&mut self, lit: &FuncLit<'_>) -> Result<String> {
        let info = self.pkg.info;
        let ty = info.type_of(lit.id, lit.span)?;
        let sig = info
            .types
            .signature(ty)
            .cloned()
            .ok_or_else(|| CompilationError::semantic_gap("signature of a function literal", lit.span))?;
        let facts = BodyFacts::analyze(&lit.body, info.func_info(lit.id)?);
        let flattened = facts.needs_flattening();

        let mut cells = Vec::new();
        for obj in captured_cells(lit, info) {
            cells.push(self.name_of(obj)?);
        }
        trace!(cells = cells.len(), flattened, "function literal");

        let frame_ref = if flattened {
            SELF_REF.to_string()
        } else {
            self.func.frame_ref.clone()
        };
        let translated = {
            let func = FuncContext::nested(&self.func, sig, facts, frame_ref);
            FunctionTranslator::new(&mut *self.pkg, func).translate(&lit.body)?
        };
        if cells.is_empty() && !flattened {
            return Ok(translated.code);
        }

        let cells = cells.join(", ");
        let mut w = CodeWriter::new();
        w.line(format!("(function({cells})"));
        w.indent();
        if flattened {
            w.line(format!("local {SELF_REF}"));
            w.line(format!("{SELF_REF} = {}", translated.code));
            w.line(format!("return {SELF_REF}"));
        } else {
            w.line(format!("return {}", translated.code));
        }
        w.dedent();
        w.line(format!("end)({cells})"));
        let options = self.pkg.options;
        Ok(w.render(&options.indent, options.minify).trim_end().to_string())
    }
}
