//! Binary operators.
//!
//! Arithmetic maps onto Lua operators where the semantics agree. Integer
//! division and remainder truncate toward zero and bitwise operators work
//! on 64-bit integers, so both go through the runtime.

use moonlift_core::ast::{BinaryExpr, BinaryOp};
use moonlift_core::{BasicKind, Result, TypeId};

use crate::emit::operand;
use crate::function::FunctionTranslator;

impl<'a, 'ctx, 'p> FunctionTranslator<'a, 'ctx, 'p> {
    pub(crate) fn binary<'ast>(&mut self, e: &BinaryExpr<'ast>) -> Result<String> {
        if e.op.is_logical() {
            return self.logical(e);
        }
        let left_ty = self.type_of(&e.left)?;
        let right_ty = self.type_of(&e.right)?;
        let left = self.expr(e.left)?;
        let left = self.spill(left, &[e.right]);
        let right = self.expr(e.right)?;
        Ok(self.binary_op(e.op, left_ty, right_ty, &left, &right))
    }

    /// `left op right` for operands of the given types.
    pub(crate) fn binary_op(
        &self,
        op: BinaryOp,
        left_ty: TypeId,
        right_ty: TypeId,
        left: &str,
        right: &str,
    ) -> String {
        let types = &self.pkg.info.types;
        let kind = types.basic_kind(left_ty);
        let integer = kind.is_some_and(BasicKind::is_integer);
        let runtime = |name: &str| format!("{}({left}, {right})", self.rt(name));
        let infix = |sym: &str| format!("{} {sym} {}", operand(left), operand(right));
        match op {
            BinaryOp::Add if kind == Some(BasicKind::String) => infix(".."),
            BinaryOp::Div if integer => runtime("idiv"),
            BinaryOp::Rem if integer => runtime("imod"),
            BinaryOp::Rem => format!("math.fmod({left}, {right})"),
            BinaryOp::BitAnd => runtime("band"),
            BinaryOp::BitOr => runtime("bor"),
            BinaryOp::BitXor => runtime("bxor"),
            BinaryOp::AndNot => runtime("band_not"),
            BinaryOp::Shl => runtime("shl"),
            BinaryOp::Shr => runtime("shr"),
            BinaryOp::Eq | BinaryOp::Ne => {
                let nil = |ty: TypeId| types.basic_kind(ty) == Some(BasicKind::UntypedNil);
                let structural = types.is_struct(left_ty)
                    || types.is_array(left_ty)
                    || (types.is_interface(left_ty) != types.is_interface(right_ty)
                        && !nil(left_ty)
                        && !nil(right_ty));
                match (structural, op == BinaryOp::Eq) {
                    (true, true) => runtime("equal"),
                    (true, false) => format!("not {}", runtime("equal")),
                    (false, true) => infix("=="),
                    (false, false) => infix("~="),
                }
            }
            other => infix(other.as_str()),
        }
    }

    /// `&&` and `||`. A blocking right operand is only evaluated, and only
    /// suspends, when the left operand does not decide the result.
    fn logical<'ast>(&mut self, e: &BinaryExpr<'ast>) -> Result<String> {
        let and = e.op == BinaryOp::LogAnd;
        let left = self.expr(e.left)?;
        if !self.lowers_with_cases(e.right.id()) {
            let right = self.expr(e.right)?;
            let word = if and { "and" } else { "or" };
            return Ok(format!("{} {word} {}", operand(&left), operand(&right)));
        }
        let result = self.tmp("_t");
        self.emit(format!("{result} = {left}"));
        let end = self.new_target()?;
        let decided = if and {
            format!("not {result}")
        } else {
            result.clone()
        };
        self.jump_if(&decided, end)?;
        let right = self.expr(e.right)?;
        self.emit(format!("{result} = {right}"));
        self.open_case(end)?;
        Ok(result)
    }
}
