//! Arithmetic, bitwise and comparison transfer functions, with constant
//! folding and the special-kind attachment rules that ride along with
//! particular operator shapes.

use crate::{
    error::analysis::Result,
    interpreter::Interpreter,
    method::opcode as opc,
    value::{Constant, Item, SpecialKind},
};

/// Folds a binary int operation over two known operands.
///
/// Division and remainder by zero yield [`None`]: the analysed code would
/// throw at runtime, so no constant describes the result.
fn fold_int(op: u8, lhs: i32, rhs: i32) -> Option<i32> {
    let value = match op {
        opc::IADD => lhs.wrapping_add(rhs),
        opc::ISUB => lhs.wrapping_sub(rhs),
        opc::IMUL => lhs.wrapping_mul(rhs),
        opc::IDIV => {
            if rhs == 0 {
                return None;
            }
            lhs.wrapping_div(rhs)
        }
        opc::IREM => {
            if rhs == 0 {
                return None;
            }
            lhs.wrapping_rem(rhs)
        }
        opc::IAND => lhs & rhs,
        opc::IOR => lhs | rhs,
        opc::IXOR => lhs ^ rhs,
        opc::ISHL => lhs.wrapping_shl(rhs as u32),
        opc::ISHR => lhs.wrapping_shr(rhs as u32),
        opc::IUSHR => (lhs as u32).wrapping_shr(rhs as u32) as i32,
        _ => return None,
    };
    Some(value)
}

/// Folds a binary long operation; the shift distances come from an int
/// operand.
fn fold_long(op: u8, lhs: i64, rhs: i64) -> Option<i64> {
    let value = match op {
        opc::LADD => lhs.wrapping_add(rhs),
        opc::LSUB => lhs.wrapping_sub(rhs),
        opc::LMUL => lhs.wrapping_mul(rhs),
        opc::LDIV => {
            if rhs == 0 {
                return None;
            }
            lhs.wrapping_div(rhs)
        }
        opc::LREM => {
            if rhs == 0 {
                return None;
            }
            lhs.wrapping_rem(rhs)
        }
        opc::LAND => lhs & rhs,
        opc::LOR => lhs | rhs,
        opc::LXOR => lhs ^ rhs,
        opc::LSHL => lhs.wrapping_shl(rhs as u32),
        opc::LSHR => lhs.wrapping_shr(rhs as u32),
        opc::LUSHR => (lhs as u64).wrapping_shr(rhs as u32) as i64,
        _ => return None,
    };
    Some(value)
}

fn is_power_of_two(value: i32) -> bool {
    value > 0 && value & (value - 1) == 0
}

/// The partial-information int cases: one known operand can still pin the
/// result or attach a label.
fn unfolded_int_math(
    op: u8,
    lhs: &Item,
    rhs: &Item,
    lhs_constant: Option<i32>,
    rhs_constant: Option<i32>,
) -> Item {
    let mut new_value = Item::typed("I");
    match op {
        opc::ISHL | opc::ISHR | opc::IUSHR => {
            if let Some(distance) = rhs_constant {
                if distance & 0x1f == 0 {
                    new_value = lhs.clone();
                } else if op == opc::ISHL && distance & 0x1f >= 8 {
                    new_value.set_special_kind(SpecialKind::LOW_8_BITS_CLEAR);
                }
            } else if lhs_constant == Some(0) {
                new_value = Item::with_constant("I", 0);
            }
        }
        opc::IAND => {
            if let Some(mask) = lhs_constant.or(rhs_constant) {
                if mask == 0 {
                    new_value = Item::with_constant("I", 0);
                } else if mask & 0xff == 0 {
                    new_value.set_special_kind(SpecialKind::LOW_8_BITS_CLEAR);
                } else if mask >= 0 {
                    new_value.set_special_kind(SpecialKind::NON_NEGATIVE);
                }
            } else if lhs.special_kind() == SpecialKind::ZERO_MEANS_NULL {
                new_value.set_special_kind(SpecialKind::ZERO_MEANS_NULL);
                new_value.set_pc(lhs.pc());
            } else if rhs.special_kind() == SpecialKind::ZERO_MEANS_NULL {
                new_value.set_special_kind(SpecialKind::ZERO_MEANS_NULL);
                new_value.set_pc(rhs.pc());
            }
        }
        opc::IOR => {
            if lhs.special_kind() == SpecialKind::NONZERO_MEANS_NULL {
                new_value.set_special_kind(SpecialKind::NONZERO_MEANS_NULL);
                new_value.set_pc(lhs.pc());
            } else if rhs.special_kind() == SpecialKind::NONZERO_MEANS_NULL {
                new_value.set_special_kind(SpecialKind::NONZERO_MEANS_NULL);
                new_value.set_pc(rhs.pc());
            }
        }
        _ => {}
    }
    new_value
}

impl Interpreter<'_> {
    /// Integer arithmetic: fold constants when possible, and attach the
    /// labels that make remainder/average/mask idioms recognisable to
    /// detectors.
    pub(crate) fn push_by_int_math(&mut self, op: u8, lhs: &Item, rhs: &Item, pc: u32) {
        let lhs_constant = lhs.constant().and_then(Constant::as_i32);
        let rhs_constant = rhs.constant().and_then(Constant::as_i32);

        let mut new_value = match (lhs_constant, rhs_constant) {
            (Some(l), Some(r)) => {
                let mut item = match fold_int(op, l, r) {
                    Some(folded) => Item::with_constant("I", folded),
                    None => Item::typed("I"),
                };
                if op == opc::IAND
                    && ((r & 0xff) == 0 && r != 0 || (l & 0xff) == 0 && l != 0)
                {
                    item.set_special_kind(SpecialKind::LOW_8_BITS_CLEAR);
                }
                if op == opc::ISHL && r >= 8 {
                    item.set_special_kind(SpecialKind::LOW_8_BITS_CLEAR);
                }
                item
            }
            _ => unfolded_int_math(op, lhs, rhs, lhs_constant, rhs_constant),
        };

        if lhs.special_kind() == SpecialKind::INTEGER_SUM {
            if let Some(r) = rhs_constant {
                if op == opc::IDIV && r == 2 || op == opc::ISHR && r == 1 {
                    new_value.set_special_kind(SpecialKind::AVERAGE_COMPUTED_USING_DIVISION);
                }
            }
        }
        if op == opc::IADD
            && new_value.special_kind() == SpecialKind::NOT_SPECIAL
            && lhs.constant().is_none()
            && rhs.constant().is_none()
        {
            new_value.set_special_kind(SpecialKind::INTEGER_SUM);
        }
        if op == opc::IREM {
            let remainder_kind = match lhs.special_kind() {
                SpecialKind::HASHCODE_INT => Some(SpecialKind::HASHCODE_INT_REMAINDER),
                SpecialKind::RANDOM_INT => Some(SpecialKind::RANDOM_INT_REMAINDER),
                _ => None,
            };
            if let Some(kind) = remainder_kind {
                // A remainder by a power of two is a mask; the sign oddity
                // the label warns about does not survive it.
                let masks = rhs_constant.is_some_and(is_power_of_two);
                if !masks {
                    new_value.set_special_kind(kind);
                }
            }
        }

        new_value.set_pc(pc as i32);
        self.stack_mut().push(new_value);
    }

    /// Long arithmetic. The labels mirror the int rules where the operator
    /// shapes carry over.
    pub(crate) fn push_by_long_math(&mut self, op: u8, lhs: &Item, rhs: &Item) {
        let lhs_constant = lhs.constant().and_then(Constant::as_i64);
        let rhs_constant = rhs.constant().and_then(Constant::as_i64);

        let new_value = match (lhs_constant, rhs_constant) {
            (Some(l), Some(r)) => {
                let mut item = match fold_long(op, l, r) {
                    Some(folded) => Item::with_constant("J", folded),
                    None => Item::typed("J"),
                };
                if op == opc::LAND
                    && ((r & 0xff) == 0 && r != 0 || (l & 0xff) == 0 && l != 0)
                {
                    item.set_special_kind(SpecialKind::LOW_8_BITS_CLEAR);
                }
                if op == opc::LSHL && r >= 8 {
                    item.set_special_kind(SpecialKind::LOW_8_BITS_CLEAR);
                }
                item
            }
            _ => {
                let mut item = Item::typed("J");
                if op == opc::LSHL && rhs_constant.is_some_and(|distance| distance >= 8) {
                    item.set_special_kind(SpecialKind::LOW_8_BITS_CLEAR);
                } else if op == opc::LAND
                    && (lhs_constant.is_some_and(|mask| mask & 0xff == 0 && mask != 0)
                        || rhs_constant.is_some_and(|mask| mask & 0xff == 0 && mask != 0))
                {
                    item.set_special_kind(SpecialKind::LOW_8_BITS_CLEAR);
                }
                item
            }
        };
        self.stack_mut().push(new_value);
    }

    /// Float arithmetic: folded results are plain constants; unknown
    /// results carry the float-math label.
    pub(crate) fn push_by_float_math(&mut self, op: u8, lhs: &Item, rhs: &Item) {
        let folded = match (
            lhs.constant().and_then(Constant::as_f32),
            rhs.constant().and_then(Constant::as_f32),
        ) {
            (Some(l), Some(r)) => match op {
                opc::FADD => Some(l + r),
                opc::FSUB => Some(l - r),
                opc::FMUL => Some(l * r),
                opc::FDIV => Some(l / r),
                opc::FREM => Some(l % r),
                _ => None,
            },
            _ => None,
        };
        let item = match folded {
            Some(value) => Item::with_constant("F", value),
            None => {
                let mut item = Item::typed("F");
                item.set_special_kind(SpecialKind::FLOAT_MATH);
                item
            }
        };
        self.stack_mut().push(item);
    }

    /// Double arithmetic: as for floats, with a division by a non-constant
    /// divisor additionally marked nasty.
    pub(crate) fn push_by_double_math(&mut self, op: u8, lhs: &Item, rhs: &Item) {
        let folded = match (
            lhs.constant().and_then(Constant::as_f64),
            rhs.constant().and_then(Constant::as_f64),
        ) {
            (Some(l), Some(r)) => match op {
                opc::DADD => Some(l + r),
                opc::DSUB => Some(l - r),
                opc::DMUL => Some(l * r),
                opc::DDIV => Some(l / r),
                opc::DREM => Some(l % r),
                _ => None,
            },
            _ => None,
        };
        let item = match folded {
            Some(value) => Item::with_constant("D", value),
            None => {
                let mut item = Item::typed("D");
                let kind = if op == opc::DDIV && rhs.constant().is_none() {
                    SpecialKind::NASTY_FLOAT_MATH
                } else {
                    SpecialKind::FLOAT_MATH
                };
                item.set_special_kind(kind);
                item
            }
        };
        self.stack_mut().push(item);
    }

    pub(crate) fn handle_lcmp(&mut self, pc: u32) -> Result<()> {
        let rhs = self.stack_mut().pop(pc)?;
        let lhs = self.stack_mut().pop(pc)?;
        let result = match (
            lhs.constant().and_then(Constant::as_i64),
            rhs.constant().and_then(Constant::as_i64),
        ) {
            (Some(l), Some(r)) => {
                let ordering = match l.cmp(&r) {
                    std::cmp::Ordering::Less => -1,
                    std::cmp::Ordering::Equal => 0,
                    std::cmp::Ordering::Greater => 1,
                };
                Item::with_constant("I", ordering)
            }
            _ => Item::typed("I"),
        };
        self.stack_mut().push(result);
        Ok(())
    }

    pub(crate) fn handle_fcmp(&mut self, op: u8, pc: u32) -> Result<()> {
        let rhs = self.stack_mut().pop(pc)?;
        let lhs = self.stack_mut().pop(pc)?;
        let result = match (
            lhs.constant().and_then(Constant::as_f32),
            rhs.constant().and_then(Constant::as_f32),
        ) {
            (Some(l), Some(r)) => {
                let ordering = if l.is_nan() || r.is_nan() {
                    if op == opc::FCMPG {
                        1
                    } else {
                        -1
                    }
                } else if l < r {
                    -1
                } else if l > r {
                    1
                } else {
                    0
                };
                Item::with_constant("I", ordering)
            }
            _ => Item::typed("I"),
        };
        self.stack_mut().push(result);
        Ok(())
    }

    pub(crate) fn handle_dcmp(&mut self, op: u8, pc: u32) -> Result<()> {
        let rhs = self.stack_mut().pop(pc)?;
        let lhs = self.stack_mut().pop(pc)?;
        let result = match (
            lhs.constant().and_then(Constant::as_f64),
            rhs.constant().and_then(Constant::as_f64),
        ) {
            (Some(l), Some(r)) => {
                let ordering = if l.is_nan() || r.is_nan() {
                    if op == opc::DCMPG {
                        1
                    } else {
                        -1
                    }
                } else if l < r {
                    -1
                } else if l > r {
                    1
                } else {
                    0
                };
                Item::with_constant("I", ordering)
            }
            _ => Item::typed("I"),
        };
        self.stack_mut().push(result);
        Ok(())
    }
}
