//! The per-opcode transfer function: one exhaustive dispatch over the
//! instruction set, updating the abstract state.

use std::rc::Rc;

use crate::{
    constant::{JAVA_LANG_OBJECT, STATIC_FIELD_REGISTER},
    error::{
        analysis::{Error, Result},
        container::Locatable,
    },
    interpreter::{register_operand, Interpreter},
    method::{opcode as opc, FieldRef, Instruction, MethodRef, Operand},
    value::{Constant, Item, SpecialKind},
};

impl Interpreter<'_> {
    /// Applies the instruction at `index` to the abstract state.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] on stack underflow, malformed operands, or an
    /// opcode outside the supported set; the caller recovers by clearing
    /// the state and marking the program point unreachable.
    pub(crate) fn execute(&mut self, index: usize) -> Result<()> {
        let body = self.body;
        let instruction = &body.instructions[index];
        let pc = instruction.pc;
        let op = instruction.opcode;

        self.track_idioms(instruction);

        match op {
            // --- constants ---------------------------------------------
            opc::NOP => {}
            opc::ACONST_NULL => self.stack_mut().push(Item::null()),
            opc::ICONST_M1..=opc::ICONST_5 => {
                let value = i32::from(op) - i32::from(opc::ICONST_0);
                self.stack_mut().push(Item::with_constant("I", value));
            }
            opc::LCONST_0 | opc::LCONST_1 => {
                let value = i64::from(op - opc::LCONST_0);
                self.stack_mut().push(Item::with_constant("J", value));
            }
            opc::FCONST_0..=opc::FCONST_2 => {
                let value = f32::from(op - opc::FCONST_0);
                self.stack_mut().push(Item::with_constant("F", value));
            }
            opc::DCONST_0 | opc::DCONST_1 => {
                let value = f64::from(op - opc::DCONST_0);
                self.stack_mut().push(Item::with_constant("D", value));
            }
            opc::BIPUSH | opc::SIPUSH => {
                let value = int_operand(instruction)?;
                self.stack_mut().push(Item::with_constant("I", value));
            }
            opc::LDC | opc::LDC_W | opc::LDC2_W => self.push_by_constant(instruction)?,

            // --- local loads -------------------------------------------
            opc::ALOAD | opc::ALOAD_0..=opc::ALOAD_3 => {
                let register = required_register(instruction)?;
                self.push_by_local_object_load(register, pc);
            }
            opc::ILOAD | opc::ILOAD_0..=opc::ILOAD_3 => {
                let register = required_register(instruction)?;
                self.push_by_local_load("I", register as usize);
            }
            opc::LLOAD | opc::LLOAD_0..=opc::LLOAD_3 => {
                let register = required_register(instruction)?;
                self.push_by_local_load("J", register as usize);
            }
            opc::FLOAD | opc::FLOAD_0..=opc::FLOAD_3 => {
                let register = required_register(instruction)?;
                self.push_by_local_load("F", register as usize);
            }
            opc::DLOAD | opc::DLOAD_0..=opc::DLOAD_3 => {
                let register = required_register(instruction)?;
                self.push_by_local_load("D", register as usize);
            }

            // --- local stores ------------------------------------------
            opc::ISTORE | opc::LSTORE | opc::FSTORE | opc::DSTORE | opc::ASTORE
            | opc::ISTORE_0..=opc::ASTORE_3 => {
                let register = required_register(instruction)?;
                self.push_by_local_store(register as usize, pc)?;
            }
            opc::IINC => {
                let Operand::Iinc { register, amount } = &instruction.operand else {
                    return Err(malformed(instruction, "register/amount"));
                };
                let (register, amount) = (*register as usize, *amount);
                let current = self.local_at(register);
                let increment = Item::with_constant("I", amount);
                self.push_by_int_math(opc::IADD, &increment, &current, pc);
                self.push_by_local_store(register, pc)?;
            }

            // --- stack shuffles ----------------------------------------
            opc::POP | opc::MONITORENTER | opc::MONITOREXIT => {
                self.stack_mut().pop(pc)?;
            }
            opc::POP2 => {
                let item = self.stack_mut().pop(pc)?;
                if item.size() == 1 {
                    self.stack_mut().pop(pc)?;
                }
            }
            opc::DUP => self.handle_dup(pc)?,
            opc::DUP_X1 => self.handle_dup_x1(pc)?,
            opc::DUP_X2 => self.handle_dup_x2(pc)?,
            opc::DUP2 => self.handle_dup2(pc)?,
            opc::DUP2_X1 => self.handle_dup2_x1(pc)?,
            opc::DUP2_X2 => self.handle_dup2_x2(pc)?,
            opc::SWAP => self.handle_swap(pc)?,

            // --- arithmetic --------------------------------------------
            opc::IADD | opc::ISUB | opc::IMUL | opc::IDIV | opc::IREM | opc::IAND
            | opc::IOR | opc::IXOR | opc::ISHL | opc::ISHR | opc::IUSHR => {
                let rhs = self.stack_mut().pop(pc)?;
                let lhs = self.stack_mut().pop(pc)?;
                self.push_by_int_math(op, &lhs, &rhs, pc);
            }
            opc::LADD | opc::LSUB | opc::LMUL | opc::LDIV | opc::LREM | opc::LAND
            | opc::LOR | opc::LXOR | opc::LSHL | opc::LSHR | opc::LUSHR => {
                let rhs = self.stack_mut().pop(pc)?;
                let lhs = self.stack_mut().pop(pc)?;
                self.push_by_long_math(op, &lhs, &rhs);
            }
            opc::FADD | opc::FSUB | opc::FMUL | opc::FDIV | opc::FREM => {
                let rhs = self.stack_mut().pop(pc)?;
                let lhs = self.stack_mut().pop(pc)?;
                self.push_by_float_math(op, &lhs, &rhs);
            }
            opc::DADD | opc::DSUB | opc::DMUL | opc::DDIV | opc::DREM => {
                let rhs = self.stack_mut().pop(pc)?;
                let lhs = self.stack_mut().pop(pc)?;
                self.push_by_double_math(op, &lhs, &rhs);
            }
            opc::INEG => {
                let item = self.stack_mut().pop(pc)?;
                let result = match item.constant().and_then(Constant::as_i32) {
                    Some(value) => Item::with_constant("I", value.wrapping_neg()),
                    None => Item::typed("I"),
                };
                self.stack_mut().push(result);
            }
            opc::LNEG => {
                let item = self.stack_mut().pop(pc)?;
                let result = match item.constant().and_then(Constant::as_i64) {
                    Some(value) => Item::with_constant("J", value.wrapping_neg()),
                    None => Item::typed("J"),
                };
                self.stack_mut().push(result);
            }
            opc::FNEG => {
                let item = self.stack_mut().pop(pc)?;
                let result = match item.constant().and_then(Constant::as_f32) {
                    Some(value) => Item::with_constant("F", -value),
                    None => Item::typed("F"),
                };
                self.stack_mut().push(result);
            }
            opc::DNEG => {
                let item = self.stack_mut().pop(pc)?;
                let result = match item.constant().and_then(Constant::as_f64) {
                    Some(value) => Item::with_constant("D", -value),
                    None => Item::typed("D"),
                };
                self.stack_mut().push(result);
            }

            // --- comparisons -------------------------------------------
            opc::LCMP => self.handle_lcmp(pc)?,
            opc::FCMPG | opc::FCMPL => self.handle_fcmp(op, pc)?,
            opc::DCMPG | opc::DCMPL => self.handle_dcmp(op, pc)?,

            // --- conversions -------------------------------------------
            opc::I2B => {
                let item = self.stack_mut().pop(pc)?;
                let mut converted = Item::retyped(&item, "B");
                converted.set_could_be_negative();
                self.stack_mut().push(converted);
            }
            opc::I2C => {
                let item = self.stack_mut().pop(pc)?;
                self.stack_mut().push(Item::retyped(&item, "C"));
            }
            opc::I2S => {
                let item = self.stack_mut().pop(pc)?;
                let mut converted = Item::retyped(&item, "S");
                converted.set_could_be_negative();
                self.stack_mut().push(converted);
            }
            opc::I2L | opc::D2L | opc::F2L => {
                let item = self.stack_mut().pop(pc)?;
                let mut converted = Item::retyped(&item, "J");
                if item.special_kind() != SpecialKind::SIGNED_BYTE && op == opc::I2L {
                    converted.set_special_kind(SpecialKind::RESULT_OF_I2L);
                }
                self.stack_mut().push(converted);
            }
            opc::L2I | opc::D2I | opc::F2I => {
                let item = self.stack_mut().pop(pc)?;
                let mut converted = Item::retyped(&item, "I");
                if item.special_kind() == SpecialKind::NOT_SPECIAL {
                    converted.set_special_kind(SpecialKind::RESULT_OF_L2I);
                }
                self.stack_mut().push(converted);
            }
            opc::L2F | opc::D2F | opc::I2F => {
                let item = self.stack_mut().pop(pc)?;
                let result = match item.constant().and_then(Constant::as_f32) {
                    Some(value) => Item::with_constant("F", value),
                    None => Item::typed("F"),
                };
                self.stack_mut().push(result);
            }
            opc::F2D | opc::I2D | opc::L2D => {
                let item = self.stack_mut().pop(pc)?;
                let result = match item.constant().and_then(Constant::as_f64) {
                    Some(value) => Item::with_constant("D", value),
                    None => Item::typed("D"),
                };
                self.stack_mut().push(result);
            }

            // --- allocation --------------------------------------------
            opc::NEW => {
                let class_name = class_operand(instruction)?;
                let mut item = Item::typed(format!("L{class_name};"));
                item.set_special_kind(SpecialKind::NEWLY_ALLOCATED);
                self.stack_mut().push(item);
            }
            opc::NEWARRAY => {
                let length = self.stack_mut().pop(pc)?;
                let atype = int_operand(instruction)?;
                let element = opc::newarray_element_signature(atype as u8)
                    .ok_or_else(|| malformed(instruction, "array type code"))?;
                self.push_new_array(format!("[{element}"), &length, pc);
            }
            opc::ANEWARRAY => {
                let length = self.stack_mut().pop(pc)?;
                let class_name = class_operand(instruction)?;
                let signature = if class_name.starts_with('[') {
                    format!("[{class_name}")
                } else {
                    format!("[L{class_name};")
                };
                self.push_new_array(signature, &length, pc);
            }
            opc::MULTIANEWARRAY => {
                let Operand::MultiArray {
                    signature,
                    dimensions,
                } = &instruction.operand
                else {
                    return Err(malformed(instruction, "array signature"));
                };
                self.stack_mut().pop_n(usize::from(*dimensions), pc)?;
                self.push_by_signature(signature, pc);
                if let Some(top) = self.stack_mut().peek_mut(0) {
                    top.set_special_kind(SpecialKind::NEWLY_ALLOCATED);
                }
            }

            // --- arrays ------------------------------------------------
            opc::IALOAD | opc::SALOAD => {
                self.stack_mut().pop_n(2, pc)?;
                self.stack_mut().push(Item::typed("I"));
            }
            opc::BALOAD => {
                self.stack_mut().pop_n(2, pc)?;
                let mut item = Item::typed("I");
                item.set_special_kind(SpecialKind::SIGNED_BYTE);
                self.stack_mut().push(item);
            }
            opc::CALOAD => {
                self.stack_mut().pop_n(2, pc)?;
                let mut item = Item::typed("I");
                item.set_special_kind(SpecialKind::NON_NEGATIVE);
                self.stack_mut().push(item);
            }
            opc::DALOAD => {
                self.stack_mut().pop_n(2, pc)?;
                self.stack_mut().push(Item::typed("D"));
            }
            opc::FALOAD => {
                self.stack_mut().pop_n(2, pc)?;
                self.stack_mut().push(Item::typed("F"));
            }
            opc::LALOAD => {
                self.stack_mut().pop_n(2, pc)?;
                self.stack_mut().push(Item::typed("J"));
            }
            opc::AALOAD => {
                self.stack_mut().pop(pc)?;
                let array = self.stack_mut().pop(pc)?;
                let signature = array.signature().to_string();
                if let Some(element) = signature.strip_prefix('[') {
                    self.push_by_signature(element, pc);
                } else {
                    self.stack_mut().push(Item::null());
                }
            }
            opc::IASTORE | opc::LASTORE | opc::FASTORE | opc::DASTORE | opc::AASTORE
            | opc::BASTORE | opc::CASTORE | opc::SASTORE => {
                self.stack_mut().pop_n(3, pc)?;
            }
            opc::ARRAYLENGTH => {
                let array = self.stack_mut().pop(pc)?;
                let mut item = match array.constant() {
                    Some(length) => Item::with_constant("I", length.clone()),
                    None => Item::typed("I"),
                };
                item.set_special_kind(SpecialKind::NON_NEGATIVE);
                self.stack_mut().push(item);
            }

            // --- fields ------------------------------------------------
            opc::GETSTATIC => {
                let field = field_operand(instruction)?.clone();
                self.load_static_field(&field, pc);
            }
            opc::GETFIELD => {
                let field = field_operand(instruction)?.clone();
                self.load_instance_field(&field, pc)?;
            }
            opc::PUTSTATIC => {
                let field = field_operand(instruction)?.clone();
                self.stack_mut().pop(pc)?;
                self.erase_knowledge_of(&field);
            }
            opc::PUTFIELD => {
                let field = field_operand(instruction)?.clone();
                self.stack_mut().pop_n(2, pc)?;
                self.erase_knowledge_of(&field);
            }

            // --- type tests --------------------------------------------
            opc::CHECKCAST => {
                let class_name = class_operand(instruction)?;
                let cast_to = if class_name.starts_with('[') {
                    class_name.clone()
                } else {
                    format!("L{class_name};")
                };
                let item = self.stack_mut().pop(pc)?;
                let item = if item.signature() == cast_to {
                    item
                } else {
                    Item::retyped(&item, cast_to)
                };
                self.stack_mut().push(item);
            }
            opc::INSTANCEOF => {
                self.stack_mut().pop(pc)?;
                self.stack_mut().push(Item::typed("I"));
            }

            // --- branches ----------------------------------------------
            opc::IFEQ | opc::IFNE | opc::IFLT | opc::IFGE | opc::IFGT | opc::IFLE
            | opc::IFNULL | opc::IFNONNULL => {
                self.note_transfer_of_control();
                let top_item = self.stack_mut().pop(pc)?;
                if matches!(op, opc::IFLT | opc::IFLE) {
                    self.set_register_tested_nonnegative(top_item.register_number());
                }
                // A signed-range test on a possibly-negative special value
                // bounds that value on one path, so the label stops being
                // meaningful for its other copies.
                if top_item.value_could_be_negative()
                    && matches!(op, opc::IFLT | opc::IFLE | opc::IFGT | opc::IFGE)
                {
                    let kind = top_item.special_kind();
                    self.erase_kind_everywhere(kind);
                }
                let target = branch_target(instruction)?;
                self.add_jump_value(pc, target);
            }
            opc::IF_ICMPEQ..=opc::IF_ACMPNE => {
                self.note_transfer_of_control();
                let right = self.stack_mut().pop(pc)?;
                let left = self.stack_mut().pop(pc)?;
                let target = branch_target(instruction)?;
                self.handle_binary_branch(op, &left, &right, pc, target);
            }
            opc::GOTO | opc::GOTO_W => {
                self.note_transfer_of_control();
                self.set_reach_only_by_branch(true);
                let target = branch_target(instruction)?;
                self.add_jump_value(pc, target);
                self.stack_mut().clear();
                self.set_top(true);
            }
            opc::JSR | opc::JSR_W => {
                self.note_transfer_of_control();
                self.set_reach_only_by_branch(false);
                self.stack_mut().push(Item::typed(""));
                let target = branch_target(instruction)?;
                self.add_jump_value(pc, target);
                self.stack_mut().pop(pc)?;
                let backwards = matches!(
                    instruction.operand,
                    Operand::Branch { offset, .. } if offset < 0
                );
                if backwards {
                    // Backwards subroutines are rare and strange; degrade
                    // the stack to unknowns of the same depth.
                    let depth = self.stack_depth();
                    self.stack_mut().clear();
                    for _ in 0..depth {
                        self.stack_mut().push(Item::null());
                    }
                }
                self.set_top(false);
            }
            opc::TABLESWITCH | opc::LOOKUPSWITCH => {
                self.note_transfer_of_control();
                self.set_reach_only_by_branch(true);
                self.stack_mut().pop(pc)?;
                let Operand::Switch { default, targets } = &instruction.operand else {
                    return Err(malformed(instruction, "switch targets"));
                };
                self.add_jump_value(pc, *default);
                for &target in targets {
                    self.add_jump_value(pc, target);
                }
            }

            // --- returns and throws ------------------------------------
            opc::IRETURN | opc::LRETURN | opc::FRETURN | opc::DRETURN | opc::ARETURN => {
                self.note_transfer_of_control();
                self.set_reach_only_by_branch(true);
                self.stack_mut().pop(pc)?;
            }
            opc::RETURN | opc::RET => {
                self.note_transfer_of_control();
                self.set_reach_only_by_branch(true);
            }
            opc::ATHROW => {
                self.stack_mut().pop(pc)?;
                self.note_transfer_of_control();
                self.set_reach_only_by_branch(true);
                self.set_top(true);
            }

            // --- calls -------------------------------------------------
            opc::INVOKEVIRTUAL | opc::INVOKESPECIAL | opc::INVOKESTATIC
            | opc::INVOKEINTERFACE => {
                let method = method_operand(instruction)?.clone();
                self.process_method_call(op, &method, pc)?;
            }
            opc::INVOKEDYNAMIC => self.process_invoke_dynamic(instruction)?,

            _ => {
                return Err(Error::UnsupportedOpcode {
                    opcode: op,
                    name:   opc::name(op),
                }
                .locate(pc))
            }
        }
        Ok(())
    }

    fn push_by_constant(&mut self, instruction: &Instruction) -> Result<()> {
        let item = match &instruction.operand {
            Operand::Int(value) => Item::with_constant("I", *value),
            Operand::Long(value) => Item::with_constant("J", *value),
            Operand::Float(value) => Item::with_constant("F", *value),
            Operand::Double(value) => Item::with_constant("D", *value),
            Operand::Str(value) => {
                Item::with_constant("Ljava/lang/String;", Constant::Str(value.clone()))
            }
            Operand::Class(name) => {
                Item::with_constant("Ljava/lang/Class;", Constant::Class(name.clone()))
            }
            // A dynamically-computed constant is otherwise opaque; its name
            // is the best constant available.
            Operand::DynamicConst { name, signature } => {
                Item::with_constant(signature.clone(), Constant::Str(Rc::from(name.as_str())))
            }
            _ => return Err(malformed(instruction, "constant")),
        };
        self.stack_mut().push(item);
        Ok(())
    }

    /// A reference load recovers the precise declared type from the
    /// local-variable table when the class file carries one.
    fn push_by_local_object_load(&mut self, register: u16, pc: u32) {
        let signature = self
            .body()
            .local_variable_signature(register, pc)
            .unwrap_or(JAVA_LANG_OBJECT)
            .to_string();
        self.push_by_local_load(&signature, register as usize);
    }

    fn push_new_array(&mut self, signature: String, length: &Item, pc: u32) {
        let mut item = match length.constant() {
            Some(length) => Item::with_constant(signature, length.clone()),
            None => Item::typed(signature),
        };
        item.set_pc(pc as i32);
        item.set_special_kind(SpecialKind::NEWLY_ALLOCATED);
        self.stack_mut().push(item);
    }

    fn load_static_field(&mut self, field: &Rc<FieldRef>, pc: u32) {
        if let Some(summary) = self.context().field_summary_for(field) {
            let mut item = summary;
            item.set_loaded_from_field(Some(field.clone()), STATIC_FIELD_REGISTER);
            item.set_pc(pc as i32);
            self.stack_mut().push(item);
            return;
        }
        let mut item =
            Item::from_field(field.signature.clone(), field.clone(), STATIC_FIELD_REGISTER);
        if field.name == "separator" && field.class_name == "java/io/File" {
            item.set_special_kind(SpecialKind::FILE_SEPARATOR_STRING);
        }
        item.set_pc(pc as i32);
        self.stack_mut().push(item);
    }

    fn load_instance_field(&mut self, field: &Rc<FieldRef>, pc: u32) -> Result<()> {
        if let Some(summary) = self.context().field_summary_for(field) {
            let address = self.stack_mut().pop(pc)?;
            let mut item = summary;
            item.set_loaded_from_field(Some(field.clone()), address.register_number());
            item.set_pc(pc as i32);
            self.stack_mut().push(item);
            return Ok(());
        }
        let object = self.stack_mut().pop(pc)?;
        let mut item = Item::from_field(
            field.signature.clone(),
            field.clone(),
            object.register_number(),
        );
        item.set_pc(pc as i32);
        self.stack_mut().push(item);
        Ok(())
    }

    /// The two-operand comparison branches: statically decide the edge when
    /// both sides are constant, otherwise record it, clearing the
    /// rarely-negative labels when the comparison is the
    /// `Integer.MIN_VALUE` guard detectors look for.
    fn handle_binary_branch(&mut self, op: u8, left: &Item, right: &Item, pc: u32, target: u32) {
        let mut take_jump = false;
        let mut handled = false;

        if matches!(op, opc::IF_ACMPEQ | opc::IF_ACMPNE) {
            let left_constant = left.constant();
            let right_constant = right.constant();
            let constants_differ = matches!(
                (left_constant, right_constant),
                (Some(l), Some(r)) if l != r
            );
            if constants_differ
                || left_constant.is_some() && right.is_null()
                || right_constant.is_some() && left.is_null()
            {
                handled = true;
                take_jump = op == opc::IF_ACMPNE;
            }
        } else if let (Some(Constant::Int(l)), Some(Constant::Int(r))) =
            (left.constant(), right.constant())
        {
            handled = true;
            take_jump = match op {
                opc::IF_ICMPEQ => l == r,
                opc::IF_ICMPNE => l != r,
                opc::IF_ICMPGE => l >= r,
                opc::IF_ICMPGT => l > r,
                opc::IF_ICMPLE => l <= r,
                opc::IF_ICMPLT => l < r,
                _ => {
                    handled = false;
                    false
                }
            };
        }

        if handled {
            if take_jump {
                self.add_jump_value(pc, target);
                self.set_top(true);
            }
            // An impossible edge is simply not recorded.
            return;
        }

        if right.has_constant_i32(i32::MIN) && left.might_rarely_be_negative()
            || left.has_constant_i32(i32::MIN) && right.might_rarely_be_negative()
        {
            for item in self.stack_mut().iter_mut() {
                if item.might_rarely_be_negative() {
                    item.set_special_kind(SpecialKind::NOT_SPECIAL);
                }
            }
            for item in self.locals_iter_mut() {
                if item.might_rarely_be_negative() {
                    item.set_special_kind(SpecialKind::NOT_SPECIAL);
                }
            }
        }
        self.add_jump_value(pc, target);
    }

    fn erase_kind_everywhere(&mut self, kind: SpecialKind) {
        for item in self.stack_mut().iter_mut() {
            if item.special_kind() == kind {
                item.set_special_kind(SpecialKind::NOT_SPECIAL);
            }
        }
        for item in self.locals_iter_mut() {
            if item.special_kind() == kind {
                item.set_special_kind(SpecialKind::NOT_SPECIAL);
            }
        }
    }

    // --- stack shuffles ----------------------------------------------------

    fn handle_swap(&mut self, pc: u32) -> Result<()> {
        let first = self.stack_mut().pop(pc)?;
        let second = self.stack_mut().pop(pc)?;
        self.stack_mut().push(first);
        self.stack_mut().push(second);
        Ok(())
    }

    fn handle_dup(&mut self, pc: u32) -> Result<()> {
        let item = self.stack_mut().pop(pc)?;
        self.stack_mut().push(item.clone());
        self.stack_mut().push(item);
        Ok(())
    }

    fn handle_dup_x1(&mut self, pc: u32) -> Result<()> {
        let first = self.stack_mut().pop(pc)?;
        let second = self.stack_mut().pop(pc)?;
        self.stack_mut().push(first.clone());
        self.stack_mut().push(second);
        self.stack_mut().push(first);
        Ok(())
    }

    fn handle_dup_x2(&mut self, pc: u32) -> Result<()> {
        let first = self.stack_mut().pop(pc)?;
        let second = self.stack_mut().pop(pc)?;
        if second.is_wide() {
            self.stack_mut().push(first.clone());
            self.stack_mut().push(second);
            self.stack_mut().push(first);
        } else {
            let third = self.stack_mut().pop(pc)?;
            self.stack_mut().push(first.clone());
            self.stack_mut().push(third);
            self.stack_mut().push(second);
            self.stack_mut().push(first);
        }
        Ok(())
    }

    fn handle_dup2(&mut self, pc: u32) -> Result<()> {
        let first = self.stack_mut().pop(pc)?;
        if first.is_wide() {
            self.stack_mut().push(first.clone());
            self.stack_mut().push(first);
        } else {
            let second = self.stack_mut().pop(pc)?;
            self.stack_mut().push(second.clone());
            self.stack_mut().push(first.clone());
            self.stack_mut().push(second);
            self.stack_mut().push(first);
        }
        Ok(())
    }

    fn handle_dup2_x1(&mut self, pc: u32) -> Result<()> {
        let first = self.stack_mut().pop(pc)?;
        let second = self.stack_mut().pop(pc)?;
        if first.is_wide() {
            self.stack_mut().push(first.clone());
            self.stack_mut().push(second);
            self.stack_mut().push(first);
        } else {
            let third = self.stack_mut().pop(pc)?;
            self.stack_mut().push(second.clone());
            self.stack_mut().push(first.clone());
            self.stack_mut().push(third);
            self.stack_mut().push(second);
            self.stack_mut().push(first);
        }
        Ok(())
    }

    fn handle_dup2_x2(&mut self, pc: u32) -> Result<()> {
        let first = self.stack_mut().pop(pc)?;
        let second = self.stack_mut().pop(pc)?;
        if first.is_wide() {
            if second.is_wide() {
                self.stack_mut().push(first.clone());
                self.stack_mut().push(second);
                self.stack_mut().push(first);
            } else {
                let third = self.stack_mut().pop(pc)?;
                self.stack_mut().push(first.clone());
                self.stack_mut().push(third);
                self.stack_mut().push(second);
                self.stack_mut().push(first);
            }
        } else {
            let third = self.stack_mut().pop(pc)?;
            if third.is_wide() {
                self.stack_mut().push(second.clone());
                self.stack_mut().push(first.clone());
                self.stack_mut().push(third);
                self.stack_mut().push(second);
                self.stack_mut().push(first);
            } else {
                let fourth = self.stack_mut().pop(pc)?;
                self.stack_mut().push(second.clone());
                self.stack_mut().push(first.clone());
                self.stack_mut().push(fourth);
                self.stack_mut().push(third);
                self.stack_mut().push(second);
                self.stack_mut().push(first);
            }
        }
        Ok(())
    }

    fn locals_iter_mut(&mut self) -> impl Iterator<Item = &mut Item> {
        self.locals.iter_mut()
    }
}

fn malformed(instruction: &Instruction, expected: &'static str) -> crate::error::analysis::LocatedError {
    Error::MalformedOperand {
        opcode: instruction.opcode,
        name: opc::name(instruction.opcode),
        expected,
    }
    .locate(instruction.pc)
}

fn int_operand(instruction: &Instruction) -> Result<i32> {
    match instruction.operand {
        Operand::Int(value) => Ok(value),
        _ => Err(malformed(instruction, "int")),
    }
}

fn class_operand(instruction: &Instruction) -> Result<&String> {
    match &instruction.operand {
        Operand::Class(name) => Ok(name),
        _ => Err(malformed(instruction, "class")),
    }
}

fn field_operand(instruction: &Instruction) -> Result<&Rc<FieldRef>> {
    match &instruction.operand {
        Operand::Field(field) => Ok(field),
        _ => Err(malformed(instruction, "field")),
    }
}

fn method_operand(instruction: &Instruction) -> Result<&Rc<MethodRef>> {
    match &instruction.operand {
        Operand::Method(method) => Ok(method),
        _ => Err(malformed(instruction, "method")),
    }
}

fn branch_target(instruction: &Instruction) -> Result<u32> {
    match instruction.operand {
        Operand::Branch { target, .. } => Ok(target),
        _ => Err(malformed(instruction, "branch target")),
    }
}

fn required_register(instruction: &Instruction) -> Result<u16> {
    register_operand(instruction).ok_or_else(|| malformed(instruction, "register"))
}
