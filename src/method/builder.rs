//! A small assembler for [`MethodBody`] values.
//!
//! The analyzer normally consumes bodies produced by an external
//! dismantler; the builder exists so that tests (and embedders without a
//! class file in hand) can assemble instruction sequences with correct
//! program counters and resolved branch targets.

use std::rc::Rc;

use anyhow::anyhow;

use crate::{
    error::{self, container::Locatable, Error},
    method::{
        instruction::{ExceptionHandler, Instruction, LocalVariableSlot, Operand},
        opcode,
        FieldRef,
        MethodBody,
        MethodRef,
    },
};

/// A forward-referencable position in the body being assembled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Label(usize);

/// An assembler for method bodies.
///
/// Program counters are assigned as instructions are appended, using the
/// encoded length each instruction would have in a class file. Branches
/// reference [`Label`]s, which may be bound before or after the branch is
/// appended; all targets are resolved in [`Self::build`].
#[derive(Debug)]
pub struct BodyBuilder {
    class_name: String,
    name: String,
    signature: String,
    is_static: bool,
    next_pc: u32,
    instructions: Vec<ProtoInstruction>,
    labels: Vec<Option<u32>>,
    handlers: Vec<ProtoHandler>,
    local_variables: Vec<LocalVariableSlot>,
}

#[derive(Debug)]
struct ProtoInstruction {
    pc: u32,
    opcode: u8,
    operand: ProtoOperand,
}

#[derive(Debug)]
enum ProtoOperand {
    Ready(Operand),
    Branch(Label),
    Switch { default: Label, targets: Vec<Label> },
}

#[derive(Debug)]
struct ProtoHandler {
    start: Label,
    end: Label,
    handler: Label,
    catch_type: Option<String>,
}

impl BodyBuilder {
    /// Creates a builder for an instance method of `class_name`.
    #[must_use]
    pub fn new(
        class_name: impl Into<String>,
        name: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            name: name.into(),
            signature: signature.into(),
            is_static: false,
            next_pc: 0,
            instructions: Vec::new(),
            labels: Vec::new(),
            handlers: Vec::new(),
            local_variables: Vec::new(),
        }
    }

    /// Marks the method under construction as static.
    pub fn static_method(&mut self) -> &mut Self {
        self.is_static = true;
        self
    }

    /// Creates a fresh, unbound label.
    pub fn fresh_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the current position.
    ///
    /// # Panics
    ///
    /// Panics if the label was already bound; reusing a label is a
    /// programmer error in the test being written.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        assert!(
            self.labels[label.0].replace(self.next_pc).is_none(),
            "label bound twice"
        );
        self
    }

    /// Appends an operand-less instruction.
    pub fn op(&mut self, opcode: u8) -> &mut Self {
        self.append(opcode, ProtoOperand::Ready(Operand::None), 1)
    }

    /// Appends a load/store/`ret`-style instruction addressing `register`.
    ///
    /// The `_0`‥`_3` short forms carry the register implicitly and take no
    /// operand bytes.
    pub fn op_reg(&mut self, opcode: u8, register: u16) -> &mut Self {
        self.append(opcode, ProtoOperand::Ready(Operand::Register(register)), 2)
    }

    /// Appends the shortest instruction pushing the int constant `value`.
    pub fn iconst(&mut self, value: i32) -> &mut Self {
        match value {
            -1..=5 => {
                let op = (opcode::ICONST_0 as i32 + value) as u8;
                self.op(op)
            }
            v if i8::try_from(v).is_ok() => {
                self.append(opcode::BIPUSH, ProtoOperand::Ready(Operand::Int(v)), 2)
            }
            v if i16::try_from(v).is_ok() => {
                self.append(opcode::SIPUSH, ProtoOperand::Ready(Operand::Int(v)), 3)
            }
            v => self.append(opcode::LDC, ProtoOperand::Ready(Operand::Int(v)), 2),
        }
    }

    /// Appends an `ldc` of a string constant.
    pub fn ldc_str(&mut self, value: &str) -> &mut Self {
        let operand = Operand::Str(Rc::from(value));
        self.append(opcode::LDC, ProtoOperand::Ready(operand), 2)
    }

    /// Appends an `ldc` of a class constant (slashed name).
    pub fn ldc_class(&mut self, class_name: &str) -> &mut Self {
        let operand = Operand::Class(class_name.to_string());
        self.append(opcode::LDC, ProtoOperand::Ready(operand), 2)
    }

    /// Appends an `ldc` of a float constant.
    pub fn ldc_float(&mut self, value: f32) -> &mut Self {
        self.append(opcode::LDC, ProtoOperand::Ready(Operand::Float(value)), 2)
    }

    /// Appends an `ldc2_w` of a long constant.
    pub fn ldc_long(&mut self, value: i64) -> &mut Self {
        self.append(opcode::LDC2_W, ProtoOperand::Ready(Operand::Long(value)), 3)
    }

    /// Appends an `ldc2_w` of a double constant.
    pub fn ldc_double(&mut self, value: f64) -> &mut Self {
        self.append(
            opcode::LDC2_W,
            ProtoOperand::Ready(Operand::Double(value)),
            3,
        )
    }

    /// Appends a branch instruction targeting `label`.
    pub fn branch(&mut self, opcode_byte: u8, label: Label) -> &mut Self {
        let length = match opcode_byte {
            opcode::GOTO_W | opcode::JSR_W => 5,
            _ => 3,
        };
        self.append(opcode_byte, ProtoOperand::Branch(label), length)
    }

    /// Appends a `tableswitch` over the provided case targets.
    pub fn tableswitch(&mut self, default: Label, targets: Vec<Label>) -> &mut Self {
        let pad = (4 - (self.next_pc + 1) % 4) % 4;
        let length = 1 + pad + 12 + 4 * targets.len() as u32;
        self.append(
            opcode::TABLESWITCH,
            ProtoOperand::Switch { default, targets },
            length,
        )
    }

    /// Appends a `lookupswitch` over the provided case targets.
    pub fn lookupswitch(&mut self, default: Label, targets: Vec<Label>) -> &mut Self {
        let pad = (4 - (self.next_pc + 1) % 4) % 4;
        let length = 1 + pad + 8 + 8 * targets.len() as u32;
        self.append(
            opcode::LOOKUPSWITCH,
            ProtoOperand::Switch { default, targets },
            length,
        )
    }

    /// Appends an `iinc` of `register` by `amount`.
    pub fn iinc(&mut self, register: u16, amount: i32) -> &mut Self {
        self.append(
            opcode::IINC,
            ProtoOperand::Ready(Operand::Iinc { register, amount }),
            3,
        )
    }

    /// Appends a field access instruction.
    pub fn field(
        &mut self,
        opcode_byte: u8,
        class_name: &str,
        name: &str,
        signature: &str,
        is_public: bool,
    ) -> &mut Self {
        let operand = Operand::Field(FieldRef::interned(class_name, name, signature, is_public));
        self.append(opcode_byte, ProtoOperand::Ready(operand), 3)
    }

    /// Appends a method invocation instruction.
    pub fn invoke(
        &mut self,
        opcode_byte: u8,
        class_name: &str,
        name: &str,
        signature: &str,
    ) -> &mut Self {
        let length = match opcode_byte {
            opcode::INVOKEINTERFACE => 5,
            _ => 3,
        };
        let operand = Operand::Method(MethodRef::interned(class_name, name, signature));
        self.append(opcode_byte, ProtoOperand::Ready(operand), length)
    }

    /// Appends an `invokedynamic` call site.
    pub fn invokedynamic(
        &mut self,
        name: &str,
        signature: &str,
        bootstrap_arg: Option<&str>,
    ) -> &mut Self {
        let operand = Operand::Dynamic {
            name:          name.to_string(),
            signature:     signature.to_string(),
            bootstrap_arg: bootstrap_arg.map(Rc::from),
        };
        self.append(opcode::INVOKEDYNAMIC, ProtoOperand::Ready(operand), 5)
    }

    /// Appends a `new` of the class with the provided slashed name.
    pub fn new_object(&mut self, class_name: &str) -> &mut Self {
        let operand = Operand::Class(class_name.to_string());
        self.append(opcode::NEW, ProtoOperand::Ready(operand), 3)
    }

    /// Appends a `newarray` of the primitive element type code.
    pub fn newarray(&mut self, atype: u8) -> &mut Self {
        self.append(opcode::NEWARRAY, ProtoOperand::Ready(Operand::Int(atype.into())), 2)
    }

    /// Appends an `anewarray` of the provided element class.
    pub fn anewarray(&mut self, class_name: &str) -> &mut Self {
        let operand = Operand::Class(class_name.to_string());
        self.append(opcode::ANEWARRAY, ProtoOperand::Ready(operand), 3)
    }

    /// Appends a `multianewarray` of `dimensions` dimensions.
    pub fn multianewarray(&mut self, signature: &str, dimensions: u8) -> &mut Self {
        let operand = Operand::MultiArray {
            signature: signature.to_string(),
            dimensions,
        };
        self.append(opcode::MULTIANEWARRAY, ProtoOperand::Ready(operand), 4)
    }

    /// Appends a `checkcast` to the provided class.
    pub fn checkcast(&mut self, class_name: &str) -> &mut Self {
        let operand = Operand::Class(class_name.to_string());
        self.append(opcode::CHECKCAST, ProtoOperand::Ready(operand), 3)
    }

    /// Appends an `instanceof` test against the provided class.
    pub fn instance_of(&mut self, class_name: &str) -> &mut Self {
        let operand = Operand::Class(class_name.to_string());
        self.append(opcode::INSTANCEOF, ProtoOperand::Ready(operand), 3)
    }

    /// Registers an exception handler covering `[start, end)` that jumps to
    /// `handler`, catching `catch_type` (slashed) or everything.
    pub fn handler(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> &mut Self {
        self.handlers.push(ProtoHandler {
            start,
            end,
            handler,
            catch_type: catch_type.map(String::from),
        });
        self
    }

    /// Registers a local-variable table entry spanning the whole body.
    pub fn local_variable(&mut self, register: u16, signature: &str) -> &mut Self {
        self.local_variables.push(LocalVariableSlot {
            register,
            start_pc: 0,
            length: u32::MAX,
            signature: signature.to_string(),
        });
        self
    }

    /// Resolves all labels and produces the method body.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if a referenced label was never bound. The error is
    /// located at the instruction that references the label (exception
    /// handler entries, which have no referencing instruction, report
    /// offset 0).
    pub fn build(&mut self) -> error::Result<MethodBody> {
        let labels = &self.labels;
        let resolve = |label: &Label, at: u32| -> error::Result<u32> {
            labels[label.0].ok_or_else(|| {
                Error::from(anyhow!("label {} referenced but never bound", label.0))
                    .locate(at)
                    .into()
            })
        };

        let mut instructions = Vec::with_capacity(self.instructions.len());
        for proto in &self.instructions {
            let operand = match &proto.operand {
                ProtoOperand::Ready(operand) => operand.clone(),
                ProtoOperand::Branch(label) => {
                    let target = resolve(label, proto.pc)?;
                    Operand::Branch {
                        offset: target as i32 - proto.pc as i32,
                        target,
                    }
                }
                ProtoOperand::Switch { default, targets } => Operand::Switch {
                    default: resolve(default, proto.pc)?,
                    targets: targets
                        .iter()
                        .map(|target| resolve(target, proto.pc))
                        .collect::<error::Result<_>>()?,
                },
            };
            instructions.push(Instruction {
                pc: proto.pc,
                opcode: proto.opcode,
                operand,
            });
        }

        let mut exception_table = Vec::with_capacity(self.handlers.len());
        for proto in &self.handlers {
            exception_table.push(ExceptionHandler {
                start_pc:   resolve(&proto.start, 0)?,
                end_pc:     resolve(&proto.end, 0)?,
                handler_pc: resolve(&proto.handler, 0)?,
                catch_type: proto.catch_type.clone(),
            });
        }

        Ok(MethodBody {
            class_name: self.class_name.clone(),
            name: self.name.clone(),
            signature: self.signature.clone(),
            is_static: self.is_static,
            instructions,
            code_length: self.next_pc,
            exception_table,
            local_variable_table: self.local_variables.clone(),
        })
    }

    fn append(&mut self, opcode: u8, operand: ProtoOperand, length: u32) -> &mut Self {
        self.instructions.push(ProtoInstruction {
            pc: self.next_pc,
            opcode,
            operand,
        });
        self.next_pc += length;
        self
    }
}

#[cfg(test)]
mod test {
    use super::BodyBuilder;
    use crate::{
        error,
        method::{opcode, Operand},
    };

    #[test]
    fn assigns_ascending_pcs_with_encoded_lengths() -> error::Result<()> {
        let mut builder = BodyBuilder::new("com/example/Main", "run", "()V");
        let body = builder
            .iconst(1) // pc 0, 1 byte
            .iconst(100) // pc 1, bipush, 2 bytes
            .ldc_str("hi") // pc 3, 2 bytes
            .invoke(
                opcode::INVOKEVIRTUAL,
                "java/lang/String",
                "length",
                "()I",
            ) // pc 5, 3 bytes
            .op(opcode::RETURN) // pc 8
            .build()?;

        let pcs: Vec<u32> = body.instructions.iter().map(|i| i.pc).collect();
        assert_eq!(pcs, vec![0, 1, 3, 5, 8]);
        assert_eq!(body.code_length, 9);

        Ok(())
    }

    #[test]
    fn resolves_forward_branches() -> error::Result<()> {
        let mut builder = BodyBuilder::new("com/example/Main", "run", "()V");
        let target = builder.fresh_label();
        let body = builder
            .op(opcode::ACONST_NULL)
            .branch(opcode::IFNULL, target) // pc 1
            .iconst(0)
            .bind(target) // pc 5
            .op(opcode::RETURN)
            .build()?;

        let Operand::Branch { offset, target } = body.instructions[1].operand else {
            panic!("expected a branch operand");
        };
        assert_eq!(target, 5);
        assert_eq!(offset, 4);

        Ok(())
    }

    #[test]
    fn unbound_labels_are_rejected_at_the_referencing_instruction() {
        let mut builder = BodyBuilder::new("com/example/Main", "run", "()V");
        let dangling = builder.fresh_label();
        let errors = builder
            .op(opcode::NOP) // pc 0
            .branch(opcode::GOTO, dangling) // pc 1
            .build()
            .expect_err("building with a dangling label should fail");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors.payloads()[0].location, 1);
    }
}
