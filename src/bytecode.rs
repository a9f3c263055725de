use anyhow::{Context, Result};

use crate::ir::{
    ArithOp, ArrayKind, CmpKind, Constant, DynamicCallSite, IfCond, Instruction, InvokeKind,
    MemberRef, Op, Relation, ValueKind,
};
use crate::opcodes;
use crate::types::PrimitiveType;

/// Constant pool lookups needed while decoding instructions.
pub(crate) trait PoolResolver {
    fn class_name(&self, index: u16) -> Result<String>;
    fn member_ref(&self, index: u16) -> Result<MemberRef>;
    fn constant(&self, index: u16) -> Result<Constant>;
    fn dynamic_call_site(&self, index: u16) -> Result<DynamicCallSite>;
}

/// Decode a Code attribute into typed instructions.
pub(crate) fn decode(code: &[u8], pool: &dyn PoolResolver) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let length = opcode_length(code, offset)?;
        if length == 0 || offset + length > code.len() {
            anyhow::bail!("invalid bytecode length at offset {}", offset);
        }
        let op = decode_op(code, offset, pool)
            .with_context(|| format!("decode opcode 0x{:02x} at {}", code[offset], offset))?;
        instructions.push(Instruction {
            offset: offset as u32,
            op,
        });
        offset += length;
    }
    Ok(instructions)
}

fn decode_op(code: &[u8], offset: usize, pool: &dyn PoolResolver) -> Result<Op> {
    let opcode = code[offset];
    let op = match opcode {
        opcodes::NOP => Op::Nop,
        opcodes::ACONST_NULL => Op::Const(Constant::Null),
        opcodes::ICONST_M1..=opcodes::ICONST_5 => {
            Op::Const(Constant::Int(opcode as i32 - opcodes::ICONST_M1 as i32 - 1))
        }
        opcodes::LCONST_0 | opcodes::LCONST_1 => {
            Op::Const(Constant::Long((opcode - opcodes::LCONST_0) as i64))
        }
        opcodes::FCONST_0..=opcodes::FCONST_2 => {
            Op::Const(Constant::Float((opcode - opcodes::FCONST_0) as f32))
        }
        opcodes::DCONST_0 | opcodes::DCONST_1 => {
            Op::Const(Constant::Double((opcode - opcodes::DCONST_0) as f64))
        }
        opcodes::BIPUSH => Op::Const(Constant::Int(read_u8(code, offset + 1)? as i8 as i32)),
        opcodes::SIPUSH => Op::Const(Constant::Int(read_i16(code, offset + 1)? as i32)),
        opcodes::LDC => Op::Const(pool.constant(read_u8(code, offset + 1)? as u16)?),
        opcodes::LDC_W | opcodes::LDC2_W => Op::Const(pool.constant(read_u16(code, offset + 1)?)?),
        opcodes::ILOAD..=opcodes::ALOAD => Op::Load(
            value_kind(opcode - opcodes::ILOAD),
            read_u8(code, offset + 1)? as u16,
        ),
        opcodes::ILOAD_0..=opcodes::ALOAD_3 => {
            let relative = opcode - opcodes::ILOAD_0;
            Op::Load(value_kind(relative / 4), (relative % 4) as u16)
        }
        opcodes::IALOAD..=opcodes::SALOAD => Op::ArrayLoad(array_kind(opcode - opcodes::IALOAD)),
        opcodes::ISTORE..=opcodes::ASTORE => Op::Store(
            value_kind(opcode - opcodes::ISTORE),
            read_u8(code, offset + 1)? as u16,
        ),
        opcodes::ISTORE_0..=opcodes::ASTORE_3 => {
            let relative = opcode - opcodes::ISTORE_0;
            Op::Store(value_kind(relative / 4), (relative % 4) as u16)
        }
        opcodes::IASTORE..=opcodes::SASTORE => {
            Op::ArrayStore(array_kind(opcode - opcodes::IASTORE))
        }
        opcodes::POP => Op::Pop,
        opcodes::POP2 => Op::Pop2,
        opcodes::DUP => Op::Dup,
        opcodes::DUP_X1 => Op::DupX1,
        opcodes::DUP_X2 => Op::DupX2,
        opcodes::DUP2 => Op::Dup2,
        opcodes::DUP2_X1 => Op::Dup2X1,
        opcodes::DUP2_X2 => Op::Dup2X2,
        opcodes::SWAP => Op::Swap,
        opcodes::IADD..=opcodes::DREM => {
            let relative = opcode - opcodes::IADD;
            let op = match relative / 4 {
                0 => ArithOp::Add,
                1 => ArithOp::Sub,
                2 => ArithOp::Mul,
                3 => ArithOp::Div,
                _ => ArithOp::Rem,
            };
            Op::Arith(value_kind(relative % 4), op)
        }
        opcodes::INEG..=opcodes::DNEG => Op::Neg(value_kind(opcode - opcodes::INEG)),
        opcodes::ISHL..=opcodes::LXOR => {
            let relative = opcode - opcodes::ISHL;
            let op = match relative / 2 {
                0 => ArithOp::Shl,
                1 => ArithOp::Shr,
                2 => ArithOp::Ushr,
                3 => ArithOp::And,
                4 => ArithOp::Or,
                _ => ArithOp::Xor,
            };
            let kind = if relative % 2 == 0 {
                ValueKind::Int
            } else {
                ValueKind::Long
            };
            Op::Arith(kind, op)
        }
        opcodes::IINC => Op::Iinc {
            slot: read_u8(code, offset + 1)? as u16,
            delta: read_u8(code, offset + 2)? as i8 as i16,
        },
        opcodes::I2L..=opcodes::I2S => conversion(opcode),
        opcodes::LCMP => Op::Compare(CmpKind::Long),
        opcodes::FCMPL => Op::Compare(CmpKind::FloatL),
        opcodes::FCMPG => Op::Compare(CmpKind::FloatG),
        opcodes::DCMPL => Op::Compare(CmpKind::DoubleL),
        opcodes::DCMPG => Op::Compare(CmpKind::DoubleG),
        opcodes::IFEQ..=opcodes::IF_ACMPNE => {
            let relative = opcode - opcodes::IFEQ;
            let cond = match relative {
                0..=5 => IfCond::Zero(relation(relative)),
                6..=11 => IfCond::IntCompare(relation(relative - 6)),
                _ => IfCond::RefCompare(relation(relative - 12)),
            };
            Op::If {
                cond,
                target: branch_target(offset, read_i16(code, offset + 1)? as i32)?,
            }
        }
        opcodes::IFNULL | opcodes::IFNONNULL => Op::If {
            cond: if opcode == opcodes::IFNULL {
                IfCond::Null
            } else {
                IfCond::NonNull
            },
            target: branch_target(offset, read_i16(code, offset + 1)? as i32)?,
        },
        opcodes::GOTO => Op::Goto(branch_target(offset, read_i16(code, offset + 1)? as i32)?),
        opcodes::GOTO_W => Op::Goto(branch_target(offset, read_i32(code, offset + 1)?)?),
        opcodes::JSR => Op::Jsr(branch_target(offset, read_i16(code, offset + 1)? as i32)?),
        opcodes::JSR_W => Op::Jsr(branch_target(offset, read_i32(code, offset + 1)?)?),
        opcodes::RET => Op::Ret(read_u8(code, offset + 1)? as u16),
        opcodes::TABLESWITCH => tableswitch(code, offset)?,
        opcodes::LOOKUPSWITCH => lookupswitch(code, offset)?,
        opcodes::IRETURN..=opcodes::ARETURN => {
            Op::Return(Some(value_kind(opcode - opcodes::IRETURN)))
        }
        opcodes::RETURN => Op::Return(None),
        opcodes::GETSTATIC => Op::GetStatic(pool.member_ref(read_u16(code, offset + 1)?)?),
        opcodes::PUTSTATIC => Op::PutStatic(pool.member_ref(read_u16(code, offset + 1)?)?),
        opcodes::GETFIELD => Op::GetField(pool.member_ref(read_u16(code, offset + 1)?)?),
        opcodes::PUTFIELD => Op::PutField(pool.member_ref(read_u16(code, offset + 1)?)?),
        opcodes::INVOKEVIRTUAL
        | opcodes::INVOKESPECIAL
        | opcodes::INVOKESTATIC
        | opcodes::INVOKEINTERFACE => {
            let method = pool
                .member_ref(read_u16(code, offset + 1)?)
                .context("resolve method ref")?;
            let kind = match opcode {
                opcodes::INVOKEVIRTUAL => InvokeKind::Virtual,
                opcodes::INVOKESPECIAL => InvokeKind::Special,
                opcodes::INVOKESTATIC => InvokeKind::Static,
                _ => InvokeKind::Interface,
            };
            Op::Invoke { kind, method }
        }
        opcodes::INVOKEDYNAMIC => {
            Op::InvokeDynamic(pool.dynamic_call_site(read_u16(code, offset + 1)?)?)
        }
        opcodes::NEW => Op::New(pool.class_name(read_u16(code, offset + 1)?)?),
        opcodes::NEWARRAY => Op::NewArray(newarray_type(read_u8(code, offset + 1)?)?),
        opcodes::ANEWARRAY => Op::ANewArray(pool.class_name(read_u16(code, offset + 1)?)?),
        opcodes::MULTIANEWARRAY => Op::MultiANewArray {
            descriptor: pool.class_name(read_u16(code, offset + 1)?)?,
            dimensions: read_u8(code, offset + 3)?,
        },
        opcodes::ARRAYLENGTH => Op::ArrayLength,
        opcodes::ATHROW => Op::Athrow,
        opcodes::CHECKCAST => Op::CheckCast(pool.class_name(read_u16(code, offset + 1)?)?),
        opcodes::INSTANCEOF => Op::InstanceOf(pool.class_name(read_u16(code, offset + 1)?)?),
        opcodes::MONITORENTER => Op::MonitorEnter,
        opcodes::MONITOREXIT => Op::MonitorExit,
        opcodes::WIDE => wide(code, offset)?,
        _ => anyhow::bail!("unsupported opcode 0x{:02x}", opcode),
    };
    Ok(op)
}

fn value_kind(index: u8) -> ValueKind {
    match index {
        0 => ValueKind::Int,
        1 => ValueKind::Long,
        2 => ValueKind::Float,
        3 => ValueKind::Double,
        _ => ValueKind::Reference,
    }
}

fn array_kind(index: u8) -> ArrayKind {
    match index {
        0 => ArrayKind::Int,
        1 => ArrayKind::Long,
        2 => ArrayKind::Float,
        3 => ArrayKind::Double,
        4 => ArrayKind::Reference,
        5 => ArrayKind::ByteOrBoolean,
        6 => ArrayKind::Char,
        _ => ArrayKind::Short,
    }
}

fn relation(index: u8) -> Relation {
    match index {
        0 => Relation::Eq,
        1 => Relation::Ne,
        2 => Relation::Lt,
        3 => Relation::Ge,
        4 => Relation::Gt,
        _ => Relation::Le,
    }
}

fn conversion(opcode: u8) -> Op {
    use PrimitiveType as P;
    let (from, to) = match opcode - opcodes::I2L {
        0 => (ValueKind::Int, P::Long),
        1 => (ValueKind::Int, P::Float),
        2 => (ValueKind::Int, P::Double),
        3 => (ValueKind::Long, P::Int),
        4 => (ValueKind::Long, P::Float),
        5 => (ValueKind::Long, P::Double),
        6 => (ValueKind::Float, P::Int),
        7 => (ValueKind::Float, P::Long),
        8 => (ValueKind::Float, P::Double),
        9 => (ValueKind::Double, P::Int),
        10 => (ValueKind::Double, P::Long),
        11 => (ValueKind::Double, P::Float),
        12 => (ValueKind::Int, P::Byte),
        13 => (ValueKind::Int, P::Char),
        _ => (ValueKind::Int, P::Short),
    };
    Op::Convert { from, to }
}

fn newarray_type(code: u8) -> Result<PrimitiveType> {
    let primitive = match code {
        4 => PrimitiveType::Boolean,
        5 => PrimitiveType::Char,
        6 => PrimitiveType::Float,
        7 => PrimitiveType::Double,
        8 => PrimitiveType::Byte,
        9 => PrimitiveType::Short,
        10 => PrimitiveType::Int,
        11 => PrimitiveType::Long,
        _ => anyhow::bail!("invalid newarray type {}", code),
    };
    Ok(primitive)
}

fn wide(code: &[u8], offset: usize) -> Result<Op> {
    let opcode = read_u8(code, offset + 1)?;
    let slot = read_u16(code, offset + 2)?;
    let op = match opcode {
        opcodes::IINC => Op::Iinc {
            slot,
            delta: read_i16(code, offset + 4)?,
        },
        opcodes::ILOAD..=opcodes::ALOAD => Op::Load(value_kind(opcode - opcodes::ILOAD), slot),
        opcodes::ISTORE..=opcodes::ASTORE => Op::Store(value_kind(opcode - opcodes::ISTORE), slot),
        opcodes::RET => Op::Ret(slot),
        _ => anyhow::bail!("invalid wide opcode 0x{:02x}", opcode),
    };
    Ok(op)
}

fn branch_target(offset: usize, delta: i32) -> Result<u32> {
    let target = offset as i64 + delta as i64;
    if target < 0 {
        anyhow::bail!("negative branch target from offset {}", offset);
    }
    Ok(target as u32)
}

fn tableswitch(code: &[u8], offset: usize) -> Result<Op> {
    let base = offset + 1 + padding(offset);
    let default = branch_target(offset, read_i32(code, base)?)?;
    let low = read_i32(code, base + 4)?;
    let high = read_i32(code, base + 8)?;
    let count = high
        .checked_sub(low)
        .and_then(|v| v.checked_add(1))
        .context("invalid tableswitch range")?;
    let mut targets = Vec::new();
    let mut idx = base + 12;
    for _ in 0..count {
        targets.push(branch_target(offset, read_i32(code, idx)?)?);
        idx += 4;
    }
    Ok(Op::TableSwitch {
        default,
        low,
        targets,
    })
}

fn lookupswitch(code: &[u8], offset: usize) -> Result<Op> {
    let base = offset + 1 + padding(offset);
    let default = branch_target(offset, read_i32(code, base)?)?;
    let npairs = read_i32(code, base + 4)?;
    let mut pairs = Vec::new();
    let mut idx = base + 8;
    for _ in 0..npairs {
        let key = read_i32(code, idx)?;
        let target = branch_target(offset, read_i32(code, idx + 4)?)?;
        pairs.push((key, target));
        idx += 8;
    }
    Ok(Op::LookupSwitch { default, pairs })
}

pub(crate) fn opcode_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code[offset];
    let length = match opcode {
        0x00..=0x0f => 1,
        opcodes::BIPUSH => 2,
        opcodes::SIPUSH => 3,
        opcodes::LDC => 2,
        opcodes::LDC_W | opcodes::LDC2_W => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        opcodes::IINC => 3,
        0x85..=0x98 => 1,
        0x99..=0xa6 => 3,
        opcodes::GOTO | opcodes::JSR => 3,
        opcodes::RET => 2,
        opcodes::TABLESWITCH => tableswitch_length(code, offset)?,
        opcodes::LOOKUPSWITCH => lookupswitch_length(code, offset)?,
        0xac..=0xb1 => 1,
        0xb2..=0xb5 => 3,
        opcodes::INVOKEVIRTUAL | opcodes::INVOKESPECIAL | opcodes::INVOKESTATIC => 3,
        opcodes::INVOKEINTERFACE | opcodes::INVOKEDYNAMIC => 5,
        opcodes::NEW => 3,
        opcodes::NEWARRAY => 2,
        opcodes::ANEWARRAY => 3,
        opcodes::ARRAYLENGTH | opcodes::ATHROW => 1,
        opcodes::CHECKCAST | opcodes::INSTANCEOF => 3,
        opcodes::MONITORENTER | opcodes::MONITOREXIT => 1,
        opcodes::WIDE => wide_length(code, offset)?,
        opcodes::MULTIANEWARRAY => 4,
        opcodes::IFNULL | opcodes::IFNONNULL => 3,
        opcodes::GOTO_W | opcodes::JSR_W => 5,
        _ => anyhow::bail!("unsupported opcode 0x{:02x}", opcode),
    };
    Ok(length)
}

fn tableswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = padding(offset);
    let base = offset + 1 + padding;
    let low = read_i32(code, base + 4)?;
    let high = read_i32(code, base + 8)?;
    let count = high
        .checked_sub(low)
        .and_then(|v| v.checked_add(1))
        .context("invalid tableswitch range")?;
    if count < 0 {
        anyhow::bail!("invalid tableswitch range");
    }
    Ok(1 + padding + 12 + (count as usize) * 4)
}

fn lookupswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = padding(offset);
    let base = offset + 1 + padding;
    let npairs = read_i32(code, base + 4)?;
    if npairs < 0 {
        anyhow::bail!("invalid lookupswitch pairs");
    }
    Ok(1 + padding + 8 + (npairs as usize) * 8)
}

fn wide_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code
        .get(offset + 1)
        .copied()
        .context("missing wide opcode")?;
    if opcode == opcodes::IINC { Ok(6) } else { Ok(4) }
}

pub(crate) fn padding(offset: usize) -> usize {
    (4 - ((offset + 1) % 4)) % 4
}

fn read_u8(code: &[u8], offset: usize) -> Result<u8> {
    code.get(offset).copied().context("bytecode u8 out of bounds")
}

pub(crate) fn read_u16(code: &[u8], offset: usize) -> Result<u16> {
    let slice = code
        .get(offset..offset + 2)
        .context("bytecode u16 out of bounds")?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

pub(crate) fn read_u32(code: &[u8], offset: usize) -> Result<u32> {
    let slice = code
        .get(offset..offset + 4)
        .context("bytecode u32 out of bounds")?;
    Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn read_i16(code: &[u8], offset: usize) -> Result<i16> {
    let value = read_u16(code, offset)?;
    Ok(i16::from_be_bytes(value.to_be_bytes()))
}

fn read_i32(code: &[u8], offset: usize) -> Result<i32> {
    let value = read_u32(code, offset)?;
    Ok(i32::from_be_bytes(value.to_be_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{HandleKind, MethodHandle};

    struct FakePool;

    impl PoolResolver for FakePool {
        fn class_name(&self, index: u16) -> Result<String> {
            Ok(format!("pkg/C{index}"))
        }

        fn member_ref(&self, index: u16) -> Result<MemberRef> {
            Ok(MemberRef::new("pkg/Owner", format!("m{index}"), "()V"))
        }

        fn constant(&self, index: u16) -> Result<Constant> {
            Ok(Constant::String(format!("s{index}")))
        }

        fn dynamic_call_site(&self, index: u16) -> Result<DynamicCallSite> {
            Ok(DynamicCallSite {
                name: format!("d{index}"),
                descriptor: "()Ljava/lang/Runnable;".to_string(),
                bootstrap: MethodHandle {
                    kind: HandleKind::InvokeStatic,
                    member: MemberRef::new("pkg/Boot", "bsm", "()V"),
                },
                bootstrap_args: Vec::new(),
            })
        }
    }

    fn ops(code: &[u8]) -> Vec<(u32, Op)> {
        decode(code, &FakePool)
            .expect("decode")
            .into_iter()
            .map(|instruction| (instruction.offset, instruction.op))
            .collect()
    }

    #[test]
    fn decodes_loads_constants_and_branches() {
        // iconst_m1; istore_1; iload_1; ifle +5; bipush -3; ireturn; iinc 1 -1; return
        let code = [
            0x02, 0x3c, 0x1b, 0x9e, 0x00, 0x05, 0x10, 0xfd, 0xac, 0x84, 0x01, 0xff, 0xb1,
        ];

        assert_eq!(
            ops(&code),
            vec![
                (0, Op::Const(Constant::Int(-1))),
                (1, Op::Store(ValueKind::Int, 1)),
                (2, Op::Load(ValueKind::Int, 1)),
                (
                    3,
                    Op::If {
                        cond: IfCond::Zero(Relation::Le),
                        target: 8
                    }
                ),
                (6, Op::Const(Constant::Int(-3))),
                (8, Op::Return(Some(ValueKind::Int))),
                (9, Op::Iinc { slot: 1, delta: -1 }),
                (12, Op::Return(None)),
            ]
        );
    }

    #[test]
    fn decodes_tableswitch_with_padding() {
        // iload_0 at 0, tableswitch at 1 (padding 2), low 1, high 2
        let mut code = vec![0x1a, 0xaa, 0x00, 0x00];
        code.extend_from_slice(&27i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&2i32.to_be_bytes());
        code.extend_from_slice(&23i32.to_be_bytes());
        code.extend_from_slice(&25i32.to_be_bytes());
        code.extend_from_slice(&[0x04, 0xac, 0x05, 0xac, 0x03, 0xac]);

        let decoded = ops(&code);
        assert_eq!(
            decoded[1],
            (
                1,
                Op::TableSwitch {
                    default: 28,
                    low: 1,
                    targets: vec![24, 26]
                }
            )
        );
        assert_eq!(decoded.len(), 8);
    }

    #[test]
    fn decodes_member_and_type_operands() {
        // getstatic #2; invokevirtual #3; new #4; anewarray #5; wide iinc 300 1000
        let code = [
            0xb2, 0x00, 0x02, 0xb6, 0x00, 0x03, 0xbb, 0x00, 0x04, 0xbd, 0x00, 0x05, 0xc4, 0x84,
            0x01, 0x2c, 0x03, 0xe8,
        ];

        let decoded = ops(&code);
        assert_eq!(
            decoded[0].1,
            Op::GetStatic(MemberRef::new("pkg/Owner", "m2", "()V"))
        );
        assert!(matches!(
            &decoded[1].1,
            Op::Invoke { kind: InvokeKind::Virtual, method } if method.name == "m3"
        ));
        assert_eq!(decoded[2].1, Op::New("pkg/C4".to_string()));
        assert_eq!(decoded[3].1, Op::ANewArray("pkg/C5".to_string()));
        assert_eq!(
            decoded[4],
            (
                12,
                Op::Iinc {
                    slot: 300,
                    delta: 1000
                }
            )
        );
    }

    #[test]
    fn rejects_truncated_code() {
        assert!(decode(&[0x11, 0x00], &FakePool).is_err());
        assert!(decode(&[0xfe], &FakePool).is_err());
    }
}
