//! Compact builders for hand-written bytecode in unit tests.

use crate::ir::{
    AccessFlags, ArithOp, Constant, ExceptionHandler, IfCond, Instruction, InvokeKind, LineNumber,
    LocalVariable, MemberRef, Op, RawClass, RawMethod, Relation, ValueKind,
};

/// Assigns offsets equal to the instruction index.
pub(crate) fn instructions(ops: Vec<Op>) -> Vec<Instruction> {
    ops.into_iter()
        .enumerate()
        .map(|(offset, op)| Instruction {
            offset: offset as u32,
            op,
        })
        .collect()
}

pub(crate) fn iconst(value: i32) -> Op {
    Op::Const(Constant::Int(value))
}

pub(crate) fn sconst(value: &str) -> Op {
    Op::Const(Constant::String(value.to_string()))
}

pub(crate) fn aconst_null() -> Op {
    Op::Const(Constant::Null)
}

pub(crate) fn iload(slot: u16) -> Op {
    Op::Load(ValueKind::Int, slot)
}

pub(crate) fn istore(slot: u16) -> Op {
    Op::Store(ValueKind::Int, slot)
}

pub(crate) fn aload(slot: u16) -> Op {
    Op::Load(ValueKind::Reference, slot)
}

pub(crate) fn astore(slot: u16) -> Op {
    Op::Store(ValueKind::Reference, slot)
}

pub(crate) fn ireturn() -> Op {
    Op::Return(Some(ValueKind::Int))
}

pub(crate) fn areturn() -> Op {
    Op::Return(Some(ValueKind::Reference))
}

pub(crate) fn vreturn() -> Op {
    Op::Return(None)
}

pub(crate) fn iadd() -> Op {
    Op::Arith(ValueKind::Int, ArithOp::Add)
}

pub(crate) fn goto(target: u32) -> Op {
    Op::Goto(target)
}

/// `ifeq`..`ifle` against zero.
pub(crate) fn if_zero(relation: Relation, target: u32) -> Op {
    Op::If {
        cond: IfCond::Zero(relation),
        target,
    }
}

pub(crate) fn if_icmp(relation: Relation, target: u32) -> Op {
    Op::If {
        cond: IfCond::IntCompare(relation),
        target,
    }
}

pub(crate) fn invoke_static(owner: &str, name: &str, descriptor: &str) -> Op {
    Op::Invoke {
        kind: InvokeKind::Static,
        method: MemberRef::new(owner, name, descriptor),
    }
}

pub(crate) fn invoke_virtual(owner: &str, name: &str, descriptor: &str) -> Op {
    Op::Invoke {
        kind: InvokeKind::Virtual,
        method: MemberRef::new(owner, name, descriptor),
    }
}

pub(crate) fn invoke_special(owner: &str, name: &str, descriptor: &str) -> Op {
    Op::Invoke {
        kind: InvokeKind::Special,
        method: MemberRef::new(owner, name, descriptor),
    }
}

pub(crate) fn getstatic(owner: &str, name: &str, descriptor: &str) -> Op {
    Op::GetStatic(MemberRef::new(owner, name, descriptor))
}

pub(crate) fn putfield(owner: &str, name: &str, descriptor: &str) -> Op {
    Op::PutField(MemberRef::new(owner, name, descriptor))
}

pub(crate) fn getfield(owner: &str, name: &str, descriptor: &str) -> Op {
    Op::GetField(MemberRef::new(owner, name, descriptor))
}

/// Builds a `RawMethod` whose offsets equal instruction indices.
pub(crate) struct MethodBuilder {
    method: RawMethod,
}

impl MethodBuilder {
    pub(crate) fn new(name: &str, descriptor: &str) -> Self {
        MethodBuilder {
            method: RawMethod {
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                access: AccessFlags(AccessFlags::PUBLIC),
                max_locals: 8,
                ..RawMethod::default()
            },
        }
    }

    pub(crate) fn with_static(mut self) -> Self {
        self.method.access = AccessFlags(self.method.access.0 | AccessFlags::STATIC);
        self
    }

    pub(crate) fn with_access(mut self, access: u16) -> Self {
        self.method.access = AccessFlags(access);
        self
    }

    pub(crate) fn with_signature(mut self, signature: &str) -> Self {
        self.method.signature = Some(signature.to_string());
        self
    }

    pub(crate) fn code(mut self, ops: Vec<Op>) -> Self {
        self.method.code_length = ops.len() as u32;
        self.method.instructions = instructions(ops);
        self
    }

    pub(crate) fn handler(
        mut self,
        start_pc: u32,
        end_pc: u32,
        handler_pc: u32,
        catch_type: Option<&str>,
    ) -> Self {
        self.method.exception_table.push(ExceptionHandler {
            start_pc,
            end_pc,
            handler_pc,
            catch_type: catch_type.map(str::to_string),
        });
        self
    }

    /// Pairs of (offset, line).
    pub(crate) fn lines(mut self, entries: &[(u32, u32)]) -> Self {
        self.method.line_numbers = entries
            .iter()
            .map(|&(start_pc, line)| LineNumber { start_pc, line })
            .collect();
        self
    }

    /// Local visible over the whole method.
    pub(crate) fn local(mut self, slot: u16, name: &str, descriptor: &str) -> Self {
        self.method.local_variables.push(LocalVariable {
            start_pc: 0,
            length: self.method.code_length.max(1),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: None,
            slot,
        });
        self
    }

    pub(crate) fn build(self) -> RawMethod {
        self.method
    }
}

pub(crate) fn class_with(name: &str, methods: Vec<RawMethod>) -> RawClass {
    RawClass {
        name: name.to_string(),
        super_name: Some("java/lang/Object".to_string()),
        access: AccessFlags(AccessFlags::PUBLIC),
        source_file: Some("Test.java".to_string()),
        methods,
        ..RawClass::default()
    }
}
