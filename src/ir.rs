use serde::Serialize;

use crate::types::{PrimitiveType, Type};

/// Class-level input to reconstruction.
#[derive(Clone, Debug, Default)]
pub struct RawClass {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub access: AccessFlags,
    pub signature: Option<String>,
    pub source_file: Option<String>,
    pub fields: Vec<RawField>,
    pub methods: Vec<RawMethod>,
    pub inner_classes: Vec<InnerClass>,
}

impl RawClass {
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&RawMethod> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.descriptor == descriptor)
    }

    /// Outer class recorded for this class in its own `InnerClasses` table.
    pub fn declared_outer(&self) -> Option<&str> {
        self.inner_classes
            .iter()
            .find(|inner| inner.inner == self.name)
            .and_then(|inner| inner.outer.as_deref())
    }
}

/// Field declaration metadata.
#[derive(Clone, Debug, Default)]
pub struct RawField {
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub access: AccessFlags,
    pub constant_value: Option<Constant>,
}

/// Method-level input: decoded instructions plus code metadata. Immutable.
#[derive(Clone, Debug, Default)]
pub struct RawMethod {
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub access: AccessFlags,
    pub instructions: Vec<Instruction>,
    /// Length of the code array; offsets are below this value.
    pub code_length: u32,
    pub exception_table: Vec<ExceptionHandler>,
    pub line_numbers: Vec<LineNumber>,
    pub local_variables: Vec<LocalVariable>,
    pub max_locals: u16,
    pub exceptions: Vec<String>,
}

impl RawMethod {
    pub fn has_code(&self) -> bool {
        !self.instructions.is_empty()
    }

    /// Source line covering an offset, or 0 when unknown.
    pub fn line_at(&self, offset: u32) -> u32 {
        self.line_numbers
            .iter()
            .filter(|entry| entry.start_pc <= offset)
            .max_by_key(|entry| entry.start_pc)
            .map(|entry| entry.line)
            .unwrap_or(0)
    }

    pub fn first_line(&self) -> u32 {
        self.line_numbers
            .iter()
            .map(|entry| entry.line)
            .filter(|line| *line > 0)
            .min()
            .unwrap_or(0)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == "<clinit>"
    }
}

/// Raw access flag bits shared by classes, fields and methods.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize)]
#[serde(transparent)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SYNCHRONIZED: u16 = 0x0020;
    pub const VOLATILE: u16 = 0x0040;
    pub const BRIDGE: u16 = 0x0040;
    pub const TRANSIENT: u16 = 0x0080;
    pub const VARARGS: u16 = 0x0080;
    pub const NATIVE: u16 = 0x0100;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const STRICT: u16 = 0x0800;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const ANNOTATION: u16 = 0x2000;
    pub const ENUM: u16 = 0x4000;

    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    pub fn is_native(self) -> bool {
        self.contains(Self::NATIVE)
    }

    pub fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    pub fn is_synthetic(self) -> bool {
        self.contains(Self::SYNTHETIC)
    }

    pub fn is_enum(self) -> bool {
        self.contains(Self::ENUM)
    }
}

/// `InnerClasses` attribute entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InnerClass {
    pub inner: String,
    pub outer: Option<String>,
    pub simple_name: Option<String>,
    pub access: AccessFlags,
}

/// Exception handler metadata from the Code attribute.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ExceptionHandler {
    pub start_pc: u32,
    pub end_pc: u32,
    pub handler_pc: u32,
    /// `None` catches any throwable.
    pub catch_type: Option<String>,
}

impl ExceptionHandler {
    pub fn covers(&self, offset: u32) -> bool {
        self.start_pc <= offset && offset < self.end_pc
    }
}

/// Line number table entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LineNumber {
    pub start_pc: u32,
    pub line: u32,
}

/// Local variable table entry, merged with its generic signature when present.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalVariable {
    pub start_pc: u32,
    pub length: u32,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub slot: u16,
}

impl LocalVariable {
    pub fn covers(&self, offset: u32) -> bool {
        self.start_pc <= offset && offset < self.start_pc + self.length
    }
}

/// Decoded bytecode instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub offset: u32,
    pub op: Op,
}

/// Computational category of a load, store, return or arithmetic instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueKind {
    pub fn default_type(self) -> Type {
        match self {
            ValueKind::Int => Type::int(),
            ValueKind::Long => Type::long(),
            ValueKind::Float => Type::primitive(PrimitiveType::Float),
            ValueKind::Double => Type::primitive(PrimitiveType::Double),
            ValueKind::Reference => Type::object_root(),
        }
    }

    pub fn of(ty: &Type) -> ValueKind {
        match ty.as_primitive() {
            Some(PrimitiveType::Long) => ValueKind::Long,
            Some(PrimitiveType::Float) => ValueKind::Float,
            Some(PrimitiveType::Double) => ValueKind::Double,
            Some(_) => ValueKind::Int,
            None => ValueKind::Reference,
        }
    }

    pub fn is_wide(self) -> bool {
        matches!(self, ValueKind::Long | ValueKind::Double)
    }
}

/// Element kind of array load and store instructions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArrayKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    /// `baload`/`bastore`, shared by byte and boolean arrays.
    ByteOrBoolean,
    Char,
    Short,
}

impl ArrayKind {
    pub fn default_element(self) -> Type {
        match self {
            ArrayKind::Int => Type::int(),
            ArrayKind::Long => Type::long(),
            ArrayKind::Float => Type::primitive(PrimitiveType::Float),
            ArrayKind::Double => Type::primitive(PrimitiveType::Double),
            ArrayKind::Reference => Type::object_root(),
            ArrayKind::ByteOrBoolean => Type::primitive(PrimitiveType::Byte),
            ArrayKind::Char => Type::primitive(PrimitiveType::Char),
            ArrayKind::Short => Type::primitive(PrimitiveType::Short),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

/// Three-way comparison opcodes (`lcmp`, `fcmpl`, ...).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum CmpKind {
    Long,
    FloatL,
    FloatG,
    DoubleL,
    DoubleG,
}

impl CmpKind {
    /// Result pushed when either operand is NaN.
    pub fn nan_result(self) -> i32 {
        match self {
            CmpKind::Long => 0,
            CmpKind::FloatL | CmpKind::DoubleL => -1,
            CmpKind::FloatG | CmpKind::DoubleG => 1,
        }
    }
}

/// Relation tested by a conditional branch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Relation {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Relation {
    pub fn holds(self, left: i32, right: i32) -> bool {
        match self {
            Relation::Eq => left == right,
            Relation::Ne => left != right,
            Relation::Lt => left < right,
            Relation::Ge => left >= right,
            Relation::Gt => left > right,
            Relation::Le => left <= right,
        }
    }
}

/// Operands compared by a conditional branch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IfCond {
    /// `ifeq`..`ifle`: top of stack against zero.
    Zero(Relation),
    /// `if_icmpeq`..`if_icmple`.
    IntCompare(Relation),
    /// `if_acmpeq`/`if_acmpne`, `Eq` or `Ne` only.
    RefCompare(Relation),
    Null,
    NonNull,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InvokeKind {
    Virtual,
    Interface,
    Special,
    Static,
}

/// Field or method reference resolved from the constant pool.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        MemberRef {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

/// `CONSTANT_MethodHandle` reference kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    pub fn from_reference_kind(kind: u8) -> Option<Self> {
        let handle = match kind {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return None,
        };
        Some(handle)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MethodHandle {
    pub kind: HandleKind,
    pub member: MemberRef,
}

/// Loadable constant.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Constant {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// Internal name or array descriptor of a class literal.
    Class(String),
    MethodType(String),
    MethodHandle(MethodHandle),
}

impl Constant {
    pub fn ty(&self) -> Type {
        match self {
            Constant::Null => Type::Null,
            Constant::Int(_) => Type::int(),
            Constant::Long(_) => Type::long(),
            Constant::Float(_) => Type::primitive(PrimitiveType::Float),
            Constant::Double(_) => Type::primitive(PrimitiveType::Double),
            Constant::String(_) => Type::string(),
            Constant::Class(_) => Type::object("java/lang/Class"),
            Constant::MethodType(_) => Type::object("java/lang/invoke/MethodType"),
            Constant::MethodHandle(_) => Type::object("java/lang/invoke/MethodHandle"),
        }
    }
}

/// `invokedynamic` call site with its bootstrap method.
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicCallSite {
    pub name: String,
    pub descriptor: String,
    pub bootstrap: MethodHandle,
    pub bootstrap_args: Vec<Constant>,
}

/// Instruction with typed operands. Branch targets are absolute offsets.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Nop,
    Const(Constant),
    Load(ValueKind, u16),
    Store(ValueKind, u16),
    ArrayLoad(ArrayKind),
    ArrayStore(ArrayKind),
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    Arith(ValueKind, ArithOp),
    Neg(ValueKind),
    Iinc { slot: u16, delta: i16 },
    Convert { from: ValueKind, to: PrimitiveType },
    Compare(CmpKind),
    If { cond: IfCond, target: u32 },
    Goto(u32),
    Jsr(u32),
    Ret(u16),
    TableSwitch {
        default: u32,
        low: i32,
        targets: Vec<u32>,
    },
    LookupSwitch {
        default: u32,
        pairs: Vec<(i32, u32)>,
    },
    Return(Option<ValueKind>),
    GetField(MemberRef),
    PutField(MemberRef),
    GetStatic(MemberRef),
    PutStatic(MemberRef),
    Invoke {
        kind: InvokeKind,
        method: MemberRef,
    },
    InvokeDynamic(DynamicCallSite),
    New(String),
    NewArray(PrimitiveType),
    /// Component class reference of a one-dimensional reference array.
    ANewArray(String),
    MultiANewArray {
        descriptor: String,
        dimensions: u8,
    },
    ArrayLength,
    Athrow,
    CheckCast(String),
    InstanceOf(String),
    MonitorEnter,
    MonitorExit,
}

impl Op {
    /// All branch targets, in operand order (switch default first).
    pub fn branch_targets(&self) -> Vec<u32> {
        match self {
            Op::If { target, .. } | Op::Goto(target) | Op::Jsr(target) => vec![*target],
            Op::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default)
                .chain(targets.iter().copied())
                .collect(),
            Op::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, target)| *target))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Ends a basic block without falling through.
    pub fn is_unconditional_transfer(&self) -> bool {
        matches!(
            self,
            Op::Goto(_)
                | Op::Jsr(_)
                | Op::Ret(_)
                | Op::TableSwitch { .. }
                | Op::LookupSwitch { .. }
                | Op::Return(_)
                | Op::Athrow
        )
    }

    pub fn ends_block(&self) -> bool {
        self.is_unconditional_transfer() || matches!(self, Op::If { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_lookup_uses_closest_preceding_entry() {
        let method = RawMethod {
            line_numbers: vec![
                LineNumber {
                    start_pc: 0,
                    line: 10,
                },
                LineNumber {
                    start_pc: 6,
                    line: 12,
                },
            ],
            ..RawMethod::default()
        };

        assert_eq!(method.line_at(0), 10);
        assert_eq!(method.line_at(5), 10);
        assert_eq!(method.line_at(9), 12);
        assert_eq!(method.first_line(), 10);
    }

    #[test]
    fn switch_targets_list_default_first() {
        let op = Op::LookupSwitch {
            default: 40,
            pairs: vec![(1, 20), (7, 30)],
        };

        assert_eq!(op.branch_targets(), vec![40, 20, 30]);
        assert!(op.is_unconditional_transfer());
        assert!(!Op::If {
            cond: IfCond::Null,
            target: 3
        }
        .is_unconditional_transfer());
    }

    #[test]
    fn nan_results_follow_opcode_variant() {
        assert_eq!(CmpKind::FloatL.nan_result(), -1);
        assert_eq!(CmpKind::DoubleG.nan_result(), 1);
        assert!(Relation::Le.holds(-1, 0));
        assert!(!Relation::Ge.holds(-1, 0));
    }
}
