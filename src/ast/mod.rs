//! Structured syntax tree produced by reconstruction.

mod render;
pub mod visit;

use serde::Serialize;

use crate::error::{Diagnostic, ErrorKind};
use crate::ir::{AccessFlags, ArithOp, CmpKind, Relation};
use crate::types::{PrimitiveType, Type, TypeParameter};

pub use render::render_statements;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(Type),
}

/// Reference to a local variable; `id` is unique within one method.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub struct LocalRef {
    pub id: usize,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum CallTarget {
    Static,
    Instance(Box<Expression>),
    /// `super.m(...)`.
    Super,
    /// `super(...)` inside a constructor.
    SuperConstructor,
    /// `this(...)` inside a constructor.
    ThisConstructor,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum BinaryOp {
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
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
    LogicalAnd,
    LogicalOr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Ushr => ">>>",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Ge => ">=",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
        }
    }

    pub fn from_arith(op: ArithOp) -> BinaryOp {
        match op {
            ArithOp::Add => BinaryOp::Add,
            ArithOp::Sub => BinaryOp::Sub,
            ArithOp::Mul => BinaryOp::Mul,
            ArithOp::Div => BinaryOp::Div,
            ArithOp::Rem => BinaryOp::Rem,
            ArithOp::Shl => BinaryOp::Shl,
            ArithOp::Shr => BinaryOp::Shr,
            ArithOp::Ushr => BinaryOp::Ushr,
            ArithOp::And => BinaryOp::And,
            ArithOp::Or => BinaryOp::Or,
            ArithOp::Xor => BinaryOp::Xor,
        }
    }

    pub fn from_relation(relation: Relation) -> BinaryOp {
        match relation {
            Relation::Eq => BinaryOp::Eq,
            Relation::Ne => BinaryOp::Ne,
            Relation::Lt => BinaryOp::Lt,
            Relation::Ge => BinaryOp::Ge,
            Relation::Gt => BinaryOp::Gt,
            Relation::Le => BinaryOp::Le,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Ge | BinaryOp::Gt | BinaryOp::Le
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr)
    }

    /// Complementary comparison, valid only for operands that cannot be NaN.
    pub fn inverse(self) -> Option<BinaryOp> {
        let inverse = match self {
            BinaryOp::Eq => BinaryOp::Ne,
            BinaryOp::Ne => BinaryOp::Eq,
            BinaryOp::Lt => BinaryOp::Ge,
            BinaryOp::Ge => BinaryOp::Lt,
            BinaryOp::Gt => BinaryOp::Le,
            BinaryOp::Le => BinaryOp::Gt,
            _ => return None,
        };
        Some(inverse)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum LambdaBody {
    /// Body still held by the synthetic helper method; filled in once the helper is built.
    Pending {
        helper: String,
        descriptor: String,
        captured: Vec<Expression>,
    },
    Expression(Box<Expression>),
    Block(Vec<Statement>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ExprKind {
    Literal(Literal),
    Local(LocalRef),
    This,
    Field {
        /// `None` for static fields.
        target: Option<Box<Expression>>,
        owner: String,
        name: String,
    },
    MethodCall {
        target: CallTarget,
        owner: String,
        name: String,
        descriptor: String,
        args: Vec<Expression>,
    },
    NewObject {
        class: Type,
        descriptor: String,
        args: Vec<Expression>,
    },
    NewArray {
        element: Type,
        dimensions: Vec<Expression>,
        init: Option<Vec<Expression>>,
    },
    Cast(Box<Expression>),
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Assign {
        /// Compound operator, `None` for plain `=`.
        op: Option<BinaryOp>,
        target: Box<Expression>,
        value: Box<Expression>,
    },
    Ternary {
        cond: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
    InstanceOf {
        expr: Box<Expression>,
        class: Type,
    },
    Lambda {
        params: Vec<LocalRef>,
        body: LambdaBody,
    },
    MethodReference {
        /// Bound receiver; `None` for `Type::method` and `Type::new`.
        receiver: Option<Box<Expression>>,
        owner: String,
        name: String,
    },
    ArrayAccess {
        array: Box<Expression>,
        index: Box<Expression>,
    },
    ArrayLength(Box<Expression>),
    /// Exception object on entry to a handler.
    CaughtException,
    /// Object allocated by `new` whose constructor has not run yet.
    Uninitialized(String),
    /// Result of `lcmp`/`fcmpl`/... before it is folded into a branch.
    Compare3 {
        kind: CmpKind,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

/// Expression with its static type.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Expression {
    pub kind: ExprKind,
    pub ty: Type,
}

impl Expression {
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Expression { kind, ty }
    }

    pub fn literal(literal: Literal) -> Self {
        let ty = match &literal {
            Literal::Null => Type::Null,
            Literal::Boolean(_) => Type::boolean(),
            Literal::Char(_) => Type::primitive(PrimitiveType::Char),
            Literal::Int(_) => Type::int(),
            Literal::Long(_) => Type::long(),
            Literal::Float(_) => Type::primitive(PrimitiveType::Float),
            Literal::Double(_) => Type::primitive(PrimitiveType::Double),
            Literal::String(_) => Type::string(),
            Literal::Class(_) => Type::object("java/lang/Class"),
        };
        Expression::new(ExprKind::Literal(literal), ty)
    }

    pub fn int(value: i32) -> Self {
        Expression::literal(Literal::Int(value))
    }

    pub fn boolean(value: bool) -> Self {
        Expression::literal(Literal::Boolean(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expression::literal(Literal::String(value.into()))
    }

    pub fn local(var: LocalRef, ty: Type) -> Self {
        Expression::new(ExprKind::Local(var), ty)
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression, ty: Type) -> Self {
        Expression::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        )
    }

    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        let ty = operand.ty.clone();
        Expression::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    pub fn assign(op: Option<BinaryOp>, target: Expression, value: Expression) -> Self {
        let ty = target.ty.clone();
        Expression::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            ty,
        )
    }

    pub fn as_local(&self) -> Option<&LocalRef> {
        match &self.kind {
            ExprKind::Local(var) => Some(var),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match &self.kind {
            ExprKind::Literal(Literal::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(_))
    }

    /// Whether evaluating the expression can change program state.
    pub fn has_side_effects(&self) -> bool {
        let mut effects = false;
        visit::for_each_expr(self, &mut |expr| {
            if matches!(
                expr.kind,
                ExprKind::MethodCall { .. }
                    | ExprKind::NewObject { .. }
                    | ExprKind::Assign { .. }
                    | ExprKind::Unary {
                        op: UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec,
                        ..
                    }
            ) {
                effects = true;
            }
        });
        effects
    }

    pub fn references(&self, id: usize) -> bool {
        let mut found = false;
        visit::for_each_expr(self, &mut |expr| {
            if let ExprKind::Local(var) = &expr.kind
                && var.id == id
            {
                found = true;
            }
        });
        found
    }

    /// Logical negation, flipping comparisons when NaN cannot be involved.
    pub fn negate(self) -> Expression {
        match self.kind {
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => *operand,
            ExprKind::Literal(Literal::Boolean(value)) => Expression::boolean(!value),
            ExprKind::Binary { op, left, right } => {
                let floating = left.ty.is_floating() || right.ty.is_floating();
                match (op, op.inverse()) {
                    (BinaryOp::LogicalAnd, _) => Expression::binary(
                        BinaryOp::LogicalOr,
                        left.negate(),
                        right.negate(),
                        Type::boolean(),
                    ),
                    (BinaryOp::LogicalOr, _) => Expression::binary(
                        BinaryOp::LogicalAnd,
                        left.negate(),
                        right.negate(),
                        Type::boolean(),
                    ),
                    (BinaryOp::Eq | BinaryOp::Ne, Some(inverse)) => {
                        Expression::binary(inverse, *left, *right, Type::boolean())
                    }
                    (_, Some(inverse)) if !floating => {
                        Expression::binary(inverse, *left, *right, Type::boolean())
                    }
                    _ => Expression::unary(
                        UnaryOp::Not,
                        Expression::binary(op, *left, *right, self.ty),
                    ),
                }
            }
            kind => Expression::unary(UnaryOp::Not, Expression::new(kind, self.ty)),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct Label(pub u32);

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum CaseLabel {
    Int(i32),
    String(String),
    Enum(String),
    Default,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SwitchCase {
    pub labels: Vec<CaseLabel>,
    pub body: Vec<Statement>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CatchClause {
    /// More than one type for a multi-catch.
    pub types: Vec<Type>,
    pub var: LocalRef,
    pub body: Vec<Statement>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum StmtKind {
    Block(Vec<Statement>),
    If {
        cond: Expression,
        then: Vec<Statement>,
        /// Empty when there is no `else`.
        otherwise: Vec<Statement>,
    },
    While {
        cond: Expression,
        body: Vec<Statement>,
    },
    DoWhile {
        body: Vec<Statement>,
        cond: Expression,
    },
    For {
        init: Vec<Statement>,
        cond: Option<Expression>,
        update: Vec<Expression>,
        body: Vec<Statement>,
    },
    ForEach {
        var: LocalRef,
        var_ty: Type,
        iterable: Expression,
        body: Vec<Statement>,
    },
    Switch {
        selector: Expression,
        cases: Vec<SwitchCase>,
    },
    Try {
        body: Vec<Statement>,
        catches: Vec<CatchClause>,
        finally: Option<Vec<Statement>>,
    },
    Synchronized {
        lock: Expression,
        body: Vec<Statement>,
    },
    Labeled {
        label: Label,
        body: Box<Statement>,
    },
    Break(Option<Label>),
    Continue(Option<Label>),
    Return(Option<Expression>),
    Throw(Expression),
    Expression(Expression),
    Declaration {
        var: LocalRef,
        ty: Type,
        init: Option<Expression>,
    },
    Assert {
        cond: Expression,
        message: Option<Expression>,
    },
    MonitorEnter(Expression),
    MonitorExit(Expression),
}

/// Statement annotated with its source line (0 when unknown).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Statement {
    pub kind: StmtKind,
    pub line: u32,
}

impl Statement {
    pub fn new(kind: StmtKind, line: u32) -> Self {
        Statement { kind, line }
    }

    pub fn expression(expr: Expression, line: u32) -> Self {
        Statement::new(StmtKind::Expression(expr), line)
    }

    /// Whether control never continues past this statement.
    pub fn is_abrupt(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::Return(_) | StmtKind::Throw(_) | StmtKind::Break(_) | StmtKind::Continue(_)
        )
    }
}

/// Whether control can reach the end of a statement list.
pub fn can_complete_normally(stmts: &[Statement]) -> bool {
    stmts.last().is_none_or(completes)
}

fn completes(stmt: &Statement) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) | StmtKind::Throw(_) | StmtKind::Break(_) | StmtKind::Continue(_) => {
            false
        }
        StmtKind::Block(body) | StmtKind::Synchronized { body, .. } => can_complete_normally(body),
        StmtKind::If {
            then, otherwise, ..
        } => otherwise.is_empty() || can_complete_normally(then) || can_complete_normally(otherwise),
        StmtKind::While { cond, body } => {
            !matches!(cond.kind, ExprKind::Literal(Literal::Boolean(true)))
                || visit::breaks_out_of(body, None)
        }
        StmtKind::Labeled { label, body } => match &body.kind {
            StmtKind::While { cond, body: inner } => {
                !matches!(cond.kind, ExprKind::Literal(Literal::Boolean(true)))
                    || visit::breaks_out_of(inner, Some(*label))
            }
            StmtKind::Block(inner) => {
                can_complete_normally(inner) || visit::contains_break_to(inner, *label)
            }
            _ => completes(body) || visit::contains_break_to(std::slice::from_ref(body), *label),
        },
        StmtKind::Try {
            body,
            catches,
            finally,
        } => {
            let finally_ok = finally.as_deref().is_none_or(can_complete_normally);
            finally_ok
                && (can_complete_normally(body)
                    || catches.iter().any(|clause| can_complete_normally(&clause.body)))
        }
        _ => true,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RawListing {
    pub reason: ErrorKind,
    pub message: String,
    /// First line is a marker identifying the listing as degraded output.
    pub lines: Vec<String>,
}

pub const RAW_LISTING_MARKER: &str = "// declass: raw instruction listing";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum MethodBody {
    Structured(Vec<Statement>),
    Raw(RawListing),
    /// Abstract or native method.
    None,
}

impl MethodBody {
    pub fn is_raw(&self) -> bool {
        matches!(self, MethodBody::Raw(_))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Parameter {
    pub var: LocalRef,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MethodDeclaration {
    pub name: String,
    pub descriptor: String,
    pub access: AccessFlags,
    pub type_params: Vec<TypeParameter>,
    pub params: Vec<Parameter>,
    pub return_type: Type,
    pub throws: Vec<Type>,
    pub body: MethodBody,
    pub line: u32,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldDeclarator {
    pub name: String,
    pub initializer: Option<Expression>,
    pub line: u32,
}

/// One field declaration statement, possibly declaring several fields.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldDeclaration {
    pub access: AccessFlags,
    pub ty: Type,
    pub declarators: Vec<FieldDeclarator>,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassDeclaration {
    /// Internal name.
    pub name: String,
    pub qualified_name: String,
    pub access: AccessFlags,
    pub type_params: Vec<TypeParameter>,
    pub super_class: Option<Type>,
    pub interfaces: Vec<Type>,
    pub source_file: Option<String>,
    pub members: Vec<MemberDeclaration>,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum MemberDeclaration {
    Field(FieldDeclaration),
    Method(MethodDeclaration),
    Type(ClassDeclaration),
}

impl MemberDeclaration {
    pub fn line(&self) -> u32 {
        match self {
            MemberDeclaration::Field(field) => field.line,
            MemberDeclaration::Method(method) => method.line,
            MemberDeclaration::Type(class) => class.line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(id: usize, name: &str) -> Expression {
        Expression::local(
            LocalRef {
                id,
                name: name.to_string(),
            },
            Type::int(),
        )
    }

    #[test]
    fn negation_flips_integer_comparisons_and_applies_de_morgan() {
        let lt = Expression::binary(BinaryOp::Lt, var(1, "a"), var(2, "b"), Type::boolean());
        let ne = Expression::binary(BinaryOp::Ne, var(1, "a"), Expression::int(0), Type::boolean());
        let both = Expression::binary(BinaryOp::LogicalAnd, lt, ne, Type::boolean());

        assert_eq!(both.negate().to_string(), "a >= b || a == 0");
    }

    #[test]
    fn negation_keeps_floating_comparisons_nan_safe() {
        let float = |id, name: &str| {
            Expression::local(
                LocalRef {
                    id,
                    name: name.to_string(),
                },
                Type::primitive(PrimitiveType::Double),
            )
        };
        let lt = Expression::binary(BinaryOp::Lt, float(1, "x"), float(2, "y"), Type::boolean());

        let negated = lt.clone().negate();

        assert_eq!(negated.to_string(), "!(x < y)");
        assert_eq!(negated.negate(), lt);
    }

    #[test]
    fn side_effects_and_references_look_through_subexpressions() {
        let call = Expression::new(
            ExprKind::MethodCall {
                target: CallTarget::Static,
                owner: "a/B".to_string(),
                name: "f".to_string(),
                descriptor: "(I)I".to_string(),
                args: vec![var(3, "c")],
            },
            Type::int(),
        );
        let sum = Expression::binary(BinaryOp::Add, var(1, "a"), call, Type::int());

        assert!(sum.has_side_effects());
        assert!(sum.references(3));
        assert!(!sum.references(2));
        assert!(!var(1, "a").has_side_effects());
    }

    #[test]
    fn completion_follows_java_reachability() {
        let ret = Statement::new(StmtKind::Return(None), 1);
        let call = Statement::expression(var(1, "a"), 1);
        let branch = Statement::new(
            StmtKind::If {
                cond: Expression::boolean(true),
                then: vec![ret.clone()],
                otherwise: vec![ret.clone()],
            },
            1,
        );
        let forever = Statement::new(
            StmtKind::While {
                cond: Expression::boolean(true),
                body: vec![call.clone()],
            },
            1,
        );

        assert!(can_complete_normally(&[call.clone()]));
        assert!(!can_complete_normally(&[call, ret]));
        assert!(!can_complete_normally(&[branch]));
        assert!(!can_complete_normally(&[forever]));
    }
}
