//! Symbolic operand-stack simulation: rebuilds expressions and statements for one basic block.

mod invoke;
mod locals;

use std::collections::HashMap;

use tracing::trace;

use crate::ast::{
    BinaryOp, ExprKind, Expression, Literal, LocalRef, Statement, StmtKind, UnaryOp,
};
use crate::cfg::BasicBlock;
use crate::error::{Diagnostic, ReconstructError};
use crate::ir::{
    CmpKind, Constant, IfCond, Op, RawClass, RawMethod, Relation, ValueKind,
};
use crate::resolver::TypeResolver;
use crate::types::{PrimitiveType, Type};

pub use locals::{this_type, LocalOrigin, LocalTable, LocalVar, TEMP_BASE};

/// Everything synthesis may consult besides the block itself.
pub struct MethodContext<'a> {
    pub class: &'a RawClass,
    pub method: &'a RawMethod,
    pub resolver: &'a TypeResolver,
    pub locals: &'a LocalTable,
}

/// How control leaves a block.
#[derive(Clone, Debug, PartialEq)]
pub enum BlockExit {
    FallThrough,
    Jump(u32),
    /// Jumps to `target` when `cond` holds, otherwise falls through.
    Branch { cond: Expression, target: u32 },
    Switch {
        selector: Expression,
        cases: Vec<(i32, u32)>,
        default: u32,
    },
    /// Return or throw; the statement is already in the block.
    Terminal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlockOutcome {
    pub statements: Vec<Statement>,
    /// Values left on the operand stack, bottom first.
    pub stack_out: Vec<Expression>,
    pub exit: BlockExit,
    pub exit_line: u32,
    pub diagnostics: Vec<Diagnostic>,
}

/// Simulates `block` starting from `stack_in`. Pure: equal inputs give equal outcomes.
pub fn synthesize(
    ctx: &MethodContext<'_>,
    block: &BasicBlock,
    stack_in: &[Expression],
) -> Result<BlockOutcome, ReconstructError> {
    let mut simulator = Simulator::new(ctx, block, stack_in);
    for instruction in &block.instructions {
        simulator.offset = instruction.offset;
        simulator.temps = 0;
        if simulator.stack.is_empty() && simulator.pending_iinc.is_none() {
            simulator.line = ctx.method.line_at(instruction.offset);
        }
        let loaded = simulator.last_load.take();
        let continues_iinc = matches!(
            (&instruction.op, &simulator.pending_iinc),
            (Op::Load(ValueKind::Int, _), Some(_))
        );
        if !continues_iinc {
            simulator.flush_iinc()?;
        }
        simulator.step(&instruction.op, loaded)?;
    }
    simulator.flush_iinc()?;
    Ok(simulator.finish())
}

#[derive(Clone, Debug)]
struct Value {
    id: u32,
    expr: Expression,
}

struct PendingIinc {
    var: LocalVar,
    delta: i16,
}

struct Simulator<'c, 'a> {
    ctx: &'c MethodContext<'a>,
    stack: Vec<Value>,
    statements: Vec<Statement>,
    diagnostics: Vec<Diagnostic>,
    next_id: u32,
    offset: u32,
    line: u32,
    temps: usize,
    last_load: Option<(usize, u32)>,
    pending_iinc: Option<PendingIinc>,
    /// Arithmetic results by value id: operator, left operand id, right operand.
    arith: HashMap<u32, (BinaryOp, u32, Expression)>,
    exit: BlockExit,
    exit_line: u32,
}

fn is_one(expr: &Expression) -> bool {
    matches!(
        expr.kind,
        ExprKind::Literal(Literal::Int(1)) | ExprKind::Literal(Literal::Long(1))
    ) || matches!(expr.kind, ExprKind::Literal(Literal::Float(value)) if value == 1.0)
        || matches!(expr.kind, ExprKind::Literal(Literal::Double(value)) if value == 1.0)
}

/// Assignment of `value` to `target`, folded into compound or increment form when possible.
pub(crate) fn assignment(target: Expression, value: Expression) -> Expression {
    let arithmetic = match &value.kind {
        ExprKind::Cast(inner) if value.ty == target.ty => &**inner,
        _ => &value,
    };
    if let ExprKind::Binary { op, left, right } = &arithmetic.kind
        && **left == target
        && !op.is_comparison()
        && !matches!(op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr)
    {
        if matches!(op, BinaryOp::Add | BinaryOp::Sub) && is_one(right) && !target.ty.is_string()
        {
            let op = if *op == BinaryOp::Add {
                UnaryOp::PreInc
            } else {
                UnaryOp::PreDec
            };
            return Expression::unary(op, target);
        }
        return Expression::assign(Some(*op), target, (**right).clone());
    }
    Expression::assign(None, target, value)
}

/// Statement spelling of an expression: `++x;` reads as `x++;`.
pub(crate) fn statement_form(expr: Expression) -> Expression {
    match expr.kind {
        ExprKind::Unary {
            op: UnaryOp::PreInc,
            operand,
        } => Expression::unary(UnaryOp::PostInc, *operand),
        ExprKind::Unary {
            op: UnaryOp::PreDec,
            operand,
        } => Expression::unary(UnaryOp::PostDec, *operand),
        kind => Expression::new(kind, expr.ty),
    }
}

/// Retypes int literals flowing into `boolean` and `char` contexts.
pub(crate) fn coerce_literal(expr: Expression, target: &Type) -> Expression {
    match (&expr.kind, target.as_primitive()) {
        (ExprKind::Literal(Literal::Int(value)), Some(PrimitiveType::Boolean))
            if matches!(*value, 0 | 1) =>
        {
            Expression::boolean(*value == 1)
        }
        (ExprKind::Literal(Literal::Int(value)), Some(PrimitiveType::Char))
            if (0..=0xffff).contains(value) =>
        {
            Expression::literal(Literal::Char(*value as u16))
        }
        (ExprKind::Ternary { .. }, Some(primitive @ (PrimitiveType::Boolean | PrimitiveType::Char))) => {
            let ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } = expr.kind
            else {
                return expr;
            };
            let then = coerce_literal(*then, target);
            let otherwise = coerce_literal(*otherwise, target);
            if primitive == PrimitiveType::Boolean {
                return boolean_ternary(*cond, then, otherwise);
            }
            ternary(*cond, then, otherwise, target.clone())
        }
        _ => expr,
    }
}

pub(crate) fn ternary(cond: Expression, then: Expression, otherwise: Expression, ty: Type) -> Expression {
    Expression::new(
        ExprKind::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        },
        ty,
    )
}

/// `c ? x : y` over booleans, reduced to `&&`/`||` when an arm is constant.
pub(crate) fn boolean_ternary(cond: Expression, then: Expression, otherwise: Expression) -> Expression {
    let constant = |expr: &Expression| match expr.kind {
        ExprKind::Literal(Literal::Boolean(value)) => Some(value),
        _ => None,
    };
    let logical =
        |op, left, right| Expression::binary(op, left, right, Type::boolean());
    match (constant(&then), constant(&otherwise)) {
        (Some(true), Some(false)) => cond,
        (Some(false), Some(true)) => cond.negate(),
        (_, Some(false)) => logical(BinaryOp::LogicalAnd, cond, then),
        (Some(true), _) => logical(BinaryOp::LogicalOr, cond, otherwise),
        (Some(false), _) => logical(BinaryOp::LogicalAnd, cond.negate(), otherwise),
        (_, Some(true)) => logical(BinaryOp::LogicalOr, cond.negate(), then),
        _ => ternary(cond, then, otherwise, Type::boolean()),
    }
}

/// Ternary whose arms are the int literals 0 and 1, as produced by boolean expressions.
pub(crate) fn is_boolean_ternary(expr: &Expression) -> bool {
    let bit = |expr: &Expression| match &expr.kind {
        ExprKind::Literal(Literal::Int(0 | 1)) | ExprKind::Literal(Literal::Boolean(_)) => true,
        ExprKind::Ternary { .. } => is_boolean_ternary(expr),
        _ => expr.ty.is_boolean(),
    };
    match &expr.kind {
        ExprKind::Ternary {
            then, otherwise, ..
        } => bit(then) && bit(otherwise),
        _ => false,
    }
}

/// Argument of `Wrapper.valueOf(primitive)`.
pub(crate) fn boxed_operand(expr: &Expression) -> Option<&Expression> {
    if let ExprKind::MethodCall {
        target: crate::ast::CallTarget::Static,
        owner,
        name,
        descriptor,
        args,
    } = &expr.kind
        && name == "valueOf"
        && let [arg] = args.as_slice()
        && let Some(primitive) = PrimitiveType::from_box_class(owner)
        && *descriptor == format!("({})L{owner};", primitive.descriptor_char())
    {
        return Some(arg);
    }
    None
}

/// Receiver of the canonical `wrapper.xxxValue()` unboxing call.
pub(crate) fn unboxed_receiver(expr: &Expression) -> Option<&Expression> {
    if let ExprKind::MethodCall {
        target: crate::ast::CallTarget::Instance(receiver),
        owner,
        name,
        descriptor,
        args,
    } = &expr.kind
        && args.is_empty()
        && let Some(primitive) = PrimitiveType::from_box_class(owner)
        && primitive.unbox_method() == Some(name.as_str())
        && *descriptor == format!("(){}", primitive.descriptor_char())
    {
        return Some(receiver);
    }
    None
}

fn numeric_type(ty: &Type) -> PrimitiveType {
    ty.as_primitive()
        .or_else(|| ty.unboxed())
        .unwrap_or(PrimitiveType::Int)
}

impl<'c, 'a> Simulator<'c, 'a> {
    fn new(ctx: &'c MethodContext<'a>, block: &BasicBlock, stack_in: &[Expression]) -> Self {
        let stack: Vec<Value> = stack_in
            .iter()
            .enumerate()
            .map(|(id, expr)| Value {
                id: id as u32,
                expr: expr.clone(),
            })
            .collect();
        Simulator {
            ctx,
            next_id: stack.len() as u32,
            stack,
            statements: Vec::new(),
            diagnostics: Vec::new(),
            offset: block.start_offset,
            line: ctx.method.line_at(block.start_offset),
            temps: 0,
            last_load: None,
            pending_iinc: None,
            arith: HashMap::new(),
            exit: BlockExit::FallThrough,
            exit_line: 0,
        }
    }

    fn finish(self) -> BlockOutcome {
        let exit_line = if self.exit_line == 0 {
            self.line
        } else {
            self.exit_line
        };
        BlockOutcome {
            statements: self.statements,
            stack_out: self.stack.into_iter().map(|value| value.expr).collect(),
            exit: self.exit,
            exit_line,
            diagnostics: self.diagnostics,
        }
    }

    fn error(&self, message: impl Into<String>) -> ReconstructError {
        ReconstructError::stack(self.offset, message)
    }

    fn push(&mut self, expr: Expression) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.stack.push(Value { id, expr });
        id
    }

    fn pop(&mut self) -> Result<Value, ReconstructError> {
        self.stack
            .pop()
            .ok_or_else(|| self.error("operand stack underflow"))
    }

    /// Pops `count` values, returned bottom first.
    fn pop_n(&mut self, count: usize) -> Result<Vec<Value>, ReconstructError> {
        if self.stack.len() < count {
            return Err(self.error(format!(
                "operand stack underflow: need {count}, have {}",
                self.stack.len()
            )));
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn temp(&mut self, ty: Type) -> Expression {
        let id = TEMP_BASE + self.offset as usize * 16 + self.temps;
        let name = if self.temps == 0 {
            format!("tmp{}", self.offset)
        } else {
            format!("tmp{}_{}", self.offset, self.temps)
        };
        self.temps += 1;
        Expression::local(LocalRef { id, name }, ty)
    }

    fn needs_spill(expr: &Expression) -> bool {
        let mut reads_state = false;
        crate::ast::visit::for_each_expr(expr, &mut |inner| {
            if matches!(
                inner.kind,
                ExprKind::Field { .. } | ExprKind::ArrayAccess { .. } | ExprKind::ArrayLength(_)
            ) {
                reads_state = true;
            }
        });
        expr.has_side_effects() || reads_state
    }

    fn spill_at(&mut self, index: usize) {
        let ty = self.stack[index].expr.ty.clone();
        let temp = self.temp(ty);
        let value = std::mem::replace(&mut self.stack[index].expr, temp.clone());
        trace!(offset = self.offset, temp = %temp, "spilling stack value");
        self.statements.push(Statement::expression(
            Expression::assign(None, temp, value),
            self.line,
        ));
    }

    /// Appends a statement after spilling stack values whose evaluation must precede it.
    fn emit(&mut self, kind: StmtKind) {
        for index in 0..self.stack.len() {
            if Self::needs_spill(&self.stack[index].expr) {
                self.spill_at(index);
            }
        }
        self.statements.push(Statement::new(kind, self.line));
    }

    fn spill_references(&mut self, var: usize) {
        for index in 0..self.stack.len() {
            if self.stack[index].expr.references(var) {
                self.spill_at(index);
            }
        }
    }

    fn local_at(&self) -> Result<LocalVar, ReconstructError> {
        self.ctx
            .locals
            .at(self.offset)
            .cloned()
            .ok_or_else(|| self.error("no variable for local access"))
    }

    fn local_expr(local: &LocalVar) -> Expression {
        if local.origin == LocalOrigin::This {
            Expression::new(ExprKind::This, local.ty.clone())
        } else {
            Expression::local(local.var.clone(), local.ty.clone())
        }
    }

    /// Stores `value` into `target`: as an embedded assignment when the value was duplicated,
    /// as a post-increment when the old value is still on the stack, else as a statement.
    fn store(&mut self, target: Expression, value: Value) {
        let expr = coerce_literal(self.coerce_value(value.expr, &target.ty), &target.ty);
        if let Some(position) = self.stack.iter().rposition(|entry| entry.id == value.id) {
            let assign = assignment(target.clone(), expr);
            for entry in self.stack.iter_mut().filter(|entry| entry.id == value.id) {
                entry.expr = target.clone();
            }
            self.stack[position].expr = assign;
            return;
        }
        if let Some((op, left, right)) = self.arith.get(&value.id)
            && matches!(op, BinaryOp::Add | BinaryOp::Sub)
            && is_one(right)
            && !target.ty.is_string()
            && let Some(position) = self
                .stack
                .iter()
                .rposition(|entry| entry.id == *left && entry.expr == target)
        {
            let op = if *op == BinaryOp::Add {
                UnaryOp::PostInc
            } else {
                UnaryOp::PostDec
            };
            self.stack[position].expr = Expression::unary(op, target);
            return;
        }
        if let ExprKind::Local(var) = &target.kind {
            self.spill_references(var.id);
        }
        let assign = statement_form(assignment(target, expr));
        self.emit(StmtKind::Expression(assign));
    }

    /// Elides boxing and unboxing calls that Java inserts implicitly for `target`.
    fn coerce_value(&self, expr: Expression, target: &Type) -> Expression {
        if target.is_reference()
            && !matches!(target, Type::Generic { .. })
            && let Some(operand) = boxed_operand(&expr)
        {
            return operand.clone();
        }
        if let Some(primitive) = target.as_primitive()
            && expr.ty.as_primitive() == Some(primitive)
            && let Some(receiver) = unboxed_receiver(&expr)
        {
            return receiver.clone();
        }
        expr
    }

    /// Operand of arithmetic, comparison or switch: unboxing is implicit there.
    fn numeric_operand(expr: Expression) -> Expression {
        match unboxed_receiver(&expr) {
            Some(receiver) => receiver.clone(),
            None => expr,
        }
    }

    fn flush_iinc(&mut self) -> Result<(), ReconstructError> {
        let Some(pending) = self.pending_iinc.take() else {
            return Ok(());
        };
        self.spill_references(pending.var.var.id);
        let target = Self::local_expr(&pending.var);
        let expr = statement_form(Self::increment(target, pending.delta));
        self.emit(StmtKind::Expression(expr));
        Ok(())
    }

    fn increment(target: Expression, delta: i16) -> Expression {
        match delta {
            1 => Expression::unary(UnaryOp::PreInc, target),
            -1 => Expression::unary(UnaryOp::PreDec, target),
            delta if delta < 0 => Expression::assign(
                Some(BinaryOp::Sub),
                target,
                Expression::int(-i32::from(delta)),
            ),
            delta => Expression::assign(Some(BinaryOp::Add), target, Expression::int(delta.into())),
        }
    }

    fn step(&mut self, op: &Op, loaded: Option<(usize, u32)>) -> Result<(), ReconstructError> {
        match op {
            Op::Nop => {}
            Op::Const(constant) => {
                let expr = self.constant(constant);
                self.push(expr);
            }
            Op::Load(_, _) => {
                let local = self.local_at()?;
                if let Some(pending) = self.pending_iinc.take() {
                    if pending.var.var.id == local.var.id {
                        let target = Self::local_expr(&local);
                        self.push(Self::increment(target, pending.delta));
                        return Ok(());
                    }
                    self.pending_iinc = Some(pending);
                    self.flush_iinc()?;
                }
                let id = self.push(Self::local_expr(&local));
                self.last_load = Some((local.var.id, id));
            }
            Op::Store(_, _) => {
                let value = self.pop()?;
                let local = self.local_at()?;
                let target = Self::local_expr(&local);
                self.store(target, value);
            }
            Op::Iinc { delta, .. } => {
                let local = self.local_at()?;
                let top = self.stack.last().map(|value| value.id);
                if let Some((var, id)) = loaded
                    && var == local.var.id
                    && top == Some(id)
                    && matches!(*delta, 1 | -1)
                {
                    let op = if *delta == 1 {
                        UnaryOp::PostInc
                    } else {
                        UnaryOp::PostDec
                    };
                    if let Some(value) = self.stack.last_mut() {
                        value.expr = Expression::unary(op, value.expr.clone());
                    }
                } else if self.stack.is_empty() {
                    self.pending_iinc = Some(PendingIinc {
                        var: local,
                        delta: *delta,
                    });
                    self.flush_iinc()?;
                } else {
                    self.pending_iinc = Some(PendingIinc {
                        var: local,
                        delta: *delta,
                    });
                }
            }
            Op::ArrayLoad(kind) => {
                let index = self.pop()?;
                let array = self.pop()?;
                let element = array
                    .expr
                    .ty
                    .element_type()
                    .cloned()
                    .unwrap_or_else(|| kind.default_element());
                self.push(Expression::new(
                    ExprKind::ArrayAccess {
                        array: Box::new(array.expr),
                        index: Box::new(Self::numeric_operand(index.expr)),
                    },
                    element,
                ));
            }
            Op::ArrayStore(kind) => {
                let value = self.pop()?;
                let index = self.pop()?;
                let array = self.pop()?;
                let element = array
                    .expr
                    .ty
                    .element_type()
                    .cloned()
                    .unwrap_or_else(|| kind.default_element());
                if self.append_initializer(&array, &index.expr, &value, &element) {
                    return Ok(());
                }
                let array = self.materialize(array);
                let target = Expression::new(
                    ExprKind::ArrayAccess {
                        array: Box::new(array),
                        index: Box::new(Self::numeric_operand(index.expr)),
                    },
                    element,
                );
                self.store(target, value);
            }
            Op::Pop => {
                let value = self.pop()?;
                self.discard(value);
            }
            Op::Pop2 => {
                let value = self.pop()?;
                let wide = value.expr.ty.slot_size() == 2;
                self.discard(value);
                if !wide {
                    let value = self.pop()?;
                    self.discard(value);
                }
            }
            Op::Dup => self.dup_slots(1, 0)?,
            Op::DupX1 => self.dup_slots(1, 1)?,
            Op::DupX2 => self.dup_slots(1, 2)?,
            Op::Dup2 => self.dup_slots(2, 0)?,
            Op::Dup2X1 => self.dup_slots(2, 1)?,
            Op::Dup2X2 => self.dup_slots(2, 2)?,
            Op::Swap => {
                let top = self.pop()?;
                let below = self.pop()?;
                self.stack.push(top);
                self.stack.push(below);
            }
            Op::Arith(_, arith) => {
                let right = self.pop()?;
                let left = self.pop()?;
                let op = BinaryOp::from_arith(*arith);
                let left_expr = Self::numeric_operand(left.expr);
                let right_expr = Self::numeric_operand(right.expr);
                let left_ty = numeric_type(&left_expr.ty);
                let right_ty = numeric_type(&right_expr.ty);
                let ty = if op.is_shift() {
                    left_ty.promote(PrimitiveType::Int)
                } else if left_ty == PrimitiveType::Boolean || right_ty == PrimitiveType::Boolean {
                    PrimitiveType::Boolean
                } else {
                    left_ty.promote(right_ty)
                };
                let (left_expr, right_expr) = if ty == PrimitiveType::Boolean {
                    (
                        coerce_literal(left_expr, &Type::boolean()),
                        coerce_literal(right_expr, &Type::boolean()),
                    )
                } else {
                    (left_expr, right_expr)
                };
                let id = self.push(Expression::binary(
                    op,
                    left_expr,
                    right_expr.clone(),
                    Type::primitive(ty),
                ));
                self.arith.insert(id, (op, left.id, right_expr));
            }
            Op::Neg(_) => {
                let value = self.pop()?;
                self.push(Expression::unary(
                    UnaryOp::Neg,
                    Self::numeric_operand(value.expr),
                ));
            }
            Op::Convert { to, .. } => {
                let value = self.pop()?;
                self.push(Expression::new(
                    ExprKind::Cast(Box::new(Self::numeric_operand(value.expr))),
                    Type::primitive(*to),
                ));
            }
            Op::Compare(kind) => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(Expression::new(
                    ExprKind::Compare3 {
                        kind: *kind,
                        left: Box::new(Self::numeric_operand(left.expr)),
                        right: Box::new(Self::numeric_operand(right.expr)),
                    },
                    Type::int(),
                ));
            }
            Op::If { cond, target } => {
                let cond = self.condition(*cond)?;
                self.exit_line = self.line;
                self.exit = BlockExit::Branch {
                    cond,
                    target: *target,
                };
            }
            Op::Goto(target) => self.exit = BlockExit::Jump(*target),
            Op::Jsr(_) | Op::Ret(_) => return Err(self.error("subroutines are not supported")),
            Op::TableSwitch {
                default,
                low,
                targets,
            } => {
                let selector = Self::numeric_operand(self.pop()?.expr);
                let cases = targets
                    .iter()
                    .enumerate()
                    .map(|(index, target)| (low.wrapping_add(index as i32), *target))
                    .collect();
                self.exit_line = self.line;
                self.exit = BlockExit::Switch {
                    selector,
                    cases,
                    default: *default,
                };
            }
            Op::LookupSwitch { default, pairs } => {
                let selector = Self::numeric_operand(self.pop()?.expr);
                self.exit_line = self.line;
                self.exit = BlockExit::Switch {
                    selector,
                    cases: pairs.clone(),
                    default: *default,
                };
            }
            Op::Return(kind) => {
                let value = match kind {
                    Some(_) => {
                        let value = self.pop()?;
                        let ret = self.ctx.locals.return_type();
                        let expr = self.coerce_value(value.expr, &ret);
                        Some(coerce_literal(expr, &ret))
                    }
                    None => None,
                };
                self.emit(StmtKind::Return(value));
                self.exit = BlockExit::Terminal;
            }
            Op::Athrow => {
                let value = self.pop()?;
                self.emit(StmtKind::Throw(value.expr));
                self.exit = BlockExit::Terminal;
            }
            Op::GetField(field) => {
                let receiver = self.pop()?;
                let ty = self.field_type(Some(&receiver.expr), field);
                self.push(Expression::new(
                    ExprKind::Field {
                        target: Some(Box::new(receiver.expr)),
                        owner: field.owner.clone(),
                        name: field.name.clone(),
                    },
                    ty,
                ));
            }
            Op::GetStatic(field) => {
                let ty = self.field_type(None, field);
                self.push(Expression::new(
                    ExprKind::Field {
                        target: None,
                        owner: field.owner.clone(),
                        name: field.name.clone(),
                    },
                    ty,
                ));
            }
            Op::PutField(field) => {
                let value = self.pop()?;
                let receiver = self.pop()?;
                let receiver = self.materialize(receiver);
                let ty = self.field_type(Some(&receiver), field);
                let target = Expression::new(
                    ExprKind::Field {
                        target: Some(Box::new(receiver)),
                        owner: field.owner.clone(),
                        name: field.name.clone(),
                    },
                    ty,
                );
                self.store(target, value);
            }
            Op::PutStatic(field) => {
                let value = self.pop()?;
                let ty = self.field_type(None, field);
                let target = Expression::new(
                    ExprKind::Field {
                        target: None,
                        owner: field.owner.clone(),
                        name: field.name.clone(),
                    },
                    ty,
                );
                self.store(target, value);
            }
            Op::Invoke { kind, method } => self.invoke(*kind, method)?,
            Op::InvokeDynamic(site) => self.invoke_dynamic(site)?,
            Op::New(class) => {
                self.push(Expression::new(
                    ExprKind::Uninitialized(class.clone()),
                    Type::object(class.clone()),
                ));
            }
            Op::NewArray(primitive) => {
                let count = self.pop()?;
                let element = Type::primitive(*primitive);
                self.push(Self::new_array(element, vec![count.expr]));
            }
            Op::ANewArray(class) => {
                let count = self.pop()?;
                let element = self.ctx.resolver.resolve(class);
                self.push(Self::new_array(element, vec![count.expr]));
            }
            Op::MultiANewArray {
                descriptor,
                dimensions,
            } => {
                let counts = self.pop_n(usize::from(*dimensions))?;
                let element = self
                    .ctx
                    .resolver
                    .resolve(descriptor)
                    .element_type()
                    .cloned()
                    .ok_or_else(|| self.error("multianewarray of a non-array type"))?;
                self.push(Self::new_array(
                    element,
                    counts.into_iter().map(|count| count.expr).collect(),
                ));
            }
            Op::ArrayLength => {
                let array = self.pop()?;
                self.push(Expression::new(
                    ExprKind::ArrayLength(Box::new(array.expr)),
                    Type::int(),
                ));
            }
            Op::CheckCast(class) => {
                let value = self.pop()?;
                let target = self.ctx.resolver.resolve(class);
                let source = &value.expr.ty;
                let redundant = !matches!(source, Type::Null)
                    && !source.is_object_root()
                    && !source.contains_generics()
                    && self.ctx.resolver.is_assignable(&target, source);
                let expr = if redundant {
                    value.expr
                } else {
                    Expression::new(ExprKind::Cast(Box::new(value.expr)), target)
                };
                self.stack.push(Value {
                    id: value.id,
                    expr,
                });
            }
            Op::InstanceOf(class) => {
                let value = self.pop()?;
                let class = self.ctx.resolver.resolve(class);
                self.push(Expression::new(
                    ExprKind::InstanceOf {
                        expr: Box::new(value.expr),
                        class,
                    },
                    Type::boolean(),
                ));
            }
            Op::MonitorEnter => {
                let lock = self.pop()?;
                self.emit(StmtKind::MonitorEnter(lock.expr));
            }
            Op::MonitorExit => {
                let lock = self.pop()?;
                self.emit(StmtKind::MonitorExit(lock.expr));
            }
        }
        Ok(())
    }

    fn constant(&self, constant: &Constant) -> Expression {
        let literal = match constant {
            Constant::Null => Literal::Null,
            Constant::Int(value) => Literal::Int(*value),
            Constant::Long(value) => Literal::Long(*value),
            Constant::Float(value) => Literal::Float(*value),
            Constant::Double(value) => Literal::Double(*value),
            Constant::String(value) => Literal::String(value.clone()),
            Constant::Class(name) => Literal::Class(self.ctx.resolver.resolve(name)),
            Constant::MethodType(descriptor) => {
                return Expression::new(
                    ExprKind::Literal(Literal::String(descriptor.clone())),
                    constant.ty(),
                );
            }
            Constant::MethodHandle(handle) => {
                return Expression::new(
                    ExprKind::MethodReference {
                        receiver: None,
                        owner: handle.member.owner.clone(),
                        name: handle.member.name.clone(),
                    },
                    constant.ty(),
                );
            }
        };
        Expression::literal(literal)
    }

    /// Allocation of `element[]`; dimensions beyond the first belong to `element`.
    fn new_array(element: Type, dimensions: Vec<Expression>) -> Expression {
        let ty = Type::array(element.clone());
        Expression::new(
            ExprKind::NewArray {
                element,
                dimensions,
                init: None,
            },
            ty,
        )
    }

    /// Folds `dup; index; value; xastore` on a fresh array into an initializer list.
    fn append_initializer(
        &mut self,
        array: &Value,
        index: &Expression,
        value: &Value,
        element: &Type,
    ) -> bool {
        let Some(position) = self.stack.iter().rposition(|entry| entry.id == array.id) else {
            return false;
        };
        let Some(index) = index.as_int() else {
            return false;
        };
        let expr = coerce_literal(self.coerce_value(value.expr.clone(), element), element);
        let ExprKind::NewArray {
            dimensions, init, ..
        } = &mut self.stack[position].expr.kind
        else {
            return false;
        };
        let length = match dimensions.as_slice() {
            [length] => length.as_int(),
            _ => None,
        };
        let filled = init.as_ref().map_or(0, Vec::len);
        if length.is_none_or(|length| index >= length) || (index as usize) < filled {
            return false;
        }
        let values = init.get_or_insert_with(Vec::new);
        while values.len() < index as usize {
            values.push(default_value(element));
        }
        values.push(expr);
        true
    }

    /// Replaces a still-shared allocation with a temporary so it is evaluated once.
    fn materialize(&mut self, value: Value) -> Expression {
        let shared = self.stack.iter().any(|entry| entry.id == value.id);
        let allocation = matches!(
            value.expr.kind,
            ExprKind::NewArray { .. } | ExprKind::NewObject { .. }
        );
        if !(shared && allocation) {
            return value.expr;
        }
        let temp = self.temp(value.expr.ty.clone());
        self.statements.push(Statement::expression(
            Expression::assign(None, temp.clone(), value.expr),
            self.line,
        ));
        for entry in self.stack.iter_mut().filter(|entry| entry.id == value.id) {
            entry.expr = temp.clone();
        }
        temp
    }

    fn discard(&mut self, value: Value) {
        if !value.expr.has_side_effects() {
            return;
        }
        // `Objects.requireNonNull(x)` guarding a bound method reference receiver.
        if let ExprKind::MethodCall { name, args, .. } = &value.expr.kind
            && matches!(name.as_str(), "requireNonNull" | "getClass")
            && self
                .stack
                .last()
                .is_some_and(|top| args.first() == Some(&top.expr) || Self::receiver_of(&value.expr) == Some(&top.expr))
        {
            return;
        }
        self.emit(StmtKind::Expression(statement_form(value.expr)));
    }

    fn receiver_of(expr: &Expression) -> Option<&Expression> {
        match &expr.kind {
            ExprKind::MethodCall {
                target: crate::ast::CallTarget::Instance(receiver),
                ..
            } => Some(receiver),
            _ => None,
        }
    }

    /// Copies the top `group` slots below the `skip` slots under them.
    fn dup_slots(&mut self, group: usize, skip: usize) -> Result<(), ReconstructError> {
        let mut taken = 0;
        let mut group_len = 0;
        while taken < group {
            let value = self
                .stack
                .len()
                .checked_sub(group_len + 1)
                .map(|index| &self.stack[index])
                .ok_or_else(|| self.error("operand stack underflow in dup"))?;
            taken += value.expr.ty.slot_size().max(1);
            group_len += 1;
        }
        let mut skipped = 0;
        let mut skip_len = 0;
        while skipped < skip {
            let value = self
                .stack
                .len()
                .checked_sub(group_len + skip_len + 1)
                .map(|index| &self.stack[index])
                .ok_or_else(|| self.error("operand stack underflow in dup"))?;
            skipped += value.expr.ty.slot_size().max(1);
            skip_len += 1;
        }
        if taken != group || skipped != skip {
            return Err(self.error("dup splits a wide value"));
        }
        let top = self.stack.len() - group_len;
        let copies: Vec<Value> = self.stack[top..].to_vec();
        let insert_at = top - skip_len;
        let tail = self.stack.split_off(insert_at);
        self.stack.extend(copies);
        self.stack.extend(tail);
        Ok(())
    }

    fn condition(&mut self, cond: IfCond) -> Result<Expression, ReconstructError> {
        let expr = match cond {
            IfCond::Zero(relation) => {
                let value = self.pop()?;
                match value.expr.kind {
                    ExprKind::Compare3 { kind, left, right } => {
                        compare(kind, relation, *left, *right)
                    }
                    _ => {
                        let mut operand = Self::numeric_operand(value.expr);
                        if is_boolean_ternary(&operand) {
                            operand = coerce_literal(operand, &Type::boolean());
                        }
                        if operand.ty.is_boolean() {
                            match relation {
                                Relation::Ne => operand,
                                _ => operand.negate(),
                            }
                        } else {
                            Expression::binary(
                                BinaryOp::from_relation(relation),
                                operand,
                                Expression::int(0),
                                Type::boolean(),
                            )
                        }
                    }
                }
            }
            IfCond::IntCompare(relation) => {
                let right = Self::numeric_operand(self.pop()?.expr);
                let left = Self::numeric_operand(self.pop()?.expr);
                let right = coerce_literal(right, &left.ty);
                let left = coerce_literal(left, &right.ty);
                Expression::binary(
                    BinaryOp::from_relation(relation),
                    left,
                    right,
                    Type::boolean(),
                )
            }
            IfCond::RefCompare(relation) => {
                let right = self.pop()?;
                let left = self.pop()?;
                Expression::binary(
                    BinaryOp::from_relation(relation),
                    left.expr,
                    right.expr,
                    Type::boolean(),
                )
            }
            IfCond::Null | IfCond::NonNull => {
                let value = self.pop()?;
                let op = if cond == IfCond::Null {
                    BinaryOp::Eq
                } else {
                    BinaryOp::Ne
                };
                Expression::binary(
                    op,
                    value.expr,
                    Expression::literal(Literal::Null),
                    Type::boolean(),
                )
            }
        };
        Ok(expr)
    }
}

/// Branch condition for `cmp; if<relation>`, keeping NaN behaviour exact.
fn compare(kind: CmpKind, relation: Relation, left: Expression, right: Expression) -> Expression {
    let op = BinaryOp::from_relation(relation);
    let plain = kind == CmpKind::Long
        || relation.holds(kind.nan_result(), 0) == (relation == Relation::Ne);
    if plain {
        return Expression::binary(op, left, right, Type::boolean());
    }
    let inverse = op.inverse().unwrap_or(op);
    Expression::unary(
        UnaryOp::Not,
        Expression::binary(inverse, left, right, Type::boolean()),
    )
}

/// Zero value of a type, used to pad array initializers.
pub(crate) fn default_value(ty: &Type) -> Expression {
    match ty.as_primitive() {
        Some(PrimitiveType::Boolean) => Expression::boolean(false),
        Some(PrimitiveType::Char) => Expression::literal(Literal::Char(0)),
        Some(PrimitiveType::Long) => Expression::literal(Literal::Long(0)),
        Some(PrimitiveType::Float) => Expression::literal(Literal::Float(0.0)),
        Some(PrimitiveType::Double) => Expression::literal(Literal::Double(0.0)),
        Some(_) => Expression::int(0),
        None => Expression::literal(Literal::Null),
    }
}
