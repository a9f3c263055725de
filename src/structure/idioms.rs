//! Source-level idioms recovered from the structured tree: counting and enhanced `for` loops,
//! `switch` over strings and enums, `assert`, and three-way comparisons.

use std::collections::HashMap;

use tracing::trace;

use crate::ast::{
    visit, BinaryOp, CallTarget, CaseLabel, ExprKind, Expression, Label, Literal, LocalRef,
    Statement, StmtKind, SwitchCase, UnaryOp,
};
use crate::ir::CmpKind;
use crate::resolver::TypeResolver;
use crate::synth::unboxed_receiver;
use crate::types::Type;

pub(crate) fn apply(body: &mut Vec<Statement>, resolver: &TypeResolver) {
    lower_compares(body);
    visit::map_lists(body, &mut |list| {
        for stmt in list.iter_mut() {
            if let Some(kind) = as_assert(stmt) {
                stmt.kind = kind;
            }
        }
    });
    visit::map_lists(body, &mut |list| {
        for stmt in list.iter_mut() {
            enum_switch(stmt, resolver);
        }
    });
    visit::map_lists(body, &mut |list| rewrite_windows(list, 4, string_switch));
    visit::map_lists(body, &mut |list| rewrite_windows(list, 4, array_loop));
    visit::map_lists(body, &mut |list| rewrite_windows(list, 2, iterator_loop));
    visit::map_lists(body, &mut |list| rewrite_windows(list, 2, counting_loop));
}

/// Replaces each run of `width` statements that `rewrite` recognizes, given what follows it.
fn rewrite_windows(
    list: &mut Vec<Statement>,
    width: usize,
    rewrite: fn(&[Statement], &[Statement]) -> Option<Statement>,
) {
    let mut index = 0;
    while index + width <= list.len() {
        if let Some(stmt) = rewrite(&list[index..index + width], &list[index + width..]) {
            list.splice(index..index + width, [stmt]);
        }
        index += 1;
    }
}

fn local_id(expr: &Expression) -> Option<usize> {
    expr.as_local().map(|var| var.id)
}

fn declaration(stmt: &Statement) -> Option<(&LocalRef, &Type, &Expression)> {
    match &stmt.kind {
        StmtKind::Declaration {
            var,
            ty,
            init: Some(init),
        } => Some((var, ty, init)),
        _ => None,
    }
}

fn unlabeled(stmt: &Statement) -> (Option<Label>, &Statement) {
    match &stmt.kind {
        StmtKind::Labeled { label, body } => (Some(*label), body),
        _ => (None, stmt),
    }
}

fn with_label(label: Option<Label>, stmt: Statement) -> Statement {
    match label {
        Some(label) => {
            let line = stmt.line;
            Statement::new(
                StmtKind::Labeled {
                    label,
                    body: Box::new(stmt),
                },
                line,
            )
        }
        None => stmt,
    }
}

/// Receiver of a no-argument call to `name`.
fn call_on<'a>(expr: &'a Expression, name: &str) -> Option<&'a Expression> {
    match &expr.kind {
        ExprKind::MethodCall {
            target: CallTarget::Instance(receiver),
            name: called,
            args,
            ..
        } if called == name && args.is_empty() => Some(receiver),
        _ => None,
    }
}

fn lower_compares(body: &mut [Statement]) {
    visit::map_exprs_in(body, &mut |expr| {
        let ExprKind::Compare3 { kind, left, right } = &mut expr.kind else {
            return;
        };
        let (owner, descriptor) = match *kind {
            CmpKind::Long => ("java/lang/Long", "(JJ)I"),
            CmpKind::FloatL | CmpKind::FloatG => ("java/lang/Float", "(FF)I"),
            CmpKind::DoubleL | CmpKind::DoubleG => ("java/lang/Double", "(DD)I"),
        };
        let args = vec![
            std::mem::replace(&mut **left, Expression::int(0)),
            std::mem::replace(&mut **right, Expression::int(0)),
        ];
        expr.kind = ExprKind::MethodCall {
            target: CallTarget::Static,
            owner: owner.to_string(),
            name: "compare".to_string(),
            descriptor: descriptor.to_string(),
            args,
        };
    });
}

fn assertions_enabled(expr: &Expression) -> bool {
    let flag = |expr: &Expression| {
        matches!(&expr.kind, ExprKind::Field { target: None, name, .. } if name == "$assertionsDisabled")
    };
    match &expr.kind {
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => flag(operand),
        ExprKind::Binary {
            op: BinaryOp::Eq,
            left,
            right,
        } => {
            flag(left)
                && matches!(
                    right.kind,
                    ExprKind::Literal(Literal::Boolean(false)) | ExprKind::Literal(Literal::Int(0))
                )
        }
        _ => false,
    }
}

/// Message of a lone `throw new AssertionError(...)`.
fn assertion_failure(stmts: &[Statement]) -> Option<Option<&Expression>> {
    let [
        Statement {
            kind:
                StmtKind::Throw(Expression {
                    kind: ExprKind::NewObject { class, args, .. },
                    ..
                }),
            ..
        },
    ] = stmts
    else {
        return None;
    };
    if class.internal_name() != Some("java/lang/AssertionError") || args.len() > 1 {
        return None;
    }
    Some(args.first())
}

fn conjuncts(expr: &Expression) -> Vec<&Expression> {
    match &expr.kind {
        ExprKind::Binary {
            op: BinaryOp::LogicalAnd,
            left,
            right,
        } => {
            let mut parts = conjuncts(left);
            parts.extend(conjuncts(right));
            parts
        }
        _ => vec![expr],
    }
}

/// `if (!$assertionsDisabled && !c) throw new AssertionError(m);` in either nesting.
fn as_assert(stmt: &Statement) -> Option<StmtKind> {
    let StmtKind::If {
        cond,
        then,
        otherwise,
    } = &stmt.kind
    else {
        return None;
    };
    if !otherwise.is_empty() {
        return None;
    }
    let parts = conjuncts(cond);
    let (enabled, rest) = parts.split_first()?;
    if !assertions_enabled(enabled) {
        return None;
    }
    let (failing, then) = match rest.split_first() {
        Some((first, others)) => {
            let failing = others.iter().fold((*first).clone(), |acc, part| {
                Expression::binary(BinaryOp::LogicalAnd, acc, (*part).clone(), Type::boolean())
            });
            (failing, then.as_slice())
        }
        None => match then.as_slice() {
            [Statement {
                kind:
                    StmtKind::If {
                        cond,
                        then,
                        otherwise,
                    },
                ..
            }] if otherwise.is_empty() => (cond.clone(), then.as_slice()),
            _ => return None,
        },
    };
    let message = assertion_failure(then)?;
    Some(StmtKind::Assert {
        cond: failing.negate(),
        message: message.cloned(),
    })
}

/// Enum value and case numbering behind a `switch` selector.
fn enum_cases(
    selector: &Expression,
    resolver: &TypeResolver,
) -> Option<(Expression, HashMap<i32, String>)> {
    if let ExprKind::ArrayAccess { array, index } = &selector.kind
        && let ExprKind::Field {
            target: None,
            owner,
            name,
        } = &array.kind
        && name.starts_with("$SwitchMap$")
    {
        let value = call_on(index, "ordinal")?;
        let map = resolver.switch_map(owner, name)?;
        let cases = map.into_iter().map(|(name, case)| (case, name)).collect();
        return Some((value.clone(), cases));
    }
    let value = call_on(selector, "ordinal")?;
    let constants = resolver.enum_constants(value.ty.internal_name()?);
    if constants.is_empty() {
        return None;
    }
    let cases = constants
        .into_iter()
        .enumerate()
        .map(|(index, name)| (index as i32, name))
        .collect();
    Some((value.clone(), cases))
}

fn enum_switch(stmt: &mut Statement, resolver: &TypeResolver) {
    match &mut stmt.kind {
        StmtKind::Labeled { body, .. } => enum_switch(body, resolver),
        StmtKind::Switch { selector, cases } => {
            let Some((value, names)) = enum_cases(selector, resolver) else {
                return;
            };
            let relabeled: Option<Vec<Vec<CaseLabel>>> = cases
                .iter()
                .map(|case| {
                    case.labels
                        .iter()
                        .map(|label| match label {
                            CaseLabel::Int(case) => names.get(case).cloned().map(CaseLabel::Enum),
                            other => Some(other.clone()),
                        })
                        .collect()
                })
                .collect();
            let Some(relabeled) = relabeled else {
                trace!(selector = %selector, "switch cases do not match the enum constants");
                return;
            };
            for (case, labels) in cases.iter_mut().zip(relabeled) {
                case.labels = labels;
            }
            *selector = value;
        }
        _ => {}
    }
}

/// `s.equals("lit")` or its negation, as the literal and whether it is negated.
fn equals_literal(cond: &Expression, string: usize) -> Option<(&str, bool)> {
    match &cond.kind {
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => equals_literal(operand, string).map(|(literal, negated)| (literal, !negated)),
        ExprKind::MethodCall {
            target: CallTarget::Instance(receiver),
            name,
            args,
            ..
        } if name == "equals" && local_id(receiver) == Some(string) => match args.as_slice() {
            [Expression {
                kind: ExprKind::Literal(Literal::String(literal)),
                ..
            }] => Some((literal, false)),
            _ => None,
        },
        _ => None,
    }
}

/// Runs a `hashCode` case body assuming the string equals `literal`.
///
/// Returns whether the body stopped, or `None` when it does more than test and assign.
fn run_case(
    stmts: &[Statement],
    string: usize,
    index: usize,
    label: Option<Label>,
    literal: &str,
    assigned: &mut Option<i32>,
) -> Option<bool> {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                let (tested, negated) = equals_literal(cond, string)?;
                let branch = if (tested == literal) != negated {
                    then
                } else {
                    otherwise
                };
                if run_case(branch, string, index, label, literal, assigned)? {
                    return Some(true);
                }
            }
            StmtKind::Expression(Expression {
                kind:
                    ExprKind::Assign {
                        op: None,
                        target,
                        value,
                    },
                ..
            }) if local_id(target) == Some(index) => *assigned = Some(value.as_int()?),
            StmtKind::Break(None) => return Some(true),
            StmtKind::Break(Some(target)) if Some(*target) == label => return Some(true),
            _ => return None,
        }
    }
    Some(false)
}

/// `String s = x; int i = -1; switch (s.hashCode()) {...} switch (i) {...}`.
fn string_switch(window: &[Statement], rest: &[Statement]) -> Option<Statement> {
    let [copy, start, hashed, dispatch] = window else {
        return None;
    };
    let (string, string_ty, value) = declaration(copy)?;
    if !string_ty.is_string() && !value.ty.is_string() {
        return None;
    }
    let (index, _, initial) = declaration(start)?;
    if initial.as_int() != Some(-1) {
        return None;
    }
    let (hash_label, hashed) = unlabeled(hashed);
    let StmtKind::Switch {
        selector,
        cases: buckets,
    } = &hashed.kind
    else {
        return None;
    };
    if call_on(selector, "hashCode").and_then(local_id) != Some(string.id) {
        return None;
    }

    let mut strings: HashMap<i32, String> = HashMap::new();
    for bucket in buckets {
        let mut literals = Vec::new();
        visit::for_each_expr_in(&bucket.body, &mut |expr| {
            if let Some((literal, false)) = equals_literal(expr, string.id) {
                literals.push(literal.to_string());
            }
        });
        for literal in literals {
            let mut assigned = None;
            run_case(&bucket.body, string.id, index.id, hash_label, &literal, &mut assigned)?;
            if let Some(case) = assigned {
                strings.insert(case, literal);
            }
        }
    }

    let (dispatch_label, dispatch) = unlabeled(dispatch);
    let StmtKind::Switch { selector, cases } = &dispatch.kind else {
        return None;
    };
    if local_id(selector) != Some(index.id) {
        return None;
    }
    let mut relabeled = Vec::with_capacity(cases.len());
    for case in cases {
        let labels = case
            .labels
            .iter()
            .map(|label| match label {
                CaseLabel::Int(case) => strings.get(case).cloned().map(CaseLabel::String),
                other => Some(other.clone()),
            })
            .collect::<Option<Vec<_>>>()?;
        relabeled.push(SwitchCase {
            labels,
            body: case.body.clone(),
        });
    }
    let bodies: Vec<Statement> = relabeled.iter().flat_map(|case| case.body.clone()).collect();
    if [string.id, index.id]
        .iter()
        .any(|id| visit::stmts_reference(&bodies, *id) || visit::stmts_reference(rest, *id))
    {
        return None;
    }
    let switch = StmtKind::Switch {
        selector: value.clone(),
        cases: relabeled,
    };
    Some(with_label(dispatch_label, Statement::new(switch, copy.line)))
}

/// Body of a loop whose update is run by `continue`, with the loop's label.
///
/// A trailing block that `break`s to reach the update has those breaks turned into `continue`.
/// A `continue` already present would skip the update, so such loops are rejected.
fn continue_to_update(
    label: Option<Label>,
    mut body: Vec<Statement>,
) -> Option<(Vec<Statement>, Option<Label>)> {
    if visit::continues_loop(&body, label) {
        return None;
    }
    let block = match body.last() {
        Some(Statement {
            kind: StmtKind::Labeled { label, body: inner },
            ..
        }) if matches!(inner.kind, StmtKind::Block(_)) => *label,
        _ => return Some((body, label)),
    };
    let Some(Statement {
        kind: StmtKind::Labeled { body: inner, .. },
        ..
    }) = body.pop()
    else {
        return None;
    };
    let StmtKind::Block(mut inner) = inner.kind else {
        return None;
    };
    let target = label.unwrap_or(block);
    visit::replace_jumps(
        &mut inner,
        &|kind| matches!(kind, StmtKind::Break(Some(to)) if *to == block),
        &[Statement::new(StmtKind::Continue(Some(target)), 0)],
    );
    body.extend(inner);
    Some((body, Some(target)))
}

/// Variable written by a loop update such as `i++` or `i += 2`.
fn updated_var(expr: &Expression) -> Option<usize> {
    match &expr.kind {
        ExprKind::Unary {
            op: UnaryOp::PreInc | UnaryOp::PostInc | UnaryOp::PreDec | UnaryOp::PostDec,
            operand,
        } => local_id(operand),
        ExprKind::Assign { op, target, value } => {
            let id = local_id(target)?;
            (op.is_some() || value.references(id)).then_some(id)
        }
        _ => None,
    }
}

fn is_increment(expr: &Expression, id: usize) -> bool {
    match &expr.kind {
        ExprKind::Unary {
            op: UnaryOp::PreInc | UnaryOp::PostInc,
            operand,
        } => local_id(operand) == Some(id),
        ExprKind::Assign {
            op: Some(BinaryOp::Add),
            target,
            value,
        } => local_id(target) == Some(id) && value.as_int() == Some(1),
        _ => false,
    }
}

fn trailing_update(body: &[Statement]) -> Option<(&Expression, &[Statement])> {
    match body.split_last()? {
        (
            Statement {
                kind: StmtKind::Expression(update),
                ..
            },
            rest,
        ) => Some((update, rest)),
        _ => None,
    }
}

/// `T[] a = x; int n = a.length; int i = 0; while (i < n) { T v = a[i]; ...; i++; }`.
fn array_loop(window: &[Statement], rest: &[Statement]) -> Option<Statement> {
    let [copy, length, counter, looped] = window else {
        return None;
    };
    let (array, _, iterable) = declaration(copy)?;
    let (len, _, measured) = declaration(length)?;
    match &measured.kind {
        ExprKind::ArrayLength(inner) if local_id(inner) == Some(array.id) => {}
        _ => return None,
    }
    let (index, _, zero) = declaration(counter)?;
    if zero.as_int() != Some(0) {
        return None;
    }
    let (label, looped) = unlabeled(looped);
    let StmtKind::While { cond, body } = &looped.kind else {
        return None;
    };
    match &cond.kind {
        ExprKind::Binary {
            op: BinaryOp::Lt,
            left,
            right,
        } if local_id(left) == Some(index.id) && local_id(right) == Some(len.id) => {}
        _ => return None,
    }
    let (update, before) = trailing_update(body)?;
    if !is_increment(update, index.id) {
        return None;
    }
    let (inner, label) = continue_to_update(label, before.to_vec())?;
    let (first, middle) = inner.split_first()?;
    let (var, var_ty, element) = declaration(first)?;
    match &element.kind {
        ExprKind::ArrayAccess {
            array: accessed,
            index: at,
        } if local_id(accessed) == Some(array.id) && local_id(at) == Some(index.id) => {}
        _ => return None,
    }
    if [array.id, len.id, index.id]
        .iter()
        .any(|id| visit::stmts_reference(middle, *id) || visit::stmts_reference(rest, *id))
    {
        return None;
    }
    let each = StmtKind::ForEach {
        var: var.clone(),
        var_ty: var_ty.clone(),
        iterable: iterable.clone(),
        body: middle.to_vec(),
    };
    Some(with_label(label, Statement::new(each, copy.line)))
}

/// Whether `expr` reads `it.next()`, looking through casts and unboxing.
fn next_of(mut expr: &Expression, iterator: usize) -> bool {
    loop {
        if let Some(receiver) = call_on(expr, "next") {
            return local_id(receiver) == Some(iterator);
        }
        expr = match &expr.kind {
            ExprKind::Cast(inner) => inner,
            _ => match unboxed_receiver(expr) {
                Some(receiver) => receiver,
                None => return false,
            },
        };
    }
}

/// `Iterator it = x.iterator(); while (it.hasNext()) { T v = (T) it.next(); ... }`.
fn iterator_loop(window: &[Statement], rest: &[Statement]) -> Option<Statement> {
    let [start, looped] = window else {
        return None;
    };
    let (iterator, _, init) = declaration(start)?;
    let iterable = call_on(init, "iterator")?;
    let (label, looped) = unlabeled(looped);
    let StmtKind::While { cond, body } = &looped.kind else {
        return None;
    };
    if call_on(cond, "hasNext").and_then(local_id) != Some(iterator.id) {
        return None;
    }
    let (first, middle) = body.split_first()?;
    let (var, var_ty, element) = declaration(first)?;
    if !next_of(element, iterator.id)
        || visit::stmts_reference(middle, iterator.id)
        || visit::stmts_reference(rest, iterator.id)
    {
        return None;
    }
    let each = StmtKind::ForEach {
        var: var.clone(),
        var_ty: var_ty.clone(),
        iterable: iterable.clone(),
        body: middle.to_vec(),
    };
    Some(with_label(label, Statement::new(each, start.line)))
}

/// Variable initialized by a `for` init candidate.
fn initialized_var(stmt: &Statement) -> Option<usize> {
    match &stmt.kind {
        StmtKind::Declaration {
            var, init: Some(_), ..
        } => Some(var.id),
        StmtKind::Expression(Expression {
            kind: ExprKind::Assign {
                op: None, target, ..
            },
            ..
        }) => local_id(target),
        _ => None,
    }
}

/// `init; while (c) { ...; update; }` where all three touch the same variable.
fn counting_loop(window: &[Statement], rest: &[Statement]) -> Option<Statement> {
    let [init, looped] = window else {
        return None;
    };
    let (label, looped) = unlabeled(looped);
    let StmtKind::While { cond, body } = &looped.kind else {
        return None;
    };
    if matches!(cond.kind, ExprKind::Literal(Literal::Boolean(true))) {
        return None;
    }
    let (update, before) = trailing_update(body)?;
    let var = updated_var(update)?;
    if initialized_var(init) != Some(var) || !cond.references(var) {
        return None;
    }
    if matches!(init.kind, StmtKind::Declaration { .. }) && visit::stmts_reference(rest, var) {
        return None;
    }
    let (body, label) = continue_to_update(label, before.to_vec())?;
    let counted = StmtKind::For {
        init: vec![init.clone()],
        cond: Some(cond.clone()),
        update: vec![update.clone()],
        body,
    };
    Some(with_label(label, Statement::new(counted, looped.line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::render_statements;
    use crate::ir::{AccessFlags, RawClass, RawField};
    use crate::resolver::MapSource;
    use crate::structure::cleanup::tidy;
    use pretty_assertions::assert_eq;

    fn var(id: usize, name: &str, ty: Type) -> Expression {
        Expression::local(
            LocalRef {
                id,
                name: name.to_string(),
            },
            ty,
        )
    }

    fn int(id: usize, name: &str) -> Expression {
        var(id, name, Type::int())
    }

    fn declare(local: &Expression, init: Expression) -> Statement {
        let var = local.as_local().expect("local").clone();
        stmt(StmtKind::Declaration {
            var,
            ty: local.ty.clone(),
            init: Some(init),
        })
    }

    fn stmt(kind: StmtKind) -> Statement {
        Statement::new(kind, 0)
    }

    fn say(expr: Expression) -> Statement {
        Statement::expression(expr, 0)
    }

    fn call(receiver: &Expression, name: &str, args: Vec<Expression>, ty: Type) -> Expression {
        Expression::new(
            ExprKind::MethodCall {
                target: CallTarget::Instance(Box::new(receiver.clone())),
                owner: "java/lang/Object".to_string(),
                name: name.to_string(),
                descriptor: "()V".to_string(),
                args,
            },
            ty,
        )
    }

    fn increment(local: &Expression) -> Statement {
        say(Expression::unary(UnaryOp::PostInc, local.clone()))
    }

    fn less(left: &Expression, right: &Expression) -> Expression {
        Expression::binary(BinaryOp::Lt, left.clone(), right.clone(), Type::boolean())
    }

    fn rewritten(mut body: Vec<Statement>, resolver: &TypeResolver) -> String {
        apply(&mut body, resolver);
        tidy(&mut body);
        render_statements(&body)
    }

    #[test]
    fn counting_loops_become_for_statements() {
        let i = int(1, "i");
        let n = int(2, "n");
        let body = vec![
            declare(&i, Expression::int(0)),
            stmt(StmtKind::While {
                cond: less(&i, &n),
                body: vec![say(n.clone()), increment(&i)],
            }),
        ];

        assert_eq!(
            rewritten(body, &TypeResolver::empty()),
            "for (int i = 0; i < n; i++) {\n    n;\n}\n"
        );
    }

    #[test]
    fn breaks_to_the_update_become_continue() {
        let i = int(1, "i");
        let n = int(2, "n");
        let flag = var(3, "a", Type::boolean());
        let body = vec![
            declare(&i, Expression::int(0)),
            stmt(StmtKind::While {
                cond: less(&i, &n),
                body: vec![
                    stmt(StmtKind::Labeled {
                        label: Label(5),
                        body: Box::new(stmt(StmtKind::Block(vec![
                            stmt(StmtKind::If {
                                cond: flag,
                                then: vec![stmt(StmtKind::Break(Some(Label(5))))],
                                otherwise: Vec::new(),
                            }),
                            say(n.clone()),
                        ]))),
                    }),
                    increment(&i),
                ],
            }),
        ];

        assert_eq!(
            rewritten(body, &TypeResolver::empty()),
            "for (int i = 0; i < n; i++) {\n    if (a) {\n        continue;\n    }\n    n;\n}\n"
        );
    }

    #[test]
    fn loops_with_their_own_continue_stay_while_loops() {
        let i = int(1, "i");
        let n = int(2, "n");
        let flag = var(3, "a", Type::boolean());
        let body = vec![
            declare(&i, Expression::int(0)),
            stmt(StmtKind::While {
                cond: less(&i, &n),
                body: vec![
                    stmt(StmtKind::If {
                        cond: flag,
                        then: vec![stmt(StmtKind::Continue(None))],
                        otherwise: Vec::new(),
                    }),
                    increment(&i),
                ],
            }),
        ];

        assert_eq!(
            rewritten(body, &TypeResolver::empty()),
            "int i = 0;\nwhile (i < n) {\n    if (a) {\n        continue;\n    }\n    i++;\n}\n"
        );
    }

    #[test]
    fn array_walks_become_enhanced_for() {
        let names = var(1, "names", Type::array(Type::string()));
        let copy = var(2, "copy", Type::array(Type::string()));
        let len = int(3, "len");
        let i = int(4, "i");
        let name = var(5, "name", Type::string());
        let element = Expression::new(
            ExprKind::ArrayAccess {
                array: Box::new(copy.clone()),
                index: Box::new(i.clone()),
            },
            Type::string(),
        );
        let body = vec![
            declare(&copy, names),
            declare(
                &len,
                Expression::new(ExprKind::ArrayLength(Box::new(copy.clone())), Type::int()),
            ),
            declare(&i, Expression::int(0)),
            stmt(StmtKind::While {
                cond: less(&i, &len),
                body: vec![declare(&name, element), say(name.clone()), increment(&i)],
            }),
        ];

        assert_eq!(
            rewritten(body, &TypeResolver::empty()),
            "for (java.lang.String name : names) {\n    name;\n}\n"
        );
    }

    #[test]
    fn iterator_walks_become_enhanced_for() {
        let items = var(1, "items", Type::object("java/util/List"));
        let it = var(2, "it", Type::object("java/util/Iterator"));
        let item = var(3, "item", Type::string());
        let next = Expression::new(
            ExprKind::Cast(Box::new(call(&it, "next", Vec::new(), Type::object_root()))),
            Type::string(),
        );
        let body = vec![
            declare(&it, call(&items, "iterator", Vec::new(), it.ty.clone())),
            stmt(StmtKind::While {
                cond: call(&it, "hasNext", Vec::new(), Type::boolean()),
                body: vec![declare(&item, next), say(item.clone())],
            }),
        ];

        assert_eq!(
            rewritten(body, &TypeResolver::empty()),
            "for (java.lang.String item : items) {\n    item;\n}\n"
        );
    }

    #[test]
    fn hash_switches_over_strings_collapse() {
        let key = var(1, "key", Type::string());
        let s = var(2, "s", Type::string());
        let index = int(3, "index");
        let equals = |literal: &str| {
            call(&s, "equals", vec![Expression::string(literal)], Type::boolean())
        };
        let assign = |value: i32| say(Expression::assign(None, index.clone(), Expression::int(value)));
        let brk = || stmt(StmtKind::Break(None));
        let body = vec![
            declare(&s, key.clone()),
            declare(&index, Expression::int(-1)),
            stmt(StmtKind::Switch {
                selector: call(&s, "hashCode", Vec::new(), Type::int()),
                cases: vec![
                    SwitchCase {
                        labels: vec![CaseLabel::Int(97)],
                        body: vec![
                            stmt(StmtKind::If {
                                cond: equals("a"),
                                then: vec![assign(0)],
                                otherwise: Vec::new(),
                            }),
                            brk(),
                        ],
                    },
                    SwitchCase {
                        labels: vec![CaseLabel::Int(98)],
                        body: vec![
                            stmt(StmtKind::If {
                                cond: equals("b").negate(),
                                then: vec![brk()],
                                otherwise: Vec::new(),
                            }),
                            assign(1),
                        ],
                    },
                ],
            }),
            stmt(StmtKind::Switch {
                selector: index.clone(),
                cases: vec![
                    SwitchCase {
                        labels: vec![CaseLabel::Int(0)],
                        body: vec![say(key.clone()), brk()],
                    },
                    SwitchCase {
                        labels: vec![CaseLabel::Int(1)],
                        body: vec![say(s.clone().negate()), brk()],
                    },
                    SwitchCase {
                        labels: vec![CaseLabel::Default],
                        body: vec![say(key.clone())],
                    },
                ],
            }),
        ];
        let mut uses_temp = body.clone();
        apply(&mut uses_temp, &TypeResolver::empty());
        assert!(matches!(uses_temp[2].kind, StmtKind::Switch { .. }));

        let mut body = body;
        let StmtKind::Switch { cases, .. } = &mut body[3].kind else {
            panic!("dispatch switch");
        };
        cases[1].body = vec![say(key.clone()), brk()];

        assert_eq!(
            rewritten(body, &TypeResolver::empty()),
            "switch (key) {\n    case \"a\":\n        key;\n        break;\n    case \"b\":\n        key;\n        break;\n    default:\n        key;\n}\n"
        );
    }

    #[test]
    fn ordinal_switches_use_enum_constants() {
        let constant = |name: &str| RawField {
            name: name.to_string(),
            descriptor: "La/Color;".to_string(),
            access: AccessFlags(AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::ENUM),
            ..RawField::default()
        };
        let color = RawClass {
            name: "a/Color".to_string(),
            access: AccessFlags(AccessFlags::PUBLIC | AccessFlags::ENUM),
            fields: vec![constant("RED"), constant("GREEN")],
            ..RawClass::default()
        };
        let resolver = TypeResolver::new(MapSource::from_classes([&color]));
        let value = var(1, "color", Type::object("a/Color"));
        let body = vec![stmt(StmtKind::Switch {
            selector: call(&value, "ordinal", Vec::new(), Type::int()),
            cases: vec![
                SwitchCase {
                    labels: vec![CaseLabel::Int(1)],
                    body: vec![say(value.clone())],
                },
                SwitchCase {
                    labels: vec![CaseLabel::Int(0), CaseLabel::Default],
                    body: Vec::new(),
                },
            ],
        })];

        assert_eq!(
            rewritten(body, &resolver),
            "switch (color) {\n    case GREEN:\n        color;\n    case RED:\n    default:\n}\n"
        );
    }

    #[test]
    fn assertion_checks_become_assert_statements() {
        let disabled = Expression::new(
            ExprKind::Field {
                target: None,
                owner: "a/B".to_string(),
                name: "$assertionsDisabled".to_string(),
            },
            Type::boolean(),
        );
        let ok = var(1, "ok", Type::boolean());
        let error = Expression::new(
            ExprKind::NewObject {
                class: Type::object("java/lang/AssertionError"),
                descriptor: "(Ljava/lang/Object;)V".to_string(),
                args: vec![Expression::string("broken")],
            },
            Type::object("java/lang/AssertionError"),
        );
        let body = vec![stmt(StmtKind::If {
            cond: Expression::binary(
                BinaryOp::LogicalAnd,
                disabled.negate(),
                ok.negate(),
                Type::boolean(),
            ),
            then: vec![stmt(StmtKind::Throw(error))],
            otherwise: Vec::new(),
        })];

        assert_eq!(
            rewritten(body, &TypeResolver::empty()),
            "assert ok : \"broken\";\n"
        );
    }

    #[test]
    fn three_way_comparisons_become_compare_calls() {
        let left = var(1, "x", Type::long());
        let right = var(2, "y", Type::long());
        let body = vec![stmt(StmtKind::Return(Some(Expression::new(
            ExprKind::Compare3 {
                kind: CmpKind::Long,
                left: Box::new(left),
                right: Box::new(right),
            },
            Type::int(),
        ))))];

        assert_eq!(
            rewritten(body, &TypeResolver::empty()),
            "return java.lang.Long.compare(x, y);\n"
        );
    }
}
