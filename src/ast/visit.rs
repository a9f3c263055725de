//! Traversal helpers over expressions and statement lists.

use super::{CallTarget, ExprKind, Expression, Label, LambdaBody, Statement, StmtKind};

fn children<'a>(expr: &'a Expression, out: &mut Vec<&'a Expression>) {
    match &expr.kind {
        ExprKind::Field {
            target: Some(target),
            ..
        } => out.push(target),
        ExprKind::MethodCall { target, args, .. } => {
            if let CallTarget::Instance(receiver) = target {
                out.push(receiver);
            }
            out.extend(args.iter());
        }
        ExprKind::NewObject { args, .. } => out.extend(args.iter()),
        ExprKind::NewArray {
            dimensions, init, ..
        } => {
            out.extend(dimensions.iter());
            if let Some(init) = init {
                out.extend(init.iter());
            }
        }
        ExprKind::Cast(inner) | ExprKind::ArrayLength(inner) => out.push(inner),
        ExprKind::Binary { left, right, .. } | ExprKind::Compare3 { left, right, .. } => {
            out.push(left);
            out.push(right);
        }
        ExprKind::Unary { operand, .. } => out.push(operand),
        ExprKind::Assign { target, value, .. } => {
            out.push(target);
            out.push(value);
        }
        ExprKind::Ternary {
            cond,
            then,
            otherwise,
        } => {
            out.push(cond);
            out.push(then);
            out.push(otherwise);
        }
        ExprKind::InstanceOf { expr, .. } => out.push(expr),
        ExprKind::Lambda { body, .. } => match body {
            LambdaBody::Pending { captured, .. } => out.extend(captured.iter()),
            LambdaBody::Expression(inner) => out.push(inner),
            LambdaBody::Block(_) => {}
        },
        ExprKind::MethodReference {
            receiver: Some(receiver),
            ..
        } => out.push(receiver),
        ExprKind::ArrayAccess { array, index } => {
            out.push(array);
            out.push(index);
        }
        _ => {}
    }
}

/// Visits an expression and all of its subexpressions, parents first.
pub fn for_each_expr(expr: &Expression, f: &mut dyn FnMut(&Expression)) {
    f(expr);
    let mut nested = Vec::new();
    children(expr, &mut nested);
    for child in nested {
        for_each_expr(child, f);
    }
    if let ExprKind::Lambda {
        body: LambdaBody::Block(stmts),
        ..
    } = &expr.kind
    {
        for_each_expr_in(stmts, f);
    }
}

/// Rewrites an expression tree bottom-up.
pub fn map_expr(expr: &mut Expression, f: &mut dyn FnMut(&mut Expression)) {
    match &mut expr.kind {
        ExprKind::Field {
            target: Some(target),
            ..
        } => map_expr(target, f),
        ExprKind::MethodCall { target, args, .. } => {
            if let CallTarget::Instance(receiver) = target {
                map_expr(receiver, f);
            }
            args.iter_mut().for_each(|arg| map_expr(arg, f));
        }
        ExprKind::NewObject { args, .. } => args.iter_mut().for_each(|arg| map_expr(arg, f)),
        ExprKind::NewArray {
            dimensions, init, ..
        } => {
            dimensions.iter_mut().for_each(|dim| map_expr(dim, f));
            if let Some(init) = init {
                init.iter_mut().for_each(|value| map_expr(value, f));
            }
        }
        ExprKind::Cast(inner) | ExprKind::ArrayLength(inner) => map_expr(inner, f),
        ExprKind::Binary { left, right, .. } | ExprKind::Compare3 { left, right, .. } => {
            map_expr(left, f);
            map_expr(right, f);
        }
        ExprKind::Unary { operand, .. } => map_expr(operand, f),
        ExprKind::Assign { target, value, .. } => {
            map_expr(target, f);
            map_expr(value, f);
        }
        ExprKind::Ternary {
            cond,
            then,
            otherwise,
        } => {
            map_expr(cond, f);
            map_expr(then, f);
            map_expr(otherwise, f);
        }
        ExprKind::InstanceOf { expr, .. } => map_expr(expr, f),
        ExprKind::Lambda { body, .. } => match body {
            LambdaBody::Pending { captured, .. } => {
                captured.iter_mut().for_each(|value| map_expr(value, f))
            }
            LambdaBody::Expression(inner) => map_expr(inner, f),
            LambdaBody::Block(stmts) => map_exprs_in(stmts, f),
        },
        ExprKind::MethodReference {
            receiver: Some(receiver),
            ..
        } => map_expr(receiver, f),
        ExprKind::ArrayAccess { array, index } => {
            map_expr(array, f);
            map_expr(index, f);
        }
        _ => {}
    }
    f(expr);
}

/// Expressions held directly by a statement, outside its nested statement lists.
pub(crate) fn own_exprs(stmt: &Statement) -> Vec<&Expression> {
    match &stmt.kind {
        StmtKind::If { cond, .. }
        | StmtKind::While { cond, .. }
        | StmtKind::DoWhile { cond, .. } => vec![cond],
        StmtKind::For { cond, update, .. } => cond.iter().chain(update.iter()).collect(),
        StmtKind::ForEach { iterable, .. } => vec![iterable],
        StmtKind::Switch { selector, .. } => vec![selector],
        StmtKind::Synchronized { lock, .. } => vec![lock],
        StmtKind::Return(value) => value.iter().collect(),
        StmtKind::Throw(expr)
        | StmtKind::Expression(expr)
        | StmtKind::MonitorEnter(expr)
        | StmtKind::MonitorExit(expr) => vec![expr],
        StmtKind::Declaration { init, .. } => init.iter().collect(),
        StmtKind::Assert { cond, message } => std::iter::once(cond).chain(message.iter()).collect(),
        _ => Vec::new(),
    }
}

fn own_exprs_mut(stmt: &mut Statement) -> Vec<&mut Expression> {
    match &mut stmt.kind {
        StmtKind::If { cond, .. }
        | StmtKind::While { cond, .. }
        | StmtKind::DoWhile { cond, .. } => vec![cond],
        StmtKind::For { cond, update, .. } => cond.iter_mut().chain(update.iter_mut()).collect(),
        StmtKind::ForEach { iterable, .. } => vec![iterable],
        StmtKind::Switch { selector, .. } => vec![selector],
        StmtKind::Synchronized { lock, .. } => vec![lock],
        StmtKind::Return(value) => value.iter_mut().collect(),
        StmtKind::Throw(expr)
        | StmtKind::Expression(expr)
        | StmtKind::MonitorEnter(expr)
        | StmtKind::MonitorExit(expr) => vec![expr],
        StmtKind::Declaration { init, .. } => init.iter_mut().collect(),
        StmtKind::Assert { cond, message } => {
            std::iter::once(cond).chain(message.iter_mut()).collect()
        }
        _ => Vec::new(),
    }
}

/// Statement lists directly nested in a statement.
pub fn child_lists(stmt: &Statement) -> Vec<&Vec<Statement>> {
    match &stmt.kind {
        StmtKind::Block(body)
        | StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. }
        | StmtKind::ForEach { body, .. }
        | StmtKind::Synchronized { body, .. } => vec![body],
        StmtKind::For { init, body, .. } => vec![init, body],
        StmtKind::If {
            then, otherwise, ..
        } => vec![then, otherwise],
        StmtKind::Switch { cases, .. } => cases.iter().map(|case| &case.body).collect(),
        StmtKind::Try {
            body,
            catches,
            finally,
        } => std::iter::once(body)
            .chain(catches.iter().map(|clause| &clause.body))
            .chain(finally.iter())
            .collect(),
        StmtKind::Labeled { body, .. } => child_lists(body),
        _ => Vec::new(),
    }
}

pub fn child_lists_mut(stmt: &mut Statement) -> Vec<&mut Vec<Statement>> {
    match &mut stmt.kind {
        StmtKind::Block(body)
        | StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. }
        | StmtKind::ForEach { body, .. }
        | StmtKind::Synchronized { body, .. } => vec![body],
        StmtKind::For { init, body, .. } => vec![init, body],
        StmtKind::If {
            then, otherwise, ..
        } => vec![then, otherwise],
        StmtKind::Switch { cases, .. } => cases.iter_mut().map(|case| &mut case.body).collect(),
        StmtKind::Try {
            body,
            catches,
            finally,
        } => std::iter::once(body)
            .chain(catches.iter_mut().map(|clause| &mut clause.body))
            .chain(finally.iter_mut())
            .collect(),
        StmtKind::Labeled { body, .. } => child_lists_mut(body),
        _ => Vec::new(),
    }
}

/// Visits every expression in a statement tree.
pub fn for_each_expr_in(stmts: &[Statement], f: &mut dyn FnMut(&Expression)) {
    for stmt in stmts {
        for expr in own_exprs(stmt) {
            for_each_expr(expr, f);
        }
        for list in child_lists(stmt) {
            for_each_expr_in(list, f);
        }
    }
}

/// Rewrites every expression in a statement tree bottom-up.
pub fn map_exprs_in(stmts: &mut [Statement], f: &mut dyn FnMut(&mut Expression)) {
    for stmt in stmts {
        for expr in own_exprs_mut(stmt) {
            map_expr(expr, f);
        }
        for list in child_lists_mut(stmt) {
            map_exprs_in(list, f);
        }
    }
}

/// Applies `f` to every statement list, innermost lists first.
pub fn map_lists(stmts: &mut Vec<Statement>, f: &mut dyn FnMut(&mut Vec<Statement>)) {
    for stmt in stmts.iter_mut() {
        for list in child_lists_mut(stmt) {
            map_lists(list, f);
        }
    }
    f(stmts);
}

/// Applies `f` to every statement, parents first.
pub fn for_each_stmt(stmts: &[Statement], f: &mut dyn FnMut(&Statement)) {
    for stmt in stmts {
        f(stmt);
        for list in child_lists(stmt) {
            for_each_stmt(list, f);
        }
    }
}

pub fn stmts_reference(stmts: &[Statement], id: usize) -> bool {
    let mut found = false;
    for_each_expr_in(stmts, &mut |expr| {
        if let ExprKind::Local(var) = &expr.kind
            && var.id == id
        {
            found = true;
        }
    });
    found || declares(stmts, id)
}

fn declares(stmts: &[Statement], id: usize) -> bool {
    let mut found = false;
    for_each_stmt(stmts, &mut |stmt| match &stmt.kind {
        StmtKind::Declaration { var, .. } | StmtKind::ForEach { var, .. } if var.id == id => {
            found = true
        }
        StmtKind::Try { catches, .. } if catches.iter().any(|clause| clause.var.id == id) => {
            found = true
        }
        _ => {}
    });
    found
}

pub fn contains_break_to(stmts: &[Statement], label: Label) -> bool {
    let mut found = false;
    for_each_stmt(stmts, &mut |stmt| {
        if let StmtKind::Break(Some(target)) = stmt.kind
            && target == label
        {
            found = true;
        }
    });
    found
}

pub fn references_label(stmts: &[Statement], label: Label) -> bool {
    let mut found = false;
    for_each_stmt(stmts, &mut |stmt| {
        if let StmtKind::Break(Some(target)) | StmtKind::Continue(Some(target)) = stmt.kind
            && target == label
        {
            found = true;
        }
    });
    found
}

fn is_breakable(stmt: &Statement) -> bool {
    match &stmt.kind {
        StmtKind::While { .. }
        | StmtKind::DoWhile { .. }
        | StmtKind::For { .. }
        | StmtKind::ForEach { .. }
        | StmtKind::Switch { .. } => true,
        StmtKind::Labeled { body, .. } => is_breakable(body),
        _ => false,
    }
}

pub(crate) fn is_loop(stmt: &Statement) -> bool {
    match &stmt.kind {
        StmtKind::While { .. }
        | StmtKind::DoWhile { .. }
        | StmtKind::For { .. }
        | StmtKind::ForEach { .. } => true,
        StmtKind::Labeled { body, .. } => is_loop(body),
        _ => false,
    }
}

/// Whether the body of a loop labeled `label` contains a break leaving that loop.
pub fn breaks_out_of(body: &[Statement], label: Option<Label>) -> bool {
    fn walk(stmts: &[Statement], label: Option<Label>, nested: bool) -> bool {
        stmts.iter().any(|stmt| match stmt.kind {
            StmtKind::Break(None) => !nested,
            StmtKind::Break(Some(target)) => Some(target) == label,
            _ => {
                let nested = nested || is_breakable(stmt);
                child_lists(stmt)
                    .into_iter()
                    .any(|list| walk(list, label, nested))
            }
        })
    }
    walk(body, label, false)
}

/// Whether a loop body contains a `continue` that targets the loop itself.
pub fn continues_loop(body: &[Statement], label: Option<Label>) -> bool {
    fn walk(stmts: &[Statement], label: Option<Label>, nested: bool) -> bool {
        stmts.iter().any(|stmt| match stmt.kind {
            StmtKind::Continue(None) => !nested,
            StmtKind::Continue(Some(target)) => Some(target) == label,
            _ => {
                let nested = nested || is_loop(stmt);
                child_lists(stmt)
                    .into_iter()
                    .any(|list| walk(list, label, nested))
            }
        })
    }
    walk(body, label, false)
}

/// Replaces statements matching `is_target` with clones of `replacement`.
pub fn replace_jumps(
    stmts: &mut Vec<Statement>,
    is_target: &dyn Fn(&StmtKind) -> bool,
    replacement: &[Statement],
) {
    let mut index = 0;
    while index < stmts.len() {
        if is_target(&stmts[index].kind) {
            let line = stmts[index].line;
            let copies: Vec<Statement> = replacement
                .iter()
                .cloned()
                .map(|mut stmt| {
                    if stmt.line == 0 {
                        stmt.line = line;
                    }
                    stmt
                })
                .collect();
            let count = copies.len();
            stmts.splice(index..index + 1, copies);
            index += count;
            continue;
        }
        for list in child_lists_mut(&mut stmts[index]) {
            replace_jumps(list, is_target, replacement);
        }
        index += 1;
    }
}

/// Copy of `stmts` with lines zeroed and local ids dropped, for structural comparison.
pub fn normalized(stmts: &[Statement]) -> Vec<Statement> {
    let mut copy = stmts.to_vec();
    map_lists(&mut copy, &mut |list| {
        for stmt in list.iter_mut() {
            stmt.line = 0;
            if let StmtKind::Declaration { var, .. } = &mut stmt.kind {
                var.id = 0;
            }
        }
    });
    map_exprs_in(&mut copy, &mut |expr| {
        if let ExprKind::Local(var) = &mut expr.kind {
            var.id = 0;
        }
    });
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::LocalRef;
    use crate::types::Type;

    fn local(id: usize) -> Expression {
        Expression::local(
            LocalRef {
                id,
                name: format!("v{id}"),
            },
            Type::int(),
        )
    }

    #[test]
    fn map_exprs_rewrites_nested_statement_lists() {
        let mut stmts = vec![Statement::new(
            StmtKind::If {
                cond: local(1),
                then: vec![Statement::new(StmtKind::Return(Some(local(1))), 3)],
                otherwise: Vec::new(),
            },
            2,
        )];

        map_exprs_in(&mut stmts, &mut |expr| {
            if expr.as_local().is_some_and(|var| var.id == 1) {
                *expr = local(7);
            }
        });

        assert!(stmts_reference(&stmts, 7));
        assert!(!stmts_reference(&stmts, 1));
    }

    #[test]
    fn breaks_inside_nested_loops_do_not_leave_outer_loop() {
        let inner = Statement::new(
            StmtKind::While {
                cond: local(1),
                body: vec![Statement::new(StmtKind::Break(None), 0)],
            },
            0,
        );

        assert!(!breaks_out_of(std::slice::from_ref(&inner), None));
        assert!(breaks_out_of(&[Statement::new(StmtKind::Break(None), 0)], None));
        assert!(breaks_out_of(
            &[inner, Statement::new(StmtKind::Break(Some(Label(4))), 0)],
            Some(Label(4))
        ));
    }

    #[test]
    fn normalized_ignores_lines_and_ids() {
        let first = vec![Statement::new(StmtKind::Return(Some(local(1))), 10)];
        let mut second = vec![Statement::new(StmtKind::Return(Some(local(2))), 20)];
        if let StmtKind::Return(Some(expr)) = &mut second[0].kind {
            expr.kind = ExprKind::Local(LocalRef {
                id: 2,
                name: "v1".to_string(),
            });
        }

        assert_eq!(normalized(&first), normalized(&second));
    }
}
