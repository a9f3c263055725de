//! Rewrites that remove the labels and jumps emission leaves behind.

use std::collections::HashMap;

use crate::ast::{
    can_complete_normally, visit, ExprKind, Expression, Label, Literal, Statement, StmtKind,
};

use super::emit::strip_tail;

const MAX_ROUNDS: usize = 64;

/// Runs every rewrite until none applies.
pub(crate) fn tidy(body: &mut Vec<Statement>) {
    for _ in 0..MAX_ROUNDS {
        let mut changed = strip_jumps(body);
        changed |= retarget_breaks(body);
        changed |= thread_tails(body);
        changed |= unlabel(body, None, None);
        changed |= drop_labels(body);
        changed |= drop_unreachable(body);
        changed |= lift_outer_continues(body);
        changed |= rewrite_loops(body);
        changed |= normalize_ifs(body);
        changed |= merge_tries(body);
        changed |= synchronize(body);
        if !changed {
            return;
        }
    }
}

/// Numbers the remaining labels 1, 2, ... in order of appearance.
pub(crate) fn renumber_labels(body: &mut Vec<Statement>) {
    let mut order: HashMap<Label, Label> = HashMap::new();
    visit::for_each_stmt(body, &mut |stmt| {
        if let StmtKind::Labeled { label, .. } = stmt.kind {
            let next = Label(order.len() as u32 + 1);
            order.entry(label).or_insert(next);
        }
    });
    visit::map_lists(body, &mut |list| {
        for stmt in list.iter_mut() {
            match &mut stmt.kind {
                StmtKind::Labeled { label, .. }
                | StmtKind::Break(Some(label))
                | StmtKind::Continue(Some(label)) => {
                    if let Some(renamed) = order.get(label) {
                        *label = *renamed;
                    }
                }
                _ => {}
            }
        }
    });
}

fn is_true(expr: &Expression) -> bool {
    matches!(expr.kind, ExprKind::Literal(Literal::Boolean(true)))
}

fn loop_body_mut(stmt: &mut Statement) -> Option<&mut Vec<Statement>> {
    match &mut stmt.kind {
        StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. }
        | StmtKind::For { body, .. }
        | StmtKind::ForEach { body, .. } => Some(body),
        _ => None,
    }
}

/// Drops jumps that land exactly where control would go anyway.
fn strip_jumps(body: &mut Vec<Statement>) -> bool {
    let mut changed = false;
    visit::map_lists(body, &mut |list| {
        for stmt in list.iter_mut() {
            if let StmtKind::Labeled { label, body } = &mut stmt.kind {
                changed |= strip_own_jumps(Some(*label), body);
            } else {
                changed |= strip_own_jumps(None, stmt);
            }
        }
    });
    changed
}

/// Strips the tail jumps of `stmt` that only leave `stmt` itself.
fn strip_own_jumps(label: Option<Label>, stmt: &mut Statement) -> bool {
    if let Some(looped) = loop_body_mut(stmt) {
        return strip_tail(looped, &|kind| match kind {
            StmtKind::Continue(None) => true,
            StmtKind::Continue(Some(to)) => Some(*to) == label,
            _ => false,
        });
    }
    match &mut stmt.kind {
        StmtKind::Block(inner) => match label {
            Some(label) => strip_tail(inner, &|kind| {
                matches!(kind, StmtKind::Break(Some(to)) if *to == label)
            }),
            None => false,
        },
        StmtKind::Switch { cases, .. } => match cases.last_mut() {
            Some(case) => strip_tail(&mut case.body, &|kind| match kind {
                StmtKind::Break(None) => true,
                StmtKind::Break(Some(to)) => Some(*to) == label,
                _ => false,
            }),
            None => false,
        },
        _ => false,
    }
}

/// Statements after one that cannot complete normally are unreachable.
fn drop_unreachable(body: &mut Vec<Statement>) -> bool {
    let mut changed = false;
    visit::map_lists(body, &mut |list| {
        if let Some(end) = list
            .iter()
            .position(|stmt| !can_complete_normally(std::slice::from_ref(stmt)))
            && end + 1 < list.len()
        {
            list.truncate(end + 1);
            changed = true;
        }
    });
    changed
}

/// `L: { ...; M: loop }`: breaks of `L` inside the loop become breaks of `M`, or plain breaks
/// when the loop carries no label.
fn retarget_breaks(body: &mut Vec<Statement>) -> bool {
    let mut changed = false;
    visit::map_lists(body, &mut |list| {
        for stmt in list.iter_mut() {
            let StmtKind::Labeled { label, body } = &mut stmt.kind else {
                continue;
            };
            let outer = *label;
            let StmtKind::Block(inner) = &mut body.kind else {
                continue;
            };
            let Some(last) = inner.last_mut() else {
                continue;
            };
            if is_breakable(last) && !matches!(last.kind, StmtKind::Labeled { .. }) {
                for list in visit::child_lists_mut(last) {
                    changed |= plain_breaks(list, outer);
                }
                continue;
            }
            let StmtKind::Labeled { label, body } = &mut last.kind else {
                continue;
            };
            let target = *label;
            if !matches!(
                body.kind,
                StmtKind::Block(_)
                    | StmtKind::Switch { .. }
                    | StmtKind::While { .. }
                    | StmtKind::DoWhile { .. }
                    | StmtKind::For { .. }
                    | StmtKind::ForEach { .. }
            ) {
                continue;
            }
            for list in visit::child_lists_mut(last) {
                if visit::contains_break_to(list, outer) {
                    visit::replace_jumps(
                        list,
                        &|kind| matches!(kind, StmtKind::Break(Some(to)) if *to == outer),
                        &[Statement::new(StmtKind::Break(Some(target)), 0)],
                    );
                    changed = true;
                }
            }
        }
    });
    changed
}

fn is_breakable(stmt: &Statement) -> bool {
    match &stmt.kind {
        StmtKind::Switch { .. } => true,
        StmtKind::Labeled { body, .. } => is_breakable(body),
        _ => visit::is_loop(stmt),
    }
}

/// Breaks of `label` outside any nested loop or switch become plain breaks.
fn plain_breaks(stmts: &mut [Statement], label: Label) -> bool {
    let mut changed = false;
    for stmt in stmts {
        if matches!(stmt.kind, StmtKind::Break(Some(to)) if to == label) {
            stmt.kind = StmtKind::Break(None);
            changed = true;
        } else if !is_breakable(stmt) {
            for list in visit::child_lists_mut(stmt) {
                changed |= plain_breaks(list, label);
            }
        }
    }
    changed
}

/// Jump that can be copied to the places that break to the block it follows.
fn is_trivial_tail(stmt: &Statement) -> bool {
    let simple = |expr: &Expression| expr.is_literal() || expr.as_local().is_some();
    match &stmt.kind {
        StmtKind::Return(None) | StmtKind::Break(Some(_)) | StmtKind::Continue(Some(_)) => true,
        StmtKind::Return(Some(value)) => simple(value),
        StmtKind::Throw(value) => value.as_local().is_some(),
        _ => false,
    }
}

/// `L: { ... break L; ... } return x;` copies `return x;` over `break L`.
fn thread_tails(body: &mut Vec<Statement>) -> bool {
    let mut changed = false;
    visit::map_lists(body, &mut |list| {
        for index in 1..list.len() {
            if !is_trivial_tail(&list[index]) {
                continue;
            }
            let tail = list[index].clone();
            let StmtKind::Labeled { label, body } = &mut list[index - 1].kind else {
                continue;
            };
            let label = *label;
            let StmtKind::Block(inner) = &mut body.kind else {
                continue;
            };
            if visit::contains_break_to(inner, label) {
                visit::replace_jumps(
                    inner,
                    &|kind| matches!(kind, StmtKind::Break(Some(to)) if *to == label),
                    std::slice::from_ref(&tail),
                );
                changed = true;
            }
        }
    });
    changed
}

/// Drops labels from jumps that target the innermost enclosing loop or switch.
///
/// `breakable` and `looping` hold the innermost breakable statement and loop: `Some(None)` when
/// it carries no label.
fn unlabel(
    stmts: &mut [Statement],
    breakable: Option<Option<Label>>,
    looping: Option<Option<Label>>,
) -> bool {
    let mut changed = false;
    for stmt in stmts {
        match &mut stmt.kind {
            StmtKind::Break(target @ Some(_)) if breakable == Some(*target) => {
                *target = None;
                changed = true;
            }
            StmtKind::Continue(target @ Some(_)) if looping == Some(*target) => {
                *target = None;
                changed = true;
            }
            StmtKind::Labeled { label, body } => {
                let label = Some(*label);
                changed |= scoped(body, label, breakable, looping);
            }
            StmtKind::Break(_) | StmtKind::Continue(_) => {}
            _ => changed |= scoped(stmt, None, breakable, looping),
        }
    }
    changed
}

fn scoped(
    stmt: &mut Statement,
    label: Option<Label>,
    breakable: Option<Option<Label>>,
    looping: Option<Option<Label>>,
) -> bool {
    let (breakable, looping) = if visit::is_loop(stmt) {
        (Some(label), Some(label))
    } else if matches!(stmt.kind, StmtKind::Switch { .. }) {
        (Some(label), looping)
    } else {
        (breakable, looping)
    };
    let mut changed = false;
    for list in visit::child_lists_mut(stmt) {
        changed |= unlabel(list, breakable, looping);
    }
    changed
}

/// Removes labels nothing jumps to and splices plain blocks into their parent.
fn drop_labels(body: &mut Vec<Statement>) -> bool {
    let mut changed = false;
    visit::map_lists(body, &mut |list| {
        let mut index = 0;
        while index < list.len() {
            let unused = matches!(
                &list[index].kind,
                StmtKind::Labeled { label, body }
                    if !visit::references_label(std::slice::from_ref(&**body), *label)
            );
            if unused {
                let stmt = std::mem::replace(&mut list[index], Statement::new(StmtKind::Block(Vec::new()), 0));
                if let StmtKind::Labeled { body, .. } = stmt.kind {
                    let line = if body.line != 0 { body.line } else { stmt.line };
                    list[index] = Statement::new(body.kind, line);
                }
                changed = true;
            }
            if let StmtKind::Block(inner) = &mut list[index].kind {
                let inner = std::mem::take(inner);
                let count = inner.len();
                list.splice(index..=index, inner);
                index += count;
                changed = true;
                continue;
            }
            index += 1;
        }
    });
    changed
}

/// Condition of `if (c) break;` leaving the loop labeled `label`.
fn exit_condition(stmt: &Statement, label: Option<Label>) -> Option<&Expression> {
    let StmtKind::If {
        cond,
        then,
        otherwise,
    } = &stmt.kind
    else {
        return None;
    };
    match then.as_slice() {
        [Statement {
            kind: StmtKind::Break(target),
            ..
        }] if otherwise.is_empty() && (target.is_none() || *target == label) => Some(cond),
        _ => None,
    }
}

fn rewrite_loops(body: &mut Vec<Statement>) -> bool {
    let mut changed = false;
    visit::map_lists(body, &mut |list| {
        for stmt in list.iter_mut() {
            if let StmtKind::Labeled { label, body } = &mut stmt.kind {
                changed |= rewrite_loop(Some(*label), body);
            } else {
                changed |= rewrite_loop(None, stmt);
            }
        }
    });
    changed
}

/// `while (true)` whose first or last statement is its only exit test.
fn rewrite_loop(label: Option<Label>, stmt: &mut Statement) -> bool {
    let StmtKind::While { cond, body } = &mut stmt.kind else {
        return false;
    };
    if !is_true(cond) {
        return false;
    }
    if let Some(exit) = body.first().and_then(|first| exit_condition(first, label)) {
        let cond = exit.clone().negate();
        let mut body = std::mem::take(body);
        body.remove(0);
        stmt.kind = StmtKind::While { cond, body };
        return true;
    }
    if body.len() > 1
        && let Some(exit) = body.last().and_then(|last| exit_condition(last, label))
        && !visit::continues_loop(&body[..body.len() - 1], label)
    {
        let cond = exit.clone().negate();
        let mut body = std::mem::take(body);
        body.pop();
        stmt.kind = StmtKind::DoWhile { body, cond };
        return true;
    }
    false
}

/// `L: loop { ...; while (true) { if (c) continue L; ... } }`: leaving the inner loop continues
/// `L`, so its head test becomes its exit and its own exits become `continue L`.
fn lift_outer_continues(body: &mut Vec<Statement>) -> bool {
    let mut changed = false;
    visit::map_lists(body, &mut |list| {
        for stmt in list.iter_mut() {
            let StmtKind::Labeled { label, body } = &mut stmt.kind else {
                continue;
            };
            let outer = *label;
            let Some(last) = loop_body_mut(body).and_then(|looped| looped.last_mut()) else {
                continue;
            };
            changed |= lift_continue(last, outer);
        }
    });
    changed
}

fn lift_continue(stmt: &mut Statement, outer: Label) -> bool {
    if let StmtKind::Labeled { label, body } = &mut stmt.kind {
        return lift_loop(body, Some(*label), outer);
    }
    lift_loop(stmt, None, outer)
}

fn lift_loop(looped: &mut Statement, own: Option<Label>, outer: Label) -> bool {
    let StmtKind::While { cond, body } = &mut looped.kind else {
        return false;
    };
    if !is_true(cond) {
        return false;
    }
    let Some(StmtKind::If {
        then, otherwise, ..
    }) = body.first_mut().map(|first| &mut first.kind)
    else {
        return false;
    };
    let leaves = matches!(
        then.as_slice(),
        [Statement { kind: StmtKind::Continue(Some(to)), .. }] if *to == outer
    );
    if !leaves || !otherwise.is_empty() {
        return false;
    }
    let line = then[0].line;
    then[0] = Statement::new(StmtKind::Break(None), line);
    exits_to_continue(&mut body[1..], own, outer, false);
    true
}

/// Turns the exits of the loop labeled `own` into `continue outer`.
fn exits_to_continue(stmts: &mut [Statement], own: Option<Label>, outer: Label, nested: bool) {
    for stmt in stmts {
        let exits = match stmt.kind {
            StmtKind::Break(None) => !nested,
            StmtKind::Break(Some(to)) => Some(to) == own,
            _ => false,
        };
        if exits {
            stmt.kind = StmtKind::Continue(Some(outer));
            continue;
        }
        let nested = nested || is_breakable(stmt);
        for list in visit::child_lists_mut(stmt) {
            exits_to_continue(list, own, outer, nested);
        }
    }
}

fn is_single_jump(stmts: &[Statement]) -> bool {
    matches!(stmts, [only] if only.is_abrupt())
}

/// Puts the non-empty arm first and lifts `else` out from behind a jump.
fn normalize_ifs(body: &mut Vec<Statement>) -> bool {
    let mut changed = false;
    visit::map_lists(body, &mut |list| {
        let mut index = 0;
        while index < list.len() {
            let line = list[index].line;
            let last = index + 1 == list.len();
            let StmtKind::If {
                cond,
                then,
                otherwise,
            } = &mut list[index].kind
            else {
                index += 1;
                continue;
            };
            if then.is_empty() && otherwise.is_empty() {
                if cond.has_side_effects() {
                    let cond = cond.clone();
                    list[index] = Statement::expression(cond, line);
                    index += 1;
                } else {
                    list.remove(index);
                }
                changed = true;
                continue;
            }
            if then.is_empty() {
                *cond = cond.clone().negate();
                std::mem::swap(then, otherwise);
                changed = true;
            }
            if last && !otherwise.is_empty() {
                let rest = if is_single_jump(then) {
                    std::mem::take(otherwise)
                } else if is_single_jump(otherwise) && can_complete_normally(then) {
                    *cond = cond.clone().negate();
                    std::mem::swap(then, otherwise);
                    std::mem::take(otherwise)
                } else {
                    Vec::new()
                };
                if !rest.is_empty() {
                    list.extend(rest);
                    changed = true;
                }
            }
            index += 1;
        }
    });
    changed
}

/// `try { try { A } catch ... } finally { F }` becomes one statement.
fn merge_tries(body: &mut Vec<Statement>) -> bool {
    let mut changed = false;
    visit::map_lists(body, &mut |list| {
        for stmt in list.iter_mut() {
            let StmtKind::Try {
                body,
                catches,
                finally: Some(_),
            } = &mut stmt.kind
            else {
                continue;
            };
            if !catches.is_empty() {
                continue;
            }
            let [
                Statement {
                    kind:
                        StmtKind::Try {
                            body: inner,
                            catches: inner_catches,
                            finally: None,
                        },
                    ..
                },
            ] = body.as_mut_slice()
            else {
                continue;
            };
            *catches = std::mem::take(inner_catches);
            *body = std::mem::take(inner);
            changed = true;
        }
    });
    changed
}

/// Lock expression and monitor variable of a `monitorenter`, in either spelling.
fn monitor_lock(list: &[Statement], index: usize) -> Option<(Expression, usize, usize)> {
    match &list.get(index)?.kind {
        StmtKind::MonitorEnter(Expression {
            kind: ExprKind::Assign {
                op: None,
                target,
                value,
            },
            ..
        }) => Some(((**value).clone(), target.as_local()?.id, 1)),
        StmtKind::Expression(Expression {
            kind: ExprKind::Assign {
                op: None,
                target,
                value,
            },
            ..
        }) => {
            let var = target.as_local()?;
            match &list.get(index + 1)?.kind {
                StmtKind::MonitorEnter(lock) if lock.as_local() == Some(var) => {
                    Some(((**value).clone(), var.id, 2))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// `monitorenter(t = lock); try { body } finally { monitorexit(t); }` becomes `synchronized`.
fn synchronize(body: &mut Vec<Statement>) -> bool {
    let mut changed = false;
    visit::map_lists(body, &mut |list| {
        let mut index = 0;
        while index < list.len() {
            let Some((lock, var, width)) = monitor_lock(list, index) else {
                index += 1;
                continue;
            };
            let Some(Statement {
                kind:
                    StmtKind::Try {
                        catches, finally, ..
                    },
                ..
            }) = list.get(index + width)
            else {
                index += 1;
                continue;
            };
            let releases = matches!(
                finally.as_deref(),
                Some([Statement { kind: StmtKind::MonitorExit(exit), .. }])
                    if exit.as_local().is_some_and(|local| local.id == var)
            );
            if !catches.is_empty() || !releases {
                index += 1;
                continue;
            }
            let line = list[index].line;
            let StmtKind::Try { body, .. } = std::mem::replace(
                &mut list[index + width].kind,
                StmtKind::Block(Vec::new()),
            ) else {
                index += 1;
                continue;
            };
            let synchronized = Statement::new(StmtKind::Synchronized { lock, body }, line);
            list.splice(index..index + width + 1, [synchronized]);
            changed = true;
            index += 1;
        }
    });
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{render_statements, LocalRef};
    use crate::types::Type;
    use pretty_assertions::assert_eq;

    fn var(name: &str) -> Expression {
        Expression::local(
            LocalRef {
                id: name.len(),
                name: name.to_string(),
            },
            Type::boolean(),
        )
    }

    fn say(name: &str) -> Statement {
        Statement::expression(var(name), 0)
    }

    fn stmt(kind: StmtKind) -> Statement {
        Statement::new(kind, 0)
    }

    fn labeled(label: u32, body: StmtKind) -> Statement {
        stmt(StmtKind::Labeled {
            label: Label(label),
            body: Box::new(stmt(body)),
        })
    }

    fn tidied(mut body: Vec<Statement>) -> String {
        tidy(&mut body);
        renumber_labels(&mut body);
        render_statements(&body)
    }

    #[test]
    fn merge_blocks_around_diamonds_disappear() {
        let body = vec![
            labeled(
                9,
                StmtKind::Block(vec![
                    say("x"),
                    stmt(StmtKind::If {
                        cond: var("a"),
                        then: vec![say("y"), stmt(StmtKind::Break(Some(Label(9))))],
                        otherwise: vec![say("z"), stmt(StmtKind::Break(Some(Label(9))))],
                    }),
                ]),
            ),
            stmt(StmtKind::Return(None)),
        ];

        assert_eq!(
            tidied(body),
            "x;\nif (a) {\n    y;\n} else {\n    z;\n}\nreturn;\n"
        );
    }

    #[test]
    fn infinite_loops_with_a_leading_exit_become_while_loops() {
        let body = vec![
            say("x"),
            labeled(
                9,
                StmtKind::Block(vec![labeled(
                    4,
                    StmtKind::While {
                        cond: Expression::boolean(true),
                        body: vec![stmt(StmtKind::If {
                            cond: var("a").negate(),
                            then: vec![say("y"), stmt(StmtKind::Continue(Some(Label(4))))],
                            otherwise: vec![stmt(StmtKind::Break(Some(Label(9))))],
                        })],
                    },
                )]),
            ),
            stmt(StmtKind::Return(None)),
        ];

        assert_eq!(tidied(body), "x;\nwhile (!a) {\n    y;\n}\nreturn;\n");
    }

    #[test]
    fn trailing_exit_tests_become_do_while_loops() {
        let body = vec![labeled(
            9,
            StmtKind::Block(vec![labeled(
                4,
                StmtKind::While {
                    cond: Expression::boolean(true),
                    body: vec![
                        say("y"),
                        stmt(StmtKind::If {
                            cond: var("a").negate(),
                            then: vec![stmt(StmtKind::Break(Some(Label(9))))],
                            otherwise: vec![stmt(StmtKind::Continue(Some(Label(4))))],
                        }),
                    ],
                },
            )]),
        )];

        assert_eq!(tidied(body), "do {\n    y;\n} while (a);\n");
    }

    #[test]
    fn returns_are_copied_over_breaks_to_remove_labels() {
        let body = vec![
            labeled(
                6,
                StmtKind::Block(vec![
                    stmt(StmtKind::If {
                        cond: var("a"),
                        then: vec![stmt(StmtKind::Break(Some(Label(6))))],
                        otherwise: Vec::new(),
                    }),
                    say("y"),
                    stmt(StmtKind::Return(Some(var("bb")))),
                ]),
            ),
            stmt(StmtKind::Return(Some(var("ccc")))),
        ];

        assert_eq!(
            tidied(body),
            "if (a) {\n    return ccc;\n}\ny;\nreturn bb;\n"
        );
    }

    #[test]
    fn breaks_past_an_unlabeled_loop_leave_the_loop() {
        let body = vec![labeled(
            6,
            StmtKind::Block(vec![stmt(StmtKind::While {
                cond: Expression::boolean(true),
                body: vec![
                    stmt(StmtKind::If {
                        cond: var("a"),
                        then: vec![stmt(StmtKind::Break(Some(Label(6))))],
                        otherwise: Vec::new(),
                    }),
                    say("y"),
                ],
            })]),
        )];

        assert_eq!(tidied(body), "while (!a) {\n    y;\n}\n");
    }

    #[test]
    fn inner_loops_ending_the_outer_body_swap_their_exits() {
        let body = vec![labeled(
            30,
            StmtKind::While {
                cond: var("a"),
                body: vec![stmt(StmtKind::While {
                    cond: Expression::boolean(true),
                    body: vec![
                        stmt(StmtKind::If {
                            cond: var("bb"),
                            then: vec![stmt(StmtKind::Continue(Some(Label(30))))],
                            otherwise: Vec::new(),
                        }),
                        stmt(StmtKind::If {
                            cond: var("ccc"),
                            then: vec![stmt(StmtKind::Break(None))],
                            otherwise: Vec::new(),
                        }),
                        say("x"),
                    ],
                })],
            },
        )];

        assert_eq!(
            tidied(body),
            "label1: while (a) {\n    while (!bb) {\n        if (ccc) {\n            continue label1;\n        }\n        x;\n    }\n}\n"
        );
    }

    #[test]
    fn labels_that_stay_are_renumbered_in_order() {
        let body = vec![labeled(
            30,
            StmtKind::While {
                cond: var("a"),
                body: vec![stmt(StmtKind::While {
                    cond: var("bb"),
                    body: vec![
                        stmt(StmtKind::If {
                            cond: var("ccc"),
                            then: vec![stmt(StmtKind::Continue(Some(Label(30))))],
                            otherwise: Vec::new(),
                        }),
                        say("x"),
                    ],
                })],
            },
        )];

        assert_eq!(
            tidied(body),
            "label1: while (a) {\n    while (bb) {\n        if (ccc) {\n            continue label1;\n        }\n        x;\n    }\n}\n"
        );
    }

    #[test]
    fn monitor_pairs_become_synchronized_blocks() {
        let lock = Expression::local(
            LocalRef {
                id: 1,
                name: "lock".to_string(),
            },
            Type::object_root(),
        );
        let temp = Expression::local(
            LocalRef {
                id: 2,
                name: "obj2".to_string(),
            },
            Type::object_root(),
        );
        let body = vec![
            stmt(StmtKind::MonitorEnter(Expression::assign(
                None,
                temp.clone(),
                lock,
            ))),
            stmt(StmtKind::Try {
                body: vec![say("x")],
                catches: Vec::new(),
                finally: Some(vec![stmt(StmtKind::MonitorExit(temp))]),
            }),
        ];

        assert_eq!(tidied(body), "synchronized (lock) {\n    x;\n}\n");
    }
}
