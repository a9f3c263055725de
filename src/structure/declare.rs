//! Places one declaration per local variable in the innermost list that holds all its uses.

use std::collections::{BTreeMap, HashSet};

use crate::ast::{visit, ExprKind, Expression, LocalRef, Statement, StmtKind};
use crate::synth::{LocalOrigin, LocalTable, TEMP_BASE};
use crate::types::Type;

/// Step from a statement list into the `child`-th nested list of its `index`-th statement.
type Path = Vec<(usize, usize)>;

struct Use {
    path: Path,
    index: usize,
    /// The statement is `var = value;` with `value` not reading `var`.
    plain_store: bool,
}

#[derive(Default)]
struct VarUses {
    var: Option<LocalRef>,
    /// Type carried by the first reference.
    seen_ty: Option<Type>,
    /// Non-null types of values assigned with `=`.
    assigned: Vec<Type>,
    uses: Vec<Use>,
}

struct Placement {
    index: usize,
    var: LocalRef,
    ty: Type,
    with_init: bool,
}

fn plain_store(stmt: &Statement) -> Option<usize> {
    let StmtKind::Expression(Expression {
        kind: ExprKind::Assign {
            op: None,
            target,
            value,
        },
        ..
    }) = &stmt.kind
    else {
        return None;
    };
    let var = target.as_local()?;
    (!value.references(var.id)).then_some(var.id)
}

fn collect(stmts: &[Statement], path: &mut Path, vars: &mut BTreeMap<usize, VarUses>) {
    for (index, stmt) in stmts.iter().enumerate() {
        let store = plain_store(stmt);
        for expr in visit::own_exprs(stmt) {
            visit::for_each_expr(expr, &mut |expr| match &expr.kind {
                ExprKind::Local(var) => {
                    let entry = vars.entry(var.id).or_default();
                    if entry.var.is_none() {
                        entry.var = Some(var.clone());
                        entry.seen_ty = Some(expr.ty.clone());
                    }
                    entry.uses.push(Use {
                        path: path.clone(),
                        index,
                        plain_store: store == Some(var.id),
                    });
                }
                ExprKind::Assign {
                    op: None,
                    target,
                    value,
                } => {
                    if let Some(var) = target.as_local()
                        && value.ty != Type::Null
                    {
                        vars.entry(var.id).or_default().assigned.push(value.ty.clone());
                    }
                }
                _ => {}
            });
        }
        for (child, list) in visit::child_lists(stmt).into_iter().enumerate() {
            path.push((index, child));
            collect(list, path, vars);
            path.pop();
        }
    }
}

fn declared_elsewhere(stmts: &[Statement]) -> HashSet<usize> {
    let mut ids = HashSet::new();
    visit::for_each_stmt(stmts, &mut |stmt| match &stmt.kind {
        StmtKind::Try { catches, .. } => ids.extend(catches.iter().map(|clause| clause.var.id)),
        StmtKind::ForEach { var, .. } | StmtKind::Declaration { var, .. } => {
            ids.insert(var.id);
        }
        _ => {}
    });
    ids
}

fn statement_at<'a>(body: &'a [Statement], path: &[(usize, usize)]) -> Option<&'a Statement> {
    let ((last, _), outer) = path.split_last()?;
    let mut list = body;
    for (index, child) in outer {
        list = visit::child_lists(list.get(*index)?).into_iter().nth(*child)?;
    }
    list.get(*last)
}

fn list_at<'a>(
    body: &'a mut Vec<Statement>,
    path: &[(usize, usize)],
) -> Option<&'a mut Vec<Statement>> {
    let mut list = body;
    for (index, child) in path {
        list = visit::child_lists_mut(list.get_mut(*index)?)
            .into_iter()
            .nth(*child)?;
    }
    Some(list)
}

/// Name for a debug-less reference local once its type is known, e.g. `string3`.
fn typed_name(ty: &Type, slot: u16) -> Option<String> {
    fn base(ty: &Type) -> Option<String> {
        match ty {
            Type::Object(object) => {
                let simple = object.simple_name();
                let mut chars = simple.chars();
                let first = chars.next()?;
                if !first.is_ascii_alphabetic() {
                    return None;
                }
                Some(first.to_ascii_lowercase().to_string() + chars.as_str())
            }
            Type::Primitive(primitive) => Some(primitive.keyword().to_string()),
            Type::Array(element) => Some(format!("{}Array", base(element)?)),
            _ => None,
        }
    }
    base(ty).map(|base| format!("{base}{slot}"))
}

/// Declared type and name of a variable.
fn declaration_of(id: usize, uses: &VarUses, locals: &LocalTable) -> Option<(LocalRef, Type)> {
    let var = uses.var.clone()?;
    let known = (id < TEMP_BASE).then(|| locals.get(id)).flatten();
    let Some(local) = known else {
        let ty = match &uses.seen_ty {
            Some(Type::Null) | None => Type::object_root(),
            Some(ty) => ty.clone(),
        };
        return Some((var, ty));
    };
    if local.origin != LocalOrigin::Synthetic || !local.ty.is_reference() {
        return Some((var, local.ty.clone()));
    }
    let first = uses.assigned.first().filter(|first| {
        first.is_reference() && uses.assigned.iter().all(|other| other == *first)
    });
    match first {
        Some(ty) => {
            let name = typed_name(ty, local.slot).unwrap_or_else(|| var.name.clone());
            Some((LocalRef { id, name }, ty.clone()))
        }
        None => Some((var, local.ty.clone())),
    }
}

/// Inserts a declaration for every local that is read or written in `body` and not declared by
/// the method signature, a catch clause or an enhanced `for`.
pub(crate) fn place_declarations(body: &mut Vec<Statement>, locals: &LocalTable) {
    let mut vars = BTreeMap::new();
    collect(body, &mut Vec::new(), &mut vars);
    let declared = declared_elsewhere(body);

    let mut placements: BTreeMap<Path, Vec<Placement>> = BTreeMap::new();
    let mut retyped: Vec<(LocalRef, Type)> = Vec::new();
    for (id, uses) in &vars {
        if locals.is_parameter(*id) || declared.contains(id) {
            continue;
        }
        let Some(first) = uses.uses.first() else {
            continue;
        };
        let Some((var, ty)) = declaration_of(*id, uses, locals) else {
            continue;
        };
        if locals.is_synthetic(*id) && uses.seen_ty.as_ref() != Some(&ty) {
            retyped.push((var.clone(), ty.clone()));
        }

        let mut scope = first.path.clone();
        for other in &uses.uses[1..] {
            let common = scope
                .iter()
                .zip(&other.path)
                .take_while(|(left, right)| left == right)
                .count();
            scope.truncate(common);
        }
        let mut index = match first.path.get(scope.len()) {
            Some((index, _)) => *index,
            None => first.index,
        };
        let with_init = first.plain_store && first.path.len() == scope.len();
        if !with_init {
            // A value read before any store in a loop body may come from the previous pass.
            while let Some(stmt) = statement_at(body, &scope)
                && visit::is_loop(stmt)
            {
                let Some((outer, _)) = scope.pop() else {
                    break;
                };
                index = outer;
            }
        }
        placements.entry(scope).or_default().push(Placement {
            index,
            var,
            ty,
            with_init,
        });
    }

    if !retyped.is_empty() {
        visit::map_exprs_in(body, &mut |expr| {
            if let ExprKind::Local(var) = &mut expr.kind
                && let Some((renamed, ty)) = retyped.iter().find(|(local, _)| local.id == var.id)
            {
                *var = renamed.clone();
                expr.ty = ty.clone();
            }
        });
    }

    let mut ordered: Vec<(Path, Vec<Placement>)> = placements.into_iter().collect();
    ordered.sort_by_key(|(path, _)| std::cmp::Reverse(path.len()));
    for (path, mut group) in ordered {
        let Some(list) = list_at(body, &path) else {
            continue;
        };
        group.sort_by_key(|placement| (placement.index, placement.with_init));
        let old = std::mem::take(list);
        let mut pending = group.into_iter().peekable();
        for (index, stmt) in old.into_iter().enumerate() {
            let mut stmt = Some(stmt);
            while let Some(placement) = pending.next_if(|placement| placement.index == index) {
                let line = stmt.as_ref().map(|stmt| stmt.line).unwrap_or(0);
                let init = if placement.with_init {
                    stmt.take().and_then(|stmt| match stmt.kind {
                        StmtKind::Expression(Expression {
                            kind: ExprKind::Assign { value, .. },
                            ..
                        }) => Some(*value),
                        _ => None,
                    })
                } else {
                    None
                };
                list.push(Statement::new(
                    StmtKind::Declaration {
                        var: placement.var,
                        ty: placement.ty,
                        init,
                    },
                    line,
                ));
            }
            list.extend(stmt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::render_statements;
    use crate::synth::LocalVar;
    use crate::testing::{aconst_null, aload, astore, class_with, iload, vreturn, MethodBuilder};
    use pretty_assertions::assert_eq;

    fn local(var: &LocalVar) -> Expression {
        Expression::local(var.var.clone(), var.ty.clone())
    }

    fn temp(offset: usize, name: &str) -> Expression {
        Expression::local(
            LocalRef {
                id: TEMP_BASE + offset,
                name: name.to_string(),
            },
            Type::int(),
        )
    }

    fn store(target: Expression, value: Expression) -> Statement {
        Statement::expression(Expression::assign(None, target, value), 0)
    }

    fn stmt(kind: StmtKind) -> Statement {
        Statement::new(kind, 0)
    }

    fn table(method: &crate::ir::RawMethod) -> LocalTable {
        LocalTable::build(&class_with("a/B", vec![method.clone()]), method).expect("locals")
    }

    #[test]
    fn declarations_land_in_the_innermost_list_at_the_first_store() {
        let method = MethodBuilder::new("run", "(Z)I")
            .with_static()
            .code(vec![iload(0), vreturn()])
            .build();
        let locals = table(&method);
        let flag = local(locals.at(0).expect("param"));
        let t = temp(1, "t");
        let mut body = vec![
            stmt(StmtKind::If {
                cond: flag,
                then: vec![
                    store(t.clone(), Expression::int(1)),
                    stmt(StmtKind::Return(Some(t))),
                ],
                otherwise: Vec::new(),
            }),
            stmt(StmtKind::Return(Some(Expression::int(0)))),
        ];

        place_declarations(&mut body, &locals);

        assert_eq!(
            render_statements(&body),
            "if (arg0) {\n    int t = 1;\n    return t;\n}\nreturn 0;\n"
        );
    }

    #[test]
    fn variables_shared_by_branches_are_declared_before_them() {
        let method = MethodBuilder::new("run", "(Z)I")
            .with_static()
            .code(vec![iload(0), vreturn()])
            .build();
        let locals = table(&method);
        let flag = local(locals.at(0).expect("param"));
        let t = temp(1, "t");
        let mut body = vec![
            stmt(StmtKind::If {
                cond: flag,
                then: vec![store(t.clone(), Expression::int(1))],
                otherwise: vec![store(t.clone(), Expression::int(2))],
            }),
            stmt(StmtKind::Return(Some(t))),
        ];

        place_declarations(&mut body, &locals);

        assert_eq!(
            render_statements(&body),
            "int t;\nif (arg0) {\n    t = 1;\n} else {\n    t = 2;\n}\nreturn t;\n"
        );
    }

    #[test]
    fn loop_carried_values_are_declared_outside_the_loop() {
        let locals = LocalTable::default();
        let t = temp(1, "t");
        let call = Expression::new(
            ExprKind::MethodCall {
                target: crate::ast::CallTarget::Static,
                owner: "a/B".to_string(),
                name: "use".to_string(),
                descriptor: "(I)V".to_string(),
                args: vec![t.clone()],
            },
            Type::void(),
        );
        let mut body = vec![stmt(StmtKind::While {
            cond: Expression::boolean(true),
            body: vec![
                Statement::expression(call, 0),
                store(t.clone(), Expression::int(1)),
            ],
        })];

        place_declarations(&mut body, &locals);

        assert_eq!(
            render_statements(&body),
            "int t;\nwhile (true) {\n    a.B.use(t);\n    t = 1;\n}\n"
        );
    }

    #[test]
    fn debugless_references_take_the_type_of_their_first_value() {
        let method = MethodBuilder::new("run", "()V")
            .with_static()
            .code(vec![aconst_null(), astore(1), aload(1), vreturn()])
            .build();
        let locals = table(&method);
        let obj = local(locals.at(1).expect("store"));
        let mut body = vec![
            store(obj.clone(), Expression::string("x")),
            stmt(StmtKind::Return(Some(obj))),
        ];

        place_declarations(&mut body, &locals);

        assert_eq!(
            render_statements(&body),
            "java.lang.String string1 = \"x\";\nreturn string1;\n"
        );
    }
}
