//! Recovery of nested statements from the synthesized blocks of a method.
//!
//! The blocks are first linked into a working graph where short-circuit conditions are folded
//! and irreducible loops split. Emission then walks the dominator tree, producing labeled blocks
//! for forward merges and labeled `while (true)` loops for back edges. The cleanup passes that
//! follow remove most of those labels again.

mod cleanup;
mod declare;
mod emit;
mod graph;
mod idioms;
mod values;

use tracing::debug;

use crate::ast::{Statement, StmtKind};
use crate::cfg::ControlFlowGraph;
use crate::error::{Diagnostic, ReconstructError};
use crate::synth::MethodContext;

pub use values::{propagate, Synthesized};

/// Statement tree of one method body.
#[derive(Clone, Debug)]
pub struct Structured {
    pub body: Vec<Statement>,
    pub diagnostics: Vec<Diagnostic>,
}

fn strip_void_return(body: &mut Vec<Statement>) {
    emit::strip_tail(body, &|kind| matches!(kind, StmtKind::Return(None)));
}

/// Builds the statement tree of a method from its synthesized blocks.
pub fn structure(
    ctx: &MethodContext<'_>,
    cfg: &ControlFlowGraph,
    synthesized: Synthesized,
) -> Result<Structured, ReconstructError> {
    let Synthesized {
        outcomes,
        mut diagnostics,
    } = synthesized;
    let mut graph = graph::Graph::build(cfg, outcomes)?;
    graph.fold_short_circuits();
    graph.make_reducible(&mut diagnostics)?;
    debug!(method = %ctx.method.name, nodes = graph.len(), "emitting structured body");

    let mut body = emit::emit(&graph, ctx.resolver)?;
    let void = ctx.locals.return_type().is_void();
    cleanup::tidy(&mut body);
    if void {
        strip_void_return(&mut body);
    }
    declare::place_declarations(&mut body, ctx.locals);
    idioms::apply(&mut body, ctx.resolver);
    cleanup::tidy(&mut body);
    if void {
        strip_void_return(&mut body);
    }
    cleanup::renumber_labels(&mut body);
    Ok(Structured { body, diagnostics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::render_statements;
    use crate::cfg;
    use crate::ir::{Op, RawMethod, Relation};
    use crate::resolver::TypeResolver;
    use crate::synth::LocalTable;
    use crate::testing::{
        aload, astore, class_with, goto, iconst, if_icmp, if_zero, iload, invoke_static, ireturn,
        istore, vreturn, MethodBuilder,
    };
    use pretty_assertions::assert_eq;

    fn decompile(method: RawMethod) -> String {
        let class = class_with("a/B", vec![method.clone()]);
        let resolver = TypeResolver::empty();
        let locals = LocalTable::build(&class, &method).expect("locals");
        let ctx = MethodContext {
            class: &class,
            method: &method,
            resolver: &resolver,
            locals: &locals,
        };
        let graph = cfg::build(&method.instructions, method.code_length, &method.exception_table)
            .expect("cfg");
        let synthesized = propagate(&ctx, &graph).expect("synthesis");
        let structured = structure(&ctx, &graph, synthesized).expect("structure");
        render_statements(&structured.body)
    }

    fn call(name: &str, descriptor: &str) -> Op {
        invoke_static("a/B", name, descriptor)
    }

    #[test]
    fn if_else_needs_no_labels() {
        let method = MethodBuilder::new("run", "(Z)V")
            .with_static()
            .code(vec![
                iload(0),
                if_zero(Relation::Eq, 5),
                iconst(1),
                call("f", "(I)V"),
                goto(7),
                iconst(2),
                call("f", "(I)V"),
                call("g", "()V"),
                vreturn(),
            ])
            .build();

        assert_eq!(
            decompile(method),
            "if (arg0) {\n    a.B.f(1);\n} else {\n    a.B.f(2);\n}\na.B.g();\n"
        );
    }

    #[test]
    fn counting_loops_read_as_for_statements() {
        let method = MethodBuilder::new("run", "(I)V")
            .with_static()
            .code(vec![
                iconst(0),
                istore(1),
                iload(1),
                iload(0),
                if_icmp(Relation::Ge, 9),
                iload(1),
                call("f", "(I)V"),
                Op::Iinc { slot: 1, delta: 1 },
                goto(2),
                vreturn(),
            ])
            .build();

        assert_eq!(
            decompile(method),
            "for (int int1 = 0; int1 < arg0; int1++) {\n    a.B.f(int1);\n}\n"
        );
    }

    #[test]
    fn handlers_become_catch_clauses() {
        let method = MethodBuilder::new("run", "()V")
            .with_static()
            .code(vec![
                call("f", "()V"),
                goto(4),
                astore(0),
                call("g", "()V"),
                call("h", "()V"),
                vreturn(),
            ])
            .handler(0, 1, 2, Some("java/lang/Exception"))
            .build();

        assert_eq!(
            decompile(method),
            "try {\n    a.B.f();\n} catch (java.lang.Exception obj0) {\n    a.B.g();\n}\na.B.h();\n"
        );
    }

    #[test]
    fn switch_cases_keep_their_fallthrough() {
        let method = MethodBuilder::new("run", "(I)V")
            .with_static()
            .code(vec![
                iload(0),
                Op::LookupSwitch {
                    default: 7,
                    pairs: vec![(1, 2), (2, 4)],
                },
                iconst(1),
                call("f", "(I)V"),
                iconst(2),
                call("f", "(I)V"),
                goto(8),
                call("g", "()V"),
                call("h", "()V"),
                vreturn(),
            ])
            .build();

        assert_eq!(
            decompile(method),
            "switch (arg0) {\n    case 1:\n        a.B.f(1);\n    case 2:\n        a.B.f(2);\n        break;\n    default:\n        a.B.g();\n}\na.B.h();\n"
        );
    }

    #[test]
    fn loop_exits_become_plain_breaks_and_conditions() {
        let method = MethodBuilder::new("run", "()V")
            .with_static()
            .code(vec![
                call("c", "()Z"),
                if_zero(Relation::Eq, 7),
                call("d", "()Z"),
                if_zero(Relation::Eq, 5),
                goto(7),
                call("f", "()V"),
                goto(0),
                call("h", "()V"),
                vreturn(),
            ])
            .build();

        assert_eq!(
            decompile(method),
            "while (a.B.c()) {\n    if (a.B.d()) {\n        break;\n    }\n    a.B.f();\n}\na.B.h();\n"
        );
    }

    #[test]
    fn finally_copies_are_removed_from_the_normal_exit() {
        let method = MethodBuilder::new("run", "()V")
            .with_static()
            .code(vec![
                call("f", "()V"),
                call("g", "()V"),
                goto(7),
                astore(0),
                call("g", "()V"),
                aload(0),
                Op::Athrow,
                call("h", "()V"),
                vreturn(),
            ])
            .handler(0, 1, 3, None)
            .build();

        assert_eq!(
            decompile(method),
            "try {\n    a.B.f();\n} finally {\n    a.B.g();\n}\na.B.h();\n"
        );
    }

    #[test]
    fn catch_bodies_share_the_finally_clause() {
        let method = MethodBuilder::new("run", "()V")
            .with_static()
            .code(vec![
                call("f", "()V"),
                call("k", "()V"),
                goto(11),
                astore(0),
                call("g", "()V"),
                call("k", "()V"),
                goto(11),
                astore(1),
                call("k", "()V"),
                aload(1),
                Op::Athrow,
                call("h", "()V"),
                vreturn(),
            ])
            .handler(0, 1, 3, Some("java/lang/Exception"))
            .handler(0, 1, 7, None)
            .handler(3, 5, 7, None)
            .build();

        assert_eq!(
            decompile(method),
            "try {\n    a.B.f();\n} catch (java.lang.Exception obj0) {\n    a.B.g();\n} finally {\n    a.B.k();\n}\na.B.h();\n"
        );
    }

    #[test]
    fn returned_values_are_saved_before_the_finally_code() {
        let method = MethodBuilder::new("run", "()I")
            .with_static()
            .code(vec![
                call("f", "()I"),
                istore(0),
                call("g", "()V"),
                iload(0),
                ireturn(),
                astore(1),
                call("g", "()V"),
                aload(1),
                Op::Athrow,
            ])
            .handler(0, 2, 5, None)
            .build();

        assert_eq!(
            decompile(method),
            "int int0;\ntry {\n    int0 = a.B.f();\n} finally {\n    a.B.g();\n}\nreturn int0;\n"
        );
    }

    #[test]
    fn monitor_pairs_become_synchronized_blocks() {
        let method = MethodBuilder::new("run", "(Ljava/lang/Object;)V")
            .with_static()
            .code(vec![
                aload(0),
                Op::Dup,
                astore(1),
                Op::MonitorEnter,
                call("f", "()V"),
                aload(1),
                Op::MonitorExit,
                goto(13),
                astore(2),
                aload(1),
                Op::MonitorExit,
                aload(2),
                Op::Athrow,
                vreturn(),
            ])
            .handler(4, 7, 8, None)
            .handler(8, 11, 8, None)
            .build();

        assert_eq!(
            decompile(method),
            "synchronized (arg0) {\n    a.B.f();\n}\n"
        );
    }

    #[test]
    fn inner_loops_ending_an_outer_body_keep_their_condition() {
        let method = MethodBuilder::new("run", "(I)V")
            .with_static()
            .code(vec![
                call("p", "()Z"),
                if_zero(Relation::Eq, 14),
                iconst(0),
                istore(1),
                iload(1),
                iload(0),
                if_icmp(Relation::Ge, 0),
                call("c", "()Z"),
                if_zero(Relation::Eq, 10),
                goto(0),
                iload(1),
                call("f", "(I)V"),
                Op::Iinc { slot: 1, delta: 1 },
                goto(4),
                vreturn(),
            ])
            .build();

        assert_eq!(
            decompile(method),
            "label1: while (a.B.p()) {\n    for (int int1 = 0; int1 < arg0; int1++) {\n        if (a.B.c()) {\n            continue label1;\n        }\n        a.B.f(int1);\n    }\n}\n"
        );
    }
}
