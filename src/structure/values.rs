//! Carries operand-stack values across block boundaries.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use crate::ast::{ExprKind, Expression, LocalRef, Statement};
use crate::cfg::{ControlFlowGraph, EdgeKind};
use crate::error::{Diagnostic, ReconstructError};
use crate::resolver::TypeResolver;
use crate::synth::{self, BlockExit, BlockOutcome, MethodContext, TEMP_BASE};
use crate::types::Type;

/// First id of the temporaries holding stack values at merge points.
const MERGE_BASE: usize = TEMP_BASE * 2;

/// Per-block synthesis results for one method.
#[derive(Clone, Debug)]
pub struct Synthesized {
    /// Indexed by CFG block; `None` for unreachable blocks and blocks folded into a ternary.
    pub outcomes: Vec<Option<BlockOutcome>>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Synthesizes every reachable block in reverse postorder, feeding each block the stack its
/// predecessors leave behind.
pub fn propagate(
    ctx: &MethodContext<'_>,
    graph: &ControlFlowGraph,
) -> Result<Synthesized, ReconstructError> {
    let mut propagation = Propagation {
        ctx,
        graph,
        outcomes: vec![None; graph.blocks.len()],
        visited: vec![false; graph.blocks.len()],
        merges: Vec::new(),
    };
    for block in graph.reverse_postorder() {
        let stack_in = propagation.stack_in(block)?;
        let outcome = synth::synthesize(ctx, &graph.blocks[block], &stack_in)?;
        propagation.outcomes[block] = Some(outcome);
        propagation.visited[block] = true;
    }
    propagation.assign_merge_temps()?;

    let mut diagnostics: Vec<Diagnostic> = propagation
        .outcomes
        .iter()
        .flatten()
        .flat_map(|outcome| outcome.diagnostics.iter().cloned())
        .collect();
    let dead: Vec<String> = graph
        .reachable()
        .iter()
        .enumerate()
        .filter(|(_, reachable)| !**reachable)
        .map(|(block, _)| graph.blocks[block].start_offset.to_string())
        .collect();
    if !dead.is_empty() {
        debug!(blocks = dead.len(), "dropping unreachable blocks");
        diagnostics.push(Diagnostic::from(&ReconstructError::DeadCode(format!(
            "blocks at offsets {}",
            dead.join(", ")
        ))));
    }
    Ok(Synthesized {
        outcomes: propagation.outcomes,
        diagnostics,
    })
}

struct Propagation<'g, 'c, 'a> {
    ctx: &'c MethodContext<'a>,
    graph: &'g ControlFlowGraph,
    outcomes: Vec<Option<BlockOutcome>>,
    visited: Vec<bool>,
    /// Merge blocks whose incoming stacks disagree, with the temporaries standing in for them.
    merges: Vec<(usize, Vec<Expression>)>,
}

/// Nodes consumed while folding a value diamond.
struct Fold {
    inner: Vec<usize>,
    leaves: Vec<usize>,
}

impl Propagation<'_, '_, '_> {
    fn normal_preds(&self, block: usize) -> Vec<usize> {
        let mut preds = Vec::new();
        for edge in &self.graph.edges {
            if edge.to == block && edge.kind != EdgeKind::Exception && !preds.contains(&edge.from) {
                preds.push(edge.from);
            }
        }
        preds
    }

    fn outcome(&self, block: usize) -> Option<&BlockOutcome> {
        self.outcomes.get(block).and_then(Option::as_ref)
    }

    /// Type of the exception on entry to a handler block, `None` for other blocks.
    fn caught_type(&self, block: usize) -> Option<Type> {
        let start = self.graph.blocks[block].start_offset;
        let types: BTreeSet<Option<&str>> = self
            .graph
            .handlers
            .iter()
            .filter(|handler| handler.handler_pc == start)
            .map(|handler| handler.catch_type.as_deref())
            .collect();
        if types.is_empty() {
            return None;
        }
        let ty = match types.into_iter().collect::<Vec<_>>().as_slice() {
            [Some(name)] => self.ctx.resolver.resolve(name),
            _ => Type::object("java/lang/Throwable"),
        };
        Some(ty)
    }

    fn stack_in(&mut self, block: usize) -> Result<Vec<Expression>, ReconstructError> {
        if let Some(ty) = self.caught_type(block) {
            return Ok(vec![Expression::new(ExprKind::CaughtException, ty)]);
        }
        let preds = self.normal_preds(block);
        let done: Vec<usize> = preds
            .iter()
            .copied()
            .filter(|pred| self.visited[*pred] && self.outcome(*pred).is_some())
            .collect();
        let Some(first) = done.first().and_then(|pred| self.outcome(*pred)) else {
            return Ok(Vec::new());
        };
        let first = first.stack_out.clone();
        if done.len() == 1 && preds.len() == 1 {
            return Ok(first);
        }
        if done.len() == preds.len()
            && let Some(stack) = self.fold_ternary(block, &done)
        {
            return Ok(stack);
        }
        let agree = done
            .iter()
            .all(|pred| self.outcome(*pred).is_some_and(|o| o.stack_out == first));
        if first.is_empty() || (agree && done.len() == preds.len()) {
            return Ok(first);
        }
        let start = self.graph.blocks[block].start_offset;
        if done
            .iter()
            .any(|pred| self.outcome(*pred).is_some_and(|o| o.stack_out.len() != first.len()))
        {
            return Err(ReconstructError::stack(
                start,
                "inconsistent stack depth at merge point",
            ));
        }
        let temps: Vec<Expression> = first
            .iter()
            .enumerate()
            .map(|(index, value)| {
                Expression::local(
                    LocalRef {
                        id: MERGE_BASE + block * 16 + index,
                        name: format!("stack{start}_{index}"),
                    },
                    value.ty.clone(),
                )
            })
            .collect();
        trace!(offset = start, depth = temps.len(), "merging stack through temporaries");
        self.merges.push((block, temps.clone()));
        Ok(temps)
    }

    /// Rebuilds `cond ? a : b` when every predecessor of `merge` is a leaf pushing one value
    /// below a tree of condition-only blocks.
    fn fold_ternary(&mut self, merge: usize, preds: &[usize]) -> Option<Vec<Expression>> {
        if preds.len() < 2 {
            return None;
        }
        let depth = self.outcome(preds[0])?.stack_out.len().checked_sub(1)?;
        if !preds.iter().all(|pred| self.is_leaf(*pred, merge, depth)) {
            return None;
        }
        let mut candidates = Vec::new();
        let mut current = *self.normal_preds(preds[0]).first()?;
        loop {
            candidates.push(current);
            let outcome = self.outcome(current)?;
            if !outcome.statements.is_empty() || candidates.len() > 32 {
                break;
            }
            match self.normal_preds(current).as_slice() {
                [parent]
                    if self.is_condition(*parent, depth, true)
                        && !candidates.contains(parent) =>
                {
                    current = *parent;
                }
                _ => break,
            }
        }
        let leafset: BTreeSet<usize> = preds.iter().copied().collect();
        for root in candidates.into_iter().rev() {
            if !self.is_condition(root, depth, true) {
                continue;
            }
            let mut fold = Fold {
                inner: Vec::new(),
                leaves: Vec::new(),
            };
            let Some(value) = self.value_tree(root, merge, depth, true, &mut fold, 0) else {
                continue;
            };
            if !self.valid_fold(root, &fold, &leafset) {
                continue;
            }
            let base = self.outcome(root)?.stack_out.clone();
            let merge_offset = self.graph.blocks[merge].start_offset;
            trace!(
                offset = self.graph.blocks[root].start_offset,
                merge = merge_offset,
                "folding value diamond into a ternary"
            );
            let mut stack = base;
            stack.push(value);
            for node in fold.inner.iter().chain(fold.leaves.iter()) {
                self.outcomes[*node] = None;
            }
            if let Some(outcome) = self.outcomes[root].as_mut() {
                outcome.exit = BlockExit::Jump(merge_offset);
                outcome.stack_out = stack.clone();
            }
            return Some(stack);
        }
        None
    }

    fn is_leaf(&self, block: usize, merge: usize, depth: usize) -> bool {
        let Some(outcome) = self.outcome(block) else {
            return false;
        };
        let exits_to_merge = match outcome.exit {
            BlockExit::FallThrough => block + 1 == merge,
            BlockExit::Jump(target) => self.graph.block_at(target) == Some(merge),
            _ => false,
        };
        exits_to_merge && outcome.statements.is_empty() && outcome.stack_out.len() == depth + 1
    }

    fn is_condition(&self, block: usize, depth: usize, root: bool) -> bool {
        self.outcome(block).is_some_and(|outcome| {
            matches!(outcome.exit, BlockExit::Branch { .. })
                && outcome.stack_out.len() == depth
                && (root || outcome.statements.is_empty())
        })
    }

    fn value_tree(
        &self,
        block: usize,
        merge: usize,
        depth: usize,
        root: bool,
        fold: &mut Fold,
        level: usize,
    ) -> Option<Expression> {
        if level > 32 {
            return None;
        }
        let outcome = self.outcome(block)?;
        if !root && self.is_leaf(block, merge, depth) {
            fold.leaves.push(block);
            return outcome.stack_out.last().cloned();
        }
        if !self.is_condition(block, depth, root) {
            return None;
        }
        let BlockExit::Branch { cond, target } = &outcome.exit else {
            return None;
        };
        let taken = self.graph.block_at(*target)?;
        let fallthrough = block + 1;
        if taken == merge || fallthrough == merge || taken == block || fallthrough == block {
            return None;
        }
        if !root {
            fold.inner.push(block);
        }
        let when_taken = self.value_tree(taken, merge, depth, false, fold, level + 1)?;
        let otherwise = self.value_tree(fallthrough, merge, depth, false, fold, level + 1)?;
        let ty = ternary_type(self.ctx.resolver, &otherwise.ty, &when_taken.ty);
        Some(synth::ternary(cond.clone().negate(), otherwise, when_taken, ty))
    }

    fn valid_fold(&self, root: usize, fold: &Fold, leafset: &BTreeSet<usize>) -> bool {
        let used: BTreeSet<usize> = fold.leaves.iter().copied().collect();
        if used != *leafset {
            return false;
        }
        let mut region: BTreeSet<usize> = fold.inner.iter().copied().collect();
        region.insert(root);
        let root_handlers = self.graph.handlers_for(root);
        let base = match self.outcome(root) {
            Some(outcome) => &outcome.stack_out,
            None => return false,
        };
        for block in fold.inner.iter().chain(used.iter()) {
            let exceptional = self
                .graph
                .edges
                .iter()
                .any(|edge| edge.to == *block && edge.kind == EdgeKind::Exception);
            if exceptional
                || self.graph.handlers_for(*block) != root_handlers
                || !self
                    .normal_preds(*block)
                    .iter()
                    .all(|pred| region.contains(pred))
            {
                return false;
            }
        }
        for leaf in &used {
            let Some(outcome) = self.outcome(*leaf) else {
                return false;
            };
            if outcome.stack_out[..base.len()] != base[..] {
                return false;
            }
            let shared = fold.leaves.iter().filter(|seen| *seen == leaf).count() > 1;
            if shared && outcome.stack_out.last().is_some_and(Expression::has_side_effects) {
                return false;
            }
        }
        true
    }

    /// Appends `temp = value` assignments to every predecessor of a merge that needed temps.
    fn assign_merge_temps(&mut self) -> Result<(), ReconstructError> {
        for (block, temps) in std::mem::take(&mut self.merges) {
            for pred in self.normal_preds(block) {
                let Some(outcome) = self.outcomes[pred].as_mut() else {
                    continue;
                };
                if outcome.stack_out.len() != temps.len() {
                    return Err(ReconstructError::stack(
                        self.graph.blocks[block].start_offset,
                        "inconsistent stack depth at merge point",
                    ));
                }
                let line = outcome.exit_line;
                for (temp, value) in temps.iter().zip(outcome.stack_out.iter()) {
                    if temp == value {
                        continue;
                    }
                    outcome.statements.push(Statement::expression(
                        Expression::assign(None, temp.clone(), value.clone()),
                        line,
                    ));
                }
                outcome.stack_out = temps.clone();
            }
        }
        Ok(())
    }
}

/// Static type of `c ? a : b`.
fn ternary_type(resolver: &TypeResolver, a: &Type, b: &Type) -> Type {
    if a == b {
        return a.clone();
    }
    match (a, b) {
        (Type::Null, other) | (other, Type::Null) => other.clone(),
        (Type::Primitive(left), Type::Primitive(right)) => Type::primitive(left.promote(*right)),
        _ if resolver.is_assignable(a, b) => a.clone(),
        _ if resolver.is_assignable(b, a) => b.clone(),
        _ => Type::object_root(),
    }
}
