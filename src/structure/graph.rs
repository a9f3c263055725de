use std::collections::HashSet;

use tracing::trace;

use crate::ast::{BinaryOp, Expression, Statement};
use crate::cfg::ControlFlowGraph;
use crate::error::{Diagnostic, ReconstructError};
use crate::synth::{BlockExit, BlockOutcome};
use crate::types::Type;

/// How control leaves a node of the working graph. Targets are node indices.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Exit {
    Goto(usize),
    /// `then` is taken when `cond` holds.
    Branch {
        cond: Expression,
        then: usize,
        otherwise: usize,
    },
    Switch {
        selector: Expression,
        cases: Vec<(i32, usize)>,
        default: usize,
    },
    Terminal,
}

impl Exit {
    /// Normal targets in edge order; a branch lists both arms even when they coincide.
    pub(crate) fn targets(&self) -> Vec<usize> {
        match self {
            Exit::Goto(target) => vec![*target],
            Exit::Branch {
                then, otherwise, ..
            } => vec![*then, *otherwise],
            Exit::Switch { cases, default, .. } => cases
                .iter()
                .map(|(_, target)| *target)
                .chain(std::iter::once(*default))
                .collect(),
            Exit::Terminal => Vec::new(),
        }
    }

    fn retarget(&mut self, from: usize, to: usize) {
        let swap = |target: &mut usize| {
            if *target == from {
                *target = to;
            }
        };
        match self {
            Exit::Goto(target) => swap(target),
            Exit::Branch {
                then, otherwise, ..
            } => {
                swap(then);
                swap(otherwise);
            }
            Exit::Switch { cases, default, .. } => {
                cases.iter_mut().for_each(|(_, target)| swap(target));
                swap(default);
            }
            Exit::Terminal => {}
        }
    }

    fn remap(&mut self, map: &[usize]) {
        match self {
            Exit::Goto(target) => *target = map[*target],
            Exit::Branch {
                then, otherwise, ..
            } => {
                *then = map[*then];
                *otherwise = map[*otherwise];
            }
            Exit::Switch { cases, default, .. } => {
                cases.iter_mut().for_each(|(_, target)| *target = map[*target]);
                *default = map[*default];
            }
            Exit::Terminal => {}
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    /// CFG block the node was built from; clones share it.
    pub block: usize,
    pub start_offset: u32,
    pub statements: Vec<Statement>,
    pub exit: Exit,
    pub exit_line: u32,
    /// Exception-table indices protecting the node, innermost first.
    pub handlers: Vec<usize>,
}

impl Node {
    pub(crate) fn first_line(&self) -> u32 {
        self.statements
            .iter()
            .map(|stmt| stmt.line)
            .find(|line| *line != 0)
            .unwrap_or(self.exit_line)
    }
}

/// Synthesized blocks linked by node index; mutated only while folding and splitting.
#[derive(Clone, Debug)]
pub(crate) struct Graph {
    pub nodes: Vec<Node>,
    pub entry: usize,
    /// Entry node of each exception-table entry, `None` when the handler is unreachable.
    pub handler_entry: Vec<Option<usize>>,
    pub catch_types: Vec<Option<String>>,
    removed: Vec<bool>,
}

impl Graph {
    pub(crate) fn build(
        cfg: &ControlFlowGraph,
        outcomes: Vec<Option<BlockOutcome>>,
    ) -> Result<Graph, ReconstructError> {
        let mut node_of = vec![None; cfg.blocks.len()];
        let mut index = 0;
        for (block, outcome) in outcomes.iter().enumerate() {
            if outcome.is_some() {
                node_of[block] = Some(index);
                index += 1;
            }
        }
        let resolve_block = |block: usize| {
            node_of.get(block).copied().flatten().ok_or_else(|| {
                ReconstructError::malformed(format!("edge into dropped block {block}"))
            })
        };
        let resolve = |offset: u32| {
            cfg.block_at(offset)
                .ok_or_else(|| ReconstructError::malformed(format!("no block at {offset}")))
                .and_then(resolve_block)
        };

        let mut nodes = Vec::with_capacity(index);
        for (block, outcome) in outcomes.into_iter().enumerate() {
            let Some(outcome) = outcome else {
                continue;
            };
            let exit = match outcome.exit {
                BlockExit::FallThrough => Exit::Goto(resolve_block(block + 1)?),
                BlockExit::Jump(target) => Exit::Goto(resolve(target)?),
                BlockExit::Branch { cond, target } => Exit::Branch {
                    cond,
                    then: resolve(target)?,
                    otherwise: resolve_block(block + 1)?,
                },
                BlockExit::Switch {
                    selector,
                    cases,
                    default,
                } => Exit::Switch {
                    selector,
                    cases: cases
                        .into_iter()
                        .map(|(value, target)| Ok((value, resolve(target)?)))
                        .collect::<Result<_, ReconstructError>>()?,
                    default: resolve(default)?,
                },
                BlockExit::Terminal => Exit::Terminal,
            };
            nodes.push(Node {
                block,
                start_offset: cfg.blocks[block].start_offset,
                statements: outcome.statements,
                exit,
                exit_line: outcome.exit_line,
                handlers: cfg.handlers_for(block),
            });
        }
        let handler_entry: Vec<Option<usize>> = cfg
            .handlers
            .iter()
            .map(|handler| {
                cfg.block_at(handler.handler_pc)
                    .and_then(|block| node_of[block])
            })
            .collect();
        for node in &mut nodes {
            node.handlers
                .retain(|handler| handler_entry[*handler].is_some());
        }
        let entry = resolve_block(cfg.entry)?;
        Ok(Graph {
            removed: vec![false; nodes.len()],
            nodes,
            entry,
            handler_entry,
            catch_types: cfg
                .handlers
                .iter()
                .map(|handler| handler.catch_type.clone())
                .collect(),
        })
    }

    #[cfg(test)]
    pub(crate) fn from_nodes(nodes: Vec<Node>, entry: usize) -> Graph {
        Graph {
            removed: vec![false; nodes.len()],
            nodes,
            entry,
            handler_entry: Vec::new(),
            catch_types: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the node was folded into a predecessor.
    pub(crate) fn is_removed(&self, node: usize) -> bool {
        self.removed[node]
    }

    /// Handler entry nodes reached by exception edges from `node`.
    pub(crate) fn exception_targets(&self, node: usize) -> Vec<usize> {
        let mut targets = Vec::new();
        for handler in &self.nodes[node].handlers {
            if let Some(entry) = self.handler_entry[*handler]
                && !targets.contains(&entry)
            {
                targets.push(entry);
            }
        }
        targets
    }

    /// Distinct successors over normal and exception edges.
    pub(crate) fn successors(&self, node: usize) -> Vec<usize> {
        let mut result = Vec::new();
        for target in self
            .nodes[node]
            .exit
            .targets()
            .into_iter()
            .chain(self.exception_targets(node))
        {
            if !result.contains(&target) {
                result.push(target);
            }
        }
        result
    }

    pub(crate) fn predecessors(&self) -> Vec<Vec<usize>> {
        let mut preds = vec![Vec::new(); self.nodes.len()];
        for node in 0..self.nodes.len() {
            if self.removed[node] {
                continue;
            }
            for target in self.successors(node) {
                if !preds[target].contains(&node) {
                    preds[target].push(node);
                }
            }
        }
        preds
    }

    pub(crate) fn is_handler_entry(&self, node: usize) -> bool {
        self.handler_entry.contains(&Some(node))
    }

    /// Reverse postorder from the entry. Handler entries and branch targets are explored
    /// first so that fallthrough code keeps its layout position.
    pub(crate) fn reverse_postorder(&self) -> Vec<usize> {
        let order_of = |node: usize| {
            let mut next = self.exception_targets(node);
            match &self.nodes[node].exit {
                Exit::Switch { .. } => {
                    let mut targets = self.nodes[node].exit.targets();
                    targets.sort_by_key(|target| std::cmp::Reverse(self.nodes[*target].start_offset));
                    next.extend(targets);
                }
                exit => next.extend(exit.targets()),
            }
            let mut distinct = Vec::new();
            for target in next {
                if !distinct.contains(&target) {
                    distinct.push(target);
                }
            }
            distinct.reverse();
            distinct
        };
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut stack = vec![(self.entry, order_of(self.entry))];
        visited[self.entry] = true;
        while let Some((node, pending)) = stack.last_mut() {
            match pending.pop() {
                Some(next) => {
                    if !visited[next] {
                        visited[next] = true;
                        stack.push((next, order_of(next)));
                    }
                }
                None => {
                    order.push(*node);
                    stack.pop();
                }
            }
        }
        order.reverse();
        order
    }

    /// Folds condition-only nodes into `&&`/`||` conditions of their single predecessor.
    pub(crate) fn fold_short_circuits(&mut self) {
        loop {
            let preds = self.predecessors();
            let mut folded = false;
            for a in 0..self.nodes.len() {
                if self.removed[a] {
                    continue;
                }
                let Exit::Branch {
                    then, otherwise, ..
                } = self.nodes[a].exit
                else {
                    continue;
                };
                for arm in [otherwise, then] {
                    if self.try_fold(a, arm, &preds) {
                        folded = true;
                        break;
                    }
                }
                if folded {
                    break;
                }
            }
            if !folded {
                break;
            }
        }
        self.compact();
    }

    fn try_fold(&mut self, a: usize, b: usize, preds: &[Vec<usize>]) -> bool {
        if a == b
            || self.removed[b]
            || preds[b] != [a]
            || !self.nodes[b].statements.is_empty()
            || self.nodes[b].handlers != self.nodes[a].handlers
            || self.is_handler_entry(b)
        {
            return false;
        }
        let Exit::Branch {
            cond: c2,
            then: t2,
            otherwise: e2,
        } = self.nodes[b].exit.clone()
        else {
            return false;
        };
        if t2 == b || e2 == b {
            return false;
        }
        let Exit::Branch {
            cond: c1,
            then: t,
            otherwise: e,
        } = self.nodes[a].exit.clone()
        else {
            return false;
        };
        let or = |left: Expression, right: Expression| {
            Expression::binary(BinaryOp::LogicalOr, left, right, Type::boolean())
        };
        let and = |left: Expression, right: Expression| {
            Expression::binary(BinaryOp::LogicalAnd, left, right, Type::boolean())
        };
        let exit = if b == e && t2 == t {
            Exit::Branch {
                cond: or(c1, c2),
                then: t,
                otherwise: e2,
            }
        } else if b == e && e2 == t {
            Exit::Branch {
                cond: or(c1, c2.negate()),
                then: t,
                otherwise: t2,
            }
        } else if b == t && e2 == e {
            Exit::Branch {
                cond: and(c1, c2),
                then: t2,
                otherwise: e,
            }
        } else if b == t && t2 == e {
            Exit::Branch {
                cond: and(c1, c2.negate()),
                then: e2,
                otherwise: e,
            }
        } else {
            return false;
        };
        trace!(
            offset = self.nodes[a].start_offset,
            merged = self.nodes[b].start_offset,
            "folding short-circuit condition"
        );
        self.nodes[a].exit = exit;
        self.removed[b] = true;
        true
    }

    /// Splits nodes entered by retreating edges they do not dominate until every loop has a
    /// single entry.
    pub(crate) fn make_reducible(
        &mut self,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(), ReconstructError> {
        let limit = 2 * self.nodes.len() + 64;
        let mut splits = 0;
        loop {
            let dom = Dominators::compute(self);
            let Some((source, target)) = self.irreducible_edge(&dom) else {
                return Ok(());
            };
            splits += 1;
            if splits > limit {
                return Err(ReconstructError::BudgetExceeded {
                    count: splits,
                    limit,
                });
            }
            let clone = self.nodes.len();
            let copy = self.nodes[target].clone();
            let message = format!(
                "loop entered at offset {} from offset {}; node duplicated",
                copy.start_offset, self.nodes[source].start_offset
            );
            trace!(%message, "splitting node");
            diagnostics.push(Diagnostic::from(&ReconstructError::IrreducibleControlFlow(
                message,
            )));
            self.nodes.push(copy);
            self.removed.push(false);
            self.nodes[source].exit.retarget(target, clone);
        }
    }

    fn irreducible_edge(&self, dom: &Dominators) -> Option<(usize, usize)> {
        for &source in &dom.rpo {
            for target in self.nodes[source].exit.targets() {
                if dom.position[target] <= dom.position[source]
                    && !dom.dominates(target, source)
                    && !self.is_handler_entry(target)
                {
                    return Some((source, target));
                }
            }
        }
        None
    }

    /// Drops removed and unreachable nodes, renumbering the rest.
    fn compact(&mut self) {
        let mut reachable = vec![false; self.nodes.len()];
        let mut stack = vec![self.entry];
        while let Some(node) = stack.pop() {
            if reachable[node] || self.removed[node] {
                continue;
            }
            reachable[node] = true;
            stack.extend(self.successors(node));
        }
        let mut map = vec![usize::MAX; self.nodes.len()];
        let mut kept = Vec::new();
        for (index, node) in std::mem::take(&mut self.nodes).into_iter().enumerate() {
            if reachable[index] {
                map[index] = kept.len();
                kept.push(node);
            }
        }
        for node in &mut kept {
            node.exit.remap(&map);
        }
        self.entry = map[self.entry];
        for entry in &mut self.handler_entry {
            *entry = entry.and_then(|node| (map[node] != usize::MAX).then_some(map[node]));
        }
        for node in &mut kept {
            let live = &self.handler_entry;
            node.handlers.retain(|handler| live[*handler].is_some());
        }
        self.removed = vec![false; kept.len()];
        self.nodes = kept;
    }
}

/// Immediate dominators over all edges (Cooper, Harvey and Kennedy).
#[derive(Clone, Debug)]
pub(crate) struct Dominators {
    pub rpo: Vec<usize>,
    /// Position of each node in `rpo`, `usize::MAX` when unreachable.
    pub position: Vec<usize>,
    pub idom: Vec<Option<usize>>,
}

impl Dominators {
    pub(crate) fn compute(graph: &Graph) -> Dominators {
        let rpo = graph.reverse_postorder();
        let mut position = vec![usize::MAX; graph.len()];
        for (index, node) in rpo.iter().enumerate() {
            position[*node] = index;
        }
        let preds = graph.predecessors();
        let mut idom: Vec<Option<usize>> = vec![None; graph.len()];
        idom[graph.entry] = Some(graph.entry);
        let mut changed = true;
        while changed {
            changed = false;
            for &node in rpo.iter().skip(1) {
                let mut candidate: Option<usize> = None;
                for &pred in &preds[node] {
                    if idom[pred].is_none() {
                        continue;
                    }
                    candidate = Some(match candidate {
                        None => pred,
                        Some(current) => intersect(&idom, &position, pred, current),
                    });
                }
                if candidate.is_some() && idom[node] != candidate {
                    idom[node] = candidate;
                    changed = true;
                }
            }
        }
        Dominators {
            rpo,
            position,
            idom,
        }
    }

    pub(crate) fn dominates(&self, a: usize, b: usize) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom[current] {
                Some(parent) if parent != current => current = parent,
                _ => return false,
            }
        }
    }

    /// Immediate dominator, `None` for the entry and unreachable nodes.
    pub(crate) fn parent(&self, node: usize) -> Option<usize> {
        self.idom[node].filter(|parent| *parent != node)
    }

    pub(crate) fn children(&self) -> Vec<Vec<usize>> {
        let mut children = vec![Vec::new(); self.idom.len()];
        for node in 0..self.idom.len() {
            if let Some(parent) = self.parent(node) {
                children[parent].push(node);
            }
        }
        children
    }
}

fn intersect(idom: &[Option<usize>], position: &[usize], a: usize, b: usize) -> usize {
    let mut a = a;
    let mut b = b;
    let mut guard = HashSet::new();
    while a != b && guard.insert((a, b)) {
        while position[a] > position[b] {
            match idom[a] {
                Some(parent) => a = parent,
                None => return b,
            }
        }
        while position[b] > position[a] {
            match idom[b] {
                Some(parent) => b = parent,
                None => return a,
            }
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, LocalRef, Statement, StmtKind};

    fn var(name: &str) -> Expression {
        Expression::local(
            LocalRef {
                id: name.len(),
                name: name.to_string(),
            },
            Type::boolean(),
        )
    }

    fn node(exit: Exit, statements: Vec<Statement>) -> Node {
        Node {
            block: 0,
            start_offset: 0,
            statements,
            exit,
            exit_line: 0,
            handlers: Vec::new(),
        }
    }

    fn graph(nodes: Vec<Node>) -> Graph {
        let mut nodes = nodes;
        for (index, node) in nodes.iter_mut().enumerate() {
            node.block = index;
            node.start_offset = index as u32 * 10;
        }
        Graph::from_nodes(nodes, 0)
    }

    fn ret() -> Statement {
        Statement::new(StmtKind::Return(None), 0)
    }

    #[test]
    fn condition_chains_fold_into_logical_operators() {
        // if (!a) goto 3; if (!b) goto 3; 2: body; 3: end
        let mut graph = graph(vec![
            node(
                Exit::Branch {
                    cond: var("a").negate(),
                    then: 3,
                    otherwise: 1,
                },
                Vec::new(),
            ),
            node(
                Exit::Branch {
                    cond: var("bb").negate(),
                    then: 3,
                    otherwise: 2,
                },
                Vec::new(),
            ),
            node(Exit::Goto(3), vec![Statement::expression(var("ccc"), 0)]),
            node(Exit::Terminal, vec![ret()]),
        ]);

        graph.fold_short_circuits();

        assert_eq!(graph.len(), 3);
        match &graph.nodes[0].exit {
            Exit::Branch {
                cond,
                then,
                otherwise,
            } => {
                assert_eq!(cond.to_string(), "!a || !bb");
                assert_eq!((*then, *otherwise), (2, 1));
            }
            other => panic!("unexpected exit {other:?}"),
        }
    }

    #[test]
    fn dominators_follow_diamonds() {
        let graph = graph(vec![
            node(
                Exit::Branch {
                    cond: var("a"),
                    then: 2,
                    otherwise: 1,
                },
                vec![Statement::expression(var("x"), 0)],
            ),
            node(Exit::Goto(3), vec![Statement::expression(var("y"), 0)]),
            node(Exit::Goto(3), vec![Statement::expression(var("z"), 0)]),
            node(Exit::Terminal, vec![ret()]),
        ]);

        let dom = Dominators::compute(&graph);

        assert_eq!(dom.parent(3), Some(0));
        assert!(dom.dominates(0, 2));
        assert!(!dom.dominates(1, 3));
        assert_eq!(dom.rpo.first(), Some(&0));
    }

    #[test]
    fn two_entry_loops_are_split() {
        let mut graph = graph(vec![
            node(
                Exit::Branch {
                    cond: var("a"),
                    then: 2,
                    otherwise: 1,
                },
                vec![Statement::expression(var("x"), 0)],
            ),
            node(Exit::Goto(2), vec![Statement::expression(var("y"), 0)]),
            node(
                Exit::Branch {
                    cond: var("bb"),
                    then: 1,
                    otherwise: 3,
                },
                vec![Statement::expression(var("z"), 0)],
            ),
            node(Exit::Terminal, vec![ret()]),
        ]);
        let mut diagnostics = Vec::new();

        graph.make_reducible(&mut diagnostics).expect("reducible");

        assert_eq!(graph.len(), 5);
        assert!(!diagnostics.is_empty());
        let dom = Dominators::compute(&graph);
        assert!(graph.irreducible_edge(&dom).is_none());
        assert!(matches!(
            graph.nodes[4].statements[0].kind,
            StmtKind::Expression(Expression {
                kind: ExprKind::Local(_),
                ..
            })
        ));
    }
}
