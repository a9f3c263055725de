//! Places the nodes of a reducible graph into nested statements.
//!
//! Every node's code ends in an explicit jump (`break`, `continue`, `return`, `throw` or the
//! inlined code of its only successor), so a node can be placed anywhere its jumps can still
//! reach their labels. Loops and protected regions open at their head; nodes leaving a region
//! follow it inside labeled blocks, and merge points become labeled blocks around the code of
//! their immediate dominator.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::trace;

use crate::ast::{
    visit, CaseLabel, CatchClause, ExprKind, Expression, Label, LocalRef, Statement, StmtKind,
    SwitchCase,
};
use crate::error::ReconstructError;
use crate::resolver::TypeResolver;
use crate::synth::TEMP_BASE;
use crate::types::Type;

use super::graph::{Dominators, Exit, Graph};

/// First id of synthetic catch variables.
const CATCH_BASE: usize = TEMP_BASE * 3;

pub(crate) fn block_label(node: usize) -> Label {
    Label(3 * node as u32)
}

pub(crate) fn loop_label(node: usize) -> Label {
    Label(3 * node as u32 + 1)
}

pub(crate) fn switch_label(node: usize) -> Label {
    Label(3 * node as u32 + 2)
}

/// Emits the whole method body starting at the graph entry.
pub(crate) fn emit(graph: &Graph, resolver: &TypeResolver) -> Result<Vec<Statement>, ReconstructError> {
    let layout = Layout::compute(graph)?;
    let mut emitter = Emitter {
        graph,
        layout: &layout,
        resolver,
        opened: vec![false; layout.regions.len()],
        emitted: (0..graph.len()).map(|node| graph.is_removed(node)).collect(),
        frames: Vec::new(),
        finally: vec![None; layout.regions.len()],
        sentinels: 0,
    };
    let body = emitter.code_for(graph.entry)?;
    if let Some(lost) = emitter.emitted.iter().position(|emitted| !emitted) {
        return Err(ReconstructError::malformed(format!(
            "code at offset {} has no place in the structured body",
            graph.nodes[lost].start_offset
        )));
    }
    Ok(body)
}

#[derive(Clone, Debug)]
struct CatchGroup {
    entry: usize,
    /// Catch types in table order; `None` catches anything.
    types: Vec<Option<String>>,
    first_index: usize,
}

#[derive(Clone, Debug)]
enum RegionKind {
    Loop,
    Try(Vec<CatchGroup>),
}

#[derive(Clone, Debug)]
struct Region {
    kind: RegionKind,
    head: usize,
    nodes: BTreeSet<usize>,
}

impl Region {
    fn is_try(&self) -> bool {
        matches!(self.kind, RegionKind::Try(_))
    }
}

/// Placement decisions computed once per graph.
struct Layout {
    back_edges: HashSet<(usize, usize)>,
    regions: Vec<Region>,
    /// Regions opening at each node, outermost first.
    regions_at: Vec<Vec<usize>>,
    /// Nodes placed after each region, latest first.
    followers: Vec<Vec<usize>>,
    labeled: Vec<bool>,
    switch_follow: Vec<Option<usize>>,
    owned_case: Vec<bool>,
    /// Labeled nodes placed after the code of their immediate dominator, latest first.
    label_children: Vec<Vec<usize>>,
}

impl Layout {
    fn compute(graph: &Graph) -> Result<Layout, ReconstructError> {
        let count = graph.len();
        let dom = Dominators::compute(graph);
        let preds = graph.predecessors();
        let children = dom.children();
        let by_rpo_desc = |nodes: &mut Vec<usize>| {
            nodes.sort_by_key(|node| std::cmp::Reverse(dom.position[*node]));
        };

        let mut back_edges = HashSet::new();
        for node in 0..count {
            for target in graph.nodes[node].exit.targets() {
                if dom.dominates(target, node) {
                    back_edges.insert((node, target));
                }
            }
        }

        let mut regions = Vec::new();
        let mut loops: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for (source, header) in &back_edges {
            let body = loops.entry(*header).or_insert_with(|| BTreeSet::from([*header]));
            let mut stack = vec![*source];
            while let Some(node) = stack.pop() {
                if !body.insert(node) {
                    continue;
                }
                stack.extend(
                    preds[node]
                        .iter()
                        .copied()
                        .filter(|pred| dom.dominates(*header, *pred)),
                );
            }
        }
        for (head, nodes) in loops {
            regions.push(Region {
                kind: RegionKind::Loop,
                head,
                nodes,
            });
        }
        regions.extend(try_regions(graph, &dom)?);
        check_nesting(graph, &regions)?;

        let mut regions_at = vec![Vec::new(); count];
        for (index, region) in regions.iter().enumerate() {
            regions_at[region.head].push(index);
        }
        for at in &mut regions_at {
            at.sort_by_key(|index| {
                (
                    std::cmp::Reverse(regions[*index].nodes.len()),
                    !regions[*index].is_try(),
                )
            });
        }

        let mut hoisted = vec![false; count];
        let mut followers = vec![Vec::new(); regions.len()];
        for &node in &dom.rpo {
            if node == graph.entry || graph.is_handler_entry(node) {
                continue;
            }
            let Some(parent) = dom.parent(node) else {
                continue;
            };
            let outermost = regions
                .iter()
                .enumerate()
                .filter(|(_, region)| region.nodes.contains(&parent) && !region.nodes.contains(&node))
                .max_by_key(|(_, region)| region.nodes.len())
                .map(|(index, _)| index);
            if let Some(region) = outermost {
                hoisted[node] = true;
                followers[region].push(node);
            }
        }
        followers.iter_mut().for_each(by_rpo_desc);

        let mut incoming = vec![0usize; count];
        for node in 0..count {
            let mut targets = graph.nodes[node].exit.targets();
            if matches!(graph.nodes[node].exit, Exit::Switch { .. }) {
                let distinct: BTreeSet<usize> = targets.into_iter().collect();
                targets = distinct.into_iter().collect();
            }
            for target in targets {
                if !back_edges.contains(&(node, target)) {
                    incoming[target] += 1;
                }
            }
        }
        let merge: Vec<bool> = incoming.iter().map(|count| *count >= 2).collect();

        let mut switch_follow = vec![None; count];
        let mut owned_case = vec![false; count];
        for node in 0..count {
            let Exit::Switch { cases, default, .. } = &graph.nodes[node].exit else {
                continue;
            };
            let follow = children[node]
                .iter()
                .copied()
                .filter(|child| !hoisted[*child] && !graph.is_handler_entry(*child))
                .filter(|child| merge[*child] || child == default)
                .max_by_key(|child| dom.position[*child]);
            switch_follow[node] = follow;
            for target in cases.iter().map(|(_, target)| *target).chain([*default]) {
                if dom.parent(target) == Some(node)
                    && !hoisted[target]
                    && Some(target) != follow
                    && !graph.is_handler_entry(target)
                    && !back_edges.contains(&(node, target))
                {
                    owned_case[target] = true;
                }
            }
        }
        let is_follow: HashSet<usize> = switch_follow.iter().flatten().copied().collect();
        let labeled: Vec<bool> = (0..count)
            .map(|node| {
                (merge[node] || hoisted[node] || is_follow.contains(&node)) && !owned_case[node]
            })
            .collect();

        let mut label_children: Vec<Vec<usize>> = children
            .iter()
            .map(|kids| {
                kids.iter()
                    .copied()
                    .filter(|kid| {
                        labeled[*kid]
                            && !hoisted[*kid]
                            && !owned_case[*kid]
                            && !graph.is_handler_entry(*kid)
                    })
                    .collect()
            })
            .collect();
        label_children.iter_mut().for_each(by_rpo_desc);

        Ok(Layout {
            back_edges,
            regions,
            regions_at,
            followers,
            labeled,
            switch_follow,
            owned_case,
            label_children,
        })
    }
}

/// One region per distinct protected node set; handlers sharing a set share a `try`.
fn try_regions(graph: &Graph, dom: &Dominators) -> Result<Vec<Region>, ReconstructError> {
    let mut by_entry: BTreeMap<usize, CatchGroup> = BTreeMap::new();
    for (index, entry) in graph.handler_entry.iter().enumerate() {
        let Some(entry) = *entry else {
            continue;
        };
        let group = by_entry.entry(entry).or_insert_with(|| CatchGroup {
            entry,
            types: Vec::new(),
            first_index: index,
        });
        let ty = graph.catch_types.get(index).cloned().flatten();
        if !group.types.contains(&ty) {
            group.types.push(ty);
        }
    }

    let mut by_nodes: BTreeMap<Vec<usize>, Vec<CatchGroup>> = BTreeMap::new();
    for group in by_entry.into_values() {
        let protected: Vec<usize> = (0..graph.len())
            .filter(|node| {
                graph.nodes[*node]
                    .handlers
                    .iter()
                    .any(|handler| graph.handler_entry[*handler] == Some(group.entry))
                    && !dom.dominates(group.entry, *node)
            })
            .collect();
        if protected.is_empty() {
            continue;
        }
        by_nodes.entry(protected).or_default().push(group);
    }

    let mut regions = Vec::new();
    for (protected, mut groups) in by_nodes {
        groups.sort_by_key(|group| group.first_index);
        let head = protected
            .iter()
            .copied()
            .filter(|node| dom.position[*node] != usize::MAX)
            .min_by_key(|node| dom.position[*node])
            .ok_or_else(|| ReconstructError::malformed("protected range is unreachable"))?;
        if let Some(stray) = protected.iter().find(|node| !dom.dominates(head, **node)) {
            return Err(ReconstructError::malformed(format!(
                "protected code at offset {} is entered other than through offset {}",
                graph.nodes[*stray].start_offset, graph.nodes[head].start_offset
            )));
        }
        regions.push(Region {
            kind: RegionKind::Try(groups),
            head,
            nodes: protected.into_iter().collect(),
        });
    }
    Ok(regions)
}

fn check_nesting(graph: &Graph, regions: &[Region]) -> Result<(), ReconstructError> {
    for (index, first) in regions.iter().enumerate() {
        for second in &regions[index + 1..] {
            let disjoint = first.nodes.is_disjoint(&second.nodes);
            if !disjoint && !first.nodes.is_subset(&second.nodes) && !second.nodes.is_subset(&first.nodes)
            {
                return Err(ReconstructError::malformed(format!(
                    "regions at offsets {} and {} overlap without nesting",
                    graph.nodes[first.head].start_offset, graph.nodes[second.head].start_offset
                )));
            }
        }
    }
    Ok(())
}

struct Emitter<'g, 'l, 'r> {
    graph: &'g Graph,
    layout: &'l Layout,
    resolver: &'r TypeResolver,
    opened: Vec<bool>,
    emitted: Vec<bool>,
    /// Case bodies being emitted: the case they fall into and the label standing for it.
    frames: Vec<(usize, Label)>,
    /// Detected `finally` code per try region.
    finally: Vec<Option<Vec<Statement>>>,
    sentinels: u32,
}

impl Emitter<'_, '_, '_> {
    fn code_for(&mut self, node: usize) -> Result<Vec<Statement>, ReconstructError> {
        let layout = self.layout;
        if let Some(region) = layout.regions_at[node]
            .iter()
            .copied()
            .find(|region| !self.opened[*region])
        {
            self.opened[region] = true;
            let inner = self.region(region)?;
            return self.nest(&layout.followers[region], inner, Some(region));
        }
        if std::mem::replace(&mut self.emitted[node], true) {
            return Err(ReconstructError::malformed(format!(
                "code at offset {} is reached from two places",
                self.graph.nodes[node].start_offset
            )));
        }
        let inner = self.node(node)?;
        self.nest(&layout.label_children[node], inner, None)
    }

    /// Wraps `inner` in one labeled block per node, each followed by that node's code.
    fn nest(
        &mut self,
        nodes: &[usize],
        inner: Vec<Statement>,
        region: Option<usize>,
    ) -> Result<Vec<Statement>, ReconstructError> {
        let mut acc = inner;
        for &node in nodes.iter().rev() {
            let mut code = self.code_for(node)?;
            if let Some(Some(finally)) = region.map(|region| &self.finally[region]) {
                strip_prefix(&mut code, &visit::normalized(finally));
            }
            let block = Statement::new(StmtKind::Block(acc), 0);
            let mut list = vec![Statement::new(
                StmtKind::Labeled {
                    label: block_label(node),
                    body: Box::new(block),
                },
                0,
            )];
            list.extend(code);
            acc = list;
        }
        Ok(acc)
    }

    fn region(&mut self, index: usize) -> Result<Vec<Statement>, ReconstructError> {
        let layout = self.layout;
        let region = &layout.regions[index];
        let head = region.head;
        let line = self.graph.nodes[head].first_line();
        match &region.kind {
            RegionKind::Loop => {
                trace!(offset = self.graph.nodes[head].start_offset, "opening loop");
                let body = self.code_for(head)?;
                let looped = Statement::new(
                    StmtKind::While {
                        cond: Expression::boolean(true),
                        body,
                    },
                    line,
                );
                Ok(vec![Statement::new(
                    StmtKind::Labeled {
                        label: loop_label(head),
                        body: Box::new(looped),
                    },
                    line,
                )])
            }
            RegionKind::Try(groups) => {
                trace!(offset = self.graph.nodes[head].start_offset, "opening try");
                let mut body = self.code_for(head)?;
                let mut catches = Vec::new();
                let mut catch_any = Vec::new();
                for group in groups {
                    let mut code = self.code_for(group.entry)?;
                    let var = catch_var(&mut code, group.entry);
                    if group.types.iter().all(Option::is_none) {
                        catch_any.push(catches.len());
                    }
                    let types = group
                        .types
                        .iter()
                        .map(|ty| match ty {
                            Some(name) => self.resolver.resolve(name),
                            None => Type::object("java/lang/Throwable"),
                        })
                        .collect();
                    catches.push(CatchClause {
                        types,
                        var,
                        body: code,
                    });
                }
                let finally = match catch_any.as_slice() {
                    [single] => finally_code(&catches[*single]).map(|code| (*single, code)),
                    _ => None,
                };
                let Some((clause, finally)) = finally else {
                    return Ok(vec![Statement::new(
                        StmtKind::Try {
                            body,
                            catches,
                            finally: None,
                        },
                        line,
                    )]);
                };
                catches.remove(clause);
                let pattern = visit::normalized(&finally);
                strip_before_jumps(&mut body, &pattern);
                strip_suffix(&mut body, &pattern);
                for clause in &mut catches {
                    strip_before_jumps(&mut clause.body, &pattern);
                    strip_suffix(&mut clause.body, &pattern);
                }
                if finally.is_empty() && catches.is_empty() {
                    return Ok(body);
                }
                self.finally[index] = Some(finally.clone());
                Ok(vec![Statement::new(
                    StmtKind::Try {
                        body,
                        catches,
                        finally: Some(finally),
                    },
                    line,
                )])
            }
        }
    }

    fn node(&mut self, index: usize) -> Result<Vec<Statement>, ReconstructError> {
        let graph = self.graph;
        let node = &graph.nodes[index];
        let mut code = node.statements.clone();
        let line = node.exit_line;
        match &node.exit {
            Exit::Goto(target) => code.extend(self.branch(index, *target)?),
            Exit::Branch {
                cond,
                then,
                otherwise,
            } => {
                let fallthrough = self.branch(index, *otherwise)?;
                let taken = self.branch(index, *then)?;
                code.push(Statement::new(
                    StmtKind::If {
                        cond: cond.clone().negate(),
                        then: fallthrough,
                        otherwise: taken,
                    },
                    line,
                ));
            }
            Exit::Switch {
                selector,
                cases,
                default,
            } => code.extend(self.switch(index, selector.clone(), cases, *default)?),
            Exit::Terminal => {}
        }
        Ok(code)
    }

    fn switch(
        &mut self,
        index: usize,
        selector: Expression,
        cases: &[(i32, usize)],
        default: usize,
    ) -> Result<Vec<Statement>, ReconstructError> {
        let layout = self.layout;
        let line = self.graph.nodes[index].exit_line;
        let label = switch_label(index);
        let follow = layout.switch_follow[index];
        let mut targets: Vec<usize> = Vec::new();
        for target in cases
            .iter()
            .map(|(_, target)| *target)
            .filter(|target| *target != default)
            .chain((Some(default) != follow).then_some(default))
        {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets.sort_by_key(|target| (self.graph.nodes[*target].start_offset, *target));

        let mut arms = Vec::with_capacity(targets.len());
        for (position, &target) in targets.iter().enumerate() {
            let mut labels: Vec<CaseLabel> = cases
                .iter()
                .filter(|(_, case)| *case == target && target != default)
                .map(|(value, _)| CaseLabel::Int(*value))
                .collect();
            if target == default {
                labels.push(CaseLabel::Default);
            }
            let body = if Some(target) == follow {
                vec![Statement::new(StmtKind::Break(Some(label)), line)]
            } else if layout.owned_case[target] && !layout.back_edges.contains(&(index, target)) {
                let next = targets
                    .get(position + 1)
                    .copied()
                    .filter(|next| layout.owned_case[*next]);
                let sentinel = Label(u32::MAX - self.sentinels);
                self.sentinels += 1;
                if let Some(next) = next {
                    self.frames.push((next, sentinel));
                }
                let code = self.code_for(target);
                if next.is_some() {
                    self.frames.pop();
                }
                let mut code = code?;
                strip_tail(&mut code, &|kind| {
                    matches!(kind, StmtKind::Break(Some(label)) if *label == sentinel)
                });
                if visit::references_label(&code, sentinel) {
                    return Err(ReconstructError::malformed(format!(
                        "case at offset {} falls into the next case from inside a statement",
                        self.graph.nodes[target].start_offset
                    )));
                }
                code
            } else {
                self.branch(index, target)?
            };
            arms.push(SwitchCase { labels, body });
        }
        let switch = Statement::new(
            StmtKind::Switch {
                selector,
                cases: arms,
            },
            line,
        );
        let mut code = vec![Statement::new(
            StmtKind::Labeled {
                label,
                body: Box::new(switch),
            },
            line,
        )];
        if let Some(follow) = follow {
            code.extend(self.branch(index, follow)?);
        }
        Ok(code)
    }

    /// Code transferring control from `from` to `to`.
    fn branch(&mut self, from: usize, to: usize) -> Result<Vec<Statement>, ReconstructError> {
        let line = self.graph.nodes[from].exit_line;
        if self.layout.back_edges.contains(&(from, to)) {
            return Ok(vec![Statement::new(
                StmtKind::Continue(Some(loop_label(to))),
                line,
            )]);
        }
        if let Some((_, sentinel)) = self.frames.iter().rev().find(|(next, _)| *next == to) {
            return Ok(vec![Statement::new(StmtKind::Break(Some(*sentinel)), line)]);
        }
        if self.layout.labeled[to] {
            return Ok(vec![Statement::new(
                StmtKind::Break(Some(block_label(to))),
                line,
            )]);
        }
        self.code_for(to)
    }
}

/// Removes the `v = <caught exception>` store opening a handler, or invents a variable.
fn catch_var(code: &mut Vec<Statement>, entry: usize) -> LocalRef {
    if let Some(var) = take_caught_store(code) {
        return var;
    }
    let var = LocalRef {
        id: CATCH_BASE + entry,
        name: format!("ex{entry}"),
    };
    visit::map_exprs_in(code, &mut |expr| {
        if matches!(expr.kind, ExprKind::CaughtException) {
            *expr = Expression::local(var.clone(), expr.ty.clone());
        }
    });
    var
}

fn take_caught_store(code: &mut Vec<Statement>) -> Option<LocalRef> {
    let first = code.first_mut()?;
    match &mut first.kind {
        StmtKind::Expression(Expression {
            kind: ExprKind::Assign {
                op: None,
                target,
                value,
            },
            ..
        }) if matches!(value.kind, ExprKind::CaughtException) => {
            let var = target.as_local()?.clone();
            code.remove(0);
            Some(var)
        }
        StmtKind::Block(inner) => take_caught_store(inner),
        StmtKind::Labeled { body, .. } => match &mut body.kind {
            StmtKind::Block(inner) => take_caught_store(inner),
            _ => None,
        },
        _ => None,
    }
}

/// `finally` code of a catch-any clause shaped `F; throw var;`.
fn finally_code(clause: &CatchClause) -> Option<Vec<Statement>> {
    let (last, code) = clause.body.split_last()?;
    let StmtKind::Throw(thrown) = &last.kind else {
        return None;
    };
    if thrown.as_local().is_none_or(|var| var.id != clause.var.id)
        || visit::stmts_reference(code, clause.var.id)
    {
        return None;
    }
    Some(code.to_vec())
}

fn starts_with(stmts: &[Statement], pattern: &[Statement]) -> bool {
    stmts.len() >= pattern.len() && visit::normalized(&stmts[..pattern.len()]) == pattern
}

/// Drops a leading copy of `pattern`, looking through opening labeled blocks.
fn strip_prefix(code: &mut Vec<Statement>, pattern: &[Statement]) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if starts_with(code, pattern) {
        code.drain(..pattern.len());
        return true;
    }
    match code.first_mut().map(|stmt| &mut stmt.kind) {
        Some(StmtKind::Block(inner)) => strip_prefix(inner, pattern),
        Some(StmtKind::Labeled { body, .. }) => match &mut body.kind {
            StmtKind::Block(inner) => strip_prefix(inner, pattern),
            _ => false,
        },
        _ => false,
    }
}

fn strip_suffix(code: &mut Vec<Statement>, pattern: &[Statement]) {
    if pattern.is_empty() || code.len() < pattern.len() {
        return;
    }
    let start = code.len() - pattern.len();
    if visit::normalized(&code[start..]) == pattern {
        code.truncate(start);
    }
}

/// Drops the inlined `finally` copies in front of `return`, `break` and `continue`.
fn strip_before_jumps(code: &mut Vec<Statement>, pattern: &[Statement]) {
    if pattern.is_empty() {
        return;
    }
    visit::map_lists(code, &mut |list| {
        let mut index = pattern.len();
        while index < list.len() {
            let jump = matches!(
                list[index].kind,
                StmtKind::Return(_) | StmtKind::Break(_) | StmtKind::Continue(_)
            );
            if jump && visit::normalized(&list[index - pattern.len()..index]) == pattern {
                list.drain(index - pattern.len()..index);
                index = index - pattern.len() + 1;
            } else {
                index += 1;
            }
        }
    });
}

/// Removes jumps matching `is_jump` that end the list, looking into the statements that
/// end it without entering loops. Returns whether anything was removed.
pub(crate) fn strip_tail(code: &mut Vec<Statement>, is_jump: &dyn Fn(&StmtKind) -> bool) -> bool {
    let mut changed = false;
    while code.last().is_some_and(|stmt| is_jump(&stmt.kind)) {
        code.pop();
        changed = true;
    }
    let Some(last) = code.last_mut() else {
        return changed;
    };
    if visit::is_loop(last) {
        return changed;
    }
    let cases = match &mut last.kind {
        StmtKind::Switch { cases, .. } => Some(cases),
        StmtKind::Labeled { body, .. } => match &mut body.kind {
            StmtKind::Switch { cases, .. } => Some(cases),
            _ => None,
        },
        _ => None,
    };
    if let Some(cases) = cases {
        if let Some(case) = cases.last_mut() {
            changed |= strip_tail(&mut case.body, is_jump);
        }
        return changed;
    }
    match &mut last.kind {
        // A jump ending `finally` would also swallow exceptions.
        StmtKind::Try { body, catches, .. } => {
            changed |= strip_tail(body, is_jump);
            for clause in catches {
                changed |= strip_tail(&mut clause.body, is_jump);
            }
        }
        StmtKind::If { .. }
        | StmtKind::Block(_)
        | StmtKind::Labeled { .. }
        | StmtKind::Synchronized { .. } => {
            for list in visit::child_lists_mut(last) {
                changed |= strip_tail(list, is_jump);
            }
        }
        _ => {}
    }
    changed
}
