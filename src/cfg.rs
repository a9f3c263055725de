use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::error::ReconstructError;
use crate::ir::{ExceptionHandler, Instruction, Op};

/// Straight-line run of instructions with a single entry.
#[derive(Clone, Debug, PartialEq)]
pub struct BasicBlock {
    pub index: usize,
    pub start_offset: u32,
    /// Exclusive end offset.
    pub end_offset: u32,
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn last(&self) -> Option<&Instruction> {
        self.instructions.last()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum EdgeKind {
    FallThrough,
    Branch,
    Exception,
}

/// Edge between two blocks; exception edges carry the handler entry they came from.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct FlowEdge {
    pub from: usize,
    pub to: usize,
    pub kind: EdgeKind,
    /// Catch type of an exception edge, `None` for catch-any.
    pub catch_type: Option<String>,
    /// Index into [`ControlFlowGraph::handlers`] for exception edges.
    pub handler: Option<usize>,
}

/// Basic blocks of one method plus their edges. Read-only once built.
#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    pub blocks: Vec<BasicBlock>,
    pub edges: Vec<FlowEdge>,
    pub entry: usize,
    pub handlers: Vec<ExceptionHandler>,
}

/// Build a control flow graph from decoded instructions and the exception table.
pub fn build(
    instructions: &[Instruction],
    code_length: u32,
    handlers: &[ExceptionHandler],
) -> Result<ControlFlowGraph, ReconstructError> {
    if instructions.is_empty() {
        return Err(ReconstructError::malformed("method has no instructions"));
    }
    let starts: HashSet<u32> = instructions.iter().map(|inst| inst.offset).collect();
    let is_start = |offset: u32| starts.contains(&offset);

    let mut leaders = BTreeSet::new();
    leaders.insert(instructions[0].offset);
    for (position, inst) in instructions.iter().enumerate() {
        if matches!(inst.op, Op::Jsr(_) | Op::Ret(_)) {
            return Err(ReconstructError::malformed(format!(
                "subroutine instruction at offset {}",
                inst.offset
            )));
        }
        for target in inst.op.branch_targets() {
            if !is_start(target) {
                return Err(ReconstructError::malformed(format!(
                    "branch target {} at offset {} is not an instruction",
                    target, inst.offset
                )));
            }
            leaders.insert(target);
        }
        if inst.op.ends_block() {
            if let Some(next) = instructions.get(position + 1) {
                leaders.insert(next.offset);
            }
        }
    }
    for handler in handlers {
        let end_ok = is_start(handler.end_pc) || handler.end_pc == code_length;
        if !is_start(handler.start_pc) || !end_ok || handler.start_pc >= handler.end_pc {
            return Err(ReconstructError::malformed(format!(
                "exception range [{}, {}) does not cover instructions",
                handler.start_pc, handler.end_pc
            )));
        }
        if !is_start(handler.handler_pc) {
            return Err(ReconstructError::malformed(format!(
                "exception handler {} is not an instruction",
                handler.handler_pc
            )));
        }
        leaders.insert(handler.start_pc);
        leaders.insert(handler.handler_pc);
        if handler.end_pc < code_length {
            leaders.insert(handler.end_pc);
        }
    }

    let leader_list: Vec<u32> = leaders.into_iter().collect();
    let mut blocks: Vec<BasicBlock> = Vec::with_capacity(leader_list.len());
    for (index, start) in leader_list.iter().enumerate() {
        let end = leader_list.get(index + 1).copied().unwrap_or(code_length);
        blocks.push(BasicBlock {
            index,
            start_offset: *start,
            end_offset: end,
            instructions: instructions
                .iter()
                .filter(|inst| inst.offset >= *start && inst.offset < end)
                .cloned()
                .collect(),
        });
    }

    let block_at = |offset: u32| {
        blocks
            .binary_search_by_key(&offset, |block| block.start_offset)
            .ok()
    };

    let mut edges = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |edge: FlowEdge, edges: &mut Vec<FlowEdge>| {
        if seen.insert(edge.clone()) {
            edges.push(edge);
        }
    };
    for block in &blocks {
        let Some(last_inst) = block.last() else {
            continue;
        };
        for target in last_inst.op.branch_targets() {
            let to = block_at(target).ok_or_else(|| {
                ReconstructError::malformed(format!("no block starts at {}", target))
            })?;
            push(
                FlowEdge {
                    from: block.index,
                    to,
                    kind: EdgeKind::Branch,
                    catch_type: None,
                    handler: None,
                },
                &mut edges,
            );
        }
        if !last_inst.op.is_unconditional_transfer() {
            if block.index + 1 >= blocks.len() {
                return Err(ReconstructError::malformed(format!(
                    "execution falls off the end of the code after offset {}",
                    last_inst.offset
                )));
            }
            push(
                FlowEdge {
                    from: block.index,
                    to: block.index + 1,
                    kind: EdgeKind::FallThrough,
                    catch_type: None,
                    handler: None,
                },
                &mut edges,
            );
        }
    }
    for (handler_index, handler) in handlers.iter().enumerate() {
        let to = block_at(handler.handler_pc).ok_or_else(|| {
            ReconstructError::malformed(format!("no block starts at {}", handler.handler_pc))
        })?;
        for block in &blocks {
            if block.start_offset < handler.end_pc && handler.start_pc < block.end_offset {
                push(
                    FlowEdge {
                        from: block.index,
                        to,
                        kind: EdgeKind::Exception,
                        catch_type: handler.catch_type.clone(),
                        handler: Some(handler_index),
                    },
                    &mut edges,
                );
            }
        }
    }

    Ok(ControlFlowGraph {
        blocks,
        edges,
        entry: 0,
        handlers: handlers.to_vec(),
    })
}

impl ControlFlowGraph {
    pub fn block_at(&self, offset: u32) -> Option<usize> {
        self.blocks
            .binary_search_by_key(&offset, |block| block.start_offset)
            .ok()
    }

    pub fn out_edges(&self, block: usize) -> impl Iterator<Item = &FlowEdge> {
        self.edges.iter().filter(move |edge| edge.from == block)
    }

    /// Distinct successors over all edge kinds, in edge order.
    pub fn successors(&self, block: usize) -> Vec<usize> {
        let mut result = Vec::new();
        for edge in self.out_edges(block) {
            if !result.contains(&edge.to) {
                result.push(edge.to);
            }
        }
        result
    }

    pub fn predecessors(&self, block: usize) -> Vec<usize> {
        let mut result = Vec::new();
        for edge in self.edges.iter().filter(|edge| edge.to == block) {
            if !result.contains(&edge.from) {
                result.push(edge.from);
            }
        }
        result
    }

    /// Handler entries protecting a block, innermost first.
    ///
    /// Narrower ranges come before the ranges enclosing them; equal ranges keep table
    /// order except that catch-any entries go last.
    pub fn handlers_for(&self, block: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .out_edges(block)
            .filter_map(|edge| edge.handler)
            .collect();
        indices.sort_by_key(|index| {
            let handler = &self.handlers[*index];
            (
                handler.end_pc - handler.start_pc,
                handler.start_pc,
                handler.end_pc,
                handler.catch_type.is_none(),
                *index,
            )
        });
        indices.dedup();
        indices
    }

    /// Reachability from the entry block over all edges, indexed by block.
    pub fn reachable(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.blocks.len()];
        let mut stack = vec![self.entry];
        while let Some(block) = stack.pop() {
            if reachable[block] {
                continue;
            }
            reachable[block] = true;
            stack.extend(self.successors(block));
        }
        reachable
    }

    /// Reachable blocks in reverse postorder of a depth-first walk from the entry.
    pub fn reverse_postorder(&self) -> Vec<usize> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order = Vec::new();
        let mut stack: Vec<(usize, Vec<usize>)> = Vec::new();
        visited[self.entry] = true;
        let mut successors = self.successors(self.entry);
        successors.reverse();
        stack.push((self.entry, successors));
        while let Some((block, pending)) = stack.last_mut() {
            match pending.pop() {
                Some(next) => {
                    if !visited[next] {
                        visited[next] = true;
                        let mut successors = self.successors(next);
                        successors.reverse();
                        stack.push((next, successors));
                    }
                }
                None => {
                    order.push(*block);
                    stack.pop();
                }
            }
        }
        order.reverse();
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IfCond, Relation};
    use crate::testing::{iconst, iload, instructions, ireturn, istore, vreturn};

    fn nops_until(end: u32) -> Vec<Instruction> {
        (0..end / 5)
            .map(|step| Instruction {
                offset: step * 5,
                op: Op::Nop,
            })
            .chain(std::iter::once(Instruction {
                offset: end,
                op: Op::Return(None),
            }))
            .collect()
    }

    fn handler(start_pc: u32, end_pc: u32, handler_pc: u32, catch_type: Option<&str>) -> ExceptionHandler {
        ExceptionHandler {
            start_pc,
            end_pc,
            handler_pc,
            catch_type: catch_type.map(str::to_string),
        }
    }

    #[test]
    fn nested_handlers_are_ordered_innermost_first() {
        let code = nops_until(140);
        let table = vec![
            handler(10, 80, 100, Some("java/lang/Exception")),
            handler(20, 35, 110, Some("java/io/IOException")),
            handler(20, 25, 120, Some("java/io/FileNotFoundException")),
            handler(40, 50, 130, Some("java/lang/RuntimeException")),
        ];

        let graph = build(&code, 141, &table).expect("build cfg");
        let block = graph.block_at(20).expect("block at 20");
        let order: Vec<u32> = graph
            .handlers_for(block)
            .into_iter()
            .map(|index| graph.handlers[index].handler_pc)
            .collect();

        assert_eq!(order, vec![120, 110, 100]);
    }

    #[test]
    fn catch_any_goes_after_typed_handler_on_same_range() {
        let code = nops_until(60);
        let table = vec![
            handler(10, 30, 40, None),
            handler(10, 30, 50, Some("java/lang/Exception")),
        ];

        let graph = build(&code, 61, &table).expect("build cfg");
        let block = graph.block_at(10).expect("block at 10");
        let order: Vec<u32> = graph
            .handlers_for(block)
            .into_iter()
            .map(|index| graph.handlers[index].handler_pc)
            .collect();

        assert_eq!(order, vec![50, 40]);
    }

    #[test]
    fn blocks_partition_the_instruction_range() {
        // 0: iload_1, 1: ifeq 5, 2: iconst_1, 3: istore_2, 4: goto 7,
        // 5: iconst_2, 6: istore_2, 7: iload_2, 8: ireturn
        let code = instructions(vec![
            iload(1),
            Op::If {
                cond: IfCond::Zero(Relation::Eq),
                target: 5,
            },
            iconst(1),
            istore(2),
            Op::Goto(7),
            iconst(2),
            istore(2),
            iload(2),
            ireturn(),
        ]);

        let graph = build(&code, 9, &[]).expect("build cfg");

        assert_eq!(graph.blocks.len(), 4);
        let mut covered = 0;
        for (index, block) in graph.blocks.iter().enumerate() {
            assert_eq!(block.index, index);
            assert_eq!(block.start_offset, covered);
            covered = block.end_offset;
        }
        assert_eq!(covered, 9);
        let instruction_count: usize = graph.blocks.iter().map(|block| block.instructions.len()).sum();
        assert_eq!(instruction_count, code.len());
        assert_eq!(graph.successors(0), vec![2, 1]);
        assert_eq!(graph.predecessors(3), vec![1, 2]);
        assert!(graph.reachable().iter().all(|reachable| *reachable));
        assert_eq!(graph.reverse_postorder().first(), Some(&0));
        assert_eq!(graph.reverse_postorder().last(), Some(&3));
    }

    #[test]
    fn exception_edges_come_from_every_protected_block() {
        // 0: iload_1, 1: ifeq 3, 2: nop, 3: return, 4: astore_2 (handler), 5: return
        let code = instructions(vec![
            iload(1),
            Op::If {
                cond: IfCond::Zero(Relation::Eq),
                target: 3,
            },
            Op::Nop,
            vreturn(),
            Op::Store(crate::ir::ValueKind::Reference, 2),
            vreturn(),
        ]);
        let table = vec![handler(0, 3, 4, None)];

        let graph = build(&code, 6, &table).expect("build cfg");
        let handler_block = graph.block_at(4).expect("handler block");
        let sources: Vec<usize> = graph
            .edges
            .iter()
            .filter(|edge| edge.kind == EdgeKind::Exception)
            .map(|edge| edge.from)
            .collect();

        assert_eq!(sources, vec![0, 1]);
        assert!(graph.edges.iter().all(|edge| edge.kind != EdgeKind::Exception
            || (edge.to == handler_block && edge.catch_type.is_none())));
    }

    #[test]
    fn unreachable_blocks_are_kept_but_flagged() {
        let code = instructions(vec![vreturn(), Op::Nop, vreturn()]);

        let graph = build(&code, 3, &[]).expect("build cfg");

        assert_eq!(graph.blocks.len(), 2);
        assert_eq!(graph.reachable(), vec![true, false]);
        assert_eq!(graph.reverse_postorder(), vec![0]);
    }

    #[test]
    fn malformed_targets_are_rejected() {
        let out_of_range = instructions(vec![Op::Goto(42)]);
        let error = build(&out_of_range, 1, &[]).expect_err("out of range");
        assert!(matches!(error, ReconstructError::MalformedControlFlow(_)));

        let bad_handler = instructions(vec![Op::Nop, vreturn()]);
        let error = build(&bad_handler, 2, &[handler(0, 1, 9, None)]).expect_err("bad handler");
        assert!(matches!(error, ReconstructError::MalformedControlFlow(_)));

        let subroutine = instructions(vec![Op::Jsr(1), vreturn()]);
        assert!(build(&subroutine, 2, &[]).is_err());

        let falls_off = instructions(vec![Op::Nop]);
        assert!(build(&falls_off, 1, &[]).is_err());
    }
}
