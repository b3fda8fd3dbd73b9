//! Arena-indexed CFG implementing [`FlowGraph`]

use super::{BlockId, BlockOrder, ExprId, ExprSummary, FlowGraph, RefSummary, StmtId};
use crate::md::MdSet;

/// Basic block in the control flow graph
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Id of this block
    pub id: BlockId,
    /// Statements in execution order
    pub statements: Vec<StmtId>,
    /// Successor blocks
    pub successors: Vec<BlockId>,
    /// Predecessor blocks
    pub predecessors: Vec<BlockId>,
}

impl BasicBlock {
    /// Create a new empty basic block
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            statements: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Statement {
    block: BlockId,
    summary: Option<RefSummary>,
    exprs: Vec<ExprId>,
}

/// Complete CFG with statements and expressions
///
/// The first block added is the entry unless [`Cfg::set_entry`] says otherwise.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    blocks: Vec<BasicBlock>,
    stmts: Vec<Statement>,
    exprs: Vec<ExprSummary>,
    entry: u32,
}

impl Cfg {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an empty block
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id));
        id
    }

    /// Chooses the entry block
    pub fn set_entry(&mut self, block: BlockId) {
        self.entry = block.0;
    }

    /// Adds the edge `from -> to`
    ///
    /// Endpoints that do not exist are still recorded on the side that does, so a dangling
    /// edge stays visible to validation.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        if let Some(block) = self.blocks.get_mut(from.0 as usize) {
            block.successors.push(to);
        }
        if let Some(block) = self.blocks.get_mut(to.0 as usize) {
            block.predecessors.push(from);
        }
    }

    /// Appends a statement with the given memory references to `block`
    pub fn add_stmt(&mut self, block: BlockId, summary: RefSummary) -> StmtId {
        self.push_stmt(block, Some(summary), Vec::new())
    }

    /// Appends a statement that evaluates `exprs` and then performs `summary`'s accesses
    pub fn add_stmt_with_exprs(
        &mut self,
        block: BlockId,
        summary: Option<RefSummary>,
        exprs: &[ExprId],
    ) -> StmtId {
        self.push_stmt(block, summary, exprs.to_vec())
    }

    /// Registers an expression reading `used_md`
    pub fn add_expr(&mut self, used_md: MdSet) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(ExprSummary { used_md });
        id
    }

    /// Looks up a block
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0 as usize)
    }

    /// All blocks in creation order
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Block holding `stmt`
    pub fn block_of(&self, stmt: StmtId) -> Option<BlockId> {
        self.stmts.get(stmt.0 as usize).map(|s| s.block)
    }

    /// Number of statements across all blocks
    pub fn stmt_count(&self) -> usize {
        self.stmts.len()
    }

    /// Reverse postorder of the blocks reachable from the entry
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let n = self.blocks.len();
        if self.entry as usize >= n {
            return Vec::new();
        }

        let mut visited = vec![false; n];
        let mut postorder = Vec::with_capacity(n);
        // (block index, next successor to visit)
        let mut stack: Vec<(usize, usize)> = vec![(self.entry as usize, 0)];
        visited[self.entry as usize] = true;

        while let Some((b, next)) = stack.last_mut() {
            let block = &self.blocks[*b];
            if let Some(succ) = block.successors.get(*next) {
                *next += 1;
                let s = succ.0 as usize;
                if s < n && !visited[s] {
                    visited[s] = true;
                    stack.push((s, 0));
                }
            } else {
                postorder.push(block.id);
                stack.pop();
            }
        }

        postorder.reverse();
        postorder
    }

    fn push_stmt(
        &mut self,
        block: BlockId,
        summary: Option<RefSummary>,
        exprs: Vec<ExprId>,
    ) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        if let Some(b) = self.blocks.get_mut(block.0 as usize) {
            b.statements.push(id);
        }
        self.stmts.push(Statement {
            block,
            summary,
            exprs,
        });
        id
    }
}

impl FlowGraph for Cfg {
    fn entry(&self) -> BlockId {
        BlockId(self.entry)
    }

    fn block_order(&self, order: BlockOrder) -> Vec<BlockId> {
        match order {
            BlockOrder::ReversePostorder => self.reverse_postorder(),
            BlockOrder::Arbitrary => self.blocks.iter().map(|b| b.id).collect(),
        }
    }

    fn predecessors(&self, block: BlockId) -> &[BlockId] {
        self.block(block)
            .map(|b| b.predecessors.as_slice())
            .unwrap_or_default()
    }

    fn successors(&self, block: BlockId) -> &[BlockId] {
        self.block(block)
            .map(|b| b.successors.as_slice())
            .unwrap_or_default()
    }

    fn statements(&self, block: BlockId) -> &[StmtId] {
        self.block(block)
            .map(|b| b.statements.as_slice())
            .unwrap_or_default()
    }

    fn ref_summary(&self, stmt: StmtId) -> Option<&RefSummary> {
        self.stmts.get(stmt.0 as usize)?.summary.as_ref()
    }

    fn computed_exprs(&self, stmt: StmtId) -> &[ExprId] {
        self.stmts
            .get(stmt.0 as usize)
            .map(|s| s.exprs.as_slice())
            .unwrap_or_default()
    }

    fn expr_summary(&self, expr: ExprId) -> Option<&ExprSummary> {
        self.exprs.get(expr.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::md::MdId;

    fn diamond() -> (Cfg, [BlockId; 4]) {
        let mut cfg = Cfg::new();
        let entry = cfg.add_block();
        let a = cfg.add_block();
        let b = cfg.add_block();
        let exit = cfg.add_block();
        cfg.add_edge(entry, a);
        cfg.add_edge(entry, b);
        cfg.add_edge(a, exit);
        cfg.add_edge(b, exit);
        (cfg, [entry, a, b, exit])
    }

    #[test]
    fn test_reverse_postorder_diamond() {
        let (cfg, [entry, a, b, exit]) = diamond();
        let rpo = cfg.reverse_postorder();
        assert_eq!(rpo.len(), 4);
        assert_eq!(rpo[0], entry);
        assert_eq!(rpo[3], exit);
        assert!(rpo.contains(&a) && rpo.contains(&b));
    }

    #[test]
    fn test_rpo_skips_unreachable() {
        let (mut cfg, [_, _, _, exit]) = diamond();
        let dead = cfg.add_block();
        cfg.add_edge(dead, exit);
        assert!(!cfg.reverse_postorder().contains(&dead));
        assert!(cfg.block_order(BlockOrder::Arbitrary).contains(&dead));
    }

    #[test]
    fn test_rpo_with_loop() {
        let mut cfg = Cfg::new();
        let entry = cfg.add_block();
        let header = cfg.add_block();
        let body = cfg.add_block();
        let exit = cfg.add_block();
        cfg.add_edge(entry, header);
        cfg.add_edge(header, body);
        cfg.add_edge(body, header);
        cfg.add_edge(header, exit);
        assert_eq!(cfg.reverse_postorder()[..2], [entry, header]);
    }

    #[test]
    fn test_statements_and_summaries() {
        let (mut cfg, [entry, a, ..]) = diamond();
        let e = cfg.add_expr([MdId(3)].into_iter().collect());
        let s0 = cfg.add_stmt(entry, RefSummary::must(MdId(3)));
        let s1 = cfg.add_stmt_with_exprs(a, None, &[e]);

        assert_eq!(cfg.statements(entry), &[s0]);
        assert_eq!(cfg.block_of(s1), Some(a));
        assert_eq!(cfg.ref_summary(s0).and_then(|s| s.must_def), Some(MdId(3)));
        assert!(cfg.ref_summary(s1).is_none());
        assert_eq!(cfg.computed_exprs(s1), &[e]);
        assert!(cfg.expr_summary(ExprId(9)).is_none());
        assert!(cfg.successors(BlockId(40)).is_empty());
    }
}
