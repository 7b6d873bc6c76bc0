//! Available expressions and copy-propagation facts.
//!
//! Both are forward must-analyses over a candidate universe and share one
//! GEN/KILL walker; they differ only in which nodes are candidates and in
//! the kill relation:
//!
//! - An **available expression** fact says the candidate's value, computed
//!   at some earlier occurrence, is still valid. It is killed by a write
//!   to any symbol the expression reads, and imprecisely by pointer
//!   stores, calls and asm through the classifier sets.
//! - A **copy fact** `x = y` says x currently equals y. It is killed by a
//!   write to *either* symbol - a different kill relation than "does a
//!   write reach this use", which is why copy propagation is its own
//!   analysis instance and is never derived from reaching definitions.
//!
//! # Conditional branches
//!
//! A conditional branch whose tree contains a short-circuit operator knows
//! more on one outgoing edge than the other: after `if (a && b)` the
//! expression `b` has certainly been evaluated on the taken edge but maybe
//! not on the fall-through edge. Conditional blocks therefore keep *two*
//! GEN/KILL pairs, one per edge, and the solver keeps two OUT sets.
//! Within a tree the arms of a ternary or short-circuit merge
//! conservatively: a fact is generated only if both arms generate it and
//! killed if either arm may kill it.

use crate::{
    dataflow::{
        candidates::{CandidateKind, CandidateTable},
        framework::{Confluence, Direction, FlowProblem, GenKill},
        kills::KillSets,
    },
    ir::{BlockId, Expr, ExprId, Function, Transfer, UnaryOp},
    utils::BitSet,
};

/// The available-expressions problem instance for one function.
pub struct AvailableExpressions {
    table: CandidateTable,
    kills: KillSets,
    sets: Vec<GenKill>,
    cond_sets: Vec<Option<[GenKill; 2]>>,
}

impl AvailableExpressions {
    /// Enumerates candidates and builds per-block (and per-edge) GEN/KILL.
    #[must_use]
    pub fn new(func: &Function) -> Self {
        let table = CandidateTable::build(func, CandidateKind::Available);
        let kills = KillSets::classify(func, &table);
        let (sets, cond_sets) = build_block_sets(func, &table, &kills, GenMode::Available);
        Self {
            table,
            kills,
            sets,
            cond_sets,
        }
    }

    /// The candidate table this instance ranges over.
    #[must_use]
    pub const fn table(&self) -> &CandidateTable {
        &self.table
    }

    /// The classifier sets for this candidate universe.
    #[must_use]
    pub const fn kill_sets(&self) -> &KillSets {
        &self.kills
    }
}

impl FlowProblem for AvailableExpressions {
    const NAME: &'static str = "available-expressions";
    const DIRECTION: Direction = Direction::Forward;
    const CONFLUENCE: Confluence = Confluence::Intersection;

    fn universe(&self) -> usize {
        self.table.len()
    }

    fn boundary(&self) -> BitSet {
        // Nothing is available on entry; the entry's OUT is its own GEN.
        BitSet::new(self.table.len())
    }

    fn sets(&self, block: BlockId) -> &GenKill {
        &self.sets[block.index()]
    }

    fn edge_sets(&self, block: BlockId, edge: usize) -> Option<&GenKill> {
        self.cond_sets[block.index()]
            .as_ref()
            .map(|pair| &pair[edge.min(1)])
    }
}

/// The copy-propagation facts problem instance for one function.
pub struct CopyFacts {
    table: CandidateTable,
    sets: Vec<GenKill>,
    cond_sets: Vec<Option<[GenKill; 2]>>,
}

impl CopyFacts {
    /// Enumerates copy candidates and builds per-block GEN/KILL.
    #[must_use]
    pub fn new(func: &Function) -> Self {
        let table = CandidateTable::build(func, CandidateKind::Copy);
        let kills = KillSets::classify(func, &table);
        let (sets, cond_sets) = build_block_sets(func, &table, &kills, GenMode::Available);
        Self {
            table,
            sets,
            cond_sets,
        }
    }

    /// The candidate table this instance ranges over.
    #[must_use]
    pub const fn table(&self) -> &CandidateTable {
        &self.table
    }
}

impl FlowProblem for CopyFacts {
    const NAME: &'static str = "copy-propagation";
    const DIRECTION: Direction = Direction::Forward;
    const CONFLUENCE: Confluence = Confluence::Intersection;

    fn universe(&self) -> usize {
        self.table.len()
    }

    fn boundary(&self) -> BitSet {
        BitSet::new(self.table.len())
    }

    fn sets(&self, block: BlockId) -> &GenKill {
        &self.sets[block.index()]
    }

    fn edge_sets(&self, block: BlockId, edge: usize) -> Option<&GenKill> {
        self.cond_sets[block.index()]
            .as_ref()
            .map(|pair| &pair[edge.min(1)])
    }
}

/// How the shared walker generates candidate bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GenMode {
    /// A re-evaluation after a kill makes the value available again, and a
    /// kill withdraws previously generated facts (forward availability).
    Available,
    /// Only evaluations before the first kill count, and kills never
    /// withdraw them (backward very-busy GEN construction).
    FirstComputation,
}

#[derive(Debug, Clone)]
struct MustState {
    gen: BitSet,
    kill: BitSet,
}

impl MustState {
    fn new(universe: usize) -> Self {
        Self {
            gen: BitSet::new(universe),
            kill: BitSet::new(universe),
        }
    }

    /// Conservative arm merge: generated on both arms, killed on either.
    fn merge(&mut self, other: &Self) {
        self.gen.intersect_with(&other.gen);
        self.kill.union_with(&other.kill);
    }

    fn into_genkill(self) -> GenKill {
        GenKill {
            gen: self.gen,
            kill: self.kill,
        }
    }
}

/// Builds per-block GEN/KILL pairs, plus per-edge pairs for conditional
/// branch blocks. Shared by available expressions, copy facts and the
/// very-busy GEN construction.
pub(crate) fn build_block_sets(
    func: &Function,
    table: &CandidateTable,
    kills: &KillSets,
    mode: GenMode,
) -> (Vec<GenKill>, Vec<Option<[GenKill; 2]>>) {
    let universe = table.len();
    let walker = Walker {
        func,
        table,
        kills,
        mode,
    };

    let mut sets = Vec::with_capacity(func.block_count());
    let mut cond_sets = vec![None; func.block_count()];

    for (id, block) in func.blocks() {
        if block.transfer.is_barrier() {
            // Unknown effects: the block invalidates every fact.
            let mut state = MustState::new(universe);
            state.kill.set_all();
            sets.push(state.into_genkill());
            continue;
        }

        let Some(root) = block.root else {
            sets.push(GenKill::new(universe));
            continue;
        };

        if block.transfer == Transfer::Cond && block.succs.len() == 2 {
            let (taken, fall) = walker.walk_cond(root, MustState::new(universe));
            let mut merged = taken.clone();
            merged.merge(&fall);
            sets.push(merged.into_genkill());
            cond_sets[id.index()] = Some([taken.into_genkill(), fall.into_genkill()]);
        } else {
            let mut state = MustState::new(universe);
            walker.walk(root, &mut state);
            sets.push(state.into_genkill());
        }
    }

    (sets, cond_sets)
}

struct Walker<'f> {
    func: &'f Function,
    table: &'f CandidateTable,
    kills: &'f KillSets,
    mode: GenMode,
}

impl Walker<'_> {
    /// Walks `node`, folding its effects into `state`.
    fn walk(&self, node: ExprId, state: &mut MustState) {
        match &self.func.arena.node(node).kind {
            Expr::Leaf(_) => {}
            Expr::Unary { opnd, .. } => {
                self.walk(*opnd, state);
                self.visit_candidate(node, state);
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.walk(*lhs, state);
                self.walk(*rhs, state);
                self.visit_candidate(node, state);
            }
            Expr::Seq { first, second } => {
                self.walk(*first, state);
                self.walk(*second, state);
            }
            Expr::Short { lhs, rhs, .. } => {
                self.walk(*lhs, state);
                let mut with_rhs = state.clone();
                self.walk(*rhs, &mut with_rhs);
                state.merge(&with_rhs);
                self.visit_candidate(node, state);
            }
            Expr::Ternary {
                cond,
                then_val,
                else_val,
            } => {
                self.walk(*cond, state);
                let mut then_arm = state.clone();
                self.walk(*then_val, &mut then_arm);
                let mut else_arm = state.clone();
                self.walk(*else_val, &mut else_arm);
                *state = then_arm;
                state.merge(&else_arm);
                self.visit_candidate(node, state);
            }
            Expr::Assign { target, value, .. } => {
                self.walk(*value, state);
                self.walk_store_target(*target, state);
                match self.func.arena.as_sym_read(*target) {
                    Some(sym) => self.kill_event(self.table.killed_by_write(sym), state),
                    None => self.kill_event(&self.kills.defkill, state),
                }
                // Copy candidates are the assignment itself; generate the
                // fact after its own kill effect.
                self.visit_candidate(node, state);
            }
            Expr::Call { callee, args } => {
                for arg in args {
                    self.walk(*arg, state);
                }
                self.walk(*callee, state);
                let killed = self.kills.killed_by_call();
                self.kill_event(&killed, state);
            }
            Expr::Asm => {
                let all = BitSet::full(self.table.len());
                self.kill_event(&all, state);
            }
        }
    }

    /// A store target is written, not read: recurse only into the address
    /// computation of an indirect store.
    fn walk_store_target(&self, target: ExprId, state: &mut MustState) {
        if let Expr::Unary {
            op: UnaryOp::Deref | UnaryOp::DispatchLoad,
            opnd,
        } = &self.func.arena.node(target).kind
        {
            self.walk(*opnd, state);
        }
    }

    /// Walks the tree of a conditional branch, producing the terminal
    /// states of the taken and fall-through edges.
    fn walk_cond(&self, node: ExprId, incoming: MustState) -> (MustState, MustState) {
        match &self.func.arena.node(node).kind {
            Expr::Short {
                op: crate::ir::ShortOp::AndAnd,
                lhs,
                rhs,
            } => {
                let (lhs_true, lhs_false) = self.walk_cond(*lhs, incoming);
                let (mut taken, rhs_false) = self.walk_cond(*rhs, lhs_true);
                self.visit_candidate(node, &mut taken);
                let mut fall = lhs_false;
                fall.merge(&rhs_false);
                self.visit_candidate(node, &mut fall);
                (taken, fall)
            }
            Expr::Short {
                op: crate::ir::ShortOp::OrOr,
                lhs,
                rhs,
            } => {
                let (lhs_true, lhs_false) = self.walk_cond(*lhs, incoming);
                let (rhs_true, mut fall) = self.walk_cond(*rhs, lhs_false);
                let mut taken = lhs_true;
                taken.merge(&rhs_true);
                self.visit_candidate(node, &mut taken);
                self.visit_candidate(node, &mut fall);
                (taken, fall)
            }
            Expr::Unary {
                op: UnaryOp::LogNot,
                opnd,
            } => {
                let (taken, fall) = self.walk_cond(*opnd, incoming);
                let (mut taken, mut fall) = (fall, taken);
                self.visit_candidate(node, &mut taken);
                self.visit_candidate(node, &mut fall);
                (taken, fall)
            }
            _ => {
                let mut state = incoming;
                self.walk(node, &mut state);
                (state.clone(), state)
            }
        }
    }

    fn visit_candidate(&self, node: ExprId, state: &mut MustState) {
        let Some(index) = self.table.index_of(node) else {
            return;
        };
        match self.mode {
            GenMode::Available => state.gen.insert(index),
            GenMode::FirstComputation => {
                if !state.kill.contains(index) {
                    state.gen.insert(index);
                }
            }
        }
    }

    fn kill_event(&self, killed: &BitSet, state: &mut MustState) {
        if self.mode == GenMode::Available {
            state.gen.difference_with(killed);
        }
        state.kill.union_with(killed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfg::DepthFirstOrder,
        dataflow::solver::solve,
        ir::{FunctionBuilder, ShortOp, SymbolFlags as SF, Ty},
    };

    #[test]
    fn test_expression_available_after_computation() {
        // b0: x = a * b   b1: y = a * b (redundant)
        let mut fb = FunctionBuilder::new("cse");
        let a = fb.symbol("a", Ty::I32, SF::empty());
        let b = fb.symbol("b", Ty::I32, SF::empty());
        let x = fb.symbol("x", Ty::I32, SF::empty());
        let y = fb.symbol("y", Ty::I32, SF::empty());

        let ra = fb.read(a);
        let rb = fb.read(b);
        let prod = fb.mul(ra, rb);
        let set_x = fb.assign(x, prod);
        fb.set_root(0, set_x);
        fb.jump(0, 1);

        let ra2 = fb.read(a);
        let rb2 = fb.read(b);
        let prod2 = fb.mul(ra2, rb2);
        let set_y = fb.assign(y, prod2);
        fb.set_root(1, set_y);
        fb.ret(1);
        let func = fb.finish().unwrap();

        let avail = AvailableExpressions::new(&func);
        let dfo = DepthFirstOrder::compute(&func).unwrap();
        let results = solve(&avail, &func, &dfo).unwrap();

        let first = avail.table().index_of(prod).unwrap();
        assert!(results.input(BlockId::new(1)).contains(first));
    }

    #[test]
    fn test_operand_write_kills_availability() {
        // b0: x = a * b; a = 0   b1: a * b is not available
        let mut fb = FunctionBuilder::new("killed");
        let a = fb.symbol("a", Ty::I32, SF::empty());
        let b = fb.symbol("b", Ty::I32, SF::empty());
        let x = fb.symbol("x", Ty::I32, SF::empty());

        let ra = fb.read(a);
        let rb = fb.read(b);
        let prod = fb.mul(ra, rb);
        let set_x = fb.assign(x, prod);
        let zero = fb.int(0);
        let clobber = fb.assign(a, zero);
        let seq = fb.seq(set_x, clobber);
        fb.set_root(0, seq);
        fb.jump(0, 1);
        fb.ret(1);
        let func = fb.finish().unwrap();

        let avail = AvailableExpressions::new(&func);
        let dfo = DepthFirstOrder::compute(&func).unwrap();
        let results = solve(&avail, &func, &dfo).unwrap();

        let first = avail.table().index_of(prod).unwrap();
        assert!(!results.input(BlockId::new(1)).contains(first));
    }

    #[test]
    fn test_short_circuit_edges_differ() {
        // b0 (cond): a && (b * c)  -> taken edge knows b * c was computed,
        // the fall-through edge does not.
        let mut fb = FunctionBuilder::new("edges");
        let a = fb.symbol("a", Ty::I32, SF::empty());
        let b = fb.symbol("b", Ty::I32, SF::empty());
        let c = fb.symbol("c", Ty::I32, SF::empty());

        let ra = fb.read(a);
        let rb = fb.read(b);
        let rc = fb.read(c);
        let prod = fb.mul(rb, rc);
        let test = fb.short(ShortOp::AndAnd, ra, prod);
        fb.set_root(0, test);
        fb.cond(0, 1, 2);
        fb.ret(1);
        fb.ret(2);
        let func = fb.finish().unwrap();

        let avail = AvailableExpressions::new(&func);
        let dfo = DepthFirstOrder::compute(&func).unwrap();
        let results = solve(&avail, &func, &dfo).unwrap();

        let prod_idx = avail.table().index_of(prod).unwrap();
        assert!(results.input(BlockId::new(1)).contains(prod_idx));
        assert!(!results.input(BlockId::new(2)).contains(prod_idx));
    }

    #[test]
    fn test_copy_fact_killed_by_either_side() {
        // b0: y = x   b1: x = 1   b2: the copy fact is dead
        let mut fb = FunctionBuilder::new("copykill");
        let x = fb.symbol("x", Ty::I32, SF::empty());
        let y = fb.symbol("y", Ty::I32, SF::empty());

        let rx = fb.read(x);
        let copy = fb.assign(y, rx);
        fb.set_root(0, copy);
        fb.jump(0, 1);

        let one = fb.int(1);
        let clobber = fb.assign(x, one);
        fb.set_root(1, clobber);
        fb.jump(1, 2);
        fb.ret(2);
        let func = fb.finish().unwrap();

        let copies = CopyFacts::new(&func);
        let dfo = DepthFirstOrder::compute(&func).unwrap();
        let results = solve(&copies, &func, &dfo).unwrap();

        let fact = copies.table().index_of(copy).unwrap();
        assert!(results.input(BlockId::new(1)).contains(fact));
        assert!(!results.input(BlockId::new(2)).contains(fact));
    }

    #[test]
    fn test_call_kills_aliased_candidates() {
        // b0: x = g + 1 (g aliased); call f()   b1: g + 1 unavailable
        let mut fb = FunctionBuilder::new("callkill");
        let g = fb.symbol("g", Ty::I32, SF::AMBIGUOUS);
        let x = fb.symbol("x", Ty::I32, SF::empty());
        let f = fb.symbol("f", Ty::Ptr, SF::empty());

        let rg = fb.read(g);
        let one = fb.int(1);
        let sum = fb.add(rg, one);
        let set = fb.assign(x, sum);
        let call = fb.call(f, vec![], Ty::Void);
        let seq = fb.seq(set, call);
        fb.set_root(0, seq);
        fb.jump(0, 1);
        fb.ret(1);
        let func = fb.finish().unwrap();

        let avail = AvailableExpressions::new(&func);
        let dfo = DepthFirstOrder::compute(&func).unwrap();
        let results = solve(&avail, &func, &dfo).unwrap();

        let sum_idx = avail.table().index_of(sum).unwrap();
        assert!(!results.input(BlockId::new(1)).contains(sum_idx));
    }
}
