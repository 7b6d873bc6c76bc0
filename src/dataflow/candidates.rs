//! The candidate enumerator: definition sites and analysis candidates.
//!
//! Every analysis run starts by walking each block's expression tree in
//! evaluation order and numbering the things its bit sets will range over:
//!
//! - **Definition sites** ([`DefSiteTable`]): every assignment (direct or
//!   through a pointer), call and inline-asm node, in evaluation order
//!   across the whole function. The index into this table *is* the
//!   reaching-definitions bit universe.
//! - **Candidates** ([`CandidateTable`]): the expression occurrences an
//!   analysis tracks. Which nodes are eligible depends on the analysis:
//!   available expressions take any pure non-leaf subexpression, very busy
//!   expressions additionally exclude anything that reads through a
//!   pointer, and copy propagation takes exactly the assignments of one
//!   plain variable to another.
//!
//! Both tables are rebuilt from scratch for every analysis run and must be
//! discarded the moment any block's tree is mutated; a bit set built
//! against one table must never be combined with sets from another
//! (enforced by the universe checks in [`BitSet`]).

use crate::{
    ir::{AssignOp, BlockId, Expr, ExprId, Function, SymbolId},
    utils::BitSet,
};

/// One definition site: a node that writes a symbol or arbitrary memory.
#[derive(Debug, Clone)]
pub struct DefSite {
    /// The block whose tree contains the node.
    pub block: BlockId,
    /// The defining node (assignment, call or inline-asm).
    pub node: ExprId,
    /// The symbol written, for direct assignments to a symbol. `None` for
    /// ambiguous definitions: stores through pointers, calls and asm, which
    /// may write any aliased symbol.
    pub target: Option<SymbolId>,
}

/// All definition sites of a function, in evaluation order.
#[derive(Debug, Clone)]
pub struct DefSiteTable {
    sites: Vec<DefSite>,
    /// Def-site index by node, over the arena universe.
    index_of: Vec<Option<u32>>,
    /// Per symbol: the def sites directly targeting it.
    by_symbol: Vec<BitSet>,
    /// The ambiguous def sites (target `None`).
    ambiguous: BitSet,
}

impl DefSiteTable {
    /// Walks every block tree in evaluation order and numbers the
    /// definition sites.
    #[must_use]
    pub fn build(func: &Function) -> Self {
        let mut sites = Vec::new();
        let mut index_of = vec![None; func.arena.len()];

        for &block in func.layout() {
            let Some(root) = func.block(block).root else {
                continue;
            };
            func.arena.visit_eval_order(root, &mut |node| {
                let target = match &func.arena.node(node).kind {
                    Expr::Assign { target, .. } => Some(func.arena.as_sym_read(*target)),
                    Expr::Call { .. } | Expr::Asm => Some(None),
                    _ => None,
                };
                if let Some(target) = target {
                    index_of[node.index()] = Some(sites.len() as u32);
                    sites.push(DefSite {
                        block,
                        node,
                        target,
                    });
                }
            });
        }

        let universe = sites.len();
        let mut by_symbol = vec![BitSet::new(universe); func.symbols.len()];
        let mut ambiguous = BitSet::new(universe);
        for (index, site) in sites.iter().enumerate() {
            match site.target {
                Some(sym) => by_symbol[sym.index()].insert(index),
                None => ambiguous.insert(index),
            }
        }

        Self {
            sites,
            index_of,
            by_symbol,
            ambiguous,
        }
    }

    /// Size of the def-site universe.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Returns `true` if the function contains no definition sites.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// The def site at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn site(&self, index: usize) -> &DefSite {
        &self.sites[index]
    }

    /// The def-site index of `node`, if it is a definition site.
    #[must_use]
    pub fn index_of(&self, node: ExprId) -> Option<usize> {
        self.index_of[node.index()].map(|i| i as usize)
    }

    /// The def sites that directly target `sym`.
    #[must_use]
    pub fn defs_of(&self, sym: SymbolId) -> &BitSet {
        &self.by_symbol[sym.index()]
    }

    /// The ambiguous def sites (pointer stores, calls, asm).
    #[must_use]
    pub const fn ambiguous_defs(&self) -> &BitSet {
        &self.ambiguous
    }

    /// Every def site that may define `sym`: its direct definitions, plus
    /// the ambiguous ones when the symbol is aliased.
    #[must_use]
    pub fn defs_reaching_symbol(&self, sym: SymbolId, sym_is_ambiguous: bool) -> BitSet {
        let mut defs = self.by_symbol[sym.index()].clone();
        if sym_is_ambiguous {
            defs.union_with(&self.ambiguous);
        }
        defs
    }
}

/// Which analysis a [`CandidateTable`] was enumerated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// Pure non-leaf subexpressions (available-expression analysis).
    Available,
    /// `plain-variable := plain-variable` assignments with distinct
    /// variables (copy propagation).
    Copy,
    /// Available-expression eligibility minus anything reading through a
    /// pointer (very-busy-expression analysis).
    VeryBusy,
}

/// One candidate: an expression (or copy fact) the analysis tracks.
///
/// Structurally equal occurrences in different places share one candidate -
/// a must-analysis over occurrences could never see a fact that holds on
/// two paths through two distinct evaluations. The representative node and
/// block are those of the first occurrence in evaluation order; every
/// occurrence is listed for the transformation passes.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The block of the first occurrence.
    pub block: BlockId,
    /// The first occurrence's node, used as the structural representative.
    pub node: ExprId,
    /// Every occurrence of this candidate, in evaluation order.
    pub occurrences: Vec<(BlockId, ExprId)>,
}

/// The candidate table of one analysis run, in evaluation order.
#[derive(Debug, Clone)]
pub struct CandidateTable {
    kind: CandidateKind,
    entries: Vec<Candidate>,
    /// Candidate index by node, over the arena universe.
    index_of: Vec<Option<u32>>,
    /// Per symbol: the candidates invalidated by a write to it. For copy
    /// candidates this covers both sides of the copy.
    killed_by_write: Vec<BitSet>,
}

impl CandidateTable {
    /// Walks every block tree in evaluation order and numbers the
    /// candidates eligible for `kind`.
    #[must_use]
    pub fn build(func: &Function, kind: CandidateKind) -> Self {
        let mut entries: Vec<Candidate> = Vec::new();
        let mut index_of = vec![None; func.arena.len()];
        let volatile = |sym: SymbolId| {
            func.symbols
                .get(sym)
                .flags
                .contains(crate::ir::SymbolFlags::VOLATILE)
        };

        for &block in func.layout() {
            let Some(root) = func.block(block).root else {
                continue;
            };
            func.arena.visit_eval_order(root, &mut |node| {
                let eligible = match kind {
                    CandidateKind::Available => is_value_candidate(func, node, &volatile),
                    CandidateKind::VeryBusy => {
                        is_value_candidate(func, node, &volatile) && !func.arena.contains_deref(node)
                    }
                    CandidateKind::Copy => copy_parts(func, node).is_some(),
                };
                if !eligible {
                    return;
                }
                let existing = entries.iter().position(|c| match kind {
                    CandidateKind::Copy => copy_parts(func, c.node) == copy_parts(func, node),
                    _ => func.arena.trees_equal(c.node, node),
                });
                let index = match existing {
                    Some(index) => index,
                    None => {
                        entries.push(Candidate {
                            block,
                            node,
                            occurrences: Vec::new(),
                        });
                        entries.len() - 1
                    }
                };
                entries[index].occurrences.push((block, node));
                index_of[node.index()] = Some(index as u32);
            });
        }

        let universe = entries.len();
        let mut killed_by_write = vec![BitSet::new(universe); func.symbols.len()];
        for (index, candidate) in entries.iter().enumerate() {
            match kind {
                CandidateKind::Copy => {
                    let (dst, src) =
                        copy_parts(func, candidate.node).expect("copy candidate shape");
                    killed_by_write[dst.index()].insert(index);
                    killed_by_write[src.index()].insert(index);
                }
                _ => {
                    func.arena.collect_symbol_reads(candidate.node, &mut |sym| {
                        killed_by_write[sym.index()].insert(index);
                    });
                }
            }
        }

        Self {
            kind,
            entries,
            index_of,
            killed_by_write,
        }
    }

    /// The kind this table was enumerated for.
    #[must_use]
    pub const fn kind(&self) -> CandidateKind {
        self.kind
    }

    /// Size of the candidate universe.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no candidates were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The candidate at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn candidate(&self, index: usize) -> &Candidate {
        &self.entries[index]
    }

    /// The candidate index of `node`, if it is a candidate.
    #[must_use]
    pub fn index_of(&self, node: ExprId) -> Option<usize> {
        self.index_of[node.index()].map(|i| i as usize)
    }

    /// The candidates a write to `sym` invalidates.
    #[must_use]
    pub fn killed_by_write(&self, sym: SymbolId) -> &BitSet {
        &self.killed_by_write[sym.index()]
    }

    /// Iterates over `(index, candidate)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Candidate)> {
        self.entries.iter().enumerate()
    }
}

/// Available-expression eligibility: a pure non-leaf computation.
fn is_value_candidate(
    func: &Function,
    node: ExprId,
    volatile: &impl Fn(SymbolId) -> bool,
) -> bool {
    match &func.arena.node(node).kind {
        Expr::Leaf(_) | Expr::Assign { .. } | Expr::Call { .. } | Expr::Asm | Expr::Seq { .. } => {
            false
        }
        Expr::Unary { .. } | Expr::Binary { .. } | Expr::Short { .. } | Expr::Ternary { .. } => {
            func.arena.is_pure(node, volatile)
        }
    }
}

/// Decomposes a copy-propagation candidate `dst = src` into its two
/// symbols, or `None` if the node has any other shape.
pub(crate) fn copy_parts(func: &Function, node: ExprId) -> Option<(SymbolId, SymbolId)> {
    let Expr::Assign {
        op: AssignOp::Set,
        target,
        value,
    } = &func.arena.node(node).kind
    else {
        return None;
    };
    let dst = func.arena.as_sym_read(*target)?;
    let src = func.arena.as_sym_read(*value)?;
    if dst == src {
        return None;
    }
    // A dereference on either side disqualifies the shape already (the
    // leaves must be plain symbol reads); volatile symbols are excluded the
    // same way they are from value candidates.
    Some((dst, src))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, SymbolFlags, Ty};

    /// x = a * b; y = a * b; through two blocks.
    fn two_products() -> Function {
        let mut fb = FunctionBuilder::new("products");
        let a = fb.symbol("a", Ty::I32, SymbolFlags::empty());
        let b = fb.symbol("b", Ty::I32, SymbolFlags::empty());
        let x = fb.symbol("x", Ty::I32, SymbolFlags::empty());
        let y = fb.symbol("y", Ty::I32, SymbolFlags::empty());

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

        fb.finish().unwrap()
    }

    #[test]
    fn test_def_sites_in_order() {
        let func = two_products();
        let table = DefSiteTable::build(&func);

        assert_eq!(table.len(), 2);
        assert_eq!(table.site(0).block, BlockId::new(0));
        assert_eq!(table.site(1).block, BlockId::new(1));
        assert_eq!(table.site(0).target, Some(SymbolId::new(2)));
        assert!(table.ambiguous_defs().is_empty());
    }

    #[test]
    fn test_calls_are_ambiguous_defs() {
        let mut fb = FunctionBuilder::new("call");
        let f = fb.symbol("f", Ty::Ptr, SymbolFlags::empty());
        let call = fb.call(f, vec![], Ty::I32);
        fb.set_root(0, call);
        fb.ret(0);
        let func = fb.finish().unwrap();

        let table = DefSiteTable::build(&func);
        assert_eq!(table.len(), 1);
        assert_eq!(table.site(0).target, None);
        assert!(table.ambiguous_defs().contains(0));
    }

    #[test]
    fn test_available_candidates_share_index() {
        let func = two_products();
        let table = CandidateTable::build(&func, CandidateKind::Available);

        // The two `a * b` occurrences collapse into one candidate; the
        // assignments and leaves are not eligible.
        assert_eq!(table.len(), 1);
        assert_eq!(table.candidate(0).occurrences.len(), 2);

        let a = SymbolId::new(0);
        assert!(table.killed_by_write(a).contains(0));
    }

    #[test]
    fn test_very_busy_excludes_deref() {
        let mut fb = FunctionBuilder::new("loads");
        let p = fb.symbol("p", Ty::Ptr, SymbolFlags::AMBIGUOUS);
        let x = fb.symbol("x", Ty::I32, SymbolFlags::empty());

        let rp = fb.read(p);
        let load = fb.deref(rp, Ty::I32);
        let one = fb.int(1);
        let sum = fb.add(load, one);
        let set = fb.assign(x, sum);
        fb.set_root(0, set);
        fb.ret(0);
        let func = fb.finish().unwrap();

        let available = CandidateTable::build(&func, CandidateKind::Available);
        let very_busy = CandidateTable::build(&func, CandidateKind::VeryBusy);
        // `*p` and `*p + 1` are available candidates; neither is eligible
        // for very-busy analysis.
        assert_eq!(available.len(), 2);
        assert_eq!(very_busy.len(), 0);
    }

    #[test]
    fn test_copy_candidates() {
        let mut fb = FunctionBuilder::new("copies");
        let x = fb.symbol("x", Ty::I32, SymbolFlags::empty());
        let y = fb.symbol("y", Ty::I32, SymbolFlags::empty());

        let rx = fb.read(x);
        let copy = fb.assign(y, rx);
        let one = fb.int(1);
        let literal = fb.assign(x, one);
        let seq = fb.seq(copy, literal);
        fb.set_root(0, seq);
        fb.ret(0);
        let func = fb.finish().unwrap();

        let table = CandidateTable::build(&func, CandidateKind::Copy);
        // Only `y = x` qualifies; `x = 1` stores a literal.
        assert_eq!(table.len(), 1);
        assert!(table.killed_by_write(x).contains(0));
        assert!(table.killed_by_write(y).contains(0));
    }
}
