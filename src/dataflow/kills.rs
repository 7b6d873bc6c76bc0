//! The kill-set classifier.
//!
//! After candidate enumeration, three reusable bit sets over the candidate
//! universe summarize which candidates an imprecise write can invalidate:
//!
//! - `defkill`: candidates an *ambiguous* definition (pointer store, call,
//!   inline asm) could invalidate - anything that reads an aliased symbol
//!   or reads through a pointer.
//! - `starkill`: the candidates that are themselves indirect reads, so any
//!   store through an unknown address kills them.
//! - `vptrkill`: the candidates reading through a dispatch-table-style
//!   indirection, killed by calls (which may rebind the table).
//!
//! Classification propagates bottom-up: a node reading an aliased symbol
//! taints every candidate containing it, so the per-node properties are
//! computed once per tree in evaluation order (children before parents)
//! and then projected onto the candidate indices.

use crate::{
    dataflow::candidates::{copy_parts, CandidateKind, CandidateTable},
    ir::{Expr, Function, Leaf, SymbolFlags, UnaryOp},
    utils::BitSet,
};

/// The three classifier sets over one candidate universe.
#[derive(Debug, Clone)]
pub struct KillSets {
    /// Candidates any ambiguous write could invalidate.
    pub defkill: BitSet,
    /// Candidates that are indirect reads.
    pub starkill: BitSet,
    /// Candidates that are dispatch-indirection reads.
    pub vptrkill: BitSet,
}

impl KillSets {
    /// Classifies every candidate of `table`.
    #[must_use]
    pub fn classify(func: &Function, table: &CandidateTable) -> Self {
        let universe = table.len();
        let mut defkill = BitSet::new(universe);
        let mut starkill = BitSet::new(universe);
        let mut vptrkill = BitSet::new(universe);

        if table.kind() == CandidateKind::Copy {
            // A copy fact survives ambiguous writes only if neither side
            // can be aliased.
            for (index, candidate) in table.iter() {
                let (dst, src) = copy_parts(func, candidate.node).expect("copy candidate shape");
                let aliased = |sym: crate::ir::SymbolId| {
                    func.symbols.get(sym).flags.contains(SymbolFlags::AMBIGUOUS)
                };
                if aliased(dst) || aliased(src) {
                    defkill.insert(index);
                }
            }
            return Self {
                defkill,
                starkill,
                vptrkill,
            };
        }

        // Bottom-up per-node taint over the whole arena: evaluation order
        // visits children before parents, so each node folds its operands'
        // already-computed taints.
        let mut taint = vec![Taint::default(); func.arena.len()];
        for (_, block) in func.blocks() {
            let Some(root) = block.root else { continue };
            func.arena.visit_eval_order(root, &mut |node| {
                let mut t = Taint::default();
                match &func.arena.node(node).kind {
                    Expr::Leaf(Leaf::Sym(sym)) => {
                        t.reads_aliased = func
                            .symbols
                            .get(*sym)
                            .flags
                            .contains(SymbolFlags::AMBIGUOUS);
                    }
                    Expr::Leaf(_) | Expr::Asm => {}
                    Expr::Unary { op, opnd } => {
                        t = taint[opnd.index()];
                        match op {
                            UnaryOp::Deref => t.indirect = true,
                            UnaryOp::DispatchLoad => {
                                t.indirect = true;
                                t.dispatch = true;
                            }
                            _ => {}
                        }
                    }
                    Expr::Binary { lhs, rhs, .. }
                    | Expr::Short { lhs, rhs, .. }
                    | Expr::Seq {
                        first: lhs,
                        second: rhs,
                    } => {
                        t = taint[lhs.index()].merged(taint[rhs.index()]);
                    }
                    Expr::Ternary {
                        cond,
                        then_val,
                        else_val,
                    } => {
                        t = taint[cond.index()]
                            .merged(taint[then_val.index()])
                            .merged(taint[else_val.index()]);
                    }
                    Expr::Assign { target, value, .. } => {
                        t = taint[target.index()].merged(taint[value.index()]);
                    }
                    Expr::Call { callee, args } => {
                        t = taint[callee.index()];
                        for arg in args {
                            t = t.merged(taint[arg.index()]);
                        }
                    }
                }
                taint[node.index()] = t;
            });
        }

        for (index, candidate) in table.iter() {
            let t = taint[candidate.node.index()];
            if t.reads_aliased || t.indirect {
                defkill.insert(index);
            }
            if t.indirect {
                starkill.insert(index);
            }
            if t.dispatch {
                vptrkill.insert(index);
            }
        }

        Self {
            defkill,
            starkill,
            vptrkill,
        }
    }

    /// The candidates a call invalidates: everything an ambiguous write
    /// could touch plus every dispatch-indirection read.
    #[must_use]
    pub fn killed_by_call(&self) -> BitSet {
        let mut killed = self.defkill.clone();
        killed.union_with(&self.vptrkill);
        killed
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Taint {
    reads_aliased: bool,
    indirect: bool,
    dispatch: bool,
}

impl Taint {
    const fn merged(self, other: Self) -> Self {
        Self {
            reads_aliased: self.reads_aliased || other.reads_aliased,
            indirect: self.indirect || other.indirect,
            dispatch: self.dispatch || other.dispatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, SymbolFlags, Ty};

    #[test]
    fn test_classify_value_candidates() {
        let mut fb = FunctionBuilder::new("mix");
        let a = fb.symbol("a", Ty::I32, SymbolFlags::empty());
        let g = fb.symbol("g", Ty::I32, SymbolFlags::AMBIGUOUS);
        let p = fb.symbol("p", Ty::Ptr, SymbolFlags::empty());
        let x = fb.symbol("x", Ty::I32, SymbolFlags::empty());

        // x = (a + 1) + (g + ( *p ));
        let ra = fb.read(a);
        let one = fb.int(1);
        let pure = fb.add(ra, one);

        let rg = fb.read(g);
        let rp = fb.read(p);
        let load = fb.deref(rp, Ty::I32);
        let tainted = fb.add(rg, load);

        let sum = fb.add(pure, tainted);
        let set = fb.assign(x, sum);
        fb.set_root(0, set);
        fb.ret(0);
        let func = fb.finish().unwrap();

        let table = CandidateTable::build(&func, CandidateKind::Available);
        let kills = KillSets::classify(&func, &table);

        // `a + 1` survives ambiguous writes; the deref and everything
        // containing it does not.
        let pure_idx = table.index_of(pure).unwrap();
        let load_idx = table.index_of(load).unwrap();
        let tainted_idx = table.index_of(tainted).unwrap();
        let sum_idx = table.index_of(sum).unwrap();

        assert!(!kills.defkill.contains(pure_idx));
        assert!(kills.defkill.contains(load_idx));
        assert!(kills.defkill.contains(tainted_idx));
        assert!(kills.defkill.contains(sum_idx));

        assert!(kills.starkill.contains(load_idx));
        assert!(!kills.starkill.contains(pure_idx));
        assert!(kills.vptrkill.is_empty());
    }

    #[test]
    fn test_classify_copy_candidates() {
        let mut fb = FunctionBuilder::new("copies");
        let a = fb.symbol("a", Ty::I32, SymbolFlags::empty());
        let b = fb.symbol("b", Ty::I32, SymbolFlags::empty());
        let g = fb.symbol("g", Ty::I32, SymbolFlags::AMBIGUOUS);

        let ra = fb.read(a);
        let clean = fb.assign(b, ra);
        let rg = fb.read(g);
        let dirty = fb.assign(a, rg);
        let seq = fb.seq(clean, dirty);
        fb.set_root(0, seq);
        fb.ret(0);
        let func = fb.finish().unwrap();

        let table = CandidateTable::build(&func, CandidateKind::Copy);
        let kills = KillSets::classify(&func, &table);

        assert_eq!(table.len(), 2);
        let clean_idx = table.index_of(clean).unwrap();
        let dirty_idx = table.index_of(dirty).unwrap();
        assert!(!kills.defkill.contains(clean_idx));
        assert!(kills.defkill.contains(dirty_idx));
    }
}
