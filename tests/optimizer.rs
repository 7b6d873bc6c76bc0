//! End-to-end optimizer scenarios.
//!
//! Each test builds a small function through the public builder API, runs
//! a selected set of passes (or the whole pipeline) and checks the
//! transformed trees and CFG.

use treeflow::{
    dataflow::solve,
    ir::{AssignOp, BinOp, Expr, Leaf},
    prelude::*,
};

/// `for (i = 0; i < n; i++) a = x * 2 + 1;` with `x` unmodified.
///
/// Returns the function plus the id of the `x * 2 + 1` subtree.
fn invariant_loop() -> (Function, ExprId) {
    let mut fb = FunctionBuilder::new("invariant");
    let i = fb.symbol("i", Ty::I32, SymbolFlags::empty());
    let n = fb.symbol("n", Ty::I32, SymbolFlags::PARAM);
    let x = fb.symbol("x", Ty::I32, SymbolFlags::PARAM);
    // An out-parameter: the store itself must stay in the loop (parameter
    // targets are never relocated), so only the expression is hoisted.
    let a = fb.symbol("a", Ty::I32, SymbolFlags::PARAM | SymbolFlags::LIVE_OUT);

    let zero = fb.int(0);
    let init = fb.assign(i, zero);
    fb.set_root(0, init);
    fb.jump(0, 1);

    let ri = fb.read(i);
    let rn = fb.read(n);
    let test = fb.lt(ri, rn);
    fb.set_root(1, test);
    fb.cond(1, 2, 3);

    let rx = fb.read(x);
    let two = fb.int(2);
    let doubled = fb.mul(rx, two);
    let one = fb.int(1);
    let value = fb.add(doubled, one);
    let store = fb.assign(a, value);
    let one2 = fb.int(1);
    let bump = fb.add_assign(i, one2);
    let body = fb.seq(store, bump);
    fb.set_root(2, body);
    fb.jump(2, 1);

    fb.ret(3);
    (fb.finish().unwrap(), value)
}

fn run_passes(func: &mut Function, passes: OptPasses) -> OptContext {
    let ctx = OptContext::new();
    let config = OptConfig {
        passes,
        ..OptConfig::default()
    };
    Optimizer::new(config).optimize(func, &ctx).unwrap();
    ctx
}

#[test]
fn invariant_is_hoisted_to_preheader() {
    let (mut func, value) = invariant_loop();
    run_passes(&mut func, OptPasses::LOOP_INVARIANTS);
    assert!(func.validate().is_ok());

    // The body computation was replaced by a temporary read...
    let temp = func
        .arena
        .as_sym_read(value)
        .expect("x * 2 + 1 replaced by a temporary");

    // ...and the temporary is assigned exactly once, outside the loop.
    let cfg = CfgInfo::build(&func).unwrap();
    let lp = &cfg.loops.loops()[0];
    let mut assignment_blocks = Vec::new();
    for (id, block) in func.blocks() {
        let Some(root) = block.root else { continue };
        func.arena.visit_eval_order(root, &mut |n| {
            if let Expr::Assign { target, .. } = func.arena.node(n).kind {
                if func.arena.as_sym_read(target) == Some(temp) {
                    assignment_blocks.push(id);
                }
            }
        });
    }
    assert_eq!(assignment_blocks.len(), 1);
    assert!(!lp.contains(assignment_blocks[0]));
}

#[test]
fn every_loop_gets_a_single_preheader() {
    // A loop entered from two places has no preheader until LICM
    // synthesizes one.
    let mut fb = FunctionBuilder::new("multi_entry");
    let c = fb.symbol("c", Ty::I32, SymbolFlags::PARAM);
    let rc = fb.read(c);
    fb.set_root(0, rc);
    fb.cond(0, 1, 2);
    fb.jump(1, 2);
    let rc2 = fb.read(c);
    fb.set_root(2, rc2);
    fb.cond(2, 3, 4);
    fb.jump(3, 2);
    fb.ret(4);
    let mut func = fb.finish().unwrap();

    run_passes(&mut func, OptPasses::LOOP_INVARIANTS);
    assert!(func.validate().is_ok());

    let cfg = CfgInfo::build(&func).unwrap();
    for lp in cfg.loops.loops() {
        assert!(lp.preheader.is_some(), "loop at {} lacks a preheader", lp.header);
    }
}

#[test]
fn induction_variable_is_reduced_and_eliminated() {
    // i = 0; while (i < 10) { x = i * 4; i += 2; } with x live out and i
    // dead after the loop: the multiply becomes a temporary, the
    // comparison is rewritten against it, and i's update disappears.
    let mut fb = FunctionBuilder::new("induction");
    let i = fb.symbol("i", Ty::I32, SymbolFlags::empty());
    let x = fb.symbol("x", Ty::I32, SymbolFlags::LIVE_OUT);

    let zero = fb.int(0);
    let init = fb.assign(i, zero);
    fb.set_root(0, init);
    fb.jump(0, 1);

    let ri = fb.read(i);
    let ten = fb.int(10);
    let test = fb.lt(ri, ten);
    fb.set_root(1, test);
    fb.cond(1, 2, 3);

    let ri2 = fb.read(i);
    let four = fb.int(4);
    let scaled = fb.mul(ri2, four);
    let store = fb.assign(x, scaled);
    let two = fb.int(2);
    let bump = fb.add_assign(i, two);
    let body = fb.seq(store, bump);
    fb.set_root(2, body);
    fb.jump(2, 1);

    fb.ret(3);
    let mut func = fb.finish().unwrap();

    run_passes(&mut func, OptPasses::INDUCTION_VARS);
    assert!(func.validate().is_ok());

    // The scaled use reads a temporary now.
    let temp = func.arena.as_sym_read(scaled).expect("i * 4 replaced");

    // The comparison tests the temporary against 40.
    let test_root = func.block(BlockId::new(1)).root.unwrap();
    let Expr::Binary { op, lhs, rhs } = &func.arena.node(test_root).kind else {
        panic!("loop test is not a comparison");
    };
    assert_eq!(*op, BinOp::Lt);
    assert_eq!(func.arena.as_sym_read(*lhs), Some(temp));
    assert_eq!(func.arena.int_const(*rhs), Some(40));

    // No tree updates i anymore.
    let mut i_updates = 0;
    for (_, block) in func.blocks() {
        let Some(root) = block.root else { continue };
        func.arena.visit_eval_order(root, &mut |n| {
            if let Expr::Assign { op, target, .. } = &func.arena.node(n).kind {
                if *op != AssignOp::Set && func.arena.as_sym_read(*target) == Some(i) {
                    i_updates += 1;
                }
            }
        });
    }
    assert_eq!(i_updates, 0, "the basic variable's update should be gone");
}

#[test]
fn copy_propagation_does_not_invent_literals() {
    // x = 1; y = x; z = x; - copy propagation alone keeps the symbol
    // reads; adding constant propagation collapses them to 1.
    fn build() -> (Function, ExprId, ExprId) {
        let mut fb = FunctionBuilder::new("copies");
        let x = fb.symbol("x", Ty::I32, SymbolFlags::empty());
        let y = fb.symbol("y", Ty::I32, SymbolFlags::LIVE_OUT);
        let z = fb.symbol("z", Ty::I32, SymbolFlags::LIVE_OUT);

        let one = fb.int(1);
        let set_x = fb.assign(x, one);
        let rx1 = fb.read(x);
        let set_y = fb.assign(y, rx1);
        let rx2 = fb.read(x);
        let set_z = fb.assign(z, rx2);
        let seq1 = fb.seq(set_x, set_y);
        let seq2 = fb.seq(seq1, set_z);
        fb.set_root(0, seq2);
        fb.ret(0);
        (fb.finish().unwrap(), rx1, rx2)
    }

    let (mut copy_only, rx1, rx2) = build();
    run_passes(&mut copy_only, OptPasses::COPY_PROP);
    // `x = 1` is not a copy, so both reads stay symbol reads of x.
    assert!(copy_only.arena.as_sym_read(rx1).is_some());
    assert!(copy_only.arena.as_sym_read(rx2).is_some());

    let (mut with_const, rx1, rx2) = build();
    run_passes(
        &mut with_const,
        OptPasses::COPY_PROP | OptPasses::CONST_PROP,
    );
    assert_eq!(with_const.arena.int_const(rx1), Some(1));
    assert_eq!(with_const.arena.int_const(rx2), Some(1));
}

#[test]
fn ambiguous_variable_reaches_and_blocks_folding() {
    // if (f()) a = g(); b = a; with a aliased: the conditional definition
    // reaches b's read, and constant propagation must not fold.
    let mut fb = FunctionBuilder::new("ambiguous");
    let a = fb.symbol("a", Ty::I32, SymbolFlags::AMBIGUOUS);
    let b = fb.symbol("b", Ty::I32, SymbolFlags::LIVE_OUT);
    let f = fb.symbol("f", Ty::Ptr, SymbolFlags::PARAM);
    let g = fb.symbol("g", Ty::Ptr, SymbolFlags::PARAM);

    let call_f = fb.call(f, vec![], Ty::I32);
    fb.set_root(0, call_f);
    fb.cond(0, 1, 2);

    let call_g = fb.call(g, vec![], Ty::I32);
    let set_a = fb.assign(a, call_g);
    fb.set_root(1, set_a);
    fb.jump(1, 2);

    let ra = fb.read(a);
    let set_b = fb.assign(b, ra);
    fb.set_root(2, set_b);
    fb.ret(2);
    let mut func = fb.finish().unwrap();

    // The definition inside the `if` reaches block 2.
    let rd = ReachingDefinitions::new(&func);
    let dfo = DepthFirstOrder::compute(&func).unwrap();
    let results = solve(&rd, &func, &dfo).unwrap();
    let reaching = results.input(BlockId::new(2));
    let inside_def = (0..rd.table().len())
        .find(|&idx| rd.table().site(idx).node == set_a)
        .unwrap();
    assert!(reaching.contains(inside_def));

    // Constant propagation leaves the read alone.
    run_passes(&mut func, OptPasses::CONST_PROP);
    assert_eq!(func.arena.as_sym_read(ra), Some(a));
}

#[test]
fn dead_store_is_removed_but_its_call_survives() {
    // t = f(); with t never read: the store goes, the call stays.
    let mut fb = FunctionBuilder::new("deadstore");
    let t = fb.symbol("t", Ty::I32, SymbolFlags::empty());
    let f = fb.symbol("f", Ty::Ptr, SymbolFlags::PARAM);

    let call = fb.call(f, vec![], Ty::I32);
    let store = fb.assign(t, call);
    fb.set_root(0, store);
    fb.ret(0);
    let mut func = fb.finish().unwrap();

    run_passes(&mut func, OptPasses::DEAD_ASSIGNMENTS);

    let root = func.block(BlockId::new(0)).root.unwrap();
    let mut calls = 0;
    let mut stores = 0;
    func.arena.visit_eval_order(root, &mut |n| {
        match func.arena.node(n).kind {
            Expr::Call { .. } => calls += 1,
            Expr::Assign { .. } => stores += 1,
            _ => {}
        }
    });
    assert_eq!(calls, 1);
    assert_eq!(stores, 0);
}

#[test]
fn constant_branch_folds_and_dead_arm_detaches() {
    // c = 1; if (c) { x = 1 } else { x = 2 }: the else arm dies.
    let mut fb = FunctionBuilder::new("fold");
    let c = fb.symbol("c", Ty::I32, SymbolFlags::empty());
    let x = fb.symbol("x", Ty::I32, SymbolFlags::LIVE_OUT);

    let one = fb.int(1);
    let set_c = fb.assign(c, one);
    fb.set_root(0, set_c);
    fb.jump(0, 1);

    let rc = fb.read(c);
    fb.set_root(1, rc);
    fb.cond(1, 2, 3);

    let one2 = fb.int(1);
    let set1 = fb.assign(x, one2);
    fb.set_root(2, set1);
    fb.jump(2, 4);

    let two = fb.int(2);
    let set2 = fb.assign(x, two);
    fb.set_root(3, set2);
    fb.jump(3, 4);

    fb.ret(4);
    let mut func = fb.finish().unwrap();

    run_passes(&mut func, OptPasses::CONST_PROP | OptPasses::DEAD_CODE);
    assert!(func.validate().is_ok());
    assert!(func.is_detached(BlockId::new(3)));
    assert_eq!(func.block(BlockId::new(1)).transfer, Transfer::Jump);
}

#[test]
fn full_pipeline_is_idempotent() {
    let (mut func, _) = invariant_loop();
    let ctx = OptContext::new();
    let optimizer = Optimizer::new(OptConfig::default());

    let first = optimizer.optimize(&mut func, &ctx).unwrap();
    assert!(first.changed);
    assert!(func.validate().is_ok());

    let second = optimizer.optimize(&mut func, &ctx).unwrap();
    assert!(!second.changed, "optimizer oscillates");
}

#[test]
fn converged_analysis_is_stable() {
    // Re-running an analysis on unchanged input reproduces its results.
    let (func, _) = invariant_loop();
    let dfo = DepthFirstOrder::compute(&func).unwrap();

    let rd = ReachingDefinitions::new(&func);
    let first = solve(&rd, &func, &dfo).unwrap();
    let second = solve(&rd, &func, &dfo).unwrap();
    for (id, _) in func.blocks() {
        assert_eq!(first.input(id), second.input(id));
        assert_eq!(first.output(id), second.output(id));
    }

    let live = LiveVariables::new(&func);
    let first = solve(&live, &func, &dfo).unwrap();
    let second = solve(&live, &func, &dfo).unwrap();
    for (id, _) in func.blocks() {
        assert_eq!(first.input(id), second.input(id));
        assert_eq!(first.output(id), second.output(id));
    }
}

#[test]
fn rotation_preserves_wellformedness_and_weights() {
    let (mut func, _) = invariant_loop();
    let ctx = OptContext::new();
    let optimizer = Optimizer::new(OptConfig::default());
    optimizer.optimize(&mut func, &ctx).unwrap();

    assert!(func.validate().is_ok());

    // Every loop member carries a raised execution weight.
    let cfg = CfgInfo::build(&func).unwrap();
    for lp in cfg.loops.loops() {
        for member in lp.body.iter() {
            assert!(func.block(BlockId::new(member)).weight >= 8);
        }
    }
    assert_eq!(func.block(func.entry()).weight, 1);
}

#[test]
fn uninitialized_read_is_reported_once() {
    let mut fb = FunctionBuilder::new("uninit");
    let u = fb.symbol("u", Ty::I32, SymbolFlags::empty());
    let x = fb.symbol("x", Ty::I32, SymbolFlags::LIVE_OUT);

    let ru1 = fb.read(u);
    let ru2 = fb.read(u);
    let sum = fb.add(ru1, ru2);
    let set = fb.assign(x, sum);
    fb.set_root(0, set);
    fb.ret(0);
    let mut func = fb.finish().unwrap();

    let ctx = run_passes(&mut func, OptPasses::CONST_PROP);
    let events = ctx.take_events();
    let warnings: Vec<_> = events
        .iter()
        .filter(|e| matches!(e.kind, treeflow::opt::EventKind::UninitializedRead))
        .collect();
    assert_eq!(warnings.len(), 1);
}

#[test]
fn leaf_kinds_survive_the_pipeline() {
    // A smoke test that the full pipeline leaves a mixed function valid.
    let mut fb = FunctionBuilder::new("mixed");
    let p = fb.symbol("p", Ty::Ptr, SymbolFlags::PARAM);
    let g = fb.symbol("g", Ty::I32, SymbolFlags::AMBIGUOUS | SymbolFlags::LIVE_OUT);
    let t = fb.symbol("t", Ty::I32, SymbolFlags::empty());

    let rp = fb.read(p);
    let load = fb.deref(rp, Ty::I32);
    let one = fb.int(1);
    let sum = fb.add(load, one);
    let set_t = fb.assign(t, sum);
    let rt = fb.read(t);
    let set_g = fb.assign(g, rt);
    let seq = fb.seq(set_t, set_g);
    fb.set_root(0, seq);
    fb.ret(0);
    let mut func = fb.finish().unwrap();

    let ctx = OptContext::new();
    let optimizer = Optimizer::new(OptConfig::default());
    optimizer.optimize(&mut func, &ctx).unwrap();
    assert!(func.validate().is_ok());

    // The store through g (aliased, live out) must survive.
    let root = func.block(BlockId::new(0)).root.unwrap();
    let mut stores_to_g = 0;
    func.arena.visit_eval_order(root, &mut |n| {
        if let Expr::Assign { target, .. } = func.arena.node(n).kind {
            if matches!(func.arena.node(target).kind, Expr::Leaf(Leaf::Sym(s)) if s == g) {
                stores_to_g += 1;
            }
        }
    });
    assert_eq!(stores_to_g, 1);
}
