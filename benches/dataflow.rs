//! Benchmarks for the data-flow solver on synthetic CFGs.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use treeflow::{
    cfg::DepthFirstOrder,
    dataflow::{solve, LiveVariables, ReachingDefinitions},
    ir::{Function, FunctionBuilder, SymbolFlags, Ty},
};

/// Builds a function of `diamonds` stacked if/else diamonds, each arm
/// assigning one of a rotating set of symbols, followed by a counting
/// loop.
fn synthetic(diamonds: usize) -> Function {
    let mut fb = FunctionBuilder::new("bench");
    let c = fb.symbol("c", Ty::I32, SymbolFlags::PARAM);
    let syms: Vec<_> = (0..8)
        .map(|k| fb.symbol(&format!("v{k}"), Ty::I32, SymbolFlags::empty()))
        .collect();

    let mut next = 0usize;
    for d in 0..diamonds {
        let head = next;
        let left = next + 1;
        let right = next + 2;
        let join = next + 3;

        let rc = fb.read(c);
        fb.set_root(head, rc);
        fb.cond(head, left, right);

        let sym = syms[d % syms.len()];
        let lit = fb.int(d as i64);
        let set = fb.assign(sym, lit);
        fb.set_root(left, set);
        fb.jump(left, join);

        let other = syms[(d + 1) % syms.len()];
        let lit = fb.int(d as i64 + 1);
        let set = fb.assign(other, lit);
        fb.set_root(right, set);
        fb.jump(right, join);

        next = join;
    }

    // Tail loop: i < 100 { i += 1 }
    let i = fb.symbol("i", Ty::I32, SymbolFlags::empty());
    let header = next + 1;
    let body = next + 2;
    let exit = next + 3;

    let zero = fb.int(0);
    let init = fb.assign(i, zero);
    fb.set_root(next, init);
    fb.jump(next, header);

    let ri = fb.read(i);
    let bound = fb.int(100);
    let test = fb.lt(ri, bound);
    fb.set_root(header, test);
    fb.cond(header, body, exit);

    let one = fb.int(1);
    let bump = fb.add_assign(i, one);
    fb.set_root(body, bump);
    fb.jump(body, header);

    fb.ret(exit);
    fb.finish().expect("synthetic CFG is well-formed")
}

fn bench_solver(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver");

    for &diamonds in &[8usize, 64, 256] {
        let func = synthetic(diamonds);

        group.bench_with_input(
            BenchmarkId::new("reaching-definitions", diamonds),
            &func,
            |b, func| {
                b.iter(|| {
                    let rd = ReachingDefinitions::new(func);
                    let dfo = DepthFirstOrder::compute(func).unwrap();
                    solve(&rd, func, &dfo).unwrap()
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("live-variables", diamonds),
            &func,
            |b, func| {
                b.iter(|| {
                    let live = LiveVariables::new(func);
                    let dfo = DepthFirstOrder::compute(func).unwrap();
                    solve(&live, func, &dfo).unwrap()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_solver);
criterion_main!(benches);
