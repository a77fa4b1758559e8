use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wfst::prelude::*;

const N_LABELS: i32 = 8;

/// Layered acceptor with `width` states per layer, every state connected to every state of the
/// next layer.
fn lattice(layers: u32, width: u32) -> ConstAutomatonRef {
    let mut arcs = vec![];
    for layer in 0..layers {
        let from = |i: u32| if layer == 0 { 0 } else { 1 + (layer - 1) * width + i };
        let sources = if layer == 0 { 1 } else { width };
        for i in 0..sources {
            for j in 0..width {
                let to = 1 + layer * width + j;
                let label = ((i * 7 + j * 3 + layer) % N_LABELS as u32) as LabelId;
                let weight = ((i + 2 * j + layer) % 5) as f32 + 0.5;
                arcs.push((from(i), to, label, weight));
            }
        }
    }
    let last = (layers - 1) * width + 1;
    StaticAutomaton::builder(Type::Acceptor, tropical())
        .with_arcs(arcs)
        .with_finals((last..last + width).map(|s| (s, 0.0)))
        .build()
        .into_ref()
}

/// Single state transducer mapping every label onto its successor.
fn rotation() -> ConstAutomatonRef {
    StaticAutomaton::builder(Type::Transducer, tropical())
        .with_transducer_arcs((0..N_LABELS).map(|l| (0, 0, l, (l + 1) % N_LABELS, 0.0)))
        .with_finals([(0, 0.0)])
        .build()
        .into_ref()
}

fn compose_and_copy(c: &mut Criterion) {
    let left = lattice(50, 6);
    let right = rotation();
    c.bench_function("compose 50x6 lattice", |b| {
        b.iter(|| {
            let composed = compose_matching(left.clone(), right.clone()).unwrap();
            black_box(static_copy(composed.as_ref()))
        })
    });
}

fn determinize_and_minimize(c: &mut Criterion) {
    let f = lattice(30, 5);
    c.bench_function("determinize 30x5 lattice", |b| {
        b.iter(|| black_box(static_copy(determinize(f.clone()).as_ref())))
    });
    c.bench_function("minimize 30x5 lattice", |b| {
        b.iter(|| black_box(static_copy(minimize(determinize(f.clone())).as_ref())))
    });
}

fn shortest_paths(c: &mut Criterion) {
    let f = lattice(200, 8);
    c.bench_function("sssp 200x8 lattice", |b| b.iter(|| black_box(sssp(f.clone()))));
    c.bench_function("best 200x8 lattice", |b| {
        b.iter(|| black_box(static_copy(best(f.clone()).as_ref())))
    });
    c.bench_function("10-best 200x8 lattice", |b| {
        b.iter(|| black_box(static_copy(nbest(f.clone(), 10).as_ref())))
    });
}

criterion_group!(benches, compose_and_copy, determinize_and_minimize, shortest_paths);
criterion_main!(benches);
