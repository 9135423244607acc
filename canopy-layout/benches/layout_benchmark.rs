use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use canopy_layout::{
    arrange, auto_position, flow_layout, ArrangeNode, ArrangeOptions, ArrangeStrategy,
    Constraint, FlowEdge, FlowNode, FlowOptions, PlacementConfig, Point, Rect, Size,
    DEFAULT_NODE_SIZE,
};

fn grid_rects(n: usize) -> Vec<Rect> {
    (0..n)
        .map(|i| {
            let col = (i % 20) as f64;
            let row = (i / 20) as f64;
            Rect::new(100.0 + col * 240.0, 100.0 + row * 140.0, 200.0, 100.0)
        })
        .collect()
}

/// Benchmark: pick a free slot on a page that already holds N nodes
fn bench_auto_position(c: &mut Criterion) {
    let mut group = c.benchmark_group("auto_position");
    let config = PlacementConfig::default();

    for count in [100, 1_000] {
        let existing = grid_rects(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &existing, |b, rects| {
            b.iter(|| auto_position(rects, DEFAULT_NODE_SIZE, &config));
        });
    }

    group.finish();
}

/// Benchmark: layered layout of a binary tree with N nodes
fn bench_flow_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("flow_layout_tree");

    for count in [100, 1_000] {
        let nodes: Vec<FlowNode> = (0..count)
            .map(|i| FlowNode {
                id: format!("n{i}"),
                position: Point::ORIGIN,
                size: Size::default(),
            })
            .collect();
        let edges: Vec<FlowEdge> = (1..count)
            .map(|i| FlowEdge {
                source: format!("n{}", (i - 1) / 2),
                source_port: "flow-out".into(),
                target: format!("n{i}"),
                target_port: "flow-in".into(),
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| flow_layout(&nodes, &edges, &FlowOptions::default()).unwrap());
        });
    }

    group.finish();
}

/// Benchmark: preserve-arrangement with a separation constraint
fn bench_arrange_separation(c: &mut Criterion) {
    let nodes: Vec<ArrangeNode> = (0..100)
        .map(|i| ArrangeNode {
            id: format!("n{i}"),
            position: Point::new((i % 10) as f64 * 150.0, (i / 10) as f64 * 80.0),
            size: Size::default(),
        })
        .collect();
    let opts = ArrangeOptions {
        strategy: ArrangeStrategy::Preserve,
        constraints: vec![Constraint::MinSeparation {
            distance: 20.0,
            node_ids: None,
        }],
        ..ArrangeOptions::default()
    };

    c.bench_function("arrange_min_separation_100", |b| {
        b.iter(|| arrange(&nodes, &[], &opts).unwrap())
    });
}

criterion_group!(
    benches,
    bench_auto_position,
    bench_flow_tree,
    bench_arrange_separation
);
criterion_main!(benches);
