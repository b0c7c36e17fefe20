use criterion::{Criterion, black_box, criterion_group, criterion_main};

use ember_graphics::graph::{InputCreation, OutputCreation};
use ember_graphics::{
    DummyBackend, DummyBackendConfig, FrameGraph, FrameGraphDescription, LoadOp, NodeCreation,
    ResourceType, TextureFormat,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn chain_json(passes: usize) -> String {
    let mut list = vec![
        r#"{ "name": "pass_0", "outputs": [ { "name": "r0", "type": "attachment",
             "format": "RGBA8UNorm", "op": "LoadOpClear", "resolution": [1920, 1080] } ] }"#
            .to_string(),
    ];
    for i in 1..passes {
        list.push(format!(
            r#"{{ "name": "pass_{i}", "inputs": [ {{ "name": "r{prev}", "type": "attachment" }} ],
                 "outputs": [ {{ "name": "r{i}", "type": "attachment", "format": "RGBA8UNorm",
                                 "op": "LoadOpClear", "resolution": [1920, 1080] }} ] }}"#,
            prev = i - 1
        ));
    }
    format!(r#"{{ "name": "chain", "passes": [ {} ] }}"#, list.join(","))
}

fn fan_graph(readers: usize) -> FrameGraph {
    let mut graph = FrameGraph::new();
    let builder = graph.builder_mut();
    let attachment = |name: String| {
        OutputCreation::attachment(name, 512, 512, TextureFormat::Rgba16Float, LoadOp::Clear)
    };
    builder
        .create_node(NodeCreation::new("source").with_output(attachment("shared".into())))
        .unwrap();
    for i in 0..readers {
        builder
            .create_node(
                NodeCreation::new(format!("reader_{i}"))
                    .with_input(InputCreation::new("shared", ResourceType::Texture))
                    .with_output(attachment(format!("out_{i}"))),
            )
            .unwrap();
    }
    graph
}

fn backend() -> DummyBackend {
    let config = DummyBackendConfig::default()
        .with_max_textures(1024)
        .with_max_render_passes(1024)
        .with_max_frame_buffers(1024);
    DummyBackend::new(config).unwrap()
}

// ---------------------------------------------------------------------------
// Description parsing
// ---------------------------------------------------------------------------

fn bench_parse_chain(c: &mut Criterion) {
    let text = chain_json(32);
    c.bench_function("frame_graph_parse_32_passes_chain", |b| {
        b.iter(|| {
            let graph = FrameGraph::from_json(black_box(&text)).unwrap();
            black_box(graph);
        });
    });
}

fn bench_description_only(c: &mut Criterion) {
    let text = chain_json(32);
    c.bench_function("frame_graph_description_32_passes", |b| {
        b.iter(|| {
            let description =
                FrameGraphDescription::from_json(black_box(&text)).unwrap();
            black_box(description);
        });
    });
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

fn bench_compile_chain(c: &mut Criterion) {
    let text = chain_json(32);
    c.bench_function("frame_graph_compile_32_passes_chain", |b| {
        b.iter(|| {
            let mut backend = backend();
            let mut graph = FrameGraph::from_json(&text).unwrap();
            let report = graph.compile(&mut backend).unwrap();
            black_box(report);
            graph.shutdown(&mut backend).unwrap();
        });
    });
}

fn bench_recompile_chain(c: &mut Criterion) {
    let text = chain_json(32);
    let mut backend = backend();
    let mut graph = FrameGraph::from_json(&text).unwrap();
    graph.compile(&mut backend).unwrap();

    c.bench_function("frame_graph_recompile_32_passes_chain", |b| {
        b.iter(|| {
            let report = graph.compile(&mut backend).unwrap();
            black_box(report);
        });
    });
}

fn bench_compile_fan(c: &mut Criterion) {
    c.bench_function("frame_graph_compile_fan_64_readers", |b| {
        b.iter(|| {
            let mut backend = backend();
            let mut graph = fan_graph(64);
            let report = graph.compile(&mut backend).unwrap();
            black_box(report);
            graph.shutdown(&mut backend).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_parse_chain,
    bench_description_only,
    bench_compile_chain,
    bench_recompile_chain,
    bench_compile_fan,
);
criterion_main!(benches);
