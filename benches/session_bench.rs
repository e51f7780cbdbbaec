//! Benchmark for one optimizer session
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use onnx_fuser::graph::Graph;
use onnx_fuser::pattern::PatternRegistry;
use onnx_fuser::proto::extensions::{make_node, make_tensor_value_info};
use onnx_fuser::proto::{GraphProto, TensorProto};
use onnx_fuser::session::{OptimizerSession, SessionConfig};

fn f32_tensor(name: String, dims: &[i64], value: f32) -> TensorProto {
    let len = dims.iter().product::<i64>() as usize;
    TensorProto {
        name,
        dims: dims.to_vec(),
        data_type: 1,
        float_data: vec![value; len],
        ..Default::default()
    }
}

/// `blocks` chained ConvTranspose + BatchNormalization pairs, 16 channels each
fn deconv_bn_chain(blocks: usize) -> Graph {
    let c = 16;
    let mut proto = GraphProto {
        name: "deconv_bn_chain".to_string(),
        input: vec![make_tensor_value_info("x0", 1, &[1, c, 8, 8])],
        ..Default::default()
    };

    for i in 0..blocks {
        let x = format!("x{}", i);
        let y = format!("x{}", i + 1);
        let conv_out = format!("deconv{}_out", i);
        let names = ["W", "B", "gamma", "beta", "mean", "var"].map(|p| format!("{}{}", p, i));

        proto.initializer.push(f32_tensor(names[0].clone(), &[c, c, 1, 1], 0.01));
        proto.initializer.push(f32_tensor(names[1].clone(), &[c], 0.1));
        proto.initializer.push(f32_tensor(names[2].clone(), &[c], 1.5));
        proto.initializer.push(f32_tensor(names[3].clone(), &[c], -0.2));
        proto.initializer.push(f32_tensor(names[4].clone(), &[c], 0.05));
        proto.initializer.push(f32_tensor(names[5].clone(), &[c], 0.9));
        proto.node.push(make_node(
            "ConvTranspose",
            &[x.as_str(), names[0].as_str(), names[1].as_str()],
            &[conv_out.as_str()],
            &format!("deconv{}", i),
        ));
        proto.node.push(make_node(
            "BatchNormalization",
            &[
                conv_out.as_str(),
                names[2].as_str(),
                names[3].as_str(),
                names[4].as_str(),
                names[5].as_str(),
            ],
            &[y.as_str()],
            &format!("bn{}", i),
        ));
    }
    proto
        .output
        .push(make_tensor_value_info(&format!("x{}", blocks), 1, &[1, c, 8, 8]));

    Graph::from_proto(&proto).expect("benchmark graph is well formed")
}

fn session_benchmark(c: &mut Criterion) {
    let registry = PatternRegistry::with_defaults();
    let mut group = c.benchmark_group("session");

    for blocks in [8, 64, 256] {
        let graph = deconv_bn_chain(blocks);
        group.bench_with_input(BenchmarkId::new("deconv_bn", blocks), &graph, |b, graph| {
            b.iter(|| {
                let mut session = OptimizerSession::new(&registry)
                    .with_config(SessionConfig::new().with_max_iterations(2));
                session.load(graph.clone()).expect("load");
                black_box(session.optimize().expect("optimize"))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, session_benchmark);
criterion_main!(benches);
