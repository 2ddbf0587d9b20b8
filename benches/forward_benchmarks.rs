// benches/forward_benchmarks.rs — planner, host reference and GPU forward.
//
//   cargo bench --bench forward_benchmarks
//
// GPU benchmarks are skipped (with a log line) when no adapter is available.
//
//
// CRITERION + GPU CAVEATS
// ────────────────────────
// `forward` only submits; without a wait the timing would measure encoding.
// The GPU cases therefore enable profiling, which makes `forward` block on
// `device.poll(Wait)`. That is the latency a caller sees before it can read
// outputs. Warm-up is raised because some drivers compile pipelines lazily.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

use neuravis::gpu::{GpuDevice, NeuralBuffers, NeuralCompute};
use neuravis::reference;
use neuravis::{plan, Activation, NetworkConfig};

// ============================================================
// Shared helpers
// ============================================================

fn mlp(topology: &[u32]) -> NetworkConfig {
    let n = topology.len() - 1;
    let mut activations = vec![Activation::Relu; n];
    activations[n - 1] = Activation::Sigmoid;

    let weights: usize = topology.windows(2).map(|p| (p[0] * p[1]) as usize).sum();
    let biases: usize = topology[1..].iter().map(|&x| x as usize).sum();
    NetworkConfig {
        topology: topology.to_vec(),
        activations,
        weights: (0..weights).map(|i| ((i % 17) as f32 - 8.0) * 0.01).collect(),
        biases: (0..biases).map(|i| ((i % 5) as f32 - 2.0) * 0.1).collect(),
    }
}

const SHAPES: [(&str, &[u32]); 3] = [
    ("xor_2-2-1", &[2, 2, 1]),
    ("mnist_784-128-64-10", &[784, 128, 64, 10]),
    ("wide_1024-1024-1024", &[1024, 1024, 1024]),
];

// ============================================================
// Planner
// ============================================================

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");
    for (label, topology) in SHAPES {
        let acts = vec![Activation::Relu; topology.len() - 1];
        group.bench_with_input(BenchmarkId::from_parameter(label), topology, |b, t| {
            b.iter(|| plan(t, &acts))
        });
    }
    group.finish();
}

// ============================================================
// Forward: host reference vs GPU
// ============================================================

fn bench_forward(c: &mut Criterion) {
    let _ = env_logger::try_init();
    let gpu = match GpuDevice::new() {
        Ok(gpu) => Some(gpu),
        Err(e) => {
            log::warn!("no GPU adapter ({e}), benchmarking host reference only");
            None
        }
    };

    let mut group = c.benchmark_group("forward");
    group.warm_up_time(Duration::from_secs(2));

    for (label, topology) in SHAPES {
        let cfg = mlp(topology);
        let layout = cfg.validate().expect("bench network is valid");
        let inputs = vec![0.5f32; topology[0] as usize];

        group.bench_function(BenchmarkId::new("host", label), |b| {
            b.iter(|| reference::forward(&layout, &cfg.weights, &cfg.biases, &inputs))
        });

        let Some(gpu) = gpu.as_ref() else { continue };
        let mut buffers = NeuralBuffers::from_config(gpu, &cfg).expect("buffer allocation");
        let mut compute =
            NeuralCompute::with_default_program(gpu, &buffers).expect("forward program");
        compute.set_profiling_enabled(true);
        buffers.set_inputs(gpu, &inputs).expect("input length");

        group.bench_function(BenchmarkId::new("gpu", label), |b| {
            b.iter(|| compute.forward(gpu, &mut buffers))
        });

        group.bench_function(BenchmarkId::new("gpu_with_readback", label), |b| {
            b.iter(|| {
                compute.forward(gpu, &mut buffers).expect("forward");
                buffers.read_outputs(gpu)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_plan, bench_forward);
criterion_main!(benches);
