// demos/xor_headless.rs
//
// Runs the XOR demonstration network (or a network loaded from JSON) on the
// GPU and prints each output next to the host reference.
//
// Usage:
//   RUST_LOG=info cargo run --example xor_headless
//   RUST_LOG=debug cargo run --example xor_headless -- net.json

use std::env;

use neuravis::gpu::{GpuDevice, NeuralBuffers, NeuralCompute};
use neuravis::{reference, NetworkConfig, NnError};

fn main() -> Result<(), NnError> {
    env_logger::init();

    let cfg = match env::args().nth(1) {
        Some(path) => NetworkConfig::from_json_file(path)?,
        None => NetworkConfig::xor(),
    };
    let layout = cfg.validate()?;

    let gpu = GpuDevice::new()?;
    println!(
        "Device: {} ({:?}), workgroup {}",
        gpu.adapter_info.name, gpu.adapter_info.backend, gpu.workgroup_size
    );

    let mut buffers = NeuralBuffers::from_config(&gpu, &cfg)?;
    let mut compute = NeuralCompute::with_default_program(&gpu, &buffers)?;
    compute.set_profiling_enabled(true);

    println!(
        "Topology {:?}, {} layers, timing with {}",
        cfg.topology,
        compute.layer_count(),
        if compute.has_gpu_timer() { "GPU timestamps" } else { "wall clock" }
    );

    for inputs in input_cases(layout.input_size()) {
        buffers.clear_activations(&gpu);
        buffers.set_inputs(&gpu, &inputs)?;
        compute.forward(&gpu, &mut buffers)?;

        let gpu_out = buffers.read_outputs(&gpu)?;
        let host_out = reference::predict(&layout, &cfg.weights, &cfg.biases, &inputs)?;
        let ms = compute
            .last_execution_time()
            .map_or(0.0, |d| d.as_secs_f64() * 1000.0);
        println!(
            "  {:?} -> gpu {:?}  host {:?}  (max diff {:.2e}, {:.3} ms)",
            inputs,
            gpu_out,
            host_out,
            reference::max_abs_diff(&gpu_out, &host_out)?,
            ms
        );
    }
    Ok(())
}

/// Every 0/1 corner for up to 4 inputs; a single 0.5-filled vector otherwise.
fn input_cases(n: usize) -> Vec<Vec<f32>> {
    if n > 4 {
        return vec![vec![0.5; n]];
    }
    (0..1u32 << n)
        .map(|bits| (0..n).map(|i| ((bits >> (n - 1 - i)) & 1) as f32).collect())
        .collect()
}
