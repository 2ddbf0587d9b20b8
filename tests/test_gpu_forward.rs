// tests/test_gpu_forward.rs — GPU store and dispatch against the host reference.
//
// All tests need a GPU adapter and are ignored by default:
//   cargo test --test test_gpu_forward -- --include-ignored

use neuravis::gpu::{DeviceProfile, GpuDevice, LayerStepper, NeuralBuffers, NeuralCompute};
use neuravis::reference;
use neuravis::{Activation, NetworkConfig, NnError};

fn gpu() -> GpuDevice {
    GpuDevice::new().expect("need a GPU adapter")
}

/// Deterministic pseudo-random network with values in [-1, 1].
fn random_config(topology: &[u32], activations: Vec<Activation>, seed: u64) -> NetworkConfig {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((state >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
    };
    let weights = topology.windows(2).map(|p| (p[0] * p[1]) as usize).sum();
    let biases = topology[1..].iter().map(|&n| n as usize).sum();
    NetworkConfig {
        topology: topology.to_vec(),
        activations,
        weights: (0..weights).map(|_| next()).collect(),
        biases: (0..biases).map(|_| next()).collect(),
    }
}

// ===== Store =====

#[test]
#[ignore = "requires a GPU adapter"]
fn store_round_trips_parameters() {
    let gpu = gpu();
    let cfg = random_config(&[5, 7, 3], vec![Activation::Tanh, Activation::Sigmoid], 1);
    let buffers = NeuralBuffers::from_config(&gpu, &cfg).unwrap();
    assert_eq!(buffers.read_weights(&gpu).unwrap(), cfg.weights);
    assert_eq!(buffers.read_biases(&gpu).unwrap(), cfg.biases);
}

#[test]
#[ignore = "requires a GPU adapter"]
fn set_inputs_touches_only_input_block() {
    let gpu = gpu();
    let mut buffers = NeuralBuffers::from_config(&gpu, &NetworkConfig::xor()).unwrap();
    buffers.upload_activations(&gpu, &[9.0; 5]).unwrap();
    buffers.set_inputs(&gpu, &[0.25, 0.75]).unwrap();
    assert_eq!(
        buffers.read_all_activations(&gpu).unwrap(),
        vec![0.25, 0.75, 9.0, 9.0, 9.0]
    );
}

#[test]
#[ignore = "requires a GPU adapter"]
fn clear_is_idempotent() {
    let gpu = gpu();
    let mut buffers = NeuralBuffers::from_config(&gpu, &NetworkConfig::xor()).unwrap();
    buffers.upload_activations(&gpu, &[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
    buffers.clear_activations(&gpu);
    buffers.clear_activations(&gpu);
    assert_eq!(buffers.read_all_activations(&gpu).unwrap(), vec![0.0; 5]);
}

#[test]
#[ignore = "requires a GPU adapter"]
fn size_mismatch_leaves_buffer_unchanged() {
    let gpu = gpu();
    let cfg = NetworkConfig::xor();
    let mut buffers = NeuralBuffers::from_config(&gpu, &cfg).unwrap();

    let err = buffers.upload_weights(&gpu, &[0.0; 5]).unwrap_err();
    assert!(matches!(err, NnError::SizeMismatch { what: "weights", expected: 6, actual: 5 }));
    assert!(buffers.set_inputs(&gpu, &[1.0, 2.0, 3.0]).is_err());
    assert!(buffers.upload_activations(&gpu, &[0.0; 4]).is_err());

    assert_eq!(buffers.read_weights(&gpu).unwrap(), cfg.weights);
}

#[test]
#[ignore = "requires a GPU adapter"]
fn oversized_buffer_is_rejected() {
    let gpu = gpu();
    let side = ((gpu.max_storage_binding() / 4) as f64).sqrt() as u32 + 2;
    let result = NeuralBuffers::new(&gpu, &[side, side], &[Activation::Relu]);
    assert!(matches!(result, Err(NnError::BufferTooLarge { what: "weights", .. })));
}

// ===== Dispatch =====

#[test]
#[ignore = "requires a GPU adapter"]
fn xor_end_to_end() {
    let gpu = gpu();
    let cfg = NetworkConfig::xor();
    let mut buffers = NeuralBuffers::from_config(&gpu, &cfg).unwrap();
    let mut compute = NeuralCompute::with_default_program(&gpu, &buffers).unwrap();
    assert_eq!(compute.layer_count(), 2);

    for (inputs, want) in [
        ([0.0, 0.0], 0.0),
        ([0.0, 1.0], 1.0),
        ([1.0, 0.0], 1.0),
        ([1.0, 1.0], 1.0),
    ] {
        buffers.clear_activations(&gpu);
        buffers.set_inputs(&gpu, &inputs).unwrap();
        compute.forward(&gpu, &mut buffers).unwrap();
        assert_eq!(buffers.read_outputs(&gpu).unwrap(), vec![want], "inputs {inputs:?}");
    }
}

#[test]
#[ignore = "requires a GPU adapter"]
fn gpu_matches_reference_on_random_network() {
    let gpu = gpu();
    let cfg = random_config(
        &[64, 300, 130, 10],
        vec![Activation::Relu, Activation::Tanh, Activation::Sigmoid],
        7,
    );
    let layout = cfg.validate().unwrap();
    let inputs: Vec<f32> = (0..64).map(|i| (i as f32 / 63.0) - 0.5).collect();

    let mut buffers = NeuralBuffers::from_config(&gpu, &cfg).unwrap();
    let mut compute = NeuralCompute::with_default_program(&gpu, &buffers).unwrap();
    buffers.clear_activations(&gpu);
    buffers.set_inputs(&gpu, &inputs).unwrap();
    compute.forward(&gpu, &mut buffers).unwrap();

    let want = reference::forward(&layout, &cfg.weights, &cfg.biases, &inputs).unwrap();
    let got = buffers.read_all_activations(&gpu).unwrap();
    let diff = reference::max_abs_diff(&want, &got).unwrap();
    assert!(diff < 1e-4, "max diff {diff}");
}

#[test]
#[ignore = "requires a GPU adapter"]
fn small_workgroup_covers_layer_tail() {
    // 64-wide groups: 100 outputs need two groups, the second partly idle.
    let gpu = GpuDevice::new_with_profile(DeviceProfile::RaspberryPi).expect("need a GPU adapter");
    let cfg = random_config(&[3, 100, 2], vec![Activation::Sigmoid, Activation::Relu], 3);
    let layout = cfg.validate().unwrap();

    let mut buffers = NeuralBuffers::from_config(&gpu, &cfg).unwrap();
    let mut compute = NeuralCompute::with_default_program(&gpu, &buffers).unwrap();
    assert_eq!(compute.workgroup_size().x, 64);

    buffers.clear_activations(&gpu);
    buffers.set_inputs(&gpu, &[0.5, -0.5, 1.0]).unwrap();
    compute.forward(&gpu, &mut buffers).unwrap();

    let want = reference::forward(&layout, &cfg.weights, &cfg.biases, &[0.5, -0.5, 1.0]).unwrap();
    let got = buffers.read_all_activations(&gpu).unwrap();
    assert!(reference::max_abs_diff(&want, &got).unwrap() < 1e-4);
}

#[test]
#[ignore = "requires a GPU adapter"]
fn invalid_program_produces_no_dispatcher() {
    let gpu = gpu();
    let buffers = NeuralBuffers::from_config(&gpu, &NetworkConfig::xor()).unwrap();
    let result = NeuralCompute::new(&gpu, "this is not wgsl", &buffers);
    assert!(matches!(result, Err(NnError::Initialization { .. })));
}

#[test]
#[ignore = "requires a GPU adapter"]
fn layer_wider_than_one_dispatch_is_rejected() {
    let gpu = GpuDevice::new_with_profile(DeviceProfile::RaspberryPi).expect("need a GPU adapter");
    let max = gpu.device.limits().max_compute_workgroups_per_dimension;
    // One workgroup more than a single dispatch dimension holds.
    let wide = max * gpu.workgroup_size.x + 1;
    let buffers = NeuralBuffers::new(&gpu, &[1, wide], &[Activation::Relu]).unwrap();
    let result = NeuralCompute::with_default_program(&gpu, &buffers);
    assert!(matches!(
        result,
        Err(NnError::DispatchTooLarge { layer: 0, workgroups, .. }) if workgroups == max + 1
    ));
}

// ===== Stepping =====

#[test]
#[ignore = "requires a GPU adapter"]
fn stepper_history_matches_per_layer_reference() {
    let gpu = gpu();
    let cfg = random_config(&[4, 6, 5, 2], vec![Activation::Tanh; 3], 11);
    let layout = cfg.validate().unwrap();
    let inputs = [0.1, -0.2, 0.3, -0.4];

    let mut buffers = NeuralBuffers::from_config(&gpu, &cfg).unwrap();
    let mut compute = NeuralCompute::with_default_program(&gpu, &buffers).unwrap();
    let mut stepper = LayerStepper::new(&buffers);
    stepper.reset(&gpu, &mut buffers, &inputs).unwrap();

    while stepper.step(&gpu, &mut buffers, &mut compute).unwrap() {
        // Display easing between steps must not affect the next layer.
        stepper.tick(&gpu, &mut buffers, 1.0 / 60.0).unwrap();
    }

    let mut want = vec![0.0f32; layout.total_neurons as usize];
    want[..4].copy_from_slice(&inputs);
    for (k, layer) in layout.layers.iter().enumerate() {
        reference::forward_layer(layer, &cfg.weights, &cfg.biases, &mut want).unwrap();
        let got = &stepper.history()[k + 1];
        assert!(reference::max_abs_diff(&want, got).unwrap() < 1e-5, "layer {k}");
    }
}
