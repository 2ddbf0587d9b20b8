// reference.rs — host reference forward pass.
//
// Evaluates a network with exactly the buffer conventions the GPU kernel
// uses: one contiguous activation array, each layer reading its input block
// and writing its output block in place. GPU results are checked against
// this in tests, and the benches compare the two paths.

use crate::config::check_len;
use crate::error::{NnError, NnResult};
use crate::layout::{LayerInfo, NetworkLayout};

/// Evaluate one weight layer in place on a full activation array.
///
/// Mirrors a single `forward_layer` dispatch: for every output neuron,
/// `act(bias + sum(w[out][in] * x[in]))`. Fails with `SizeMismatch` when a
/// slice is too short for the blocks `layer` addresses; nothing is written
/// in that case.
pub fn forward_layer(
    layer: &LayerInfo,
    weights: &[f32],
    biases: &[f32],
    activations: &mut [f32],
) -> NnResult<()> {
    let in_off = layer.input_offset as usize;
    let in_len = layer.input_size as usize;
    let out_off = layer.output_offset as usize;
    let out_len = layer.output_size as usize;

    check_min_len("weights", layer.weight_offset as usize + layer.weight_count(), weights.len())?;
    check_min_len("biases", layer.bias_offset as usize + out_len, biases.len())?;
    check_min_len(
        "activations",
        (in_off + in_len).max(out_off + out_len),
        activations.len(),
    )?;

    let act = layer.activation().unwrap_or(crate::activation::Activation::Relu);
    for out_idx in 0..out_len {
        let row = layer.weight_index(out_idx, 0);
        let mut sum = biases[layer.bias_offset as usize + out_idx];
        for in_idx in 0..in_len {
            sum += weights[row + in_idx] * activations[in_off + in_idx];
        }
        activations[out_off + out_idx] = act.apply(sum);
    }
    Ok(())
}

fn check_min_len(what: &'static str, required: usize, actual: usize) -> NnResult<()> {
    if actual < required {
        return Err(NnError::SizeMismatch { what, expected: required, actual });
    }
    Ok(())
}

/// Full forward pass. Returns the whole activation array (length
/// `total_neurons`); the output block is its last `output_size` entries.
pub fn forward(
    layout: &NetworkLayout,
    weights: &[f32],
    biases: &[f32],
    inputs: &[f32],
) -> NnResult<Vec<f32>> {
    check_len("weights", layout.total_weights as usize, weights.len())?;
    check_len("biases", layout.total_biases as usize, biases.len())?;
    check_len("inputs", layout.input_size(), inputs.len())?;

    let mut activations = vec![0.0f32; layout.total_neurons as usize];
    activations[..inputs.len()].copy_from_slice(inputs);
    for layer in &layout.layers {
        forward_layer(layer, weights, biases, &mut activations)?;
    }
    Ok(activations)
}

/// Convenience: run `forward` and return only the output block.
pub fn predict(
    layout: &NetworkLayout,
    weights: &[f32],
    biases: &[f32],
    inputs: &[f32],
) -> NnResult<Vec<f32>> {
    let all = forward(layout, weights, biases, inputs)?;
    Ok(all[layout.output_offset()..].to_vec())
}

/// Largest absolute element-wise difference between two equal-length slices.
pub fn max_abs_diff(a: &[f32], b: &[f32]) -> NnResult<f32> {
    if a.len() != b.len() {
        return Err(NnError::SizeMismatch {
            what: "comparison",
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0f32, f32::max))
}
