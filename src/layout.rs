// layout.rs — buffer layout planner.
//
// Turns a topology (neurons per layer) plus one activation per weight layer
// into the per-layer `LayerInfo` records and the three buffer totals. Pure
// and deterministic: it touches no GPU state and can run before a device
// exists.
//
//
// BUFFER LAYOUT
// ─────────────
// Three flat f32 arrays, all offsets in elements (not bytes):
//
//   weights     : [layer0 W][layer1 W]...      W is row-major [out][in]
//   biases      : [layer0 b][layer1 b]...
//   activations : [T0 neurons][T1 neurons]...[Tn neurons]
//
// The activation buffer has no per-layer input copy. Layer i reads
// activations[input_offset .. input_offset + input_size] and writes
// activations[output_offset .. output_offset + output_size], and
// output_offset[i] == input_offset[i + 1]. For topology [2, 2, 1]:
//
//   index :  0   1   2   3   4
//   block : [ in0 in1 | h0  h1 | out ]
//   layer0:  reads 0..2, writes 2..4
//   layer1:  reads 2..4, writes 4..5
//
//
// LAYERINFO RECORD
// ────────────────
// Eight u32 fields, 32 bytes, 4-byte aligned. The WGSL struct in
// forward.wgsl has the same field order, so an array of them has a 32-byte
// stride in a storage buffer with no implicit padding. The size is asserted
// at compile time below.

use log::debug;

use crate::activation::Activation;
use crate::error::{NnError, NnResult};

// ---------------------------------------------------------------------------
// LayerInfo (must match WGSL struct LayerInfo exactly)
// ---------------------------------------------------------------------------

/// Per weight layer metadata shared by the host and the compute shader.
///
/// Layout must match `LayerInfo` in `forward.wgsl`:
///   offset  0: input_size
///   offset  4: output_size
///   offset  8: weight_offset   (elements into the weights buffer)
///   offset 12: bias_offset     (elements into the biases buffer)
///   offset 16: activation_type (see `Activation::id`)
///   offset 20: input_offset    (elements into the activations buffer)
///   offset 24: output_offset   (elements into the activations buffer)
///   offset 28: _pad
///   total: 32 bytes
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LayerInfo {
    pub input_size: u32,
    pub output_size: u32,
    pub weight_offset: u32,
    pub bias_offset: u32,
    pub activation_type: u32,
    pub input_offset: u32,
    pub output_offset: u32,
    pub _pad: u32,
}

/// Size in bytes of one `LayerInfo` record on both sides of the bus.
pub const LAYER_INFO_SIZE: usize = 32;

const _: () = assert!(std::mem::size_of::<LayerInfo>() == LAYER_INFO_SIZE);
const _: () = assert!(std::mem::align_of::<LayerInfo>() == 4);

impl LayerInfo {
    /// Number of weights owned by this layer (`input_size * output_size`).
    pub fn weight_count(&self) -> usize {
        self.input_size as usize * self.output_size as usize
    }

    /// Activation selector, if the stored id is a known one.
    pub fn activation(&self) -> Option<Activation> {
        Activation::from_id(self.activation_type)
    }

    /// Flat index of weight `[out_idx][in_idx]` in the weights buffer.
    pub fn weight_index(&self, out_idx: usize, in_idx: usize) -> usize {
        self.weight_offset as usize + out_idx * self.input_size as usize + in_idx
    }
}

// ---------------------------------------------------------------------------
// NetworkLayout
// ---------------------------------------------------------------------------

/// The planner's output: per-layer records plus buffer totals (in elements).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkLayout {
    pub topology: Vec<u32>,
    pub layers: Vec<LayerInfo>,
    pub total_weights: u32,
    pub total_biases: u32,
    pub total_neurons: u32,
}

impl NetworkLayout {
    /// Number of weight layers (`topology.len() - 1`).
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Neurons in the input block (`topology[0]`).
    pub fn input_size(&self) -> usize {
        self.topology[0] as usize
    }

    /// Neurons in the output block (last topology entry).
    pub fn output_size(&self) -> usize {
        self.topology[self.topology.len() - 1] as usize
    }

    /// Element offset of the output block in the activations buffer.
    pub fn output_offset(&self) -> usize {
        self.total_neurons as usize - self.output_size()
    }

    /// Records as raw bytes for upload into the metadata buffer.
    pub fn layer_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.layers)
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Compute per-layer offsets and buffer totals for a topology.
///
/// `activations` must hold exactly one entry per weight layer
/// (`topology.len() - 1`). Fails without producing any partial layout:
/// - `InvalidTopology` for fewer than two layers, a zero-sized layer, or
///   offsets that do not fit in `u32`.
/// - `ConfigMismatch` when the activation count is wrong.
pub fn plan(topology: &[u32], activations: &[Activation]) -> NnResult<NetworkLayout> {
    if topology.len() < 2 {
        return Err(NnError::InvalidTopology {
            reason: format!("need at least 2 layers, got {}", topology.len()),
        });
    }
    let layer_count = topology.len() - 1;
    if activations.len() != layer_count {
        return Err(NnError::ConfigMismatch {
            expected: layer_count,
            actual: activations.len(),
        });
    }
    if let Some(pos) = topology.iter().position(|&n| n == 0) {
        return Err(NnError::InvalidTopology {
            reason: format!("layer {pos} has zero neurons"),
        });
    }

    let overflow = || NnError::InvalidTopology {
        reason: "buffer offsets overflow u32".to_string(),
    };

    let mut layers = Vec::with_capacity(layer_count);
    let mut total_weights: u32 = 0;
    let mut total_biases: u32 = 0;
    let mut activation_offset: u32 = 0;

    for (i, &act) in activations.iter().enumerate() {
        let input_size = topology[i];
        let output_size = topology[i + 1];
        let output_offset = activation_offset.checked_add(input_size).ok_or_else(overflow)?;

        let info = LayerInfo {
            input_size,
            output_size,
            weight_offset: total_weights,
            bias_offset: total_biases,
            activation_type: act.id(),
            input_offset: activation_offset,
            output_offset,
            _pad: 0,
        };
        debug!(
            "layer {i}: in={input_size} out={output_size} {act} | input_off={} output_off={} weight_off={} bias_off={}",
            info.input_offset, info.output_offset, info.weight_offset, info.bias_offset
        );
        layers.push(info);

        let weights = input_size.checked_mul(output_size).ok_or_else(overflow)?;
        total_weights = total_weights.checked_add(weights).ok_or_else(overflow)?;
        total_biases = total_biases.checked_add(output_size).ok_or_else(overflow)?;
        activation_offset = output_offset;
    }

    let last = topology[layer_count];
    let total_neurons = activation_offset.checked_add(last).ok_or_else(overflow)?;

    Ok(NetworkLayout {
        topology: topology.to_vec(),
        layers,
        total_weights,
        total_biases,
        total_neurons,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const RELU2: [Activation; 2] = [Activation::Relu, Activation::Relu];

    #[test]
    fn test_layer_info_is_32_bytes() {
        assert_eq!(std::mem::size_of::<LayerInfo>(), 32);
        let layout = plan(&[2, 2, 1], &RELU2).unwrap();
        assert_eq!(layout.layer_bytes().len(), 2 * LAYER_INFO_SIZE);
    }

    #[test]
    fn test_xor_layout() {
        let layout = plan(&[2, 2, 1], &RELU2).unwrap();
        assert_eq!(layout.total_weights, 6);
        assert_eq!(layout.total_biases, 3);
        assert_eq!(layout.total_neurons, 5);

        let l0 = layout.layers[0];
        assert_eq!((l0.input_size, l0.output_size), (2, 2));
        assert_eq!((l0.weight_offset, l0.bias_offset), (0, 0));
        assert_eq!((l0.input_offset, l0.output_offset), (0, 2));

        let l1 = layout.layers[1];
        assert_eq!((l1.input_size, l1.output_size), (2, 1));
        assert_eq!((l1.weight_offset, l1.bias_offset), (4, 2));
        assert_eq!((l1.input_offset, l1.output_offset), (2, 4));

        assert_eq!(layout.output_offset(), 4);
    }

    #[test]
    fn test_activation_ids_recorded() {
        let layout = plan(&[3, 4, 2], &[Activation::Tanh, Activation::Sigmoid]).unwrap();
        assert_eq!(layout.layers[0].activation(), Some(Activation::Tanh));
        assert_eq!(layout.layers[1].activation(), Some(Activation::Sigmoid));
    }

    #[test]
    fn test_weight_index_is_row_major() {
        let layout = plan(&[3, 4, 2], &RELU2).unwrap();
        let l1 = layout.layers[1];
        // Layer 1 starts after 3*4 = 12 weights; row stride is input_size = 4.
        assert_eq!(l1.weight_index(0, 0), 12);
        assert_eq!(l1.weight_index(1, 3), 12 + 4 + 3);
    }

    #[test]
    fn test_activation_count_mismatch() {
        let err = plan(&[2, 2, 1], &[Activation::Relu]).unwrap_err();
        assert!(matches!(err, NnError::ConfigMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_single_layer_topology_rejected() {
        let err = plan(&[4], &[]).unwrap_err();
        assert!(matches!(err, NnError::InvalidTopology { .. }));
        let err = plan(&[], &[]).unwrap_err();
        assert!(matches!(err, NnError::InvalidTopology { .. }));
    }

    #[test]
    fn test_zero_sized_layer_rejected() {
        let err = plan(&[2, 0, 1], &RELU2).unwrap_err();
        assert!(matches!(err, NnError::InvalidTopology { .. }));
    }

    #[test]
    fn test_overflow_rejected() {
        let err = plan(&[u32::MAX, 2], &[Activation::Relu]).unwrap_err();
        assert!(matches!(err, NnError::InvalidTopology { .. }));
    }
}
