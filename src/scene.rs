// scene.rs — renderer-facing geometry derived from the layout.
//
// Pure helpers a visualiser needs to draw the network: where each neuron
// sits, which neurons each weight connects, and a colour for an activation
// value. Positions are in activation-buffer order, so neuron `k` here is
// element `k` of `read_all_activations()`.
//
// Layers are columns `LAYER_SPACING` apart along x; neurons in a column are
// `NEURON_SPACING` apart along y, centred on y = 0.

use crate::layout::NetworkLayout;

pub const LAYER_SPACING: f32 = 3.0;
pub const NEURON_SPACING: f32 = 1.0;

/// A neuron's position in scene space (z is always 0 for this layout).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeuronPosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One drawable weight: activation-buffer indices of both ends plus value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Connection {
    pub from: usize,
    pub to: usize,
    pub weight: f32,
}

/// Positions for every neuron, in activation-buffer order.
pub fn neuron_positions(topology: &[u32]) -> Vec<NeuronPosition> {
    let total: usize = topology.iter().map(|&n| n as usize).sum();
    let mut out = Vec::with_capacity(total);
    for (layer_idx, &size) in topology.iter().enumerate() {
        // Float before negation: size - 1 can be 0.
        let y_offset = -((size as f32 - 1.0) * NEURON_SPACING) / 2.0;
        let x = layer_idx as f32 * LAYER_SPACING;
        for n in 0..size {
            out.push(NeuronPosition {
                x,
                y: y_offset + n as f32 * NEURON_SPACING,
                z: 0.0,
            });
        }
    }
    out
}

/// Every weight as a connection, in weight-buffer order.
///
/// `weights` is the full weight array (e.g. from `read_weights`); entries
/// past `layout.total_weights` are ignored, missing ones end the list early.
pub fn connections(layout: &NetworkLayout, weights: &[f32]) -> Vec<Connection> {
    let mut out = Vec::with_capacity(layout.total_weights as usize);
    for layer in &layout.layers {
        for out_idx in 0..layer.output_size as usize {
            for in_idx in 0..layer.input_size as usize {
                let Some(&weight) = weights.get(layer.weight_index(out_idx, in_idx)) else {
                    return out;
                };
                out.push(Connection {
                    from: layer.input_offset as usize + in_idx,
                    to: layer.output_offset as usize + out_idx,
                    weight,
                });
            }
        }
    }
    out
}

/// Map `value` in `[min, max]` onto `[0, 1]`, clamped.
pub fn normalize(value: f32, min: f32, max: f32) -> f32 {
    if max <= min {
        return 0.0;
    }
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

/// Colour range for a set of activations: `[min(0, lowest), max(1, highest)]`.
///
/// Negative values (tanh, leaky outputs, raw inputs) keep distinct colours
/// instead of all clamping to the bottom of the map.
pub fn value_range(values: &[f32]) -> (f32, f32) {
    values
        .iter()
        .fold((0.0f32, 1.0f32), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Viridis colour map, `t` in `[0, 1]` → linear RGB in `[0, 1]`.
///
/// Piecewise-linear through five control points of the matplotlib map.
pub fn viridis(t: f32) -> [f32; 3] {
    const STOPS: [[f32; 3]; 5] = [
        [0.267, 0.005, 0.329],
        [0.229, 0.322, 0.546],
        [0.128, 0.567, 0.551],
        [0.369, 0.789, 0.383],
        [0.993, 0.906, 0.144],
    ];
    let t = t.clamp(0.0, 1.0) * (STOPS.len() - 1) as f32;
    let i = (t.floor() as usize).min(STOPS.len() - 2);
    let f = t - i as f32;
    let (a, b) = (STOPS[i], STOPS[i + 1]);
    [
        a[0] + (b[0] - a[0]) * f,
        a[1] + (b[1] - a[1]) * f,
        a[2] + (b[2] - a[2]) * f,
    ]
}

/// Pack linear RGB in `[0, 1]` into 0x00RRGGBB.
pub fn rgb_to_u32(rgb: [f32; 3]) -> u32 {
    let c = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
    (c(rgb[0]) << 16) | (c(rgb[1]) << 8) | c(rgb[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::layout::plan;

    #[test]
    fn test_positions_centered_per_layer() {
        let pos = neuron_positions(&[2, 3, 1]);
        assert_eq!(pos.len(), 6);
        assert_eq!(pos[0], NeuronPosition { x: 0.0, y: -0.5, z: 0.0 });
        assert_eq!(pos[1], NeuronPosition { x: 0.0, y: 0.5, z: 0.0 });
        assert_eq!(pos[2].y, -1.0);
        assert_eq!(pos[4].y, 1.0);
        assert_eq!(pos[5], NeuronPosition { x: 6.0, y: 0.0, z: 0.0 });
    }

    #[test]
    fn test_connections_follow_row_major_weights() {
        let layout = plan(&[2, 2, 1], &[Activation::Relu, Activation::Relu]).unwrap();
        let w = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let conns = connections(&layout, &w);
        assert_eq!(conns.len(), 6);
        // Hidden neuron 1 (buffer index 3) from input 0 is weight[2].
        assert_eq!(conns[2], Connection { from: 0, to: 3, weight: 3.0 });
        // Output (index 4) from hidden 1 (index 3) is weight[5].
        assert_eq!(conns[5], Connection { from: 3, to: 4, weight: 6.0 });
    }

    #[test]
    fn test_connections_short_weights() {
        let layout = plan(&[2, 2, 1], &[Activation::Relu, Activation::Relu]).unwrap();
        assert_eq!(connections(&layout, &[1.0, 2.0]).len(), 2);
    }

    #[test]
    fn test_value_range_keeps_negatives_apart() {
        assert_eq!(value_range(&[]), (0.0, 1.0));
        assert_eq!(value_range(&[0.2, 0.7]), (0.0, 1.0));
        let (lo, hi) = value_range(&[-0.8, 0.3, -0.2, 2.5]);
        assert_eq!((lo, hi), (-0.8, 2.5));
        assert!(normalize(-0.8, lo, hi) < normalize(-0.2, lo, hi));
        assert!(normalize(-0.2, lo, hi) < normalize(0.3, lo, hi));
    }

    #[test]
    fn test_normalize_and_viridis_ends() {
        assert_eq!(normalize(-2.0, -1.0, 1.0), 0.0);
        assert_eq!(normalize(0.0, -1.0, 1.0), 0.5);
        assert_eq!(normalize(5.0, 1.0, 1.0), 0.0);
        assert_eq!(viridis(0.0), [0.267, 0.005, 0.329]);
        let top = viridis(1.0);
        for (got, want) in top.iter().zip([0.993, 0.906, 0.144]) {
            assert!((got - want).abs() < 1e-5);
        }
    }

    #[test]
    fn test_rgb_pack() {
        assert_eq!(rgb_to_u32([1.0, 0.0, 0.0]), 0x00FF_0000);
        assert_eq!(rgb_to_u32([0.0, 0.0, 1.0]), 0x0000_00FF);
    }
}
