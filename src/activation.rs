// activation.rs — scalar activation selector shared by host and shader.
//
// The numeric ids are part of the binary layout contract: they are written
// into `LayerInfo::activation_type` and matched by `activate()` in
// forward.wgsl. Unknown ids fall back to ReLU in the shader.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Nonlinearity applied to every output neuron of a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
}

impl Activation {
    /// Id stored in `LayerInfo::activation_type`.
    pub fn id(self) -> u32 {
        match self {
            Activation::Relu => 0,
            Activation::Sigmoid => 1,
            Activation::Tanh => 2,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Activation::Relu),
            1 => Some(Activation::Sigmoid),
            2 => Some(Activation::Tanh),
            _ => None,
        }
    }

    /// Host evaluation, identical in formula to the WGSL `activate()`.
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activation::Relu => write!(f, "ReLU"),
            Activation::Sigmoid => write!(f, "Sigmoid"),
            Activation::Tanh => write!(f, "Tanh"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_round_trip() {
        for act in [Activation::Relu, Activation::Sigmoid, Activation::Tanh] {
            assert_eq!(Activation::from_id(act.id()), Some(act));
        }
        assert_eq!(Activation::from_id(3), None);
    }

    #[test]
    fn test_relu_clamps_negative() {
        assert_eq!(Activation::Relu.apply(-2.5), 0.0);
        assert_eq!(Activation::Relu.apply(0.5), 0.5);
    }

    #[test]
    fn test_sigmoid_midpoint_and_saturation() {
        assert!((Activation::Sigmoid.apply(0.0) - 0.5).abs() < 1e-6);
        assert!(Activation::Sigmoid.apply(20.0) > 0.999);
        assert!(Activation::Sigmoid.apply(-20.0) < 0.001);
    }

    #[test]
    fn test_tanh_is_odd() {
        let a = Activation::Tanh.apply(0.7);
        let b = Activation::Tanh.apply(-0.7);
        assert!((a + b).abs() < 1e-6);
    }

    #[test]
    fn test_serde_lowercase_names() {
        let json = serde_json::to_string(&[Activation::Relu, Activation::Tanh]).unwrap();
        assert_eq!(json, r#"["relu","tanh"]"#);
        let back: Vec<Activation> = serde_json::from_str(r#"["sigmoid"]"#).unwrap();
        assert_eq!(back, vec![Activation::Sigmoid]);
    }
}
