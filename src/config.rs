// config.rs — network description handed to the store.
//
// A `NetworkConfig` carries everything needed to stand up a network on the
// GPU: topology, one activation per weight layer, and the flat weight and
// bias arrays in the planner's layout (row-major [out][in] per layer,
// concatenated in layer order).
//
// JSON form:
//
//   {
//     "topology":    [2, 2, 1],
//     "activations": ["relu", "relu"],
//     "weights":     [1, 1, 1, 1, 1, -2],
//     "biases":      [0, -1.5, 0]
//   }

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::error::{NnError, NnResult};
use crate::layout::{self, NetworkLayout};

/// Topology, activations and parameters of a dense feed-forward network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Neurons per layer, input first. At least two entries, all non-zero.
    pub topology: Vec<u32>,
    /// One activation per weight layer (`topology.len() - 1`).
    pub activations: Vec<Activation>,
    /// All weights, `sum(topology[i] * topology[i + 1])` entries.
    pub weights: Vec<f32>,
    /// All biases, `sum(topology[i + 1])` entries.
    pub biases: Vec<f32>,
}

impl NetworkConfig {
    /// The hand-weighted 2 → 2 → 1 ReLU demonstration network.
    ///
    /// Note that with these weights input (1, 1) yields hidden (2, 0.5) and
    /// output 1, not the XOR value 0.
    pub fn xor() -> Self {
        NetworkConfig {
            topology: vec![2, 2, 1],
            activations: vec![Activation::Relu, Activation::Relu],
            weights: vec![
                1.0, 1.0, // hidden 0
                1.0, 1.0, // hidden 1
                1.0, -2.0, // output
            ],
            biases: vec![0.0, -1.5, 0.0],
        }
    }

    pub fn from_json_str(json: &str) -> NnResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> NnResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> NnResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Run the planner and check that the parameter arrays fit the layout.
    pub fn validate(&self) -> NnResult<NetworkLayout> {
        let layout = layout::plan(&self.topology, &self.activations)?;
        check_len("weights", layout.total_weights as usize, self.weights.len())?;
        check_len("biases", layout.total_biases as usize, self.biases.len())?;
        Ok(layout)
    }
}

pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> NnResult<()> {
    if expected != actual {
        return Err(NnError::SizeMismatch { what, expected, actual });
    }
    Ok(())
}
