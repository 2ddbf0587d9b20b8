// neuravis: GPU-resident feed-forward network with per-layer compute dispatch
//
// The planner turns a topology into flat-buffer offsets, `gpu::NeuralBuffers`
// holds the parameters and activations on the device, and
// `gpu::NeuralCompute` runs one compute pass per layer over them.

pub mod activation;
pub mod animation;
pub mod config;
pub mod error;
pub mod layout;
pub mod reference;
pub mod scene;

pub mod gpu;

pub use activation::Activation;
pub use config::NetworkConfig;
pub use error::{NnError, NnResult};
pub use layout::{plan, LayerInfo, NetworkLayout};
