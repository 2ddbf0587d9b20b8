// gpu/mod.rs — wgpu execution layer.
//
// Everything that touches the device lives here; the parent crate is pure
// host code (planner, config, reference forward, animation and scene maths).
//
//   device   adapter/device/queue, profile, workgroup width
//   program  WGSL template expansion and pipeline build with error capture
//   buffers  NeuralBuffers: sole owner of weights, biases, activations
//   compute  NeuralCompute: one compute pass per layer
//   stepper  LayerStepper: single-layer stepping with display easing
//
// The host reference in `crate::reference` is authoritative; GPU tests
// compare against it.

pub mod buffers;
pub mod compute;
pub mod device;
pub mod program;
pub mod stepper;

pub use buffers::NeuralBuffers;
pub use compute::{check_dispatch_limit, NeuralCompute, PassState, TimingSource};
pub use device::{DeviceProfile, GpuDevice, GpuError, WorkgroupSize};
pub use stepper::LayerStepper;
