// gpu/stepper.rs — interactive layer-by-layer driver.
//
// Runs one weight layer per `step()` and animates the change for display.
// Two activation vectors are kept:
//
//   true_activations   exact GPU result after the last step (authoritative)
//   animator.display   eased values uploaded by `tick()` for rendering
//
// `tick()` overwrites the GPU activation buffer with display values, so
// `step()` first restores `true_activations` and only then dispatches. The
// next layer therefore never reads an interpolated input.

use log::debug;

use crate::animation::{ActivationAnimator, DEFAULT_SPEED};
use crate::config::check_len;
use crate::error::NnResult;
use crate::gpu::buffers::NeuralBuffers;
use crate::gpu::compute::NeuralCompute;
use crate::gpu::device::GpuDevice;

pub struct LayerStepper {
    next_layer: usize,
    layer_count: usize,
    true_activations: Vec<f32>,
    history: Vec<Vec<f32>>,
    animator: ActivationAnimator,
}

impl LayerStepper {
    /// A stepper sized for `buffers`, starting from all-zero activations.
    /// Call `reset` before the first `step`.
    pub fn new(buffers: &NeuralBuffers) -> Self {
        Self::with_speed(buffers, DEFAULT_SPEED)
    }

    pub fn with_speed(buffers: &NeuralBuffers, speed: f32) -> Self {
        let zeros = vec![0.0; buffers.total_neurons() as usize];
        LayerStepper {
            next_layer: 0,
            layer_count: buffers.layout().layer_count(),
            history: vec![zeros.clone()],
            animator: ActivationAnimator::new(zeros.clone(), speed),
            true_activations: zeros,
        }
    }

    /// Start a new pass: zero activations, write `inputs`, clear history.
    pub fn reset(
        &mut self,
        gpu: &GpuDevice,
        buffers: &mut NeuralBuffers,
        inputs: &[f32],
    ) -> NnResult<()> {
        check_len("inputs", buffers.layout().input_size(), inputs.len())?;

        let mut state = vec![0.0; buffers.total_neurons() as usize];
        state[..inputs.len()].copy_from_slice(inputs);
        buffers.upload_activations(gpu, &state)?;

        self.layer_count = buffers.layout().layer_count();
        self.next_layer = 0;
        self.animator.snap(&state);
        self.history = vec![state.clone()];
        self.true_activations = state;
        Ok(())
    }

    /// Dispatch the next layer. Returns `false` (and does nothing) once
    /// every layer has run.
    pub fn step(
        &mut self,
        gpu: &GpuDevice,
        buffers: &mut NeuralBuffers,
        compute: &mut NeuralCompute,
    ) -> NnResult<bool> {
        if self.is_complete() {
            return Ok(false);
        }

        buffers.upload_activations(gpu, &self.true_activations)?;
        compute.forward_layer(gpu, buffers, self.next_layer)?;
        let post = buffers.read_all_activations(gpu)?;

        self.animator.retarget(&self.true_activations, &post);
        debug!("stepped layer {} of {}", self.next_layer + 1, self.layer_count);
        self.history.push(post.clone());
        self.true_activations = post;
        self.next_layer += 1;
        Ok(true)
    }

    /// Advance the display easing by `dt` seconds and upload it.
    pub fn tick(&mut self, gpu: &GpuDevice, buffers: &mut NeuralBuffers, dt: f32) -> NnResult<()> {
        let display = self.animator.update(dt);
        buffers.upload_activations(gpu, display)
    }

    /// True snapshots: index 0 is the state after `reset`, index k the state
    /// after layer k-1 ran.
    pub fn history(&self) -> &[Vec<f32>] {
        &self.history
    }

    pub fn true_activations(&self) -> &[f32] {
        &self.true_activations
    }

    pub fn display_activations(&self) -> &[f32] {
        self.animator.display()
    }

    pub fn next_layer(&self) -> usize {
        self.next_layer
    }

    pub fn is_complete(&self) -> bool {
        self.next_layer >= self.layer_count
    }

    pub fn is_settled(&self, eps: f32) -> bool {
        self.animator.is_settled(eps)
    }
}
