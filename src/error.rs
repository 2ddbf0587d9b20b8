// error.rs — error taxonomy for the planner, store and dispatcher.
//
// Every fallible operation returns `NnResult<T>`. A failed operation leaves
// the buffers and dispatcher exactly as they were before the call: length and
// index checks run before any GPU command is encoded.

use thiserror::Error;

use crate::gpu::device::GpuError;

/// Errors reported by the layout planner, the GPU store and the dispatcher.
#[derive(Error, Debug)]
pub enum NnError {
    #[error("activation count mismatch: expected {expected} (one per weight layer), got {actual}")]
    ConfigMismatch { expected: usize, actual: usize },

    #[error("{what} size mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("layer index {index} out of range for a network with {layer_count} weight layers")]
    Index { index: usize, layer_count: usize },

    #[error("compute program initialization failed: {message}")]
    Initialization { message: String },

    #[error("invalid topology: {reason}")]
    InvalidTopology { reason: String },

    #[error("{what} buffer needs {bytes} bytes, device storage binding limit is {max}")]
    BufferTooLarge {
        what: &'static str,
        bytes: u64,
        max: u64,
    },

    #[error("layer {layer} needs {workgroups} workgroups, device limit is {max} per dimension")]
    DispatchTooLarge { layer: usize, workgroups: u32, max: u32 },

    #[error("network layout changed since the dispatcher uploaded its layer metadata")]
    LayoutChanged,

    #[error("buffer readback failed: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),

    #[error("buffer readback callback was dropped before completion")]
    ReadbackChannel,

    #[error("GPU device error: {0}")]
    Device(#[from] GpuError),

    #[error("network config parse error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type NnResult<T> = std::result::Result<T, NnError>;
