// gpu/buffers.rs — GPU-resident parameter and activation store.
//
// `NeuralBuffers` owns the three flat f32 storage buffers of a network:
//
//   weights     total_weights elements   row-major [out][in] per layer
//   biases      total_biases  elements
//   activations total_neurons elements   one block per topology entry
//
// sized from the planner's totals (see layout.rs for the offset scheme).
//
//
// OWNERSHIP
// ─────────
// The store is the only owner of these buffers. The dispatcher and any
// renderer get binding access through `bind()`, which hands out borrowed
// `BindGroupEntry` values at caller-chosen slots; there is no accessor for
// the raw `wgpu::Buffer`. Host-side writes take `&mut self`, so the borrow
// checker enforces a single writer without buffer-level locking.
//
// Dropping the store (or re-initializing it) releases the buffers. wgpu
// keeps a buffer alive internally until in-flight command buffers that use
// it complete, so releasing right after a submit is safe.
//
//
// UPLOAD / READBACK ORDERING
// ──────────────────────────
// Uploads go through `queue.write_buffer`, which is staged and executed
// before the next `queue.submit`. Reads copy into a MAP_READ staging buffer
// in a fresh submission and block on `device.poll(Wait)`. Because one queue
// executes submissions in order, a read observes every earlier upload and
// every earlier dispatch on the same buffer.

use log::{debug, info};

use crate::activation::Activation;
use crate::config::{check_len, NetworkConfig};
use crate::error::{NnError, NnResult};
use crate::gpu::device::GpuDevice;
use crate::layout::{self, LayerInfo, NetworkLayout};

/// Default binding slots used by the forward kernel.
pub const WEIGHTS_BINDING: u32 = 0;
pub const BIASES_BINDING: u32 = 1;
pub const ACTIVATIONS_BINDING: u32 = 2;

const F32_SIZE: u64 = std::mem::size_of::<f32>() as u64;

/// Owner of the weights, biases and activations buffers of one network.
pub struct NeuralBuffers {
    weights: wgpu::Buffer,
    biases: wgpu::Buffer,
    activations: wgpu::Buffer,
    layout: NetworkLayout,
}

impl NeuralBuffers {
    /// Plan the layout and allocate the three buffers.
    ///
    /// Buffer contents are unspecified until uploaded. Fails with
    /// `ConfigMismatch` / `InvalidTopology` from the planner or
    /// `BufferTooLarge` before anything is allocated.
    pub fn new(gpu: &GpuDevice, topology: &[u32], activations: &[Activation]) -> NnResult<Self> {
        let layout = layout::plan(topology, activations)?;
        Self::allocate(gpu, layout)
    }

    /// Allocate for `config` and upload its weights and biases.
    pub fn from_config(gpu: &GpuDevice, config: &NetworkConfig) -> NnResult<Self> {
        let layout = config.validate()?;
        let mut buffers = Self::allocate(gpu, layout)?;
        buffers.upload_weights(gpu, &config.weights)?;
        buffers.upload_biases(gpu, &config.biases)?;
        Ok(buffers)
    }

    /// Re-plan for a new topology and replace all three buffers.
    ///
    /// The new buffers are allocated first; on any error the store keeps its
    /// previous layout and buffers untouched. On success the old buffers are
    /// released.
    pub fn initialize(
        &mut self,
        gpu: &GpuDevice,
        topology: &[u32],
        activations: &[Activation],
    ) -> NnResult<()> {
        let fresh = Self::new(gpu, topology, activations)?;
        let old = std::mem::replace(self, fresh);
        debug!(
            "released buffers for topology {:?} ({} neurons)",
            old.layout.topology, old.layout.total_neurons
        );
        Ok(())
    }

    fn allocate(gpu: &GpuDevice, layout: NetworkLayout) -> NnResult<Self> {
        let max = gpu.max_storage_binding();
        let sizes = [
            ("weights", layout.total_weights),
            ("biases", layout.total_biases),
            ("activations", layout.total_neurons),
        ];
        for (what, count) in sizes {
            let bytes = count as u64 * F32_SIZE;
            if bytes > max {
                return Err(NnError::BufferTooLarge { what, bytes, max });
            }
        }

        let weights = create_storage(gpu, "NeuralBuffers weights", layout.total_weights);
        let biases = create_storage(gpu, "NeuralBuffers biases", layout.total_biases);
        let activations = create_storage(gpu, "NeuralBuffers activations", layout.total_neurons);

        info!(
            "neural buffers initialized: topology {:?}, {} neurons, {} weights, {} biases",
            layout.topology, layout.total_neurons, layout.total_weights, layout.total_biases
        );

        Ok(NeuralBuffers { weights, biases, activations, layout })
    }

    // -----------------------------------------------------------------------
    // Uploads
    // -----------------------------------------------------------------------

    /// Replace the whole weights buffer. Length must equal `total_weights`.
    pub fn upload_weights(&mut self, gpu: &GpuDevice, values: &[f32]) -> NnResult<()> {
        check_len("weights", self.layout.total_weights as usize, values.len())?;
        gpu.queue.write_buffer(&self.weights, 0, bytemuck::cast_slice(values));
        Ok(())
    }

    /// Replace the whole biases buffer. Length must equal `total_biases`.
    pub fn upload_biases(&mut self, gpu: &GpuDevice, values: &[f32]) -> NnResult<()> {
        check_len("biases", self.layout.total_biases as usize, values.len())?;
        gpu.queue.write_buffer(&self.biases, 0, bytemuck::cast_slice(values));
        Ok(())
    }

    /// Write the input block (first `topology[0]` activations) only.
    pub fn set_inputs(&mut self, gpu: &GpuDevice, values: &[f32]) -> NnResult<()> {
        check_len("inputs", self.layout.input_size(), values.len())?;
        gpu.queue.write_buffer(&self.activations, 0, bytemuck::cast_slice(values));
        Ok(())
    }

    /// Replace the whole activations buffer, e.g. with interpolated display
    /// values. Length must equal `total_neurons`.
    pub fn upload_activations(&mut self, gpu: &GpuDevice, values: &[f32]) -> NnResult<()> {
        check_len("activations", self.layout.total_neurons as usize, values.len())?;
        gpu.queue.write_buffer(&self.activations, 0, bytemuck::cast_slice(values));
        Ok(())
    }

    /// Zero every activation. Idempotent.
    pub fn clear_activations(&mut self, gpu: &GpuDevice) {
        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("NeuralBuffers::clear_activations"),
        });
        // GPU memset: no staging copy, ordered after any pending write_buffer.
        encoder.clear_buffer(&self.activations, 0, None);
        gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    // -----------------------------------------------------------------------
    // Readback (synchronous)
    // -----------------------------------------------------------------------

    /// The output block: last `topology.last()` activations.
    pub fn read_outputs(&self, gpu: &GpuDevice) -> NnResult<Vec<f32>> {
        read_range(
            gpu,
            &self.activations,
            self.layout.output_offset(),
            self.layout.output_size(),
        )
    }

    pub fn read_all_activations(&self, gpu: &GpuDevice) -> NnResult<Vec<f32>> {
        read_range(gpu, &self.activations, 0, self.layout.total_neurons as usize)
    }

    pub fn read_weights(&self, gpu: &GpuDevice) -> NnResult<Vec<f32>> {
        read_range(gpu, &self.weights, 0, self.layout.total_weights as usize)
    }

    pub fn read_biases(&self, gpu: &GpuDevice) -> NnResult<Vec<f32>> {
        read_range(gpu, &self.biases, 0, self.layout.total_biases as usize)
    }

    // -----------------------------------------------------------------------
    // Binding
    // -----------------------------------------------------------------------

    /// Bind-group entries exposing the three buffers at the given slots.
    ///
    /// The entries borrow the store; build a bind group from them together
    /// with any other entries the caller's layout needs.
    pub fn bind(
        &self,
        weights_slot: u32,
        biases_slot: u32,
        activations_slot: u32,
    ) -> [wgpu::BindGroupEntry<'_>; 3] {
        [
            wgpu::BindGroupEntry { binding: weights_slot, resource: self.weights.as_entire_binding() },
            wgpu::BindGroupEntry { binding: biases_slot, resource: self.biases.as_entire_binding() },
            wgpu::BindGroupEntry {
                binding: activations_slot,
                resource: self.activations.as_entire_binding(),
            },
        ]
    }

    // -----------------------------------------------------------------------
    // Layout accessors
    // -----------------------------------------------------------------------

    pub fn layout(&self) -> &NetworkLayout {
        &self.layout
    }

    pub fn layer_info(&self) -> &[LayerInfo] {
        &self.layout.layers
    }

    pub fn topology(&self) -> &[u32] {
        &self.layout.topology
    }

    pub fn total_neurons(&self) -> u32 {
        self.layout.total_neurons
    }

    pub fn total_weights(&self) -> u32 {
        self.layout.total_weights
    }

    pub fn total_biases(&self) -> u32 {
        self.layout.total_biases
    }
}

fn create_storage(gpu: &GpuDevice, label: &str, elements: u32) -> wgpu::Buffer {
    gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: elements as u64 * F32_SIZE,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    })
}

/// Copy `len` f32 elements starting at element `offset` back to the host.
///
/// **Synchronous**: submits a copy into a MAP_READ staging buffer and
/// blocks on `device.poll(Wait)` until the map callback fires.
fn read_range(
    gpu: &GpuDevice,
    src: &wgpu::Buffer,
    offset: usize,
    len: usize,
) -> NnResult<Vec<f32>> {
    read_buffer(gpu, src, offset as u64 * F32_SIZE, len as u64 * F32_SIZE)
}

/// Copy `byte_len` bytes of `src` from `byte_offset` into a staging buffer,
/// wait for the map and reinterpret them as `T`. Blocking.
pub(crate) fn read_buffer<T: bytemuck::Pod>(
    gpu: &GpuDevice,
    src: &wgpu::Buffer,
    byte_offset: u64,
    byte_len: u64,
) -> NnResult<Vec<T>> {
    let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("NeuralBuffers readback"),
        size: byte_len,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("NeuralBuffers readback"),
    });
    encoder.copy_buffer_to_buffer(src, byte_offset, &staging, 0, byte_len);
    gpu.queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    gpu.device.poll(wgpu::Maintain::Wait);
    rx.recv().map_err(|_| NnError::ReadbackChannel)??;

    let mapped = slice.get_mapped_range();
    let out = bytemuck::cast_slice::<u8, T>(&mapped).to_vec();
    drop(mapped);
    staging.unmap();
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
