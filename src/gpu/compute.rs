// gpu/compute.rs — per-layer forward dispatch.
//
// `NeuralCompute` owns the forward kernel, a read-only copy of the planner's
// `LayerInfo` records (uploaded once as a storage buffer) and one small
// uniform per layer carrying that layer's index. It owns no network data:
// every dispatch binds the store's buffers through `NeuralBuffers::bind`.
//
// Bind group @group(0):
//   0 weights      storage, read         (store)
//   1 biases       storage, read         (store)
//   2 activations  storage, read_write   (store)
//   3 layers       storage, read         (LayerInfo[N])
//   4 params       uniform               (layer index)
//
//
// PASS SEQUENCE
// ─────────────
//   Idle → Dispatched(0) → Barrier(0) → Dispatched(1) → … → Barrier(N-1) → Complete
//
// Each layer is its own compute pass. wgpu tracks storage-buffer usage per
// pass and inserts the write→read barrier at every pass boundary, so layer
// i+1 (and any later copy for readback) sees layer i's writes. Putting two
// layers in one pass would let their dispatches overlap.
//
// `forward()` encodes all N passes into one command buffer and submits
// once; `forward_layer(i)` submits a single pass.
//
//
// PROFILING
// ─────────
// With TIMESTAMP_QUERY available, a profiled `forward()` writes a timestamp
// at the beginning of the first layer pass and at the end of the last one,
// resolves both into a buffer in the same command buffer and reads them
// back (blocking). Ticks are scaled by `queue.get_timestamp_period()`.
// Without the feature the host clock brackets submit + `poll(Wait)`.

use std::time::{Duration, Instant};

use bytemuck::{Pod, Zeroable};
use log::{info, trace};
use wgpu::util::DeviceExt;

use crate::error::{NnError, NnResult};
use crate::gpu::buffers::{
    self, NeuralBuffers, ACTIVATIONS_BINDING, BIASES_BINDING, WEIGHTS_BINDING,
};
use crate::gpu::device::{GpuDevice, WorkgroupSize};
use crate::gpu::program::{self, ComputeProgram, ProgramDesc};
use crate::layout::LayerInfo;

/// The bundled forward kernel (template, see `program::expand_template`).
pub const FORWARD_WGSL: &str = include_str!("../shaders/forward.wgsl");
pub const FORWARD_ENTRY: &str = "forward_layer";

pub const LAYERS_BINDING: u32 = 3;
pub const PARAMS_BINDING: u32 = 4;

/// Uniform selecting the active layer. Padded to 16 bytes for uniform layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DispatchParams {
    layer_index: u32,
    _pad: [u32; 3],
}

/// Where the dispatcher is in a forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Dispatched(usize),
    Barrier(usize),
    Complete,
}

/// How the last profiled `forward()` was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingSource {
    GpuTimestamps,
    WallClock,
}

/// Two timestamp slots bracketing the layer passes of one `forward()`.
struct PassTimer {
    query_set: wgpu::QuerySet,
    resolve_buf: wgpu::Buffer,
    period_ns: f32,
}

impl PassTimer {
    const SLOTS: u32 = 2;

    fn new(gpu: &GpuDevice) -> Self {
        let query_set = gpu.device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("NeuralCompute timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: Self::SLOTS,
        });
        let resolve_buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("NeuralCompute timestamp resolve"),
            size: (Self::SLOTS * wgpu::QUERY_SIZE) as u64,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        PassTimer {
            query_set,
            resolve_buf,
            period_ns: gpu.queue.get_timestamp_period(),
        }
    }

    /// Slot 0 at the start of layer 0, slot 1 at the end of layer n-1.
    /// Middle layers are not timed.
    fn writes_for(&self, i: usize, n: usize) -> Option<wgpu::ComputePassTimestampWrites<'_>> {
        let beginning = (i == 0).then_some(0);
        let end = (i + 1 == n).then_some(1);
        if beginning.is_none() && end.is_none() {
            return None;
        }
        Some(wgpu::ComputePassTimestampWrites {
            query_set: &self.query_set,
            beginning_of_pass_write_index: beginning,
            end_of_pass_write_index: end,
        })
    }

    fn resolve(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.resolve_query_set(&self.query_set, 0..Self::SLOTS, &self.resolve_buf, 0);
    }

    /// Blocking: waits for the resolved timestamps and converts them.
    fn read(&self, gpu: &GpuDevice) -> NnResult<Duration> {
        let ticks: Vec<u64> = buffers::read_buffer(
            gpu,
            &self.resolve_buf,
            0,
            (Self::SLOTS * wgpu::QUERY_SIZE) as u64,
        )?;
        Ok(ticks_to_duration(ticks[0], ticks[1], self.period_ns))
    }
}

/// Elapsed time between two timestamp ticks of `period_ns` nanoseconds each.
/// A non-monotonic pair (seen on some drivers after a clock reset) is zero.
fn ticks_to_duration(start: u64, end: u64, period_ns: f32) -> Duration {
    let nanos = end.saturating_sub(start) as f64 * period_ns as f64;
    Duration::from_nanos(nanos.round() as u64)
}

/// Fail when any layer needs more workgroups than one dispatch dimension
/// allows. wgpu would otherwise reject the dispatch through its uncaptured
/// error handler.
pub fn check_dispatch_limit(
    layers: &[LayerInfo],
    workgroup_size: WorkgroupSize,
    max_per_dimension: u32,
) -> NnResult<()> {
    for (layer, info) in layers.iter().enumerate() {
        let workgroups = workgroup_size.dispatch_count(info.output_size);
        if workgroups > max_per_dimension {
            return Err(NnError::DispatchTooLarge {
                layer,
                workgroups,
                max: max_per_dimension,
            });
        }
    }
    Ok(())
}

pub struct NeuralCompute {
    program: ComputeProgram,
    layers: Vec<LayerInfo>,
    layers_buf: wgpu::Buffer,
    params_bufs: Vec<wgpu::Buffer>,
    workgroup_size: WorkgroupSize,
    state: PassState,
    timer: Option<PassTimer>,
    profiling: bool,
    last_execution_time: Option<Duration>,
    last_timing_source: Option<TimingSource>,
}

impl NeuralCompute {
    /// Build the program from `source` and upload `buffers`' layer metadata.
    ///
    /// `source` may contain `{{WG_SIZE}}`; it is expanded with the device's
    /// current workgroup width, which stays fixed for this dispatcher. A
    /// build failure returns `Initialization`, a layer too wide for one
    /// dispatch returns `DispatchTooLarge`; neither produces a dispatcher.
    pub fn new(gpu: &GpuDevice, source: &str, buffers: &NeuralBuffers) -> NnResult<Self> {
        let workgroup_size = gpu.workgroup_size;
        check_dispatch_limit(
            buffers.layer_info(),
            workgroup_size,
            gpu.device.limits().max_compute_workgroups_per_dimension,
        )?;

        let expanded = program::expand_template(source, workgroup_size);

        let bindings = [
            program::storage_entry(WEIGHTS_BINDING, true),
            program::storage_entry(BIASES_BINDING, true),
            program::storage_entry(ACTIVATIONS_BINDING, false),
            program::storage_entry(LAYERS_BINDING, true),
            program::uniform_entry(PARAMS_BINDING),
        ];
        let program = ComputeProgram::build(
            gpu,
            &ProgramDesc {
                label: "forward.wgsl",
                source: &expanded,
                entry_point: FORWARD_ENTRY,
                bindings: &bindings,
            },
        )?;

        let layout = buffers.layout();
        let layers_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("NeuralCompute layers"),
            contents: layout.layer_bytes(),
            usage: wgpu::BufferUsages::STORAGE,
        });

        // Contents never change, so one immutable uniform per layer.
        let params_bufs = (0..layout.layer_count())
            .map(|i| {
                let params = DispatchParams { layer_index: i as u32, _pad: [0; 3] };
                gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("NeuralCompute params"),
                    contents: bytemuck::bytes_of(&params),
                    usage: wgpu::BufferUsages::UNIFORM,
                })
            })
            .collect();

        let timer = gpu.supports_timestamps().then(|| PassTimer::new(gpu));

        info!(
            "neural compute ready: {} layers, workgroup size {}, gpu timestamps {}",
            layout.layer_count(),
            workgroup_size,
            if timer.is_some() { "on" } else { "off" }
        );

        Ok(NeuralCompute {
            program,
            layers: layout.layers.clone(),
            layers_buf,
            params_bufs,
            workgroup_size,
            state: PassState::Idle,
            timer,
            profiling: false,
            last_execution_time: None,
            last_timing_source: None,
        })
    }

    /// `new` with the bundled `FORWARD_WGSL` kernel.
    pub fn with_default_program(gpu: &GpuDevice, buffers: &NeuralBuffers) -> NnResult<Self> {
        Self::new(gpu, FORWARD_WGSL, buffers)
    }

    /// Number of weight layers N.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn pass_state(&self) -> PassState {
        self.state
    }

    pub fn workgroup_size(&self) -> WorkgroupSize {
        self.workgroup_size
    }

    /// When enabled, `forward()` waits for the GPU and records its duration.
    /// Blocking; keep it off in interactive loops.
    pub fn set_profiling_enabled(&mut self, enabled: bool) {
        self.profiling = enabled;
        if !enabled {
            self.last_execution_time = None;
            self.last_timing_source = None;
        }
    }

    /// True when profiled passes are timed with GPU timestamp queries.
    pub fn has_gpu_timer(&self) -> bool {
        self.timer.is_some()
    }

    pub fn last_timing_source(&self) -> Option<TimingSource> {
        self.last_timing_source
    }

    pub fn profiling_enabled(&self) -> bool {
        self.profiling
    }

    /// Duration of the last profiled `forward()`, if any.
    pub fn last_execution_time(&self) -> Option<Duration> {
        self.last_execution_time
    }

    /// Run layer `i` alone.
    ///
    /// Out-of-range `i` fails with `Index` before anything is encoded, so the
    /// activation buffer is untouched.
    pub fn forward_layer(
        &mut self,
        gpu: &GpuDevice,
        buffers: &mut NeuralBuffers,
        i: usize,
    ) -> NnResult<()> {
        if i >= self.layers.len() {
            return Err(NnError::Index { index: i, layer_count: self.layers.len() });
        }
        self.check_layout(buffers)?;

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("NeuralCompute::forward_layer"),
        });
        self.encode_layer(gpu, buffers, &mut encoder, i, false);
        gpu.queue.submit(std::iter::once(encoder.finish()));
        self.mark_layer(i);

        if i + 1 == self.layers.len() {
            self.transition(PassState::Complete);
        }
        Ok(())
    }

    /// Run all layers in ascending order in one submission.
    pub fn forward(&mut self, gpu: &GpuDevice, buffers: &mut NeuralBuffers) -> NnResult<()> {
        self.check_layout(buffers)?;
        self.transition(PassState::Idle);

        let timed = self.profiling && self.timer.is_some();
        let wall = Instant::now();

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("NeuralCompute::forward"),
        });
        for i in 0..self.layers.len() {
            self.encode_layer(gpu, buffers, &mut encoder, i, timed);
            self.mark_layer(i);
        }
        if let (true, Some(timer)) = (timed, &self.timer) {
            timer.resolve(&mut encoder);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        self.transition(PassState::Complete);

        if self.profiling {
            let (elapsed, source) = match (timed, &self.timer) {
                (true, Some(timer)) => (timer.read(gpu)?, TimingSource::GpuTimestamps),
                _ => {
                    gpu.device.poll(wgpu::Maintain::Wait);
                    (wall.elapsed(), TimingSource::WallClock)
                }
            };
            trace!(
                "forward pass took {:.3} ms ({:?})",
                elapsed.as_secs_f64() * 1000.0,
                source
            );
            self.last_execution_time = Some(elapsed);
            self.last_timing_source = Some(source);
        }
        Ok(())
    }

    fn check_layout(&self, buffers: &NeuralBuffers) -> NnResult<()> {
        if buffers.layer_info() != self.layers.as_slice() {
            return Err(NnError::LayoutChanged);
        }
        Ok(())
    }

    fn encode_layer(
        &self,
        gpu: &GpuDevice,
        buffers: &NeuralBuffers,
        encoder: &mut wgpu::CommandEncoder,
        i: usize,
        timed: bool,
    ) {
        let groups = self.workgroup_size.dispatch_count(self.layers[i].output_size);

        let [weights, biases, activations] =
            buffers.bind(WEIGHTS_BINDING, BIASES_BINDING, ACTIVATIONS_BINDING);
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("NeuralCompute bind group"),
            layout: &self.program.bind_group_layout,
            entries: &[
                weights,
                biases,
                activations,
                wgpu::BindGroupEntry {
                    binding: LAYERS_BINDING,
                    resource: self.layers_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: PARAMS_BINDING,
                    resource: self.params_bufs[i].as_entire_binding(),
                },
            ],
        });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("forward_layer"),
                timestamp_writes: match (timed, &self.timer) {
                    (true, Some(timer)) => timer.writes_for(i, self.layers.len()),
                    _ => None,
                },
            });
            pass.set_pipeline(&self.program.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }
    }

    fn mark_layer(&mut self, i: usize) {
        self.transition(PassState::Dispatched(i));
        // Pass closed: the next pass or copy is ordered after these writes.
        self.transition(PassState::Barrier(i));
    }

    fn transition(&mut self, next: PassState) {
        trace!("forward: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
