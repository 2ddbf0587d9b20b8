// gpu/device.rs — wgpu device abstraction.
//
// Responsibilities:
//   - Enumerate adapters on the requested backends and prefer a hardware one.
//   - Expose a `DeviceProfile` for simulating hardware limits on a
//     development machine (e.g., cap invocations to match Raspberry Pi).
//   - Provide `WorkgroupSize`, the 1-D workgroup width every dense-layer
//     dispatch uses, validated against the active profile.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` uses power preference heuristics that
// may grab llvmpipe/softpipe (software renderers that appear as valid
// adapters). We enumerate explicitly and take a software adapter only when
// nothing else exists, logging a warning when we do.
//
// DEVICE LIMITS:
// We request *lower* limits than the hardware actually supports when
// running under a non-Native profile. wgpu validates every dispatch and
// binding against the requested limits, so a network too large for the
// target device is caught on the laptop.
//
// WORKGROUP SIZE:
// The forward kernel is 1-D: one invocation per output neuron. The width is
// baked into the WGSL source at program build time, so a dispatcher compiled
// for one width dispatches `ceil(output_size / width)` workgroups of that
// same width for its whole lifetime.

use std::fmt;

use log::{debug, info, warn};
use thiserror::Error;

/// Hardware profile controlling device limits and the default workgroup width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    /// Use the adapter's actual hardware limits. No artificial caps.
    Native,
    /// Simulate Raspberry Pi 4/5 (Broadcom VideoCore VI/VII, V3DV Vulkan).
    /// Caps `max_compute_invocations_per_workgroup` to 256.
    RaspberryPi,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::RaspberryPi => write!(f, "RaspberryPi (simulated limits)"),
        }
    }
}

/// Width of the 1-D compute workgroup used for dense-layer dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
}

impl WorkgroupSize {
    /// Default width for a profile.
    ///
    /// - `Native`: 256 invocations, 8 NVIDIA warps or 4 AMD wavefronts. Small
    ///   layers leave most lanes idle, but the dispatch count stays at one
    ///   workgroup for every layer up to 256 neurons.
    /// - `RaspberryPi`: 64 invocations, leaving headroom under the V3DV
    ///   256-invocation limit.
    pub fn for_profile(profile: DeviceProfile) -> Self {
        match profile {
            DeviceProfile::Native => WorkgroupSize { x: 256 },
            DeviceProfile::RaspberryPi => WorkgroupSize { x: 64 },
        }
    }

    /// Workgroups needed to cover `n` invocations: `ceil(n / x)`.
    ///
    /// The shader must guard the tail:
    /// ```wgsl
    /// if gid.x >= layer.output_size { return; }
    /// ```
    pub fn dispatch_count(&self, n: u32) -> u32 {
        n.div_ceil(self.x)
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} invocations", self.x)
    }
}

/// Cached adapter information for logging and debugging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// Options for `GpuDevice::with_options`.
#[derive(Debug, Clone, Copy)]
pub struct DeviceOptions {
    pub profile: DeviceProfile,
    /// Backends to enumerate adapters on.
    pub backends: wgpu::Backends,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        DeviceOptions {
            profile: DeviceProfile::Native,
            backends: wgpu::Backends::PRIMARY,
        }
    }
}

/// The core GPU context: adapter, device, queue, and active profile.
///
/// Hold one `GpuDevice` for the lifetime of the application and pass it by
/// reference to the store and dispatcher.
///
/// # Field drop order
/// Rust drops struct fields in declaration order (top → bottom).
/// `_instance` is declared last so the `wgpu::Instance` outlives `device`
/// and `queue`.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    pub workgroup_size: WorkgroupSize,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Create a `GpuDevice` on the primary backends with `Native` limits.
    pub fn new() -> Result<Self, GpuError> {
        Self::with_options(DeviceOptions::default())
    }

    /// Create a `GpuDevice` with an explicit hardware profile.
    pub fn new_with_profile(profile: DeviceProfile) -> Result<Self, GpuError> {
        Self::with_options(DeviceOptions {
            profile,
            ..DeviceOptions::default()
        })
    }

    pub fn with_options(options: DeviceOptions) -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async(options))
    }

    async fn init_async(options: DeviceOptions) -> Result<Self, GpuError> {
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
        } else {
            wgpu::InstanceFlags::empty()
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: options.backends,
            flags,
            ..Default::default()
        });

        let mut adapters: Vec<wgpu::Adapter> = instance
            .enumerate_adapters(options.backends)
            .into_iter()
            .collect();

        if adapters.is_empty() {
            return Err(GpuError::NoSuitableAdapter);
        }

        for a in &adapters {
            let info = a.get_info();
            info!("adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
        }

        // Anything that is not a software rasterizer; otherwise the first one.
        let hardware = adapters
            .iter()
            .position(|a| a.get_info().device_type != wgpu::DeviceType::Cpu);
        let adapter = match hardware {
            Some(i) => adapters.swap_remove(i),
            None => {
                let fallback = adapters.swap_remove(0);
                warn!("no hardware adapter found, falling back to {}", fallback.get_info().name);
                fallback
            }
        };

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            vendor: raw_info.vendor,
            device: raw_info.device,
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };

        // Auto-detect RPi when the caller passed Native but the adapter is V3D.
        let profile = match options.profile {
            DeviceProfile::Native if raw_info.name.to_ascii_lowercase().contains("v3d") => {
                info!("V3D adapter detected, using RaspberryPi profile");
                DeviceProfile::RaspberryPi
            }
            other => other,
        };

        let limits = limits_for_profile(profile);
        // Only used for profiling; absent on most GLES and some mobile drivers.
        let timestamp_feature = adapter.features() & wgpu::Features::TIMESTAMP_QUERY;
        debug!("timestamp queries available: {}", !timestamp_feature.is_empty());

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("neuravis"),
                    required_features: timestamp_feature,
                    required_limits: limits,
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(GpuError::DeviceRequest)?;

        let workgroup_size = WorkgroupSize::for_profile(profile);
        info!("using {adapter_info}, profile {profile}, workgroup {workgroup_size}");

        Ok(GpuDevice {
            device,
            queue,
            profile,
            adapter_info,
            workgroup_size,
            _instance: instance,
        })
    }

    /// Override the default workgroup width, validating against the profile.
    ///
    /// Only affects dispatchers built afterwards.
    pub fn set_workgroup_size(&mut self, x: u32) -> Result<(), GpuError> {
        let max = max_invocations_for_profile(self.profile);
        if x == 0 || x > max {
            return Err(GpuError::WorkgroupTooLarge { total: x, max });
        }
        self.workgroup_size = WorkgroupSize { x };
        Ok(())
    }

    /// Largest storage buffer binding the device accepts, in bytes.
    pub fn max_storage_binding(&self) -> u64 {
        self.device.limits().max_storage_buffer_binding_size as u64
    }

    /// True when the device was created with TIMESTAMP_QUERY.
    pub fn supports_timestamps(&self) -> bool {
        self.device.features().contains(wgpu::Features::TIMESTAMP_QUERY)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, profile: {}, workgroup: {} }}",
            self.adapter_info, self.profile, self.workgroup_size
        )
    }
}

// ============================================================
// Limits helpers
// ============================================================

fn limits_for_profile(profile: DeviceProfile) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default(),

        DeviceProfile::RaspberryPi => wgpu::Limits {
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            // 128 MiB: RPi 4 shares 4 GiB with the CPU.
            max_storage_buffer_binding_size: 128 << 20,
            ..wgpu::Limits::default()
        },
    }
}

fn max_invocations_for_profile(profile: DeviceProfile) -> u32 {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default().max_compute_invocations_per_workgroup,
        DeviceProfile::RaspberryPi => 256,
    }
}

// ============================================================
// Error type
// ============================================================

/// Errors from GPU device initialization and configuration.
#[derive(Error, Debug)]
pub enum GpuError {
    #[error("no suitable GPU adapter found on the requested backends")]
    NoSuitableAdapter,

    #[error("device request failed: {0}")]
    DeviceRequest(#[source] wgpu::RequestDeviceError),

    #[error("workgroup size {total} outside profile limit of 1..={max} invocations")]
    WorkgroupTooLarge { total: u32, max: u32 },
}

// ============================================================
// Tests
// ============================================================
