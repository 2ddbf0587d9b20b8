// gpu/program.rs — compute program loading and building.
//
// Turns WGSL source into a `wgpu::ComputePipeline` plus the bind group
// layout it was built against. Build failures come back as
// `NnError::Initialization` instead of wgpu's default uncaptured-error
// panic:
//
//   push_error_scope(Validation)
//     create_shader_module    ← WGSL parse / validation errors land here
//     create_bind_group_layout
//     create_pipeline_layout
//     create_compute_pipeline ← entry point / binding mismatches land here
//   pop_error_scope           → Some(err) = build failed
//
// Invalid objects created inside the scope are dropped with the error; no
// program is returned.
//
// TEMPLATE TOKENS
// ───────────────
// Shader sources may contain `{{WG_SIZE}}`, replaced with the device's 1-D
// workgroup width before compilation.

use std::path::Path;

use log::info;

use crate::error::{NnError, NnResult};
use crate::gpu::device::{GpuDevice, WorkgroupSize};

/// Token replaced with the workgroup width in shader templates.
pub const WG_SIZE_TOKEN: &str = "{{WG_SIZE}}";

/// Read a shader source file.
pub fn load_source(path: impl AsRef<Path>) -> NnResult<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|e| NnError::Initialization {
        message: format!("cannot read shader {}: {e}", path.display()),
    })
}

/// Substitute template tokens for a given workgroup width.
pub fn expand_template(source: &str, workgroup: WorkgroupSize) -> String {
    source.replace(WG_SIZE_TOKEN, &workgroup.x.to_string())
}

/// What to build: source, entry point and the bindings of `@group(0)`.
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    /// WGSL source, template tokens already expanded.
    pub source: &'a str,
    pub entry_point: &'a str,
    pub bindings: &'a [wgpu::BindGroupLayoutEntry],
}

/// A built compute program: pipeline plus its `@group(0)` layout.
pub struct ComputeProgram {
    pub pipeline: wgpu::ComputePipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl ComputeProgram {
    /// Compile and link. Fails with `Initialization` carrying the wgpu
    /// validation message.
    pub fn build(gpu: &GpuDevice, desc: &ProgramDesc<'_>) -> NnResult<Self> {
        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.into()),
        });

        let bind_group_layout =
            gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(desc.label),
                entries: desc.bindings,
            });

        let pipeline_layout =
            gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(desc.entry_point),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: desc.entry_point,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        if let Some(err) = pollster::block_on(gpu.device.pop_error_scope()) {
            return Err(NnError::Initialization {
                message: format!("{}: {err}", desc.label),
            });
        }

        info!("built compute program {} (entry {})", desc.label, desc.entry_point);
        Ok(ComputeProgram { pipeline, bind_group_layout })
    }
}

/// Layout entry for a storage buffer visible to compute.
pub fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Layout entry for a uniform buffer visible to compute.
pub fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_template() {
        let src = "@compute @workgroup_size({{WG_SIZE}}) fn main() {}";
        assert_eq!(
            expand_template(src, WorkgroupSize { x: 64 }),
            "@compute @workgroup_size(64) fn main() {}"
        );
    }

    #[test]
    fn test_missing_shader_file() {
        let err = load_source("/definitely/not/here/forward.wgsl").unwrap_err();
        assert!(matches!(err, NnError::Initialization { .. }));
    }

    #[test]
    fn test_entry_helpers() {
        let e = storage_entry(2, false);
        assert_eq!(e.binding, 2);
        assert!(matches!(
            e.ty,
            wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only: false }, .. }
        ));
        assert!(matches!(
            uniform_entry(4).ty,
            wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Uniform, .. }
        ));
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_invalid_wgsl_is_initialization_error() {
        let gpu = GpuDevice::new().expect("need a GPU adapter");
        let desc = ProgramDesc {
            label: "broken.wgsl",
            source: "@compute @workgroup_size(1) fn main( {",
            entry_point: "main",
            bindings: &[],
        };
        let err = ComputeProgram::build(&gpu, &desc).err().expect("build should fail");
        assert!(matches!(err, NnError::Initialization { .. }));
    }
}
