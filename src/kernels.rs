//! Compute kernels, one per pipeline stage.
//!
//! Every kernel is the common prelude (`shaders/common.wgsl`) followed by its own
//! body. Binding 0 is always the shared [`StageParams`] uniform; the remaining
//! bindings are listed in the order [`KernelSet::dispatch`] expects them.

use bytemuck::{Pod, Zeroable};

use crate::error::{FluidError, Result};
use crate::field::GridSize;
use crate::gpu::GpuContext;

const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    AdvectVelocity,
    AdvectDye,
    Curl,
    Vorticity,
    Divergence,
    Jacobi,
    GradientSubtract,
    SplatVelocity,
    SplatDye,
    Display,
}

impl Kernel {
    pub const ALL: [Kernel; 10] = [
        Kernel::AdvectVelocity,
        Kernel::AdvectDye,
        Kernel::Curl,
        Kernel::Vorticity,
        Kernel::Divergence,
        Kernel::Jacobi,
        Kernel::GradientSubtract,
        Kernel::SplatVelocity,
        Kernel::SplatDye,
        Kernel::Display,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Kernel::AdvectVelocity => "advect-velocity",
            Kernel::AdvectDye => "advect-dye",
            Kernel::Curl => "curl",
            Kernel::Vorticity => "vorticity",
            Kernel::Divergence => "divergence",
            Kernel::Jacobi => "jacobi",
            Kernel::GradientSubtract => "gradient-subtract",
            Kernel::SplatVelocity => "splat-velocity",
            Kernel::SplatDye => "splat-dye",
            Kernel::Display => "display",
        }
    }

    fn body(self) -> &'static str {
        match self {
            Kernel::AdvectVelocity => include_str!("shaders/advect_velocity.wgsl"),
            Kernel::AdvectDye => include_str!("shaders/advect_dye.wgsl"),
            Kernel::Curl => include_str!("shaders/curl.wgsl"),
            Kernel::Vorticity => include_str!("shaders/vorticity.wgsl"),
            Kernel::Divergence => include_str!("shaders/divergence.wgsl"),
            Kernel::Jacobi => include_str!("shaders/jacobi.wgsl"),
            Kernel::GradientSubtract => include_str!("shaders/gradient_subtract.wgsl"),
            Kernel::SplatVelocity => include_str!("shaders/splat_velocity.wgsl"),
            Kernel::SplatDye => include_str!("shaders/splat_dye.wgsl"),
            Kernel::Display => include_str!("shaders/display.wgsl"),
        }
    }

    /// Full WGSL source handed to the shader compiler.
    pub fn source(self) -> String {
        format!("{COMMON_WGSL}\n{}", self.body())
    }
}

/// Uniform block shared by every kernel. Mirrors `Params` in `common.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct StageParams {
    pub width: u32,
    pub height: u32,
    pub src_width: u32,
    pub src_height: u32,
    pub dt: f32,
    pub dissipation: f32,
    pub curl_strength: f32,
    pub radius: f32,
    pub point: [f32; 2],
    pub aspect: f32,
    pub packed: u32,
    pub value: [f32; 4],
}

impl StageParams {
    /// Params for a stage writing a `grid`-sized output.
    pub fn over(grid: GridSize, packed: bool) -> Self {
        Self {
            width: grid.width,
            height: grid.height,
            src_width: grid.width,
            src_height: grid.height,
            packed: packed as u32,
            aspect: 1.0,
            ..Self::zeroed()
        }
    }

    /// Secondary input grid (velocity for dye advection, dye for display).
    pub fn with_source(mut self, grid: GridSize) -> Self {
        self.src_width = grid.width;
        self.src_height = grid.height;
        self
    }

    pub fn grid(&self) -> GridSize {
        GridSize::new(self.width, self.height)
    }
}

pub struct KernelSet {
    pipelines: Vec<wgpu::ComputePipeline>,
    params: wgpu::Buffer,
}

impl KernelSet {
    /// Compiles every kernel. Any failure aborts the whole set.
    pub fn build(ctx: &GpuContext) -> Result<Self> {
        let mut pipelines = Vec::with_capacity(Kernel::ALL.len());
        for kernel in Kernel::ALL {
            pipelines.push(build_pipeline(&ctx.device, kernel.label(), &kernel.source())?);
        }
        let params = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("stage-params"),
            size: std::mem::size_of::<StageParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        log::debug!("built {} kernels", pipelines.len());
        Ok(Self { pipelines, params })
    }

    fn pipeline(&self, kernel: Kernel) -> &wgpu::ComputePipeline {
        &self.pipelines[kernel as usize]
    }

    /// Records one dispatch of `kernel` over `grid`. `resources` bind from slot 1 up.
    pub fn encode(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        kernel: Kernel,
        grid: GridSize,
        resources: &[wgpu::BindingResource<'_>],
    ) {
        let pipeline = self.pipeline(kernel);
        let mut entries = Vec::with_capacity(resources.len() + 1);
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: self.params.as_entire_binding(),
        });
        for (i, resource) in resources.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32 + 1,
                resource: resource.clone(),
            });
        }
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.label()),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &entries,
        });

        let (gx, gy) = grid.workgroups();
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel.label()),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(gx, gy, 1);
    }

    /// Stages `params` for the next submission. Every pass in that submission sees them.
    pub fn write_params(&self, ctx: &GpuContext, params: &StageParams) {
        ctx.queue.write_buffer(&self.params, 0, bytemuck::bytes_of(params));
    }

    /// One stage as its own submission: params, a single pass, submit.
    pub fn dispatch(
        &self,
        ctx: &GpuContext,
        kernel: Kernel,
        params: &StageParams,
        resources: &[wgpu::BindingResource<'_>],
    ) {
        self.write_params(ctx, params);
        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(kernel.label()),
        });
        self.encode(ctx, &mut encoder, kernel, params.grid(), resources);
        ctx.queue.submit(Some(encoder.finish()));
    }
}

/// Builds one compute pipeline, turning shader or pipeline validation errors into
/// [`FluidError::KernelBuild`] instead of the device's uncaptured-error panic.
pub fn build_pipeline(device: &wgpu::Device, label: &'static str, source: &str) -> Result<wgpu::ComputePipeline> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: None,
        module: &module,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        log::error!("kernel `{label}` failed to build: {err}");
        return Err(FluidError::KernelBuild {
            kernel: label,
            diagnostic: err.to_string(),
        });
    }
    Ok(pipeline)
}
