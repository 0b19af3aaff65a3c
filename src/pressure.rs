use crate::diagnostics;
use crate::encoding::FieldEncoding;
use crate::error::Result;
use crate::field::{Channels, Field, FieldSnapshot, GridSize, ScratchField};
use crate::gpu::GpuContext;
use crate::kernels::{Kernel, KernelSet, StageParams};

/// Jacobi solver for `lap(p) = divergence` that owns its pressure field.
///
/// The field is never cleared between solves: each call starts from the previous
/// result. Only rebuilding the solver (on resize) resets it.
pub struct PressureSolver {
    pressure: Field,
    encoding: FieldEncoding,
}

impl PressureSolver {
    pub fn new(ctx: &GpuContext, size: GridSize, encoding: FieldEncoding) -> Self {
        Self {
            pressure: Field::new(ctx, "pressure", size, Channels::Scalar, encoding.store(0.0)),
            encoding,
        }
    }

    pub fn field(&self) -> &Field {
        &self.pressure
    }

    /// Runs exactly `iterations` sweeps. All sweeps go out in one submission.
    pub fn solve(&mut self, ctx: &GpuContext, kernels: &KernelSet, divergence: &ScratchField, iterations: u32) {
        let params = StageParams::over(self.pressure.size(), self.encoding.is_packed());
        kernels.write_params(ctx, &params);
        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("pressure-solve"),
        });
        for _ in 0..iterations {
            kernels.encode(
                ctx,
                &mut encoder,
                Kernel::Jacobi,
                params.grid(),
                &[
                    self.pressure.read().as_entire_binding(),
                    divergence.buffer().as_entire_binding(),
                    self.pressure.write().as_entire_binding(),
                ],
            );
            self.pressure.swap();
        }
        ctx.queue.submit(Some(encoder.finish()));
    }

    pub fn snapshot(&self, ctx: &GpuContext) -> Result<FieldSnapshot> {
        let raw = self.pressure.read_raw(ctx)?;
        Ok(FieldSnapshot {
            size: self.pressure.size(),
            stride: 1,
            data: raw.into_iter().map(|c| self.encoding.load(c)).collect(),
        })
    }

    /// L2 norm of `lap(p) - divergence` over the edge-clamped stencil.
    pub fn residual(&self, ctx: &GpuContext, divergence: &ScratchField) -> Result<f32> {
        let pressure = self.snapshot(ctx)?;
        let div: Vec<f32> = divergence
            .read_raw(ctx)?
            .into_iter()
            .map(|c| self.encoding.load(c))
            .collect();
        Ok(diagnostics::poisson_residual(&pressure.data, &div, pressure.size))
    }
}
