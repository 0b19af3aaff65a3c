//! Frame scheduler: owns the GPU state and runs the fixed per-frame pipeline.
//!
//! While [`RunState::Running`] each frame drains forcing, then advects, confines
//! vorticity, projects, and finally resolves dye into the presentation target.
//! While [`RunState::Idle`] only the clock and the presentation advance.

use std::time::Instant;

use serde::Serialize;

use crate::clock::FrameClock;
use crate::config::{SolverConfig, SurfaceSize};
use crate::error::{FluidError, Result};
use crate::forcing::{AmbientEmitter, HuePalette, Palette, PointerTracker, RibbonEmitter, Splat};
use crate::field::GridSize;
use crate::gpu::GpuContext;
use crate::kernels::{Kernel, KernelSet, StageParams};
use crate::present::Presentation;
use crate::state::SimulationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FrameReport {
    pub dt: f32,
    pub stepped: bool,
    pub splats: usize,
}

pub struct FluidSolver {
    ctx: GpuContext,
    kernels: KernelSet,
    config: SolverConfig,
    surface: SurfaceSize,
    state: Option<SimulationState>,
    presentation: Option<Presentation>,
    run_state: RunState,
    clock: FrameClock,
    pointers: PointerTracker,
    palette: HuePalette,
    ambient: AmbientEmitter,
    ribbon: Option<RibbonEmitter>,
    pending: Vec<Splat>,
}

impl FluidSolver {
    /// Builds every kernel, then allocates fields for `surface`. A zero-area surface
    /// leaves the fields unallocated until the first non-empty [`resize`](Self::resize).
    /// The solver starts idle.
    pub fn init(ctx: GpuContext, surface: SurfaceSize, config: SolverConfig) -> Result<Self> {
        config.validate()?;
        let kernels = KernelSet::build(&ctx)?;
        let mut solver = Self {
            clock: FrameClock::new(config.target_timestep, config.max_frame_time),
            palette: HuePalette::new(config.seed, config.color_intensity),
            ambient: AmbientEmitter::new(
                config.ambient_splat_count,
                config.ambient_interval,
                config.ambient_force,
                config.seed.wrapping_add(1),
            ),
            ribbon: config
                .ribbon_enabled
                .then(|| RibbonEmitter::new(config.ribbon_interval, config.ribbon_duration, config.ribbon_force)),
            ctx,
            kernels,
            config,
            surface,
            state: None,
            presentation: None,
            run_state: RunState::Idle,
            pointers: PointerTracker::new(),
            pending: Vec::new(),
        };
        solver.rebuild(surface)?;
        Ok(solver)
    }

    pub fn ctx(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn surface(&self) -> SurfaceSize {
        self.surface
    }

    pub fn state(&self) -> Option<&SimulationState> {
        self.state.as_ref()
    }

    pub fn presentation(&self) -> Option<&Presentation> {
        self.presentation.as_ref()
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn enable(&mut self) {
        self.run_state = RunState::Running;
    }

    pub fn disable(&mut self) {
        self.run_state = RunState::Idle;
    }

    /// Rebuilds every field for a new surface size, discarding all content.
    /// Returns `false` when nothing was rebuilt: the size is unchanged, or zero-area
    /// (deferred until a later non-empty size arrives).
    pub fn resize(&mut self, surface: SurfaceSize) -> Result<bool> {
        if surface == self.surface && self.state.is_some() {
            return Ok(false);
        }
        self.rebuild(surface)
    }

    /// Allocates the new fields and target before touching the current ones, so a
    /// rejected size leaves the solver as it was.
    fn rebuild(&mut self, surface: SurfaceSize) -> Result<bool> {
        if surface.is_empty() {
            log::debug!("surface {}x{} has zero area; deferring rebuild", surface.width, surface.height);
            return Ok(false);
        }
        let sim = self.config.sim_grid(surface);
        let dye = self.config.dye_grid(surface);
        if let Err(e) = check_limits(&self.ctx.device.limits(), surface, sim, dye) {
            log::warn!("{e}");
            return Err(e);
        }

        self.ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.ctx.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let state = SimulationState::new(&self.ctx, sim, dye, self.config.encoding);
        let presentation = Presentation::new(&self.ctx, surface);
        let oom = pollster::block_on(self.ctx.device.pop_error_scope());
        let invalid = pollster::block_on(self.ctx.device.pop_error_scope());
        if let Some(err) = oom.or(invalid) {
            log::error!("allocation for {}x{} failed: {err}", surface.width, surface.height);
            return Err(FluidError::SurfaceTooLarge {
                width: surface.width,
                height: surface.height,
                reason: err.to_string(),
            });
        }

        self.state = Some(state?);
        self.presentation = Some(presentation);
        self.surface = surface;
        log::info!(
            "fields rebuilt for {}x{}: sim {}x{}, dye {}x{}",
            surface.width,
            surface.height,
            sim.width,
            sim.height,
            dye.width,
            dye.height
        );
        Ok(true)
    }

    pub fn pointer_down(&mut self, id: u64, position: [f32; 2]) {
        let color = self.palette.next_color();
        self.pointers.press(id, position, color);
    }

    pub fn pointer_move(&mut self, id: u64, position: [f32; 2]) {
        self.pointers.move_to(id, position);
    }

    pub fn pointer_up(&mut self, id: u64) {
        self.pointers.release(id);
    }

    /// Queues a splat for the next running frame.
    pub fn inject(&mut self, splat: Splat) {
        self.pending.push(splat);
    }

    /// One external tick: measure dt, step if running, present regardless.
    pub fn frame(&mut self, now: Instant) -> Result<FrameReport> {
        let tick = self.clock.tick(now);
        let mut report = FrameReport {
            dt: tick.dt,
            ..Default::default()
        };
        if self.state.is_none() {
            return Ok(report);
        }
        match self.run_state {
            RunState::Running => {
                report.splats = self.step(tick.dt)?;
                report.stepped = true;
            }
            RunState::Idle => {
                self.pointers.discard_motion();
                self.pending.clear();
            }
        }
        self.present()?;
        Ok(report)
    }

    /// Advances the simulation by `dt` target timesteps. Returns the number of
    /// splats applied. Does nothing while idle.
    pub fn step(&mut self, dt: f32) -> Result<usize> {
        if self.run_state == RunState::Idle {
            log::warn!("step requested while idle; ignored");
            return Ok(0);
        }
        if self.state.is_none() {
            return Err(FluidError::NotReady);
        }

        let seconds = dt * self.config.target_timestep;
        let mut splats = std::mem::take(&mut self.pending);
        splats.extend(self.pointers.drain(self.config.splat_force, self.surface.aspect()));
        self.ambient.advance(seconds, &mut self.palette, &mut splats);
        if let Some(ribbon) = &mut self.ribbon {
            ribbon.advance(seconds, &mut self.palette, &mut splats);
        }

        for splat in &splats {
            self.splat(splat)?;
        }
        self.advect(dt)?;
        self.confine_vorticity(dt)?;
        self.project()?;
        Ok(splats.len())
    }

    /// One velocity splat and one dye splat.
    pub fn splat(&mut self, splat: &Splat) -> Result<()> {
        let aspect = if self.config.round_splats { self.surface.aspect() } else { 1.0 };
        let state = self.state.as_mut().ok_or(FluidError::NotReady)?;
        let packed = state.encoding().is_packed();

        let mut params = StageParams::over(state.sim_size(), packed);
        params.point = splat.point;
        params.radius = self.config.splat_radius;
        params.aspect = aspect;
        params.value = [splat.force[0], splat.force[1], 0.0, 0.0];
        self.kernels.dispatch(
            &self.ctx,
            Kernel::SplatVelocity,
            &params,
            &[state.velocity.read().as_entire_binding(), state.velocity.write().as_entire_binding()],
        );
        state.velocity.swap();

        let mut params = StageParams::over(state.dye_size(), packed);
        params.point = splat.point;
        params.radius = self.config.splat_radius;
        params.aspect = aspect;
        params.value = [splat.color[0], splat.color[1], splat.color[2], 0.0];
        self.kernels.dispatch(
            &self.ctx,
            Kernel::SplatDye,
            &params,
            &[state.dye.read().as_entire_binding(), state.dye.write().as_entire_binding()],
        );
        state.dye.swap();
        Ok(())
    }

    /// Velocity advects itself, then dye is carried by the advected velocity.
    pub fn advect(&mut self, dt: f32) -> Result<()> {
        let state = self.state.as_mut().ok_or(FluidError::NotReady)?;
        let packed = state.encoding().is_packed();

        let mut params = StageParams::over(state.sim_size(), packed);
        params.dt = dt;
        params.dissipation = self.config.velocity_dissipation;
        self.kernels.dispatch(
            &self.ctx,
            Kernel::AdvectVelocity,
            &params,
            &[state.velocity.read().as_entire_binding(), state.velocity.write().as_entire_binding()],
        );
        state.velocity.swap();

        let mut params = StageParams::over(state.dye_size(), packed).with_source(state.sim_size());
        params.dt = dt;
        params.dissipation = self.config.dye_dissipation;
        self.kernels.dispatch(
            &self.ctx,
            Kernel::AdvectDye,
            &params,
            &[
                state.velocity.read().as_entire_binding(),
                state.dye.read().as_entire_binding(),
                state.dye.write().as_entire_binding(),
            ],
        );
        state.dye.swap();
        Ok(())
    }

    pub fn confine_vorticity(&mut self, dt: f32) -> Result<()> {
        let state = self.state.as_mut().ok_or(FluidError::NotReady)?;
        let mut params = StageParams::over(state.sim_size(), state.encoding().is_packed());
        self.kernels.dispatch(
            &self.ctx,
            Kernel::Curl,
            &params,
            &[state.velocity.read().as_entire_binding(), state.curl.buffer().as_entire_binding()],
        );

        params.dt = dt;
        params.curl_strength = self.config.curl_strength;
        self.kernels.dispatch(
            &self.ctx,
            Kernel::Vorticity,
            &params,
            &[
                state.velocity.read().as_entire_binding(),
                state.curl.buffer().as_entire_binding(),
                state.velocity.write().as_entire_binding(),
            ],
        );
        state.velocity.swap();
        Ok(())
    }

    /// Divergence, pressure solve with the configured budget, gradient subtraction.
    pub fn project(&mut self) -> Result<()> {
        self.compute_divergence()?;
        self.solve_pressure(self.config.pressure_iterations)?;
        self.subtract_gradient()
    }

    pub fn compute_divergence(&mut self) -> Result<()> {
        let state = self.state.as_mut().ok_or(FluidError::NotReady)?;
        let params = StageParams::over(state.sim_size(), state.encoding().is_packed());
        self.kernels.dispatch(
            &self.ctx,
            Kernel::Divergence,
            &params,
            &[state.velocity.read().as_entire_binding(), state.divergence.buffer().as_entire_binding()],
        );
        Ok(())
    }

    /// Continues the warm-started solve for `iterations` more sweeps.
    pub fn solve_pressure(&mut self, iterations: u32) -> Result<()> {
        let state = self.state.as_mut().ok_or(FluidError::NotReady)?;
        state.pressure.solve(&self.ctx, &self.kernels, &state.divergence, iterations);
        Ok(())
    }

    pub fn pressure_residual(&self) -> Result<f32> {
        let state = self.state.as_ref().ok_or(FluidError::NotReady)?;
        state.pressure.residual(&self.ctx, &state.divergence)
    }

    pub fn subtract_gradient(&mut self) -> Result<()> {
        let state = self.state.as_mut().ok_or(FluidError::NotReady)?;
        let params = StageParams::over(state.sim_size(), state.encoding().is_packed());
        self.kernels.dispatch(
            &self.ctx,
            Kernel::GradientSubtract,
            &params,
            &[
                state.pressure.field().read().as_entire_binding(),
                state.velocity.read().as_entire_binding(),
                state.velocity.write().as_entire_binding(),
            ],
        );
        state.velocity.swap();
        Ok(())
    }

    /// Resolves the current dye field into the presentation target.
    pub fn present(&self) -> Result<()> {
        match (&self.state, &self.presentation) {
            (Some(state), Some(presentation)) => {
                presentation.render(&self.ctx, &self.kernels, &state.dye);
                Ok(())
            }
            _ => Err(FluidError::NotReady),
        }
    }
}

/// Rejects surfaces whose target texture, field buffers or dispatch sizes exceed
/// what the device can allocate.
pub fn check_limits(limits: &wgpu::Limits, surface: SurfaceSize, sim: GridSize, dye: GridSize) -> Result<()> {
    let too_large = |reason: String| {
        Err(FluidError::SurfaceTooLarge {
            width: surface.width,
            height: surface.height,
            reason,
        })
    };
    let max_dim = limits.max_texture_dimension_2d;
    if surface.width > max_dim || surface.height > max_dim {
        return too_large(format!("frame texture exceeds {max_dim} texels per side"));
    }

    let max_bytes = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
    for (label, grid, bytes_per_texel) in [
        ("velocity", sim, 8u64),
        ("pressure", sim, 4),
        ("dye", dye, 16),
    ] {
        let bytes = grid.cells() as u64 * bytes_per_texel;
        if bytes > max_bytes {
            return too_large(format!(
                "{label} grid {}x{} needs {bytes} bytes, device allows {max_bytes}",
                grid.width, grid.height
            ));
        }
    }

    let max_groups = limits.max_compute_workgroups_per_dimension;
    for (label, grid) in [("frame", GridSize::new(surface.width, surface.height)), ("sim", sim), ("dye", dye)] {
        let (gx, gy) = grid.workgroups();
        if gx > max_groups || gy > max_groups {
            return too_large(format!("{label} dispatch of {gx}x{gy} workgroups exceeds {max_groups}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grids(config: &SolverConfig, surface: SurfaceSize) -> (GridSize, GridSize) {
        (config.sim_grid(surface), config.dye_grid(surface))
    }

    #[test]
    fn common_surfaces_fit_default_limits() {
        let limits = wgpu::Limits::default();
        let config = SolverConfig::default();
        for surface in [SurfaceSize::new(1920, 1080), SurfaceSize::new(1080, 2400), SurfaceSize::new(8192, 4608)] {
            let (sim, dye) = grids(&config, surface);
            assert!(check_limits(&limits, surface, sim, dye).is_ok(), "{surface:?}");
        }
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let limits = wgpu::Limits::default();
        let surface = SurfaceSize::new(11520, 2160);
        let (sim, dye) = grids(&SolverConfig::default(), surface);
        match check_limits(&limits, surface, sim, dye) {
            Err(FluidError::SurfaceTooLarge { width, reason, .. }) => {
                assert_eq!(width, 11520);
                assert!(reason.contains("frame texture"), "{reason}");
            }
            other => panic!("expected SurfaceTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn extreme_aspect_overflows_the_dye_buffer() {
        let limits = wgpu::Limits::default();
        // dye grid becomes 40960x512 at 16 bytes per texel
        let surface = SurfaceSize::new(8000, 100);
        let (sim, dye) = grids(&SolverConfig::default(), surface);
        assert_eq!(dye, GridSize::new(40960, 512));
        match check_limits(&limits, surface, sim, dye) {
            Err(FluidError::SurfaceTooLarge { reason, .. }) => assert!(reason.starts_with("dye"), "{reason}"),
            other => panic!("expected SurfaceTooLarge, got {other:?}"),
        }
    }
}
