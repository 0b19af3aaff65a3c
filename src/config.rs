use serde::{Deserialize, Serialize};

use crate::encoding::FieldEncoding;
use crate::error::{FluidError, Result};
use crate::field::GridSize;

/// Solver tunables. Fixed once the solver is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default = "default_sim_resolution")]
    pub sim_resolution: u32,
    #[serde(default = "default_dye_resolution")]
    pub dye_resolution: u32,
    #[serde(default = "default_velocity_dissipation")]
    pub velocity_dissipation: f32,
    #[serde(default = "default_dye_dissipation")]
    pub dye_dissipation: f32,
    #[serde(default = "default_pressure_iterations")]
    pub pressure_iterations: u32,
    #[serde(default = "default_curl_strength")]
    pub curl_strength: f32,
    #[serde(default = "default_splat_radius")]
    pub splat_radius: f32,
    #[serde(default = "default_splat_force")]
    pub splat_force: f32,
    #[serde(default = "default_ambient_splat_count")]
    pub ambient_splat_count: u32,
    /// Seconds of running time between ambient bursts.
    #[serde(default = "default_ambient_interval")]
    pub ambient_interval: f32,
    #[serde(default = "default_ambient_force")]
    pub ambient_force: f32,
    #[serde(default = "default_true")]
    pub ribbon_enabled: bool,
    #[serde(default = "default_ribbon_interval")]
    pub ribbon_interval: f32,
    #[serde(default = "default_ribbon_duration")]
    pub ribbon_duration: f32,
    #[serde(default = "default_ribbon_force")]
    pub ribbon_force: f32,
    /// Seconds per nominal frame; measured frame time is divided by this.
    #[serde(default = "default_target_timestep")]
    pub target_timestep: f32,
    /// Upper bound on measured frame time, in seconds.
    #[serde(default = "default_max_frame_time")]
    pub max_frame_time: f32,
    #[serde(default)]
    pub encoding: FieldEncoding,
    /// Aspect-correct the splat falloff. Off: footprints stretch with the surface.
    #[serde(default)]
    pub round_splats: bool,
    #[serde(default = "default_color_intensity")]
    pub color_intensity: f32,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_sim_resolution() -> u32 { 128 }
fn default_dye_resolution() -> u32 { 512 }
fn default_velocity_dissipation() -> f32 { 0.99 }
fn default_dye_dissipation() -> f32 { 0.98 }
fn default_pressure_iterations() -> u32 { 20 }
fn default_curl_strength() -> f32 { 0.5 }
fn default_splat_radius() -> f32 { 0.0025 }
fn default_splat_force() -> f32 { 100.0 }
fn default_ambient_splat_count() -> u32 { 3 }
fn default_ambient_interval() -> f32 { 2.5 }
fn default_ambient_force() -> f32 { 16.0 }
fn default_true() -> bool { true }
fn default_ribbon_interval() -> f32 { 9.0 }
fn default_ribbon_duration() -> f32 { 2.0 }
fn default_ribbon_force() -> f32 { 2.0 }
fn default_target_timestep() -> f32 { 1.0 / 60.0 }
fn default_max_frame_time() -> f32 { 1.0 / 15.0 }
fn default_color_intensity() -> f32 { 0.15 }
fn default_seed() -> u64 { 0x5eed_f1d0 }

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            sim_resolution: default_sim_resolution(),
            dye_resolution: default_dye_resolution(),
            velocity_dissipation: default_velocity_dissipation(),
            dye_dissipation: default_dye_dissipation(),
            pressure_iterations: default_pressure_iterations(),
            curl_strength: default_curl_strength(),
            splat_radius: default_splat_radius(),
            splat_force: default_splat_force(),
            ambient_splat_count: default_ambient_splat_count(),
            ambient_interval: default_ambient_interval(),
            ambient_force: default_ambient_force(),
            ribbon_enabled: true,
            ribbon_interval: default_ribbon_interval(),
            ribbon_duration: default_ribbon_duration(),
            ribbon_force: default_ribbon_force(),
            target_timestep: default_target_timestep(),
            max_frame_time: default_max_frame_time(),
            encoding: FieldEncoding::default(),
            round_splats: false,
            color_intensity: default_color_intensity(),
            seed: default_seed(),
        }
    }
}

impl SolverConfig {
    /// Config with the autonomous emitters switched off.
    pub fn quiet() -> Self {
        Self {
            ambient_splat_count: 0,
            ribbon_enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(FluidError::InvalidConfig(msg));
        if self.sim_resolution == 0 || self.dye_resolution == 0 {
            return bad("resolutions must be non-zero".into());
        }
        for (name, d) in [
            ("velocity_dissipation", self.velocity_dissipation),
            ("dye_dissipation", self.dye_dissipation),
        ] {
            if !(d > 0.0 && d <= 1.0) {
                return bad(format!("{name} must lie in (0, 1], got {d}"));
            }
        }
        if self.pressure_iterations == 0 {
            return bad("pressure_iterations must be at least 1".into());
        }
        if !(self.splat_radius > 0.0) {
            return bad(format!("splat_radius must be positive, got {}", self.splat_radius));
        }
        if !(self.target_timestep > 0.0) {
            return bad(format!("target_timestep must be positive, got {}", self.target_timestep));
        }
        if self.max_frame_time < self.target_timestep {
            return bad(format!(
                "max_frame_time ({}) is shorter than target_timestep ({})",
                self.max_frame_time, self.target_timestep
            ));
        }
        if self.ambient_splat_count > 0 && !(self.ambient_interval > 0.0) {
            return bad("ambient_interval must be positive when ambient splats are on".into());
        }
        if self.ribbon_enabled && !(self.ribbon_duration > 0.0 && self.ribbon_interval >= self.ribbon_duration) {
            return bad("ribbon needs 0 < ribbon_duration <= ribbon_interval".into());
        }
        Ok(())
    }

    pub fn sim_grid(&self, surface: SurfaceSize) -> GridSize {
        surface.grid_for(self.sim_resolution)
    }

    pub fn dye_grid(&self, surface: SurfaceSize) -> GridSize {
        surface.grid_for(self.dye_resolution)
    }
}

/// Drawable size in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Short side gets `resolution` texels, the long side scales with the aspect ratio.
    pub fn grid_for(&self, resolution: u32) -> GridSize {
        let mut aspect = self.aspect();
        if aspect < 1.0 {
            aspect = 1.0 / aspect;
        }
        let short = resolution.max(1);
        let long = ((resolution as f32 * aspect).round() as u32).max(short);
        if self.width > self.height {
            GridSize::new(long, short)
        } else {
            GridSize::new(short, long)
        }
    }
}
