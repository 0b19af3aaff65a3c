use crate::encoding::FieldEncoding;
use crate::error::{FluidError, Result};
use crate::field::{Channels, Field, FieldSnapshot, GridSize, ScratchField};
use crate::gpu::GpuContext;
use crate::pressure::PressureSolver;

/// Every simulated field, at the sim and dye resolutions.
///
/// Velocity, pressure, divergence and curl share the sim grid. Dye has its own,
/// usually finer, grid and is only ever sampled against velocity through
/// normalized coordinates.
pub struct SimulationState {
    pub(crate) velocity: Field,
    pub(crate) dye: Field,
    pub(crate) pressure: PressureSolver,
    pub(crate) divergence: ScratchField,
    pub(crate) curl: ScratchField,
    encoding: FieldEncoding,
}

/// Decoded copy of every field.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub velocity: FieldSnapshot,
    pub dye: FieldSnapshot,
    pub pressure: FieldSnapshot,
    pub divergence: FieldSnapshot,
    pub curl: FieldSnapshot,
}

impl SimulationState {
    /// Allocates every field cleared to physical zero. Refuses zero-area grids.
    pub fn new(ctx: &GpuContext, sim: GridSize, dye: GridSize, encoding: FieldEncoding) -> Result<Self> {
        if sim.is_empty() || dye.is_empty() {
            return Err(FluidError::NotReady);
        }
        let zero = encoding.store(0.0);
        Ok(Self {
            velocity: Field::new(ctx, "velocity", sim, Channels::Vector, zero),
            dye: Field::new(ctx, "dye", dye, Channels::Color, 0.0),
            pressure: PressureSolver::new(ctx, sim, encoding),
            divergence: ScratchField::new(ctx, "divergence", sim, zero),
            curl: ScratchField::new(ctx, "curl", sim, zero),
            encoding,
        })
    }

    pub fn sim_size(&self) -> GridSize {
        self.velocity.size()
    }

    pub fn dye_size(&self) -> GridSize {
        self.dye.size()
    }

    pub fn encoding(&self) -> FieldEncoding {
        self.encoding
    }

    pub fn velocity(&self) -> &Field {
        &self.velocity
    }

    pub fn dye(&self) -> &Field {
        &self.dye
    }

    pub fn pressure(&self) -> &PressureSolver {
        &self.pressure
    }

    pub fn divergence(&self) -> &ScratchField {
        &self.divergence
    }

    pub fn curl(&self) -> &ScratchField {
        &self.curl
    }

    /// Overwrites velocity with physical values, one `[vx, vy]` per sim texel.
    pub fn seed_velocity(&self, ctx: &GpuContext, values: &[[f32; 2]]) -> Result<()> {
        let raw: Vec<f32> = values
            .iter()
            .flat_map(|v| v.iter().map(|&c| self.encoding.store(c)))
            .collect();
        self.velocity.upload(ctx, &raw)
    }

    /// Overwrites dye, one `[r, g, b]` per dye texel.
    pub fn seed_dye(&self, ctx: &GpuContext, colors: &[[f32; 3]]) -> Result<()> {
        let raw: Vec<f32> = colors.iter().flat_map(|c| [c[0], c[1], c[2], 0.0]).collect();
        self.dye.upload(ctx, &raw)
    }

    pub fn velocity_snapshot(&self, ctx: &GpuContext) -> Result<FieldSnapshot> {
        let raw = self.velocity.read_raw(ctx)?;
        Ok(FieldSnapshot {
            size: self.velocity.size(),
            stride: 2,
            data: raw.into_iter().map(|c| self.encoding.load(c)).collect(),
        })
    }

    pub fn dye_snapshot(&self, ctx: &GpuContext) -> Result<FieldSnapshot> {
        Ok(FieldSnapshot {
            size: self.dye.size(),
            stride: 4,
            data: self.dye.read_raw(ctx)?,
        })
    }

    fn scratch_snapshot(&self, ctx: &GpuContext, field: &ScratchField) -> Result<FieldSnapshot> {
        let raw = field.read_raw(ctx)?;
        Ok(FieldSnapshot {
            size: field.size(),
            stride: 1,
            data: raw.into_iter().map(|c| self.encoding.load(c)).collect(),
        })
    }

    pub fn snapshot(&self, ctx: &GpuContext) -> Result<StateSnapshot> {
        Ok(StateSnapshot {
            velocity: self.velocity_snapshot(ctx)?,
            dye: self.dye_snapshot(ctx)?,
            pressure: self.pressure.snapshot(ctx)?,
            divergence: self.scratch_snapshot(ctx, &self.divergence)?,
            curl: self.scratch_snapshot(ctx, &self.curl)?,
        })
    }
}
