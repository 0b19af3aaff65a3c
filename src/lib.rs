//! GPU-resident 2D stable-fluids solver that paints a dye field.
//!
//! [`FluidSolver`] owns the fields and the kernel set and advances them once per
//! external frame tick. Pointer motion, timed ambient bursts and a scripted ribbon
//! are the forcing sources; the dye field is resolved into an RGBA texture every
//! frame for an external surface to display.

pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod encoding;
pub mod error;
pub mod field;
pub mod forcing;
pub mod gpu;
pub mod kernels;
pub mod present;
pub mod pressure;
pub mod scheduler;
pub mod state;

pub use clock::{FrameClock, FrameTick};
pub use config::{SolverConfig, SurfaceSize};
pub use encoding::FieldEncoding;
pub use error::{FluidError, Result};
pub use field::{FieldSnapshot, GridSize};
pub use forcing::Splat;
pub use gpu::GpuContext;
pub use scheduler::{FluidSolver, FrameReport, RunState};
pub use state::{SimulationState, StateSnapshot};
