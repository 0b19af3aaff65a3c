//! Storage convention for signed quantities.
//!
//! Velocity, pressure, divergence and curl are signed. Under [`FieldEncoding::Packed`]
//! they are stored remapped into `[0, 1]` and every kernel decodes on read and
//! encodes on write. Values outside `[-1, 1]` saturate on write.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldEncoding {
    #[default]
    Packed,
    Linear,
}

impl FieldEncoding {
    pub fn is_packed(self) -> bool {
        matches!(self, FieldEncoding::Packed)
    }

    /// Stored representation of a physical value.
    pub fn store(self, v: f32) -> f32 {
        match self {
            FieldEncoding::Packed => encode(v).clamp(0.0, 1.0),
            FieldEncoding::Linear => v,
        }
    }

    /// Physical value of a stored channel.
    pub fn load(self, c: f32) -> f32 {
        match self {
            FieldEncoding::Packed => decode(c),
            FieldEncoding::Linear => c,
        }
    }
}

pub fn encode(v: f32) -> f32 {
    v * 0.5 + 0.5
}

pub fn decode(c: f32) -> f32 {
    c * 2.0 - 1.0
}
