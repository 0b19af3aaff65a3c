//! Host-side measurements over field readbacks. Stencils match the kernels:
//! 4-neighbour central differences with edge clamping.

use serde::Serialize;

use crate::field::{FieldSnapshot, GridSize};

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FlowStats {
    pub avg_speed: f32,
    pub max_speed: f32,
    pub avg_divergence: f32,
    pub max_divergence: f32,
    pub dye_total: f32,
    pub dye_footprint: f32,
}

impl FlowStats {
    pub fn measure(velocity: &FieldSnapshot, dye: &FieldSnapshot) -> Self {
        let (avg_speed, max_speed) = speed_stats(velocity);
        let div = divergence(velocity);
        let (avg_divergence, max_divergence) = abs_stats(&div);
        let (dye_total, dye_footprint) = dye_stats(dye);
        Self {
            avg_speed,
            max_speed,
            avg_divergence,
            max_divergence,
            dye_total,
            dye_footprint,
        }
    }
}

fn clamped(size: GridSize, x: i64, y: i64) -> usize {
    let cx = x.clamp(0, size.width as i64 - 1) as usize;
    let cy = y.clamp(0, size.height as i64 - 1) as usize;
    cy * size.width as usize + cx
}

pub fn speed_stats(velocity: &FieldSnapshot) -> (f32, f32) {
    let mut sum = 0.0f32;
    let mut max = 0.0f32;
    for v in velocity.texels() {
        let s = (v[0] * v[0] + v[1] * v[1]).sqrt();
        sum += s;
        max = max.max(s);
    }
    (sum / velocity.size.cells().max(1) as f32, max)
}

/// Per-texel divergence of a 2-channel velocity snapshot.
pub fn divergence(velocity: &FieldSnapshot) -> Vec<f32> {
    let size = velocity.size;
    let vel = &velocity.data;
    let mut out = Vec::with_capacity(size.cells());
    for y in 0..size.height as i64 {
        for x in 0..size.width as i64 {
            let vl = vel[clamped(size, x - 1, y) * 2];
            let vr = vel[clamped(size, x + 1, y) * 2];
            let vb = vel[clamped(size, x, y - 1) * 2 + 1];
            let vt = vel[clamped(size, x, y + 1) * 2 + 1];
            out.push(0.5 * ((vr - vl) + (vt - vb)));
        }
    }
    out
}

/// Mean and max of absolute values.
pub fn abs_stats(values: &[f32]) -> (f32, f32) {
    let mut sum = 0.0f32;
    let mut max = 0.0f32;
    for v in values {
        sum += v.abs();
        max = max.max(v.abs());
    }
    (sum / values.len().max(1) as f32, max)
}

/// Total dye (sum of colour channels) and the share of texels above 0.01.
pub fn dye_stats(dye: &FieldSnapshot) -> (f32, f32) {
    let mut total = 0.0f32;
    let mut lit = 0usize;
    for c in dye.texels() {
        let s = c[0] + c[1] + c[2];
        total += s;
        if s > 0.01 {
            lit += 1;
        }
    }
    (total, lit as f32 / dye.size.cells().max(1) as f32)
}

/// L2 norm of `(L + R + T + B - 4p) - divergence`.
pub fn poisson_residual(pressure: &[f32], divergence: &[f32], size: GridSize) -> f32 {
    let mut sum = 0.0f64;
    for y in 0..size.height as i64 {
        for x in 0..size.width as i64 {
            let c = clamped(size, x, y);
            let lap = pressure[clamped(size, x - 1, y)]
                + pressure[clamped(size, x + 1, y)]
                + pressure[clamped(size, x, y - 1)]
                + pressure[clamped(size, x, y + 1)]
                - 4.0 * pressure[c];
            let r = (lap - divergence[c]) as f64;
            sum += r * r;
        }
    }
    sum.sqrt() as f32
}
