//! Grid storage on the GPU.
//!
//! A [`Field`] is a read/write pair of equally shaped storage buffers. A stage binds
//! the read half as input and the write half as output, then the caller swaps.
//! [`ScratchField`] is a single buffer that is fully overwritten each frame and is
//! never read by the stage that writes it.

use serde::Serialize;
use wgpu::util::DeviceExt;

use crate::error::{FluidError, Result};
use crate::gpu::GpuContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

impl GridSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn cells(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn texel_size(&self) -> [f32; 2] {
        [1.0 / self.width as f32, 1.0 / self.height as f32]
    }

    /// Normalized coordinate of the centre of texel `(x, y)`.
    pub fn texel_center(&self, x: u32, y: u32) -> [f32; 2] {
        [
            (x as f32 + 0.5) / self.width as f32,
            (y as f32 + 0.5) / self.height as f32,
        ]
    }

    pub fn workgroups(&self) -> (u32, u32) {
        (self.width.div_ceil(8), self.height.div_ceil(8))
    }
}

/// Channel layout of one texel in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    /// `array<f32>`: pressure, divergence, curl.
    Scalar,
    /// `array<vec2<f32>>`: velocity.
    Vector,
    /// `array<vec4<f32>>`: dye, fourth channel unused.
    Color,
}

impl Channels {
    pub fn stride(self) -> usize {
        match self {
            Channels::Scalar => 1,
            Channels::Vector => 2,
            Channels::Color => 4,
        }
    }
}

fn storage_buffer(
    ctx: &GpuContext,
    label: &str,
    size: GridSize,
    channels: Channels,
    fill: f32,
) -> wgpu::Buffer {
    let contents = vec![fill; size.cells() * channels.stride()];
    ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(&contents),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
    })
}

pub struct Field {
    label: String,
    size: GridSize,
    channels: Channels,
    read: wgpu::Buffer,
    write: wgpu::Buffer,
}

impl Field {
    /// Both halves start with every channel set to `fill`.
    pub fn new(ctx: &GpuContext, label: &str, size: GridSize, channels: Channels, fill: f32) -> Self {
        Self {
            label: label.to_string(),
            size,
            channels,
            read: storage_buffer(ctx, &format!("{label}-a"), size, channels, fill),
            write: storage_buffer(ctx, &format!("{label}-b"), size, channels, fill),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    pub fn read(&self) -> &wgpu::Buffer {
        &self.read
    }

    pub fn write(&self) -> &wgpu::Buffer {
        &self.write
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
    }

    pub fn len(&self) -> usize {
        self.size.cells() * self.channels.stride()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the read half with raw storage values. `raw` must cover the field exactly.
    pub fn upload(&self, ctx: &GpuContext, raw: &[f32]) -> Result<()> {
        if raw.len() != self.len() {
            return Err(FluidError::InvalidConfig(format!(
                "{} expects {} values, got {}",
                self.label,
                self.len(),
                raw.len()
            )));
        }
        ctx.queue.write_buffer(&self.read, 0, bytemuck::cast_slice(raw));
        Ok(())
    }

    /// Raw storage values of the read half.
    pub fn read_raw(&self, ctx: &GpuContext) -> Result<Vec<f32>> {
        ctx.read_f32(&format!("{}-readback", self.label), &self.read, self.len())
    }
}

pub struct ScratchField {
    label: String,
    size: GridSize,
    buffer: wgpu::Buffer,
}

impl ScratchField {
    pub fn new(ctx: &GpuContext, label: &str, size: GridSize, fill: f32) -> Self {
        Self {
            label: label.to_string(),
            size,
            buffer: storage_buffer(ctx, label, size, Channels::Scalar, fill),
        }
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn read_raw(&self, ctx: &GpuContext) -> Result<Vec<f32>> {
        ctx.read_f32(&format!("{}-readback", self.label), &self.buffer, self.size.cells())
    }
}

/// Host copy of a field's physical values, row-major with `y = 0` at the bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSnapshot {
    pub size: GridSize,
    pub stride: usize,
    pub data: Vec<f32>,
}

impl FieldSnapshot {
    pub fn texel(&self, x: u32, y: u32) -> &[f32] {
        let i = (y as usize * self.size.width as usize + x as usize) * self.stride;
        &self.data[i..i + self.stride]
    }

    pub fn texels(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.stride)
    }

    pub fn max_abs(&self) -> f32 {
        self.data.iter().fold(0.0f32, |m, v| m.max(v.abs()))
    }
}
