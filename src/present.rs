use crate::config::SurfaceSize;
use crate::error::{FluidError, Result};
use crate::field::{Field, GridSize};
use crate::gpu::GpuContext;
use crate::kernels::{Kernel, KernelSet, StageParams};

pub const FRAME_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Surface-sized colour target the dye field is resolved into every frame.
pub struct Presentation {
    size: GridSize,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl Presentation {
    pub fn new(ctx: &GpuContext, surface: SurfaceSize) -> Self {
        let size = GridSize::new(surface.width, surface.height);
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("frame"),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FRAME_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { size, texture, view }
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    /// Texture for a consumer to sample or blit onto the visible surface.
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn render(&self, ctx: &GpuContext, kernels: &KernelSet, dye: &Field) {
        let params = StageParams::over(self.size, false).with_source(dye.size());
        kernels.dispatch(
            ctx,
            Kernel::Display,
            &params,
            &[
                dye.read().as_entire_binding(),
                wgpu::BindingResource::TextureView(&self.view),
            ],
        );
    }

    /// Tightly packed RGBA8 rows, top row first.
    pub fn read_pixels(&self, ctx: &GpuContext) -> Result<Vec<[u8; 4]>> {
        let row = self.size.width * 4;
        let padded = row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let size = padded as u64 * self.size.height as u64;
        let max = ctx.device.limits().max_buffer_size;
        if size > max {
            return Err(FluidError::Readback {
                label: "frame-readback".to_string(),
                reason: format!("{size} bytes exceeds the {max}-byte buffer limit"),
            });
        }
        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame-readback"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = ctx.device.create_command_encoder(&Default::default());
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.size.height),
                },
            },
            wgpu::Extent3d {
                width: self.size.width,
                height: self.size.height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(Some(encoder.finish()));

        let bytes = ctx.map_staging("frame-readback", &staging)?;
        let mut pixels = Vec::with_capacity(self.size.cells());
        for y in 0..self.size.height as usize {
            let start = y * padded as usize;
            pixels.extend(
                bytes[start..start + row as usize]
                    .chunks_exact(4)
                    .map(|px| [px[0], px[1], px[2], px[3]]),
            );
        }
        Ok(pixels)
    }
}
