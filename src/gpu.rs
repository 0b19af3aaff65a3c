use crate::error::{FluidError, Result};

/// Device and queue the solver dispatches on.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Blocking adapter + device acquisition. A failure here is permanent for the process.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::request())
    }

    pub async fn request() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| {
                log::error!("no GPU adapter: {e}");
                FluidError::NoAdapter(e.to_string())
            })?;
        let adapter_info = adapter.get_info();

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("fluid-device"),
                ..Default::default()
            })
            .await
            .map_err(|e| {
                log::error!("request_device failed on {}: {e}", adapter_info.name);
                FluidError::DeviceRequest(e.to_string())
            })?;

        log::info!("using {} ({:?})", adapter_info.name, adapter_info.backend);
        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }

    pub fn backend_name(&self) -> String {
        format!("{:?}/wgpu", self.adapter_info.backend).to_lowercase()
    }

    /// Copies `size` bytes of `src` into a mappable buffer and waits for the map.
    pub fn read_bytes(&self, label: &str, src: &wgpu::Buffer, size: u64) -> Result<Vec<u8>> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&Default::default());
        encoder.copy_buffer_to_buffer(src, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));
        self.map_staging(label, &staging)
    }

    pub fn read_f32(&self, label: &str, src: &wgpu::Buffer, len: usize) -> Result<Vec<f32>> {
        let bytes = self.read_bytes(label, src, (len * std::mem::size_of::<f32>()) as u64)?;
        Ok(bytemuck::cast_slice(&bytes).to_vec())
    }

    pub(crate) fn map_staging(&self, label: &str, staging: &wgpu::Buffer) -> Result<Vec<u8>> {
        let slice = staging.slice(..);
        map_wait(&self.device, &slice).map_err(|reason| FluidError::Readback {
            label: label.to_string(),
            reason,
        })?;
        let bytes = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(bytes)
    }

    /// Blocks until all submitted work has finished. A lost device surfaces here.
    pub fn wait_idle(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| {
                log::error!("device poll failed: {e}");
                FluidError::Readback {
                    label: "wait-idle".to_string(),
                    reason: e.to_string(),
                }
            })
    }
}

fn map_wait(device: &wgpu::Device, slice: &wgpu::BufferSlice<'_>) -> std::result::Result<(), String> {
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| e.to_string())?;
    match rx.recv() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("map_async channel closed".into()),
    }
}
