use thiserror::Error;

#[derive(Debug, Error)]
pub enum FluidError {
    #[error("no GPU adapter: {0}")]
    NoAdapter(String),
    #[error("request_device failed: {0}")]
    DeviceRequest(String),
    #[error("kernel `{kernel}` failed to build:\n{diagnostic}")]
    KernelBuild {
        kernel: &'static str,
        diagnostic: String,
    },
    #[error("readback of `{label}` failed: {reason}")]
    Readback { label: String, reason: String },
    #[error("surface {width}x{height} cannot be allocated: {reason}")]
    SurfaceTooLarge { width: u32, height: u32, reason: String },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("simulation fields are not allocated (surface has zero area)")]
    NotReady,
}

pub type Result<T> = std::result::Result<T, FluidError>;
