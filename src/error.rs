use crate::kernel::{Kernel, KernelStage, ParameterKind};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FluidError {
    #[error("invalid grid resolution {0}, needs to be greater than zero")]
    InvalidGridResolution(u32),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("texel format {format:?} can't be used for {usage}")]
    UnsupportedFormat { format: wgpu::TextureFormat, usage: &'static str },
    #[error("initial data for \"{label}\" has {actual} bytes, expected {expected}")]
    InitialDataSize { label: String, expected: usize, actual: usize },
    #[error("failed to create \"{label}\": {message}")]
    ResourceCreation { label: String, message: String },

    #[error("no kernel set")]
    NoKernel,
    #[error("kernel {kernel} can't be run as {requested} kernel")]
    WrongKernelStage { kernel: Kernel, requested: KernelStage },
    #[error("kernel {kernel} has no parameter named \"{name}\"")]
    UnknownParameter { kernel: Kernel, name: &'static str },
    #[error("parameter \"{name}\" of kernel {kernel} was never set")]
    MissingParameter { kernel: Kernel, name: &'static str },
    #[error("parameter \"{name}\" of kernel {kernel} expects {expected:?}, got {actual:?}")]
    ParameterKindMismatch {
        kernel: Kernel,
        name: &'static str,
        expected: ParameterKind,
        actual: ParameterKind,
    },
    #[error("kernel {0} invoked without uploading its parameters")]
    ParametersNotUploaded(Kernel),
    #[error("kernel {kernel} has no binding named \"{name}\" of that kind")]
    UnknownBinding { kernel: Kernel, name: &'static str },
    #[error("binding \"{name}\" of kernel {kernel} is not bound")]
    MissingBinding { kernel: Kernel, name: &'static str },
    #[error("kernel {kernel} reads and writes the same volume through \"{read}\" and \"{write}\"")]
    BindingHazard {
        kernel: Kernel,
        read: &'static str,
        write: &'static str,
    },
    #[error("no render target set")]
    NoRenderTarget,

    #[error("device error: {0}")]
    Device(String),
    #[error("failed to load shader {path:?}: {message}")]
    Shader { path: PathBuf, message: String },
    #[error("failed to watch shader directory: {0}")]
    ShaderWatch(#[from] notify::Error),
    #[error("no suitable graphics adapter found")]
    NoAdapter,
    #[error("graphics adapter lacks required features {0:?}")]
    MissingFeatures(wgpu::Features),
    #[error("failed to request device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
