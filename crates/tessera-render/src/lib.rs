//! wgpu side of the texture atlas: capability probing and snapshot upload.

mod probe;
mod upload;

pub use probe::{probe_capabilities, probe_default_adapter};
pub use upload::{GpuSurface, SURFACE_FORMAT, SurfaceBinding, SurfaceUploader, UploadError};
