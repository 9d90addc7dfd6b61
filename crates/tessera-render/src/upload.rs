//! GPU upload of published surface snapshots.
//!
//! [`SurfaceUploader`] owns the sampler and bind group layouts; a
//! [`SurfaceBinding`] follows one watch receiver and re-uploads only when a
//! newer snapshot has been published.

use tessera_atlas::{SurfaceImage, SurfaceSnapshot};
use tokio::sync::watch;

/// Texel format of every uploaded surface.
pub const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Errors that can occur while uploading a surface.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Nothing has been published yet.
    #[error("surface snapshot is empty")]
    EmptySurface,

    /// Width or height is zero.
    #[error("surface dimensions must be non-zero, got {width}x{height}")]
    ZeroDimensions { width: u32, height: u32 },

    /// The surface is larger than the device allows.
    #[error("surface {width}x{height}x{layers} exceeds device limits ({max_dimension}px, {max_layers} layers)")]
    ExceedsLimits {
        width: u32,
        height: u32,
        layers: u32,
        max_dimension: u32,
        max_layers: u32,
    },

    /// Texture array layers have inconsistent sizes.
    #[error("texture array layers have inconsistent dimensions")]
    InconsistentLayerDimensions,
}

/// A surface snapshot resident on the GPU.
pub struct GpuSurface {
    /// The underlying GPU texture.
    pub texture: wgpu::Texture,
    /// View matching the surface kind (`D2` or `D2Array`).
    pub view: wgpu::TextureView,
    /// Bind group: texture at binding 0, nearest sampler at binding 1.
    pub bind_group: wgpu::BindGroup,
    /// Generation of the uploaded snapshot.
    pub generation: u64,
    /// Width and height in texels.
    pub dimensions: (u32, u32),
    /// Layer count (1 for an atlas).
    pub layers: u32,
    /// Whether the view is a texture array.
    pub is_array: bool,
}

/// Creates GPU textures from surface snapshots.
pub struct SurfaceUploader {
    sampler: wgpu::Sampler,
    atlas_layout: wgpu::BindGroupLayout,
    array_layout: wgpu::BindGroupLayout,
}

fn bind_group_layout(
    device: &wgpu::Device,
    label: &str,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

impl SurfaceUploader {
    /// Creates the shared nearest sampler and both bind group layouts.
    pub fn new(device: &wgpu::Device) -> Self {
        // Block textures are pixel art. Clamp keeps array layers from wrapping.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("tessera-sampler-nearest"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        Self {
            sampler,
            atlas_layout: bind_group_layout(
                device,
                "tessera-atlas-layout",
                wgpu::TextureViewDimension::D2,
            ),
            array_layout: bind_group_layout(
                device,
                "tessera-array-layout",
                wgpu::TextureViewDimension::D2Array,
            ),
        }
    }

    /// Layout for pipelines sampling an atlas (`texture_2d`).
    pub fn atlas_layout(&self) -> &wgpu::BindGroupLayout {
        &self.atlas_layout
    }

    /// Layout for pipelines sampling a texture array (`texture_2d_array`).
    pub fn array_layout(&self) -> &wgpu::BindGroupLayout {
        &self.array_layout
    }

    /// Uploads a snapshot into a fresh texture.
    pub fn upload(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        snapshot: &SurfaceSnapshot,
    ) -> Result<GpuSurface, UploadError> {
        let layers: Vec<&image::RgbaImage> = match &snapshot.image {
            SurfaceImage::Empty => return Err(UploadError::EmptySurface),
            SurfaceImage::Atlas(img) => vec![img.as_ref()],
            SurfaceImage::Layers { layers, .. } => layers.iter().map(|l| l.as_ref()).collect(),
        };
        let is_array = matches!(snapshot.image, SurfaceImage::Layers { .. });
        let (width, height) = layers.first().map(|l| l.dimensions()).unwrap_or((0, 0));
        if width == 0 || height == 0 {
            return Err(UploadError::ZeroDimensions { width, height });
        }
        if layers.iter().any(|l| l.dimensions() != (width, height)) {
            return Err(UploadError::InconsistentLayerDimensions);
        }

        let layer_count = layers.len() as u32;
        let limits = device.limits();
        if width > limits.max_texture_dimension_2d
            || height > limits.max_texture_dimension_2d
            || layer_count > limits.max_texture_array_layers
        {
            return Err(UploadError::ExceedsLimits {
                width,
                height,
                layers: layer_count,
                max_dimension: limits.max_texture_dimension_2d,
                max_layers: limits.max_texture_array_layers,
            });
        }

        let label = format!("tessera-surface-{}", snapshot.generation);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: layer_count,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SURFACE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (i, layer) in layers.iter().enumerate() {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: i as u32,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                layer.as_raw(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * width),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }

        let (view_dimension, layout) = if is_array {
            (wgpu::TextureViewDimension::D2Array, &self.array_layout)
        } else {
            (wgpu::TextureViewDimension::D2, &self.atlas_layout)
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(view_dimension),
            ..Default::default()
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}-bind-group")),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        log::info!(
            "Uploaded surface generation {} ({width}x{height}, {layer_count} layers)",
            snapshot.generation
        );
        Ok(GpuSurface {
            texture,
            view,
            bind_group,
            generation: snapshot.generation,
            dimensions: (width, height),
            layers: layer_count,
            is_array,
        })
    }
}

/// Keeps a GPU copy of the latest published surface.
///
/// The previous texture stays bound until a newer one has uploaded, so a
/// frame never samples a half-built surface.
pub struct SurfaceBinding {
    rx: watch::Receiver<SurfaceSnapshot>,
    current: Option<GpuSurface>,
}

impl SurfaceBinding {
    /// Follows `rx` (from `TextureContext::subscribe`).
    pub fn new(rx: watch::Receiver<SurfaceSnapshot>) -> Self {
        Self { rx, current: None }
    }

    /// Uploads the latest snapshot if it is newer than the bound one.
    ///
    /// Returns `true` when the bind group changed and pipelines must rebind.
    pub fn refresh(
        &mut self,
        uploader: &SurfaceUploader,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<bool, UploadError> {
        let changed = self.rx.has_changed().unwrap_or(false);
        if !changed && self.current.is_some() {
            return Ok(false);
        }
        let snapshot = self.rx.borrow_and_update().clone();
        if matches!(snapshot.image, SurfaceImage::Empty) {
            return Ok(false);
        }
        if self
            .current
            .as_ref()
            .is_some_and(|c| c.generation == snapshot.generation)
        {
            return Ok(false);
        }
        self.current = Some(uploader.upload(device, queue, &snapshot)?);
        Ok(true)
    }

    /// The bound surface, if any snapshot has been uploaded.
    pub fn current(&self) -> Option<&GpuSurface> {
        self.current.as_ref()
    }
}

/// Create a test GPU device and queue. Returns `None` if no GPU is available.
#[cfg(test)]
pub(crate) fn create_test_device_queue() -> Option<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok()?;

        adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: Default::default(),
                ..Default::default()
            })
            .await
            .ok()
    })
}
