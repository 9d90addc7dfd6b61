//! Capability probing: decides between the atlas and texture-array backends.

use tessera_atlas::SurfaceCapabilities;

/// Capabilities implied by a device's limits.
///
/// Every wgpu backend can sample 2D arrays, so the layer limit is what
/// matters; a limit of one layer means arrays are useless.
pub fn probe_capabilities(limits: &wgpu::Limits) -> SurfaceCapabilities {
    if limits.max_texture_array_layers > 1 {
        SurfaceCapabilities::with_texture_arrays(limits.max_texture_array_layers)
    } else {
        SurfaceCapabilities::atlas_only()
    }
}

/// Probes the default adapter without creating a device.
///
/// Returns `None` if no adapter is available (headless machines, CI).
pub fn probe_default_adapter() -> Option<SurfaceCapabilities> {
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
        let info = adapter.get_info();
        let capabilities = probe_capabilities(&adapter.limits());
        log::info!(
            "Probed adapter '{}' ({:?}): {} array layers",
            info.name,
            info.backend,
            capabilities.max_array_layers
        );
        Some(capabilities)
    })
}
