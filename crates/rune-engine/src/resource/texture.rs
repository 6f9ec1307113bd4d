use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::device::{DeviceShared, GpuResult, ResourceKind, Tracked, ValidationError};

/// Parameters for [`Device::create_texture`](crate::device::Device::create_texture).
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    pub label: Option<&'a str>,
    pub size: wgpu::Extent3d,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub dimension: wgpu::TextureDimension,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
    /// Additional formats views may use. Only the sRGB toggle of `format` is allowed.
    pub view_formats: &'a [wgpu::TextureFormat],
}

impl Default for TextureDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::empty(),
            view_formats: &[],
        }
    }
}

struct TextureInner {
    tracked: Tracked,
    size: wgpu::Extent3d,
    mip_level_count: u32,
    sample_count: u32,
    dimension: wgpu::TextureDimension,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
    view_formats: Vec<wgpu::TextureFormat>,
    destroyed: AtomicBool,
}

/// GPU image. Its texels are not host visible.
#[derive(Clone)]
pub struct Texture {
    inner: Arc<TextureInner>,
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("label", &self.inner.tracked.label())
            .field("size", &self.inner.size)
            .field("format", &self.inner.format)
            .finish()
    }
}

impl Texture {
    pub(crate) fn create(device: &Arc<DeviceShared>, desc: &TextureDescriptor<'_>) -> GpuResult<Self> {
        device.check_alive()?;
        validate_descriptor(device.limits(), desc)?;

        let tracked = Tracked::new(device, ResourceKind::Texture, desc.label);
        log::debug!(
            "texture '{}' created: {}x{}x{} {:?}",
            tracked.name(),
            desc.size.width,
            desc.size.height,
            desc.size.depth_or_array_layers,
            desc.format
        );

        Ok(Self {
            inner: Arc::new(TextureInner {
                tracked,
                size: desc.size,
                mip_level_count: desc.mip_level_count,
                sample_count: desc.sample_count,
                dimension: desc.dimension,
                format: desc.format,
                usage: desc.usage,
                view_formats: desc.view_formats.to_vec(),
                destroyed: AtomicBool::new(false),
            }),
        })
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.tracked.label()
    }

    pub fn size(&self) -> wgpu::Extent3d {
        self.inner.size
    }

    pub fn width(&self) -> u32 {
        self.inner.size.width
    }

    pub fn height(&self) -> u32 {
        self.inner.size.height
    }

    pub fn depth_or_array_layers(&self) -> u32 {
        self.inner.size.depth_or_array_layers
    }

    pub fn mip_level_count(&self) -> u32 {
        self.inner.mip_level_count
    }

    pub fn sample_count(&self) -> u32 {
        self.inner.sample_count
    }

    pub fn dimension(&self) -> wgpu::TextureDimension {
        self.inner.dimension
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.inner.format
    }

    pub fn usage(&self) -> wgpu::TextureUsages {
        self.inner.usage
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Releases the texture now. Views stay valid handles but fail on use.
    pub fn destroy(&self) {
        if !self.inner.destroyed.swap(true, Ordering::AcqRel) {
            log::debug!("texture '{}' destroyed", self.name());
        }
    }

    pub fn create_view(&self, desc: &TextureViewDescriptor<'_>) -> GpuResult<TextureView> {
        TextureView::create(self, desc)
    }

    pub(crate) fn device(&self) -> &Arc<DeviceShared> {
        self.inner.tracked.device()
    }

    pub(crate) fn name(&self) -> String {
        self.inner.tracked.name()
    }

    pub(crate) fn check_usage(&self, required: wgpu::TextureUsages) -> GpuResult<()> {
        if !self.inner.usage.contains(required) {
            return Err(ValidationError::MissingTextureUsage {
                label: self.name(),
                missing: required - self.inner.usage,
            }
            .into());
        }
        Ok(())
    }

    pub(crate) fn check_not_destroyed(&self) -> GpuResult<()> {
        if self.is_destroyed() {
            return Err(ValidationError::DestroyedResource {
                kind: "texture",
                label: self.name(),
            }
            .into());
        }
        Ok(())
    }
}

fn validate_descriptor(limits: &wgpu::Limits, desc: &TextureDescriptor<'_>) -> GpuResult<()> {
    use wgpu::TextureDimension as D;
    use wgpu::TextureUsages as U;

    if desc.usage.is_empty() {
        return Err(ValidationError::EmptyUsage.into());
    }

    let wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: depth,
    } = desc.size;
    let within = match desc.dimension {
        D::D1 => width <= limits.max_texture_dimension_1d && height == 1 && depth == 1,
        D::D2 => {
            width <= limits.max_texture_dimension_2d
                && height <= limits.max_texture_dimension_2d
                && depth <= limits.max_texture_array_layers
        }
        D::D3 => {
            width <= limits.max_texture_dimension_3d
                && height <= limits.max_texture_dimension_3d
                && depth <= limits.max_texture_dimension_3d
        }
    };
    if width == 0 || height == 0 || depth == 0 || !within {
        return Err(ValidationError::InvalidTextureExtent {
            width,
            height,
            depth,
            dimension: desc.dimension,
        }
        .into());
    }

    let max_mips = desc.size.max_mips(desc.dimension);
    if desc.mip_level_count == 0 || desc.mip_level_count > max_mips {
        return Err(ValidationError::InvalidMipLevelCount {
            requested: desc.mip_level_count,
            max: max_mips,
        }
        .into());
    }

    match desc.sample_count {
        1 => {}
        4 => {
            let valid = desc.dimension == D::D2
                && depth == 1
                && desc.mip_level_count == 1
                && desc.usage.contains(U::RENDER_ATTACHMENT)
                && !desc.usage.contains(U::STORAGE_BINDING);
            if !valid {
                return Err(ValidationError::InvalidMultisampleTexture.into());
            }
        }
        other => return Err(ValidationError::InvalidSampleCount(other).into()),
    }

    let format = desc.format;
    if (format.is_depth_stencil_format() || format.is_compressed()) && desc.dimension != D::D2 {
        return Err(ValidationError::FormatDimension {
            format,
            dimension: desc.dimension,
        }
        .into());
    }

    let allowed = format
        .guaranteed_format_features(wgpu::Features::empty())
        .allowed_usages;
    let mut unsupported = desc.usage - allowed;
    if format.is_compressed() {
        unsupported |= desc.usage & U::RENDER_ATTACHMENT;
    }
    if !unsupported.is_empty() {
        return Err(ValidationError::FormatUsage {
            format,
            usage: unsupported,
        }
        .into());
    }

    for &view in desc.view_formats {
        if view.remove_srgb_suffix() != format.remove_srgb_suffix() {
            return Err(ValidationError::IncompatibleViewFormat {
                texture: format,
                view,
            }
            .into());
        }
    }

    Ok(())
}

/// Parameters for [`Texture::create_view`]. `None` fields inherit from the texture.
#[derive(Debug, Clone, Default)]
pub struct TextureViewDescriptor<'a> {
    pub label: Option<&'a str>,
    pub format: Option<wgpu::TextureFormat>,
    pub dimension: Option<wgpu::TextureViewDimension>,
    pub base_mip_level: u32,
    pub mip_level_count: Option<u32>,
    pub base_array_layer: u32,
    pub array_layer_count: Option<u32>,
}

struct TextureViewInner {
    tracked: Tracked,
    texture: Texture,
    format: wgpu::TextureFormat,
    dimension: wgpu::TextureViewDimension,
    base_mip_level: u32,
    mip_level_count: u32,
    base_array_layer: u32,
    array_layer_count: u32,
}

/// Subresource selection of a texture, used as attachment or binding.
#[derive(Clone)]
pub struct TextureView {
    inner: Arc<TextureViewInner>,
}

impl std::fmt::Debug for TextureView {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("TextureView")
            .field("texture", &self.inner.texture.label())
            .field("format", &self.inner.format)
            .field("dimension", &self.inner.dimension)
            .finish()
    }
}

impl TextureView {
    fn create(texture: &Texture, desc: &TextureViewDescriptor<'_>) -> GpuResult<Self> {
        use wgpu::TextureDimension as D;
        use wgpu::TextureViewDimension as V;

        texture.device().check_alive()?;
        texture.check_not_destroyed()?;

        let format = desc.format.unwrap_or(texture.format());
        if format != texture.format() && !texture.inner.view_formats.contains(&format) {
            return Err(ValidationError::IncompatibleViewFormat {
                texture: texture.format(),
                view: format,
            }
            .into());
        }

        let layers = texture.depth_or_array_layers();
        let dimension = desc.dimension.unwrap_or(match texture.dimension() {
            D::D1 => V::D1,
            D::D2 if layers == 1 => V::D2,
            D::D2 => V::D2Array,
            D::D3 => V::D3,
        });

        let compatible = matches!(
            (texture.dimension(), dimension),
            (D::D1, V::D1)
                | (D::D2, V::D2 | V::D2Array | V::Cube | V::CubeArray)
                | (D::D3, V::D3)
        );
        if !compatible {
            return Err(ValidationError::IncompatibleViewDimension {
                texture: texture.dimension(),
                view: dimension,
            }
            .into());
        }

        let mip_level_count = desc
            .mip_level_count
            .unwrap_or_else(|| texture.mip_level_count().saturating_sub(desc.base_mip_level));
        let array_layer_count = match (desc.array_layer_count, dimension) {
            (Some(count), _) => count,
            (None, V::D1 | V::D2 | V::D3) => 1,
            (None, V::Cube) => 6,
            (None, _) => layers.saturating_sub(desc.base_array_layer),
        };
        let physical_layers = if texture.dimension() == D::D3 { 1 } else { layers };

        let layers_fit = match dimension {
            V::D1 | V::D2 | V::D3 => array_layer_count == 1,
            V::Cube => array_layer_count == 6,
            V::CubeArray => array_layer_count % 6 == 0,
            V::D2Array => true,
        };
        let in_range = mip_level_count >= 1
            && desc.base_mip_level + mip_level_count <= texture.mip_level_count()
            && array_layer_count >= 1
            && desc.base_array_layer + array_layer_count <= physical_layers;
        if !layers_fit || !in_range {
            return Err(ValidationError::ViewRangeOutOfBounds.into());
        }

        let label = desc.label.or(texture.label());
        Ok(Self {
            inner: Arc::new(TextureViewInner {
                tracked: Tracked::new(texture.device(), ResourceKind::TextureView, label),
                texture: texture.clone(),
                format,
                dimension,
                base_mip_level: desc.base_mip_level,
                mip_level_count,
                base_array_layer: desc.base_array_layer,
                array_layer_count,
            }),
        })
    }

    pub fn texture(&self) -> &Texture {
        &self.inner.texture
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.inner.format
    }

    pub fn dimension(&self) -> wgpu::TextureViewDimension {
        self.inner.dimension
    }

    pub fn base_mip_level(&self) -> u32 {
        self.inner.base_mip_level
    }

    pub fn mip_level_count(&self) -> u32 {
        self.inner.mip_level_count
    }

    pub fn base_array_layer(&self) -> u32 {
        self.inner.base_array_layer
    }

    pub fn array_layer_count(&self) -> u32 {
        self.inner.array_layer_count
    }

    pub fn sample_count(&self) -> u32 {
        self.inner.texture.sample_count()
    }

    /// Width and height of the base mip level of the view.
    pub fn extent(&self) -> (u32, u32) {
        let level = self.inner.base_mip_level;
        let texture = &self.inner.texture;
        ((texture.width() >> level).max(1), (texture.height() >> level).max(1))
    }

    pub(crate) fn device(&self) -> &Arc<DeviceShared> {
        self.inner.tracked.device()
    }

    pub(crate) fn texture_destroyed(&self) -> bool {
        self.inner.texture.is_destroyed()
    }

    pub(crate) fn texture_name(&self) -> String {
        self.inner.texture.name()
    }

    pub(crate) fn ptr_eq(&self, other: &TextureView) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, GpuError};
    use crate::test_support::device;

    fn texture(device: &Device, desc: TextureDescriptor<'_>) -> GpuResult<Texture> {
        device.create_texture(&desc)
    }

    fn size(width: u32, height: u32, layers: u32) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: layers,
        }
    }

    // ── textures ──────────────────────────────────────────────────────────

    #[test]
    fn depth_texture_is_accepted() {
        let (device, _queue) = device();
        let depth = texture(
            &device,
            TextureDescriptor {
                label: Some("depth"),
                size: size(640, 480, 1),
                format: wgpu::TextureFormat::Depth24Plus,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(depth.format(), wgpu::TextureFormat::Depth24Plus);
        assert_eq!((depth.width(), depth.height()), (640, 480));
    }

    #[test]
    fn zero_extent_fails() {
        let (device, _queue) = device();
        let err = texture(
            &device,
            TextureDescriptor {
                size: size(0, 4, 1),
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GpuError::Validation(ValidationError::InvalidTextureExtent { width: 0, .. })
        ));
    }

    #[test]
    fn mip_count_is_capped_by_chain() {
        let (device, _queue) = device();
        let err = texture(
            &device,
            TextureDescriptor {
                size: size(16, 16, 1),
                mip_level_count: 6,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            GpuError::from(ValidationError::InvalidMipLevelCount { requested: 6, max: 5 })
        );
    }

    #[test]
    fn multisample_rules() {
        let (device, _queue) = device();
        let base = TextureDescriptor {
            size: size(64, 64, 1),
            sample_count: 4,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            ..Default::default()
        };
        assert!(texture(&device, base.clone()).is_ok());

        let sampled_only = TextureDescriptor {
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            ..base.clone()
        };
        assert_eq!(
            texture(&device, sampled_only).unwrap_err(),
            GpuError::from(ValidationError::InvalidMultisampleTexture)
        );

        let two = TextureDescriptor {
            sample_count: 2,
            ..base
        };
        assert_eq!(
            texture(&device, two).unwrap_err(),
            GpuError::from(ValidationError::InvalidSampleCount(2))
        );
    }

    #[test]
    fn depth_format_must_be_2d() {
        let (device, _queue) = device();
        let err = texture(
            &device,
            TextureDescriptor {
                size: size(8, 8, 8),
                dimension: wgpu::TextureDimension::D3,
                format: wgpu::TextureFormat::Depth32Float,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GpuError::Validation(ValidationError::FormatDimension { .. })
        ));
    }

    #[test]
    fn view_formats_only_toggle_srgb() {
        let (device, _queue) = device();
        let ok = texture(
            &device,
            TextureDescriptor {
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[wgpu::TextureFormat::Rgba8UnormSrgb],
                ..Default::default()
            },
        );
        assert!(ok.is_ok());

        let err = texture(
            &device,
            TextureDescriptor {
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[wgpu::TextureFormat::Bgra8Unorm],
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GpuError::Validation(ValidationError::IncompatibleViewFormat { .. })
        ));
    }

    // ── views ─────────────────────────────────────────────────────────────

    #[test]
    fn default_view_inherits_texture() {
        let (device, _queue) = device();
        let tex = texture(
            &device,
            TextureDescriptor {
                size: size(32, 16, 1),
                mip_level_count: 3,
                format: wgpu::TextureFormat::Bgra8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                ..Default::default()
            },
        )
        .unwrap();

        let view = tex.create_view(&Default::default()).unwrap();
        assert_eq!(view.format(), wgpu::TextureFormat::Bgra8UnormSrgb);
        assert_eq!(view.dimension(), wgpu::TextureViewDimension::D2);
        assert_eq!(view.mip_level_count(), 3);

        let level = tex
            .create_view(&TextureViewDescriptor {
                base_mip_level: 2,
                mip_level_count: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(level.extent(), (8, 4));
    }

    #[test]
    fn view_range_is_checked() {
        let (device, _queue) = device();
        let tex = texture(
            &device,
            TextureDescriptor {
                size: size(4, 4, 1),
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                ..Default::default()
            },
        )
        .unwrap();

        let err = tex
            .create_view(&TextureViewDescriptor {
                base_mip_level: 1,
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err, GpuError::from(ValidationError::ViewRangeOutOfBounds));

        let err = tex
            .create_view(&TextureViewDescriptor {
                dimension: Some(wgpu::TextureViewDimension::D3),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(
            err,
            GpuError::Validation(ValidationError::IncompatibleViewDimension { .. })
        ));
    }

    #[test]
    fn destroyed_texture_rejects_views() {
        let (device, _queue) = device();
        let tex = texture(
            &device,
            TextureDescriptor {
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                ..Default::default()
            },
        )
        .unwrap();
        tex.destroy();
        assert!(matches!(
            tex.create_view(&Default::default()),
            Err(GpuError::Validation(ValidationError::DestroyedResource { kind: "texture", .. }))
        ));
    }
}
