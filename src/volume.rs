use crate::grid::GridResolution;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies the storage behind a volume. Clones of a [`VolumeResource`] share the id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeId(u64);

impl VolumeId {
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        VolumeId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A readable and a writable view over one 3D grid buffer.
///
/// The view type is backend specific. Views are cheap handles, cloning a `VolumeResource` never copies texel data.
#[derive(Clone)]
pub struct VolumeResource<V> {
    id: VolumeId,
    label: Rc<str>,
    format: wgpu::TextureFormat,
    resolution: GridResolution,
    read_view: V,
    write_view: V,
}

impl<V> VolumeResource<V> {
    pub fn new(label: &str, format: wgpu::TextureFormat, resolution: GridResolution, read_view: V, write_view: V) -> Self {
        VolumeResource {
            id: VolumeId::next(),
            label: Rc::from(label),
            format,
            resolution,
            read_view,
            write_view,
        }
    }

    pub fn id(&self) -> VolumeId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn resolution(&self) -> GridResolution {
        self.resolution
    }

    pub fn read_view(&self) -> &V {
        &self.read_view
    }

    pub fn write_view(&self) -> &V {
        &self.write_view
    }
}

impl<V> std::fmt::Debug for VolumeResource<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeResource")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("format", &self.format)
            .field("resolution", &self.resolution.get())
            .finish()
    }
}
