mod volume_renderer;

pub use volume_renderer::VolumeRenderer;
