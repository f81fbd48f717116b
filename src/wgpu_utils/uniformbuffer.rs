use wgpu::util::DeviceExt;

/// Uniform buffer holding a kernel's parameter block.
///
/// Updates are recorded into the command encoder as a copy from a staging buffer, so every dispatch sees the block that was
/// uploaded right before it, even if the same buffer is updated several times within one submission.
pub struct UniformBuffer {
    buffer: wgpu::Buffer,
    size: u64,
    label: String,
}

impl UniformBuffer {
    pub fn new(device: &wgpu::Device, size: u64, label: &str) -> UniformBuffer {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("UniformBuffer: {}", label)),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        UniformBuffer {
            buffer,
            size,
            label: label.to_owned(),
        }
    }

    pub fn update_content(&self, encoder: &mut wgpu::CommandEncoder, device: &wgpu::Device, content: &[u8]) {
        assert_eq!(content.len() as u64, self.size);
        let staging_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("UniformBuffer Update: {}", self.label)),
            contents: content,
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        encoder.copy_buffer_to_buffer(&staging_buffer, 0, &self.buffer, 0, self.size);
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}
