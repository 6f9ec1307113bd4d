/// Counters for work executed by a device's queue.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct ExecutionStats {
    /// Submissions fully executed.
    pub submissions: u64,
    pub command_buffers: u64,
    pub render_passes: u64,
    /// Attachments whose load operation was a clear.
    pub attachment_clears: u64,
    pub draw_calls: u64,
    /// Vertex shader invocations (vertices or indices times instances).
    pub vertices: u64,
    pub instances: u64,
    /// Assembled primitives (points, lines or triangles).
    pub primitives: u64,
    /// Bytes written through `Queue::write_buffer`.
    pub bytes_written: u64,
    /// Bytes moved by copy and clear commands.
    pub bytes_copied: u64,
}

impl ExecutionStats {
    pub(crate) fn merge(&mut self, other: &ExecutionStats) {
        self.submissions += other.submissions;
        self.command_buffers += other.command_buffers;
        self.render_passes += other.render_passes;
        self.attachment_clears += other.attachment_clears;
        self.draw_calls += other.draw_calls;
        self.vertices += other.vertices;
        self.instances += other.instances;
        self.primitives += other.primitives;
        self.bytes_written += other.bytes_written;
        self.bytes_copied += other.bytes_copied;
    }
}

/// Number of primitives assembled from `count` consecutive vertices.
pub(crate) fn primitive_count(topology: wgpu::PrimitiveTopology, count: u64) -> u64 {
    match topology {
        wgpu::PrimitiveTopology::PointList => count,
        wgpu::PrimitiveTopology::LineList => count / 2,
        wgpu::PrimitiveTopology::LineStrip => count.saturating_sub(1),
        wgpu::PrimitiveTopology::TriangleList => count / 3,
        wgpu::PrimitiveTopology::TriangleStrip => count.saturating_sub(2),
    }
}

/// Primitive count for an indexed strip draw, honouring restart indices.
pub(crate) fn strip_primitive_count<I>(
    topology: wgpu::PrimitiveTopology,
    indices: I,
    restart: u32,
) -> u64
where
    I: IntoIterator<Item = u32>,
{
    let mut total = 0;
    let mut run = 0;
    for index in indices {
        if index == restart {
            total += primitive_count(topology, run);
            run = 0;
        } else {
            run += 1;
        }
    }
    total + primitive_count(topology, run)
}
