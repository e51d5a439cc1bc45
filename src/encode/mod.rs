pub mod ffmpeg;

/// Destination for finished, composited frames in index order.
pub trait FrameSink {
    fn write_frame(&mut self, rgba_pixels: &[u8]) -> anyhow::Result<()>;
}

impl FrameSink for Vec<Vec<u8>> {
    fn write_frame(&mut self, rgba_pixels: &[u8]) -> anyhow::Result<()> {
        self.push(rgba_pixels.to_vec());
        Ok(())
    }
}
