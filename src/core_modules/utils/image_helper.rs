pub mod image_helper {
    use image::ImageEncoder;
    use std::path::Path;

    /// Decodes any still image the `image` crate understands into RGBA8.
    pub fn load_rgba(path: &Path) -> Result<(u32, u32, Vec<u8>), image::ImageError> {
        let decoded = image::open(path)?.into_rgba8();
        let (width, height) = decoded.dimensions();
        Ok((width, height, decoded.into_raw()))
    }

    pub fn save_png(path: &Path, width: u32, height: u32, buffer: &[u8]) -> Result<(), image::ImageError> {
        let output = std::io::BufWriter::new(std::fs::File::create(path)?);
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(buffer, width, height, image::ExtendedColorType::Rgba8)?;

        Ok(())
    }
}
