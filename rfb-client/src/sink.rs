//! Where captured images go.

use crate::errors::RfbClientError;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use std::io::Write;
use std::path::PathBuf;

/// File name meaning standard output.
pub const STDOUT_NAME: &str = "-";

/// Receives finished captures as packed RGB.
pub trait ImageSink {
    /// Store one image. `rgb` holds `width * height * 3` bytes, row-major.
    fn write_rgb(
        &mut self,
        name: &str,
        rgb: &[u8],
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<(), RfbClientError>;
}

/// Writes each capture as a JPEG file, or to stdout for `-`.
#[derive(Debug, Default)]
pub struct JpegSink;

impl JpegSink {
    pub fn new() -> Self {
        Self
    }
}

/// Encode packed RGB as JPEG into `out`. Quality is clamped to 1..=100.
pub fn encode_jpeg(
    out: &mut impl Write,
    rgb: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<(), RfbClientError> {
    let expected = width as usize * height as usize * 3;
    if rgb.len() != expected {
        return Err(RfbClientError::Image(format!(
            "expected {} bytes of RGB for {}x{}, got {}",
            expected,
            width,
            height,
            rgb.len()
        )));
    }
    let mut encoder = JpegEncoder::new_with_quality(out, quality.clamp(1, 100));
    encoder
        .encode(rgb, width, height, ColorType::Rgb8)
        .map_err(|e| RfbClientError::Image(format!("JPEG encoding failed: {}", e)))
}

impl ImageSink for JpegSink {
    fn write_rgb(
        &mut self,
        name: &str,
        rgb: &[u8],
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<(), RfbClientError> {
        if name == STDOUT_NAME {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            encode_jpeg(&mut lock, rgb, width, height, quality)?;
            lock.flush()?;
            return Ok(());
        }

        let path = PathBuf::from(name);
        let file = std::fs::File::create(&path).map_err(|e| {
            RfbClientError::Image(format!("Cannot open {}: {}", path.display(), e))
        })?;
        let mut writer = std::io::BufWriter::new(file);
        encode_jpeg(&mut writer, rgb, width, height, quality)?;
        writer.flush()?;
        tracing::debug!("Wrote {}x{} JPEG to {}", width, height, path.display());
        Ok(())
    }
}

/// One image kept by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub name: String,
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

/// Keeps captures in memory instead of encoding them.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub images: Vec<CapturedImage>,
}

impl ImageSink for MemorySink {
    fn write_rgb(
        &mut self,
        name: &str,
        rgb: &[u8],
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<(), RfbClientError> {
        self.images.push(CapturedImage {
            name: name.to_string(),
            rgb: rgb.to_vec(),
            width,
            height,
            quality,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Vec<u8> {
        (0..width * height)
            .flat_map(|i| [(i % 256) as u8, 128, 255 - (i % 256) as u8])
            .collect()
    }

    #[test]
    fn test_jpeg_file_decodes_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        let name = path.to_str().unwrap();

        JpegSink::new()
            .write_rgb(name, &gradient(16, 8), 16, 8, 90)
            .unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (16, 8));
        let px = img.get_pixel(0, 0);
        assert!(px[1].abs_diff(128) < 16);
    }

    #[test]
    fn test_quality_zero_is_accepted() {
        let mut out = Vec::new();
        encode_jpeg(&mut out, &gradient(4, 4), 4, 4, 0).unwrap();
        assert_eq!(&out[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_size_mismatch_is_error() {
        let mut out = Vec::new();
        let err = encode_jpeg(&mut out, &[0u8; 5], 2, 1, 50).unwrap_err();
        assert!(matches!(err, RfbClientError::Image(_)));
    }

    #[test]
    fn test_unwritable_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("missing").join("out.jpg");
        let err = JpegSink::new()
            .write_rgb(name.to_str().unwrap(), &gradient(1, 1), 1, 1, 50)
            .unwrap_err();
        assert!(matches!(err, RfbClientError::Image(_)));
    }

    #[test]
    fn test_memory_sink_records() {
        let mut sink = MemorySink::default();
        sink.write_rgb("a.jpg", &[1, 2, 3], 1, 1, 75).unwrap();
        assert_eq!(sink.images.len(), 1);
        assert_eq!(sink.images[0].rgb, vec![1, 2, 3]);
    }
}
