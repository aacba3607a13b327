//! JPEG decode and snapshot encode through the `image` crate.

use std::path::Path;

use image::{ExtendedColorType, ImageFormat};

use crate::error::{CameraError, CameraResult};
use crate::sink::{ImageCodec, PixelFrame};

#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCodec;

impl ImageCodec for JpegCodec {
    fn decode(&self, jpeg: &[u8]) -> CameraResult<PixelFrame> {
        let rgb = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?.to_rgb8();
        Ok(PixelFrame {
            width: rgb.width(),
            height: rgb.height(),
            data: rgb.into_raw(),
        })
    }

    fn save(&self, frame: &PixelFrame, path: &Path) -> CameraResult<()> {
        image::save_buffer_with_format(
            path,
            &frame.data,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
            ImageFormat::Jpeg,
        )
        .map_err(|e| CameraError::SinkWrite(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn tiny_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 10]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    #[test]
    fn decodes_dimensions() {
        let frame = JpegCodec.decode(&tiny_jpeg(16, 8)).unwrap();
        assert_eq!(frame.dimensions(), (16, 8));
        assert_eq!(frame.data.len(), 16 * 8 * 3);
    }

    #[test]
    fn rejects_garbage() {
        let err = JpegCodec.decode(b"definitely not a jpeg").unwrap_err();
        assert!(matches!(err, CameraError::Decode(_)));
    }

    #[test]
    fn saves_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("still.jpg");
        let frame = JpegCodec.decode(&tiny_jpeg(4, 4)).unwrap();
        JpegCodec.save(&frame, &path).unwrap();

        let reread = JpegCodec.decode(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(reread.dimensions(), (4, 4));
    }
}
