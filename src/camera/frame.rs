//! Captured frames and their conversion to JPEG/PNG.

use crate::config::ImageFormat;
use crate::error::CaptureError;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::time::Instant;

/// Pixel layout of a [`Frame`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEncoding {
    /// Packed 8-bit RGB
    Rgb8,
    /// Planar YUV 4:2:0 (I420) as produced by `rpicam-vid --codec yuv420`
    Yuv420,
    /// Already JPEG-compressed
    Jpeg,
}

/// One frame straight off the sensor.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub encoding: FrameEncoding,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, encoding: FrameEncoding) -> Self {
        Self {
            data,
            width,
            height,
            encoding,
        }
    }

    /// Expected buffer size for raw encodings.
    pub fn expected_len(encoding: FrameEncoding, width: u32, height: u32) -> Option<usize> {
        let pixels = width as usize * height as usize;
        match encoding {
            FrameEncoding::Rgb8 => Some(pixels * 3),
            FrameEncoding::Yuv420 => Some(pixels + 2 * (pixels / 4)),
            FrameEncoding::Jpeg => None,
        }
    }

    /// Convert the frame to packed RGB.
    pub fn to_rgb(&self) -> Result<Vec<u8>, CaptureError> {
        if let Some(expected) = Self::expected_len(self.encoding, self.width, self.height) {
            if self.data.len() != expected {
                return Err(CaptureError::Encode(format!(
                    "{:?} frame {}x{} has {} bytes, expected {}",
                    self.encoding,
                    self.width,
                    self.height,
                    self.data.len(),
                    expected
                )));
            }
        }

        match self.encoding {
            FrameEncoding::Rgb8 => Ok(self.data.clone()),
            FrameEncoding::Yuv420 => Ok(yuv420_to_rgb(&self.data, self.width, self.height)),
            FrameEncoding::Jpeg => {
                let decoded =
                    image::load_from_memory_with_format(&self.data, image::ImageFormat::Jpeg)
                        .map_err(|e| CaptureError::Encode(e.to_string()))?;
                Ok(decoded.into_rgb8().into_raw())
            }
        }
    }

    /// Encode into `format`. JPEG frames pass through untouched when JPEG is asked for.
    pub fn encode(&self, format: ImageFormat, jpeg_quality: u8) -> Result<Bytes, CaptureError> {
        if format == ImageFormat::Jpeg && self.encoding == FrameEncoding::Jpeg {
            return Ok(Bytes::copy_from_slice(&self.data));
        }

        let rgb = self.to_rgb()?;
        let mut out = Vec::with_capacity(rgb.len() / 8);
        let result = match format {
            ImageFormat::Jpeg => JpegEncoder::new_with_quality(&mut out, jpeg_quality).encode(
                &rgb,
                self.width,
                self.height,
                ExtendedColorType::Rgb8,
            ),
            ImageFormat::Png => PngEncoder::new(&mut out).write_image(
                &rgb,
                self.width,
                self.height,
                ExtendedColorType::Rgb8,
            ),
        };
        result.map_err(|e| CaptureError::Encode(e.to_string()))?;
        Ok(Bytes::from(out))
    }
}

/// A JPEG frame ready for stream subscribers. Shared between them by `Arc`.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Position in the feed; strictly increasing per feed
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub jpeg: Bytes,
    pub captured_at: Instant,
}

/// BT.601 full-range conversion from planar I420 to packed RGB.
///
/// `yuv` must hold `width * height * 3 / 2` bytes.
pub fn yuv420_to_rgb(yuv: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let chroma_w = w / 2;
    let (y_plane, chroma) = yuv.split_at(w * h);
    let (u_plane, v_plane) = chroma.split_at(chroma_w * (h / 2));

    let mut rgb = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        for col in 0..w {
            let y = y_plane[row * w + col] as f32;
            let ci = (row / 2) * chroma_w + col / 2;
            let u = u_plane[ci] as f32 - 128.0;
            let v = v_plane[ci] as f32 - 128.0;

            let r = y + 1.402 * v;
            let g = y - 0.344_136 * u - 0.714_136 * v;
            let b = y + 1.772 * u;
            rgb.extend_from_slice(&[clamp(r), clamp(g), clamp(b)]);
        }
    }
    rgb
}

fn clamp(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_rgb(width: u32, height: u32) -> Frame {
        let data = vec![128u8; (width * height * 3) as usize];
        Frame::new(data, width, height, FrameEncoding::Rgb8)
    }

    #[test]
    fn test_jpeg_has_soi_marker() {
        let jpeg = gray_rgb(16, 8).encode(ImageFormat::Jpeg, 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_png_has_signature() {
        let png = gray_rgb(16, 8).encode(ImageFormat::Png, 80).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_short_buffer_is_encode_error() {
        let frame = Frame::new(vec![0; 10], 16, 8, FrameEncoding::Rgb8);
        assert!(matches!(
            frame.encode(ImageFormat::Jpeg, 80),
            Err(CaptureError::Encode(_))
        ));
    }

    #[test]
    fn test_jpeg_passthrough_and_png_transcode() {
        let jpeg = gray_rgb(8, 8).encode(ImageFormat::Jpeg, 90).unwrap();
        let frame = Frame::new(jpeg.to_vec(), 8, 8, FrameEncoding::Jpeg);
        assert_eq!(frame.encode(ImageFormat::Jpeg, 10).unwrap(), jpeg);

        let png = frame.encode(ImageFormat::Png, 80).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn test_yuv_gray_converts_to_gray() {
        let (w, h) = (4u32, 2u32);
        let mut yuv = vec![100u8; (w * h) as usize];
        yuv.extend(vec![128u8; (w * h / 2) as usize]);
        let rgb = yuv420_to_rgb(&yuv, w, h);
        assert_eq!(rgb.len(), (w * h * 3) as usize);
        assert!(rgb.iter().all(|&c| c == 100));
    }

    #[test]
    fn test_yuv_frame_encodes() {
        let (w, h) = (16u32, 16u32);
        let len = Frame::expected_len(FrameEncoding::Yuv420, w, h).unwrap();
        let frame = Frame::new(vec![90u8; len], w, h, FrameEncoding::Yuv420);
        assert!(frame.encode(ImageFormat::Jpeg, 75).is_ok());
    }
}
