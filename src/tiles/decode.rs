use crate::error::FetchError;
use image::imageops::{self, FilterType};
use tiny_skia::{IntSize, Pixmap};

/// Decode PNG or JPEG bytes into a premultiplied pixmap of exactly
/// `width` x `height`, resizing when the source differs.
pub fn decode_tile(bytes: &[u8], width: u32, height: u32, url: &str) -> Result<Pixmap, FetchError> {
    let decode_err = |message: String| FetchError::Decode {
        url: url.to_string(),
        message,
    };

    let mut rgba = image::load_from_memory(bytes)
        .map_err(|e| decode_err(e.to_string()))?
        .to_rgba8();

    if rgba.dimensions() != (width, height) {
        rgba = imageops::resize(&rgba, width, height, FilterType::Triangle);
    }

    let mut data = rgba.into_raw();
    premultiply(&mut data);

    let size = IntSize::from_wh(width, height)
        .ok_or_else(|| decode_err(format!("invalid tile size {width}x{height}")))?;
    Pixmap::from_vec(data, size).ok_or_else(|| decode_err("pixel buffer size mismatch".into()))
}

/// tiny-skia stores premultiplied alpha
fn premultiply(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((*c as u16 * a + 127) / 255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::Color;

    fn png(width: u32, height: u32, color: Color) -> Vec<u8> {
        let mut pixmap = Pixmap::new(width, height).unwrap();
        pixmap.fill(color);
        pixmap.encode_png().unwrap()
    }

    #[test]
    fn test_decode_keeps_size() {
        let bytes = png(256, 256, Color::from_rgba8(10, 200, 30, 255));
        let pixmap = decode_tile(&bytes, 256, 256, "mem://a").unwrap();
        let px = pixmap.pixel(100, 100).unwrap();
        assert_eq!((px.red(), px.green(), px.blue(), px.alpha()), (10, 200, 30, 255));
    }

    #[test]
    fn test_decode_resizes_to_requested() {
        let bytes = png(512, 512, Color::from_rgba8(0, 0, 255, 255));
        let pixmap = decode_tile(&bytes, 256, 256, "mem://b").unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (256, 256));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let result = decode_tile(b"not an image", 256, 256, "mem://c");
        assert!(matches!(result, Err(FetchError::Decode { .. })));
    }

    #[test]
    fn test_premultiply() {
        let mut data = [200u8, 100, 50, 128];
        premultiply(&mut data);
        assert_eq!(data, [100, 50, 25, 128]);
    }
}
