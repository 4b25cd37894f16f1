use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tiny_skia::{Color, Pixmap, PremultipliedColorU8};

/// Side of one square in the loading pattern, in pixels
const CHECKER_PX: u32 = 8;

type BySize = Mutex<HashMap<(u32, u32), Arc<Pixmap>>>;

/// Stand-in images served while a tile is loading or after it failed.
/// Built once per tile size and shared. `None` for a size too large to
/// allocate.
#[derive(Default)]
pub struct Placeholders {
    loading: BySize,
    failed: BySize,
}

impl Placeholders {
    /// Light grey checker pattern
    pub fn loading(&self, width: u32, height: u32) -> Option<Arc<Pixmap>> {
        shared(&self.loading, (width, height), checker)
    }

    /// Fully transparent, so lower layers show through
    pub fn failed(&self, width: u32, height: u32) -> Option<Arc<Pixmap>> {
        shared(&self.failed, (width, height), blank)
    }
}

fn shared(
    images: &BySize,
    size: (u32, u32),
    make: fn(u32, u32) -> Option<Pixmap>,
) -> Option<Arc<Pixmap>> {
    let mut images = images.lock();
    if let Some(image) = images.get(&size) {
        return Some(image.clone());
    }
    let image = Arc::new(make(size.0, size.1)?);
    images.insert(size, image.clone());
    Some(image)
}

fn blank(width: u32, height: u32) -> Option<Pixmap> {
    Pixmap::new(width.max(1), height.max(1))
}

fn checker(width: u32, height: u32) -> Option<Pixmap> {
    let mut pixmap = blank(width, height)?;
    pixmap.fill(Color::from_rgba8(211, 211, 211, 255));

    let dark = PremultipliedColorU8::from_rgba(190, 190, 190, 255);
    let w = pixmap.width();
    if let Some(dark) = dark {
        for (i, px) in pixmap.pixels_mut().iter_mut().enumerate() {
            let x = i as u32 % w;
            let y = i as u32 / w;
            if ((x / CHECKER_PX) + (y / CHECKER_PX)) % 2 == 1 {
                *px = dark;
            }
        }
    }
    Some(pixmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loading_is_opaque_pattern() {
        let placeholders = Placeholders::default();
        let img = placeholders.loading(64, 64).unwrap();
        assert_eq!((img.width(), img.height()), (64, 64));
        let a = img.pixel(0, 0).unwrap();
        let b = img.pixel(CHECKER_PX, 0).unwrap();
        assert_eq!(a.alpha(), 255);
        assert_ne!(a.red(), b.red());
    }

    #[test]
    fn test_failed_is_transparent() {
        let placeholders = Placeholders::default();
        let img = placeholders.failed(32, 16).unwrap();
        assert!(img.pixels().iter().all(|p| p.alpha() == 0));
    }

    #[test]
    fn test_placeholders_are_shared() {
        let placeholders = Placeholders::default();
        let small = placeholders.loading(8, 8).unwrap();
        assert!(Arc::ptr_eq(&small, &placeholders.loading(8, 8).unwrap()));
        assert!(!Arc::ptr_eq(&small, &placeholders.loading(16, 16).unwrap()));
    }

    #[test]
    fn test_oversized_placeholder_is_none() {
        let placeholders = Placeholders::default();
        assert!(placeholders.failed(u32::MAX, u32::MAX).is_none());
        assert!(placeholders.loading(0, 0).is_some());
    }
}
