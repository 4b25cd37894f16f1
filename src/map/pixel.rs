use glam::DVec2;
use std::ops::{Add, Sub};

/// Pixel position in the frame of the whole map at the current zoom.
/// Origin is the top-left corner of the world.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldPixel(pub DVec2);

/// Pixel position relative to the visible area, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewportPixel(pub DVec2);

macro_rules! pixel_ops {
    ($ty:ident) => {
        impl $ty {
            #[inline]
            pub const fn new(x: f64, y: f64) -> Self {
                Self(DVec2::new(x, y))
            }

            #[inline]
            pub fn x(&self) -> f64 {
                self.0.x
            }

            #[inline]
            pub fn y(&self) -> f64 {
                self.0.y
            }
        }

        impl Add<DVec2> for $ty {
            type Output = $ty;
            fn add(self, rhs: DVec2) -> $ty {
                $ty(self.0 + rhs)
            }
        }

        impl Sub for $ty {
            type Output = DVec2;
            fn sub(self, rhs: $ty) -> DVec2 {
                self.0 - rhs.0
            }
        }
    };
}

pixel_ops!(WorldPixel);
pixel_ops!(ViewportPixel);
