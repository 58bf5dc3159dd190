//! Common types shared across the graphics system.

// ============================================================================
// Extent3d
// ============================================================================

/// 3D extent for textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth in pixels (1 for 2D textures).
    pub depth: u32,
}

impl Extent3d {
    /// Create a new 2D extent.
    pub fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
        }
    }

    /// Create a new 3D extent.
    pub fn new_3d(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Width and height of a render surface in pixels.
///
/// The render graph tracks two of these: the internal render resolution and
/// the output viewport resolution. Resolution-relative textures are sized
/// from one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Scale both dimensions, clamping to at least one pixel.
    pub fn scaled(self, scale: f32) -> Self {
        Self {
            width: ((self.width as f32 * scale) as u32).max(1),
            height: ((self.height as f32 * scale) as u32).max(1),
        }
    }
}
