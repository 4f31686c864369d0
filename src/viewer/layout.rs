//! Fitting a page image into the viewport

use super::view_state::Rotation;

/// Size of the area the page is drawn into, in pixels
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    #[must_use]
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Native pixel size of a loaded page image
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size as it appears on screen after rotation
    #[must_use]
    pub fn rotated(self, rotation: Rotation) -> Self {
        if rotation.is_sideways() {
            Self::new(self.height, self.width)
        } else {
            self
        }
    }
}

/// Scale that fits `image` entirely inside `viewport`.
///
/// Falls back to 1.0 when either side is degenerate.
#[must_use]
pub fn fit_scale(image: ImageSize, viewport: Viewport) -> f32 {
    if !viewport.is_usable() || image.width == 0 || image.height == 0 {
        return 1.0;
    }
    let width_fit = viewport.width / image.width as f32;
    let height_fit = viewport.height / image.height as f32;
    let scale = width_fit.min(height_fit);
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

/// Where and how large the current page is drawn
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    /// Fit-to-container scale before zoom
    pub base_scale: f32,
    /// `base_scale * zoom`
    pub scale: f32,
    pub rotation: Rotation,
    pub pan_x: f32,
    pub pan_y: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            base_scale: 1.0,
            scale: 1.0,
            rotation: Rotation::Deg0,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

impl ViewTransform {
    /// Compute the transform for `image` at `zoom`. With `recenter` the page
    /// is centered in the viewport; otherwise the pan of `previous` is kept.
    #[must_use]
    pub fn compute(
        image: ImageSize,
        viewport: Viewport,
        rotation: Rotation,
        zoom: f32,
        recenter: bool,
        previous: &ViewTransform,
    ) -> Self {
        let shown = image.rotated(rotation);
        let base_scale = fit_scale(shown, viewport);
        let scale = base_scale * zoom;

        let (pan_x, pan_y) = if recenter {
            if viewport.is_usable() {
                (
                    (viewport.width - shown.width as f32 * scale) / 2.0,
                    (viewport.height - shown.height as f32 * scale) / 2.0,
                )
            } else {
                (0.0, 0.0)
            }
        } else {
            (previous.pan_x, previous.pan_y)
        };

        Self {
            base_scale,
            scale,
            rotation,
            pan_x,
            pan_y,
        }
    }
}
