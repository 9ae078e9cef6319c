use serde::{Deserialize, Serialize};

use crate::geometry::Point;

pub const MIN_SCALE: f32 = 0.3;
pub const MAX_SCALE: f32 = 3.0;
pub const ZOOM_STEP: f32 = 1.2;
pub const WHEEL_ZOOM_STEP: f32 = 1.1;
pub const PRECISE_WHEEL_ZOOM_STEP: f32 = 1.02;

/// Pan/zoom transform between diagram space and screen pixels.
///
/// `screen = (diagram + offset) * scale`. The offset is kept in diagram
/// units so that panning feels the same at every zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredViewport")]
pub struct Viewport {
    scale: f32,
    offset: Point,
}

/// Wire shape of a viewport; the scale is clamped on the way in.
#[derive(Deserialize)]
struct StoredViewport {
    scale: f32,
    #[serde(default)]
    offset: Point,
}

impl From<StoredViewport> for Viewport {
    fn from(stored: StoredViewport) -> Self {
        Viewport::with_transform(stored.scale, stored.offset)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: Point::default(),
        }
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transform(scale: f32, offset: Point) -> Self {
        let mut viewport = Self {
            scale: 1.0,
            offset,
        };
        viewport.set_scale(scale);
        viewport
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn offset(&self) -> Point {
        self.offset
    }

    /// Sets the scale, clamped to the supported range. Non-finite values are ignored.
    pub fn set_scale(&mut self, scale: f32) {
        if !scale.is_finite() {
            return;
        }
        self.scale = scale.clamp(MIN_SCALE, MAX_SCALE);
    }

    pub fn zoom_in(&mut self) {
        self.set_scale(self.scale * ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_scale(self.scale / ZOOM_STEP);
    }

    /// Wheel zoom around `pointer` (screen space). Negative `delta_y` zooms in.
    pub fn wheel_zoom(&mut self, delta_y: f32, pointer: Point, precise: bool) {
        if delta_y == 0.0 || !delta_y.is_finite() {
            return;
        }

        let step = if precise {
            PRECISE_WHEEL_ZOOM_STEP
        } else {
            WHEEL_ZOOM_STEP
        };
        let target = if delta_y < 0.0 {
            self.scale * step
        } else {
            self.scale / step
        };

        let fixed = self.to_diagram(pointer);
        self.set_scale(target);
        self.offset = Point::new(
            pointer.x / self.scale - fixed.x,
            pointer.y / self.scale - fixed.y,
        );
    }

    /// Pans by a screen-space delta.
    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        let (dx, dy) = self.screen_delta_to_diagram(dx, dy);
        self.offset = self.offset.translate(dx, dy);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// No bounding-box fit is computed; fitting restores the default view.
    pub fn fit(&mut self) {
        self.reset();
    }

    pub fn screen_delta_to_diagram(&self, dx: f32, dy: f32) -> (f32, f32) {
        (dx / self.scale, dy / self.scale)
    }

    pub fn to_screen(&self, point: Point) -> Point {
        Point::new(
            (point.x + self.offset.x) * self.scale,
            (point.y + self.offset.y) * self.scale,
        )
    }

    pub fn to_diagram(&self, point: Point) -> Point {
        Point::new(
            point.x / self.scale - self.offset.x,
            point.y / self.scale - self.offset.y,
        )
    }

    /// SVG `transform` attribute value mapping diagram space to the screen.
    pub fn svg_transform(&self) -> String {
        format!(
            "scale({:.4}) translate({:.2} {:.2})",
            self.scale, self.offset.x, self.offset.y
        )
    }
}
