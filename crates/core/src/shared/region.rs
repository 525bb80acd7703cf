/// Axis-aligned face bounding box in frame pixel coordinates.
///
/// May extend past the frame edges as reported by the detector; use
/// [`Region::clamped`] before indexing pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a region from `(x1, y1, x2, y2)` corner coordinates, rounding
    /// outward so the box never shrinks.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let left = x1.min(x2).floor() as i32;
        let top = y1.min(y2).floor() as i32;
        let right = x1.max(x2).ceil() as i32;
        let bottom = y1.max(y2).ceil() as i32;
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    /// Intersection of this region with a `frame_width x frame_height` frame.
    /// Regions that miss the frame collapse to zero size at the nearest corner.
    pub fn clamped(&self, frame_width: u32, frame_height: u32) -> Region {
        let fw = frame_width as i32;
        let fh = frame_height as i32;
        let x1 = self.x.clamp(0, fw);
        let y1 = self.y.clamp(0, fh);
        let x2 = (self.x + self.width).clamp(0, fw);
        let y2 = (self.y + self.height).clamp(0, fh);
        Region::new(x1, y1, (x2 - x1).max(0), (y2 - y1).max(0))
    }

    /// Grows the region by `ratio` of its size on every side, keeping the
    /// center fixed.
    pub fn padded(&self, ratio: f64) -> Region {
        let dx = (self.width as f64 * ratio).round() as i32;
        let dy = (self.height as f64 * ratio).round() as i32;
        Region::new(
            self.x - dx,
            self.y - dy,
            self.width + 2 * dx,
            self.height + 2 * dy,
        )
    }

    pub fn iou(&self, other: &Region) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.width).min(other.x + other.width);
        let iy2 = (self.y + self.height).min(other.y + other.height);

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        let union = self.area() as f64 + other.area() as f64 - inter;
        inter / union
    }
}
