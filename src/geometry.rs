use crate::config::TargetRegionConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// `true` when `inner` lies inside `self` without touching any edge.
    pub fn strictly_contains(&self, inner: &Rect) -> bool {
        inner.left > self.left
            && inner.top > self.top
            && inner.right < self.right
            && inner.bottom < self.bottom
    }

    pub fn intersection_over_union(&self, other: &Rect) -> f32 {
        let overlap = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        let intersection = overlap.area();
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.left, self.top),
            Point::new(self.right, self.top),
            Point::new(self.right, self.bottom),
            Point::new(self.left, self.bottom),
        ]
    }
}

/// The oval the user is asked to place their face in.
///
/// Containment is judged against the oval's bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetRegion {
    pub bounds: Rect,
}

impl TargetRegion {
    pub fn for_frame(width: u32, height: u32, config: &TargetRegionConfig) -> Self {
        let (w, h) = (width as f32, height as f32);
        let cx = w * config.center_x;
        let cy = h * config.center_y;
        let half_w = w * config.width_ratio / 2.0;
        let half_h = h * config.height_ratio / 2.0;
        Self {
            bounds: Rect::new(cx - half_w, cy - half_h, cx + half_w, cy + half_h),
        }
    }

    pub fn is_position_correct(&self, face: &Rect) -> bool {
        self.bounds.strictly_contains(face)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_640x480() -> TargetRegion {
        TargetRegion::for_frame(640, 480, &TargetRegionConfig::default())
    }

    #[test]
    fn target_is_centred_and_scaled_to_the_frame() {
        let target = target_640x480();
        assert_eq!(target.bounds, Rect::new(128.0, 60.0, 512.0, 420.0));
    }

    #[test]
    fn face_fully_inside_is_correct() {
        assert!(target_640x480().is_position_correct(&Rect::new(200.0, 100.0, 440.0, 400.0)));
    }

    #[test]
    fn face_touching_or_crossing_an_edge_is_incorrect() {
        let target = target_640x480();
        // touching the left edge
        assert!(!target.is_position_correct(&Rect::new(128.0, 100.0, 440.0, 400.0)));
        // crossing the bottom edge
        assert!(!target.is_position_correct(&Rect::new(200.0, 100.0, 440.0, 421.0)));
        // completely outside
        assert!(!target.is_position_correct(&Rect::new(0.0, 0.0, 50.0, 50.0)));
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 30.0, 30.0);
        assert!((a.intersection_over_union(&a) - 1.0).abs() < f32::EPSILON);
        assert_eq!(a.intersection_over_union(&b), 0.0);
    }
}
