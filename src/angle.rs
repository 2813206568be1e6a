//! Joint angle measurement.
//!
//! The angle at a joint is measured from the polar angles of the two segments
//! leaving the vertex, so it works in any consistent 2D coordinate system
//! (normalized landmark space or pixels).

use serde::{Deserialize, Serialize};

/// Segments shorter than this cannot carry a meaningful direction.
pub const DEGENERATE_EPSILON: f64 = 1e-9;

/// A point in a 2D image coordinate system (y grows downward).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Included angle at vertex `b` between segments `b→a` and `b→c`, in degrees.
///
/// The result is folded into `[0, 180]`: a joint is always reported with the
/// smaller of its two angular measures. The function is total; a zero-length
/// segment resolves through `atan2(0, 0) == 0`, which gives a deterministic but
/// meaningless value. Use [`measure_angle`] when the input may be degenerate.
pub fn compute_angle(a: Point2D, b: Point2D, c: Point2D) -> f64 {
    let radians = (c.y - b.y).atan2(c.x - b.x) - (a.y - b.y).atan2(a.x - b.x);
    let angle = radians.to_degrees().abs();
    if angle > 180.0 {
        360.0 - angle
    } else {
        angle
    }
}

/// Like [`compute_angle`], but returns `None` for input it cannot measure:
/// non-finite coordinates or a segment shorter than [`DEGENERATE_EPSILON`].
pub fn measure_angle(a: Point2D, b: Point2D, c: Point2D) -> Option<f64> {
    if !(a.is_finite() && b.is_finite() && c.is_finite()) {
        return None;
    }
    if b.distance(&a) < DEGENERATE_EPSILON || b.distance(&c) < DEGENERATE_EPSILON {
        return None;
    }
    Some(compute_angle(a, b, c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(actual: f64, expected: f64) -> bool {
        (actual - expected).abs() < 1e-6
    }

    #[test]
    fn right_angle_is_symmetric() {
        let shoulder = Point2D::new(0.0, 1.0);
        let elbow = Point2D::new(0.0, 0.0);
        let wrist = Point2D::new(1.0, 0.0);

        assert!(approx(compute_angle(shoulder, elbow, wrist), 90.0));
        assert!(approx(compute_angle(wrist, elbow, shoulder), 90.0));
    }

    #[test]
    fn straight_arm_is_180() {
        let angle = compute_angle(
            Point2D::new(0.0, 1.0),
            Point2D::new(0.0, 0.0),
            Point2D::new(0.0, -1.0),
        );
        assert!(approx(angle, 180.0));
    }

    #[test]
    fn folded_arm_is_zero() {
        let angle = compute_angle(
            Point2D::new(1.0, 0.0),
            Point2D::new(0.0, 0.0),
            Point2D::new(1.0, 0.0),
        );
        assert!(approx(angle, 0.0));
    }

    #[test]
    fn reflex_measure_folds_below_180() {
        // Raw polar difference is 270 degrees; the joint reports 90.
        let angle = compute_angle(
            Point2D::new(0.0, -1.0),
            Point2D::new(0.0, 0.0),
            Point2D::new(-1.0, 0.0),
        );
        assert!(approx(angle, 90.0));
    }

    #[test]
    fn pixel_and_normalized_coordinates_agree() {
        let normalized = compute_angle(
            Point2D::new(0.5, 0.3),
            Point2D::new(0.5, 0.5),
            Point2D::new(0.7, 0.5),
        );
        let pixels = compute_angle(
            Point2D::new(320.0, 144.0),
            Point2D::new(320.0, 240.0),
            Point2D::new(448.0, 240.0),
        );
        assert!(approx(normalized, 90.0));
        assert!(approx(pixels, 90.0));
    }

    #[test]
    fn output_stays_in_range() {
        let b = Point2D::new(0.25, -0.5);
        for i in 0..36 {
            for j in 0..36 {
                let ta = (i as f64 * 10.0).to_radians();
                let tc = (j as f64 * 10.0 + 3.0).to_radians();
                let a = Point2D::new(b.x + ta.cos(), b.y + ta.sin());
                let c = Point2D::new(b.x + 2.0 * tc.cos(), b.y + 2.0 * tc.sin());
                let angle = compute_angle(a, b, c);
                assert!((0.0..=180.0).contains(&angle), "angle {angle} out of range");
            }
        }
    }

    #[test]
    fn degenerate_segments_are_unmeasurable() {
        let b = Point2D::new(0.4, 0.4);
        assert_eq!(measure_angle(b, b, Point2D::new(1.0, 0.0)), None);
        assert_eq!(measure_angle(Point2D::new(1.0, 0.0), b, b), None);
        assert_eq!(
            measure_angle(Point2D::new(f64::NAN, 0.0), b, Point2D::new(1.0, 0.0)),
            None
        );
    }

    #[test]
    fn degenerate_input_still_has_a_defined_raw_angle() {
        let b = Point2D::new(0.0, 0.0);
        let angle = compute_angle(b, b, Point2D::new(1.0, 0.0));
        assert!(approx(angle, 0.0));
    }
}
