//! Triangle and circle-tangent solvers.
//!
//! All angles in and out are degrees. Radians only appear inside trig calls.
//! Domain angles stay within 0–180°, so there is no wraparound handling.

use std::ops::{Add, Mul, Sub};

use crate::error::GeometryError;

/// Slack for floating point comparisons on lengths (mm).
const EPSILON: f64 = 1e-9;

/// A point or vector in the case plane (mm).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Point2) -> f64 {
        (other - self).length()
    }

    /// Rotated +90°.
    pub fn perp(self) -> Point2 {
        Point2::new(-self.y, self.x)
    }

    /// Direction angle from the +x axis (deg, -180..180).
    pub fn angle_deg(self) -> f64 {
        self.y.atan2(self.x).to_degrees()
    }

    /// Unit vector at `angle_deg` from the +x axis.
    pub fn from_angle(angle_deg: f64) -> Point2 {
        let (sin, cos) = angle_deg.to_radians().sin_cos();
        Point2::new(cos, sin)
    }
}

impl Add for Point2 {
    type Output = Point2;
    fn add(self, rhs: Point2) -> Point2 {
        Point2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2 {
    type Output = Point2;
    fn sub(self, rhs: Point2) -> Point2 {
        Point2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point2 {
    type Output = Point2;
    fn mul(self, k: f64) -> Point2 {
        Point2::new(self.x * k, self.y * k)
    }
}

// ---------------------------------------------------------------------------
// Right triangles
// ---------------------------------------------------------------------------

/// Side opposite `angle` in a right triangle with hypotenuse `hyp`.
pub fn opposite_side(hyp: f64, angle: f64) -> f64 {
    hyp * angle.to_radians().sin()
}

/// Side adjacent to `angle` in a right triangle with hypotenuse `hyp`.
pub fn adjacent_side(hyp: f64, angle: f64) -> f64 {
    hyp * angle.to_radians().cos()
}

/// Angle between `adjacent` and the hypotenuse of a right triangle.
pub fn angle_from_adjacent(adjacent: f64, hyp: f64) -> Result<f64, GeometryError> {
    if adjacent > hyp + EPSILON || adjacent < 0.0 {
        return Err(GeometryError::InvalidTriangle { a: adjacent, b: hyp, c: hyp });
    }
    Ok((adjacent / hyp).clamp(-1.0, 1.0).acos().to_degrees())
}

// ---------------------------------------------------------------------------
// General triangles
// ---------------------------------------------------------------------------

/// Third angle of a triangle given the other two.
pub fn third_angle(a: f64, b: f64) -> Result<f64, GeometryError> {
    let c = 180.0 - a - b;
    if a <= 0.0 || b <= 0.0 || c <= 0.0 {
        return Err(GeometryError::InvalidAngles { a, b });
    }
    Ok(c)
}

/// Law of sines: side opposite `angle_b`, given `side_a` opposite `angle_a`.
pub fn law_of_sines_side(angle_a: f64, side_a: f64, angle_b: f64) -> Result<f64, GeometryError> {
    third_angle(angle_a, angle_b)?;
    Ok(side_a * angle_b.to_radians().sin() / angle_a.to_radians().sin())
}

/// Law of sines: acute angle opposite `side_b`, given `side_a` opposite `angle_a`.
pub fn law_of_sines_angle(angle_a: f64, side_a: f64, side_b: f64) -> Result<f64, GeometryError> {
    let sin_b = side_b * angle_a.to_radians().sin() / side_a;
    if !(0.0..=1.0 + EPSILON).contains(&sin_b) {
        return Err(GeometryError::InvalidTriangle { a: side_a, b: side_b, c: f64::NAN });
    }
    Ok(sin_b.min(1.0).asin().to_degrees())
}

/// Law of cosines: side opposite `angle_c`, between sides `a` and `b`.
pub fn law_of_cosines_side(a: f64, b: f64, angle_c: f64) -> f64 {
    (a * a + b * b - 2.0 * a * b * angle_c.to_radians().cos()).max(0.0).sqrt()
}

/// Law of cosines: angle opposite side `c`.
///
/// Degenerate triangles (collinear sides) are accepted and give 0° or 180°.
pub fn law_of_cosines_angle(a: f64, b: f64, c: f64) -> Result<f64, GeometryError> {
    let valid = a > 0.0
        && b > 0.0
        && c >= 0.0
        && a + b + EPSILON >= c
        && a + c + EPSILON >= b
        && b + c + EPSILON >= a;
    if !valid {
        return Err(GeometryError::InvalidTriangle { a, b, c });
    }
    let cos = ((a * a + b * b - c * c) / (2.0 * a * b)).clamp(-1.0, 1.0);
    Ok(cos.acos().to_degrees())
}

// ---------------------------------------------------------------------------
// Circle tangents
// ---------------------------------------------------------------------------

/// Which of the two tangent points to return, seen from the external point
/// looking at the circle center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TangentSide {
    /// `+Δ⊥` branch (counter-clockwise of the center→point line)
    Ccw,
    /// `-Δ⊥` branch
    Cw,
}

/// Tangent point on the circle (`center`, `radius`) of the line through
/// `point`.
///
/// `t = c + (r²/d²)·Δ ± (r/d)·√(1 − r²/d²)·Δ⊥`, `Δ = point − c`, `d = |Δ|`.
pub fn tangent_point(
    center: Point2,
    radius: f64,
    point: Point2,
    side: TangentSide,
) -> Result<Point2, GeometryError> {
    let delta = point - center;
    let d = delta.length();
    if d < radius || d <= 0.0 {
        return Err(GeometryError::PointInsideCircle { distance: d, radius });
    }
    let ratio = radius / d;
    let along = ratio * ratio;
    let across = ratio * (1.0 - along).max(0.0).sqrt();
    let across = match side {
        TangentSide::Ccw => across,
        TangentSide::Cw => -across,
    };
    Ok(center + delta * along + delta.perp() * across)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn right_triangle_3_4_5() {
        let angle = angle_from_adjacent(4.0, 5.0).unwrap();
        assert!(close(opposite_side(5.0, angle), 3.0));
        assert!(close(adjacent_side(5.0, angle), 4.0));
        assert!(angle_from_adjacent(6.0, 5.0).is_err());
    }

    #[test]
    fn law_of_sines_equilateral() {
        assert!(close(law_of_sines_side(60.0, 2.0, 60.0).unwrap(), 2.0));
        assert!(close(law_of_sines_angle(60.0, 2.0, 2.0).unwrap(), 60.0));
        assert!(law_of_sines_side(100.0, 2.0, 90.0).is_err());
    }

    #[test]
    fn law_of_cosines_round_trip() {
        let c = law_of_cosines_side(3.0, 4.0, 90.0);
        assert!(close(c, 5.0));
        assert!(close(law_of_cosines_angle(3.0, 4.0, 5.0).unwrap(), 90.0));
    }

    #[test]
    fn law_of_cosines_degenerate_chord() {
        // Two equal radii with a zero chord: angle 0, not NaN.
        assert!(close(law_of_cosines_angle(6.0, 6.0, 0.0).unwrap(), 0.0));
        assert!(close(law_of_cosines_angle(6.0, 6.0, 12.0).unwrap(), 180.0));
        assert!(law_of_cosines_angle(1.0, 1.0, 3.0).is_err());
    }

    #[test]
    fn third_angle_rejects_overflow() {
        assert!(close(third_angle(30.0, 60.0).unwrap(), 90.0));
        assert!(matches!(
            third_angle(120.0, 60.0),
            Err(GeometryError::InvalidAngles { .. })
        ));
    }

    #[test]
    fn tangent_point_is_tangent() {
        let center = Point2::new(1.0, 2.0);
        let point = Point2::new(11.0, 2.0);
        for side in [TangentSide::Ccw, TangentSide::Cw] {
            let t = tangent_point(center, 5.0, point, side).unwrap();
            assert!(close(center.distance(t), 5.0));
            // Radius is perpendicular to the tangent line.
            let r = t - center;
            let l = point - t;
            assert!((r.x * l.x + r.y * l.y).abs() < 1e-9);
        }
        let ccw = tangent_point(center, 5.0, point, TangentSide::Ccw).unwrap();
        assert!(ccw.y > center.y);
    }

    #[test]
    fn tangent_point_inside_circle_is_an_error() {
        let err = tangent_point(Point2::default(), 5.0, Point2::new(3.0, 0.0), TangentSide::Ccw)
            .unwrap_err();
        assert_eq!(err, GeometryError::PointInsideCircle { distance: 3.0, radius: 5.0 });
    }

    #[test]
    fn tangent_point_on_circle_is_the_point() {
        let t = tangent_point(Point2::default(), 5.0, Point2::new(0.0, 5.0), TangentSide::Cw).unwrap();
        assert!(close(t.x, 0.0) && close(t.y, 5.0));
    }
}
