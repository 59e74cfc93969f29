//! Three-axis coordinates with per-axis definition state.
//!
//! A G-code word only names the axes it moves, so a freshly parsed target
//! is usually partial. Axes left undefined are filled in from the previous
//! position through [`Point::modal`].

use std::fmt;

const FIELD_WIDTH: usize = 6;

/// Which axis a coordinate belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Parse axis from a G-code letter (case-insensitive)
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'X' => Some(Axis::X),
            'Y' => Some(Axis::Y),
            'Z' => Some(Axis::Z),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
}

impl Point {
    /// A point with no axis defined.
    pub const fn new() -> Self {
        Self {
            x: None,
            y: None,
            z: None,
        }
    }

    /// A point with all three axes defined.
    pub const fn from_xyz(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }

    pub fn set_x(&mut self, x: f64) {
        self.x = Some(x);
    }

    pub fn set_y(&mut self, y: f64) {
        self.y = Some(y);
    }

    pub fn set_z(&mut self, z: f64) {
        self.z = Some(z);
    }

    pub fn set_xyz(&mut self, x: f64, y: f64, z: f64) {
        *self = Self::from_xyz(x, y, z);
    }

    pub fn set(&mut self, axis: Axis, value: f64) {
        *self.slot_mut(axis) = Some(value);
    }

    /// Numeric value on `axis`; undefined axes read as 0.
    pub fn get(&self, axis: Axis) -> f64 {
        self.value(axis).unwrap_or(0.0)
    }

    /// The coordinate on `axis`, or `None` if it was never assigned.
    pub fn value(&self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn x(&self) -> f64 {
        self.get(Axis::X)
    }

    pub fn y(&self) -> f64 {
        self.get(Axis::Y)
    }

    pub fn z(&self) -> f64 {
        self.get(Axis::Z)
    }

    pub fn is_defined(&self, axis: Axis) -> bool {
        self.value(axis).is_some()
    }

    pub fn is_complete(&self) -> bool {
        Axis::ALL.iter().all(|&axis| self.is_defined(axis))
    }

    /// Euclidean distance. Undefined axes count as 0.
    pub fn dist(&self, to: &Point) -> f64 {
        let dx = to.x() - self.x();
        let dy = to.y() - self.y();
        let dz = to.z() - self.z();
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Projections `to - from`, always fully defined.
    pub fn delta(from: &Point, to: &Point) -> Point {
        Point::from_xyz(to.x() - from.x(), to.y() - from.y(), to.z() - from.z())
    }

    /// Component-wise sum, fully defined.
    pub fn offset_by(&self, offset: &Point) -> Point {
        Point::from_xyz(
            self.x() + offset.x(),
            self.y() + offset.y(),
            self.z() + offset.z(),
        )
    }

    /// Modal inheritance: every axis undefined here but defined on `from`
    /// takes `from`'s value. Axes already defined are left alone.
    pub fn modal(&mut self, from: &Point) {
        for axis in Axis::ALL {
            if let (None, Some(value)) = (self.value(axis), from.value(axis)) {
                self.set(axis, value);
            }
        }
    }

    fn slot_mut(&mut self, axis: Axis) -> &mut Option<f64> {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }
}

impl From<[f64; 3]> for Point {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Point::from_xyz(x, y, z)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, axis) in Axis::ALL.into_iter().enumerate() {
            if idx > 0 {
                write!(f, " ")?;
            }
            match self.value(axis) {
                Some(v) => write!(f, "{:>w$.3}", v, w = FIELD_WIDTH)?,
                None => write!(f, "{:>w$}", "-", w = FIELD_WIDTH)?,
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_mark_axes_defined() {
        let mut p = Point::new();
        assert!(!p.is_defined(Axis::X));
        p.set_x(1.0);
        p.set_z(-2.0);
        assert!(p.is_defined(Axis::X));
        assert!(!p.is_defined(Axis::Y));
        assert_eq!(p.y(), 0.0);
        assert_eq!(p.value(Axis::Z), Some(-2.0));
        p.set_xyz(4.0, 5.0, 6.0);
        assert!(p.is_complete());
    }

    #[test]
    fn display_uses_placeholder_for_undefined() {
        let mut p = Point::new();
        p.set_x(1.0);
        p.set_z(3.0);
        insta::assert_snapshot!(p.to_string(), @"[ 1.000      -  3.000]");
    }

    #[test]
    fn modal_keeps_defined_axes() {
        let from = Point::from_xyz(0.0, 0.0, 0.0);
        let mut to = Point::new();
        to.set_x(100.0);
        to.set_y(100.0);
        to.modal(&from);
        assert_eq!(to, Point::from_xyz(100.0, 100.0, 0.0));
    }

    #[test]
    fn modal_skips_axes_undefined_on_source() {
        let mut from = Point::new();
        from.set_y(7.0);
        let mut to = Point::new();
        to.modal(&from);
        assert!(!to.is_defined(Axis::X));
        assert_eq!(to.value(Axis::Y), Some(7.0));
        assert!(!to.is_defined(Axis::Z));
    }

    #[test]
    fn distance_and_delta() {
        let a = Point::from_xyz(0.0, 0.0, 0.0);
        let b = Point::from_xyz(100.0, 100.0, 0.0);
        assert!((a.dist(&b) - 141.421_356_237).abs() < 1e-6);
        let d = Point::delta(&a, &b);
        assert_eq!(d, Point::from_xyz(100.0, 100.0, 0.0));
        assert!(d.is_complete());
    }

    #[test]
    fn axis_from_letter() {
        assert_eq!(Axis::from_letter('x'), Some(Axis::X));
        assert_eq!(Axis::from_letter('Z'), Some(Axis::Z));
        assert_eq!(Axis::from_letter('I'), None);
    }
}
