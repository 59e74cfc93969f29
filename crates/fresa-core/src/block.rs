//! A single G-code motion block.
//!
//! Blocks are built in program order: each one is derived from the block
//! before it (inheriting feed, spindle, tool and end position) and then
//! parsed. Parsing resolves the target through modal inheritance, solves arc
//! geometry and plans the velocity profile. Once parsed a block is read-only
//! for the control loop, which samples it through [`Block::lambda`] and
//! [`Block::interpolate`].

use crate::{
    arc::{self, ArcSpec},
    machine::Machine,
    point::{Axis, Point},
    profile::Profile,
};
use fresa_gcode::{LexError, Number};
use std::fmt;
use thiserror::Error;

/// Motion type selected by the G word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockKind {
    Rapid,
    Line,
    ArcCw,
    ArcCcw,
    #[default]
    NoMotion,
}

impl BlockKind {
    /// Map a G code (0 to 4) to its motion type.
    pub fn from_code(code: Number) -> Option<Self> {
        let code = match code {
            Number::Int(v) => v,
            Number::Float(v) if v.fract() == 0.0 => v as i64,
            Number::Float(_) => return None,
        };
        match code {
            0 => Some(BlockKind::Rapid),
            1 => Some(BlockKind::Line),
            2 => Some(BlockKind::ArcCw),
            3 => Some(BlockKind::ArcCcw),
            4 => Some(BlockKind::NoMotion),
            _ => None,
        }
    }

    pub fn is_arc(self) -> bool {
        matches!(self, BlockKind::ArcCw | BlockKind::ArcCcw)
    }

    /// Whether the control loop samples this kind of block.
    pub fn is_interpolated(self) -> bool {
        matches!(
            self,
            BlockKind::Line | BlockKind::ArcCw | BlockKind::ArcCcw
        )
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BlockKind::Rapid => "RAPID",
            BlockKind::Line => "LINE",
            BlockKind::ArcCw => "ARC_CW",
            BlockKind::ArcCcw => "ARC_CCW",
            BlockKind::NoMotion => "NO_MOTION",
        })
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BlockError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("unknown command {letter}{value}")]
    UnknownCommand { letter: char, value: f64 },

    #[error("invalid value {value} for {letter}")]
    InvalidValue { letter: char, value: f64 },

    #[error("unsupported motion code G{0}")]
    UnsupportedMotion(f64),

    #[error("R cannot be combined with I or J on the same block")]
    RadiusWithOffset,

    #[error("arc endpoints mismatch by {error:.6} (tolerance {tolerance})")]
    ArcEndpointMismatch { error: f64, tolerance: f64 },

    #[error("arc radius {radius} is too short for a chord of {chord}")]
    ArcRadiusTooShort { radius: f64, chord: f64 },

    #[error("arc has no usable radius")]
    ArcDegenerate,

    #[error("{kind} block without a positive feedrate")]
    MissingFeedrate { kind: BlockKind },
}

/// Every error found while parsing one block.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{} error(s) in block `{line}`", .errors.len())]
pub struct ParseFailure {
    pub line: String,
    pub errors: Vec<BlockError>,
}

impl ParseFailure {
    pub fn count(&self) -> usize {
        self.errors.len()
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("{0} blocks are not interpolated")]
    NotInterpolable(BlockKind),

    #[error("{0} block has no motion plan")]
    Unplanned(BlockKind),
}

#[derive(Debug, Clone)]
pub struct Block<'m> {
    line: String,
    n: u64,
    kind: BlockKind,
    tool: u32,
    spindle: f64,
    feedrate: f64,
    // non-modal arc words, present only when written on this line
    i: Option<f64>,
    j: Option<f64>,
    r: Option<f64>,
    start: Point,
    target: Point,
    delta: Point,
    length: f64,
    center: Point,
    radius: f64,
    theta0: f64,
    dtheta: f64,
    acc: f64,
    profile: Option<Profile>,
    machine: &'m Machine,
}

impl<'m> Block<'m> {
    /// Create a block for `line`, carrying over the modal state of `prev`.
    ///
    /// Feedrate, spindle speed and tool are inherited; the block starts where
    /// `prev` ends, or at the machine zero for the first block of a program.
    /// Everything else starts from its default.
    pub fn new(line: &str, prev: Option<&Block<'m>>, machine: &'m Machine) -> Self {
        let (start, feedrate, spindle, tool) = match prev {
            Some(p) => (p.target, p.feedrate, p.spindle, p.tool),
            None => (machine.zero(), 0.0, 0.0, 0),
        };
        Self {
            line: line.trim().to_string(),
            n: 0,
            kind: BlockKind::NoMotion,
            tool,
            spindle,
            feedrate,
            i: None,
            j: None,
            r: None,
            start,
            target: Point::new(),
            delta: Point::new(),
            length: 0.0,
            center: Point::new(),
            radius: 0.0,
            theta0: 0.0,
            dtheta: 0.0,
            acc: machine.acceleration,
            profile: None,
            machine,
        }
    }

    /// Parse the words of the line and derive geometry and profile.
    ///
    /// Bad words do not stop parsing: every problem is collected and
    /// returned together. A block that fails arc validation or has no feed
    /// is left without a profile.
    pub fn parse(&mut self) -> Result<(), ParseFailure> {
        let mut errors = Vec::new();
        let words: Vec<_> = fresa_gcode::words(&self.line).collect();
        for word in words {
            let outcome = word
                .map_err(BlockError::from)
                .and_then(|(letter, value)| self.set_field(letter, value));
            if let Err(err) = outcome {
                errors.push(err);
            }
        }

        let mixed_arc_words = self.r.is_some() && (self.i.is_some() || self.j.is_some());
        if mixed_arc_words {
            errors.push(BlockError::RadiusWithOffset);
        }

        self.target.modal(&self.start);
        self.delta = Point::delta(&self.start, &self.target);
        self.length = self.start.dist(&self.target);

        let planned = match self.kind {
            BlockKind::Line => {
                self.acc = self.machine.acceleration;
                self.plan(self.feedrate)
            }
            BlockKind::ArcCw | BlockKind::ArcCcw if !mixed_arc_words => {
                self.arc().and_then(|feed| self.plan(feed))
            }
            _ => Ok(()),
        };
        if let Err(err) = planned {
            errors.push(err);
        }

        tracing::debug!(
            n = self.n,
            kind = %self.kind,
            length = self.length,
            errors = errors.len(),
            "parsed block"
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ParseFailure {
                line: self.line.clone(),
                errors,
            })
        }
    }

    fn set_field(&mut self, letter: char, value: Number) -> Result<(), BlockError> {
        let invalid = || BlockError::InvalidValue {
            letter,
            value: value.as_f64(),
        };
        match letter {
            'N' => self.n = u64::try_from(value.as_i64()).map_err(|_| invalid())?,
            'G' => {
                self.kind = BlockKind::from_code(value)
                    .ok_or(BlockError::UnsupportedMotion(value.as_f64()))?
            }
            'X' | 'Y' | 'Z' => {
                if let Some(axis) = Axis::from_letter(letter) {
                    self.target.set(axis, value.as_f64());
                }
            }
            'I' => self.i = Some(value.as_f64()),
            'J' => self.j = Some(value.as_f64()),
            'R' => self.r = Some(value.as_f64()),
            'F' => self.feedrate = value.as_f64(),
            'S' => self.spindle = value.as_f64(),
            'T' => self.tool = u32::try_from(value.as_i64()).map_err(|_| invalid())?,
            _ => {
                return Err(BlockError::UnknownCommand {
                    letter,
                    value: value.as_f64(),
                });
            }
        }
        Ok(())
    }

    /// Solve the arc and limit the feed for it. Returns the feed to plan with.
    fn arc(&mut self) -> Result<f64, BlockError> {
        let spec = match self.r {
            Some(r) => ArcSpec::Radius(r),
            None => ArcSpec::Offset {
                i: self.i.unwrap_or(0.0),
                j: self.j.unwrap_or(0.0),
            },
        };
        let geometry = arc::solve(
            &self.start,
            &self.target,
            spec,
            self.kind == BlockKind::ArcCw,
            self.machine.max_error,
        )
        .inspect_err(|err| tracing::warn!(line = %self.line, %err, "arc rejected"))?;

        self.center = geometry.center;
        self.radius = geometry.radius;
        self.theta0 = geometry.theta0;
        self.dtheta = geometry.dtheta;
        self.length = geometry.length;

        // Centripetal acceleration f²/r is held to A/2, the tangential
        // acceleration gets what remains of A.
        let a = self.machine.acceleration;
        let feed = self.feedrate.min((a / 2.0 * self.radius).sqrt() * 60.0);
        self.acc = (a * a - (feed / 60.0).powi(4) / (self.radius * self.radius)).sqrt();
        Ok(feed)
    }

    fn plan(&mut self, feed: f64) -> Result<(), BlockError> {
        if feed.is_nan() || feed <= 0.0 {
            return Err(BlockError::MissingFeedrate { kind: self.kind });
        }
        self.profile = Some(Profile::plan(
            self.length,
            self.acc,
            feed,
            self.machine.tq,
        ));
        Ok(())
    }

    /// Path fraction λ in `[0, 1]` and feed (distance/min) at `t` seconds
    /// into the block.
    pub fn lambda(&self, t: f64) -> (f64, f64) {
        match &self.profile {
            Some(profile) => profile.lambda(t),
            None if t < 0.0 => (0.0, 0.0),
            None => (1.0, 0.0),
        }
    }

    /// Absolute position at path fraction `lambda`.
    pub fn interpolate(&self, lambda: f64) -> Result<Point, InterpolationError> {
        if !self.kind.is_interpolated() {
            return Err(InterpolationError::NotInterpolable(self.kind));
        }
        if self.profile.is_none() {
            return Err(InterpolationError::Unplanned(self.kind));
        }
        let z = self.start.z() + self.delta.z() * lambda;
        let point = if self.kind.is_arc() {
            let theta = self.theta0 + self.dtheta * lambda;
            Point::from_xyz(
                self.center.x() + self.radius * theta.cos(),
                self.center.y() + self.radius * theta.sin(),
                z,
            )
        } else {
            Point::from_xyz(
                self.start.x() + self.delta.x() * lambda,
                self.start.y() + self.delta.y() * lambda,
                z,
            )
        };
        Ok(point)
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    /// Sequence number from the N word
    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn tool(&self) -> u32 {
        self.tool
    }

    pub fn spindle(&self) -> f64 {
        self.spindle
    }

    /// Commanded feedrate, distance/min
    pub fn feedrate(&self) -> f64 {
        self.feedrate
    }

    /// Modal origin: where the block starts
    pub fn start(&self) -> &Point {
        &self.start
    }

    pub fn target(&self) -> &Point {
        &self.target
    }

    pub fn delta(&self) -> &Point {
        &self.delta
    }

    pub fn center(&self) -> &Point {
        &self.center
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn theta0(&self) -> f64 {
        self.theta0
    }

    pub fn dtheta(&self) -> f64 {
        self.dtheta
    }

    /// Tangential acceleration used for the profile
    pub fn acceleration(&self) -> f64 {
        self.acc
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// Planned duration in seconds, zero when there is no profile.
    pub fn dt(&self) -> f64 {
        self.profile.map_or(0.0, |p| p.dt)
    }

    pub fn machine(&self) -> &'m Machine {
        self.machine
    }
}

impl fmt::Display for Block<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:03} {}->{} F{:7.1} S{:7.1} T{:2} ({})",
            self.n, self.start, self.target, self.feedrate, self.spindle, self.tool, self.kind
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn parsed<'m>(line: &str, prev: Option<&Block<'m>>, machine: &'m Machine) -> Block<'m> {
        let mut b = Block::new(line, prev, machine);
        b.parse().unwrap();
        b
    }

    #[test]
    fn dispatches_words_to_fields() {
        let m = Machine::default();
        let b = parsed("N7 G00 X1 Y2 Z3 F500 S1200 T4", None, &m);
        assert_eq!(b.n(), 7);
        assert_eq!(b.kind(), BlockKind::Rapid);
        assert_eq!(*b.target(), Point::from_xyz(1.0, 2.0, 3.0));
        assert_eq!(b.feedrate(), 500.0);
        assert_eq!(b.spindle(), 1200.0);
        assert_eq!(b.tool(), 4);
        assert!(b.profile().is_none());
    }

    #[test]
    fn counts_every_bad_word() {
        let m = Machine::default();
        let mut b = Block::new("N1 G01 Q5 X10 W2 G9 F100", None, &m);
        let failure = b.parse().unwrap_err();
        assert_eq!(failure.count(), 3);
        assert!(matches!(
            failure.errors[0],
            BlockError::UnknownCommand { letter: 'Q', .. }
        ));
        assert_eq!(failure.errors[2], BlockError::UnsupportedMotion(9.0));
        // the good words still landed
        assert_eq!(b.target().x(), 10.0);
        assert_eq!(b.kind(), BlockKind::Line);
        assert!(b.profile().is_some());
    }

    #[test]
    fn radius_and_offset_cannot_mix() {
        let m = Machine::default();
        let mut b = Block::new("G02 X10 Y0 R5 I5 F600", None, &m);
        let failure = b.parse().unwrap_err();
        assert_eq!(failure.errors, vec![BlockError::RadiusWithOffset]);
        assert!(b.profile().is_none());
        assert_eq!(
            b.interpolate(0.5),
            Err(InterpolationError::Unplanned(BlockKind::ArcCw))
        );
    }

    #[test]
    fn derives_modal_state_from_previous_block() {
        let m = Machine::default();
        let first = parsed("N1 G01 X10 Y20 Z-1 F300 S800 T2", None, &m);
        let second = parsed("N2 G01 Y50", Some(&first), &m);
        assert_eq!(*second.start(), Point::from_xyz(10.0, 20.0, -1.0));
        assert_eq!(*second.target(), Point::from_xyz(10.0, 50.0, -1.0));
        assert_eq!(second.feedrate(), 300.0);
        assert_eq!(second.spindle(), 800.0);
        assert_eq!(second.tool(), 2);
        assert_eq!(*second.delta(), Point::from_xyz(0.0, 30.0, 0.0));
        assert_eq!(second.length(), 30.0);
    }

    #[test]
    fn arc_words_and_motion_are_not_modal() {
        let m = Machine::default();
        let arc = parsed("G02 X10 Y0 R5 F600", None, &m);
        let next = parsed("X20", Some(&arc), &m);
        assert_eq!(next.kind(), BlockKind::NoMotion);
        assert!(next.profile().is_none());
        assert_eq!(next.radius(), 0.0);
        assert_eq!(
            next.interpolate(0.0),
            Err(InterpolationError::NotInterpolable(BlockKind::NoMotion))
        );
    }

    #[test]
    fn first_block_starts_at_machine_zero() {
        let m = Machine {
            zero: [1.0, 2.0, 3.0],
            ..Machine::default()
        };
        let b = parsed("G01 X5 F100", None, &m);
        assert_eq!(*b.start(), Point::from_xyz(1.0, 2.0, 3.0));
        assert_eq!(*b.target(), Point::from_xyz(5.0, 2.0, 3.0));
    }

    #[test]
    fn line_without_feed_is_rejected() {
        let m = Machine::default();
        let mut b = Block::new("G01 X5", None, &m);
        let failure = b.parse().unwrap_err();
        assert_eq!(
            failure.errors,
            vec![BlockError::MissingFeedrate {
                kind: BlockKind::Line
            }]
        );
    }

    #[test]
    fn line_interpolates_linearly() {
        let m = Machine::default();
        let b = parsed("N10 G01 X100 Y0 F600", None, &m);
        assert_eq!(b.interpolate(0.0).unwrap(), Point::from_xyz(0.0, 0.0, 0.0));
        assert_eq!(b.interpolate(0.5).unwrap(), Point::from_xyz(50.0, 0.0, 0.0));
        assert_eq!(b.interpolate(1.0).unwrap(), Point::from_xyz(100.0, 0.0, 0.0));
    }

    #[test]
    fn arc_interpolates_on_the_circle() {
        let m = Machine::default();
        let b = parsed("G02 X10 Y0 R5 F600", None, &m);
        assert!((b.dtheta() + PI).abs() < 1e-9);
        let mid = b.interpolate(0.5).unwrap();
        // clockwise from (0,0) to (10,0) around (5,0) passes over the top
        assert!((mid.x() - 5.0).abs() < 1e-9);
        assert!((mid.y() - 5.0).abs() < 1e-9);
        let end = b.interpolate(1.0).unwrap();
        assert!((end.x() - 10.0).abs() < 1e-9);
        assert!(end.y().abs() < 1e-9);
    }

    #[test]
    fn arc_feed_is_limited_by_centripetal_acceleration() {
        let m = Machine::default();
        let b = parsed("G03 X2 Y0 I1 J0 F6000", None, &m);
        // sqrt(125 / 2 * 1) * 60 = 474.3 mm/min < 6000
        let limit = (m.acceleration / 2.0 * 1.0_f64).sqrt();
        let profile = b.profile().unwrap();
        assert!(profile.f <= limit + 1e-9);
        assert!((b.acceleration() - m.acceleration * 3f64.sqrt() / 2.0).abs() < 1e-9);
        // the commanded feed stays modal
        assert_eq!(b.feedrate(), 6000.0);
    }

    #[test]
    fn closed_offset_arc_runs_a_full_circle() {
        let m = Machine::default();
        let ccw = parsed("G03 X0 Y0 I5 J0 F600", None, &m);
        assert!((ccw.dtheta() - 2.0 * PI).abs() < 1e-9);
        assert!((ccw.length() - 10.0 * PI).abs() < 1e-9);
        assert!(ccw.profile().unwrap().ticks > 1);
        let half = ccw.interpolate(0.5).unwrap();
        assert!((half.x() - 10.0).abs() < 1e-9);
        assert!(half.y().abs() < 1e-9);
    }

    #[test]
    fn arc_endpoint_mismatch_is_a_parse_error() {
        let m = Machine::default();
        let mut b = Block::new("G02 X10 Y1 I5 J0 F600", None, &m);
        let failure = b.parse().unwrap_err();
        assert_eq!(failure.count(), 1);
        assert!(matches!(
            failure.errors[0],
            BlockError::ArcEndpointMismatch { .. }
        ));
        assert!(b.profile().is_none());
    }

    #[test]
    fn lambda_without_profile() {
        let m = Machine::default();
        let b = parsed("G00 X10", None, &m);
        assert_eq!(b.lambda(-0.1), (0.0, 0.0));
        assert_eq!(b.lambda(0.3), (1.0, 0.0));
        assert_eq!(b.dt(), 0.0);
    }

    #[test]
    fn display_matches_listing_format() {
        let m = Machine::default();
        let b = parsed("N10 G01 X100 Y0 F600", None, &m);
        insta::assert_snapshot!(
            b.to_string(),
            @"010 [ 0.000  0.000  0.000]->[100.000  0.000  0.000] F  600.0 S    0.0 T 0 (LINE)"
        );
    }

    #[test]
    fn failure_message_reports_count() {
        let m = Machine::default();
        let mut b = Block::new("G01 X1 Q1 F10", None, &m);
        let failure = b.parse().unwrap_err();
        assert_eq!(failure.to_string(), "1 error(s) in block `G01 X1 Q1 F10`");
    }
}
