//! Physical limits and reference points of the machine.

use crate::point::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MachineError {
    #[error("acceleration A must be positive, got {0}")]
    Acceleration(f64),

    #[error("sampling period tq must be positive, got {0}")]
    SamplingPeriod(f64),

    #[error("max_error must not be negative, got {0}")]
    Tolerance(f64),
}

/// Read-only machine parameters shared by every block of a program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    /// Maximum acceleration, distance/s²
    #[serde(rename = "A", alias = "acceleration", default = "default_acceleration")]
    pub acceleration: f64,

    /// Control loop sampling period, seconds
    #[serde(default = "default_tq")]
    pub tq: f64,

    /// Accepted mismatch between the two radii of an I/J arc
    #[serde(default = "default_max_error")]
    pub max_error: f64,

    /// Machine zero, the origin of the first block
    #[serde(default)]
    pub zero: [f64; 3],

    /// Work offset added to every setpoint sent downstream
    #[serde(default)]
    pub offset: [f64; 3],
}

impl Default for Machine {
    fn default() -> Self {
        Self {
            acceleration: default_acceleration(),
            tq: default_tq(),
            max_error: default_max_error(),
            zero: [0.0; 3],
            offset: [0.0; 3],
        }
    }
}

fn default_acceleration() -> f64 {
    125.0
}

fn default_tq() -> f64 {
    0.005
}

fn default_max_error() -> f64 {
    0.005
}

impl Machine {
    pub fn zero(&self) -> Point {
        Point::from(self.zero)
    }

    pub fn offset(&self) -> Point {
        Point::from(self.offset)
    }

    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn validate(&self) -> Result<(), MachineError> {
        if !(self.acceleration > 0.0) {
            return Err(MachineError::Acceleration(self.acceleration));
        }
        if !(self.tq > 0.0) {
            return Err(MachineError::SamplingPeriod(self.tq));
        }
        if !(self.max_error >= 0.0) {
            return Err(MachineError::Tolerance(self.max_error));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_bench_setup() {
        let m = Machine::default();
        assert_eq!(m.acceleration, 125.0);
        assert_eq!(m.tq, 0.005);
        assert_eq!(m.max_error, 0.005);
        assert_eq!(m.zero(), Point::from_xyz(0.0, 0.0, 0.0));
        assert!(m.validate().is_ok());
    }

    #[test]
    fn rejects_nonsense_limits() {
        let m = Machine {
            tq: 0.0,
            ..Machine::default()
        };
        assert_eq!(m.validate(), Err(MachineError::SamplingPeriod(0.0)));

        let m = Machine {
            acceleration: f64::NAN,
            ..Machine::default()
        };
        assert!(matches!(m.validate(), Err(MachineError::Acceleration(_))));
    }
}
