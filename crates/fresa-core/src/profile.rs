//! Quantized trapezoidal velocity profile.
//!
//! A block is traversed with a constant acceleration ramp, an optional
//! cruise at constant feed, and a constant deceleration ramp. The total
//! duration is rounded up to a whole number of control ticks and the
//! cruise feed is lowered to match, so the covered distance stays equal to
//! the block length and a fixed-period sampler lands exactly on the end of
//! the block.

/// Shape of the planned schedule
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileShape {
    /// Accel, cruise, decel.
    Trapezoidal,
    /// The block is too short to reach the commanded feed: accel then decel.
    Triangular,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Profile {
    /// Acceleration, distance/s²
    pub a: f64,
    /// Deceleration (negative), distance/s²
    pub d: f64,
    /// Cruise feed after rescaling, distance/s
    pub f: f64,
    /// Path length
    pub l: f64,
    pub dt_1: f64,
    pub dt_m: f64,
    pub dt_2: f64,
    /// Quantized total duration, `ticks * tq`
    pub dt: f64,
    pub ticks: u64,
    pub shape: ProfileShape,
}

/// Round `t` up to the next multiple of `tq`. Returns the tick count and the
/// added time.
fn quantize(t: f64, tq: f64) -> (u64, f64) {
    let ticks = (t / tq).floor() as u64 + 1;
    (ticks, ticks as f64 * tq - t)
}

impl Profile {
    /// Plan a profile for `length` at `feedrate` (distance/min) under
    /// acceleration limit `acceleration`, quantized to `tq`.
    ///
    /// `feedrate`, `acceleration` and `tq` must be positive.
    pub fn plan(length: f64, acceleration: f64, feedrate: f64, tq: f64) -> Self {
        debug_assert!(feedrate > 0.0 && acceleration > 0.0 && tq > 0.0);
        let l = length.max(0.0);
        let mut f = feedrate / 60.0;
        let mut dt_1 = f / acceleration;
        let mut dt_2 = dt_1;
        let mut dt_m = l / f - (dt_1 + dt_2) / 2.0;

        let (ticks, shape) = if dt_m > 0.0 {
            let (ticks, dq) = quantize(dt_1 + dt_m + dt_2, tq);
            dt_m += dq;
            f = 2.0 * l / (dt_1 + dt_2 + 2.0 * dt_m);
            (ticks, ProfileShape::Trapezoidal)
        } else {
            dt_1 = (l / acceleration).sqrt();
            dt_2 = dt_1;
            dt_m = 0.0;
            let (ticks, dq) = quantize(dt_1 + dt_2, tq);
            dt_2 += dq;
            f = 2.0 * l / (dt_1 + dt_2);
            (ticks, ProfileShape::Triangular)
        };

        // zero-length blocks collapse to a single hold tick
        let a = if dt_1 > 0.0 { f / dt_1 } else { 0.0 };
        let d = if dt_2 > 0.0 { -f / dt_2 } else { 0.0 };

        tracing::trace!(?shape, l, f, dt_1, dt_m, dt_2, ticks, "planned profile");

        Self {
            a,
            d,
            f,
            l,
            dt_1,
            dt_m,
            dt_2,
            dt: ticks as f64 * tq,
            ticks,
            shape,
        }
    }

    /// Path fraction λ and instantaneous feed (distance/min) at `t` seconds
    /// after the start of the block.
    pub fn lambda(&self, t: f64) -> (f64, f64) {
        let t_1 = self.dt_1;
        let t_2 = self.dt_1 + self.dt_m;
        let t_end = t_2 + self.dt_2;

        if t >= t_end || t >= self.dt {
            return (1.0, 0.0);
        }

        let (s, v) = if t < 0.0 {
            (0.0, 0.0)
        } else if t < t_1 {
            (self.a * t * t / 2.0, self.a * t)
        } else if t < t_2 {
            (self.f * (t_1 / 2.0 + (t - t_1)), self.f)
        } else {
            let tau = t - t_2;
            (
                self.f * t_1 / 2.0 + self.f * (self.dt_m + tau) + self.d / 2.0 * tau * tau,
                self.f + self.d * tau,
            )
        };

        let lambda = if self.l > 0.0 { s / self.l } else { 0.0 };
        (lambda.clamp(0.0, 1.0), v * 60.0)
    }

    /// Distance covered by the whole schedule, for checking against `l`.
    pub fn covered(&self) -> f64 {
        self.f * (self.dt_1 / 2.0 + self.dt_m + self.dt_2 / 2.0)
    }
}
