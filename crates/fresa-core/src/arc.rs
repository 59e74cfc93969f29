// Circular interpolation geometry in the XY plane

use crate::{block::BlockError, point::Point};
use std::f64::consts::TAU;

/// How the arc was specified on the block
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ArcSpec {
    /// Signed radius (R word). The sign picks the minor or major arc.
    Radius(f64),
    /// Center offset from the start point (I, J words).
    Offset { i: f64, j: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ArcGeometry {
    pub center: Point,
    /// Unsigned radius
    pub radius: f64,
    pub theta0: f64,
    /// Swept angle; negative for clockwise arcs
    pub dtheta: f64,
    /// Path length including the out-of-plane (helical) component
    pub length: f64,
}

/// Recover center, start angle and swept angle of the arc from `start` to
/// `target`.
pub(crate) fn solve(
    start: &Point,
    target: &Point,
    spec: ArcSpec,
    clockwise: bool,
    tolerance: f64,
) -> Result<ArcGeometry, BlockError> {
    let (x0, y0) = (start.x(), start.y());
    let (xf, yf) = (target.x(), target.y());

    let (xc, yc, radius) = match spec {
        ArcSpec::Radius(r) => {
            let (dx, dy) = (xf - x0, yf - y0);
            let chord = dx.hypot(dy);
            if chord == 0.0 {
                return Err(BlockError::ArcDegenerate);
            }
            let mut h2 = r * r - chord * chord / 4.0;
            if h2 < 0.0 {
                if chord / 2.0 - r.abs() > tolerance {
                    return Err(BlockError::ArcRadiusTooShort {
                        radius: r.abs(),
                        chord,
                    });
                }
                h2 = 0.0;
            }
            // CW with R<0 and CCW with R>0 put the center on the left of the
            // chord, the other two combinations on the right.
            let side = r.signum() * if clockwise { -1.0 } else { 1.0 };
            let h = h2.sqrt();
            let (nx, ny) = (-dy / chord, dx / chord);
            (
                x0 + dx / 2.0 + side * h * nx,
                y0 + dy / 2.0 + side * h * ny,
                r.abs(),
            )
        }
        ArcSpec::Offset { i, j } => {
            let (xc, yc) = (x0 + i, y0 + j);
            let r = i.hypot(j);
            if r == 0.0 {
                return Err(BlockError::ArcDegenerate);
            }
            let r_end = (xf - xc).hypot(yf - yc);
            if (r - r_end).abs() > tolerance {
                return Err(BlockError::ArcEndpointMismatch {
                    error: r - r_end,
                    tolerance,
                });
            }
            (xc, yc, r)
        }
    };

    let theta0 = (y0 - yc).atan2(x0 - xc);
    let mut dtheta = (yf - yc).atan2(xf - xc) - theta0;
    if dtheta < 0.0 {
        dtheta += TAU;
    }
    // an I/J arc ending where it starts is a full turn in either direction
    let closed = matches!(spec, ArcSpec::Offset { .. }) && x0 == xf && y0 == yf;
    if closed && !clockwise {
        dtheta = TAU;
    }
    if clockwise {
        dtheta = -(TAU - dtheta);
    }

    let mut center = Point::new();
    center.set_x(xc);
    center.set_y(yc);

    Ok(ArcGeometry {
        center,
        radius,
        theta0,
        dtheta,
        length: (target.z() - start.z()).hypot(dtheta * radius),
    })
}
