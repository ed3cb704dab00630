//! Basic numerical concepts used throughout the program

#![allow(missing_docs)]

// Calibration tables and record fields are double precision
pub type Float = f64;
pub use std::f64 as reals;

/// Mathematical functions
pub mod functions {
    use super::{reals::consts::PI, Float};

    /// Bring an angle into the half-open interval (-π, π]
    pub fn wrap_phi(phi: Float) -> Float {
        let two_pi = 2. * PI;
        let wrapped = phi % two_pi;
        if wrapped > PI {
            wrapped - two_pi
        } else if wrapped <= -PI {
            wrapped + two_pi
        } else {
            wrapped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{functions::wrap_phi, reals::consts::PI};
    use approx::assert_abs_diff_eq;

    #[test]
    fn wrap_phi_range_and_idempotence() {
        let mut x = -20.;
        while x < 20. {
            let w = wrap_phi(x);
            assert!(w > -PI && w <= PI, "wrap_phi({x}) = {w}");
            assert_eq!(wrap_phi(w), w);
            x += 0.0137;
        }
    }

    #[test]
    fn wrap_phi_edges() {
        assert_abs_diff_eq!(wrap_phi(-PI), PI);
        assert_abs_diff_eq!(wrap_phi(PI), PI);
        assert_abs_diff_eq!(wrap_phi(1.5 * PI), -0.5 * PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_phi(0.25), 0.25);
    }
}
