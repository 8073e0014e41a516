//! # Relativistic kinematics helpers
//!
//! A minimal four-momentum type built on [`nalgebra::Vector4`] plus the two angular
//! distances used throughout the crate.
//!
//! Conventions
//! -----------------
//! * Components are stored as `(px, py, pz, E)` in GeV.
//! * Construction goes through the collider coordinates `(pt, eta, phi, mass)`.
//! * Azimuthal differences are wrapped to the half-open interval `(-π, π]`.
//!
//! See also
//! ------------
//! * [`crate::objects::Jet`] – stores a [`FourMomentum`] computed once at construction.
//! * [`crate::gen_matcher`] – consumer of [`delta_r`].
use std::f64::consts::PI;

use nalgebra::Vector4;

use crate::constants::{Eta, GeV, Phi, DPI};

/// Signed azimuthal difference `phi1 - phi2`, wrapped to `(-π, π]`.
#[inline]
pub fn delta_phi(phi1: Phi, phi2: Phi) -> Phi {
    let d = (phi1 - phi2).rem_euclid(DPI);
    if d > PI {
        d - DPI
    } else {
        d
    }
}

/// Angular distance `sqrt(Δη² + Δφ²)` between two directions.
///
/// Arguments
/// -----------------
/// * `eta1`, `phi1`: pseudorapidity and azimuth of the first direction.
/// * `eta2`, `phi2`: pseudorapidity and azimuth of the second direction.
///
/// Return
/// ----------
/// * The Euclidean norm of `(Δη, Δφ)` with `Δφ` wrapped by [`delta_phi`].
#[inline]
pub fn delta_r(eta1: Eta, phi1: Phi, eta2: Eta, phi2: Phi) -> f64 {
    let deta = eta1 - eta2;
    let dphi = delta_phi(phi1, phi2);
    deta.hypot(dphi)
}

/// Four-momentum in Cartesian components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FourMomentum {
    components: Vector4<f64>,
}

impl FourMomentum {
    /// Build a four-momentum from collider coordinates.
    ///
    /// A negative mass is treated as a space-like vector with `E² = p² - m²`, clamped at zero,
    /// which keeps the energy finite for slightly negative stored masses.
    pub fn from_pt_eta_phi_m(pt: GeV, eta: Eta, phi: Phi, mass: GeV) -> Self {
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * eta.sinh();
        let p2 = px * px + py * py + pz * pz;
        let e2 = if mass >= 0.0 {
            p2 + mass * mass
        } else {
            (p2 - mass * mass).max(0.0)
        };
        FourMomentum {
            components: Vector4::new(px, py, pz, e2.sqrt()),
        }
    }

    pub fn px(&self) -> f64 {
        self.components[0]
    }

    pub fn py(&self) -> f64 {
        self.components[1]
    }

    pub fn pz(&self) -> f64 {
        self.components[2]
    }

    pub fn energy(&self) -> f64 {
        self.components[3]
    }

    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.px().hypot(self.py())
    }

    /// Magnitude of the three-momentum `|p|`.
    pub fn p(&self) -> f64 {
        self.components.xyz().norm()
    }

    /// Azimuthal angle in `(-π, π]`.
    pub fn phi(&self) -> f64 {
        if self.px() == 0.0 && self.py() == 0.0 {
            0.0
        } else {
            self.py().atan2(self.px())
        }
    }

    /// Pseudorapidity; `0` for a vector with no transverse component and no pz.
    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        if pt == 0.0 {
            if self.pz() == 0.0 {
                0.0
            } else {
                self.pz().signum() * f64::INFINITY
            }
        } else {
            (self.pz() / pt).asinh()
        }
    }

    /// Rapidity `0.5 · ln((E + pz) / (E - pz))`.
    ///
    /// Massless vectors along the beam axis give an infinite rapidity with the sign of `pz`.
    pub fn rapidity(&self) -> f64 {
        let e = self.energy();
        let pz = self.pz();
        if e - pz.abs() <= 0.0 {
            return pz.signum() * f64::INFINITY;
        }
        0.5 * ((e + pz) / (e - pz)).ln()
    }

    /// Invariant mass, negative for space-like vectors.
    pub fn mass(&self) -> f64 {
        let m2 = self.energy() * self.energy() - self.components.xyz().norm_squared();
        if m2 >= 0.0 {
            m2.sqrt()
        } else {
            -(-m2).sqrt()
        }
    }

    /// Scale all four components by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        FourMomentum {
            components: self.components * factor,
        }
    }
}

#[cfg(test)]
mod kinematics_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_delta_phi_wrapping() {
        assert_relative_eq!(delta_phi(0.1, -0.1), 0.2, epsilon = 1e-12);
        assert_relative_eq!(delta_phi(3.0, -3.0), 6.0 - DPI, epsilon = 1e-12);
        assert_relative_eq!(delta_phi(-3.0, 3.0), DPI - 6.0, epsilon = 1e-12);
        // Exactly opposite directions land on +π, never -π
        assert_relative_eq!(delta_phi(PI, 0.0), PI, epsilon = 1e-12);
        assert_relative_eq!(delta_phi(0.0, PI), PI, epsilon = 1e-12);
    }

    #[test]
    fn test_delta_r() {
        let dr = delta_r(1.0, 0.0, 1.05, 0.02);
        assert_relative_eq!(dr, (0.05f64.powi(2) + 0.02f64.powi(2)).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(delta_r(0.0, 3.1, 0.0, -3.1), DPI - 6.2, epsilon = 1e-12);
    }

    #[test]
    fn test_four_momentum_round_trip() {
        let p4 = FourMomentum::from_pt_eta_phi_m(50.0, 1.2, -2.0, 10.0);
        assert_relative_eq!(p4.pt(), 50.0, epsilon = 1e-9);
        assert_relative_eq!(p4.eta(), 1.2, epsilon = 1e-9);
        assert_relative_eq!(p4.phi(), -2.0, epsilon = 1e-9);
        assert_relative_eq!(p4.mass(), 10.0, epsilon = 1e-6);
        assert_relative_eq!(p4.p(), 50.0 * 1.2f64.cosh(), epsilon = 1e-9);
    }

    #[test]
    fn test_rapidity_massless_equals_eta() {
        let p4 = FourMomentum::from_pt_eta_phi_m(30.0, -0.7, 0.3, 0.0);
        assert_relative_eq!(p4.rapidity(), -0.7, epsilon = 1e-9);

        let massive = FourMomentum::from_pt_eta_phi_m(30.0, -0.7, 0.3, 20.0);
        assert!(massive.rapidity().abs() < 0.7);
    }

    #[test]
    fn test_scaled() {
        let p4 = FourMomentum::from_pt_eta_phi_m(40.0, 0.5, 1.0, 5.0).scaled(1.1);
        assert_relative_eq!(p4.pt(), 44.0, epsilon = 1e-9);
        assert_relative_eq!(p4.mass(), 5.5, epsilon = 1e-6);
        assert_relative_eq!(p4.eta(), 0.5, epsilon = 1e-9);
    }
}
