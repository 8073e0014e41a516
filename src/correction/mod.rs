//! # Jet energy correction stage
//!
//! Reconstructed jets may be stored with their kinematics already corrected. The stage first
//! recovers the raw kinematics through `raw = stored · (1 − rawFactor)`, then applies an
//! optional multiplicative correction evaluated at the raw transverse momentum.
//!
//! ## Overview
//! -----------------
//! * [`JetCorrector`] – the correction function `(pt, eta, area, rho) → scale`.
//! * [`FactorizedCorrector`] – a [`JetCorrector`] built from L1/L2/L3 tables on disk.
//! * [`CorrectionStage`] – raw-scale recovery, degeneracy check and scaling.
//!
//! ## Degenerate jets
//! -----------------
//! A jet with `1 − rawFactor ≤ 1e-3` has zero or negative raw energy. [`CorrectionStage::apply`]
//! reports it as [`JetNtupleError::DegenerateObject`], which is recoverable: the caller drops
//! the jet and carries on.
use std::fmt;

use crate::constants::{Eta, GeV, Phi, MIN_RAW_SCALE};
use crate::jetntuple_errors::JetNtupleError;
use crate::kinematics::FourMomentum;
use crate::objects::RecoJet;

pub mod factorized;

pub use factorized::{CorrectionBin, CorrectionLevel, CorrectionLevelKind, FactorizedCorrector};

/// Inputs of a correction function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionInput {
    /// raw transverse momentum
    pub pt: GeV,
    pub eta: Eta,
    /// catchment area
    pub area: f64,
    /// ambient energy density of the event
    pub rho: f64,
}

/// Multiplicative jet energy correction.
pub trait JetCorrector {
    fn correction(&self, input: &CorrectionInput) -> f64;
}

impl<F> JetCorrector for F
where
    F: Fn(&CorrectionInput) -> f64,
{
    fn correction(&self, input: &CorrectionInput) -> f64 {
        self(input)
    }
}

/// Corrected kinematics of one jet.
///
/// # Fields
///
/// * `pt`, `mass` - corrected transverse momentum and mass
/// * `scale` - correction factor applied to the raw kinematics (`1` without a corrector)
/// * `p4` - corrected four-momentum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    pub pt: GeV,
    pub mass: GeV,
    pub scale: f64,
    pub p4: FourMomentum,
}

/// Applies the optional correction to reconstructed jets.
#[derive(Default)]
pub struct CorrectionStage {
    corrector: Option<Box<dyn JetCorrector>>,
}

impl fmt::Debug for CorrectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrectionStage")
            .field("enabled", &self.corrector.is_some())
            .finish()
    }
}

impl CorrectionStage {
    /// A stage that leaves the raw kinematics unscaled.
    pub fn uncorrected() -> Self {
        Self::default()
    }

    pub fn new(corrector: Box<dyn JetCorrector>) -> Self {
        CorrectionStage {
            corrector: Some(corrector),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.corrector.is_some()
    }

    /// Scale raw kinematics.
    ///
    /// Arguments
    /// -----------------
    /// * `raw_pt`, `raw_mass`: uncorrected transverse momentum and mass.
    /// * `eta`, `phi`: jet direction, unchanged by the correction.
    /// * `area`: catchment area.
    /// * `rho`: ambient energy density of the event.
    ///
    /// Return
    /// ----------
    /// * `pt = raw_pt · scale`, `mass = raw_mass · scale`, and the scale itself.
    pub fn correct(
        &self,
        raw_pt: GeV,
        eta: Eta,
        phi: Phi,
        raw_mass: GeV,
        area: f64,
        rho: f64,
    ) -> Correction {
        let scale = self.corrector.as_ref().map_or(1.0, |c| {
            c.correction(&CorrectionInput {
                pt: raw_pt,
                eta,
                area,
                rho,
            })
        });
        let pt = raw_pt * scale;
        let mass = raw_mass * scale;
        Correction {
            pt,
            mass,
            scale,
            p4: FourMomentum::from_pt_eta_phi_m(pt, eta, phi, mass),
        }
    }

    /// Recover the raw kinematics of `jet` and correct them.
    ///
    /// Arguments
    /// -----------------
    /// * `jet`: the reconstructed jet, with its stored kinematics and `rawFactor`.
    /// * `collection`, `index`: identify the jet in a degeneracy report.
    /// * `rho`: ambient energy density of the event.
    ///
    /// Return
    /// ----------
    /// * The [`Correction`], or [`JetNtupleError::DegenerateObject`] if
    ///   `1 − rawFactor ≤ 1e-3`.
    pub fn apply(
        &self,
        jet: &RecoJet,
        collection: &str,
        index: usize,
        rho: f64,
    ) -> Result<Correction, JetNtupleError> {
        let raw_scale = jet.raw_scale();
        if raw_scale <= MIN_RAW_SCALE || raw_scale.is_nan() {
            return Err(JetNtupleError::DegenerateObject {
                collection: collection.to_string(),
                index,
                raw_scale,
            });
        }
        Ok(self.correct(
            raw_scale * jet.pt(),
            jet.eta(),
            jet.phi(),
            raw_scale * jet.mass(),
            jet.area(),
            rho,
        ))
    }
}
