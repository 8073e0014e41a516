use std::fmt;

use super::{GenJet, Jet};
use crate::constants::{Eta, GeV, Phi, TruthIndex};
use crate::kinematics::FourMomentum;

/// Per-constituent energy fractions of a reconstructed jet.
///
/// Which fractions exist depends on the input schema (e.g. PF jets carry them, large-radius
/// PUPPI jets usually do not). A fraction that was not read is `None` and is written out as a
/// null value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyFractions {
    /// charged hadron energy fraction
    pub ch_hef: Option<f64>,
    /// neutral hadron energy fraction
    pub ne_hef: Option<f64>,
    /// charged electromagnetic energy fraction
    pub ch_em_ef: Option<f64>,
    /// neutral electromagnetic energy fraction
    pub ne_em_ef: Option<f64>,
    /// muon energy fraction
    pub mu_ef: Option<f64>,
    /// forward-calorimeter hadronic energy fraction
    pub hf_ef: Option<f64>,
    /// forward-calorimeter electromagnetic energy fraction
    pub hfm_ef: Option<f64>,
}

/// Detector-level jet.
///
/// The stored kinematics may already be corrected; `raw_factor` recovers the uncorrected
/// values through `raw_pt = pt · (1 - raw_factor)`.
///
/// The match to a generator-level jet is an index into the [`GenJet`] slice of the same
/// event. It is assigned by [`crate::gen_matcher::GenJetMatcher`] and must only be resolved
/// against that slice.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoJet {
    jet: Jet,
    area: f64,
    raw_factor: f64,
    fractions: EnergyFractions,
    jet_id: i32,
    gen_jet: Option<TruthIndex>,
}

impl RecoJet {
    pub fn new(
        jet: Jet,
        area: f64,
        raw_factor: f64,
        fractions: EnergyFractions,
        jet_id: i32,
    ) -> Self {
        RecoJet {
            jet,
            area,
            raw_factor,
            fractions,
            jet_id,
            gen_jet: None,
        }
    }

    pub fn jet(&self) -> &Jet {
        &self.jet
    }

    pub fn pt(&self) -> GeV {
        self.jet.pt()
    }

    pub fn eta(&self) -> Eta {
        self.jet.eta()
    }

    pub fn phi(&self) -> Phi {
        self.jet.phi()
    }

    pub fn mass(&self) -> GeV {
        self.jet.mass()
    }

    pub fn p4(&self) -> &FourMomentum {
        self.jet.p4()
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn raw_factor(&self) -> f64 {
        self.raw_factor
    }

    /// Factor `1 - raw_factor` bringing the stored kinematics back to raw values.
    pub fn raw_scale(&self) -> f64 {
        1.0 - self.raw_factor
    }

    pub fn fractions(&self) -> &EnergyFractions {
        &self.fractions
    }

    pub fn jet_id(&self) -> i32 {
        self.jet_id
    }

    /// Index of the matched generator-level jet, if any.
    pub fn gen_jet_index(&self) -> Option<TruthIndex> {
        self.gen_jet
    }

    /// Resolve the matched generator-level jet in the event's truth collection.
    ///
    /// Arguments
    /// -----------------
    /// * `gen_jets`: the truth collection the match was computed against.
    ///
    /// Return
    /// ----------
    /// * The matched [`GenJet`], or `None` if the jet is unmatched.
    pub fn gen_jet<'a>(&self, gen_jets: &'a [GenJet]) -> Option<&'a GenJet> {
        self.gen_jet.and_then(|idx| gen_jets.get(idx))
    }

    pub(crate) fn set_gen_jet(&mut self, gen_jet: Option<TruthIndex>) {
        self.gen_jet = gen_jet;
    }
}

impl fmt::Display for RecoJet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}, area = {}, rawFactor = {}, jetId = {}",
            self.jet, self.area, self.raw_factor, self.jet_id
        )?;
        let show = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| v.to_string());
        write!(
            f,
            " chHEF = {}, neHEF = {}, chEmEF = {}, neEmEF = {}, muEF = {}, hfEF = {}, hfmEF = {}",
            show(self.fractions.ch_hef),
            show(self.fractions.ne_hef),
            show(self.fractions.ch_em_ef),
            show(self.fractions.ne_em_ef),
            show(self.fractions.mu_ef),
            show(self.fractions.hf_ef),
            show(self.fractions.hfm_ef),
        )?;
        match self.gen_jet {
            Some(idx) => write!(f, "\n matched to generator-level jet #{idx}"),
            None => write!(f, "\n no generator-level match"),
        }
    }
}
