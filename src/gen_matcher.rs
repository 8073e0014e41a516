//! # Geometric reco ↔ truth matching
//!
//! Every reconstructed jet is associated with at most one generator-level jet: the closest one
//! in `(η, φ)` space, provided it lies strictly within a maximum angular distance and,
//! optionally, carries enough transverse momentum relative to the reconstructed jet.
//!
//! ## Overview
//! -----------------
//! * [`AngularPoint`] – anything with a direction `(η, φ)` and a magnitude (pT).
//! * [`best_matches`] – the O(R·T) nearest-neighbour scan over two point sets.
//! * [`MatchParams`] – validated thresholds, built through [`MatchParams::builder`].
//! * [`GenJetMatcher`] – stores the result of [`best_matches`] on each [`RecoJet`].
//!
//! ## Matching rules
//! -----------------
//! For each reconstructed point, the truth points are scanned in input order and a candidate
//! replaces the running best only if
//!
//! * `ΔR < max_dr` (strict),
//! * `ΔR < best ΔR` so far (strict, so the first of several equidistant candidates wins),
//! * `truth.magnitude / reco.magnitude > min_pt_rel`, when a relative cut is set.
//!
//! Reconstructed points are matched independently: one truth jet may be the best match of
//! several reconstructed jets. Nothing is kept from one call to the next.
//!
//! ## Example
//! -----------------
//! ```rust
//! use jetntuple::gen_matcher::{GenJetMatcher, MatchParams};
//! use jetntuple::objects::{EnergyFractions, GenJet, Jet, RecoJet};
//!
//! let mut reco = vec![RecoJet::new(Jet::new(50.0, 1.0, 0.0, 5.0), 0.5, 0.0, EnergyFractions::default(), 6)];
//! let truth = vec![GenJet::new(Jet::new(48.0, 1.05, 0.02, 4.0), None, 21, 0)];
//!
//! let matcher = GenJetMatcher::new(MatchParams::builder().dr_match(0.2).build().unwrap());
//! matcher.add_gen_jet_match(&mut reco, &truth);
//! assert_eq!(reco[0].gen_jet_index(), Some(0));
//! ```
use crate::constants::TruthIndex;
use crate::jetntuple_errors::JetNtupleError;
use crate::kinematics::delta_r;
use crate::objects::{GenJet, Jet, RecoJet};

/// A point on the `(η, φ)` plane with a magnitude.
pub trait AngularPoint {
    fn eta(&self) -> f64;
    fn phi(&self) -> f64;
    /// Quantity compared by the relative cut, the transverse momentum for jets.
    fn magnitude(&self) -> f64;
}

impl AngularPoint for Jet {
    fn eta(&self) -> f64 {
        Jet::eta(self)
    }

    fn phi(&self) -> f64 {
        Jet::phi(self)
    }

    fn magnitude(&self) -> f64 {
        self.pt()
    }
}

impl AngularPoint for RecoJet {
    fn eta(&self) -> f64 {
        RecoJet::eta(self)
    }

    fn phi(&self) -> f64 {
        RecoJet::phi(self)
    }

    fn magnitude(&self) -> f64 {
        self.pt()
    }
}

impl AngularPoint for GenJet {
    fn eta(&self) -> f64 {
        GenJet::eta(self)
    }

    fn phi(&self) -> f64 {
        GenJet::phi(self)
    }

    fn magnitude(&self) -> f64 {
        self.pt()
    }
}

/// Best truth match of every reconstructed point.
///
/// Arguments
/// -----------------
/// * `reco`: reconstructed points.
/// * `truth`: truth points, in input order.
/// * `max_dr`: exclusive upper bound on the angular distance.
/// * `min_pt_rel`: optional exclusive lower bound on `truth.magnitude / reco.magnitude`.
///
/// Return
/// ----------
/// * One entry per reconstructed point, holding the index of its match in `truth`.
pub fn best_matches<R, T>(
    reco: &[R],
    truth: &[T],
    max_dr: f64,
    min_pt_rel: Option<f64>,
) -> Vec<Option<TruthIndex>>
where
    R: AngularPoint,
    T: AngularPoint,
{
    reco.iter()
        .map(|r| {
            let mut best: Option<(TruthIndex, f64)> = None;
            for (index, t) in truth.iter().enumerate() {
                let dr = delta_r(r.eta(), r.phi(), t.eta(), t.phi());
                let passes_pt_rel =
                    min_pt_rel.map_or(true, |cut| t.magnitude() / r.magnitude() > cut);
                let closer = best.map_or(true, |(_, best_dr)| dr < best_dr);
                if dr < max_dr && closer && passes_pt_rel {
                    best = Some((index, dr));
                }
            }
            best.map(|(index, _)| index)
        })
        .collect()
}

/// Matching thresholds.
///
/// # Fields
///
/// * `dr_match` - maximum angular distance, exclusive
/// * `min_pt_rel` - optional minimum `pT(truth) / pT(reco)`, exclusive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchParams {
    dr_match: f64,
    min_pt_rel: Option<f64>,
}

impl MatchParams {
    pub fn builder() -> MatchParamsBuilder {
        MatchParamsBuilder::new()
    }

    pub fn dr_match(&self) -> f64 {
        self.dr_match
    }

    pub fn min_pt_rel(&self) -> Option<f64> {
        self.min_pt_rel
    }
}

impl Default for MatchParams {
    fn default() -> Self {
        MatchParams {
            dr_match: 0.25,
            min_pt_rel: None,
        }
    }
}

/// Builder for [`MatchParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct MatchParamsBuilder {
    params: MatchParams,
}

impl MatchParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dr_match(mut self, dr_match: f64) -> Self {
        self.params.dr_match = dr_match;
        self
    }

    /// Relative pT cut; a negative value disables it.
    pub fn min_pt_rel(mut self, min_pt_rel: Option<f64>) -> Self {
        self.params.min_pt_rel = min_pt_rel.filter(|cut| *cut >= 0.0);
        self
    }

    /// Finalize the builder.
    ///
    /// Validation rules
    /// -----------------
    /// * `dr_match` must be finite and strictly positive.
    /// * `min_pt_rel`, when set, must be finite.
    pub fn build(self) -> Result<MatchParams, JetNtupleError> {
        let p = &self.params;
        if !(p.dr_match.is_finite() && p.dr_match > 0.0) {
            return Err(JetNtupleError::ConfigurationConflict(format!(
                "dr_match must be > 0, got {}",
                p.dr_match
            )));
        }
        if p.min_pt_rel.is_some_and(|cut| !cut.is_finite()) {
            return Err(JetNtupleError::ConfigurationConflict(
                "min_pt_rel must be finite".into(),
            ));
        }
        Ok(self.params)
    }
}

/// Associates reconstructed jets with generator-level jets.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenJetMatcher {
    params: MatchParams,
}

impl GenJetMatcher {
    pub fn new(params: MatchParams) -> Self {
        GenJetMatcher { params }
    }

    pub fn params(&self) -> &MatchParams {
        &self.params
    }

    /// Store on every reconstructed jet the index of its best generator-level match.
    ///
    /// Any previous association is overwritten; unmatched jets end up with none.
    pub fn add_gen_jet_match(&self, reco_jets: &mut [RecoJet], gen_jets: &[GenJet]) {
        let matches = best_matches(
            &*reco_jets,
            gen_jets,
            self.params.dr_match,
            self.params.min_pt_rel,
        );
        for (jet, gen_jet) in reco_jets.iter_mut().zip(matches) {
            jet.set_gen_jet(gen_jet);
        }
    }
}

#[cfg(test)]
mod gen_matcher_test {
    use std::f64::consts::PI;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::objects::EnergyFractions;

    fn reco(pt: f64, eta: f64, phi: f64) -> RecoJet {
        RecoJet::new(
            Jet::new(pt, eta, phi, 1.0),
            0.5,
            0.0,
            EnergyFractions::default(),
            6,
        )
    }

    fn gen(pt: f64, eta: f64, phi: f64) -> GenJet {
        GenJet::new(Jet::new(pt, eta, phi, 1.0), None, 0, 0)
    }

    #[test]
    fn test_reference_event() {
        let mut reco_jets = vec![reco(50.0, 1.0, 0.0), reco(40.0, -1.0, 1.0)];
        let gen_jets = vec![gen(48.0, 1.05, 0.02), gen(30.0, 3.0, 3.0)];
        GenJetMatcher::new(MatchParams::builder().dr_match(0.2).build().unwrap())
            .add_gen_jet_match(&mut reco_jets, &gen_jets);

        assert_eq!(reco_jets[0].gen_jet_index(), Some(0));
        assert_eq!(reco_jets[1].gen_jet_index(), None);
        assert_eq!(reco_jets[0].gen_jet(&gen_jets), Some(&gen_jets[0]));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let reco_jets = [reco(50.0, 0.0, 0.0)];
        let gen_jets = [gen(50.0, 0.2, 0.0)];
        let dr = delta_r(0.0, 0.0, 0.2, 0.0);
        assert_eq!(best_matches(&reco_jets, &gen_jets, dr, None), vec![None]);
        assert_eq!(
            best_matches(&reco_jets, &gen_jets, dr + 1e-9, None),
            vec![Some(0)]
        );
    }

    #[test]
    fn test_tie_goes_to_first_candidate() {
        let reco_jets = [reco(50.0, 0.0, 0.0)];
        let gen_jets = [gen(50.0, 0.1, 0.0), gen(50.0, -0.1, 0.0), gen(70.0, 0.1, 0.0)];
        assert_eq!(best_matches(&reco_jets, &gen_jets, 0.4, None), vec![Some(0)]);
    }

    #[test]
    fn test_min_pt_rel() {
        let reco_jets = [reco(100.0, 0.0, 0.0)];
        let gen_jets = [gen(20.0, 0.0, 0.01), gen(80.0, 0.0, 0.1)];
        assert_eq!(best_matches(&reco_jets, &gen_jets, 0.4, None), vec![Some(0)]);
        assert_eq!(
            best_matches(&reco_jets, &gen_jets, 0.4, Some(0.5)),
            vec![Some(1)]
        );
    }

    #[test]
    fn test_phi_wrap_around() {
        let reco_jets = [reco(50.0, 0.0, 3.1)];
        let gen_jets = [gen(50.0, 0.0, -3.1)];
        assert_eq!(best_matches(&reco_jets, &gen_jets, 0.2, None), vec![Some(0)]);
    }

    #[test]
    fn test_random_events_stay_within_threshold_and_repeat() {
        let mut rng = StdRng::seed_from_u64(20_240_601);
        let params = MatchParams::builder().dr_match(0.3).build().unwrap();
        let matcher = GenJetMatcher::new(params);

        for _ in 0..200 {
            let n_reco = rng.random_range(0..12);
            let n_gen = rng.random_range(0..12);
            let mut reco_jets: Vec<RecoJet> = (0..n_reco)
                .map(|_| {
                    reco(
                        rng.random_range(10.0..300.0),
                        rng.random_range(-2.5..2.5),
                        rng.random_range(-PI..PI),
                    )
                })
                .collect();
            let gen_jets: Vec<GenJet> = (0..n_gen)
                .map(|_| {
                    gen(
                        rng.random_range(5.0..300.0),
                        rng.random_range(-2.5..2.5),
                        rng.random_range(-PI..PI),
                    )
                })
                .collect();

            let first = best_matches(&reco_jets, &gen_jets, params.dr_match(), None);
            assert_eq!(first.len(), reco_jets.len());
            for (r, m) in reco_jets.iter().zip(&first) {
                if let Some(index) = *m {
                    let t = &gen_jets[index];
                    assert!(delta_r(r.eta(), r.phi(), t.eta(), t.phi()) < params.dr_match());
                }
            }

            let second = best_matches(&reco_jets.clone(), &gen_jets.clone(), params.dr_match(), None);
            assert_eq!(first, second);

            matcher.add_gen_jet_match(&mut reco_jets, &gen_jets);
            let stored: Vec<_> = reco_jets.iter().map(RecoJet::gen_jet_index).collect();
            assert_eq!(stored, first);
            matcher.add_gen_jet_match(&mut reco_jets, &gen_jets);
            assert_eq!(
                reco_jets.iter().map(RecoJet::gen_jet_index).collect::<Vec<_>>(),
                stored
            );
        }
    }

    #[test]
    fn test_builder_validation() {
        assert!(MatchParams::builder().dr_match(0.0).build().is_err());
        assert!(MatchParams::builder().dr_match(f64::NAN).build().is_err());
        let params = MatchParams::builder()
            .min_pt_rel(Some(-1.0))
            .build()
            .unwrap();
        assert_eq!(params.min_pt_rel(), None);
        assert_eq!(params.dr_match(), 0.25);
    }
}
