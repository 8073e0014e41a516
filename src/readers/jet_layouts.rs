use super::{CollectionLayout, FieldSpec, ObjectView};
use crate::objects::{EnergyFractions, GenJet, Jet, RecoJet};

const PT: usize = 0;
const ETA: usize = 1;
const PHI: usize = 2;
const MASS: usize = 3;

/// Reconstructed jets: `pt, eta, phi, mass, area, rawFactor, jetId`, plus the seven energy
/// fractions when enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoJetLayout {
    energy_fractions: bool,
}

impl RecoJetLayout {
    const AREA: usize = 4;
    const RAW_FACTOR: usize = 5;
    const JET_ID: usize = 6;
    const FRACTIONS: usize = 7;

    /// Arguments
    /// -----------------
    /// * `energy_fractions`: also read `chHEF, neHEF, chEmEF, neEmEF, muEF, hfEF, hfmEF`.
    ///   They are optional: a partition lacking one of them yields `None` for it.
    pub fn new(energy_fractions: bool) -> Self {
        RecoJetLayout { energy_fractions }
    }

    pub fn energy_fractions(&self) -> bool {
        self.energy_fractions
    }
}

impl CollectionLayout for RecoJetLayout {
    type Object = RecoJet;

    fn fields(&self) -> Vec<FieldSpec> {
        let mut fields = vec![
            FieldSpec::required("pt"),
            FieldSpec::required("eta"),
            FieldSpec::required("phi"),
            FieldSpec::required("mass"),
            FieldSpec::required("area"),
            FieldSpec::required("rawFactor"),
            FieldSpec::required("jetId"),
        ];
        if self.energy_fractions {
            fields.extend(
                ["chHEF", "neHEF", "chEmEF", "neEmEF", "muEF", "hfEF", "hfmEF"]
                    .into_iter()
                    .map(FieldSpec::optional),
            );
        }
        fields
    }

    fn build(&self, view: &ObjectView<'_>) -> RecoJet {
        let value = |q| view.f64(q).unwrap_or_default();
        let fraction = |k: usize| {
            if self.energy_fractions {
                view.f64(Self::FRACTIONS + k)
            } else {
                None
            }
        };
        let fractions = EnergyFractions {
            ch_hef: fraction(0),
            ne_hef: fraction(1),
            ch_em_ef: fraction(2),
            ne_em_ef: fraction(3),
            mu_ef: fraction(4),
            hf_ef: fraction(5),
            hfm_ef: fraction(6),
        };
        RecoJet::new(
            Jet::new(value(PT), value(ETA), value(PHI), value(MASS)),
            value(Self::AREA),
            value(Self::RAW_FACTOR),
            fractions,
            view.i64(Self::JET_ID).unwrap_or_default() as i32,
        )
    }
}

/// Generator-level jets: `pt, eta, phi, mass, partonFlavour, hadronFlavour`, plus `area`
/// when the partition stores it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenJetLayout;

impl GenJetLayout {
    const PARTON_FLAVOUR: usize = 4;
    const HADRON_FLAVOUR: usize = 5;
    const AREA: usize = 6;
}

impl CollectionLayout for GenJetLayout {
    type Object = GenJet;

    fn fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::required("pt"),
            FieldSpec::required("eta"),
            FieldSpec::required("phi"),
            FieldSpec::required("mass"),
            FieldSpec::required("partonFlavour"),
            FieldSpec::required("hadronFlavour"),
            FieldSpec::optional("area"),
        ]
    }

    fn build(&self, view: &ObjectView<'_>) -> GenJet {
        let value = |q| view.f64(q).unwrap_or_default();
        GenJet::new(
            Jet::new(value(PT), value(ETA), value(PHI), value(MASS)),
            view.f64(Self::AREA),
            view.i64(Self::PARTON_FLAVOUR).unwrap_or_default() as i32,
            u8::try_from(view.i64(Self::HADRON_FLAVOUR).unwrap_or_default()).unwrap_or(0),
        )
    }
}
