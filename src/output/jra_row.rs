//! Fixed JRA ntuple layout.
//!
//! One row per event: event-level scalars, a handful of single-entry pileup lists, then one
//! list column per jet quantity holding the emitted jets in re-ranked order. Reference (`ref*`)
//! columns describe the matched generator-level jet, `jt*` columns the corrected
//! reconstructed jet.
use arrow_schema::SchemaRef;
use tracing::warn;

use super::{OutputRow, OutputValue};
use crate::correction::Correction;
use crate::kinematics::{delta_phi, delta_r};
use crate::objects::{EventInfo, GenJet, RecoJet};

const BIT_DEFAULT: u32 = 1 << 0;
const BIT_FLAVOUR_DEFS: u32 = 1 << 2;
const BIT_EM_FRACTION: u32 = 1 << 5;
const BIT_ENERGY_FRACTIONS: u32 = 1 << 6;
const SUPPORTED_BITS: u32 = BIT_DEFAULT | BIT_FLAVOUR_DEFS | BIT_EM_FRACTION | BIT_ENERGY_FRACTIONS;

/// Bit mask selecting optional output columns.
///
/// * bit 0 – default columns, always on. These include `refdphijt` and `refdrjt`, which no
///   flag turns off.
/// * bit 2 – `refpdgid_algorithmicDef`, `refpdgid_physicsDef`
/// * bit 5 – `jtemf`
/// * bit 6 – `jtchf`, `jtnhf`, `jtnef`, `jtcef`, `jtmuf`, `jthfhf`, `jthfef`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFlags(u32);

impl OutputFlags {
    /// Keep the supported bits of `bits`, warning about the others.
    pub fn from_bits(bits: u32) -> Self {
        let ignored = bits & !SUPPORTED_BITS;
        if ignored != 0 {
            warn!("Output flag bits {ignored:#b} are not supported and will be ignored");
        }
        OutputFlags((bits & SUPPORTED_BITS) | BIT_DEFAULT)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn flavour_definitions(&self) -> bool {
        self.0 & BIT_FLAVOUR_DEFS != 0
    }

    pub fn em_fraction(&self) -> bool {
        self.0 & BIT_EM_FRACTION != 0
    }

    pub fn energy_fractions(&self) -> bool {
        self.0 & BIT_ENERGY_FRACTIONS != 0
    }
}

impl Default for OutputFlags {
    fn default() -> Self {
        OutputFlags(SUPPORTED_BITS)
    }
}

/// An emitted jet: the reconstructed jet, its matched truth jet and its correction.
#[derive(Debug, Clone, Copy)]
pub struct JraJet<'a> {
    pub reco: &'a RecoJet,
    pub gen: &'a GenJet,
    pub correction: Correction,
}

/// Builds [`OutputRow`]s with the JRA layout selected by [`OutputFlags`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JraRowBuilder {
    flags: OutputFlags,
}

fn f32_list(jets: &[JraJet], value: impl Fn(&JraJet) -> Option<f64>) -> OutputValue {
    OutputValue::Float32List(jets.iter().map(|j| value(j).map(|v| v as f32)).collect())
}

impl JraRowBuilder {
    pub fn new(flags: OutputFlags) -> Self {
        JraRowBuilder { flags }
    }

    pub fn flags(&self) -> OutputFlags {
        self.flags
    }

    /// Arrow schema of the rows built by this builder.
    pub fn arrow_schema(&self) -> SchemaRef {
        self.build(&EventInfo::default(), &[]).arrow_schema()
    }

    /// Flatten one event and its emitted jets.
    ///
    /// Arguments
    /// -----------------
    /// * `event`: event-level record of the row.
    /// * `jets`: emitted jets, in output order; their position becomes `refrank`.
    ///
    /// Return
    /// ----------
    /// * The output row. Event quantities that were not read are written as nulls.
    pub fn build(&self, event: &EventInfo, jets: &[JraJet]) -> OutputRow {
        let f32_opt = |v: Option<f64>| OutputValue::Float32(v.map(|v| v as f32));
        let mut row = OutputRow::with_capacity(48);

        row.push("npus", OutputValue::Int32List(vec![event.num_pu]));
        row.push(
            "tnpus",
            OutputValue::Float32List(vec![event.num_pu_true.map(|v| v as f32)]),
        );
        row.push("bxns", OutputValue::Int32List(vec![Some(0)]));
        row.push("sumpt_lowpt", OutputValue::Float32List(vec![Some(0.0)]));
        row.push("sumpt_highpt", OutputValue::Float32List(vec![Some(0.0)]));
        row.push("ntrks_lowpt", OutputValue::Int32List(vec![Some(0)]));
        row.push("ntrks_highpt", OutputValue::Int32List(vec![Some(0)]));
        row.push("rho", f32_opt(event.rho));
        row.push("pthat", f32_opt(event.pt_hat));
        row.push("weight", f32_opt(event.weight));
        row.push("refpvz", f32_opt(event.vertex_z));
        row.push("npv", OutputValue::Int32(event.num_vertices));
        row.push("run", OutputValue::UInt32(event.run));
        row.push("lumi", OutputValue::UInt32(event.lumi));
        row.push("evt", OutputValue::UInt64(event.event));
        row.push("pudensity", f32_opt(event.pu_density));
        row.push("gpudensity", f32_opt(event.gen_pu_density));
        row.push("refdzvtx", OutputValue::Float32List(vec![Some(0.0)]));
        row.push("nref", OutputValue::UInt32(jets.len() as u32));

        row.push(
            "refrank",
            OutputValue::Int32List((0..jets.len()).map(|i| Some(i as i32)).collect()),
        );
        let pdgid = || {
            OutputValue::Int32List(jets.iter().map(|j| Some(j.gen.parton_flavour())).collect())
        };
        row.push("refpdgid", pdgid());
        if self.flags.flavour_definitions() {
            row.push("refpdgid_algorithmicDef", pdgid());
            row.push("refpdgid_physicsDef", pdgid());
        }

        row.push("refe", f32_list(jets, |j| Some(j.gen.p4().energy())));
        row.push("refpt", f32_list(jets, |j| Some(j.gen.pt())));
        row.push("refeta", f32_list(jets, |j| Some(j.gen.eta())));
        row.push("refphi", f32_list(jets, |j| Some(j.gen.phi())));
        row.push("refy", f32_list(jets, |j| Some(j.gen.p4().rapidity())));
        row.push(
            "refdphijt",
            f32_list(jets, |j| Some(delta_phi(j.gen.phi(), j.reco.phi()))),
        );
        row.push(
            "refdrjt",
            f32_list(jets, |j| {
                Some(delta_r(j.gen.eta(), j.gen.phi(), j.reco.eta(), j.reco.phi()))
            }),
        );
        row.push(
            "refarea",
            f32_list(jets, |j| Some(j.gen.area().unwrap_or(0.0))),
        );

        row.push("jte", f32_list(jets, |j| Some(j.correction.p4.energy())));
        row.push("jtpt", f32_list(jets, |j| Some(j.correction.pt)));
        row.push("jteta", f32_list(jets, |j| Some(j.reco.eta())));
        row.push("jtphi", f32_list(jets, |j| Some(j.reco.phi())));
        row.push("jty", f32_list(jets, |j| Some(j.correction.p4.rapidity())));
        row.push("jtjec", f32_list(jets, |j| Some(j.correction.scale)));
        row.push("jtarea", f32_list(jets, |j| Some(j.reco.area())));

        if self.flags.em_fraction() {
            row.push("jtemf", f32_list(jets, |_| Some(0.0)));
        }
        if self.flags.energy_fractions() {
            row.push("jtchf", f32_list(jets, |j| j.reco.fractions().ch_hef));
            row.push("jtnhf", f32_list(jets, |j| j.reco.fractions().ne_hef));
            row.push("jtnef", f32_list(jets, |j| j.reco.fractions().ne_em_ef));
            row.push("jtcef", f32_list(jets, |j| j.reco.fractions().ch_em_ef));
            row.push("jtmuf", f32_list(jets, |j| j.reco.fractions().mu_ef));
            row.push("jthfhf", f32_list(jets, |j| j.reco.fractions().hf_ef));
            row.push("jthfef", f32_list(jets, |j| j.reco.fractions().hfm_ef));
        }
        row
    }
}
