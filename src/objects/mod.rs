//! # Physics objects
//!
//! Typed, immutable value objects materialized once per event by the readers in
//! [`crate::readers`]:
//!
//! * [`Jet`] – common kinematics `(pt, eta, phi, mass)` with a derived [`FourMomentum`].
//! * [`RecoJet`] – detector-level jet with catchment area, `rawFactor`, energy fractions,
//!   quality identifier and an optional link to its matched truth jet.
//! * [`GenJet`] – generator-level ("truth") jet with parton and hadron flavour codes.
//! * [`EventInfo`] – event-level scalars (run/lumi/event ids, pileup, vertices, rho, weights).
//!
//! Lifetimes
//! -----------------
//! All objects are rebuilt from the shared buffers on every row and dropped before the next
//! row is read. The reco→truth association is stored as an index into the per-event
//! [`GenJet`] slice, so a [`RecoJet`] never owns a truth jet.
use std::fmt;

use crate::constants::{Eta, GeV, Phi};
use crate::kinematics::FourMomentum;

pub mod event_info;
pub mod gen_jet;
pub mod reco_jet;

pub use event_info::EventInfo;
pub use gen_jet::GenJet;
pub use reco_jet::{EnergyFractions, RecoJet};

/// Kinematic part shared by reconstructed and generator-level jets.
#[derive(Debug, Clone, PartialEq)]
pub struct Jet {
    pt: GeV,
    eta: Eta,
    phi: Phi,
    mass: GeV,
    abs_eta: Eta,
    p4: FourMomentum,
}

impl Jet {
    /// Create a jet and compute its four-momentum once.
    pub fn new(pt: GeV, eta: Eta, phi: Phi, mass: GeV) -> Self {
        Jet {
            pt,
            eta,
            phi,
            mass,
            abs_eta: eta.abs(),
            p4: FourMomentum::from_pt_eta_phi_m(pt, eta, phi, mass),
        }
    }

    pub fn pt(&self) -> GeV {
        self.pt
    }

    pub fn eta(&self) -> Eta {
        self.eta
    }

    pub fn phi(&self) -> Phi {
        self.phi
    }

    pub fn mass(&self) -> GeV {
        self.mass
    }

    pub fn abs_eta(&self) -> Eta {
        self.abs_eta
    }

    pub fn p4(&self) -> &FourMomentum {
        &self.p4
    }
}

impl fmt::Display for Jet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " pT = {}, eta = {}, phi = {}, mass = {}, E = {}, |p| = {}",
            self.pt,
            self.eta,
            self.phi,
            self.mass,
            self.p4.energy(),
            self.p4.p()
        )
    }
}
