use std::fmt;

use super::Jet;
use crate::constants::{Eta, GeV, Phi};
use crate::kinematics::FourMomentum;

/// Generator-level jet.
///
/// # Fields
///
/// * `jet` - common kinematics
/// * `area` - catchment area, when stored in the input (usually it is not)
/// * `parton_flavour` - signed PDG id of the matched parton (0 if none)
/// * `hadron_flavour` - flavour of the ghost-matched hadron (0, 4 or 5)
#[derive(Debug, Clone, PartialEq)]
pub struct GenJet {
    jet: Jet,
    area: Option<f64>,
    parton_flavour: i32,
    hadron_flavour: u8,
}

impl GenJet {
    pub fn new(jet: Jet, area: Option<f64>, parton_flavour: i32, hadron_flavour: u8) -> Self {
        GenJet {
            jet,
            area,
            parton_flavour,
            hadron_flavour,
        }
    }

    pub fn jet(&self) -> &Jet {
        &self.jet
    }

    pub fn area(&self) -> Option<f64> {
        self.area
    }

    pub fn parton_flavour(&self) -> i32 {
        self.parton_flavour
    }

    pub fn hadron_flavour(&self) -> u8 {
        self.hadron_flavour
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

    pub fn p4(&self) -> &FourMomentum {
        self.jet.p4()
    }
}

impl fmt::Display for GenJet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, partonFlavour = {}, hadronFlavour = {}",
            self.jet, self.parton_flavour, self.hadron_flavour
        )
    }
}
