use std::fmt;

/// Event-level quantities.
///
/// Run, luminosity section and event id are always read. The remaining quantities come from
/// configurable fields and are `None` when the configuration does not name a source for them.
///
/// # Fields
///
/// * `run` - run number
/// * `lumi` - luminosity-section id
/// * `event` - event id
/// * `num_pu` - actual number of pileup interactions
/// * `num_pu_true` - expected number of pileup interactions (mean of the Poisson distribution)
/// * `num_vertices` - number of reconstructed collision vertices
/// * `vertex_z` - position of the hard-scatter vertex along the beam
/// * `rho` - ambient energy density of the event
/// * `weight` - Monte-Carlo generator weight
/// * `pt_hat` - generator pT-hat scale
/// * `pu_density` - pileup vertices per mm
/// * `gen_pu_density` - generator-level pileup vertices per mm
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventInfo {
    pub run: u32,
    pub lumi: u32,
    pub event: u64,
    pub num_pu: Option<i32>,
    pub num_pu_true: Option<f64>,
    pub num_vertices: Option<i32>,
    pub vertex_z: Option<f64>,
    pub rho: Option<f64>,
    pub weight: Option<f64>,
    pub pt_hat: Option<f64>,
    pub pu_density: Option<f64>,
    pub gen_pu_density: Option<f64>,
}

impl EventInfo {
    /// Ambient density passed to the correction stage; `0` when not read.
    pub fn rho_or_zero(&self) -> f64 {
        self.rho.unwrap_or(0.0)
    }

    /// Weight used for the weighted event and jet counts; unit weight when not read.
    pub fn weight_or_unit(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }
}

impl fmt::Display for EventInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn show<T: fmt::Display>(v: Option<T>) -> String {
            v.map_or_else(|| "n/a".to_string(), |v| v.to_string())
        }
        writeln!(
            f,
            "run = {}, ls = {}, event = {}:",
            self.run, self.lumi, self.event
        )?;
        writeln!(
            f,
            " numPU: actual = {}, true = {}",
            show(self.num_pu),
            show(self.num_pu_true)
        )?;
        writeln!(f, " rho = {}", show(self.rho))?;
        writeln!(
            f,
            " pudensity = {}, gpudensity = {}",
            show(self.pu_density),
            show(self.gen_pu_density)
        )?;
        write!(
            f,
            "(weight = {}, pThat = {})",
            show(self.weight),
            show(self.pt_hat)
        )
    }
}
