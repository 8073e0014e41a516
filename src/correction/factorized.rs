//! Factorized L1 → L2 → L3 jet energy corrections read from CSV tables.
//!
//! Each level is a table of `(eta, pt)` bins:
//!
//! ```text
//! eta_min,eta_max,pt_min,pt_max,scale,slope,offset
//! -5.0,0.0,10.0,3000.0,1.02,0.01,0.0
//! 0.0,5.0,10.0,3000.0,1.03,0.01,0.0
//! ```
//!
//! The factor of a level at `(pt, eta, area, rho)` is
//! `max(0, scale + slope·log10(pt_c) − offset·rho·area/pt_c)` with `pt_c` the `pt` clamped to
//! the bin's `[pt_min, pt_max]`. The first row with `eta_min ≤ eta < eta_max` is used; an
//! `eta` outside every row gives a factor of `1`.
//!
//! Levels are chained: each one is evaluated at the `pt` corrected by the previous ones, and
//! the total correction is the product of the level factors.
use std::fmt;
use std::fs::File;
use std::io;

use camino::Utf8Path;
use serde::Deserialize;

use super::{CorrectionInput, JetCorrector};
use crate::jetntuple_errors::JetNtupleError;

/// Step of the factorized correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CorrectionLevelKind {
    /// L1: pileup offset
    L1Offset,
    /// L2: relative, flattens the response in eta
    L2Relative,
    /// L3: absolute, flattens the response in pt
    L3Absolute,
}

impl CorrectionLevelKind {
    /// Parse a level string such as `"l1l2l3"` or `"L2L3"`.
    ///
    /// Return
    /// ----------
    /// * The levels in application order (always L1, L2, L3 order). An empty string gives no
    ///   level, meaning corrections are disabled.
    /// * [`JetNtupleError::ConfigurationConflict`] on an unknown or repeated token.
    pub fn parse_levels(levels: &str) -> Result<Vec<CorrectionLevelKind>, JetNtupleError> {
        let normalized = levels.trim().to_ascii_lowercase();
        let mut rest = normalized.as_str();
        let mut kinds = Vec::new();
        while !rest.is_empty() {
            let kind = match rest.get(..2) {
                Some("l1") => CorrectionLevelKind::L1Offset,
                Some("l2") => CorrectionLevelKind::L2Relative,
                Some("l3") => CorrectionLevelKind::L3Absolute,
                _ => {
                    return Err(JetNtupleError::ConfigurationConflict(format!(
                        "invalid jet correction levels '{levels}'"
                    )))
                }
            };
            if kinds.contains(&kind) {
                return Err(JetNtupleError::ConfigurationConflict(format!(
                    "jet correction level {kind} requested twice in '{levels}'"
                )));
            }
            kinds.push(kind);
            rest = &rest[2..];
        }
        kinds.sort();
        Ok(kinds)
    }
}

impl fmt::Display for CorrectionLevelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectionLevelKind::L1Offset => f.write_str("L1"),
            CorrectionLevelKind::L2Relative => f.write_str("L2"),
            CorrectionLevelKind::L3Absolute => f.write_str("L3"),
        }
    }
}

/// One `(eta, pt)` bin of a correction table.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CorrectionBin {
    pub eta_min: f64,
    pub eta_max: f64,
    pub pt_min: f64,
    pub pt_max: f64,
    pub scale: f64,
    pub slope: f64,
    pub offset: f64,
}

impl CorrectionBin {
    fn contains_eta(&self, eta: f64) -> bool {
        self.eta_min <= eta && eta < self.eta_max
    }

    fn factor(&self, pt: f64, area: f64, rho: f64) -> f64 {
        let pt_c = pt.clamp(self.pt_min, self.pt_max);
        (self.scale + self.slope * pt_c.log10() - self.offset * rho * area / pt_c).max(0.0)
    }
}

/// One correction level and its table.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionLevel {
    kind: CorrectionLevelKind,
    bins: Vec<CorrectionBin>,
}

impl CorrectionLevel {
    /// Validate and wrap a table.
    ///
    /// Every bin needs `eta_min < eta_max` and `0 < pt_min ≤ pt_max`.
    pub fn new(kind: CorrectionLevelKind, bins: Vec<CorrectionBin>) -> Result<Self, JetNtupleError> {
        if let Some((row, _)) = bins.iter().enumerate().find(|(_, b)| {
            !(b.eta_min < b.eta_max && b.pt_min > 0.0 && b.pt_min <= b.pt_max)
        }) {
            return Err(JetNtupleError::ConfigurationConflict(format!(
                "{kind} correction table: invalid bin at row {row}"
            )));
        }
        Ok(CorrectionLevel { kind, bins })
    }

    /// Read a CSV table with a header line.
    pub fn from_reader<R: io::Read>(
        kind: CorrectionLevelKind,
        reader: R,
    ) -> Result<Self, JetNtupleError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);
        let bins = csv_reader
            .deserialize::<CorrectionBin>()
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(kind, bins)
    }

    pub fn from_path(kind: CorrectionLevelKind, path: &Utf8Path) -> Result<Self, JetNtupleError> {
        let file = File::open(path).map_err(|err| {
            JetNtupleError::ConfigurationConflict(format!(
                "unable to open {kind} correction table '{path}': {err}"
            ))
        })?;
        Self::from_reader(kind, file)
    }

    pub fn kind(&self) -> CorrectionLevelKind {
        self.kind
    }

    pub fn bins(&self) -> &[CorrectionBin] {
        &self.bins
    }

    /// Factor of this level, `1` if `eta` is outside the table.
    pub fn factor(&self, pt: f64, eta: f64, area: f64, rho: f64) -> f64 {
        self.bins
            .iter()
            .find(|b| b.contains_eta(eta))
            .map_or(1.0, |b| b.factor(pt, area, rho))
    }
}

/// Chain of correction levels applied in order.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorizedCorrector {
    levels: Vec<CorrectionLevel>,
}

impl FactorizedCorrector {
    /// Return
    /// ----------
    /// * [`JetNtupleError::ConfigurationConflict`] if `levels` is empty.
    pub fn new(mut levels: Vec<CorrectionLevel>) -> Result<Self, JetNtupleError> {
        if levels.is_empty() {
            return Err(JetNtupleError::ConfigurationConflict(
                "a factorized jet corrector needs at least one correction level".into(),
            ));
        }
        levels.sort_by_key(CorrectionLevel::kind);
        Ok(FactorizedCorrector { levels })
    }

    /// Load one table per level.
    ///
    /// Arguments
    /// -----------------
    /// * `tables`: level kind and CSV path of each level.
    pub fn from_tables<'a, I>(tables: I) -> Result<Self, JetNtupleError>
    where
        I: IntoIterator<Item = (CorrectionLevelKind, &'a Utf8Path)>,
    {
        let levels = tables
            .into_iter()
            .map(|(kind, path)| CorrectionLevel::from_path(kind, path))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(levels)
    }

    pub fn levels(&self) -> &[CorrectionLevel] {
        &self.levels
    }
}

impl JetCorrector for FactorizedCorrector {
    fn correction(&self, input: &CorrectionInput) -> f64 {
        let mut pt = input.pt;
        let mut total = 1.0;
        for level in &self.levels {
            let factor = level.factor(pt, input.eta, input.area, input.rho);
            total *= factor;
            pt *= factor;
        }
        total
    }
}

#[cfg(test)]
mod factorized_test {
    use approx::assert_relative_eq;

    use super::*;

    const L1: &str = "eta_min,eta_max,pt_min,pt_max,scale,slope,offset\n\
                      -5.0,5.0,1.0,5000.0,1.0,0.0,0.01\n";
    const L2: &str = "eta_min, eta_max, pt_min, pt_max, scale, slope, offset\n\
                      # barrel\n\
                      -1.3, 1.3, 10.0, 1000.0, 1.1, 0.0, 0.0\n\
                      1.3, 5.0, 10.0, 1000.0, 1.0, 0.1, 0.0\n";

    #[test]
    fn test_parse_levels() {
        use CorrectionLevelKind::*;
        assert_eq!(
            CorrectionLevelKind::parse_levels("l1l2l3").unwrap(),
            vec![L1Offset, L2Relative, L3Absolute]
        );
        assert_eq!(
            CorrectionLevelKind::parse_levels("L3L2").unwrap(),
            vec![L2Relative, L3Absolute]
        );
        assert!(CorrectionLevelKind::parse_levels("").unwrap().is_empty());
        assert!(CorrectionLevelKind::parse_levels("l1l4").is_err());
        assert!(CorrectionLevelKind::parse_levels("l2l2").is_err());
    }

    #[test]
    fn test_level_factor() {
        let l2 = CorrectionLevel::from_reader(CorrectionLevelKind::L2Relative, L2.as_bytes())
            .unwrap();
        assert_eq!(l2.bins().len(), 2);
        assert_relative_eq!(l2.factor(50.0, 0.2, 0.5, 10.0), 1.1, epsilon = 1e-12);
        // pt clamped to the upper edge of the bin
        assert_relative_eq!(l2.factor(1.0e4, 2.0, 0.5, 10.0), 1.3, epsilon = 1e-12);
        assert_eq!(l2.factor(50.0, 6.0, 0.5, 10.0), 1.0);
    }

    #[test]
    fn test_chained_levels() {
        let corrector = FactorizedCorrector::new(vec![
            CorrectionLevel::from_reader(CorrectionLevelKind::L2Relative, L2.as_bytes()).unwrap(),
            CorrectionLevel::from_reader(CorrectionLevelKind::L1Offset, L1.as_bytes()).unwrap(),
        ])
        .unwrap();
        assert_eq!(
            corrector.levels()[0].kind(),
            CorrectionLevelKind::L1Offset
        );

        let input = CorrectionInput {
            pt: 100.0,
            eta: 0.5,
            area: 0.5,
            rho: 20.0,
        };
        let l1 = 1.0 - 0.01 * 20.0 * 0.5 / 100.0;
        assert_relative_eq!(corrector.correction(&input), l1 * 1.1, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_tables() {
        assert!(FactorizedCorrector::new(Vec::new()).is_err());
        let bad = "eta_min,eta_max,pt_min,pt_max,scale,slope,offset\n1.0,-1.0,10.0,20.0,1.0,0.0,0.0\n";
        assert!(CorrectionLevel::from_reader(CorrectionLevelKind::L3Absolute, bad.as_bytes()).is_err());
        let short = "eta_min,eta_max\n0.0,1.0\n";
        assert!(matches!(
            CorrectionLevel::from_reader(CorrectionLevelKind::L3Absolute, short.as_bytes()),
            Err(JetNtupleError::CsvError(_))
        ));
    }
}
