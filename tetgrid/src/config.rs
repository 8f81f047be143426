// SPDX-License-Identifier: AGPL-3.0-only

//! Sweep configuration
//!
//! One explicit value carrying the physical and plotting parameters of a
//! (χA, χD) sweep. It is handed to [`crate::grid::GridReconstructor`] and
//! [`crate::trajectory::TrajectoryLinker`] at construction; nothing reads
//! configuration from module-level state.

use crate::error::{Result, SweepError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Acceptance cutoff on a run's best loss.
pub const DEFAULT_LOSS_THRESHOLD: f64 = 0.5;

/// Physical and plotting parameters of one sweep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[must_use]
pub struct SweepConfig {
    /// Donor-acceptor coupling λ
    pub coupling: f64,
    /// Simulated time horizon
    pub max_t: f64,
    /// Total occupation number N
    #[serde(alias = "max_N")]
    pub max_n: usize,
    /// Site frequencies, donor first and acceptor last
    pub omegas: Vec<f64>,
    /// Number of physical sites
    pub sites: usize,
    /// Points per sweep axis (grid is resolution × resolution)
    pub plotting_resolution: usize,
    /// `[min, max]` of the χA axis
    pub chi_a_limits: [f64; 2],
    /// `[min, max]` of the χD axis
    pub chi_d_limits: [f64; 2],
    /// Runs whose best loss is below this are overlaid
    pub loss_threshold: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            coupling: 0.001,
            max_t: 20.0,
            max_n: 12,
            omegas: vec![-3.0, 3.0],
            sites: 2,
            plotting_resolution: 100,
            chi_a_limits: [-4.0, 4.0],
            chi_d_limits: [-4.0, 4.0],
            loss_threshold: DEFAULT_LOSS_THRESHOLD,
        }
    }
}

impl SweepConfig {
    /// Load a configuration from JSON; absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// [`SweepError::MissingFile`] if the file does not exist,
    /// [`SweepError::Config`] if it is not valid JSON or fails [`Self::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let reader = std::io::BufReader::new(
            std::fs::File::open(path).map_err(|e| SweepError::from_io(path, &e))?,
        );
        let config: Self = serde_json::from_reader(reader)
            .map_err(|e| SweepError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the parameters describe a usable sweep.
    ///
    /// # Errors
    ///
    /// [`SweepError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.sites < 2 {
            return Err(SweepError::Config(format!(
                "sites must be at least 2 (donor and acceptor), got {}",
                self.sites
            )));
        }
        if self.omegas.is_empty() {
            return Err(SweepError::Config("omegas must not be empty".into()));
        }
        if self.plotting_resolution == 0 {
            return Err(SweepError::Config(
                "plotting_resolution must be positive".into(),
            ));
        }
        for (name, lims) in [
            ("chi_a_limits", self.chi_a_limits),
            ("chi_d_limits", self.chi_d_limits),
        ] {
            if !lims.iter().all(|v| v.is_finite()) {
                return Err(SweepError::Config(format!("{name} must be finite")));
            }
        }
        if !self.loss_threshold.is_finite() {
            return Err(SweepError::Config("loss_threshold must be finite".into()));
        }
        Ok(())
    }

    /// Donor frequency ωD (first entry of `omegas`).
    #[must_use]
    pub fn omega_d(&self) -> Option<f64> {
        self.omegas.first().copied()
    }

    /// Acceptor frequency ωA (last entry of `omegas`).
    #[must_use]
    pub fn omega_a(&self) -> Option<f64> {
        self.omegas.last().copied()
    }

    /// Donor site index.
    #[must_use]
    pub const fn donor_site(&self) -> usize {
        0
    }

    /// Acceptor site index (the last site).
    #[must_use]
    pub const fn acceptor_site(&self) -> usize {
        self.sites.saturating_sub(1)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_dimer_sweep() {
        let c = SweepConfig::default();
        assert_eq!(c.sites, 2);
        assert_eq!(c.max_n, 12);
        assert_eq!(c.omega_d(), Some(-3.0));
        assert_eq!(c.omega_a(), Some(3.0));
        assert_eq!(c.donor_site(), 0);
        assert_eq!(c.acceptor_site(), 1);
        assert!((c.loss_threshold - 0.5).abs() < f64::EPSILON);
        c.validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{"max_N": 8, "sites": 3, "plotting_resolution": 25}"#;
        let c: SweepConfig = serde_json::from_str(json).unwrap();
        assert_eq!(c.max_n, 8);
        assert_eq!(c.acceptor_site(), 2);
        assert_eq!(c.plotting_resolution, 25);
        assert!((c.coupling - 0.001).abs() < f64::EPSILON);
    }

    #[test]
    fn validate_rejects_single_site() {
        let c = SweepConfig {
            sites: 1,
            ..SweepConfig::default()
        };
        assert!(matches!(c.validate(), Err(SweepError::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_resolution() {
        let c = SweepConfig {
            plotting_resolution: 0,
            ..SweepConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_finite_limits() {
        let c = SweepConfig {
            chi_d_limits: [f64::NAN, 1.0],
            ..SweepConfig::default()
        };
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("chi_d_limits"));
    }

    #[test]
    fn load_reads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        std::fs::write(&path, r#"{"coupling": 0.01, "loss_threshold": 0.25}"#).unwrap();
        let c = SweepConfig::load(&path).unwrap();
        assert!((c.coupling - 0.01).abs() < f64::EPSILON);
        assert!((c.loss_threshold - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn load_reports_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.json");
        assert!(matches!(
            SweepConfig::load(&missing),
            Err(SweepError::MissingFile(_))
        ));
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(SweepConfig::load(&bad), Err(SweepError::Config(_))));
    }
}
