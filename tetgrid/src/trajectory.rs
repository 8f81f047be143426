// SPDX-License-Identifier: AGPL-3.0-only

//! Optimizer-run linking
//!
//! Each optimizer run leaves a directory of text records. This module finds
//! those directories under a sweep root, keeps the runs whose best loss beats
//! the acceptance threshold, and turns each survivor's per-site trajectories
//! into a path over the (χD, χA) plane for overlay on the min N grid.
//!
//! # Layout
//!
//! ```text
//! <root>/iteration_*/data_optimizer_*/
//!     losses.txt            loss per optimization step
//!     init_chis.txt         initial guess, one component per line
//!     optimalvars.txt       final parameter vector
//!     x{site}trajectory.txt that site's χ per step
//! ```

use crate::config::{SweepConfig, DEFAULT_LOSS_THRESHOLD};
use crate::error::{Result, SweepError};
use crate::grid::series_minimum;
use crate::records;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Loss history file.
pub const LOSSES_FILE: &str = "losses.txt";
/// Initial guess file.
pub const INIT_CHIS_FILE: &str = "init_chis.txt";
/// Final optimized parameters file.
pub const OPTIMAL_VARS_FILE: &str = "optimalvars.txt";
/// Prefix of iteration directories under a sweep root.
pub const ITERATION_PREFIX: &str = "iteration_";
/// Prefix of run directories under an iteration.
pub const OPTIMIZER_PREFIX: &str = "data_optimizer_";

/// `x{site}trajectory.txt`
#[must_use]
pub fn trajectory_file_name(site: usize) -> String {
    format!("x{site}trajectory.txt")
}

// ═══════════════════════════════════════════════════════════════════
//  Run directories
// ═══════════════════════════════════════════════════════════════════

/// One optimizer run's artifact directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    /// Wrap a path without touching the filesystem.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Wrap a path that must be an existing directory.
    ///
    /// # Errors
    ///
    /// [`SweepError::MissingFile`] if absent, [`SweepError::TypeMismatch`] if
    /// it is not a directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        require_dir(&path)?;
        Ok(Self { path })
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, for reports.
    #[must_use]
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |n| n.to_string_lossy().into_owned())
    }

    /// Full loss history.
    ///
    /// # Errors
    ///
    /// [`SweepError::MissingFile`] if `losses.txt` is absent, parse errors otherwise.
    pub fn loss_history(&self) -> Result<LossHistory> {
        records::read_scalar_series(&self.path.join(LOSSES_FILE)).map(LossHistory::new)
    }

    /// Minimum recorded loss.
    ///
    /// # Errors
    ///
    /// As [`Self::loss_history`], plus [`SweepError::InvalidInput`] for an empty history.
    pub fn best_loss(&self) -> Result<f64> {
        self.loss_history()?.best().map_err(|e| self.tag(e))
    }

    /// Initial guess vector.
    ///
    /// # Errors
    ///
    /// Read errors for `init_chis.txt`.
    pub fn initial_guess(&self) -> Result<Vec<f64>> {
        records::read_scalar_series(&self.path.join(INIT_CHIS_FILE))
    }

    /// Final optimized parameter vector.
    ///
    /// # Errors
    ///
    /// Read errors for `optimalvars.txt`.
    pub fn optimal_vars(&self) -> Result<Vec<f64>> {
        records::read_scalar_series(&self.path.join(OPTIMAL_VARS_FILE))
    }

    /// One site's χ value per optimization step.
    ///
    /// # Errors
    ///
    /// Read errors for `x{site}trajectory.txt`.
    pub fn trajectory(&self, site: usize) -> Result<Vec<f64>> {
        records::read_scalar_series(&self.path.join(trajectory_file_name(site)))
    }

    fn tag(&self, err: SweepError) -> SweepError {
        match err {
            SweepError::InvalidInput(msg) => {
                SweepError::InvalidInput(format!("{}: {msg}", self.path.display()))
            }
            other => other,
        }
    }
}

fn require_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(SweepError::MissingFile(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(SweepError::TypeMismatch(format!(
            "{} is not a directory",
            path.display()
        )));
    }
    Ok(())
}

/// Loss per optimization step.
#[derive(Clone, Debug, PartialEq)]
pub struct LossHistory {
    values: Vec<f64>,
}

impl LossHistory {
    /// Wrap recorded losses.
    #[must_use]
    pub const fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// All recorded losses.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Best (minimum) loss.
    ///
    /// # Errors
    ///
    /// [`SweepError::InvalidInput`] if empty or NaN-tainted.
    pub fn best(&self) -> Result<f64> {
        series_minimum(&self.values).map_err(|e| match e {
            SweepError::InvalidInput(msg) => {
                SweepError::InvalidInput(format!("loss history: {msg}"))
            }
            other => other,
        })
    }

    /// Last recorded loss.
    #[must_use]
    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// History without its first entry (the initial-guess evaluation).
    #[must_use]
    pub fn tail(&self) -> &[f64] {
        self.values.get(1..).unwrap_or(&[])
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Discovery
// ═══════════════════════════════════════════════════════════════════

/// Which run directories to consider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunScope {
    /// Every `iteration_*/data_optimizer_*` run under a sweep root.
    Sweep(PathBuf),
    /// One named run directory.
    Single(PathBuf),
}

/// Runs grouped under one iteration directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IterationRuns {
    /// Iteration directory name (`iteration_3`), or the run's parent name for
    /// a single-run scope.
    pub name: String,
    /// Runs in natural order.
    pub runs: Vec<RunDirectory>,
}

/// Sort key putting `prefix2` before `prefix10`.
fn natural_key(name: &str, prefix: &str) -> (u64, String) {
    let index = name
        .strip_prefix(prefix)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(u64::MAX);
    (index, name.to_string())
}

/// Subdirectories of `dir` whose names start with `prefix`, naturally sorted.
fn prefixed_subdirs(dir: &Path, prefix: &str) -> Result<Vec<(String, PathBuf)>> {
    require_dir(dir)?;
    let entries = std::fs::read_dir(dir).map_err(|e| SweepError::from_io(dir, &e))?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SweepError::from_io(dir, &e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().into_string().map_err(|raw| {
            SweepError::TypeMismatch(format!(
                "directory name {} in {} is not valid UTF-8",
                raw.to_string_lossy(),
                dir.display()
            ))
        })?;
        if name.starts_with(prefix) {
            found.push((name, path));
        }
    }
    found.sort_by_cached_key(|(name, _)| natural_key(name, prefix));
    Ok(found)
}

/// Enumerate the runs in `scope`, grouped by iteration.
///
/// # Errors
///
/// [`SweepError::MissingFile`] / [`SweepError::TypeMismatch`] if a scope path
/// is absent or not a directory; directory-listing I/O errors.
pub fn discover_runs(scope: &RunScope) -> Result<Vec<IterationRuns>> {
    match scope {
        RunScope::Single(path) => {
            let run = RunDirectory::open(path.clone())?;
            let name = path
                .parent()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(vec![IterationRuns {
                name,
                runs: vec![run],
            }])
        }
        RunScope::Sweep(root) => {
            let mut groups = Vec::new();
            for (name, iteration) in prefixed_subdirs(root, ITERATION_PREFIX)? {
                let runs = prefixed_subdirs(&iteration, OPTIMIZER_PREFIX)?
                    .into_iter()
                    .map(|(_, p)| RunDirectory::new(p))
                    .collect::<Vec<_>>();
                debug!(iteration = %name, runs = runs.len(), "discovered iteration");
                groups.push(IterationRuns { name, runs });
            }
            Ok(groups)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Selection
// ═══════════════════════════════════════════════════════════════════

/// Keep the runs whose best loss is strictly below `loss_threshold`.
///
/// Output preserves input order. Evaluation stops at the first run whose
/// loss history cannot be read, so no run is ever dropped silently.
///
/// # Errors
///
/// [`SweepError::MissingFile`] for a run without `losses.txt`,
/// [`SweepError::InvalidInput`] for an empty history, parse errors otherwise.
pub fn select_successful_runs(
    runs: &[RunDirectory],
    loss_threshold: f64,
) -> Result<Vec<RunDirectory>> {
    Ok(select_scored_runs(runs, loss_threshold)?
        .into_iter()
        .map(|(run, _)| run)
        .collect())
}

/// As [`select_successful_runs`], pairing each kept run with its best loss.
///
/// Every `losses.txt` is read exactly once.
///
/// # Errors
///
/// As [`select_successful_runs`].
pub fn select_scored_runs(
    runs: &[RunDirectory],
    loss_threshold: f64,
) -> Result<Vec<(RunDirectory, f64)>> {
    let mut accepted = Vec::new();
    for run in runs {
        let best = run.best_loss()?;
        if best < loss_threshold {
            accepted.push((run.clone(), best));
        } else {
            debug!(run = %run.path().display(), best, loss_threshold, "run rejected");
        }
    }
    info!(
        accepted = accepted.len(),
        total = runs.len(),
        loss_threshold,
        "selected optimizer runs"
    );
    Ok(accepted)
}

/// Best-loss evaluation of one run.
#[derive(Debug)]
pub struct RunOutcome {
    /// The run evaluated.
    pub run: RunDirectory,
    /// Its minimum loss, or why it could not be determined.
    pub best_loss: Result<f64>,
}

impl RunOutcome {
    /// Whether the run loaded and beat `loss_threshold`.
    #[must_use]
    pub fn accepted(&self, loss_threshold: f64) -> bool {
        matches!(self.best_loss, Ok(best) if best < loss_threshold)
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Paths
// ═══════════════════════════════════════════════════════════════════

/// A point in the (χD, χA) plane.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ChiPoint {
    /// Donor nonlinearity χD
    pub chi_d: f64,
    /// Acceptor nonlinearity χA
    pub chi_a: f64,
}

/// Direction marker placed at the midpoint of one optimizer step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Arrow {
    /// Midpoint of the step.
    pub midpoint: ChiPoint,
    /// Unit step along χD (0 for a zero-length step).
    pub d_chi_d: f64,
    /// Unit step along χA (0 for a zero-length step).
    pub d_chi_a: f64,
}

/// An optimizer run's walk through (χD, χA)-space.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunPath {
    /// One point per optimization step, in step order.
    pub points: Vec<ChiPoint>,
    /// Initial guess: χD from the first and χA from the last `init_chis` entry.
    pub initial: ChiPoint,
}

impl RunPath {
    /// Normalized direction of every consecutive step.
    ///
    /// A path with fewer than two points has no steps and yields an empty list.
    #[must_use]
    pub fn arrows(&self) -> Vec<Arrow> {
        self.points
            .windows(2)
            .map(|w| {
                let du = w[1].chi_d - w[0].chi_d;
                let dv = w[1].chi_a - w[0].chi_a;
                let norm = du.hypot(dv);
                let (d_chi_d, d_chi_a) = if norm > 0.0 {
                    (du / norm, dv / norm)
                } else {
                    (0.0, 0.0)
                };
                Arrow {
                    midpoint: ChiPoint {
                        chi_d: du.mul_add(0.5, w[0].chi_d),
                        chi_a: dv.mul_add(0.5, w[0].chi_a),
                    },
                    d_chi_d,
                    d_chi_a,
                }
            })
            .collect()
    }

    /// Last visited point, if any.
    #[must_use]
    pub fn endpoint(&self) -> Option<ChiPoint> {
        self.points.last().copied()
    }
}

/// Read a run's acceptor and donor trajectories and its initial guess.
///
/// # Errors
///
/// Read errors for any of the three files; [`SweepError::Shape`] if the two
/// trajectories have different step counts; [`SweepError::InvalidInput`] if
/// `init_chis.txt` is empty.
pub fn extract_path(
    run: &RunDirectory,
    acceptor_site_index: usize,
    donor_site_index: usize,
) -> Result<RunPath> {
    let acceptor = run.trajectory(acceptor_site_index)?;
    let donor = run.trajectory(donor_site_index)?;
    if acceptor.len() != donor.len() {
        return Err(SweepError::Shape(format!(
            "{}: {} has {} steps but {} has {}",
            run.path().display(),
            trajectory_file_name(acceptor_site_index),
            acceptor.len(),
            trajectory_file_name(donor_site_index),
            donor.len()
        )));
    }

    let init = run.initial_guess()?;
    let (Some(&first), Some(&last)) = (init.first(), init.last()) else {
        return Err(SweepError::InvalidInput(format!(
            "{}: {INIT_CHIS_FILE} is empty",
            run.path().display()
        )));
    };

    let points = donor
        .into_iter()
        .zip(acceptor)
        .map(|(chi_d, chi_a)| ChiPoint { chi_d, chi_a })
        .collect();
    Ok(RunPath {
        points,
        initial: ChiPoint {
            chi_d: first,
            chi_a: last,
        },
    })
}

/// A run's optimized parameters and the loss it finished on.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptimalPoint {
    /// Run the optimum came from.
    pub run: PathBuf,
    /// `optimalvars.txt`, one χ per site.
    pub chis: Vec<f64>,
    /// Last entry of `losses.txt`.
    pub final_loss: f64,
}

/// Optimum and final loss of every run, in input order.
///
/// # Errors
///
/// Read errors for either file; [`SweepError::InvalidInput`] for an empty
/// loss history.
pub fn collect_optimal_points(runs: &[RunDirectory]) -> Result<Vec<OptimalPoint>> {
    runs.iter()
        .map(|run| -> Result<OptimalPoint> {
            let chis = run.optimal_vars()?;
            let final_loss = run.loss_history()?.last().ok_or_else(|| {
                SweepError::InvalidInput(format!(
                    "{}: {LOSSES_FILE} is empty",
                    run.path().display()
                ))
            })?;
            Ok(OptimalPoint {
                run: run.path().to_path_buf(),
                chis,
                final_loss,
            })
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════
//  Linker
// ═══════════════════════════════════════════════════════════════════

/// An accepted run with its best loss and path.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkedRun {
    /// Source run.
    pub run: RunDirectory,
    /// Minimum loss.
    pub best_loss: f64,
    /// Path through (χD, χA)-space.
    pub path: RunPath,
}

/// Accepted runs of one iteration.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkedIteration {
    /// Iteration name.
    pub name: String,
    /// Runs considered.
    pub total_runs: usize,
    /// Runs below the loss threshold, in discovery order.
    pub accepted: Vec<LinkedRun>,
}

/// Filters optimizer runs by loss and extracts their overlay paths.
#[derive(Clone, Debug)]
#[must_use]
pub struct TrajectoryLinker {
    loss_threshold: f64,
    acceptor_site: usize,
    donor_site: usize,
}

impl Default for TrajectoryLinker {
    fn default() -> Self {
        Self {
            loss_threshold: DEFAULT_LOSS_THRESHOLD,
            acceptor_site: 1,
            donor_site: 0,
        }
    }
}

impl TrajectoryLinker {
    /// Threshold and site indices from `config`.
    pub const fn new(config: &SweepConfig) -> Self {
        Self {
            loss_threshold: config.loss_threshold,
            acceptor_site: config.acceptor_site(),
            donor_site: config.donor_site(),
        }
    }

    /// Replace the acceptance threshold.
    pub fn with_threshold(mut self, loss_threshold: f64) -> Self {
        self.loss_threshold = loss_threshold;
        self
    }

    /// Acceptance threshold in use.
    #[must_use]
    pub const fn loss_threshold(&self) -> f64 {
        self.loss_threshold
    }

    /// Evaluate every run's best loss in parallel; order matches `runs`.
    #[must_use]
    pub fn screen_runs(&self, runs: &[RunDirectory]) -> Vec<RunOutcome> {
        runs.par_iter()
            .map(|run| RunOutcome {
                run: run.clone(),
                best_loss: run.best_loss(),
            })
            .collect()
    }

    /// See [`select_successful_runs`].
    ///
    /// # Errors
    ///
    /// As [`select_successful_runs`].
    pub fn select_successful_runs(&self, runs: &[RunDirectory]) -> Result<Vec<RunDirectory>> {
        select_successful_runs(runs, self.loss_threshold)
    }

    /// See [`extract_path`], with the configured site indices.
    ///
    /// # Errors
    ///
    /// As [`extract_path`].
    pub fn extract_path(&self, run: &RunDirectory) -> Result<RunPath> {
        extract_path(run, self.acceptor_site, self.donor_site)
    }

    /// Discover, filter, and extract every accepted run in `scope`.
    ///
    /// # Errors
    ///
    /// The first discovery, selection, or extraction error.
    pub fn link(&self, scope: &RunScope) -> Result<Vec<LinkedIteration>> {
        discover_runs(scope)?
            .into_iter()
            .map(|group| -> Result<LinkedIteration> {
                let mut accepted = Vec::new();
                for (run, best_loss) in select_scored_runs(&group.runs, self.loss_threshold)? {
                    let path = self.extract_path(&run)?;
                    accepted.push(LinkedRun {
                        run,
                        best_loss,
                        path,
                    });
                }
                Ok(LinkedIteration {
                    name: group.name,
                    total_runs: group.runs.len(),
                    accepted,
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::records::write_records;

    fn make_run(root: &Path, name: &str, losses: &[f64]) -> RunDirectory {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        write_records(losses, &dir.join(LOSSES_FILE)).unwrap();
        RunDirectory::new(dir)
    }

    #[test]
    fn threshold_filter_keeps_order() {
        let tmp = tempfile::tempdir().unwrap();
        let runs = vec![
            make_run(tmp.path(), "a", &[0.9, 0.1]),
            make_run(tmp.path(), "b", &[0.8, 0.6]),
            make_run(tmp.path(), "c", &[0.49]),
        ];
        let kept = select_successful_runs(&runs, 0.5).unwrap();
        assert_eq!(kept, vec![runs[0].clone(), runs[2].clone()]);
    }

    #[test]
    fn scored_selection_carries_best_loss() {
        let tmp = tempfile::tempdir().unwrap();
        let runs = vec![
            make_run(tmp.path(), "a", &[0.9, 0.1, 0.2]),
            make_run(tmp.path(), "b", &[0.7]),
            make_run(tmp.path(), "c", &[0.4, 0.3]),
        ];
        let scored = select_scored_runs(&runs, 0.5).unwrap();
        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].0, runs[0]);
        assert!((scored[0].1 - 0.1).abs() < f64::EPSILON);
        assert_eq!(scored[1].0, runs[2]);
        assert!((scored[1].1 - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn linked_run_loss_matches_selection() {
        let tmp = tempfile::tempdir().unwrap();
        let run = make_run(&tmp.path().join("iteration_0"), "data_optimizer_0", &[0.6, 0.05]);
        write_records(&[0.0, 1.0], &run.path().join(trajectory_file_name(0))).unwrap();
        write_records(&[0.0, 2.0], &run.path().join(trajectory_file_name(1))).unwrap();
        write_records(&[0.0, 0.0], &run.path().join(INIT_CHIS_FILE)).unwrap();

        let linked = TrajectoryLinker::default()
            .link(&RunScope::Sweep(tmp.path().to_path_buf()))
            .unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].total_runs, 1);
        assert!((linked[0].accepted[0].best_loss - 0.05).abs() < f64::EPSILON);
        assert_eq!(linked[0].accepted[0].path.points.len(), 2);
    }

    #[test]
    fn threshold_is_strict() {
        let tmp = tempfile::tempdir().unwrap();
        let runs = vec![make_run(tmp.path(), "edge", &[0.5])];
        assert!(select_successful_runs(&runs, 0.5).unwrap().is_empty());
    }

    #[test]
    fn missing_losses_is_surfaced() {
        let tmp = tempfile::tempdir().unwrap();
        let good = make_run(tmp.path(), "good", &[0.1]);
        let bare = tmp.path().join("bare");
        std::fs::create_dir(&bare).unwrap();
        let err = select_successful_runs(&[good, RunDirectory::new(&bare)], 0.5).unwrap_err();
        assert!(matches!(err, SweepError::MissingFile(p) if p == bare.join(LOSSES_FILE)));
    }

    #[test]
    fn empty_losses_is_invalid_input() {
        let tmp = tempfile::tempdir().unwrap();
        let run = make_run(tmp.path(), "empty", &[]);
        let err = run.best_loss().unwrap_err();
        assert!(matches!(err, SweepError::InvalidInput(_)));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn screening_reports_each_run() {
        let tmp = tempfile::tempdir().unwrap();
        let runs = vec![
            make_run(tmp.path(), "r0", &[0.3]),
            RunDirectory::new(tmp.path().join("absent")),
            make_run(tmp.path(), "r2", &[0.7]),
        ];
        let outcomes = TrajectoryLinker::default().screen_runs(&runs);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].run, runs[0]);
        assert!(outcomes[0].accepted(0.5));
        assert!(matches!(outcomes[1].best_loss, Err(SweepError::MissingFile(_))));
        assert!(!outcomes[1].accepted(0.5));
        assert!(!outcomes[2].accepted(0.5));
    }

    #[test]
    fn loss_history_tail_and_last() {
        let h = LossHistory::new(vec![2.0, 1.0, 0.5]);
        assert_eq!(h.tail(), &[1.0, 0.5]);
        assert_eq!(h.last(), Some(0.5));
        assert!((h.best().unwrap() - 0.5).abs() < f64::EPSILON);
        assert!(LossHistory::new(vec![]).tail().is_empty());
    }

    #[test]
    fn path_pairs_donor_and_acceptor() {
        let tmp = tempfile::tempdir().unwrap();
        let run = make_run(tmp.path(), "run", &[0.1]);
        write_records(&[0.0, 1.0, 1.0], &run.path().join(trajectory_file_name(0))).unwrap();
        write_records(&[0.0, 0.0, 2.0], &run.path().join(trajectory_file_name(1))).unwrap();
        write_records(&[-0.5, 0.5], &run.path().join(INIT_CHIS_FILE)).unwrap();

        let path = extract_path(&run, 1, 0).unwrap();
        assert_eq!(path.initial, ChiPoint { chi_d: -0.5, chi_a: 0.5 });
        assert_eq!(path.points.len(), 3);
        assert_eq!(path.points[2], ChiPoint { chi_d: 1.0, chi_a: 2.0 });

        let arrows = path.arrows();
        assert_eq!(arrows.len(), 2);
        assert_eq!(arrows[0].midpoint, ChiPoint { chi_d: 0.5, chi_a: 0.0 });
        assert!((arrows[0].d_chi_d - 1.0).abs() < 1e-15);
        assert!(arrows[1].d_chi_d.abs() < 1e-15);
        assert!((arrows[1].d_chi_a - 1.0).abs() < 1e-15);
    }

    #[test]
    fn single_step_path_has_no_arrows() {
        let tmp = tempfile::tempdir().unwrap();
        let run = make_run(tmp.path(), "one", &[0.1]);
        write_records(&[0.25], &run.path().join(trajectory_file_name(0))).unwrap();
        write_records(&[0.75], &run.path().join(trajectory_file_name(1))).unwrap();
        write_records(&[0.0, 0.0], &run.path().join(INIT_CHIS_FILE)).unwrap();

        let path = extract_path(&run, 1, 0).unwrap();
        assert_eq!(path.points.len(), 1);
        assert!(path.arrows().is_empty());
    }

    #[test]
    fn zero_length_step_has_zero_direction() {
        let path = RunPath {
            points: vec![
                ChiPoint { chi_d: 1.0, chi_a: 1.0 },
                ChiPoint { chi_d: 1.0, chi_a: 1.0 },
            ],
            initial: ChiPoint { chi_d: 0.0, chi_a: 0.0 },
        };
        let arrows = path.arrows();
        assert_eq!(arrows.len(), 1);
        assert!(arrows[0].d_chi_d == 0.0 && arrows[0].d_chi_a == 0.0);
    }

    #[test]
    fn mismatched_trajectories_are_shape_error() {
        let tmp = tempfile::tempdir().unwrap();
        let run = make_run(tmp.path(), "ragged", &[0.1]);
        write_records(&[0.0, 1.0], &run.path().join(trajectory_file_name(0))).unwrap();
        write_records(&[0.0], &run.path().join(trajectory_file_name(1))).unwrap();
        write_records(&[0.0], &run.path().join(INIT_CHIS_FILE)).unwrap();
        assert!(matches!(extract_path(&run, 1, 0), Err(SweepError::Shape(_))));
    }

    #[test]
    fn empty_initial_guess_is_invalid_input() {
        let tmp = tempfile::tempdir().unwrap();
        let run = make_run(tmp.path(), "noinit", &[0.1]);
        write_records(&[0.0], &run.path().join(trajectory_file_name(0))).unwrap();
        write_records(&[0.0], &run.path().join(trajectory_file_name(1))).unwrap();
        std::fs::write(run.path().join(INIT_CHIS_FILE), "").unwrap();
        assert!(matches!(
            extract_path(&run, 1, 0),
            Err(SweepError::InvalidInput(_))
        ));
    }

    #[test]
    fn natural_order_of_iterations() {
        let tmp = tempfile::tempdir().unwrap();
        for it in ["iteration_10", "iteration_2", "iteration_1"] {
            std::fs::create_dir_all(tmp.path().join(it).join("data_optimizer_0")).unwrap();
        }
        std::fs::create_dir_all(tmp.path().join("plots")).unwrap();
        std::fs::write(tmp.path().join("iteration_notes.txt"), "x").unwrap();

        let groups = discover_runs(&RunScope::Sweep(tmp.path().to_path_buf())).unwrap();
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["iteration_1", "iteration_2", "iteration_10"]);
    }

    #[test]
    fn single_scope_wraps_one_run() {
        let tmp = tempfile::tempdir().unwrap();
        let run = make_run(&tmp.path().join("iteration_0"), "data_optimizer_3", &[0.2]);
        let groups = discover_runs(&RunScope::Single(run.path().to_path_buf())).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "iteration_0");
        assert_eq!(groups[0].runs, vec![run]);
    }

    #[test]
    fn missing_scope_root_is_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let scope = RunScope::Sweep(tmp.path().join("nowhere"));
        assert!(matches!(discover_runs(&scope), Err(SweepError::MissingFile(_))));
    }

    #[test]
    fn optimal_points_use_last_loss() {
        let tmp = tempfile::tempdir().unwrap();
        let run = make_run(tmp.path(), "opt", &[0.9, 0.2, 0.3]);
        write_records(&[1.5, -1.5], &run.path().join(OPTIMAL_VARS_FILE)).unwrap();
        let points = collect_optimal_points(&[run]).unwrap();
        assert_eq!(points[0].chis, vec![1.5, -1.5]);
        assert!((points[0].final_loss - 0.3).abs() < f64::EPSILON);
    }
}
