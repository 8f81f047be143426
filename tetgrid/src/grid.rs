// SPDX-License-Identifier: AGPL-3.0-only

//! Sweep-grid reconstruction
//!
//! The simulation engine emits one result per sweep point as a flat list.
//! This module reduces each point to its minimum occupation number (min N)
//! and reshapes the flat list into N×N fields over the (χD, χA) plane.
//!
//! # Index convention
//!
//! Flat index `k = i*N + j` maps to cell `(i, j)`:
//!
//! ```text
//! value[i][j] = flat[i*N + j]
//! chi_d[i][j] = axis_d[j]
//! chi_a[i][j] = axis_a[i]
//! ```
//!
//! Any consumer that flattens or reshapes must use exactly this mapping or
//! cells are silently misplaced. Both axes must have the same length N.

use crate::config::SweepConfig;
use crate::error::{Result, SweepError};
use crate::records;
use ndarray::Array2;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ═══════════════════════════════════════════════════════════════════
//  Axes
// ═══════════════════════════════════════════════════════════════════

/// Ordered coordinate values of one sweep parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepAxis {
    values: Vec<f64>,
}

impl SweepAxis {
    /// Wrap externally produced coordinate values.
    #[must_use]
    pub const fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// `n` evenly spaced points from `lo` to `hi`, both endpoints included.
    ///
    /// `n == 1` yields `[lo]`; `n == 0` yields an empty axis.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn linspace(lo: f64, hi: f64, n: usize) -> Self {
        let values = match n {
            0 => Vec::new(),
            1 => vec![lo],
            _ => {
                let step = (hi - lo) / (n - 1) as f64;
                let mut v: Vec<f64> = (0..n).map(|k| lo + k as f64 * step).collect();
                v[n - 1] = hi;
                v
            }
        };
        Self { values }
    }

    /// Load an axis stored one value per line.
    ///
    /// # Errors
    ///
    /// Propagates [`records::read_scalar_series`] errors.
    pub fn from_file(path: &Path) -> Result<Self> {
        records::read_scalar_series(path).map(Self::new)
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the axis has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Coordinate values in sweep order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Per-point results
// ═══════════════════════════════════════════════════════════════════

/// Result recorded for one sweep point, classified once at ingestion.
#[derive(Clone, Debug, PartialEq)]
pub enum PointResult {
    /// Already reduced to a single value.
    Scalar(f64),
    /// Raw occupation-number time series; reduced by its minimum.
    Series(Vec<f64>),
}

impl From<f64> for PointResult {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

impl From<Vec<f64>> for PointResult {
    fn from(series: Vec<f64>) -> Self {
        Self::Series(series)
    }
}

impl PointResult {
    /// The value this point contributes to the grid.
    ///
    /// # Errors
    ///
    /// See [`series_minimum`].
    pub fn reduce(&self) -> Result<f64> {
        match self {
            Self::Scalar(v) => Ok(*v),
            Self::Series(series) => series_minimum(series),
        }
    }
}

/// Minimum of one time series.
///
/// # Errors
///
/// [`SweepError::InvalidInput`] if the series is empty or contains NaN
/// (NaN has no place in a total order, so any minimum would be arbitrary).
pub fn series_minimum(series: &[f64]) -> Result<f64> {
    if series.is_empty() {
        return Err(SweepError::InvalidInput(
            "cannot take the minimum of an empty series".into(),
        ));
    }
    if let Some(pos) = series.iter().position(|v| v.is_nan()) {
        return Err(SweepError::InvalidInput(format!(
            "series contains NaN at sample {pos}"
        )));
    }
    Ok(series.iter().copied().fold(f64::INFINITY, f64::min))
}

/// Reduce every point's series to its minimum, keeping point order.
///
/// # Errors
///
/// [`SweepError::InvalidInput`] naming the first point whose series is empty
/// or contains NaN.
pub fn reduce_series_to_minima(per_point_series: &[Vec<f64>]) -> Result<Vec<f64>> {
    per_point_series
        .iter()
        .enumerate()
        .map(|(k, series)| {
            series_minimum(series).map_err(|e| match e {
                SweepError::InvalidInput(msg) => {
                    SweepError::InvalidInput(format!("sweep point {k}: {msg}"))
                }
                other => other,
            })
        })
        .collect()
}

/// Reduce a mixed list of scalar and series results to one value per point.
///
/// # Errors
///
/// As [`reduce_series_to_minima`].
pub fn flatten_point_results(results: &[PointResult]) -> Result<Vec<f64>> {
    results
        .iter()
        .enumerate()
        .map(|(k, r)| {
            r.reduce().map_err(|e| match e {
                SweepError::InvalidInput(msg) => {
                    SweepError::InvalidInput(format!("sweep point {k}: {msg}"))
                }
                other => other,
            })
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════
//  Grid
// ═══════════════════════════════════════════════════════════════════

/// Reconstructed N×N fields over the (χD, χA) plane.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepGrid {
    /// Reduced observable (min N) per cell.
    pub value: Array2<f64>,
    /// χD coordinate per cell (`chi_d[i][j] = axis_d[j]`).
    pub chi_d: Array2<f64>,
    /// χA coordinate per cell (`chi_a[i][j] = axis_a[i]`).
    pub chi_a: Array2<f64>,
}

/// `Some(n)` when `len == n * n`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn exact_square_root(len: usize) -> Option<usize> {
    let mut n = (len as f64).sqrt() as usize;
    while n * n > len {
        n -= 1;
    }
    while (n + 1) * (n + 1) <= len {
        n += 1;
    }
    (n * n == len).then_some(n)
}

/// Reshape flat per-point minima into the grid fields.
///
/// # Errors
///
/// [`SweepError::Shape`] when the axes differ in length or are empty, when
/// `flat_minima.len()` is not a perfect square, or when it is a perfect
/// square other than `axis_a.len() * axis_d.len()`.
pub fn build_grid(
    flat_minima: &[f64],
    axis_a: &SweepAxis,
    axis_d: &SweepAxis,
) -> Result<SweepGrid> {
    let n = axis_a.len();
    if axis_d.len() != n {
        return Err(SweepError::Shape(format!(
            "axis lengths differ: chiA has {n} points, chiD has {}",
            axis_d.len()
        )));
    }
    if n == 0 {
        return Err(SweepError::Shape("sweep axes are empty".into()));
    }
    let Some(side) = exact_square_root(flat_minima.len()) else {
        return Err(SweepError::Shape(format!(
            "{} values is not a perfect square",
            flat_minima.len()
        )));
    };
    if side != n {
        return Err(SweepError::Shape(format!(
            "{} values form a {side}x{side} grid but the axes have {n} points",
            flat_minima.len()
        )));
    }

    let value = Array2::from_shape_vec((n, n), flat_minima.to_vec())
        .map_err(|e| SweepError::Shape(e.to_string()))?;
    let a = axis_a.values();
    let d = axis_d.values();
    let chi_d = Array2::from_shape_fn((n, n), |(_, j)| d[j]);
    let chi_a = Array2::from_shape_fn((n, n), |(i, _)| a[i]);

    debug!(n, "built sweep grid");
    Ok(SweepGrid {
        value,
        chi_d,
        chi_a,
    })
}

impl SweepGrid {
    /// Side length N.
    #[must_use]
    pub fn side(&self) -> usize {
        self.value.nrows()
    }

    /// `(χD, χA, value)` per cell in row-major (`i*N + j`) order.
    #[must_use]
    pub fn triples(&self) -> Vec<(f64, f64, f64)> {
        self.value
            .indexed_iter()
            .map(|((i, j), &v)| (self.chi_d[[i, j]], self.chi_a[[i, j]], v))
            .collect()
    }

    /// Cell holding the smallest value, as `(χD, χA, value)`.
    ///
    /// Ties resolve to the lowest linear index.
    #[must_use]
    pub fn minimum(&self) -> Option<(f64, f64, f64)> {
        self.triples()
            .into_iter()
            .filter(|t| !t.2.is_nan())
            .fold(None, |best, t| match best {
                Some(b) if b.2 <= t.2 => Some(b),
                _ => Some(t),
            })
    }

    /// Append the `(χD, χA, value)` triples to `destination`.
    ///
    /// # Errors
    ///
    /// Propagates [`records::write_records`] errors.
    pub fn write_min_n(&self, destination: &Path) -> Result<()> {
        records::write_records(&self.triples(), destination)?;
        info!(path = %destination.display(), n = self.side(), "saved min N grid");
        Ok(())
    }

    /// Rebuild a grid from row-major `(χD, χA, value)` triples.
    ///
    /// The axes are recovered from the first row (χD) and first column (χA);
    /// every triple must agree with them.
    ///
    /// # Errors
    ///
    /// [`SweepError::Shape`] if the count is not a perfect square or a triple
    /// disagrees with the recovered axes.
    pub fn from_triples(triples: &[(f64, f64, f64)]) -> Result<Self> {
        let Some(n) = exact_square_root(triples.len()) else {
            return Err(SweepError::Shape(format!(
                "{} triples is not a perfect square",
                triples.len()
            )));
        };
        let axis_d = SweepAxis::new(triples.iter().take(n).map(|t| t.0).collect());
        let axis_a = SweepAxis::new(triples.iter().step_by(n.max(1)).map(|t| t.1).collect());

        for (k, t) in triples.iter().enumerate() {
            let (i, j) = (k / n, k % n);
            if t.0.to_bits() != axis_d.values()[j].to_bits()
                || t.1.to_bits() != axis_a.values()[i].to_bits()
            {
                return Err(SweepError::Shape(format!(
                    "triple {k} at ({}, {}) does not lie on the grid cell ({i}, {j})",
                    t.0, t.1
                )));
            }
        }

        let flat: Vec<f64> = triples.iter().map(|t| t.2).collect();
        build_grid(&flat, &axis_a, &axis_d)
    }

    /// Reload a grid written by [`Self::write_min_n`].
    ///
    /// # Errors
    ///
    /// Read errors from [`records::read_rows`], then as [`Self::from_triples`].
    pub fn load_min_n(source: &Path) -> Result<Self> {
        let rows = records::read_rows(source, 3)?;
        let triples: Vec<(f64, f64, f64)> = rows.iter().map(|r| (r[0], r[1], r[2])).collect();
        Self::from_triples(&triples)
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Reconstructor
// ═══════════════════════════════════════════════════════════════════

/// Holds the sweep axes and turns per-point results into [`SweepGrid`]s.
#[derive(Clone, Debug)]
#[must_use]
pub struct GridReconstructor {
    axis_a: SweepAxis,
    axis_d: SweepAxis,
}

impl GridReconstructor {
    /// Axes spanning the configured χ limits at `plotting_resolution` points.
    pub fn new(config: &SweepConfig) -> Self {
        let [a_lo, a_hi] = config.chi_a_limits;
        let [d_lo, d_hi] = config.chi_d_limits;
        Self {
            axis_a: SweepAxis::linspace(a_lo, a_hi, config.plotting_resolution),
            axis_d: SweepAxis::linspace(d_lo, d_hi, config.plotting_resolution),
        }
    }

    /// Use externally produced axes.
    ///
    /// # Errors
    ///
    /// [`SweepError::Shape`] if the axes differ in length.
    pub fn with_axes(axis_a: SweepAxis, axis_d: SweepAxis) -> Result<Self> {
        if axis_a.len() != axis_d.len() {
            return Err(SweepError::Shape(format!(
                "axis lengths differ: chiA has {} points, chiD has {}",
                axis_a.len(),
                axis_d.len()
            )));
        }
        Ok(Self { axis_a, axis_d })
    }

    /// Load both axes from one-value-per-line files.
    ///
    /// # Errors
    ///
    /// Read errors, or [`SweepError::Shape`] as in [`Self::with_axes`].
    pub fn from_axis_files(axis_a: &Path, axis_d: &Path) -> Result<Self> {
        Self::with_axes(SweepAxis::from_file(axis_a)?, SweepAxis::from_file(axis_d)?)
    }

    /// χA axis.
    pub const fn axis_a(&self) -> &SweepAxis {
        &self.axis_a
    }

    /// χD axis.
    pub const fn axis_d(&self) -> &SweepAxis {
        &self.axis_d
    }

    /// Grid from already-reduced per-point minima.
    ///
    /// # Errors
    ///
    /// See [`build_grid`].
    pub fn reconstruct_minima(&self, flat_minima: &[f64]) -> Result<SweepGrid> {
        build_grid(flat_minima, &self.axis_a, &self.axis_d)
    }

    /// Grid from per-point results, reducing series to their minima.
    ///
    /// # Errors
    ///
    /// See [`flatten_point_results`] and [`build_grid`].
    pub fn reconstruct(&self, results: &[PointResult]) -> Result<SweepGrid> {
        let flat = flatten_point_results(results)?;
        self.reconstruct_minima(&flat)
    }

    /// Grid from a file of per-point minima, one value per line.
    ///
    /// # Errors
    ///
    /// Read errors, then as [`build_grid`].
    pub fn reconstruct_from_file(&self, minima: &Path) -> Result<SweepGrid> {
        let flat = records::read_scalar_series(minima)?;
        self.reconstruct_minima(&flat)
    }
}

/// Load one raw series per sweep point, in the order given.
///
/// # Errors
///
/// The first read error, tagged with its file.
pub fn load_point_series(paths: &[PathBuf]) -> Result<Vec<PointResult>> {
    paths
        .iter()
        .map(|p| records::read_scalar_series(p).map(PointResult::Series))
        .collect()
}
