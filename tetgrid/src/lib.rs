// SPDX-License-Identifier: AGPL-3.0-only

#![deny(clippy::expect_used, clippy::unwrap_used)]

//! tet sweep-grid — reconstruction and persistence of (χA, χD) sweep results
//!
//! Post-processes a nonlinearity-parameter sweep: reduces each sweep point's
//! occupation-number series to its minimum, reshapes the flat results into an
//! N×N grid over (χD, χA), and links accepted optimizer runs to that grid as
//! overlay paths.
//!
//! ## Modules
//!   - `records` — whitespace-delimited text record store (append-or-create)
//!   - `grid` — min N reduction and row-major grid reconstruction
//!   - `trajectory` — run discovery, loss-threshold selection, path extraction
//!   - `config` — explicit sweep configuration (JSON)
//!   - `workspace` — overwrite policy and data-directory layout
//!   - `error` — typed errors shared by all of the above
//!
//! ## Binary
//!   - `tetgrid` — `grid`, `runs`, `path`, `optima` subcommands

pub mod config;
pub mod error;
pub mod grid;
pub mod records;
pub mod trajectory;
pub mod workspace;

pub use config::SweepConfig;
pub use error::{Result, SweepError};
pub use grid::{
    build_grid, reduce_series_to_minima, GridReconstructor, PointResult, SweepAxis, SweepGrid,
};
pub use trajectory::{
    extract_path, select_successful_runs, RunDirectory, RunPath, RunScope, TrajectoryLinker,
};
