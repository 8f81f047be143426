// SPDX-License-Identifier: AGPL-3.0-only

//! Sweep-grid post-processing driver.
//!
//! Reconstructs the min N grid of a (χA, χD) sweep, screens optimizer runs
//! against the loss threshold, and extracts overlay paths. Reports go to
//! stdout; `--json` additionally writes a machine-readable summary.
//!
//! # Usage
//!
//! ```bash
//! tetgrid --config sweep.json grid --minima min_n.txt --out-dir data/avg_N
//! tetgrid runs --root data/coupling-0.001/tmax-20 --threshold 0.5
//! tetgrid path --run data/iteration_0/data_optimizer_3 --json path.json
//! tetgrid loss --run data/iteration_0/data_optimizer_3
//! ```
//!
//! The `--json` summary is written even when the command then fails because
//! some runs could not be evaluated; per-run errors are recorded in it.

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use tet_sweepgrid::grid::{load_point_series, PointResult};
use tet_sweepgrid::trajectory::{collect_optimal_points, discover_runs};
use tet_sweepgrid::workspace::{discover_data_root, prepare_directory, OverwritePolicy};
use tet_sweepgrid::{
    GridReconstructor, Result, RunDirectory, RunScope, SweepConfig, SweepError, TrajectoryLinker,
};

/// File the reconstructed triples are appended to.
const MIN_N_FILE: &str = "min_n_combinations.txt";

#[derive(Parser, Debug)]
#[command(name = "tetgrid", version, about = "Sweep-grid reconstruction and optimizer-run linking")]
struct Cli {
    /// Sweep configuration (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write a JSON summary to this path
    #[arg(long, global = true)]
    json: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconstruct the min N grid and persist its (chiD, chiA, value) triples
    Grid {
        /// Per-point minima, one value per line, row-major
        #[arg(long, conflicts_with = "series")]
        minima: Option<PathBuf>,
        /// Raw per-point series files, in sweep order
        #[arg(long, num_args = 1..)]
        series: Vec<PathBuf>,
        /// chiA axis file (otherwise linspace from the config)
        #[arg(long, requires = "axis_d")]
        axis_a: Option<PathBuf>,
        /// chiD axis file (otherwise linspace from the config)
        #[arg(long, requires = "axis_a")]
        axis_d: Option<PathBuf>,
        /// Output directory for the triples file
        #[arg(long)]
        out_dir: PathBuf,
        /// What to do if the output directory exists: fail, overwrite, skip
        #[arg(long, default_value = "fail")]
        policy: OverwritePolicy,
    },
    /// Screen optimizer runs against the loss threshold
    Runs {
        /// Sweep root holding iteration_* directories (default: data root)
        #[arg(long, conflicts_with = "run")]
        root: Option<PathBuf>,
        /// A single run directory instead of a whole sweep
        #[arg(long)]
        run: Option<PathBuf>,
        /// Override the configured loss threshold
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Extract one run's path through (chiD, chiA)-space
    Path {
        /// Run directory
        #[arg(long)]
        run: PathBuf,
    },
    /// Print one run's loss curve (initial-guess evaluation excluded)
    Loss {
        /// Run directory
        #[arg(long)]
        run: PathBuf,
    },
    /// List every run's optimized parameters and final loss
    Optima {
        /// Sweep root holding iteration_* directories (default: data root)
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

/// A command's JSON summary plus a failure to report once it is saved.
struct Report {
    summary: serde_json::Value,
    deferred: Option<SweepError>,
}

impl From<serde_json::Value> for Report {
    fn from(summary: serde_json::Value) -> Self {
        Self {
            summary,
            deferred: None,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("  ERROR: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => SweepConfig::load(path)?,
        None => SweepConfig::default(),
    };

    let report: Report = match cli.command {
        Commands::Grid {
            minima,
            series,
            axis_a,
            axis_d,
            out_dir,
            policy,
        } => cmd_grid(&config, minima, &series, axis_a.zip(axis_d), &out_dir, policy)?.into(),
        Commands::Runs {
            root,
            run,
            threshold,
        } => {
            let scope = run.map_or_else(
                || RunScope::Sweep(discover_data_root(root.as_deref())),
                RunScope::Single,
            );
            let mut linker = TrajectoryLinker::new(&config);
            if let Some(t) = threshold {
                linker = linker.with_threshold(t);
            }
            cmd_runs(&linker, &scope)?
        }
        Commands::Path { run } => cmd_path(&TrajectoryLinker::new(&config), &run)?.into(),
        Commands::Loss { run } => cmd_loss(&run)?.into(),
        Commands::Optima { root } => cmd_optima(&discover_data_root(root.as_deref()))?.into(),
    };

    if let Some(path) = cli.json {
        let text = serde_json::to_string_pretty(&report.summary)
            .map_err(|e| SweepError::Io(format!("JSON serialize: {e}")))?;
        std::fs::write(&path, text)
            .map_err(|e| SweepError::Io(format!("write {}: {e}", path.display())))?;
        println!("\n  Summary saved to: {}", path.display());
    }
    report.deferred.map_or(Ok(()), Err)
}

fn cmd_grid(
    config: &SweepConfig,
    minima: Option<PathBuf>,
    series: &[PathBuf],
    axes: Option<(PathBuf, PathBuf)>,
    out_dir: &Path,
    policy: OverwritePolicy,
) -> Result<serde_json::Value> {
    let reconstructor = match axes {
        Some((a, d)) => GridReconstructor::from_axis_files(&a, &d)?,
        None => GridReconstructor::new(config),
    };

    let grid = match (minima, series.is_empty()) {
        (Some(path), _) => reconstructor.reconstruct_from_file(&path)?,
        (None, false) => {
            let results: Vec<PointResult> = load_point_series(series)?;
            reconstructor.reconstruct(&results)?
        }
        (None, true) => {
            return Err(SweepError::InvalidInput(
                "grid needs --minima or --series".into(),
            ))
        }
    };

    prepare_directory(out_dir, policy)?;
    let out = out_dir.join(MIN_N_FILE);
    grid.write_min_n(&out)?;

    let n = grid.side();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  min N grid reconstructed                                    ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  grid:           {n:>6} x {n:<6}                              ║");
    if let Some((d, a, v)) = grid.minimum() {
        println!("║  min N:          {v:12.6}                                ║");
        println!("║  at (chiD,chiA): ({d:9.4}, {a:9.4})                      ║");
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!("  Triples appended to: {}", out.display());

    Ok(json!({
        "side": n,
        "output": out,
        "minimum": grid.minimum().map(|(d, a, v)| json!({"chi_d": d, "chi_a": a, "value": v})),
    }))
}

fn cmd_runs(linker: &TrajectoryLinker, scope: &RunScope) -> Result<Report> {
    let threshold = linker.loss_threshold();
    let mut iterations = Vec::new();
    let mut failures = 0usize;
    let mut first_failure = None;

    for group in discover_runs(scope)? {
        println!("\n  {} ({} runs)", group.name, group.runs.len());
        let mut rows = Vec::new();
        for outcome in linker.screen_runs(&group.runs) {
            let name = outcome.run.name();
            match &outcome.best_loss {
                Ok(best) => {
                    let mark = if outcome.accepted(threshold) { "✓" } else { " " };
                    println!("    {mark} {name:<24} best loss {best:.6e}");
                }
                Err(e) => println!("    ✗ {name:<24} {e}"),
            }
            rows.push(json!({
                "run": outcome.run.path(),
                "best_loss": outcome.best_loss.as_ref().ok(),
                "accepted": outcome.accepted(threshold),
                "error": outcome.best_loss.as_ref().err().map(ToString::to_string),
            }));
            if let Err(e) = outcome.best_loss {
                failures += 1;
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        }
        iterations.push(json!({ "iteration": group.name, "runs": rows }));
    }

    if failures > 0 {
        println!("\n  {failures} run(s) could not be evaluated");
    }
    Ok(Report {
        summary: json!({
            "loss_threshold": threshold,
            "failures": failures,
            "iterations": iterations,
        }),
        deferred: first_failure,
    })
}

fn cmd_path(linker: &TrajectoryLinker, run: &Path) -> Result<serde_json::Value> {
    let run = RunDirectory::open(run)?;
    let path = linker.extract_path(&run)?;
    let arrows = path.arrows();

    println!("  Run:      {}", run.path().display());
    println!(
        "  Initial:  (chiD, chiA) = ({:.6}, {:.6})",
        path.initial.chi_d, path.initial.chi_a
    );
    println!("  Steps:    {}", path.points.len());
    if let Some(end) = path.endpoint() {
        println!("  Final:    (chiD, chiA) = ({:.6}, {:.6})", end.chi_d, end.chi_a);
    }

    Ok(json!({ "run": run.path(), "path": path, "arrows": arrows }))
}

fn cmd_loss(run: &Path) -> Result<serde_json::Value> {
    let run = RunDirectory::open(run)?;
    let history = run.loss_history()?;
    let curve = history.tail();

    println!("  Run:      {}", run.path().display());
    for (step, loss) in curve.iter().enumerate() {
        println!("    {:>5}  {loss:.6e}", step + 1);
    }
    let best = history.best()?;
    println!("  Best:     {best:.6e}");

    Ok(json!({
        "run": run.path(),
        "best_loss": best,
        "last_loss": history.last(),
        "curve": curve,
    }))
}

fn cmd_optima(root: &Path) -> Result<serde_json::Value> {
    let runs: Vec<RunDirectory> = discover_runs(&RunScope::Sweep(root.to_path_buf()))?
        .into_iter()
        .flat_map(|g| g.runs)
        .collect();
    let optima = collect_optimal_points(&runs)?;
    for p in &optima {
        let chis: Vec<String> = p.chis.iter().map(|c| format!("{c:9.4}")).collect();
        println!("  [{}]  final loss {:.6e}  {}", chis.join(", "), p.final_loss, p.run.display());
    }
    Ok(json!({ "optima": optima }))
}
