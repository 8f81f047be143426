// SPDX-License-Identifier: AGPL-3.0-only

//! Data directory bootstrap and layout.
//!
//! Output directories follow `data/coupling-{λ}/tmax-{t}/<leaf>`. Whether an
//! existing directory may be reused or replaced is a caller decision expressed
//! as an [`OverwritePolicy`]; nothing here prompts or exits the process.
//!
//! # Data root discovery
//!
//! 1. Injected override (CLI flag, tests)
//! 2. `TET_DATA_ROOT` environment variable
//! 3. `./data` under the current working directory

use crate::error::{Result, SweepError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Environment variable overriding the data root.
pub const DATA_ROOT_ENV: &str = "TET_DATA_ROOT";

/// What to do when a destination directory already exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    /// Refuse with [`SweepError::DirectoryExists`].
    #[default]
    Fail,
    /// Delete the existing directory and recreate it empty.
    Overwrite,
    /// Keep the existing directory and its contents.
    Skip,
}

impl FromStr for OverwritePolicy {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "overwrite" | "replace" => Ok(Self::Overwrite),
            "skip" | "keep" => Ok(Self::Skip),
            other => Err(SweepError::Config(format!(
                "unknown overwrite policy '{other}' (fail, overwrite, skip)"
            ))),
        }
    }
}

/// Action chosen for a destination directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectoryAction {
    /// Directory is absent and will be created.
    Create,
    /// Directory exists and will be emptied.
    Replace,
    /// Directory exists and is used as is.
    Keep,
}

/// Decide what to do with `path` given whether it exists. Pure; touches nothing.
///
/// # Errors
///
/// [`SweepError::DirectoryExists`] when `exists` and the policy is `Fail`.
pub fn decide_overwrite(
    path: &Path,
    exists: bool,
    policy: OverwritePolicy,
) -> Result<DirectoryAction> {
    match (exists, policy) {
        (false, _) => Ok(DirectoryAction::Create),
        (true, OverwritePolicy::Fail) => Err(SweepError::DirectoryExists(path.to_path_buf())),
        (true, OverwritePolicy::Overwrite) => Ok(DirectoryAction::Replace),
        (true, OverwritePolicy::Skip) => Ok(DirectoryAction::Keep),
    }
}

/// Apply [`decide_overwrite`] to `path` on disk.
///
/// Parents are created as needed.
///
/// # Errors
///
/// [`SweepError::TypeMismatch`] if `path` is an existing file, the decision
/// error, or [`SweepError::Io`] from creation/removal.
pub fn prepare_directory(path: &Path, policy: OverwritePolicy) -> Result<DirectoryAction> {
    if path.exists() && !path.is_dir() {
        return Err(SweepError::TypeMismatch(format!(
            "{} exists and is not a directory",
            path.display()
        )));
    }
    let action = decide_overwrite(path, path.is_dir(), policy)?;
    let io = |e: std::io::Error| SweepError::Io(format!("{}: {e}", path.display()));
    match action {
        DirectoryAction::Create => std::fs::create_dir_all(path).map_err(io)?,
        DirectoryAction::Replace => {
            std::fs::remove_dir_all(path).map_err(io)?;
            std::fs::create_dir_all(path).map_err(io)?;
        }
        DirectoryAction::Keep => {}
    }
    info!(path = %path.display(), ?action, "prepared directory");
    Ok(action)
}

/// `root/coupling-{λ}/tmax-{t}`.
#[must_use]
pub fn sweep_data_dir(root: &Path, coupling: f64, max_t: f64) -> PathBuf {
    root.join(format!("coupling-{coupling}"))
        .join(format!("tmax-{max_t}"))
}

/// Resolve the data root: override, then `TET_DATA_ROOT`, then `./data`.
#[must_use]
pub fn discover_data_root(override_root: Option<&Path>) -> PathBuf {
    if let Some(root) = override_root {
        return root.to_path_buf();
    }
    if let Ok(root) = std::env::var(DATA_ROOT_ENV) {
        if !root.is_empty() {
            return PathBuf::from(root);
        }
    }
    std::env::current_dir()
        .map_or_else(|_| PathBuf::from("data"), |cwd| cwd.join("data"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn decision_table() {
        let p = Path::new("out");
        for policy in [
            OverwritePolicy::Fail,
            OverwritePolicy::Overwrite,
            OverwritePolicy::Skip,
        ] {
            assert_eq!(
                decide_overwrite(p, false, policy).unwrap(),
                DirectoryAction::Create
            );
        }
        assert!(matches!(
            decide_overwrite(p, true, OverwritePolicy::Fail),
            Err(SweepError::DirectoryExists(_))
        ));
        assert_eq!(
            decide_overwrite(p, true, OverwritePolicy::Overwrite).unwrap(),
            DirectoryAction::Replace
        );
        assert_eq!(
            decide_overwrite(p, true, OverwritePolicy::Skip).unwrap(),
            DirectoryAction::Keep
        );
    }

    #[test]
    fn policy_parsing() {
        assert_eq!("fail".parse::<OverwritePolicy>().unwrap(), OverwritePolicy::Fail);
        assert_eq!(
            "Overwrite".parse::<OverwritePolicy>().unwrap(),
            OverwritePolicy::Overwrite
        );
        assert_eq!("keep".parse::<OverwritePolicy>().unwrap(), OverwritePolicy::Skip);
        assert!("maybe".parse::<OverwritePolicy>().is_err());
    }

    #[test]
    fn overwrite_empties_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("avg_N");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("stale.txt"), "1.0\n").unwrap();

        let action = prepare_directory(&target, OverwritePolicy::Overwrite).unwrap();
        assert_eq!(action, DirectoryAction::Replace);
        assert!(target.is_dir());
        assert!(!target.join("stale.txt").exists());
    }

    #[test]
    fn skip_keeps_contents_and_fail_refuses() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("kept");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("losses.txt"), "0.1\n").unwrap();

        assert_eq!(
            prepare_directory(&target, OverwritePolicy::Skip).unwrap(),
            DirectoryAction::Keep
        );
        assert!(target.join("losses.txt").exists());
        assert!(prepare_directory(&target, OverwritePolicy::Fail).is_err());
        assert!(target.join("losses.txt").exists());
    }

    #[test]
    fn create_builds_parents() {
        let dir = tempfile::tempdir().unwrap();
        let target = sweep_data_dir(dir.path(), 0.001, 20.0).join("avg_N");
        assert_eq!(
            prepare_directory(&target, OverwritePolicy::Fail).unwrap(),
            DirectoryAction::Create
        );
        assert!(target.is_dir());
    }

    #[test]
    fn file_in_the_way_is_type_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("not_a_dir");
        std::fs::write(&target, "x").unwrap();
        assert!(matches!(
            prepare_directory(&target, OverwritePolicy::Overwrite),
            Err(SweepError::TypeMismatch(_))
        ));
    }

    #[test]
    fn data_dir_layout() {
        let p = sweep_data_dir(Path::new("data"), 0.001, 20.0);
        assert_eq!(p, Path::new("data/coupling-0.001/tmax-20"));
    }

    #[test]
    fn override_root_wins() {
        let root = discover_data_root(Some(Path::new("/tmp/sweep")));
        assert_eq!(root, Path::new("/tmp/sweep"));
    }
}
