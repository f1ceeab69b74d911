//! Building the Python package.

use super::runner::{Invocation, Runner};
use anyhow::Error;
use clap::Args;
use std::fs;
use std::path::Path;

/// Where built wheels are written, relative to the project root.
pub const DIST_DIR: &str = "dist";

/// Output directories of a wheel build, relative to the project root.
pub const BUILD_DIRS: [&str; 2] = ["build", DIST_DIR];

/// Package build options.
#[derive(Clone, Debug, Args)]
pub struct Options {
    /// Python interpreter used to run `setup.py`.
    #[clap(long, env = "RELEASE_PYTHON", default_value = "python")]
    pub python: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            python: "python".into(),
        }
    }
}

/// Remove the output of previous builds under `root`.
pub fn clean(root: &Path) -> Result<(), Error> {
    for dir in BUILD_DIRS {
        let path = root.join(dir);
        if path.is_dir() {
            tracing::debug!("removing {}", path.display());
            fs::remove_dir_all(&path).map_err(|err| {
                Error::msg(format!("unable to remove {}: {err}", path.display()))
            })?;
        }
    }
    Ok(())
}

/// Build a wheel of the package in `root` from scratch.
///
/// The wheel is written to `dist` under `root`.
pub async fn build(runner: &dyn Runner, root: &Path, opt: &Options) -> Result<(), Error> {
    clean(root)?;
    tracing::info!("building wheel");
    runner
        .run(&Invocation::new(&opt.python).args(["setup.py", "-q", "bdist_wheel"]))
        .await
}
