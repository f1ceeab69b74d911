//! Uploading wheels to the private package index, via the `devpi` client.

use super::{
    package,
    runner::{Invocation, Runner},
    wheel::{find_wheel, Requirement, WheelName},
};
use anyhow::Error;
use clap::Args;
use std::path::Path;

/// The index `upload` uses unless told otherwise.
pub const DEFAULT_INDEX: &str = "https://pypi.lundalogik.com:3443/lime/develop";

/// The index `publish` uploads to.
pub const PUBLISH_INDEX: &str = "https://pypi.lundalogik.com:3443/lime/develop/+simple/";

/// What `devpi list` prints when asked about a project the index has never seen.
pub const NO_PROJECT: &str = "404 Not Found: no project";

/// Options for uploading a wheel.
#[derive(Clone, Debug, Default, Args)]
pub struct UploadOptions {
    /// Username for uploading to the index.
    ///
    /// If not given, the upload uses whatever session the devpi client already has.
    #[clap(short, long)]
    pub username: Option<String>,

    /// Password for uploading to the index.
    ///
    /// If a username is given without a password, the password is prompted for.
    #[clap(short, long)]
    pub password: Option<String>,

    /// Package index to upload to.
    #[clap(short, long, default_value = DEFAULT_INDEX)]
    pub index: String,

    /// Upload even if this version of the package already exists.
    #[clap(short, long)]
    pub force: bool,
}

/// Credentials for publishing, taken from the environment.
#[derive(Clone, Debug, Default, Args)]
pub struct PublishOptions {
    /// Username for the private index.
    #[clap(long, env = "DEVPI_USERNAME", hide_env_values = true)]
    pub username: Option<String>,

    /// Password for the private index.
    #[clap(long, env = "DEVPI_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl PublishOptions {
    /// The upload these credentials authorize: the fixed publish index, never forced.
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            username: non_empty(&self.username),
            password: non_empty(&self.password),
            index: PUBLISH_INDEX.into(),
            force: false,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|s| !s.is_empty())
}

/// A `devpi` client session.
pub struct Devpi<'a> {
    runner: &'a dyn Runner,
}

impl<'a> Devpi<'a> {
    pub fn new(runner: &'a dyn Runner) -> Self {
        Self { runner }
    }

    /// Select the index subsequent commands operate on.
    pub async fn use_index(&self, index: &str) -> Result<(), Error> {
        self.runner
            .run(&Invocation::new("devpi").args(["use", index]))
            .await
    }

    /// Whether the current index already has a release matching `req`.
    pub async fn package_exists(&self, req: &Requirement) -> Result<bool, Error> {
        let invocation = Invocation::new("devpi").arg("list").arg(req.to_string());
        let output = self.runner.output(&invocation).await?;
        if output.success {
            Ok(!output.stdout.trim().is_empty())
        } else if output.contains(NO_PROJECT) {
            Ok(false)
        } else {
            Err(Error::msg(format!(
                "command `{invocation}` failed: {}",
                output.stderr.trim()
            )))
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(), Error> {
        self.runner
            .run(&Invocation::new("devpi").args(["login", username, "--password", password]))
            .await
    }

    pub async fn upload(&self, wheel: &Path) -> Result<(), Error> {
        self.runner
            .run(
                &Invocation::new("devpi")
                    .arg("upload")
                    .arg(wheel.to_string_lossy()),
            )
            .await
    }
}

/// Build the package in `root` and upload it to the index.
///
/// If the index already has this version of the package, nothing is uploaded unless
/// `opt.force` is set. `prompt` is called for a password if a username is given without one.
pub async fn upload(
    runner: &dyn Runner,
    root: &Path,
    package: &package::Options,
    opt: &UploadOptions,
    prompt: impl FnOnce() -> Result<String, Error>,
) -> Result<(), Error> {
    package::build(runner, root, package).await?;

    let devpi = Devpi::new(runner);
    devpi.use_index(&opt.index).await?;

    let wheel = find_wheel(root.join(package::DIST_DIR))?;
    let req = WheelName::from_path(&wheel)?.requirement();
    // Commands run from `root`, so the wheel is named relative to it.
    let wheel = match wheel.file_name() {
        Some(file_name) => Path::new(package::DIST_DIR).join(file_name),
        None => return Err(Error::msg(format!("{} is not a file", wheel.display()))),
    };
    let exists = devpi.package_exists(&req).await?;
    if exists {
        tracing::info!("Package {}={} already exists.", req.name, req.version);
        if !opt.force {
            return Ok(());
        }
    }

    if let Some(username) = &opt.username {
        let password = match &opt.password {
            Some(password) => password.clone(),
            None => prompt()?,
        };
        devpi.login(username, &password).await?;
    }
    tracing::info!("uploading {}", wheel.display());
    devpi.upload(&wheel).await
}

/// Upload the package to the private index, with credentials from the environment.
pub async fn publish(
    runner: &dyn Runner,
    root: &Path,
    package: &package::Options,
    opt: &PublishOptions,
) -> Result<(), Error> {
    upload(runner, root, package, &opt.upload_options(), || {
        Err(Error::msg("DEVPI_PASSWORD must be set to publish"))
    })
    .await
}
