//! The container image the package is built and tested in.

use super::{
    devpi::PUBLISH_INDEX,
    runner::{Invocation, Runner},
};
use anyhow::Error;
use clap::Args;
use std::fmt::Write;
use std::path::PathBuf;

/// Tag of the built image.
pub const IMAGE_TAG: &str = "s3transfer-fork";

/// The image the package image is built on.
pub const BASE_IMAGE: &str = "docker.lundalogik.com/lundalogik/crm/python-base:latest";

/// Timezone of the image.
pub const TIMEZONE: &str = "Europe/Stockholm";

/// The script which runs the test suite inside the image.
pub const TEST_SCRIPT: &str = "scripts/ci/run-tests";

/// Where the source tree is copied in the image.
pub const WORKDIR: &str = "/src";

/// Requirement files installed before the package itself.
pub const REQUIREMENTS: [&str; 2] = ["requirements.txt", "requirements-test.txt"];

/// Image build options.
#[derive(Clone, Debug, Args)]
pub struct Options {
    /// Tag for the built image.
    #[clap(short, long, env = "RELEASE_IMAGE_TAG", default_value = IMAGE_TAG)]
    pub tag: String,

    /// Image to build on.
    #[clap(long, env = "RELEASE_BASE_IMAGE", default_value = BASE_IMAGE)]
    pub base_image: String,

    /// Timezone of the image.
    #[clap(long, env = "RELEASE_TIMEZONE", default_value = TIMEZONE)]
    pub timezone: String,

    /// Extra package index to install dependencies from.
    #[clap(long, env = "RELEASE_PIP_INDEX", default_value = PUBLISH_INDEX)]
    pub pip_index: String,

    /// Build context, relative to the project root.
    #[clap(long, default_value = ".")]
    pub context: PathBuf,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            tag: IMAGE_TAG.into(),
            base_image: BASE_IMAGE.into(),
            timezone: TIMEZONE.into(),
            pip_index: PUBLISH_INDEX.into(),
            context: ".".into(),
        }
    }
}

impl Options {
    /// Render the Dockerfile for this image.
    pub fn dockerfile(&self) -> String {
        let mut file = String::new();
        // Writing to a `String` cannot fail.
        let _ = self.write_dockerfile(&mut file);
        file
    }

    fn write_dockerfile(&self, f: &mut impl Write) -> std::fmt::Result {
        writeln!(f, "FROM {}", self.base_image)?;
        writeln!(f)?;
        writeln!(f, "ENV TZ={}", self.timezone)?;
        writeln!(
            f,
            "RUN ln -snf /usr/share/zoneinfo/$TZ /etc/localtime && echo $TZ > /etc/timezone"
        )?;
        writeln!(f)?;
        writeln!(f, "WORKDIR {WORKDIR}")?;
        writeln!(f, "COPY . {WORKDIR}")?;
        writeln!(f)?;
        write!(f, "RUN pip install --extra-index-url {}", self.pip_index)?;
        for requirements in REQUIREMENTS {
            write!(f, " -r {requirements}")?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "RUN pip install --extra-index-url {} -e .",
            self.pip_index
        )
    }
}

/// Build the image.
///
/// The Dockerfile is generated and passed to `docker build` on standard input, so the project
/// does not need to carry one.
pub async fn build(runner: &dyn Runner, opt: &Options) -> Result<(), Error> {
    tracing::info!("building image {}", opt.tag);
    runner
        .run(
            &Invocation::new("docker")
                .args(["build", "-t", opt.tag.as_str(), "-f", "-"])
                .arg(opt.context.to_string_lossy())
                .stdin(opt.dockerfile()),
        )
        .await
}

/// Build the image and run the test suite in it.
pub async fn test(runner: &dyn Runner, opt: &Options, script: &str) -> Result<(), Error> {
    build(runner, opt).await?;
    tracing::info!("running {script} in {}", opt.tag);
    runner
        .run(&Invocation::new("docker").args(["run", opt.tag.as_str(), script]))
        .await
}
