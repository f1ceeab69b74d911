use anyhow::Error;
use clap::{Parser, Subcommand};
use release::{
    devpi, docker, init_logging, package,
    runner::{Runner, System},
    LogLevel,
};
use std::path::PathBuf;

mod test_runner;

/// Build, test and publish the s3transfer-fork package.
#[derive(Clone, Debug, Parser)]
struct Options {
    /// Show log messages at LEVEL and above.
    #[clap(long, env = "RELEASE_LOGLEVEL", default_value = "INFO", value_name = "LEVEL")]
    loglevel: LogLevel,

    /// The project directory. All commands run from here.
    #[clap(long, env = "RELEASE_ROOT", default_value = ".", value_name = "DIR")]
    root: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Build the container image.
    Build {
        #[clap(flatten)]
        image: docker::Options,
    },
    /// Build the container image and run the test suite in it.
    Test {
        /// The test script to run inside the image.
        #[clap(long, default_value = docker::TEST_SCRIPT)]
        script: String,

        #[clap(flatten)]
        image: docker::Options,
    },
    /// Build the package and upload it to the private index.
    ///
    /// Credentials are taken from DEVPI_USERNAME and DEVPI_PASSWORD.
    Publish {
        #[clap(flatten)]
        credentials: devpi::PublishOptions,

        #[clap(flatten)]
        build: package::Options,
    },
    /// Print the Dockerfile used to build the container image.
    Dockerfile {
        #[clap(flatten)]
        image: docker::Options,
    },
    /// Build a wheel of the package.
    Wheel {
        #[clap(flatten)]
        build: package::Options,
    },
    /// Build a wheel of the package and upload it to a package index.
    Upload {
        #[clap(flatten)]
        upload: devpi::UploadOptions,

        #[clap(flatten)]
        build: package::Options,
    },
}

impl Options {
    async fn execute(&self, runner: &dyn Runner) -> Result<(), Error> {
        match &self.command {
            Command::Build { image } => docker::build(runner, image).await,
            Command::Test { script, image } => docker::test(runner, image, script).await,
            Command::Publish { credentials, build } => {
                devpi::publish(runner, &self.root, build, credentials).await
            }
            Command::Dockerfile { image } => {
                print!("{}", image.dockerfile());
                Ok(())
            }
            Command::Wheel { build } => package::build(runner, &self.root, build).await,
            Command::Upload { upload, build } => {
                devpi::upload(runner, &self.root, build, upload, prompt_password).await
            }
        }
    }
}

fn prompt_password() -> Result<String, Error> {
    rpassword::prompt_password("Password: ")
        .map_err(|err| Error::msg(format!("unable to read password: {err}")))
}

#[async_std::main]
async fn main() -> Result<(), Error> {
    let opt = Options::parse();
    init_logging(opt.loglevel);
    let runner = System::new(&opt.root);
    opt.execute(&runner).await
}
