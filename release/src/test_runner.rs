#![cfg(test)]

//! This module runs the command plans defined in `release/tests/plans`.
//!
//! Each plan consists of two files, named in terms of `<name>`, the name of the plan:
//! * `<name>.args`: command line arguments, one per line
//! * `<name>.json`: the external commands the workflow is expected to run, in order
//!
//! This runner scans that directory for all such pairs of files and executes each command line
//! in a fresh project directory, against a recording runner which simulates a successful wheel
//! build and an index that has never seen the package. Before comparing the expected and actual
//! commands, the runner masks passwords, replaces the project directory with `$ROOT`, and
//! truncates standard input to its first line.

use super::Options;
use ansi_term::Color;
use anyhow::Error;
use clap::Parser;
use futures::future::join_all;
use release::{
    devpi::NO_PROJECT,
    runner::{mock::Recorder, CommandOutput, Invocation},
};
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::fs::{self, File};
use std::path::Path;

const ROOT: &str = "$ROOT";
const WHEEL: &str = "s3transfer_fork-0.1.0-py3-none-any.whl";

#[async_std::test]
async fn command_plan_test_cases() -> Result<(), Error> {
    release::init_logging(release::LogLevel::Debug);

    // Discover test cases.
    let test_cases = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/plans")
        .read_dir()?
        .filter_map(|dirent| {
            let path = dirent.unwrap().path();
            if path.extension()?.to_str().unwrap() == "args" {
                Some(TestCase::new(&path).unwrap())
            } else {
                None
            }
        })
        .collect::<Vec<_>>();
    assert!(!test_cases.is_empty(), "no test cases found");

    let results = join_all(test_cases.into_iter().map(TestCase::run)).await;
    for result in &results {
        println!("{}", result);
    }
    if results.iter().any(TestResult::failed) {
        Err(Error::msg(format!("{}", Color::Red.paint("tests failed"))))
    } else {
        println!("All test cases passed.");
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct TestCase {
    name: OsString,
    args: Vec<String>,
    plan: Vec<Invocation>,
}

impl TestCase {
    fn new(args_path: impl AsRef<Path>) -> Result<Self, Error> {
        let args_path = args_path.as_ref();
        let name = args_path.file_stem().unwrap();
        let args = fs::read_to_string(args_path)?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        let plan_path = args_path.with_extension("json");
        let plan = serde_json::from_reader(File::open(plan_path)?)?;
        Ok(Self {
            name: name.into(),
            args,
            plan,
        })
    }

    async fn run(self) -> TestResult {
        TestResult {
            name: self.name,
            failure: Self::do_test(self.args, self.plan).await.err(),
        }
    }

    async fn do_test(args: Vec<String>, expected_plan: Vec<Invocation>) -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().to_string_lossy().into_owned();

        let dist = dir.path().join("dist");
        let runner = Recorder::new()
            .on(&["python", "setup.py"], move |_| {
                fs::create_dir_all(&dist)?;
                fs::write(dist.join(WHEEL), "")?;
                Ok(())
            })
            .respond(
                &["devpi", "list"],
                CommandOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: format!("{NO_PROJECT} 's3transfer_fork'"),
                },
            );

        let opt = Options::try_parse_from(
            ["release", "--root", root.as_str()]
                .into_iter()
                .map(String::from)
                .chain(args),
        )?;
        opt.execute(&runner).await?;

        let plan = runner
            .invocations()
            .await
            .iter()
            .map(|invocation| normalize_invocation(invocation, &root))
            .collect::<Vec<_>>();
        if plan != expected_plan {
            Err(Error::msg(format!(
                "expected plan:\n{}\nactual plan:\n{}",
                serde_json::to_string_pretty(&expected_plan)?,
                serde_json::to_string_pretty(&plan)?,
            )))
        } else {
            Ok(())
        }
    }
}

fn normalize_invocation(invocation: &Invocation, root: &str) -> Invocation {
    let mut invocation = invocation.redacted();
    for arg in &mut invocation.args {
        *arg = arg.replace(root, ROOT);
    }
    if let Some(stdin) = &mut invocation.stdin {
        *stdin = stdin.lines().next().unwrap_or_default().to_string();
    }
    invocation
}

struct TestResult {
    name: OsString,
    failure: Option<anyhow::Error>,
}

impl TestResult {
    fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

impl Display for TestResult {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}...", self.name.to_string_lossy())?;
        if let Some(err) = &self.failure {
            writeln!(f, "{}", Color::Red.paint("FAILED"))?;
            write!(f, "{err}")?;
        } else {
            write!(f, "{}", Color::Green.paint("OK"))?;
        }
        Ok(())
    }
}
