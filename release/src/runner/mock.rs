//! Mock instantiation of the [`Runner`](super::Runner) interface.
//!
//! The [`Recorder`] does not run anything. It records each invocation it is given and responds
//! according to rules set up in advance, which makes it possible to test a workflow in isolation
//! from the tools it drives.
#![cfg(any(test, feature = "mocks"))]

use super::{CommandOutput, Invocation, Runner};
use anyhow::Error;
use async_std::sync::Mutex;
use async_trait::async_trait;

/// A side effect to simulate when a command runs, like creating the files it would create.
pub type Effect = Box<dyn Fn(&Invocation) -> Result<(), Error> + Send + Sync>;

/// A response to invocations matching a prefix.
struct Rule {
    prefix: Vec<String>,
    output: Option<CommandOutput>,
    effect: Option<Effect>,
}

impl Rule {
    fn new(prefix: &[&str]) -> Self {
        Self {
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            output: None,
            effect: None,
        }
    }

    /// Does this rule apply to `invocation`?
    ///
    /// The first element of the prefix matches the program, and the rest match the leading
    /// arguments.
    fn matches(&self, invocation: &Invocation) -> bool {
        let Some((program, args)) = self.prefix.split_first() else {
            return true;
        };
        *program == invocation.program && invocation.args.starts_with(args)
    }
}

/// A [`Runner`] which records invocations instead of running them.
///
/// Commands succeed with no output unless a rule says otherwise. When several rules match an
/// invocation, the output of the first one added is used, and the effects of all of them run.
#[derive(Default)]
pub struct Recorder {
    rules: Vec<Rule>,
    invocations: Mutex<Vec<Invocation>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to invocations starting with `prefix` with `output`.
    pub fn respond(mut self, prefix: &[&str], output: CommandOutput) -> Self {
        let mut rule = Rule::new(prefix);
        rule.output = Some(output);
        self.rules.push(rule);
        self
    }

    /// Make invocations starting with `prefix` fail.
    pub fn fail(self, prefix: &[&str]) -> Self {
        self.respond(prefix, CommandOutput::failure(""))
    }

    /// Simulate `effect` whenever an invocation starting with `prefix` runs.
    pub fn on(
        mut self,
        prefix: &[&str],
        effect: impl Fn(&Invocation) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        let mut rule = Rule::new(prefix);
        rule.effect = Some(Box::new(effect));
        self.rules.push(rule);
        self
    }

    /// All invocations so far, in order.
    pub async fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().await.clone()
    }

    async fn handle(&self, invocation: &Invocation) -> Result<CommandOutput, Error> {
        tracing::info!("recording {invocation}");
        self.invocations.lock().await.push(invocation.clone());

        let mut output = None;
        for rule in self.rules.iter().filter(|rule| rule.matches(invocation)) {
            if let Some(effect) = &rule.effect {
                effect(invocation)?;
            }
            if output.is_none() {
                output = rule.output.clone();
            }
        }
        Ok(output.unwrap_or_else(|| CommandOutput::success("")))
    }
}

#[async_trait]
impl Runner for Recorder {
    async fn run(&self, invocation: &Invocation) -> Result<(), Error> {
        if self.handle(invocation).await?.success {
            Ok(())
        } else {
            Err(Error::msg(format!("command `{invocation}` failed")))
        }
    }

    async fn output(&self, invocation: &Invocation) -> Result<CommandOutput, Error> {
        self.handle(invocation).await
    }
}
