/// In-memory command runner for tests
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{CmdRunner, CommandBuilder, CommandOutput};
use crate::error::Result;

type Handler = Box<dyn Fn(&[String]) -> CommandOutput + Send + Sync>;

/// Records every invocation and answers from a closure
pub struct FakeCmdRunner {
    handler: Handler,
    calls: Mutex<Vec<CommandBuilder>>,
    missing: HashSet<String>,
}

impl FakeCmdRunner {
    /// Create a runner whose commands all succeed with the handler's output
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&[String]) -> CommandOutput + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            missing: HashSet::new(),
        }
    }

    /// Pretend the given programs are not on PATH
    pub fn with_missing<I, S>(mut self, programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.missing.extend(programs.into_iter().map(Into::into));
        self
    }

    /// Argv of every invocation, in order
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().iter().map(|c| c.argv()).collect()
    }

    /// Argv of the most recent invocation
    pub fn last_args(&self) -> Vec<String> {
        self.calls().pop().unwrap_or_default()
    }

    /// Stdin payload of the most recent invocation
    pub fn last_stdin(&self) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .and_then(|c| c.stdin_payload().map(str::to_string))
    }

    fn record(&self, cmd: CommandBuilder) -> CommandOutput {
        let argv = cmd.argv();
        self.calls.lock().unwrap().push(cmd);
        (self.handler)(&argv)
    }
}

#[async_trait]
impl CmdRunner for FakeCmdRunner {
    fn look_path(&self, program: &str) -> Option<PathBuf> {
        if self.missing.contains(program) {
            None
        } else {
            Some(PathBuf::from("/usr/local/bin").join(program))
        }
    }

    async fn output(&self, _ctx: &CancellationToken, cmd: CommandBuilder) -> Result<CommandOutput> {
        Ok(self.record(cmd))
    }

    async fn run_io(&self, _ctx: &CancellationToken, cmd: CommandBuilder) -> Result<()> {
        let program = cmd.program().to_string();
        self.record(cmd).into_result(&program).map(|_| ())
    }
}
