//! Migration step execution through an external command

use async_trait::async_trait;
use spacemig_core::{ExecutorSettings, StepError, StepExecutor, StepTarget};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Lines of stderr kept in a step error
const STDERR_TAIL: usize = 20;

/// Runs one migration file by spawning the configured program
///
/// Argument templates may contain `{space_id}`, `{environment_id}`,
/// `{access_token}` and `{file}`.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    /// Create an executor from settings
    #[must_use]
    pub fn new(settings: &ExecutorSettings) -> Self {
        Self {
            program: settings.program.clone(),
            args: settings.args.clone(),
        }
    }

    /// Arguments for one step with placeholders substituted
    #[must_use]
    pub fn command_args(&self, file: &Path, target: &StepTarget) -> Vec<String> {
        let file = file.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{space_id}", &target.space_id)
                    .replace("{environment_id}", target.environment_id.as_str())
                    .replace("{access_token}", &target.access_token)
                    .replace("{file}", &file)
            })
            .collect()
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[async_trait]
impl StepExecutor for CommandExecutor {
    async fn run_step(&self, file: &Path, target: &StepTarget) -> Result<(), StepError> {
        tracing::debug!("Spawning {} for {}", self.program, file.display());

        let output = Command::new(&self.program)
            .args(self.command_args(file, target))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| StepError::new(format!("failed to start {}: {}", self.program, e)))?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!("{}", line);
        }

        if output.status.success() {
            return Ok(());
        }

        let stderr = tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL);
        Err(StepError::new(format!(
            "{} exited with {}: {}",
            self.program, output.status, stderr
        )))
    }
}
