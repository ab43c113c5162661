// ABOUTME: Command task that runs a program or shell script inside the workspace
// ABOUTME: Captures exit code, stdout and stderr as the task payload

use anyhow::{anyhow, bail, Context as _};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

use super::{parse_config, TaskFactory, Workspace};
use crate::engine::error::{ExecutionError, Result};
use crate::engine::{ExecutionContext, TaskBody};

/// Configuration for command tasks
///
/// ```yaml
/// type: command
/// config:
///   command: ./scripts/login.sh
///   args: ["--headless"]
///   env:
///     PORTAL_USER: robot
/// ```
///
/// or, with `script`, a snippet run through `shell -c`. String-valued run
/// variables are exported as `CONDUCTOR_<KEY>` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Program to execute. Mutually exclusive with `script`.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// Shell snippet. Mutually exclusive with `command`.
    #[serde(default)]
    pub script: Option<String>,

    #[serde(default = "default_shell")]
    pub shell: String,

    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Relative to the workspace root
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default = "default_expected_exit_codes")]
    pub expected_exit_codes: Vec<i32>,
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

fn default_expected_exit_codes() -> Vec<i32> {
    vec![0]
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            script: None,
            shell: default_shell(),
            env: HashMap::new(),
            working_dir: None,
            expected_exit_codes: default_expected_exit_codes(),
        }
    }
}

impl CommandConfig {
    pub fn validate(&self, task_id: &str) -> Result<()> {
        let invalid = |reason: &str| ExecutionError::InvalidConfiguration {
            task_id: task_id.to_string(),
            reason: reason.to_string(),
        };

        match (&self.command, &self.script) {
            (None, None) => Err(invalid("either 'command' or 'script' must be provided")),
            (Some(_), Some(_)) => Err(invalid(
                "cannot specify both 'command' and 'script' - use only one",
            )),
            (Some(command), None) if command.trim().is_empty() => {
                Err(invalid("command cannot be empty"))
            }
            (None, Some(script)) if script.trim().is_empty() => {
                Err(invalid("script cannot be empty"))
            }
            (None, Some(_)) if self.shell.trim().is_empty() => {
                Err(invalid("shell cannot be empty when using script mode"))
            }
            _ => Ok(()),
        }
    }
}

pub struct CommandFactory;

impl TaskFactory<Workspace> for CommandFactory {
    fn task_type(&self) -> &'static str {
        "command"
    }

    fn validate_config(&self, task_id: &str, config: &serde_yaml::Value) -> Result<()> {
        parse_config::<CommandConfig>(task_id, config)?.validate(task_id)
    }

    fn create(
        &self,
        task_id: &str,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn TaskBody<Workspace>>> {
        let config: CommandConfig = parse_config(task_id, config)?;
        Ok(Arc::new(CommandTask::new(config)))
    }
}

pub struct CommandTask {
    config: CommandConfig,
}

impl CommandTask {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    fn build_command(&self, context: &ExecutionContext<Workspace>) -> anyhow::Result<Command> {
        let mut cmd = match (&self.config.command, &self.config.script) {
            (Some(program), None) => {
                let mut cmd = Command::new(program);
                cmd.args(&self.config.args);
                cmd
            }
            (None, Some(script)) => {
                let mut cmd = Command::new(&self.config.shell);
                cmd.arg("-c").arg(script);
                cmd
            }
            _ => bail!("either 'command' or 'script' must be provided"),
        };

        let workspace = context.resource();
        let working_dir = match self.config.working_dir {
            Some(ref dir) => workspace.root.join(dir),
            None => workspace.root.clone(),
        };
        cmd.current_dir(working_dir);

        if let Some(variables) = context.config().as_object() {
            for (key, value) in variables {
                if let Some(value) = value.as_str() {
                    cmd.env(format!("CONDUCTOR_{}", key.to_uppercase()), value);
                }
            }
        }
        cmd.envs(&self.config.env);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        Ok(cmd)
    }
}

#[async_trait]
impl TaskBody<Workspace> for CommandTask {
    async fn run(&self, context: ExecutionContext<Workspace>) -> anyhow::Result<Value> {
        let mut cmd = self.build_command(&context)?;
        context.logger().debug(format!("running {:?}", cmd.as_std()));

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                context.logger().error(format!("failed to spawn command: {}", e));
                return Err(e).context("failed to spawn command");
            }
        };

        // Dropping the output future kills the child, so a cancelled attempt
        // does not leave the process behind.
        let output = tokio::select! {
            output = child.wait_with_output() => output.context("failed to wait for command")?,
            _ = context.cancellation().cancelled() => {
                return Err(anyhow!("command cancelled"));
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !self.config.expected_exit_codes.contains(&exit_code) {
            context
                .logger()
                .warn(format!("command exited with unexpected code {}", exit_code));
            let detail = stderr.trim();
            if detail.is_empty() {
                bail!(
                    "command exited with unexpected code {} (expected one of {:?})",
                    exit_code,
                    self.config.expected_exit_codes
                );
            }
            bail!(
                "command exited with unexpected code {} (expected one of {:?}): {}",
                exit_code,
                self.config.expected_exit_codes,
                detail
            );
        }

        context
            .logger()
            .info(format!("command exited with code {}", exit_code));
        Ok(json!({
            "exit_code": exit_code,
            "stdout": stdout,
            "stderr": stderr,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(root: &std::path::Path, config: Value) -> ExecutionContext<Workspace> {
        ExecutionContext::new(
            "test".to_string(),
            "run_1".to_string(),
            Arc::new(Workspace::new(root)),
            config,
        )
        .for_task("cmd", 1)
    }

    #[test]
    fn test_config_validation() {
        let both = CommandConfig {
            command: Some("echo".to_string()),
            script: Some("echo hi".to_string()),
            ..Default::default()
        };
        assert!(both.validate("cmd").is_err());
        assert!(CommandConfig::default().validate("cmd").is_err());

        let empty = CommandConfig {
            command: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(empty.validate("cmd").is_err());

        let ok = CommandConfig {
            script: Some("echo hi".to_string()),
            ..Default::default()
        };
        assert!(ok.validate("cmd").is_ok());
    }

    #[tokio::test]
    async fn test_simple_command_execution() {
        let dir = tempfile::tempdir().unwrap();
        let task = CommandTask::new(CommandConfig {
            command: Some("echo".to_string()),
            args: vec!["hello world".to_string()],
            ..Default::default()
        });

        let output = task.run(context(dir.path(), Value::Null)).await.unwrap();

        assert_eq!(output["exit_code"], json!(0));
        assert!(output["stdout"].as_str().unwrap().contains("hello world"));
    }

    #[tokio::test]
    async fn test_script_sees_run_variables_and_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "present").unwrap();

        let task = CommandTask::new(CommandConfig {
            script: Some("cat marker.txt; echo \" $CONDUCTOR_PORTAL\"".to_string()),
            ..Default::default()
        });

        let output = task
            .run(context(dir.path(), json!({"portal": "staging"})))
            .await
            .unwrap();

        assert_eq!(output["stdout"].as_str().unwrap().trim(), "present staging");
    }

    #[tokio::test]
    async fn test_unexpected_exit_code_fails() {
        let dir = tempfile::tempdir().unwrap();
        let task = CommandTask::new(CommandConfig {
            script: Some("echo 'session expired' >&2; exit 3".to_string()),
            ..Default::default()
        });

        let err = task
            .run(context(dir.path(), Value::Null))
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("unexpected code 3"));
        assert!(err.contains("session expired"));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let task = CommandTask::new(CommandConfig {
            command: Some("conductor-no-such-program".to_string()),
            ..Default::default()
        });

        let err = task
            .run(context(dir.path(), Value::Null))
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("failed to spawn command"));
    }

    #[tokio::test]
    async fn test_expected_exit_codes_override() {
        let dir = tempfile::tempdir().unwrap();
        let task = CommandTask::new(CommandConfig {
            script: Some("exit 1".to_string()),
            expected_exit_codes: vec![0, 1],
            ..Default::default()
        });

        let output = task.run(context(dir.path(), Value::Null)).await.unwrap();
        assert_eq!(output["exit_code"], json!(1));
    }
}
