//! Spawning the interpreter child.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use tracing::{debug, info};

use crate::command::{CommandBuildError, CommandBuilder};
use crate::error::ProcessError;

/// A running child the supervisor can identify, await and kill.
#[async_trait]
pub trait ChildProcess: Send {
    /// OS process id, if the child is still running.
    fn id(&self) -> Option<u32>;

    /// Request termination without waiting for it.
    ///
    /// # Errors
    /// Returns the OS error if the signal cannot be delivered.
    fn start_kill(&mut self) -> io::Result<()>;

    /// Wait for the child to exit and describe its status.
    ///
    /// # Errors
    /// Returns the OS error if waiting fails.
    async fn wait(&mut self) -> io::Result<String>;
}

/// Trait for interpreter launchers.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Spawn a child that will connect to `endpoint`.
    async fn launch(&self, endpoint: &str) -> Result<Box<dyn ChildProcess>, ProcessError>;
}

/// Launches a real process in its own process group.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    command: CommandBuilder,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl ProcessLauncher {
    #[must_use]
    pub const fn new(command: CommandBuilder) -> Self {
        Self {
            command,
            working_dir: None,
            env: Vec::new(),
        }
    }

    #[must_use]
    pub const fn command(&self) -> &CommandBuilder {
        &self.command
    }

    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, endpoint: &str) -> Result<Box<dyn ChildProcess>, ProcessError> {
        let not_found = |path: PathBuf| ProcessError::ChildNotFound { path };
        let parts = self.command.build(endpoint).map_err(|e| match e {
            CommandBuildError::NotFound(path) => not_found(path),
            other => other.into(),
        })?;
        let (program, args) = parts
            .into_resolved(self.command.base_dir.as_deref())
            .await
            .map_err(|e| match e {
                CommandBuildError::NotFound(path) => not_found(path),
                other => other.into(),
            })?;

        let mut command = tokio::process::Command::new(&program);
        command
            .args(&args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }

        debug!(program = %program.display(), ?args, "Spawning interpreter");
        let child = command.group_spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                not_found(program.clone())
            } else {
                ProcessError::SpawnFailed(e)
            }
        })?;
        info!(pid = ?child.id(), program = %program.display(), "Interpreter spawned");
        Ok(Box::new(GroupChild(child)))
    }
}

struct GroupChild(AsyncGroupChild);

#[async_trait]
impl ChildProcess for GroupChild {
    fn id(&self) -> Option<u32> {
        self.0.id()
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.0.start_kill()
    }

    async fn wait(&mut self) -> io::Result<String> {
        self.0.wait().await.map(|status| status.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::LaunchMode;

    #[tokio::test]
    async fn test_missing_executable_is_child_not_found() {
        let launcher = ProcessLauncher::new(CommandBuilder::new(LaunchMode::Executable {
            path: PathBuf::from("pybridge-missing-driver-xyz"),
        }));
        let err = launcher.launch("ep").await.err().unwrap();
        assert!(matches!(
            err,
            ProcessError::ChildNotFound { ref path } if path.ends_with("pybridge-missing-driver-xyz")
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawned_child_can_be_killed() {
        let launcher = ProcessLauncher::new(CommandBuilder::new(LaunchMode::Script {
            interpreter: "sh".to_string(),
            script: {
                let path = std::env::temp_dir().join(format!("pybridge-sleep-{}.sh", std::process::id()));
                std::fs::write(&path, "sleep 30\n").unwrap();
                path
            },
        }));
        let mut child = launcher.launch("ep").await.unwrap();
        assert!(child.id().is_some());
        child.start_kill().unwrap();
        let status = child.wait().await.unwrap();
        assert!(!status.is_empty());
    }
}
