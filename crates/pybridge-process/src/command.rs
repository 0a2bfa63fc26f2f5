//! Child command line construction.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resolve::{resolve_executable_path, resolve_relative};

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Interpreter command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Interpreter command is empty after parsing")]
    EmptyCommand,
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),
}

/// How the interpreter child is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LaunchMode {
    /// A self-contained driver executable.
    Executable { path: PathBuf },
    /// An interpreter command line plus a driver script.
    Script { interpreter: String, script: PathBuf },
}

impl Default for LaunchMode {
    fn default() -> Self {
        let driver = if cfg!(windows) { "pyengine.exe" } else { "pyengine" };
        Self::Executable {
            path: PathBuf::from(driver),
        }
    }
}

impl LaunchMode {
    /// Path reported when the launch target cannot be found.
    #[must_use]
    pub fn target(&self) -> &Path {
        match self {
            Self::Executable { path } => path,
            Self::Script { script, .. } => script,
        }
    }
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Resolve the program to an absolute path.
    ///
    /// # Errors
    /// Returns `CommandBuildError::NotFound` if the executable is not found.
    pub async fn into_resolved(
        self,
        base_dir: Option<&Path>,
    ) -> Result<(PathBuf, Vec<String>), CommandBuildError> {
        let Self { program, args } = self;
        let executable = resolve_executable_path(&program, base_dir)
            .await
            .ok_or_else(|| CommandBuildError::NotFound(PathBuf::from(&program)))?;
        Ok((executable, args))
    }
}

/// Builder for the child command line.
///
/// The endpoint address is always the last argument.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    pub mode: LaunchMode,
    /// Extra arguments placed before the endpoint address.
    pub params: Option<Vec<String>>,
    /// Directory searched for relative driver paths.
    pub base_dir: Option<PathBuf>,
}

impl CommandBuilder {
    #[must_use]
    pub const fn new(mode: LaunchMode) -> Self {
        Self {
            mode,
            params: None,
            base_dir: None,
        }
    }

    #[must_use]
    pub fn params<I>(mut self, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.params = Some(params.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Build the command that connects the child to `endpoint`.
    ///
    /// # Errors
    /// Returns error if the interpreter command line is invalid or the
    /// driver script does not exist.
    pub fn build(&self, endpoint: &str) -> Result<CommandParts, CommandBuildError> {
        let mut parts = match &self.mode {
            LaunchMode::Executable { path } => vec![path.display().to_string()],
            LaunchMode::Script {
                interpreter,
                script,
            } => {
                let mut parts = split_command_line(interpreter)?;
                if parts.is_empty() {
                    return Err(CommandBuildError::EmptyCommand);
                }
                let script = resolve_relative(script, self.base_dir.as_deref())
                    .ok_or_else(|| CommandBuildError::NotFound(script.clone()))?;
                parts.push(script.display().to_string());
                parts
            }
        };
        if let Some(ref params) = self.params {
            parts.extend(params.iter().cloned());
        }
        parts.push(endpoint.to_string());

        let program = parts.remove(0);
        Ok(CommandParts::new(program, parts))
    }
}

fn split_command_line(input: &str) -> Result<Vec<String>, CommandBuildError> {
    #[cfg(windows)]
    {
        let parts = winsplit::split(input);
        if parts.is_empty() {
            Err(CommandBuildError::EmptyCommand)
        } else {
            Ok(parts)
        }
    }

    #[cfg(not(windows))]
    {
        shlex::split(input).ok_or_else(|| CommandBuildError::InvalidBase(input.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_script(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pybridge-cmd-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, "pass\n").unwrap();
        path
    }

    #[test]
    fn test_executable_mode_appends_endpoint() {
        let builder = CommandBuilder::new(LaunchMode::Executable {
            path: PathBuf::from("/opt/driver"),
        });
        let parts = builder.build("PyEngine___00000001_00000000").unwrap();
        assert_eq!(parts.program, "/opt/driver");
        assert_eq!(parts.args, vec!["PyEngine___00000001_00000000"]);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_script_mode_splits_interpreter() {
        let script = temp_script("driver_split.py");
        let builder = CommandBuilder::new(LaunchMode::Script {
            interpreter: "python3 -u -X 'utf8'".to_string(),
            script: script.clone(),
        })
        .params(["--quiet"]);
        let parts = builder.build("ep").unwrap();
        assert_eq!(parts.program, "python3");
        assert_eq!(
            parts.args,
            vec![
                "-u".to_string(),
                "-X".to_string(),
                "utf8".to_string(),
                script.display().to_string(),
                "--quiet".to_string(),
                "ep".to_string(),
            ]
        );
    }

    #[test]
    fn test_script_resolved_against_base_dir() {
        let script = temp_script("driver_base.py");
        let base = script.parent().unwrap().to_path_buf();
        let builder = CommandBuilder::new(LaunchMode::Script {
            interpreter: "python3".to_string(),
            script: PathBuf::from("driver_base.py"),
        })
        .base_dir(&base);
        let parts = builder.build("ep").unwrap();
        assert_eq!(parts.args[0], script.display().to_string());
    }

    #[test]
    fn test_missing_script_is_not_found() {
        let builder = CommandBuilder::new(LaunchMode::Script {
            interpreter: "python3".to_string(),
            script: PathBuf::from("definitely_missing_driver.py"),
        })
        .base_dir(std::env::temp_dir());
        assert!(matches!(
            builder.build("ep"),
            Err(CommandBuildError::NotFound(p)) if p.ends_with("definitely_missing_driver.py")
        ));
    }

    #[test]
    fn test_launch_mode_from_json() {
        let mode: LaunchMode = serde_json::from_str(
            r#"{"mode": "script", "interpreter": "python3", "script": "drv.py"}"#,
        )
        .unwrap();
        assert_eq!(mode.target(), Path::new("drv.py"));
        assert!(matches!(LaunchMode::default(), LaunchMode::Executable { .. }));
    }
}
