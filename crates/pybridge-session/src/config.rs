//! Session configuration.

use std::collections::HashMap;
use std::path::PathBuf;

use pybridge_process::supervisor::DEFAULT_ENDPOINT_PREFIX;
use pybridge_process::{CommandBuilder, LaunchMode, ProcessLauncher, SupervisorConfig};
use pybridge_transport::FrameConfig;
use pybridge_transport::codec::DEFAULT_MAX_PAYLOAD;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// How to launch and talk to the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Interpreter launch mode.
    pub launch: LaunchMode,
    /// Extra driver arguments, passed ahead of the endpoint address.
    pub args: Vec<String>,
    /// Prefix of the endpoint name handed to the child.
    pub endpoint_prefix: String,
    /// Largest frame payload in bytes, in either direction.
    pub max_payload: usize,
    /// Working directory of the child.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables for the child.
    pub env: HashMap<String, String>,
    /// Directory relative launch paths are resolved against.
    pub base_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            launch: LaunchMode::default(),
            args: Vec::new(),
            endpoint_prefix: DEFAULT_ENDPOINT_PREFIX.to_string(),
            max_payload: DEFAULT_MAX_PAYLOAD,
            working_dir: None,
            env: HashMap::new(),
            base_dir: None,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new(launch: LaunchMode) -> Self {
        Self {
            launch,
            ..Self::default()
        }
    }

    /// Parse a JSON configuration. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns `SessionError::Config` if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        Ok(serde_json::from_str(json)?)
    }

    #[must_use]
    pub fn with_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_endpoint_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.endpoint_prefix = prefix.into();
        self
    }

    #[must_use]
    pub const fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub(crate) fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            endpoint_prefix: self.endpoint_prefix.clone(),
            frame: FrameConfig::default().with_max_payload(self.max_payload),
        }
    }

    pub(crate) fn launcher(&self) -> ProcessLauncher {
        let mut command = CommandBuilder::new(self.launch.clone());
        if !self.args.is_empty() {
            command = command.params(self.args.iter().cloned());
        }
        if let Some(ref dir) = self.base_dir {
            command = command.base_dir(dir);
        }
        let mut launcher = ProcessLauncher::new(command).env(self.env.clone());
        if let Some(ref dir) = self.working_dir {
            launcher = launcher.working_dir(dir);
        }
        launcher
    }
}
