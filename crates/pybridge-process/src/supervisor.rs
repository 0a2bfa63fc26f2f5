//! Lifecycle of one interpreter child.

use std::sync::Arc;

use pybridge_transport::{Command, Endpoint, FrameConfig, FramedChannel};
use tracing::{debug, info, warn};

use crate::error::ProcessError;
use crate::launcher::{ChildProcess, Launcher};

/// Default endpoint name prefix.
pub const DEFAULT_ENDPOINT_PREFIX: &str = "PyEngine";

/// Supervisor settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub endpoint_prefix: String,
    pub frame: FrameConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            endpoint_prefix: DEFAULT_ENDPOINT_PREFIX.to_string(),
            frame: FrameConfig::default(),
        }
    }
}

enum State {
    Idle,
    Running(Box<dyn ChildProcess>),
    Disposed,
}

/// Brings up exactly one connected, verified child and tears it down.
pub struct Supervisor {
    launcher: Arc<dyn Launcher>,
    config: SupervisorConfig,
    state: State,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Idle => "idle",
            State::Running(_) => "running",
            State::Disposed => "disposed",
        };
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    #[must_use]
    pub fn new(launcher: Arc<dyn Launcher>, config: SupervisorConfig) -> Self {
        Self {
            launcher,
            config,
            state: State::Idle,
        }
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        matches!(self.state, State::Disposed)
    }

    /// OS pid of the running child.
    #[must_use]
    pub fn child_id(&self) -> Option<u32> {
        match &self.state {
            State::Running(child) => child.id(),
            _ => None,
        }
    }

    /// Spawn the child, wait for its connection and verify its handshake.
    ///
    /// # Errors
    ///
    /// - `AlreadyStarted` / `Disposed` when not idle
    /// - `ChildNotFound` when the interpreter or driver is missing
    /// - `ChildExited` when the child dies before connecting
    /// - `HandshakeMismatch` when the first message is not `ready` with the
    ///   child's pid
    ///
    /// Any failure after the spawn leaves the supervisor disposed.
    pub async fn start(&mut self) -> Result<FramedChannel, ProcessError> {
        match self.state {
            State::Idle => {}
            State::Running(_) => return Err(ProcessError::AlreadyStarted),
            State::Disposed => return Err(ProcessError::Disposed),
        }

        let endpoint = Endpoint::bind(&self.config.endpoint_prefix).map_err(ProcessError::Endpoint)?;
        let address = endpoint.address();
        let mut child = match self.launcher.launch(&address).await {
            Ok(child) => child,
            Err(e) => {
                self.state = State::Disposed;
                return Err(e);
            }
        };

        let result = Self::connect(endpoint, child.as_mut(), self.config.frame).await;
        self.state = State::Running(child);
        match result {
            Ok(channel) => {
                info!(pid = ?self.child_id(), endpoint = %address, "Interpreter connected");
                Ok(channel)
            }
            Err(e) => {
                warn!(error = %e, "Interpreter start failed");
                self.shutdown();
                Err(e)
            }
        }
    }

    async fn connect(
        endpoint: Endpoint,
        child: &mut dyn ChildProcess,
        frame: FrameConfig,
    ) -> Result<FramedChannel, ProcessError> {
        let expected = child.id();
        let mut channel = tokio::select! {
            accepted = endpoint.accept(frame) => accepted.map_err(ProcessError::Endpoint)?,
            status = child.wait() => {
                let status = status.map_or_else(|e| e.to_string(), |s| s);
                return Err(ProcessError::ChildExited { status });
            }
        };

        let ready = channel.recv().await?;
        let received = ready.data().as_i64();
        let matches = ready.cm == Command::Ready
            && expected.is_some()
            && received == expected.map(i64::from);
        if !matches {
            channel.close().await;
            return Err(ProcessError::HandshakeMismatch {
                expected: expected.unwrap_or_default(),
                received: format!("{} {}", ready.cm, ready.data()),
            });
        }
        debug!(pid = ?expected, "Handshake complete");
        Ok(channel)
    }

    /// Kill the child and mark the supervisor disposed. Idempotent.
    pub fn shutdown(&mut self) {
        match std::mem::replace(&mut self.state, State::Disposed) {
            State::Running(mut child) => {
                let pid = child.id();
                // The child may already be gone.
                if let Err(e) = child.start_kill() {
                    debug!(?pid, error = %e, "Kill failed");
                }
                info!(?pid, "Interpreter stopped");
            }
            State::Idle | State::Disposed => {}
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use pybridge_core::Primitive;
    use pybridge_transport::Message;
    use tokio::sync::oneshot;

    use super::*;

    struct FakeChild {
        pid: u32,
        killed: Arc<AtomicBool>,
        exit: Option<oneshot::Receiver<()>>,
    }

    #[async_trait]
    impl ChildProcess for FakeChild {
        fn id(&self) -> Option<u32> {
            Some(self.pid)
        }

        fn start_kill(&mut self) -> io::Result<()> {
            self.killed.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn wait(&mut self) -> io::Result<String> {
            match self.exit.take() {
                Some(rx) => {
                    let _ = rx.await;
                    Ok("exit status: 1".to_string())
                }
                None => std::future::pending().await,
            }
        }
    }

    /// Connects from a task and sends `ready` with `sent_pid`, or exits
    /// without connecting when `sent_pid` is `None`.
    struct FakeLauncher {
        pid: u32,
        sent_pid: Option<i64>,
        killed: Arc<AtomicBool>,
    }

    impl FakeLauncher {
        fn new(pid: u32, sent_pid: Option<i64>) -> Arc<Self> {
            Arc::new(Self {
                pid,
                sent_pid,
                killed: Arc::new(AtomicBool::new(false)),
            })
        }
    }

    #[async_trait]
    impl Launcher for FakeLauncher {
        async fn launch(&self, endpoint: &str) -> Result<Box<dyn ChildProcess>, ProcessError> {
            let exit = if let Some(pid) = self.sent_pid {
                let address = endpoint.to_string();
                tokio::spawn(async move {
                    let mut channel = Endpoint::connect(&address, FrameConfig::default())
                        .await
                        .unwrap();
                    channel
                        .send(&Message::new(Command::Ready).with_data(Primitive::Int(pid)))
                        .await
                        .unwrap();
                    // Hold the connection open until the host hangs up.
                    let _ = channel.recv().await;
                });
                None
            } else {
                let (tx, rx) = oneshot::channel();
                let _ = tx.send(());
                Some(rx)
            };
            Ok(Box::new(FakeChild {
                pid: self.pid,
                killed: Arc::clone(&self.killed),
                exit,
            }))
        }
    }

    #[tokio::test]
    async fn test_start_verifies_pid_handshake() {
        let launcher = FakeLauncher::new(4242, Some(4242));
        let mut supervisor = Supervisor::new(launcher.clone(), SupervisorConfig::default());
        let _channel = supervisor.start().await.unwrap();
        assert!(supervisor.is_running());
        assert_eq!(supervisor.child_id(), Some(4242));

        assert!(matches!(
            supervisor.start().await,
            Err(ProcessError::AlreadyStarted)
        ));

        supervisor.shutdown();
        supervisor.shutdown();
        assert!(supervisor.is_disposed());
        assert!(launcher.killed.load(Ordering::SeqCst));
        assert!(matches!(supervisor.start().await, Err(ProcessError::Disposed)));
    }

    #[tokio::test]
    async fn test_foreign_pid_is_handshake_mismatch() {
        let launcher = FakeLauncher::new(4242, Some(1));
        let mut supervisor = Supervisor::new(launcher.clone(), SupervisorConfig::default());
        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(
            err,
            ProcessError::HandshakeMismatch { expected: 4242, .. }
        ));
        assert!(supervisor.is_disposed());
        assert!(launcher.killed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_child_exit_before_connect() {
        let launcher = FakeLauncher::new(7, None);
        let mut supervisor = Supervisor::new(launcher, SupervisorConfig::default());
        assert!(matches!(
            supervisor.start().await,
            Err(ProcessError::ChildExited { .. })
        ));
        assert!(supervisor.is_disposed());
    }

    #[tokio::test]
    async fn test_drop_kills_child() {
        let launcher = FakeLauncher::new(9, Some(9));
        {
            let mut supervisor = Supervisor::new(launcher.clone(), SupervisorConfig::default());
            let _channel = supervisor.start().await.unwrap();
        }
        assert!(launcher.killed.load(Ordering::SeqCst));
    }
}
