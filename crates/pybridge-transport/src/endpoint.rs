//! Local endpoint the child connects to.
//!
//! Names have the form `<prefix>___<host_pid>_<index>`, both numbers as
//! 8-digit upper-case hex. The index comes from a process-wide counter, so
//! concurrent sessions in one host never share a name. On Unix the endpoint
//! is a domain socket in the temp directory; on Windows it is a named pipe.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::debug;

use crate::channel::FramedChannel;
use crate::codec::FrameConfig;

static NEXT_INDEX: AtomicU32 = AtomicU32::new(0);

/// Unique endpoint name for one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointName {
    prefix: String,
    pid: u32,
    index: u32,
}

impl EndpointName {
    /// Allocate the next name for this host process.
    #[must_use]
    pub fn next(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            pid: std::process::id(),
            index: NEXT_INDEX.fetch_add(1, Ordering::Relaxed),
        }
    }

    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Display for EndpointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}___{:08X}_{:08X}", self.prefix, self.pid, self.index)
    }
}

/// A bound endpoint waiting for exactly one connection.
#[derive(Debug)]
pub struct Endpoint {
    name: EndpointName,
    inner: imp::Listener,
}

impl Endpoint {
    /// Bind a fresh endpoint.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the socket or pipe cannot be created.
    pub fn bind(prefix: &str) -> io::Result<Self> {
        let name = EndpointName::next(prefix);
        let inner = imp::Listener::bind(&name.to_string())?;
        debug!(endpoint = %name, address = %inner.address(), "Endpoint bound");
        Ok(Self { name, inner })
    }

    #[must_use]
    pub const fn name(&self) -> &EndpointName {
        &self.name
    }

    /// Argument handed to the child so it can connect: the socket path on
    /// Unix, the pipe name on Windows.
    #[must_use]
    pub fn address(&self) -> String {
        self.inner.address()
    }

    /// Wait for the single connection and wrap it.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if accepting fails.
    pub async fn accept(self, config: FrameConfig) -> io::Result<FramedChannel> {
        let channel = self.inner.accept(config).await?;
        debug!(endpoint = %self.name, "Child connected");
        Ok(channel)
    }

    /// Connect to an endpoint address as the child would.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if nothing is listening.
    pub async fn connect(address: &str, config: FrameConfig) -> io::Result<FramedChannel> {
        imp::connect(address, config).await
    }
}

#[cfg(unix)]
mod imp {
    use std::io;
    use std::path::PathBuf;

    use tokio::net::{UnixListener, UnixStream};

    use crate::channel::FramedChannel;
    use crate::codec::FrameConfig;

    #[derive(Debug)]
    pub struct Listener {
        path: PathBuf,
        listener: UnixListener,
    }

    impl Listener {
        pub fn bind(name: &str) -> io::Result<Self> {
            let path = std::env::temp_dir().join(format!("{name}.sock"));
            // A stale socket from a crashed host with a recycled pid.
            let _ = std::fs::remove_file(&path);
            let listener = UnixListener::bind(&path)?;
            Ok(Self { path, listener })
        }

        pub fn address(&self) -> String {
            self.path.display().to_string()
        }

        pub async fn accept(&self, config: FrameConfig) -> io::Result<FramedChannel> {
            let (stream, _) = self.listener.accept().await?;
            Ok(FramedChannel::new(stream, config))
        }
    }

    impl Drop for Listener {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    pub async fn connect(address: &str, config: FrameConfig) -> io::Result<FramedChannel> {
        let stream = UnixStream::connect(address).await?;
        Ok(FramedChannel::new(stream, config))
    }
}

#[cfg(windows)]
mod imp {
    use std::io;

    use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeServer, ServerOptions};
    use tokio::sync::Mutex;

    use crate::channel::FramedChannel;
    use crate::codec::FrameConfig;

    #[derive(Debug)]
    pub struct Listener {
        name: String,
        server: Mutex<Option<NamedPipeServer>>,
    }

    fn pipe_path(name: &str) -> String {
        format!(r"\\.\pipe\{name}")
    }

    impl Listener {
        pub fn bind(name: &str) -> io::Result<Self> {
            let server = ServerOptions::new()
                .first_pipe_instance(true)
                .create(pipe_path(name))?;
            Ok(Self {
                name: name.to_string(),
                server: Mutex::new(Some(server)),
            })
        }

        pub fn address(&self) -> String {
            self.name.clone()
        }

        pub async fn accept(&self, config: FrameConfig) -> io::Result<FramedChannel> {
            let server = self
                .server
                .lock()
                .await
                .take()
                .ok_or_else(|| io::Error::new(io::ErrorKind::AddrInUse, "pipe already accepted"))?;
            server.connect().await?;
            Ok(FramedChannel::new(server, config))
        }
    }

    pub async fn connect(address: &str, config: FrameConfig) -> io::Result<FramedChannel> {
        let client = ClientOptions::new().open(pipe_path(address))?;
        Ok(FramedChannel::new(client, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Command, Message};
    use pybridge_core::Primitive;

    #[test]
    fn test_names_are_unique_and_formatted() {
        let a = EndpointName::next("PyEngine");
        let b = EndpointName::next("PyEngine");
        assert_ne!(a, b);
        assert!(b.index() > a.index());

        let text = a.to_string();
        let (prefix, rest) = text.split_once("___").unwrap();
        assert_eq!(prefix, "PyEngine");
        let (pid, index) = rest.split_once('_').unwrap();
        assert_eq!(pid, format!("{:08X}", std::process::id()));
        assert_eq!(index.len(), 8);
        assert!(index.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[tokio::test]
    async fn test_accepts_one_connection() {
        let endpoint = Endpoint::bind("PyBridgeTest").unwrap();
        let address = endpoint.address();
        let config = FrameConfig::default();

        let child = tokio::spawn(async move {
            let mut channel = Endpoint::connect(&address, config).await.unwrap();
            channel
                .send(&Message::new(Command::Ready).with_data(Primitive::Int(1)))
                .await
                .unwrap();
        });

        let mut host = endpoint.accept(config).await.unwrap();
        let ready = host.recv().await.unwrap();
        assert_eq!(ready.cm, Command::Ready);
        child.await.unwrap();
    }
}
