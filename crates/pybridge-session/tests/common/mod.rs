//! Scripted interpreter peer for session tests.
//!
//! `ScriptedLauncher` stands in for the interpreter process: it connects to
//! the host endpoint from a task, completes the handshake and hands the
//! connected `Peer` to the test, which then plays the interpreter's side of
//! the conversation message by message.

#![allow(dead_code)]

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use pybridge_core::{ErrorPayload, Primitive, TracebackFrame};
use pybridge_process::{ChildProcess, Launcher, ProcessError};
use pybridge_session::{Session, SessionConfig};
use pybridge_transport::{Command, Endpoint, FrameConfig, FramedChannel, Message};
use tokio::sync::mpsc;

pub const PID: u32 = 31337;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pybridge=trace")
        .with_test_writer()
        .try_init();
}

struct FakeChild {
    killed: Arc<AtomicBool>,
}

#[async_trait]
impl ChildProcess for FakeChild {
    fn id(&self) -> Option<u32> {
        Some(PID)
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<String> {
        std::future::pending().await
    }
}

pub struct ScriptedLauncher {
    pub killed: Arc<AtomicBool>,
    peers: mpsc::UnboundedSender<Peer>,
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn launch(&self, endpoint: &str) -> Result<Box<dyn ChildProcess>, ProcessError> {
        let address = endpoint.to_string();
        let peers = self.peers.clone();
        tokio::spawn(async move {
            let mut channel = Endpoint::connect(&address, FrameConfig::default())
                .await
                .unwrap();
            channel
                .send(&Message::new(Command::Ready).with_data(Primitive::Int(i64::from(PID))))
                .await
                .unwrap();
            let _ = peers.send(Peer { channel });
        });
        Ok(Box::new(FakeChild {
            killed: Arc::clone(&self.killed),
        }))
    }
}

/// A session backed by a scripted peer, plus the receiver the peer arrives
/// on once the session starts.
pub fn scripted_session(
    config: SessionConfig,
) -> (Session, Arc<ScriptedLauncher>, mpsc::UnboundedReceiver<Peer>) {
    init_tracing();
    let (tx, rx) = mpsc::unbounded_channel();
    let launcher = Arc::new(ScriptedLauncher {
        killed: Arc::new(AtomicBool::new(false)),
        peers: tx,
    });
    let session = Session::with_launcher(config, launcher.clone());
    (session, launcher, rx)
}

/// The interpreter's end of the channel.
pub struct Peer {
    channel: FramedChannel,
}

impl Peer {
    /// Wait for the peer and answer the builtins setup that every session
    /// sends right after the handshake.
    pub async fn connect(peers: &mut mpsc::UnboundedReceiver<Peer>) -> Self {
        let mut peer = peers.recv().await.unwrap();
        let setup = peer.expect(Command::Exec).await;
        assert!(setup.data_str().unwrap().starts_with("global ___pye_var___"));
        peer.done().await;
        peer
    }

    /// Next message from the host. Orphan reaping is answered on the fly.
    pub async fn recv(&mut self) -> Message {
        loop {
            let message = self.channel.recv().await.unwrap();
            let is_reap = message.cm == Command::Exec
                && message.data_str().is_some_and(|code| code.starts_with("for ___pye_n in"));
            if !is_reap {
                return message;
            }
            self.done().await;
        }
    }

    /// Next message from the host, reaping included.
    pub async fn recv_raw(&mut self) -> Message {
        self.channel.recv().await.unwrap()
    }

    pub async fn expect(&mut self, cm: Command) -> Message {
        let message = self.recv().await;
        assert_eq!(message.cm, cm, "unexpected message {message:?}");
        message
    }

    /// Expect `cm` carrying exactly `text`.
    pub async fn expect_text(&mut self, cm: Command, text: &str) -> Message {
        let message = self.expect(cm).await;
        assert_eq!(message.data_str(), Some(text));
        message
    }

    /// Expect a lazy evaluation and return the variable it assigns.
    pub async fn expect_assignment(&mut self, expression: &str) -> String {
        let message = self.expect(Command::Exec).await;
        let code = message.data_str().unwrap();
        let name = code
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("global "))
            .unwrap()
            .to_string();
        assert_eq!(code, format!("global {name}\n{name} = {expression}\n"));
        self.done().await;
        name
    }

    /// Expect the host to release remote variable `name`.
    pub async fn expect_release(&mut self, name: &str) {
        self.expect_text(Command::Exec, &format!("globals().pop('{name}', None)\n"))
            .await;
        self.done().await;
    }

    /// Expect the argument fetches of a `call` and answer them with `args`.
    pub async fn serve_args(&mut self, args: &[Primitive]) {
        self.expect_text(Command::Eval, "len(___pye_args)").await;
        self.res(Primitive::Int(i64::try_from(args.len()).unwrap()))
            .await;
        for (index, arg) in args.iter().enumerate() {
            self.expect_text(Command::Eval, &format!("___pye_args[{index}]"))
                .await;
            self.res(arg.clone()).await;
        }
    }

    pub async fn send(&mut self, message: Message) {
        self.channel.send(&message).await.unwrap();
    }

    pub async fn done(&mut self) {
        self.send(Message::new(Command::Done)).await;
    }

    pub async fn res(&mut self, value: impl Into<Primitive>) {
        self.send(Message::new(Command::Res).with_data(value)).await;
    }

    /// Raise an interpreter exception.
    pub async fn raise(&mut self, bucket: &str, type_name: &str, message: &str) {
        let payload = ErrorPayload {
            bucket: bucket.to_string(),
            type_name: type_name.to_string(),
            message: message.to_string(),
            traceback: vec![
                TracebackFrame::new("<string>", 1, "<module>").with_text("d['missing']"),
            ],
        };
        self.send(Message::new(Command::Err).with_data(payload.to_primitive()))
            .await;
    }
}
