//! Sessions: one interpreter child and the protocol engine driving it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use pybridge_core::{Primitive, is_identifier};
use pybridge_process::{Launcher, Supervisor};
use pybridge_transport::{Command, Message};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, trace, warn};

use crate::bindings::{Binding, BindingTable, HostIterator, HostResult};
use crate::config::SessionConfig;
use crate::default;
use crate::engine::Engine;
use crate::error::SessionError;
use crate::naming::var_name;
use crate::registry::OrphanTable;
use crate::value::Value;

/// Handle to one interpreter session. Clones share the session.
///
/// Calls on a session are strictly one at a time. A call made while another
/// is in flight, including one made from inside a bound host callable,
/// fails with `SessionError::Busy`.
#[derive(Clone)]
pub struct Session(Arc<Inner>);

pub(crate) struct Inner {
    config: SessionConfig,
    launcher: Arc<dyn Launcher>,
    state: Mutex<State>,
    bindings: parking_lot::Mutex<BindingTable>,
    orphans: Arc<parking_lot::Mutex<OrphanTable>>,
    counter: AtomicU32,
    builtins: OnceLock<Builtins>,
    disposed: AtomicBool,
}

enum State {
    Created,
    Running(Box<Engine>),
    Disposed,
}

/// Remote names of `len` and `str`, captured at start.
struct Builtins {
    len: String,
    str: String,
}

impl Session {
    /// Create a session that launches the interpreter described by `config`.
    /// The session becomes the default one.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let launcher = Arc::new(config.launcher());
        Self::with_launcher(config, launcher)
    }

    /// Create a session with a custom launcher.
    #[must_use]
    pub fn with_launcher(config: SessionConfig, launcher: Arc<dyn Launcher>) -> Self {
        let session = Self(Arc::new(Inner {
            config,
            launcher,
            state: Mutex::new(State::Created),
            bindings: parking_lot::Mutex::new(BindingTable::default()),
            orphans: Arc::new(parking_lot::Mutex::new(OrphanTable::default())),
            counter: AtomicU32::new(0),
            builtins: OnceLock::new(),
            disposed: AtomicBool::new(false),
        }));
        default::set(&session);
        session
    }

    /// Create and start a session.
    ///
    /// # Errors
    /// See `start`.
    pub async fn open(config: SessionConfig) -> Result<Self, SessionError> {
        let session = Self::new(config);
        session.start().await?;
        Ok(session)
    }

    /// Launch the interpreter and wait for its handshake.
    ///
    /// # Errors
    ///
    /// - `AlreadyStarted` on a second call, `Disposed` after teardown
    /// - `ChildNotFound` when the interpreter cannot be launched
    /// - `HandshakeMismatch` when a foreign process connects
    /// - `ChildExited` when the child dies before the handshake
    ///
    /// Any failure disposes the session.
    pub async fn start(&self) -> Result<(), SessionError> {
        default::set(self);
        let mut state = self.lock()?;
        match *state {
            State::Created => {}
            State::Running(_) => return Err(SessionError::AlreadyStarted),
            State::Disposed => return Err(SessionError::Disposed),
        }

        let mut supervisor = Supervisor::new(
            Arc::clone(&self.0.launcher),
            self.0.config.supervisor_config(),
        );
        let channel = match supervisor.start().await {
            Ok(channel) => channel,
            Err(e) => {
                self.teardown(&mut state);
                return Err(e.into());
            }
        };
        let engine = Engine::new(supervisor, channel);
        info!(pid = ?engine.child_id(), "Session started");
        *state = State::Running(Box::new(engine));

        let builtins = Builtins {
            len: self.next_var_name(),
            str: self.next_var_name(),
        };
        let code = format!(
            "global {len}, {str}\n{len} = len\n{str} = str\n",
            len = builtins.len,
            str = builtins.str
        );
        let result = match running(&mut state) {
            Ok(engine) => engine.exec(self, &code).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(error = %e, "Builtins setup failed, disposing");
            self.teardown(&mut state);
            return Err(e);
        }
        self.0.builtins.get_or_init(|| builtins);
        Ok(())
    }

    /// Run `code` as a block of statements.
    ///
    /// # Errors
    /// Returns the remote exception raised by `code`, lifecycle errors, or
    /// transport errors (which also dispose the session).
    pub async fn exec(&self, code: &str) -> Result<(), SessionError> {
        self.round_trip(Message::exec(code), Command::Done).await?;
        Ok(())
    }

    /// Evaluate `expression`.
    ///
    /// Eagerly, the value is transferred and returned resolved. Lazily, it
    /// is assigned to a fresh interpreter variable and a proxy to that
    /// variable is returned.
    ///
    /// # Errors
    /// See `exec`.
    pub async fn eval(&self, expression: &str, eager: bool) -> Result<Value, SessionError> {
        if eager {
            let value = self.eval_primitive(expression).await?;
            return Ok(Value::resolved(Some(self.clone()), value));
        }
        let name = self.next_var_name();
        self.exec(&format!("global {name}\n{name} = {expression}\n"))
            .await?;
        Ok(Value::proxy(self, name, false))
    }

    pub(crate) async fn eval_primitive(&self, expression: &str) -> Result<Primitive, SessionError> {
        let response = self
            .round_trip(Message::eval(expression), Command::Res)
            .await?;
        Ok(response.dt.unwrap_or_default())
    }

    /// Bind a host callable as interpreter function `name`. Rebinding a
    /// name replaces the previous callable.
    ///
    /// # Errors
    /// Returns `InvalidIdentifier` for a bad name, or the errors of
    /// defining the function remotely.
    pub async fn bind_callable<F>(&self, name: &str, callable: F) -> Result<Value, SessionError>
    where
        F: Fn(&[Value]) -> HostResult<Value> + Send + Sync + 'static,
    {
        self.bind(name, Binding::Callable(Arc::new(callable))).await
    }

    /// Bind a host generator as interpreter function `name`. Each remote
    /// call starts a new iterator that the interpreter advances one step at
    /// a time.
    ///
    /// # Errors
    /// See `bind_callable`.
    pub async fn bind_generator<F, I>(&self, name: &str, generator: F) -> Result<Value, SessionError>
    where
        F: Fn(&[Value]) -> HostResult<I> + Send + Sync + 'static,
        I: Iterator<Item = HostResult<Value>> + Send + 'static,
    {
        let start = move |args: &[Value]| -> HostResult<HostIterator> {
            let iterator: HostIterator = Box::new(generator(args)?);
            Ok(iterator)
        };
        self.bind(name, Binding::Generator(Arc::new(start))).await
    }

    async fn bind(&self, name: &str, binding: Binding) -> Result<Value, SessionError> {
        if !is_identifier(name) {
            return Err(SessionError::InvalidIdentifier(name.to_string()));
        }
        self.exec(&binding.definition(name)).await?;
        debug!(name, ?binding, "Host binding registered");
        self.0.bindings.lock().insert(name.to_string(), binding);
        Ok(Value::proxy(self, name.to_string(), true))
    }

    /// Proxy for interpreter global `name`. Disposing it does not delete
    /// the global.
    ///
    /// # Errors
    /// Returns `InvalidIdentifier` for a bad name.
    pub fn global(&self, name: &str) -> Result<Value, SessionError> {
        if !is_identifier(name) {
            return Err(SessionError::InvalidIdentifier(name.to_string()));
        }
        Ok(Value::proxy(self, name.to_string(), true))
    }

    /// `None`, tied to this session.
    #[must_use]
    pub fn none(&self) -> Value {
        Value::resolved(Some(self.clone()), Primitive::None)
    }

    /// The interpreter's `len`.
    ///
    /// # Errors
    /// Returns `NotStarted` before `start` has completed, `Disposed` after
    /// teardown.
    pub fn builtin_len(&self) -> Result<Value, SessionError> {
        let builtins = self.builtins()?;
        Ok(Value::proxy(self, builtins.len.clone(), true))
    }

    /// The interpreter's `str`.
    ///
    /// # Errors
    /// Returns `NotStarted` before `start` has completed, `Disposed` after
    /// teardown.
    pub fn builtin_str(&self) -> Result<Value, SessionError> {
        let builtins = self.builtins()?;
        Ok(Value::proxy(self, builtins.str.clone(), true))
    }

    /// Kill the child and release the channel. Idempotent.
    ///
    /// # Errors
    /// Returns `Busy` while a call is in flight.
    pub fn dispose(&self) -> Result<(), SessionError> {
        let mut state = self.lock()?;
        self.teardown(&mut state);
        Ok(())
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.0.disposed.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same session.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn is_inner(&self, inner: &Arc<Inner>) -> bool {
        Arc::ptr_eq(&self.0, inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.0)
    }

    pub(crate) const fn from_inner(inner: Arc<Inner>) -> Self {
        Self(inner)
    }

    pub(crate) fn orphan_table(&self) -> Weak<parking_lot::Mutex<OrphanTable>> {
        Arc::downgrade(&self.0.orphans)
    }

    pub(crate) fn take_orphans(&self) -> Vec<String> {
        self.0.orphans.lock().drain()
    }

    pub(crate) fn binding(&self, name: &str) -> Option<Binding> {
        self.0.bindings.lock().get(name)
    }

    fn next_var_name(&self) -> String {
        var_name(self.0.counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Delete a proxy's remote variable. Failures are logged, not returned.
    pub(crate) async fn delete_var(&self, name: String) {
        let code = format!("globals().pop('{name}', None)\n");
        match self.round_trip(Message::exec(code), Command::Done).await {
            Ok(_) => trace!(%name, "Proxy disposed"),
            Err(SessionError::Busy) => self.0.orphans.lock().push(name),
            Err(SessionError::Disposed | SessionError::NotStarted) => {}
            Err(e) => warn!(%name, error = %e, "Proxy dispose failed"),
        }
    }

    /// Send one request, reaping orphaned proxies first.
    async fn round_trip(&self, request: Message, terminal: Command) -> Result<Message, SessionError> {
        default::set(self);
        let mut state = self.lock()?;
        let result = match running(&mut state) {
            Ok(engine) => match engine.reap(self).await {
                Ok(()) => engine.run(self, request, terminal).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        self.settle(&mut state, result)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, SessionError> {
        self.0.state.try_lock().map_err(|_| SessionError::Busy)
    }

    /// Tear the session down if `result` is a fatal error.
    fn builtins(&self) -> Result<&Builtins, SessionError> {
        if self.is_disposed() {
            return Err(SessionError::Disposed);
        }
        self.0.builtins.get().ok_or(SessionError::NotStarted)
    }

    fn settle<T>(&self, state: &mut State, result: Result<T, SessionError>) -> Result<T, SessionError> {
        if result.as_ref().is_err_and(SessionError::is_fatal) {
            if let Err(ref e) = result {
                error!(error = %e, "Session failed, disposing");
            }
            self.teardown(state);
        }
        result
    }

    fn teardown(&self, state: &mut State) {
        if let State::Running(mut engine) = std::mem::replace(state, State::Disposed) {
            engine.shutdown();
        }
        if !self.0.disposed.swap(true, Ordering::AcqRel) {
            info!("Session disposed");
        }
        default::clear_if(self);
    }
}

fn running(state: &mut State) -> Result<&mut Engine, SessionError> {
    match state {
        State::Running(engine) => Ok(engine),
        State::Created => Err(SessionError::NotStarted),
        State::Disposed => Err(SessionError::Disposed),
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("launch", &self.0.config.launch)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
