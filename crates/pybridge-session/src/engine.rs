//! Protocol engine: the exec/eval command loop.
//!
//! Each request is sent and then answered by exactly one terminal message
//! (`done` for `exec`, `res` for `eval`) or by `err`. Before that the child
//! may send any number of `call` and `step` messages, which the engine
//! answers by running host bindings. Answering a `call` needs the call's
//! arguments, which the engine fetches with nested `eval` requests, so the
//! loop is re-entered through `run`.

use futures::FutureExt;
use futures::future::BoxFuture;
use pybridge_core::{ErrorPayload, HostError, Primitive, RemoteException, TracebackFrame};
use pybridge_process::Supervisor;
use pybridge_transport::{Command, FramedChannel, Message};
use tracing::{debug, trace, warn};

use crate::bindings::{ActiveGenerators, Binding, HostResult, Step};
use crate::error::SessionError;
use crate::naming::{ARGS_VAR, REAP_VAR};
use crate::registry::ErrorRegistry;
use crate::session::Session;
use crate::value::Value;

/// File name of the frame added to host error tracebacks.
const HOST_FRAME_FILE: &str = "<host>";

pub(crate) struct Engine {
    supervisor: Supervisor,
    channel: FramedChannel,
    generators: ActiveGenerators,
    errors: ErrorRegistry,
}

impl Engine {
    pub(crate) fn new(supervisor: Supervisor, channel: FramedChannel) -> Self {
        Self {
            supervisor,
            channel,
            generators: ActiveGenerators::default(),
            errors: ErrorRegistry::default(),
        }
    }

    pub(crate) fn child_id(&self) -> Option<u32> {
        self.supervisor.child_id()
    }

    pub(crate) fn shutdown(&mut self) {
        self.supervisor.shutdown();
    }

    /// Send `request` and serve the child until it answers with `terminal`.
    pub(crate) fn run<'a>(
        &'a mut self,
        session: &'a Session,
        request: Message,
        terminal: Command,
    ) -> BoxFuture<'a, Result<Message, SessionError>> {
        async move {
            self.send(&request).await?;
            loop {
                let message = self.recv().await?;
                match message.cm {
                    cm if cm == terminal => return Ok(message),
                    Command::Err => return Err(self.reconstruct(&message)),
                    Command::Call => self.on_call(session, &message).await?,
                    Command::Step => self.on_step(&message).await?,
                    Command::Stop => {
                        if let Some(id) = message.id {
                            debug!(id, "Interpreter closed generator");
                            self.generators.stop(id);
                        }
                    }
                    other => {
                        return Err(SessionError::ProtocolViolation(format!(
                            "unexpected `{other}` while waiting for `{terminal}`"
                        )));
                    }
                }
            }
        }
        .boxed()
    }

    pub(crate) async fn exec(&mut self, session: &Session, code: &str) -> Result<(), SessionError> {
        self.run(session, Message::exec(code), Command::Done).await?;
        Ok(())
    }

    pub(crate) async fn eval(
        &mut self,
        session: &Session,
        expression: &str,
    ) -> Result<Primitive, SessionError> {
        let response = self
            .run(session, Message::eval(expression), Command::Res)
            .await?;
        Ok(response.dt.unwrap_or_default())
    }

    /// Delete the remote variables of proxies dropped without a dispose.
    pub(crate) async fn reap(&mut self, session: &Session) -> Result<(), SessionError> {
        let names = session.take_orphans();
        if names.is_empty() {
            return Ok(());
        }
        debug!(count = names.len(), "Reaping orphaned proxies");
        let quoted: Vec<String> = names.iter().map(|name| format!("'{name}',")).collect();
        let code = format!(
            "for {REAP_VAR} in ({}):\n    globals().pop({REAP_VAR}, None)\n",
            quoted.join(" ")
        );
        match self.exec(session, &code).await {
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "Reaping orphaned proxies failed");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    async fn on_call(&mut self, session: &Session, call: &Message) -> Result<(), SessionError> {
        let Some(func) = call.func.as_deref() else {
            return Err(SessionError::ProtocolViolation(
                "`call` without `func`".to_string(),
            ));
        };
        debug!(func, id = ?call.id, "Host call");
        let reply = match self.invoke(session, func, call.id).await? {
            Ok(expression) => Message::new(Command::Retn).with_data(expression),
            Err(error) => self.host_error(error, func),
        };
        self.send_reply(reply, func).await
    }

    /// Run binding `func`. The outer error is fatal to the session; the
    /// inner one is reported back to the child.
    async fn invoke(
        &mut self,
        session: &Session,
        func: &str,
        id: Option<i64>,
    ) -> Result<HostResult<String>, SessionError> {
        let Some(binding) = session.binding(func) else {
            return Ok(Err(HostError::new(
                "NameError",
                format!("no host binding named `{func}`"),
            )));
        };
        let args = match self.fetch_args(session).await {
            Ok(args) => args,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(Err(into_host_error(e))),
        };
        Ok(match binding {
            Binding::Callable(callable) => callable(&args)
                .and_then(|value| value.expression().map_err(into_host_error)),
            Binding::Generator(generator) => {
                let Some(id) = id else {
                    return Err(SessionError::ProtocolViolation(format!(
                        "generator call `{func}` without `id`"
                    )));
                };
                generator(&args).map(|iterator| {
                    self.generators.start(id, iterator);
                    "None".to_string()
                })
            }
        })
    }

    /// Arguments of the pending call: its length first, then each element.
    async fn fetch_args(&mut self, session: &Session) -> Result<Vec<Value>, SessionError> {
        let count = self.eval(session, &format!("len({ARGS_VAR})")).await?;
        let count = count.as_i64().and_then(|n| usize::try_from(n).ok()).ok_or_else(|| {
            SessionError::ProtocolViolation(format!("argument count is {count}"))
        })?;
        let mut args = Vec::with_capacity(count);
        for index in 0..count {
            let arg = self.eval(session, &format!("{ARGS_VAR}[{index}]")).await?;
            args.push(Value::resolved(Some(session.clone()), arg));
        }
        Ok(args)
    }

    async fn on_step(&mut self, step: &Message) -> Result<(), SessionError> {
        let Some(id) = step.id else {
            return Err(SessionError::ProtocolViolation(
                "`step` without `id`".to_string(),
            ));
        };
        trace!(id, "Generator step");
        let function = format!("generator {id}");
        let reply = match self.generators.step(id) {
            Step::Yielded(value) => match value.expression() {
                Ok(expression) => Message::new(Command::Yld).with_data(expression),
                Err(e) => {
                    self.generators.stop(id);
                    self.host_error(into_host_error(e), &function)
                }
            },
            Step::Exhausted => Message::new(Command::Stop),
            Step::Failed(error) => self.host_error(error, &function),
        };
        self.send_reply(reply.with_id(id), &function).await
    }

    /// Send a reply to `call` or `step`. A reply too large or otherwise
    /// unencodable is replaced by an `err` so the child is not left waiting.
    async fn send_reply(&mut self, reply: Message, function: &str) -> Result<(), SessionError> {
        match self.send(&reply).await {
            Err(e) if !e.is_fatal() => {
                warn!(function, error = %e, "Reply not sent, reporting the error instead");
                let mut fallback = self.host_error(into_host_error(e), function);
                fallback.id = reply.id;
                self.send(&fallback).await
            }
            other => other,
        }
    }

    /// Register a host error and encode it as `err`.
    fn host_error(&mut self, mut error: HostError, function: &str) -> Message {
        let id = self.errors.next_id();
        error.set_entry(TracebackFrame::new(HOST_FRAME_FILE, 0, function));
        let payload = error.to_payload(id);
        debug!(function, registry_id = id, error = %error, "Host error sent to interpreter");
        self.errors.insert(error);
        Message::new(Command::Err).with_data(payload.to_primitive())
    }

    /// Turn an `err` from the child into a session error. Host errors that
    /// made a round trip are reunited with the original value.
    fn reconstruct(&mut self, message: &Message) -> SessionError {
        let payload = match ErrorPayload::from_primitive(message.data()) {
            Ok(payload) => payload,
            Err(e) => return SessionError::ProtocolViolation(e.to_string()),
        };
        if let Some(mut error) = payload.host_error_id().and_then(|id| self.errors.take(id)) {
            error.append_remote_traceback(payload.traceback);
            return SessionError::Host(error);
        }
        let error = RemoteException::from_payload(payload);
        debug!(kind = ?error.kind, error = %error, "Remote exception");
        SessionError::Remote(error)
    }

    async fn send(&mut self, message: &Message) -> Result<(), SessionError> {
        trace!(cm = %message.cm, "Sending frame");
        self.channel
            .send(message)
            .await
            .map_err(SessionError::from_send)
    }

    async fn recv(&mut self) -> Result<Message, SessionError> {
        let message = self
            .channel
            .recv()
            .await
            .map_err(SessionError::from_channel)?;
        trace!(cm = %message.cm, "Frame received");
        Ok(message)
    }
}

/// Report a session error raised while serving a call as a host error.
fn into_host_error(error: SessionError) -> HostError {
    match error {
        SessionError::Host(error) => error,
        SessionError::Remote(error) => HostError::from_remote(error),
        other => HostError::from_error(other),
    }
}
