//! ASGI 3.0 gateway mode: runs an [`AsgiApp`] behind the engine the same
//! way `tremolo/asgi_server.py` runs a Python ASGI callable behind
//! Tremolo's `HTTPProtocol` -- by handing it a `scope` dict and a
//! `receive`/`send` pair and translating every message it exchanges back
//! into [`Request`]/[`Response`]/[`ws::WsSession`] calls.
//!
//! # Why this is channel-based, not a direct call
//!
//! [`Response`] and [`Request`] borrow from the connection's own buffers
//! and cannot outlive one call to [`Handler::handle`]; [`ws::WsSession`]
//! is similarly borrowed for the lifetime of one [`Handler::handle_ws`]
//! call and never sees the original request. An ASGI application,
//! though, is meant to run as its own concurrent task that can keep
//! `receive()`-ing after the response is sent (see `asgi_server.py`'s
//! `receive()` docstring on delayed `http.disconnect`). Those two shapes
//! don't fit together directly, so every [`AsgiApp::call`] is spawned as
//! an ordinary `tokio::spawn`ed task that only ever touches two owned,
//! `'static` `tokio::sync::mpsc` channels -- never the borrowed
//! [`Request`]/[`Response`]/[`WsSession`] themselves. `handle()` and
//! `handle_ws()` drive those channels from the borrowed side, translating
//! messages in and events out, which is what lets the spawned app task
//! survive across the `handle()`/`handle_ws()` boundary for the
//! WebSocket case: the handshake decision (accept vs. `websocket.close`
//! before accept, see §4.8) is made by running the app up to its first
//! `send()` inside `handle()`, and the channel halves are then stashed in
//! a custom [`ConnectionData`] for `handle_ws()` to pick back up.
use crate::{
    limits::AsgiLimits,
    ws::{self, CloseCode, Message, WsSession},
    ConnectionData, Handled, Handler, Request, Response, StatusCode,
};
use std::{fmt, future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    sync::mpsc::{self, Receiver, Sender},
    time::timeout,
};

/// `asgi.version` reported in every scope.
pub const ASGI_VERSION: &str = "3.0";
/// `asgi.spec_version` reported in every scope -- the HTTP/WebSocket/Lifespan
/// specs this adapter implements.
pub const ASGI_SPEC_VERSION: &str = "2.3";

const CHANNEL_CAPACITY: usize = 4;

/// Which of the three ASGI scope types a [`Scope`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeType {
    Http,
    WebSocket,
    Lifespan,
}

/// The per-call context an [`AsgiApp`] receives, mirroring `asgi_server.py`'s
/// `scope` dict field-for-field (`asgi`, `http_version`, `server`, `client`,
/// `path`, `raw_path`, `query_string`, `headers`, `state`, plus the
/// type-specific `method`/`scheme`/`subprotocols`).
///
/// Generic over `S`, the application state type threaded through
/// `scope['state']` -- a per-request, cheaply-cloned value (typically an
/// `Arc<...>` around whatever shared state the embedding binary wants every
/// request to see), rather than a dynamically-typed dict as in the source.
#[derive(Debug, Clone)]
pub struct Scope<S> {
    pub kind: ScopeType,
    pub http_version: &'static str,
    /// `None` for `lifespan` and `websocket` scopes.
    pub method: Option<&'static str>,
    pub scheme: &'static str,
    pub server: SocketAddr,
    pub client: SocketAddr,
    pub root_path: Arc<str>,
    /// Percent-decoded path, as `str` (ASGI requires decoding to text).
    pub path: String,
    /// Raw, still percent-encoded path bytes, as they were on the wire.
    pub raw_path: Vec<u8>,
    /// Raw query-string bytes, without the leading `?`.
    pub query_string: Vec<u8>,
    /// Header name/value pairs in wire order, names already lowercased by
    /// [`Request::headers`].
    pub headers: Vec<(Vec<u8>, Vec<u8>)>,
    /// `Sec-WebSocket-Protocol` values offered by the client. Empty outside
    /// `websocket` scopes.
    pub subprotocols: Vec<String>,
    pub state: S,
}

impl<S: Clone> Scope<S> {
    fn from_request(request: &Request, kind: ScopeType, root_path: &Arc<str>, state: &S) -> Self {
        let raw_path = request.url().path().to_vec();
        let path = percent_encoding::percent_decode(&raw_path)
            .decode_utf8_lossy()
            .into_owned();
        let query_string = request
            .url()
            .query_full()
            .map(|q| q.strip_prefix(b"?").unwrap_or(q).to_vec())
            .unwrap_or_default();
        let headers = request
            .headers()
            .map(|(n, v)| (n.to_vec(), v.to_vec()))
            .collect();
        let subprotocols = request
            .header(b"sec-websocket-protocol")
            .map(|v| {
                v.split(|&b| b == b',')
                    .map(|p| String::from_utf8_lossy(trim_ows(p)).into_owned())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            kind,
            http_version: request.version().as_str(),
            method: matches!(kind, ScopeType::Http).then(|| request.method().as_str()),
            scheme: if matches!(kind, ScopeType::WebSocket) { "ws" } else { "http" },
            server: request.server_addr(),
            client: request.client_addr(),
            root_path: root_path.clone(),
            path,
            raw_path,
            query_string,
            headers,
            subprotocols,
            state: state.clone(),
        }
    }
}

fn trim_ows(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |p| p + 1);
    &bytes[start..end]
}

/// A single WebSocket payload, carried either as `bytes` or `text` per the
/// ASGI `websocket.receive`/`websocket.send` message shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsPayload {
    Text(String),
    Bytes(Vec<u8>),
}

/// A message delivered to the application via `Channel::receive`, mirroring
/// `asgi_server.py`'s `receive()` return dicts.
#[derive(Debug, Clone)]
pub enum AsgiMessage {
    HttpRequest { body: Vec<u8>, more_body: bool },
    HttpDisconnect,
    WebSocketConnect,
    WebSocketReceive(WsPayload),
    WebSocketDisconnect { code: u16 },
    LifespanStartup,
    LifespanShutdown,
}

/// A message sent by the application via `Channel::send`, mirroring
/// `asgi_server.py`'s `send(data)` argument shape.
#[derive(Debug, Clone)]
pub enum AsgiEvent {
    HttpResponseStart { status: u16, headers: Vec<(Vec<u8>, Vec<u8>)> },
    HttpResponseBody { body: Vec<u8>, more_body: bool },
    WebSocketAccept { subprotocol: Option<String> },
    WebSocketSend(WsPayload),
    WebSocketClose { code: u16 },
    LifespanStartupComplete,
    LifespanStartupFailed { message: Option<String> },
    LifespanShutdownComplete,
    LifespanShutdownFailed { message: Option<String> },
}

/// Errors an [`AsgiApp`] can provoke by sending messages out of order --
/// the literal messages are carried over from `asgi_server.py`'s
/// `InternalServerError`/`Forbidden` exceptions so behavior documented
/// against the source still applies here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsgiError {
    /// A second `http.response.start`/`websocket.accept` after one already
    /// landed.
    AlreadyStarted,
    /// A body/send message before `http.response.start`/`websocket.accept`.
    NotStarted,
    /// `websocket.close` sent before `websocket.accept`.
    Forbidden,
    UnexpectedMessageType,
}

impl fmt::Display for AsgiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AlreadyStarted => "already started or accepted",
            Self::NotStarted => "has not been started or accepted",
            Self::Forbidden => "connection rejected",
            Self::UnexpectedMessageType => "unexpected ASGI message type",
        })
    }
}

impl std::error::Error for AsgiError {}

/// Outcome of one `lifespan.startup`/`lifespan.shutdown` round-trip.
#[derive(Debug, Clone)]
pub enum LifespanOutcome {
    Complete,
    Failed(Option<String>),
    /// The application never sent a `lifespan.*` message back (it does not
    /// implement the lifespan protocol) -- logged, not fatal, per
    /// `asgi_lifespan.py`'s `LifespanProtocolUnsupported` handling.
    Unsupported,
}

/// The `http` scope's half of the channel: receives `http.request`/
/// `http.disconnect`, sends `http.response.start`/`http.response.body`.
#[derive(Debug)]
pub struct HttpChannel {
    receive: Receiver<AsgiMessage>,
    send: Sender<AsgiEvent>,
    started: bool,
}

impl HttpChannel {
    async fn receive(&mut self) -> AsgiMessage {
        self.receive.recv().await.unwrap_or(AsgiMessage::HttpDisconnect)
    }

    async fn send(&mut self, event: AsgiEvent) -> Result<(), AsgiError> {
        match &event {
            AsgiEvent::HttpResponseStart { .. } if self.started => return Err(AsgiError::AlreadyStarted),
            AsgiEvent::HttpResponseStart { .. } => self.started = true,
            AsgiEvent::HttpResponseBody { .. } if !self.started => return Err(AsgiError::NotStarted),
            AsgiEvent::WebSocketAccept { .. }
            | AsgiEvent::WebSocketSend(_)
            | AsgiEvent::WebSocketClose { .. } => return Err(AsgiError::UnexpectedMessageType),
            _ => {}
        }
        let _ = self.send.send(event).await;
        Ok(())
    }
}

/// The `websocket` scope's half of the channel: receives `websocket.connect`/
/// `websocket.receive`/`websocket.disconnect`, sends `websocket.accept`/
/// `websocket.send`/`websocket.close`.
#[derive(Debug)]
pub struct WebSocketChannel {
    receive: Receiver<AsgiMessage>,
    send: Sender<AsgiEvent>,
    accepted: bool,
}

impl WebSocketChannel {
    async fn receive(&mut self) -> AsgiMessage {
        self.receive
            .recv()
            .await
            .unwrap_or(AsgiMessage::WebSocketDisconnect { code: 1005 })
    }

    async fn send(&mut self, event: AsgiEvent) -> Result<(), AsgiError> {
        match &event {
            // Rejecting before accept is the one legal post-`handle()`-commit
            // path: the 101 is already on the wire by the time `handle_ws`
            // runs (see module docs), so a `websocket.close` there just ends
            // the session rather than truly answering 403. The pre-accept
            // rejection (the real 403) is handled in `handle()`, before any
            // bytes are written -- see `AsgiHandler::handle`.
            AsgiEvent::WebSocketClose { .. } if !self.accepted => return Err(AsgiError::Forbidden),
            AsgiEvent::WebSocketAccept { .. } if self.accepted => return Err(AsgiError::AlreadyStarted),
            AsgiEvent::WebSocketAccept { .. } => self.accepted = true,
            AsgiEvent::HttpResponseStart { .. } | AsgiEvent::HttpResponseBody { .. } => {
                return Err(AsgiError::UnexpectedMessageType)
            }
            _ => {}
        }
        let _ = self.send.send(event).await;
        Ok(())
    }
}

/// The `lifespan` scope's half of the channel: receives `lifespan.startup`/
/// `lifespan.shutdown`, sends `lifespan.*.complete`/`lifespan.*.failed`.
#[derive(Debug)]
pub struct LifespanChannel {
    receive: Receiver<AsgiMessage>,
    send: Sender<LifespanOutcome>,
}

impl LifespanChannel {
    async fn receive(&mut self) -> AsgiMessage {
        self.receive.recv().await.unwrap_or(AsgiMessage::LifespanShutdown)
    }

    async fn send(&mut self, event: AsgiEvent) -> Result<(), AsgiError> {
        let outcome = match event {
            AsgiEvent::LifespanStartupComplete | AsgiEvent::LifespanShutdownComplete => LifespanOutcome::Complete,
            AsgiEvent::LifespanStartupFailed { message } | AsgiEvent::LifespanShutdownFailed { message } => {
                LifespanOutcome::Failed(message)
            }
            _ => return Err(AsgiError::UnexpectedMessageType),
        };
        let _ = self.send.send(outcome).await;
        Ok(())
    }
}

/// The `receive`/`send` pair handed to one [`AsgiApp::call`], unifying the
/// three scope-specific channels behind one type so `AsgiApp` keeps ASGI's
/// real single-entry-point shape instead of splitting into three traits.
#[derive(Debug)]
pub enum Channel {
    Http(HttpChannel),
    WebSocket(WebSocketChannel),
    Lifespan(LifespanChannel),
}

impl Channel {
    pub async fn receive(&mut self) -> AsgiMessage {
        match self {
            Self::Http(c) => c.receive().await,
            Self::WebSocket(c) => c.receive().await,
            Self::Lifespan(c) => c.receive().await,
        }
    }

    pub async fn send(&mut self, event: AsgiEvent) -> Result<(), AsgiError> {
        match self {
            Self::Http(c) => c.send(event).await,
            Self::WebSocket(c) => c.send(event).await,
            Self::Lifespan(c) => c.send(event).await,
        }
    }
}

/// An ASGI 3.0 application: one entry point taking a [`Scope`] and a
/// [`Channel`], called once per connection-scope (one call for the whole
/// process's `lifespan`, one per HTTP request, one per upgraded WebSocket).
///
/// Mirrors the bare `async def app(scope, receive, send)` callable ASGI
/// specifies, with `receive`/`send` folded into one `Channel` value since
/// Rust has no tuple-of-closures equivalent as ergonomic as Python's.
pub trait AsgiApp<S = ()>: Send + Sync + 'static
where
    S: Clone + Send + Sync + 'static,
{
    fn call(&self, scope: Scope<S>, channel: Channel) -> impl Future<Output = ()> + Send;
}

/// Drives the `lifespan` scope for the process's whole run, independent of
/// any one connection. Grounded on `tremolo/asgi_lifespan.py`'s
/// `ASGILifespan`: a background task running the app once, a `startup()`/
/// `shutdown()` pair that enqueue the corresponding message and await the
/// matching `*.complete`/`*.failed` reply within a timeout.
pub struct Lifespan {
    to_app: Sender<AsgiMessage>,
    from_app: Receiver<LifespanOutcome>,
    task: tokio::task::JoinHandle<()>,
}

impl Lifespan {
    /// Spawns the application's lifespan scope. Call [`startup`](Self::startup)
    /// once before accepting connections and [`shutdown`](Self::shutdown)
    /// once while draining them.
    pub fn spawn<A, S>(app: Arc<A>, state: S, local_addr: SocketAddr) -> Self
    where
        A: AsgiApp<S>,
        S: Clone + Send + Sync + 'static,
    {
        let (to_app_tx, to_app_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (from_app_tx, from_app_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            let scope = Scope {
                kind: ScopeType::Lifespan,
                http_version: "",
                method: None,
                scheme: "",
                server: local_addr,
                client: local_addr,
                root_path: Arc::from(""),
                path: String::new(),
                raw_path: Vec::new(),
                query_string: Vec::new(),
                headers: Vec::new(),
                subprotocols: Vec::new(),
                state,
            };
            let channel = Channel::Lifespan(LifespanChannel { receive: to_app_rx, send: from_app_tx });

            app.call(scope, channel).await;
        });

        Self { to_app: to_app_tx, from_app: from_app_rx, task }
    }

    async fn round_trip(&mut self, message: AsgiMessage, budget: Duration) -> Result<(), LifespanOutcome> {
        if self.to_app.send(message).await.is_err() {
            return Err(LifespanOutcome::Unsupported);
        }
        match timeout(budget, self.from_app.recv()).await {
            Ok(Some(LifespanOutcome::Complete)) => Ok(()),
            Ok(Some(failed)) => Err(failed),
            Ok(None) | Err(_) => Err(LifespanOutcome::Unsupported),
        }
    }

    /// Sends `lifespan.startup` and awaits `lifespan.startup.complete`.
    pub async fn startup(&mut self, budget: Duration) -> Result<(), LifespanOutcome> {
        self.round_trip(AsgiMessage::LifespanStartup, budget).await
    }

    /// Sends `lifespan.shutdown` and awaits `lifespan.shutdown.complete`.
    pub async fn shutdown(&mut self, budget: Duration) -> Result<(), LifespanOutcome> {
        self.round_trip(AsgiMessage::LifespanShutdown, budget).await
    }

    /// Waits for the spawned `lifespan` task to return, after `shutdown()`.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Per-keep-alive-connection state the ASGI [`Handler`] needs to survive the
/// `handle()` → `handle_ws()` boundary: the channel half retained after a
/// WebSocket handshake is committed in `handle()`, picked back up by
/// `handle_ws()` to finish driving the same spawned app task.
#[derive(Default)]
pub struct AsgiConnState {
    ws: Option<(Sender<AsgiMessage>, Receiver<AsgiEvent>)>,
}

impl ConnectionData for AsgiConnState {
    fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.ws = None;
    }
}

/// Bridges one [`AsgiApp`] into the engine's [`Handler`] trait.
///
/// Every call spawns the application as its own `tokio` task communicating
/// over owned `mpsc` channels (see module docs for why) -- `handle()` drives
/// the `http`/`websocket`-handshake side of that task to completion (or, for
/// an accepted WebSocket, to the point the channel can be handed off), and
/// `handle_ws()` finishes driving an accepted WebSocket's frame exchange.
pub struct AsgiHandler<A, S = ()>
where
    S: Clone + Send + Sync + 'static,
{
    app: Arc<A>,
    state: S,
    root_path: Arc<str>,
    limits: AsgiLimits,
}

impl<A, S> AsgiHandler<A, S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(app: A, state: S) -> Self {
        Self { app: Arc::new(app), state, root_path: Arc::from(""), limits: AsgiLimits::default() }
    }

    pub fn root_path(mut self, root_path: impl Into<Arc<str>>) -> Self {
        self.root_path = root_path.into();
        self
    }

    pub fn limits(mut self, limits: AsgiLimits) -> Self {
        self.limits = limits;
        self
    }
}

impl<A, S> Handler<AsgiConnState> for AsgiHandler<A, S>
where
    A: AsgiApp<S>,
    S: Clone + Send + Sync + 'static,
{
    async fn handle(&self, data: &mut AsgiConnState, request: &Request, response: &mut Response) -> Handled {
        if request.is_websocket_upgrade() {
            self.handle_websocket_handshake(data, request, response).await
        } else {
            self.handle_http(request, response).await
        }
    }

    async fn handle_ws(&self, data: &mut AsgiConnState, ws: &mut WsSession<'_>) {
        let Some((to_app, mut from_app)) = data.ws.take() else {
            return;
        };
        drive_websocket(&to_app, &mut from_app, ws).await;
    }
}

impl<A, S> AsgiHandler<A, S>
where
    A: AsgiApp<S>,
    S: Clone + Send + Sync + 'static,
{
    async fn handle_http(&self, request: &Request, response: &mut Response) -> Handled {
        let scope = Scope::from_request(request, ScopeType::Http, &self.root_path, &self.state);

        let (to_app_tx, to_app_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (from_app_tx, mut from_app_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let app = self.app.clone();
        let task = tokio::spawn(async move {
            let channel = Channel::Http(HttpChannel { receive: to_app_rx, send: from_app_tx, started: false });
            app.call(scope, channel).await;
        });

        // Whole-buffer engine: the entire body is already in memory, so it
        // is delivered as the one and only `http.request` message. Dropping
        // the sender afterwards means any further `receive()` the app makes
        // gets `http.disconnect` for free (see `HttpChannel::receive`),
        // matching §4.8's "after end-of-body, further receive() must
        // eventually yield http.disconnect".
        let body = request.body().unwrap_or(&[]).to_vec();
        let _ = to_app_tx.send(AsgiMessage::HttpRequest { body, more_body: false }).await;
        drop(to_app_tx);

        let mut status_headers: Option<(u16, Vec<(Vec<u8>, Vec<u8>)>)> = None;
        let mut body_acc = Vec::new();
        let mut committed = false;

        let _ = timeout(self.limits.app_close_timeout, async {
            while let Some(event) = from_app_rx.recv().await {
                match event {
                    AsgiEvent::HttpResponseStart { status, headers } => {
                        status_headers = Some((status, headers));
                    }
                    AsgiEvent::HttpResponseBody { body, more_body } => {
                        body_acc.extend_from_slice(&body);
                        if !more_body {
                            committed = true;
                            break;
                        }
                    }
                    _ => {}
                }
            }
        })
        .await;

        // The task may keep running past commit (it is allowed to keep
        // `receive()`-ing, which now just gets `http.disconnect`
        // immediately); we don't need its result to answer this request.
        task.abort();

        if committed {
            let (status, headers) = status_headers.unwrap_or((200, Vec::new()));
            apply_http_response(response, status, headers, body_acc)
        } else {
            response
                .status(StatusCode::InternalServerError)
                .body("ASGI application did not send a response")
        }
    }

    async fn handle_websocket_handshake(
        &self,
        data: &mut AsgiConnState,
        request: &Request,
        response: &mut Response,
    ) -> Handled {
        let Some(key) = request.header(b"sec-websocket-key") else {
            return response.status(StatusCode::BadRequest).body("missing Sec-WebSocket-Key");
        };

        let scope = Scope::from_request(request, ScopeType::WebSocket, &self.root_path, &self.state);

        let (to_app_tx, to_app_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (from_app_tx, mut from_app_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let app = self.app.clone();
        tokio::spawn(async move {
            let channel = Channel::WebSocket(WebSocketChannel { receive: to_app_rx, send: from_app_tx, accepted: false });
            app.call(scope, channel).await;
        });

        // Drives the app up to its first reply to `websocket.connect` --
        // ASGI apps conventionally `await websocket.accept()` (or close)
        // as their very first action, so this one exchange is enough to
        // decide the handshake (mirrors `websocket.accept()` actually
        // performing the 101 inside `ASGIAppWrapper.send` in the source).
        if to_app_tx.send(AsgiMessage::WebSocketConnect).await.is_err() {
            return response
                .status(StatusCode::InternalServerError)
                .body("ASGI application did not start");
        }

        match timeout(self.limits.app_close_timeout, from_app_rx.recv()).await {
            Ok(Some(AsgiEvent::WebSocketAccept { subprotocol })) => {
                response
                    .status(StatusCode::SwitchingProtocols)
                    .header("upgrade", "websocket")
                    .header("connection", "upgrade")
                    .header("sec-websocket-accept", ws::accept_key(key));
                if let Some(subprotocol) = subprotocol {
                    response.header("sec-websocket-protocol", subprotocol);
                }

                data.ws = Some((to_app_tx, from_app_rx));
                response.upgrade()
            }
            // `websocket.close` (or anything else) before accept: the 101
            // was never sent, so this really is the 403 Forbidden the
            // source raises via `Forbidden('connection rejected')`.
            _ => response.status(StatusCode::Forbidden).body(AsgiError::Forbidden.to_string()),
        }
    }
}

fn apply_http_response(
    response: &mut Response,
    status: u16,
    headers: Vec<(Vec<u8>, Vec<u8>)>,
    body: Vec<u8>,
) -> Handled {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::InternalServerError);
    response.status(status);

    for (name, value) in headers {
        // `date`/`server`/`transfer-encoding` are owned by the engine;
        // `content-length` is recomputed by `Response::body()` itself
        // (writing it here too would duplicate the header). `connection`
        // is expressed through `close()`, not a literal header, so the
        // engine picks the right keep-alive value for the HTTP version.
        let lower = name.to_ascii_lowercase();
        match lower.as_slice() {
            b"date" | b"server" | b"transfer-encoding" | b"content-length" => continue,
            b"connection" => {
                if value.eq_ignore_ascii_case(b"close") {
                    response.close();
                }
                continue;
            }
            _ => {}
        }
        response.header(name, value);
    }

    response.body(body)
}

async fn drive_websocket(to_app: &Sender<AsgiMessage>, from_app: &mut Receiver<AsgiEvent>, ws: &mut WsSession<'_>) {
    loop {
        tokio::select! {
            biased;

            event = from_app.recv() => {
                match event {
                    Some(AsgiEvent::WebSocketSend(WsPayload::Text(text))) => {
                        if ws.send_text(text.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    Some(AsgiEvent::WebSocketSend(WsPayload::Bytes(bytes))) => {
                        if ws.send_binary(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Some(AsgiEvent::WebSocketClose { code }) => {
                        let _ = ws.close(CloseCode(code), b"").await;
                        break;
                    }
                    Some(_) | None => break,
                }
            }

            incoming = ws.recv() => {
                let message = match incoming {
                    Ok(Some(Message::Text(bytes))) => AsgiMessage::WebSocketReceive(
                        WsPayload::Text(String::from_utf8_lossy(&bytes).into_owned()),
                    ),
                    Ok(Some(Message::Binary(bytes))) => AsgiMessage::WebSocketReceive(WsPayload::Bytes(bytes)),
                    Ok(None) => AsgiMessage::WebSocketDisconnect { code: 1000 },
                    Err(_) => AsgiMessage::WebSocketDisconnect { code: 1006 },
                };
                let is_disconnect = matches!(message, AsgiMessage::WebSocketDisconnect { .. });
                let _ = to_app.send(message).await;
                if is_disconnect {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::connection::HttpConnection;

    struct EchoApp;

    impl AsgiApp for EchoApp {
        async fn call(&self, scope: Scope<()>, mut channel: Channel) {
            match scope.kind {
                ScopeType::Http => {
                    if let AsgiMessage::HttpRequest { body, .. } = channel.receive().await {
                        let _ = channel
                            .send(AsgiEvent::HttpResponseStart {
                                status: 200,
                                headers: vec![(b"content-type".to_vec(), b"text/plain".to_vec())],
                            })
                            .await;
                        let _ = channel
                            .send(AsgiEvent::HttpResponseBody { body, more_body: false })
                            .await;
                    }
                }
                ScopeType::WebSocket => {
                    let _ = channel.send(AsgiEvent::WebSocketAccept { subprotocol: None }).await;
                }
                ScopeType::Lifespan => {
                    if let AsgiMessage::LifespanStartup = channel.receive().await {
                        let _ = channel.send(AsgiEvent::LifespanStartupComplete).await;
                    }
                }
            }
        }
    }

    struct RejectingApp;

    impl AsgiApp for RejectingApp {
        async fn call(&self, scope: Scope<()>, mut channel: Channel) {
            if scope.kind == ScopeType::WebSocket {
                let _ = channel.receive().await;
                let _ = channel.send(AsgiEvent::WebSocketClose { code: 1000 }).await;
            }
        }
    }

    #[tokio::test]
    async fn http_round_trip_echoes_body() {
        let mut t = HttpConnection::from_req(
            "POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 2\r\n\r\nhi",
        );
        assert!(t.parse().is_ok());

        let handler = AsgiHandler::new(EchoApp, ());
        handler.handle_http(&t.request, &mut t.response).await;

        let raw = String::from_utf8_lossy(t.response.buffer()).into_owned();
        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.ends_with("hi"));
    }

    #[tokio::test]
    async fn websocket_close_before_accept_is_forbidden() {
        let mut t = HttpConnection::from_req(
            "GET /ws HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        );
        assert!(t.parse().is_ok());

        let handler = AsgiHandler::new(RejectingApp, ());
        let mut data = AsgiConnState::new();
        handler.handle_websocket_handshake(&mut data, &t.request, &mut t.response).await;

        let raw = String::from_utf8_lossy(t.response.buffer()).into_owned();
        assert!(raw.starts_with("HTTP/1.1 403"));
        assert!(data.ws.is_none());
    }

    #[tokio::test]
    async fn lifespan_startup_completes() {
        let mut lifespan = Lifespan::spawn(Arc::new(EchoApp), (), "127.0.0.1:0".parse().unwrap());

        let result = lifespan.startup(Duration::from_secs(1)).await;
        assert!(matches!(result, Ok(())));
    }
}
