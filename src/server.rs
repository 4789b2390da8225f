//! TCP front end: accept loop and per-connection workers.
//!
//! # Architecture
//!
//! ```text
//! listener ──accept──► connection worker (one task per connection)
//!
//!   read half ──lines──► parse Request ──┬── sys.login / sys.ping (inline)
//!                                        └── spawn request task ──► Dispatcher
//!                                                     │
//!   write half ◄── writer task ◄───── mpsc ◄──────────┘
//! ```
//!
//! The write half is owned by a single writer task fed through an mpsc
//! channel, so responses from concurrently executing request tasks are
//! serialized without locking the socket. A blocking `pipe.read` therefore
//! never stalls other requests on the same connection.
//!
//! `sys.login` runs inline because it owns the unauthenticated → session
//! transition; everything else requires a session and is spawned.

// Rust guideline compliant 2026-02

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::broker::Broker;
use crate::dispatch::Dispatcher;
use crate::error::{ErrKind, RpcError};
use crate::params::Params;
use crate::rpc::{Request, Response, MAX_LINE_BYTES};
use crate::session::Session;

/// Bind the listener and serve until a shutdown signal arrives.
///
/// # Errors
///
/// Fails if the bind address is unusable; per-connection errors are logged
/// and do not take the server down.
pub async fn run(broker: Arc<Broker>, bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    serve(broker, listener).await
}

/// Serve on an already-bound listener until a shutdown signal arrives.
///
/// # Errors
///
/// Fails on accept errors; per-connection errors are logged and do not take
/// the server down.
pub async fn serve(broker: Arc<Broker>, listener: TcpListener) -> Result<()> {
    let local = listener.local_addr().context("listener local_addr")?;
    log::info!("[server] listening on {local}");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("accept")?;
                let broker = Arc::clone(&broker);
                tokio::spawn(async move {
                    log::debug!("[server] {peer} connected");
                    if let Err(e) = handle_connection(stream, peer, broker).await {
                        log::warn!("[server] {peer}: {e:#}");
                    }
                    log::debug!("[server] {peer} disconnected");
                });
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("[server] shutdown signal received");
                break;
            }
        }
    }
    Ok(())
}

/// Serve one connection until EOF, then tear down its session.
async fn handle_connection(stream: TcpStream, peer: SocketAddr, broker: Arc<Broker>) -> Result<()> {
    let (rd, wr) = stream.into_split();
    let mut reader = FramedRead::new(rd, LinesCodec::new_with_max_length(MAX_LINE_BYTES));

    // Single writer task owns the write half; request tasks send through tx.
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();
    let writer = tokio::spawn(async move {
        let mut sink = FramedWrite::new(wr, LinesCodec::new());
        while let Some(resp) = rx.recv().await {
            if sink.send(resp.to_line()).await.is_err() {
                break;
            }
        }
    });

    let dispatcher = Dispatcher::new(Arc::clone(&broker));
    let mut session: Option<Arc<Session>> = None;

    loop {
        let line = match reader.next().await {
            None => break,
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                log::warn!("[server] {peer}: framing error: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req = match Request::from_line(&line) {
            Ok(req) => req,
            Err(err) => {
                let _ = tx.send(Response::fail(Value::Null, &err));
                continue;
            }
        };
        let id = req.id.clone();

        if req.method == "sys.login" {
            let resp = match login(&broker, session.as_deref(), &req) {
                Ok(new_session) => {
                    let result = json!({"ok": true, "user": new_session.user()});
                    session = Some(new_session);
                    Response::ok(id.clone().unwrap_or(Value::Null), result)
                }
                Err(err) => Response::fail(id.clone().unwrap_or(Value::Null), &err),
            };
            if id.is_some() {
                let _ = tx.send(resp);
            }
            continue;
        }

        match &session {
            Some(sess) => {
                let sess = Arc::clone(sess);
                let dispatcher = dispatcher.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let resp = dispatcher.handle(&sess, &req).await;
                    if req.id.is_some() {
                        let _ = tx.send(resp);
                    }
                });
            }
            None if req.method == "sys.ping" => {
                if id.is_some() {
                    let _ = tx.send(Response::ok(id.unwrap_or(Value::Null), json!({"ok": true})));
                }
            }
            None => {
                let err = RpcError::with_data(ErrKind::InvalidRequest, "not logged in");
                if id.is_some() {
                    let _ = tx.send(Response::fail(id.unwrap_or(Value::Null), &err));
                }
            }
        }
    }

    if let Some(sess) = session {
        log::info!(
            "[server] {peer}: session {} for '{}' disconnected",
            sess.id(),
            sess.user()
        );
        broker.teardown_session(&sess);
    }

    // Closing our sender lets the writer drain outstanding responses from
    // still-running request tasks, then exit when the last clone drops.
    drop(tx);
    let _ = writer.await;
    Ok(())
}

/// Validate and execute `sys.login`. A connection logs in once; a second
/// login on the same connection is rejected rather than silently replacing
/// the session.
fn login(
    broker: &Broker,
    current: Option<&Session>,
    req: &Request,
) -> Result<Arc<Session>, RpcError> {
    if current.is_some() {
        return Err(RpcError::with_data(
            ErrKind::InvalidRequest,
            "already logged in",
        ));
    }
    let p = Params::parse(&req.params, &["user", "pass"])?;
    let user = p.str("user")?.to_lowercase();
    let pass = p.str("pass")?;
    broker.login(&user, pass)
}
