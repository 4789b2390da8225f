//! Request dispatch: validation, permission checks, routing.
//!
//! Every method follows the same three steps:
//!
//! 1. Validate `params` against the method's enumerated field set; a shape
//!    error returns `InvalidParams` naming the offending field.
//! 2. Resolve the permission target (the caller's own username for
//!    `pipe.*`, the topic name for `topic.*`, the acted-on user or prefix
//!    for `user.*`) and require `@<method>` or `@admin` there.
//! 3. Execute against the broker context and map failures to the stable
//!    error taxonomy.
//!
//! `sys.login` is not handled here: it belongs to the connection, which owns
//! the transition from unauthenticated to session-bound (see `server`).

// Rust guideline compliant 2026-02

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::broker::Broker;
use crate::error::{ErrKind, RpcError, RpcResult};
use crate::params::Params;
use crate::pipe::Pipe;
use crate::rpc::{Request, Response};
use crate::session::Session;

/// Default batch size for `pipe.read` when `max` is omitted.
const DEFAULT_READ_MAX: u64 = 10;

/// Routes requests from authenticated sessions to the broker.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    broker: Arc<Broker>,
}

impl Dispatcher {
    /// Create a dispatcher over the shared broker context.
    #[must_use]
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }

    /// Handle one request for `session`, producing the wire response.
    ///
    /// Internal failures are logged here and surfaced as bare `Internal`.
    pub async fn handle(&self, session: &Arc<Session>, req: &Request) -> Response {
        match self.route(session, &req.method, &req.params).await {
            Ok(result) => Response::ok(req.id.clone().unwrap_or(Value::Null), result),
            Err(err) => {
                if err.kind == ErrKind::Internal {
                    log::error!(
                        "[dispatch] internal error in {} for session {}: {err}",
                        req.method,
                        session.id()
                    );
                }
                Response::fail(req.id.clone().unwrap_or(Value::Null), &err)
            }
        }
    }

    async fn route(&self, session: &Arc<Session>, method: &str, params: &Value) -> RpcResult<Value> {
        match method {
            "sys.ping" => {
                Params::parse(params, &[])?;
                Ok(json!({"ok": true}))
            }
            "pipe.create" => self.pipe_create(session, params).await,
            "pipe.open" => self.pipe_open(session, params).await,
            "pipe.write" => self.pipe_write(session, params).await,
            "pipe.read" => self.pipe_read(session, params).await,
            "pipe.close" => self.pipe_close(session, params).await,
            "topic.subscribe" => self.topic_subscribe(session, params).await,
            "topic.unsubscribe" => self.topic_unsubscribe(session, params).await,
            "topic.publish" => self.topic_publish(session, params).await,
            m if m.starts_with("user.") => self.user_req(session, m, params).await,
            _ => Err(RpcError::new(ErrKind::MethodNotFound)),
        }
    }

    /// Permission gate for `pipe.*`: the target is the caller's own user.
    async fn check_pipe_perm(&self, session: &Session, method: &str) -> RpcResult<()> {
        self.broker
            .oracle()
            .check(session.user(), method, session.user())
            .await
    }

    /// Resolve a pipe id to a live, non-closed pipe.
    fn resolve_pipe(&self, pipeid: &str) -> RpcResult<Arc<Pipe>> {
        match self.broker.registry.get(pipeid) {
            Some(pipe) if !pipe.is_closed() => Ok(pipe),
            _ => Err(RpcError::new(ErrKind::InvalidPipe)),
        }
    }

    // ── pipe.* ────────────────────────────────────────────────────────────

    async fn pipe_create(&self, session: &Arc<Session>, params: &Value) -> RpcResult<Value> {
        let p = Params::parse(params, &["length"])?;
        let length = match p.opt_uint("length")? {
            Some(0) => return Err(RpcError::bad_param("length")),
            Some(n) => Some(n as usize),
            None => None,
        };
        self.check_pipe_perm(session, "pipe.create").await?;
        let pipe = self.broker.create_pipe(session, length);
        log::debug!(
            "[dispatch] session {} created pipe {} (cap {})",
            session.id(),
            pipe.id(),
            pipe.capacity()
        );
        Ok(json!({"pipeid": pipe.id()}))
    }

    async fn pipe_open(&self, session: &Arc<Session>, params: &Value) -> RpcResult<Value> {
        let p = Params::parse(params, &["pipeid"])?;
        let pipeid = p.str("pipeid")?;
        self.check_pipe_perm(session, "pipe.open").await?;
        // A pure existence check: the handle is the id itself.
        self.resolve_pipe(pipeid)?;
        Ok(json!({"ok": true}))
    }

    async fn pipe_write(&self, session: &Arc<Session>, params: &Value) -> RpcResult<Value> {
        let p = Params::parse(params, &["pipeid", "msg", "multi"])?;
        let pipeid = p.str("pipeid")?;
        let msgs: Vec<Value> = if p.has("multi") {
            p.list("multi")?.clone()
        } else if let Some(msg) = p.opt_value("msg") {
            vec![msg.clone()]
        } else {
            return Err(RpcError::bad_param("msg"));
        };
        self.check_pipe_perm(session, "pipe.write").await?;
        let pipe = self.resolve_pipe(pipeid)?;
        let count = pipe.write(msgs, None)?;
        Ok(json!({"ok": true, "count": count}))
    }

    async fn pipe_read(&self, session: &Arc<Session>, params: &Value) -> RpcResult<Value> {
        let p = Params::parse(params, &["pipeid", "max", "timeout"])?;
        let pipeid = p.str("pipeid")?.to_owned();
        let max = match p.opt_uint("max")? {
            Some(0) => return Err(RpcError::bad_param("max")),
            Some(n) => n,
            None => DEFAULT_READ_MAX,
        } as usize;
        let timeout = Duration::from_secs_f64(p.opt_f64("timeout")?.unwrap_or(0.0));
        self.check_pipe_perm(session, "pipe.read").await?;
        let pipe = self.resolve_pipe(&pipeid)?;
        let batch = pipe.read(session.id(), max, timeout).await?;
        Ok(json!({
            "msgs": batch.msgs,
            "waiting": batch.waiting,
            "drops": batch.drops,
        }))
    }

    async fn pipe_close(&self, session: &Arc<Session>, params: &Value) -> RpcResult<Value> {
        let p = Params::parse(params, &["pipeid"])?;
        let pipeid = p.str("pipeid")?;
        self.check_pipe_perm(session, "pipe.close").await?;
        let pipe = self.resolve_pipe(pipeid)?;
        if pipe.owner() != session.id() {
            return Err(RpcError::new(ErrKind::InvalidPipe));
        }
        self.broker.close_pipe(&pipe);
        session.forget(pipeid);
        log::debug!("[dispatch] session {} closed pipe {pipeid}", session.id());
        Ok(json!({"ok": true}))
    }

    // ── topic.* ───────────────────────────────────────────────────────────

    async fn topic_subscribe(&self, session: &Arc<Session>, params: &Value) -> RpcResult<Value> {
        let p = Params::parse(params, &["pipeid", "topic"])?;
        let pipeid = p.str("pipeid")?;
        let topic = p.str("topic")?;
        self.broker
            .oracle()
            .check(session.user(), "topic.subscribe", topic)
            .await?;
        let pipe = self.resolve_pipe(pipeid)?;
        self.broker.topics.subscribe(topic, pipe.id());
        Ok(json!({"ok": true}))
    }

    async fn topic_unsubscribe(&self, session: &Arc<Session>, params: &Value) -> RpcResult<Value> {
        let p = Params::parse(params, &["pipeid", "topic"])?;
        let pipeid = p.str("pipeid")?;
        let topic = p.str("topic")?;
        self.broker
            .oracle()
            .check(session.user(), "topic.unsubscribe", topic)
            .await?;
        let pipe = self.resolve_pipe(pipeid)?;
        self.broker.topics.unsubscribe(topic, pipe.id());
        Ok(json!({"ok": true}))
    }

    async fn topic_publish(&self, session: &Arc<Session>, params: &Value) -> RpcResult<Value> {
        let p = Params::parse(params, &["topic", "msg"])?;
        let topic = p.str("topic")?;
        let msg = p.opt_value("msg").ok_or_else(|| RpcError::bad_param("msg"))?;
        self.broker
            .oracle()
            .check(session.user(), "topic.publish", topic)
            .await?;
        let sent = self.broker.topics.publish(&self.broker.registry, topic, msg);
        Ok(json!({"sent": sent}))
    }

    // ── user.* ────────────────────────────────────────────────────────────

    async fn user_req(
        &self,
        session: &Arc<Session>,
        method: &str,
        params: &Value,
    ) -> RpcResult<Value> {
        let caller = session.user();
        let oracle = self.broker.oracle();
        let users = &self.broker.users;
        match method {
            "user.create" => {
                let p = Params::parse(params, &["user", "pass"])?;
                let user = p.str("user")?.to_lowercase();
                let pass = p.str("pass")?;
                oracle.check(caller, method, &user).await?;
                users.create(&user, pass)?;
                log::info!("[users] '{caller}' created user '{user}'");
                Ok(json!({"ok": true}))
            }
            "user.delete" => {
                let p = Params::parse(params, &["user"])?;
                let user = p.str("user")?.to_lowercase();
                oracle.check(caller, method, &user).await?;
                users.delete(&user)?;
                log::info!("[users] '{caller}' deleted user '{user}'");
                Ok(json!({"ok": true}))
            }
            "user.setTags" => {
                let p = Params::parse(params, &["user", "prefix", "tags"])?;
                let user = p.str("user")?.to_lowercase();
                let prefix = p.str("prefix")?.to_lowercase();
                let tags = p.object("tags")?.clone();
                oracle.check(caller, method, &prefix).await?;
                users.set_tags(&user, &prefix, &tags)?;
                Ok(json!({"ok": true}))
            }
            "user.delTags" => {
                let p = Params::parse(params, &["user", "prefix", "tags"])?;
                let user = p.str("user")?.to_lowercase();
                let prefix = p.str("prefix")?.to_lowercase();
                let names: Vec<String> = p
                    .list("tags")?
                    .iter()
                    .map(|v| {
                        v.as_str()
                            .map(str::to_owned)
                            .ok_or_else(|| RpcError::bad_param("tags"))
                    })
                    .collect::<RpcResult<_>>()?;
                oracle.check(caller, method, &prefix).await?;
                users.del_tags(&user, &prefix, &names)?;
                Ok(json!({"ok": true}))
            }
            "user.setPass" => {
                let p = Params::parse(params, &["user", "pass"])?;
                let user = p.str("user")?.to_lowercase();
                let pass = p.str("pass")?;
                oracle.check(caller, method, &user).await?;
                users.set_pass(&user, pass)?;
                Ok(json!({"ok": true}))
            }
            "user.list" => {
                let p = Params::parse(params, &["prefix", "limit", "skip"])?;
                let prefix = p.opt_str("prefix")?.unwrap_or("").to_lowercase();
                let limit = p.opt_uint("limit")?.unwrap_or(100) as usize;
                let skip = p.opt_uint("skip")?.unwrap_or(0) as usize;
                oracle.check(caller, method, &prefix).await?;
                Ok(Value::Array(users.list(&prefix, skip, limit)))
            }
            _ => Err(RpcError::new(ErrKind::MethodNotFound)),
        }
    }
}
