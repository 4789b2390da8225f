//! Dispatcher surface tests: validation, permissions, and the user registry
//! methods.

use std::sync::Arc;

use manifold::{Broker, Dispatcher, ErrKind, Request, Response, Session, TagMap, UserRegistry};
use serde_json::{json, Value};

fn admin_tags() -> TagMap {
    [("@admin".to_owned(), Value::Bool(true))]
        .into_iter()
        .collect()
}

/// Broker with a seeded admin plus one untagged user.
fn harness() -> (Arc<Broker>, Dispatcher) {
    let users = Arc::new(UserRegistry::new());
    users.create("root", "root-pass").unwrap();
    users.set_tags("root", "", &admin_tags()).unwrap();
    users.create("nobody", "nobody-pass").unwrap();
    let broker = Arc::new(Broker::new(users));
    let dispatcher = Dispatcher::new(Arc::clone(&broker));
    (broker, dispatcher)
}

async fn call(d: &Dispatcher, s: &Arc<Session>, method: &str, params: Value) -> Response {
    let req = Request {
        id: Some(json!(1)),
        method: method.to_owned(),
        params,
    };
    d.handle(s, &req).await
}

fn ok(resp: Response) -> Value {
    assert!(resp.error.is_none(), "unexpected error: {:?}", resp.error);
    resp.result.expect("missing result")
}

fn err(resp: Response) -> (i64, Option<Value>) {
    let body = resp.error.expect("expected an error");
    (body.code, body.data)
}

// ── Login ─────────────────────────────────────────────────────────────────

#[test]
fn test_login_rejects_bad_credentials() {
    let (broker, _) = harness();
    assert!(broker.login("root", "root-pass").is_ok());
    assert_eq!(
        broker.login("root", "wrong").unwrap_err().kind,
        ErrKind::InvalidLogin
    );
    assert_eq!(
        broker.login("ghost", "root-pass").unwrap_err().kind,
        ErrKind::InvalidLogin
    );
}

// ── Validation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unknown_method() {
    let (broker, d) = harness();
    let s = broker.login("root", "root-pass").unwrap();
    let (code, _) = err(call(&d, &s, "pipe.destroy", json!({})).await);
    assert_eq!(code, -32601);
}

#[tokio::test]
async fn test_unrecognized_param_is_named() {
    let (broker, d) = harness();
    let s = broker.login("root", "root-pass").unwrap();
    let (code, data) = err(call(&d, &s, "pipe.create", json!({"size": 5})).await);
    assert_eq!(code, -32602);
    assert_eq!(data, Some(json!("size")));
}

#[tokio::test]
async fn test_zero_length_rejected() {
    let (broker, d) = harness();
    let s = broker.login("root", "root-pass").unwrap();
    let (code, data) = err(call(&d, &s, "pipe.create", json!({"length": 0})).await);
    assert_eq!(code, -32602);
    assert_eq!(data, Some(json!("length")));
}

#[tokio::test]
async fn test_write_requires_msg_or_multi() {
    let (broker, d) = harness();
    let s = broker.login("root", "root-pass").unwrap();
    let created = ok(call(&d, &s, "pipe.create", json!({})).await);
    let pipeid = created["pipeid"].as_str().unwrap();

    let (code, data) = err(call(&d, &s, "pipe.write", json!({"pipeid": pipeid})).await);
    assert_eq!(code, -32602);
    assert_eq!(data, Some(json!("msg")));
}

#[tokio::test]
async fn test_write_accepts_null_msg() {
    // An explicit null payload is a message; only absence is an error.
    let (broker, d) = harness();
    let s = broker.login("root", "root-pass").unwrap();
    let created = ok(call(&d, &s, "pipe.create", json!({})).await);
    let pipeid = created["pipeid"].as_str().unwrap();

    let res = ok(call(&d, &s, "pipe.write", json!({"pipeid": pipeid, "msg": null})).await);
    assert_eq!(res["count"], json!(1));
}

#[tokio::test]
async fn test_ping_round_trip() {
    let (broker, d) = harness();
    let s = broker.login("nobody", "nobody-pass").unwrap();
    let res = ok(call(&d, &s, "sys.ping", json!(null)).await);
    assert_eq!(res["ok"], json!(true));
}

// ── Permissions ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_untagged_user_is_denied() {
    let (broker, d) = harness();
    let s = broker.login("nobody", "nobody-pass").unwrap();
    let (code, _) = err(call(&d, &s, "pipe.create", json!({})).await);
    assert_eq!(code, -32765);
}

#[tokio::test]
async fn test_admin_covers_all_methods() {
    let (broker, d) = harness();
    let s = broker.login("root", "root-pass").unwrap();
    let created = ok(call(&d, &s, "pipe.create", json!({})).await);
    let pipeid = created["pipeid"].as_str().unwrap().to_owned();
    ok(call(&d, &s, "topic.subscribe", json!({"pipeid": pipeid, "topic": "t"})).await);
    ok(call(&d, &s, "topic.publish", json!({"topic": "t", "msg": 1})).await);
}

// ── user.* surface ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_user_create_delete_cycle() {
    let (broker, d) = harness();
    let root = broker.login("root", "root-pass").unwrap();

    ok(call(&d, &root, "user.create", json!({"user": "Alice", "pass": "alice-pw"})).await);
    // Name was lowercased on the way in.
    assert!(broker.users.exists("alice"));
    broker.users.verify("alice", "alice-pw").unwrap();

    let (code, _) = err(call(
        &d,
        &root,
        "user.create",
        json!({"user": "alice", "pass": "other"}),
    )
    .await);
    assert_eq!(code, -32767);

    ok(call(&d, &root, "user.delete", json!({"user": "alice"})).await);
    let (code, _) = err(call(&d, &root, "user.delete", json!({"user": "alice"})).await);
    assert_eq!(code, -32766);
}

#[tokio::test]
async fn test_user_create_requires_permission() {
    let (broker, d) = harness();
    let s = broker.login("nobody", "nobody-pass").unwrap();
    let (code, _) = err(call(
        &d,
        &s,
        "user.create",
        json!({"user": "intruder", "pass": "whatever"}),
    )
    .await);
    assert_eq!(code, -32765);
}

#[tokio::test]
async fn test_user_set_tags_grants_access() {
    let (broker, d) = harness();
    let root = broker.login("root", "root-pass").unwrap();

    ok(call(&d, &root, "user.create", json!({"user": "worker", "pass": "worker-pw"})).await);
    ok(call(
        &d,
        &root,
        "user.setTags",
        json!({"user": "worker", "prefix": "", "tags": {"@pipe.create": true}}),
    )
    .await);

    let w = broker.login("worker", "worker-pw").unwrap();
    ok(call(&d, &w, "pipe.create", json!({})).await);

    ok(call(
        &d,
        &root,
        "user.delTags",
        json!({"user": "worker", "prefix": "", "tags": ["@pipe.create"]}),
    )
    .await);
    let (code, _) = err(call(&d, &w, "pipe.create", json!({})).await);
    assert_eq!(code, -32765);
}

#[tokio::test]
async fn test_user_set_pass() {
    let (broker, d) = harness();
    let root = broker.login("root", "root-pass").unwrap();
    ok(call(&d, &root, "user.create", json!({"user": "bob", "pass": "first-pw"})).await);
    ok(call(&d, &root, "user.setPass", json!({"user": "bob", "pass": "second-pw"})).await);
    assert!(broker.login("bob", "first-pw").is_err());
    assert!(broker.login("bob", "second-pw").is_ok());
}

#[tokio::test]
async fn test_user_list_with_prefix() {
    let (broker, d) = harness();
    let root = broker.login("root", "root-pass").unwrap();
    for name in ["svc.one", "svc.two", "app.main"] {
        ok(call(&d, &root, "user.create", json!({"user": name, "pass": "list-pw"})).await);
    }
    let listed = ok(call(&d, &root, "user.list", json!({"prefix": "svc."})).await);
    let names: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["user"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["svc.one", "svc.two"]);
}

#[tokio::test]
async fn test_unknown_user_method() {
    let (broker, d) = harness();
    let root = broker.login("root", "root-pass").unwrap();
    let (code, _) = err(call(&d, &root, "user.rename", json!({})).await);
    assert_eq!(code, -32601);
}
