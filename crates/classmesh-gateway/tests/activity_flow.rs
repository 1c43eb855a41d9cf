#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use axum::extract::ws::Message;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use classmesh_core::protocol::relay::RelayFrame;
use classmesh_core::protocol::text::Envelope;
use classmesh_gateway::app_state::AppState;
use classmesh_gateway::config;
use classmesh_gateway::realtime::RealtimeCtx;

const CLASSROOM: &str = r#"
version: 1
policies:
  - id: "lecture"
    plugin: "school"
    plugin_version: "1"
    program: "broadcast"
    validator:
      - params:
          host: { type: option, inner: { type: string } }
        signal:
          events: [promote]
          fields:
            user: { type: string }
activities:
  - id: "math"
    networks:
      - { id: "video", policy: "mesh" }
      - id: "stage"
        policy: "lecture"
        params: { host: "teacher" }
"#;

fn app() -> AppState {
    AppState::new(config::load_from_str(CLASSROOM).unwrap()).unwrap()
}

struct Client {
    ctx: RealtimeCtx,
    rx: mpsc::Receiver<Message>,
}

fn connect(app: &AppState, user: &str) -> Client {
    let (tx, rx) = mpsc::channel(64);
    app.sessions().open(user, json!({ "name": user }), tx).unwrap();
    let ctx = RealtimeCtx::new(app.activity("math").unwrap(), user, app.sessions());
    Client { ctx, rx }
}

impl Client {
    async fn send(&self, app: &AppState, text: Value) -> classmesh_core::Result<()> {
        let env = Envelope::parse(&text.to_string()).unwrap();
        app.dispatcher().dispatch_text(self.ctx.clone(), env).await
    }

    fn drain(&mut self) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                Message::Text(s) => out.push(serde_json::from_str(&s).unwrap()),
                Message::Binary(b) => out.push(json!({ "binary": b })),
                other => panic!("unexpected {other:?}"),
            }
        }
        out
    }
}

fn of_type<'a>(frames: &'a [Value], ty: &str) -> Vec<&'a Value> {
    frames.iter().filter(|f| f["type"] == ty).collect()
}

fn join(network: &str) -> Value {
    json!({ "v": 1, "svc": "net", "type": "join", "data": { "network": network } })
}

#[test]
fn unknown_policy_fails_boot() {
    let cfg = config::load_from_str(
        r#"
version: 1
activities:
  - id: "math"
    networks: [{ id: "video", policy: "nope" }]
"#,
    )
    .unwrap();
    let err = AppState::new(cfg).err().expect("must fail");
    assert!(err.is_configuration());
    assert!(err.to_string().contains("math"));
}

#[test]
fn rejected_params_fail_boot() {
    let cfg = config::load_from_str(&CLASSROOM.replace(r#"host: "teacher""#, "host: 7")).unwrap();
    let err = AppState::new(cfg).err().expect("must fail");
    assert!(err.is_configuration());
}

#[test]
fn dev_tickets_resolve_to_users() {
    let app = app();
    assert_eq!(app.resolve_ticket("dev:alice").unwrap(), "alice");
    assert!(app.resolve_ticket("dev:").is_err());
    assert!(app.resolve_ticket("alice").is_err());
    assert_eq!(app.activity("math").unwrap().network_ids(), vec!["stage", "video"]);
    assert!(app.activity("history").is_none());
}

#[tokio::test]
async fn mesh_join_links_and_relays() {
    let app = app();
    let mut alice = connect(&app, "alice");
    let mut bob = connect(&app, "bob");

    alice.send(&app, join("video")).await.unwrap();
    bob.send(&app, join("video")).await.unwrap();

    let a = alice.drain();
    let b = bob.drain();
    let a_created = of_type(&a, "created");
    let b_created = of_type(&b, "created");
    assert_eq!(a_created.len(), 1);
    assert_eq!(b_created.len(), 1);
    assert_eq!(a_created[0]["data"]["peer"], "bob");
    assert_eq!(b_created[0]["data"]["peer_meta"]["name"], "alice");
    assert_eq!(a_created[0]["data"]["send"], b_created[0]["data"]["recv"]);

    let send = a_created[0]["data"]["send"].as_str().unwrap().to_string();
    alice
        .send(&app, json!({ "v": 1, "svc": "relay", "type": "send", "data": { "channel": send, "payload": { "sdp": "offer" } } }))
        .await
        .unwrap();
    let b = bob.drain();
    let relayed = of_type(&b, "relay");
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0]["data"]["channel"], send.as_str());
    assert_eq!(relayed[0]["data"]["payload"]["sdp"], "offer");

    let frame = RelayFrame { channel: send.clone(), payload: bytes::Bytes::from_static(b"ice") };
    app.dispatcher().dispatch_binary(alice.ctx.clone(), frame).await.unwrap();
    assert_eq!(bob.drain().len(), 1);
}

#[tokio::test]
async fn relay_without_link_is_rejected() {
    let app = app();
    let alice = connect(&app, "alice");
    let err = alice
        .send(&app, json!({ "v": 1, "svc": "relay", "type": "send", "data": { "channel": "L9/0", "payload": 1 } }))
        .await
        .expect_err("no link");
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");

    let err = alice.send(&app, join("gym")).await.expect_err("unknown network");
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
}

#[tokio::test]
async fn disconnect_tears_down_links() {
    let app = app();
    let alice = connect(&app, "alice");
    let mut bob = connect(&app, "bob");
    alice.send(&app, join("video")).await.unwrap();
    bob.send(&app, join("video")).await.unwrap();
    bob.drain();

    let session = app.sessions().get("alice").unwrap();
    assert!(app.sessions().close("alice", session.session_id()));
    let activity = app.activity("math").unwrap();
    activity.disconnect("alice");

    let b = bob.drain();
    assert_eq!(of_type(&b, "destroyed").len(), 1);
    assert_eq!(activity.presence().users_in("video"), vec!["bob"]);
    assert!(!activity.with_network("video", |n| Ok(n.has_user("alice"))).unwrap());
}

#[tokio::test]
async fn signals_are_checked_against_the_policy_validator() {
    let app = app();
    let teacher = connect(&app, "teacher");
    let mut pupil = connect(&app, "pupil");
    teacher.send(&app, join("stage")).await.unwrap();
    pupil.send(&app, join("stage")).await.unwrap();
    assert_eq!(of_type(&pupil.drain(), "created").len(), 1);

    let bad = json!({ "v": 1, "svc": "net", "type": "signal", "data": { "network": "stage", "event": "promote", "payload": { "user": 3 } } });
    let err = teacher.send(&app, bad).await.expect_err("wrong field type");
    assert_eq!(err.client_code().as_str(), "SIGNAL_REJECTED");

    let undeclared = json!({ "v": 1, "svc": "net", "type": "signal", "data": { "network": "stage", "event": "kick", "payload": {} } });
    let err = teacher.send(&app, undeclared).await.expect_err("undeclared event");
    assert_eq!(err.client_code().as_str(), "SIGNAL_REJECTED");
}

#[tokio::test]
async fn leave_then_rejoin_relinks() {
    let app = app();
    let alice = connect(&app, "alice");
    let mut bob = connect(&app, "bob");
    alice.send(&app, join("video")).await.unwrap();
    bob.send(&app, join("video")).await.unwrap();
    bob.drain();

    let leave = json!({ "v": 1, "svc": "net", "type": "leave", "data": { "network": "video" } });
    alice.send(&app, leave).await.unwrap();
    assert_eq!(of_type(&bob.drain(), "destroyed").len(), 1);

    alice.send(&app, join("video")).await.unwrap();
    assert_eq!(of_type(&bob.drain(), "created").len(), 1);

    let sessions: Arc<_> = app.sessions();
    assert_eq!(sessions.len(), 2);
}
