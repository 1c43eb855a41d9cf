//! WebSocket handler.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS on `/v1/ws?activity=...&ticket=...`
//! - Resolve the activity and the ticket's user, register the session
//! - Lifecycle: ping/pong + idle timeout
//! - Decode once, then hand text envelopes and relay frames to the dispatcher
//! - On exit: unregister, run disconnect hooks, leave every joined network

use std::sync::Arc;

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, Query, State},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::Instrument;

use classmesh_core::error::{MeshError, Result};
use classmesh_core::protocol::text::{error_frame, outbound};

use crate::activity::Activity;
use crate::app_state::AppState;
use crate::realtime::{GatewaySession, RealtimeCtx, SessionRegistry};
use crate::transport::codec::{decode, frame_len, Inbound};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub activity: String,
    pub ticket: String,
}

#[derive(Debug)]
struct SessionState {
    last_activity: Instant,
}

fn sys_authed_json(activity: &Activity, user: &str) -> String {
    outbound(
        "sys",
        "authed",
        json!({
            "activity": activity.id(),
            "user": user,
            "networks": activity.network_ids(),
        }),
    )
}

pub async fn ws_upgrade(
    State(app): State<AppState>,
    ws: WebSocketUpgrade,
    Query(q): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| {
        let span = tracing::info_span!("session", activity = %q.activity);
        async move {
            if let Err(e) = run_session(app, q, socket).await {
                tracing::debug!(error = %e, "session ended with error");
            }
        }
        .instrument(span)
    })
}

/// Refuse the socket with a single `sys/error` frame.
async fn refuse(mut socket: WebSocket, err: MeshError) -> Result<()> {
    let _ = socket.send(Message::Text(error_frame(&err, None))).await;
    let _ = socket.close().await;
    Err(err)
}

async fn run_session(app: AppState, q: WsQuery, socket: WebSocket) -> Result<()> {
    let Some(activity) = app.activity(&q.activity) else {
        return refuse(socket, MeshError::BadRequest(format!("unknown activity: {}", q.activity))).await;
    };
    let user = match app.resolve_ticket(&q.ticket) {
        Ok(user) => user,
        Err(e) => return refuse(socket, e).await,
    };

    let gw = &app.cfg().gateway;
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(gw.outbound_queue);

    let sessions = app.sessions();
    let session = match sessions.open(&user, json!({ "name": user }), out_tx.clone()) {
        Ok(s) => s,
        Err(e) => return refuse(socket, e).await,
    };
    tracing::info!(%user, session = session.session_id(), "session opened");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let _ = out_tx.try_send(Message::Text(sys_authed_json(&activity, &user)));

    let ctx = RealtimeCtx::new(Arc::clone(&activity), user.as_str(), Arc::clone(&sessions));
    let dispatcher = app.dispatcher();

    let ping_every = Duration::from_millis(gw.ping_interval_ms);
    let idle_timeout = Duration::from_millis(gw.idle_timeout_ms);
    let max_frame = gw.max_frame_bytes;

    let mut ping_tick = tokio::time::interval(ping_every);
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut sess = SessionState { last_activity: Instant::now() };

    loop {
        tokio::select! {
            // outbound writer
            maybe_out = out_rx.recv() => {
                match maybe_out {
                    Some(m) => {
                        if ws_tx.send(m).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // inbound reader
            incoming = ws_rx.next() => {
                let Some(incoming) = incoming else { break; };
                let Ok(msg) = incoming else { break; };

                sess.last_activity = Instant::now();

                // cheap-first: size check before decode
                if frame_len(&msg) > max_frame {
                    let err = MeshError::BadRequest(format!("frame exceeds {max_frame} bytes"));
                    let _ = out_tx.try_send(Message::Text(error_frame(&err, None)));
                    continue;
                }

                let decoded = match decode(msg) {
                    Ok(d) => d,
                    Err(e) => {
                        let _ = out_tx.try_send(Message::Text(error_frame(&e, None)));
                        continue;
                    }
                };

                match decoded {
                    Inbound::Text { env, .. } => {
                        let seq = env.seq;
                        if let Err(e) = dispatcher.dispatch_text(ctx.clone(), env).await {
                            tracing::debug!(%user, error = %e, "text message failed");
                            let _ = out_tx.try_send(Message::Text(error_frame(&e, seq)));
                        }
                    }
                    Inbound::Relay { frame, .. } => {
                        if let Err(e) = dispatcher.dispatch_binary(ctx.clone(), frame).await {
                            let _ = out_tx.try_send(Message::Text(error_frame(&e, None)));
                        }
                    }
                    Inbound::Ping(payload) => {
                        let _ = out_tx.try_send(Message::Pong(payload));
                    }
                    Inbound::Pong(_) => {}
                    Inbound::Close => break,
                }
            }

            // ping
            _ = ping_tick.tick() => {
                let _ = out_tx.try_send(Message::Ping(Vec::new()));
            }

            // idle timeout
            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                if sess.last_activity.elapsed() >= idle_timeout {
                    let err = MeshError::BadRequest("idle timeout".into());
                    let _ = ws_tx.send(Message::Text(error_frame(&err, None))).await;
                    break;
                }
            }
        }
    }

    disconnect(&activity, &sessions, &session, &user);
    Ok(())
}

fn disconnect(activity: &Activity, sessions: &SessionRegistry, session: &GatewaySession, user: &str) {
    sessions.close(user, session.session_id());
    activity.disconnect(user);
    tracing::info!(%user, session = session.session_id(), "session closed");
}
