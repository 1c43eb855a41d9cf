use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use classmesh_core::error::{MeshError, Result};
use classmesh_core::protocol::text::Envelope;

use crate::dispatch::TextService;
use crate::realtime::RealtimeCtx;

/// `net/join`, `net/leave`, `net/signal` against the activity's networks.
#[derive(Default)]
pub struct NetService;

impl NetService {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MembershipReq {
    network: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SignalReq {
    network: String,
    event: String,
    #[serde(default)]
    payload: Value,
}

#[async_trait]
impl TextService for NetService {
    fn svc(&self) -> &'static str {
        "net"
    }

    async fn handle(&self, ctx: RealtimeCtx, env: Envelope) -> Result<()> {
        match env.msg_type.as_str() {
            "join" => {
                let req: MembershipReq = env.data_as()?;
                tracing::debug!(activity = %ctx.activity().id(), network = %req.network, user = %ctx.user(), "net.join");
                ctx.activity().join(&req.network, ctx.user())
            }
            "leave" => {
                let req: MembershipReq = env.data_as()?;
                tracing::debug!(activity = %ctx.activity().id(), network = %req.network, user = %ctx.user(), "net.leave");
                ctx.activity().leave(&req.network, ctx.user())
            }
            "signal" => {
                let req: SignalReq = env.data_as()?;
                ctx.activity().signal(&req.network, ctx.user(), &req.event, &req.payload)
            }
            other => Err(MeshError::BadRequest(format!("unknown net type: {other}"))),
        }
    }
}
