use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use classmesh_core::broker::RelayPayload;
use classmesh_core::error::{MeshError, Result};
use classmesh_core::protocol::relay::RelayFrame;
use classmesh_core::protocol::text::Envelope;

use crate::dispatch::{BinaryService, TextService};
use crate::realtime::RealtimeCtx;

/// Forwards signaling payloads onto link channels the sender holds.
///
/// Text: `relay/send {channel, payload}`. Binary: relay frames.
#[derive(Default)]
pub struct RelayService;

impl RelayService {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SendReq {
    channel: String,
    payload: Value,
}

fn deliver(ctx: &RealtimeCtx, channel: &str, payload: RelayPayload) -> Result<()> {
    if ctx.session()?.deliver(channel, payload) {
        Ok(())
    } else {
        Err(MeshError::BadRequest(format!("no link on channel {channel}")))
    }
}

#[async_trait]
impl TextService for RelayService {
    fn svc(&self) -> &'static str {
        "relay"
    }

    async fn handle(&self, ctx: RealtimeCtx, env: Envelope) -> Result<()> {
        match env.msg_type.as_str() {
            "send" => {
                let req: SendReq = env.data_as()?;
                deliver(&ctx, &req.channel, RelayPayload::Json(req.payload))
            }
            other => Err(MeshError::BadRequest(format!("unknown relay type: {other}"))),
        }
    }
}

#[async_trait]
impl BinaryService for RelayService {
    async fn handle_binary(&self, ctx: RealtimeCtx, frame: RelayFrame) -> Result<()> {
        deliver(&ctx, &frame.channel, RelayPayload::Binary(frame.payload))
    }
}
