//! `broadcast`: one host links to every other member (teacher-to-class).
//!
//! Params: `host: option<string>`. When set, only that endpoint can hold the
//! host role and the role stays vacant while it is away. When unset, the first
//! member to join hosts and the longest-present member takes over on leave.
//!
//! Signal `promote {user}` hands the host role to another member.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{decode, encode, NativeProgram};
use crate::error::{MeshError, Result};
use crate::program::{BoundParams, Effects, ListenerArgs, ParamKind, JOIN, LEAVE, SIGNAL};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Broadcast {
    host: Option<String>,
    members: Vec<String>,
}

impl Broadcast {
    fn attach_host(&mut self, fx: &mut dyn Effects, host: &str) -> Result<()> {
        for m in self.members.iter().filter(|m| *m != host) {
            fx.link(host, m)?;
        }
        self.host = Some(host.to_string());
        Ok(())
    }

    fn detach_host(&mut self, fx: &mut dyn Effects) -> Result<()> {
        if let Some(host) = self.host.take() {
            for m in self.members.iter().filter(|m| **m != host) {
                fx.unlink(&host, m)?;
            }
        }
        Ok(())
    }
}

pub(super) fn program() -> NativeProgram {
    NativeProgram::new("broadcast", json!({ "host": null, "members": [] }))
        .param("host", ParamKind::optional(ParamKind::String))
        .on(JOIN, join)
        .on(LEAVE, leave)
        .on(SIGNAL, signal)
}

fn join(fx: &mut dyn Effects, state: &Value, args: &ListenerArgs<'_>, params: &BoundParams) -> Result<Value> {
    let mut b: Broadcast = decode(state)?;
    let user = args.user;
    if b.members.iter().any(|m| m == user) {
        return encode(&b);
    }
    b.members.push(user.to_string());

    let fixed = params.string("host");
    match b.host.clone() {
        Some(h) => fx.link(&h, user)?,
        None if fixed.is_some_and(|f| f != user) => {}
        None => b.attach_host(fx, user)?,
    }
    encode(&b)
}

fn leave(fx: &mut dyn Effects, state: &Value, args: &ListenerArgs<'_>, params: &BoundParams) -> Result<Value> {
    let mut b: Broadcast = decode(state)?;
    let user = args.user;
    if !b.members.iter().any(|m| m == user) {
        return encode(&b);
    }

    if b.host.as_deref() == Some(user) {
        b.detach_host(fx)?;
        b.members.retain(|m| m != user);
        if params.string("host").is_none() {
            if let Some(next) = b.members.first().cloned() {
                b.attach_host(fx, &next)?;
            }
        }
    } else {
        if let Some(h) = b.host.clone() {
            fx.unlink(&h, user)?;
        }
        b.members.retain(|m| m != user);
    }
    encode(&b)
}

fn signal(fx: &mut dyn Effects, state: &Value, args: &ListenerArgs<'_>, _: &BoundParams) -> Result<Value> {
    let mut b: Broadcast = decode(state)?;
    let Some(sig) = args.signal else { return encode(&b) };
    if sig.event != "promote" {
        return encode(&b);
    }
    let target = sig
        .payload
        .get_string("user")
        .ok_or_else(|| MeshError::BadRequest("promote requires `user`".into()))?;
    if !b.members.iter().any(|m| m == target) {
        return Err(MeshError::BadRequest(format!("cannot promote non-member {target:?}")));
    }
    if b.host.as_deref() == Some(target) {
        return encode(&b);
    }
    b.detach_host(fx)?;
    b.attach_host(fx, target)?;
    encode(&b)
}
