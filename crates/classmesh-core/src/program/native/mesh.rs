//! `mesh`: every member links to every other member.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{decode, encode, NativeProgram};
use crate::error::Result;
use crate::program::{BoundParams, Effects, ListenerArgs, JOIN, LEAVE};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Mesh {
    members: Vec<String>,
}

pub(super) fn program() -> NativeProgram {
    NativeProgram::new("mesh", json!({ "members": [] }))
        .on(JOIN, join)
        .on(LEAVE, leave)
}

fn join(fx: &mut dyn Effects, state: &Value, args: &ListenerArgs<'_>, _: &BoundParams) -> Result<Value> {
    let mut mesh: Mesh = decode(state)?;
    if mesh.members.iter().any(|m| m == args.user) {
        return encode(&mesh);
    }
    for m in &mesh.members {
        fx.link(m, args.user)?;
    }
    mesh.members.push(args.user.to_string());
    encode(&mesh)
}

fn leave(fx: &mut dyn Effects, state: &Value, args: &ListenerArgs<'_>, _: &BoundParams) -> Result<Value> {
    let mut mesh: Mesh = decode(state)?;
    let before = mesh.members.len();
    mesh.members.retain(|m| m != args.user);
    if mesh.members.len() != before {
        for m in &mesh.members {
            fx.unlink(m, args.user)?;
        }
    }
    encode(&mesh)
}
