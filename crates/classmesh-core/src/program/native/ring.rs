//! `ring`: members form a single cycle in join order.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{decode, encode, NativeProgram};
use crate::error::Result;
use crate::program::{BoundParams, Effects, ListenerArgs, JOIN, LEAVE};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Ring {
    order: Vec<String>,
}

pub(super) fn program() -> NativeProgram {
    NativeProgram::new("ring", json!({ "order": [] }))
        .on(JOIN, join)
        .on(LEAVE, leave)
}

fn join(fx: &mut dyn Effects, state: &Value, args: &ListenerArgs<'_>, _: &BoundParams) -> Result<Value> {
    let mut ring: Ring = decode(state)?;
    let user = args.user;
    if ring.order.iter().any(|u| u == user) {
        return encode(&ring);
    }

    match ring.order.as_slice() {
        [] => {}
        [only] => fx.link(only, user)?,
        [first, .., last] => {
            // With two members the closing edge is the same pair as the only edge.
            if ring.order.len() >= 3 {
                fx.unlink(last, first)?;
            }
            fx.link(last, user)?;
            fx.link(user, first)?;
        }
    }
    ring.order.push(user.to_string());
    encode(&ring)
}

fn leave(fx: &mut dyn Effects, state: &Value, args: &ListenerArgs<'_>, _: &BoundParams) -> Result<Value> {
    let mut ring: Ring = decode(state)?;
    let Some(i) = ring.order.iter().position(|u| u == args.user) else {
        return encode(&ring);
    };

    let n = ring.order.len();
    if n >= 2 {
        let prev = ring.order[(i + n - 1) % n].clone();
        let next = ring.order[(i + 1) % n].clone();
        fx.unlink(&prev, args.user)?;
        if next != prev {
            fx.unlink(args.user, &next)?;
        }
        // In a triangle prev and next are already adjacent.
        if n >= 4 {
            fx.link(&prev, &next)?;
        }
    }
    ring.order.remove(i);
    encode(&ring)
}
