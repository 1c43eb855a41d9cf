//! `breakout`: members are spread over `rooms` independent sub-rooms.
//!
//! Each room is a group running the policy given by the `room_policy`
//! parameter. The n-th joiner goes to room `(seed + n) mod rooms`, computed on
//! wide integers. Signal `move {room, user?}` moves the sender (or `user`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{decode, encode, NativeProgram};
use crate::error::{MeshError, Result};
use crate::program::{
    BoundParams, Effects, GroupDescriptor, GroupId, GroupSerializer, ListenerArgs, ParamKind, JOIN,
    LEAVE, SIGNAL,
};

const MAX_ROOMS: i128 = 256;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Breakout {
    rooms: Vec<GroupId>,
    assign: BTreeMap<String, usize>,
    /// Joins so far, as a decimal string so it never loses precision.
    joined: String,
}

impl Breakout {
    fn ordinal(&self) -> Result<i128> {
        if self.joined.is_empty() {
            return Ok(0);
        }
        self.joined
            .parse()
            .map_err(|e| MeshError::Internal(format!("corrupt join counter: {e}")))
    }

    fn open_rooms(&mut self, fx: &mut dyn Effects, params: &BoundParams) -> Result<()> {
        if !self.rooms.is_empty() {
            return Ok(());
        }
        let count = params.int("rooms").unwrap_or(0);
        if !(1..=MAX_ROOMS).contains(&count) {
            return Err(MeshError::Configuration(format!(
                "breakout rooms must be between 1 and {MAX_ROOMS}, got {count}"
            )));
        }
        for _ in 0..count {
            self.rooms.push(fx.create_group("room_policy")?);
        }
        Ok(())
    }
}

pub(super) fn program() -> NativeProgram {
    NativeProgram::new("breakout", json!({ "rooms": [], "assign": {}, "joined": "0" }))
        .param("rooms", ParamKind::Int)
        .param("room_policy", ParamKind::Policy)
        .param("seed", ParamKind::optional(ParamKind::Int))
        .on(JOIN, join)
        .on(LEAVE, leave)
        .on(SIGNAL, signal)
        .codec(serialize, deserialize)
}

fn join(fx: &mut dyn Effects, state: &Value, args: &ListenerArgs<'_>, params: &BoundParams) -> Result<Value> {
    let mut b: Breakout = decode(state)?;
    if b.assign.contains_key(args.user) {
        return encode(&b);
    }
    b.open_rooms(fx, params)?;

    let ordinal = b.ordinal()?;
    let seed = params.int("seed").unwrap_or(0);
    let rooms = b.rooms.len() as i128;
    let idx = seed.wrapping_add(ordinal).rem_euclid(rooms) as usize;

    fx.group_join(b.rooms[idx], args.user)?;
    b.assign.insert(args.user.to_string(), idx);
    b.joined = ordinal.wrapping_add(1).to_string();
    encode(&b)
}

fn leave(fx: &mut dyn Effects, state: &Value, args: &ListenerArgs<'_>, _: &BoundParams) -> Result<Value> {
    let mut b: Breakout = decode(state)?;
    if let Some(idx) = b.assign.remove(args.user) {
        if let Some(room) = b.rooms.get(idx) {
            fx.group_leave(*room, args.user)?;
        }
    }
    encode(&b)
}

fn signal(fx: &mut dyn Effects, state: &Value, args: &ListenerArgs<'_>, _: &BoundParams) -> Result<Value> {
    let mut b: Breakout = decode(state)?;
    let Some(sig) = args.signal else { return encode(&b) };
    if sig.event != "move" {
        return encode(&b);
    }

    let target = sig.payload.get_string("user").unwrap_or(args.user);
    let room = sig
        .payload
        .get_int("room")
        .ok_or_else(|| MeshError::BadRequest("move requires integer `room`".into()))?;
    let to = usize::try_from(room)
        .ok()
        .filter(|r| *r < b.rooms.len())
        .ok_or_else(|| MeshError::BadRequest(format!("room {room} out of range")))?;
    let Some(from) = b.assign.get(target).copied() else {
        return Err(MeshError::BadRequest(format!("{target:?} is not in a breakout room")));
    };
    if from == to {
        return encode(&b);
    }

    let leaving = b
        .rooms
        .get(from)
        .copied()
        .ok_or_else(|| MeshError::BadRequest(format!("{target:?} is assigned to missing room {from}")))?;
    fx.group_leave(leaving, target)?;
    fx.group_join(b.rooms[to], target)?;
    b.assign.insert(target.to_string(), to);
    encode(&b)
}

fn serialize(state: &Value, groups: &dyn GroupSerializer) -> Result<Value> {
    let b: Breakout = decode(state)?;
    let rooms = b
        .rooms
        .iter()
        .map(|g| groups.serialize_group(*g).map(|d| d.to_json()))
        .collect::<Result<Vec<_>>>()?;
    Ok(json!({
        "rooms": rooms,
        "assign": b.assign,
        "joined": b.joined,
    }))
}

fn deserialize(raw: &Value, fx: &mut dyn Effects) -> Result<Value> {
    let descriptors = raw
        .get("rooms")
        .and_then(Value::as_array)
        .ok_or_else(|| MeshError::BadRequest("breakout state missing rooms".into()))?;
    let mut rooms = Vec::with_capacity(descriptors.len());
    for d in descriptors {
        rooms.push(fx.deserialize_group(&GroupDescriptor::from_json(d)?)?);
    }
    let assign: BTreeMap<String, usize> = match raw.get("assign") {
        Some(a) => decode(a)?,
        None => BTreeMap::new(),
    };
    if let Some((user, idx)) = assign.iter().find(|(_, idx)| **idx >= rooms.len()) {
        return Err(MeshError::BadRequest(format!(
            "breakout state assigns {user:?} to room {idx} of {}",
            rooms.len()
        )));
    }
    let joined = raw.get("joined").and_then(Value::as_str).unwrap_or("0").to_string();
    encode(&Breakout { rooms, assign, joined })
}
