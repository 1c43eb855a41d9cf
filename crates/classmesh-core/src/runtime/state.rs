//! Coordinator state strings.
//!
//! `{"members": [...], "program": <serialized program state>}`. Nested groups
//! appear anywhere inside `program` as `$group` descriptors whose `state` is
//! itself a state string.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MeshError, Result};
use crate::program::GroupDescriptor;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    pub members: Vec<String>,
    #[serde(default)]
    pub program: Value,
}

impl Snapshot {
    pub fn parse(state: &str) -> Result<Self> {
        serde_json::from_str(state).map_err(|e| MeshError::BadRequest(format!("malformed coordinator state: {e}")))
    }

    pub fn render(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Read-only view of a state string, nested groups included.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSummary {
    pub members: Vec<String>,
    pub groups: Vec<GroupSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub policy: String,
    pub state: StateSummary,
}

impl StateSummary {
    pub fn parse(state: &str) -> Result<Self> {
        let snap = Snapshot::parse(state)?;
        let mut groups = Vec::new();
        collect_groups(&snap.program, &mut groups)?;
        Ok(Self { members: snap.members, groups })
    }

    /// True if `user` is a member here or in any nested group.
    pub fn mentions(&self, user: &str) -> bool {
        self.members.iter().any(|m| m == user) || self.groups.iter().any(|g| g.state.mentions(user))
    }
}

fn collect_groups(v: &Value, out: &mut Vec<GroupSummary>) -> Result<()> {
    match v {
        Value::Object(map) if map.contains_key(GroupDescriptor::TAG) => {
            let d = GroupDescriptor::from_json(v)?;
            out.push(GroupSummary { policy: d.policy, state: StateSummary::parse(&d.state)? });
        }
        Value::Object(map) => {
            for child in map.values() {
                collect_groups(child, out)?;
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_groups(child, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}
