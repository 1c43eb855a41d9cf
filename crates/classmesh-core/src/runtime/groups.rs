//! Arena of nested coordinators addressed by [`GroupId`].

use std::collections::BTreeMap;

use crate::coordinator::Coordinator;
use crate::error::{MeshError, Result};
use crate::program::{GroupDescriptor, GroupId, GroupSerializer};
use crate::value::Params;

pub(crate) struct Group {
    policy: String,
    params: Params,
    coordinator: Box<dyn Coordinator>,
}

impl Group {
    pub fn new(policy: &str, params: Params, coordinator: Box<dyn Coordinator>) -> Self {
        Self { policy: policy.to_string(), params, coordinator }
    }

    pub fn join(&mut self, user: &str) -> Result<()> {
        self.coordinator.on_user_join(user)
    }

    pub fn leave(&mut self, user: &str) -> Result<()> {
        self.coordinator.on_user_leave(user)
    }

    pub fn has(&self, user: &str) -> bool {
        self.coordinator.has_user(user)
    }

    pub fn serialize(&self) -> Result<GroupDescriptor> {
        Ok(GroupDescriptor {
            policy: self.policy.clone(),
            params: self.params.clone(),
            state: self.coordinator.get_state()?,
        })
    }

    pub fn coordinator(&self) -> &dyn Coordinator {
        self.coordinator.as_ref()
    }
}

#[derive(Default)]
pub(crate) struct GroupArena {
    next: u64,
    groups: BTreeMap<GroupId, Group>,
}

impl GroupArena {
    pub fn insert(&mut self, group: Group) -> GroupId {
        self.next += 1;
        let id = GroupId(self.next);
        self.groups.insert(id, group);
        id
    }

    pub fn get(&self, id: GroupId) -> Result<&Group> {
        self.groups
            .get(&id)
            .ok_or_else(|| MeshError::ProgramInvariant(format!("unknown group handle {}", id.0)))
    }

    pub fn get_mut(&mut self, id: GroupId) -> Result<&mut Group> {
        self.groups
            .get_mut(&id)
            .ok_or_else(|| MeshError::ProgramInvariant(format!("unknown group handle {}", id.0)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&GroupId, &mut Group)> {
        self.groups.iter_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupId, &Group)> {
        self.groups.iter()
    }

    /// Close and drop every group.
    pub fn clear(&mut self) {
        for (_, mut g) in std::mem::take(&mut self.groups) {
            g.coordinator.close();
        }
    }
}

impl GroupSerializer for GroupArena {
    fn serialize_group(&self, group: GroupId) -> Result<GroupDescriptor> {
        self.get(group)?.serialize()
    }
}
