//! Bridges program effects to the broker and the group arena.

use std::collections::BTreeSet;

use super::groups::{Group, GroupArena};
use super::links::LinkTable;
use crate::coordinator::{instantiate, CoordinatorContext};
use crate::error::{MeshError, Result};
use crate::program::{BoundParams, Effects, GroupDescriptor, GroupId};

/// Mutable view of one coordinator for the duration of a listener call.
pub(crate) struct Reduction<'a> {
    pub ctx: &'a CoordinatorContext,
    pub params: &'a BoundParams,
    pub members: &'a BTreeSet<String>,
    pub links: &'a mut LinkTable,
    pub groups: &'a mut GroupArena,
    /// Effects that took hold during this call, in order.
    pub applied: Vec<String>,
}

impl Reduction<'_> {
    fn require_member(&self, user: &str, op: &str) -> Result<()> {
        if self.members.contains(user) {
            return Ok(());
        }
        Err(MeshError::ProgramInvariant(format!("{op}: {user:?} is not a member")))
    }
}

impl Effects for Reduction<'_> {
    fn link(&mut self, a: &str, b: &str) -> Result<()> {
        if a == b {
            return Err(MeshError::ProgramInvariant(format!("link: self-pair {a:?}")));
        }
        self.require_member(a, "link")?;
        self.require_member(b, "link")?;
        if self.links.contains(a, b) {
            return Err(MeshError::ProgramInvariant(format!("link: {a:?} - {b:?} already linked")));
        }
        let link = self.ctx.broker.create_link(&self.ctx.network, a, b)?;
        self.links.insert(link);
        self.applied.push(format!("link {a}-{b}"));
        Ok(())
    }

    fn unlink(&mut self, a: &str, b: &str) -> Result<()> {
        match self.links.take(a, b) {
            Some(mut link) => {
                self.applied.push(format!("unlink {a}-{b}"));
                link.destroy()
            }
            None => {
                tracing::warn!(network = %self.ctx.network, %a, %b, "unlink of a pair that is not linked");
                Ok(())
            }
        }
    }

    fn create_group(&mut self, param: &str) -> Result<GroupId> {
        let (policy, params) = self.params.policy(param).ok_or_else(|| {
            MeshError::ProgramInvariant(format!("create_group: parameter {param:?} is not a bound policy"))
        })?;
        let coordinator = instantiate(self.ctx, policy, params)?;
        let id = self.groups.insert(Group::new(policy, params.clone(), coordinator));
        tracing::debug!(network = %self.ctx.network, %policy, group = id.0, "group created");
        self.applied.push(format!("create_group {}", id.0));
        Ok(id)
    }

    fn deserialize_group(&mut self, descriptor: &GroupDescriptor) -> Result<GroupId> {
        let mut coordinator = instantiate(self.ctx, &descriptor.policy, &descriptor.params)?;
        coordinator.load_state(&descriptor.state)?;
        let group = Group::new(&descriptor.policy, descriptor.params.clone(), coordinator);
        let id = self.groups.insert(group);
        self.applied.push(format!("deserialize_group {}", id.0));
        Ok(id)
    }

    fn group_join(&mut self, group: GroupId, user: &str) -> Result<()> {
        self.require_member(user, "group_join")?;
        self.groups.get_mut(group)?.join(user)?;
        self.applied.push(format!("group_join {} {user}", group.0));
        Ok(())
    }

    fn group_leave(&mut self, group: GroupId, user: &str) -> Result<()> {
        self.groups.get_mut(group)?.leave(user)?;
        self.applied.push(format!("group_leave {} {user}", group.0));
        Ok(())
    }

    fn group_has(&self, group: GroupId, user: &str) -> Result<bool> {
        Ok(self.groups.get(group)?.has(user))
    }
}
