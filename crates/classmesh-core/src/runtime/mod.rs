//! Runs a [`CompiledProgram`] behind the [`Coordinator`] contract.
//!
//! The runtime owns the roster, the link table and the group arena. Programs
//! see an opaque JSON state and act only through [`Effects`](crate::program::Effects);
//! the runtime stays the source of truth for who is a member and which pairs
//! are linked, so it can clean up after a program that misbehaves.

mod effects;
mod groups;
mod links;
mod state;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::coordinator::{Coordinator, CoordinatorContext, CoordinatorFactory};
use crate::error::{MeshError, Result};
use crate::program::{BoundParams, CompiledProgram, Effects, ListenerArgs, SignalArgs, JOIN, LEAVE, SIGNAL};
use crate::signal::SignalPayload;
use crate::validator::ValidatorConfig;
use crate::value::Params;

use effects::Reduction;
use groups::GroupArena;
use links::LinkTable;
use state::Snapshot;

pub use state::{GroupSummary, StateSummary};

/// Factory for coordinators backed by one compiled program.
pub struct CompiledPolicyRuntime {
    policy: String,
    program: Arc<dyn CompiledProgram>,
    validator: Option<Arc<ValidatorConfig>>,
}

impl CompiledPolicyRuntime {
    pub fn new(policy: &str, program: Arc<dyn CompiledProgram>, validator: Option<ValidatorConfig>) -> Self {
        Self { policy: policy.to_string(), program, validator: validator.map(Arc::new) }
    }

    pub fn program(&self) -> &Arc<dyn CompiledProgram> {
        &self.program
    }

    pub fn validator(&self) -> Option<&ValidatorConfig> {
        self.validator.as_deref()
    }
}

impl CoordinatorFactory for CompiledPolicyRuntime {
    fn policy_name(&self) -> &str {
        &self.policy
    }

    fn validate(&self, params: &Params) -> bool {
        match &self.validator {
            Some(v) => {
                let report = v.check_params(params);
                for w in &report.warnings {
                    tracing::debug!(policy = %self.policy, warning = %w, "parameter check");
                }
                report.is_ok()
            }
            None => true,
        }
    }

    fn create(&self, ctx: CoordinatorContext, params: &Params) -> Result<Box<dyn Coordinator>> {
        let bound = BoundParams::materialize(self.program.params(), params)?;
        Ok(Box::new(RuntimeCoordinator {
            policy: self.policy.clone(),
            program: self.program.clone(),
            validator: self.validator.clone(),
            params: bound,
            ctx,
            members: BTreeSet::new(),
            links: LinkTable::default(),
            groups: GroupArena::default(),
            state: self.program.initial_state(),
        }))
    }
}

/// Live coordinator driven by a compiled program.
pub struct RuntimeCoordinator {
    policy: String,
    program: Arc<dyn CompiledProgram>,
    validator: Option<Arc<ValidatorConfig>>,
    params: BoundParams,
    ctx: CoordinatorContext,
    members: BTreeSet<String>,
    links: LinkTable,
    groups: GroupArena,
    state: Value,
}

impl RuntimeCoordinator {
    /// Run listener `name` and keep the state it returns. On error the
    /// previous program state is left in place, while links and group
    /// changes the listener made before failing stay live and are logged.
    fn reduce(&mut self, name: &str, args: &ListenerArgs<'_>) -> Result<()> {
        let Some(listener) = self.program.listener(name) else {
            return Ok(());
        };
        let mut fx = Reduction {
            ctx: &self.ctx,
            params: &self.params,
            members: &self.members,
            links: &mut self.links,
            groups: &mut self.groups,
            applied: Vec::new(),
        };
        let outcome = listener(&mut fx as &mut dyn Effects, &self.state, args, &self.params);
        match outcome {
            Ok(next) => {
                self.state = next;
                Ok(())
            }
            Err(e) => {
                if !fx.applied.is_empty() {
                    tracing::warn!(
                        network = %self.ctx.network, policy = %self.policy, listener = %name,
                        applied = ?fx.applied, error = %e,
                        "listener failed after applying effects; they are kept"
                    );
                }
                Err(e)
            }
        }
    }

    /// Destroy whatever the leave listener left behind for `user`.
    fn sweep(&mut self, user: &str) {
        for mut link in self.links.take_touching(user) {
            tracing::warn!(
                network = %self.ctx.network, policy = %self.policy, %user, link = %link.id(),
                "residual link after leave"
            );
            if let Err(e) = link.destroy() {
                tracing::warn!(network = %self.ctx.network, error = %e, "residual link teardown failed");
            }
        }
        for (id, group) in self.groups.iter_mut() {
            if !group.has(user) {
                continue;
            }
            tracing::warn!(
                network = %self.ctx.network, policy = %self.policy, %user, group = id.0,
                "residual group membership after leave"
            );
            if let Err(e) = group.leave(user) {
                tracing::warn!(network = %self.ctx.network, group = id.0, error = %e, "residual group leave failed");
            }
        }
    }

    fn teardown(&mut self) {
        for mut link in self.links.take_all() {
            if let Err(e) = link.destroy() {
                tracing::warn!(network = %self.ctx.network, error = %e, "link teardown failed");
            }
        }
        self.groups.clear();
    }
}

impl Coordinator for RuntimeCoordinator {
    fn on_user_join(&mut self, user: &str) -> Result<()> {
        if !self.members.insert(user.to_string()) {
            return Ok(());
        }
        tracing::debug!(network = %self.ctx.network, policy = %self.policy, %user, "join");
        self.reduce(JOIN, &ListenerArgs { user, signal: None })
    }

    fn on_user_leave(&mut self, user: &str) -> Result<()> {
        if !self.members.remove(user) {
            return Ok(());
        }
        tracing::debug!(network = %self.ctx.network, policy = %self.policy, %user, "leave");
        let res = self.reduce(LEAVE, &ListenerArgs { user, signal: None });
        self.sweep(user);
        res
    }

    fn signal(&mut self, user: &str, event: &str, payload: &Value) -> Result<()> {
        if !self.members.contains(user) {
            tracing::debug!(network = %self.ctx.network, %user, %event, "signal from non-member ignored");
            return Ok(());
        }
        if let Some(v) = &self.validator {
            let report = v.check_signal(event, payload);
            if !report.is_ok() {
                return Err(MeshError::SignalRejected(format!("{event}: {}", report.reason())));
            }
        }
        let args = ListenerArgs {
            user,
            signal: Some(SignalArgs { event, payload: SignalPayload::new(payload) }),
        };
        self.reduce(SIGNAL, &args)
    }

    fn has_user(&self, user: &str) -> bool {
        self.members.contains(user)
    }

    fn members(&self) -> Vec<String> {
        self.members.iter().cloned().collect()
    }

    fn linked_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self.links.alive_pairs().cloned().collect();
        for (_, group) in self.groups.iter() {
            pairs.extend(group.coordinator().linked_pairs());
        }
        pairs
    }

    fn get_state(&self) -> Result<String> {
        let program = self.program.serialize(&self.state, &self.groups)?;
        Snapshot { members: self.members(), program }.render()
    }

    fn load_state(&mut self, state: &str) -> Result<()> {
        let snap = Snapshot::parse(state)?;
        self.teardown();
        self.members = snap.members.into_iter().collect();

        let mut fx = Reduction {
            ctx: &self.ctx,
            params: &self.params,
            members: &self.members,
            links: &mut self.links,
            groups: &mut self.groups,
            applied: Vec::new(),
        };
        match self.program.deserialize(&snap.program, &mut fx) {
            Ok(restored) => {
                self.state = restored;
                Ok(())
            }
            Err(e) => {
                self.groups.clear();
                self.state = self.program.initial_state();
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        tracing::debug!(network = %self.ctx.network, policy = %self.policy, "coordinator closed");
        self.teardown();
        self.members.clear();
    }
}

impl Drop for RuntimeCoordinator {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{ConnectionBroker, LocalDirectory};
    use crate::coordinator::PolicyResolver;
    use crate::program::native::NativeLoader;
    use crate::program::ProgramLoader;
    use serde_json::json;

    struct Builtins(NativeLoader);

    impl PolicyResolver for Builtins {
        fn resolve(&self, policy: &str) -> Result<Option<Arc<dyn CoordinatorFactory>>> {
            let bytes = crate::program::native::manifest(policy);
            match self.0.load(&bytes) {
                Ok(p) => Ok(Some(Arc::new(CompiledPolicyRuntime::new(policy, p, None)))),
                Err(_) => Ok(None),
            }
        }
    }

    fn ctx(users: &[&str]) -> (Arc<LocalDirectory>, CoordinatorContext) {
        let dir = Arc::new(LocalDirectory::new());
        for u in users {
            dir.connect(u);
        }
        let broker = Arc::new(ConnectionBroker::new(dir.clone()));
        let resolver: Arc<dyn PolicyResolver> = Arc::new(Builtins(NativeLoader::builtin()));
        (dir, CoordinatorContext::new("net-1", broker, resolver))
    }

    fn coordinator(ctx: &CoordinatorContext, policy: &str, params: &Params) -> Box<dyn Coordinator> {
        crate::coordinator::instantiate(ctx, policy, params).unwrap()
    }

    #[test]
    fn join_is_idempotent() {
        let (_dir, ctx) = ctx(&["a", "b"]);
        let mut c = coordinator(&ctx, "mesh", &Params::new());
        c.on_user_join("a").unwrap();
        c.on_user_join("b").unwrap();
        c.on_user_join("b").unwrap();
        assert_eq!(c.members(), vec!["a", "b"]);
        assert_eq!(c.linked_pairs().len(), 1);
    }

    #[test]
    fn leave_of_stranger_is_a_no_op() {
        let (_dir, ctx) = ctx(&["a"]);
        let mut c = coordinator(&ctx, "mesh", &Params::new());
        c.on_user_leave("ghost").unwrap();
        assert!(c.members().is_empty());
    }

    #[test]
    fn signal_from_non_member_is_ignored() {
        let (_dir, ctx) = ctx(&["a", "b"]);
        let mut c = coordinator(&ctx, "broadcast", &Params::new());
        c.on_user_join("a").unwrap();
        let before = c.get_state().unwrap();
        c.signal("z", "promote", &json!({ "user": "a" })).unwrap();
        assert_eq!(c.get_state().unwrap(), before);
    }

    #[test]
    fn failed_listener_keeps_previous_state() {
        let (_dir, ctx) = ctx(&["a", "b"]);
        let mut c = coordinator(&ctx, "broadcast", &Params::new());
        c.on_user_join("a").unwrap();
        c.on_user_join("b").unwrap();
        let before = c.get_state().unwrap();
        let err = c.signal("a", "promote", &json!({ "user": "nobody" })).unwrap_err();
        assert!(matches!(err, MeshError::BadRequest(_)));
        assert_eq!(c.get_state().unwrap(), before);
    }

    /// Links the signalling user to `b`, then fails.
    struct LinkThenFail;

    impl CompiledProgram for LinkThenFail {
        fn name(&self) -> &str {
            "link_then_fail"
        }

        fn params(&self) -> &[crate::program::ParamDecl] {
            &[]
        }

        fn initial_state(&self) -> Value {
            json!({ "calls": 0 })
        }

        fn listener(&self, name: &str) -> Option<crate::program::Listener> {
            if name != SIGNAL {
                return None;
            }
            let listener: crate::program::Listener =
                Arc::new(|fx: &mut dyn Effects, _state: &Value, args: &ListenerArgs<'_>, _params: &BoundParams| {
                    fx.link(args.user, "b")?;
                    Err(MeshError::BadRequest("late failure".into()))
                });
            Some(listener)
        }
    }

    #[test]
    fn effects_before_a_listener_failure_stay_applied() {
        let (dir, ctx) = ctx(&["a", "b"]);
        let runtime = CompiledPolicyRuntime::new("link_then_fail", Arc::new(LinkThenFail), None);
        let mut c = runtime.create(ctx, &Params::new()).unwrap();
        c.on_user_join("a").unwrap();
        c.on_user_join("b").unwrap();
        let before = c.get_state().unwrap();

        let err = c.signal("a", "go", &json!({})).unwrap_err();
        assert!(matches!(err, MeshError::BadRequest(_)));
        assert_eq!(c.get_state().unwrap(), before);
        assert_eq!(c.linked_pairs(), vec![("a".to_string(), "b".to_string())]);
        assert_eq!(dir.session("b").unwrap().subscription_count(), 1);

        c.on_user_leave("b").unwrap();
        assert!(c.linked_pairs().is_empty());
    }

    #[test]
    fn close_tears_everything_down() {
        let (dir, ctx) = ctx(&["a", "b"]);
        let mut c = coordinator(&ctx, "mesh", &Params::new());
        c.on_user_join("a").unwrap();
        c.on_user_join("b").unwrap();
        c.close();
        assert!(c.linked_pairs().is_empty());
        assert_eq!(dir.session("a").unwrap().subscription_count(), 0);
    }

    #[test]
    fn missing_required_param_is_configuration_error() {
        let (_dir, ctx) = ctx(&[]);
        let err = crate::coordinator::instantiate(&ctx, "breakout", &Params::new()).err().unwrap();
        assert!(err.is_configuration());
    }
}
