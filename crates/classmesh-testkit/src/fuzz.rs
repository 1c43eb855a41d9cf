//! Roster fuzzing for policies.
//!
//! [`PolicyHarness`] drives one network through an in-process broker and
//! records every link/unlink a program issues, at any nesting depth. Property
//! tests feed it sequences from [`arb_roster_ops`] and assert the structural
//! guarantees every policy must keep:
//!
//! - every live link joins two current members;
//! - a user that left is gone from links, roster and nested groups;
//! - restoring a snapshot into a fresh network yields the same future effects.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use serde_json::Value;

use classmesh_core::broker::{ConnectionBroker, LocalDirectory};
use classmesh_core::program::native::{manifest, NativeLoader};
use classmesh_core::program::{
    BoundParams, CompiledProgram, Effects, GroupDescriptor, GroupId, GroupSerializer, Listener,
    ListenerArgs, ParamDecl, ProgramLoader,
};
use classmesh_core::registry::{MemoryPolicyStore, PolicyRecord, PolicyRegistry};
use classmesh_core::runtime::StateSummary;
use classmesh_core::value::params_from_json;
use classmesh_core::{Network, NetworkConfig, Result};

/// Built-in entries every harness registers under their own names.
pub const BUILTINS: [&str; 4] = ["ring", "mesh", "broadcast", "breakout"];

const GUARDED: &str = "guarded";

/// One roster change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterOp {
    Join(String),
    Leave(String),
}

/// Sequences over users `u0..u{users}`; consecutive repeats are collapsed.
pub fn arb_roster_ops(users: usize, len: Range<usize>) -> impl Strategy<Value = Vec<RosterOp>> {
    let user = (0..users.max(1)).prop_map(|i| format!("u{i}"));
    let op = (any::<bool>(), user).prop_map(|(join, u)| if join { RosterOp::Join(u) } else { RosterOp::Leave(u) });
    proptest::collection::vec(op, len).prop_map(|mut ops| {
        ops.dedup();
        ops
    })
}

/// Link-table effect as issued by a program. Pairs are stored sorted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum EffectCall {
    Link(String, String),
    Unlink(String, String),
}

fn sorted_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

type EffectLog = Arc<Mutex<Vec<EffectCall>>>;

struct Recording<'a> {
    inner: &'a mut dyn Effects,
    log: &'a Mutex<Vec<EffectCall>>,
}

impl Recording<'_> {
    fn push(&self, call: EffectCall) {
        self.log.lock().unwrap().push(call);
    }
}

impl Effects for Recording<'_> {
    fn link(&mut self, a: &str, b: &str) -> Result<()> {
        self.inner.link(a, b)?;
        let (a, b) = sorted_pair(a, b);
        self.push(EffectCall::Link(a, b));
        Ok(())
    }

    fn unlink(&mut self, a: &str, b: &str) -> Result<()> {
        self.inner.unlink(a, b)?;
        let (a, b) = sorted_pair(a, b);
        self.push(EffectCall::Unlink(a, b));
        Ok(())
    }

    fn create_group(&mut self, param: &str) -> Result<GroupId> {
        self.inner.create_group(param)
    }

    fn deserialize_group(&mut self, descriptor: &GroupDescriptor) -> Result<GroupId> {
        self.inner.deserialize_group(descriptor)
    }

    fn group_join(&mut self, group: GroupId, user: &str) -> Result<()> {
        self.inner.group_join(group, user)
    }

    fn group_leave(&mut self, group: GroupId, user: &str) -> Result<()> {
        self.inner.group_leave(group, user)
    }

    fn group_has(&self, group: GroupId, user: &str) -> Result<bool> {
        self.inner.group_has(group, user)
    }
}

struct RecordingProgram {
    inner: Arc<dyn CompiledProgram>,
    log: EffectLog,
}

impl CompiledProgram for RecordingProgram {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn params(&self) -> &[ParamDecl] {
        self.inner.params()
    }

    fn initial_state(&self) -> Value {
        self.inner.initial_state()
    }

    fn listener(&self, name: &str) -> Option<Listener> {
        let inner = self.inner.listener(name)?;
        let log = self.log.clone();
        Some(Arc::new(
            move |fx: &mut dyn Effects, state: &Value, args: &ListenerArgs<'_>, params: &BoundParams| {
                let mut rec = Recording { inner: fx, log: &log };
                inner(&mut rec, state, args, params)
            },
        ))
    }

    fn serialize(&self, state: &Value, groups: &dyn GroupSerializer) -> Result<Value> {
        self.inner.serialize(state, groups)
    }

    fn deserialize(&self, raw: &Value, fx: &mut dyn Effects) -> Result<Value> {
        self.inner.deserialize(raw, fx)
    }
}

struct RecordingLoader {
    inner: NativeLoader,
    log: EffectLog,
}

impl ProgramLoader for RecordingLoader {
    fn load(&self, bytecode: &[u8]) -> Result<Arc<dyn CompiledProgram>> {
        let inner = self.inner.load(bytecode)?;
        Ok(Arc::new(RecordingProgram { inner, log: self.log.clone() }))
    }
}

fn record(entry: &str, validator: Option<&str>) -> PolicyRecord {
    PolicyRecord {
        compiled_bytecode: manifest(entry),
        validator_config_json: validator.map(str::to_string),
        plugin_id: "classmesh-testkit".into(),
        plugin_version: "0".into(),
    }
}

/// One network over the built-in programs with effect recording.
pub struct PolicyHarness {
    dir: Arc<LocalDirectory>,
    store: Arc<MemoryPolicyStore>,
    registry: Arc<PolicyRegistry>,
    broker: Arc<ConnectionBroker>,
    log: EffectLog,
    config: NetworkConfig,
    network: Network,
}

impl PolicyHarness {
    /// Network running built-in `policy` with `params` (a JSON object).
    pub fn new(policy: &str, params: Value) -> Result<Self> {
        Self::build(policy, None, params)
    }

    /// Network running built-in `entry` behind `validator`.
    pub fn with_validator(entry: &str, validator: &str, params: Value) -> Result<Self> {
        Self::build(entry, Some(validator), params)
    }

    fn build(entry: &str, validator: Option<&str>, params: Value) -> Result<Self> {
        let dir = Arc::new(LocalDirectory::new());
        let log = EffectLog::default();
        let store = Arc::new(MemoryPolicyStore::new());
        for builtin in BUILTINS {
            store.insert(builtin, record(builtin, None));
        }
        let policy_name = match validator {
            Some(v) => {
                store.insert(GUARDED, record(entry, Some(v)));
                GUARDED.to_string()
            }
            None => entry.to_string(),
        };
        let loader = RecordingLoader { inner: NativeLoader::builtin(), log: log.clone() };
        let registry = Arc::new(PolicyRegistry::new(store.clone(), Arc::new(loader)));
        let broker = Arc::new(ConnectionBroker::new(dir.clone()));
        let config = NetworkConfig { policy_name, params: params_from_json(&params)? };
        let network = Network::create("fuzz", broker.clone(), registry.clone(), &config)?;
        Ok(Self { dir, store, registry, broker, log, config, network })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    fn ensure_connected(&self, user: &str) {
        if self.dir.session(user).is_none() {
            self.dir.connect(user);
        }
    }

    pub fn apply(&mut self, op: &RosterOp) -> Result<()> {
        tracing::debug!(?op, network = %self.network.id(), "roster op");
        match op {
            RosterOp::Join(u) => {
                self.ensure_connected(u);
                self.network.on_user_join(u)
            }
            RosterOp::Leave(u) => self.network.on_user_leave(u),
        }
    }

    /// Drain the recorded effects.
    pub fn take_effects(&self) -> Vec<EffectCall> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }

    /// Structural invariants that hold after every event.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let members: BTreeSet<String> = self.network.members().into_iter().collect();
        let pairs = self.network.linked_pairs();
        let unique: BTreeSet<&(String, String)> = pairs.iter().collect();
        if unique.len() != pairs.len() {
            return Err(format!("duplicate links in {pairs:?}"));
        }
        for (a, b) in &pairs {
            if a == b {
                return Err(format!("self link on {a}"));
            }
            if !members.contains(a) || !members.contains(b) {
                return Err(format!("link {a}-{b} outlives membership {members:?}"));
            }
        }
        let state = self.network.get_state().map_err(|e| e.to_string())?;
        let summary = StateSummary::parse(&state).map_err(|e| e.to_string())?;
        let roster: BTreeSet<String> = summary.members.into_iter().collect();
        if roster != members {
            return Err(format!("state roster {roster:?} != members {members:?}"));
        }
        Ok(())
    }

    /// `user` is gone from links, roster and every nested group.
    pub fn check_left(&self, user: &str) -> std::result::Result<(), String> {
        if self.network.has_user(user) {
            return Err(format!("{user} still a member"));
        }
        if let Some((a, b)) = self.network.linked_pairs().into_iter().find(|(a, b)| a == user || b == user) {
            return Err(format!("{user} still linked via {a}-{b}"));
        }
        let state = self.network.get_state().map_err(|e| e.to_string())?;
        let summary = StateSummary::parse(&state).map_err(|e| e.to_string())?;
        if summary.mentions(user) {
            return Err(format!("{user} still listed in {state}"));
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Result<String> {
        self.network.get_state()
    }

    /// Fresh harness with the same policy and connected users, loaded from
    /// `state`. Effects issued while loading are discarded.
    pub fn restore(&self, state: &str) -> Result<Self> {
        let dir = Arc::new(LocalDirectory::new());
        for endpoint in self.dir.endpoints() {
            dir.connect(&endpoint);
        }
        let log = EffectLog::default();
        let loader = RecordingLoader { inner: NativeLoader::builtin(), log: log.clone() };
        let registry = Arc::new(PolicyRegistry::new(self.store.clone(), Arc::new(loader)));
        let broker = Arc::new(ConnectionBroker::new(dir.clone()));
        let mut network = Network::create("fuzz", broker.clone(), registry.clone(), &self.config)?;
        network.load_state(state)?;
        log.lock().unwrap().clear();
        Ok(Self { dir, store: self.store.clone(), registry, broker, log, config: self.config.clone(), network })
    }

    pub fn directory(&self) -> &Arc<LocalDirectory> {
        &self.dir
    }

    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    pub fn broker(&self) -> &Arc<ConnectionBroker> {
        &self.broker
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn records_links_in_sorted_form() {
        let mut h = PolicyHarness::new("mesh", json!({})).unwrap();
        h.apply(&RosterOp::Join("u1".into())).unwrap();
        h.apply(&RosterOp::Join("u0".into())).unwrap();
        assert_eq!(h.take_effects(), vec![EffectCall::Link("u0".into(), "u1".into())]);
        assert!(h.take_effects().is_empty());
        h.check_invariants().unwrap();
    }

    #[test]
    fn restore_discards_load_effects() {
        let mut h = PolicyHarness::new("ring", json!({})).unwrap();
        for u in ["u0", "u1", "u2"] {
            h.apply(&RosterOp::Join(u.into())).unwrap();
        }
        let restored = h.restore(&h.snapshot().unwrap()).unwrap();
        assert!(restored.take_effects().is_empty());
        assert_eq!(restored.network().members(), h.network().members());
    }
}
