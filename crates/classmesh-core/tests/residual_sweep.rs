//! Programs that break the rules: the runtime keeps the roster and link table
//! consistent regardless.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use serde_json::{json, Value};

use classmesh_core::broker::{ConnectionBroker, LocalDirectory};
use classmesh_core::program::native::{manifest, NativeLoader, NativeProgram};
use classmesh_core::program::{BoundParams, Effects, GroupId, ListenerArgs, ParamKind, JOIN, LEAVE};
use classmesh_core::registry::{MemoryPolicyStore, PolicyRecord, PolicyRegistry};
use classmesh_core::runtime::StateSummary;
use classmesh_core::value::params_from_json;
use classmesh_core::{MeshError, Network, NetworkConfig, Result};

fn roster(state: &Value) -> Vec<String> {
    serde_json::from_value(state["members"].clone()).unwrap_or_default()
}

/// Links everyone on join; its leave handler always fails.
fn crashy() -> NativeProgram {
    fn join(fx: &mut dyn Effects, state: &Value, args: &ListenerArgs<'_>, _: &BoundParams) -> Result<Value> {
        let mut members = roster(state);
        for m in &members {
            fx.link(m, args.user)?;
        }
        members.push(args.user.to_string());
        Ok(json!({ "members": members }))
    }
    fn leave(_: &mut dyn Effects, _: &Value, _: &ListenerArgs<'_>, _: &BoundParams) -> Result<Value> {
        Err(MeshError::Internal("leave handler crashed".into()))
    }
    NativeProgram::new("crashy", json!({ "members": [] })).on(JOIN, join).on(LEAVE, leave)
}

/// Links the newcomer to the first member twice.
fn doubler() -> NativeProgram {
    fn join(fx: &mut dyn Effects, state: &Value, args: &ListenerArgs<'_>, _: &BoundParams) -> Result<Value> {
        let mut members = roster(state);
        if let Some(first) = members.first() {
            fx.link(first, args.user)?;
            fx.link(args.user, first)?;
        }
        members.push(args.user.to_string());
        Ok(json!({ "members": members }))
    }
    NativeProgram::new("doubler", json!({ "members": [] })).on(JOIN, join)
}

/// Puts everyone in one nested group and has no leave handler.
fn sticky() -> NativeProgram {
    fn join(fx: &mut dyn Effects, state: &Value, args: &ListenerArgs<'_>, _: &BoundParams) -> Result<Value> {
        let group = match serde_json::from_value::<GroupId>(state["group"].clone()) {
            Ok(g) => g,
            Err(_) => fx.create_group("inner")?,
        };
        fx.group_join(group, args.user)?;
        Ok(json!({ "group": group }))
    }
    NativeProgram::new("sticky", json!({ "group": null }))
        .param("inner", ParamKind::Policy)
        .on(JOIN, join)
}

struct World {
    dir: Arc<LocalDirectory>,
    broker: Arc<ConnectionBroker>,
    registry: Arc<PolicyRegistry>,
}

impl World {
    fn new(users: &[&str]) -> Self {
        let dir = Arc::new(LocalDirectory::new());
        for u in users {
            dir.connect(u);
        }
        let mut loader = NativeLoader::builtin();
        loader.register(crashy());
        loader.register(doubler());
        loader.register(sticky());

        let store = Arc::new(MemoryPolicyStore::new());
        for entry in ["mesh", "crashy", "doubler", "sticky"] {
            store.insert(
                entry,
                PolicyRecord {
                    compiled_bytecode: manifest(entry),
                    validator_config_json: None,
                    plugin_id: "test".into(),
                    plugin_version: "0".into(),
                },
            );
        }
        let broker = Arc::new(ConnectionBroker::new(dir.clone()));
        let registry = Arc::new(PolicyRegistry::new(store, Arc::new(loader)));
        Self { dir, broker, registry }
    }

    fn network(&self, policy: &str, params: Value) -> Network {
        let config = NetworkConfig { policy_name: policy.into(), params: params_from_json(&params).unwrap() };
        Network::create("n1", self.broker.clone(), self.registry.clone(), &config).unwrap()
    }
}

fn pair(a: &str, b: &str) -> (String, String) {
    (a.to_string(), b.to_string())
}

#[test]
fn failed_leave_still_sweeps_links() {
    let w = World::new(&["A", "B", "C"]);
    let mut net = w.network("crashy", json!({}));
    for u in ["A", "B", "C"] {
        net.on_user_join(u).unwrap();
    }
    assert_eq!(net.linked_pairs().len(), 3);

    let err = net.on_user_leave("B").unwrap_err();
    assert!(matches!(err, MeshError::Internal(_)));
    assert!(!net.has_user("B"));
    assert_eq!(net.linked_pairs(), vec![pair("A", "C")]);
    assert_eq!(w.dir.session("B").unwrap().subscription_count(), 0);
}

#[test]
fn double_link_is_an_invariant_violation() {
    let w = World::new(&["A", "B"]);
    let mut net = w.network("doubler", json!({}));
    net.on_user_join("A").unwrap();

    let err = net.on_user_join("B").unwrap_err();
    assert!(matches!(err, MeshError::ProgramInvariant(_)));
    assert_eq!(err.client_code().as_str(), "INTERNAL");
    // Membership is recorded before the program runs; the first link stands.
    assert!(net.has_user("B"));
    assert_eq!(net.linked_pairs(), vec![pair("A", "B")]);
}

#[test]
fn leave_sweeps_nested_group_membership() {
    let w = World::new(&["A", "B", "C"]);
    let mut net = w.network("sticky", json!({ "inner": { "policy": "mesh" } }));
    for u in ["A", "B", "C"] {
        net.on_user_join(u).unwrap();
    }
    assert_eq!(net.linked_pairs().len(), 3);

    net.on_user_leave("B").unwrap();
    let summary = StateSummary::parse(&net.get_state().unwrap()).unwrap();
    assert!(!summary.mentions("B"));
    assert_eq!(net.linked_pairs(), vec![pair("A", "C")]);
}

#[test]
fn group_join_requires_parent_membership() {
    struct Probe;
    impl Probe {
        fn program() -> NativeProgram {
            fn join(fx: &mut dyn Effects, _: &Value, _: &ListenerArgs<'_>, _: &BoundParams) -> Result<Value> {
                let g = fx.create_group("inner")?;
                fx.group_join(g, "outsider")?;
                Ok(Value::Null)
            }
            NativeProgram::new("outer", Value::Null).param("inner", ParamKind::Policy).on(JOIN, join)
        }
    }

    let dir = Arc::new(LocalDirectory::new());
    let mut loader = NativeLoader::builtin();
    loader.register(Probe::program());
    let store = Arc::new(MemoryPolicyStore::new());
    for entry in ["mesh", "outer"] {
        store.insert(
            entry,
            PolicyRecord {
                compiled_bytecode: manifest(entry),
                validator_config_json: None,
                plugin_id: "test".into(),
                plugin_version: "0".into(),
            },
        );
    }
    let registry = Arc::new(PolicyRegistry::new(store, Arc::new(loader)));
    let broker = Arc::new(ConnectionBroker::new(dir));
    let config = NetworkConfig {
        policy_name: "outer".into(),
        params: params_from_json(&json!({ "inner": { "policy": "mesh" } })).unwrap(),
    };
    let mut net = Network::create("n1", broker, registry, &config).unwrap();

    let err = net.on_user_join("A").unwrap_err();
    assert!(matches!(err, MeshError::ProgramInvariant(_)));
}
