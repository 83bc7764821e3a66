//! Shared test infrastructure: an in-process agent and MIB fixtures.

// Not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod agent;
pub mod fixtures;

pub use agent::{Behavior, TestAgent, TestAgentBuilder};
pub use fixtures::{
    AGENT_ENGINE_ID, AUTH_PASSWORD, COMMUNITY, PRIV_PASSWORD, combined, if_entry, if_table,
    interface_table, sys_descr, sys_name, system_mib, system_subtree, three_node_tree,
};

use snmp_session::{Session, Version};

/// Start a community session against `agent`.
pub async fn community_session(agent: &TestAgent, version: Version) -> Session {
    Session::community("127.0.0.1", COMMUNITY, agent.config(version))
        .await
        .expect("failed to start session")
}

/// Log to the test writer when RUST_LOG is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
