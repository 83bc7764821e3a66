//! MIB data served by the test agent.

use snmp_session::{Oid, Value, oid};
use std::collections::BTreeMap;

pub const COMMUNITY: &str = "public";
pub const AUTH_PASSWORD: &str = "authpass123";
pub const PRIV_PASSWORD: &str = "privpass123";

/// Engine id the test agent answers discovery with.
pub const AGENT_ENGINE_ID: &[u8] = &[0x80, 0x00, 0x1f, 0x88, 0x04, b't', b'e', b's', b't'];

/// The system group (1.3.6.1.2.1.1): sysDescr.0 through sysServices.0.
pub fn system_mib() -> BTreeMap<Oid, Value> {
    BTreeMap::from([
        (sys_descr(), Value::from("Test SNMP Agent")),
        (
            oid!(1, 3, 6, 1, 2, 1, 1, 2, 0),
            Value::ObjectIdentifier(oid!(1, 3, 6, 1, 4, 1, 99999)),
        ),
        (oid!(1, 3, 6, 1, 2, 1, 1, 3, 0), Value::TimeTicks(123456)),
        (oid!(1, 3, 6, 1, 2, 1, 1, 4, 0), Value::from("ops@test.local")),
        (sys_name(), Value::from("test-agent")),
        (oid!(1, 3, 6, 1, 2, 1, 1, 6, 0), Value::from("Rack 4")),
        (oid!(1, 3, 6, 1, 2, 1, 1, 7, 0), Value::Integer(72)),
    ])
}

/// ifNumber.0 plus `count` rows of ifIndex, ifDescr, ifType and ifSpeed.
pub fn interface_table(count: u32) -> BTreeMap<Oid, Value> {
    let mut data = BTreeMap::new();
    data.insert(oid!(1, 3, 6, 1, 2, 1, 2, 1, 0), Value::Integer(count as i32));
    for row in 1..=count {
        data.insert(if_entry(1, row), Value::Integer(row as i32));
        data.insert(if_entry(2, row), Value::from(format!("eth{}", row - 1)));
        // ethernetCsmacd
        data.insert(if_entry(3, row), Value::Integer(6));
        data.insert(if_entry(5, row), Value::Gauge32(1_000_000_000));
    }
    // Something past the table so walks have to notice the boundary.
    data.insert(oid!(1, 3, 6, 1, 2, 1, 4, 1, 0), Value::Integer(2));
    data
}

/// Three scalars and nothing after them.
pub fn three_node_tree() -> BTreeMap<Oid, Value> {
    BTreeMap::from([
        (oid!(1, 3, 6, 1, 4, 1, 8072, 1, 1), Value::Integer(1)),
        (oid!(1, 3, 6, 1, 4, 1, 8072, 1, 2), Value::Integer(2)),
        (oid!(1, 3, 6, 1, 4, 1, 8072, 1, 3), Value::Integer(3)),
    ])
}

pub fn combined(sets: impl IntoIterator<Item = BTreeMap<Oid, Value>>) -> BTreeMap<Oid, Value> {
    sets.into_iter().flatten().collect()
}

pub fn sys_descr() -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)
}

pub fn sys_name() -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 1, 5, 0)
}

pub fn system_subtree() -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 1)
}

pub fn if_table() -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 2, 2)
}

/// ifEntry.<column>.<row>
pub fn if_entry(column: u32, row: u32) -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, column, row)
}
