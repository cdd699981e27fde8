//! Identifier newtypes.
//!
//! Identifiers are opaque strings on the wire. The newtypes keep a client id
//! from being passed where a flow id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a remote agent (a "client" of the fleet).
///
/// Example: `ClientId("C.1000000000000000")`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a flow, unique per client.
///
/// Randomly generated ids are 8 upper-case hex digits. Hunt flows reuse the
/// hunt id verbatim so the foreman can detect an earlier start.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowId(pub String);

impl FlowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Draw a fresh random flow id.
    pub fn random() -> Self {
        let bits = uuid::Uuid::new_v4().as_u128() as u32;
        Self(format!("{:08X}", bits))
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&HuntId> for FlowId {
    fn from(hunt_id: &HuntId) -> Self {
        Self(hunt_id.0.clone())
    }
}

/// Identifier of a fleet-wide task (hunt) started per client by the foreman.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HuntId(pub String);

impl HuntId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for HuntId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of an agent action (e.g. `"get_file_metadata"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub String);

impl ActionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The (client, flow) pair that addresses one flow in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowKey {
    pub client_id: ClientId,
    pub flow_id: FlowId,
}

impl FlowKey {
    pub fn new(client_id: ClientId, flow_id: FlowId) -> Self {
        Self { client_id, flow_id }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.client_id, self.flow_id)
    }
}
