//! Node references and event bodies
//!
//! Full event bodies live in the node store, addressed by a [`NodeId`]
//! derived from the owning event. Events hold a [`NodeRef`] that only names
//! the node; hydration fetches the [`NodeData`] separately.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key stamped into a stored body naming the project it belongs to
pub const REF_KEY: &str = "_ref";

/// Key stamped into a stored body naming the ref format
pub const REF_VERSION_KEY: &str = "_ref_version";

/// Current ref format
pub const REF_VERSION: u64 = 2;

/// Identifier of an event body in the node store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    /// Create a node ID from raw bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive the node ID for an event
    ///
    /// BLAKE3 over `"{project_id}:{event_id}"`, so the same event always maps
    /// to the same node.
    pub fn for_event(project_id: u64, event_id: &str) -> Self {
        let hash = blake3::hash(format!("{}:{}", project_id, event_id).as_bytes());
        Self(*hash.as_bytes())
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full hex encoding (64 chars)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short display form (first 8 hex chars)
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for NodeId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// Weak reference from an event to its body
///
/// Holds the node ID (if the event has a body at all) and the ref key the
/// body must be bound to. Never owns the stored body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    id: Option<NodeId>,
    ref_key: Option<u64>,
}

impl NodeRef {
    /// Reference the body of an event
    pub fn for_event(project_id: u64, event_id: &str) -> Self {
        Self {
            id: Some(NodeId::for_event(project_id, event_id)),
            ref_key: Some(project_id),
        }
    }

    /// Reference an arbitrary node
    pub fn new(id: NodeId, ref_key: Option<u64>) -> Self {
        Self {
            id: Some(id),
            ref_key,
        }
    }

    /// A reference with no body behind it
    pub fn detached() -> Self {
        Self::default()
    }

    /// The referenced node, if any
    pub fn id(&self) -> Option<NodeId> {
        self.id
    }

    /// The ref key a fetched body must carry
    pub fn ref_key(&self) -> Option<u64> {
        self.ref_key
    }
}

/// Hydrated event body
///
/// A JSON object. An empty body stands in for "nothing stored".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeData(Map<String, Value>);

impl NodeData {
    /// Create an empty body
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON object
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Stamp the body with the ref key of the project it belongs to
    pub fn with_ref(mut self, ref_key: u64) -> Self {
        self.0.insert(REF_KEY.to_string(), Value::from(ref_key));
        self.0
            .insert(REF_VERSION_KEY.to_string(), Value::from(REF_VERSION));
        self
    }

    /// The ref key stored in the body, if any
    pub fn stored_ref(&self) -> Option<u64> {
        self.0.get(REF_KEY).and_then(Value::as_u64)
    }

    /// Check the stored ref against an expected ref key
    ///
    /// Bodies without a stored ref, and references without a ref key, always
    /// match.
    pub fn ref_matches(&self, expected: Option<u64>) -> bool {
        match (self.stored_ref(), expected) {
            (Some(stored), Some(expected)) => stored == expected,
            _ => true,
        }
    }

    /// Drop the ref bookkeeping keys
    pub fn without_ref(mut self) -> Self {
        self.0.remove(REF_KEY);
        self.0.remove(REF_VERSION_KEY);
        self
    }

    /// Look up a top-level field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a top-level field
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Borrow the underlying JSON object
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for NodeData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Something that carries a body reference
///
/// Lets hydration work over any record type by naming which of its fields
/// holds the node.
pub trait NodeHolder {
    /// The reference to hydrate
    fn node_ref(&self) -> &NodeRef;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_id_is_deterministic() {
        let a = NodeId::for_event(42, "e1");
        let b = NodeId::for_event(42, "e1");
        assert_eq!(a, b);

        assert_ne!(a, NodeId::for_event(43, "e1"));
        assert_ne!(a, NodeId::for_event(42, "e2"));
    }

    #[test]
    fn test_node_id_hex_roundtrip() {
        let id = NodeId::for_event(7, "abc");
        assert_eq!(id.to_hex().len(), 64);
        assert_eq!(id.short().len(), 8);
        assert_eq!(id.to_hex().parse::<NodeId>().unwrap(), id);
        assert!("zz".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_detached_ref_has_no_id() {
        let node = NodeRef::detached();
        assert!(node.id().is_none());
        assert!(node.ref_key().is_none());

        let node = NodeRef::for_event(42, "e1");
        assert_eq!(node.id(), Some(NodeId::for_event(42, "e1")));
        assert_eq!(node.ref_key(), Some(42));
    }

    #[test]
    fn test_ref_matching() {
        let data = NodeData::from_map(json!({"message": "boom"}).as_object().cloned().unwrap());
        assert!(data.ref_matches(Some(42)));

        let stamped = data.clone().with_ref(42);
        assert_eq!(stamped.stored_ref(), Some(42));
        assert!(stamped.ref_matches(Some(42)));
        assert!(!stamped.ref_matches(Some(43)));
        assert!(stamped.ref_matches(None));

        assert_eq!(stamped.without_ref(), data);
    }
}
