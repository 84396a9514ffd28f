//! Local state for managed resources
//!
//! State maps resource addresses to the identifiers and attributes recorded at
//! apply time. It is ephemeral: built up over a scenario run and discarded at
//! the end. Opaque remote identifiers live in their own typed map
//! ([`ResourceState::remote_ids`]) rather than being fished out of the
//! attribute map by key-name heuristics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of resources the apply pipeline manages
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ResourceKind {
    /// Virtual private cloud
    Vpc,
    /// Isolated network inside a VPC
    Network,
    /// Public IP address acquired for a VPC
    PublicIp,
    /// Compute instance
    Instance,
    /// Load-balancer rule
    LoadBalancerRule,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vpc => write!(f, "vpc"),
            Self::Network => write!(f, "network"),
            Self::PublicIp => write!(f, "public_ip"),
            Self::Instance => write!(f, "instance"),
            Self::LoadBalancerRule => write!(f, "loadbalancer_rule"),
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vpc" => Ok(Self::Vpc),
            "network" => Ok(Self::Network),
            "public_ip" => Ok(Self::PublicIp),
            "instance" => Ok(Self::Instance),
            "loadbalancer_rule" => Ok(Self::LoadBalancerRule),
            _ => Err(crate::Error::validation(format!(
                "unknown resource kind: {s}"
            ))),
        }
    }
}

/// Address of a declared resource: kind plus configuration name
///
/// Rendered as `kind.name`, e.g. `loadbalancer_rule.foo`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    /// Resource kind
    pub kind: ResourceKind,
    /// Name given in the configuration
    pub name: String,
}

impl Address {
    /// Create an address from a kind and a configuration name
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Shorthand for a load-balancer rule address
    pub fn rule(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::LoadBalancerRule, name)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

impl std::str::FromStr for Address {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s.split_once('.').ok_or_else(|| {
            crate::Error::validation(format!("invalid address: {s}, expected kind.name"))
        })?;
        Ok(Self {
            kind: kind.parse()?,
            name: name.to_string(),
        })
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Recorded state of a single managed resource
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ResourceState {
    /// Server-assigned primary identifier, set once the create call succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_id: Option<Uuid>,

    /// Plain string attributes (name, ports, addresses, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,

    /// Opaque remote identifiers, keyed by field name
    ///
    /// Every entry here must resolve remotely for the resource to count as
    /// existing, and must stop resolving after teardown.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub remote_ids: BTreeMap<String, Uuid>,
}

impl ResourceState {
    /// Create a resource state carrying just a primary id
    pub fn with_primary_id(id: Uuid) -> Self {
        let mut rs = Self {
            primary_id: Some(id),
            ..Default::default()
        };
        rs.remote_ids.insert("id".to_string(), id);
        rs
    }

    /// Set a string attribute and return self for chaining
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up an output value by name
    ///
    /// Outputs cover both remote identifiers (rendered as strings) and plain
    /// attributes; identifiers win on a name collision.
    pub fn output(&self, name: &str) -> Option<String> {
        if let Some(id) = self.remote_ids.get(name) {
            return Some(id.to_string());
        }
        self.attributes.get(name).cloned()
    }
}

/// Local state for one scenario run
///
/// Insertion order is preserved so teardown can run in reverse dependency
/// order (resources are always declared before their dependents).
#[derive(Clone, Debug, Default, Serialize)]
pub struct State {
    resources: BTreeMap<Address, ResourceState>,
    #[serde(skip)]
    order: Vec<Address>,
}

impl State {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resource, preserving first-recorded order
    pub fn record(&mut self, address: Address, resource: ResourceState) {
        if !self.resources.contains_key(&address) {
            self.order.push(address.clone());
        }
        self.resources.insert(address, resource);
    }

    /// Look up a resource by address
    pub fn get(&self, address: &Address) -> Option<&ResourceState> {
        self.resources.get(address)
    }

    /// Look up a resource mutably by address
    pub fn get_mut(&mut self, address: &Address) -> Option<&mut ResourceState> {
        self.resources.get_mut(address)
    }

    /// Returns true if the address is recorded
    pub fn contains(&self, address: &Address) -> bool {
        self.resources.contains_key(address)
    }

    /// Remove a resource from state
    pub fn remove(&mut self, address: &Address) -> Option<ResourceState> {
        self.order.retain(|a| a != address);
        self.resources.remove(address)
    }

    /// Number of recorded resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Addresses in first-recorded order
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.order.iter()
    }

    /// Addresses in reverse-recorded order, for teardown
    pub fn addresses_reversed(&self) -> impl Iterator<Item = &Address> {
        self.order.iter().rev()
    }

    /// Addresses of a given kind, in first-recorded order
    pub fn addresses_of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &Address> {
        self.order.iter().filter(move |a| a.kind == kind)
    }

    /// Resolve an output of a recorded resource
    pub fn output(&self, address: &Address, name: &str) -> Option<String> {
        self.resources.get(address).and_then(|r| r.output(name))
    }

    /// Render the full state as pretty JSON, for failure diagnostics
    pub fn to_json(&self) -> Result<String, crate::Error> {
        serde_json::to_string_pretty(self).map_err(|e| crate::Error::serialization(e.to_string()))
    }
}
