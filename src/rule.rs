//! Load-balancer rule domain model
//!
//! The desired shape of a rule ([`LoadBalancerRuleSpec`]) as it appears in a
//! configuration, and the observed shape ([`RemoteRule`]) as the orchestration
//! API reports it. The reconciler diffs one against the other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supported load-balancing algorithms
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Algorithm {
    /// Distribute connections evenly across members
    #[default]
    RoundRobin,
    /// Prefer the member with the fewest open connections
    LeastConn,
    /// Pin a client address to a member
    Source,
}

impl Algorithm {
    /// Returns true if this is a valid algorithm string
    pub fn is_valid(s: &str) -> bool {
        matches!(
            s.to_lowercase().as_str(),
            "roundrobin" | "leastconn" | "source"
        )
    }
}

impl std::str::FromStr for Algorithm {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "roundrobin" => Ok(Self::RoundRobin),
            "leastconn" => Ok(Self::LeastConn),
            "source" => Ok(Self::Source),
            _ => Err(crate::Error::validation(format!(
                "invalid algorithm: {s}, expected one of: roundrobin, leastconn, source"
            ))),
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "roundrobin"),
            Self::LeastConn => write!(f, "leastconn"),
            Self::Source => write!(f, "source"),
        }
    }
}

/// Desired specification for a load-balancer rule
///
/// This is the rule as declared, after every cross-resource reference has been
/// resolved to a concrete identifier. Member order is preserved as declared;
/// the reconciler compares membership, not order.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LoadBalancerRuleSpec {
    /// Display name of the rule
    pub name: String,

    /// Load-balancing algorithm
    pub algorithm: Algorithm,

    /// Port exposed on the public IP address
    pub public_port: u16,

    /// Port the traffic is forwarded to on the members
    pub private_port: u16,

    /// Public IP address the rule listens on
    pub public_ip_id: Uuid,

    /// Network that owns the rule and its members
    pub network_id: Uuid,

    /// Member compute instances, in declaration order
    pub members: Vec<Uuid>,
}

impl LoadBalancerRuleSpec {
    /// Validate the rule specification
    ///
    /// Runs before any API call; a spec that fails here never reaches the
    /// remote account.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.name.is_empty() {
            return Err(crate::Error::validation("rule name must not be empty"));
        }

        if self.public_port == 0 {
            return Err(crate::Error::validation(
                "public_port must be between 1 and 65535",
            ));
        }

        if self.private_port == 0 {
            return Err(crate::Error::validation(
                "private_port must be between 1 and 65535",
            ));
        }

        if self.members.is_empty() {
            return Err(crate::Error::validation(format!(
                "rule {} declares no members",
                self.name
            )));
        }

        Ok(())
    }
}

/// Lifecycle state of a remote rule
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleState {
    /// The orchestrator accepted the create call and is provisioning
    #[default]
    Creating,
    /// The rule is serving traffic
    Active,
    /// A delete call was accepted and is in progress
    Deleting,
}

impl std::fmt::Display for RuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Active => write!(f, "active"),
            Self::Deleting => write!(f, "deleting"),
        }
    }
}

/// A load-balancer rule as the orchestration API reports it
///
/// Member assignment is not embedded here; it is queried separately through
/// the API's member listing call.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RemoteRule {
    /// Server-assigned identifier
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Load-balancing algorithm
    pub algorithm: Algorithm,

    /// Port exposed on the public IP address
    pub public_port: u16,

    /// Port the traffic is forwarded to on the members
    pub private_port: u16,

    /// Public IP address the rule listens on
    pub public_ip_id: Uuid,

    /// Network that owns the rule
    pub network_id: Uuid,

    /// Lifecycle state
    pub state: RuleState,

    /// When the orchestrator created the rule
    pub created: DateTime<Utc>,
}

impl RemoteRule {
    /// Returns true once the orchestrator reports the rule as serving
    pub fn is_active(&self) -> bool {
        self.state == RuleState::Active
    }
}
