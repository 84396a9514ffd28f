//! Typed declarative configuration
//!
//! A [`Configuration`] is an ordered set of resource declarations with typed
//! cross-resource references ([`Ref`]). It replaces positionally interpolated
//! text templates: a reference names the resource and the output it needs, so
//! there is no format-ordering to get wrong, and the whole configuration can
//! be rendered to YAML for inspection.

use serde::{Deserialize, Serialize};

use crate::rule::Algorithm;
use crate::state::Address;

/// Environment-driven parameters a scenario interpolates into its
/// configuration (zone, CIDRs, offerings, template)
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ScenarioParams {
    /// Zone to provision in
    pub zone: String,
    /// CIDR for the VPC
    pub vpc_cidr: String,
    /// CIDR for the isolated network
    pub network_cidr: String,
    /// VPC offering identifier
    pub vpc_offering: String,
    /// Network offering identifier
    pub network_offering: String,
    /// Service offering for deployed instances
    pub service_offering: String,
    /// Template instances are deployed from
    pub template: String,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            zone: crate::DEFAULT_ZONE.to_string(),
            vpc_cidr: crate::DEFAULT_VPC_CIDR.to_string(),
            network_cidr: crate::DEFAULT_NETWORK_CIDR.to_string(),
            vpc_offering: crate::DEFAULT_VPC_OFFERING.to_string(),
            network_offering: crate::DEFAULT_NETWORK_OFFERING.to_string(),
            service_offering: crate::DEFAULT_SERVICE_OFFERING.to_string(),
            template: crate::DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl ScenarioParams {
    /// Build parameters from the environment, falling back to defaults
    ///
    /// Recognized variables: `WINDLASS_ZONE`, `WINDLASS_VPC_CIDR`,
    /// `WINDLASS_NETWORK_CIDR`, `WINDLASS_VPC_OFFERING`,
    /// `WINDLASS_NETWORK_OFFERING`, `WINDLASS_SERVICE_OFFERING`,
    /// `WINDLASS_TEMPLATE`.
    pub fn from_env() -> Self {
        let get = |var: &str, default: &str| {
            std::env::var(var).unwrap_or_else(|_| default.to_string())
        };
        Self {
            zone: get("WINDLASS_ZONE", crate::DEFAULT_ZONE),
            vpc_cidr: get("WINDLASS_VPC_CIDR", crate::DEFAULT_VPC_CIDR),
            network_cidr: get("WINDLASS_NETWORK_CIDR", crate::DEFAULT_NETWORK_CIDR),
            vpc_offering: get("WINDLASS_VPC_OFFERING", crate::DEFAULT_VPC_OFFERING),
            network_offering: get("WINDLASS_NETWORK_OFFERING", crate::DEFAULT_NETWORK_OFFERING),
            service_offering: get("WINDLASS_SERVICE_OFFERING", crate::DEFAULT_SERVICE_OFFERING),
            template: get("WINDLASS_TEMPLATE", crate::DEFAULT_TEMPLATE),
        }
    }
}

/// A configuration value: either a literal, or another resource's output
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Ref {
    /// A literal value
    Literal(String),
    /// The named output of another declared resource
    Output {
        /// Address of the referenced resource
        address: Address,
        /// Output name, e.g. `id` or `ipaddress`
        output: String,
    },
}

impl Ref {
    /// Create a literal value
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// Reference another resource's output
    pub fn output(address: Address, output: impl Into<String>) -> Self {
        Self::Output {
            address,
            output: output.into(),
        }
    }

    /// Reference another resource's server-assigned identifier
    pub fn id_of(address: Address) -> Self {
        Self::output(address, "id")
    }
}

impl From<&str> for Ref {
    fn from(value: &str) -> Self {
        Self::literal(value)
    }
}

/// Declared VPC
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct VpcConfig {
    /// Display name
    pub name: String,
    /// CIDR of the VPC
    pub cidr: String,
    /// VPC offering identifier
    pub vpc_offering: String,
    /// Zone to create the VPC in
    pub zone: String,
}

/// Declared isolated network
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct NetworkConfig {
    /// Display name
    pub name: String,
    /// CIDR of the network
    pub cidr: String,
    /// Network offering identifier
    pub network_offering: String,
    /// Owning VPC
    pub vpc: Ref,
    /// Zone, usually the VPC's zone output
    pub zone: Ref,
}

/// Declared public IP acquisition
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PublicIpConfig {
    /// VPC to acquire the address for
    pub vpc: Ref,
}

/// Declared compute instance
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct InstanceConfig {
    /// Host name
    pub name: String,
    /// Display name
    pub display_name: String,
    /// Service offering identifier
    pub service_offering: String,
    /// Template to deploy from
    pub template: String,
    /// Network to attach to
    pub network: Ref,
    /// Zone, usually the network's zone output
    pub zone: Ref,
    /// Optional cloud-init user data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    /// Expunge on destroy instead of keeping the volume around
    #[serde(default)]
    pub expunge: bool,
}

/// Declared load-balancer rule
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RuleConfig {
    /// Display name
    pub name: String,
    /// Public IP the rule listens on
    pub ip_address: Ref,
    /// Load-balancing algorithm
    pub algorithm: Algorithm,
    /// Network that owns the rule
    pub network: Ref,
    /// Port exposed on the public IP
    pub public_port: u16,
    /// Port the traffic is forwarded to
    pub private_port: u16,
    /// Member compute instances
    pub members: Vec<Ref>,
}

/// A single declared resource
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceConfig {
    /// Virtual private cloud
    Vpc(VpcConfig),
    /// Isolated network
    Network(NetworkConfig),
    /// Public IP acquisition
    PublicIp(PublicIpConfig),
    /// Compute instance
    Instance(InstanceConfig),
    /// Load-balancer rule
    LoadBalancerRule(RuleConfig),
}

/// One declared resource with its address
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ConfigEntry {
    /// Address of the resource
    pub address: Address,
    /// The declaration itself
    pub resource: ResourceConfig,
}

/// An ordered set of resource declarations
///
/// Declaration order is apply order; resources must be declared before
/// anything that references them.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Configuration {
    entries: Vec<ConfigEntry>,
}

impl Configuration {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a VPC and return self for chaining
    pub fn vpc(self, name: impl Into<String>, vpc: VpcConfig) -> Self {
        self.resource(
            Address::new(crate::state::ResourceKind::Vpc, name),
            ResourceConfig::Vpc(vpc),
        )
    }

    /// Declare a network and return self for chaining
    pub fn network(self, name: impl Into<String>, network: NetworkConfig) -> Self {
        self.resource(
            Address::new(crate::state::ResourceKind::Network, name),
            ResourceConfig::Network(network),
        )
    }

    /// Declare a public IP and return self for chaining
    pub fn public_ip(self, name: impl Into<String>, ip: PublicIpConfig) -> Self {
        self.resource(
            Address::new(crate::state::ResourceKind::PublicIp, name),
            ResourceConfig::PublicIp(ip),
        )
    }

    /// Declare a compute instance and return self for chaining
    pub fn instance(self, name: impl Into<String>, instance: InstanceConfig) -> Self {
        self.resource(
            Address::new(crate::state::ResourceKind::Instance, name),
            ResourceConfig::Instance(instance),
        )
    }

    /// Declare a load-balancer rule and return self for chaining
    pub fn load_balancer_rule(self, name: impl Into<String>, rule: RuleConfig) -> Self {
        self.resource(
            Address::rule(name),
            ResourceConfig::LoadBalancerRule(rule),
        )
    }

    /// Declare an arbitrary resource and return self for chaining
    pub fn resource(mut self, address: Address, resource: ResourceConfig) -> Self {
        self.entries.push(ConfigEntry { address, resource });
        self
    }

    /// Look up a declaration by address
    pub fn get(&self, address: &Address) -> Option<&ResourceConfig> {
        self.entries
            .iter()
            .find(|e| &e.address == address)
            .map(|e| &e.resource)
    }

    /// Returns true if the address is declared
    pub fn contains(&self, address: &Address) -> bool {
        self.entries.iter().any(|e| &e.address == address)
    }

    /// Declarations in apply order
    pub fn entries(&self) -> impl Iterator<Item = &ConfigEntry> {
        self.entries.iter()
    }

    /// Number of declarations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is declared
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the configuration to YAML
    pub fn to_yaml(&self) -> Result<String, crate::Error> {
        serde_yaml::to_string(self).map_err(|e| crate::Error::serialization(e.to_string()))
    }
}
