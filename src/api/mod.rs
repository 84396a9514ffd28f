//! The orchestration API surface the core calls through
//!
//! Everything the reconciler, apply pipeline and checkers do against the
//! remote account goes through the [`CloudApi`] trait. Production would back
//! it with an HTTP client; tests back it with [`mockall`] mocks or the
//! in-memory [`SandboxCloud`]. Handles are passed explicitly; there is no
//! process-global client.

mod sandbox;

pub use sandbox::SandboxCloud;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::rule::{Algorithm, RemoteRule};
use crate::Error;

/// Parameters for creating a load-balancer rule
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CreateRuleParams {
    /// Display name
    pub name: String,
    /// Load-balancing algorithm
    pub algorithm: Algorithm,
    /// Port exposed on the public IP
    pub public_port: u16,
    /// Port traffic is forwarded to
    pub private_port: u16,
    /// Public IP the rule listens on
    pub public_ip_id: Uuid,
    /// Network that owns the rule
    pub network_id: Uuid,
}

/// Parameters for updating a load-balancer rule in place
///
/// Only name and algorithm can change in place; everything else forces a
/// delete and recreate.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct UpdateRuleParams {
    /// New display name, if changing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New algorithm, if changing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<Algorithm>,
}

impl UpdateRuleParams {
    /// Returns true if the update carries no changes
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.algorithm.is_none()
    }
}

/// Parameters for creating a VPC
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CreateVpcParams {
    /// Display name
    pub name: String,
    /// CIDR of the VPC
    pub cidr: String,
    /// VPC offering identifier
    pub vpc_offering: String,
    /// Zone to create the VPC in
    pub zone: String,
}

/// Parameters for creating an isolated network inside a VPC
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CreateNetworkParams {
    /// Display name
    pub name: String,
    /// CIDR of the network
    pub cidr: String,
    /// Network offering identifier
    pub network_offering: String,
    /// Owning VPC
    pub vpc_id: Uuid,
    /// Zone to create the network in
    pub zone: String,
}

/// Parameters for deploying a compute instance
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct DeployInstanceParams {
    /// Host name
    pub name: String,
    /// Display name
    pub display_name: String,
    /// Service offering identifier
    pub service_offering: String,
    /// Template to deploy from
    pub template: String,
    /// Network to attach to
    pub network_id: Uuid,
    /// Zone to deploy in
    pub zone: String,
    /// Optional cloud-init user data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

/// A public IP address acquired for a VPC
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PublicIp {
    /// Server-assigned identifier
    pub id: Uuid,
    /// The address itself, e.g. `203.0.113.10`
    pub address: String,
}

/// The narrow remote surface consumed by the provisioning core
///
/// Lookup calls return `Ok(None)` for an unknown identifier; `Err` is reserved
/// for calls the orchestrator actually failed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Look up a load-balancer rule by its server-assigned identifier
    async fn get_load_balancer_rule(&self, id: Uuid) -> Result<Option<RemoteRule>, Error>;

    /// Create a load-balancer rule
    ///
    /// The returned rule may still be in the `Creating` state; callers poll
    /// [`CloudApi::get_load_balancer_rule`] until it reports `Active`.
    async fn create_load_balancer_rule(
        &self,
        params: &CreateRuleParams,
    ) -> Result<RemoteRule, Error>;

    /// Update a rule's name and/or algorithm in place
    async fn update_load_balancer_rule(
        &self,
        id: Uuid,
        update: &UpdateRuleParams,
    ) -> Result<RemoteRule, Error>;

    /// Delete a load-balancer rule
    async fn delete_load_balancer_rule(&self, id: Uuid) -> Result<(), Error>;

    /// Assign compute instances to a rule
    async fn assign_to_load_balancer_rule(
        &self,
        id: Uuid,
        instances: &[Uuid],
    ) -> Result<(), Error>;

    /// Remove compute instances from a rule
    async fn remove_from_load_balancer_rule(
        &self,
        id: Uuid,
        instances: &[Uuid],
    ) -> Result<(), Error>;

    /// List the instances currently assigned to a rule
    async fn list_load_balancer_rule_members(&self, id: Uuid) -> Result<Vec<Uuid>, Error>;

    /// Create a VPC
    async fn create_vpc(&self, params: &CreateVpcParams) -> Result<Uuid, Error>;

    /// Create an isolated network inside a VPC
    async fn create_network(&self, params: &CreateNetworkParams) -> Result<Uuid, Error>;

    /// Acquire a public IP address for a VPC
    async fn acquire_public_ip(&self, vpc_id: Uuid) -> Result<PublicIp, Error>;

    /// Deploy a compute instance
    async fn deploy_instance(&self, params: &DeployInstanceParams) -> Result<Uuid, Error>;

    /// Delete a VPC; fails while networks or addresses still reference it
    async fn destroy_vpc(&self, id: Uuid) -> Result<(), Error>;

    /// Delete a network; fails while instances or rules still reference it
    async fn destroy_network(&self, id: Uuid) -> Result<(), Error>;

    /// Release a public IP; fails while a rule still listens on it
    async fn release_public_ip(&self, id: Uuid) -> Result<(), Error>;

    /// Expunge a compute instance; fails while a rule still lists it
    async fn expunge_instance(&self, id: Uuid) -> Result<(), Error>;
}
