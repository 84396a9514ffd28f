//! In-memory stand-in for the remote orchestration account
//!
//! [`SandboxCloud`] implements [`CloudApi`] entirely in memory: it assigns
//! identifiers, enforces the same referential rules the real orchestrator
//! enforces (members must be instances on the rule's network, objects with
//! dependents cannot be deleted), and optionally holds new rules in the
//! `Creating` state for a configurable number of polls so callers exercise
//! their convergence path.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::rule::{RemoteRule, RuleState};
use crate::Error;

use super::{
    CloudApi, CreateNetworkParams, CreateRuleParams, CreateVpcParams, DeployInstanceParams,
    PublicIp, UpdateRuleParams,
};

#[derive(Clone, Debug)]
struct VpcRecord {
    name: String,
    zone: String,
}

#[derive(Clone, Debug)]
struct NetworkRecord {
    name: String,
    vpc_id: Uuid,
}

#[derive(Clone, Debug)]
struct IpRecord {
    vpc_id: Uuid,
    address: String,
}

#[derive(Clone, Debug)]
struct InstanceRecord {
    name: String,
    network_id: Uuid,
}

#[derive(Clone, Debug)]
struct RuleRecord {
    rule: RemoteRule,
    members: Vec<Uuid>,
    /// Remaining lookups that still report `Creating`
    creating_polls: u32,
}

#[derive(Debug, Default)]
struct Stores {
    vpcs: HashMap<Uuid, VpcRecord>,
    networks: HashMap<Uuid, NetworkRecord>,
    ips: HashMap<Uuid, IpRecord>,
    instances: HashMap<Uuid, InstanceRecord>,
    rules: HashMap<Uuid, RuleRecord>,
    next_ip_octet: u8,
    mutations: u64,
}

/// In-memory sandbox account implementing [`CloudApi`]
///
/// One sandbox per scenario run; there is no isolation between callers
/// sharing a sandbox, mirroring the exclusive-account assumption of the
/// acceptance suite.
#[derive(Debug, Default)]
pub struct SandboxCloud {
    stores: RwLock<Stores>,
    provisioning_polls: u32,
}

impl SandboxCloud {
    /// Create an empty sandbox whose rules are `Active` immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sandbox whose new rules report `Creating` for `polls` lookups
    pub fn with_provisioning_delay(polls: u32) -> Self {
        Self {
            stores: RwLock::new(Stores::default()),
            provisioning_polls: polls,
        }
    }

    /// Number of mutating calls the sandbox has accepted
    ///
    /// Lets tests assert that re-applying an unchanged configuration touched
    /// nothing.
    pub async fn mutation_count(&self) -> u64 {
        self.stores.read().await.mutations
    }

    /// Number of live load-balancer rules
    pub async fn rule_count(&self) -> usize {
        self.stores.read().await.rules.len()
    }

    /// Number of live objects of any kind
    pub async fn object_count(&self) -> usize {
        let s = self.stores.read().await;
        s.vpcs.len() + s.networks.len() + s.ips.len() + s.instances.len() + s.rules.len()
    }
}

#[async_trait]
impl CloudApi for SandboxCloud {
    async fn get_load_balancer_rule(&self, id: Uuid) -> Result<Option<RemoteRule>, Error> {
        let mut s = self.stores.write().await;
        let Some(record) = s.rules.get_mut(&id) else {
            return Ok(None);
        };

        if record.creating_polls > 0 {
            record.creating_polls -= 1;
            let mut rule = record.rule.clone();
            rule.state = RuleState::Creating;
            return Ok(Some(rule));
        }

        record.rule.state = RuleState::Active;
        Ok(Some(record.rule.clone()))
    }

    async fn create_load_balancer_rule(
        &self,
        params: &CreateRuleParams,
    ) -> Result<RemoteRule, Error> {
        let mut s = self.stores.write().await;

        if !s.ips.contains_key(&params.public_ip_id) {
            return Err(Error::remote(format!(
                "unknown public ip {}",
                params.public_ip_id
            )));
        }
        if !s.networks.contains_key(&params.network_id) {
            return Err(Error::remote(format!(
                "unknown network {}",
                params.network_id
            )));
        }
        if s.rules.values().any(|r| {
            r.rule.public_ip_id == params.public_ip_id && r.rule.public_port == params.public_port
        }) {
            return Err(Error::remote(format!(
                "public port {} already in use on ip {}",
                params.public_port, params.public_ip_id
            )));
        }

        let rule = RemoteRule {
            id: Uuid::new_v4(),
            name: params.name.clone(),
            algorithm: params.algorithm,
            public_port: params.public_port,
            private_port: params.private_port,
            public_ip_id: params.public_ip_id,
            network_id: params.network_id,
            state: if self.provisioning_polls == 0 {
                RuleState::Active
            } else {
                RuleState::Creating
            },
            created: Utc::now(),
        };

        debug!(id = %rule.id, name = %rule.name, "sandbox: created load balancer rule");
        s.rules.insert(
            rule.id,
            RuleRecord {
                rule: rule.clone(),
                members: Vec::new(),
                creating_polls: self.provisioning_polls,
            },
        );
        s.mutations += 1;
        Ok(rule)
    }

    async fn update_load_balancer_rule(
        &self,
        id: Uuid,
        update: &UpdateRuleParams,
    ) -> Result<RemoteRule, Error> {
        let mut s = self.stores.write().await;
        let record = s
            .rules
            .get_mut(&id)
            .ok_or_else(|| Error::remote(format!("unknown load balancer rule {id}")))?;

        if let Some(name) = &update.name {
            record.rule.name = name.clone();
        }
        if let Some(algorithm) = update.algorithm {
            record.rule.algorithm = algorithm;
        }

        s.mutations += 1;
        Ok(s.rules[&id].rule.clone())
    }

    async fn delete_load_balancer_rule(&self, id: Uuid) -> Result<(), Error> {
        let mut s = self.stores.write().await;
        s.rules
            .remove(&id)
            .ok_or_else(|| Error::remote(format!("unknown load balancer rule {id}")))?;
        s.mutations += 1;
        debug!(%id, "sandbox: deleted load balancer rule");
        Ok(())
    }

    async fn assign_to_load_balancer_rule(
        &self,
        id: Uuid,
        instances: &[Uuid],
    ) -> Result<(), Error> {
        let mut s = self.stores.write().await;

        let network_id = s
            .rules
            .get(&id)
            .map(|r| r.rule.network_id)
            .ok_or_else(|| Error::remote(format!("unknown load balancer rule {id}")))?;

        for instance_id in instances {
            let instance = s
                .instances
                .get(instance_id)
                .ok_or_else(|| Error::remote(format!("unknown instance {instance_id}")))?;
            if instance.network_id != network_id {
                return Err(Error::remote(format!(
                    "instance {} ({}) is not on the rule's network",
                    instance.name, instance_id
                )));
            }
        }

        let record = s.rules.get_mut(&id).ok_or_else(|| {
            Error::remote(format!("unknown load balancer rule {id}"))
        })?;
        for instance_id in instances {
            if !record.members.contains(instance_id) {
                record.members.push(*instance_id);
            }
        }
        s.mutations += 1;
        Ok(())
    }

    async fn remove_from_load_balancer_rule(
        &self,
        id: Uuid,
        instances: &[Uuid],
    ) -> Result<(), Error> {
        let mut s = self.stores.write().await;
        let record = s
            .rules
            .get_mut(&id)
            .ok_or_else(|| Error::remote(format!("unknown load balancer rule {id}")))?;

        for instance_id in instances {
            if !record.members.contains(instance_id) {
                return Err(Error::remote(format!(
                    "instance {instance_id} is not assigned to rule {id}"
                )));
            }
        }
        record.members.retain(|m| !instances.contains(m));
        s.mutations += 1;
        Ok(())
    }

    async fn list_load_balancer_rule_members(&self, id: Uuid) -> Result<Vec<Uuid>, Error> {
        let s = self.stores.read().await;
        let record = s
            .rules
            .get(&id)
            .ok_or_else(|| Error::remote(format!("unknown load balancer rule {id}")))?;
        Ok(record.members.clone())
    }

    async fn create_vpc(&self, params: &CreateVpcParams) -> Result<Uuid, Error> {
        let mut s = self.stores.write().await;
        let id = Uuid::new_v4();
        s.vpcs.insert(
            id,
            VpcRecord {
                name: params.name.clone(),
                zone: params.zone.clone(),
            },
        );
        s.mutations += 1;
        debug!(%id, name = %params.name, "sandbox: created vpc");
        Ok(id)
    }

    async fn create_network(&self, params: &CreateNetworkParams) -> Result<Uuid, Error> {
        let mut s = self.stores.write().await;
        let vpc = s
            .vpcs
            .get(&params.vpc_id)
            .ok_or_else(|| Error::remote(format!("unknown vpc {}", params.vpc_id)))?;
        if vpc.zone != params.zone {
            return Err(Error::remote(format!(
                "network zone {} does not match vpc zone {}",
                params.zone, vpc.zone
            )));
        }

        let id = Uuid::new_v4();
        s.networks.insert(
            id,
            NetworkRecord {
                name: params.name.clone(),
                vpc_id: params.vpc_id,
            },
        );
        s.mutations += 1;
        debug!(%id, name = %params.name, "sandbox: created network");
        Ok(id)
    }

    async fn acquire_public_ip(&self, vpc_id: Uuid) -> Result<PublicIp, Error> {
        let mut s = self.stores.write().await;
        if !s.vpcs.contains_key(&vpc_id) {
            return Err(Error::remote(format!("unknown vpc {vpc_id}")));
        }

        s.next_ip_octet += 1;
        let ip = PublicIp {
            id: Uuid::new_v4(),
            address: format!("203.0.113.{}", s.next_ip_octet),
        };
        s.ips.insert(
            ip.id,
            IpRecord {
                vpc_id,
                address: ip.address.clone(),
            },
        );
        s.mutations += 1;
        Ok(ip)
    }

    async fn deploy_instance(&self, params: &DeployInstanceParams) -> Result<Uuid, Error> {
        let mut s = self.stores.write().await;
        if !s.networks.contains_key(&params.network_id) {
            return Err(Error::remote(format!(
                "unknown network {}",
                params.network_id
            )));
        }

        let id = Uuid::new_v4();
        s.instances.insert(
            id,
            InstanceRecord {
                name: params.name.clone(),
                network_id: params.network_id,
            },
        );
        s.mutations += 1;
        debug!(%id, name = %params.name, "sandbox: deployed instance");
        Ok(id)
    }

    async fn destroy_vpc(&self, id: Uuid) -> Result<(), Error> {
        let mut s = self.stores.write().await;
        let vpc = s
            .vpcs
            .get(&id)
            .ok_or_else(|| Error::remote(format!("unknown vpc {id}")))?;
        if s.networks.values().any(|n| n.vpc_id == id) {
            return Err(Error::remote(format!(
                "vpc {} ({id}) still has networks",
                vpc.name
            )));
        }
        if s.ips.values().any(|ip| ip.vpc_id == id) {
            return Err(Error::remote(format!(
                "vpc {} ({id}) still has public ips",
                vpc.name
            )));
        }
        s.vpcs.remove(&id);
        s.mutations += 1;
        Ok(())
    }

    async fn destroy_network(&self, id: Uuid) -> Result<(), Error> {
        let mut s = self.stores.write().await;
        let network = s
            .networks
            .get(&id)
            .ok_or_else(|| Error::remote(format!("unknown network {id}")))?;
        if s.instances.values().any(|i| i.network_id == id) {
            return Err(Error::remote(format!(
                "network {} ({id}) still has instances",
                network.name
            )));
        }
        if s.rules.values().any(|r| r.rule.network_id == id) {
            return Err(Error::remote(format!(
                "network {} ({id}) still has rules",
                network.name
            )));
        }
        s.networks.remove(&id);
        s.mutations += 1;
        Ok(())
    }

    async fn release_public_ip(&self, id: Uuid) -> Result<(), Error> {
        let mut s = self.stores.write().await;
        let ip = s
            .ips
            .get(&id)
            .ok_or_else(|| Error::remote(format!("unknown public ip {id}")))?;
        if s.rules.values().any(|r| r.rule.public_ip_id == id) {
            return Err(Error::remote(format!(
                "public ip {} ({id}) still has a rule attached",
                ip.address
            )));
        }
        s.ips.remove(&id);
        s.mutations += 1;
        Ok(())
    }

    async fn expunge_instance(&self, id: Uuid) -> Result<(), Error> {
        let mut s = self.stores.write().await;
        if !s.instances.contains_key(&id) {
            return Err(Error::remote(format!("unknown instance {id}")));
        }
        if s.rules.values().any(|r| r.members.contains(&id)) {
            return Err(Error::remote(format!(
                "instance {id} is still assigned to a rule"
            )));
        }
        s.instances.remove(&id);
        s.mutations += 1;
        Ok(())
    }
}
