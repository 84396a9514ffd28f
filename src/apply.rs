//! The apply pipeline
//!
//! [`apply`] converges local state on a [`Configuration`]: prerequisites
//! (VPC, network, public IP, instances) are created if absent, every declared
//! load-balancer rule is reconciled, and resources that left the
//! configuration are destroyed. [`destroy_all`] tears everything down ordered
//! by dependency layer: rules before instances and addresses, those before
//! networks, networks before VPCs. The orchestrator refuses to delete objects
//! with live dependents, so teardown must respect the layering.

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::api::{
    CloudApi, CreateNetworkParams, CreateVpcParams, DeployInstanceParams,
};
use crate::config::{Configuration, Ref, ResourceConfig, RuleConfig};
use crate::reconcile::{delete_rule, reconcile_rule};
use crate::retry::RetryConfig;
use crate::rule::LoadBalancerRuleSpec;
use crate::state::{Address, ResourceKind, ResourceState, State};
use crate::Error;

/// Apply a configuration, blocking until convergence or failure
///
/// Declared resources are walked in declaration order; prerequisites use
/// create-if-absent semantics, rules go through the full reconciler.
/// Resources recorded in state but no longer declared are destroyed last, so
/// a rule that dropped a member converges before the member is expunged.
#[instrument(skip_all, fields(resources = config.len()))]
pub async fn apply(
    api: &dyn CloudApi,
    state: &mut State,
    config: &Configuration,
) -> Result<(), Error> {
    debug!(config = %config.to_yaml()?, "applying configuration");

    // Reject bad rule declarations before any remote call.
    for entry in config.entries() {
        if let ResourceConfig::LoadBalancerRule(rule) = &entry.resource {
            validate_rule_config(&entry.address, rule)?;
        }
    }

    let poll = RetryConfig::for_convergence_poll();

    for entry in config.entries() {
        let address = &entry.address;
        match &entry.resource {
            ResourceConfig::Vpc(vpc) => {
                if state.contains(address) {
                    debug!(%address, "already provisioned");
                    continue;
                }
                let id = api
                    .create_vpc(&CreateVpcParams {
                        name: vpc.name.clone(),
                        cidr: vpc.cidr.clone(),
                        vpc_offering: vpc.vpc_offering.clone(),
                        zone: vpc.zone.clone(),
                    })
                    .await?;
                state.record(
                    address.clone(),
                    ResourceState::with_primary_id(id)
                        .attribute("name", &vpc.name)
                        .attribute("cidr", &vpc.cidr)
                        .attribute("zone", &vpc.zone),
                );
                info!(%address, %id, "vpc created");
            }
            ResourceConfig::Network(network) => {
                if state.contains(address) {
                    debug!(%address, "already provisioned");
                    continue;
                }
                let vpc_id = resolve_id(state, &network.vpc)?;
                let zone = resolve(state, &network.zone)?;
                let id = api
                    .create_network(&CreateNetworkParams {
                        name: network.name.clone(),
                        cidr: network.cidr.clone(),
                        network_offering: network.network_offering.clone(),
                        vpc_id,
                        zone: zone.clone(),
                    })
                    .await?;
                state.record(
                    address.clone(),
                    ResourceState::with_primary_id(id)
                        .attribute("name", &network.name)
                        .attribute("cidr", &network.cidr)
                        .attribute("zone", zone),
                );
                info!(%address, %id, "network created");
            }
            ResourceConfig::PublicIp(ip) => {
                if state.contains(address) {
                    debug!(%address, "already provisioned");
                    continue;
                }
                let vpc_id = resolve_id(state, &ip.vpc)?;
                let acquired = api.acquire_public_ip(vpc_id).await?;
                state.record(
                    address.clone(),
                    ResourceState::with_primary_id(acquired.id)
                        .attribute("ipaddress", &acquired.address),
                );
                info!(%address, id = %acquired.id, ip = %acquired.address, "public ip acquired");
            }
            ResourceConfig::Instance(instance) => {
                if state.contains(address) {
                    debug!(%address, "already provisioned");
                    continue;
                }
                let network_id = resolve_id(state, &instance.network)?;
                let zone = resolve(state, &instance.zone)?;
                let id = api
                    .deploy_instance(&DeployInstanceParams {
                        name: instance.name.clone(),
                        display_name: instance.display_name.clone(),
                        service_offering: instance.service_offering.clone(),
                        template: instance.template.clone(),
                        network_id,
                        zone: zone.clone(),
                        user_data: instance.user_data.clone(),
                    })
                    .await?;
                state.record(
                    address.clone(),
                    ResourceState::with_primary_id(id)
                        .attribute("name", &instance.name)
                        .attribute("zone", zone),
                );
                info!(%address, %id, "instance deployed");
            }
            ResourceConfig::LoadBalancerRule(rule) => {
                let spec = resolve_rule(state, rule)?;
                reconcile_rule(api, state, address, &spec, &poll).await?;
            }
        }
    }

    // Resources that left the configuration are destroyed.
    let departed = teardown_order(state.addresses_reversed().filter(|a| !config.contains(a)));
    for address in &departed {
        info!(%address, "resource left the configuration, destroying");
        destroy_resource(api, state, address).await?;
    }

    Ok(())
}

/// Destroy everything in state, dependents before their dependencies
#[instrument(skip_all, fields(resources = state.len()))]
pub async fn destroy_all(api: &dyn CloudApi, state: &mut State) -> Result<(), Error> {
    let addresses = teardown_order(state.addresses_reversed());
    for address in &addresses {
        destroy_resource(api, state, address).await?;
    }
    info!("all resources destroyed");
    Ok(())
}

/// Order addresses for teardown: by dependency layer, then reverse recording
/// order within a layer
fn teardown_order<'a>(addresses: impl Iterator<Item = &'a Address>) -> Vec<Address> {
    let mut ordered: Vec<Address> = addresses.cloned().collect();
    ordered.sort_by_key(|a| match a.kind {
        ResourceKind::LoadBalancerRule => 0u8,
        ResourceKind::Instance => 1,
        ResourceKind::PublicIp => 2,
        ResourceKind::Network => 3,
        ResourceKind::Vpc => 4,
    });
    ordered
}

/// Destroy one resource and drop it from state
async fn destroy_resource(
    api: &dyn CloudApi,
    state: &mut State,
    address: &Address,
) -> Result<(), Error> {
    if address.kind == ResourceKind::LoadBalancerRule {
        return delete_rule(api, state, address).await;
    }

    let Some(resource) = state.get(address) else {
        return Ok(());
    };
    let Some(id) = resource.primary_id else {
        state.remove(address);
        return Ok(());
    };

    match address.kind {
        ResourceKind::Instance => api.expunge_instance(id).await?,
        ResourceKind::PublicIp => api.release_public_ip(id).await?,
        ResourceKind::Network => api.destroy_network(id).await?,
        ResourceKind::Vpc => api.destroy_vpc(id).await?,
        ResourceKind::LoadBalancerRule => unreachable!("handled above"),
    }
    info!(%address, %id, "destroyed");
    state.remove(address);
    Ok(())
}

/// Resolve a reference to its concrete value
fn resolve(state: &State, reference: &Ref) -> Result<String, Error> {
    match reference {
        Ref::Literal(value) => Ok(value.clone()),
        Ref::Output { address, output } => state.output(address, output).ok_or_else(|| {
            Error::reference(format!("{address} has no output {output:?} in state"))
        }),
    }
}

/// Resolve a reference that must carry a server-assigned identifier
fn resolve_id(state: &State, reference: &Ref) -> Result<Uuid, Error> {
    let value = resolve(state, reference)?;
    value
        .parse()
        .map_err(|_| Error::reference(format!("{value:?} is not a remote identifier")))
}

/// Resolve a rule declaration into a concrete specification
fn resolve_rule(state: &State, rule: &RuleConfig) -> Result<LoadBalancerRuleSpec, Error> {
    let members = rule
        .members
        .iter()
        .map(|m| resolve_id(state, m))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(LoadBalancerRuleSpec {
        name: rule.name.clone(),
        algorithm: rule.algorithm,
        public_port: rule.public_port,
        private_port: rule.private_port,
        public_ip_id: resolve_id(state, &rule.ip_address)?,
        network_id: resolve_id(state, &rule.network)?,
        members,
    })
}

/// Structural validation of a rule declaration, before resolution
fn validate_rule_config(address: &Address, rule: &RuleConfig) -> Result<(), Error> {
    if rule.name.is_empty() {
        return Err(Error::validation(format!("{address}: rule name must not be empty")));
    }
    if rule.public_port == 0 {
        return Err(Error::validation(format!(
            "{address}: public_port must be between 1 and 65535"
        )));
    }
    if rule.private_port == 0 {
        return Err(Error::validation(format!(
            "{address}: private_port must be between 1 and 65535"
        )));
    }
    if rule.members.is_empty() {
        return Err(Error::validation(format!("{address}: rule declares no members")));
    }
    Ok(())
}
