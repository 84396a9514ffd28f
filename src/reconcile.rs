//! Load-balancer rule reconciliation
//!
//! This module implements the reconciliation logic for a declared rule. It
//! follows the controller pattern: observe current remote state, compare with
//! the desired specification, and issue the minimal set of API calls to
//! converge.
//!
//! The orchestration API can rename a rule and switch its algorithm in place;
//! it has no call to move a rule to different ports, a different address or a
//! different network, so any of those changes forces a delete and recreate
//! (and a fresh server-assigned identifier). Membership is reconciled by set
//! difference, so reordering members is not a change.

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::api::{CloudApi, CreateRuleParams, UpdateRuleParams};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::rule::{LoadBalancerRuleSpec, RemoteRule};
use crate::state::{Address, ResourceState, State};
use crate::Error;

/// What the reconciler decided to do about the rule object itself
#[derive(Clone, Debug, PartialEq)]
pub enum RulePlan {
    /// No matching remote rule; create one
    Create,
    /// In-place changes only
    Update(UpdateRuleParams),
    /// A field the API cannot change in place differs; delete and recreate
    Replace,
    /// The remote rule already matches the specification
    Noop,
}

/// Membership changes needed to converge
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemberDiff {
    /// Instances to assign, in declaration order
    pub assign: Vec<Uuid>,
    /// Instances to remove
    pub remove: Vec<Uuid>,
}

impl MemberDiff {
    /// Returns true if membership already matches
    pub fn is_empty(&self) -> bool {
        self.assign.is_empty() && self.remove.is_empty()
    }
}

/// Decide what to do about the rule object, given what the API reports
pub fn plan_rule(desired: &LoadBalancerRuleSpec, observed: Option<&RemoteRule>) -> RulePlan {
    let Some(current) = observed else {
        return RulePlan::Create;
    };

    if desired.public_port != current.public_port
        || desired.private_port != current.private_port
        || desired.public_ip_id != current.public_ip_id
        || desired.network_id != current.network_id
    {
        return RulePlan::Replace;
    }

    let update = UpdateRuleParams {
        name: (desired.name != current.name).then(|| desired.name.clone()),
        algorithm: (desired.algorithm != current.algorithm).then_some(desired.algorithm),
    };

    if update.is_empty() {
        RulePlan::Noop
    } else {
        RulePlan::Update(update)
    }
}

/// Compute membership changes; comparison is by membership, not position
pub fn diff_members(desired: &[Uuid], assigned: &[Uuid]) -> MemberDiff {
    MemberDiff {
        assign: desired
            .iter()
            .filter(|m| !assigned.contains(m))
            .copied()
            .collect(),
        remove: assigned
            .iter()
            .filter(|m| !desired.contains(m))
            .copied()
            .collect(),
    }
}

/// Reconcile one declared rule against the remote account
///
/// Observes the rule recorded at `address` (pruning state if the remote
/// object disappeared), plans, executes, reconciles membership, and records
/// the converged rule back into state. Returns the rule's server-assigned
/// identifier, which changes when a replace was needed.
#[instrument(skip(api, state, desired, poll), fields(address = %address))]
pub async fn reconcile_rule(
    api: &dyn CloudApi,
    state: &mut State,
    address: &Address,
    desired: &LoadBalancerRuleSpec,
    poll: &RetryConfig,
) -> Result<Uuid, Error> {
    desired.validate()?;

    // Observe. A rule that disappeared remotely is pruned so it gets recreated.
    let observed = match state.get(address).and_then(|r| r.primary_id) {
        Some(id) => match api.get_load_balancer_rule(id).await? {
            Some(rule) => Some(rule),
            None => {
                warn!(%id, "recorded rule no longer exists remotely, pruning state");
                state.remove(address);
                None
            }
        },
        None => None,
    };

    let plan = plan_rule(desired, observed.as_ref());
    debug!(?plan, "planned rule changes");

    let rule = match plan {
        RulePlan::Create => create_rule(api, desired, poll).await?,
        RulePlan::Replace => {
            // Replace is only ever planned from an observed rule.
            let old = observed.as_ref().map(|r| r.id).ok_or_else(|| {
                Error::remote("replace planned without an observed rule".to_string())
            })?;
            info!(%old, "deleting rule before recreate");
            api.delete_load_balancer_rule(old).await?;
            create_rule(api, desired, poll).await?
        }
        RulePlan::Update(update) => {
            let id = observed.as_ref().map(|r| r.id).ok_or_else(|| {
                Error::remote("update planned without an observed rule".to_string())
            })?;
            info!(%id, rename = update.name.is_some(), "updating rule in place");
            let rule = api.update_load_balancer_rule(id, &update).await?;
            converge_members(api, id, &desired.members).await?;
            rule
        }
        RulePlan::Noop => {
            let rule = observed.ok_or_else(|| {
                Error::remote("noop planned without an observed rule".to_string())
            })?;
            converge_members(api, rule.id, &desired.members).await?;
            rule
        }
    };

    state.record(address.clone(), rule_state(&rule));
    info!(id = %rule.id, "rule converged");
    Ok(rule.id)
}

/// Delete the rule recorded at `address`, if any, and drop it from state
///
/// Tolerates a rule that is already gone remotely.
#[instrument(skip(api, state), fields(address = %address))]
pub async fn delete_rule(
    api: &dyn CloudApi,
    state: &mut State,
    address: &Address,
) -> Result<(), Error> {
    let Some(resource) = state.get(address) else {
        return Ok(());
    };
    let Some(id) = resource.primary_id else {
        state.remove(address);
        return Ok(());
    };

    if api.get_load_balancer_rule(id).await?.is_some() {
        info!(%id, "deleting rule");
        api.delete_load_balancer_rule(id).await?;
    } else {
        debug!(%id, "rule already gone remotely");
    }
    state.remove(address);
    Ok(())
}

/// Create the rule, wait for it to leave `Creating`, assign members
async fn create_rule(
    api: &dyn CloudApi,
    desired: &LoadBalancerRuleSpec,
    poll: &RetryConfig,
) -> Result<RemoteRule, Error> {
    let params = CreateRuleParams {
        name: desired.name.clone(),
        algorithm: desired.algorithm,
        public_port: desired.public_port,
        private_port: desired.private_port,
        public_ip_id: desired.public_ip_id,
        network_id: desired.network_id,
    };

    info!(name = %params.name, "creating rule");
    let created = api.create_load_balancer_rule(&params).await?;
    let id = created.id;

    let rule = retry_with_backoff(poll, "load_balancer_rule_active", || async move {
        match api.get_load_balancer_rule(id).await? {
            Some(rule) if rule.is_active() => Ok(rule),
            Some(rule) => Err(Error::remote(format!(
                "rule {id} is still {}",
                rule.state
            ))),
            None => Err(Error::remote(format!(
                "rule {id} disappeared while provisioning"
            ))),
        }
    })
    .await?;

    api.assign_to_load_balancer_rule(id, &desired.members).await?;
    Ok(rule)
}

/// Bring assigned membership in line with the declared member list
async fn converge_members(
    api: &dyn CloudApi,
    id: Uuid,
    desired: &[Uuid],
) -> Result<(), Error> {
    let assigned = api.list_load_balancer_rule_members(id).await?;
    let diff = diff_members(desired, &assigned);

    if diff.is_empty() {
        debug!(%id, "membership already converged");
        return Ok(());
    }

    if !diff.assign.is_empty() {
        info!(%id, count = diff.assign.len(), "assigning members");
        api.assign_to_load_balancer_rule(id, &diff.assign).await?;
    }
    if !diff.remove.is_empty() {
        info!(%id, count = diff.remove.len(), "removing members");
        api.remove_from_load_balancer_rule(id, &diff.remove).await?;
    }
    Ok(())
}

/// Build the state record for a converged rule
fn rule_state(rule: &RemoteRule) -> ResourceState {
    ResourceState::with_primary_id(rule.id)
        .attribute("name", &rule.name)
        .attribute("algorithm", rule.algorithm.to_string())
        .attribute("public_port", rule.public_port.to_string())
        .attribute("private_port", rule.private_port.to_string())
}
