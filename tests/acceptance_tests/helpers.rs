//! Shared fixtures for the acceptance scenarios
//!
//! The configurations here mirror the canonical two-phase scenario: a VPC
//! with one isolated network, a public IP, one or two instances, and a
//! load-balancer rule whose attributes change between the phases.

use windlass::config::{
    Configuration, InstanceConfig, NetworkConfig, PublicIpConfig, Ref, RuleConfig, ScenarioParams,
    VpcConfig,
};
use windlass::rule::Algorithm;
use windlass::state::{Address, ResourceKind};

/// Initialize tracing output for a test run; safe to call repeatedly
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(EnvFilter::from_default_env())
        .try_init();
}

/// Address of the scenario's rule
pub fn rule_address() -> Address {
    Address::rule("foo")
}

fn vpc_address() -> Address {
    Address::new(ResourceKind::Vpc, "foobar")
}

fn network_address() -> Address {
    Address::new(ResourceKind::Network, "foo")
}

fn ip_address() -> Address {
    Address::new(ResourceKind::PublicIp, "foo")
}

fn instance_address(name: &str) -> Address {
    Address::new(ResourceKind::Instance, name)
}

fn server(params: &ScenarioParams, name: &str) -> InstanceConfig {
    InstanceConfig {
        name: name.into(),
        display_name: "sandbox-server".into(),
        service_offering: params.service_offering.clone(),
        template: params.template.clone(),
        network: Ref::id_of(network_address()),
        zone: Ref::output(network_address(), "zone"),
        user_data: Some("foobar\nfoo\nbar".into()),
        expunge: true,
    }
}

fn prerequisites(params: &ScenarioParams) -> Configuration {
    Configuration::new()
        .vpc(
            "foobar",
            VpcConfig {
                name: "sandbox-vpc".into(),
                cidr: params.vpc_cidr.clone(),
                vpc_offering: params.vpc_offering.clone(),
                zone: params.zone.clone(),
            },
        )
        .network(
            "foo",
            NetworkConfig {
                name: "sandbox-network".into(),
                cidr: params.network_cidr.clone(),
                network_offering: params.network_offering.clone(),
                vpc: Ref::id_of(vpc_address()),
                zone: Ref::output(vpc_address(), "zone"),
            },
        )
        .public_ip("foo", PublicIpConfig {
            vpc: Ref::id_of(vpc_address()),
        })
}

/// Phase one: one server, rule `terraform-lb`, roundrobin, 80/80
pub fn basic_configuration(params: &ScenarioParams) -> Configuration {
    prerequisites(params)
        .instance("foobar1", server(params, "sandbox-server1"))
        .load_balancer_rule(
            "foo",
            RuleConfig {
                name: "terraform-lb".into(),
                ip_address: Ref::id_of(ip_address()),
                algorithm: Algorithm::RoundRobin,
                network: Ref::id_of(network_address()),
                public_port: 80,
                private_port: 80,
                members: vec![Ref::id_of(instance_address("foobar1"))],
            },
        )
}

/// Phase two: a second server, rule renamed to `terraform-lb-update`,
/// leastconn, 443/443, member list reordered to [server2, server1]
pub fn update_configuration(params: &ScenarioParams) -> Configuration {
    prerequisites(params)
        .instance("foobar1", server(params, "sandbox-server1"))
        .instance("foobar2", server(params, "sandbox-server2"))
        .load_balancer_rule(
            "foo",
            RuleConfig {
                name: "terraform-lb-update".into(),
                ip_address: Ref::id_of(ip_address()),
                algorithm: Algorithm::LeastConn,
                network: Ref::id_of(network_address()),
                public_port: 443,
                private_port: 443,
                members: vec![
                    Ref::id_of(instance_address("foobar2")),
                    Ref::id_of(instance_address("foobar1")),
                ],
            },
        )
}

/// A variant of the basic configuration with a different rule body
pub fn basic_configuration_with_rule(
    params: &ScenarioParams,
    rule: RuleConfig,
) -> Configuration {
    prerequisites(params)
        .instance("foobar1", server(params, "sandbox-server1"))
        .instance("foobar2", server(params, "sandbox-server2"))
        .load_balancer_rule("foo", rule)
}

/// Rule body matching the basic configuration, for making targeted edits
pub fn basic_rule() -> RuleConfig {
    RuleConfig {
        name: "terraform-lb".into(),
        ip_address: Ref::id_of(ip_address()),
        algorithm: Algorithm::RoundRobin,
        network: Ref::id_of(network_address()),
        public_port: 80,
        private_port: 80,
        members: vec![Ref::id_of(instance_address("foobar1"))],
    }
}
