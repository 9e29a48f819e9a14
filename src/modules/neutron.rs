//! Neutron networking on the ML2/OVN driver.

use super::utils::Settings;
use super::{keystone, mysql, ovn, rabbitmq};
use crate::host;
use crate::runner;
use anyhow::Result;
use stackgraph::ModuleSpec;
use std::thread;
use std::time::Duration;

const CONF: &str = "/etc/neutron/neutron.conf";
const METADATA_AGENT_CONF: &str = "/etc/neutron/neutron_ovn_metadata_agent.ini";
const ML2_CONF: &str = "/etc/neutron/plugins/ml2/ml2_conf.ini";
const SERVICE: &str = "neutron";

pub const METADATA_SECRET: &str = "bonjour";
pub const EXTERNAL_NETWORK: &str = "external-network";
const EXTERNAL_SUBNET: &str = "external-subnet";

const STARTUP_ATTEMPTS: usize = 10;

pub fn spec() -> ModuleSpec {
    ModuleSpec::new()
        .requires(&["keystone", "mysql", "ovn", "rabbitmq"])
        .packages(&["neutron-server", "neutron-ovn-metadata-agent"])
        .logs(&["/var/log/neutron/"])
        .setup(setup)
}

fn setup() -> Result<()> {
    let (db_user, db_pass) = mysql::ensure_service(SERVICE)?;
    let (rabbit_user, rabbit_pass) = rabbitmq::ensure_service(SERVICE)?;
    let url = format!("http://{}:9696/", host::fqdn()?);
    let (username, password) = keystone::ensure_service_account(SERVICE, "network", &url)?;

    Settings::new()
        .set(
            "database",
            "connection",
            mysql::connection_string(SERVICE, &db_user, &db_pass),
        )
        .set("database", "max_pool_size", "1")
        .section(
            "DEFAULT",
            [
                ("core_plugin", "ml2"),
                (
                    "service_plugins",
                    "metering,segments,ovn-router,port_forwarding,trunk",
                ),
                ("router_distributed", "false"),
                ("l3_ha", "false"),
                ("allow_automatic_l3agent_failover", "false"),
                ("allow_automatic_dhcp_failover", "true"),
                (
                    "network_scheduler_driver",
                    "neutron.scheduler.dhcp_agent_scheduler.AZAwareWeightScheduler",
                ),
                ("dhcp_load_type", "networks"),
                (
                    "router_scheduler_driver",
                    "neutron.scheduler.l3_agent_scheduler.AZLeastRoutersScheduler",
                ),
                ("dhcp_agents_per_network", "1"),
                ("api_workers", "1"),
                ("rpc_workers", "1"),
            ],
        )
        .set(
            "DEFAULT",
            "transport_url",
            rabbitmq::transport_url(&rabbit_user, &rabbit_pass),
        )
        .set("DEFAULT", "notify_nova_on_port_status_changes", "true")
        .set("DEFAULT", "notify_nova_on_port_data_changes", "true")
        .set("oslo_concurrency", "lock_path", "/var/lib/neutron/tmp")
        .section("nova", keystone::account_settings(&username, &password)?)
        .section("placement", keystone::account_settings(&username, &password)?)
        .set("DEFAULT", "auth_strategy", "keystone")
        .section(
            "keystone_authtoken",
            keystone::authtoken_settings(&username, &password)?,
        )
        .apply(CONF)?;

    let physnet_vlans = format!("{}:1:4094", ovn::PHYSNET);
    Settings::new()
        .section(
            "ml2",
            [
                (
                    "extension_drivers",
                    "port_security,qos,dns_domain_ports,port_forwarding,uplink_status_propagation",
                ),
                ("type_drivers", "geneve,vlan,flat"),
                ("tenant_network_types", "geneve,vlan,flat"),
                ("mechanism_drivers", "ovn"),
            ],
        )
        .set("ml2_type_vlan", "network_vlan_ranges", physnet_vlans)
        .set("ml2_type_flat", "flat_networks", ovn::PHYSNET)
        .set("ml2_type_geneve", "vni_ranges", "1:65535")
        .set("ml2_type_geneve", "max_header_size", "38")
        .set("securitygroup", "enable_security_group", "true")
        .set("ovs", "enable_tunneling", "true")
        .set("ovs", "igmp_snooping_enable", "false")
        .section(
            "ovn",
            [
                ("ovn_nb_connection", ovn::ovnnb_connection()),
                ("ovn_sb_connection", ovn::ovnsb_connection()),
                ("ovn_l3_scheduler", "leastloaded".to_string()),
                ("ovn_metadata_enabled", "true".to_string()),
                ("enable_distributed_floating_ip", "true".to_string()),
                ("dhcp_default_lease_time", "600".to_string()),
            ],
        )
        .apply(ML2_CONF)?;

    Settings::new()
        .set("DEFAULT", "nova_metadata_host", host::fqdn()?)
        .set("DEFAULT", "metadata_proxy_shared_secret", METADATA_SECRET)
        .set("ovs", "ovsdb_connection", ovn::ovsdb_connection())
        .set("ovn", "ovn_sb_connection", ovn::ovnsb_connection())
        .apply(METADATA_AGENT_CONF)?;

    runner::sudo(
        "neutron-db-manage",
        &[
            "--config-file",
            CONF,
            "--config-file",
            ML2_CONF,
            "upgrade",
            "head",
        ],
        Some(SERVICE),
    )?;
    runner::restart_service("neutron-server")?;
    runner::restart_service("neutron-ovn-metadata-agent")?;

    wait_for_server(ensure_public_network)
}

/// Retry `f` while neutron-server is still refusing connections
fn wait_for_server(f: impl Fn() -> Result<()>) -> Result<()> {
    let mut attempt = 1;
    loop {
        match f() {
            Err(e) if attempt < STARTUP_ATTEMPTS && is_connection_refused(&e) => {
                log::debug!("Waiting for neutron-server to start...");
                thread::sleep(Duration::from_secs(1));
                attempt += 1;
            }
            result => return result,
        }
    }
}

fn is_connection_refused(err: &anyhow::Error) -> bool {
    let stderr = runner::stderr_of(err).unwrap_or_default();
    stderr.contains("Connection refused") || format!("{err:#}").contains("Connection refused")
}

/// Gateway, first and last allocatable address of the external network
fn external_pool() -> Result<(String, String, String)> {
    let (first, last) = host::host_range(ovn::EXTERNAL_CIDR)?;
    let start = std::net::Ipv4Addr::from(u32::from(first) + 1);
    let end = std::net::Ipv4Addr::from(u32::from(last) - 1);
    Ok((first.to_string(), start.to_string(), end.to_string()))
}

/// Shared flat provider network reaching the external bridge
pub fn ensure_public_network() -> Result<()> {
    let network = match keystone::find_id(&["network", "show", EXTERNAL_NETWORK])? {
        Some(id) => id,
        None => keystone::create_id(&[
            "network",
            "create",
            "--external",
            "--share",
            "--default",
            "--provider-network-type",
            "flat",
            "--provider-physical-network",
            ovn::PHYSNET,
            EXTERNAL_NETWORK,
        ])?,
    };

    if keystone::find_id(&["subnet", "show", EXTERNAL_SUBNET])?.is_none() {
        let (gateway, start, end) = external_pool()?;
        let pool = format!("start={start},end={end}");
        keystone::create_id(&[
            "subnet",
            "create",
            "--network",
            &network,
            "--ip-version",
            "4",
            "--subnet-range",
            ovn::EXTERNAL_CIDR,
            "--gateway",
            &gateway,
            "--allocation-pool",
            &pool,
            "--no-dhcp",
            EXTERNAL_SUBNET,
        ])?;
    }
    Ok(())
}

pub fn public_network() -> Result<String> {
    keystone::find_id(&["network", "show", EXTERNAL_NETWORK])?
        .ok_or_else(|| anyhow::anyhow!("Network {EXTERNAL_NETWORK:?} not found"))
}

/// Ensure a tenant network; returns its id
pub fn ensure_network(name: &str, project: &str) -> Result<String> {
    log::debug!("Ensuring network {name:?} exists...");
    if let Some(id) = keystone::find_id(&["network", "show", name, "--project", project])? {
        return Ok(id);
    }
    log::debug!("Creating network {name:?}...");
    keystone::create_id(&["network", "create", "--project", project, name])
}

/// Ensure a subnet on `network`; returns its id
pub fn ensure_subnet(name: &str, network: &str, cidr: &str) -> Result<String> {
    log::debug!("Ensuring subnet {name:?} exists...");
    if let Some(id) = keystone::find_id(&["subnet", "show", name, "--network", network])? {
        return Ok(id);
    }
    log::debug!("Creating subnet {name:?}...");
    keystone::create_id(&[
        "subnet",
        "create",
        "--network",
        network,
        "--ip-version",
        "4",
        "--subnet-range",
        cidr,
        name,
    ])
}

/// Ensure a router gatewayed to the public network; returns its id
pub fn ensure_router(name: &str, project: &str) -> Result<String> {
    log::debug!("Ensuring router {name:?} exists...");
    if let Some(id) = keystone::find_id(&["router", "show", name, "--project", project])? {
        return Ok(id);
    }
    log::debug!("Creating router {name:?}...");
    let public = public_network()?;
    keystone::create_id(&[
        "router",
        "create",
        "--project",
        project,
        "--external-gateway",
        &public,
        name,
    ])
}

/// Attach a subnet to a router through a named port
pub fn ensure_subnet_router(subnet_name: &str, network: &str, router: &str) -> Result<()> {
    log::debug!("Ensuring subnet {subnet_name:?} is attached to router {router:?}...");
    let port_name = format!("{subnet_name}-port");
    let port = match keystone::find_id(&["port", "show", &port_name])? {
        Some(port) => port,
        None => {
            let fixed_ip = format!("subnet={subnet_name}");
            let port = keystone::create_id(&[
                "port",
                "create",
                "--network",
                network,
                "--fixed-ip",
                &fixed_ip,
                &port_name,
            ])?;
            keystone::openstack(&["router", "add", "port", router, &port])?;
            port
        }
    };

    let device = keystone::show_field(&["port", "show", &port], "device_id")?;
    if device.as_deref() != Some(router) {
        log::debug!("Reattaching port {port_name:?} to router {router:?}...");
        if let Some(device) = device {
            keystone::openstack(&["router", "remove", "port", &device, &port])?;
        }
        keystone::openstack(&["router", "add", "port", router, &port])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_external_pool() {
        let (gateway, start, end) = external_pool().unwrap();
        assert_eq!(gateway, "10.127.147.1");
        assert_eq!(start, "10.127.147.2");
        assert_eq!(end, "10.127.147.253");
    }

    #[test]
    fn test_wait_for_server_retries_refused_connections() {
        let calls = Cell::new(0);
        let result = wait_for_server(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                anyhow::bail!("Failed to connect: Connection refused");
            }
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_wait_for_server_gives_up_on_other_errors() {
        let calls = Cell::new(0);
        let result = wait_for_server(|| {
            calls.set(calls.get() + 1);
            anyhow::bail!("quota exceeded")
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
