//! Heat orchestration and its tempest plugin setup.

use super::utils::Settings;
use super::{keystone, mysql, neutron, rabbitmq};
use crate::host;
use crate::runner;
use anyhow::Result;
use stackgraph::ModuleSpec;
use std::path::Path;

const CONF: &str = "/etc/heat/heat.conf";
const SERVICE: &str = "heat";
const SERVICE_CFN: &str = "heat-cfn";
const SERVICE_TYPE: &str = "orchestration";
const SERVICE_TYPE_CFN: &str = "cloudformation";
const STACK_ADMIN: &str = "heat_admin";
const STACK_ADMIN_PASSWORD: &str = "changeme";
const STACK_OWNER_ROLE: &str = "heat_stack_owner";
const STACK_USER_ROLE: &str = "heat_stack_user";

const DEMO_PROJECT: &str = "heat-demo-project";
const DEMO_NETWORK: &str = "heat-demo-network";
const DEMO_SUBNET: &str = "heat-demo-subnet";
const DEMO_ROUTER: &str = "heat-demo-router";
const DEMO_CIDR: &str = "192.168.0.0/24";

pub fn spec() -> ModuleSpec {
    ModuleSpec::new()
        .requires(&["keystone", "mysql", "rabbitmq", "nova", "neutron"])
        .packages(&["heat-api", "heat-api-cfn", "heat-engine"])
        .logs(&["/var/log/heat/"])
        .setup(setup)
        .configure_tempest(configure_tempest)
        .include_tests(&["heat_tempest_plugin.tests.functional.test_nova_server_networks"])
        .exclude_tests(&[
            // fails with stack already exists
            "test_create_update_server_add_subnet",
            "test_create_stack_with_multi_signal_waitcondition",
            // aodh is not deployed
            "aodh",
            "test_extra_route_set",
        ])
}

/// `(api, cfn, orchestration, metadata)` endpoint URLs on `fqdn`
fn urls(fqdn: &str) -> (String, String, String, String) {
    let api = format!("http://{fqdn}:8004");
    let cfn = format!("{api}/v1");
    let orchestration = format!("{cfn}/%(tenant_id)s");
    let metadata = format!("http://{fqdn}:8000");
    (api, cfn, orchestration, metadata)
}

fn setup() -> Result<()> {
    let (_, cfn_url, orchestration_url, metadata_url) = urls(&host::fqdn()?);
    let (db_user, db_pass) = mysql::ensure_service(SERVICE)?;
    let (rabbit_user, rabbit_pass) = rabbitmq::ensure_service(SERVICE)?;
    let (username, password) =
        keystone::ensure_service_account(SERVICE, SERVICE_TYPE, &orchestration_url)?;
    let cfn = keystone::ensure_service(SERVICE_CFN, SERVICE_TYPE_CFN)?;
    keystone::ensure_endpoint(&cfn, &cfn_url)?;

    let domain = keystone::ensure_domain(SERVICE)?;
    let stack_admin = keystone::ensure_user(STACK_ADMIN, STACK_ADMIN_PASSWORD, &domain)?;
    keystone::grant_domain_role(&stack_admin, keystone::admin_role(), &domain)?;
    keystone::ensure_role(STACK_OWNER_ROLE)?;
    keystone::ensure_role(STACK_USER_ROLE)?;

    Settings::new()
        .set(
            "database",
            "connection",
            mysql::connection_string(SERVICE, &db_user, &db_pass),
        )
        .set("database", "max_pool_size", "1")
        .section(
            "keystone_authtoken",
            keystone::authtoken_settings(&username, &password)?,
        )
        .section(
            "trustee",
            [
                ("auth_type", "password".to_string()),
                ("auth_url", keystone::auth_url()?),
                ("username", username.clone()),
                ("password", password.clone()),
                ("user_domain_id", keystone::service_domain()?),
            ],
        )
        .set("DEFAULT", "num_engine_workers", "1")
        .set("heat_api", "workers", "1")
        .set("heat_api_cfn", "workers", "1")
        .set(
            "DEFAULT",
            "transport_url",
            rabbitmq::transport_url(&rabbit_user, &rabbit_pass),
        )
        .set("DEFAULT", "heat_waitcondition_server_url", format!("{metadata_url}/v1/waitcondition"))
        .set("DEFAULT", "heat_metadata_server_url", metadata_url)
        .set("DEFAULT", "instance_driver", "heat.engine.nova")
        .section(
            "DEFAULT",
            [
                ("stack_user_domain_id", domain),
                ("stack_domain_admin", STACK_ADMIN.to_string()),
                (
                    "stack_domain_admin_password",
                    STACK_ADMIN_PASSWORD.to_string(),
                ),
            ],
        )
        .apply(CONF)?;

    runner::sudo("heat-manage", &["db_sync"], Some(SERVICE))?;
    for service in ["heat-api", "heat-api-cfn", "heat-engine"] {
        runner::restart_service(service)?;
    }
    Ok(())
}

/// Demo project with a routed network for the heat tempest plugin
fn configure_tempest(tempest_conf: &Path) -> Result<()> {
    let project = keystone::ensure_project(DEMO_PROJECT, &keystone::default_domain()?)?;
    keystone::grant_project_role(&keystone::admin_user()?, keystone::admin_role(), &project)?;

    let network = neutron::ensure_network(DEMO_NETWORK, &project)?;
    neutron::ensure_subnet(DEMO_SUBNET, &network, DEMO_CIDR)?;
    let router = neutron::ensure_router(DEMO_ROUTER, &project)?;
    neutron::ensure_subnet_router(DEMO_SUBNET, &network, &router)?;

    Settings::new()
        .section(
            "heat_plugin",
            [
                ("network_for_ssh", neutron::EXTERNAL_NETWORK),
                ("fixed_network_name", DEMO_NETWORK),
                ("floating_network_name", neutron::EXTERNAL_NETWORK),
                ("image_ssh_user", "ubuntu"),
                ("project_name", DEMO_PROJECT),
            ],
        )
        .apply(&tempest_conf.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let (api, cfn, orchestration, metadata) = urls("cloud.example.com");
        assert_eq!(api, "http://cloud.example.com:8004");
        assert_eq!(cfn, "http://cloud.example.com:8004/v1");
        assert_eq!(orchestration, "http://cloud.example.com:8004/v1/%(tenant_id)s");
        assert_eq!(metadata, "http://cloud.example.com:8000");
    }

    #[test]
    fn test_tempest_selection() {
        let spec = spec();
        assert!(spec.configure_tempest.is_some());
        assert_eq!(spec.test_include_regexes.len(), 1);
        assert!(spec.test_exclude_regexes.iter().any(|r| r == "aodh"));
    }
}
