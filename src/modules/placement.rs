//! Placement API, served by apache.

use super::utils::{self, Settings};
use super::{keystone, mysql};
use crate::host;
use crate::runner;
use anyhow::Result;
use stackgraph::ModuleSpec;

const CONF: &str = "/etc/placement/placement.conf";
const SERVICE: &str = "placement";

pub fn spec() -> ModuleSpec {
    ModuleSpec::new()
        .requires(&["keystone", "mysql"])
        .packages(&["placement-api"])
        .logs(&["/var/log/placement/"])
        .setup(setup)
}

fn setup() -> Result<()> {
    let (db_user, db_pass) = mysql::ensure_service(SERVICE)?;
    let url = format!("http://{}:8778/", host::fqdn()?);
    let (username, password) = keystone::ensure_service_account(SERVICE, SERVICE, &url)?;
    utils::single_wsgi_process(
        "placement-api",
        "/etc/apache2/sites-enabled/placement-api.conf",
    )?;
    Settings::new()
        .set(
            "placement_database",
            "connection",
            mysql::connection_string(SERVICE, &db_user, &db_pass),
        )
        .set("placement_database", "max_pool_size", "1")
        .set("api", "auth_strategy", "keystone")
        .section(
            "keystone_authtoken",
            keystone::authtoken_settings(&username, &password)?,
        )
        .apply(CONF)?;
    runner::sudo("placement-manage", &["db", "sync"], Some(SERVICE))?;
    utils::restart_apache()
}
