//! Glance image service with a filesystem store.

use super::utils::Settings;
use super::{keystone, mysql};
use crate::host;
use crate::runner;
use anyhow::Result;
use stackgraph::ModuleSpec;

const CONF: &str = "/etc/glance/glance-api.conf";
pub const SERVICE: &str = "glance";
pub const SERVICE_TYPE: &str = "image";

pub fn spec() -> ModuleSpec {
    ModuleSpec::new()
        .requires(&["keystone", "mysql"])
        .packages(&["glance-api"])
        .logs(&["/var/log/glance/"])
        .setup(setup)
}

fn url() -> Result<String> {
    Ok(format!("http://{}:9292/", host::fqdn()?))
}

fn setup() -> Result<()> {
    let (db_user, db_pass) = mysql::ensure_service(SERVICE)?;
    let (username, password) = keystone::ensure_service_account(SERVICE, SERVICE_TYPE, &url()?)?;
    Settings::new()
        .set(
            "database",
            "connection",
            mysql::connection_string(SERVICE, &db_user, &db_pass),
        )
        .set("database", "max_pool_size", "1")
        .set("paste_deploy", "flavor", "keystone")
        .section(
            "keystone_authtoken",
            keystone::authtoken_settings(&username, &password)?,
        )
        .set("DEFAULT", "workers", "1")
        .set("DEFAULT", "enabled_backends", "fs:file")
        .set("glance_store", "default_backend", "fs")
        .set("fs", "filesystem_store_datadir", "/var/lib/glance/images/")
        .apply(CONF)?;
    runner::sudo("glance-manage", &["db_sync"], Some(SERVICE))?;
    runner::restart_service("glance-api")
}
