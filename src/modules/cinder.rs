//! Cinder block storage backed by an RBD pool.

use super::utils::{self, Settings};
use super::{ceph, keystone, mysql, rabbitmq};
use crate::host;
use crate::runner;
use anyhow::Result;
use stackgraph::ModuleSpec;

const CONF: &str = "/etc/cinder/cinder.conf";
pub const SERVICE: &str = "cinder";
pub const SERVICE_TYPE: &str = "volumev3";
pub const VOLUME_POOL: &str = "volumes";
pub const VOLUME_USER: &str = VOLUME_POOL;

pub fn spec() -> ModuleSpec {
    ModuleSpec::new()
        .requires(&["ceph", "keystone", "mysql", "rabbitmq"])
        .packages(&["cinder-api", "cinder-scheduler", "cinder-volume"])
        .logs(&["/var/log/cinder/"])
        .setup(setup)
}

fn setup() -> Result<()> {
    let fqdn = host::fqdn()?;
    let (db_user, db_pass) = mysql::ensure_service(SERVICE)?;
    let (rabbit_user, rabbit_pass) = rabbitmq::ensure_service(SERVICE)?;
    let url = format!("http://{fqdn}:8776/v3/%(project_id)s");
    let (username, password) = keystone::ensure_service_account(SERVICE, SERVICE_TYPE, &url)?;
    let pool = ceph::ensure_pool(VOLUME_POOL)?;
    ceph::ensure_authenticate(VOLUME_POOL, Some(SERVICE))?;
    utils::single_wsgi_process("cinder-wsgi", "/etc/apache2/conf-enabled/cinder-wsgi.conf")?;

    Settings::new()
        .set(
            "database",
            "connection",
            mysql::connection_string(SERVICE, &db_user, &db_pass),
        )
        .set("DEFAULT", "my_ip", host::my_ip())
        .set(
            "DEFAULT",
            "transport_url",
            rabbitmq::transport_url(&rabbit_user, &rabbit_pass),
        )
        .set("DEFAULT", "glance_api_version", "2")
        .set("DEFAULT", "enabled_backends", "ceph")
        .set("DEFAULT", "auth_strategy", "keystone")
        .section(
            "keystone_authtoken",
            keystone::authtoken_settings(&username, &password)?,
        )
        .set("oslo_concurrency", "lock_path", "/var/lib/cinder/tmp")
        .section(
            "ceph",
            [
                ("volume_driver", "cinder.volume.drivers.rbd.RBDDriver".to_string()),
                ("volume_backend_name", "ceph".to_string()),
                ("rbd_cluster_name", ceph::CLUSTER.to_string()),
                ("rbd_ceph_conf", ceph::CONF.to_string()),
                ("rbd_pool", pool.clone()),
                ("rbd_user", pool),
                ("rbd_secret_uuid", ceph::rbd_uuid()?),
                ("rbd_flatten_volume_from_snapshot", "false".to_string()),
                ("rbd_max_clone_depth", "5".to_string()),
                ("rbd_store_chunk_size", "4".to_string()),
                ("rbd_exclusive_cinder_pool", "true".to_string()),
                ("backend_host", format!("{SERVICE}@{fqdn}")),
            ],
        )
        .apply(CONF)?;

    runner::sudo("cinder-manage", &["db", "sync"], Some(SERVICE))?;
    utils::restart_apache()?;
    runner::restart_service("cinder-scheduler")?;
    runner::restart_service("cinder-volume")
}
