//! Nova compute, all services on this host, with RBD-backed disks.

use super::utils::{REGION, Settings};
use super::{ceph, cinder, glance, keystone, mysql, neutron, ovn, rabbitmq};
use crate::host;
use crate::runner;
use anyhow::{Context, Result};
use serde::Deserialize;
use stackgraph::ModuleSpec;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

const CONF: &str = "/etc/nova/nova.conf";
const SERVICE: &str = "nova";
const SERVICE_TYPE: &str = "compute";
const KVM_DEVICE: &str = "/dev/kvm";
const SECRET_XML: &str = "/tmp/secret.xml";

/// Time nova-compute needs to register before host discovery
const COMPUTE_SETTLE: Duration = Duration::from_secs(15);

pub fn spec() -> ModuleSpec {
    ModuleSpec::new()
        .requires(&[
            "ceph", "cinder", "glance", "keystone", "mysql", "neutron", "ovn", "placement",
            "rabbitmq",
        ])
        .packages(&[
            "nova-api",
            "nova-conductor",
            "nova-scheduler",
            "nova-compute",
            "nova-spiceproxy",
            "spice-html5",
        ])
        .logs(&["/var/log/nova/"])
        .setup(setup)
}

fn nova_manage(args: &[&str]) -> Result<String> {
    runner::sudo("nova-manage", args, Some(SERVICE))
}

fn setup() -> Result<()> {
    let fqdn = host::fqdn()?;
    let ip = host::my_ip();
    let (db_user, db_pass) = mysql::ensure_service(SERVICE)?;
    let (api_user, api_pass) = mysql::ensure_service("nova_api")?;
    let (cell0_user, cell0_pass) = mysql::ensure_service("nova_cell0")?;
    let (rabbit_user, rabbit_pass) = rabbitmq::ensure_service(SERVICE)?;
    let url = format!("http://{fqdn}:8774/v2.1");
    let (username, password) = keystone::ensure_service_account(SERVICE, SERVICE_TYPE, &url)?;
    let pool = ceph::ensure_pool(cinder::VOLUME_POOL)?;
    let account = keystone::account_settings(&username, &password)?;

    Settings::new()
        .set(
            "database",
            "connection",
            mysql::connection_string(SERVICE, &db_user, &db_pass),
        )
        .set("database", "max_pool_size", "1")
        .set(
            "api_database",
            "connection",
            mysql::connection_string("nova_api", &api_user, &api_pass),
        )
        .set("api_database", "max_pool_size", "1")
        .set(
            "DEFAULT",
            "transport_url",
            rabbitmq::transport_url(&rabbit_user, &rabbit_pass),
        )
        .set("DEFAULT", "host", fqdn.as_str())
        .set("DEFAULT", "my_ip", ip.as_str())
        .set("DEFAULT", "osapi_compute_workers", "1")
        .set("DEFAULT", "metadata_workers", "1")
        .set("conductor", "workers", "1")
        .set("scheduler", "workers", "1")
        .set("DEFAULT", "auth_strategy", "keystone")
        .section(
            "keystone_authtoken",
            keystone::authtoken_settings(&username, &password)?,
        )
        .section("placement", account.clone())
        .section("neutron", account.clone())
        .set("neutron", "service_metadata_proxy", "true")
        .set(
            "neutron",
            "metadata_proxy_shared_secret",
            neutron::METADATA_SECRET,
        )
        .section("service_user", account)
        .set("service_user", "send_service_user_token", "true")
        .section(
            "glance",
            [
                ("service_type", glance::SERVICE_TYPE),
                ("service_name", glance::SERVICE),
                ("region_name", REGION),
            ],
        )
        .set("oslo_concurrency", "lock_path", "/var/lib/nova/tmp")
        .set("os_region_name", "openstack", REGION)
        .set("vnc", "enabled", "false")
        .section(
            "spice",
            [
                ("enabled", "true".to_string()),
                ("agent_enabled", "true".to_string()),
                (
                    "html5proxy_base_url",
                    format!("http://{ip}:6082/spice_auto.html"),
                ),
                ("server_listen", ip.clone()),
                ("server_proxyclient_address", ip.clone()),
                ("keymap", "en-us".to_string()),
            ],
        )
        .section(
            "libvirt",
            [
                ("virt_type", virt_type()?.to_string()),
                ("rbd_user", pool.clone()),
                ("rbd_secret_uuid", ensure_libvirt_ceph_secret()?),
                ("images_rbd_pool", pool),
            ],
        )
        .set("os_vif_ovs", "ovsdb_connection", ovn::ovsdb_connection())
        .section(
            "cinder",
            [
                ("service_type", cinder::SERVICE_TYPE),
                ("service_name", cinder::SERVICE),
                ("region_name", REGION),
                ("volume_api_version", "3"),
            ],
        )
        .apply(CONF)?;

    nova_manage(&["api_db", "sync"])?;
    let cell0 = mysql::connection_string("nova_cell0", &cell0_user, &cell0_pass);
    nova_manage(&["cell_v2", "map_cell0", "--database_connection", &cell0])?;
    let cells = nova_manage(&["cell_v2", "list_cells"])?;
    if !cells.contains(" cell1 ") {
        nova_manage(&["cell_v2", "create_cell", "--name=cell1"])?;
    }
    nova_manage(&["db", "sync"])?;
    for service in ["nova-api", "nova-scheduler", "nova-conductor", "nova-compute"] {
        runner::restart_service(service)?;
    }
    thread::sleep(COMPUTE_SETTLE);
    nova_manage(&["cell_v2", "discover_hosts", "--verbose"])?;
    Ok(())
}

// ============================================================================
// Virtualization support
// ============================================================================

/// `kvm` when the CPU and `/dev/kvm` allow it, `qemu` otherwise
pub fn virt_type() -> Result<&'static str> {
    let lscpu = runner::run("lscpu", &["-J"])?;
    let hw = is_hw_virt_supported(&parse_lscpu(&lscpu)?);
    Ok(if hw && is_kvm_api_available(Path::new(KVM_DEVICE)) {
        "kvm"
    } else {
        "qemu"
    })
}

#[derive(Debug, Deserialize)]
struct Lscpu {
    lscpu: Vec<LscpuField>,
}

#[derive(Debug, Deserialize)]
struct LscpuField {
    field: String,
    #[serde(default)]
    data: Option<String>,
}

/// CPU facts relevant to hardware virtualization
#[derive(Debug, Default, PartialEq, Eq)]
struct CpuInfo {
    architecture: String,
    vendor_id: Option<String>,
    flags: Option<Vec<String>>,
}

fn parse_lscpu(json: &str) -> Result<CpuInfo> {
    let lscpu: Lscpu = serde_json::from_str(json).context("Invalid `lscpu -J` output")?;
    let field = |name: &str| {
        lscpu
            .lscpu
            .iter()
            .find(|f| f.field == name)
            .and_then(|f| f.data.clone())
    };
    Ok(CpuInfo {
        architecture: field("Architecture:").unwrap_or_default().trim().to_string(),
        vendor_id: field("Vendor ID:"),
        flags: field("Flags:").map(|f| f.split_whitespace().map(String::from).collect()),
    })
}

fn is_hw_virt_supported(cpu: &CpuInfo) -> bool {
    if matches!(cpu.architecture.as_str(), "ppc64" | "ppc64le") {
        return true;
    }
    let (Some(vendor), Some(flags)) = (&cpu.vendor_id, &cpu.flags) else {
        log::warn!(
            "Unable to determine hardware virtualization support by the output of lscpu: \
             assuming it is not supported"
        );
        return false;
    };
    let has = |flag: &str| flags.iter().any(|f| f == flag);
    match vendor.as_str() {
        "AuthenticAMD" if has("svm") => true,
        "GenuineIntel" if has("vmx") => true,
        "IBM/S390" if has("sie") => true,
        "ARM" => {
            log::warn!("Nested virtualization is not supported on ARM - will use emulation");
            false
        }
        other => {
            log::warn!(
                "Unable to determine hardware virtualization support by CPU vendor id \
                 {other:?}: assuming it is not supported."
            );
            false
        }
    }
}

fn dev_major(rdev: u64) -> u64 {
    ((rdev >> 8) & 0xfff) | ((rdev >> 32) & !0xfff)
}

fn dev_minor(rdev: u64) -> u64 {
    (rdev & 0xff) | ((rdev >> 12) & !0xff)
}

/// Whether `device` is a usable KVM character device (10:232)
fn is_kvm_api_available(device: &Path) -> bool {
    use std::os::unix::fs::{FileTypeExt, MetadataExt};

    let Ok(meta) = fs::metadata(device) else {
        log::warn!("{} does not exist", device.display());
        return false;
    };
    if fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(device)
        .is_err()
    {
        log::warn!("{} is not RW-accessible", device.display());
        return false;
    }
    if !meta.file_type().is_char_device() {
        log::warn!("{} is not a character device", device.display());
        return false;
    }
    let (major, minor) = (dev_major(meta.rdev()), dev_minor(meta.rdev()));
    if major != 10 {
        log::warn!("{} has an unexpected major number: {major}", device.display());
        return false;
    }
    if minor != 232 {
        log::warn!("{} has an unexpected minor number: {minor}", device.display());
        return false;
    }
    true
}

// ============================================================================
// Libvirt secret
// ============================================================================

fn secret_xml(uuid: &str, user: &str) -> String {
    format!(
        "<secret ephemeral='no' private='no'>\n  \
         <uuid>{uuid}</uuid>\n  \
         <description>Ceph secret for Nova</description>\n  \
         <usage type='ceph'>\n    \
         <name>client.{user} secret</name>\n  \
         </usage>\n\
         </secret>\n"
    )
}

/// Define the libvirt secret holding the volume user's cephx key
fn ensure_libvirt_ceph_secret() -> Result<String> {
    let uuid = ceph::rbd_uuid()?;
    if runner::probe("virsh", &["secret-get-value", &uuid]).is_ok() {
        return Ok(uuid);
    }
    fs::write(SECRET_XML, secret_xml(&uuid, cinder::VOLUME_USER))
        .with_context(|| format!("Failed to write {SECRET_XML}"))?;
    runner::run("virsh", &["secret-define", "--file", SECRET_XML])?;
    let key = ceph::get_key(cinder::VOLUME_USER)?;
    runner::run(
        "virsh",
        &["secret-set-value", "--secret", &uuid, "--base64", &key],
    )?;
    Ok(uuid)
}
