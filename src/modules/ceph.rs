//! Single-node Ceph cluster: one monitor, one manager and three OSDs on
//! loop devices.

use super::utils::Settings;
use crate::host;
use crate::runner;
use anyhow::{Context, Result};
use stackgraph::ModuleSpec;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

pub const CLUSTER: &str = "ceph";
pub const CONF: &str = "/etc/ceph/ceph.conf";

const FSID: &str = "/etc/ceph/fsid";
const RBD_UUID: &str = "/etc/ceph/rbd_secret_uuid";
const MON_KEYRING: &str = "/etc/ceph/ceph.mon.keyring";
const ADMIN_KEYRING: &str = "/etc/ceph/ceph.client.admin.keyring";
const OSD_KEYRING: &str = "/var/lib/ceph/bootstrap-osd/ceph.keyring";
const MONMAP: &str = "/etc/ceph/ceph.monmap";
const LOOP_DEVICE_DIR: &str = "/var/lib/ceph-osd";
const OSD_UNIT: &str = "/etc/systemd/system/ceph-osd@.service";

const OSD_COUNT: u32 = 3;
const OSD_SIZE_GB: u64 = 2;
const BLOCK_SIZE: u64 = 4096;

const OSD_UNIT_TEMPLATE: &str = r#"[Unit]
Description=Ceph object storage daemon osd.%i
PartOf=ceph-osd.target
After=network-online.target local-fs.target time-sync.target
Before=remote-fs-pre.target ceph-osd.target
Wants=network-online.target local-fs.target time-sync.target remote-fs-pre.target ceph-osd.target

[Service]
Environment=CLUSTER=ceph
EnvironmentFile=-/etc/default/ceph
ExecReload=/bin/kill -HUP $MAINPID
ExecStart=/usr/bin/ceph-osd -f --cluster ${CLUSTER} --id %i --setuser ceph --setgroup ceph
ExecStartPre=/usr/lib/ceph/ceph-osd-prestart.sh --cluster ${CLUSTER} --id %i
LimitNOFILE=1048576
LimitNPROC=1048576
LockPersonality=true
MemoryDenyWriteExecute=true
NoNewPrivileges=false
PrivateTmp=true
ProtectControlGroups=true
ProtectHome=true
ProtectHostname=true
ProtectKernelLogs=true
ProtectKernelModules=true
ProtectKernelTunables=false
ProtectSystem=full
Restart=on-failure
RestartSec=10
RestrictSUIDSGID=true
StartLimitBurst=3
StartLimitInterval=30min
TasksMax=infinity

[Install]
WantedBy=ceph-osd.target
"#;

pub fn spec() -> ModuleSpec {
    ModuleSpec::new()
        .packages(&["ceph-mgr", "ceph-mon", "ceph-osd", "ceph-volume"])
        .logs(&["/var/log/ceph/"])
        .setup(setup)
}

/// Per-host daemon directories
struct Layout {
    fqdn: String,
    mon_data: PathBuf,
    mgr_data: PathBuf,
}

impl Layout {
    fn for_host(fqdn: String) -> Self {
        Self {
            mon_data: PathBuf::from(format!("/var/lib/ceph/mon/{CLUSTER}-{fqdn}")),
            mgr_data: PathBuf::from(format!("/var/lib/ceph/mgr/{CLUSTER}-{fqdn}")),
            fqdn,
        }
    }

    fn mgr_keyring(&self) -> PathBuf {
        self.mgr_data.join("keyring")
    }
}

fn setup() -> Result<()> {
    let layout = Layout::for_host(host::fqdn()?);
    Settings::new()
        .section(
            "global",
            [
                ("fsid", fsid()?),
                ("mon host", host::my_ip()),
                ("mon initial members", layout.fqdn.clone()),
                ("public network", host::my_network()),
                ("auth cluster required", "cephx".to_string()),
                ("auth service required", "cephx".to_string()),
                ("auth client required", "cephx".to_string()),
                ("osd pool default size", "1".to_string()),
                ("osd pool default min size", "1".to_string()),
                ("mon warn on insecure global id reclaim", "false".to_string()),
                (
                    "mon warn on insecure global id reclaim allowed",
                    "false".to_string(),
                ),
            ],
        )
        .apply(CONF)?;

    for dir in [&layout.mon_data, &layout.mgr_data] {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        host::chown(dir, "ceph:ceph")?;
    }
    setup_keyrings(&layout)?;
    import_keyrings(&layout)?;
    setup_mon(&layout)?;
    setup_mgr(&layout)?;
    for id in 0..OSD_COUNT {
        let backing = Path::new(LOOP_DEVICE_DIR).join(format!("ceph-{id}"));
        host::unless_exists(&backing, || setup_osd(id, &backing))?;
    }
    Ok(())
}

/// Cluster fsid, generated on first use
pub fn fsid() -> Result<String> {
    host::persistent_uuid(Path::new(FSID))
}

/// Libvirt secret UUID for RBD access, generated on first use
pub fn rbd_uuid() -> Result<String> {
    host::persistent_uuid(Path::new(RBD_UUID))
}

fn create_keyring(keyring: &Path, name: &str, caps: &[(&str, &str)]) -> Result<()> {
    let keyring = keyring.to_string_lossy();
    let mut args = vec!["--create-keyring", keyring.as_ref(), "--gen-key", "-n", name];
    for &(daemon, cap) in caps {
        args.extend(["--cap", daemon, cap]);
    }
    runner::run("ceph-authtool", &args)?;
    Ok(())
}

fn setup_keyrings(layout: &Layout) -> Result<()> {
    let mon = Path::new(MON_KEYRING);
    host::unless_exists(mon, || {
        create_keyring(mon, "mon.", &[("mon", "allow *")])?;
        runner::run("ln", &["-s", MON_KEYRING, "/etc/ceph/ceph.keyring"])?;
        host::chown(mon, "ceph:ceph")
    })?;

    let mgr = layout.mgr_keyring();
    let mgr_name = format!("mgr.{}", layout.fqdn);
    host::unless_exists(&mgr, || {
        create_keyring(
            &mgr,
            &mgr_name,
            &[
                ("mon", "allow profile mgr"),
                ("osd", "allow *"),
                ("mds", "allow *"),
            ],
        )?;
        host::chown(&mgr, "ceph:ceph")
    })?;

    let admin = Path::new(ADMIN_KEYRING);
    host::unless_exists(admin, || {
        create_keyring(
            admin,
            "client.admin",
            &[
                ("mon", "allow *"),
                ("osd", "allow *"),
                ("mds", "allow *"),
                ("mgr", "allow *"),
            ],
        )
    })?;

    let osd = Path::new(OSD_KEYRING);
    host::unless_exists(osd, || {
        create_keyring(
            osd,
            "client.bootstrap-osd",
            &[("mon", "profile bootstrap-osd"), ("mgr", "allow r")],
        )
    })
}

fn import_keyrings(layout: &Layout) -> Result<()> {
    let mgr = layout.mgr_keyring();
    let mgr = mgr.to_string_lossy();
    for keyring in [mgr.as_ref(), ADMIN_KEYRING, OSD_KEYRING] {
        runner::run("ceph-authtool", &[MON_KEYRING, "--import-keyring", keyring])?;
    }
    Ok(())
}

fn setup_mon(layout: &Layout) -> Result<()> {
    let done = layout.mon_data.join("done");
    host::unless_exists(&done, || {
        let fsid = fsid()?;
        let ip = host::my_ip();
        host::unless_exists(Path::new(MONMAP), || {
            runner::run(
                "monmaptool",
                &[
                    "--create",
                    "--add",
                    &layout.fqdn,
                    &ip,
                    "--fsid",
                    &fsid,
                    MONMAP,
                ],
            )
            .map(drop)
        })?;
        runner::sudo(
            "ceph-mon",
            &[
                "--mkfs",
                "--id",
                &layout.fqdn,
                "--cluster",
                CLUSTER,
                "--monmap",
                MONMAP,
                "--keyring",
                MON_KEYRING,
            ],
            Some("ceph"),
        )?;
        touch(&done)?;
        runner::restart_service(&format!("ceph-mon@{}", layout.fqdn))
    })
}

fn setup_mgr(layout: &Layout) -> Result<()> {
    let done = layout.mgr_data.join("done");
    host::unless_exists(&done, || {
        runner::restart_service(&format!("ceph-mgr@{}", layout.fqdn))?;
        touch(&done)
    })
}

fn touch(path: &Path) -> Result<()> {
    fs::write(path, "").with_context(|| format!("Failed to create {}", path.display()))
}

fn setup_loop_device(backing: &Path) -> Result<String> {
    fs::create_dir_all(LOOP_DEVICE_DIR)
        .with_context(|| format!("Failed to create {LOOP_DEVICE_DIR}"))?;
    let of = format!("of={}", backing.display());
    let bs = format!("bs={BLOCK_SIZE}");
    let count = format!("count={}", OSD_SIZE_GB * 1024 * 1024 * 1024 / BLOCK_SIZE);
    runner::run("dd", &["if=/dev/zero", &of, &bs, &count])?;
    let device = runner::run("losetup", &["--show", "--find", &backing.to_string_lossy()])?
        .trim()
        .to_string();
    log::debug!("Created loop device {device}");
    Ok(device)
}

fn setup_osd(id: u32, backing: &Path) -> Result<()> {
    let device = setup_loop_device(backing)?;
    runner::run("wipefs", &["--all", &device])?;
    runner::run("sgdisk", &["--zap-all", &device])?;
    runner::run(
        "ceph-volume",
        &["raw", "prepare", "--bluestore", "--data", &device],
    )?;

    let id_str = id.to_string();
    if let Err(e) = runner::run("ceph-volume", &["raw", "activate", "--osd-id", &id_str]) {
        let systemd_unsupported = runner::stderr_of(&e)
            .is_some_and(|s| s.contains("systemd support not yet implemented"));
        if !systemd_unsupported {
            log::error!("Failed to activate osd {id}: {e:#}");
            return Err(e);
        }
        host::unless_exists(Path::new(OSD_UNIT), || {
            fs::write(OSD_UNIT, OSD_UNIT_TEMPLATE).with_context(|| format!("Failed to write {OSD_UNIT}"))
        })?;
        runner::run(
            "ceph-volume",
            &["raw", "activate", "--osd-id", &id_str, "--no-systemd"],
        )?;
    }
    runner::restart_service(&format!("ceph-osd@{id}"))
}

/// Ensure an RBD pool exists
pub fn ensure_pool(name: &str) -> Result<String> {
    let pools = runner::run("ceph", &["osd", "pool", "ls"])?;
    if !pools.lines().any(|p| p.trim() == name) {
        runner::run("ceph", &["osd", "pool", "create", name, "32"])?;
    }
    Ok(name.to_string())
}

/// Ensure a cephx client named after `pool` with RBD rights on it
///
/// The keyring is owned by `owner` when given, and readable by it only.
pub fn ensure_authenticate(pool: &str, owner: Option<&str>) -> Result<PathBuf> {
    let keyring = PathBuf::from(format!("/etc/ceph/ceph.client.{pool}.keyring"));
    if keyring.exists() {
        return Ok(keyring);
    }
    let client = format!("client.{pool}");
    let osd_cap = format!("profile rbd pool={pool}");
    create_keyring(&keyring, &client, &[("mon", "profile rbd"), ("osd", osd_cap.as_str())])?;
    runner::run("ceph", &["auth", "import", "-i", &keyring.to_string_lossy()])?;
    if let Some(owner) = owner {
        host::chown(&keyring, owner)?;
    }
    fs::set_permissions(&keyring, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to restrict {}", keyring.display()))?;
    Ok(keyring)
}

/// Secret key of a cephx client
pub fn get_key(user: &str) -> Result<String> {
    let client = format!("client.{user}");
    Ok(runner::run("ceph", &["auth", "get-key", &client])?
        .trim()
        .to_string())
}
