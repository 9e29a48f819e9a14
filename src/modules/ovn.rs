//! OVN central databases, the local chassis and the external bridge.

use crate::host;
use crate::runner;
use anyhow::{Context, Result};
use stackgraph::ModuleSpec;
use std::fs;

pub const EXTERNAL_BRIDGE: &str = "br-ex";
pub const EXTERNAL_CIDR: &str = "10.127.147.0/24";
pub const PHYSNET: &str = "physnet1";

const SYSTEM_ID: &str = "/etc/openvswitch/system-id.conf";
const OVS_DEFAULTS: &str = "/etc/default/openvswitch-switch";
const OVN_DEFAULTS: &str = "/etc/default/ovn-central";
const NAT_COMMENT: &str = "ovn-external-bridge";

pub fn spec() -> ModuleSpec {
    ModuleSpec::new()
        .packages(&["ovn-central", "openvswitch-switch", "ovn-host"])
        .logs(&["/var/log/ovn/"])
        .setup(setup)
}

pub fn ovsdb_connection() -> String {
    format!("tcp:{}:6640", host::my_ip())
}

pub fn ovnnb_connection() -> String {
    format!("tcp:{}:6641", host::my_ip())
}

pub fn ovnsb_connection() -> String {
    format!("tcp:{}:6642", host::my_ip())
}

fn ovs_ctl_opts(ip: &str) -> String {
    format!("OVS_CTL_OPTS=--ovsdb-server-options='--remote=ptcp:6640:{ip}'")
}

fn ovn_ctl_opts(ip: &str) -> String {
    format!(
        "OVN_CTL_OPTS=--db-nb-addr={ip} \\\n  \
         --db-sb-addr={ip} \\\n  \
         --db-nb-cluster-local-addr={ip} \\\n  \
         --db-sb-cluster-local-addr={ip} \\\n  \
         --db-nb-create-insecure-remote=yes \\\n  \
         --db-sb-create-insecure-remote=yes \\\n  \
         --ovn-northd-nb-db=tcp:{ip}:6641 \\\n  \
         --ovn-northd-sb-db=tcp:{ip}:6642 \\\n"
    )
}

fn write(path: &str, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("Failed to write {path}"))
}

fn setup() -> Result<()> {
    let system_id = host::fqdn()?;
    let ip = host::my_ip();
    write(SYSTEM_ID, &system_id)?;
    write(OVS_DEFAULTS, &ovs_ctl_opts(&ip))?;
    write(OVN_DEFAULTS, &ovn_ctl_opts(&ip))?;
    runner::restart_service("ovn-central")?;
    runner::restart_service("openvswitch-switch")?;

    let encap_ip = format!("external_ids:ovn-encap-ip={ip}");
    let system = format!("external_ids:system-id={system_id}");
    let remote = format!("external_ids:ovn-remote={}", ovnsb_connection());
    set_open_vswitch(&[
        "external_ids:ovn-encap-type=geneve",
        &encap_ip,
        &system,
        "external_ids:ovn-match-northd-version=true",
        &remote,
    ])?;
    runner::run(
        "ovs-vsctl",
        &[
            "--retry",
            "--may-exist",
            "add-br",
            EXTERNAL_BRIDGE,
            "--",
            "set",
            "bridge",
            EXTERNAL_BRIDGE,
            "datapath_type=system",
            "protocols=OpenFlow13,OpenFlow15",
        ],
    )?;
    let mappings = format!("external_ids:ovn-bridge-mappings={PHYSNET}:{EXTERNAL_BRIDGE}");
    set_open_vswitch(&[&mappings, "external_ids:ovn-cms-options=enable-chassis-as-gw"])?;

    configure_external_bridge()?;
    ensure_masquerade(EXTERNAL_CIDR, NAT_COMMENT)
}

/// One `ovs-vsctl` transaction setting columns on the Open_vSwitch record
fn set_open_vswitch(columns: &[&str]) -> Result<()> {
    runner::run("ovs-vsctl", &open_vswitch_args(columns))?;
    Ok(())
}

fn open_vswitch_args<'a>(columns: &[&'a str]) -> Vec<&'a str> {
    let mut args = vec!["--retry"];
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            args.push("--");
        }
        args.extend(["set", "open", ".", column]);
    }
    args
}

/// Give the external bridge the first host address of the external network
fn configure_external_bridge() -> Result<()> {
    let (gateway, _) = host::host_range(EXTERNAL_CIDR)?;
    let (_, prefix) = host::parse_cidr(EXTERNAL_CIDR)?;
    let assigned = host::interface_addrs(EXTERNAL_BRIDGE)?;
    if assigned.iter().any(|(ip, p)| *ip == gateway && *p == prefix) {
        log::debug!("{EXTERNAL_BRIDGE} already has {gateway}/{prefix}");
        return Ok(());
    }
    let address = format!("{gateway}/{prefix}");
    runner::run("ip", &["addr", "add", &address, "dev", EXTERNAL_BRIDGE])?;
    runner::run("ip", &["link", "set", EXTERNAL_BRIDGE, "up"])?;
    Ok(())
}

fn masquerade_rule<'a>(cidr: &'a str, comment: &'a str) -> [&'a str; 12] {
    [
        "POSTROUTING",
        "-w",
        "-t",
        "nat",
        "-s",
        cidr,
        "-j",
        "MASQUERADE",
        "-m",
        "comment",
        "--comment",
        comment,
    ]
}

/// Whether `iptables --check` failed because the rule is absent
fn is_missing_rule(code: Option<i32>, stderr: &str) -> bool {
    code == Some(1) && stderr.contains("No") && stderr.contains("match by that name")
}

/// Add a NAT rule letting `cidr` reach the outside, unless present
fn ensure_masquerade(cidr: &str, comment: &str) -> Result<()> {
    const IPTABLES: &str = "iptables-legacy";
    let rule = masquerade_rule(cidr, comment);

    let mut check = vec!["--check"];
    check.extend(rule);
    let found = match runner::probe(IPTABLES, &check) {
        Ok(_) => {
            log::debug!("Found existing postrouting rule for {cidr}");
            true
        }
        Err(e) => {
            let stderr = runner::stderr_of(&e).unwrap_or_default();
            if is_missing_rule(runner::exit_code(&e), stderr) {
                log::debug!("Postrouting iptable rule for {cidr} missing");
            } else {
                log::warn!("Failed to lookup postrouting iptable rule for {cidr}");
            }
            false
        }
    };
    if !found {
        log::debug!("Adding postrouting iptable rule for {cidr}");
        let mut append = vec!["--append"];
        append.extend(rule);
        runner::run(IPTABLES, &append)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_vswitch_args() {
        assert_eq!(
            open_vswitch_args(&["a=1", "b=2"]),
            ["--retry", "set", "open", ".", "a=1", "--", "set", "open", ".", "b=2"]
        );
        assert_eq!(open_vswitch_args(&[]), ["--retry"]);
    }

    #[test]
    fn test_ctl_opts() {
        assert_eq!(
            ovs_ctl_opts("10.0.0.5"),
            "OVS_CTL_OPTS=--ovsdb-server-options='--remote=ptcp:6640:10.0.0.5'"
        );
        let ovn = ovn_ctl_opts("10.0.0.5");
        assert!(ovn.starts_with("OVN_CTL_OPTS=--db-nb-addr=10.0.0.5 \\\n"));
        assert!(ovn.contains("--ovn-northd-sb-db=tcp:10.0.0.5:6642"));
    }

    #[test]
    fn test_is_missing_rule() {
        let stderr = "iptables: Bad rule (does a matching rule exist in that chain?).\n";
        assert!(!is_missing_rule(Some(1), stderr));
        let stderr = "iptables-legacy: No chain/target/match by that name.\n";
        assert!(is_missing_rule(Some(1), stderr));
        assert!(!is_missing_rule(Some(2), stderr));
    }

    #[test]
    fn test_masquerade_rule() {
        let rule = masquerade_rule(EXTERNAL_CIDR, NAT_COMMENT);
        assert_eq!(rule[5], "10.127.147.0/24");
        assert_eq!(rule[11], "ovn-external-bridge");
    }
}
