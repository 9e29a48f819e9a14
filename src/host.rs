//! Facts about the host the stack is deployed on.
//!
//! Lookups that shell out are cached for the life of the process.

use crate::runner;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Instant;

static FQDN: OnceLock<String> = OnceLock::new();
static DEFAULT_ROUTE: OnceLock<Option<(Ipv4Addr, u8)>> = OnceLock::new();

const FALLBACK_IP: Ipv4Addr = Ipv4Addr::LOCALHOST;
const FALLBACK_PREFIX: u8 = 8;

/// Fully qualified host name
pub fn fqdn() -> Result<String> {
    if let Some(fqdn) = FQDN.get() {
        return Ok(fqdn.clone());
    }
    let fqdn = runner::run("hostname", &["-f"])?.trim().to_string();
    Ok(FQDN.get_or_init(|| fqdn).clone())
}

/// IPv4 address of the default route interface, or loopback
pub fn my_ip() -> String {
    default_route_addr()
        .map_or(FALLBACK_IP, |(ip, _)| ip)
        .to_string()
}

/// Network of the default route interface in CIDR form, or loopback's
pub fn my_network() -> String {
    let (ip, prefix) = default_route_addr().unwrap_or((FALLBACK_IP, FALLBACK_PREFIX));
    network_of(ip, prefix)
}

fn default_route_addr() -> Option<(Ipv4Addr, u8)> {
    *DEFAULT_ROUTE.get_or_init(|| match lookup_default_route_addr() {
        Ok(addr) => Some(addr),
        Err(e) => {
            log::warn!("Failed to get local IP by default route: {e:#}");
            None
        }
    })
}

#[derive(Debug, Deserialize)]
struct Route {
    dev: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(default)]
    addr_info: Vec<AddrInfo>,
}

#[derive(Debug, Deserialize)]
struct AddrInfo {
    family: String,
    local: String,
    prefixlen: u8,
}

fn lookup_default_route_addr() -> Result<(Ipv4Addr, u8)> {
    let routes = runner::run("ip", &["-j", "-4", "route", "show", "default"])?;
    let dev = parse_default_dev(&routes)?;
    let addrs = runner::run("ip", &["-j", "-4", "addr", "show", "dev", &dev])?;
    parse_inet_addr(&addrs)
}

fn parse_default_dev(json: &str) -> Result<String> {
    let routes: Vec<Route> = serde_json::from_str(json).context("Invalid `ip route` output")?;
    routes
        .into_iter()
        .next()
        .map(|r| r.dev)
        .context("No default route")
}

fn parse_inet_addr(json: &str) -> Result<(Ipv4Addr, u8)> {
    parse_inet_addrs(json)?
        .into_iter()
        .next()
        .context("Default route interface has no IPv4 address")
}

fn parse_inet_addrs(json: &str) -> Result<Vec<(Ipv4Addr, u8)>> {
    let links: Vec<Link> = serde_json::from_str(json).context("Invalid `ip addr` output")?;
    links
        .iter()
        .flat_map(|l| &l.addr_info)
        .filter(|a| a.family == "inet")
        .map(|a| {
            let ip = a
                .local
                .parse()
                .with_context(|| format!("Invalid address {:?}", a.local))?;
            Ok((ip, a.prefixlen))
        })
        .collect()
}

/// IPv4 addresses assigned to `dev`
pub fn interface_addrs(dev: &str) -> Result<Vec<(Ipv4Addr, u8)>> {
    let json = runner::run("ip", &["-j", "-4", "addr", "show", "dev", dev])?;
    parse_inet_addrs(&json)
}

/// Network address of `ip/prefix`, in CIDR form
pub fn network_of(ip: Ipv4Addr, prefix: u8) -> String {
    let prefix = prefix.min(32);
    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    };
    let network = Ipv4Addr::from(u32::from(ip) & mask);
    format!("{network}/{prefix}")
}

/// Parse an IPv4 CIDR into its network address and prefix length
pub fn parse_cidr(cidr: &str) -> Result<(Ipv4Addr, u8)> {
    let (addr, prefix) = cidr
        .split_once('/')
        .with_context(|| format!("Invalid CIDR {cidr:?}"))?;
    let addr: Ipv4Addr = addr
        .parse()
        .with_context(|| format!("Invalid address in {cidr:?}"))?;
    let prefix: u8 = prefix
        .parse()
        .ok()
        .filter(|p| *p <= 32)
        .with_context(|| format!("Invalid prefix in {cidr:?}"))?;
    Ok((addr, prefix))
}

/// Usable host addresses of a CIDR: `(first, last)`
pub fn host_range(cidr: &str) -> Result<(Ipv4Addr, Ipv4Addr)> {
    let (addr, prefix) = parse_cidr(cidr)?;
    if prefix > 30 {
        anyhow::bail!("Network {cidr} is too small");
    }
    let network = u32::from(addr) & (u32::MAX << (32 - u32::from(prefix)));
    let broadcast = network | !(u32::MAX << (32 - u32::from(prefix)));
    Ok((Ipv4Addr::from(network + 1), Ipv4Addr::from(broadcast - 1)))
}

// ============================================================================
// Release / architecture
// ============================================================================

/// Ubuntu release codename (`noble`, ...)
pub fn release() -> Result<String> {
    let content =
        std::fs::read_to_string("/etc/os-release").context("Could not read /etc/os-release")?;
    parse_codename(&content).context("No VERSION_CODENAME in /etc/os-release")
}

fn parse_codename(os_release: &str) -> Option<String> {
    os_release.lines().find_map(|line| {
        line.strip_prefix("VERSION_CODENAME=")
            .map(|v| v.trim().trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Debian architecture name of this machine
pub fn machine() -> &'static str {
    debian_arch(std::env::consts::ARCH)
}

fn debian_arch(arch: &'static str) -> &'static str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64el",
        "arm" => "armhf",
        other => other,
    }
}

// ============================================================================
// Helpers for setup procedures
// ============================================================================

/// Run `f`, logging how long it took
pub fn measure<T>(section: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let start = Instant::now();
    let result = f();
    log::info!(
        "{}: {}",
        section,
        crate::ui::format_duration(start.elapsed())
    );
    result
}

/// Run `f` unless `marker` already exists
pub fn unless_exists(marker: &Path, f: impl FnOnce() -> Result<()>) -> Result<()> {
    if marker.exists() {
        log::debug!("{} exists, skipping", marker.display());
        return Ok(());
    }
    f()
}

/// Read a UUID from `path`, generating and storing one on first use
pub fn persistent_uuid(path: &Path) -> Result<String> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        return Ok(content.trim().to_string());
    }
    let id = uuid::Uuid::new_v4().to_string();
    std::fs::write(path, &id).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(id)
}

/// Give `path` to `owner` (`user` or `user:group`)
pub fn chown(path: &Path, owner: &str) -> Result<()> {
    let path = path.to_string_lossy();
    runner::run("chown", &[owner, &path])?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_of() {
        assert_eq!(network_of(Ipv4Addr::new(10, 20, 30, 40), 24), "10.20.30.0/24");
        assert_eq!(network_of(Ipv4Addr::new(172, 16, 5, 9), 12), "172.16.0.0/12");
        assert_eq!(network_of(Ipv4Addr::LOCALHOST, 8), "127.0.0.0/8");
        assert_eq!(network_of(Ipv4Addr::new(1, 2, 3, 4), 0), "0.0.0.0/0");
    }

    #[test]
    fn test_host_range() {
        let (first, last) = host_range("10.127.147.0/24").unwrap();
        assert_eq!(first, Ipv4Addr::new(10, 127, 147, 1));
        assert_eq!(last, Ipv4Addr::new(10, 127, 147, 254));
        assert!(host_range("10.0.0.0/31").is_err());
        assert!(host_range("10.0.0.0").is_err());
        assert!(host_range("10.0.0.0/40").is_err());
    }

    #[test]
    fn test_parse_ip_json() {
        let routes = r#"[{"dst":"default","gateway":"192.168.1.1","dev":"enp5s0","protocol":"dhcp","flags":[]}]"#;
        assert_eq!(parse_default_dev(routes).unwrap(), "enp5s0");
        assert!(parse_default_dev("[]").is_err());

        let addrs = r#"[{"ifindex":2,"ifname":"enp5s0","addr_info":[{"family":"inet","local":"192.168.1.23","prefixlen":24,"scope":"global"}]}]"#;
        assert_eq!(
            parse_inet_addr(addrs).unwrap(),
            (Ipv4Addr::new(192, 168, 1, 23), 24)
        );
        assert!(parse_inet_addr(r#"[{"ifindex":2}]"#).is_err());

        let two = r#"[{"addr_info":[{"family":"inet","local":"10.127.147.1","prefixlen":24},{"family":"inet","local":"10.0.0.9","prefixlen":8}]}]"#;
        assert_eq!(parse_inet_addrs(two).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_codename() {
        let os_release = "NAME=\"Ubuntu\"\nVERSION_ID=\"24.04\"\nVERSION_CODENAME=noble\n";
        assert_eq!(parse_codename(os_release).as_deref(), Some("noble"));
        assert_eq!(parse_codename("NAME=Debian\n"), None);
        assert_eq!(parse_codename("VERSION_CODENAME=\"\"\n"), None);
    }

    #[test]
    fn test_debian_arch() {
        assert_eq!(debian_arch("x86_64"), "amd64");
        assert_eq!(debian_arch("aarch64"), "arm64");
        assert_eq!(debian_arch("s390x"), "s390x");
    }

    #[test]
    fn test_persistent_uuid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fsid");
        let first = persistent_uuid(&path).unwrap();
        let second = persistent_uuid(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 36);
    }

    #[test]
    fn test_unless_exists() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("done");
        let mut runs = 0;
        unless_exists(&marker, || {
            runs += 1;
            std::fs::write(&marker, "").map_err(Into::into)
        })
        .unwrap();
        unless_exists(&marker, || {
            runs += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(runs, 1);
    }
}
