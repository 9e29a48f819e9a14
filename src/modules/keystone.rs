//! Keystone identity service, plus the `openstack` CLI helpers other
//! modules use to register themselves.

use super::mysql;
use super::utils::{self, REGION, SERVICE_PASSWORD, Settings};
use crate::host;
use crate::paths;
use crate::runner::{self, CommandError, RunOptions};
use anyhow::{Context, Result};
use stackgraph::ModuleSpec;

const CONF: &str = "/etc/keystone/keystone.conf";
const ADMIN_PASSWORD: &str = "changeme";
pub const SERVICE_DOMAIN: &str = "service";
pub const SERVICE_PROJECT: &str = "service";
const DEFAULT_DOMAIN: &str = "Default";
const ADMIN_ROLE: &str = "admin";
const AUTH_RC: &str = "~/auth.rc";

pub fn spec() -> ModuleSpec {
    ModuleSpec::new()
        .requires(&["mysql"])
        .packages(&["keystone", "apache2", "libapache2-mod-wsgi-py3"])
        .logs(&["/var/log/keystone/"])
        .setup(setup)
}

fn setup() -> Result<()> {
    let (db_user, db_pass) = mysql::ensure_service("keystone")?;
    utils::single_wsgi_process("keystone-public", "/etc/apache2/sites-enabled/keystone.conf")?;
    Settings::new()
        .set(
            "database",
            "connection",
            mysql::connection_string("keystone", &db_user, &db_pass),
        )
        .set("database", "max_pool_size", "1")
        .set("token", "provider", "fernet")
        .apply(CONF)?;

    log::debug!("Running keystone-manage db_sync...");
    runner::sudo(
        "keystone-manage",
        &["--config-dir", "/etc/keystone", "db_sync"],
        Some("keystone"),
    )?;

    log::debug!("Bootstrapping keystone...");
    for step in ["fernet_setup", "credential_setup"] {
        runner::run(
            "keystone-manage",
            &[step, "--keystone-user", "keystone", "--keystone-group", "keystone"],
        )?;
    }
    let url = auth_url()?;
    runner::run(
        "keystone-manage",
        &[
            "bootstrap",
            "--bootstrap-password",
            ADMIN_PASSWORD,
            "--bootstrap-admin-url",
            &url,
            "--bootstrap-internal-url",
            &url,
            "--bootstrap-public-url",
            &url,
            "--bootstrap-region-id",
            REGION,
        ],
    )?;
    utils::restart_apache()?;

    let rc = auth_rc(&auth_env()?);
    println!("{rc}");
    let rc_path = paths::expand(AUTH_RC);
    std::fs::write(&rc_path, rc)
        .with_context(|| format!("Failed to write {}", rc_path.display()))?;

    let domain = ensure_domain(SERVICE_DOMAIN)?;
    ensure_project(SERVICE_PROJECT, &domain)?;
    ensure_role("_member_")?;
    Ok(())
}

// ============================================================================
// Credentials
// ============================================================================

/// Public identity endpoint
pub fn auth_url() -> Result<String> {
    Ok(format!("http://{}:5000/v3/", host::fqdn()?))
}

/// Admin credentials as `OS_*` environment variables
pub fn auth_env() -> Result<Vec<(String, String)>> {
    let pairs = [
        ("OS_USERNAME", "admin".to_string()),
        ("OS_PASSWORD", ADMIN_PASSWORD.to_string()),
        ("OS_PROJECT_NAME", "admin".to_string()),
        ("OS_USER_DOMAIN_NAME", DEFAULT_DOMAIN.to_string()),
        ("OS_PROJECT_DOMAIN_NAME", DEFAULT_DOMAIN.to_string()),
        ("OS_AUTH_URL", auth_url()?),
        ("OS_IDENTITY_API_VERSION", "3".to_string()),
        ("OS_REGION_NAME", REGION.to_string()),
    ];
    Ok(pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect())
}

fn auth_rc(env: &[(String, String)]) -> String {
    env.iter()
        .map(|(k, v)| format!("export {k}={v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keystone credentials for a service account, for `[placement]`-style sections
pub fn account_settings(service: &str, password: &str) -> Result<Vec<(&'static str, String)>> {
    Ok(vec![
        ("auth_url", auth_url()?),
        ("auth_type", "password".to_string()),
        ("project_domain_name", SERVICE_DOMAIN.to_string()),
        ("user_domain_name", SERVICE_DOMAIN.to_string()),
        ("project_name", SERVICE_PROJECT.to_string()),
        ("username", service.to_string()),
        ("password", password.to_string()),
        ("region_name", REGION.to_string()),
    ])
}

/// `[keystone_authtoken]` settings for a service account
pub fn authtoken_settings(service: &str, password: &str) -> Result<Vec<(&'static str, String)>> {
    let mut settings = account_settings(service, password)?;
    settings.extend([
        ("www_authenticate_uri", auth_url()?),
        ("service_token_roles", ADMIN_ROLE.to_string()),
        ("service_token_roles_required", "true".to_string()),
    ]);
    Ok(settings)
}

// ============================================================================
// openstack CLI
// ============================================================================

fn openstack_with(args: &[&str], quiet: bool) -> Result<String> {
    let env = auth_env()?;
    runner::run_with(
        "openstack",
        args,
        RunOptions {
            env: &env,
            cwd: None,
            quiet,
        },
    )
}

/// Run the `openstack` client as the admin user
pub fn openstack(args: &[&str]) -> Result<String> {
    openstack_with(args, false)
}

/// Look up a single field of an object; `None` if it does not exist
pub fn show_field(args: &[&str], field: &str) -> Result<Option<String>> {
    let mut full = args.to_vec();
    full.extend(["-f", "value", "-c", field]);
    match openstack_with(&full, true) {
        Ok(out) => Ok(Some(out.trim().to_string()).filter(|v| !v.is_empty())),
        Err(e) if e.downcast_ref::<CommandError>().is_some() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Id of an object, or `None` if it does not exist
pub fn find_id(args: &[&str]) -> Result<Option<String>> {
    show_field(args, "id")
}

/// Create an object and return its id
pub fn create_id(args: &[&str]) -> Result<String> {
    let mut full = args.to_vec();
    full.extend(["-f", "value", "-c", "id"]);
    Ok(openstack(&full)?.trim().to_string())
}

fn require_id(kind: &str, args: &[&str]) -> Result<String> {
    let name = args.get(2).copied().unwrap_or_default();
    find_id(args)?.with_context(|| format!("{kind} {name:?} not found"))
}

// ============================================================================
// Identity objects
// ============================================================================

pub fn ensure_domain(name: &str) -> Result<String> {
    log::debug!("Ensuring domain {name:?} exists...");
    if let Some(id) = find_id(&["domain", "show", name])? {
        return Ok(id);
    }
    log::debug!("Creating domain {name:?}...");
    create_id(&["domain", "create", name])
}

pub fn ensure_project(name: &str, domain: &str) -> Result<String> {
    log::debug!("Ensuring project {name:?} exists...");
    if let Some(id) = find_id(&["project", "show", name, "--domain", domain])? {
        return Ok(id);
    }
    log::debug!("Creating project {name:?}...");
    create_id(&["project", "create", name, "--domain", domain])
}

pub fn ensure_role(name: &str) -> Result<String> {
    log::debug!("Ensuring role {name:?} exists...");
    if let Some(id) = find_id(&["role", "show", name])? {
        return Ok(id);
    }
    log::debug!("Creating role {name:?}...");
    create_id(&["role", "create", name])
}

pub fn ensure_user(name: &str, password: &str, domain: &str) -> Result<String> {
    log::debug!("Ensuring user {name:?} exists...");
    if let Some(id) = find_id(&["user", "show", name, "--domain", domain])? {
        return Ok(id);
    }
    log::debug!("Creating user {name:?}...");
    create_id(&["user", "create", name, "--domain", domain, "--password", password])
}

pub fn ensure_service(name: &str, service_type: &str) -> Result<String> {
    log::debug!("Ensuring service {name:?} exists...");
    if let Some(id) = find_id(&["service", "show", name])? {
        return Ok(id);
    }
    log::debug!("Creating service {name:?}...");
    create_id(&["service", "create", "--name", name, service_type])
}

/// Ensure public, internal and admin endpoints for a service
pub fn ensure_endpoint(service: &str, url: &str) -> Result<()> {
    log::debug!("Ensuring endpoints for {service:?} exist...");
    let existing = openstack(&[
        "endpoint", "list", "--service", service, "--region", REGION, "-f", "value", "-c",
        "Interface",
    ])?;
    for interface in missing_interfaces(&existing) {
        log::debug!("Creating endpoint {service:?}:{interface}...");
        openstack(&[
            "endpoint", "create", "--region", REGION, service, interface, url,
        ])?;
    }
    Ok(())
}

fn missing_interfaces(listing: &str) -> Vec<&'static str> {
    let present: Vec<&str> = listing.lines().map(str::trim).collect();
    ["public", "internal", "admin"]
        .into_iter()
        .filter(|i| !present.contains(i))
        .collect()
}

pub fn grant_project_role(user: &str, role: &str, project: &str) -> Result<()> {
    log::debug!("Granting role {role:?} on project {project:?} to user {user:?}...");
    openstack(&["role", "add", "--project", project, "--user", user, role])?;
    Ok(())
}

pub fn grant_domain_role(user: &str, role: &str, domain: &str) -> Result<()> {
    log::debug!("Granting role {role:?} on domain {domain:?} to user {user:?}...");
    openstack(&["role", "add", "--domain", domain, "--user", user, role])?;
    Ok(())
}

/// Make `user` an admin of `project`
pub fn ensure_admin(user: &str, project: &str) -> Result<()> {
    grant_project_role(user, ADMIN_ROLE, project)
}

pub fn admin_role() -> &'static str {
    ADMIN_ROLE
}

pub fn service_domain() -> Result<String> {
    require_id("Domain", &["domain", "show", SERVICE_DOMAIN])
}

pub fn default_domain() -> Result<String> {
    require_id("Domain", &["domain", "show", DEFAULT_DOMAIN])
}

pub fn service_project() -> Result<String> {
    let domain = service_domain()?;
    require_id(
        "Project",
        &["project", "show", SERVICE_PROJECT, "--domain", &domain],
    )
}

pub fn admin_user() -> Result<String> {
    let domain = default_domain()?;
    require_id("User", &["user", "show", "admin", "--domain", &domain])
}

/// Register a service: account in the service project, catalog entry and
/// endpoints
///
/// Returns the account's `(username, password)`.
pub fn ensure_service_account(
    name: &str,
    service_type: &str,
    url: &str,
) -> Result<(String, String)> {
    let user = ensure_user(name, SERVICE_PASSWORD, &service_domain()?)?;
    ensure_admin(&user, &service_project()?)?;
    let service = ensure_service(name, service_type)?;
    ensure_endpoint(&service, url)?;
    Ok((name.to_string(), SERVICE_PASSWORD.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_rc() {
        let env = vec![
            ("OS_USERNAME".to_string(), "admin".to_string()),
            ("OS_REGION_NAME".to_string(), REGION.to_string()),
        ];
        assert_eq!(
            auth_rc(&env),
            "export OS_USERNAME=admin\nexport OS_REGION_NAME=AutoPkgOne"
        );
    }

    #[test]
    fn test_missing_interfaces() {
        assert_eq!(missing_interfaces(""), ["public", "internal", "admin"]);
        assert_eq!(missing_interfaces("public\nadmin\n"), ["internal"]);
        assert!(missing_interfaces("admin\ninternal\npublic\n").is_empty());
    }

    #[test]
    fn test_spec_requires_mysql() {
        let spec = spec();
        assert_eq!(spec.dependencies, ["mysql"]);
        assert!(spec.setup.is_some());
        assert!(spec.packages.iter().any(|p| p == "keystone"));
    }
}
