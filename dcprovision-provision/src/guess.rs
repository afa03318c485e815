use std::{
    net::{IpAddr, Ipv4Addr, ToSocketAddrs},
    sync::LazyLock,
};

use anyhow::Context as _;
use chrono::Utc;
use dcprovision_config::{NameMap, ServerRole};
use dcprovision_template::Context;
use regex::Regex;

use crate::{
    nss::{NameService, IDENTITY_ROLES},
    secrets::{encode_secret, random_domain_sid, random_guid, random_password},
    time::{datestring, ldaptime, nttime},
    ProvisionError,
};

/// The longest NetBIOS name accepted
pub const NETBIOS_NAME_MAX: usize = 13;

/// The site every new domain controller joins
pub const DEFAULT_SITE: &str = "Default-First-Site-Name";

const NETBIOS_NAME_PATTERN: &str = r"^[[:alnum:] !#$%&'()\-.@^_{}~]+$";
const DNS_DOMAIN_PATTERN: &str = r"^[[:alnum:]]([[:alnum:]-]*[[:alnum:]])?(\.[[:alnum:]]([[:alnum:]-]*[[:alnum:]])?)*$";

static NETBIOS_NAME: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(NETBIOS_NAME_PATTERN));
static DNS_DOMAIN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(DNS_DOMAIN_PATTERN));

/// What the operator asked for; anything left out is derived from the environment
#[derive(Debug, Clone, Default)]
pub struct GuessOptions {
    /// The Kerberos realm
    pub realm: Option<String>,
    /// The NetBIOS domain name (defaults to the first label of the realm)
    pub domain: Option<String>,
    /// The host name (defaults to the system's)
    pub host_name: Option<String>,
    /// The host address (defaults to the first address the host name resolves to)
    pub host_ip: Option<String>,
    /// What this server will be to the domain
    pub server_role: ServerRole,
    /// Local names pinned to identity roles, for example `wheel:admins`
    pub identities: NameMap,
}

/// Checks a NetBIOS name is non-empty, short enough and uses only permitted characters
pub fn valid_netbios_name(name: &str) -> Result<(), ProvisionError> {
    let invalid = |rule: String| ProvisionError::InvalidName {
        name: name.to_owned(),
        rule,
    };
    if name.chars().count() > NETBIOS_NAME_MAX {
        return Err(invalid(format!(
            "must be at most {NETBIOS_NAME_MAX} characters"
        )));
    }
    if !matches_pattern(&NETBIOS_NAME, name)? {
        return Err(invalid("contains characters not permitted in NetBIOS names".into()));
    }
    Ok(())
}

/// Checks a DNS domain is a dot separated list of host name labels
pub fn valid_dns_domain(domain: &str) -> Result<(), ProvisionError> {
    if !matches_pattern(&DNS_DOMAIN, domain)? {
        return Err(ProvisionError::InvalidName {
            name: domain.to_owned(),
            rule: "is not a valid DNS domain".into(),
        });
    }
    Ok(())
}

fn matches_pattern(
    regex: &'static Result<Regex, regex::Error>,
    text: &str,
) -> Result<bool, ProvisionError> {
    let regex = regex
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Compiling name pattern: {e}"))?;
    Ok(regex.is_match(text))
}

/// Derives the base DN of a DNS domain
///
/// ```
/// use dcprovision_provision::base_dn;
///
/// assert_eq!(base_dn("example.com"), "DC=example,DC=com");
/// assert_eq!(base_dn("a.b.c"), "DC=a,DC=b,DC=c");
/// ```
pub fn base_dn(dnsdomain: &str) -> String {
    format!("DC={}", dnsdomain.replace('.', ",DC="))
}

/// Returns the first label of the system host name
pub fn system_host_name() -> Result<String, ProvisionError> {
    let name = nix::unistd::gethostname()
        .context("Reading the system host name")?
        .into_string()
        .map_err(|name| {
            ProvisionError::InsufficientEnvironment(format!(
                "Host name {name:?} is not valid UTF-8"
            ))
        })?;
    first_label(&name)
}

fn first_label(name: &str) -> Result<String, ProvisionError> {
    match name.split('.').next() {
        Some(label) if !label.is_empty() => Ok(label.to_owned()),
        _ => Err(ProvisionError::InsufficientEnvironment(
            "Unable to determine the host name".into(),
        )),
    }
}

/// Resolves the host name to an address, falling back to the loopback address
fn resolve_host_ip(host_name: &str) -> String {
    let resolved = (host_name, 0)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addresses| addresses.find(|a| a.is_ipv4()))
        .map(|address| address.ip());
    match resolved {
        Some(ip) => ip.to_string(),
        None => {
            tracing::warn!(
                "Could not resolve {}, using {} as the host address",
                host_name,
                Ipv4Addr::LOCALHOST
            );
            IpAddr::V4(Ipv4Addr::LOCALHOST).to_string()
        }
    }
}

/// Builds the full context for provisioning a new domain
///
/// Names are normalized (realm and NetBIOS names upper case, DNS names lower case), fresh
/// secrets and identifiers are generated, and each identity role is resolved against `nss`.
/// Timestamps and new GUIDs are bound as generators so every placeholder renders a fresh value.
pub fn guess_configuration(
    options: &GuessOptions,
    nss: &impl NameService,
) -> Result<Context, ProvisionError> {
    let realm = options
        .realm
        .as_deref()
        .filter(|realm| !realm.is_empty())
        .ok_or_else(|| ProvisionError::InsufficientEnvironment("No realm was given".into()))?
        .to_uppercase();
    let dnsdomain = realm.to_lowercase();
    valid_dns_domain(&dnsdomain)?;

    let domain = match options.domain.as_deref() {
        Some(domain) if !domain.is_empty() => domain.to_uppercase(),
        Some(_) => {
            return Err(ProvisionError::InsufficientEnvironment(
                "The workgroup is empty".into(),
            ))
        }
        None => first_label(&realm)?,
    };
    valid_netbios_name(&domain)?;

    let host_name = match options.host_name.as_deref() {
        Some(name) => first_label(name)?,
        None => system_host_name()?,
    }
    .to_lowercase();
    let netbios_name = host_name.to_uppercase();
    valid_netbios_name(&netbios_name)?;

    let host_ip = match options.host_ip.clone() {
        Some(ip) => ip,
        None => resolve_host_ip(&host_name),
    };

    let domaindn = base_dn(&dnsdomain);
    let configdn = format!("CN=Configuration,{domaindn}");
    let schemadn = format!("CN=Schema,{configdn}");
    let rdn_dc = dnsdomain
        .split('.')
        .next()
        .unwrap_or_default()
        .to_owned();

    let mut context = Context::new();
    context.set("REALM", realm.as_str());
    context.set("DOMAIN", domain.as_str());
    context.set("HOSTNAME", host_name.as_str());
    context.set("NETBIOSNAME", netbios_name.as_str());
    context.set("DNSDOMAIN", dnsdomain.as_str());
    context.set("DNSNAME", format!("{host_name}.{dnsdomain}"));
    context.set("DOMAINDN", domaindn.as_str());
    context.set("BASEDN", domaindn.as_str());
    context.set("ROOTDN", domaindn.as_str());
    context.set("CONFIGDN", configdn);
    context.set("SCHEMADN", schemadn);
    context.set("RDN_DC", rdn_dc);
    context.set("HOSTIP", host_ip);
    context.set("DEFAULTSITE", DEFAULT_SITE);
    context.set("SERVERROLE", options.server_role.as_str());
    context.set("VERSION", env!("CARGO_PKG_VERSION"));
    context.set("ACI", "# no aci for local ldb");
    context.set(
        "EXTENSIBLEOBJECT",
        "# no objectClass: extensibleObject for local ldb",
    );

    context.set("DOMAINGUID", random_guid());
    context.set("HOSTGUID", random_guid());
    context.set("INVOCATIONID", random_guid());
    context.set("POLICYGUID", random_guid());
    context.set("DOMAINSID", random_domain_sid());
    for key in ["KRBTGTPASS", "MACHINEPASS", "ADMINPASS", "DNSPASS"] {
        let password = random_password();
        context.set(format!("{key}_B64"), encode_secret(&password));
        context.set(key, password);
    }

    if let Some(unknown) = options
        .identities
        .keys()
        .find(|key| !IDENTITY_ROLES.iter().any(|role| role.name == *key))
    {
        let roles: Vec<&str> = IDENTITY_ROLES.iter().map(|role| role.name).collect();
        return Err(ProvisionError::InvalidConfiguration {
            field: "identities".into(),
            rule: format!("'{unknown}' is not one of {}", roles.join(", ")),
        });
    }
    for role in &IDENTITY_ROLES {
        let name = role.resolve(nss, options.identities.get(role.name))?;
        tracing::debug!("Mapping {} to local name {}", role.name, name);
        context.set(role.key, name);
    }

    context.set_generator("NEWGUID", random_guid);
    context.set_generator("NTTIME", || nttime(Utc::now()).to_string());
    context.set_generator("LDAPTIME", || ldaptime(Utc::now()));
    context.set_generator("DATESTRING", || datestring(Utc::now()));

    tracing::debug!("Guessed configuration\n{}", context);
    Ok(context)
}
