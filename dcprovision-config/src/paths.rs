use camino::{Utf8Path, Utf8PathBuf};

use crate::ConfigFile;

/// Every file and database location a provisioning run touches
///
/// Derived once from the configuration and the DNS domain, then passed unchanged through
/// the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionPaths {
    /// The server configuration file
    pub config_file: Utf8PathBuf,
    /// The directory holding provisioning templates
    pub setup_dir: Utf8PathBuf,
    /// The directory holding databases and keytabs
    pub private_dir: Utf8PathBuf,
    /// The directory for lock files and run-time state
    pub lock_dir: Utf8PathBuf,
    /// The registry hive database
    pub hklm: Utf8PathBuf,
    /// The SAM database
    pub samdb: Utf8PathBuf,
    /// The secrets database
    pub secrets: Utf8PathBuf,
    /// The machine keytab
    pub keytab: Utf8PathBuf,
    /// The keytab of the DNS service account
    pub dns_keytab: Utf8PathBuf,
    /// The DNS zone file
    pub dns: Utf8PathBuf,
    /// The base entries for a delegated LDAP backend
    pub ldap_basedn_ldif: Utf8PathBuf,
    /// The configuration partition base entry for a delegated LDAP backend
    pub ldap_config_basedn_ldif: Utf8PathBuf,
    /// The schema partition base entry for a delegated LDAP backend
    pub ldap_schema_basedn_ldif: Utf8PathBuf,
    /// The sysvol share
    pub sysvol: Utf8PathBuf,
    /// The netlogon share
    pub netlogon: Utf8PathBuf,
}

impl ProvisionPaths {
    /// Derives every path from the configuration loaded from `config_file`
    pub fn new(config_file: impl AsRef<Utf8Path>, config: &ConfigFile, dnsdomain: &str) -> Self {
        let private = |name: &str| config.private_dir.join(name);
        let sysvol = config
            .sysvol
            .clone()
            .unwrap_or_else(|| config.lock_dir.join("sysvol"));
        let netlogon = config
            .netlogon
            .clone()
            .unwrap_or_else(|| sysvol.join(dnsdomain).join("scripts"));
        ProvisionPaths {
            config_file: config_file.as_ref().to_owned(),
            setup_dir: config.setup_dir.clone(),
            private_dir: config.private_dir.clone(),
            lock_dir: config.lock_dir.clone(),
            hklm: private("hklm.ldb"),
            samdb: config
                .sam_database
                .clone()
                .unwrap_or_else(|| private("sam.ldb")),
            secrets: config
                .secrets_database
                .clone()
                .unwrap_or_else(|| private("secrets.ldb")),
            keytab: private("secrets.keytab"),
            dns_keytab: private("dns.keytab"),
            dns: private(&format!("{dnsdomain}.zone")),
            ldap_basedn_ldif: private(&format!("{dnsdomain}.ldif")),
            ldap_config_basedn_ldif: private(&format!("{dnsdomain}-config.ldif")),
            ldap_schema_basedn_ldif: private(&format!("{dnsdomain}-schema.ldif")),
            sysvol,
            netlogon,
        }
    }

    /// The path of a template within the setup directory
    pub fn setup_file(&self, name: &str) -> Utf8PathBuf {
        self.setup_dir.join(name)
    }
}
