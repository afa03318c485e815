use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use dcprovision_filesystem::Filesystem;
use serde::Deserialize;

use crate::ServerRole;

/// Deserialization of dcprovision.toml, the server configuration
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// The Kerberos realm (DNS domain in upper case)
    pub realm: String,

    /// The NetBIOS domain name
    pub workgroup: String,

    /// The NetBIOS name of this host (defaults to the host name)
    pub netbios_name: Option<String>,

    /// What this server is to the domain
    #[serde(default)]
    pub server_role: ServerRole,

    /// Directory for databases and other private state
    pub private_dir: Utf8PathBuf,

    /// Directory holding the provisioning templates
    pub setup_dir: Utf8PathBuf,

    /// Directory for lock files and run-time state
    pub lock_dir: Utf8PathBuf,

    /// Location of the SAM database (defaults to `sam.ldb` in the private directory)
    pub sam_database: Option<Utf8PathBuf>,

    /// Location of the secrets database (defaults to `secrets.ldb` in the private directory)
    pub secrets_database: Option<Utf8PathBuf>,

    /// The sysvol share (defaults to `sysvol` in the lock directory)
    pub sysvol: Option<Utf8PathBuf>,

    /// The netlogon share (defaults to the scripts directory within sysvol)
    pub netlogon: Option<Utf8PathBuf>,
}

impl ConfigFile {
    /// Load a configuration from the specified file
    pub fn load(filesystem: &impl Filesystem, path: impl AsRef<Utf8Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_context = || format!("Reading config file {path:?}");
        let config_data = filesystem.load(path).with_context(config_context)?;
        config_data.as_str().try_into().with_context(config_context)
    }
}

impl TryFrom<&str> for ConfigFile {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(toml::from_str(value)?)
    }
}

#[cfg(test)]
mod tests {
    use dcprovision_filesystem::MemoryFilesystem;
    use indoc::indoc;

    use super::*;

    const CONFIG: &str = indoc! {r#"
        realm = "EXAMPLE.COM"
        workgroup = "EXAMPLE"
        server_role = "domain controller"
        private_dir = "/var/lib/dcprovision/private"
        setup_dir = "/usr/share/dcprovision/setup"
        lock_dir = "/var/lock/dcprovision"
    "#};

    #[test]
    fn parse_minimal() -> Result<()> {
        let config = ConfigFile::try_from(CONFIG)?;
        assert_eq!(config.realm, "EXAMPLE.COM");
        assert_eq!(config.server_role, ServerRole::DomainController);
        assert_eq!(config.sam_database, None);
        Ok(())
    }

    #[test]
    fn role_defaults_to_domain_controller() -> Result<()> {
        let config = ConfigFile::try_from(indoc! {r#"
            realm = "EXAMPLE.COM"
            workgroup = "EXAMPLE"
            private_dir = "/p"
            setup_dir = "/s"
            lock_dir = "/l"
        "#})?;
        assert_eq!(config.server_role, ServerRole::DomainController);
        Ok(())
    }

    #[test]
    fn load_names_file_on_error() -> Result<()> {
        let mut fs = MemoryFilesystem::new();
        fs.save("/dcprovision.toml", CONFIG, None)?;
        assert_eq!(ConfigFile::load(&fs, "/dcprovision.toml")?.workgroup, "EXAMPLE");

        fs.save("/broken.toml", "realm = ", None)?;
        let err = ConfigFile::load(&fs, "/broken.toml").unwrap_err();
        assert!(err.to_string().contains("/broken.toml"));
        assert!(ConfigFile::load(&fs, "/missing.toml").is_err());
        Ok(())
    }

    #[test]
    fn unknown_role_rejected() {
        let text = CONFIG.replace("domain controller", "primary");
        assert!(ConfigFile::try_from(text.as_str()).is_err());
    }
}
