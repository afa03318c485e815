use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use dcprovision_config::{NameMap, ServerRole};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineArgs {
    /// The path to the dcprovision.toml config file (written if it does not exist)
    #[arg(short, long, default_value = "dcprovision.toml")]
    pub config_file: Utf8PathBuf,

    /// Directory holding the provisioning templates
    #[arg(long)]
    pub setup_dir: Option<Utf8PathBuf>,

    /// Directory for databases, keytabs and generated files
    #[arg(long)]
    pub private_dir: Option<Utf8PathBuf>,

    /// Directory for lock files and run-time state
    #[arg(long)]
    pub lock_dir: Option<Utf8PathBuf>,

    /// The Kerberos realm, for example "EXAMPLE.COM"
    #[arg(long)]
    pub realm: Option<String>,

    /// The NetBIOS domain name (defaults to the first label of the realm)
    #[arg(long)]
    pub domain: Option<String>,

    /// The host name (defaults to this system's)
    #[arg(long)]
    pub host_name: Option<String>,

    /// The host address (defaults to the first address the host name resolves to)
    #[arg(long)]
    pub host_ip: Option<String>,

    /// One of "domain controller", "member server" or "standalone"
    #[arg(long, value_parser = parse_server_role)]
    pub server_role: Option<ServerRole>,

    /// Pin local names for identity roles, for example "wheel:admins,users:staff"
    #[arg(long, value_parser = parse_name_map)]
    pub identities: Option<NameMap>,

    /// Stop once the domain structure exists, without users, groups or name mappings
    #[arg(long)]
    pub blank: bool,

    /// Only write the base LDIF files for loading into a separate LDAP server
    #[arg(long, conflicts_with = "check")]
    pub ldap_base: bool,

    /// Only report whether an existing installation looks complete
    #[arg(long)]
    pub check: bool,

    /// Increase logging verbosity level (0: warn; 1: info; 2: info pretty; 3: debug; 4: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn parse_name_map(value: &str) -> Result<NameMap> {
    NameMap::try_from(value)
}

fn parse_server_role(value: &str) -> Result<ServerRole> {
    value.parse()
}
