use anyhow::Result;
use camino::Utf8Path;
use dcprovision_config::{ConfigFile, ProvisionPaths, ServerRole};
use dcprovision_directory::{Dn, Entry, MemoryServer};
use dcprovision_filesystem::{Filesystem, MemoryFilesystem};
use dcprovision_template::Context;

use crate::{
    guess_configuration, GuessOptions, KeytabRefresher, ProvisionError, ProvisionRun,
    StaticNameService, UnmanagedKeytabs,
};

macro_rules! assert_messages {
    {
        $messages:expr,
        $(contains: $($present:literal)+)?
        $(lacks: $($absent:literal)+)?
    } => {{
        let messages: &[String] = &$messages;
        $($(
            assert!(
                messages.iter().any(|m| m.contains($present)),
                "No message containing {:?} in {:#?}",
                $present,
                messages,
            );
        )+)?
        $($(
            assert!(
                !messages.iter().any(|m| m.contains($absent)),
                "Unexpected message containing {:?} in {:#?}",
                $absent,
                messages,
            );
        )+)?
    }};
}

mod artifacts;

const SETUP_DIR: &str = "/usr/share/dcprovision/setup";
const PRIVATE_DIR: &str = "/var/lib/dcprovision/private";
const LOCK_DIR: &str = "/var/lock/dcprovision";
const CONFIG_FILE: &str = "/etc/dcprovision/dcprovision.toml";

const TEMPLATES: [(&str, &str); 15] = [
    ("provision.conf", include_str!("../../setup/provision.conf")),
    ("secrets.ldif", include_str!("../../setup/secrets.ldif")),
    ("hklm.ldif", include_str!("../../setup/hklm.ldif")),
    ("provision_init.ldif", include_str!("../../setup/provision_init.ldif")),
    (
        "provision_rootdse_add.ldif",
        include_str!("../../setup/provision_rootdse_add.ldif"),
    ),
    ("provision_basedn.ldif", include_str!("../../setup/provision_basedn.ldif")),
    (
        "provision_basedn_modify.ldif",
        include_str!("../../setup/provision_basedn_modify.ldif"),
    ),
    (
        "provision_configuration_basedn.ldif",
        include_str!("../../setup/provision_configuration_basedn.ldif"),
    ),
    (
        "provision_schema_basedn.ldif",
        include_str!("../../setup/provision_schema_basedn.ldif"),
    ),
    ("schema.ldif", include_str!("../../setup/schema.ldif")),
    (
        "display_specifiers.ldif",
        include_str!("../../setup/display_specifiers.ldif"),
    ),
    (
        "provision_templates.ldif",
        include_str!("../../setup/provision_templates.ldif"),
    ),
    ("provision.ldif", include_str!("../../setup/provision.ldif")),
    ("provision_users.ldif", include_str!("../../setup/provision_users.ldif")),
    ("provision.zone", include_str!("../../setup/provision.zone")),
];

/// An in-memory installation: the shipped templates, an empty server and a guessed context
struct Fixture {
    fs: MemoryFilesystem,
    server: MemoryServer,
    config: ConfigFile,
    paths: ProvisionPaths,
    context: Context,
}

impl Fixture {
    fn new() -> Result<Self> {
        let mut fs = MemoryFilesystem::new();
        fs.create_directory_all(SETUP_DIR, None)?;
        fs.create_directory_all("/etc/dcprovision", None)?;
        for (name, text) in TEMPLATES {
            fs.save(Utf8Path::new(SETUP_DIR).join(name), text, None)?;
        }

        let options = GuessOptions {
            realm: Some("example.com".into()),
            domain: Some("example".into()),
            host_name: Some("dc1".into()),
            host_ip: Some("192.0.2.10".into()),
            ..Default::default()
        };
        let nss = StaticNameService::new(
            ["root", "nobody"],
            ["nogroup", "users", "wheel", "backup"],
        );
        let context = guess_configuration(&options, &nss)?;

        let config = ConfigFile {
            realm: "EXAMPLE.COM".into(),
            workgroup: "EXAMPLE".into(),
            netbios_name: None,
            server_role: ServerRole::DomainController,
            private_dir: PRIVATE_DIR.into(),
            setup_dir: SETUP_DIR.into(),
            lock_dir: LOCK_DIR.into(),
            sam_database: None,
            secrets_database: None,
            sysvol: None,
            netlogon: None,
        };
        let paths = ProvisionPaths::new(CONFIG_FILE, &config, "example.com");
        Ok(Fixture {
            fs,
            server: MemoryServer::new(),
            config,
            paths,
            context,
        })
    }

    /// Runs a full (or blank) provision, returning its outcome and messages
    fn provision(&mut self, blank: bool) -> (Result<(), ProvisionError>, Vec<String>) {
        self.provision_with(&UnmanagedKeytabs, blank)
    }

    fn provision_with(
        &mut self,
        keytabs: &dyn KeytabRefresher,
        blank: bool,
    ) -> (Result<(), ProvisionError>, Vec<String>) {
        let mut messages = vec![];
        let mut sink = |text: &str| messages.push(text.to_owned());
        let result = ProvisionRun::new(&mut self.fs, &self.server, &mut sink, keytabs).provision(
            &mut self.context,
            &self.paths,
            blank,
        );
        (result, messages)
    }

    /// Appends LDIF to one of the installed templates
    fn extend_template(&mut self, name: &str, ldif: &str) -> Result<()> {
        let path = self.paths.setup_file(name);
        let mut text = self.fs.load(&path)?;
        text.push('\n');
        text.push_str(ldif);
        self.fs.save(&path, &text, None)
    }

    fn sam_entry(&self, dn: &str) -> Option<Entry> {
        let dn = Dn::parse(dn).ok()?;
        self.server
            .database(self.paths.samdb.as_str())?
            .get(&dn)
            .cloned()
    }

    fn record_count(&self, path: &Utf8Path) -> usize {
        self.server
            .database(path.as_str())
            .map(|db| db.len())
            .unwrap_or(0)
    }

    fn context_value(&self, name: &str) -> String {
        self.context
            .get_str(name)
            .map(str::to_owned)
            .unwrap_or_default()
    }
}
