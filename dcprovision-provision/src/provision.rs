use std::{cell::Cell, rc::Rc};

use anyhow::Context as _;
use dcprovision_config::{ConfigFile, ProvisionPaths};
use dcprovision_directory::{
    erase::{erase_partitions, naming_contexts, EraseOptions},
    Directory, DirectoryProvider, Dn, Scope,
};
use dcprovision_filesystem::{Filesystem, PRIVATE_DIRECTORY_MODE};
use dcprovision_template::Context;

use crate::{
    guess::valid_netbios_name,
    mappings::setup_name_mappings,
    required,
    setup::{open_ldb, OnConflict, SetupOptions},
    KeytabRefresher, MessageSink, ProvisionError,
};

/// The update sequence numbers handed out during one run, starting at 1
#[derive(Debug, Clone, Default)]
pub struct UsnCounter(Rc<Cell<u64>>);

impl UsnCounter {
    /// Constructs a counter that has handed out nothing yet
    pub fn new() -> Self {
        Default::default()
    }

    /// Hands out the next number
    pub fn next_usn(&self) -> u64 {
        let usn = self.0.get() + 1;
        self.0.set(usn);
        usn
    }
}

/// The seed documents applied to the SAM database after its base entry, in order
const SAM_SEED_STEPS: [(&str, &str, OnConflict); 6] = [
    (
        "Adding configuration container (permitted to fail)",
        "provision_configuration_basedn.ldif",
        OnConflict::Ignore,
    ),
    (
        "Adding schema container (permitted to fail)",
        "provision_schema_basedn.ldif",
        OnConflict::Ignore,
    ),
    ("Setting up sam.ldb schema", "schema.ldif", OnConflict::Abort),
    (
        "Setting up display specifiers",
        "display_specifiers.ldif",
        OnConflict::Abort,
    ),
    (
        "Setting up sam.ldb templates",
        "provision_templates.ldif",
        OnConflict::Abort,
    ),
    ("Setting up sam.ldb data", "provision.ldif", OnConflict::Abort),
];

/// One provisioning run and the collaborators it drives
///
/// Example:
/// ```
/// use dcprovision_directory::MemoryServer;
/// use dcprovision_filesystem::MemoryFilesystem;
/// use dcprovision_provision::{ProvisionRun, UnmanagedKeytabs};
/// use dcprovision_template::Context;
///
/// let mut fs = MemoryFilesystem::new();
/// let server = MemoryServer::new();
/// let mut messages = vec![];
/// let mut sink = |text: &str| messages.push(text.to_owned());
/// let run = ProvisionRun::new(&mut fs, &server, &mut sink, &UnmanagedKeytabs);
///
/// // Every run installs its own USN generator
/// let mut context = Context::new();
/// run.install_usn(&mut context);
/// assert_eq!(context.resolve("USN").as_deref(), Some("1"));
/// assert_eq!(context.resolve("USN").as_deref(), Some("2"));
/// ```
pub struct ProvisionRun<'a, FS, P> {
    pub(crate) filesystem: &'a mut FS,
    pub(crate) provider: &'a P,
    messages: &'a mut dyn MessageSink,
    keytabs: &'a dyn KeytabRefresher,
    usn: UsnCounter,
    erase_options: EraseOptions,
}

impl<'a, FS, P> ProvisionRun<'a, FS, P>
where
    FS: Filesystem,
    P: DirectoryProvider,
{
    /// Constructs a run writing files to `filesystem` and databases through `provider`
    pub fn new(
        filesystem: &'a mut FS,
        provider: &'a P,
        messages: &'a mut dyn MessageSink,
        keytabs: &'a dyn KeytabRefresher,
    ) -> Self {
        ProvisionRun {
            filesystem,
            provider,
            messages,
            keytabs,
            usn: UsnCounter::new(),
            erase_options: EraseOptions::default(),
        }
    }

    /// Replaces the bound on partition erase passes
    pub fn with_erase_options(mut self, erase_options: EraseOptions) -> Self {
        self.erase_options = erase_options;
        self
    }

    /// Binds `USN` in `context` to this run's counter
    pub fn install_usn(&self, context: &mut Context) {
        let usn = self.usn.clone();
        context.set_generator("USN", move || usn.next_usn().to_string());
    }

    /// Reports progress to the operator and the log
    pub(crate) fn message(&mut self, text: &str) {
        tracing::info!("{}", text);
        self.messages.message(text);
    }

    /// Passes a failure on to the operator before handing it back to the caller
    fn report_failure<T>(&mut self, result: Result<T, ProvisionError>) -> Result<T, ProvisionError> {
        if let Err(e) = &result {
            tracing::error!("{}", e);
            self.messages.message(&format!("Provisioning failed: {e}"));
        }
        result
    }

    /// Drives the databases described by `paths` from empty or stale to a bootstrapped domain
    ///
    /// With `blank` the run stops once the domain structure is in place, before any users,
    /// groups or name mappings are created.
    pub fn provision(
        &mut self,
        context: &mut Context,
        paths: &ProvisionPaths,
        blank: bool,
    ) -> Result<(), ProvisionError> {
        let result = self.provision_steps(context, paths, blank);
        self.report_failure(result)
    }

    fn provision_steps(
        &mut self,
        context: &mut Context,
        paths: &ProvisionPaths,
        blank: bool,
    ) -> Result<(), ProvisionError> {
        normalize_context(context)?;
        self.install_derived(context, paths);
        self.create_private_dir(paths)?;
        let samdb = paths.samdb.as_str();
        let domaindn = required(context, "DOMAINDN")?;

        self.message(&format!(
            "Provisioning for {} in realm {}",
            required(context, "DOMAIN")?,
            required(context, "REALM")?
        ));
        // Not logged
        self.messages.message(&format!(
            "Using administrator password: {}",
            required(context, "ADMINPASS")?
        ));

        self.setup_config_file(context, paths)?;

        self.message("Setting up secrets.ldb");
        self.setup_ldb(
            paths,
            "secrets.ldif",
            paths.secrets.as_str(),
            context,
            &SetupOptions::default(),
        )?;

        self.message("Setting up keytabs");
        self.keytabs
            .refresh_all(paths)
            .map_err(|e| ProvisionError::CredentialRefreshFailed(format!("{e:#}")))?;

        self.message("Setting up hklm.ldb");
        self.setup_ldb(
            paths,
            "hklm.ldif",
            paths.hklm.as_str(),
            context,
            &SetupOptions::default(),
        )?;

        self.message("Setting up sam.ldb attributes");
        let rootdse = self.render_setup(paths, "provision_rootdse_add.ldif", context)?;
        self.setup_ldb(
            paths,
            "provision_init.ldif",
            samdb,
            context,
            &SetupOptions {
                extra: Some(rootdse),
                ..Default::default()
            },
        )?;

        self.message("Erasing data from partitions");
        self.erase_sam_partitions(context, samdb)?;

        self.message(&format!("Adding DomainDN: {domaindn} (permitted to fail)"));
        self.setup_ldb(
            paths,
            "provision_basedn.ldif",
            samdb,
            context,
            &SetupOptions::permitted_to_fail(),
        )?;
        self.message(&format!("Modifying DomainDN: {domaindn}"));
        self.modify_ldb(paths, "provision_basedn_modify.ldif", samdb, context)?;

        for (message, template, on_conflict) in SAM_SEED_STEPS {
            self.message(message);
            self.setup_ldb(
                paths,
                template,
                samdb,
                context,
                &SetupOptions {
                    erase: false,
                    extra: None,
                    on_conflict,
                },
            )?;
        }

        if blank {
            self.message("Blank provision complete, no users or groups were added");
            return Ok(());
        }

        self.message("Setting up sam.ldb users and groups");
        self.setup_ldb(
            paths,
            "provision_users.ldif",
            samdb,
            context,
            &SetupOptions::keep_existing(),
        )?;

        self.message("Setting up name mappings");
        self.in_transaction(samdb, false, |run, handle| {
            setup_name_mappings(handle, context, &mut *run.messages)
        })?;

        self.create_zone_file(context, paths)?;
        self.message(&format!(
            "Please install the zone located in {} into your DNS server",
            paths.dns
        ));
        Ok(())
    }

    /// Binds the locations a run writes to, so templates can refer to them
    fn install_derived(&self, context: &mut Context, paths: &ProvisionPaths) {
        self.install_usn(context);
        context.set("PRIVATEDIR", paths.private_dir.as_str());
        context.set("SETUPDIR", paths.setup_dir.as_str());
        context.set("LOCKDIR", paths.lock_dir.as_str());
        context.set("SECRETS_KEYTAB", paths.keytab.as_str());
        context.set("DNS_KEYTAB", paths.dns_keytab.as_str());
        context.set("SYSVOL", paths.sysvol.as_str());
        context.set("NETLOGON", paths.netlogon.as_str());
    }

    fn create_private_dir(&mut self, paths: &ProvisionPaths) -> Result<(), ProvisionError> {
        self.filesystem
            .create_directory_all(&paths.private_dir, Some(PRIVATE_DIRECTORY_MODE))
            .with_context(|| format!("Creating private directory {}", paths.private_dir))?;
        Ok(())
    }

    /// Writes the server configuration unless one exists, then checks it names this domain
    fn setup_config_file(
        &mut self,
        context: &Context,
        paths: &ProvisionPaths,
    ) -> Result<(), ProvisionError> {
        if self.filesystem.exists(&paths.config_file) {
            tracing::debug!("Keeping existing {}", paths.config_file);
        } else {
            self.message(&format!("Setting up {}", paths.config_file));
            self.setup_file(paths, "provision.conf", &paths.config_file, context)?;
        }
        let config = ConfigFile::load(&*self.filesystem, &paths.config_file)?;
        for (field, configured, requested) in [
            ("realm", &config.realm, required(context, "REALM")?),
            ("workgroup", &config.workgroup, required(context, "DOMAIN")?),
        ] {
            if !configured.eq_ignore_ascii_case(&requested) {
                return Err(ProvisionError::InvalidConfiguration {
                    field: field.to_owned(),
                    rule: format!(
                        "'{configured}' in {} must match chosen {field} '{requested}'",
                        paths.config_file
                    ),
                });
            }
        }
        Ok(())
    }

    fn erase_sam_partitions(&mut self, context: &Context, samdb: &str) -> Result<(), ProvisionError> {
        let fallback = ["DOMAINDN", "CONFIGDN", "SCHEMADN"]
            .into_iter()
            .map(|key| {
                Dn::parse(&required(context, key)?)
                    .map_err(|e| ProvisionError::directory(key, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let erase_options = self.erase_options;
        let report = self.in_transaction(samdb, false, |_, handle| {
            let mut basedns =
                naming_contexts(&*handle).map_err(|e| ProvisionError::directory(samdb, e))?;
            if basedns.is_empty() {
                basedns = fallback;
            }
            Ok(erase_partitions(handle, &basedns, &erase_options))
        })?;
        for partition in report.incomplete() {
            let incomplete = ProvisionError::ConvergenceIncomplete {
                basedn: partition.basedn.to_string(),
                iterations: partition.iterations,
                remaining: partition.remaining,
            };
            self.message(&incomplete.to_string());
        }
        Ok(())
    }

    /// Writes the DNS zone file, using the GUIDs stored in the SAM database where present
    pub fn create_zone_file(
        &mut self,
        context: &Context,
        paths: &ProvisionPaths,
    ) -> Result<(), ProvisionError> {
        let domaindn = Dn::parse(&required(context, "DOMAINDN")?)
            .map_err(|e| ProvisionError::directory("DOMAINDN", e))?;
        let hostname = required(context, "HOSTNAME")?;
        let samdb = paths.samdb.as_str();
        let mut handle = open_ldb(self.provider, samdb)?;
        let read = |scope, filter: &str| {
            handle
                .search_one(&domaindn, scope, filter, "objectGUID")
                .map_err(|e| ProvisionError::directory(samdb, e))
        };
        let domainguid = read(Scope::Base, "(objectClass=*)")?;
        let hostguid = read(
            Scope::Subtree,
            &format!("(&(objectClass=computer)(cn={hostname}))"),
        )?;
        if let Err(e) = handle.close() {
            tracing::debug!("Closing {} failed: {}", samdb, e);
        }

        let mut zone = context.clone();
        if let Some(guid) = domainguid {
            zone.set("DOMAINGUID", guid);
        }
        if let Some(guid) = hostguid {
            zone.set("HOSTGUID", guid);
        }
        self.setup_file(paths, "provision.zone", &paths.dns, &zone)
    }

    /// Writes the base entries of each partition as LDIF files, for loading into a separate
    /// LDAP server by hand
    pub fn provision_ldap_base(
        &mut self,
        context: &mut Context,
        paths: &ProvisionPaths,
    ) -> Result<(), ProvisionError> {
        let result = self.ldap_base_steps(context, paths);
        self.report_failure(result)
    }

    fn ldap_base_steps(
        &mut self,
        context: &mut Context,
        paths: &ProvisionPaths,
    ) -> Result<(), ProvisionError> {
        normalize_context(context)?;
        self.install_derived(context, paths);
        self.create_private_dir(paths)?;
        let mut ldap = context.clone();
        ldap.set("EXTENSIBLEOBJECT", "objectClass: extensibleObject");
        self.message(&format!(
            "Setting up LDAP base entry: {}",
            required(context, "DOMAINDN")?
        ));
        for (template, target) in [
            ("provision_basedn.ldif", &paths.ldap_basedn_ldif),
            (
                "provision_configuration_basedn.ldif",
                &paths.ldap_config_basedn_ldif,
            ),
            ("provision_schema_basedn.ldif", &paths.ldap_schema_basedn_ldif),
        ] {
            self.setup_file(paths, template, target, &ldap)?;
        }
        self.message(&format!(
            "Please install the LDIF located in {}, {} and {} into your LDAP server, \
            and re-run pointing at it",
            paths.ldap_basedn_ldif, paths.ldap_config_basedn_ldif, paths.ldap_schema_basedn_ldif
        ));
        Ok(())
    }
}

/// Applies the case rules to the naming entries of `context` and checks the NetBIOS names
pub fn normalize_context(context: &mut Context) -> Result<(), ProvisionError> {
    for (key, upper) in [
        ("REALM", true),
        ("DOMAIN", true),
        ("NETBIOSNAME", true),
        ("DNSDOMAIN", false),
        ("HOSTNAME", false),
    ] {
        let value = required(context, key).map_err(|_| ProvisionError::InvalidConfiguration {
            field: key.to_owned(),
            rule: "must be set".into(),
        })?;
        let normalized = if upper {
            value.to_uppercase()
        } else {
            value.to_lowercase()
        };
        context.set(key, normalized);
    }
    for key in ["DOMAIN", "NETBIOSNAME"] {
        let name = required(context, key)?;
        match valid_netbios_name(&name) {
            Ok(()) => {}
            Err(ProvisionError::InvalidName { rule, .. }) => {
                return Err(ProvisionError::InvalidConfiguration {
                    field: key.to_owned(),
                    rule: format!("'{name}' {rule}"),
                })
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Reports whether an existing installation looks complete
///
/// The realm must be configured, the SAM database must open and hold exactly one
/// administrator record.
pub fn install_ok<P: DirectoryProvider>(
    provider: &P,
    config: &ConfigFile,
    paths: &ProvisionPaths,
) -> bool {
    if config.realm.is_empty() {
        return false;
    }
    let mut handle = match provider.connect(paths.samdb.as_str()) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::debug!("Cannot open {}: {}", paths.samdb, e);
            return false;
        }
    };
    let found = handle.search(&Dn::root(), Scope::Subtree, "(cn=Administrator)", &["dn"]);
    if let Err(e) = handle.close() {
        tracing::debug!("Closing {} failed: {}", paths.samdb, e);
    }
    matches!(found, Ok(records) if records.len() == 1)
}
