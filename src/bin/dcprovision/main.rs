#![doc = include_str!("../../../README.md")]

use anyhow::{bail, Context as _, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use tracing::{span, Level};

mod args;
use args::CommandLineArgs;
use dcprovision_config::{ConfigFile, ProvisionPaths};
use dcprovision_directory::LdifFileServer;
use dcprovision_filesystem::{DiskFilesystem, Filesystem};
use dcprovision_provision::{
    guess_configuration, install_ok, GuessOptions, ProvisionRun, SystemNameService,
    UnmanagedKeytabs,
};

const DEFAULT_PRIVATE_DIR: &str = "/var/lib/dcprovision/private";
const DEFAULT_SETUP_DIR: &str = "/usr/share/dcprovision/setup";
const DEFAULT_LOCK_DIR: &str = "/var/lock/dcprovision";

fn init_logger(verbosity: u8) {
    let sub = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_file(false)
        .with_line_number(false);
    let (level, pretty) = match verbosity {
        0 => (Level::WARN, false),
        1 => (Level::INFO, false),
        2 => (Level::INFO, true),
        3 => (Level::DEBUG, true),
        _ => (Level::TRACE, true),
    };
    let sub = sub.with_max_level(level);
    if pretty {
        sub.pretty().init();
    } else {
        sub.init();
    }
}

fn main() -> Result<()> {
    let args = CommandLineArgs::parse();
    init_logger(args.verbose);
    let span = span!(Level::DEBUG, "main", config = args.config_file.as_str());
    let _guard = span.enter();

    let mut fs = DiskFilesystem::new();
    let config = load_config(&fs, &args)?;
    let server = LdifFileServer::new();

    if args.check {
        let realm = args.realm.as_deref().unwrap_or(&config.realm).to_lowercase();
        let paths = ProvisionPaths::new(&args.config_file, &config, &realm);
        if install_ok(&server, &config, &paths) {
            println!("Installation at {} looks complete", paths.private_dir);
            return Ok(());
        }
        bail!("Installation at {} is incomplete", paths.private_dir);
    }

    let options = GuessOptions {
        realm: args.realm.clone().or_else(|| Some(config.realm.clone())),
        domain: args.domain.clone().or_else(|| Some(config.workgroup.clone())),
        host_name: args.host_name.clone().or_else(|| config.netbios_name.clone()),
        host_ip: args.host_ip.clone(),
        server_role: args.server_role.unwrap_or(config.server_role),
        identities: args.identities.clone().unwrap_or_default(),
    };
    let mut context = guess_configuration(&options, &SystemNameService::new())?;
    let dnsdomain = context
        .get_str("DNSDOMAIN")
        .map(str::to_owned)
        .context("No DNS domain could be derived")?;
    let paths = ProvisionPaths::new(&args.config_file, &config, &dnsdomain);
    tracing::debug!("Provisioning with {}", context);

    let mut sink = |text: &str| println!("{text}");
    let mut run = ProvisionRun::new(&mut fs, &server, &mut sink, &UnmanagedKeytabs);
    if args.ldap_base {
        run.provision_ldap_base(&mut context, &paths)?;
    } else {
        run.provision(&mut context, &paths, args.blank)?;
    }
    Ok(())
}

/// Loads the server configuration, or assembles one from the command line if there is none yet
fn load_config(fs: &DiskFilesystem, args: &CommandLineArgs) -> Result<ConfigFile> {
    let dir = |arg: &Option<Utf8PathBuf>, default: &str| {
        arg.clone().unwrap_or_else(|| Utf8PathBuf::from(default))
    };
    if fs.exists(&args.config_file) {
        let mut config = ConfigFile::load(fs, &args.config_file)?;
        if let Some(private_dir) = &args.private_dir {
            config.private_dir = private_dir.clone();
        }
        if let Some(setup_dir) = &args.setup_dir {
            config.setup_dir = setup_dir.clone();
        }
        if let Some(lock_dir) = &args.lock_dir {
            config.lock_dir = lock_dir.clone();
        }
        return Ok(config);
    }
    let Some(realm) = args.realm.clone() else {
        bail!(
            "{} does not exist; --realm is required for a new installation",
            args.config_file
        );
    };
    let workgroup = match &args.domain {
        Some(domain) => domain.clone(),
        None => realm.split('.').next().unwrap_or_default().to_owned(),
    };
    Ok(ConfigFile {
        realm,
        workgroup,
        netbios_name: args.host_name.clone(),
        server_role: args.server_role.unwrap_or_default(),
        private_dir: dir(&args.private_dir, DEFAULT_PRIVATE_DIR),
        setup_dir: dir(&args.setup_dir, DEFAULT_SETUP_DIR),
        lock_dir: dir(&args.lock_dir, DEFAULT_LOCK_DIR),
        sam_database: None,
        secrets_database: None,
        sysvol: None,
        netlogon: None,
    })
}
