use std::{
    io,
    sync::{Arc, Mutex},
};

use anyhow::Result;
use dcprovision_directory::{Directory, DirectoryProvider};
use dcprovision_filesystem::Filesystem;

use super::Fixture;
use crate::{new_user, ProvisionRun, Quiet, UnmanagedKeytabs};

#[test]
fn test_zone_uses_stored_guids() -> Result<()> {
    let mut fixture = Fixture::new()?;
    fixture.provision(false).0?;
    let zone = fixture.fs.load(&fixture.paths.dns)?;
    assert!(zone.contains("$ORIGIN example.com."));
    assert!(zone.contains("dc1     IN A    192.0.2.10"), "{zone}");
    let domainguid = fixture.context_value("DOMAINGUID");
    assert!(zone.contains(&format!("_ldap._tcp.{domainguid}.domains._msdcs")));
    let host = fixture.sam_entry("CN=DC1,OU=Domain Controllers,DC=example,DC=com");
    let hostguid = host.as_ref().and_then(|e| e.first("objectGUID")).unwrap_or("missing");
    assert!(zone.contains(&format!("{hostguid}._msdcs")));
    assert!(!zone.contains("${"));
    Ok(())
}

#[test]
fn test_zone_is_always_rewritten() -> Result<()> {
    let mut fixture = Fixture::new()?;
    fixture.fs.create_directory_all(&fixture.paths.private_dir, None)?;
    fixture.fs.save(&fixture.paths.dns, "; stale zone", None)?;
    fixture.provision(false).0?;
    assert!(!fixture.fs.load(&fixture.paths.dns)?.contains("stale"));
    Ok(())
}

#[test]
fn test_ldap_base_files() -> Result<()> {
    let mut fixture = Fixture::new()?;
    let mut messages = vec![];
    let mut sink = |text: &str| messages.push(text.to_owned());
    ProvisionRun::new(&mut fixture.fs, &fixture.server, &mut sink, &UnmanagedKeytabs)
        .provision_ldap_base(&mut fixture.context, &fixture.paths)?;

    for (path, dn) in [
        (&fixture.paths.ldap_basedn_ldif, "dn: DC=example,DC=com"),
        (
            &fixture.paths.ldap_config_basedn_ldif,
            "dn: CN=Configuration,DC=example,DC=com",
        ),
        (
            &fixture.paths.ldap_schema_basedn_ldif,
            "dn: CN=Schema,CN=Configuration,DC=example,DC=com",
        ),
    ] {
        let ldif = fixture.fs.load(path)?;
        assert!(ldif.contains(dn), "{ldif}");
        assert!(ldif.contains("objectClass: extensibleObject"), "{ldif}");
    }
    assert_messages! {
        messages,
        contains: "Please install the LDIF"
    };
    assert!(fixture.server.databases().is_empty());
    Ok(())
}

#[test]
fn test_new_user_in_provisioned_domain() -> Result<()> {
    let mut fixture = Fixture::new()?;
    fixture.provision(false).0?;
    let mut handle = fixture.server.connect(fixture.paths.samdb.as_str())?;
    let user = new_user(&mut handle, "alice", "alice", "s3cret!")?;
    handle.close()?;

    let stored = fixture.sam_entry(&user.to_string());
    assert_eq!(
        stored.as_ref().and_then(|e| e.first("userAccountControl")),
        Some("544")
    );
    let members = fixture
        .sam_entry("CN=Domain Users,CN=Users,DC=example,DC=com")
        .and_then(|e| e.get("member").map(<[String]>::to_vec))
        .unwrap_or_default();
    assert_eq!(members, [user.to_string()]);
    Ok(())
}

#[test]
fn test_quiet_run_still_provisions() -> Result<()> {
    let mut fixture = Fixture::new()?;
    ProvisionRun::new(&mut fixture.fs, &fixture.server, &mut Quiet, &UnmanagedKeytabs)
        .provision(&mut fixture.context, &fixture.paths, false)?;
    assert!(fixture.fs.exists(&fixture.paths.dns));
    Ok(())
}

/// Collects formatted log output
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_admin_password_shown_but_not_logged() -> Result<()> {
    let mut fixture = Fixture::new()?;
    let password = fixture.context_value("ADMINPASS");
    assert!(!password.is_empty());

    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let (result, messages) =
        tracing::subscriber::with_default(subscriber, || fixture.provision(false));
    result?;

    let log = String::from_utf8(log.0.lock().unwrap().clone())?;
    assert!(log.contains("Setting up secrets.ldb"));
    assert!(!log.contains(&password));
    assert!(messages
        .iter()
        .any(|m| m == &format!("Using administrator password: {password}")));
    Ok(())
}
