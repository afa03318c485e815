//! Mapping security identifiers onto local account and group names.
use std::borrow::Cow;

use dcprovision_directory::{Attribute, Change, Directory, DirectoryError, Dn, Entry, Scope};
use dcprovision_template::Context;

use crate::{required, MessageSink, ProvisionError};

/// Well-known principals from outside the domain: SID, description and the role they map to
pub const FOREIGN_PRINCIPALS: [(&str, &str, &str); 5] = [
    ("S-1-5-7", "Anonymous", "NOBODY"),
    ("S-1-1-0", "World", "NOGROUP"),
    ("S-1-5-2", "Network", "NOGROUP"),
    ("S-1-5-18", "System", "ROOT"),
    ("S-1-5-11", "Authenticated Users", "USERS"),
];

/// Built-in groups and the role they map to
pub const BUILTIN_MAPPINGS: [(&str, &str); 4] = [
    ("S-1-5-32-544", "WHEEL"),
    ("S-1-5-32-545", "USERS"),
    ("S-1-5-32-546", "NOGROUP"),
    ("S-1-5-32-551", "BACKUP"),
];

/// Relative identifiers within the domain and the role they map to
pub const DOMAIN_MAPPINGS: [(&str, &str); 6] = [
    ("500", "ROOT"),
    ("518", "WHEEL"),
    ("519", "WHEEL"),
    ("512", "WHEEL"),
    ("513", "USERS"),
    ("520", "WHEEL"),
];

/// Adds a foreign security principal, tolerating one that already exists
pub fn add_foreign<D: Directory>(
    handle: &mut D,
    domaindn: &Dn,
    sid: &str,
    description: &str,
    unixname: &str,
    usn: &str,
) -> Result<(), ProvisionError> {
    let dn = domaindn
        .child("CN", "ForeignSecurityPrincipals")
        .child("CN", sid);
    let entry = Entry::new(dn.clone())
        .with("objectClass", "top")
        .with("objectClass", "foreignSecurityPrincipal")
        .with("cn", sid)
        .with("objectSid", sid)
        .with("description", description)
        .with("unixName", unixname)
        .with("uSNCreated", usn)
        .with("uSNChanged", usn);
    match handle.add(&entry) {
        Ok(()) => Ok(()),
        Err(DirectoryError::EntryAlreadyExists(_)) => {
            tracing::debug!("Foreign principal {} already exists", sid);
            Ok(())
        }
        Err(e) => Err(ProvisionError::directory(dn, e)),
    }
}

/// Points the record carrying `sid` at a local name
///
/// Exactly one record below `domaindn` must carry the identifier.
pub fn setup_name_mapping<D: Directory>(
    handle: &mut D,
    domaindn: &Dn,
    sid: &str,
    unixname: &str,
) -> Result<(), ProvisionError> {
    let found = handle
        .search(domaindn, Scope::Subtree, &format!("(objectSid={sid})"), &["dn"])
        .map_err(|e| ProvisionError::directory(domaindn, e))?;
    let dn = match found.as_slice() {
        [entry] => entry.dn().clone(),
        _ => {
            return Err(ProvisionError::DirectoryOperationFailed {
                target: sid.to_owned(),
                message: format!("expected one record with this SID, found {}", found.len()),
            })
        }
    };
    handle
        .modify(&dn, &[Change::Replace(Attribute::new("unixName", [unixname]))])
        .map_err(|e| ProvisionError::directory(&dn, e))?;
    tracing::debug!("Mapped {} ({}) to {}", sid, dn, unixname);
    Ok(())
}

/// Reads the security identifier of the domain record
pub fn domain_sid<D: Directory>(handle: &D, domaindn: &Dn) -> Result<String, ProvisionError> {
    let found = handle
        .search(domaindn, Scope::Base, "(objectClass=domainDNS)", &["objectSid"])
        .map_err(|e| ProvisionError::directory(domaindn, e))?;
    match found.as_slice() {
        [entry] => entry.first("objectSid").map(str::to_owned).ok_or_else(|| {
            ProvisionError::DirectoryOperationFailed {
                target: domaindn.to_string(),
                message: "the domain record has no objectSid".into(),
            }
        }),
        _ => Err(ProvisionError::DirectoryOperationFailed {
            target: domaindn.to_string(),
            message: format!("expected one domain record, found {}", found.len()),
        }),
    }
}

/// Ensures the foreign principals exist and maps every well-known identifier to a local name
///
/// Every mapping is attempted; any failures are reported together afterwards.
pub fn setup_name_mappings<D: Directory>(
    handle: &mut D,
    context: &Context,
    messages: &mut dyn MessageSink,
) -> Result<(), ProvisionError> {
    let domaindn = Dn::parse(&required(context, "DOMAINDN")?)
        .map_err(|e| ProvisionError::directory("DOMAINDN", e))?;
    let sid = domain_sid(handle, &domaindn)?;
    messages.message(&format!("set DOMAIN SID: {sid}"));

    let mut mappings: Vec<(Cow<str>, &str)> = vec![];
    for (foreign_sid, description, role) in FOREIGN_PRINCIPALS {
        let unixname = required(context, role)?;
        let usn = required(context, "USN")?;
        if let Err(e) = add_foreign(handle, &domaindn, foreign_sid, description, &unixname, &usn) {
            messages.message(&format!("Adding foreign principal {foreign_sid} failed: {e}"));
        }
        mappings.push((Cow::Borrowed(foreign_sid), role));
    }
    for (builtin_sid, role) in BUILTIN_MAPPINGS {
        mappings.push((Cow::Borrowed(builtin_sid), role));
    }
    for (rid, role) in DOMAIN_MAPPINGS {
        mappings.push((Cow::Owned(format!("{sid}-{rid}")), role));
    }

    let mut failures = vec![];
    for (mapped_sid, role) in &mappings {
        let unixname = required(context, role)?;
        if let Err(e) = setup_name_mapping(handle, &domaindn, mapped_sid, &unixname) {
            messages.message(&format!("Mapping {mapped_sid} to {unixname} failed: {e}"));
            failures.push(e.to_string());
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ProvisionError::NameMappingFailed { failures })
    }
}
