use dcprovision_directory::{Attribute, Change, Directory, Dn, Entry, Scope};

use crate::{secrets::random_guid, ProvisionError};

/// The `userAccountControl` bit marking an account disabled
pub const ACCOUNT_DISABLED: u32 = 0x2;

/// The `userAccountControl` of a new, still disabled, normal account
const NEW_ACCOUNT_CONTROL: u32 = 0x200 | 0x20 | ACCOUNT_DISABLED;

/// Matches any record, including those without an `objectClass`
const ANY_RECORD: &str = "(|(objectclass=*)(distinguishedName=*))";

/// Clears the disabled bit of an account
pub fn enable_account<D: Directory>(handle: &mut D, user_dn: &Dn) -> Result<(), ProvisionError> {
    let found = handle
        .search(user_dn, Scope::Base, ANY_RECORD, &["userAccountControl"])
        .map_err(|e| ProvisionError::directory(user_dn, e))?;
    let control = match found.as_slice() {
        [entry] => entry.first("userAccountControl").unwrap_or("0"),
        _ => {
            return Err(ProvisionError::DirectoryOperationFailed {
                target: user_dn.to_string(),
                message: format!("expected one account, found {}", found.len()),
            })
        }
    };
    let control: u32 = control
        .parse()
        .map_err(|e| ProvisionError::DirectoryOperationFailed {
            target: user_dn.to_string(),
            message: format!("userAccountControl {control:?}: {e}"),
        })?;
    let enabled = control & !ACCOUNT_DISABLED;
    handle
        .modify(
            user_dn,
            &[Change::Replace(Attribute::new(
                "userAccountControl",
                [enabled.to_string()],
            ))],
        )
        .map_err(|e| ProvisionError::directory(user_dn, e))
}

/// Adds an enabled user under `CN=Users` of the domain, as a member of Domain Users
///
/// Everything happens in one transaction. Returns the DN of the new user.
pub fn new_user<D: Directory>(
    handle: &mut D,
    username: &str,
    unixname: &str,
    password: &str,
) -> Result<Dn, ProvisionError> {
    handle
        .transaction_start()
        .map_err(|e| ProvisionError::transaction("new user", e))?;
    match add_user(handle, username, unixname, password) {
        Ok(user_dn) => {
            handle
                .transaction_commit()
                .map_err(|e| ProvisionError::transaction(&user_dn, e))?;
            Ok(user_dn)
        }
        Err(e) => {
            if let Err(cancel) = handle.transaction_cancel() {
                tracing::debug!("Cancelling the new user transaction failed: {}", cancel);
            }
            Err(e)
        }
    }
}

fn add_user<D: Directory>(
    handle: &mut D,
    username: &str,
    unixname: &str,
    password: &str,
) -> Result<Dn, ProvisionError> {
    let domain_dn = find_one(handle, &Dn::root(), "(objectClass=domainDNS)")?;
    let domain_users = find_one(handle, &domain_dn, "(name=Domain Users)")?;
    let user_dn = domain_dn.child("CN", "Users").child("CN", username);

    let user = Entry::new(user_dn.clone())
        .with("objectClass", "user")
        .with("sAMAccountName", username)
        .with("name", username)
        .with("memberOf", domain_users.to_string())
        .with("unixName", unixname)
        .with("objectGUID", random_guid())
        .with("unicodePwd", password)
        .with("userAccountControl", NEW_ACCOUNT_CONTROL.to_string());
    handle
        .add(&user)
        .map_err(|e| ProvisionError::directory(&user_dn, e))?;
    handle
        .modify(
            &domain_users,
            &[Change::Add(Attribute::new("member", [user_dn.to_string()]))],
        )
        .map_err(|e| ProvisionError::directory(&domain_users, e))?;
    enable_account(handle, &user_dn)?;
    tracing::info!("Added user {} ({})", username, user_dn);
    Ok(user_dn)
}

fn find_one<D: Directory>(handle: &D, base: &Dn, filter: &str) -> Result<Dn, ProvisionError> {
    let found = handle
        .search(base, Scope::Subtree, filter, &["dn"])
        .map_err(|e| ProvisionError::directory(base, e))?;
    match found.as_slice() {
        [entry] => Ok(entry.dn().clone()),
        _ => Err(ProvisionError::DirectoryOperationFailed {
            target: format!("{filter} under {base}"),
            message: format!("expected one record, found {}", found.len()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use dcprovision_directory::{DirectoryProvider, MemoryServer};
    use indoc::indoc;

    use super::*;

    const DOMAIN: &str = indoc! {"
        dn: DC=example,DC=com
        objectClass: domainDNS

        dn: CN=Users,DC=example,DC=com
        objectClass: container

        dn: CN=Domain Users,CN=Users,DC=example,DC=com
        objectClass: group
        name: Domain Users
    "};

    #[test]
    fn new_user_is_enabled_member() -> anyhow::Result<()> {
        let server = MemoryServer::new();
        let mut handle = server.connect("sam.ldb")?;
        handle.add_ldif(DOMAIN)?;

        let user_dn = new_user(&mut handle, "alice", "alice", "s3cret!")?;
        assert_eq!(user_dn.to_string(), "CN=alice,CN=Users,DC=example,DC=com");

        let db = server.database("sam.ldb").unwrap_or_default();
        let user = db.get(&user_dn).cloned().unwrap_or_else(|| Entry::new(Dn::root()));
        assert_eq!(user.first("userAccountControl"), Some("544"));
        assert_eq!(
            user.first("memberOf"),
            Some("CN=Domain Users,CN=Users,DC=example,DC=com")
        );
        let group = db.get(&Dn::parse("CN=Domain Users,CN=Users,DC=example,DC=com")?);
        assert_eq!(
            group.and_then(|g| g.first("member")),
            Some("CN=alice,CN=Users,DC=example,DC=com")
        );
        Ok(())
    }

    #[test]
    fn duplicate_user_leaves_group_untouched() -> anyhow::Result<()> {
        let server = MemoryServer::new();
        let mut handle = server.connect("sam.ldb")?;
        handle.add_ldif(DOMAIN)?;
        new_user(&mut handle, "bob", "bob", "pw")?;
        let before = server.database("sam.ldb");
        assert!(new_user(&mut handle, "bob", "bob", "pw").is_err());
        assert_eq!(server.database("sam.ldb"), before);
        Ok(())
    }

    #[test]
    fn enable_account_without_object_class() -> anyhow::Result<()> {
        let server = MemoryServer::new();
        let mut handle = server.connect("sam.ldb")?;
        handle.add_ldif(indoc! {"
            dn: CN=Guest,CN=Users,DC=example,DC=com
            userAccountControl: 66082
        "})?;
        let guest = Dn::parse("CN=Guest,CN=Users,DC=example,DC=com")?;
        enable_account(&mut handle, &guest)?;
        let control = server
            .database("sam.ldb")
            .and_then(|db| db.get(&guest).and_then(|e| e.first("userAccountControl").map(str::to_owned)));
        assert_eq!(control.as_deref(), Some("66080"));
        Ok(())
    }
}
