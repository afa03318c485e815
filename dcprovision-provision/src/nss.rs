use std::collections::HashSet;

use users::{Groups, Users, UsersCache};

use crate::ProvisionError;

/// Looks up local accounts and groups by name
pub trait NameService {
    /// Returns true if a user account called `name` exists
    fn has_user(&self, name: &str) -> bool;

    /// Returns true if a group called `name` exists
    fn has_group(&self, name: &str) -> bool;
}

/// The system's own user and group databases
pub struct SystemNameService {
    cache: UsersCache,
}

impl SystemNameService {
    /// Constructs a lookup against the running system
    pub fn new() -> Self {
        SystemNameService {
            cache: UsersCache::new(),
        }
    }
}

impl Default for SystemNameService {
    fn default() -> Self {
        Self::new()
    }
}

impl NameService for SystemNameService {
    fn has_user(&self, name: &str) -> bool {
        self.cache.get_user_by_name(name).is_some()
    }

    fn has_group(&self, name: &str) -> bool {
        self.cache.get_group_by_name(name).is_some()
    }
}

/// A fixed set of known users and groups
#[derive(Debug, Clone, Default)]
pub struct StaticNameService {
    users: HashSet<String>,
    groups: HashSet<String>,
}

impl StaticNameService {
    /// Constructs a lookup knowing only the given names
    pub fn new<'a>(
        users: impl IntoIterator<Item = &'a str>,
        groups: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        StaticNameService {
            users: users.into_iter().map(str::to_owned).collect(),
            groups: groups.into_iter().map(str::to_owned).collect(),
        }
    }
}

impl NameService for StaticNameService {
    fn has_user(&self, name: &str) -> bool {
        self.users.contains(name)
    }

    fn has_group(&self, name: &str) -> bool {
        self.groups.contains(name)
    }
}

/// Which database a role is looked up in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The user database
    User,
    /// The group database
    Group,
}

/// A local identity that directory principals are mapped onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityRole {
    /// The context key the resolved name is bound to
    pub key: &'static str,
    /// The name operators use to override the role
    pub name: &'static str,
    /// Where the candidates are looked up
    pub lookup: Lookup,
    /// Names tried in order
    pub candidates: &'static [&'static str],
}

/// Every role, with the names tried on a typical system
pub const IDENTITY_ROLES: [IdentityRole; 6] = [
    IdentityRole {
        key: "ROOT",
        name: "root",
        lookup: Lookup::User,
        candidates: &["root"],
    },
    IdentityRole {
        key: "NOBODY",
        name: "nobody",
        lookup: Lookup::User,
        candidates: &["nobody"],
    },
    IdentityRole {
        key: "NOGROUP",
        name: "nogroup",
        lookup: Lookup::Group,
        candidates: &["nogroup", "nobody"],
    },
    IdentityRole {
        key: "USERS",
        name: "users",
        lookup: Lookup::Group,
        candidates: &["users", "guest", "other", "unknown", "usr"],
    },
    IdentityRole {
        key: "WHEEL",
        name: "wheel",
        lookup: Lookup::Group,
        candidates: &["wheel", "root", "staff", "adm"],
    },
    IdentityRole {
        key: "BACKUP",
        name: "backup",
        lookup: Lookup::Group,
        candidates: &["backup", "wheel", "root", "staff"],
    },
];

/// Returns the first candidate the lookup function resolves
///
/// ```
/// use dcprovision_provision::find_nss;
///
/// let known = ["staff"];
/// let found = find_nss(|name| known.contains(&name), &["wheel", "root", "staff"])?;
/// assert_eq!(found, "staff");
/// # Ok::<(), dcprovision_provision::ProvisionError>(())
/// ```
pub fn find_nss(
    lookup: impl Fn(&str) -> bool,
    candidates: &[&str],
) -> Result<String, ProvisionError> {
    candidates
        .iter()
        .find(|name| lookup(name))
        .map(|name| name.to_string())
        .ok_or_else(|| {
            ProvisionError::InsufficientEnvironment(format!(
                "Unable to find a local name among: {}",
                candidates.join(", ")
            ))
        })
}

impl IdentityRole {
    /// Resolves the role against `nss`, trying `pinned` alone if given
    pub fn resolve(
        &self,
        nss: &impl NameService,
        pinned: Option<&str>,
    ) -> Result<String, ProvisionError> {
        let pinned = pinned.map(|name| [name]);
        let candidates = match &pinned {
            Some(name) => &name[..],
            None => self.candidates,
        };
        let found = match self.lookup {
            Lookup::User => find_nss(|name| nss.has_user(name), candidates),
            Lookup::Group => find_nss(|name| nss.has_group(name), candidates),
        };
        found.map_err(|e| match e {
            ProvisionError::InsufficientEnvironment(detail) => {
                ProvisionError::InsufficientEnvironment(format!("{} role: {}", self.name, detail))
            }
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_resolving_candidate_wins() -> Result<(), ProvisionError> {
        let nss = StaticNameService::new([], ["root", "staff"]);
        let found = find_nss(|name| nss.has_group(name), &["wheel", "root", "staff"])?;
        assert_eq!(found, "root");
        Ok(())
    }

    #[test]
    fn only_later_candidate_resolves() -> Result<(), ProvisionError> {
        let nss = StaticNameService::new([], ["staff"]);
        let found = find_nss(|name| nss.has_group(name), &["wheel", "root", "staff"])?;
        assert_eq!(found, "staff");
        Ok(())
    }

    #[test]
    fn nothing_resolves() {
        let nss = StaticNameService::new(["wheel"], []);
        let err = find_nss(|name| nss.has_group(name), &["wheel", "root", "staff"]).unwrap_err();
        assert!(matches!(err, ProvisionError::InsufficientEnvironment(_)));
        assert!(err.to_string().contains("wheel, root, staff"));
    }

    #[test]
    fn roles_look_in_the_right_database() -> Result<(), ProvisionError> {
        let nss = StaticNameService::new(["root", "nobody"], ["nobody", "users", "adm", "staff"]);
        let resolved: Vec<String> = IDENTITY_ROLES
            .iter()
            .map(|role| role.resolve(&nss, None))
            .collect::<Result<_, _>>()?;
        assert_eq!(resolved, ["root", "nobody", "nobody", "users", "staff", "staff"]);
        Ok(())
    }

    #[test]
    fn pinned_name_must_resolve() -> Result<(), ProvisionError> {
        let nss = StaticNameService::new([], ["wheel", "admins"]);
        let wheel = &IDENTITY_ROLES[4];
        assert_eq!(wheel.resolve(&nss, Some("admins"))?, "admins");
        let err = wheel.resolve(&nss, Some("operators")).unwrap_err();
        assert!(err.to_string().contains("wheel role"));
        Ok(())
    }
}
