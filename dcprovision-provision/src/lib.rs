//! Provisioning a directory-backed domain controller from templates.
//!
//! Provisioning starts from a [`Context`][dcprovision_template::Context] of named values.
//! [`guess_configuration`] fills one in from a handful of names, generating fresh identifiers
//! and secrets and resolving the local accounts that directory principals map onto:
//!
//! ```
//! use dcprovision_provision::{guess_configuration, GuessOptions, StaticNameService};
//!
//! let options = GuessOptions {
//!     realm: Some("example.com".into()),
//!     domain: Some("example".into()),
//!     host_name: Some("dc1".into()),
//!     host_ip: Some("192.0.2.10".into()),
//!     ..Default::default()
//! };
//! let nss = StaticNameService::new(["root", "nobody"], ["nogroup", "users", "wheel", "backup"]);
//! let context = guess_configuration(&options, &nss)?;
//! assert_eq!(context.get_str("DOMAINDN"), Some("DC=example,DC=com"));
//! # Ok::<(), dcprovision_provision::ProvisionError>(())
//! ```
//!
//! A [`ProvisionRun`] then renders the setup templates into configuration files and
//! directory databases, one transaction per step, reporting progress through a
//! [`MessageSink`].
#![warn(missing_docs)]

use std::borrow::Cow;

use dcprovision_template::Context;

mod accounts;
mod credentials;
mod error;
mod guess;
pub mod mappings;
mod message;
mod nss;
mod provision;
pub mod secrets;
mod setup;
pub mod time;

pub use self::{
    accounts::{enable_account, new_user, ACCOUNT_DISABLED},
    credentials::{KeytabRefresher, UnmanagedKeytabs},
    error::ProvisionError,
    guess::{
        base_dn, guess_configuration, system_host_name, valid_dns_domain, valid_netbios_name,
        GuessOptions, DEFAULT_SITE, NETBIOS_NAME_MAX,
    },
    mappings::setup_name_mappings,
    message::{MessageSink, Quiet},
    nss::{find_nss, IdentityRole, Lookup, NameService, StaticNameService, SystemNameService},
    provision::{install_ok, normalize_context, ProvisionRun, UsnCounter},
    secrets::PASSWORD_LENGTH,
    setup::{open_ldb, OnConflict, SetupOptions},
};

#[cfg(test)]
mod tests;

/// Looks up a value every step depends on
pub(crate) fn required(context: &Context, name: &str) -> Result<String, ProvisionError> {
    context
        .resolve(name)
        .map(Cow::into_owned)
        .ok_or_else(|| ProvisionError::InvalidConfiguration {
            field: name.to_owned(),
            rule: "must be set".into(),
        })
}
