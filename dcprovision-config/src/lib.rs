//! Configuration for the system
//!
//! The server configuration lives in `dcprovision.toml`:
//! ```
//! # use dcprovision_config::{ConfigFile, ServerRole};
//! let config: ConfigFile = r#"
//!     realm = "EXAMPLE.COM"
//!     workgroup = "EXAMPLE"
//!     server_role = "domain controller"
//!     private_dir = "/var/lib/dcprovision/private"
//!     setup_dir = "/usr/share/dcprovision/setup"
//!     lock_dir = "/var/lock/dcprovision"
//! "#.try_into()?;
//! assert_eq!(config.server_role, ServerRole::DomainController);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! From it (and the DNS domain being provisioned) [`ProvisionPaths`] derives the location of
//! every database and generated file.
#![warn(missing_docs)]

mod file;
mod names;
mod paths;
mod role;

pub use self::{file::ConfigFile, names::NameMap, paths::ProvisionPaths, role::ServerRole};
