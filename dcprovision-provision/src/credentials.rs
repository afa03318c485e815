use anyhow::Result;
use dcprovision_config::ProvisionPaths;

/// Exports fresh machine credentials once the secrets database is in place
pub trait KeytabRefresher {
    /// Rewrites every keytab from the secrets database
    fn refresh_all(&self, paths: &ProvisionPaths) -> Result<()>;
}

impl<F> KeytabRefresher for F
where
    F: Fn(&ProvisionPaths) -> Result<()>,
{
    fn refresh_all(&self, paths: &ProvisionPaths) -> Result<()> {
        self(paths)
    }
}

/// A refresher for installations whose keytabs are exported by another service
///
/// Reports success without writing anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnmanagedKeytabs;

impl KeytabRefresher for UnmanagedKeytabs {
    fn refresh_all(&self, paths: &ProvisionPaths) -> Result<()> {
        tracing::debug!(
            "Keytabs are not managed here; {} and {} are left untouched",
            paths.keytab,
            paths.dns_keytab
        );
        Ok(())
    }
}
