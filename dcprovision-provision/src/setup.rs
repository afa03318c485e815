use anyhow::Context as _;
use camino::Utf8Path;
use dcprovision_config::ProvisionPaths;
use dcprovision_directory::{
    erase::{erase_database, EraseOutcome},
    parse_ldif, Directory, DirectoryError, DirectoryProvider, LdifRecord,
};
use dcprovision_filesystem::Filesystem;
use dcprovision_template::{render_text, Context};

use crate::{ProvisionError, ProvisionRun};

/// What a load does when the store refuses one of its records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnConflict {
    /// Fail the step, leaving its transaction uncommitted
    #[default]
    Abort,
    /// Report the refusal and carry on with the remaining records
    Ignore,
}

/// How a database is established from a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupOptions {
    /// Empty the database before loading
    pub erase: bool,
    /// Further LDIF appended to the rendered template
    pub extra: Option<String>,
    /// Whether refused records fail the step
    pub on_conflict: OnConflict,
}

impl Default for SetupOptions {
    fn default() -> Self {
        SetupOptions {
            erase: true,
            extra: None,
            on_conflict: OnConflict::Abort,
        }
    }
}

impl SetupOptions {
    /// Loads on top of what the database already holds
    pub fn keep_existing() -> Self {
        SetupOptions {
            erase: false,
            ..Default::default()
        }
    }

    /// Loads on top of existing data, tolerating records that are already there
    pub fn permitted_to_fail() -> Self {
        SetupOptions {
            erase: false,
            on_conflict: OnConflict::Ignore,
            ..Default::default()
        }
    }
}

/// Connects to a database, removing its storage and connecting once more if the first attempt
/// fails
pub fn open_ldb<P: DirectoryProvider>(provider: &P, url: &str) -> Result<P::Handle, ProvisionError> {
    match provider.connect(url) {
        Ok(handle) => Ok(handle),
        Err(e) => {
            tracing::warn!("Opening {} failed ({}), removing it and retrying", url, e);
            provider
                .remove_storage(url)
                .map_err(|e| ProvisionError::directory(url, e))?;
            provider
                .connect(url)
                .map_err(|e| ProvisionError::directory(url, e))
        }
    }
}

/// Cancels any open transaction and closes the handle, after a step has already failed
fn abandon<D: Directory>(handle: &mut D, url: &str) {
    if let Err(e) = handle.transaction_cancel() {
        tracing::debug!("Cancelling the transaction on {} failed: {}", url, e);
    }
    if let Err(e) = handle.close() {
        tracing::debug!("Closing {} failed: {}", url, e);
    }
}

impl<'a, FS, P> ProvisionRun<'a, FS, P>
where
    FS: Filesystem,
    P: DirectoryProvider,
{
    /// Loads the named template from the setup directory and renders it
    pub fn render_setup(
        &self,
        paths: &ProvisionPaths,
        template: &str,
        context: &Context,
    ) -> Result<String, ProvisionError> {
        let path = paths.setup_file(template);
        let text = self
            .filesystem
            .load(&path)
            .with_context(|| format!("Loading template {path}"))?;
        Ok(render_text(template, &text, context)?)
    }

    /// Renders a template into a file, replacing any previous file
    pub fn setup_file(
        &mut self,
        paths: &ProvisionPaths,
        template: &str,
        target: &Utf8Path,
        context: &Context,
    ) -> Result<(), ProvisionError> {
        let data = self.render_setup(paths, template, context)?;
        self.filesystem
            .remove_if_exists(target)
            .with_context(|| format!("Removing {target}"))?;
        self.filesystem
            .save(target, &data, None)
            .with_context(|| format!("Writing {target}"))?;
        tracing::debug!("Wrote {} from {}", target, template);
        Ok(())
    }

    /// Establishes a database from a template inside a single transaction
    ///
    /// Returns the number of records loaded.
    pub fn setup_ldb(
        &mut self,
        paths: &ProvisionPaths,
        template: &str,
        url: &str,
        context: &Context,
        options: &SetupOptions,
    ) -> Result<usize, ProvisionError> {
        self.in_transaction(url, options.erase, |run, handle| {
            run.setup_add_ldif(handle, paths, template, context, options)
        })
    }

    /// Applies a modify-only template to a database inside a single transaction
    pub fn modify_ldb(
        &mut self,
        paths: &ProvisionPaths,
        template: &str,
        url: &str,
        context: &Context,
    ) -> Result<usize, ProvisionError> {
        self.in_transaction(url, false, |run, handle| {
            run.setup_modify_ldif(handle, paths, template, context)
        })
    }

    /// Renders a template (plus any extra LDIF) and adds its records to an open database
    pub fn setup_add_ldif<D: Directory>(
        &mut self,
        handle: &mut D,
        paths: &ProvisionPaths,
        template: &str,
        context: &Context,
        options: &SetupOptions,
    ) -> Result<usize, ProvisionError> {
        let mut ldif = self.render_setup(paths, template, context)?;
        if let Some(extra) = &options.extra {
            ldif.push('\n');
            ldif.push_str(extra);
        }
        let records = parse_ldif(&ldif).map_err(|e| ProvisionError::directory(template, e))?;
        let mut added = 0;
        for record in &records {
            let LdifRecord::Add(entry) = record else {
                return Err(ProvisionError::DirectoryOperationFailed {
                    target: record.dn().to_string(),
                    message: format!("{template} may only add records"),
                });
            };
            match (handle.add(entry), options.on_conflict) {
                (Ok(()), _) => added += 1,
                (Err(e), OnConflict::Ignore) => {
                    self.message(&format!("ldb load failed: {}: {}", entry.dn(), e));
                }
                (Err(e), OnConflict::Abort) => {
                    return Err(ProvisionError::directory(entry.dn(), e));
                }
            }
        }
        tracing::debug!("Added {} of {} records from {}", added, records.len(), template);
        Ok(added)
    }

    /// Renders a template and applies its modify records to an open database
    pub fn setup_modify_ldif<D: Directory>(
        &mut self,
        handle: &mut D,
        paths: &ProvisionPaths,
        template: &str,
        context: &Context,
    ) -> Result<usize, ProvisionError> {
        let ldif = self.render_setup(paths, template, context)?;
        let records = parse_ldif(&ldif).map_err(|e| ProvisionError::directory(template, e))?;
        for record in &records {
            let LdifRecord::Modify { dn, changes } = record else {
                return Err(ProvisionError::DirectoryOperationFailed {
                    target: record.dn().to_string(),
                    message: format!("{template} may only modify records"),
                });
            };
            handle
                .modify(dn, changes)
                .map_err(|e| ProvisionError::directory(dn, e))?;
        }
        Ok(records.len())
    }

    /// Opens a database and runs `work` inside one transaction, committing only if it succeeds
    ///
    /// With `erase` the database is emptied first; a database that cannot be emptied is
    /// removed and recreated.
    pub(crate) fn in_transaction<T>(
        &mut self,
        url: &str,
        erase: bool,
        work: impl FnOnce(&mut Self, &mut P::Handle) -> Result<T, ProvisionError>,
    ) -> Result<T, ProvisionError> {
        let mut handle = open_ldb(self.provider, url)?;
        handle
            .transaction_start()
            .map_err(|e| ProvisionError::transaction(url, e))?;
        if erase {
            handle = self.erase_or_recreate(url, handle)?;
        }
        let value = match work(self, &mut handle) {
            Ok(value) => value,
            Err(e) => {
                abandon(&mut handle, url);
                return Err(e);
            }
        };
        if let Err(e) = handle.transaction_commit() {
            abandon(&mut handle, url);
            return Err(ProvisionError::transaction(url, e));
        }
        handle
            .close()
            .map_err(|e| ProvisionError::directory(url, e))?;
        Ok(value)
    }

    fn erase_or_recreate(
        &mut self,
        url: &str,
        mut handle: P::Handle,
    ) -> Result<P::Handle, ProvisionError> {
        let remaining = match erase_database(&mut handle) {
            Ok(EraseOutcome::Clean) => return Ok(handle),
            Ok(EraseOutcome::Unrecoverable { remaining }) => remaining,
            Err(e) => {
                abandon(&mut handle, url);
                return Err(ProvisionError::directory(url, e));
            }
        };
        self.message(&format!(
            "Erasing {url} left {remaining} records, recreating it"
        ));
        abandon(&mut handle, url);
        let storage = |e: DirectoryError| ProvisionError::directory(url, e);
        self.provider.remove_storage(url).map_err(storage)?;
        let mut handle = self.provider.connect(url).map_err(storage)?;
        handle
            .transaction_start()
            .map_err(|e| ProvisionError::transaction(url, e))?;
        Ok(handle)
    }
}
