use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    os::unix::fs::OpenOptionsExt,
};

use camino::{Utf8Path, Utf8PathBuf};

use crate::{
    parse_ldif, write_ldif, Change, Database, Directory, DirectoryError, DirectoryProvider, Dn,
    Entry, Filter, Scope,
};

/// Database files hold secrets, so they are only readable by their owner
const DATABASE_FILE_MODE: u32 = 0o600;

/// A directory provider persisting each database as an LDIF file
///
/// The database name is the path of its file. A file that cannot be read or parsed makes
/// [`connect`](DirectoryProvider::connect) fail; removing the storage deletes the file.
#[derive(Debug, Clone, Default)]
pub struct LdifFileServer;

impl LdifFileServer {
    /// Constructs the provider
    pub fn new() -> Self {
        LdifFileServer
    }
}

impl DirectoryProvider for LdifFileServer {
    type Handle = FileHandle;

    fn connect(&self, url: &str) -> Result<FileHandle, DirectoryError> {
        let path = Utf8PathBuf::from(url);
        let storage = |e: &dyn std::fmt::Display| DirectoryError::Storage(format!("{path}: {e}"));
        let committed = match fs::read_to_string(&path) {
            Ok(text) => parse_ldif(&text)
                .and_then(Database::from_records)
                .map_err(|e| storage(&e))?,
            Err(e) if e.kind() == ErrorKind::NotFound => Database::new(),
            Err(e) => return Err(storage(&e)),
        };
        tracing::debug!("Opened {} ({} records)", path, committed.len());
        Ok(FileHandle {
            path,
            committed,
            working: None,
            closed: false,
        })
    }

    fn remove_storage(&self, url: &str) -> Result<(), DirectoryError> {
        match fs::remove_file(url) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DirectoryError::Storage(format!("{url}: {e}"))),
        }
    }
}

/// A connection to one LDIF-file database
#[derive(Debug)]
pub struct FileHandle {
    path: Utf8PathBuf,
    committed: Database,
    working: Option<Database>,
    closed: bool,
}

impl FileHandle {
    /// The path of the file backing the database
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn check_open(&self) -> Result<(), DirectoryError> {
        if self.closed {
            return Err(DirectoryError::Unavailable(format!(
                "{}: connection closed",
                self.path
            )));
        }
        Ok(())
    }

    /// Rewrites the file from the committed records, replacing it in one step
    fn flush(&self) -> Result<(), DirectoryError> {
        let storage = |e: std::io::Error| DirectoryError::Storage(format!("{}: {e}", self.path));
        let staging = Utf8PathBuf::from(format!("{}.tmp", self.path));
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(DATABASE_FILE_MODE)
            .open(&staging)
            .map_err(storage)?;
        file.write_all(write_ldif(self.committed.entries()).as_bytes())
            .map_err(storage)?;
        fs::rename(&staging, &self.path).map_err(storage)?;
        tracing::trace!("Wrote {} ({} records)", self.path, self.committed.len());
        Ok(())
    }

    fn write<T>(
        &mut self,
        change: impl FnOnce(&mut Database) -> Result<T, DirectoryError>,
    ) -> Result<T, DirectoryError> {
        self.check_open()?;
        match &mut self.working {
            Some(database) => change(database),
            None => {
                let result = change(&mut self.committed)?;
                self.flush()?;
                Ok(result)
            }
        }
    }
}

impl Directory for FileHandle {
    fn transaction_start(&mut self) -> Result<(), DirectoryError> {
        self.check_open()?;
        if self.working.is_some() {
            return Err(DirectoryError::Transaction(format!(
                "{}: transaction already open",
                self.path
            )));
        }
        self.working = Some(self.committed.clone());
        Ok(())
    }

    fn transaction_commit(&mut self) -> Result<(), DirectoryError> {
        self.check_open()?;
        let working = self.working.take().ok_or_else(|| {
            DirectoryError::Transaction(format!("{}: no transaction open", self.path))
        })?;
        let previous = std::mem::replace(&mut self.committed, working);
        if let Err(e) = self.flush() {
            self.committed = previous;
            return Err(DirectoryError::Transaction(e.to_string()));
        }
        Ok(())
    }

    fn transaction_cancel(&mut self) -> Result<(), DirectoryError> {
        self.working = None;
        Ok(())
    }

    fn search(
        &self,
        base: &Dn,
        scope: Scope,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<Entry>, DirectoryError> {
        self.check_open()?;
        let filter = Filter::parse(filter)?;
        self.working
            .as_ref()
            .unwrap_or(&self.committed)
            .search(base, scope, &filter, attributes)
    }

    fn add(&mut self, entry: &Entry) -> Result<(), DirectoryError> {
        self.write(|database| database.add(entry.clone()))
    }

    fn modify(&mut self, dn: &Dn, changes: &[Change]) -> Result<(), DirectoryError> {
        self.write(|database| database.modify(dn, changes))
    }

    fn delete(&mut self, dn: &Dn) -> Result<(), DirectoryError> {
        self.write(|database| database.delete(dn))
    }

    fn rename(&mut self, dn: &Dn, new_dn: &Dn) -> Result<(), DirectoryError> {
        self.write(|database| database.rename(dn, new_dn))
    }

    fn close(&mut self) -> Result<(), DirectoryError> {
        self.working = None;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use indoc::indoc;

    use super::*;

    fn temp_root() -> anyhow::Result<(tempfile::TempDir, Utf8PathBuf)> {
        let dir = tempfile::tempdir()?;
        let root = Utf8PathBuf::from_path_buf(dir.path().to_owned())
            .map_err(|p| anyhow::anyhow!("Non UTF-8 temp path: {:?}", p))?;
        Ok((dir, root))
    }

    #[test]
    fn commit_persists_and_reconnect_reads_back() -> anyhow::Result<()> {
        let (_guard, root) = temp_root()?;
        let url = root.join("secrets.ldb");
        let server = LdifFileServer::new();

        let mut handle = server.connect(url.as_str())?;
        handle.transaction_start()?;
        handle.add_ldif(indoc! {"
            dn: CN=LSA Secrets
            cn: LSA Secrets
        "})?;
        assert!(!url.exists());
        handle.transaction_commit()?;
        handle.close()?;

        let mode = fs::metadata(&url)?.permissions().mode() & 0o777;
        assert_eq!(mode, DATABASE_FILE_MODE);

        let handle = server.connect(url.as_str())?;
        let found = handle.search(
            &Dn::parse("CN=LSA Secrets")?,
            Scope::Base,
            "(cn=*)",
            &["cn"],
        )?;
        assert_eq!(found.len(), 1);
        Ok(())
    }

    #[test]
    fn unparsable_file_fails_connect_until_removed() -> anyhow::Result<()> {
        let (_guard, root) = temp_root()?;
        let url = root.join("sam.ldb");
        fs::write(&url, "this is not ldif\n")?;
        let server = LdifFileServer::new();
        assert!(matches!(
            server.connect(url.as_str()),
            Err(DirectoryError::Storage(_))
        ));
        server.remove_storage(url.as_str())?;
        server.remove_storage(url.as_str())?;
        assert!(server.connect(url.as_str()).is_ok());
        Ok(())
    }

    #[test]
    fn cancelled_transaction_leaves_file_untouched() -> anyhow::Result<()> {
        let (_guard, root) = temp_root()?;
        let url = root.join("hklm.ldb");
        let server = LdifFileServer::new();
        let mut handle = server.connect(url.as_str())?;
        handle.add_ldif("dn: HIVE=NONE\nhive: NONE\n")?;
        let before = fs::read_to_string(&url)?;

        handle.transaction_start()?;
        handle.delete(&Dn::parse("HIVE=NONE")?)?;
        handle.transaction_cancel()?;
        assert_eq!(fs::read_to_string(&url)?, before);
        Ok(())
    }
}
