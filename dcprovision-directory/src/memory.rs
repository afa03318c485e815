use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};

use crate::{
    Change, Database, Directory, DirectoryError, DirectoryProvider, Dn, Entry, Filter, Scope,
};

/// Failures a [`MemoryServer`] can be told to produce
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Databases whose storage cannot be read; connecting fails until the storage is removed
    pub corrupt: HashSet<String>,
    /// Databases that can never be connected to
    pub unreachable: HashSet<String>,
    /// The add (counted from 1 across the whole server) that fails
    pub fail_add_at: Option<usize>,
    /// Records that refuse deletion
    pub protected: HashSet<Dn>,
    /// How many of the upcoming searches fail
    pub failing_searches: usize,
    /// The most records a single search returns
    pub size_limit: Option<usize>,
    /// Every commit fails, discarding the transaction
    pub fail_commit: bool,
}

#[derive(Debug, Default)]
struct State {
    databases: HashMap<String, Database>,
    faults: Faults,
    adds: usize,
    connects: Vec<String>,
    removed: Vec<String>,
}

/// An in-process directory server holding any number of named databases
///
/// Clones share the same databases, so a test can keep one clone to inspect what a
/// provisioning run did through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryServer {
    state: Rc<RefCell<State>>,
}

impl MemoryServer {
    /// Constructs a server with no databases and no faults
    pub fn new() -> Self {
        MemoryServer::default()
    }

    /// Adjusts the faults the server injects
    pub fn set_faults(&self, adjust: impl FnOnce(&mut Faults)) {
        adjust(&mut self.state.borrow_mut().faults);
    }

    /// Returns a copy of the committed contents of a database
    pub fn database(&self, url: &str) -> Option<Database> {
        self.state.borrow().databases.get(url).cloned()
    }

    /// The names of every database, sorted
    pub fn databases(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state.borrow().databases.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every connect attempt made, in order
    pub fn connect_attempts(&self) -> Vec<String> {
        self.state.borrow().connects.clone()
    }

    /// Every database whose storage was removed, in order
    pub fn removed(&self) -> Vec<String> {
        self.state.borrow().removed.clone()
    }
}

impl DirectoryProvider for MemoryServer {
    type Handle = MemoryHandle;

    fn connect(&self, url: &str) -> Result<MemoryHandle, DirectoryError> {
        let mut state = self.state.borrow_mut();
        state.connects.push(url.to_owned());
        if state.faults.unreachable.contains(url) {
            return Err(DirectoryError::Unavailable(format!("{url}: connection refused")));
        }
        if state.faults.corrupt.contains(url) {
            return Err(DirectoryError::Storage(format!("{url}: unreadable database")));
        }
        state.databases.entry(url.to_owned()).or_default();
        Ok(MemoryHandle {
            state: self.state.clone(),
            url: url.to_owned(),
            working: None,
            closed: false,
        })
    }

    fn remove_storage(&self, url: &str) -> Result<(), DirectoryError> {
        let mut state = self.state.borrow_mut();
        state.databases.remove(url);
        state.faults.corrupt.remove(url);
        state.removed.push(url.to_owned());
        Ok(())
    }
}

/// A connection to one database of a [`MemoryServer`]
#[derive(Debug)]
pub struct MemoryHandle {
    state: Rc<RefCell<State>>,
    url: String,
    working: Option<Database>,
    closed: bool,
}

impl MemoryHandle {
    fn check_open(&self) -> Result<(), DirectoryError> {
        if self.closed {
            return Err(DirectoryError::Unavailable(format!(
                "{}: connection closed",
                self.url
            )));
        }
        Ok(())
    }

    fn storage_removed(&self) -> DirectoryError {
        DirectoryError::Unavailable(format!("{}: storage removed", self.url))
    }

    /// Runs a change against the open transaction, or directly against the database
    fn write<T>(
        &mut self,
        change: impl FnOnce(&mut Database) -> Result<T, DirectoryError>,
    ) -> Result<T, DirectoryError> {
        self.check_open()?;
        match &mut self.working {
            Some(database) => change(database),
            None => {
                let error = self.storage_removed();
                let mut state = self.state.borrow_mut();
                let database = state.databases.get_mut(&self.url).ok_or(error)?;
                change(database)
            }
        }
    }
}

impl Directory for MemoryHandle {
    fn transaction_start(&mut self) -> Result<(), DirectoryError> {
        self.check_open()?;
        if self.working.is_some() {
            return Err(DirectoryError::Transaction(format!(
                "{}: transaction already open",
                self.url
            )));
        }
        let snapshot = self
            .state
            .borrow()
            .databases
            .get(&self.url)
            .cloned()
            .ok_or_else(|| self.storage_removed())?;
        self.working = Some(snapshot);
        Ok(())
    }

    fn transaction_commit(&mut self) -> Result<(), DirectoryError> {
        self.check_open()?;
        let working = self.working.take().ok_or_else(|| {
            DirectoryError::Transaction(format!("{}: no transaction open", self.url))
        })?;
        let mut state = self.state.borrow_mut();
        if state.faults.fail_commit {
            return Err(DirectoryError::Transaction(format!(
                "{}: commit failed",
                self.url
            )));
        }
        state.databases.insert(self.url.clone(), working);
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
        let mut state = self.state.borrow_mut();
        if state.faults.failing_searches > 0 {
            state.faults.failing_searches -= 1;
            return Err(DirectoryError::Unavailable(format!(
                "{}: search timed out",
                self.url
            )));
        }
        let mut found = match &self.working {
            Some(database) => database.search(base, scope, &filter, attributes)?,
            None => state
                .databases
                .get(&self.url)
                .ok_or_else(|| self.storage_removed())?
                .search(base, scope, &filter, attributes)?,
        };
        if let Some(limit) = state.faults.size_limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    fn add(&mut self, entry: &Entry) -> Result<(), DirectoryError> {
        {
            let mut state = self.state.borrow_mut();
            state.adds += 1;
            if state.faults.fail_add_at == Some(state.adds) {
                return Err(DirectoryError::Unavailable(format!(
                    "{}: failed adding {}",
                    self.url,
                    entry.dn()
                )));
            }
        }
        self.write(|database| database.add(entry.clone()))
    }

    fn modify(&mut self, dn: &Dn, changes: &[Change]) -> Result<(), DirectoryError> {
        self.write(|database| database.modify(dn, changes))
    }

    fn delete(&mut self, dn: &Dn) -> Result<(), DirectoryError> {
        if self.state.borrow().faults.protected.contains(dn) {
            return Err(DirectoryError::InsufficientAccess(format!(
                "{dn} may not be deleted"
            )));
        }
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
    use indoc::indoc;

    use super::*;

    const SEED: &str = indoc! {"
        dn: DC=example,DC=com
        objectClass: domainDNS

        dn: CN=Users,DC=example,DC=com
        objectClass: container
    "};

    fn count(server: &MemoryServer, url: &str) -> usize {
        server.database(url).map(|db| db.len()).unwrap_or(0)
    }

    #[test]
    fn uncommitted_changes_are_invisible() -> anyhow::Result<()> {
        let server = MemoryServer::new();
        let mut handle = server.connect("sam.ldb")?;
        handle.transaction_start()?;
        handle.add_ldif(SEED)?;
        assert_eq!(count(&server, "sam.ldb"), 0);
        handle.transaction_commit()?;
        assert_eq!(count(&server, "sam.ldb"), 2);
        Ok(())
    }

    #[test]
    fn cancel_discards() -> anyhow::Result<()> {
        let server = MemoryServer::new();
        let mut handle = server.connect("sam.ldb")?;
        handle.transaction_start()?;
        handle.add_ldif(SEED)?;
        handle.transaction_cancel()?;
        assert_eq!(count(&server, "sam.ldb"), 0);
        assert!(handle.transaction_commit().is_err());
        Ok(())
    }

    #[test]
    fn nth_add_fails() -> anyhow::Result<()> {
        let server = MemoryServer::new();
        server.set_faults(|f| f.fail_add_at = Some(2));
        let mut handle = server.connect("sam.ldb")?;
        let err = handle.add_ldif(SEED).unwrap_err();
        assert!(matches!(err, DirectoryError::Unavailable(_)));
        assert_eq!(count(&server, "sam.ldb"), 1);
        Ok(())
    }

    #[test]
    fn protected_records_refuse_deletion() -> anyhow::Result<()> {
        let server = MemoryServer::new();
        let users = Dn::parse("CN=Users,DC=example,DC=com")?;
        server.set_faults(|f| {
            f.protected.insert(users.clone());
        });
        let mut handle = server.connect("sam.ldb")?;
        handle.add_ldif(SEED)?;
        assert!(matches!(
            handle.delete(&users),
            Err(DirectoryError::InsufficientAccess(_))
        ));
        Ok(())
    }

    #[test]
    fn corrupt_storage_recovers_after_removal() -> anyhow::Result<()> {
        let server = MemoryServer::new();
        server.set_faults(|f| {
            f.corrupt.insert("secrets.ldb".into());
        });
        assert!(server.connect("secrets.ldb").is_err());
        server.remove_storage("secrets.ldb")?;
        assert!(server.connect("secrets.ldb").is_ok());
        assert_eq!(server.connect_attempts().len(), 2);
        assert_eq!(server.removed(), vec!["secrets.ldb".to_owned()]);
        Ok(())
    }

    #[test]
    fn transient_search_failures_and_size_limit() -> anyhow::Result<()> {
        let server = MemoryServer::new();
        let mut handle = server.connect("sam.ldb")?;
        handle.add_ldif(SEED)?;
        server.set_faults(|f| {
            f.failing_searches = 1;
            f.size_limit = Some(1);
        });
        let base = Dn::parse("DC=example,DC=com")?;
        assert!(handle.search(&base, Scope::Subtree, "(objectClass=*)", &[]).is_err());
        assert_eq!(
            handle.search(&base, Scope::Subtree, "(objectClass=*)", &[])?.len(),
            1
        );
        Ok(())
    }

    #[test]
    fn closed_handle_refuses_work() -> anyhow::Result<()> {
        let server = MemoryServer::new();
        let mut handle = server.connect("sam.ldb")?;
        handle.close()?;
        assert!(handle.add_ldif(SEED).is_err());
        Ok(())
    }
}
