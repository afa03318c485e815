//! The directory store consumed by provisioning.
//!
//! A [`DirectoryProvider`] opens named logical databases, handing back a [`Directory`]
//! handle that supports transactions, searches and record changes. Two providers are
//! included: [`MemoryServer`], which keeps databases in process (and can inject faults), and
//! [`LdifFileServer`], which persists each database as an LDIF file.
//!
//! The [`erase`] module drives partitions and whole databases back to empty.
#![warn(missing_docs)]

use thiserror::Error;

mod database;
mod dn;
mod entry;
pub mod erase;
mod file;
mod filter;
mod ldif;
mod memory;

pub use self::{
    database::Database,
    dn::Dn,
    entry::{Attribute, Entry},
    file::{FileHandle, LdifFileServer},
    filter::Filter,
    ldif::{parse_ldif, write_entry, write_ldif, Change, LdifRecord},
    memory::{Faults, MemoryHandle, MemoryServer},
};

/// A failed directory operation, carrying the store's own description
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The named record (or search base) does not exist
    #[error("No such object: {0}")]
    NoSuchObject(String),
    /// A record with the name already exists
    #[error("Entry already exists: {0}")]
    EntryAlreadyExists(String),
    /// The record has children and cannot be deleted or renamed
    #[error("Not allowed on non-leaf: {0}")]
    NotAllowedOnNonLeaf(String),
    /// The store refused the operation
    #[error("Insufficient access rights: {0}")]
    InsufficientAccess(String),
    /// A modify named an attribute or value the record does not have
    #[error("No such attribute: {0}")]
    NoSuchAttribute(String),
    /// A modify added a value the record already has
    #[error("Attribute or value exists: {0}")]
    AttributeOrValueExists(String),
    /// A distinguished name could not be parsed
    #[error("Invalid DN syntax: {0}")]
    InvalidDn(String),
    /// LDIF text could not be parsed
    #[error("Invalid LDIF: {0}")]
    Ldif(String),
    /// A search filter could not be parsed
    #[error("Invalid search filter: {0}")]
    Filter(String),
    /// The store could not be reached or did not answer
    #[error("Unavailable: {0}")]
    Unavailable(String),
    /// A transaction could not be started, committed or cancelled
    #[error("Transaction failed: {0}")]
    Transaction(String),
    /// The underlying storage could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),
}

/// How far below the search base a search reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only the base record itself
    Base,
    /// The immediate children of the base
    OneLevel,
    /// The base and everything below it
    Subtree,
}

/// A connection to one logical database
pub trait Directory {
    /// Begins a transaction; changes stay invisible to other handles until committed
    fn transaction_start(&mut self) -> Result<(), DirectoryError>;

    /// Makes the changes of the open transaction durable
    fn transaction_commit(&mut self) -> Result<(), DirectoryError>;

    /// Discards the changes of the open transaction
    fn transaction_cancel(&mut self) -> Result<(), DirectoryError>;

    /// Finds the records in `scope` of `base` matching `filter`
    ///
    /// Only the requested `attributes` are returned; an empty list or `*` returns all.
    fn search(
        &self,
        base: &Dn,
        scope: Scope,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<Entry>, DirectoryError>;

    /// Adds a new record
    fn add(&mut self, entry: &Entry) -> Result<(), DirectoryError>;

    /// Changes attributes of an existing record
    fn modify(&mut self, dn: &Dn, changes: &[Change]) -> Result<(), DirectoryError>;

    /// Deletes a record without children
    fn delete(&mut self, dn: &Dn) -> Result<(), DirectoryError>;

    /// Renames a record without children
    fn rename(&mut self, dn: &Dn, new_dn: &Dn) -> Result<(), DirectoryError>;

    /// Releases the connection, cancelling any open transaction
    fn close(&mut self) -> Result<(), DirectoryError>;

    /// Applies one parsed LDIF record
    fn apply(&mut self, record: &LdifRecord) -> Result<(), DirectoryError> {
        match record {
            LdifRecord::Add(entry) => self.add(entry),
            LdifRecord::Modify { dn, changes } => self.modify(dn, changes),
            LdifRecord::Delete(dn) => self.delete(dn),
            LdifRecord::Rename { dn, new_dn } => self.rename(dn, new_dn),
        }
    }

    /// Adds every record of an LDIF document, stopping at the first failure
    fn add_ldif(&mut self, ldif: &str) -> Result<usize, DirectoryError> {
        let records = parse_ldif(ldif)?;
        for record in &records {
            match record {
                LdifRecord::Add(entry) => self.add(entry)?,
                other => {
                    return Err(DirectoryError::Ldif(format!(
                        "expected an add record for {}",
                        other.dn()
                    )))
                }
            }
        }
        Ok(records.len())
    }

    /// Applies every change record of an LDIF document, stopping at the first failure
    fn modify_ldif(&mut self, ldif: &str) -> Result<usize, DirectoryError> {
        let records = parse_ldif(ldif)?;
        for record in &records {
            self.apply(record)?;
        }
        Ok(records.len())
    }

    /// Returns the first value of `attribute` on the single record found, if any
    fn search_one(
        &self,
        base: &Dn,
        scope: Scope,
        filter: &str,
        attribute: &str,
    ) -> Result<Option<String>, DirectoryError> {
        let found = self.search(base, scope, filter, &[attribute])?;
        match found.as_slice() {
            [entry] => Ok(entry.first(attribute).map(str::to_owned)),
            _ => Ok(None),
        }
    }
}

/// Opens logical databases by name
pub trait DirectoryProvider {
    /// The connection type handed out
    type Handle: Directory;

    /// Connects to the named database, creating it empty if it does not exist
    fn connect(&self, url: &str) -> Result<Self::Handle, DirectoryError>;

    /// Destroys the storage behind the named database so the next connect starts fresh
    fn remove_storage(&self, url: &str) -> Result<(), DirectoryError>;
}
