use std::collections::BTreeMap;

use crate::{Change, DirectoryError, Dn, Entry, Filter, LdifRecord, Scope};

/// The records of one logical database, keyed by distinguished name
///
/// This is the storage shared by the backends; transactions are layered on top by taking a
/// working copy and writing it back on commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Database {
    entries: BTreeMap<Dn, Entry>,
}

impl Database {
    /// Constructs an empty database
    pub fn new() -> Self {
        Database::default()
    }

    /// Builds a database from LDIF add records
    pub fn from_records(records: Vec<LdifRecord>) -> Result<Self, DirectoryError> {
        let mut database = Database::new();
        for record in records {
            database.apply(record)?;
        }
        Ok(database)
    }

    /// The number of records held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no records are held
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a record by name
    pub fn get(&self, dn: &Dn) -> Option<&Entry> {
        self.entries.get(dn)
    }

    /// Iterates over every record
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Applies one LDIF record
    pub fn apply(&mut self, record: LdifRecord) -> Result<(), DirectoryError> {
        match record {
            LdifRecord::Add(entry) => self.add(entry),
            LdifRecord::Modify { dn, changes } => self.modify(&dn, &changes),
            LdifRecord::Delete(dn) => self.delete(&dn),
            LdifRecord::Rename { dn, new_dn } => self.rename(&dn, &new_dn),
        }
    }

    /// Adds a new record
    pub fn add(&mut self, entry: Entry) -> Result<(), DirectoryError> {
        if entry.dn().is_root() {
            return Err(DirectoryError::InvalidDn("cannot add the root".into()));
        }
        if self.entries.contains_key(entry.dn()) {
            return Err(DirectoryError::EntryAlreadyExists(entry.dn().to_string()));
        }
        tracing::trace!("Adding {}", entry.dn());
        self.entries.insert(entry.dn().clone(), entry);
        Ok(())
    }

    /// Applies attribute changes to an existing record
    ///
    /// The changes are all-or-nothing: a failing change leaves the record untouched.
    pub fn modify(&mut self, dn: &Dn, changes: &[Change]) -> Result<(), DirectoryError> {
        let existing = self
            .entries
            .get(dn)
            .ok_or_else(|| DirectoryError::NoSuchObject(dn.to_string()))?;
        let mut entry = existing.clone();
        for change in changes {
            match change {
                Change::Add(attribute) => {
                    for value in &attribute.values {
                        if !entry.add_value(&attribute.name, value.clone()) {
                            return Err(DirectoryError::AttributeOrValueExists(format!(
                                "{}: {} already has '{}'",
                                dn, attribute.name, value
                            )));
                        }
                    }
                }
                Change::Replace(attribute) => entry.set(&attribute.name, attribute.values.clone()),
                Change::Delete(attribute) if attribute.values.is_empty() => {
                    if !entry.remove(&attribute.name) {
                        return Err(no_such_attribute(dn, &attribute.name));
                    }
                }
                Change::Delete(attribute) => {
                    for value in &attribute.values {
                        if !entry.remove_value(&attribute.name, value) {
                            return Err(no_such_attribute(dn, &attribute.name));
                        }
                    }
                }
            }
        }
        tracing::trace!("Modified {} ({} changes)", dn, changes.len());
        self.entries.insert(dn.clone(), entry);
        Ok(())
    }

    /// Deletes a record that has no children
    pub fn delete(&mut self, dn: &Dn) -> Result<(), DirectoryError> {
        if !self.entries.contains_key(dn) {
            return Err(DirectoryError::NoSuchObject(dn.to_string()));
        }
        if self.has_children(dn) {
            return Err(DirectoryError::NotAllowedOnNonLeaf(dn.to_string()));
        }
        tracing::trace!("Deleting {}", dn);
        self.entries.remove(dn);
        Ok(())
    }

    /// Renames a record that has no children
    pub fn rename(&mut self, dn: &Dn, new_dn: &Dn) -> Result<(), DirectoryError> {
        if self.entries.contains_key(new_dn) {
            return Err(DirectoryError::EntryAlreadyExists(new_dn.to_string()));
        }
        if self.has_children(dn) {
            return Err(DirectoryError::NotAllowedOnNonLeaf(dn.to_string()));
        }
        let mut entry = self
            .entries
            .remove(dn)
            .ok_or_else(|| DirectoryError::NoSuchObject(dn.to_string()))?;
        if let (Some((old_attribute, _)), Some((attribute, value))) = (dn.rdn(), new_dn.rdn()) {
            entry.remove(old_attribute);
            entry.set(attribute, vec![value.to_owned()]);
        }
        entry.set_dn(new_dn.clone());
        tracing::trace!("Renamed {} to {}", dn, new_dn);
        self.entries.insert(new_dn.clone(), entry);
        Ok(())
    }

    /// Finds the records in `scope` of `base` matching `filter`
    ///
    /// A base search of the root reads the `@ROOTDSE` record.
    pub fn search(
        &self,
        base: &Dn,
        scope: Scope,
        filter: &Filter,
        attributes: &[&str],
    ) -> Result<Vec<Entry>, DirectoryError> {
        if base.is_root() && scope == Scope::Base {
            let rootdse = Dn::parse("@ROOTDSE")?;
            return Ok(self
                .entries
                .get(&rootdse)
                .filter(|entry| filter.matches(entry))
                .map(|entry| vec![entry.clone().project(attributes)])
                .unwrap_or_default());
        }
        if !base.is_root() && !self.entries.contains_key(base) {
            return Err(DirectoryError::NoSuchObject(base.to_string()));
        }
        Ok(self
            .entries
            .values()
            .filter(|entry| match scope {
                Scope::Base => entry.dn() == base,
                Scope::OneLevel => entry.dn().parent().as_ref() == Some(base)
                    || (base.is_root() && entry.dn().depth() == 1),
                Scope::Subtree => base.is_root() || entry.dn().is_within(base),
            })
            .filter(|entry| filter.matches(entry))
            .map(|entry| entry.clone().project(attributes))
            .collect())
    }

    fn has_children(&self, dn: &Dn) -> bool {
        !dn.is_special() && self.entries.keys().any(|key| key.parent().as_ref() == Some(dn))
    }
}

fn no_such_attribute(dn: &Dn, attribute: &str) -> DirectoryError {
    DirectoryError::NoSuchAttribute(format!("{dn}: {attribute}"))
}
