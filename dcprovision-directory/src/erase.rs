//! Driving partitions and whole databases back to empty.
//!
//! Stores may refuse some deletes (protected records, non-leaf entries whose children are
//! still present) and searches against slow backends may fail or return partial results, so
//! partition erasure repeats search-and-delete passes until nothing is left, no further
//! progress is made, or the iteration budget runs out.
use std::{cmp::Reverse, collections::HashSet};

use crate::{Directory, DirectoryError, Dn, Scope};

/// The default bound on search-and-delete passes per partition
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Matches every record of a partition
const PARTITION_FILTER: &str = "(|(objectclass=*)(distinguishedName=*))";

/// Matches every record of a database except its root metadata record
const DATABASE_FILTER: &str =
    "(&(|(objectclass=*)(distinguishedName=*))(!(distinguishedName=@BASEINFO)))";

/// Internal index and metadata records removed before a whole-database erase
pub const SPECIAL_RECORDS: [&str; 7] = [
    "@INDEXLIST",
    "@ATTRIBUTES",
    "@SUBCLASSES",
    "@MODULES",
    "@OPTIONS",
    "@PARTITION",
    "@KLUDGEACL",
];

/// Tunables of [`erase_partitions`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseOptions {
    /// The most search-and-delete passes made over one partition
    pub max_iterations: usize,
}

impl Default for EraseOptions {
    fn default() -> Self {
        EraseOptions {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// The outcome of erasing one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionReport {
    /// The root of the partition
    pub basedn: Dn,
    /// How many passes were made
    pub iterations: usize,
    /// Records still present at the end, or `None` if no search ever succeeded
    pub remaining: Option<usize>,
}

impl PartitionReport {
    /// True if the partition is known to be empty
    pub fn is_empty(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// The outcome of [`erase_partitions`], one report per partition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EraseReport {
    /// Per-partition results, in the order the partitions were given
    pub partitions: Vec<PartitionReport>,
}

impl EraseReport {
    /// True if every partition is known to be empty
    pub fn is_complete(&self) -> bool {
        self.partitions.iter().all(PartitionReport::is_empty)
    }

    /// The partitions left with records (or of unknown state)
    pub fn incomplete(&self) -> impl Iterator<Item = &PartitionReport> {
        self.partitions.iter().filter(|p| !p.is_empty())
    }

    /// The total number of records known to remain
    pub fn stragglers(&self) -> usize {
        self.partitions.iter().filter_map(|p| p.remaining).sum()
    }
}

/// Counters of the convergence loop for one partition
#[derive(Debug, Default)]
struct EraseProgress {
    previous_remaining: Option<usize>,
    current_remaining: Option<usize>,
    iteration: usize,
}

/// Reads the partition roots listed in the `namingContexts` of the root DSE
pub fn naming_contexts<D: Directory + ?Sized>(handle: &D) -> Result<Vec<Dn>, DirectoryError> {
    let found = handle.search(
        &Dn::root(),
        Scope::Base,
        "(namingContexts=*)",
        &["namingContexts"],
    )?;
    let mut contexts = vec![];
    for entry in &found {
        for value in entry.get("namingContexts").unwrap_or_default() {
            contexts.push(Dn::parse(value)?);
        }
    }
    Ok(contexts)
}

/// Erases every record below (and including) each of `basedns`
///
/// Meant to run inside an open transaction on `handle`. Failures are logged and retried
/// on the next pass; partitions that cannot be emptied are reported, not returned as errors.
pub fn erase_partitions<D: Directory + ?Sized>(
    handle: &mut D,
    basedns: &[Dn],
    options: &EraseOptions,
) -> EraseReport {
    let partitions = basedns
        .iter()
        .map(|basedn| erase_partition(handle, basedn, options))
        .collect();
    let report = EraseReport { partitions };
    for partition in report.incomplete() {
        match partition.remaining {
            Some(remaining) => tracing::warn!(
                "Erasing {} left {} records after {} iterations",
                partition.basedn,
                remaining,
                partition.iterations
            ),
            None => tracing::warn!(
                "Erasing {} could not search the partition in {} iterations",
                partition.basedn,
                partition.iterations
            ),
        }
    }
    report
}

fn erase_partition<D: Directory + ?Sized>(
    handle: &mut D,
    basedn: &Dn,
    options: &EraseOptions,
) -> PartitionReport {
    let mut progress = EraseProgress::default();
    let mut pending: Option<Vec<Dn>> = None;
    while progress.iteration < options.max_iterations {
        progress.iteration += 1;
        let records = match pending.take() {
            Some(records) => records,
            None => match search_partition(handle, basedn) {
                Ok(records) => records,
                Err(DirectoryError::NoSuchObject(_)) => {
                    progress.current_remaining = Some(0);
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        "Searching {} failed on iteration {}: {}",
                        basedn,
                        progress.iteration,
                        e
                    );
                    continue;
                }
            },
        };
        if records.is_empty() {
            progress.current_remaining = Some(0);
            break;
        }
        progress.previous_remaining = Some(records.len());
        let attempted: HashSet<Dn> = records.iter().cloned().collect();

        let deleted = delete_deepest_first(handle, records);

        match search_partition(handle, basedn) {
            Ok(remaining) => {
                progress.current_remaining = Some(remaining.len());
                if remaining.is_empty() {
                    break;
                }
                // A size-limited search keeps returning full batches while records vanish
                let vanished = attempted.len()
                    - remaining.iter().filter(|dn| attempted.contains(*dn)).count();
                if vanished == 0 && progress.current_remaining >= progress.previous_remaining {
                    tracing::debug!(
                        "Erasing {} reached a fixed point with {} records ({} deletes accepted)",
                        basedn,
                        remaining.len(),
                        deleted
                    );
                    break;
                }
                pending = Some(remaining);
            }
            Err(DirectoryError::NoSuchObject(_)) => {
                progress.current_remaining = Some(0);
                break;
            }
            Err(e) => {
                tracing::warn!(
                    "Searching {} failed on iteration {}: {}",
                    basedn,
                    progress.iteration,
                    e
                );
            }
        }
    }
    tracing::debug!(
        "Erased {} in {} iterations ({:?} remaining)",
        basedn,
        progress.iteration,
        progress.current_remaining
    );
    PartitionReport {
        basedn: basedn.clone(),
        iterations: progress.iteration,
        remaining: progress.current_remaining,
    }
}

fn search_partition<D: Directory + ?Sized>(
    handle: &D,
    basedn: &Dn,
) -> Result<Vec<Dn>, DirectoryError> {
    Ok(handle
        .search(basedn, Scope::Subtree, PARTITION_FILTER, &["distinguishedName"])?
        .into_iter()
        .map(|entry| entry.into_dn())
        .collect())
}

/// Deletes the records children first, returning how many were deleted
fn delete_deepest_first<D: Directory + ?Sized>(handle: &mut D, mut records: Vec<Dn>) -> usize {
    records.sort_by_key(|dn| Reverse(dn.depth()));
    let mut deleted = 0;
    for dn in &records {
        match handle.delete(dn) {
            Ok(()) => deleted += 1,
            Err(DirectoryError::NoSuchObject(_)) => {}
            Err(e) => tracing::debug!("Could not delete {}: {}", dn, e),
        }
    }
    deleted
}

/// The outcome of [`erase_database`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseOutcome {
    /// Nothing but the root metadata record remains
    Clean,
    /// Records survived the erase; the storage should be removed and recreated
    Unrecoverable {
        /// How many records remain
        remaining: usize,
    },
}

/// Erases a whole database in a single pass
///
/// Internal metadata records go first, then everything else except `@BASEINFO`.
pub fn erase_database<D: Directory + ?Sized>(
    handle: &mut D,
) -> Result<EraseOutcome, DirectoryError> {
    for special in SPECIAL_RECORDS {
        match handle.delete(&Dn::parse(special)?) {
            Ok(()) | Err(DirectoryError::NoSuchObject(_)) => {}
            Err(e) => tracing::debug!("Could not delete {}: {}", special, e),
        }
    }
    let records: Vec<Dn> = handle
        .search(&Dn::root(), Scope::Subtree, DATABASE_FILTER, &["distinguishedName"])?
        .into_iter()
        .map(|entry| entry.into_dn())
        .collect();
    delete_deepest_first(handle, records);

    let remaining = handle
        .search(&Dn::root(), Scope::Subtree, DATABASE_FILTER, &["distinguishedName"])?
        .len();
    if remaining == 0 {
        Ok(EraseOutcome::Clean)
    } else {
        tracing::warn!("Erase left {} records behind", remaining);
        Ok(EraseOutcome::Unrecoverable { remaining })
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{DirectoryProvider, Entry, MemoryHandle, MemoryServer};

    fn domain() -> Result<Dn, DirectoryError> {
        Dn::parse("DC=example,DC=com")
    }

    /// A partition of `users` leaf records below a container, plus the domain root
    fn seeded(users: usize) -> anyhow::Result<(MemoryServer, MemoryHandle)> {
        let server = MemoryServer::new();
        let mut handle = server.connect("sam.ldb")?;
        let domain = domain()?;
        let container = domain.child("CN", "Users");
        handle.add(&Entry::new(domain.clone()).with("objectClass", "domainDNS"))?;
        handle.add(&Entry::new(container.clone()).with("objectClass", "container"))?;
        for index in 0..users {
            let dn = container.child("CN", &format!("user{index}"));
            handle.add(&Entry::new(dn).with("objectClass", "user"))?;
        }
        Ok((server, handle))
    }

    fn remaining(handle: &MemoryHandle) -> anyhow::Result<usize> {
        Ok(handle
            .search(&Dn::root(), Scope::Subtree, "(distinguishedName=*)", &[])?
            .len())
    }

    #[test]
    fn deletable_partition_empties_in_one_pass() -> anyhow::Result<()> {
        let (_server, mut handle) = seeded(20)?;
        let report = erase_partitions(&mut handle, &[domain()?], &EraseOptions::default());
        assert!(report.is_complete());
        assert_eq!(report.partitions[0].iterations, 1);
        assert_eq!(remaining(&handle)?, 0);
        Ok(())
    }

    #[test]
    fn limited_batches_converge_within_ceiling() -> anyhow::Result<()> {
        // 23 users, the container and the domain root
        let (server, mut handle) = seeded(23)?;
        server.set_faults(|f| f.size_limit = Some(10));
        let report = erase_partitions(&mut handle, &[domain()?], &EraseOptions::default());
        assert!(report.is_complete());
        assert_eq!(report.partitions[0].iterations, (25 + 9) / 10);
        server.set_faults(|f| f.size_limit = None);
        assert_eq!(remaining(&handle)?, 0);
        Ok(())
    }

    #[test]
    fn undeletable_record_reported_as_single_straggler() -> anyhow::Result<()> {
        let (server, mut handle) = seeded(5)?;
        server.set_faults(|f| {
            f.protected.insert(Dn::parse("DC=example,DC=com").unwrap());
        });
        let report = erase_partitions(&mut handle, &[domain()?], &EraseOptions::default());
        assert!(!report.is_complete());
        assert_eq!(report.partitions[0].iterations, 2);
        assert_eq!(report.stragglers(), 1);
        Ok(())
    }

    #[test]
    fn undeletable_leaf_pins_its_ancestors() -> anyhow::Result<()> {
        let (server, mut handle) = seeded(5)?;
        let stuck = domain()?.child("CN", "Users").child("CN", "user3");
        server.set_faults(|f| {
            f.protected.insert(stuck.clone());
        });
        let report = erase_partitions(&mut handle, &[domain()?], &EraseOptions::default());
        assert_eq!(report.partitions[0].iterations, 2);
        assert_eq!(report.stragglers(), 3);
        Ok(())
    }

    #[test]
    fn transient_search_failure_retried_next_iteration() -> anyhow::Result<()> {
        let (server, mut handle) = seeded(3)?;
        server.set_faults(|f| f.failing_searches = 2);
        let report = erase_partitions(&mut handle, &[domain()?], &EraseOptions::default());
        assert!(report.is_complete());
        assert_eq!(report.partitions[0].iterations, 3);
        Ok(())
    }

    #[test]
    fn persistent_search_failure_bounded_by_budget() -> anyhow::Result<()> {
        let (server, mut handle) = seeded(3)?;
        server.set_faults(|f| f.failing_searches = usize::MAX);
        let options = EraseOptions { max_iterations: 4 };
        let report = erase_partitions(&mut handle, &[domain()?], &options);
        assert_eq!(report.partitions[0].iterations, 4);
        assert_eq!(report.partitions[0].remaining, None);
        assert!(!report.is_complete());
        Ok(())
    }

    #[test]
    fn missing_partition_is_empty() -> anyhow::Result<()> {
        let (_server, mut handle) = seeded(0)?;
        let report = erase_partitions(
            &mut handle,
            &[Dn::parse("CN=Configuration,DC=other")?],
            &EraseOptions::default(),
        );
        assert!(report.is_complete());
        Ok(())
    }

    /// Accepts every delete but only forwards those outside `kept`
    struct Lagging {
        inner: MemoryHandle,
        kept: Dn,
    }

    impl Directory for Lagging {
        fn transaction_start(&mut self) -> Result<(), DirectoryError> {
            self.inner.transaction_start()
        }
        fn transaction_commit(&mut self) -> Result<(), DirectoryError> {
            self.inner.transaction_commit()
        }
        fn transaction_cancel(&mut self) -> Result<(), DirectoryError> {
            self.inner.transaction_cancel()
        }
        fn search(
            &self,
            base: &Dn,
            scope: Scope,
            filter: &str,
            attributes: &[&str],
        ) -> Result<Vec<Entry>, DirectoryError> {
            self.inner.search(base, scope, filter, attributes)
        }
        fn add(&mut self, entry: &Entry) -> Result<(), DirectoryError> {
            self.inner.add(entry)
        }
        fn modify(&mut self, dn: &Dn, changes: &[crate::Change]) -> Result<(), DirectoryError> {
            self.inner.modify(dn, changes)
        }
        fn delete(&mut self, dn: &Dn) -> Result<(), DirectoryError> {
            if *dn == self.kept {
                return Ok(());
            }
            self.inner.delete(dn)
        }
        fn rename(&mut self, dn: &Dn, new_dn: &Dn) -> Result<(), DirectoryError> {
            self.inner.rename(dn, new_dn)
        }
        fn close(&mut self) -> Result<(), DirectoryError> {
            self.inner.close()
        }
    }

    #[test]
    fn accepted_delete_that_keeps_record_stops_early() -> anyhow::Result<()> {
        let (_server, inner) = seeded(0)?;
        let mut handle = Lagging {
            inner,
            kept: domain()?,
        };
        handle.delete(&domain()?.child("CN", "Users"))?;
        let report = erase_partitions(&mut handle, &[domain()?], &EraseOptions::default());
        assert_eq!(report.partitions[0].iterations, 1);
        assert_eq!(report.partitions[0].remaining, Some(1));
        Ok(())
    }

    #[test]
    fn naming_contexts_from_rootdse() -> anyhow::Result<()> {
        let server = MemoryServer::new();
        let mut handle = server.connect("sam.ldb")?;
        assert!(naming_contexts(&handle)?.is_empty());
        handle.add_ldif(indoc! {"
            dn: @ROOTDSE
            namingContexts: DC=example,DC=com
            namingContexts: CN=Configuration,DC=example,DC=com
        "})?;
        assert_eq!(
            naming_contexts(&handle)?,
            vec![
                domain()?,
                Dn::parse("CN=Configuration,DC=example,DC=com")?
            ]
        );
        Ok(())
    }

    #[test]
    fn erase_database_keeps_baseinfo() -> anyhow::Result<()> {
        let (server, mut handle) = seeded(2)?;
        handle.add_ldif(indoc! {"
            dn: @INDEXLIST
            @IDXATTR: cn

            dn: @BASEINFO
            sequenceNumber: 7

            dn: @ROOTDSE
            namingContexts: DC=example,DC=com
        "})?;
        assert_eq!(erase_database(&mut handle)?, EraseOutcome::Clean);
        let left = server.database("sam.ldb").map(|db| db.len());
        assert_eq!(left, Some(1));
        Ok(())
    }

    #[test]
    fn erase_database_reports_survivors() -> anyhow::Result<()> {
        let (server, mut handle) = seeded(2)?;
        let stuck = domain()?.child("CN", "Users").child("CN", "user0");
        server.set_faults(|f| {
            f.protected.insert(stuck.clone());
        });
        assert_eq!(
            erase_database(&mut handle)?,
            EraseOutcome::Unrecoverable { remaining: 3 }
        );
        Ok(())
    }
}
