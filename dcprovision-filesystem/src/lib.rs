//! Provides an abstract [`Filesystem`] trait, together with a physical ([`DiskFilesystem`])
//! and virtual ([`MemoryFilesystem`]) implementation.
//!
//! Provisioning only needs whole-file operations: templates are loaded, rendered artifacts are
//! saved (replacing any previous content) and stale files are removed.
#![warn(missing_docs)]

use anyhow::{bail, Result};
use camino::Utf8Path;

mod attributes;
mod memory;
mod physical;

pub use self::{
    attributes::{
        Kind, Metadata, Mode, DEFAULT_DIRECTORY_MODE, DEFAULT_FILE_MODE, PRIVATE_DIRECTORY_MODE,
        PRIVATE_FILE_MODE,
    },
    memory::MemoryFilesystem,
    physical::DiskFilesystem,
};

/// Operations of a file system
pub trait Filesystem {
    /// Create a directory at the given path, with an optional mode
    fn create_directory(&mut self, path: impl AsRef<Utf8Path>, mode: Option<Mode>) -> Result<()>;

    /// Create a directory and all of its parents
    fn create_directory_all(
        &mut self,
        path: impl AsRef<Utf8Path>,
        mode: Option<Mode>,
    ) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() && parent != "/" {
                self.create_directory_all(parent, mode)?;
            }
        }
        match self.stat(path) {
            None => self.create_directory(path, mode),
            Some(Metadata {
                kind: Kind::Directory,
                ..
            }) => Ok(()),
            Some(_) => bail!("Not a directory: {}", path),
        }
    }

    /// Reads the contents of the given file
    fn load(&self, path: impl AsRef<Utf8Path>) -> Result<String>;

    /// Writes the given content to a file, creating it or replacing what was there
    fn save(&mut self, path: impl AsRef<Utf8Path>, content: &str, mode: Option<Mode>)
        -> Result<()>;

    /// Removes the given file
    fn remove(&mut self, path: impl AsRef<Utf8Path>) -> Result<()>;

    /// Removes the given file if it exists, returning whether anything was removed
    fn remove_if_exists(&mut self, path: impl AsRef<Utf8Path>) -> Result<bool> {
        let path = path.as_ref();
        if self.exists(path) {
            self.remove(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Returns the metadata of the given path, or `None` if it does not exist
    fn stat(&self, path: impl AsRef<Utf8Path>) -> Option<Metadata>;

    /// Returns true if the path exists
    fn exists(&self, path: impl AsRef<Utf8Path>) -> bool {
        self.stat(path).is_some()
    }

    /// Returns true if the path is a directory
    fn is_directory(&self, path: impl AsRef<Utf8Path>) -> bool {
        matches!(self.stat(path), Some(m) if m.kind == Kind::Directory)
    }

    /// Returns true if the path is a regular file
    fn is_file(&self, path: impl AsRef<Utf8Path>) -> bool {
        matches!(self.stat(path), Some(m) if m.kind == Kind::File)
    }

    /// Lists the contents of the given directory
    fn list_directory(&self, path: impl AsRef<Utf8Path>) -> Result<Vec<String>>;
}

/// Splits the dirname and basename of the path if possible to do so
fn split(path: &Utf8Path) -> Option<(&Utf8Path, &str)> {
    path.as_str().rsplit_once('/').map(|(parent, child)| {
        if parent.is_empty() {
            ("/".into(), child)
        } else {
            (parent.into(), child)
        }
    })
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    #[test]
    fn split_paths() {
        assert_eq!(
            split(Utf8Path::new("/var/lib/sam.ldb")),
            Some((Utf8Path::new("/var/lib"), "sam.ldb"))
        );
        assert_eq!(split(Utf8Path::new("/top")), Some((Utf8Path::new("/"), "top")));
        assert_eq!(split(Utf8Path::new("relative")), None);
    }

    #[test]
    fn create_directory_all_is_idempotent() -> Result<()> {
        let mut fs = MemoryFilesystem::new();
        fs.create_directory_all("/var/lib/private", None)?;
        fs.create_directory_all("/var/lib/private", None)?;
        assert!(fs.is_directory("/var"));
        assert!(fs.is_directory("/var/lib/private"));
        Ok(())
    }

    #[test]
    fn create_directory_all_through_file_fails() -> Result<()> {
        let mut fs = MemoryFilesystem::new();
        fs.save("/file", "", None)?;
        assert!(fs.create_directory_all("/file/sub", None).is_err());
        Ok(())
    }

    #[test]
    fn remove_if_exists() -> Result<()> {
        let mut fs = MemoryFilesystem::new();
        assert!(!fs.remove_if_exists("/missing")?);
        fs.save("/present", "x", None)?;
        assert!(fs.remove_if_exists("/present")?);
        assert!(!fs.exists("/present"));
        Ok(())
    }
}
