use std::{
    fs::{self, OpenOptions},
    io::Write,
    os::unix::fs::{OpenOptionsExt, PermissionsExt},
};

use anyhow::{Context, Result};
use camino::Utf8Path;
use nix::sys::stat::{stat, SFlag};

use super::{
    attributes::{Kind, Metadata, Mode, DEFAULT_DIRECTORY_MODE, DEFAULT_FILE_MODE},
    Filesystem,
};

/// Access to a real file system
#[derive(Debug, Default)]
pub struct DiskFilesystem;

impl DiskFilesystem {
    /// Constructs a new accessor for the real file system
    pub fn new() -> Self {
        DiskFilesystem
    }
}

impl Filesystem for DiskFilesystem {
    fn create_directory(&mut self, path: impl AsRef<Utf8Path>, mode: Option<Mode>) -> Result<()> {
        let path = path.as_ref();
        fs::create_dir(path).with_context(|| format!("Creating directory: {path}"))?;
        let mode = mode.unwrap_or(DEFAULT_DIRECTORY_MODE);
        fs::set_permissions(path, PermissionsExt::from_mode(mode.into()))?;
        Ok(())
    }

    fn load(&self, path: impl AsRef<Utf8Path>) -> Result<String> {
        let path = path.as_ref();
        fs::read_to_string(path).with_context(|| format!("Reading file: {path}"))
    }

    fn save(
        &mut self,
        path: impl AsRef<Utf8Path>,
        content: &str,
        mode: Option<Mode>,
    ) -> Result<()> {
        let path = path.as_ref();
        tracing::trace!("Saving {} ({} bytes)", path, content.len());
        // A new file is created with its final mode so secrets are never briefly world readable
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode.unwrap_or(DEFAULT_FILE_MODE).into())
            .open(path)
            .with_context(|| format!("Saving file: {path}"))?;
        file.write_all(content.as_bytes())?;
        if let Some(mode) = mode {
            fs::set_permissions(path, PermissionsExt::from_mode(mode.into()))?;
        }
        Ok(())
    }

    fn remove(&mut self, path: impl AsRef<Utf8Path>) -> Result<()> {
        let path = path.as_ref();
        if self.is_directory(path) {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        }
        .with_context(|| format!("Removing: {path}"))
    }

    fn stat(&self, path: impl AsRef<Utf8Path>) -> Option<Metadata> {
        let st = stat(path.as_ref().as_std_path()).ok()?;
        let format = SFlag::from_bits_truncate(st.st_mode) & SFlag::S_IFMT;
        let kind = if format == SFlag::S_IFREG {
            Kind::File
        } else if format == SFlag::S_IFDIR {
            Kind::Directory
        } else {
            Kind::Other
        };
        Some(Metadata {
            kind,
            len: st.st_size as u64,
            mode: Mode::from((st.st_mode & 0o7777) as u16),
        })
    }

    fn list_directory(&self, path: impl AsRef<Utf8Path>) -> Result<Vec<String>> {
        let path = path.as_ref();
        let mut listing = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("Listing directory: {path}"))? {
            let entry = entry?;
            listing.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(listing)
    }
}
