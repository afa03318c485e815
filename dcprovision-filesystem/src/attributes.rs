use std::fmt::Debug;

/// The default mode for directories (`0o755` or `rwxr-xr-x`)
pub const DEFAULT_DIRECTORY_MODE: Mode = Mode(0o755);
/// The default mode for files (`0o644` or `rw-r--r--`)
pub const DEFAULT_FILE_MODE: Mode = Mode(0o644);
/// The mode for files holding secrets (`0o600` or `rw-------`)
pub const PRIVATE_FILE_MODE: Mode = Mode(0o600);

/// The mode for directories holding secrets (`0o700` or `rwx------`)
pub const PRIVATE_DIRECTORY_MODE: Mode = Mode(0o700);

/// The kind of entry found at a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A regular file
    File,
    /// A directory
    Directory,
    /// Anything else (device, socket, ...)
    Other,
}

/// What is known about an existing path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    /// The kind of entry
    pub kind: Kind,
    /// Size in bytes (zero for directories)
    pub len: u64,
    /// The UNIX permissions of the entry
    pub mode: Mode,
}

/// UNIX permissions
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Mode(u16);

impl Mode {
    /// Returns the inner numeric value of the permissions
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl Debug for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Mode(0o{:03o})", self.0)
    }
}

impl From<u16> for Mode {
    fn from(value: u16) -> Self {
        Mode(value & 0o7777)
    }
}

impl From<Mode> for u16 {
    fn from(mode: Mode) -> Self {
        mode.0
    }
}

impl From<Mode> for u32 {
    fn from(mode: Mode) -> Self {
        mode.0 as u32
    }
}
