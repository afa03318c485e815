use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};

use super::{
    attributes::{Kind, Metadata, Mode, DEFAULT_DIRECTORY_MODE, DEFAULT_FILE_MODE},
    Filesystem,
};

/// An in-memory representation of a file system
#[derive(Debug)]
pub struct MemoryFilesystem {
    map: HashMap<Utf8PathBuf, Node>,
}

#[derive(Debug)]
enum Node {
    File { content: String, mode: Mode },
    Directory { children: Vec<String>, mode: Mode },
}

impl MemoryFilesystem {
    /// Constructs a new file system containing only the root directory
    pub fn new() -> Self {
        let mut map = HashMap::new();
        map.insert(
            "/".into(),
            Node::Directory {
                children: vec![],
                mode: DEFAULT_DIRECTORY_MODE,
            },
        );
        MemoryFilesystem { map }
    }

    /// Returns the set of all paths present
    pub fn to_path_set(&self) -> HashSet<&Utf8Path> {
        self.map.keys().map(|k| k.as_path()).collect()
    }

    fn insert_node(&mut self, path: &Utf8Path, node: Node) -> Result<()> {
        let (parent, name) = super::split(path).ok_or_else(|| anyhow!("Cannot create {}", path))?;
        match self.map.get_mut(parent) {
            Some(Node::Directory { children, .. }) => {
                if !children.iter().any(|child| child == name) {
                    children.push(name.to_owned());
                }
            }
            Some(Node::File { .. }) => bail!("Parent is not a directory: {}", parent),
            None => bail!("Parent directory not found: {}", parent),
        }
        self.map.insert(path.to_owned(), node);
        Ok(())
    }
}

impl Default for MemoryFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Filesystem for MemoryFilesystem {
    fn create_directory(&mut self, path: impl AsRef<Utf8Path>, mode: Option<Mode>) -> Result<()> {
        let path = path.as_ref();
        if self.map.contains_key(path) {
            bail!("File exists: {}", path);
        }
        self.insert_node(
            path,
            Node::Directory {
                children: vec![],
                mode: mode.unwrap_or(DEFAULT_DIRECTORY_MODE),
            },
        )
        .with_context(|| format!("Creating directory: {path}"))
    }

    fn load(&self, path: impl AsRef<Utf8Path>) -> Result<String> {
        let path = path.as_ref();
        match self.map.get(path) {
            None => Err(anyhow!("No such file or directory: {}", path)),
            Some(Node::File { content, .. }) => Ok(content.clone()),
            Some(Node::Directory { .. }) => Err(anyhow!("Tried to read a directory: {}", path)),
        }
    }

    fn save(
        &mut self,
        path: impl AsRef<Utf8Path>,
        content: &str,
        mode: Option<Mode>,
    ) -> Result<()> {
        let path = path.as_ref();
        let mode = match self.map.get(path) {
            Some(Node::Directory { .. }) => bail!("Cannot overwrite directory: {}", path),
            Some(Node::File { mode: existing, .. }) => mode.unwrap_or(*existing),
            None => mode.unwrap_or(DEFAULT_FILE_MODE),
        };
        self.insert_node(
            path,
            Node::File {
                content: content.to_owned(),
                mode,
            },
        )
        .with_context(|| format!("Saving file: {path}"))
    }

    fn remove(&mut self, path: impl AsRef<Utf8Path>) -> Result<()> {
        let path = path.as_ref();
        match self.map.get(path) {
            None => bail!("No such file or directory: {}", path),
            Some(Node::Directory { children, .. }) if !children.is_empty() => {
                bail!("Directory not empty: {}", path)
            }
            Some(_) => {}
        }
        self.map.remove(path);
        if let Some((parent, name)) = super::split(path) {
            if let Some(Node::Directory { children, .. }) = self.map.get_mut(parent) {
                children.retain(|child| child != name);
            }
        }
        Ok(())
    }

    fn stat(&self, path: impl AsRef<Utf8Path>) -> Option<Metadata> {
        self.map.get(path.as_ref()).map(|node| match node {
            Node::File { content, mode } => Metadata {
                kind: Kind::File,
                len: content.len() as u64,
                mode: *mode,
            },
            Node::Directory { mode, .. } => Metadata {
                kind: Kind::Directory,
                len: 0,
                mode: *mode,
            },
        })
    }

    fn list_directory(&self, path: impl AsRef<Utf8Path>) -> Result<Vec<String>> {
        let path = path.as_ref();
        match self.map.get(path) {
            None => Err(anyhow!("No such file or directory: {}", path)),
            Some(Node::Directory { children, .. }) => Ok(children.clone()),
            Some(Node::File { .. }) => Err(anyhow!("Tried to list directory of a file")),
        }
        .with_context(|| format!("Listing directory: {path}"))
    }
}
