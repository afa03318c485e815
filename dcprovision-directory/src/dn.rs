use std::{
    cmp::Ordering,
    fmt::Display,
    hash::{Hash, Hasher},
};

use crate::DirectoryError;

/// A distinguished name, the hierarchical address of a directory record
///
/// Names compare case-insensitively. The empty name addresses the root of the store and
/// names beginning with `@` (for example `@INDEXLIST`) are single-component metadata
/// records that sit outside the naming hierarchy.
#[derive(Debug, Clone)]
pub struct Dn {
    components: Vec<Component>,
    special: Option<String>,
    key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Component {
    attribute: String,
    value: String,
}

impl Dn {
    /// Parses a distinguished name from its string form
    pub fn parse(text: &str) -> Result<Dn, DirectoryError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Dn::root());
        }
        if text.starts_with('@') {
            if text.contains(',') || text.contains('=') {
                return Err(DirectoryError::InvalidDn(text.to_owned()));
            }
            return Ok(Dn::from_parts(vec![], Some(text.to_owned())));
        }
        let mut components = vec![];
        for part in split_unescaped(text, ',') {
            let (attribute, value) = part
                .split_once('=')
                .ok_or_else(|| DirectoryError::InvalidDn(text.to_owned()))?;
            let (attribute, value) = (attribute.trim(), value.trim());
            if attribute.is_empty()
                || value.is_empty()
                || !attribute
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            {
                return Err(DirectoryError::InvalidDn(text.to_owned()));
            }
            components.push(Component {
                attribute: attribute.to_owned(),
                value: value.to_owned(),
            });
        }
        Ok(Dn::from_parts(components, None))
    }

    /// The empty name, addressing the root of the store (and its `@ROOTDSE` record)
    pub fn root() -> Dn {
        Dn::from_parts(vec![], None)
    }

    fn from_parts(components: Vec<Component>, special: Option<String>) -> Dn {
        let key = match &special {
            Some(special) => special.to_ascii_lowercase(),
            None => components
                .iter()
                .map(|c| format!("{}={}", c.attribute, c.value).to_ascii_lowercase())
                .collect::<Vec<_>>()
                .join(","),
        };
        Dn {
            components,
            special,
            key,
        }
    }

    /// Returns a new name for the child `attribute=value` of this one
    pub fn child(&self, attribute: &str, value: &str) -> Dn {
        let mut components = vec![Component {
            attribute: attribute.to_owned(),
            value: value.to_owned(),
        }];
        components.extend(self.components.iter().cloned());
        Dn::from_parts(components, None)
    }

    /// True for the empty name
    pub fn is_root(&self) -> bool {
        self.components.is_empty() && self.special.is_none()
    }

    /// True for `@`-prefixed metadata records
    pub fn is_special(&self) -> bool {
        self.special.is_some()
    }

    /// The number of components in the name (zero for the root and special records)
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// The immediate parent, if the name has one
    pub fn parent(&self) -> Option<Dn> {
        if self.components.len() < 2 {
            return None;
        }
        Some(Dn::from_parts(self.components[1..].to_vec(), None))
    }

    /// The attribute and value of the leftmost component
    pub fn rdn(&self) -> Option<(&str, &str)> {
        self.components
            .first()
            .map(|c| (c.attribute.as_str(), c.value.as_str()))
    }

    /// The value of the leftmost component
    pub fn rdn_value(&self) -> Option<&str> {
        self.rdn().map(|(_, value)| value)
    }

    /// True if this name lies strictly below `ancestor` in the hierarchy
    ///
    /// Every ordinary name lies below the root; special records lie below nothing.
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        if self.is_special() || ancestor.is_special() {
            return false;
        }
        let (ours, theirs) = (self.components.len(), ancestor.components.len());
        ours > theirs && self.key.ends_with(&ancestor.key) && {
            let prefix = &self.key[..self.key.len() - ancestor.key.len()];
            theirs == 0 || prefix.ends_with(',')
        }
    }

    /// True if this name is `base` itself or lies below it
    pub fn is_within(&self, base: &Dn) -> bool {
        self == base || self.is_descendant_of(base)
    }

    /// The case-folded form used for comparison
    pub fn normalized(&self) -> &str {
        &self.key
    }
}

/// Splits on `separator` where it is not escaped with a backslash
fn split_unescaped(text: &str, separator: char) -> Vec<&str> {
    let mut parts = vec![];
    let mut start = 0;
    let mut escaped = false;
    for (index, c) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == separator {
            parts.push(&text[start..index]);
            start = index + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

impl Display for Dn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(special) = &self.special {
            return write!(f, "{special}");
        }
        for (index, component) in self.components.iter().enumerate() {
            if index > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", component.attribute, component.value)?;
        }
        Ok(())
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state)
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl TryFrom<&str> for Dn {
    type Error = DirectoryError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Dn::parse(value)
    }
}
