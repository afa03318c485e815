use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};

/// Identity roles pinned to local account or group names
///
/// Parsed from the form `"role1:name1,role2:name2"`, for example
/// `"wheel:admin,backup:operator"`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NameMap(HashMap<String, String>);

impl NameMap {
    /// Returns the name pinned for `role`, if any
    pub fn get(&self, role: &str) -> Option<&str> {
        self.0.get(role).map(String::as_str)
    }

    /// Returns the roles that have a pinned name
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl TryFrom<&str> for NameMap {
    type Error = anyhow::Error;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let mut map = HashMap::new();
        for pair in line.split(',') {
            let (key, value) = pair
                .split_once(':')
                .ok_or_else(|| anyhow!("Expected role:name in \"{}\"", pair))?;
            if key.is_empty() || value.is_empty() {
                bail!("Role and name must be non-empty in \"{}\"", pair);
            }
            if value.contains(':') {
                bail!("Too many ':' in \"{}\"", pair);
            }
            map.insert(key.to_owned(), value.to_owned());
        }
        Ok(NameMap(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_map() -> Result<()> {
        let map = NameMap::try_from("wheel:admin,backup:operator")?;
        assert_eq!(map.get("wheel"), Some("admin"));
        assert_eq!(map.get("backup"), Some("operator"));
        assert_eq!(map.get("users"), None);
        Ok(())
    }

    #[test]
    fn malformed_pairs() {
        for text in ["wheel", "wheel:", ":admin", "wheel:admin:extra", "a:b,"] {
            assert!(NameMap::try_from(text).is_err(), "accepted {text:?}");
        }
    }
}
