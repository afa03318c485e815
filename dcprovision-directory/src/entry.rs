use crate::Dn;

/// A named, multi-valued attribute of an [`Entry`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// The attribute name, compared case-insensitively
    pub name: String,
    /// The values in the order they were added
    pub values: Vec<String>,
}

impl Attribute {
    /// Constructs an attribute from a name and its values
    pub fn new<V: Into<String>>(name: &str, values: impl IntoIterator<Item = V>) -> Self {
        Attribute {
            name: name.to_owned(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// A directory record: a distinguished name plus its attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    dn: Dn,
    attributes: Vec<Attribute>,
}

impl Entry {
    /// Constructs an entry with no attributes
    pub fn new(dn: Dn) -> Self {
        Entry {
            dn,
            attributes: vec![],
        }
    }

    /// Adds a value, builder style
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.add_value(name, value);
        self
    }

    /// The distinguished name of the entry
    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    /// Consumes the entry, returning its name
    pub fn into_dn(self) -> Dn {
        self.dn
    }

    pub(crate) fn set_dn(&mut self, dn: Dn) {
        self.dn = dn;
    }

    /// The attributes of the entry in insertion order
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// The values of the named attribute, if present
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|a| a.is_named(name))
            .map(|a| a.values.as_slice())
    }

    /// The first value of the named attribute, if present
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// The values the named attribute presents to a search filter
    ///
    /// The entry's name is visible as `dn` and `distinguishedName` even when not stored.
    pub fn values_for(&self, name: &str) -> Vec<String> {
        if name.eq_ignore_ascii_case("dn") || name.eq_ignore_ascii_case("distinguishedName") {
            return vec![self.dn.to_string()];
        }
        self.get(name).map(<[String]>::to_vec).unwrap_or_default()
    }

    /// Appends a value to the named attribute, creating it if needed
    ///
    /// Returns false if the value was already present (compared case-insensitively).
    pub fn add_value(&mut self, name: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.is_named(name)) {
            Some(attr) => {
                if attr.values.iter().any(|v| v.eq_ignore_ascii_case(&value)) {
                    return false;
                }
                attr.values.push(value);
            }
            None => self.attributes.push(Attribute::new(name, [value])),
        }
        true
    }

    /// Replaces all values of the named attribute; an empty list removes it
    pub fn set(&mut self, name: &str, values: Vec<String>) {
        if values.is_empty() {
            self.remove(name);
            return;
        }
        match self.attributes.iter_mut().find(|a| a.is_named(name)) {
            Some(attr) => attr.values = values,
            None => self.attributes.push(Attribute {
                name: name.to_owned(),
                values,
            }),
        }
    }

    /// Removes the named attribute, returning whether it was present
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|a| !a.is_named(name));
        self.attributes.len() != before
    }

    /// Removes one value of the named attribute, returning whether it was present
    pub fn remove_value(&mut self, name: &str, value: &str) -> bool {
        let Some(attr) = self.attributes.iter_mut().find(|a| a.is_named(name)) else {
            return false;
        };
        let before = attr.values.len();
        attr.values.retain(|v| !v.eq_ignore_ascii_case(value));
        let removed = attr.values.len() != before;
        if attr.values.is_empty() {
            self.remove(name);
        }
        removed
    }

    /// Keeps only the requested attributes; `*` or an empty request keeps everything
    pub fn project(mut self, requested: &[&str]) -> Self {
        if requested.is_empty() || requested.contains(&"*") {
            return self;
        }
        self.attributes
            .retain(|a| requested.iter().any(|r| a.is_named(r)));
        self
    }
}
