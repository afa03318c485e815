use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt::{Debug, Display},
    rc::Rc,
};

/// A zero-argument function producing a fresh value each time a placeholder is rendered
pub type Generator = Rc<dyn Fn() -> String>;

/// The value bound to a name within a [`Context`]
#[derive(Clone)]
pub enum Value {
    /// A plain string
    Text(String),
    /// An integer, rendered in decimal
    Integer(i64),
    /// A list of strings, rendered comma separated
    List(Vec<String>),
    /// A function invoked once per placeholder occurrence
    Generator(Generator),
}

impl Value {
    /// Wraps a closure as a [`Value::Generator`]
    pub fn generator(f: impl Fn() -> String + 'static) -> Self {
        Value::Generator(Rc::new(f))
    }

    /// Returns the inner string of a [`Value::Text`]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Produces the string to substitute for this value, invoking it if it is a generator
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            Value::Text(s) => Cow::Borrowed(s),
            Value::Integer(i) => Cow::Owned(i.to_string()),
            Value::List(items) => Cow::Owned(items.join(",")),
            Value::Generator(f) => Cow::Owned(f()),
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Value::Integer(i) => f.debug_tuple("Integer").field(i).finish(),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items)
    }
}

/// A mapping from variable name to [`Value`], against which templates are rendered
///
/// Example:
/// ```
/// use dcprovision_template::{Context, Value};
///
/// let mut context = Context::new();
/// context.set("REALM", "EXAMPLE.COM");
/// context.set("SERIAL", 42i64);
/// context.set_generator("NOW", || "20240101".to_owned());
///
/// assert_eq!(context.get_str("REALM"), Some("EXAMPLE.COM"));
/// assert_eq!(context.resolve("SERIAL").as_deref(), Some("42"));
/// assert!(matches!(context.get("NOW"), Some(Value::Generator(_))));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl Context {
    /// Creates an empty context
    pub fn new() -> Self {
        Default::default()
    }

    /// Binds `name` to `value`, replacing any previous binding
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Binds `name` to a generator function
    pub fn set_generator(&mut self, name: impl Into<String>, f: impl Fn() -> String + 'static) {
        self.values.insert(name.into(), Value::generator(f));
    }

    /// Builder form of [`Context::set`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Returns the value bound to `name`, if any
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns the string bound to `name` if it is a plain [`Value::Text`]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Removes and returns the binding for `name`
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Renders the value bound to `name` (invoking generators)
    pub fn resolve(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(Value::render)
    }

    /// Copies every binding of `other` into this context, replacing existing names
    pub fn extend(&mut self, other: &Context) {
        self.values
            .extend(other.values.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Context variables:")?;
        if self.values.is_empty() {
            write!(f, "\n  (no variables)")?;
        }
        for (name, value) in self.values.iter() {
            if is_secret(name) {
                write!(f, "\n  ${name} = (hidden)")?;
                continue;
            }
            match value {
                Value::Generator(_) => write!(f, "\n  ${name} = (generator)")?,
                value => write!(f, "\n  ${name} = \"{}\"", value.render())?,
            }
        }
        Ok(())
    }
}

fn is_secret(name: &str) -> bool {
    name.ends_with("PASS") || name.ends_with("PASS_B64")
}
