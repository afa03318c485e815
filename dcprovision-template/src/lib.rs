//! Flat `${NAME}` substitution of provisioning templates against a [`Context`].
//!
//! A [`Template`] is parsed once from its text and may be rendered any number of times. Each
//! placeholder occurrence is resolved independently: a [`Value::Generator`] bound to a name is
//! invoked again for every occurrence, so two `${NEWGUID}` placeholders receive two different
//! identifiers.
//!
//! ```
//! use dcprovision_template::{render_text, Context};
//!
//! let context = Context::new()
//!     .with("DOMAINDN", "DC=example,DC=com")
//!     .with("DESC", "World");
//! let ldif = render_text(
//!     "foreign.ldif",
//!     "dn: CN=S-1-1-0,CN=ForeignSecurityPrincipals,${DOMAINDN}\ndescription: ${DESC}\n",
//!     &context,
//! )?;
//! assert_eq!(
//!     ldif,
//!     "dn: CN=S-1-1-0,CN=ForeignSecurityPrincipals,DC=example,DC=com\ndescription: World\n"
//! );
//! # Ok::<(), dcprovision_template::TemplateError>(())
//! ```
//!
//! There is no control flow; a template referencing a name absent from the context fails with
//! [`TemplateError::MissingVariable`].
#![warn(missing_docs)]

use thiserror::Error;

mod context;
mod template;
mod text;

pub use self::{
    context::{Context, Generator, Value},
    template::{Identifier, Template, Token},
    text::{parse_tokens, ParseError},
};

/// Failure to render a template
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The template names a variable with no binding in the context
    #[error("Undefined variable '{variable}' in template '{template}'")]
    MissingVariable {
        /// The unbound placeholder name
        variable: String,
        /// The name of the template being rendered
        template: String,
    },
    /// The template text contains a malformed placeholder
    #[error("Malformed template '{template}':\n{message}")]
    Parse {
        /// The name of the template being parsed
        template: String,
        /// The formatted parse error
        message: String,
    },
}

/// Substitutes every placeholder of `template` with its value from `context`
pub fn render(template: &Template, context: &Context) -> Result<String, TemplateError> {
    let mut output = String::new();
    for token in template.tokens() {
        match token {
            Token::Text(text) => output.push_str(text),
            Token::Variable(var) => {
                let value =
                    context
                        .get(var.value())
                        .ok_or_else(|| TemplateError::MissingVariable {
                            variable: var.value().to_owned(),
                            template: template.name().to_owned(),
                        })?;
                output.push_str(&value.render());
            }
        }
    }
    tracing::trace!(
        "Rendered template {} ({} bytes)",
        template.name(),
        output.len()
    );
    Ok(output)
}

/// Parses `text` as a template called `name` and renders it against `context`
pub fn render_text(name: &str, text: &str, context: &Context) -> Result<String, TemplateError> {
    let template = Template::parse(name, text).map_err(|e| TemplateError::Parse {
        template: name.to_owned(),
        message: e.to_string(),
    })?;
    render(&template, context)
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use indoc::indoc;

    use super::*;

    #[test]
    fn renders_without_leftover_markers() -> anyhow::Result<()> {
        let context = Context::new()
            .with("DOMAINDN", "DC=example,DC=com")
            .with("NETBIOSNAME", "DC1")
            .with("USN", 7i64);
        let rendered = render_text(
            "provision.ldif",
            indoc! {"
                dn: CN=${NETBIOSNAME},CN=Computers,${DOMAINDN}
                uSNCreated: ${USN}
            "},
            &context,
        )?;
        assert!(!rendered.contains("${"));
        assert_eq!(
            rendered,
            "dn: CN=DC1,CN=Computers,DC=example,DC=com\nuSNCreated: 7\n"
        );
        Ok(())
    }

    #[test]
    fn missing_variable_names_key_and_template() {
        let context = Context::new().with("DOMAINDN", "DC=example,DC=com");
        let err = render_text("secrets.ldif", "dn: ${DOMAINDN}\nrealm: ${REALM}\n", &context)
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingVariable {
                variable: "REALM".into(),
                template: "secrets.ldif".into(),
            }
        );
        assert_eq!(
            err.to_string(),
            "Undefined variable 'REALM' in template 'secrets.ldif'"
        );
    }

    #[test]
    fn generator_reinvoked_per_occurrence() -> anyhow::Result<()> {
        let next = Rc::new(Cell::new(0u32));
        let mut context = Context::new();
        let counter = next.clone();
        context.set_generator("NEWGUID", move || {
            counter.set(counter.get() + 1);
            format!("guid-{}", counter.get())
        });
        let rendered = render_text("t", "${NEWGUID} ${NEWGUID}", &context)?;
        assert_eq!(rendered, "guid-1 guid-2");
        assert_eq!(next.get(), 2);
        Ok(())
    }

    #[test]
    fn template_renders_repeatedly_with_different_contexts() -> anyhow::Result<()> {
        let template = Template::parse("zone", "${HOSTNAME}.${DNSDOMAIN}")?;
        let a = Context::new()
            .with("HOSTNAME", "dc1")
            .with("DNSDOMAIN", "a.test");
        let b = Context::new()
            .with("HOSTNAME", "dc2")
            .with("DNSDOMAIN", "b.test");
        assert_eq!(render(&template, &a)?, "dc1.a.test");
        assert_eq!(render(&template, &b)?, "dc2.b.test");
        Ok(())
    }

    #[test]
    fn malformed_placeholder_reported() {
        let err = render_text("broken.ldif", "dn: ${DOMAINDN", &Context::new()).unwrap_err();
        assert!(matches!(err, TemplateError::Parse { ref template, .. } if template == "broken.ldif"));
    }
}
