//! Reading and writing of LDIF, the text form of directory records and changes
//!
//! Records are separated by blank lines. A line starting with a space continues the line
//! before it, lines starting with `#` are comments, and `name:: value` carries a base64
//! encoded value. A record without a `changetype` adds an entry; `changetype: modify`
//! records hold `add`, `replace` or `delete` operations each terminated by a `-` line.
use base64::{engine::general_purpose::STANDARD, Engine};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, space0},
    combinator::{all_consuming, map, rest},
    error::VerboseError,
    sequence::{pair, preceded},
    IResult,
};

use crate::{Attribute, DirectoryError, Dn, Entry};

type Res<T, U> = IResult<T, U, VerboseError<T>>;

/// One record of an LDIF document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LdifRecord {
    /// Adds a new entry
    Add(Entry),
    /// Applies changes to an existing entry
    Modify {
        /// The entry to change
        dn: Dn,
        /// The changes, applied in order
        changes: Vec<Change>,
    },
    /// Deletes an entry
    Delete(Dn),
    /// Moves or renames an entry
    Rename {
        /// The current name
        dn: Dn,
        /// The name after the change
        new_dn: Dn,
    },
}

impl LdifRecord {
    /// The name of the entry the record applies to
    pub fn dn(&self) -> &Dn {
        match self {
            LdifRecord::Add(entry) => entry.dn(),
            LdifRecord::Modify { dn, .. }
            | LdifRecord::Delete(dn)
            | LdifRecord::Rename { dn, .. } => dn,
        }
    }
}

/// A single attribute change within a modify record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Adds the values to the attribute
    Add(Attribute),
    /// Replaces all values of the attribute (no values removes it)
    Replace(Attribute),
    /// Removes the values from the attribute (no values removes it entirely)
    Delete(Attribute),
}

impl Change {
    /// The attribute this change affects
    pub fn attribute(&self) -> &Attribute {
        match self {
            Change::Add(attr) | Change::Replace(attr) | Change::Delete(attr) => attr,
        }
    }
}

#[derive(Debug, PartialEq)]
enum LineValue<'a> {
    Text(&'a str),
    Base64(&'a str),
    Url(&'a str),
}

/// A logical (unfolded) line and the source line number it started on
struct Line {
    number: usize,
    text: String,
}

/// Parses an LDIF document into its records
pub fn parse_ldif(text: &str) -> Result<Vec<LdifRecord>, DirectoryError> {
    let mut records = vec![];
    for block in blocks(text)? {
        if let Some(record) = parse_record(&block)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Splits the document into blocks of unfolded lines, dropping comments
fn blocks(text: &str) -> Result<Vec<Vec<Line>>, DirectoryError> {
    let mut blocks = vec![];
    let mut current: Vec<Line> = vec![];
    let mut in_comment = false;
    for (index, line) in text.lines().enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let number = index + 1;
        if line.trim().is_empty() {
            in_comment = false;
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else if let Some(continued) = line.strip_prefix(' ') {
            if in_comment {
                continue;
            }
            match current.last_mut() {
                Some(last) => last.text.push_str(continued),
                None => return Err(error(number, "continuation without a preceding line")),
            }
        } else if line.starts_with('#') {
            in_comment = true;
        } else {
            in_comment = false;
            current.push(Line {
                number,
                text: line.to_owned(),
            });
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    Ok(blocks)
}

fn parse_record(block: &[Line]) -> Result<Option<LdifRecord>, DirectoryError> {
    let mut lines = block.iter().peekable();
    if let Some(first) = lines.peek() {
        if first.text.starts_with("version:") {
            lines.next();
        }
    }
    let Some(first) = lines.next() else {
        return Ok(None);
    };
    let (name, value) = attribute_value(first)?;
    if !name.eq_ignore_ascii_case("dn") {
        return Err(error(first.number, &format!("expected 'dn:' but found '{name}:'")));
    }
    let dn = Dn::parse(&value).map_err(|e| error(first.number, &e.to_string()))?;

    let mut changetype = "add".to_owned();
    if let Some(&line) = lines.peek() {
        let (name, value) = attribute_value(line)?;
        if name.eq_ignore_ascii_case("changetype") {
            changetype = value.to_ascii_lowercase();
            lines.next();
        }
    }

    match changetype.as_str() {
        "add" => {
            let mut entry = Entry::new(dn);
            for line in lines {
                let (name, value) = attribute_value(line)?;
                entry.add_value(name, value);
            }
            Ok(Some(LdifRecord::Add(entry)))
        }
        "modify" => {
            let mut changes = vec![];
            while let Some(line) = lines.next() {
                let (op, attribute) = attribute_value(line)?;
                let mut values = vec![];
                for line in lines.by_ref() {
                    if line.text == "-" {
                        break;
                    }
                    let (name, value) = attribute_value(line)?;
                    if !name.eq_ignore_ascii_case(&attribute) {
                        return Err(error(
                            line.number,
                            &format!("value for '{name}' inside '{op}: {attribute}'"),
                        ));
                    }
                    values.push(value);
                }
                let attribute = Attribute {
                    name: attribute,
                    values,
                };
                changes.push(match op.to_ascii_lowercase().as_str() {
                    "add" => Change::Add(attribute),
                    "replace" => Change::Replace(attribute),
                    "delete" => Change::Delete(attribute),
                    _ => {
                        return Err(error(
                            line.number,
                            &format!("unknown modify operation '{op}'"),
                        ))
                    }
                });
            }
            Ok(Some(LdifRecord::Modify { dn, changes }))
        }
        "delete" => Ok(Some(LdifRecord::Delete(dn))),
        "modrdn" | "moddn" => {
            let mut new_rdn = None;
            let mut new_superior = None;
            for line in lines {
                let (name, value) = attribute_value(line)?;
                match name.to_ascii_lowercase().as_str() {
                    "newrdn" => new_rdn = Some(value),
                    "newsuperior" => new_superior = Some(value),
                    _ => {}
                }
            }
            let new_rdn = new_rdn.ok_or_else(|| error(block[0].number, "missing 'newrdn'"))?;
            let superior = match new_superior {
                Some(superior) => superior,
                None => dn.parent().map(|p| p.to_string()).unwrap_or_default(),
            };
            let new_dn = if superior.is_empty() {
                Dn::parse(&new_rdn)
            } else {
                Dn::parse(&format!("{new_rdn},{superior}"))
            }
            .map_err(|e| error(block[0].number, &e.to_string()))?;
            Ok(Some(LdifRecord::Rename { dn, new_dn }))
        }
        other => Err(error(first.number, &format!("unknown changetype '{other}'"))),
    }
}

/// Parses and decodes a `name: value` line
fn attribute_value(line: &Line) -> Result<(&str, String), DirectoryError> {
    let (_, (name, value)) = all_consuming(attribute_line)(line.text.as_str())
        .map_err(|_| error(line.number, &format!("expected 'name: value' in '{}'", line.text)))?;
    let value = match value {
        LineValue::Text(text) => text.to_owned(),
        LineValue::Base64(encoded) => {
            let bytes = STANDARD
                .decode(encoded.trim())
                .map_err(|e| error(line.number, &format!("invalid base64 for '{name}': {e}")))?;
            String::from_utf8(bytes).map_err(|_| {
                error(line.number, &format!("binary value for '{name}' is not UTF-8"))
            })?
        }
        LineValue::Url(url) => {
            return Err(error(
                line.number,
                &format!("URL values are not supported ('{name}:< {url}')"),
            ))
        }
    };
    Ok((name, value))
}

fn attribute_line(s: &str) -> Res<&str, (&str, LineValue<'_>)> {
    pair(
        attribute_description,
        alt((
            map(preceded(tag("::"), preceded(space0, rest)), LineValue::Base64),
            map(preceded(tag(":<"), preceded(space0, rest)), LineValue::Url),
            map(preceded(char(':'), preceded(space0, rest)), LineValue::Text),
        )),
    )(s)
}

fn attribute_description(s: &str) -> Res<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | ';' | '.' | '@'))(s)
}

fn error(line: usize, message: &str) -> DirectoryError {
    DirectoryError::Ldif(format!("line {line}: {message}"))
}

/// Writes an entry as an LDIF add record (without a trailing blank line)
pub fn write_entry(entry: &Entry) -> String {
    let mut out = String::new();
    write_line(&mut out, "dn", &entry.dn().to_string());
    for attribute in entry.attributes() {
        for value in &attribute.values {
            write_line(&mut out, &attribute.name, value);
        }
    }
    out
}

/// Writes entries as an LDIF document, one record per entry
pub fn write_ldif<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> String {
    entries
        .into_iter()
        .map(write_entry)
        .collect::<Vec<_>>()
        .join("\n")
}

fn write_line(out: &mut String, name: &str, value: &str) {
    if is_safe(value) {
        out.push_str(&format!("{name}: {value}\n"));
    } else {
        out.push_str(&format!("{name}:: {}\n", STANDARD.encode(value)));
    }
}

/// True if the value can be written without base64 encoding
fn is_safe(value: &str) -> bool {
    !value.starts_with([' ', ':', '<'])
        && !value.ends_with(' ')
        && value
            .chars()
            .all(|c| c.is_ascii() && c != '\0' && c != '\n' && c != '\r')
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn add_records_with_comments_and_continuations() -> anyhow::Result<()> {
        let records = parse_ldif(indoc! {"
            version: 1

            # The domain root
            dn: DC=example,DC=com
            objectClass: top
            objectClass: domain
            description: a long
              description

            dn: CN=Users,DC=example,DC=com
            cn: Users
        "})?;
        assert_eq!(records.len(), 2);
        let LdifRecord::Add(domain) = &records[0] else {
            panic!("expected an add record, got {:?}", records[0]);
        };
        assert_eq!(domain.dn().to_string(), "DC=example,DC=com");
        assert_eq!(domain.get("objectClass").map(<[String]>::len), Some(2));
        assert_eq!(domain.first("description"), Some("a long description"));
        assert_eq!(records[1].dn().to_string(), "CN=Users,DC=example,DC=com");
        Ok(())
    }

    #[test]
    fn base64_values() -> anyhow::Result<()> {
        let records = parse_ldif("dn: CN=admin\nunicodePwd:: c2VjcmV0\n")?;
        let LdifRecord::Add(entry) = &records[0] else {
            panic!("expected an add record");
        };
        assert_eq!(entry.first("unicodePwd"), Some("secret"));
        Ok(())
    }

    #[test]
    fn modify_operations() -> anyhow::Result<()> {
        let records = parse_ldif(indoc! {"
            dn: DC=example,DC=com
            changetype: modify
            replace: description
            description: The domain
            -
            add: member
            member: CN=a
            member: CN=b
            -
            delete: wellKnownObjects
        "})?;
        let [LdifRecord::Modify { dn, changes }] = records.as_slice() else {
            panic!("expected one modify record, got {records:?}");
        };
        assert_eq!(dn.to_string(), "DC=example,DC=com");
        assert_eq!(
            changes,
            &vec![
                Change::Replace(Attribute::new("description", ["The domain"])),
                Change::Add(Attribute::new("member", ["CN=a", "CN=b"])),
                Change::Delete(Attribute::new("wellKnownObjects", Vec::<String>::new())),
            ]
        );
        Ok(())
    }

    #[test]
    fn rename_and_delete() -> anyhow::Result<()> {
        let records = parse_ldif(indoc! {"
            dn: CN=old,CN=Users,DC=example,DC=com
            changetype: modrdn
            newrdn: CN=new
            deleteoldrdn: 1

            dn: CN=gone,DC=example,DC=com
            changetype: delete
        "})?;
        assert_eq!(
            records,
            vec![
                LdifRecord::Rename {
                    dn: Dn::parse("CN=old,CN=Users,DC=example,DC=com")?,
                    new_dn: Dn::parse("CN=new,CN=Users,DC=example,DC=com")?,
                },
                LdifRecord::Delete(Dn::parse("CN=gone,DC=example,DC=com")?),
            ]
        );
        Ok(())
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = parse_ldif("dn: DC=x\n\ncn: first line is not a dn\n").unwrap_err();
        assert_eq!(
            err,
            DirectoryError::Ldif("line 3: expected 'dn:' but found 'cn:'".into())
        );
        let err = parse_ldif("dn: DC=x\nnot an attribute line\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        let err = parse_ldif(" orphan continuation\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn modify_values_must_match_operation() {
        let err = parse_ldif("dn: DC=x\nchangetype: modify\nadd: cn\nsn: wrong\n").unwrap_err();
        assert!(err.to_string().contains("inside 'add: cn'"));
    }

    #[test]
    fn written_entries_parse_back() -> anyhow::Result<()> {
        let entry = Entry::new(Dn::parse("CN=Test,DC=example,DC=com")?)
            .with("cn", "Test")
            .with("description", " leading space")
            .with("comment", "multi\nline");
        let text = write_ldif([&entry]);
        assert!(text.contains("description:: "));
        assert_eq!(parse_ldif(&text)?, vec![LdifRecord::Add(entry)]);
        Ok(())
    }
}
