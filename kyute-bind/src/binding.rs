//! Attribute bindings.
//!
//! A raw attribute value becomes a binding in two cases:
//! * `~path`: a direct binding, the attribute receives the value at `path`;
//! * text containing `@{path}` references: a templated binding, the attribute receives the text
//!   with each reference replaced by the rendered value.
//!
//! Any other value is static and is not handled here.
use crate::{
    error::PathError,
    path::{self, DataPath},
    Atom,
};
use serde_json::Value;

/// Prefix of direct bindings.
pub const DIRECT_PREFIX: char = '~';

const REFERENCE_OPEN: &str = "@{";
const REFERENCE_CLOSE: char = '}';

/// A piece of a templated expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Part {
    Literal(String),
    Reference(DataPath),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expression {
    Direct(DataPath),
    Template(Vec<Part>),
}

/// An attribute key bound to an expression over the node's data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    key: Atom,
    source: String,
    expression: Expression,
}

impl Binding {
    /// Parses a raw attribute value. Returns `None` for static values.
    pub fn parse(key: impl Into<Atom>, raw: &str) -> Option<Binding> {
        let expression = if let Some(path) = raw.strip_prefix(DIRECT_PREFIX) {
            Expression::Direct(DataPath::parse(path))
        } else {
            let parts = parse_template(raw);
            if !parts.iter().any(|part| matches!(part, Part::Reference(_))) {
                return None;
            }
            Expression::Template(parts)
        };
        Some(Binding {
            key: key.into(),
            source: raw.to_owned(),
            expression,
        })
    }

    /// Creates a direct binding from a path.
    pub fn direct(key: impl Into<Atom>, path: impl Into<DataPath>) -> Binding {
        let path = path.into();
        Binding {
            key: key.into(),
            source: format!("{DIRECT_PREFIX}{path}"),
            expression: Expression::Direct(path),
        }
    }

    pub fn key(&self) -> &Atom {
        &self.key
    }

    /// The raw attribute value this binding was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Whether the expression is a template with embedded references.
    pub fn has_embedded_reference(&self) -> bool {
        matches!(self.expression, Expression::Template(_))
    }

    /// All paths the expression reads.
    pub fn references(&self) -> impl Iterator<Item = &DataPath> + '_ {
        let (direct, parts) = match &self.expression {
            Expression::Direct(path) => (Some(path), &[][..]),
            Expression::Template(parts) => (None, &parts[..]),
        };
        direct.into_iter().chain(parts.iter().filter_map(|part| match part {
            Part::Reference(path) => Some(path),
            Part::Literal(_) => None,
        }))
    }

    /// Whether the expression reads exactly `path` once `$index` is substituted.
    pub fn refers_to(&self, path: &DataPath, index: Option<usize>) -> bool {
        self.references().any(|reference| reference.with_index(index) == *path)
    }

    /// Evaluates the expression against a document.
    ///
    /// Templates always succeed: unresolved references render as empty text.
    pub fn evaluate(&self, document: &Value, index: Option<usize>) -> Result<Value, PathError> {
        match &self.expression {
            Expression::Direct(path) => path::resolve(path, document, index).cloned(),
            Expression::Template(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        Part::Literal(literal) => text.push_str(literal),
                        Part::Reference(path) => match path::resolve(path, document, index) {
                            Ok(Value::String(s)) => text.push_str(s),
                            Ok(Value::Null) | Err(_) => {}
                            Ok(other) => text.push_str(&other.to_string()),
                        },
                    }
                }
                Ok(Value::String(text))
            }
        }
    }
}

fn parse_template(raw: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = raw;
    while let Some(start) = rest.find(REFERENCE_OPEN) {
        let after = &rest[start + REFERENCE_OPEN.len()..];
        let Some(end) = after.find(REFERENCE_CLOSE) else {
            break;
        };
        literal.push_str(&rest[..start]);
        if !literal.is_empty() {
            parts.push(Part::Literal(std::mem::take(&mut literal)));
        }
        parts.push(Part::Reference(DataPath::parse(&after[..end])));
        rest = &after[end + 1..];
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        parts.push(Part::Literal(literal));
    }
    parts
}
