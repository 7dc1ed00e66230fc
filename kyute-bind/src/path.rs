//! Dotted data paths and their resolution against JSON documents.
//!
//! A path is a sequence of segments separated by dots (`items.0.name`). Bracketed positions are
//! accepted as well (`items[0].name`). The reserved segment `$index` stands for the position of the
//! enclosing node inside a repeating scope and is substituted before navigation.
//!
//! Resolution never mutates the document, and absence of data is reported through `Err`, never
//! by panicking.
use crate::error::PathError;
use serde_json::Value;
use smallvec::SmallVec;
use std::{borrow::Cow, fmt};

/// The placeholder segment substituted with the enclosing index.
pub const INDEX_TOKEN: &str = "$index";

/// A single segment of a data path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Object key, or array position when navigating into an array.
    Key(String),
    /// The `$index` placeholder.
    Index,
}

impl Segment {
    fn parse(text: &str) -> Option<Segment> {
        let text = text.trim();
        if text.is_empty() {
            None
        } else if text == INDEX_TOKEN {
            Some(Segment::Index)
        } else {
            Some(Segment::Key(text.to_owned()))
        }
    }

    /// Returns the key to look up, substituting the placeholder with `index`.
    fn key(&self, index: Option<usize>) -> Option<Cow<'_, str>> {
        match self {
            Segment::Key(key) => Some(Cow::Borrowed(key)),
            Segment::Index => index.map(|i| Cow::Owned(i.to_string())),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index => f.write_str(INDEX_TOKEN),
        }
    }
}

/// A parsed data path.
///
/// The empty path designates the whole document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DataPath(SmallVec<[Segment; 4]>);

impl DataPath {
    /// The empty path.
    pub fn root() -> DataPath {
        DataPath(SmallVec::new())
    }

    /// Parses a dotted path. Empty segments are skipped.
    pub fn parse(text: &str) -> DataPath {
        let mut segments = SmallVec::new();
        for part in text.split('.') {
            let (name, mut brackets) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            segments.extend(Segment::parse(name));
            while let Some(inner) = brackets.strip_prefix('[') {
                let (position, rest) = match inner.find(']') {
                    Some(end) => (&inner[..end], &inner[end + 1..]),
                    None => (inner, ""),
                };
                segments.extend(Segment::parse(position));
                brackets = rest;
            }
        }
        DataPath(segments)
    }

    /// Creates a single-segment path.
    pub fn key(key: impl Into<String>) -> DataPath {
        let mut segments = SmallVec::new();
        segments.push(Segment::Key(key.into()));
        DataPath(segments)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self) -> Option<&Segment> {
        self.0.first()
    }

    /// Whether the path mentions the `$index` placeholder.
    pub fn has_index_token(&self) -> bool {
        self.0.iter().any(|segment| *segment == Segment::Index)
    }

    /// Appends a segment (builder style).
    #[must_use]
    pub fn push(mut self, segment: Segment) -> DataPath {
        self.0.push(segment);
        self
    }

    /// Concatenates two paths.
    #[must_use]
    pub fn join(&self, other: &DataPath) -> DataPath {
        let mut result = self.clone();
        result.0.extend(other.0.iter().cloned());
        result
    }

    /// Returns the path without its first `n` segments.
    #[must_use]
    pub fn tail(&self, n: usize) -> DataPath {
        DataPath(self.0.iter().skip(n).cloned().collect())
    }

    /// Splits the path into its parent path and last segment.
    pub fn split_last(&self) -> Option<(DataPath, &Segment)> {
        let (last, parent) = self.0.split_last()?;
        Some((DataPath(parent.iter().cloned().collect()), last))
    }

    /// Whether all segments of `self` match the beginning of `other`. A path is a prefix of itself.
    pub fn is_prefix_of(&self, other: &DataPath) -> bool {
        self.len() <= other.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    /// Removes `prefix` from the beginning of the path.
    pub fn strip_prefix(&self, prefix: &DataPath) -> Option<DataPath> {
        if prefix.is_prefix_of(self) {
            Some(self.tail(prefix.len()))
        } else {
            None
        }
    }

    /// Substitutes the `$index` placeholder with a concrete position.
    ///
    /// Placeholders are left in place when `index` is `None`.
    #[must_use]
    pub fn with_index(&self, index: Option<usize>) -> DataPath {
        match index {
            Some(index) if self.has_index_token() => DataPath(
                self.0
                    .iter()
                    .map(|segment| match segment {
                        Segment::Index => Segment::Key(index.to_string()),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            segment.fmt(f)?;
        }
        Ok(())
    }
}

impl From<&str> for DataPath {
    fn from(text: &str) -> Self {
        DataPath::parse(text)
    }
}

impl From<String> for DataPath {
    fn from(text: String) -> Self {
        DataPath::parse(&text)
    }
}

impl From<&DataPath> for DataPath {
    fn from(path: &DataPath) -> Self {
        path.clone()
    }
}

/// Returns a short name for the JSON type of a value, for error messages.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn array_position(path: &DataPath, key: &str) -> Result<usize, PathError> {
    key.parse().map_err(|_| PathError::type_mismatch(path, "object", "array"))
}

/// Resolves `path` against `document`.
pub fn resolve<'a>(path: &DataPath, document: &'a Value, index: Option<usize>) -> Result<&'a Value, PathError> {
    let mut current = document;
    for segment in path.segments() {
        let key = segment.key(index).ok_or_else(|| PathError::not_found(path))?;
        current = match current {
            Value::Object(map) => map.get(&*key),
            Value::Array(items) => items.get(array_position(path, &key)?),
            other => return Err(PathError::type_mismatch(path, "object or array", value_kind(other))),
        }
        .ok_or_else(|| PathError::not_found(path))?;
    }
    Ok(current)
}

/// Mutable counterpart of [`resolve`].
pub fn resolve_mut<'a>(
    path: &DataPath,
    document: &'a mut Value,
    index: Option<usize>,
) -> Result<&'a mut Value, PathError> {
    let mut current = document;
    for segment in path.segments() {
        let key = segment.key(index).ok_or_else(|| PathError::not_found(path))?;
        current = match current {
            Value::Object(map) => map.get_mut(&*key),
            Value::Array(items) => items.get_mut(array_position(path, &key)?),
            other => return Err(PathError::type_mismatch(path, "object or array", value_kind(other))),
        }
        .ok_or_else(|| PathError::not_found(path))?;
    }
    Ok(current)
}

/// Writes `value` at `path`.
///
/// The parent of the target must exist. Object parents gain the key if it is missing; array
/// parents only accept positions that are already in range. The empty path cannot be written.
pub fn write(path: &DataPath, document: &mut Value, index: Option<usize>, value: Value) -> Result<(), PathError> {
    let (parent_path, last) = path.split_last().ok_or_else(|| PathError::not_found(path))?;
    let key = last.key(index).ok_or_else(|| PathError::not_found(path))?;
    match resolve_mut(&parent_path, document, index)? {
        Value::Object(map) => {
            map.insert(key.into_owned(), value);
            Ok(())
        }
        Value::Array(items) => {
            let slot = items
                .get_mut(array_position(path, &key)?)
                .ok_or_else(|| PathError::not_found(path))?;
            *slot = value;
            Ok(())
        }
        other => Err(PathError::type_mismatch(path, "object or array", value_kind(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_dotted_and_bracketed() {
        let dotted = DataPath::parse("items.0.name");
        let bracketed = DataPath::parse("items[0].name");
        assert_eq!(dotted, bracketed);
        assert_eq!(dotted.len(), 3);
        assert_eq!(dotted.to_string(), "items.0.name");

        let indexed = DataPath::parse("items[$index].name");
        assert_eq!(indexed.segments()[1], Segment::Index);
        assert_eq!(indexed.to_string(), "items.$index.name");

        assert!(DataPath::parse("").is_empty());
        assert_eq!(DataPath::parse("a..b"), DataPath::parse("a.b"));
    }

    #[test]
    fn resolve_navigates_objects_and_arrays() {
        let doc = json!({"items": [{"name": "a"}, {"name": "b"}], "count": 2});
        assert_eq!(resolve(&"items.1.name".into(), &doc, None), Ok(&json!("b")));
        assert_eq!(resolve(&"count".into(), &doc, None), Ok(&json!(2)));
        assert_eq!(resolve(&DataPath::root(), &doc, None), Ok(&doc));
    }

    #[test]
    fn resolve_substitutes_index() {
        let doc = json!({"items": ["x", "y", "z"]});
        let path = DataPath::parse("items.$index");
        assert_eq!(resolve(&path, &doc, Some(2)), Ok(&json!("z")));
        assert!(matches!(resolve(&path, &doc, None), Err(PathError::NotFound { .. })));
    }

    #[test]
    fn resolve_reports_absence() {
        let doc = json!({"items": [1, 2], "name": "n"});
        assert!(matches!(resolve(&"missing".into(), &doc, None), Err(PathError::NotFound { .. })));
        assert!(matches!(resolve(&"items.5".into(), &doc, None), Err(PathError::NotFound { .. })));
        assert!(matches!(resolve(&"items.first".into(), &doc, None), Err(PathError::TypeMismatch { .. })));
        assert!(matches!(resolve(&"name.length".into(), &doc, None), Err(PathError::TypeMismatch { .. })));
    }

    #[test]
    fn write_inserts_and_replaces() {
        let mut doc = json!({"user": {"name": "a"}, "tags": ["x"]});
        write(&"user.name".into(), &mut doc, None, json!("b")).unwrap();
        write(&"user.age".into(), &mut doc, None, json!(3)).unwrap();
        write(&"tags.0".into(), &mut doc, None, json!("y")).unwrap();
        assert_eq!(doc, json!({"user": {"name": "b", "age": 3}, "tags": ["y"]}));

        assert!(write(&"tags.4".into(), &mut doc, None, json!("z")).is_err());
        assert!(write(&"nobody.name".into(), &mut doc, None, json!("z")).is_err());
        assert!(write(&DataPath::root(), &mut doc, None, json!("z")).is_err());
    }

    #[test]
    fn prefixes() {
        let items = DataPath::parse("items.0");
        let name = DataPath::parse("items.0.name");
        assert!(items.is_prefix_of(&name));
        assert!(!name.is_prefix_of(&items));
        assert_eq!(name.strip_prefix(&items), Some(DataPath::parse("name")));
        assert_eq!(DataPath::parse("items.$index").with_index(Some(4)), DataPath::parse("items.4"));
    }
}
