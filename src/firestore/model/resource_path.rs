use std::fmt::{Display, Formatter};
use std::ops::Deref;

/// Slash-separated location of a document or collection below the database
/// root. Segments are never empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    segments: Vec<String>,
}

impl ResourcePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Uses `segments` verbatim; empty strings are dropped.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments
                .into_iter()
                .map(Into::into)
                .filter(|segment: &String| !segment.is_empty())
                .collect(),
        }
    }

    /// Splits a slash-separated path, dropping empty segments so that leading,
    /// trailing and doubled slashes never produce blank components.
    pub fn from_string(path: &str) -> Self {
        Self::from_segments(path.split('/'))
    }

    /// Builds a path from pre-split segments, splitting any that still contain `/`.
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_segments(
            parts
                .into_iter()
                .flat_map(|part| Self::from_string(part.as_ref()).segments),
        )
    }

    /// Whether the segment count addresses a document (even) rather than a collection (odd).
    pub fn is_document_path(&self) -> bool {
        self.segments.len() % 2 == 0
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn child<I, S>(&self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut child = self.clone();
        child.segments.extend(
            segments
                .into_iter()
                .map(Into::into)
                .filter(|segment: &String| !segment.is_empty()),
        );
        child
    }

    /// The enclosing path; the root is its own parent.
    pub fn without_last(&self) -> Self {
        let mut parent = self.clone();
        parent.segments.pop();
        parent
    }

    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn canonical_string(&self) -> String {
        self.segments.join("/")
    }
}

impl Display for ResourcePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical_string())
    }
}

impl Deref for ResourcePath {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_render_path() {
        let path = ResourcePath::from_string("cities/sf/neighborhoods/downtown");
        assert_eq!(path.len(), 4);
        assert_eq!(path.last_segment(), Some("downtown"));
        assert_eq!(path.to_string(), "cities/sf/neighborhoods/downtown");
        assert!(path.is_document_path());
    }

    #[test]
    fn root_is_an_empty_document_path() {
        assert!(ResourcePath::from_string("///").is_empty());
        assert!(ResourcePath::root().is_document_path());
        assert_eq!(ResourcePath::root().without_last(), ResourcePath::root());
    }

    #[test]
    fn drops_empty_segments() {
        let path = ResourcePath::from_string("/cities//sf/");
        assert_eq!(path.canonical_string(), "cities/sf");
        assert_eq!(path.child(["", "rooms"]).len(), 3);
    }

    #[test]
    fn from_parts_splits_nested_segments() {
        let path = ResourcePath::from_parts(["users/alovelace", "repos"]);
        assert_eq!(path.len(), 3);
        assert!(!path.is_document_path());
        assert_eq!(path.without_last().canonical_string(), "users/alovelace");
    }
}
