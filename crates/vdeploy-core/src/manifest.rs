//! Multi-document manifest parsing
//!
//! Manifests are compared textually; parsing only exists to find out which
//! objects a manifest text declares so removed ones can be pruned.

use regex::Regex;
use serde_yaml::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use crate::desired::DEFAULT_NAMESPACE;
use crate::error::CoreError;

static DOCUMENT_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^---[ \t]*\r?$").expect("valid separator regex"));

/// Identity of a Kubernetes object within a manifest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {}/{}",
            self.api_version, self.kind, self.namespace, self.name
        )
    }
}

/// A single object declared in a manifest
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestObject {
    pub key: ObjectKey,
    pub value: Value,
}

/// Result of parsing a manifest text
///
/// Parsing is best effort: malformed documents are skipped and the first
/// error is kept so callers can decide whether to fail.
#[derive(Debug, Default)]
pub struct ParsedManifest {
    pub objects: Vec<ManifestObject>,
    pub error: Option<CoreError>,
}

impl ParsedManifest {
    /// Parse every document in `text`
    pub fn parse(text: &str) -> Self {
        let mut parsed = Self::default();

        for (index, doc) in split_documents(text).into_iter().enumerate() {
            match parse_document(index, doc) {
                Ok(Some(object)) => parsed.objects.push(object),
                Ok(None) => {}
                Err(e) => {
                    if parsed.error.is_none() {
                        parsed.error = Some(e);
                    }
                }
            }
        }

        parsed
    }

    /// Keys of all parsed objects
    pub fn keys(&self) -> BTreeSet<ObjectKey> {
        self.objects.iter().map(|o| o.key.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Turn a parse failure into an error, discarding partial results
    pub fn into_result(self) -> crate::error::Result<Vec<ManifestObject>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.objects),
        }
    }
}

/// Split a manifest text on `---` lines, dropping blank and comment-only documents
pub fn split_documents(text: &str) -> Vec<&str> {
    DOCUMENT_SEPARATOR
        .split(text)
        .filter(|doc| !is_blank_document(doc))
        .collect()
}

/// Join manifest parts with a document separator, skipping blank parts
pub fn join_documents<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim_end)
        .filter(|part| !is_blank_document(part))
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn is_blank_document(doc: &str) -> bool {
    doc.lines().all(|l| {
        let l = l.trim();
        l.is_empty() || l.starts_with('#')
    })
}

fn parse_document(index: usize, doc: &str) -> crate::error::Result<Option<ManifestObject>> {
    let value: Value = serde_yaml::from_str(doc).map_err(|e| CoreError::InvalidDocument {
        index,
        message: e.to_string(),
    })?;

    if value.is_null() {
        return Ok(None);
    }

    let field = |path: &[&str]| -> Option<String> {
        let mut current = &value;
        for segment in path {
            current = current.get(*segment)?;
        }
        current.as_str().map(str::to_string)
    };

    let missing = |what: &str| CoreError::InvalidDocument {
        index,
        message: format!("object is missing {}", what),
    };

    let api_version = field(&["apiVersion"]).ok_or_else(|| missing("apiVersion"))?;
    let kind = field(&["kind"]).ok_or_else(|| missing("kind"))?;
    let name = field(&["metadata", "name"]).ok_or_else(|| missing("metadata.name"))?;
    let namespace = field(&["metadata", "namespace"])
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    Ok(Some(ManifestObject {
        key: ObjectKey::new(api_version, kind, namespace, name),
        value,
    }))
}
