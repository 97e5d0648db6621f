//! Two-phase rendering of mode-dependent configuration documents
//!
//! Phase one substitutes `{{ dotted.key }}` placeholders. Phase two applies
//! the transforms whose mode condition is active, ordered by mode priority
//! (credential, then registry, then checkpoint) and by declaration order
//! within a priority. The result is checked against the credential
//! invariants before it is returned.

use crate::core::modes::{CredentialStrategy, DeploymentModes, NormalizedMode};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

/// Field that holds a literal storage secret inside a credential block
pub const LITERAL_SECRET_FIELD: &str = "access_key";

/// Object key that marks a credential block
pub const CREDENTIAL_BLOCK: &str = "credential";

/// Values available to phase one, keyed by dotted configuration key
pub type Substitutions = BTreeMap<String, Value>;

#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    #[error("no value for placeholder '{placeholder}' at {path}")]
    MissingSubstitution { placeholder: String, path: String },

    #[error("cannot apply edit at '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("{kind} document violates credential invariant: {reason}")]
    InvariantViolation { kind: DocumentKind, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    WorkflowStorage,
    BackendPool,
    PodTemplate,
    BackendValues,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::WorkflowStorage => "workflow-storage",
            DocumentKind::BackendPool => "backend-pool",
            DocumentKind::PodTemplate => "pod-template",
            DocumentKind::BackendValues => "backend-values",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object key, or array index when the node is an array
    Key(String),
    /// Every child of an object or array
    Any,
}

/// Location of a field inside a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Parse `a.b.*.c`; keys that contain dots need [`FieldPath::from_keys`]
    pub fn parse(dotted: &str) -> Self {
        Self {
            segments: dotted
                .split('.')
                .map(|s| match s {
                    "*" => PathSegment::Any,
                    key => PathSegment::Key(key.to_string()),
                })
                .collect(),
        }
    }

    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: keys.into_iter().map(|k| PathSegment::Key(k.into())).collect(),
        }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self
            .segments
            .iter()
            .map(|s| match s {
                PathSegment::Key(k) => k.as_str(),
                PathSegment::Any => "*",
            })
            .collect();
        f.write_str(&parts.join("."))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldEdit {
    Remove(FieldPath),
    /// Insert or replace; placeholders in the value are substituted first
    Set(FieldPath, Value),
}

/// An edit applied only when its mode value is active
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTransform {
    pub when: NormalizedMode,
    pub edit: FieldEdit,
}

impl FieldTransform {
    pub fn remove(when: NormalizedMode, path: &str) -> Self {
        Self {
            when,
            edit: FieldEdit::Remove(FieldPath::parse(path)),
        }
    }

    pub fn set(when: NormalizedMode, path: FieldPath, value: Value) -> Self {
        Self {
            when,
            edit: FieldEdit::Set(path, value),
        }
    }
}

/// Unrendered document with its conditional edits
#[derive(Debug, Clone)]
pub struct ConfigTemplate {
    pub kind: DocumentKind,
    pub body: Value,
    pub transforms: Vec<FieldTransform>,
    /// Credential blocks that must carry the literal secret under shared-key
    pub secret_blocks: Vec<FieldPath>,
}

/// A rendered document ready for submission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigDocument {
    pub kind: DocumentKind,
    pub body: Value,
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // upper-case names are runtime placeholders filled in by the control plane
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([a-z][a-z0-9_]*(?:\.[a-z0-9_]+)*)\s*\}\}")
            .expect("placeholder pattern is valid")
    })
}

/// Renders templates for one set of modes and substitutions
pub struct TemplateRenderer<'a> {
    substitutions: &'a Substitutions,
    modes: &'a DeploymentModes,
}

impl<'a> TemplateRenderer<'a> {
    pub fn new(substitutions: &'a Substitutions, modes: &'a DeploymentModes) -> Self {
        Self { substitutions, modes }
    }

    pub fn render(&self, template: &ConfigTemplate) -> Result<ConfigDocument, RenderError> {
        let mut missing = BTreeSet::new();
        let mut body = template.body.clone();
        self.substitute(&mut body, &mut missing);

        let mut transforms: Vec<&FieldTransform> = template
            .transforms
            .iter()
            .filter(|t| self.modes.is_active(t.when))
            .collect();
        // stable sort keeps declaration order within a priority
        transforms.sort_by_key(|t| t.when.kind().priority());

        for transform in transforms {
            debug!("{}: applying {:?} for {}", template.kind, transform.edit, transform.when);
            match &transform.edit {
                FieldEdit::Remove(path) => remove_at(&mut body, path.segments()),
                FieldEdit::Set(path, value) => {
                    let mut value = value.clone();
                    let mut unresolved = BTreeSet::new();
                    self.substitute(&mut value, &mut unresolved);
                    if let Some(placeholder) = unresolved.into_iter().next() {
                        return Err(RenderError::MissingSubstitution {
                            placeholder,
                            path: path.to_string(),
                        });
                    }
                    set_at(&mut body, path.segments(), &value, path)?;
                }
            }
        }

        // a placeholder is only fatal if its field survived phase two
        if !missing.is_empty() {
            if let Some((placeholder, pointer)) = find_placeholder(&body, "", &missing) {
                return Err(RenderError::MissingSubstitution {
                    placeholder,
                    path: if pointer.is_empty() { "/".to_string() } else { pointer },
                });
            }
        }

        check_invariants(template, &body, self.modes)?;

        Ok(ConfigDocument {
            kind: template.kind,
            body,
        })
    }

    fn substitute(&self, value: &mut Value, missing: &mut BTreeSet<String>) {
        match value {
            Value::String(text) => {
                if let Some(replacement) = self.substitute_str(text, missing) {
                    *value = replacement;
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|item| self.substitute(item, missing)),
            Value::Object(map) => map.values_mut().for_each(|item| self.substitute(item, missing)),
            _ => {}
        }
    }

    fn substitute_str(&self, text: &str, missing: &mut BTreeSet<String>) -> Option<Value> {
        let pattern = placeholder_pattern();

        // a placeholder that is the entire string keeps the value's type
        if let Some(captures) = pattern.captures(text) {
            if captures.get(0).map(|m| m.as_str()) == Some(text) {
                let key = &captures[1];
                return match self.substitutions.get(key) {
                    Some(value) => Some(value.clone()),
                    None => {
                        missing.insert(key.to_string());
                        None
                    }
                };
            }
        } else {
            return None;
        }

        let replaced = pattern.replace_all(text, |captures: &Captures| {
            match self.substitutions.get(&captures[1]) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => {
                    missing.insert(captures[1].to_string());
                    captures[0].to_string()
                }
            }
        });
        Some(Value::String(replaced.into_owned()))
    }
}

fn remove_at(node: &mut Value, segments: &[PathSegment]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    if rest.is_empty() {
        match (node, head) {
            (Value::Object(map), PathSegment::Key(key)) => {
                map.remove(key);
            }
            (Value::Array(items), PathSegment::Key(key)) => {
                if let Ok(index) = key.parse::<usize>() {
                    if index < items.len() {
                        items.remove(index);
                    }
                }
            }
            (Value::Object(map), PathSegment::Any) => map.clear(),
            (Value::Array(items), PathSegment::Any) => items.clear(),
            _ => {}
        }
        return;
    }

    for child in children_mut(node, head) {
        remove_at(child, rest);
    }
}

fn set_at(
    node: &mut Value,
    segments: &[PathSegment],
    value: &Value,
    path: &FieldPath,
) -> Result<(), RenderError> {
    let Some((head, rest)) = segments.split_first() else {
        *node = value.clone();
        return Ok(());
    };

    if let (Value::Object(map), PathSegment::Key(key)) = (&mut *node, head) {
        let child = map.entry(key.clone()).or_insert_with(|| {
            if rest.is_empty() {
                Value::Null
            } else {
                Value::Object(Map::new())
            }
        });
        return set_at(child, rest, value, path);
    }

    if !matches!(node, Value::Object(_) | Value::Array(_)) {
        return Err(RenderError::InvalidPath {
            path: path.to_string(),
            reason: "parent is not an object or array".to_string(),
        });
    }

    for child in children_mut(node, head) {
        set_at(child, rest, value, path)?;
    }
    Ok(())
}

fn children_mut<'v>(node: &'v mut Value, segment: &PathSegment) -> Vec<&'v mut Value> {
    match (node, segment) {
        (Value::Object(map), PathSegment::Key(key)) => map.get_mut(key).into_iter().collect(),
        (Value::Array(items), PathSegment::Key(key)) => key
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get_mut(index))
            .into_iter()
            .collect(),
        (Value::Object(map), PathSegment::Any) => map.values_mut().collect(),
        (Value::Array(items), PathSegment::Any) => items.iter_mut().collect(),
        _ => Vec::new(),
    }
}

fn children<'v>(node: &'v Value, segment: &PathSegment) -> Vec<&'v Value> {
    match (node, segment) {
        (Value::Object(map), PathSegment::Key(key)) => map.get(key).into_iter().collect(),
        (Value::Array(items), PathSegment::Key(key)) => key
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index))
            .into_iter()
            .collect(),
        (Value::Object(map), PathSegment::Any) => map.values().collect(),
        (Value::Array(items), PathSegment::Any) => items.iter().collect(),
        _ => Vec::new(),
    }
}

fn select<'v>(root: &'v Value, path: &FieldPath) -> Vec<&'v Value> {
    path.segments().iter().fold(vec![root], |nodes, segment| {
        nodes.into_iter().flat_map(|node| children(node, segment)).collect()
    })
}

/// First surviving placeholder from `names`, with its JSON pointer
fn find_placeholder(
    node: &Value,
    pointer: &str,
    names: &BTreeSet<String>,
) -> Option<(String, String)> {
    match node {
        Value::String(text) => placeholder_pattern()
            .captures_iter(text)
            .map(|c| c[1].to_string())
            .find(|name| names.contains(name))
            .map(|name| (name, pointer.to_string())),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, item)| find_placeholder(item, &format!("{}/{}", pointer, i), names)),
        Value::Object(map) => map.iter().find_map(|(key, item)| {
            let escaped = key.replace('~', "~0").replace('/', "~1");
            find_placeholder(item, &format!("{}/{}", pointer, escaped), names)
        }),
        _ => None,
    }
}

/// Pointers of every credential block that carries a literal secret
fn literal_secrets(node: &Value, pointer: &str, found: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            for (key, child) in map {
                let child_pointer = format!("{}/{}", pointer, key);
                if key == CREDENTIAL_BLOCK {
                    if let Some(block) = child.as_object() {
                        if block.contains_key(LITERAL_SECRET_FIELD) {
                            found.push(child_pointer.clone());
                        }
                    }
                }
                literal_secrets(child, &child_pointer, found);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                literal_secrets(child, &format!("{}/{}", pointer, i), found);
            }
        }
        _ => {}
    }
}

fn check_invariants(
    template: &ConfigTemplate,
    body: &Value,
    modes: &DeploymentModes,
) -> Result<(), RenderError> {
    let violation = |reason: String| RenderError::InvariantViolation {
        kind: template.kind,
        reason,
    };

    match modes.credential {
        CredentialStrategy::SharedKey => {
            for path in &template.secret_blocks {
                let blocks = select(body, path);
                if blocks.is_empty() {
                    return Err(violation(format!("credential block '{}' is missing", path)));
                }
                let has_secret = |block: &&Value| {
                    block
                        .get(LITERAL_SECRET_FIELD)
                        .and_then(Value::as_str)
                        .is_some_and(|s| !s.is_empty())
                };
                if !blocks.iter().all(has_secret) {
                    return Err(violation(format!(
                        "credential block '{}' has no {} under shared-key",
                        path, LITERAL_SECRET_FIELD
                    )));
                }
            }
        }
        CredentialStrategy::FederatedIdentity => {
            let mut found = Vec::new();
            literal_secrets(body, "", &mut found);
            if let Some(pointer) = found.first() {
                return Err(violation(format!(
                    "{} present at {} under federated-identity",
                    LITERAL_SECRET_FIELD, pointer
                )));
            }
        }
    }
    Ok(())
}
