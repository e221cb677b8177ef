//! YouTrack entity types.
//!
//! Entities are immutable snapshots of the XML the server returned. Field
//! names are not fixed, so an issue stores everything in a flat map and only
//! offers named accessors for the well-known fields. Chained calls such as
//! [`Issue::update`] go through a non-owning [`ClientHandle`] and never touch
//! the local copy.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

use serde::Serialize;

use super::client::{ClientHandle, Command};
use super::error::Result;
use super::xml::{Structure, ATTRIBUTE_PREFIX, TEXT_FIELD};

/// Value of an issue field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Empty,
}

impl FieldValue {
    /// Build from optional text, treating blank text as empty.
    pub fn from_text(text: Option<&str>) -> Self {
        match text.map(str::trim) {
            Some(t) if !t.is_empty() => FieldValue::Text(t.to_string()),
            _ => FieldValue::Empty,
        }
    }

    /// The text value, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Empty)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str().unwrap_or(""))
    }
}

/// A YouTrack issue.
///
/// Returned by `GET /rest/issue/{id}` or as part of an issue list.
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    fields: BTreeMap<String, FieldValue>,
    #[serde(skip)]
    client: ClientHandle,
}

impl Issue {
    /// Create an issue from an already flattened field map.
    pub fn new(fields: BTreeMap<String, FieldValue>, client: ClientHandle) -> Self {
        Self { fields, client }
    }

    /// All fields, root attributes included.
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Look up any field by name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_str)
    }

    /// The issue ID (e.g., "DEMO-1").
    pub fn id(&self) -> Option<&str> {
        self.text("id")
    }

    pub fn summary(&self) -> Option<&str> {
        self.text("summary")
    }

    pub fn description(&self) -> Option<&str> {
        self.text("description")
    }

    pub fn project_short_name(&self) -> Option<&str> {
        self.text("projectShortName")
    }

    pub fn number_in_project(&self) -> Option<u64> {
        self.text("numberInProject").and_then(|n| n.parse().ok())
    }

    /// Creation time in milliseconds since the epoch.
    pub fn created(&self) -> Option<i64> {
        self.text("created").and_then(|n| n.parse().ok())
    }

    /// Last update time in milliseconds since the epoch.
    pub fn updated(&self) -> Option<i64> {
        self.text("updated").and_then(|n| n.parse().ok())
    }

    pub fn resolved(&self) -> Option<i64> {
        self.text("resolved").and_then(|n| n.parse().ok())
    }

    pub fn reporter_name(&self) -> Option<&str> {
        self.text("reporterName")
    }

    pub fn updater_name(&self) -> Option<&str> {
        self.text("updaterName")
    }

    pub fn votes(&self) -> Option<u32> {
        self.text("votes").and_then(|n| n.parse().ok())
    }

    pub fn comments_count(&self) -> Option<u32> {
        self.text("commentsCount").and_then(|n| n.parse().ok())
    }

    pub fn permitted_group(&self) -> Option<&str> {
        self.text("permittedGroup")
    }

    fn require_id(&self) -> Result<&str> {
        self.id()
            .ok_or_else(|| super::ApiError::InvalidResponse("issue has no id".to_string()))
    }

    /// Update summary and/or description on the server.
    ///
    /// Returns `false` when the server did not accept the update. The local
    /// snapshot is left unchanged.
    pub async fn update(&self, summary: Option<&str>, description: Option<&str>) -> Result<bool> {
        let client = self.client.client()?;
        client
            .update_issue(self.require_id()?, summary, description)
            .await
    }

    /// Delete this issue on the server.
    pub async fn delete(&self) -> Result<bool> {
        let client = self.client.client()?;
        client.delete_issue(self.require_id()?).await
    }

    /// Fetch every historical state of this issue.
    pub async fn history(&self) -> Result<Option<IssueList>> {
        let client = self.client.client()?;
        client.get_issue_history(self.require_id()?).await
    }

    /// Fetch the change log of this issue.
    pub async fn changes(&self) -> Result<Option<ChangeList>> {
        let client = self.client.client()?;
        client.get_issue_changes(self.require_id()?).await
    }

    /// Apply a command to this issue.
    pub async fn execute(&self, command: &Command) -> Result<bool> {
        let client = self.client.client()?;
        client.execute_command(self.require_id()?, command).await
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.id(), self.summary()) {
            (Some(id), Some(summary)) => write!(f, "{}: {}", id, summary),
            (Some(id), None) => write!(f, "{}", id),
            _ => write!(f, "<issue without id>"),
        }
    }
}

/// An ordered list of issues.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct IssueList(Vec<Issue>);

impl IssueList {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self(issues)
    }

    pub fn into_vec(self) -> Vec<Issue> {
        self.0
    }
}

impl Deref for IssueList {
    type Target = [Issue];

    fn deref(&self) -> &[Issue] {
        &self.0
    }
}

impl IntoIterator for IssueList {
    type Item = Issue;
    type IntoIter = std::vec::IntoIter<Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// One value of a changed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChangeValue {
    Text(String),
    Link { text: String, url: String },
}

impl ChangeValue {
    /// Build from a converted `<value>`-like element. Empty values yield `None`.
    fn from_structure(structure: &Structure) -> Option<Self> {
        match structure {
            Structure::Text(text) => Some(ChangeValue::Text(text.clone())),
            Structure::Map(_) => {
                let text = structure.get(TEXT_FIELD).and_then(Structure::as_text)?;
                match structure.get("@url").and_then(Structure::as_text) {
                    Some(url) => Some(ChangeValue::Link {
                        text: text.to_string(),
                        url: url.to_string(),
                    }),
                    None => Some(ChangeValue::Text(text.to_string())),
                }
            }
            _ => None,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ChangeValue::Text(text) | ChangeValue::Link { text, .. } => text,
        }
    }
}

/// A field touched by a change, with its values grouped by tag
/// (`value`, `oldValue`, `newValue`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeField {
    values: BTreeMap<String, Vec<ChangeValue>>,
}

impl ChangeField {
    /// Build from the converted `<field>` element.
    pub fn from_structure(field: &Structure) -> Self {
        let mut values = BTreeMap::new();
        if let Structure::Map(entries) = field {
            for (tag, structure) in entries {
                if tag.starts_with(ATTRIBUTE_PREFIX) || tag == TEXT_FIELD {
                    continue;
                }
                let parsed: Vec<ChangeValue> = structure
                    .items()
                    .filter_map(ChangeValue::from_structure)
                    .collect();
                values.insert(tag.clone(), parsed);
            }
        }
        Self { values }
    }

    /// Values recorded under the given tag.
    pub fn values(&self, tag: &str) -> &[ChangeValue] {
        self.values.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first plain value.
    pub fn value(&self) -> Option<&ChangeValue> {
        self.values("value").first()
    }

    pub fn old_values(&self) -> &[ChangeValue] {
        self.values("oldValue")
    }

    pub fn new_values(&self) -> &[ChangeValue] {
        self.values("newValue")
    }
}

/// A single change made to an issue.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Change {
    fields: BTreeMap<String, ChangeField>,
}

impl Change {
    /// Build from a converted `<change>` element.
    ///
    /// Every `<field name="...">` child becomes one entry.
    pub fn from_structure(change: &Structure) -> Self {
        let mut fields = BTreeMap::new();
        if let Some(entries) = change.get("field") {
            for field in entries.items() {
                let Some(name) = field.get("@name").and_then(Structure::as_text) else {
                    continue;
                };
                fields.insert(name.to_string(), ChangeField::from_structure(field));
            }
        }
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&ChangeField> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, ChangeField> {
        &self.fields
    }

    /// Login of the user who made the change.
    pub fn updater_name(&self) -> Option<&str> {
        self.field("updaterName")
            .and_then(ChangeField::value)
            .map(ChangeValue::text)
    }
}

/// The change log of an issue, oldest first.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ChangeList(Vec<Change>);

impl ChangeList {
    pub fn new(changes: Vec<Change>) -> Self {
        Self(changes)
    }
}

impl Deref for ChangeList {
    type Target = [Change];

    fn deref(&self) -> &[Change] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::xml::{convert, parse};

    fn issue(pairs: &[(&str, &str)]) -> Issue {
        let fields = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Text(v.to_string())))
            .collect();
        Issue::new(fields, ClientHandle::detached())
    }

    #[test]
    fn test_field_value_from_text() {
        assert_eq!(FieldValue::from_text(Some(" a ")), FieldValue::Text("a".into()));
        assert_eq!(FieldValue::from_text(Some("  ")), FieldValue::Empty);
        assert_eq!(FieldValue::from_text(None), FieldValue::Empty);
    }

    #[test]
    fn test_issue_named_accessors() {
        let issue = issue(&[
            ("id", "DEMO-7"),
            ("summary", "Crash"),
            ("numberInProject", "7"),
            ("created", "1262000000000"),
            ("projectShortName", "DEMO"),
        ]);

        assert_eq!(issue.id(), Some("DEMO-7"));
        assert_eq!(issue.summary(), Some("Crash"));
        assert_eq!(issue.number_in_project(), Some(7));
        assert_eq!(issue.created(), Some(1_262_000_000_000));
        assert_eq!(issue.project_short_name(), Some("DEMO"));
        assert_eq!(issue.description(), None);
    }

    #[test]
    fn test_issue_unknown_fields_reachable() {
        let issue = issue(&[("id", "DEMO-1"), ("Fix versions", "1.0")]);
        assert_eq!(
            issue.field("Fix versions"),
            Some(&FieldValue::Text("1.0".into()))
        );
    }

    #[test]
    fn test_issue_display() {
        assert_eq!(issue(&[("id", "DEMO-1"), ("summary", "Bug")]).to_string(), "DEMO-1: Bug");
        assert_eq!(issue(&[("id", "DEMO-1")]).to_string(), "DEMO-1");
    }

    #[test]
    fn test_issue_serializes_fields_only() {
        let json = serde_json::to_value(issue(&[("id", "DEMO-1")])).unwrap();
        assert_eq!(json, serde_json::json!({ "fields": { "id": "DEMO-1" } }));
    }

    #[tokio::test]
    async fn test_chained_call_on_detached_issue_fails() {
        let issue = issue(&[("id", "DEMO-1")]);
        let err = issue.delete().await.unwrap_err();
        assert!(matches!(err, crate::api::ApiError::ClientClosed));
    }

    #[test]
    fn test_change_from_structure() {
        let root = parse(
            r#"<change>
                <field name="updaterName"><value>root</value></field>
                <field name="summary"><oldValue>Old</oldValue><newValue>New</newValue></field>
                <field name="links">
                    <value url="http://yt/issue/DEMO-2">DEMO-2</value>
                    <value>DEMO-3</value>
                </field>
            </change>"#,
        )
        .unwrap();
        let change = Change::from_structure(&convert(&root));

        assert_eq!(change.updater_name(), Some("root"));
        let summary = change.field("summary").unwrap();
        assert_eq!(summary.old_values(), &[ChangeValue::Text("Old".into())]);
        assert_eq!(summary.new_values(), &[ChangeValue::Text("New".into())]);

        let links = change.field("links").unwrap();
        assert_eq!(
            links.values("value"),
            &[
                ChangeValue::Link {
                    text: "DEMO-2".into(),
                    url: "http://yt/issue/DEMO-2".into()
                },
                ChangeValue::Text("DEMO-3".into()),
            ]
        );
    }
}
