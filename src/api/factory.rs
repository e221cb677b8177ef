//! Response object factory.
//!
//! Turns an XML body into the entity registered for its root tag. The table
//! below is the only place that decides which roots are understood; any other
//! root yields `Ok(None)`.

use std::collections::BTreeMap;

use tracing::debug;

use super::client::ClientHandle;
use super::error::Result;
use super::types::{Change, ChangeList, FieldValue, Issue, IssueList};
use super::xml::{self, Element};

/// A decoded response body.
#[derive(Debug, Clone)]
pub enum Entity {
    Issue(Issue),
    Issues(IssueList),
    Changes(ChangeList),
}

impl Entity {
    pub fn into_issue(self) -> Option<Issue> {
        match self {
            Entity::Issue(issue) => Some(issue),
            _ => None,
        }
    }

    pub fn into_issues(self) -> Option<IssueList> {
        match self {
            Entity::Issues(issues) => Some(issues),
            _ => None,
        }
    }

    pub fn into_changes(self) -> Option<ChangeList> {
        match self {
            Entity::Changes(changes) => Some(changes),
            _ => None,
        }
    }
}

type Constructor = fn(&Element, &ClientHandle) -> Entity;

/// Root tag to entity constructor.
const ENTITY_TYPES: &[(&str, Constructor)] = &[
    ("issue", issue_entity),
    ("issues", issue_list_entity),
    ("changes", change_list_entity),
];

fn issue_entity(root: &Element, client: &ClientHandle) -> Entity {
    Entity::Issue(build_issue(root, client))
}

fn issue_list_entity(root: &Element, client: &ClientHandle) -> Entity {
    Entity::Issues(build_issue_list(root, client))
}

fn change_list_entity(root: &Element, _client: &ClientHandle) -> Entity {
    Entity::Changes(build_change_list(root))
}

fn constructor_for(tag: &str) -> Option<Constructor> {
    ENTITY_TYPES
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, constructor)| *constructor)
}

/// Decode a response body.
///
/// # Errors
///
/// Returns `ApiError::MalformedResponse` if the body is not well-formed XML.
pub fn build(body: &str, client: &ClientHandle) -> Result<Option<Entity>> {
    let root = xml::parse(body)?;
    Ok(build_element(&root, client))
}

/// Decode an already parsed element.
pub fn build_element(root: &Element, client: &ClientHandle) -> Option<Entity> {
    match constructor_for(&root.tag) {
        Some(constructor) => Some(constructor(root, client)),
        None => {
            debug!(tag = %root.tag, "No entity registered for root tag");
            None
        }
    }
}

/// Flatten an `<issue>` element: its attributes plus every
/// `<field name="..."><value>...</value></field>` child.
fn build_issue(root: &Element, client: &ClientHandle) -> Issue {
    let mut fields = BTreeMap::new();

    for (name, value) in &root.attributes {
        fields.insert(name.clone(), FieldValue::Text(value.clone()));
    }

    for field in root.children.iter().filter(|c| c.tag == "field") {
        let Some(name) = field.attribute("name") else {
            continue;
        };
        let value = field.child("value").and_then(Element::trimmed_text);
        fields.insert(name.to_string(), FieldValue::from_text(value));
    }

    Issue::new(fields, client.clone())
}

fn build_issue_list(root: &Element, client: &ClientHandle) -> IssueList {
    let issues = root
        .children
        .iter()
        .filter_map(|child| build_element(child, client))
        .filter_map(Entity::into_issue)
        .collect();
    IssueList::new(issues)
}

fn build_change_list(root: &Element) -> ChangeList {
    let changes = root
        .children
        .iter()
        .filter(|child| child.tag == "change")
        .map(|child| Change::from_structure(&xml::convert(child)))
        .collect();
    ChangeList::new(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;

    const ISSUE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
        <issue id="DEMO-1" entityId="2-1">
            <field name="summary"><value>Bug</value></field>
            <field name="description"><value>It crashes</value></field>
        </issue>"#;

    fn handle() -> ClientHandle {
        ClientHandle::detached()
    }

    #[test]
    fn test_every_registered_tag_builds_its_entity() {
        let cases = [
            ("<issue id=\"A-1\"/>", "issue"),
            ("<issues><issue id=\"A-1\"/></issues>", "issues"),
            ("<changes><change/></changes>", "changes"),
        ];
        for (body, tag) in cases {
            let entity = build(body, &handle()).unwrap().unwrap();
            let matched = match entity {
                Entity::Issue(_) => "issue",
                Entity::Issues(_) => "issues",
                Entity::Changes(_) => "changes",
            };
            assert_eq!(matched, tag);
        }
    }

    #[test]
    fn test_unknown_root_yields_none() {
        assert!(build("<login>ok</login>", &handle()).unwrap().is_none());
        assert!(build("<error>boom</error>", &handle()).unwrap().is_none());
    }

    #[test]
    fn test_malformed_body_is_an_error() {
        for body in ["", "<issue>", "<issue></field>", "plain text"] {
            let err = build(body, &handle()).unwrap_err();
            assert!(matches!(err, ApiError::MalformedResponse(_)), "{body:?}");
        }
    }

    #[test]
    fn test_issue_fields_are_attributes_plus_field_children() {
        let issue = build(ISSUE_XML, &handle())
            .unwrap()
            .and_then(Entity::into_issue)
            .unwrap();

        let keys: Vec<&str> = issue.fields().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["description", "entityId", "id", "summary"]);
        assert_eq!(issue.id(), Some("DEMO-1"));
        assert_eq!(issue.summary(), Some("Bug"));
        assert_eq!(issue.description(), Some("It crashes"));
    }

    #[test]
    fn test_issue_field_without_value_is_empty() {
        let issue = build(
            r#"<issue id="DEMO-1"><field name="Assignee"/><field name="Due"><value/></field></issue>"#,
            &handle(),
        )
        .unwrap()
        .and_then(Entity::into_issue)
        .unwrap();

        assert_eq!(issue.field("Assignee"), Some(&FieldValue::Empty));
        assert_eq!(issue.field("Due"), Some(&FieldValue::Empty));
    }

    #[test]
    fn test_issue_takes_first_of_several_values() {
        let issue = build(
            r#"<issue id="DEMO-1"><field name="Fix versions"><value>1.0</value><value>2.0</value></field></issue>"#,
            &handle(),
        )
        .unwrap()
        .and_then(Entity::into_issue)
        .unwrap();

        assert_eq!(issue.field("Fix versions").unwrap().as_str(), Some("1.0"));
    }

    #[test]
    fn test_issue_list_keeps_order_and_skips_unknown_children() {
        let list = build(
            r#"<issues>
                <issue id="DEMO-1"/>
                <comment id="c"/>
                <issue id="DEMO-2"/>
            </issues>"#,
            &handle(),
        )
        .unwrap()
        .and_then(Entity::into_issues)
        .unwrap();

        let ids: Vec<_> = list.iter().filter_map(Issue::id).collect();
        assert_eq!(ids, vec!["DEMO-1", "DEMO-2"]);
    }

    #[test]
    fn test_change_list() {
        let changes = build(
            r#"<changes>
                <change><field name="summary"><oldValue>a</oldValue><newValue>b</newValue></field></change>
                <change><field name="votes"><oldValue>0</oldValue><newValue>1</newValue></field></change>
            </changes>"#,
            &handle(),
        )
        .unwrap()
        .and_then(Entity::into_changes)
        .unwrap();

        assert_eq!(changes.len(), 2);
        assert!(changes[0].field("summary").is_some());
        assert_eq!(changes[1].field("votes").unwrap().new_values()[0].text(), "1");
    }
}
