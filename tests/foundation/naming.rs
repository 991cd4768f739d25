//! Integration tests for naming rules
//!
//! Tests de-pluralization, composed column names, and accessor-pair names.

use stowage_foundation::naming::{
    capitalize, contained_name, de_pluralize, decapitalize, property_name, sanitize_identifier,
};

#[test]
fn de_pluralize_strips_trailing_s() {
    assert_eq!(de_pluralize("items"), "item");
    assert_eq!(de_pluralize("item"), "item");
    assert_eq!(de_pluralize(""), "");
}

#[test]
fn de_pluralize_irregulars() {
    assert_eq!(de_pluralize("children"), "child");
    assert_eq!(de_pluralize("Children"), "Child");
}

#[test]
fn de_pluralize_is_naive() {
    assert_eq!(de_pluralize("class"), "clas");
}

#[test]
fn composed_names() {
    assert_eq!(contained_name("orders", "items"), "orderItem");
    assert_eq!(contained_name("Children", "items"), "ChildItem");
    assert_eq!(contained_name("Team", "members"), "TeamMember");
    assert_eq!(contained_name("owner", "id"), "ownerId");
}

#[test]
fn case_helpers() {
    assert_eq!(capitalize("name"), "Name");
    assert_eq!(decapitalize("Name"), "name");
    assert_eq!(capitalize(""), "");
}

#[test]
fn accessor_pairs() {
    assert_eq!(property_name("getName", "setName").as_deref(), Some("name"));
    assert_eq!(property_name("isActive", "setActive").as_deref(), Some("active"));
    assert_eq!(property_name("getName", "setTitle"), None);
    assert_eq!(property_name("name", "setName"), None);
    assert_eq!(property_name("get", "set"), None);
}

#[test]
fn identifiers() {
    assert_eq!(sanitize_identifier("player data"), "player_data");
}
