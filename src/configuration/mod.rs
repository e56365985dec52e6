//! Configuration Module
//!
//! Opaque structured form of a service's configuration document and the
//! parser contract that converts between the stored bytes and that form.
//! The schema itself is owned by each service and travels as a
//! [`ConfigurationModel`].

mod json;

pub use json::JsonConfigurationParser;

use crate::error::Result;
use crate::topology::FunctionIdentifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema description published by a service over its management channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationModel {
    pub identifier: FunctionIdentifier,
    pub name: String,
    pub version: String,
    /// Name of the element every document of this model is rooted at
    pub root_element: String,
}

impl ConfigurationModel {
    pub fn new(identifier: FunctionIdentifier, root_element: impl Into<String>) -> Self {
        Self {
            identifier,
            name: identifier.path(),
            version: "1.0".to_string(),
            root_element: root_element.into(),
        }
    }
}

/// One element of an editable configuration tree
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ElementContent {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElementContent>,
}

impl ElementContent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: ElementContent) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn child(&self, name: &str) -> Option<&ElementContent> {
        self.children.iter().find(|child| child.name == name)
    }
}

/// Converts stored configuration documents to and from [`ElementContent`]
pub trait ConfigurationParser: Send + Sync {
    fn parse(&self, document: &[u8], model: &ConfigurationModel) -> Result<ElementContent>;

    fn serialize(&self, content: &ElementContent, model: &ConfigurationModel) -> Result<Vec<u8>>;
}
