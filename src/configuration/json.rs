use super::{ConfigurationModel, ConfigurationParser, ElementContent};
use crate::error::{ConductorError, Result};

/// Stores configuration trees as JSON documents
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConfigurationParser;

impl JsonConfigurationParser {
    fn check_root(content: &ElementContent, model: &ConfigurationModel) -> Result<()> {
        if content.name != model.root_element {
            return Err(ConductorError::Configuration(format!(
                "Expected root element '{}' for {}, found '{}'",
                model.root_element, model.identifier, content.name
            )));
        }
        Ok(())
    }
}

impl ConfigurationParser for JsonConfigurationParser {
    fn parse(&self, document: &[u8], model: &ConfigurationModel) -> Result<ElementContent> {
        // Engines created without configuration carry an empty document
        if document.iter().all(u8::is_ascii_whitespace) {
            return Ok(ElementContent::new(&model.root_element));
        }

        let content: ElementContent = serde_json::from_slice(document).map_err(|e| {
            ConductorError::Configuration(format!(
                "Unable to parse {} configuration: {}",
                model.identifier, e
            ))
        })?;
        Self::check_root(&content, model)?;
        Ok(content)
    }

    fn serialize(&self, content: &ElementContent, model: &ConfigurationModel) -> Result<Vec<u8>> {
        Self::check_root(content, model)?;
        serde_json::to_vec_pretty(content).map_err(|e| {
            ConductorError::Configuration(format!(
                "Unable to serialize {} configuration: {}",
                model.identifier, e
            ))
        })
    }
}
