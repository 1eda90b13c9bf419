//! Avatar persona configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How long replies should be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl ResponseLength {
    /// Instruction text for the model.
    pub fn guidance(&self) -> &'static str {
        match self {
            ResponseLength::Short => "Keep replies to one to three sentences.",
            ResponseLength::Medium => "Reply in one short paragraph.",
            ResponseLength::Long => "Give a detailed reply of a few paragraphs when the question warrants it.",
        }
    }
}

/// Who the avatar is and how it speaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub name: String,
    pub tone: String,
    pub expertise: Vec<String>,
    pub personality_traits: Vec<String>,
    pub response_length: ResponseLength,
    pub custom_instructions: Option<String>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: "the creator".to_string(),
            tone: "friendly and conversational".to_string(),
            expertise: Vec::new(),
            personality_traits: Vec::new(),
            response_length: ResponseLength::Medium,
            custom_instructions: None,
        }
    }
}

impl PersonaConfig {
    /// Template variables describing this persona.
    pub fn template_vars(&self) -> HashMap<String, String> {
        let list = |items: &[String]| {
            if items.is_empty() {
                "not specified".to_string()
            } else {
                items.join(", ")
            }
        };

        HashMap::from([
            ("name".to_string(), self.name.clone()),
            ("tone".to_string(), self.tone.clone()),
            ("expertise".to_string(), list(&self.expertise)),
            ("traits".to_string(), list(&self.personality_traits)),
            ("length_guidance".to_string(), self.response_length.guidance().to_string()),
            (
                "custom_instructions".to_string(),
                self.custom_instructions.clone().unwrap_or_default(),
            ),
        ])
    }
}
