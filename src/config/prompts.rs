//! Prompt templates for avatar responses.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("Invalid regex"));

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub persona: PersonaPrompts,
    pub summary: SummaryPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts that shape the avatar's answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaPrompts {
    /// Persona instruction. Variables: name, tone, expertise, traits, length_guidance.
    pub system: String,
    /// Appended when the persona carries custom instructions.
    pub custom_instructions: String,
    /// Wraps retrieved excerpts. Variables: context.
    pub context: String,
    /// Used instead of `context` when nothing relevant was retrieved.
    pub no_context: String,
}

impl Default for PersonaPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are {{name}}, replying to messages from your audience as yourself.

Tone: {{tone}}
Areas of expertise: {{expertise}}
Personality: {{traits}}
Response length: {{length_guidance}}

Guidelines:
- Speak in the first person, in your own voice
- Only make specific claims about yourself, your content, or your opinions when the provided excerpts support them
- Never invent events, collaborations, sponsorships, or statements you did not make
- Keep replies friendly and conversational, as in a direct message"#
                .to_string(),

            custom_instructions: r#"Additional instructions:
{{custom_instructions}}"#
                .to_string(),

            context: r#"Excerpts from your own content that may help with this message:

{{context}}

Base your reply on these excerpts. If they do not cover the question, say so instead of guessing."#
                .to_string(),

            no_context: r#"No relevant excerpts from your content were found for this message.
Tell the person plainly that you don't have enough information to answer that from your content.
Do not make up details about yourself, your content, or your opinions."#
                .to_string(),
        }
    }
}

/// Prompts for auxiliary content summarization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryPrompts {
    pub system: String,
    /// Variables: text, max_length.
    pub user: String,
}

impl Default for SummaryPrompts {
    fn default() -> Self {
        Self {
            system: "You summarize social media content faithfully and concisely. Never add information that is not in the text.".to_string(),
            user: r#"Summarize the following content in at most {{max_length}} characters.
Keep names, numbers, and key claims intact.

{{text}}"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let persona_path = custom_path.join("persona.toml");
            if persona_path.exists() {
                let content = std::fs::read_to_string(&persona_path)?;
                prompts.persona = toml::from_str(&content)?;
            }

            let summary_path = custom_path.join("summary.toml");
            if summary_path.exists() {
                let content = std::fs::read_to_string(&summary_path)?;
                prompts.summary = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    ///
    /// Placeholders are filled in a single pass, so substituted values are
    /// never rendered again. Unknown placeholders are left as they are.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| match vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(prompts.persona.system.contains("{{name}}"));
        assert!(prompts.persona.context.contains("{{context}}"));
        assert!(!prompts.persona.no_context.is_empty());
        assert!(prompts.summary.user.contains("{{max_length}}"));
    }

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} messages.";
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        vars.insert("count".to_string(), "5".to_string());

        let result = Prompts::render(template, &vars);
        assert_eq!(result, "Hello Alice, you have 5 messages.");
    }

    #[test]
    fn test_substituted_values_are_not_rendered_again() {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Maya".to_string());
        vars.insert("context".to_string(), "My favourite quote is {{name}} and {{tone}}.".to_string());

        for _ in 0..50 {
            let result = Prompts::render("{{name}} says: {{context}} {{unknown}}", &vars);
            assert_eq!(result, "Maya says: My favourite quote is {{name}} and {{tone}}. {{unknown}}");
        }
    }

    #[test]
    fn test_provided_vars_override_custom() {
        let mut prompts = Prompts::default();
        prompts
            .variables
            .insert("handle".to_string(), "@config".to_string());
        prompts
            .variables
            .insert("brand".to_string(), "Glow".to_string());

        let mut vars = HashMap::new();
        vars.insert("handle".to_string(), "@call".to_string());

        let rendered = prompts.render_with_custom("{{handle}} for {{brand}}", &vars);
        assert_eq!(rendered, "@call for Glow");
    }

    #[test]
    fn test_load_custom_persona_prompts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("persona.toml"),
            "system = \"You are {{name}}. Be brief.\"\n",
        )
        .unwrap();

        let prompts = Prompts::load(dir.path().to_str(), None).unwrap();
        assert_eq!(prompts.persona.system, "You are {{name}}. Be brief.");
        // Fields missing from the file keep their defaults.
        assert!(prompts.persona.context.contains("{{context}}"));
    }
}
