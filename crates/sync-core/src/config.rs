use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event_loop::DEFAULT_MAX_TURNS;
use crate::registry::Template;
use crate::widget::{WidgetContract, is_custom_element_name};

const DEFAULT_NEW_TEMPLATE_NAME: &str = "template";
const DEFAULT_INITIAL_CONTENT: &str = "There is some text that user typed manually";

fn default_seed_templates() -> Vec<Template> {
    (1..=3)
        .map(|n| Template::new(n.to_string(), format!("template {n}")))
        .collect()
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub widget: WidgetContract,
    pub seed_templates: Vec<Template>,
    pub new_template_name: String,
    pub initial_content: String,
    pub max_turns: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            widget: WidgetContract::default(),
            seed_templates: default_seed_templates(),
            new_template_name: DEFAULT_NEW_TEMPLATE_NAME.to_string(),
            initial_content: DEFAULT_INITIAL_CONTENT.to_string(),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }
}

impl SyncConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.max_turns == 0 {
            self.max_turns = DEFAULT_MAX_TURNS;
        }
        if self.new_template_name.trim().is_empty() {
            self.new_template_name = DEFAULT_NEW_TEMPLATE_NAME.to_string();
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let widget = &self.widget;
        if widget.tag.trim().is_empty() {
            return Err(ConfigError::new("widget tag must not be empty"));
        }
        if !is_custom_element_name(&widget.tag) {
            return Err(ConfigError::new(format!(
                "widget tag `{}` must start with a lowercase letter, contain a hyphen \
                 and use only lowercase letters, digits, `-`, `_` or `.`",
                widget.tag
            )));
        }
        for (field, value) in [
            ("value_attribute", &widget.value_attribute),
            ("deletable_attribute", &widget.deletable_attribute),
            ("tooltip_attribute", &widget.tooltip_attribute),
            ("marker_attribute", &widget.marker_attribute),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::new(format!("widget.{field} must not be empty")));
            }
        }
        if widget.value_attribute == widget.deletable_attribute
            || widget.value_attribute == widget.tooltip_attribute
        {
            return Err(ConfigError::new(
                "widget.value_attribute must not be a transient attribute",
            ));
        }

        let mut seen = HashSet::new();
        for template in &self.seed_templates {
            if !seen.insert(template.id.as_str()) {
                return Err(ConfigError::new(format!(
                    "duplicate seed template id `{}`",
                    template.id
                )));
            }
        }
        Ok(())
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = serde_json::from_str(s)
            .map_err(|err| ConfigError::new(format!("invalid config JSON: {err}")))?;
        let config = config.with_defaults();
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
