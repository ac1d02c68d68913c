use serde::Serialize;

use crate::registry::{TemplateId, TemplateRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelItem {
    pub id: TemplateId,
    pub name: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelView {
    pub items: Vec<PanelItem>,
    pub edit_value: String,
    pub edit_focused: bool,
    pub edit_selected_all: bool,
}

/// State of the template management controls: the list and the rename input.
#[derive(Debug, Clone, Default)]
pub struct ManagementPanel {
    edit_value: String,
    edit_focused: bool,
    edit_selected_all: bool,
}

impl ManagementPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edit_value(&self) -> &str {
        &self.edit_value
    }

    pub fn is_focused(&self) -> bool {
        self.edit_focused
    }

    pub fn is_selected_all(&self) -> bool {
        self.edit_selected_all
    }

    /// Typing replaces the text and collapses any select-all.
    pub fn set_edit_value(&mut self, value: impl Into<String>) {
        self.edit_value = value.into();
        self.edit_selected_all = false;
    }

    /// Mirrors the selected record's name into the input, or empties it.
    pub fn sync_selection(&mut self, registry: &TemplateRegistry) {
        self.edit_value = registry
            .selected()
            .map(|template| template.name)
            .unwrap_or_default();
        self.edit_selected_all = false;
    }

    pub fn clear_edit(&mut self) {
        self.edit_value.clear();
        self.edit_selected_all = false;
    }

    pub fn focus_and_select_all(&mut self) {
        self.edit_focused = true;
        self.edit_selected_all = true;
    }

    pub fn blur(&mut self) {
        self.edit_focused = false;
        self.edit_selected_all = false;
    }

    pub fn render(&self, registry: &TemplateRegistry) -> PanelView {
        let selected = registry.selected().map(|template| template.id);
        let items = registry
            .list()
            .into_iter()
            .map(|template| PanelItem {
                selected: selected.as_ref() == Some(&template.id),
                id: template.id,
                name: template.name,
            })
            .collect();
        PanelView {
            items,
            edit_value: self.edit_value.clone(),
            edit_focused: self.edit_focused,
            edit_selected_all: self.edit_selected_all,
        }
    }
}
