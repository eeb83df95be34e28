//! Inline editing of the user's display name.

/// What the caller should do after [`NameEditor::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing to send; editing ended and the input was restored.
    Cancelled,
    /// Ask the server for this name. Editing stays on until it answers.
    Request(String),
}

/// State of the name edit field.
#[derive(Debug, Clone, Default)]
pub struct NameEditor {
    editing: bool,
    input: String,
}

impl NameEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, value: impl Into<String>) {
        self.input = value.into();
    }

    /// Starts editing with the current name prefilled.
    pub fn start(&mut self, current_name: &str) {
        self.input = current_name.to_string();
        self.editing = true;
    }

    /// Submits the input. Blank or unchanged names cancel the edit.
    pub fn save(&mut self, current_name: &str) -> SaveOutcome {
        let name = self.input.trim();
        if name.is_empty() || name == current_name {
            self.editing = false;
            self.input = current_name.to_string();
            return SaveOutcome::Cancelled;
        }
        SaveOutcome::Request(name.to_string())
    }

    /// The server accepted the new name.
    pub fn finish(&mut self, new_name: &str) {
        self.editing = false;
        self.input = new_name.to_string();
    }
}
