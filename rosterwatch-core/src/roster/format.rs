use crate::config::NotifySection;

use super::drift::DriftResult;
use super::snapshot::EntitySnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFormatter {
    removed_header: String,
    added_header: String,
}

impl Default for NotificationFormatter {
    fn default() -> Self {
        Self::new("Removed entities:", "Added entities:")
    }
}

impl NotificationFormatter {
    pub fn new(removed_header: impl Into<String>, added_header: impl Into<String>) -> Self {
        Self {
            removed_header: removed_header.into(),
            added_header: added_header.into(),
        }
    }

    pub fn from_config(config: &NotifySection) -> Self {
        Self::new(config.removed_header.clone(), config.added_header.clone())
    }

    /// Renders the drift as text, or `None` when nothing changed. Removed
    /// entities take their labels from `prior`, added ones from `current`.
    pub fn format(
        &self,
        result: &DriftResult,
        prior: &EntitySnapshot,
        current: &EntitySnapshot,
    ) -> Option<String> {
        if result.is_empty() {
            return None;
        }
        let mut sections = Vec::with_capacity(2);
        if !result.removed.is_empty() {
            sections.push(section(&self.removed_header, &result.removed, prior));
        }
        if !result.added.is_empty() {
            sections.push(section(&self.added_header, &result.added, current));
        }
        Some(sections.join("\n\n"))
    }
}

fn section<'a>(
    header: &str,
    ids: impl IntoIterator<Item = &'a String>,
    labels: &EntitySnapshot,
) -> String {
    let mut out = header.to_string();
    for id in ids {
        out.push('\n');
        out.push_str(id);
        out.push_str(": ");
        out.push_str(labels.get(id).unwrap_or_default());
    }
    out
}
