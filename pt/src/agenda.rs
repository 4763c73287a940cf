//! Agenda and focus tracking
//!
//! The agenda is the fixed, ordered list of document sections and the fields
//! each must cover. The cursor and next-focus pointers address into it, and
//! the focus stack records temporary digressions. All of it is owned and
//! mutated by the caller between turns; this module only reads it and flattens
//! it into the guidance text that steers the planner and the draft composer.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One document section and its ordered fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub name: String,
    /// Drafting priority order
    #[serde(default)]
    pub fields: Vec<String>,
}

impl Section {
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered sections; headings are stable for the life of a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Agenda(pub Vec<Section>);

impl Agenda {
    pub fn sections(&self) -> &[Section] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolve an index to its section and field names
    ///
    /// The field name is `None` when the section exists but has no such field.
    pub fn resolve(&self, index: AgendaIndex) -> Option<(&str, Option<&str>)> {
        let section = self.0.get(index.section_index)?;
        let field = section.fields.get(index.field_index).map(String::as_str);
        Some((section.name.as_str(), field))
    }

    /// `Name [f1, f2] | Name [f3]`
    fn summary(&self) -> String {
        self.0
            .iter()
            .map(|s| format!("{} [{}]", s.name, s.fields.join(", ")))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// A `{sectionIndex, fieldIndex}` position in the agenda
///
/// Used for both the cursor and the next-focus pointer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaIndex {
    #[serde(default)]
    pub section_index: usize,
    #[serde(default)]
    pub field_index: usize,
}

impl AgendaIndex {
    pub fn new(section_index: usize, field_index: usize) -> Self {
        Self {
            section_index,
            field_index,
        }
    }
}

/// A temporary digression that suspends agenda progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusFrame {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub turns_left: u32,
}

/// Digressions, most recent last
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FocusStack(pub Vec<FocusFrame>);

impl FocusStack {
    /// The most recent (highest priority) frame
    pub fn top(&self) -> Option<&FocusFrame> {
        self.0.last()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Agenda state as supplied with each turn
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Structure {
    #[serde(default)]
    pub agenda: Agenda,
    #[serde(default)]
    pub cursor: Option<AgendaIndex>,
    #[serde(default)]
    pub next_focus: Option<AgendaIndex>,
    #[serde(default)]
    pub focus_stack: FocusStack,
}

impl Structure {
    /// No agenda, positioned at `index` with the same index as next focus
    pub fn focused_at(index: Option<AgendaIndex>) -> Self {
        Self {
            cursor: index,
            next_focus: index,
            ..Self::default()
        }
    }

    /// Next focus, or the agenda origin when the caller supplied none
    pub fn next_focus_or_origin(&self) -> AgendaIndex {
        self.next_focus.unwrap_or_default()
    }

    /// Flatten agenda, position and active digression into prompt guidance
    ///
    /// Empty when the caller supplied no structure at all.
    pub fn guidance(&self) -> String {
        debug!(
            section_count = self.agenda.sections().len(),
            focus_depth = self.focus_stack.0.len(),
            "Structure::guidance: called"
        );
        let mut lines = Vec::new();

        if !self.agenda.is_empty() {
            lines.push(format!("Agenda: {}", self.agenda.summary()));
        }

        if let Some(cursor) = self.cursor {
            lines.push(format!(
                "Current position: section={}, field={}{}.",
                cursor.section_index,
                cursor.field_index,
                self.label(cursor)
            ));
        }

        if let Some(next) = self.next_focus {
            lines.push(format!(
                "Next focus index: section={}, field={}{}. Prioritize missing/weak fields.",
                next.section_index,
                next.field_index,
                self.label(next)
            ));
        }

        if let Some(top) = self.focus_stack.top() {
            lines.push(format!(
                "Active focus: {} on {} (turnsLeft={}). After focus, return to agenda.",
                top.kind, top.topic, top.turns_left
            ));
        }

        lines.join("\n")
    }

    fn label(&self, index: AgendaIndex) -> String {
        match self.agenda.resolve(index) {
            Some((section, Some(field))) => format!(" ({} / {})", section, field),
            Some((section, None)) => format!(" ({})", section),
            None => String::new(),
        }
    }
}
