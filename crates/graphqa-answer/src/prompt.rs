//! Grounding prompt composition.

use graphqa_core::{Fact, Prompt};

/// Substituted for the grounding text when retrieval found nothing usable.
pub const NO_GROUNDING_PLACEHOLDER: &str = "no relevant policy information available";

const PREAMBLE: &str =
    "You are a policy and regulation assistant. Use the information retrieved from the knowledge graph to answer.";
const CLOSING: &str = "Answer the user's question based on the information above.";

/// Merges a question with retrieved facts into one prompt.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    grounding_field: String,
    entity_fields: (String, String),
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new("content")
    }
}

impl PromptComposer {
    /// `grounding_field` is the fact field whose text grounds the answer.
    pub fn new(grounding_field: impl Into<String>) -> Self {
        Self {
            grounding_field: grounding_field.into(),
            entity_fields: ("name".to_string(), "entity_type".to_string()),
        }
    }

    /// Fields used to render related entities as `name (type)`.
    pub fn with_entity_fields(mut self, name: impl Into<String>, kind: impl Into<String>) -> Self {
        self.entity_fields = (name.into(), kind.into());
        self
    }

    /// Compose from the question and the grounding facts. Only the first
    /// fact is used; an empty list, or a first fact lacking the grounding
    /// field, yields the placeholder.
    pub fn compose(&self, question: &str, facts: &[Fact]) -> Prompt {
        self.compose_with_entities(question, facts, &[])
    }

    /// As [`compose`](Self::compose), followed by a line listing entities
    /// related to the question when there are any.
    pub fn compose_with_entities(&self, question: &str, facts: &[Fact], entities: &[Fact]) -> Prompt {
        let grounding = facts
            .first()
            .and_then(|f| f.text(&self.grounding_field))
            .unwrap_or_else(|| {
                if !facts.is_empty() {
                    tracing::debug!(
                        field = %self.grounding_field,
                        "Grounding node lacks the field, using placeholder"
                    );
                }
                NO_GROUNDING_PLACEHOLDER
            });

        let mut text = format!(
            "{PREAMBLE}\nUser question: {question}\nRelevant policy information: {grounding}\n"
        );
        let related = self.render_entities(entities);
        if !related.is_empty() {
            text.push_str("Related entities: ");
            text.push_str(&related.join("; "));
            text.push('\n');
        }
        text.push_str(CLOSING);
        Prompt::new(text)
    }

    fn render_entities(&self, entities: &[Fact]) -> Vec<String> {
        let (name_field, kind_field) = &self.entity_fields;
        let mut rendered: Vec<String> = Vec::new();
        for entity in entities {
            let Some(name) = entity.text(name_field) else {
                continue;
            };
            let line = match entity.text(kind_field) {
                Some(kind) => format!("{name} ({kind})"),
                None => name.to_string(),
            };
            if !rendered.contains(&line) {
                rendered.push(line);
            }
        }
        rendered
    }
}
