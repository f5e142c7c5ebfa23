//! Prompt construction.

use std::fmt::Write as _;

use ragbot_core::{AssembledContext, Message, Query, Role};

/// Instructions used by [`PromptTemplate::default`].
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant. Answer the user's question \
using the reference material below and cite it by its [n] number. If the material does not \
contain the answer, say that you do not know.";

/// Turns a query and its assembled context into chat messages.
///
/// The rendered prompt is a system message (instructions and numbered context
/// blocks), the most recent history turns, then the user query.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    pub instructions: String,
    /// How many of the most recent history turns to include.
    pub max_history_turns: usize,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { instructions: DEFAULT_INSTRUCTIONS.to_string(), max_history_turns: 6 }
    }
}

impl PromptTemplate {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self { instructions: instructions.into(), ..Self::default() }
    }

    pub fn with_max_history_turns(mut self, turns: usize) -> Self {
        self.max_history_turns = turns;
        self
    }

    pub fn render(&self, query: &Query, context: &AssembledContext) -> Vec<Message> {
        let mut system = self.instructions.clone();
        if context.is_empty() {
            system.push_str("\n\nNo reference material was found for this question.");
        } else {
            system.push_str("\n\nReference material:");
            for (i, hit) in context.chunks.iter().enumerate() {
                let _ = write!(
                    system,
                    "\n\n[{}] (source: {})\n{}",
                    i + 1,
                    hit.chunk.source,
                    hit.chunk.text
                );
            }
        }

        let skip = query.history.len().saturating_sub(self.max_history_turns);
        let mut messages = Vec::with_capacity(2 + query.history.len() - skip);
        messages.push(Message::new(Role::System, system));
        messages.extend(query.history[skip..].iter().map(|t| Message::new(t.role, t.text.clone())));
        messages.push(Message::new(Role::User, query.text.clone()));
        messages
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ragbot_core::{Chunk, ScoredChunk, SizeMetric, SourceRef, Turn};

    use super::*;

    fn context(texts: &[(&str, &str, usize)]) -> AssembledContext {
        let mut ctx = AssembledContext::empty(1000, SizeMetric::Chars);
        for (doc, text, offset) in texts {
            ctx.chunks.push(ScoredChunk {
                chunk: Chunk {
                    id: format!("{doc}_{offset}"),
                    text: text.to_string(),
                    source: SourceRef::new(*doc, *offset),
                    embedding: Vec::new(),
                    version: None,
                    metadata: HashMap::new(),
                },
                score: 0.5,
            });
            ctx.total_size += text.len();
        }
        ctx
    }

    #[test]
    fn numbers_context_blocks_with_sources() {
        let template = PromptTemplate::new("Be brief.");
        let ctx = context(&[("manual", "Two year warranty.", 0), ("faq", "Free shipping.", 120)]);
        let messages = template.render(&Query::new("Warranty?"), &ctx);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(
            messages[0].content,
            "Be brief.\n\nReference material:\n\n[1] (source: manual@0)\nTwo year warranty.\
             \n\n[2] (source: faq@120)\nFree shipping."
        );
        assert_eq!(messages[1], Message::new(Role::User, "Warranty?"));
    }

    #[test]
    fn empty_context_is_noted() {
        let messages = PromptTemplate::new("Be brief.")
            .render(&Query::new("q"), &AssembledContext::empty(10, SizeMetric::Chars));
        let note = "No reference material was found for this question.";
        assert!(messages[0].content.ends_with(note));
    }

    #[test]
    fn keeps_only_recent_history() {
        let history = vec![
            Turn::user("one"),
            Turn::assistant("two"),
            Turn::user("three"),
            Turn::assistant("four"),
        ];
        let query = Query::new("five").with_history(history);
        let messages = PromptTemplate::default()
            .with_max_history_turns(2)
            .render(&query, &AssembledContext::empty(10, SizeMetric::Chars));

        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(&contents[1..], ["three", "four", "five"]);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[2].role, Role::Assistant);
    }
}
