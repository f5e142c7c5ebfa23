//! Budget-bounded context assembly.

use std::collections::HashSet;

use ragbot_core::{
    AssembledContext, DropReason, DroppedChunk, RetrievalResult, ScoredChunk, SizeMetric,
};
use tracing::debug;

use crate::config::RagConfig;

/// Selects retrieved chunks into a context window of at most `budget` units.
///
/// Chunks are added whole, in descending relevance, skipping any that would
/// overflow the budget; a chunk is never truncated.
///
/// # Example
///
/// ```rust,ignore
/// let assembler = ContextAssembler::new(700, SizeMetric::Chars);
/// let context = assembler.assemble(&retrieval);
/// assert!(context.total_size <= 700);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    budget: usize,
    metric: SizeMetric,
}

impl ContextAssembler {
    pub fn new(budget: usize, metric: SizeMetric) -> Self {
        Self { budget, metric }
    }

    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.context_budget, config.size_metric)
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Assemble a context from ranked retrieval hits.
    ///
    /// Duplicates by source reference keep their highest-scoring instance.
    /// Sets `no_context_fit` when there were candidates but none fit.
    pub fn assemble(&self, result: &RetrievalResult) -> AssembledContext {
        let mut context = AssembledContext::empty(self.budget, self.metric);

        // Ranked order means the first chunk seen for a source scores highest.
        let mut seen = HashSet::new();
        let mut candidates: Vec<(&ScoredChunk, usize)> = Vec::with_capacity(result.len());
        for hit in result {
            let size = self.metric.measure(&hit.chunk.text);
            if seen.insert(&hit.chunk.source) {
                candidates.push((hit, size));
            } else {
                context.dropped.push(dropped(hit, size, DropReason::Duplicate));
            }
        }

        // smallest_after[i]: the smallest candidate size from i onwards.
        let mut smallest_after = vec![usize::MAX; candidates.len() + 1];
        for (i, (_, size)) in candidates.iter().enumerate().rev() {
            smallest_after[i] = smallest_after[i + 1].min(*size);
        }

        for (i, (hit, size)) in candidates.iter().enumerate() {
            let remaining = self.budget - context.total_size;
            if smallest_after[i] > remaining {
                // Nothing left can fit.
                context.dropped.extend(
                    candidates[i..].iter().map(|(h, s)| dropped(h, *s, DropReason::OverBudget)),
                );
                break;
            }
            if *size <= remaining {
                context.total_size += size;
                context.chunks.push((*hit).clone());
            } else {
                context.dropped.push(dropped(hit, *size, DropReason::OverBudget));
            }
        }

        context.no_context_fit = context.chunks.is_empty() && !candidates.is_empty();
        debug!(
            selected = context.chunks.len(),
            dropped = context.dropped.len(),
            total_size = context.total_size,
            budget = self.budget,
            no_context_fit = context.no_context_fit,
            "assembled context"
        );
        context
    }
}

fn dropped(hit: &ScoredChunk, size: usize, reason: DropReason) -> DroppedChunk {
    DroppedChunk {
        chunk_id: hit.chunk.id.clone(),
        source: hit.chunk.source.clone(),
        score: hit.score,
        size,
        reason,
    }
}
