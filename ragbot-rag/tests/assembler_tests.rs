//! Tests for budget-bounded context assembly.

mod common;

use common::scored;
use proptest::prelude::*;
use ragbot_core::{DropReason, RetrievalResult, SizeMetric};
use ragbot_rag::ContextAssembler;

fn text(len: usize) -> String {
    "x".repeat(len)
}

#[test]
fn greedy_selection_skips_chunks_that_overflow() {
    let result = RetrievalResult::ranked(
        vec![
            scored("c1", "doc1", &text(500), 0.9),
            scored("c2", "doc2", &text(300), 0.8),
            scored("c3", "doc3", &text(250), 0.7),
        ],
        10,
    );

    let context = ContextAssembler::new(700, SizeMetric::Chars).assemble(&result);

    assert_eq!(context.chunk_ids(), ["c1"]);
    assert_eq!(context.total_size, 500);
    assert!(!context.no_context_fit);
    let dropped: Vec<(&str, DropReason)> =
        context.dropped.iter().map(|d| (d.chunk_id.as_str(), d.reason)).collect();
    assert_eq!(dropped, [("c2", DropReason::OverBudget), ("c3", DropReason::OverBudget)]);
}

#[test]
fn skipped_chunk_does_not_stop_smaller_ones() {
    let result = RetrievalResult::ranked(
        vec![
            scored("c1", "doc1", &text(500), 0.9),
            scored("c2", "doc2", &text(300), 0.8),
            scored("c3", "doc3", &text(150), 0.7),
        ],
        10,
    );

    let context = ContextAssembler::new(700, SizeMetric::Chars).assemble(&result);
    assert_eq!(context.chunk_ids(), ["c1", "c3"]);
    assert_eq!(context.total_size, 650);
}

#[test]
fn oversized_top_chunk_flags_no_context_fit() {
    let result = RetrievalResult::ranked(vec![scored("big", "doc", &text(1000), 0.95)], 10);

    let context = ContextAssembler::new(700, SizeMetric::Chars).assemble(&result);
    assert!(context.is_empty());
    assert_eq!(context.total_size, 0);
    assert!(context.no_context_fit);
    assert_eq!(context.dropped[0].reason, DropReason::OverBudget);
}

#[test]
fn empty_retrieval_is_not_a_fit_failure() {
    let context = ContextAssembler::new(700, SizeMetric::Chars).assemble(&RetrievalResult::empty());
    assert!(context.is_empty());
    assert!(!context.no_context_fit);
}

#[test]
fn duplicates_keep_highest_scoring_instance() {
    let result = RetrievalResult::ranked(
        vec![
            scored("low", "shared", "aaa", 0.4),
            scored("high", "shared", "bbb", 0.9),
            scored("other", "doc2", "ccc", 0.5),
        ],
        10,
    );

    let context = ContextAssembler::new(100, SizeMetric::Chars).assemble(&result);
    assert_eq!(context.chunk_ids(), ["high", "other"]);
    assert_eq!(context.dropped.len(), 1);
    assert_eq!(context.dropped[0].chunk_id, "low");
    assert_eq!(context.dropped[0].reason, DropReason::Duplicate);
}

#[test]
fn token_metric_bounds_by_estimate() {
    let result = RetrievalResult::ranked(
        vec![scored("a", "d1", &text(40), 0.9), scored("b", "d2", &text(40), 0.8)],
        10,
    );
    // 40 chars ≈ 10 tokens each.
    let context = ContextAssembler::new(15, SizeMetric::ApproxTokens).assemble(&result);
    assert_eq!(context.chunk_ids(), ["a"]);
    assert_eq!(context.total_size, 10);
}

/// *For any* retrieval result and budget, the assembled context SHALL stay
/// within the budget, keep descending relevance order, hold at most one chunk
/// per source, and account for every candidate exactly once.
mod prop_context_budget {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn total_size_never_exceeds_budget(
            hits in proptest::collection::vec(
                ("[a-z]{1,4}", "[a-c]", 0usize..400, 0.0f32..1.0),
                0..25,
            ),
            budget in 1usize..1200,
        ) {
            let candidates = hits.iter().map(|(id, src, len, score)| scored(id, src, &text(*len), *score));
            let result = RetrievalResult::ranked(candidates, 50);

            let context = ContextAssembler::new(budget, SizeMetric::Chars).assemble(&result);

            prop_assert!(context.total_size <= budget);
            let measured: usize = context.chunks.iter().map(|c| c.chunk.text.chars().count()).sum();
            prop_assert_eq!(measured, context.total_size);
            for pair in context.chunks.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
            let mut sources: Vec<_> = context.chunks.iter().map(|c| &c.chunk.source).collect();
            sources.sort();
            sources.dedup();
            prop_assert_eq!(sources.len(), context.chunks.len());
            prop_assert_eq!(context.chunks.len() + context.dropped.len(), result.len());
            prop_assert_eq!(context.no_context_fit, context.chunks.is_empty() && !result.is_empty());
        }
    }
}
