//! Tests for the in-memory document store.

mod common;

use std::collections::HashMap;

use common::{DIM, axis, chunk};
use proptest::prelude::*;
use ragbot_core::{Chunk, RagError, SourceRef};
use ragbot_rag::{DocumentStore, InMemoryDocumentStore, WritableDocumentStore};

fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

fn arb_chunk(dim: usize) -> impl Strategy<Value = Chunk> {
    ("[a-z]{3,8}", "[a-z ]{5,30}", arb_normalized_embedding(dim)).prop_map(
        |(id, text, embedding)| Chunk {
            id,
            text,
            source: SourceRef::new("doc_1", 0),
            embedding,
            version: None,
            metadata: HashMap::new(),
        },
    )
}

/// *For any* stored chunks and query embedding, similarity search SHALL
/// return at most `k` results with non-increasing scores in `[0, 1]`, ties
/// ordered by ascending chunk id, and SHALL return the same result when
/// repeated against the unmodified store.
mod prop_inmemory_search_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_bounded_and_repeatable(
            chunks in proptest::collection::vec(arb_chunk(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            k in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (first, second, unique_count) = rt.block_on(async {
                let store = InMemoryDocumentStore::new(DIM);

                let mut deduped: HashMap<String, Chunk> = HashMap::new();
                for chunk in &chunks {
                    deduped.entry(chunk.id.clone()).or_insert_with(|| chunk.clone());
                }
                let count = deduped.len();
                store.insert(deduped.into_values().collect()).await.unwrap();

                let first = store.similarity_search(&query, k).await.unwrap();
                let second = store.similarity_search(&query, k).await.unwrap();
                (first, second, count)
            });

            prop_assert!(first.len() <= k);
            prop_assert!(first.len() <= unique_count);
            for pair in first.hits().windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
                if pair[0].score == pair[1].score {
                    prop_assert!(pair[0].chunk.id < pair[1].chunk.id);
                }
            }
            for hit in first.iter() {
                prop_assert!((0.0..=1.0).contains(&hit.score));
            }
            prop_assert_eq!(first, second);
        }
    }
}

#[tokio::test]
async fn search_rejects_mismatched_dimension() {
    let store = InMemoryDocumentStore::new(DIM);
    let err = store.similarity_search(&[1.0, 0.0], 3).await.unwrap_err();
    assert_eq!(err, RagError::InvalidEmbeddingDimension { expected: DIM, actual: 2 });
}

#[tokio::test]
async fn search_rejects_zero_k() {
    let store = InMemoryDocumentStore::new(DIM);
    assert!(matches!(store.similarity_search(&axis(0), 0).await, Err(RagError::Config(_))));
}

#[tokio::test]
async fn search_ranks_by_cosine_similarity() {
    let store = InMemoryDocumentStore::new(DIM);
    let mut close = axis(0);
    close[1] = 0.5;
    store
        .insert(vec![
            chunk("far", "a", "far", axis(1)),
            chunk("exact", "b", "exact", axis(0)),
            chunk("close", "c", "close", close),
            chunk("opposite", "d", "opposite", axis(0).iter().map(|x| -x).collect()),
        ])
        .await
        .unwrap();

    let result = store.similarity_search(&axis(0), 3).await.unwrap();
    let ids: Vec<&str> = result.iter().map(|h| h.chunk.id.as_str()).collect();
    assert_eq!(ids, ["exact", "close", "far"]);
    assert!((result.hits()[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn get_by_ids_omits_missing() {
    let store = InMemoryDocumentStore::new(DIM);
    store.insert(vec![chunk("a", "doc", "alpha", axis(0))]).await.unwrap();

    let found = store.get_by_ids(&["a", "missing"]).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found["a"].text, "alpha");
}

#[tokio::test]
async fn insert_is_all_or_nothing_and_never_overwrites() {
    let store = InMemoryDocumentStore::new(DIM);
    store.insert(vec![chunk("a", "doc", "original", axis(0))]).await.unwrap();

    let err = store
        .insert(vec![chunk("b", "doc", "new", axis(1)), chunk("a", "doc", "changed", axis(1))])
        .await
        .unwrap_err();
    assert_eq!(err, RagError::DuplicateChunk("a".into()));
    assert_eq!(store.len().await, 1);
    assert_eq!(store.get_by_ids(&["a"]).await.unwrap()["a"].text, "original");

    let err = store.insert(vec![chunk("c", "doc", "short", vec![1.0])]).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidEmbeddingDimension { .. }));
}

#[tokio::test]
async fn delete_counts_removed_chunks() {
    let store = InMemoryDocumentStore::new(DIM);
    store
        .insert(vec![chunk("a", "doc", "a", axis(0)), chunk("b", "doc", "b", axis(1))])
        .await
        .unwrap();
    assert_eq!(store.delete(&["a", "zzz"]).await.unwrap(), 1);
    assert_eq!(store.len().await, 1);
    assert!(!store.is_empty().await);
}
