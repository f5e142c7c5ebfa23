//! Property tests for retrieval result ranking.

use std::collections::HashMap;

use proptest::prelude::*;
use ragbot_core::{Chunk, RetrievalResult, ScoredChunk, SourceRef};

fn arb_hit() -> impl Strategy<Value = ScoredChunk> {
    // A small score alphabet makes ties common.
    ("[a-f]{1,3}", prop_oneof![Just(0.25f32), Just(0.5), Just(0.75), 0.0f32..1.0]).prop_map(
        |(id, score)| ScoredChunk {
            chunk: Chunk {
                id,
                text: String::new(),
                source: SourceRef::new("doc", 0),
                embedding: Vec::new(),
                version: None,
                metadata: HashMap::new(),
            },
            score,
        },
    )
}

/// *For any* set of hits, ranking SHALL order scores non-increasingly, break
/// ties by ascending chunk id, and keep at most `k` hits.
mod prop_ranking_order {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn scores_non_increasing_with_id_tiebreak(
            hits in proptest::collection::vec(arb_hit(), 0..30),
            k in 1usize..40,
        ) {
            let result = RetrievalResult::ranked(hits.clone(), k);

            prop_assert!(result.len() <= k);
            prop_assert!(result.len() <= hits.len());
            for pair in result.hits().windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
                if pair[0].score == pair[1].score {
                    prop_assert!(pair[0].chunk.id <= pair[1].chunk.id);
                }
            }
            for hit in result.iter() {
                prop_assert!((0.0..=1.0).contains(&hit.score));
            }
        }

        #[test]
        fn ranking_ignores_input_order(
            hits in proptest::collection::vec(arb_hit(), 0..30),
            k in 1usize..40,
        ) {
            let mut reversed = hits.clone();
            reversed.reverse();
            let forward = RetrievalResult::ranked(hits, k);
            let backward = RetrievalResult::ranked(reversed, k);

            let key = |r: &RetrievalResult| -> Vec<(String, u32)> {
                r.iter().map(|h| (h.chunk.id.clone(), h.score.to_bits())).collect()
            };
            prop_assert_eq!(key(&forward), key(&backward));
        }
    }
}
