//! End-to-end build/query scenarios exercising the whole index through its
//! public façade: single- and multi-threaded builds, concurrent queries,
//! removal, in-place update, and serialization round-trips all need to hold
//! their recall and degree-balance properties together, not in isolation,
//! these are the properties a unit test per module can't see.

use std::io::Cursor;

use meshnn_core::{DistanceMetric, Index, IndexParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_unit_vectors(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let mut v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in &mut v {
                    *x /= norm;
                }
            }
            v
        })
        .collect()
}

fn cosine_index(params: IndexParams) -> Index<Vec<f32>, f32> {
    Index::new(params, |a: &Vec<f32>, b: &Vec<f32>| DistanceMetric::Cosine.distance(a, b))
}

fn recall_at_1(index: &Index<Vec<f32>, f32>, ids: &[u32], vectors: &[Vec<f32>]) -> f64 {
    let hits = ids
        .iter()
        .zip(vectors)
        .filter(|(&id, v)| index.knn(v, 1).unwrap().first().is_some_and(|(nid, _)| *nid == id))
        .count();
    hits as f64 / ids.len() as f64
}

fn assert_degree_balance(index: &Index<Vec<f32>, f32>) {
    let info = index.info();
    for (l, stat) in info.per_layer.iter().enumerate() {
        assert_eq!(
            stat.total_out_degree, stat.total_in_degree,
            "layer {l}: sum(out-degree) must equal sum(in-degree) when allow_removals=true"
        );
    }
}

// Scenario 1 (spec §8): 5,000 128-dim vectors, seeded, normalized, inserted
// sequentially with cosine distance. Each input must be its own nearest
// neighbor in >= 85% of cases; per-layer in/out degree sums must match.
#[test]
fn scenario_1_single_thread_build_and_query() {
    let vectors = random_unit_vectors(5_000, 128, 1);
    let index = cosine_index(IndexParams::default());

    let ids: Vec<u32> = vectors.iter().map(|v| index.add(v.clone()).expect("not vetoed")).collect();

    let recall = recall_at_1(&index, &ids, &vectors);
    assert!(recall >= 0.85, "recall@1 was {recall}, want >= 0.85");
    assert_degree_balance(&index);
}

// Scenario 2: same vectors, inserted in parallel across all cores via
// `add_batch`. Same recall threshold and degree balance must hold.
#[test]
fn scenario_2_parallel_build_and_query() {
    let vectors = random_unit_vectors(5_000, 128, 2);
    let index = cosine_index(IndexParams::default());

    let ids: Vec<u32> = index
        .add_batch(vectors.clone())
        .into_iter()
        .map(|id| id.expect("not vetoed"))
        .collect();

    let recall = recall_at_1(&index, &ids, &vectors);
    assert!(recall >= 0.85, "recall@1 was {recall}, want >= 0.85");
    assert_degree_balance(&index);
}

// Scenario 3: after a single-threaded build, 10-NN queries for every input
// must produce identical (id-by-id) result lists whether run sequentially
// or from multiple threads at once: queries never mutate, so concurrent
// readers must agree with a lone reader.
#[test]
fn scenario_3_sequential_and_parallel_queries_agree() {
    let vectors = random_unit_vectors(1_000, 64, 3);
    let index = cosine_index(IndexParams::default());
    for v in &vectors {
        index.add(v.clone()).expect("not vetoed");
    }

    let sequential: Vec<Vec<(u32, f32)>> = vectors.iter().map(|v| index.knn(v, 10).unwrap()).collect();

    use std::sync::Arc;
    let index = Arc::new(index);
    let handles: Vec<_> = vectors
        .clone()
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            let index = Arc::clone(&index);
            std::thread::spawn(move || (i, index.knn(&v, 10).unwrap()))
        })
        .collect();

    let mut parallel: Vec<Vec<(u32, f32)>> = vec![Vec::new(); vectors.len()];
    for h in handles {
        let (i, result) = h.join().unwrap();
        parallel[i] = result;
    }

    for (i, (seq, par)) in sequential.iter().zip(parallel.iter()).enumerate() {
        let seq_ids: Vec<u32> = seq.iter().map(|(id, _)| *id).collect();
        let par_ids: Vec<u32> = par.iter().map(|(id, _)| *id).collect();
        assert_eq!(seq_ids, par_ids, "query {i}: sequential and parallel reads diverged");
    }
}

// Scenario 4: insert 2,000 vectors, remove the odd-indexed half in
// parallel, recompute recall on the even set: must not drop by more than
// 10% of pre-removal recall. Degree balance still holds afterward.
#[test]
fn scenario_4_remove_half_preserves_recall() {
    let vectors = random_unit_vectors(2_000, 64, 4);
    let index = cosine_index(IndexParams::default());
    let ids: Vec<u32> = vectors.iter().map(|v| index.add(v.clone()).expect("not vetoed")).collect();

    let even_ids: Vec<u32> = ids.iter().step_by(2).copied().collect();
    let even_vectors: Vec<Vec<f32>> = vectors.iter().step_by(2).cloned().collect();
    let recall_before = recall_at_1(&index, &even_ids, &even_vectors);

    let odd_ids: Vec<u32> = ids.iter().skip(1).step_by(2).copied().collect();
    index.remove_batch(&odd_ids).unwrap();
    assert_eq!(index.len(), even_ids.len());

    let recall_after = recall_at_1(&index, &even_ids, &even_vectors);
    assert!(
        recall_after >= recall_before - 0.10,
        "recall dropped from {recall_before} to {recall_after}, more than the 10% budget"
    );
    assert_degree_balance(&index);
}

// Scenario 5: insert 2,000 vectors, then `update` every one of them to a
// fresh random vector in one batch call. Recall on the *new* labels must be
// within 5% of the recall the index would show for a from-scratch build of
// those same vectors.
#[test]
fn scenario_5_update_in_place_preserves_recall() {
    let original = random_unit_vectors(2_000, 64, 5);
    let updated = random_unit_vectors(2_000, 64, 105);
    let index = cosine_index(IndexParams::default());
    let ids: Vec<u32> = original.iter().map(|v| index.add(v.clone()).expect("not vetoed")).collect();

    index.update(&ids, &updated).unwrap();
    let recall_updated = recall_at_1(&index, &ids, &updated);

    let fresh = cosine_index(IndexParams::default());
    let fresh_ids: Vec<u32> = updated.iter().map(|v| fresh.add(v.clone()).expect("not vetoed")).collect();
    let recall_fresh = recall_at_1(&fresh, &fresh_ids, &updated);

    assert!(
        recall_updated >= recall_fresh - 0.05,
        "update-in-place recall {recall_updated} fell more than 5% below a from-scratch build's {recall_fresh}"
    );
}

// Scenario 6: 2,000 random vectors under squared-Euclidean distance,
// serialize to a buffer, load into a fresh index: 5-NN for every original
// vector must return identical ids, labels, and distances.
#[test]
fn scenario_6_serialize_deserialize_round_trip() {
    let vectors = random_unit_vectors(2_000, 32, 6);
    let params = IndexParams::default();
    let index: Index<Vec<f32>, f32> =
        Index::new(params, |a: &Vec<f32>, b: &Vec<f32>| DistanceMetric::SquaredEuclidean.distance(a, b));
    for v in &vectors {
        index.add(v.clone()).expect("not vetoed");
    }

    let mut buf = Vec::new();
    index.save(&mut buf).unwrap();

    let restored: Index<Vec<f32>, f32> = Index::load(
        &mut Cursor::new(buf),
        |a: &Vec<f32>, b: &Vec<f32>| DistanceMetric::SquaredEuclidean.distance(a, b),
        meshnn_core::RelativeNeighborhood,
    )
    .unwrap();

    for v in &vectors {
        let before = index.knn(v, 5).unwrap();
        let after = restored.knn(v, 5).unwrap();
        assert_eq!(before, after, "mismatched 5-NN for a vector after round-trip");
    }
}

// Q2 (spec §8): with the naive "M-nearest" heuristic, recall@1 should be
// even higher than the default relative-neighborhood pruning's recall
// floor, confirming the heuristic is actually pluggable end-to-end.
#[test]
fn q2_nearest_m_heuristic_hits_higher_recall_floor() {
    let vectors = random_unit_vectors(1_500, 64, 7);
    let index = Index::with_heuristic(
        IndexParams::default(),
        |a: &Vec<f32>, b: &Vec<f32>| DistanceMetric::Cosine.distance(a, b),
        meshnn_core::NearestM,
    );
    let ids: Vec<u32> = vectors.iter().map(|v| index.add(v.clone()).expect("not vetoed")).collect();
    let recall = recall_at_1(&index, &ids, &vectors);
    assert!(recall >= 0.90, "NearestM recall@1 was {recall}, want >= 0.90");
}

// Q3 (spec §8): aggressive low-quality parameters should measurably hurt
// recall relative to the defaults, confirming the knobs are actually wired
// through end-to-end rather than ignored.
#[test]
fn q3_aggressive_params_degrade_recall() {
    let vectors = random_unit_vectors(1_500, 64, 8);

    let good = cosine_index(IndexParams::default());
    let good_ids: Vec<u32> = vectors.iter().map(|v| good.add(v.clone()).expect("not vetoed")).collect();
    let good_recall = recall_at_1(&good, &good_ids, &vectors);

    let aggressive = cosine_index(
        IndexParams::default().with_max_edges(8).with_ef_construction(16).with_ef_search(1),
    );
    let aggressive_ids: Vec<u32> =
        vectors.iter().map(|v| aggressive.add(v.clone()).expect("not vetoed")).collect();
    let aggressive_recall = recall_at_1(&aggressive, &aggressive_ids, &vectors);

    assert!(
        aggressive_recall < good_recall,
        "aggressive params ({aggressive_recall}) should recall worse than defaults ({good_recall})"
    );
}
