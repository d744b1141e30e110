mod helpers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use helpers::ScriptedOracle;
use papersim::cache::SimilarityCache;
use papersim::corpus::types::ArticleKey;
use papersim::db;
use papersim::retrieval::RetrievalService;

#[test]
fn readers_see_whole_generations_during_rebuilds() {
    let mut conn = helpers::test_db();
    let keys: Vec<(String, &str)> = (0..50).map(|i| (format!("p{i}"), "cs.IR")).collect();
    let refs: Vec<(&str, &str)> = keys.iter().map(|(id, s)| (id.as_str(), *s)).collect();
    helpers::seed_articles(&mut conn, &refs);
    let db = db::shared(conn);
    let store = helpers::store(&db);
    let cache = SimilarityCache::new(db.clone()).with_insert_batch_size(7);

    // Two scripts that disagree on every key's neighbor.
    let script = |offset: i64| {
        (1..=50).fold(ScriptedOracle::new("m@1"), |oracle, k| {
            let target = (k + offset - 1) % 50 + 1;
            oracle.with_neighbors(k, &[(target, 0.5)])
        })
    };
    let first = script(1);
    let second = script(2);
    cache.rebuild(&store, &first, 1).unwrap();

    let done = AtomicBool::new(false);
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    for k in 1..=50i64 {
                        let hit = cache
                            .neighbors(ArticleKey(k), "m@1", 1)
                            .unwrap()
                            .expect("an active generation is always visible");
                        let target = hit[0].key.0;
                        assert!(
                            target == k % 50 + 1 || target == (k + 1) % 50 + 1,
                            "key {k} saw unexpected neighbor {target}"
                        );
                    }
                }
            });
        }

        for round in 0..6 {
            let oracle = if round % 2 == 0 { &second } else { &first };
            cache.rebuild(&store, oracle, 1).unwrap();
        }
        done.store(true, Ordering::SeqCst);
    });

    assert_eq!(cache.active_generation().unwrap().unwrap().edge_count, 50);
}

#[test]
fn retrieval_service_is_shared_across_threads() {
    let mut conn = helpers::test_db();
    helpers::seed_articles(&mut conn, &[("a", "x"), ("b", "x"), ("c", "y")]);
    let db = db::shared(conn);
    let oracle = ScriptedOracle::new("m@1")
        .with_neighbors(1, &[(2, 0.9), (3, 0.4)])
        .with_neighbors(2, &[(1, 0.9), (3, 0.3)]);
    let service = Arc::new(RetrievalService::new(Arc::new(helpers::store(&db)), Arc::new(oracle)));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = Arc::clone(&service);
            std::thread::spawn(move || {
                let seed = ArticleKey(1 + (i % 2));
                for _ in 0..25 {
                    let results = service.similar_to_key(seed, 2).unwrap();
                    assert_eq!(results.len(), 2);
                    assert!(results.iter().all(|r| r.article.key != seed));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(service.missing_records(), 0);
}
