//! Tests for M1: Read-side queries against a fixed generation
//! Covers TC-1.1 .. TC-1.7
//!
//! Run individual groups with:
//! cargo test tc_1_1 -- --nocapture
//! cargo test m1_queries -- --nocapture

use foldwise::{
    EngineConfig, Generation, PairRescorer, Rescorer, ServingEngine, ServingError, StaticLoader,
};

const EPS: f32 = 1e-5;

/// rank 2; `a` and `b` are identical; `e` points away from everything.
fn model(track_known_items: bool) -> Generation {
    Generation::builder()
        .track_known_items(track_known_items)
        .user("u1", vec![1.0, 0.0]).unwrap()
        .user("u2", vec![0.0, 1.0]).unwrap()
        .user("u3", vec![1.0, 1.0]).unwrap()
        .item("a", vec![1.0, 0.0]).unwrap()
        .item("b", vec![1.0, 0.0]).unwrap()
        .item("c", vec![0.0, 1.0]).unwrap()
        .item("d", vec![0.5, 0.5]).unwrap()
        .item("e", vec![-1.0, 0.0]).unwrap()
        .known_item("u1", "a").unwrap()
        .known_item("u2", "c").unwrap()
        .known_item("u3", "a").unwrap()
        .known_item("u3", "c").unwrap()
        .build()
}

fn engine_with(generation: Generation) -> ServingEngine {
    let config = EngineConfig::default().workers(3).partitions(4).await_poll_ms(5);
    ServingEngine::with_loader(config, StaticLoader::new(vec![generation])).unwrap()
}

fn ids(ranked: &[(String, f32)]) -> Vec<&str> {
    ranked.iter().map(|(id, _)| id.as_str()).collect()
}

struct NotNamed(&'static str);

impl Rescorer for NotNamed {
    fn is_filtered(&self, id: &str) -> bool {
        id == self.0
    }
    fn rescore(&self, _id: &str, score: f64) -> f64 {
        score * 2.0
    }
}

struct NoPairWith(&'static str);

impl PairRescorer for NoPairWith {
    fn is_filtered(&self, candidate: &str, _query: &str) -> bool {
        candidate == self.0
    }
    fn rescore(&self, _candidate: &str, _query: &str, score: f64) -> f64 {
        score
    }
}

mod tc_1_1_recommend {
    use super::*;

    #[test]
    fn test_recommend_excludes_known_and_ranks_by_dot() {
        let engine = engine_with(model(true));
        let top = engine.recommend("u1", 10).unwrap();
        assert_eq!(ids(&top), vec!["b", "d", "c", "e"]);
        assert!((top[0].1 - 1.0).abs() < EPS);
        assert!((top[1].1 - 0.5).abs() < EPS);
    }

    #[test]
    fn test_how_many_bounds_result() {
        let engine = engine_with(model(true));
        let top = engine.recommend("u1", 2).unwrap();
        assert_eq!(ids(&top), vec!["b", "d"]);
    }

    #[test]
    fn test_single_and_multi_user_forms_agree() {
        let engine = engine_with(model(true));
        for user in ["u1", "u2", "u3"] {
            let single = engine.recommend(user, 5).unwrap();
            let multi = engine.recommend_to_many(&[user], 5, false, None).unwrap();
            assert_eq!(single, multi, "user {}", user);
        }
    }

    #[test]
    fn test_include_known_items() {
        let engine = engine_with(model(true));
        let top = engine.recommend_to_many(&["u1"], 10, true, None).unwrap();
        assert_eq!(top.len(), 5);
        let mut best: Vec<&str> = ids(&top[..2]);
        best.sort();
        assert_eq!(best, vec!["a", "b"]);
    }

    #[test]
    fn test_zero_how_many_is_invalid() {
        let engine = engine_with(model(true));
        assert!(matches!(engine.recommend("u1", 0), Err(ServingError::InvalidArgument(_))));
    }

    #[test]
    fn test_rescorer_filters_and_rescales() {
        let engine = engine_with(model(true));
        let rescorer = NotNamed("b");
        let top = engine.recommend_to_many(&["u1"], 10, false, Some(&rescorer)).unwrap();
        assert_eq!(ids(&top), vec!["d", "c", "e"]);
        assert!((top[0].1 - 1.0).abs() < EPS);
    }
}

mod tc_1_2_multi_user {
    use super::*;

    #[test]
    fn test_unknown_users_are_ignored() {
        let engine = engine_with(model(true));
        let with_unknown = engine.recommend_to_many(&["u1", "nobody"], 10, false, None).unwrap();
        let alone = engine.recommend("u1", 10).unwrap();
        assert_eq!(with_unknown, alone);
    }

    #[test]
    fn test_all_unknown_users_fail() {
        let engine = engine_with(model(true));
        let err = engine.recommend_to_many(&["x", "y"], 10, false, None).unwrap_err();
        assert!(matches!(err, ServingError::NoSuchUser(_)));
    }

    #[test]
    fn test_only_commonly_known_items_are_excluded() {
        let engine = engine_with(model(true));
        // u1 knows {a}, u3 knows {a, c}: only a is excluded
        let top = engine.recommend_to_many(&["u1", "u3"], 10, false, None).unwrap();
        let found = ids(&top);
        assert!(!found.contains(&"a"));
        assert!(found.contains(&"c"));
        assert_eq!(found.len(), 4);

        // u1 knows {a}, u2 knows {c}: nothing in common
        let top = engine.recommend_to_many(&["u1", "u2"], 10, false, None).unwrap();
        assert_eq!(top.len(), 5);
        assert_eq!(top[4].0, "e");
        assert!((top[4].1 + 0.5).abs() < EPS);
    }

    #[test]
    fn test_exclusion_leaves_live_sets_untouched() {
        let engine = engine_with(model(true));
        engine.recommend_to_many(&["u1", "u2"], 10, false, None).unwrap();
        let again = engine.recommend("u3", 10).unwrap();
        let mut found = ids(&again);
        assert_eq!(found.pop(), Some("e"));
        found.sort();
        assert_eq!(found, vec!["b", "d"]);
    }
}

mod tc_1_3_anonymous {
    use super::*;

    // Item gram matrix [[3.25, 0.25], [0.25, 1.25]] has determinant 4, so
    // folding in item a = [1, 0] with value 1 gives 0.5 * [0.3125, -0.0625].
    const ANON: [f32; 2] = [0.15625, -0.03125];

    #[test]
    fn test_recommend_to_anonymous() {
        let engine = engine_with(model(true));
        let top = engine.recommend_to_anonymous(&["a"], None, 3, None).unwrap();
        assert_eq!(ids(&top), vec!["b", "d", "c"]);
        assert!((top[0].1 - ANON[0]).abs() < EPS);
        assert!((top[2].1 - ANON[1]).abs() < EPS);
    }

    #[test]
    fn test_estimate_for_anonymous() {
        let engine = engine_with(model(true));
        let estimate = engine.estimate_for_anonymous("b", &["a", "unknown"], Some(&[1.0, 5.0])).unwrap();
        assert!((estimate - ANON[0]).abs() < EPS);
    }

    #[test]
    fn test_anonymous_failures() {
        let engine = engine_with(model(true));
        assert!(matches!(
            engine.recommend_to_anonymous(&["x"], None, 3, None),
            Err(ServingError::NoSuchItem(_))
        ));
        assert!(matches!(
            engine.recommend_to_anonymous(&["a", "b"], Some(&[1.0]), 3, None),
            Err(ServingError::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.estimate_for_anonymous("x", &["a"], None),
            Err(ServingError::NoSuchItem(_))
        ));
    }
}

mod tc_1_4_similarity {
    use super::*;

    #[test]
    fn test_identical_items_are_most_similar() {
        let engine = engine_with(model(true));
        let top = engine.most_similar_items(&["a"], 1, None).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0, "b");
        assert!((top[0].1 - 1.0).abs() < EPS);
    }

    #[test]
    fn test_query_items_never_returned() {
        let engine = engine_with(model(true));
        let top = engine.most_similar_items(&["a", "c", "missing"], 10, None).unwrap();
        let found = ids(&top);
        assert!(!found.contains(&"a"));
        assert!(!found.contains(&"c"));
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_pair_rescorer() {
        let engine = engine_with(model(true));
        let rescorer = NoPairWith("b");
        let top = engine.most_similar_items(&["a"], 1, Some(&rescorer)).unwrap();
        assert_eq!(top[0].0, "d");
    }

    #[test]
    fn test_all_unknown_items_fail() {
        let engine = engine_with(model(true));
        assert!(matches!(engine.most_similar_items(&["zz"], 1, None), Err(ServingError::NoSuchItem(_))));
    }

    #[test]
    fn test_similarity_to_item() {
        let engine = engine_with(model(true));
        let sims = engine.similarity_to_item("a", &["b", "c", "e"]).unwrap();
        assert!((sims[0] - 1.0).abs() < EPS);
        assert!(sims[1].abs() < EPS);
        assert!((sims[2] + 1.0).abs() < EPS);
        assert!(matches!(engine.similarity_to_item("a", &["b", "zz"]), Err(ServingError::NoSuchItem(_))));
    }
}

mod tc_1_5_estimates {
    use super::*;

    #[test]
    fn test_estimate_preference() {
        let engine = engine_with(model(true));
        assert!((engine.estimate_preference("u3", "d").unwrap() - 1.0).abs() < EPS);
        assert!((engine.estimate_preference("u1", "e").unwrap() + 1.0).abs() < EPS);
    }

    #[test]
    fn test_unknowns_estimate_exactly_zero() {
        let engine = engine_with(model(true));
        assert_eq!(engine.estimate_preference("nobody", "a").unwrap(), 0.0);
        assert_eq!(engine.estimate_preference("u1", "nothing").unwrap(), 0.0);
        let bulk = engine.estimate_preferences("u1", &["a", "nothing", "c"]).unwrap();
        assert_eq!(bulk, vec![1.0, 0.0, 0.0]);
        assert_eq!(engine.estimate_preferences("nobody", &["a", "b"]).unwrap(), vec![0.0, 0.0]);
    }
}

mod tc_1_6_known_item_queries {
    use super::*;

    #[test]
    fn test_most_popular_items() {
        let engine = engine_with(model(true));
        let top = engine.most_popular_items(10, None).unwrap();
        let mut found = ids(&top);
        found.sort();
        assert_eq!(found, vec!["a", "c"]);
        assert!(top.iter().all(|(_, count)| *count == 2.0));

        let rescorer = NotNamed("a");
        let top = engine.most_popular_items(10, Some(&rescorer)).unwrap();
        assert_eq!(top, vec![("c".to_string(), 4.0)]);
    }

    #[test]
    fn test_recommended_because() {
        let engine = engine_with(model(true));
        let top = engine.recommended_because("u3", "b", 5).unwrap();
        assert_eq!(ids(&top), vec!["a", "c"]);
        assert!((top[0].1 - 1.0).abs() < EPS);
    }

    #[test]
    fn test_recommended_because_failures() {
        let engine = engine_with(model(true));
        assert!(matches!(engine.recommended_because("nobody", "b", 5), Err(ServingError::NoSuchUser(_))));
        assert!(matches!(engine.recommended_because("u3", "zz", 5), Err(ServingError::NoSuchItem(_))));
    }

    #[test]
    fn test_untracked_deployment_is_unsupported() {
        let engine = engine_with(model(false));
        assert!(matches!(engine.most_popular_items(3, None), Err(ServingError::UnsupportedOperation(_))));
        assert!(matches!(
            engine.recommended_because("u3", "b", 3),
            Err(ServingError::UnsupportedOperation(_))
        ));
        // nothing to exclude, so known items come back
        assert_eq!(engine.recommend("u1", 10).unwrap().len(), 5);
    }
}

mod tc_1_7_not_ready {
    use super::*;

    #[test]
    fn test_queries_fail_until_a_generation_exists() {
        let engine = ServingEngine::with_loader(EngineConfig::default().workers(1), StaticLoader::default()).unwrap();
        assert!(!engine.is_ready());
        assert!(matches!(engine.recommend("u", 1), Err(ServingError::NotReady)));
        assert!(matches!(engine.most_similar_items(&["a"], 1, None), Err(ServingError::NotReady)));
        assert!(matches!(engine.most_popular_items(1, None), Err(ServingError::NotReady)));
        assert!(matches!(engine.estimate_preference("u", "a"), Err(ServingError::NotReady)));
        assert!(matches!(engine.recommended_because("u", "a", 1), Err(ServingError::NotReady)));
        assert!(matches!(engine.all_item_ids(), Err(ServingError::NotReady)));
        assert!(ServingError::NotReady.is_recoverable());

        engine.set_preference("u", "a", 1.0).unwrap();
        engine.remove_preference("u", "a").unwrap();
        assert_eq!(engine.event_log().entries_written(), 2);
    }
}
