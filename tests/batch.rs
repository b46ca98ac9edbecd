use lilith_vault::engine::batch::BatchCoordinator;
use lilith_vault::engine::masking::{MaskingPolicy, MaskingRule, MaskingStrategy, PolicyOptions};
use lilith_vault::engine::validator::{FieldSpec, FieldType, Schema, SchemaDefinition};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_results_follow_input_order() {
    let coordinator = BatchCoordinator::new(4);
    let items: Vec<u64> = (0..64).collect();
    let outcome = coordinator
        .run_batch(items, |n: &u64| {
            // Earlier items sleep longer so they finish last.
            std::thread::sleep(Duration::from_millis(64 - *n));
            n * 2
        })
        .unwrap()
        .join()
        .await;

    assert!(!outcome.cancelled);
    let results: Vec<u64> = outcome.results.into_iter().map(Option::unwrap).collect();
    assert_eq!(results, (0..64).map(|n| n * 2).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_mask_batch() {
    let policy = Arc::new(
        MaskingPolicy::from_rules(
            "email",
            &[MaskingRule::new("email", r"[a-z]+@[a-z]+\.com", MaskingStrategy::Simple)],
            PolicyOptions::default(),
        )
        .unwrap(),
    );
    let texts = vec![
        "a@b.com".to_string(),
        "no pii".to_string(),
        "x: yy@zz.com".to_string(),
    ];
    let outcome = BatchCoordinator::new(2).mask_batch(texts, policy).unwrap().join().await;
    let masked: Vec<String> = outcome
        .results
        .into_iter()
        .map(|r| r.unwrap().masked_text)
        .collect();
    assert_eq!(masked, vec!["*******", "no pii", "x: *********"]);
}

#[tokio::test]
async fn test_validate_batch() {
    let schema = Arc::new(
        Schema::load(
            "s",
            SchemaDefinition::new(vec![FieldSpec::new("id", FieldType::String).required()]),
        )
        .unwrap(),
    );
    let records = vec![json!({"id": "1"}), json!({}), json!({"id": 2})];
    let outcome = BatchCoordinator::new(3)
        .validate_batch(records, schema)
        .unwrap()
        .join()
        .await;
    let valid: Vec<bool> = outcome
        .results
        .iter()
        .map(|r| r.as_ref().unwrap().valid)
        .collect();
    assert_eq!(valid, vec![true, false, false]);
}

#[tokio::test]
async fn test_cancel_keeps_completed_and_skips_unscheduled() {
    let started = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&started);
    let handle = BatchCoordinator::new(1).run_batch((0..50).collect::<Vec<u32>>(), move |n: &u32| {
        counter.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        *n
    })
    .unwrap();

    tokio::time::sleep(Duration::from_millis(70)).await;
    handle.cancel();
    let outcome = handle.join().await;

    assert!(outcome.cancelled);
    let completed = outcome.completed();
    assert!(completed < 50);
    // Completed slots form a prefix with their original values.
    for (idx, slot) in outcome.results.iter().enumerate() {
        match slot {
            Some(v) => assert_eq!(*v as usize, idx),
            None => assert!(idx >= completed),
        }
    }
    // Give any abandoned in-flight item time to finish, then make sure no
    // new items were started after cancellation.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(started.load(Ordering::SeqCst) <= completed + 1);
}

#[tokio::test]
async fn test_cancel_before_any_work() {
    let handle = BatchCoordinator::new(2).run_batch(vec![1, 2, 3], |n: &i32| *n).unwrap();
    handle.cancel();
    let outcome = handle.join().await;
    assert!(outcome.cancelled);
    assert_eq!(outcome.results.len(), 3);
}
