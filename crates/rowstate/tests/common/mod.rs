#![allow(dead_code)]

//! Protocol scenarios shared by the backend test suites.
//!
//! Each scenario takes a key prefix so suites that run against a shared
//! server do not trip over each other's rows.

use rowstate::{
    DeleteRequest, GetRequest, GetResponse, Metadata, SetRequest, StateAccess, StateError,
};
use serde_json::{json, Value};

pub async fn get<S: StateAccess>(store: &S, key: &str) -> GetResponse {
    store.get(&GetRequest::new(key)).await.expect("get")
}

pub async fn value_of<S: StateAccess>(store: &S, key: &str) -> Option<Value> {
    get(store, key).await.json().expect("stored json")
}

pub async fn etag_of<S: StateAccess>(store: &S, key: &str) -> String {
    get(store, key).await.etag.expect("row should exist")
}

fn assert_conflict(result: Result<(), StateError>, key: &str) {
    match result {
        Err(StateError::NotFoundOrConflict { key: k }) => assert_eq!(k, key),
        other => panic!("expected NotFoundOrConflict for {key}, got {other:?}"),
    }
}

/// Unconditional set, then a round trip through get.
pub async fn upsert_and_read_back<S: StateAccess>(store: &S, prefix: &str) {
    let key = format!("{prefix}a");
    store
        .set(&SetRequest::new(&key, json!({"x": 1})))
        .await
        .expect("set");

    let resp = get(store, &key).await;
    assert!(resp.etag.is_some());
    assert_eq!(resp.json::<Value>().unwrap(), Some(json!({"x": 1})));

    // Overwrite without a token always succeeds.
    store
        .set(&SetRequest::new(&key, json!({"x": "over"})))
        .await
        .expect("overwrite");
    assert_eq!(value_of(store, &key).await, Some(json!({"x": "over"})));
}

/// Set with the current token succeeds and changes the token; a stale token
/// fails and leaves the row untouched.
pub async fn conditional_update<S: StateAccess>(store: &S, prefix: &str) {
    let key = format!("{prefix}a");
    store
        .set(&SetRequest::new(&key, json!({"x": 1})))
        .await
        .expect("set");
    let t1 = etag_of(store, &key).await;

    store
        .set(&SetRequest::new(&key, json!({"x": 2})).with_etag(&t1))
        .await
        .expect("conditional set");
    let t2 = etag_of(store, &key).await;
    assert_ne!(t1, t2);
    assert_eq!(value_of(store, &key).await, Some(json!({"x": 2})));

    let stale = store
        .set(&SetRequest::new(&key, json!({"x": 3})).with_etag(&t1))
        .await;
    assert_conflict(stale, &key);

    let resp = get(store, &key).await;
    assert_eq!(resp.json::<Value>().unwrap(), Some(json!({"x": 2})));
    assert_eq!(resp.etag.as_deref(), Some(t2.as_str()));
}

/// A token never turns a set into an insert.
pub async fn conditional_set_never_inserts<S: StateAccess>(store: &S, prefix: &str) {
    let key = format!("{prefix}ghost");
    let result = store
        .set(&SetRequest::new(&key, json!(true)).with_etag("1"))
        .await;
    assert_conflict(result, &key);
    assert!(get(store, &key).await.is_empty());
}

/// Deleting an absent key fails, with or without a token.
pub async fn delete_missing_key<S: StateAccess>(store: &S, prefix: &str) {
    let key = format!("{prefix}missing-key");
    assert_conflict(store.delete(&DeleteRequest::new(&key)).await, &key);
    assert_conflict(
        store.delete(&DeleteRequest::new(&key).with_etag("42")).await,
        &key,
    );
}

/// Conditional delete honours the token; unconditional delete removes the row.
pub async fn conditional_delete<S: StateAccess>(store: &S, prefix: &str) {
    let key = format!("{prefix}d");
    store
        .set(&SetRequest::new(&key, json!("v1")))
        .await
        .expect("set");
    let t1 = etag_of(store, &key).await;
    store
        .set(&SetRequest::new(&key, json!("v2")))
        .await
        .expect("set");

    let stale = store.delete(&DeleteRequest::new(&key).with_etag(&t1)).await;
    assert_conflict(stale, &key);
    assert_eq!(value_of(store, &key).await, Some(json!("v2")));

    let current = etag_of(store, &key).await;
    store
        .delete(&DeleteRequest::new(&key).with_etag(&current))
        .await
        .expect("conditional delete");
    assert!(get(store, &key).await.is_empty());

    // Re-create and remove without a token.
    store
        .set(&SetRequest::new(&key, json!("v3")))
        .await
        .expect("set");
    store
        .delete(&DeleteRequest::new(&key))
        .await
        .expect("delete");
    assert!(get(store, &key).await.is_empty());
}

/// Missing keys read as an empty response, not an error.
pub async fn get_missing_is_empty<S: StateAccess>(store: &S, prefix: &str) {
    let resp = get(store, &format!("{prefix}never-set")).await;
    assert!(resp.is_empty());
    assert!(resp.data.is_empty());
    assert_eq!(resp.etag, None);
}

/// Malformed input is rejected before reaching the backend.
pub async fn invalid_arguments<S: StateAccess>(store: &S, prefix: &str) {
    let key = format!("{prefix}a");
    assert!(matches!(
        store.get(&GetRequest::new("")).await,
        Err(StateError::InvalidArgument(_))
    ));
    assert!(matches!(
        store.set(&SetRequest::new("", json!(1))).await,
        Err(StateError::InvalidArgument(_))
    ));
    assert!(matches!(
        store.set(&SetRequest::new(&key, json!(1)).with_etag("abc")).await,
        Err(StateError::InvalidArgument(_))
    ));
    assert!(matches!(
        store.delete(&DeleteRequest::new(&key).with_etag("1.5")).await,
        Err(StateError::InvalidArgument(_))
    ));
    // None of the rejected writes created the row.
    assert!(get(store, &key).await.is_empty());
}

fn assert_invalid(result: Result<(), StateError>, what: &str) {
    assert!(
        matches!(result, Err(StateError::InvalidArgument(_))),
        "{what}: expected InvalidArgument, got {result:?}"
    );
}

/// Input checks run before the pool is touched, so a closed store still
/// reports malformed requests as such.
pub async fn invalid_arguments_after_close<S: StateAccess>(store: &S, prefix: &str) {
    let key = format!("{prefix}a");
    store.close().await;

    assert!(matches!(
        store.get(&GetRequest::new("")).await,
        Err(StateError::InvalidArgument(_))
    ));
    assert_invalid(store.set(&SetRequest::new("", json!(1))).await, "set empty key");
    assert_invalid(
        store.set(&SetRequest::new(&key, json!(1)).with_etag("abc")).await,
        "set bad etag",
    );
    assert_invalid(store.delete(&DeleteRequest::new("")).await, "delete empty key");
    assert_invalid(
        store.delete(&DeleteRequest::new(&key).with_etag("abc")).await,
        "delete bad etag",
    );
    assert_invalid(
        store
            .execute_batch(&[DeleteRequest::new("")], &[SetRequest::new(&key, json!(1))])
            .await,
        "batch with empty key",
    );

    // Well-formed requests do reach the pool and fail there.
    assert!(matches!(
        store.delete(&DeleteRequest::new(&key)).await,
        Err(StateError::Backend(_))
    ));
}

/// Request metadata comes back on a hit.
pub async fn get_echoes_metadata<S: StateAccess>(store: &S, prefix: &str) {
    let key = format!("{prefix}meta");
    store
        .set(&SetRequest::new(&key, json!("v")))
        .await
        .expect("set");

    let metadata = Metadata::from([
        ("partitionKey".to_string(), "p1".to_string()),
        ("contentType".to_string(), "application/json".to_string()),
    ]);
    let resp = store
        .get(&GetRequest::new(&key).with_metadata(metadata.clone()))
        .await
        .expect("get");
    assert_eq!(resp.metadata, metadata);
    assert_eq!(resp.json::<Value>().unwrap(), Some(json!("v")));

    // A miss stays an empty response.
    let miss = store
        .get(&GetRequest::new(format!("{prefix}meta-missing")).with_metadata(metadata))
        .await
        .expect("get");
    assert!(miss.is_empty());
}

/// A batch with a stale delete fails as a whole.
pub async fn batch_rolls_back_on_stale_delete<S: StateAccess>(store: &S, prefix: &str) {
    let a = format!("{prefix}a");
    let b = format!("{prefix}b");
    store
        .set(&SetRequest::new(&a, json!({"x": 1})))
        .await
        .expect("set");
    let t1 = etag_of(store, &a).await;
    store
        .set(&SetRequest::new(&a, json!({"x": 2})).with_etag(&t1))
        .await
        .expect("set");
    let t2 = etag_of(store, &a).await;

    let result = store
        .execute_batch(
            &[DeleteRequest::new(&a).with_etag(&t1)],
            &[SetRequest::new(&b, json!({"y": 1}))],
        )
        .await;
    assert_conflict(result, &a);

    let resp = get(store, &a).await;
    assert_eq!(resp.json::<Value>().unwrap(), Some(json!({"x": 2})));
    assert_eq!(resp.etag.as_deref(), Some(t2.as_str()));
    assert!(get(store, &b).await.is_empty());
}

/// A failing set late in the batch undoes the deletes and sets before it.
pub async fn batch_rolls_back_on_late_failure<S: StateAccess>(store: &S, prefix: &str) {
    let a = format!("{prefix}a");
    let b = format!("{prefix}b");
    let c = format!("{prefix}c");
    store
        .set(&SetRequest::new(&a, json!("keep")))
        .await
        .expect("set");

    let result = store
        .execute_batch(
            &[DeleteRequest::new(&a)],
            &[
                SetRequest::new(&b, json!("new")),
                SetRequest::new(&c, json!("never")).with_etag("1"),
            ],
        )
        .await;
    assert_conflict(result, &c);

    assert_eq!(value_of(store, &a).await, Some(json!("keep")));
    assert!(get(store, &b).await.is_empty());
    assert!(get(store, &c).await.is_empty());
}

/// Deletes apply before sets, so a batch can delete and re-create a key.
pub async fn batch_commits_in_order<S: StateAccess>(store: &S, prefix: &str) {
    let a = format!("{prefix}a");
    let b = format!("{prefix}b");
    store
        .set(&SetRequest::new(&a, json!("old")))
        .await
        .expect("set");
    let before = etag_of(store, &a).await;

    store
        .execute_batch(
            &[DeleteRequest::new(&a).with_etag(&before)],
            &[
                SetRequest::new(&a, json!("recreated")),
                SetRequest::new(&b, json!(1)),
                SetRequest::new(&b, json!(2)),
            ],
        )
        .await
        .expect("batch");

    let resp = get(store, &a).await;
    assert_eq!(resp.json::<Value>().unwrap(), Some(json!("recreated")));
    assert_ne!(resp.etag.as_deref(), Some(before.as_str()));
    // Later sets in the sequence win.
    assert_eq!(value_of(store, &b).await, Some(json!(2)));
}

/// Invalid batch members fail the batch before anything is applied.
pub async fn batch_validates_up_front<S: StateAccess>(store: &S, prefix: &str) {
    let a = format!("{prefix}a");
    let result = store
        .execute_batch(
            &[],
            &[
                SetRequest::new(&a, json!(1)),
                SetRequest::new("", json!(2)),
            ],
        )
        .await;
    assert!(matches!(result, Err(StateError::InvalidArgument(_))));
    assert!(get(store, &a).await.is_empty());

    store.execute_batch(&[], &[]).await.expect("empty batch");
}

/// Two writers race with the same token; exactly one wins.
pub async fn racing_conditional_writers<S: StateAccess>(store: &S, prefix: &str) {
    let key = format!("{prefix}race");
    store
        .set(&SetRequest::new(&key, json!(0)))
        .await
        .expect("set");
    let token = etag_of(store, &key).await;

    let left = SetRequest::new(&key, json!("left")).with_etag(&token);
    let right = SetRequest::new(&key, json!("right")).with_etag(&token);
    let (l, r) = tokio::join!(store.set(&left), store.set(&right));

    let expected = match (&l, &r) {
        (Ok(()), Err(err)) if err.is_conflict() => json!("left"),
        (Err(err), Ok(())) if err.is_conflict() => json!("right"),
        _ => panic!("exactly one writer should win: left={l:?} right={r:?}"),
    };
    assert_eq!(value_of(store, &key).await, Some(expected));
}

/// Arbitrary JSON survives a round trip unchanged.
pub async fn payload_round_trip<S: StateAccess>(store: &S, prefix: &str) {
    let payloads = [
        json!(null),
        json!(42),
        json!("text with \"quotes\" and unicode ✓"),
        json!([1, "two", {"three": 3.5}]),
        json!({"nested": {"list": [true, false], "empty": {}}}),
    ];
    for (i, payload) in payloads.iter().enumerate() {
        let key = format!("{prefix}payload-{i}");
        store
            .set(&SetRequest::new(&key, payload.clone()))
            .await
            .expect("set");
        assert_eq!(value_of(store, &key).await.as_ref(), Some(payload), "{key}");
    }
}
