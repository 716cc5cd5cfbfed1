//! ObjectStore contract tests.
//!
//! Every backend must behave the same way for the operations the ingestion
//! and archival jobs depend on. Each backend's test file builds a store and
//! runs `run_object_store_tests!` against it.

use bytes::Bytes;

use parkwatch::object_store::ObjectStore;

pub async fn test_put_then_get(store: &dyn ObjectStore) {
    let status = store
        .put("contract-put", "2023-06-01-00-00-00.xml", Bytes::from_static(b"<P/>"))
        .await
        .expect("put should succeed");
    assert!(status.is_success());

    let body = store
        .get("contract-put", "2023-06-01-00-00-00.xml")
        .await
        .expect("get should succeed");
    assert_eq!(body.as_ref(), b"<P/>");
}

pub async fn test_put_overwrites(store: &dyn ObjectStore) {
    let key = "2023-06-01-00-01-00.xml";
    store
        .put("contract-overwrite", key, Bytes::from_static(b"first"))
        .await
        .expect("first put should succeed");
    store
        .put("contract-overwrite", key, Bytes::from_static(b"second!"))
        .await
        .expect("second put should succeed");

    let keys = store.list("contract-overwrite", None).await.unwrap();
    assert_eq!(keys, vec![key.to_string()]);
    let meta = store.head("contract-overwrite", key).await.unwrap();
    assert_eq!(meta.size, 7);
}

pub async fn test_get_missing_is_not_found(store: &dyn ObjectStore) {
    let err = store
        .get("contract-missing", "1999-01-01-00-00-00.xml")
        .await
        .expect_err("missing object should fail");
    assert!(err.is_not_found(), "expected NotFound, got {err}");

    let err = store
        .head("contract-missing", "1999-01-01-00-00-00.xml")
        .await
        .expect_err("missing head should fail");
    assert!(err.is_not_found());
}

pub async fn test_list_sorted_and_prefixed(store: &dyn ObjectStore) {
    for key in [
        "2022-01-01-00-00-00.xml",
        "2020-12-31-23-59-59.xml",
        "2021-06-15-12-00-00.xml",
        "2021-01-01-00-00-00.xml",
    ] {
        store
            .put("contract-list", key, Bytes::from_static(b"x"))
            .await
            .unwrap();
    }

    let all = store.list("contract-list", None).await.unwrap();
    assert_eq!(
        all,
        vec![
            "2020-12-31-23-59-59.xml",
            "2021-01-01-00-00-00.xml",
            "2021-06-15-12-00-00.xml",
            "2022-01-01-00-00-00.xml",
        ]
    );

    let year = store.list("contract-list", Some("2021-")).await.unwrap();
    assert_eq!(year, vec!["2021-01-01-00-00-00.xml", "2021-06-15-12-00-00.xml"]);
}

pub async fn test_list_unknown_bucket_is_empty(store: &dyn ObjectStore) {
    let keys = store.list("contract-never-written", None).await.unwrap();
    assert!(keys.is_empty());
}

pub async fn test_copy_across_buckets(store: &dyn ObjectStore) {
    let key = "2020-05-05-05-05-05.xml";
    store
        .put("contract-copy-src", key, Bytes::from_static(b"payload"))
        .await
        .unwrap();

    let status = store
        .copy("contract-copy-src", key, "contract-copy-dst", key)
        .await
        .expect("copy should succeed");
    assert!(status.is_success());

    let src = store.head("contract-copy-src", key).await.unwrap();
    let dst = store.head("contract-copy-dst", key).await.unwrap();
    assert_eq!(src.size, dst.size);
    assert_eq!(src.etag, dst.etag);
    assert_eq!(store.get("contract-copy-dst", key).await.unwrap().as_ref(), b"payload");
}

pub async fn test_copy_missing_source_fails(store: &dyn ObjectStore) {
    let result = store
        .copy("contract-copy-none", "nope.xml", "contract-copy-dst2", "nope.xml")
        .await;
    assert!(result.is_err());
    assert!(store.list("contract-copy-dst2", None).await.unwrap().is_empty());
}

pub async fn test_delete_then_missing(store: &dyn ObjectStore) {
    let key = "2019-01-01-00-00-00.xml";
    store
        .put("contract-delete", key, Bytes::from_static(b"x"))
        .await
        .unwrap();

    let status = store.delete("contract-delete", key).await.unwrap();
    assert!(status.is_success());
    assert!(store.list("contract-delete", None).await.unwrap().is_empty());

    // Second delete of the same key is not an error
    let status = store.delete("contract-delete", key).await.unwrap();
    assert!(status.is_success());
}

/// Run every contract test against `$store` (a `&dyn ObjectStore`).
#[macro_export]
macro_rules! run_object_store_tests {
    ($store:expr) => {
        use $crate::object_store::*;

        test_put_then_get($store).await;
        println!("  test_put_then_get: PASSED");

        test_put_overwrites($store).await;
        println!("  test_put_overwrites: PASSED");

        test_get_missing_is_not_found($store).await;
        println!("  test_get_missing_is_not_found: PASSED");

        test_list_sorted_and_prefixed($store).await;
        println!("  test_list_sorted_and_prefixed: PASSED");

        test_list_unknown_bucket_is_empty($store).await;
        println!("  test_list_unknown_bucket_is_empty: PASSED");

        test_copy_across_buckets($store).await;
        println!("  test_copy_across_buckets: PASSED");

        test_copy_missing_source_fails($store).await;
        println!("  test_copy_missing_source_fails: PASSED");

        test_delete_then_missing($store).await;
        println!("  test_delete_then_missing: PASSED");
    };
}
