// tests/integration/local_store_test.rs

use meshkv::core::local_store::LocalStore;
use meshkv::{GetOutcome, SetOutcome, Store};

#[tokio::test]
async fn set_get_delete_round_trip_through_the_store_trait() {
    let store = LocalStore::new();

    assert_eq!(
        store.set("registrations", "alice", b"contact-info", 0, 0).await.unwrap(),
        SetOutcome::Ok
    );

    let cas = match store.get("registrations", "alice").await.unwrap() {
        GetOutcome::Ok { data, cas } => {
            assert_eq!(data, b"contact-info");
            cas
        }
        GetOutcome::NotFound => panic!("expected a hit after set"),
    };

    assert_eq!(
        store
            .set("registrations", "alice", b"updated-contact", cas, 0)
            .await
            .unwrap(),
        SetOutcome::Ok
    );

    store.delete("registrations", "alice").await.unwrap();
    assert_eq!(
        store.get("registrations", "alice").await.unwrap(),
        GetOutcome::NotFound
    );
}

#[tokio::test]
async fn stale_cas_is_reported_as_contention_not_an_error() {
    let store = LocalStore::new();
    store.set("registrations", "bob", b"v1", 0, 0).await.unwrap();

    let outcome = store.set("registrations", "bob", b"v2", 9999, 0).await.unwrap();
    assert_eq!(outcome, SetOutcome::DataContention);
}

#[tokio::test]
async fn two_tables_with_the_same_key_do_not_collide() {
    let store = LocalStore::new();
    store.set("registrations", "alice", b"reg-data", 0, 0).await.unwrap();
    store.set("bindings", "alice", b"binding-data", 0, 0).await.unwrap();

    match store.get("registrations", "alice").await.unwrap() {
        GetOutcome::Ok { data, .. } => assert_eq!(data, b"reg-data"),
        GetOutcome::NotFound => panic!("expected a hit"),
    }
    match store.get("bindings", "alice").await.unwrap() {
        GetOutcome::Ok { data, .. } => assert_eq!(data, b"binding-data"),
        GetOutcome::NotFound => panic!("expected a hit"),
    }
}
