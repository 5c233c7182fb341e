//! Model lifecycle: hydration, dirty tracking, persistence and events.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use phonecom_sdk::eloquent::ModelEvent;
use phonecom_sdk::mason;
use phonecom_sdk::models::{Application, Sms};
use phonecom_sdk::transport::{MockResponse, Verb};
use serde_json::json;

use crate::common::{attrs, registry, row_with_self, Ticket};

#[test]
fn test_hydrated_models_start_clean() {
    let (registry, _) = registry(vec![]);
    let mut models = registry
        .hydrate::<Application>(vec![json!({"id": 3, "name": "crm", "seats": 5})])
        .unwrap();
    let app = &mut models[0];

    assert!(app.get_dirty().is_empty());

    app.set_attribute("seats", "5").unwrap();
    assert!(app.get_dirty().is_empty());

    app.set_attribute("seats", 6).unwrap();
    assert_eq!(app.get_dirty(), attrs(json!({"seats": 6})));

    app.sync_original();
    assert!(!app.is_dirty(&[]));
}

#[test]
fn test_export_drops_meta_properties_and_keeps_self_link_aside() {
    let (registry, _) = registry(vec![]);
    let models = registry
        .hydrate::<Sms>(vec![json!({
            "id": 9,
            "content": "hi",
            "@meta": {"rev": 2},
            "@controls": {"self": {"href": "/sms/9"}},
            "routing": {"@namespaces": {}, "carrier": "x"}
        })])
        .unwrap();
    let sms = &models[0];

    let exported = sms.to_array().unwrap();
    assert!(exported.keys().all(|key| !key.starts_with('@')));
    assert_eq!(exported.get("routing"), Some(&json!({"carrier": "x"})));
    assert_eq!(sms.self_url(), Some("/sms/9"));
    assert!(!sms.to_json().unwrap().contains("/sms/9"));
}

#[tokio::test]
async fn test_create_posts_attributes_and_takes_the_new_id() {
    let (registry, handle) = registry(vec![MockResponse::ok(json!({"id": 501}))]);

    let app = registry
        .create::<Application>(attrs(json!({"to": "+15551234567", "content": "hi"})))
        .await
        .unwrap();

    assert!(app.exists());
    assert_eq!(app.key(), Some(&json!(501)));
    assert!(app.get_dirty().is_empty());

    let history = handle.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].verb, Verb::Post);
    assert_eq!(history[0].url, "/applications");
    assert_eq!(
        history[0].options.json,
        Some(json!({"to": "+15551234567", "content": "hi"}))
    );
}

#[tokio::test]
async fn test_sending_sms_adopts_the_created_resource() {
    let (registry, handle) = registry(vec![MockResponse::collection(vec![json!({
        "id": 77,
        "to": "+15551234567",
        "content": "hi",
        "@controls": {"self": {"href": "/sms/77"}}
    })])]);

    let sms = registry
        .create::<Sms>(attrs(json!({"to": "+15551234567", "content": "hi"})))
        .await
        .unwrap();

    assert!(sms.exists());
    assert_eq!(sms.key(), Some(&json!(77)));
    assert_eq!(sms.self_url(), Some("/sms/77"));
    assert_eq!(handle.history().len(), 1);
}

#[tokio::test]
async fn test_sms_to_several_recipients_keeps_every_message() {
    let (registry, handle) = registry(vec![MockResponse::collection(vec![
        json!({"id": 77, "to": "+15551234567", "content": "hi", "@controls": {"self": {"href": "/sms/77"}}}),
        json!({"id": 78, "to": "+15557654321", "content": "hi", "@controls": {"self": {"href": "/sms/78"}}}),
    ])]);

    let sent = registry
        .create_many::<Sms>(attrs(json!({"to": ["+15551234567", "+15557654321"], "content": "hi"})))
        .await
        .unwrap();

    let ids: Vec<_> = sent.iter().map(|sms| sms.key().cloned()).collect();
    assert_eq!(ids, vec![Some(json!(77)), Some(json!(78))]);
    let links: Vec<_> = sent.iter().map(|sms| sms.self_url()).collect();
    assert_eq!(links, vec![Some("/sms/77"), Some("/sms/78")]);
    assert!(sent.iter().all(|sms| sms.exists()));
    assert!(sent[0].created_alongside().is_empty());

    let history = handle.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].verb, Verb::Post);
}

#[tokio::test]
async fn test_create_keeps_extra_messages_on_the_first() {
    let (registry, _) = registry(vec![MockResponse::collection(vec![
        json!({"id": 1, "to": "a"}),
        json!({"id": 2, "to": "b"}),
        json!({"id": 3, "to": "c"}),
    ])]);

    let sms = registry
        .create::<Sms>(attrs(json!({"to": ["a", "b", "c"], "content": "hi"})))
        .await
        .unwrap();

    assert_eq!(sms.key(), Some(&json!(1)));
    let others: Vec<_> = sms.created_alongside().iter().map(|m| m.key().cloned()).collect();
    assert_eq!(others, vec![Some(json!(2)), Some(json!(3))]);
}

#[tokio::test]
async fn test_guarded_attributes_are_not_sent() {
    let (registry, handle) = registry(vec![MockResponse::ok(json!({"id": 1}))]);

    let mut ticket = registry.make::<Ticket>().unwrap().with_path_param("account", 12);
    ticket
        .fill(attrs(json!({"subject": "help", "internal_notes": "vip"})))
        .unwrap();
    ticket.save().await.unwrap();

    let history = handle.history();
    assert_eq!(history[0].url, "/accounts/12/tickets");
    assert_eq!(history[0].options.json, Some(json!({"subject": "help"})));
}

#[tokio::test]
async fn test_update_puts_the_full_record_to_its_self_link() {
    let (registry, handle) = registry(vec![MockResponse::ok(json!({"id": 4}))]);
    let mut models = registry
        .hydrate::<Application>(vec![row_with_self(4, "/applications/4", attrs(json!({"name": "crm"})))])
        .unwrap();
    let app = &mut models[0];

    assert!(app.update(attrs(json!({"name": "billing"}))).await.unwrap());

    let history = handle.history();
    assert_eq!(history[0].verb, Verb::Put);
    assert_eq!(history[0].url, "/applications/4");
    assert_eq!(history[0].options.json, Some(json!({"id": 4, "name": "billing"})));
    assert!(app.get_dirty().is_empty());
}

#[tokio::test]
async fn test_saving_a_clean_model_sends_nothing() {
    let (registry, handle) = registry(vec![]);
    let mut models = registry
        .hydrate::<Application>(vec![row_with_self(4, "/applications/4", Default::default())])
        .unwrap();

    assert!(models[0].save().await.unwrap());
    assert!(handle.history().is_empty());
}

#[tokio::test]
async fn test_delete_uses_self_link() {
    let (registry, handle) = registry(vec![MockResponse::raw(204, mason::MEDIA_TYPE, "")]);
    let mut models = registry
        .hydrate::<Application>(vec![row_with_self(4, "/applications/4", Default::default())])
        .unwrap();

    assert!(models[0].delete().await.unwrap());
    assert!(!models[0].exists());

    let history = handle.history();
    assert_eq!(history[0].verb, Verb::Delete);
    assert_eq!(history[0].url, "/applications/4");
}

#[tokio::test]
async fn test_creating_listener_can_cancel_the_insert() {
    let (registry, handle) = registry(vec![]);
    registry.listen::<Application, _>(ModelEvent::Creating, 0, |_| Some(false));

    let mut app = registry.new_model::<Application>(attrs(json!({"name": "crm"}))).unwrap();

    assert!(!app.save().await.unwrap());
    assert!(!app.exists());
    assert!(handle.history().is_empty());
}

#[tokio::test]
async fn test_saved_listeners_run_after_persisting() {
    let (registry, _) = registry(vec![MockResponse::ok(json!({"id": 8}))]);
    let saved = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&saved);
    registry.listen::<Application, _>(ModelEvent::Saved, 0, move |model| {
        assert!(model.exists());
        counter.fetch_add(1, Ordering::SeqCst);
        None
    });

    registry
        .create::<Application>(attrs(json!({"name": "crm"})))
        .await
        .unwrap();

    assert_eq!(saved.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_destroy_deletes_each_found_record() {
    let (registry, handle) = registry(vec![
        MockResponse::collection(vec![
            row_with_self(1, "/applications/1", Default::default()),
            row_with_self(2, "/applications/2", Default::default()),
        ]),
        MockResponse::raw(204, mason::MEDIA_TYPE, ""),
        MockResponse::raw(204, mason::MEDIA_TYPE, ""),
    ]);

    let deleted = registry.destroy::<Application>(vec![json!(1), json!(2)]).await.unwrap();

    assert_eq!(deleted, 2);
    let history = handle.history();
    assert_eq!(history[0].options.query_value("filter[id]"), Some("in:1,2"));
    assert_eq!(history[1].url, "/applications/1");
    assert_eq!(history[2].url, "/applications/2");
}
