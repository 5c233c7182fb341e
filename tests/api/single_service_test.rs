//! Single-service families: one endpoint, many model types.

use phonecom_sdk::eloquent::{ModelSchema, Registry, Resource};
use phonecom_sdk::models::{EventLog, LogEntry, SmsNewInboundEntry, SmsNewOutboundEntry};
use phonecom_sdk::ssi::{self, InvalidAttributePolicy, SingleService};
use phonecom_sdk::transport::{MockHandle, MockResponse};
use phonecom_sdk::{Client, Error};
use serde_json::json;

use crate::common::{attrs, registry};

struct Device;

impl Resource for Device {
    const NAME: &'static str = "Device";

    fn schema() -> ModelSchema {
        ModelSchema::new(Self::NAME, "/devices")
            .single_service(SingleService::new("kind").subclasses([Phone::NAME, Fax::NAME]))
    }
}

struct Phone;

impl Resource for Phone {
    const NAME: &'static str = "Phone";

    fn schema() -> ModelSchema {
        ModelSchema::extend(&Device::schema(), Self::NAME)
            .service_type("phone")
            .persisted(["number"])
            .invalid_attributes(InvalidAttributePolicy::Reject)
    }
}

struct Fax;

impl Resource for Fax {
    const NAME: &'static str = "Fax";

    fn schema() -> ModelSchema {
        ModelSchema::extend(&Device::schema(), Self::NAME).service_type("fax")
    }
}

fn devices(responses: Vec<MockResponse>) -> (Registry, MockHandle) {
    let (client, handle) = Client::mock(responses);
    let registry = Registry::builder(client)
        .resource::<Device>()
        .resource::<Phone>()
        .resource::<Fax>()
        .boot()
        .unwrap();
    (registry, handle)
}

#[test]
fn test_rows_dispatch_on_the_discriminator() {
    let (registry, _) = registry(vec![]);

    let entries = registry
        .hydrate::<EventLog>(vec![
            json!({"id": 1, "type": "sms.new.inbound"}),
            json!({"id": 2, "type": "sms.new.outbound"}),
        ])
        .unwrap();

    assert_eq!(entries[0].name(), SmsNewInboundEntry::NAME);
    assert_eq!(entries[1].name(), SmsNewOutboundEntry::NAME);
    assert!(entries.iter().all(|entry| entry.exists()));
}

#[test]
fn test_unknown_discriminator_never_falls_back_to_the_base() {
    let (registry, _) = registry(vec![]);

    let err = registry
        .hydrate::<EventLog>(vec![json!({"id": 1, "type": "unknown.type"})])
        .unwrap_err();

    assert!(matches!(err, Error::UnrecognizedType { ref value, .. } if value == "unknown.type"));
}

#[tokio::test]
async fn test_typed_entries_expose_their_subject() {
    let (registry, _) = registry(vec![MockResponse::collection(vec![json!({
        "id": 7,
        "type": "sms.new.outbound",
        "sms": {"id": 70, "content": "hello", "@controls": {"self": {"href": "/sms/70"}}}
    })])]);

    let entry = LogEntry::try_from(registry.query::<EventLog>().first_or_fail().await.unwrap()).unwrap();

    assert_eq!(entry.service_type(), SmsNewOutboundEntry::TYPE);
    let sms = entry.subject().unwrap();
    assert!(sms.exists());
    assert_eq!(sms.self_url(), Some("/sms/70"));
}

#[test]
fn test_base_schema_lists_every_family_type() {
    let (registry, _) = devices(vec![]);

    let device = registry.schema(Device::NAME).unwrap();
    assert_eq!(ssi::service_types(&device), vec!["fax".to_string(), "phone".to_string()]);

    let phone = registry.schema(Phone::NAME).unwrap();
    assert_eq!(ssi::service_types(&phone), vec!["phone".to_string()]);
}

#[tokio::test]
async fn test_save_stamps_the_discriminator() {
    let (registry, handle) = devices(vec![MockResponse::ok(json!({"id": 11}))]);

    let phone = registry
        .create::<Phone>(attrs(json!({"number": "+15550001111"})))
        .await
        .unwrap();

    assert_eq!(phone.get_attribute("kind"), Some(json!("phone")));
    let history = handle.history();
    assert_eq!(history[0].url, "/devices");
    assert_eq!(
        history[0].options.json,
        Some(json!({"number": "+15550001111", "kind": "phone"}))
    );
}

#[tokio::test]
async fn test_rejecting_family_refuses_unpersisted_attributes() {
    let (registry, handle) = devices(vec![]);

    let err = registry
        .create::<Phone>(attrs(json!({"number": "+15550001111", "color": "red"})))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidAttributes { ref attributes, .. } if attributes == &["color".to_string()]));
    assert!(handle.history().is_empty());

    let err = registry
        .hydrate::<Device>(vec![json!({"id": 1, "kind": "phone", "color": "red"})])
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAttributes { .. }));
}

#[tokio::test]
async fn test_subtype_queries_filter_on_their_own_type() {
    let (registry, handle) = devices(vec![MockResponse::collection(vec![json!({"id": 3, "kind": "fax"})])]);

    let faxes = registry.all::<Fax>().await.unwrap();

    assert_eq!(faxes[0].name(), Fax::NAME);
    assert_eq!(handle.history()[0].options.query_value("filter[kind]"), Some("in:fax"));
}
