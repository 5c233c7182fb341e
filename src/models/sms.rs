use crate::eloquent::{ModelSchema, Resource};

/// A text message. Sending one to several recipients creates one resource
/// per recipient, so creation answers with a collection.
pub struct Sms;

impl Resource for Sms {
    const NAME: &'static str = "Sms";

    fn schema() -> ModelSchema {
        ModelSchema::new(Self::NAME, "/sms")
            .insert_returns_collection(true)
            .dates(["created", "scheduled"])
    }
}
