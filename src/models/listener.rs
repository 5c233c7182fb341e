//! Event listeners: callbacks the API invokes when events are logged.

use crate::eloquent::{ModelSchema, Resource};
use crate::ssi::SingleService;

/// Base of every listener type served at `/listeners`.
pub struct Listener;

impl Resource for Listener {
    const NAME: &'static str = "Listener";

    fn schema() -> ModelSchema {
        ModelSchema::new(Self::NAME, "/listeners")
            .single_service(SingleService::new("type").subclasses([HttpPostJsonListener::NAME]))
    }
}

/// Listener that POSTs each event as JSON to a callback URL.
pub struct HttpPostJsonListener;

impl HttpPostJsonListener {
    pub const TYPE: &'static str = "http.post.json";
}

impl Resource for HttpPostJsonListener {
    const NAME: &'static str = "HttpPostJsonListener";

    fn schema() -> ModelSchema {
        ModelSchema::extend(&Listener::schema(), Self::NAME).service_type(Self::TYPE)
    }
}
