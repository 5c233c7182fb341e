//! The event log at `/events`.
//!
//! Every entry carries a `type` discriminator and embeds the resource the
//! event concerns.

use crate::eloquent::{Model, ModelSchema, Resource};
use crate::error::{Error, Result};
use crate::query::scalar;
use crate::ssi::SingleService;

use super::{Application, Listener, Sms};

/// Base of every log entry type.
pub struct EventLog;

impl Resource for EventLog {
    const NAME: &'static str = "EventLog";

    fn schema() -> ModelSchema {
        ModelSchema::new(Self::NAME, "/events")
            .dates(["created"])
            .single_service(SingleService::new("type").subclasses([
                AuthFailureEntry::NAME,
                ListenerFailureEntry::NAME,
                SmsNewInboundEntry::NAME,
                SmsNewOutboundEntry::NAME,
            ]))
    }
}

macro_rules! log_entry {
    ($(#[$doc:meta])* $name:ident, $type:literal, $relation:literal => $target:ty) => {
        $(#[$doc])*
        pub struct $name;

        impl $name {
            pub const TYPE: &'static str = $type;
            pub const RELATION: &'static str = $relation;
        }

        impl Resource for $name {
            const NAME: &'static str = stringify!($name);

            fn schema() -> ModelSchema {
                ModelSchema::extend(&EventLog::schema(), Self::NAME)
                    .service_type(Self::TYPE)
                    .has_one(Self::RELATION, <$target as Resource>::NAME)
            }
        }
    };
}

log_entry!(
    /// An application failed to authenticate.
    AuthFailureEntry, "auth.failure", "application" => Application
);
log_entry!(
    /// A listener callback failed.
    ListenerFailureEntry, "listener.failure", "listener" => Listener
);
log_entry!(
    /// A text message was received.
    SmsNewInboundEntry, "sms.new.inbound", "sms" => Sms
);
log_entry!(
    /// A text message was sent.
    SmsNewOutboundEntry, "sms.new.outbound", "sms" => Sms
);

/// A hydrated log entry, by type.
#[derive(Debug, Clone)]
pub enum LogEntry {
    AuthFailure(Model),
    ListenerFailure(Model),
    SmsNewInbound(Model),
    SmsNewOutbound(Model),
}

impl LogEntry {
    pub fn model(&self) -> &Model {
        match self {
            LogEntry::AuthFailure(model)
            | LogEntry::ListenerFailure(model)
            | LogEntry::SmsNewInbound(model)
            | LogEntry::SmsNewOutbound(model) => model,
        }
    }

    pub fn into_model(self) -> Model {
        match self {
            LogEntry::AuthFailure(model)
            | LogEntry::ListenerFailure(model)
            | LogEntry::SmsNewInbound(model)
            | LogEntry::SmsNewOutbound(model) => model,
        }
    }

    /// The discriminator of this entry.
    pub fn service_type(&self) -> &'static str {
        match self {
            LogEntry::AuthFailure(_) => AuthFailureEntry::TYPE,
            LogEntry::ListenerFailure(_) => ListenerFailureEntry::TYPE,
            LogEntry::SmsNewInbound(_) => SmsNewInboundEntry::TYPE,
            LogEntry::SmsNewOutbound(_) => SmsNewOutboundEntry::TYPE,
        }
    }

    /// The embedded resource the event is about.
    pub fn subject(&self) -> Option<&Model> {
        let relation = match self {
            LogEntry::AuthFailure(_) => AuthFailureEntry::RELATION,
            LogEntry::ListenerFailure(_) => ListenerFailureEntry::RELATION,
            LogEntry::SmsNewInbound(_) => SmsNewInboundEntry::RELATION,
            LogEntry::SmsNewOutbound(_) => SmsNewOutboundEntry::RELATION,
        };
        self.model().relation(relation)?.as_one()
    }
}

impl TryFrom<Model> for LogEntry {
    type Error = Error;

    fn try_from(model: Model) -> Result<Self> {
        let name = model.name().to_string();
        if name == AuthFailureEntry::NAME {
            Ok(LogEntry::AuthFailure(model))
        } else if name == ListenerFailureEntry::NAME {
            Ok(LogEntry::ListenerFailure(model))
        } else if name == SmsNewInboundEntry::NAME {
            Ok(LogEntry::SmsNewInbound(model))
        } else if name == SmsNewOutboundEntry::NAME {
            Ok(LogEntry::SmsNewOutbound(model))
        } else {
            Err(Error::UnrecognizedType {
                field: "type".to_string(),
                value: model.attributes().get("type").map(scalar).unwrap_or_default(),
            })
        }
    }
}
