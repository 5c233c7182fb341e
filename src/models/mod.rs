//! Resources bundled with the SDK.

mod application;
mod event_log;
mod listener;
mod sms;

pub use application::Application;
pub use event_log::{
    AuthFailureEntry, EventLog, ListenerFailureEntry, LogEntry, SmsNewInboundEntry, SmsNewOutboundEntry,
};
pub use listener::{HttpPostJsonListener, Listener};
pub use sms::Sms;

use crate::eloquent::RegistryBuilder;

/// Register every bundled resource.
pub fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .resource::<Sms>()
        .resource::<Application>()
        .resource::<Listener>()
        .resource::<HttpPostJsonListener>()
        .resource::<EventLog>()
        .resource::<AuthFailureEntry>()
        .resource::<ListenerFailureEntry>()
        .resource::<SmsNewInboundEntry>()
        .resource::<SmsNewOutboundEntry>()
}
