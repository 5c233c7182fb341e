//! Model lifecycle events.
//!
//! Listeners are registered per model name and event, ordered by priority
//! (highest first, then registration order). For the halting events
//! (`saving`, `updating`, `creating`, `deleting`) the first listener that
//! answers `Some(_)` decides the outcome; `Some(false)` cancels the operation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use super::Model;

/// Lifecycle points a listener can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelEvent {
    Saving,
    Saved,
    Updating,
    Updated,
    Creating,
    Created,
    Deleting,
    Deleted,
}

impl ModelEvent {
    /// Halting events stop at the first listener that answers.
    pub fn is_halting(&self) -> bool {
        matches!(
            self,
            ModelEvent::Saving | ModelEvent::Updating | ModelEvent::Creating | ModelEvent::Deleting
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelEvent::Saving => "saving",
            ModelEvent::Saved => "saved",
            ModelEvent::Updating => "updating",
            ModelEvent::Updated => "updated",
            ModelEvent::Creating => "creating",
            ModelEvent::Created => "created",
            ModelEvent::Deleting => "deleting",
            ModelEvent::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ModelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle listener. Returning `Some(false)` from a halting event cancels it.
pub type ModelListener = Arc<dyn Fn(&mut Model) -> Option<bool> + Send + Sync>;

struct Registration {
    priority: i32,
    listener: ModelListener,
}

/// Listener table shared by every model of a registry.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<BTreeMap<(String, ModelEvent), Vec<Registration>>>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .listeners
            .read()
            .map(|table| table.values().map(Vec::len).sum::<usize>())
            .unwrap_or_default();
        f.debug_struct("EventDispatcher").field("listeners", &count).finish()
    }
}

impl EventDispatcher {
    pub fn listen(&self, model: &str, event: ModelEvent, priority: i32, listener: ModelListener) {
        let mut table = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let registrations = table.entry((model.to_string(), event)).or_default();
        let at = registrations
            .iter()
            .position(|r| r.priority < priority)
            .unwrap_or(registrations.len());
        registrations.insert(at, Registration { priority, listener });
    }

    pub fn has_listeners(&self, model: &str, event: ModelEvent) -> bool {
        self.listeners
            .read()
            .map(|table| {
                table
                    .get(&(model.to_string(), event))
                    .is_some_and(|r| !r.is_empty())
            })
            .unwrap_or(false)
    }

    /// Drop every listener of one model.
    pub fn forget(&self, model: &str) {
        let mut table = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        table.retain(|(name, _), _| name != model);
    }

    /// Call the listeners of `event` for `model`.
    ///
    /// The table lock is released before any listener runs, so listeners may
    /// register further listeners.
    pub fn fire(&self, model: &mut Model, event: ModelEvent) -> Option<bool> {
        let listeners: Vec<ModelListener> = {
            let table = self.listeners.read().unwrap_or_else(|e| e.into_inner());
            match table.get(&(model.schema().name().to_string(), event)) {
                Some(registrations) => registrations.iter().map(|r| Arc::clone(&r.listener)).collect(),
                None => return None,
            }
        };

        for listener in listeners {
            let answer = listener(model);
            if event.is_halting() && answer.is_some() {
                return answer;
            }
        }
        None
    }
}
