//! Local listener registry
//!
//! Maps event names to ordered callback lists. Dispatch is synchronous and
//! FIFO; a panicking callback is caught and logged so the rest of the
//! dispatch still runs.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::protocol::{Event, EventName};

/// A registered callback. Identity (pointer equality) is what `off` matches.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Wrap a closure as a [`Handler`]
pub fn listener<F>(f: F) -> Handler
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Ordered callbacks keyed by event name
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<EventName, Vec<Handler>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback. Registering the same handler twice makes it fire twice.
    pub fn add(&self, name: EventName, handler: Handler) {
        self.listeners.lock().entry(name).or_default().push(handler);
    }

    /// Remove the first registration of `handler` under `name`.
    ///
    /// Returns whether anything was removed.
    pub fn remove(&self, name: &EventName, handler: &Handler) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(handlers) = listeners.get_mut(name) else {
            return false;
        };

        let Some(index) = handlers.iter().position(|h| same_handler(h, handler)) else {
            return false;
        };
        handlers.remove(index);

        if handlers.is_empty() {
            listeners.remove(name);
        }
        true
    }

    /// Invoke every callback registered for the event's name, in
    /// registration order. Returns the number of callbacks invoked.
    ///
    /// The registry lock is released before any callback runs, so callbacks
    /// may register, remove or emit.
    pub fn dispatch(&self, event: &Event) -> usize {
        let name = event.name();
        let handlers: Vec<Handler> = match self.listeners.lock().get(&name) {
            Some(handlers) => handlers.clone(),
            None => return 0,
        };

        for (index, handler) in handlers.iter().enumerate() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                error!(
                    event = %name,
                    listener = index,
                    panic = %panic_message(panic.as_ref()),
                    "Listener panicked during dispatch"
                );
            }
        }

        handlers.len()
    }

    /// Number of callbacks registered under `name`
    pub fn count(&self, name: &EventName) -> usize {
        self.listeners.lock().get(name).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Drop every registration
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

/// Compare handlers by the address of their closure
fn same_handler(a: &Handler, b: &Handler) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerEvent;
    use serde_json::{json, Value};

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Handler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |tag: &'static str| {
            let log = log_clone.clone();
            listener(move |_event: &Event| log.lock().push(tag.to_string()))
        };
        (log, make)
    }

    fn task_updated() -> Event {
        Event::Server {
            kind: ServerEvent::TaskUpdated,
            data: json!({"id": "t1"}),
        }
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = ListenerRegistry::new();
        let (log, make) = recorder();

        registry.add(ServerEvent::TaskUpdated.into(), make("a"));
        registry.add(ServerEvent::TaskUpdated.into(), make("b"));
        registry.add(ServerEvent::TaskUpdated.into(), make("c"));

        assert_eq!(registry.dispatch(&task_updated()), 3);
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_dispatch_only_matching_name() {
        let registry = ListenerRegistry::new();
        let (log, make) = recorder();

        registry.add(ServerEvent::TaskCreated.into(), make("created"));
        registry.dispatch(&task_updated());

        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_duplicate_registration_fires_twice() {
        let registry = ListenerRegistry::new();
        let (log, make) = recorder();
        let handler = make("dup");

        registry.add(ServerEvent::TaskUpdated.into(), handler.clone());
        registry.add(ServerEvent::TaskUpdated.into(), handler);
        registry.dispatch(&task_updated());

        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn test_remove_takes_first_instance_only() {
        let registry = ListenerRegistry::new();
        let (log, make) = recorder();
        let dup = make("dup");
        let name: EventName = ServerEvent::TaskUpdated.into();

        registry.add(name.clone(), dup.clone());
        registry.add(name.clone(), make("other"));
        registry.add(name.clone(), dup.clone());

        assert!(registry.remove(&name, &dup));
        assert_eq!(registry.count(&name), 2);

        registry.dispatch(&task_updated());
        assert_eq!(*log.lock(), vec!["other", "dup"]);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let registry = ListenerRegistry::new();
        let (_log, make) = recorder();
        let name: EventName = ServerEvent::TaskUpdated.into();

        assert!(!registry.remove(&name, &make("never-added")));

        registry.add(name.clone(), make("kept"));
        assert!(!registry.remove(&name, &make("lookalike")));
        assert_eq!(registry.count(&name), 1);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let registry = ListenerRegistry::new();
        let (log, make) = recorder();
        let name: EventName = ServerEvent::TaskUpdated.into();

        registry.add(name.clone(), make("before"));
        registry.add(name.clone(), listener(|_| panic!("listener bug")));
        registry.add(name.clone(), make("after"));

        assert_eq!(registry.dispatch(&task_updated()), 3);
        assert_eq!(*log.lock(), vec!["before", "after"]);
    }

    #[test]
    fn test_listener_may_reenter_registry() {
        let registry = Arc::new(ListenerRegistry::new());
        let (log, make) = recorder();
        let inner = registry.clone();
        let late = make("late");

        registry.add(
            ServerEvent::TaskUpdated.into(),
            listener(move |_| inner.add(ServerEvent::TaskUpdated.into(), late.clone())),
        );

        // Callbacks added during a dispatch only see later dispatches
        registry.dispatch(&task_updated());
        assert!(log.lock().is_empty());
        registry.dispatch(&task_updated());
        assert_eq!(*log.lock(), vec!["late"]);
    }

    #[test]
    fn test_listener_receives_payload() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        let seen_clone = seen.clone();

        registry.add(
            "dashboard_refresh".into(),
            listener(move |event| seen_clone.lock().push(event.data())),
        );
        registry.dispatch(&Event::named("dashboard_refresh", json!({"tab": "pipeline"})));

        assert_eq!(*seen.lock(), vec![json!({"tab": "pipeline"})]);
    }

    #[test]
    fn test_clear() {
        let registry = ListenerRegistry::new();
        let (log, make) = recorder();

        registry.add(ServerEvent::TaskUpdated.into(), make("a"));
        registry.add(EventName::ConnectionStatus, make("b"));
        registry.clear();

        assert!(registry.is_empty());
        assert_eq!(registry.dispatch(&task_updated()), 0);
        assert!(log.lock().is_empty());
    }
}
