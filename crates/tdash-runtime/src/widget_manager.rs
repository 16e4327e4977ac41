#![forbid(unsafe_code)]

//! Per-widget event routing.
//!
//! The session installs [`WidgetManager::hook`] as the event stream's hook,
//! so every event also reaches the widgets. Each widget keeps its own path
//! table; for a given event, each widget's longest matching handler runs.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::event_stream::{BusEvent, Handler, longest_match};

#[derive(Default)]
pub struct WidgetManager {
    widgets: RwLock<HashMap<String, HashMap<String, Handler>>>,
}

impl WidgetManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `path` (and everything below it) to `handler` for `widget`.
    pub fn add_handler(
        &self,
        widget: &str,
        path: &str,
        handler: impl Fn(&BusEvent) + Send + Sync + 'static,
    ) {
        self.widgets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(widget.to_owned())
            .or_default()
            .insert(path.to_owned(), Arc::new(handler));
    }

    /// Returns `true` if the handler existed. A widget left with no
    /// handlers is forgotten.
    pub fn remove_handler(&self, widget: &str, path: &str) -> bool {
        let mut widgets = self.widgets.write().unwrap_or_else(PoisonError::into_inner);
        let Some(paths) = widgets.get_mut(widget) else {
            return false;
        };
        let removed = paths.remove(path).is_some();
        if paths.is_empty() {
            widgets.remove(widget);
        }
        removed
    }

    pub fn remove_widget(&self, widget: &str) -> bool {
        self.widgets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(widget)
            .is_some()
    }

    pub fn widget_count(&self) -> usize {
        self.widgets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run every widget's best handler for `event`.
    ///
    /// Handlers are collected first and called with no lock held, so they
    /// may add or remove handlers themselves.
    pub fn dispatch(&self, event: &BusEvent) {
        let matched: Vec<Handler> = {
            let widgets = self.widgets.read().unwrap_or_else(PoisonError::into_inner);
            widgets
                .values()
                .filter_map(|paths| {
                    longest_match(paths.keys().map(String::as_str), &event.path)
                        .and_then(|p| paths.get(p))
                        .cloned()
                })
                .collect()
        };
        for handler in matched {
            handler(event);
        }
    }

    /// A stream hook that forwards to [`dispatch`](Self::dispatch).
    pub fn hook(self: &Arc<Self>) -> Handler {
        let manager = Arc::clone(self);
        Arc::new(move |event: &BusEvent| manager.dispatch(event))
    }
}

impl std::fmt::Debug for WidgetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetManager")
            .field("widgets", &self.widget_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_stream::{EventPayload, user_path};
    use std::sync::Mutex;

    fn event(path: &str) -> BusEvent {
        BusEvent::new("test", path, EventPayload::Tick { count: 1 })
    }

    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
        tag: &'static str,
    ) -> impl Fn(&BusEvent) + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |_| log.lock().unwrap().push(tag.to_owned())
    }

    #[test]
    fn each_widget_gets_its_longest_match() {
        let manager = WidgetManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        manager.add_handler("gauge", "/usr", recorder(&log, "gauge usr"));
        manager.add_handler("gauge", "/usr/cpu", recorder(&log, "gauge cpu"));
        manager.add_handler("list", "/usr", recorder(&log, "list usr"));
        manager.add_handler("chart", "/timer", recorder(&log, "chart timer"));

        manager.dispatch(&event(&user_path("cpu")));

        let mut got = log.lock().unwrap().clone();
        got.sort();
        assert_eq!(got, vec!["gauge cpu", "list usr"]);
    }

    #[test]
    fn removal() {
        let manager = WidgetManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        manager.add_handler("a", "/timer", recorder(&log, "a"));
        manager.add_handler("b", "/timer", recorder(&log, "b"));
        assert_eq!(manager.widget_count(), 2);

        assert!(manager.remove_handler("a", "/timer"));
        assert!(!manager.remove_handler("a", "/timer"));
        assert_eq!(manager.widget_count(), 1);
        assert!(manager.remove_widget("b"));
        assert!(!manager.remove_widget("b"));

        manager.dispatch(&event("/timer/1s"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn hook_forwards_to_dispatch() {
        let manager = Arc::new(WidgetManager::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        manager.add_handler("w", "/", recorder(&log, "w"));
        let hook = manager.hook();
        hook(&event("/sys/mouse"));
        assert_eq!(*log.lock().unwrap(), vec!["w"]);
    }

    #[test]
    fn handlers_may_mutate_the_manager() {
        let manager = Arc::new(WidgetManager::new());
        let m = Arc::clone(&manager);
        manager.add_handler("once", "/usr", move |_| {
            m.remove_widget("once");
        });
        manager.dispatch(&event("/usr/x"));
        assert_eq!(manager.widget_count(), 0);
    }
}
