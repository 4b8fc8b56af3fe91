use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, Weak};

use crate::logger::Logger;
use crate::platform::environment::{Environment, NavigationCallback};

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@fathom/navigation"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatcherState {
    Uninstalled,
    Installed,
}

struct Listener {
    id: u64,
    history: Option<u64>,
    callback: NavigationCallback,
}

/// Turns history mutations into navigation notifications.
///
/// Each session history is patched at most once per watcher and the patch is never reverted.
/// Listeners come and go through [`NavigationWatcher::subscribe`] and
/// [`NavigationWatcher::subscribe_on`].
pub struct NavigationWatcher {
    installed: Mutex<HashSet<u64>>,
    listeners: Mutex<Vec<Listener>>,
    next_id: AtomicU64,
}

impl fmt::Debug for NavigationWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationWatcher")
            .field("state", &self.state())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl NavigationWatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            installed: Mutex::new(HashSet::new()),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// The process-wide watcher used by providers unless another one is injected.
    pub fn global() -> Arc<Self> {
        static INSTANCE: LazyLock<Arc<NavigationWatcher>> = LazyLock::new(NavigationWatcher::new);
        INSTANCE.clone()
    }

    /// `Installed` once any history has been patched by this watcher.
    pub fn state(&self) -> WatcherState {
        if self.installed.lock().unwrap().is_empty() {
            WatcherState::Uninstalled
        } else {
            WatcherState::Installed
        }
    }

    pub fn is_installed_on(&self, environment: &dyn Environment) -> bool {
        self.installed
            .lock()
            .unwrap()
            .contains(&environment.history_id())
    }

    /// Patches `environment`'s history so every push, replace and pop notifies this watcher.
    ///
    /// Only the first successful call per history has an effect. Outside a browsing environment
    /// this does nothing.
    pub fn install(self: &Arc<Self>, environment: &dyn Environment) {
        let history = environment.history_id();
        let mut installed = self.installed.lock().unwrap();
        if installed.contains(&history) || !environment.is_browsing() {
            return;
        }

        let watcher: Weak<Self> = Arc::downgrade(self);
        let hook: NavigationCallback = Arc::new(move || {
            if let Some(watcher) = watcher.upgrade() {
                watcher.notify_history(history);
            }
        });

        match environment.intercept_history(hook) {
            Ok(true) => {
                installed.insert(history);
                LOGGER.debug(format!("history interception installed on history {history}"));
            }
            Ok(false) => LOGGER.debug("no history available; navigation watcher not installed"),
            Err(err) => LOGGER.debug(format!("history interception failed: {err}")),
        }
    }

    /// Registers `listener` for navigations on every history this watcher has patched.
    pub fn subscribe(self: &Arc<Self>, listener: NavigationCallback) -> NavigationSubscription {
        self.register(None, listener)
    }

    /// Registers `listener` for navigations on `environment`'s history only.
    pub fn subscribe_on(
        self: &Arc<Self>,
        environment: &dyn Environment,
        listener: NavigationCallback,
    ) -> NavigationSubscription {
        self.register(Some(environment.history_id()), listener)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Calls every current listener once, whatever history it is scoped to.
    pub fn notify(&self) {
        self.dispatch(|_| true);
    }

    fn notify_history(&self, history: u64) {
        self.dispatch(|scope| scope.map_or(true, |scoped| scoped == history));
    }

    fn dispatch<F>(&self, matches: F)
    where
        F: Fn(Option<u64>) -> bool,
    {
        let listeners: Vec<NavigationCallback> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|listener| matches(listener.history))
            .map(|listener| Arc::clone(&listener.callback))
            .collect();
        for listener in listeners {
            listener();
        }
    }

    fn register(
        self: &Arc<Self>,
        history: Option<u64>,
        callback: NavigationCallback,
    ) -> NavigationSubscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push(Listener {
            id,
            history,
            callback,
        });
        NavigationSubscription {
            watcher: Arc::downgrade(self),
            id,
            active: true,
        }
    }

    fn remove(&self, id: u64) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|listener| listener.id != id);
    }
}

/// Keeps a navigation listener registered until dropped or unsubscribed.
#[must_use = "dropping the subscription immediately unregisters the listener"]
pub struct NavigationSubscription {
    watcher: Weak<NavigationWatcher>,
    id: u64,
    active: bool,
}

impl NavigationSubscription {
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(watcher) = self.watcher.upgrade() {
            watcher.remove(self.id);
        }
    }
}

impl Drop for NavigationSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}
