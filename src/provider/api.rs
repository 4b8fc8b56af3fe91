use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use crate::context;
use crate::logger::Logger;
use crate::navigation::{NavigationSubscription, NavigationWatcher};
use crate::platform::environment::{default_environment, Environment};
use crate::provider::options::ProviderOptions;
use crate::tracker::error::TrackerResult;
use crate::tracker::{EventData, EventKind, Tracker, TrackerConfig};

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@fathom/provider"));
static NEXT_MOUNT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle handed to application code for reporting page views and goals.
#[derive(Clone, Debug)]
pub struct Fathom {
    tracker: Tracker,
}

impl Fathom {
    pub fn new(tracker: Tracker) -> Self {
        Self { tracker }
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Reports a page view. `path` defaults to the current location; a path set in `data` wins.
    pub fn page_view(&self, path: Option<&str>, data: Option<EventData>) {
        let base = EventData {
            path: path.map(str::to_string),
            ..EventData::default()
        };
        let event = data.unwrap_or_default().merged_over(base);
        self.tracker.send(EventKind::PageView, event);
    }

    /// Reports a goal conversion with an optional value (in cents). Fields set in `data` win.
    pub fn goal(&self, goal_id: &str, value: Option<f64>, data: Option<EventData>) {
        let base = EventData {
            goal_id: Some(goal_id.to_string()),
            goal_value: value,
            ..EventData::default()
        };
        let event = data.unwrap_or_default().merged_over(base);
        self.tracker.send(EventKind::Goal, event);
    }
}

/// Configured, not yet mounted provider.
pub struct FathomProvider {
    options: ProviderOptions,
    environment: Arc<dyn Environment>,
    watcher: Arc<NavigationWatcher>,
}

impl fmt::Debug for FathomProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FathomProvider")
            .field("options", &self.options)
            .finish()
    }
}

impl FathomProvider {
    /// Validates `options`; uses the platform's default environment and the global watcher.
    pub fn new(options: ProviderOptions) -> TrackerResult<Self> {
        options.validate()?;
        Ok(Self {
            options,
            environment: default_environment(),
            watcher: NavigationWatcher::global(),
        })
    }

    pub fn with_environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_watcher(mut self, watcher: Arc<NavigationWatcher>) -> Self {
        self.watcher = watcher;
        self
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    /// Installs navigation tracking, sends the initial page view (unless disabled) and publishes
    /// the handle for [`crate::context::use_fathom`].
    pub fn mount(self) -> TrackerResult<Mount> {
        let config = TrackerConfig::new(self.options.tracker_url(), self.options.site_id.clone())?;
        let tracker = Tracker::new(config, Arc::clone(&self.environment));
        let fathom = Fathom::new(tracker.clone());
        let id = NEXT_MOUNT_ID.fetch_add(1, Ordering::SeqCst);

        self.watcher.install(self.environment.as_ref());

        let subscription = if self.environment.is_browsing() {
            let no_pageviews = self.options.no_pageviews;
            let on_change = tracker.clone();
            let subscription = self.watcher.subscribe_on(
                self.environment.as_ref(),
                Arc::new(move || {
                    if !no_pageviews {
                        on_change.send(EventKind::PageView, EventData::default());
                    }
                }),
            );
            if !no_pageviews {
                tracker.send(EventKind::PageView, EventData::default());
            }
            Some(subscription)
        } else {
            None
        };

        context::provide(id, fathom.clone());
        LOGGER.debug(format!(
            "mounted for site {} via {}",
            self.options.site_id,
            self.options.domain()
        ));

        Ok(Mount {
            id,
            fathom,
            subscription,
        })
    }
}

/// A mounted provider. Dropping it stops automatic page views and withdraws the context handle;
/// the history patch stays in place.
pub struct Mount {
    id: u64,
    fathom: Fathom,
    subscription: Option<NavigationSubscription>,
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("id", &self.id)
            .field("listening", &self.subscription.is_some())
            .finish()
    }
}

impl Mount {
    pub fn fathom(&self) -> Fathom {
        self.fathom.clone()
    }

    pub fn is_listening(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn unmount(self) {}
}

impl Drop for Mount {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        context::withdraw(self.id);
        LOGGER.debug("unmounted");
    }
}
