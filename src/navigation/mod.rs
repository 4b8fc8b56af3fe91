//! Navigation watcher: detects client-side (history API) navigations and republishes each one as
//! a single notification.

mod watcher;

pub use watcher::{NavigationSubscription, NavigationWatcher, WatcherState};
