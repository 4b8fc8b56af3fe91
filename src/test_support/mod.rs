//! Test utilities shared across crate-level unit tests.

#[cfg(not(target_arch = "wasm32"))]
pub mod http;
pub mod page;

#[cfg(not(target_arch = "wasm32"))]
pub use http::start_mock_server;
pub use page::example_page;

use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

/// Serializes unit tests that read or write the process-wide provider context.
pub fn context_guard() -> MutexGuard<'static, ()> {
    static GUARD: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));
    GUARD.lock().unwrap_or_else(PoisonError::into_inner)
}
