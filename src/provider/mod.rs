//! Context provider: wires the navigation watcher to a tracker and exposes `page_view`/`goal`
//! through a cloneable [`Fathom`] handle.

mod api;
pub mod options;

pub use api::{Fathom, FathomProvider, Mount};
pub use options::{ProviderOptions, DEFAULT_DOMAIN};
