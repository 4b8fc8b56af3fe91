//! Event reporter: builds the collector payload from the current page and delivers it through a
//! beacon (goals) or a tracking pixel (page views).

mod api;
pub mod error;
pub mod event;
pub mod filter;
pub mod location;
mod logger;
pub mod payload;
pub mod transport;

pub use api::{SendOutcome, Tracker, TrackerConfig};
pub use error::{TrackerError, TrackerErrorCode, TrackerResult};
pub use event::{DeliveryChannel, EventData, EventKind};
pub use filter::SuppressReason;
pub use payload::Payload;
pub use transport::{CollectorTransport, HttpTransport, RecordingTransport};
