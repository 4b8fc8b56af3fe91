use std::sync::Arc;

use crate::platform::HeadlessEnvironment;

/// Headless page at `https://example.com/pricing?plan=pro`, visible, with a loaded body.
pub fn example_page() -> Arc<HeadlessEnvironment> {
    let page = HeadlessEnvironment::new();
    page.set_location("https://example.com/pricing?plan=pro")
        .expect("valid test location");
    page.set_timezone("Europe/Berlin");
    Arc::new(page)
}
