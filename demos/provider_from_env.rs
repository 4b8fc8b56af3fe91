//! Reads the provider configuration from the environment and forwards every request to the
//! real collector over HTTP.
//!
//! ```bash
//! FATHOM_SITE_ID=ABCDEF cargo run --example provider_from_env
//! FATHOM_CONFIG='{"siteId":"ABCDEF","customDomain":"stats.example.com"}' \
//!     cargo run --example provider_from_env
//! ```

use std::sync::Arc;
use std::time::Duration;

use fathom_rs_sdk::logger::{set_log_level, LogLevel};
use fathom_rs_sdk::platform::HeadlessEnvironment;
use fathom_rs_sdk::tracker::HttpTransport;
use fathom_rs_sdk::{FathomProvider, ProviderOptions};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    set_log_level(LogLevel::Debug)?;

    let options = ProviderOptions::from_env()?;
    println!("reporting site {} to {}", options.site_id, options.domain());

    let transport = Arc::new(HttpTransport::new()?);
    let page = Arc::new(HeadlessEnvironment::new().with_transport(transport));
    page.set_location("https://example.com/")?;

    let mount = FathomProvider::new(options)?
        .with_environment(page.clone())
        .mount()?;
    page.push_state("/docs")?;
    mount.fathom().goal("DEMO", None, None);

    // Deliveries run on background tasks.
    tokio::time::sleep(Duration::from_secs(2)).await;
    println!("sent {} requests", page.transmissions().len());
    Ok(())
}
