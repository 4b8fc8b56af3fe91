//! Mounts a provider against an in-memory page, simulates a few client-side navigations and a
//! goal conversion, then prints what would have been sent to the collector. No network access.

use std::sync::Arc;

use fathom_rs_sdk::platform::HeadlessEnvironment;
use fathom_rs_sdk::{use_fathom, FathomProvider, ProviderOptions};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let page = Arc::new(HeadlessEnvironment::new());
    page.set_location("https://example.com/")?;
    page.set_referrer("https://news.ycombinator.com/");

    let mount = FathomProvider::new(ProviderOptions::new("ABCDEF"))?
        .with_environment(page.clone())
        .mount()?;

    page.push_state("/pricing")?;
    page.push_state("/signup?plan=pro")?;
    page.pop_state();

    if let Some(fathom) = use_fathom() {
        fathom.goal("SIGNUP", Some(1900.0), None);
    }

    for transmission in page.transmissions() {
        println!("{:?} {}", transmission.channel, transmission.url);
    }

    mount.unmount();
    Ok(())
}
