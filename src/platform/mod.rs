pub mod environment;
pub mod headless;
pub mod runtime;
#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
pub mod web;

pub use environment::{
    default_environment, is_browser, Environment, NavigationCallback, ReadyCallback,
    VisibilityState,
};
pub use headless::{HeadlessEnvironment, PixelElement, Transmission};
#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
pub use web::WebEnvironment;
