//! Browser environment backed by `web-sys`.

use js_sys::{Function, Reflect};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    AddEventListenerOptions, Document, Event, History, HtmlImageElement, HtmlLinkElement, Window,
};

use crate::platform::environment::{
    Environment, NavigationCallback, ReadyCallback, VisibilityState,
};
use crate::tracker::error::{environment_error, internal_error, network_error, TrackerResult};

/// DOM event dispatched on `window` after every intercepted history mutation.
pub const STATECHANGE_EVENT: &str = "_fathomStatechange";

/// Every `WebEnvironment` drives the one `window.history`.
const WINDOW_HISTORY_ID: u64 = 0;

const CANONICAL_SELECTOR: &str = "link[rel=\"canonical\"][href]";

/// The live page. Stateless: every call reads the current `window`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebEnvironment;

impl WebEnvironment {
    pub fn new() -> Self {
        Self
    }
}

fn window() -> TrackerResult<Window> {
    web_sys::window().ok_or_else(|| environment_error("window not available"))
}

fn document() -> TrackerResult<Document> {
    window()?
        .document()
        .ok_or_else(|| environment_error("document not available"))
}

fn js_error(err: JsValue) -> crate::tracker::error::TrackerError {
    if let Some(message) = err.as_string() {
        return internal_error(message);
    }
    if let Some(error) = err.dyn_ref::<js_sys::Error>() {
        return internal_error(String::from(error.message()));
    }
    internal_error(format!("{err:?}"))
}

fn dispatch_statechange(window: &Window) {
    match Event::new(STATECHANGE_EVENT) {
        Ok(event) => {
            if let Err(err) = window.dispatch_event(&event) {
                log::debug!("failed to dispatch {STATECHANGE_EVENT}: {err:?}");
            }
        }
        Err(err) => log::debug!("failed to create {STATECHANGE_EVENT}: {err:?}"),
    }
}

/// Replaces `history[method]` with a wrapper that calls the original, then notifies.
fn wrap_history_method(
    window: &Window,
    history: &History,
    method: &str,
    on_navigate: NavigationCallback,
) -> TrackerResult<()> {
    let original = Reflect::get(history, &JsValue::from_str(method))
        .map_err(js_error)?
        .dyn_into::<Function>()
        .map_err(|_| environment_error(format!("history.{method} is not a function")))?;

    let target: JsValue = history.clone().into();
    let window = window.clone();
    let wrapper = Closure::wrap(Box::new(
        move |state: JsValue, unused: JsValue, url: JsValue| -> Result<JsValue, JsValue> {
            let output = original.call3(&target, &state, &unused, &url)?;
            on_navigate();
            dispatch_statechange(&window);
            Ok(output)
        },
    )
        as Box<dyn FnMut(JsValue, JsValue, JsValue) -> Result<JsValue, JsValue>>);

    Reflect::set(history, &JsValue::from_str(method), wrapper.as_ref()).map_err(js_error)?;
    // The patch is permanent for the life of the page.
    wrapper.forget();
    Ok(())
}

impl Environment for WebEnvironment {
    fn is_browsing(&self) -> bool {
        web_sys::window()
            .and_then(|window| window.document())
            .is_some()
    }

    fn user_agent(&self) -> String {
        web_sys::window()
            .and_then(|window| window.navigator().user_agent().ok())
            .unwrap_or_default()
    }

    fn visibility_state(&self) -> VisibilityState {
        // Read reflectively: `web_sys::VisibilityState` has no `prerender` variant.
        document()
            .ok()
            .and_then(|document| Reflect::get(&document, &JsValue::from_str("visibilityState")).ok())
            .and_then(|value| value.as_string())
            .map(|value| VisibilityState::parse(&value))
            .unwrap_or(VisibilityState::Unknown)
    }

    fn has_body(&self) -> bool {
        document().map(|document| document.body().is_some()).unwrap_or(false)
    }

    fn on_dom_ready(&self, callback: ReadyCallback) -> TrackerResult<()> {
        let document = document()?;
        let options = AddEventListenerOptions::new();
        options.set_once(true);
        let listener = Closure::once_into_js(move |_event: Event| callback());
        document
            .add_event_listener_with_callback_and_add_event_listener_options(
                "DOMContentLoaded",
                listener.unchecked_ref(),
                &options,
            )
            .map_err(js_error)
    }

    fn location_href(&self) -> TrackerResult<String> {
        window()?.location().href().map_err(js_error)
    }

    fn canonical_href(&self) -> Option<String> {
        document()
            .ok()?
            .query_selector(CANONICAL_SELECTOR)
            .ok()
            .flatten()?
            .dyn_into::<HtmlLinkElement>()
            .ok()
            .map(|link| link.href())
    }

    fn referrer(&self) -> String {
        document().map(|document| document.referrer()).unwrap_or_default()
    }

    fn timezone(&self) -> String {
        let format = js_sys::Intl::DateTimeFormat::new(&js_sys::Array::new(), &js_sys::Object::new());
        Reflect::get(&format.resolved_options(), &JsValue::from_str("timeZone"))
            .ok()
            .and_then(|value| value.as_string())
            .unwrap_or_default()
    }

    fn send_beacon(&self, url: &str) -> TrackerResult<()> {
        let queued = window()?.navigator().send_beacon(url).map_err(js_error)?;
        if !queued {
            return Err(network_error("beacon was not queued by the browser"));
        }
        Ok(())
    }

    fn insert_pixel(&self, url: &str) -> TrackerResult<()> {
        let document = document()?;
        let body = document
            .body()
            .ok_or_else(|| environment_error("document body not available"))?;

        let image = document
            .create_element("img")
            .map_err(js_error)?
            .dyn_into::<HtmlImageElement>()
            .map_err(|_| internal_error("img element has wrong type"))?;
        image.set_attribute("alt", "").map_err(js_error)?;
        image.set_attribute("aria-hidden", "true").map_err(js_error)?;
        let style = image.style();
        style.set_property("position", "absolute").map_err(js_error)?;
        style.set_property("top", "-100px").map_err(js_error)?;
        style.set_property("left", "-100px").map_err(js_error)?;

        // One self-freeing closure serves both outcomes; only one of them ever fires.
        let settled = image.clone();
        let cleanup = Closure::once_into_js(move |_event: Event| {
            settled.set_onload(None);
            settled.set_onerror(None);
            settled.remove();
        });
        image.set_onload(Some(cleanup.unchecked_ref()));
        image.set_onerror(Some(cleanup.unchecked_ref()));
        image.set_src(url);

        body.append_child(&image).map_err(js_error)?;
        Ok(())
    }

    fn history_id(&self) -> u64 {
        WINDOW_HISTORY_ID
    }

    fn intercept_history(&self, on_navigate: NavigationCallback) -> TrackerResult<bool> {
        let Some(window) = web_sys::window() else {
            return Ok(false);
        };
        let history = window.history().map_err(js_error)?;

        wrap_history_method(&window, &history, "pushState", on_navigate.clone())?;
        wrap_history_method(&window, &history, "replaceState", on_navigate.clone())?;

        // Back/forward navigation has no method to wrap; the native event covers it.
        let popstate_window = window.clone();
        let on_pop = Closure::wrap(Box::new(move |_event: Event| {
            on_navigate();
            dispatch_statechange(&popstate_window);
        }) as Box<dyn FnMut(Event)>);
        window
            .add_event_listener_with_callback("popstate", on_pop.as_ref().unchecked_ref())
            .map_err(js_error)?;
        on_pop.forget();

        Ok(true)
    }
}
