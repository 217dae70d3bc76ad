//! Extension catalog: fetched off the UI thread, materialized on it.
//!
//! A worker thread performs the blocking HTTP request and pushes one message
//! per catalog entry onto a [`UiQueue`]. The UI thread calls
//! [`ExtensionsCoordinator::poll_tick`] on a short repeating timer; each tick
//! builds at most one list item. The catalog itself is only ever touched by
//! the UI thread.

use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::Settings;
use crate::queue::UiQueue;

/// Extension name to metadata, in the order the server listed them.
pub type Catalog = serde_json::Map<String, Value>;

/// Outcome of a single fetch.
pub type FetchResult = Result<Catalog, FetchError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, TLS, timeout or body read failure.
    Transport(String),
    /// The server answered with something other than 200.
    Status(u16),
    /// The body was not a JSON object.
    Malformed(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(msg) => write!(f, "network error: {}", msg),
            FetchError::Status(code) => write!(f, "server returned HTTP {}", code),
            FetchError::Malformed(msg) => write!(f, "malformed extension list: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// Blocking source of the raw catalog document.
pub trait CatalogSource: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Fetches the catalog over HTTP(S). No retries.
pub struct HttpCatalogSource {
    agent: ureq::Agent,
}

impl HttpCatalogSource {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl CatalogSource for HttpCatalogSource {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut response = self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::StatusCode(code) => FetchError::Status(code),
            other => FetchError::Transport(other.to_string()),
        })?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(FetchError::Status(status));
        }

        response
            .body_mut()
            .read_to_string()
            .map_err(|e| FetchError::Transport(e.to_string()))
    }
}

/// Parse the catalog document. The top level must be a JSON object.
pub fn parse_catalog(body: &str) -> FetchResult {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(FetchError::Malformed(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(FetchError::Malformed(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub fn fetch_catalog(source: &dyn CatalogSource, url: &str) -> FetchResult {
    parse_catalog(&source.fetch(url)?)
}

/// The sidebar list the catalog is rendered into.
pub trait ExtensionListView {
    /// Remove every rendered extension item.
    fn clear(&mut self);
    /// Hide the placeholder and show the list container.
    fn show_list(&mut self);
    /// Hide the list container and show the failure placeholder.
    fn show_placeholder(&mut self);
    /// Build an item for one extension and append it to the list.
    fn append(&mut self, name: &str, meta: &Value);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogDisplay {
    List,
    Placeholder,
}

#[derive(Debug)]
enum FetchMessage {
    /// Carries the whole catalog; the entries that follow only drive
    /// rendering.
    Loaded { fetch_id: u64, catalog: Catalog },
    Failed { fetch_id: u64, reason: String },
    Entry { fetch_id: u64, name: String, meta: Value },
}

/// Serializes fetches: at most one holder at a time, waiters sleep on a
/// condition variable until the current fetch signals completion.
#[derive(Default)]
struct FetchGate {
    fetching: Mutex<bool>,
    done: Condvar,
}

impl FetchGate {
    fn acquire(&self) -> FetchPermit<'_> {
        let mut fetching = self.fetching.lock();
        while *fetching {
            self.done.wait(&mut fetching);
        }
        *fetching = true;
        FetchPermit { gate: self }
    }

    fn is_fetching(&self) -> bool {
        *self.fetching.lock()
    }
}

struct FetchPermit<'a> {
    gate: &'a FetchGate,
}

impl Drop for FetchPermit<'_> {
    fn drop(&mut self) {
        *self.gate.fetching.lock() = false;
        self.gate.done.notify_all();
    }
}

pub struct ExtensionsCoordinator {
    list_url: String,
    offline: bool,
    poll_interval: Duration,
    source: Arc<dyn CatalogSource>,
    gate: Arc<FetchGate>,
    queue: UiQueue<FetchMessage>,
    next_fetch_id: AtomicU64,
    catalog: Catalog,
    rendered: usize,
    /// Fetch whose entries are currently being appended to the view.
    rendering: Option<u64>,
    display: Option<CatalogDisplay>,
}

impl ExtensionsCoordinator {
    pub fn new(settings: &Settings) -> Self {
        let timeout = Duration::from_secs(settings.extensions.request_timeout_secs);
        Self::with_source(settings, Arc::new(HttpCatalogSource::new(timeout)))
    }

    pub fn with_source(settings: &Settings, source: Arc<dyn CatalogSource>) -> Self {
        Self {
            list_url: settings.extensions.list_url(),
            offline: settings.offline_mode,
            poll_interval: Duration::from_millis(settings.extensions.poll_interval_ms.max(1)),
            source,
            gate: Arc::new(FetchGate::default()),
            queue: UiQueue::new(),
            next_fetch_id: AtomicU64::new(1),
            catalog: Catalog::new(),
            rendered: 0,
            rendering: None,
            display: None,
        }
    }

    /// Clear the rendered list, drop anything still queued from earlier
    /// fetches, and start a new fetch.
    ///
    /// Returns the worker's handle, or `None` in offline mode.
    pub fn refresh(&mut self, view: &mut dyn ExtensionListView) -> Option<JoinHandle<()>> {
        if self.offline {
            return None;
        }
        view.clear();
        let dropped = self.queue.clear();
        if dropped > 0 {
            log::debug!("Discarded {} queued extension messages", dropped);
        }
        self.rendered = 0;
        self.rendering = None;
        self.spawn_fetch()
    }

    /// Start a fetch on a worker thread. If another fetch is in flight the
    /// worker waits for it to finish before issuing its own request.
    pub fn spawn_fetch(&self) -> Option<JoinHandle<()>> {
        if self.offline {
            return None;
        }

        let fetch_id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let source = Arc::clone(&self.source);
        let gate = Arc::clone(&self.gate);
        let tx = self.queue.sender();
        let url = self.list_url.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("extensions-fetch-{}", fetch_id))
            .spawn(move || {
                let _permit = gate.acquire();
                log::debug!("Fetching extension list #{} from {}", fetch_id, url);

                match fetch_catalog(source.as_ref(), &url) {
                    Ok(catalog) => {
                        log::info!(
                            "Fetched {} extensions (fetch #{})",
                            catalog.len(),
                            fetch_id
                        );
                        let _ = tx.send(FetchMessage::Loaded {
                            fetch_id,
                            catalog: catalog.clone(),
                        });
                        for (name, meta) in catalog {
                            let _ = tx.send(FetchMessage::Entry {
                                fetch_id,
                                name,
                                meta,
                            });
                        }
                    }
                    Err(e) => {
                        if let FetchError::Malformed(_) = e {
                            log::warn!("Extension list #{} could not be parsed: {}", fetch_id, e);
                        } else {
                            log::warn!("Extension list #{} fetch failed: {}", fetch_id, e);
                        }
                        let _ = tx.send(FetchMessage::Failed {
                            fetch_id,
                            reason: e.to_string(),
                        });
                    }
                }
            });

        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Failed to spawn extension fetch worker: {}", e);
                None
            }
        }
    }

    /// One UI-thread tick. Applies any pending status change, then builds at
    /// most one list item. Returns `true` if an item was appended.
    pub fn poll_tick(&mut self, view: &mut dyn ExtensionListView) -> bool {
        while let Some(message) = self.queue.pop() {
            match message {
                FetchMessage::Loaded { fetch_id, catalog } => {
                    log::debug!(
                        "Rendering extension list #{} ({} entries)",
                        fetch_id,
                        catalog.len()
                    );
                    view.clear();
                    self.rendered = 0;
                    self.rendering = Some(fetch_id);
                    // An empty catalog leaves the current container visible.
                    if !catalog.is_empty() {
                        view.show_list();
                        self.display = Some(CatalogDisplay::List);
                    }
                    self.catalog = catalog;
                }
                FetchMessage::Failed { fetch_id, reason } => {
                    log::debug!("Showing extensions placeholder after #{}: {}", fetch_id, reason);
                    self.rendering = None;
                    view.show_placeholder();
                    self.display = Some(CatalogDisplay::Placeholder);
                }
                FetchMessage::Entry {
                    fetch_id,
                    name,
                    meta,
                } => {
                    if self.rendering != Some(fetch_id) {
                        log::debug!("Skipping stale extension {} from fetch #{}", name, fetch_id);
                        continue;
                    }
                    view.append(&name, &meta);
                    self.rendered += 1;
                    return true;
                }
            }
        }
        false
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn rendered_count(&self) -> usize {
        self.rendered
    }

    pub fn display(&self) -> Option<CatalogDisplay> {
        self.display
    }

    /// Messages waiting for the next ticks.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_fetching(&self) -> bool {
        self.gate.is_fetching()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn list_url(&self) -> &str {
        &self.list_url
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingView {
        items: Vec<String>,
        list_visible: bool,
        placeholder_visible: bool,
        clears: usize,
    }

    impl ExtensionListView for RecordingView {
        fn clear(&mut self) {
            self.items.clear();
            self.clears += 1;
        }

        fn show_list(&mut self) {
            self.list_visible = true;
            self.placeholder_visible = false;
        }

        fn show_placeholder(&mut self) {
            self.list_visible = false;
            self.placeholder_visible = true;
        }

        fn append(&mut self, name: &str, _meta: &Value) {
            self.items.push(name.to_string());
        }
    }

    /// Returns `{"ext-N": {...}}` for the N-th call and tracks concurrency.
    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl CatalogSource for CountingSource {
        fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(format!(r#"{{"ext-{}": {{"call": {}}}}}"#, call, call))
        }
    }

    struct FixedSource(Result<String, FetchError>);

    impl CatalogSource for FixedSource {
        fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            self.0.clone()
        }
    }

    fn online_settings(url: &str) -> Settings {
        let mut settings = Settings::default();
        settings.extensions.repo_url = url.to_string();
        settings
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn drain(coordinator: &mut ExtensionsCoordinator, view: &mut RecordingView) -> usize {
        let mut ticks = 0;
        while coordinator.pending() > 0 {
            coordinator.poll_tick(view);
            ticks += 1;
        }
        ticks
    }

    /// Serve a single request with the given status and body.
    fn serve_once(status: u16, body: &'static str) -> String {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        std::thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let response = tiny_http::Response::from_string(body)
                    .with_status_code(tiny_http::StatusCode(status));
                let _ = request.respond(response);
            }
        });
        format!("http://127.0.0.1:{}/", port)
    }

    #[test]
    fn parse_catalog_keeps_server_order() {
        let catalog = parse_catalog(r#"{"zeta": {}, "alpha": {}, "mid": {}}"#).unwrap();
        let names: Vec<&String> = catalog.keys().collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn parse_catalog_rejects_non_objects() {
        assert!(matches!(
            parse_catalog("[1, 2]"),
            Err(FetchError::Malformed(msg)) if msg.contains("an array")
        ));
        assert!(matches!(parse_catalog("{oops"), Err(FetchError::Malformed(_))));
    }

    #[test]
    fn offline_mode_short_circuits_everything() {
        let mut settings = online_settings("http://127.0.0.1:9/");
        settings.offline_mode = true;
        let source = Arc::new(CountingSource::default());
        let mut coordinator = ExtensionsCoordinator::with_source(&settings, source.clone());
        let mut view = RecordingView::default();

        assert!(coordinator.refresh(&mut view).is_none());
        assert!(coordinator.spawn_fetch().is_none());
        assert_eq!(view.clears, 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert!(!coordinator.poll_tick(&mut view));
    }

    #[test]
    fn one_item_per_tick_in_enqueue_order() {
        let body = r#"{"a": {}, "b": {}, "c": {}, "d": {}, "e": {}}"#.to_string();
        let settings = online_settings("http://unused/");
        let mut coordinator =
            ExtensionsCoordinator::with_source(&settings, Arc::new(FixedSource(Ok(body))));
        let mut view = RecordingView::default();

        coordinator.refresh(&mut view).unwrap().join().unwrap();

        for expected in 1..=5 {
            assert!(coordinator.poll_tick(&mut view));
            assert_eq!(view.items.len(), expected);
        }
        assert!(!coordinator.poll_tick(&mut view));
        assert_eq!(view.items, ["a", "b", "c", "d", "e"]);
        assert_eq!(coordinator.rendered_count(), 5);
        assert_eq!(coordinator.catalog().len(), 5);
    }

    #[test]
    fn concurrent_refreshes_never_overlap() {
        init_logging();
        let source = Arc::new(CountingSource {
            delay: Duration::from_millis(25),
            ..Default::default()
        });
        let settings = online_settings("http://unused/");
        let mut coordinator = ExtensionsCoordinator::with_source(&settings, source.clone());
        let mut view = RecordingView::default();

        let mut handles = vec![coordinator.refresh(&mut view).unwrap()];
        for _ in 0..3 {
            handles.push(coordinator.spawn_fetch().unwrap());
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_fetching());

        drain(&mut coordinator, &mut view);
        let names: Vec<&String> = coordinator.catalog().keys().collect();
        assert_eq!(names, ["ext-4"]);
        assert_eq!(view.items, ["ext-4"]);
    }

    #[test]
    fn malformed_body_takes_failure_branch() {
        let settings = online_settings("http://unused/");
        let mut coordinator = ExtensionsCoordinator::with_source(
            &settings,
            Arc::new(FixedSource(Ok("<html>".to_string()))),
        );
        let mut view = RecordingView::default();

        coordinator.refresh(&mut view).unwrap().join().unwrap();
        assert!(!coordinator.poll_tick(&mut view));

        assert!(view.placeholder_visible);
        assert!(!view.list_visible);
        assert_eq!(coordinator.display(), Some(CatalogDisplay::Placeholder));
        assert!(coordinator.catalog().is_empty());
    }

    #[test]
    fn failure_keeps_previous_catalog() {
        let settings = online_settings("http://unused/");
        let mut coordinator = ExtensionsCoordinator::with_source(
            &settings,
            Arc::new(FixedSource(Ok(r#"{"one": {}}"#.to_string()))),
        );
        let mut view = RecordingView::default();
        coordinator.refresh(&mut view).unwrap().join().unwrap();
        drain(&mut coordinator, &mut view);
        assert_eq!(coordinator.catalog().len(), 1);

        coordinator.source = Arc::new(FixedSource(Err(FetchError::Status(503))));
        coordinator.refresh(&mut view).unwrap().join().unwrap();
        drain(&mut coordinator, &mut view);

        assert!(view.items.is_empty());
        assert!(view.placeholder_visible);
        assert!(coordinator.catalog().contains_key("one"));
    }

    #[test]
    fn refresh_discards_entries_not_yet_rendered() {
        let settings = online_settings("http://unused/");
        let mut coordinator = ExtensionsCoordinator::with_source(
            &settings,
            Arc::new(FixedSource(Ok(r#"{"a": {}, "b": {}, "c": {}}"#.to_string()))),
        );
        let mut view = RecordingView::default();
        coordinator.refresh(&mut view).unwrap().join().unwrap();
        assert!(coordinator.poll_tick(&mut view));
        assert_eq!(view.items, ["a"]);

        coordinator.source = Arc::new(FixedSource(Err(FetchError::Status(500))));
        coordinator.refresh(&mut view).unwrap().join().unwrap();
        drain(&mut coordinator, &mut view);

        assert!(view.items.is_empty(), "stale items: {:?}", view.items);
        assert!(view.placeholder_visible);
        assert_eq!(coordinator.rendered_count(), 0);
        let names: Vec<&String> = coordinator.catalog().keys().collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn entries_from_an_older_fetch_are_skipped() {
        let mut coordinator = ExtensionsCoordinator::with_source(
            &online_settings("http://unused/"),
            Arc::new(FixedSource(Ok("{}".to_string()))),
        );
        let mut view = RecordingView::default();
        let tx = coordinator.queue.sender();
        tx.send(FetchMessage::Loaded {
            fetch_id: 2,
            catalog: parse_catalog(r#"{"new": {}}"#).unwrap(),
        })
        .unwrap();
        tx.send(FetchMessage::Entry {
            fetch_id: 1,
            name: "old".to_string(),
            meta: Value::Null,
        })
        .unwrap();
        tx.send(FetchMessage::Entry {
            fetch_id: 2,
            name: "new".to_string(),
            meta: Value::Null,
        })
        .unwrap();

        assert!(coordinator.poll_tick(&mut view));
        assert!(!coordinator.poll_tick(&mut view));
        assert_eq!(view.items, ["new"]);
    }

    #[test]
    fn empty_catalog_keeps_current_container() {
        let settings = online_settings("http://unused/");
        let mut coordinator = ExtensionsCoordinator::with_source(
            &settings,
            Arc::new(FixedSource(Ok("{}".to_string()))),
        );
        let mut view = RecordingView::default();
        coordinator.refresh(&mut view).unwrap().join().unwrap();
        drain(&mut coordinator, &mut view);
        assert_eq!(coordinator.display(), None);
        assert!(!view.list_visible && !view.placeholder_visible);

        coordinator.source = Arc::new(FixedSource(Err(FetchError::Status(502))));
        coordinator.refresh(&mut view).unwrap().join().unwrap();
        drain(&mut coordinator, &mut view);
        assert_eq!(coordinator.display(), Some(CatalogDisplay::Placeholder));

        coordinator.source = Arc::new(FixedSource(Ok("{}".to_string())));
        coordinator.refresh(&mut view).unwrap().join().unwrap();
        drain(&mut coordinator, &mut view);
        assert_eq!(coordinator.display(), Some(CatalogDisplay::Placeholder));
        assert!(view.placeholder_visible);
        assert!(view.items.is_empty());
        assert!(coordinator.catalog().is_empty());
    }

    #[test]
    fn http_success_renders_across_two_ticks() {
        init_logging();
        let url = serve_once(
            200,
            r#"{"foo": {"description": "Foo ext"}, "bar": {"description": "Bar ext"}}"#,
        );
        let settings = online_settings(&url);
        let mut coordinator = ExtensionsCoordinator::new(&settings);
        let mut view = RecordingView::default();

        coordinator.refresh(&mut view).unwrap().join().unwrap();

        assert!(coordinator.poll_tick(&mut view));
        assert!(view.list_visible);
        assert!(!view.placeholder_visible);
        assert_eq!(view.items, ["foo"]);

        assert!(coordinator.poll_tick(&mut view));
        assert_eq!(view.items, ["foo", "bar"]);
        assert_eq!(coordinator.catalog().len(), 2);
        assert_eq!(
            coordinator.catalog()["foo"]["description"],
            Value::from("Foo ext")
        );
        assert!(!coordinator.poll_tick(&mut view));
    }

    #[test]
    fn http_500_shows_placeholder() {
        let url = serve_once(500, "internal error");
        let settings = online_settings(&url);
        let mut coordinator = ExtensionsCoordinator::new(&settings);
        let mut view = RecordingView::default();

        coordinator.refresh(&mut view).unwrap().join().unwrap();
        assert!(!coordinator.poll_tick(&mut view));

        assert!(coordinator.catalog().is_empty());
        assert!(view.placeholder_visible);
        assert!(!view.list_visible);
        assert!(view.items.is_empty());
    }

    #[test]
    fn http_source_reports_status_and_transport_errors() {
        let url = serve_once(404, "missing");
        let source = HttpCatalogSource::new(Duration::from_secs(5));
        assert_eq!(
            source.fetch(&format!("{}extensions.json", url)),
            Err(FetchError::Status(404))
        );

        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let result = source.fetch(&format!("http://127.0.0.1:{}/extensions.json", port));
        assert!(matches!(result, Err(FetchError::Transport(_))));
    }
}
