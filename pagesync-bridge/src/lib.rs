//! Bridge to an externally opened renderer window.
//!
//! The bridge holds at most one window reference and never trusts it: the
//! window can be closed by the user at any time, so liveness is checked
//! before every use and polled in between. Messages are fire-and-forget.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use pagesync_core::{ExternalSurface, PageUpdate};

pub mod local;
pub mod message;
pub mod viewer;

pub use local::{LocalWindowHost, ViewerEndpoint};
pub use message::{decode, encode, AppOrigin, WireMessage};
pub use viewer::ViewerParams;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("popup was blocked; open {fallback} in place instead")]
    PopupBlocked { fallback: Url },
    #[error("document has no source reference for the external viewer")]
    MissingSource,
    #[error("external window is closed")]
    WindowClosed,
    #[error("origin {actual} rejected, expected {expected}")]
    OriginMismatch { expected: String, actual: String },
    #[error("{0} has no usable origin")]
    OpaqueOrigin(String),
    #[error("invalid viewer url")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to encode cross-window message")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode cross-window message")]
    Decode(#[source] serde_json::Error),
}

/// One-way message channel into another window or process.
pub trait MessageChannel: Send {
    fn send(&self, message: &WireMessage) -> Result<(), BridgeError>;
}

/// A window this process opened but does not own.
pub trait ExternalWindow: Send {
    fn is_closed(&self) -> bool;
    fn focus(&self) -> Result<(), BridgeError>;
    fn channel(&self) -> &dyn MessageChannel;
}

pub trait WindowHost: Send {
    fn open(&mut self, url: &Url, name: &str) -> Result<Box<dyn ExternalWindow>, BridgeError>;
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub origin: String,
    pub viewer_url: String,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "liveness_poll_ms")]
    pub liveness_poll: Duration,
    /// Delay after a send before liveness is re-checked for diagnostics.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "send_grace_ms")]
    pub send_grace: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            viewer_url: "http://localhost:8080/viewer.html".to_string(),
            liveness_poll: Duration::from_millis(1000),
            send_grace: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    Opened { url: Url },
    Reused { page: u32 },
}

pub struct ExternalWindowBridge {
    host: Box<dyn WindowHost>,
    viewer_url: Url,
    liveness_poll: Duration,
    send_grace: Duration,
    window_name: String,
    window: Option<Box<dyn ExternalWindow>>,
    next_poll: Option<Instant>,
    grace_check: Option<(Instant, u32)>,
    opened: usize,
}

impl ExternalWindowBridge {
    /// Fails when the viewer is not served from the application origin, since
    /// the window would otherwise receive pages and search text cross-origin.
    pub fn new(host: Box<dyn WindowHost>, config: &BridgeConfig) -> Result<Self, BridgeError> {
        let origin = AppOrigin::parse(&config.origin)?;
        let viewer_url = Url::parse(&config.viewer_url)?;
        let viewer_origin = AppOrigin::of(&viewer_url)?;
        if viewer_origin != origin {
            return Err(BridgeError::OriginMismatch {
                expected: origin.to_string(),
                actual: viewer_origin.to_string(),
            });
        }
        Ok(Self {
            host,
            viewer_url,
            liveness_poll: config.liveness_poll,
            send_grace: config.send_grace,
            window_name: format!("pagesync-viewer-{}", Uuid::new_v4().simple()),
            window: None,
            next_poll: None,
            grace_check: None,
            opened: 0,
        })
    }

    /// Windows opened over the bridge's lifetime.
    pub fn opened_count(&self) -> usize {
        self.opened
    }

    pub fn has_window(&self) -> bool {
        self.window.is_some()
    }

    /// Checks the stored reference, clearing it if the window has closed.
    pub fn is_live(&mut self, _now: Instant) -> bool {
        match self.window.as_ref() {
            Some(window) if window.is_closed() => {
                self.forget("window closed");
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Sends the page to the live window, or opens a new one when there is
    /// none. A blocked popup comes back as [`BridgeError::PopupBlocked`]
    /// carrying the url to load in place.
    pub fn open_or_reuse(
        &mut self,
        params: &ViewerParams,
        now: Instant,
    ) -> Result<BridgeOutcome, BridgeError> {
        if self.is_live(now) {
            let message = WireMessage::change_page(
                params.page,
                &params.highlight,
                params.search.as_deref(),
            );
            match self.deliver(&message, now) {
                Ok(()) => {
                    if let Some(window) = self.window.as_ref() {
                        if let Err(err) = window.focus() {
                            debug!(%err, "failed to focus external window");
                        }
                    }
                    return Ok(BridgeOutcome::Reused { page: params.page });
                }
                Err(BridgeError::WindowClosed) => {
                    debug!("external window closed before reuse, opening a new one");
                }
                Err(err) => return Err(err),
            }
        }

        if params.source.trim().is_empty() {
            return Err(BridgeError::MissingSource);
        }
        let url = params.to_url(&self.viewer_url);
        match self.host.open(&url, &self.window_name) {
            Ok(window) => {
                info!(%url, "opened external window");
                self.window = Some(window);
                self.next_poll = Some(now + self.liveness_poll);
                self.opened += 1;
                Ok(BridgeOutcome::Opened { url })
            }
            Err(err) => {
                warn!(%err, "failed to open external window");
                Err(err)
            }
        }
    }

    /// Forwards a page change. Returns `Ok(false)` when no window is open.
    pub fn send_page(&mut self, update: &PageUpdate, now: Instant) -> Result<bool, BridgeError> {
        if !self.is_live(now) {
            return Ok(false);
        }
        let message =
            WireMessage::change_page(update.page, &update.highlight, update.search_text.as_deref());
        self.deliver(&message, now)?;
        Ok(true)
    }

    pub fn tick(&mut self, now: Instant) {
        if let Some(due) = self.next_poll {
            if due <= now && self.is_live(now) {
                self.next_poll = Some(now + self.liveness_poll);
            }
        }

        if let Some((due, page)) = self.grace_check {
            if due <= now {
                self.grace_check = None;
                if self.is_live(now) {
                    debug!(page, "external window still open after send");
                } else {
                    warn!(page, "external window closed right after send, page may be lost");
                }
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let grace = self.grace_check.map(|(due, _)| due);
        match (self.next_poll, grace) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn deliver(&mut self, message: &WireMessage, now: Instant) -> Result<(), BridgeError> {
        let Some(window) = self.window.as_ref() else {
            return Err(BridgeError::WindowClosed);
        };
        match window.channel().send(message) {
            Ok(()) => {
                debug!(page = message.page(), "sent changePage to external window");
                self.grace_check = Some((now + self.send_grace, message.page()));
                Ok(())
            }
            Err(err) => {
                if matches!(err, BridgeError::WindowClosed) {
                    self.forget("window closed during send");
                }
                Err(err)
            }
        }
    }

    fn forget(&mut self, reason: &str) {
        info!(reason, "external window reference cleared");
        self.window = None;
        self.next_poll = None;
        self.grace_check = None;
    }
}

/// Cloneable handle so the coordinator and the UI share one bridge.
#[derive(Clone)]
pub struct SharedBridge(Arc<Mutex<ExternalWindowBridge>>);

impl SharedBridge {
    pub fn new(bridge: ExternalWindowBridge) -> Self {
        Self(Arc::new(Mutex::new(bridge)))
    }

    pub fn lock(&self) -> MutexGuard<'_, ExternalWindowBridge> {
        self.0.lock()
    }
}

impl ExternalSurface for SharedBridge {
    fn is_open(&mut self, now: Instant) -> bool {
        self.0.lock().is_live(now)
    }

    fn forward(&mut self, update: &PageUpdate, now: Instant) -> anyhow::Result<()> {
        self.0.lock().send_page(update, now)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagesync_core::{
        document_id_for_source, Chunk, Document, Navigation, SyncConfig, SyncCoordinator,
    };
    use tokio::sync::mpsc::UnboundedReceiver;

    fn bridge() -> (ExternalWindowBridge, UnboundedReceiver<ViewerEndpoint>) {
        bridge_with(BridgeConfig::default())
    }

    fn bridge_with(
        config: BridgeConfig,
    ) -> (ExternalWindowBridge, UnboundedReceiver<ViewerEndpoint>) {
        let origin = AppOrigin::parse(&config.origin).unwrap();
        let (host, endpoints) = LocalWindowHost::new(origin);
        (
            ExternalWindowBridge::new(Box::new(host), &config).unwrap(),
            endpoints,
        )
    }

    /// Reports itself open but refuses every message, as a window closed
    /// between the liveness check and the send would.
    struct StaleWindow;

    impl MessageChannel for StaleWindow {
        fn send(&self, _message: &WireMessage) -> Result<(), BridgeError> {
            Err(BridgeError::WindowClosed)
        }
    }

    impl ExternalWindow for StaleWindow {
        fn is_closed(&self) -> bool {
            false
        }

        fn focus(&self) -> Result<(), BridgeError> {
            Ok(())
        }

        fn channel(&self) -> &dyn MessageChannel {
            self
        }
    }

    struct StaleHost;

    impl WindowHost for StaleHost {
        fn open(
            &mut self,
            _url: &Url,
            _name: &str,
        ) -> Result<Box<dyn ExternalWindow>, BridgeError> {
            Ok(Box::new(StaleWindow))
        }
    }

    fn params(page: u32) -> ViewerParams {
        ViewerParams {
            title: Some("Annual report".into()),
            ..ViewerParams::new("annual.pdf", page)
        }
    }

    #[test]
    fn live_window_is_reused_instead_of_reopened() {
        let (mut bridge, mut endpoints) = bridge();
        let now = Instant::now();

        let opened = bridge.open_or_reuse(&params(3), now).unwrap();
        assert!(matches!(opened, BridgeOutcome::Opened { .. }));
        let mut viewer = endpoints.try_recv().unwrap();
        assert_eq!(viewer.params().page, 3);
        assert_eq!(viewer.params().title.as_deref(), Some("Annual report"));

        let reused = bridge.open_or_reuse(&params(5), now).unwrap();
        assert_eq!(reused, BridgeOutcome::Reused { page: 5 });
        assert!(endpoints.try_recv().is_err());
        assert_eq!(viewer.try_recv(), Some(WireMessage::change_page(5, &[], None)));
        assert_eq!(viewer.try_recv(), None);
        assert_eq!(viewer.focus_requests(), 1);
        assert_eq!(bridge.opened_count(), 1);
    }

    #[test]
    fn closed_window_is_replaced_by_exactly_one_new_window() {
        let (mut bridge, mut endpoints) = bridge();
        let now = Instant::now();

        bridge.open_or_reuse(&params(1), now).unwrap();
        drop(endpoints.try_recv().unwrap());
        assert!(!bridge.is_live(now));
        assert!(!bridge.has_window());

        let outcome = bridge.open_or_reuse(&params(4), now).unwrap();
        assert!(matches!(outcome, BridgeOutcome::Opened { .. }));
        let viewer = endpoints.try_recv().unwrap();
        assert_eq!(viewer.params().page, 4);
        assert!(endpoints.try_recv().is_err());
        assert_eq!(bridge.opened_count(), 2);
    }

    #[test]
    fn liveness_poll_clears_closed_window() {
        let (mut bridge, mut endpoints) = bridge();
        let now = Instant::now();
        bridge.open_or_reuse(&params(1), now).unwrap();
        assert_eq!(bridge.next_deadline(), Some(now + Duration::from_secs(1)));

        let viewer = endpoints.try_recv().unwrap();
        bridge.tick(now + Duration::from_secs(1));
        assert!(bridge.has_window());
        assert_eq!(bridge.next_deadline(), Some(now + Duration::from_secs(2)));

        drop(viewer);
        bridge.tick(now + Duration::from_secs(2));
        assert!(!bridge.has_window());
        assert_eq!(bridge.next_deadline(), None);
    }

    #[test]
    fn window_closed_during_reuse_is_replaced() {
        let mut bridge =
            ExternalWindowBridge::new(Box::new(StaleHost), &BridgeConfig::default()).unwrap();
        let now = Instant::now();

        bridge.open_or_reuse(&params(1), now).unwrap();
        let outcome = bridge.open_or_reuse(&params(2), now).unwrap();
        assert!(matches!(outcome, BridgeOutcome::Opened { .. }));
        assert_eq!(bridge.opened_count(), 2);
        assert!(bridge.has_window());
    }

    #[test]
    fn viewer_on_foreign_origin_is_refused() {
        let config = BridgeConfig {
            viewer_url: "https://evil.example/viewer.html".to_string(),
            ..BridgeConfig::default()
        };
        let (host, mut endpoints) = LocalWindowHost::new(AppOrigin::parse(&config.origin).unwrap());
        match ExternalWindowBridge::new(Box::new(host), &config) {
            Err(BridgeError::OriginMismatch { expected, actual }) => {
                assert_eq!(expected, "http://localhost:8080");
                assert_eq!(actual, "https://evil.example");
            }
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("bridge accepted a cross-origin viewer"),
        }
        assert!(endpoints.try_recv().is_err());
    }

    #[test]
    fn grace_check_after_send_only_observes() {
        let (mut bridge, mut endpoints) = bridge_with(BridgeConfig {
            liveness_poll: Duration::from_secs(10),
            ..BridgeConfig::default()
        });
        let now = Instant::now();
        bridge.open_or_reuse(&params(1), now).unwrap();
        let mut viewer = endpoints.try_recv().unwrap();
        let update = PageUpdate {
            page: 2,
            highlight: Vec::new(),
            search_text: None,
        };

        assert!(bridge.send_page(&update, now).unwrap());
        assert_eq!(bridge.next_deadline(), Some(now + Duration::from_millis(500)));
        bridge.tick(now + Duration::from_millis(500));
        assert!(bridge.has_window());
        assert_eq!(viewer.try_recv().map(|m| m.page()), Some(2));
        assert_eq!(viewer.try_recv(), None);
        assert_eq!(bridge.next_deadline(), Some(now + Duration::from_secs(10)));

        let later = now + Duration::from_millis(600);
        assert!(bridge.send_page(&update, later).unwrap());
        assert_eq!(bridge.next_deadline(), Some(later + Duration::from_millis(500)));
        drop(viewer);
        bridge.tick(later + Duration::from_millis(500));
        assert!(!bridge.has_window());
        assert_eq!(bridge.next_deadline(), None);
        assert!(endpoints.try_recv().is_err());
        assert_eq!(bridge.opened_count(), 1);
    }

    #[test]
    fn blocked_popup_offers_in_place_fallback() {
        let config = BridgeConfig::default();
        let (mut host, _endpoints) = LocalWindowHost::new(AppOrigin::parse(&config.origin).unwrap());
        host.block_popups(true);
        let mut bridge = ExternalWindowBridge::new(Box::new(host), &config).unwrap();

        match bridge.open_or_reuse(&params(6), Instant::now()) {
            Err(BridgeError::PopupBlocked { fallback }) => {
                assert_eq!(fallback.path(), "/viewer.html");
                assert!(fallback.query().unwrap().contains("page=6"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!bridge.has_window());
    }

    #[test]
    fn missing_source_is_reported() {
        let (mut bridge, _endpoints) = bridge();
        assert!(matches!(
            bridge.open_or_reuse(&ViewerParams::new("  ", 1), Instant::now()),
            Err(BridgeError::MissingSource)
        ));
    }

    #[test]
    fn send_without_window_is_a_no_op() {
        let (mut bridge, _endpoints) = bridge();
        let update = PageUpdate {
            page: 2,
            highlight: Vec::new(),
            search_text: None,
        };
        assert!(!bridge.send_page(&update, Instant::now()).unwrap());
    }

    #[test]
    fn coordinator_forwards_page_changes_through_shared_bridge() {
        let (bridge, mut endpoints) = bridge();
        let shared = SharedBridge::new(bridge);
        let now = Instant::now();

        let id = document_id_for_source("annual.pdf");
        let chunks: Vec<Chunk> = (0..6)
            .map(|ordinal| Chunk::new(id, ordinal, format!("section {}", ordinal)))
            .collect();
        let mut sync = SyncCoordinator::new(SyncConfig::default());
        sync.attach_external(Box::new(shared.clone()));
        sync.begin_document(id);
        sync.set_chunks(id, chunks, now);
        sync.set_document(Document::new(id, "Annual", 3).with_source("annual.pdf"), now);

        shared.lock().open_or_reuse(&params(1), now).unwrap();
        let mut viewer = endpoints.try_recv().unwrap();

        sync.navigate(Navigation::Next { count: 1 }, now);
        assert_eq!(viewer.try_recv().map(|m| m.page()), Some(2));
        assert_eq!(viewer.try_recv(), None);

        drop(viewer);
        sync.navigate(Navigation::Next { count: 1 }, now);
        assert_eq!(sync.current_page(), 3);
        assert!(!shared.lock().has_window());
    }

    #[tokio::test]
    async fn endpoint_handler_receives_messages() {
        let (mut bridge, mut endpoints) = bridge();
        let now = Instant::now();
        bridge.open_or_reuse(&params(1), now).unwrap();
        let viewer = endpoints.try_recv().unwrap();

        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = viewer.on_receive(move |params, message| {
            let _ = seen_tx.send((params.source.clone(), message.page()));
        });

        let update = PageUpdate {
            page: 9,
            highlight: vec!["revenue".into()],
            search_text: Some("revenue".into()),
        };
        assert!(bridge.send_page(&update, now).unwrap());
        assert_eq!(seen_rx.recv().await, Some(("annual.pdf".to_string(), 9)));

        handle.abort();
        let _ = handle.await;
        assert!(!bridge.is_live(now));
    }
}
