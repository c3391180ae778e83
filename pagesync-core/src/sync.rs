//! The single authority over the shared current page.
//!
//! Three surfaces show the same document: the chunked text panel, the
//! embedded renderer and an optional external window. Each one can ask for a
//! page change. Programmatic moves scroll the text panel, and the scroll
//! produces viewport reports of its own; those are muted for a cooldown
//! after every programmatic move so they are not read back as user input.

use std::mem;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::index::{ChunkPageIndex, Direction};
use crate::search::{SearchNavigator, SearchOutcome, SearchSummary};
use crate::timer::earliest;
use crate::viewport::{Intersection, ViewportObserver};
use crate::{Chunk, ChunkId, Document, DocumentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    TextPanel,
    EmbeddedRenderer,
    ExternalWindow,
}

/// What the main view currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelMode {
    Text,
    Renderer,
}

impl PanelMode {
    pub fn surface(self) -> Surface {
        match self {
            PanelMode::Text => Surface::TextPanel,
            PanelMode::Renderer => Surface::EmbeddedRenderer,
        }
    }
}

/// Who asked for the most recent page change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Load,
    Navigation,
    Viewport,
    Search,
    Renderer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Active,
    Suppressed { until: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Next { count: u32 },
    Previous { count: u32 },
    Goto { page: u32 },
    First,
    Last,
}

/// Callbacks from the embedded page renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererEvent {
    PageChange(u32),
    DocumentLoad(u32),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("cannot display: document has no source reference")]
    MissingSource,
    #[error("renderer failed: {0}")]
    RendererFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    PageChanged { page: u32, origin: Origin },
    ScrollToChunk { chunk: ChunkId, page: u32 },
    BoundsChanged { max_page: u32 },
    PanelModeChanged(PanelMode),
    SurfaceUnavailable { surface: Surface, error: SurfaceError },
    SearchUpdated(Option<SearchSummary>),
    ObservationReset { observing: bool },
}

/// What an external surface is told when the page changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUpdate {
    pub page: u32,
    pub highlight: Vec<String>,
    pub search_text: Option<String>,
}

/// A surface living outside this process or window, reached best-effort.
pub trait ExternalSurface: Send {
    fn is_open(&mut self, now: Instant) -> bool;
    fn forward(&mut self, update: &PageUpdate, now: Instant) -> anyhow::Result<()>;
}

pub struct SyncCoordinator {
    config: SyncConfig,
    document_id: Option<DocumentId>,
    document: Option<Document>,
    renderer_total: u32,
    chunks: Vec<Chunk>,
    index: ChunkPageIndex,
    current_page: u32,
    origin: Origin,
    phase: SyncPhase,
    mode: PanelMode,
    observer: ViewportObserver,
    search: SearchNavigator,
    highlight: Vec<String>,
    renderer_fallback: Option<Instant>,
    external: Option<Box<dyn ExternalSurface>>,
    events: Arc<Mutex<Vec<SyncEvent>>>,
}

impl SyncCoordinator {
    pub fn new(config: SyncConfig) -> Self {
        let mut observer =
            ViewportObserver::new(config.visibility_threshold, config.viewport_debounce);
        observer.set_reporting(config.observe_viewport);
        Self {
            config,
            document_id: None,
            document: None,
            renderer_total: 0,
            chunks: Vec::new(),
            index: ChunkPageIndex::default(),
            current_page: 1,
            origin: Origin::Load,
            phase: SyncPhase::Active,
            mode: PanelMode::Text,
            observer,
            search: SearchNavigator::new(),
            highlight: Vec::new(),
            renderer_fallback: None,
            external: None,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn drain_events(&self) -> Vec<SyncEvent> {
        mem::take(&mut *self.events.lock())
    }

    pub fn attach_external(&mut self, surface: Box<dyn ExternalSurface>) {
        self.external = Some(surface);
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn is_suppressed(&self, now: Instant) -> bool {
        matches!(self.phase, SyncPhase::Suppressed { until } if until > now)
    }

    pub fn panel_mode(&self) -> PanelMode {
        self.mode
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn index(&self) -> &ChunkPageIndex {
        &self.index
    }

    pub fn max_page(&self) -> u32 {
        self.index.max_page().max(1)
    }

    pub fn highlight(&self) -> &[String] {
        &self.highlight
    }

    pub fn search_summary(&self) -> Option<SearchSummary> {
        self.search.summary()
    }

    pub fn search_query(&self) -> Option<&str> {
        self.search.query()
    }

    pub fn is_observing(&self) -> bool {
        self.observer.is_observing()
    }

    /// Source reference the renderer surfaces load, if the document has one.
    pub fn renderer_source(&self) -> Result<&str, SurfaceError> {
        self.document
            .as_ref()
            .and_then(Document::source)
            .ok_or(SurfaceError::MissingSource)
    }

    /// Switches to a new document. Everything tied to the previous one is
    /// dropped, including pending timers and the search session.
    pub fn begin_document(&mut self, id: DocumentId) {
        self.teardown();
        self.document_id = Some(id);
        info!(%id, "document selected");
    }

    pub fn teardown(&mut self) {
        self.document_id = None;
        self.document = None;
        self.renderer_total = 0;
        self.chunks.clear();
        self.index = ChunkPageIndex::default();
        self.current_page = 1;
        self.origin = Origin::Load;
        self.phase = SyncPhase::Active;
        self.observer.stop();
        self.search.reset();
        self.highlight.clear();
        self.renderer_fallback = None;
    }

    /// Applies document metadata. Returns false when it belongs to a
    /// document that is no longer selected.
    pub fn set_document(&mut self, document: Document, now: Instant) -> bool {
        if self.document_id != Some(document.id) {
            debug!(id = %document.id, "ignoring metadata for a stale document");
            return false;
        }
        let previous_total = self.declared_total();
        let first_metadata = self.document.is_none();
        info!(title = %document.title, total_pages = document.total_pages, "document metadata loaded");
        self.document = Some(document);
        if first_metadata || self.declared_total() != previous_total {
            self.rebuild_index(now);
        }
        true
    }

    /// Applies the chunk list. Returns false for a stale document.
    pub fn set_chunks(&mut self, document_id: DocumentId, mut chunks: Vec<Chunk>, now: Instant) -> bool {
        if self.document_id != Some(document_id) {
            debug!(id = %document_id, "ignoring chunks for a stale document");
            return false;
        }
        chunks.sort_by_key(|chunk| chunk.ordinal);
        info!(count = chunks.len(), "chunks loaded");
        self.chunks = chunks;
        self.search.reset();
        self.rebuild_index(now);
        true
    }

    /// Page count the index is built against: the renderer's count once it
    /// has loaded the document, otherwise the declared one.
    fn declared_total(&self) -> u32 {
        if self.renderer_total > 0 {
            self.renderer_total
        } else {
            self.document.as_ref().map_or(0, |doc| doc.total_pages)
        }
    }

    fn rebuild_index(&mut self, now: Instant) {
        self.index = ChunkPageIndex::build_with_density(
            &self.chunks,
            self.declared_total(),
            self.config.chunks_per_page,
        );
        self.push(SyncEvent::BoundsChanged {
            max_page: self.max_page(),
        });

        let clamped = self.index.clamp(self.current_page);
        if clamped != self.current_page {
            debug!(from = self.current_page, to = clamped, "clamping page to corrected bounds");
            self.set_page(clamped, Origin::Load, now);
        }
        self.rebuild_observer();
    }

    fn rebuild_observer(&mut self) {
        let observing = self
            .observer
            .rebuild(self.mode == PanelMode::Text, !self.chunks.is_empty());
        self.push(SyncEvent::ObservationReset { observing });
    }

    pub fn set_observation_enabled(&mut self, enabled: bool) {
        self.observer.set_reporting(enabled);
        self.rebuild_observer();
    }

    /// Explicit navigation from buttons, keys or a typed page number.
    pub fn navigate(&mut self, navigation: Navigation, now: Instant) -> u32 {
        let current = self.current_page;
        let (target, direction) = match navigation {
            Navigation::Next { count } => (current.saturating_add(count.max(1)), Direction::Forward),
            Navigation::Previous { count } => {
                (current.saturating_sub(count.max(1)), Direction::Backward)
            }
            Navigation::Goto { page } if page >= current => (page, Direction::Forward),
            Navigation::Goto { page } => (page, Direction::Backward),
            Navigation::First => (1, Direction::Forward),
            Navigation::Last => (self.max_page(), Direction::Backward),
        };

        let clamped = self.index.clamp(target);
        let target = self
            .index
            .nearest_populated(clamped, direction)
            .unwrap_or(clamped);
        if target == current {
            return current;
        }

        self.enter_suppression(now);
        self.set_page(target, Origin::Navigation, now);
        self.scroll_to_page(target);
        self.current_page
    }

    /// Feeds one intersection batch from the text panel.
    pub fn observe_viewport(&mut self, batch: &[Intersection], now: Instant) {
        let suppressed = self.is_suppressed(now);
        self.observer
            .observe(batch, &self.index, self.current_page, suppressed, now);
    }

    /// Runs a search, or advances the cursor when `query` is unchanged.
    pub fn search(&mut self, query: &str, now: Instant) -> SearchOutcome {
        let outcome = self.search.submit(query, &self.chunks);
        match &outcome {
            SearchOutcome::Jump { target, .. } => {
                self.highlight = self.search.highlight_terms();
                let page = self.index.page_of(target.chunk).unwrap_or(self.current_page);
                self.enter_suppression(now);
                self.set_page(page, Origin::Search, now);
                self.push(SyncEvent::ScrollToChunk {
                    chunk: target.chunk,
                    page,
                });
            }
            SearchOutcome::NoMatches | SearchOutcome::Cleared => {
                self.highlight.clear();
            }
        }
        self.push(SyncEvent::SearchUpdated(self.search.summary()));
        outcome
    }

    pub fn on_renderer_event(&mut self, event: RendererEvent, now: Instant) {
        match event {
            RendererEvent::PageChange(page) => {
                let page = self.index.clamp(page);
                if page == self.current_page {
                    return;
                }
                self.enter_suppression(now);
                self.set_page(page, Origin::Renderer, now);
                if let Some(populated) = self
                    .index
                    .nearest_populated_either(page, Direction::Backward)
                {
                    self.scroll_to_page(populated);
                }
            }
            RendererEvent::DocumentLoad(total) => {
                self.renderer_fallback = None;
                if total == 0 || total == self.renderer_total {
                    return;
                }
                let previous = self.declared_total();
                self.renderer_total = total;
                info!(total, "renderer reported page count");
                if self.declared_total() != previous {
                    self.rebuild_index(now);
                }
            }
            RendererEvent::Error(reason) => {
                warn!(%reason, "embedded renderer failed");
                self.push(SyncEvent::SurfaceUnavailable {
                    surface: Surface::EmbeddedRenderer,
                    error: SurfaceError::RendererFailed(reason),
                });
                if self.mode == PanelMode::Renderer {
                    self.renderer_fallback = Some(now + self.config.renderer_fallback);
                }
            }
        }
    }

    pub fn set_panel_mode(&mut self, mode: PanelMode, now: Instant) {
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        self.renderer_fallback = None;
        debug!(?mode, "panel mode changed");
        self.push(SyncEvent::PanelModeChanged(mode));

        if mode == PanelMode::Renderer && self.document.is_some() {
            if let Err(error) = self.renderer_source() {
                warn!(%error, "renderer surface unavailable");
                self.push(SyncEvent::SurfaceUnavailable {
                    surface: Surface::EmbeddedRenderer,
                    error,
                });
            }
        }

        self.rebuild_observer();
        if mode == PanelMode::Text {
            if let Some(page) = self
                .index
                .nearest_populated_either(self.current_page, Direction::Backward)
            {
                self.enter_suppression(now);
                self.scroll_to_page(page);
            }
        }
    }

    /// Services every deadline that is due at `now`.
    pub fn tick(&mut self, now: Instant) {
        if let SyncPhase::Suppressed { until } = self.phase {
            if until <= now {
                self.phase = SyncPhase::Active;
                debug!("viewport reports re-enabled");
            }
        }

        let suppressed = self.is_suppressed(now);
        if let Some(page) = self.observer.poll(suppressed, now) {
            self.set_page(page, Origin::Viewport, now);
        }

        if let Some(due) = self.renderer_fallback {
            if due <= now {
                self.renderer_fallback = None;
                info!("falling back to text panel after renderer failure");
                self.set_panel_mode(PanelMode::Text, now);
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let suppression = match self.phase {
            SyncPhase::Suppressed { until } => Some(until),
            SyncPhase::Active => None,
        };
        earliest([suppression, self.observer.deadline(), self.renderer_fallback])
    }

    fn enter_suppression(&mut self, now: Instant) {
        if !self.is_suppressed(now) {
            debug!("suppressing viewport reports");
        }
        self.phase = SyncPhase::Suppressed {
            until: now + self.config.cooldown,
        };
        self.observer.cancel_pending();
    }

    fn set_page(&mut self, page: u32, origin: Origin, now: Instant) -> bool {
        let page = self.index.clamp(page);
        if page == self.current_page {
            return false;
        }
        self.current_page = page;
        self.origin = origin;
        debug!(page, ?origin, "current page changed");
        self.push(SyncEvent::PageChanged { page, origin });
        self.forward_external(now);
        true
    }

    fn scroll_to_page(&mut self, page: u32) {
        if let Some(chunk) = self.index.first_chunk(page) {
            let chunk = chunk.id;
            self.push(SyncEvent::ScrollToChunk { chunk, page });
        }
    }

    fn forward_external(&mut self, now: Instant) {
        let Some(external) = self.external.as_mut() else {
            return;
        };
        if !external.is_open(now) {
            return;
        }
        let update = PageUpdate {
            page: self.current_page,
            highlight: self.highlight.clone(),
            search_text: self.search.query().map(str::to_string),
        };
        if let Err(err) = external.forward(&update, now) {
            warn!(?err, page = update.page, "failed to forward page to external window");
        }
    }

    fn push(&self, event: SyncEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{document_id_for_source, plain_chunks};

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn loaded(count: usize, total_pages: u32) -> (SyncCoordinator, Vec<Chunk>, Instant) {
        let now = Instant::now();
        let id = document_id_for_source("sync.pdf");
        let chunks = plain_chunks(id, count);
        let mut sync = SyncCoordinator::new(SyncConfig::default());
        sync.begin_document(id);
        sync.set_chunks(id, chunks.clone(), now);
        sync.set_document(
            Document::new(id, "Sync", total_pages).with_source("sync.pdf"),
            now,
        );
        sync.drain_events();
        (sync, chunks, now)
    }

    fn scrolls(events: &[SyncEvent]) -> Vec<ChunkId> {
        events
            .iter()
            .filter_map(|event| match event {
                SyncEvent::ScrollToChunk { chunk, .. } => Some(*chunk),
                _ => None,
            })
            .collect()
    }

    #[derive(Clone, Default)]
    struct RecordingSurface {
        open: Arc<Mutex<bool>>,
        updates: Arc<Mutex<Vec<PageUpdate>>>,
    }

    impl ExternalSurface for RecordingSurface {
        fn is_open(&mut self, _now: Instant) -> bool {
            *self.open.lock()
        }

        fn forward(&mut self, update: &PageUpdate, _now: Instant) -> anyhow::Result<()> {
            self.updates.lock().push(update.clone());
            Ok(())
        }
    }

    #[test]
    fn next_page_suppresses_viewport_until_cooldown_elapses() {
        let (mut sync, chunks, start) = loaded(9, 0);
        assert!(sync.is_observing());

        assert_eq!(sync.navigate(Navigation::Next { count: 1 }, start), 2);
        assert!(sync.is_suppressed(start));
        let events = sync.drain_events();
        assert_eq!(scrolls(&events), vec![chunks[3].id]);

        sync.observe_viewport(&[Intersection::new(chunks[6].id, 1.0)], start + ms(50));
        sync.tick(start + ms(200));
        assert_eq!(sync.current_page(), 2);

        sync.tick(start + ms(360));
        assert_eq!(sync.phase(), SyncPhase::Active);
        assert_eq!(sync.current_page(), 2);

        sync.observe_viewport(
            &[
                Intersection::new(chunks[6].id, 0.0),
                Intersection::new(chunks[8].id, 1.0),
            ],
            start + ms(400),
        );
        sync.tick(start + ms(450));
        assert_eq!(sync.current_page(), 2);
        sync.tick(start + ms(500));
        assert_eq!(sync.current_page(), 3);
        assert_eq!(sync.origin(), Origin::Viewport);
        assert!(scrolls(&sync.drain_events()).is_empty());
    }

    #[test]
    fn out_of_range_requests_clamp_to_bounds() {
        let (mut sync, _, now) = loaded(10, 5);
        assert_eq!(sync.navigate(Navigation::Goto { page: 99 }, now), 5);
        assert_eq!(sync.navigate(Navigation::Goto { page: 0 }, now), 1);
        assert_eq!(sync.navigate(Navigation::Previous { count: 3 }, now), 1);
        assert_eq!(sync.navigate(Navigation::Last, now), 5);
        assert_eq!(sync.navigate(Navigation::Next { count: 1 }, now), 5);
    }

    #[test]
    fn navigation_skips_pages_without_chunks() {
        let now = Instant::now();
        let id = document_id_for_source("sparse.pdf");
        let mut chunks = plain_chunks(id, 3);
        chunks[0].page = Some(1);
        chunks[1].page = Some(4);
        chunks[2].page = Some(7);
        let mut sync = SyncCoordinator::new(SyncConfig::default());
        sync.begin_document(id);
        sync.set_chunks(id, chunks.clone(), now);
        sync.set_document(Document::new(id, "Sparse", 8), now);

        assert_eq!(sync.navigate(Navigation::Next { count: 1 }, now), 4);
        assert_eq!(sync.navigate(Navigation::Next { count: 1 }, now), 7);
        assert_eq!(sync.navigate(Navigation::Previous { count: 1 }, now), 4);
        assert_eq!(sync.navigate(Navigation::Goto { page: 5 }, now), 7);
        assert_eq!(sync.navigate(Navigation::Next { count: 1 }, now), 8);
    }

    #[test]
    fn late_page_count_corrects_bounds_and_clamps() {
        let now = Instant::now();
        let id = document_id_for_source("late.pdf");
        let mut sync = SyncCoordinator::new(SyncConfig::default());
        sync.begin_document(id);
        sync.set_chunks(id, plain_chunks(id, 7), now);
        assert_eq!(sync.max_page(), 3);
        assert_eq!(sync.navigate(Navigation::Last, now), 3);
        sync.drain_events();

        sync.set_document(Document::new(id, "Late", 2), now);
        assert_eq!(sync.max_page(), 2);
        assert_eq!(sync.current_page(), 2);
        assert!(sync.drain_events().contains(&SyncEvent::PageChanged {
            page: 2,
            origin: Origin::Load
        }));
    }

    #[test]
    fn stale_results_are_ignored_after_switching_documents() {
        let now = Instant::now();
        let first = document_id_for_source("first.pdf");
        let second = document_id_for_source("second.pdf");
        let mut sync = SyncCoordinator::new(SyncConfig::default());

        sync.begin_document(first);
        sync.set_chunks(first, plain_chunks(first, 9), now);
        sync.navigate(Navigation::Last, now);
        sync.search("chunk", now);

        sync.begin_document(second);
        assert_eq!(sync.current_page(), 1);
        assert!(sync.search_summary().is_none());
        assert!(!sync.is_suppressed(now));
        assert!(!sync.set_chunks(first, plain_chunks(first, 9), now));
        assert!(sync.chunks().is_empty());
        assert!(sync.set_chunks(second, plain_chunks(second, 2), now));
    }

    #[test]
    fn switching_documents_drops_pending_viewport_request() {
        let (mut sync, chunks, now) = loaded(9, 0);
        sync.observe_viewport(&[Intersection::new(chunks[8].id, 1.0)], now);
        assert_eq!(sync.next_deadline(), Some(now + ms(100)));

        sync.begin_document(document_id_for_source("other.pdf"));
        assert_eq!(sync.next_deadline(), None);
        sync.tick(now + ms(150));
        assert_eq!(sync.current_page(), 1);
        assert!(!sync
            .drain_events()
            .iter()
            .any(|event| matches!(event, SyncEvent::PageChanged { .. })));
    }

    #[test]
    fn search_scrolls_to_exact_match() {
        let (mut sync, chunks, now) = loaded(9, 0);
        match sync.search("chunk 7", now) {
            SearchOutcome::Jump { target, .. } => assert_eq!(target.chunk, chunks[7].id),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(sync.current_page(), 3);
        assert_eq!(sync.origin(), Origin::Search);
        assert!(sync.is_suppressed(now));
        assert_eq!(scrolls(&sync.drain_events()), vec![chunks[7].id]);
        assert_eq!(sync.highlight(), ["chunk", "7"]);
    }

    #[test]
    fn search_without_matches_keeps_page() {
        let (mut sync, _, now) = loaded(9, 0);
        sync.navigate(Navigation::Goto { page: 2 }, now);
        sync.drain_events();

        assert_eq!(sync.search("absent", now), SearchOutcome::NoMatches);
        assert_eq!(sync.current_page(), 2);
        let events = sync.drain_events();
        assert!(scrolls(&events).is_empty());
        assert!(!events
            .iter()
            .any(|event| matches!(event, SyncEvent::PageChanged { .. })));
    }

    #[test]
    fn renderer_page_change_moves_text_panel() {
        let (mut sync, chunks, now) = loaded(10, 5);
        sync.on_renderer_event(RendererEvent::PageChange(4), now);
        assert_eq!(sync.current_page(), 4);
        assert_eq!(sync.origin(), Origin::Renderer);
        assert!(sync.is_suppressed(now));
        assert_eq!(scrolls(&sync.drain_events()), vec![chunks[6].id]);

        sync.on_renderer_event(RendererEvent::PageChange(4), now + ms(10));
        assert!(sync.drain_events().is_empty());
    }

    #[test]
    fn renderer_failure_falls_back_to_text_panel() {
        let (mut sync, _, now) = loaded(4, 2);
        sync.set_panel_mode(PanelMode::Renderer, now);
        assert!(!sync.is_observing());

        sync.on_renderer_event(RendererEvent::Error("corrupt xref".into()), now);
        sync.tick(now + ms(1000));
        assert_eq!(sync.panel_mode(), PanelMode::Renderer);
        sync.tick(now + ms(1500));
        assert_eq!(sync.panel_mode(), PanelMode::Text);
        assert!(sync.is_observing());

        let events = sync.drain_events();
        assert!(events.contains(&SyncEvent::SurfaceUnavailable {
            surface: Surface::EmbeddedRenderer,
            error: SurfaceError::RendererFailed("corrupt xref".into()),
        }));
        assert!(events.contains(&SyncEvent::PanelModeChanged(PanelMode::Text)));
    }

    #[test]
    fn renderer_without_source_reports_cannot_display() {
        let now = Instant::now();
        let id = document_id_for_source("nosource.pdf");
        let mut sync = SyncCoordinator::new(SyncConfig::default());
        sync.begin_document(id);
        sync.set_document(Document::new(id, "No source", 3), now);
        sync.drain_events();

        sync.set_panel_mode(PanelMode::Renderer, now);
        assert_eq!(sync.renderer_source(), Err(SurfaceError::MissingSource));
        assert!(sync.drain_events().contains(&SyncEvent::SurfaceUnavailable {
            surface: Surface::EmbeddedRenderer,
            error: SurfaceError::MissingSource,
        }));
    }

    #[test]
    fn renderer_page_count_rebuilds_index() {
        let (mut sync, _, now) = loaded(7, 0);
        assert_eq!(sync.max_page(), 3);
        sync.on_renderer_event(RendererEvent::DocumentLoad(7), now);
        assert_eq!(sync.max_page(), 7);
        assert_eq!(sync.index().pages(), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn page_changes_are_forwarded_while_external_window_is_open() {
        let (mut sync, _, now) = loaded(9, 0);
        let surface = RecordingSurface::default();
        sync.attach_external(Box::new(surface.clone()));

        sync.navigate(Navigation::Next { count: 1 }, now);
        assert!(surface.updates.lock().is_empty());

        *surface.open.lock() = true;
        sync.search("chunk 8", now);
        let updates = surface.updates.lock().clone();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].page, 3);
        assert_eq!(updates[0].highlight, vec!["chunk", "8"]);
        assert_eq!(updates[0].search_text.as_deref(), Some("chunk 8"));
    }

    #[test]
    fn viewport_reports_ignored_in_renderer_mode() {
        let (mut sync, chunks, now) = loaded(9, 0);
        sync.set_panel_mode(PanelMode::Renderer, now);
        sync.observe_viewport(&[Intersection::new(chunks[8].id, 1.0)], now + ms(500));
        sync.tick(now + ms(1000));
        assert_eq!(sync.current_page(), 1);
    }

    #[test]
    fn next_deadline_tracks_pending_timers() {
        let (mut sync, _, now) = loaded(9, 0);
        assert_eq!(sync.next_deadline(), None);
        sync.navigate(Navigation::Next { count: 1 }, now);
        assert_eq!(sync.next_deadline(), Some(now + ms(350)));
        sync.tick(now + ms(350));
        assert_eq!(sync.next_deadline(), None);
    }
}
