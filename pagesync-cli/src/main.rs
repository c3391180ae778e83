use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, Event};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use pagesync_bridge::{
    AppOrigin, BridgeConfig, BridgeError, BridgeOutcome, ExternalWindowBridge, LocalWindowHost,
    SharedBridge, ViewerEndpoint, ViewerParams,
};
use pagesync_core::{
    load_toml, ChunkSource, JsonChunkSource, Navigation, PanelMode, RendererEvent,
    SearchOutcome, SearchSummary, SyncConfig, SyncCoordinator, SyncEvent,
};
use pagesync_tty::{draw_panel, write_status_line, EventMapper, PanelLine, TextPanel, UiEvent};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "pagesync",
    version,
    about = "Chunked text reader that keeps every page view on the same page"
)]
struct Args {
    /// Chunk export (JSON) to open
    chunks: PathBuf,

    /// Page to open on (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<u32>,

    /// Config file; defaults to config.toml in the platform config directory
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Application origin for cross-window messages
    #[arg(long = "origin")]
    origin: Option<String>,

    /// Do not follow the text panel scroll position
    #[arg(long = "no-observe")]
    no_observe: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AppConfig {
    sync: SyncConfig,
    bridge: BridgeConfig,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

type ViewerTasks = Arc<Mutex<Vec<JoinHandle<()>>>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "pagesync", "pagesync")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let mut config: AppConfig = load_toml(&config_path)
        .with_context(|| format!("failed to load config {:?}", config_path))?;
    if let Some(origin) = &args.origin {
        config.bridge.origin = origin.clone();
    }
    if args.no_observe {
        config.sync.observe_viewport = false;
    }

    let source = JsonChunkSource::open(&args.chunks)?;
    let document_id = source.document_id();

    let origin = AppOrigin::parse(&config.bridge.origin)
        .with_context(|| format!("invalid application origin {:?}", config.bridge.origin))?;
    let (host, endpoints) = LocalWindowHost::new(origin);
    let bridge = ExternalWindowBridge::new(Box::new(host), &config.bridge)
        .context("failed to set up the external viewer bridge")?;
    let bridge = SharedBridge::new(bridge);
    let viewers = spawn_viewers(endpoints);

    let (columns, rows) = terminal::size()?;
    let mut app = App {
        sync: SyncCoordinator::new(config.sync),
        bridge: bridge.clone(),
        viewers,
        panel: TextPanel::new(usize::from(columns), panel_height(rows)),
        mapper: EventMapper::new(),
        base_dir: args
            .chunks
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
        message: None,
    };
    app.sync.attach_external(Box::new(bridge));
    app.sync.begin_document(document_id);

    let (document, chunks) = tokio::join!(
        source.document(document_id),
        source.chunks(document_id)
    );
    let now = Instant::now();
    app.sync.set_chunks(document_id, chunks?, now);
    app.sync.set_document(document?, now);
    if let Some(page) = args.page {
        app.sync.navigate(Navigation::Goto { page }, now);
    }

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide, Clear(ClearType::All))?;
    let result = app.run(&mut stdout);
    crossterm::execute!(stdout, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    app.close_viewers();
    result
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

struct App {
    sync: SyncCoordinator,
    bridge: SharedBridge,
    viewers: ViewerTasks,
    panel: TextPanel,
    mapper: EventMapper,
    base_dir: PathBuf,
    message: Option<String>,
}

impl App {
    fn run(&mut self, stdout: &mut io::Stdout) -> Result<()> {
        let mut dirty = true;
        loop {
            let now = Instant::now();
            self.sync.tick(now);
            self.bridge.lock().tick(now);
            if self.apply_events(now) {
                dirty = true;
            }

            if dirty {
                self.redraw(stdout)?;
                dirty = false;
            }

            if event::poll(Duration::from_millis(50))? {
                let ev = event::read()?;
                if let Event::Resize(columns, rows) = ev {
                    if self.panel.resize(usize::from(columns), panel_height(rows)) {
                        self.panel.layout(self.sync.index());
                    }
                    crossterm::execute!(stdout, Clear(ClearType::All))?;
                    dirty = true;
                    continue;
                }
                let ui_event = self.mapper.map_event(ev);
                match self.handle_event(ui_event, Instant::now())? {
                    LoopAction::ContinueRedraw => dirty = true,
                    LoopAction::Continue => {}
                    LoopAction::Quit => break,
                }
            }
        }
        Ok(())
    }

    /// Applies queued coordinator events to the terminal surfaces. Returns
    /// whether anything was applied.
    fn apply_events(&mut self, now: Instant) -> bool {
        let events = self.sync.drain_events();
        for event in &events {
            match event {
                SyncEvent::BoundsChanged { .. } => self.panel.layout(self.sync.index()),
                SyncEvent::ScrollToChunk { chunk, .. } => {
                    if self.panel.scroll_to_chunk(*chunk) {
                        let batch = self.panel.intersections();
                        self.sync.observe_viewport(&batch, now);
                    }
                }
                SyncEvent::SurfaceUnavailable { error, .. } => {
                    self.message = Some(error.to_string());
                }
                SyncEvent::PanelModeChanged(PanelMode::Text) => {
                    let batch = self.panel.intersections();
                    self.sync.observe_viewport(&batch, now);
                }
                SyncEvent::PageChanged { .. }
                | SyncEvent::PanelModeChanged(_)
                | SyncEvent::SearchUpdated(_)
                | SyncEvent::ObservationReset { .. } => {}
            }
        }
        !events.is_empty()
    }

    fn handle_event(&mut self, event: UiEvent, now: Instant) -> Result<LoopAction> {
        match event {
            UiEvent::Navigate(navigation) => {
                if self.sync.panel_mode() == PanelMode::Renderer {
                    let page = renderer_target(
                        navigation,
                        self.sync.current_page(),
                        self.sync.max_page(),
                    );
                    self.sync
                        .on_renderer_event(RendererEvent::PageChange(page), now);
                } else {
                    self.sync.navigate(navigation, now);
                }
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::Scroll { delta } => {
                if self.sync.panel_mode() == PanelMode::Text && self.panel.scroll_by(delta) {
                    let batch = self.panel.intersections();
                    self.sync.observe_viewport(&batch, now);
                    return Ok(LoopAction::ContinueRedraw);
                }
                Ok(LoopAction::Continue)
            }
            UiEvent::OpenExternal => {
                self.open_external(now);
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::CloseExternal => {
                let closed = self.close_viewers();
                self.message = Some(if closed > 0 {
                    "external window closed".to_string()
                } else {
                    "no external window open".to_string()
                });
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::ToggleRenderer => {
                self.message = None;
                match self.sync.panel_mode() {
                    PanelMode::Text => {
                        self.sync.set_panel_mode(PanelMode::Renderer, now);
                        self.load_renderer(now);
                    }
                    PanelMode::Renderer => self.sync.set_panel_mode(PanelMode::Text, now),
                }
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::BeginSearch | UiEvent::SearchQueryChanged { .. } => {
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::SearchSubmit { query } => {
                self.run_search(&query, now);
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::SearchCancel => {
                self.sync.search("", now);
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::RepeatSearch => {
                match self.sync.search_query().map(str::to_string) {
                    Some(query) => self.run_search(&query, now),
                    None => self.message = Some("no active search".to_string()),
                }
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::Quit => Ok(LoopAction::Quit),
            UiEvent::None => Ok(LoopAction::ContinueRedraw),
        }
    }

    fn run_search(&mut self, query: &str, now: Instant) {
        self.message = match self.sync.search(query, now) {
            SearchOutcome::NoMatches => Some(format!("no matches for {:?}", query.trim())),
            SearchOutcome::Jump { .. } | SearchOutcome::Cleared => None,
        };
    }

    fn open_external(&mut self, now: Instant) {
        let source = match self.sync.renderer_source() {
            Ok(source) => source.to_string(),
            Err(err) => {
                self.message = Some(err.to_string());
                return;
            }
        };
        let params = ViewerParams {
            title: self.sync.document().map(|doc| doc.title.clone()),
            highlight: self.sync.highlight().to_vec(),
            search: self.sync.search_query().map(str::to_string),
            ..ViewerParams::new(source, self.sync.current_page())
        };

        let result = self.bridge.lock().open_or_reuse(&params, now);
        self.message = Some(match result {
            Ok(BridgeOutcome::Opened { url }) => format!("opened viewer at {}", url),
            Ok(BridgeOutcome::Reused { page }) => format!("viewer moved to page {}", page),
            Err(BridgeError::PopupBlocked { fallback }) => {
                warn!(%fallback, "popup blocked, showing renderer in place");
                self.sync.set_panel_mode(PanelMode::Renderer, now);
                self.load_renderer(now);
                format!("popup blocked; showing {} in place", fallback)
            }
            Err(err) => {
                warn!(%err, "external window unavailable");
                err.to_string()
            }
        });
    }

    /// Stands in for the embedded renderer's load callback.
    fn load_renderer(&mut self, now: Instant) {
        let Ok(source) = self.sync.renderer_source() else {
            return;
        };
        if source.contains("://") {
            return;
        }
        let path = self.base_dir.join(source);
        if !path.exists() {
            self.sync.on_renderer_event(
                RendererEvent::Error(format!("source file {:?} not found", path)),
                now,
            );
        } else if let Some(total) = self.sync.document().map(|doc| doc.total_pages) {
            self.sync
                .on_renderer_event(RendererEvent::DocumentLoad(total), now);
        }
    }

    /// Aborts viewer tasks, which closes their windows. Returns how many
    /// were running.
    fn close_viewers(&self) -> usize {
        let mut tasks = self.viewers.lock();
        let running = tasks.iter().filter(|task| !task.is_finished()).count();
        for task in tasks.drain(..) {
            task.abort();
        }
        running
    }

    fn redraw(&mut self, stdout: &mut io::Stdout) -> Result<()> {
        let rows = self.panel.height() as u16;
        match self.sync.panel_mode() {
            PanelMode::Text => {
                draw_panel(stdout, self.panel.visible_lines(), rows, self.sync.highlight())?
            }
            PanelMode::Renderer => {
                let card = renderer_card(&self.sync);
                draw_panel(stdout, &card, rows, &[])?
            }
        }

        let external = self.bridge.lock().has_window();
        let status = combine_status(
            format_status(&self.sync, external),
            self.mapper
                .pending_input()
                .or_else(|| self.message.clone())
                .as_deref(),
        );
        crossterm::execute!(
            stdout,
            cursor::MoveTo(0, rows),
            Clear(ClearType::CurrentLine)
        )?;
        write_status_line(stdout, &status)?;
        Ok(())
    }
}

fn spawn_viewers(mut endpoints: UnboundedReceiver<ViewerEndpoint>) -> ViewerTasks {
    let tasks: ViewerTasks = Arc::default();
    let registry = Arc::clone(&tasks);
    tokio::spawn(async move {
        while let Some(endpoint) = endpoints.recv().await {
            info!(
                window = endpoint.name(),
                source = %endpoint.params().source,
                page = endpoint.params().page,
                "viewer window attached"
            );
            let handle = endpoint.on_receive(|params, message| {
                info!(source = %params.source, page = message.page(), "viewer changed page");
            });
            registry.lock().push(handle);
        }
    });
    tasks
}

fn panel_height(rows: u16) -> usize {
    usize::from(rows.saturating_sub(1)).max(1)
}

/// Page the embedded renderer would land on for a navigation key. The
/// renderer has no notion of empty pages, so nothing is skipped.
fn renderer_target(navigation: Navigation, current: u32, max_page: u32) -> u32 {
    let target = match navigation {
        Navigation::Next { count } => current.saturating_add(count.max(1)),
        Navigation::Previous { count } => current.saturating_sub(count.max(1)),
        Navigation::Goto { page } => page,
        Navigation::First => 1,
        Navigation::Last => max_page,
    };
    target.clamp(1, max_page.max(1))
}

fn renderer_card(sync: &SyncCoordinator) -> Vec<PanelLine> {
    let mut lines = vec![PanelLine::body("[embedded renderer]", None), PanelLine::blank()];
    match sync.renderer_source() {
        Ok(source) => {
            lines.push(PanelLine::body(format!("source: {}", source), None));
            lines.push(PanelLine::body(
                format!("page {} of {}", sync.current_page(), sync.max_page()),
                None,
            ));
            if !sync.highlight().is_empty() {
                lines.push(PanelLine::body(
                    format!("highlight: {}", sync.highlight().join(", ")),
                    None,
                ));
            }
        }
        Err(err) => lines.push(PanelLine::body(err.to_string(), None)),
    }
    lines
}

fn format_status(sync: &SyncCoordinator, external: bool) -> String {
    let title = sync
        .document()
        .map(|doc| doc.title.as_str())
        .unwrap_or("<loading>");
    let mode = match sync.panel_mode() {
        PanelMode::Text => "text",
        PanelMode::Renderer => "renderer",
    };
    let mut status = format!(
        "{} | page {}/{} | {}",
        title,
        sync.current_page(),
        sync.max_page(),
        mode
    );
    if external {
        status.push_str(" | viewer open");
    }
    if let Some(summary) = sync.search_summary() {
        status.push_str(" | ");
        status.push_str(&format_search(&summary));
    }
    status
}

fn format_search(summary: &SearchSummary) -> String {
    let mut text = format!("/{}", summary.query);
    if summary.total == 0 {
        text.push_str(" (no matches)");
    } else if let Some(index) = summary.current_index {
        text.push_str(&format!(" ({}/{})", index + 1, summary.total));
    } else {
        text.push_str(&format!(" ({} matches)", summary.total));
    }
    text
}

fn combine_status(mut base: String, extra: Option<&str>) -> String {
    if let Some(extra) = extra.filter(|s| !s.is_empty()) {
        base.push_str(" | ");
        base.push_str(extra);
    }
    base
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pagesync.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
