//! Scroll-position page tracking for the text panel.
//!
//! The panel reports how much of each chunk element is inside the viewport.
//! The observer keeps the latest ratio per chunk, picks the most visible one
//! and turns its page into a debounced page-change request.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::index::ChunkPageIndex;
use crate::timer::Debouncer;
use crate::ChunkId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub chunk: ChunkId,
    /// Visible fraction of the chunk element, `0.0..=1.0`.
    pub ratio: f32,
}

impl Intersection {
    pub fn new(chunk: ChunkId, ratio: f32) -> Self {
        Self {
            chunk,
            ratio: if ratio.is_finite() {
                ratio.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug)]
pub struct ViewportObserver {
    threshold: f32,
    ratios: HashMap<ChunkId, f32>,
    debouncer: Debouncer<u32>,
    reporting: bool,
    observing: bool,
    generation: u64,
}

impl ViewportObserver {
    pub fn new(threshold: f32, debounce: Duration) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
            ratios: HashMap::new(),
            debouncer: Debouncer::new(debounce),
            reporting: true,
            observing: false,
            generation: 0,
        }
    }

    /// Tears observation down and starts it again when the text panel is
    /// active, chunks are loaded and reporting is enabled.
    pub fn rebuild(&mut self, text_panel_active: bool, has_chunks: bool) -> bool {
        self.stop();
        self.generation += 1;
        if text_panel_active && has_chunks && self.reporting {
            self.observing = true;
            debug!(generation = self.generation, "viewport observation started");
        }
        self.observing
    }

    pub fn stop(&mut self) {
        if self.observing {
            debug!(generation = self.generation, "viewport observation stopped");
        }
        self.observing = false;
        self.ratios.clear();
        self.debouncer.cancel();
    }

    pub fn set_reporting(&mut self, enabled: bool) {
        self.reporting = enabled;
        if !enabled {
            self.stop();
        }
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Records one observation batch.
    ///
    /// While `suppressed`, ratios are still recorded so the table matches the
    /// panel, but no request is scheduled and any pending one is dropped.
    pub fn observe(
        &mut self,
        batch: &[Intersection],
        index: &ChunkPageIndex,
        displayed_page: u32,
        suppressed: bool,
        now: Instant,
    ) {
        if !self.observing {
            return;
        }

        for entry in batch {
            if entry.ratio > 0.0 {
                self.ratios.insert(entry.chunk, entry.ratio);
            } else {
                self.ratios.remove(&entry.chunk);
            }
        }

        if suppressed {
            if self.debouncer.cancel().is_some() {
                trace!("dropped pending viewport request while suppressed");
            }
            return;
        }

        let Some(page) = self.most_visible_page(index) else {
            return;
        };

        if page == displayed_page {
            self.debouncer.cancel();
        } else {
            trace!(page, displayed_page, "viewport page candidate");
            self.debouncer.push(page, now);
        }
    }

    /// Emits the debounced page once its delay has elapsed.
    pub fn poll(&mut self, suppressed: bool, now: Instant) -> Option<u32> {
        if suppressed {
            self.debouncer.cancel();
            return None;
        }
        self.debouncer.poll(now)
    }

    pub fn cancel_pending(&mut self) {
        self.debouncer.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    fn most_visible_page(&self, index: &ChunkPageIndex) -> Option<u32> {
        self.ratios
            .iter()
            .filter(|(_, ratio)| **ratio >= self.threshold)
            .filter_map(|(chunk, ratio)| index.page_of(*chunk).map(|page| (page, *ratio)))
            .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            .map(|(page, _)| page)
    }
}
