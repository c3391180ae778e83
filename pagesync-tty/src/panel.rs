//! Scrollable text panel showing chunks grouped under page headers.

use std::collections::HashSet;

use pagesync_core::{ChunkId, ChunkPageIndex, Intersection};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    PageHeader(u32),
    Body,
    Blank,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelLine {
    pub kind: LineKind,
    pub text: String,
    pub chunk: Option<ChunkId>,
}

impl PanelLine {
    pub fn header(page: u32) -> Self {
        Self {
            kind: LineKind::PageHeader(page),
            text: format!("-- page {} --", page),
            chunk: None,
        }
    }

    pub fn body(text: impl Into<String>, chunk: Option<ChunkId>) -> Self {
        Self {
            kind: LineKind::Body,
            text: text.into(),
            chunk,
        }
    }

    pub fn blank() -> Self {
        Self {
            kind: LineKind::Blank,
            text: String::new(),
            chunk: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ChunkSpan {
    chunk: ChunkId,
    start: usize,
    end: usize,
}

#[derive(Debug, Default)]
pub struct TextPanel {
    lines: Vec<PanelLine>,
    spans: Vec<ChunkSpan>,
    offset: usize,
    width: usize,
    height: usize,
    reported: HashSet<ChunkId>,
}

impl TextPanel {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            ..Self::default()
        }
    }

    /// Rebuilds the line buffer from `index`. The scroll offset is kept
    /// where possible.
    pub fn layout(&mut self, index: &ChunkPageIndex) {
        self.lines.clear();
        self.spans.clear();
        self.reported.clear();
        for group in index.groups() {
            self.lines.push(PanelLine::header(group.page));
            for chunk in &group.chunks {
                let start = self.lines.len();
                for text in wrap_text(&chunk.content, self.width) {
                    self.lines.push(PanelLine::body(text, Some(chunk.id)));
                }
                let end = self.lines.len();
                if end > start {
                    self.spans.push(ChunkSpan {
                        chunk: chunk.id,
                        start,
                        end,
                    });
                }
                self.lines.push(PanelLine::blank());
            }
        }
        self.offset = self.offset.min(self.max_offset());
        debug!(lines = self.lines.len(), chunks = self.spans.len(), "text panel laid out");
    }

    /// Returns true when the width changed and a new layout is needed.
    pub fn resize(&mut self, width: usize, height: usize) -> bool {
        let width = width.max(1);
        self.height = height.max(1);
        self.offset = self.offset.min(self.max_offset());
        if width != self.width {
            self.width = width;
            return true;
        }
        false
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    fn max_offset(&self) -> usize {
        self.lines.len().saturating_sub(self.height)
    }

    /// Scrolls by `delta` lines. Returns whether the offset moved.
    pub fn scroll_by(&mut self, delta: isize) -> bool {
        let target = if delta.is_negative() {
            self.offset.saturating_sub(delta.unsigned_abs())
        } else {
            self.offset.saturating_add(delta as usize)
        };
        self.set_offset(target)
    }

    /// Brings `chunk` to the top, showing its page header when it is the
    /// first chunk of the page.
    pub fn scroll_to_chunk(&mut self, chunk: ChunkId) -> bool {
        let Some(span) = self.spans.iter().find(|span| span.chunk == chunk) else {
            return false;
        };
        let mut target = span.start;
        if target > 0 && matches!(self.lines[target - 1].kind, LineKind::PageHeader(_)) {
            target -= 1;
        }
        self.set_offset(target)
    }

    fn set_offset(&mut self, offset: usize) -> bool {
        let offset = offset.min(self.max_offset());
        if offset == self.offset {
            return false;
        }
        self.offset = offset;
        true
    }

    pub fn visible_lines(&self) -> &[PanelLine] {
        let end = (self.offset + self.height).min(self.lines.len());
        &self.lines[self.offset.min(end)..end]
    }

    /// Visibility of each chunk that intersects the viewport, plus a zero
    /// ratio for chunks that were visible in the previous report.
    pub fn intersections(&mut self) -> Vec<Intersection> {
        let top = self.offset;
        let bottom = self.offset + self.height;
        let mut batch = Vec::new();
        let mut visible = HashSet::new();
        for span in &self.spans {
            let overlap = span.end.min(bottom).saturating_sub(span.start.max(top));
            if overlap == 0 {
                continue;
            }
            let ratio = overlap as f32 / (span.end - span.start) as f32;
            batch.push(Intersection::new(span.chunk, ratio));
            visible.insert(span.chunk);
        }
        for gone in self.reported.difference(&visible) {
            batch.push(Intersection::new(*gone, 0.0));
        }
        self.reported = visible;
        batch
    }
}

/// Greedy word wrap by character count. Words wider than `width` are split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        let mut line_len = 0;
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if line_len > 0 {
                    lines.push(std::mem::take(&mut line));
                    line_len = 0;
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let needed = if line_len == 0 { word.len() } else { line_len + 1 + word.len() };
            if needed > width && line_len > 0 {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            line_len += word.len();
            line.extend(word);
        }
        if line_len > 0 {
            lines.push(line);
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagesync_core::{document_id_for_source, Chunk};

    fn index(count: usize, total_pages: u32) -> (ChunkPageIndex, Vec<Chunk>) {
        let id = document_id_for_source("panel.pdf");
        let chunks: Vec<Chunk> = (0..count)
            .map(|ordinal| Chunk::new(id, ordinal, format!("chunk {} body", ordinal)))
            .collect();
        (ChunkPageIndex::build(&chunks, total_pages), chunks)
    }

    #[test]
    fn wrap_breaks_on_words_and_splits_long_words() {
        assert_eq!(wrap_text("the quick brown fox", 9), vec!["the quick", "brown fox"]);
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_text("one\n\ntwo", 10), vec!["one", "two"]);
        assert!(wrap_text("   ", 10).is_empty());
    }

    #[test]
    fn layout_groups_chunks_under_page_headers() {
        let (index, chunks) = index(4, 2);
        let mut panel = TextPanel::new(40, 10);
        panel.layout(&index);
        let lines = panel.visible_lines();
        assert_eq!(lines[0], PanelLine::header(1));
        assert_eq!(lines[1].chunk, Some(chunks[0].id));
        assert_eq!(lines[2].kind, LineKind::Blank);
        assert_eq!(lines[5], PanelLine::header(2));
        assert_eq!(panel.line_count(), 10);
    }

    #[test]
    fn scroll_to_chunk_shows_page_header() {
        let (index, chunks) = index(6, 3);
        let mut panel = TextPanel::new(40, 3);
        panel.layout(&index);

        assert!(panel.scroll_to_chunk(chunks[2].id));
        assert_eq!(panel.visible_lines()[0], PanelLine::header(2));
        assert!(panel.scroll_to_chunk(chunks[3].id));
        assert_eq!(panel.visible_lines()[0].chunk, Some(chunks[3].id));
        assert!(!panel.scroll_to_chunk(chunks[3].id));
    }

    #[test]
    fn scrolling_is_clamped() {
        let (index, _) = index(2, 1);
        let mut panel = TextPanel::new(40, 3);
        panel.layout(&index);
        assert_eq!(panel.line_count(), 5);
        assert!(!panel.scroll_by(-4));
        assert!(panel.scroll_by(100));
        assert_eq!(panel.offset(), 2);
    }

    #[test]
    fn intersections_report_partial_and_departed_chunks() {
        let id = document_id_for_source("tall.pdf");
        let chunks = vec![
            Chunk::new(id, 0, "a b c d"),
            Chunk::new(id, 1, "e f g h"),
        ];
        let index = ChunkPageIndex::build(&chunks, 1);
        let mut panel = TextPanel::new(1, 4);
        panel.layout(&index);

        let first = panel.intersections();
        assert_eq!(first, vec![Intersection::new(chunks[0].id, 0.75)]);

        panel.scroll_by(6);
        let second = panel.intersections();
        assert!(second.contains(&Intersection::new(chunks[1].id, 1.0)));
        assert!(second.contains(&Intersection::new(chunks[0].id, 0.0)));
    }
}
