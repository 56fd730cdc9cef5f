use std::collections::HashSet;

use jj_logging::jj_debug;
use scraper::Html;

use crate::{ApiError, Cursor, JenkinsApi};

/// Only the tail of a large console delta is shown.
pub const MAX_BATCH_LINES: usize = 50;
pub const CHUNK_WIDTH: usize = 100;
pub const MAX_CHUNKS_PER_LINE: usize = 10;

/// Plain text of an HTML console fragment with tags removed and entities decoded.
pub fn strip_markup(html: &str) -> String {
    if !html.contains('<') && !html.contains('&') {
        return html.to_string();
    }
    Html::parse_fragment(html)
        .root_element()
        .text()
        .collect::<String>()
}

/// Turns raw console deltas into display lines.
#[derive(Debug, Clone)]
pub struct LineNormalizer {
    pub max_lines: usize,
    pub chunk_width: usize,
    pub max_chunks: usize,
}

impl Default for LineNormalizer {
    fn default() -> Self {
        Self {
            max_lines: MAX_BATCH_LINES,
            chunk_width: CHUNK_WIDTH,
            max_chunks: MAX_CHUNKS_PER_LINE,
        }
    }
}

impl LineNormalizer {
    pub fn normalize(&self, raw: &str) -> Vec<String> {
        let text = strip_markup(raw);
        let lines: Vec<&str> = text
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .collect();
        let tail = &lines[lines.len().saturating_sub(self.max_lines)..];

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for line in tail {
            for chunk in chunk_chars(line, self.chunk_width).take(self.max_chunks) {
                let key = chunk.trim();
                if key.is_empty() || !seen.insert(key.to_string()) {
                    continue;
                }
                out.push(chunk.to_string());
            }
        }
        out
    }
}

fn chunk_chars(line: &str, width: usize) -> impl Iterator<Item = &str> {
    let width = width.max(1);
    let mut rest = line;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let split = rest
            .char_indices()
            .nth(width)
            .map_or(rest.len(), |(idx, _)| idx);
        let (head, tail) = rest.split_at(split);
        rest = tail;
        Some(head)
    })
}

/// Progressive reader over one build's console.
#[derive(Debug, Clone)]
pub struct ConsoleStream {
    job: String,
    number: u64,
    cursor: Cursor,
    normalizer: LineNormalizer,
}

impl ConsoleStream {
    pub fn new(job: impl Into<String>, number: u64) -> Self {
        Self {
            job: job.into(),
            number,
            cursor: Cursor::start(),
            normalizer: LineNormalizer::default(),
        }
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Lines added since the last call, or `None` when the cursor did not move.
    pub async fn next_batch(
        &mut self,
        api: &dyn JenkinsApi,
    ) -> Result<Option<Vec<String>>, ApiError> {
        let chunk = api.console(&self.job, self.number, &self.cursor).await?;
        if chunk.next_cursor == self.cursor {
            return Ok(None);
        }
        jj_debug!(
            "console {} #{} advanced {} -> {}",
            self.job,
            self.number,
            self.cursor,
            chunk.next_cursor
        );
        self.cursor = chunk.next_cursor;
        Ok(Some(self.normalizer.normalize(&chunk.text)))
    }
}
