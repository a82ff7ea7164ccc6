//! Turning unreliable OCR text into decisions: duration parsing, the ordered
//! status classifier, majority voting and the popup heuristic.

use crate::error::AutomationError;
use crate::screen::{GameScreen, SearchRegion};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Pause between two read attempts of the same region.
const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Parse the first `HH:MM:SS` or `MM:SS` group in `text` into seconds.
/// Common digit misreads (`O` for 0, `l`/`I`/`|` for 1) are corrected first.
pub fn parse_duration(text: &str) -> Option<u64> {
    let normalized: String = text
        .chars()
        .map(|c| match c {
            'O' | 'o' => '0',
            'l' | 'I' | '|' => '1',
            ';' => ':',
            other => other,
        })
        .collect();

    normalized
        .split(|c: char| !(c.is_ascii_digit() || c == ':'))
        .map(|run| run.trim_matches(':'))
        .filter(|run| run.contains(':'))
        .find_map(parse_clock)
}

fn parse_clock(run: &str) -> Option<u64> {
    let parts: Vec<u64> = run
        .split(':')
        .map(|p| {
            if p.is_empty() || p.len() > 3 {
                None
            } else {
                p.parse().ok()
            }
        })
        .collect::<Option<_>>()?;
    match parts.as_slice() {
        &[m, s] if s < 60 => Some(m * 60 + s),
        &[h, m, s] if m < 60 && s < 60 => Some(h * 3600 + m * 60 + s),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrStatus {
    Completed,
    Idle,
    /// Remaining time in seconds.
    Time(u64),
    /// Nothing the classifier recognises.
    Unreadable,
}

impl OcrStatus {
    pub fn value(&self) -> Option<u64> {
        match self {
            OcrStatus::Completed => Some(0),
            OcrStatus::Time(secs) => Some(*secs),
            OcrStatus::Idle | OcrStatus::Unreadable => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusRule {
    /// Lower-case fragments; any one of them contained in the text matches.
    pub patterns: Vec<String>,
    pub status: OcrStatus,
}

/// Ordered pattern rules tried before falling back to a time parse.
#[derive(Debug, Clone)]
pub struct StatusTable {
    rules: Vec<StatusRule>,
}

impl Default for StatusTable {
    fn default() -> Self {
        let rule = |patterns: &[&str], status| StatusRule {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            status,
        };
        Self {
            rules: vec![
                rule(
                    &["completed", "complete", "compieted", "cornpleted", "c0mpleted", "comp1eted", "finished"],
                    OcrStatus::Completed,
                ),
                rule(&["idle", "idie", "ldle", "1dle", "id1e", "iole"], OcrStatus::Idle),
            ],
        }
    }
}

impl StatusTable {
    pub fn new(rules: Vec<StatusRule>) -> Self {
        Self { rules }
    }

    pub fn classify(&self, text: &str) -> OcrStatus {
        let lower = text.to_lowercase();
        if let Some(rule) = self
            .rules
            .iter()
            .find(|rule| rule.patterns.iter().any(|p| lower.contains(p.as_str())))
        {
            return rule.status;
        }
        match parse_duration(text) {
            Some(0) => OcrStatus::Completed,
            Some(secs) => OcrStatus::Time(secs),
            None => OcrStatus::Unreadable,
        }
    }
}

/// Whether `text` looks like noise rather than any value the game shows:
/// too short, mostly symbols, or one or two characters repeated.
pub fn is_garbage(text: &str) -> bool {
    if parse_duration(text).is_some() {
        return false;
    }
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if chars.len() < 2 {
        return true;
    }
    let symbols = chars
        .iter()
        .filter(|c| !c.is_alphanumeric() && **c != ':')
        .count();
    if symbols * 10 > chars.len() * 3 {
        return true;
    }
    let distinct = chars.iter().collect::<HashSet<_>>().len();
    chars.len() >= 6 && distinct * 4 < chars.len()
}

/// Most frequent non-empty read; ties go to the value seen first.
pub fn consensus(reads: &[String]) -> Option<String> {
    let mut tally: Vec<(&str, usize)> = Vec::new();
    for read in reads.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
        match tally.iter_mut().find(|(text, _)| *text == read) {
            Some(entry) => entry.1 += 1,
            None => tally.push((read, 1)),
        }
    }
    let mut best: Option<(&str, usize)> = None;
    for (text, count) in tally {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((text, count));
        }
    }
    best.map(|(text, _)| text.to_string())
}

/// Repeated reads of a region with voting.
#[derive(Debug, Clone, Copy)]
pub struct OcrReader {
    pub consensus_reads: usize,
    pub max_attempts: u32,
}

impl OcrReader {
    /// Majority text of `consensus_reads` back-to-back reads, empty when every
    /// read came back blank.
    pub async fn read_consensus<S: GameScreen>(
        &self,
        screen: &S,
        region: &SearchRegion,
    ) -> Result<String, AutomationError> {
        let mut reads = Vec::with_capacity(self.consensus_reads);
        for _ in 0..self.consensus_reads.max(1) {
            reads.push(screen.read_text_from_region(region).await?);
        }
        let winner = consensus(&reads).unwrap_or_default();
        log::debug!("🗳️ {} reads of {}: {:?} -> '{}'", reads.len(), region.label(), reads, winner);
        Ok(winner)
    }

    /// Read a duration no larger than `max`. Out-of-range or unparsable reads
    /// are retried; after the last attempt `default` is used instead.
    pub async fn read_duration_bounded<S: GameScreen>(
        &self,
        screen: &S,
        region: &SearchRegion,
        max: Duration,
        default: Duration,
    ) -> Result<Duration, AutomationError> {
        for attempt in 1..=self.max_attempts {
            let text = self.read_consensus(screen, region).await?;
            match parse_duration(&text) {
                Some(secs) if secs > 0 && secs <= max.as_secs() => {
                    return Ok(Duration::from_secs(secs));
                }
                Some(secs) => log::warn!(
                    "⚠️ {} read {}s from '{}', outside 1..={}s (attempt {}/{})",
                    region.label(),
                    secs,
                    text,
                    max.as_secs(),
                    attempt,
                    self.max_attempts
                ),
                None => log::warn!(
                    "⚠️ No duration in '{}' at {} (attempt {}/{})",
                    text,
                    region.label(),
                    attempt,
                    self.max_attempts
                ),
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(RETRY_PAUSE).await;
            }
        }
        log::warn!(
            "⚠️ Giving up on {}, assuming {}s",
            region.label(),
            default.as_secs()
        );
        Ok(default)
    }
}

/// Close control that popups put over the game screen.
#[derive(Debug, Clone)]
pub struct PopupCloser {
    pub template: String,
    pub region: Option<SearchRegion>,
    pub threshold: f32,
}

impl PopupCloser {
    /// Tap the close control if it is visible. Returns whether it was.
    pub async fn dismiss<S: GameScreen>(&self, screen: &S) -> Result<bool, AutomationError> {
        match screen
            .find_image(&self.template, self.region.as_ref(), self.threshold)
            .await?
        {
            Some(at) => {
                log::info!("🪟 Closing popup at {}", at);
                screen.click(at).await?;
                Ok(true)
            }
            None => {
                log::debug!("🪟 No popup close control found");
                Ok(false)
            }
        }
    }
}

/// Consecutive unreadable statuses of one entity, and how many of the most
/// recent ones in a row looked like noise.
#[derive(Debug, Clone, Copy, Default)]
struct Streak {
    failures: u32,
    garbage: u32,
}

/// Status reads with voting, the ordered classifier and per-entity failure
/// counting. Two consecutive failures that look like noise are taken as a
/// popup covering the screen, which is dismissed before the next attempt.
pub struct StatusReader {
    table: StatusTable,
    reader: OcrReader,
    popup: PopupCloser,
    streaks: Mutex<HashMap<String, Streak>>,
}

impl StatusReader {
    pub fn new(table: StatusTable, reader: OcrReader, popup: PopupCloser) -> Self {
        Self {
            table,
            reader,
            popup,
            streaks: Mutex::new(HashMap::new()),
        }
    }

    pub fn failures(&self, entity: &str) -> u32 {
        self.streaks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity)
            .map_or(0, |s| s.failures)
    }

    /// Count one more failure; `garbage` extends or breaks the noise run.
    fn bump(&self, entity: &str, garbage: bool) -> Streak {
        let mut streaks = self.streaks.lock().unwrap_or_else(PoisonError::into_inner);
        let streak = streaks.entry(entity.to_string()).or_default();
        streak.failures += 1;
        streak.garbage = if garbage { streak.garbage + 1 } else { 0 };
        *streak
    }

    fn reset(&self, entity: &str) {
        self.streaks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(entity);
    }

    /// Classified status of `region`, or `Unreadable` once every attempt failed.
    pub async fn read_status<S: GameScreen>(
        &self,
        screen: &S,
        entity: &str,
        region: &SearchRegion,
    ) -> Result<OcrStatus, AutomationError> {
        let attempts = self.reader.max_attempts;
        for attempt in 1..=attempts {
            let text = self.reader.read_consensus(screen, region).await?;
            let status = self.table.classify(&text);
            if status != OcrStatus::Unreadable {
                self.reset(entity);
                log::debug!("🔤 {} status '{}' -> {:?}", entity, text, status);
                return Ok(status);
            }

            let streak = self.bump(entity, is_garbage(&text));
            log::warn!(
                "⚠️ Unreadable status '{}' for {} (attempt {}/{}, {} in a row)",
                text,
                entity,
                attempt,
                attempts,
                streak.failures
            );
            if streak.garbage >= 2 {
                self.popup.dismiss(screen).await?;
            }
            if attempt < attempts {
                tokio::time::sleep(RETRY_PAUSE).await;
            }
        }
        Ok(OcrStatus::Unreadable)
    }
}
