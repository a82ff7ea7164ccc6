//! Scripted screen for tests: OCR reads and template hits are replayed from
//! queues, clicks and key presses are recorded.

use super::{GameScreen, Point, SearchRegion};
use crate::error::AutomationError;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

type RegionKey = (u32, u32, u32, u32);

fn key(region: &SearchRegion) -> RegionKey {
    (region.x, region.y, region.width, region.height)
}

#[derive(Default)]
struct Script {
    texts: HashMap<RegionKey, VecDeque<String>>,
    sticky_texts: HashMap<RegionKey, String>,
    images: HashMap<String, VecDeque<Option<Point>>>,
    sticky_images: HashMap<String, Point>,
    clicks: Vec<Point>,
    keys: Vec<String>,
    reads: HashMap<RegionKey, usize>,
    searches: Vec<String>,
}

#[derive(Default)]
pub struct FakeScreen {
    script: Mutex<Script>,
}

impl FakeScreen {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue one OCR result for `region`.
    pub fn push_text(&self, region: &SearchRegion, text: &str) -> &Self {
        self.script()
            .texts
            .entry(key(region))
            .or_default()
            .push_back(text.to_string());
        self
    }

    /// Text returned for `region` once its queue is empty.
    pub fn set_text(&self, region: &SearchRegion, text: &str) -> &Self {
        self.script().sticky_texts.insert(key(region), text.to_string());
        self
    }

    /// Queue one search result for `template`.
    pub fn push_image(&self, template: &str, hit: Option<Point>) -> &Self {
        self.script()
            .images
            .entry(template.to_string())
            .or_default()
            .push_back(hit);
        self
    }

    /// Make `template` visible at `at` whenever its queue is empty.
    pub fn show(&self, template: &str, at: Point) -> &Self {
        self.script().sticky_images.insert(template.to_string(), at);
        self
    }

    pub fn hide(&self, template: &str) -> &Self {
        self.script().sticky_images.remove(template);
        self
    }

    pub fn clicks(&self) -> Vec<Point> {
        self.script().clicks.clone()
    }

    pub fn clicks_at(&self, point: Point) -> usize {
        self.script().clicks.iter().filter(|p| **p == point).count()
    }

    pub fn keys(&self) -> Vec<String> {
        self.script().keys.clone()
    }

    pub fn reads_of(&self, region: &SearchRegion) -> usize {
        self.script().reads.get(&key(region)).copied().unwrap_or(0)
    }

    pub fn searches(&self) -> Vec<String> {
        self.script().searches.clone()
    }
}

impl GameScreen for FakeScreen {
    async fn find_image(
        &self,
        template: &str,
        _region: Option<&SearchRegion>,
        _threshold: f32,
    ) -> Result<Option<Point>, AutomationError> {
        let mut script = self.script();
        script.searches.push(template.to_string());
        if let Some(hit) = script.images.get_mut(template).and_then(VecDeque::pop_front) {
            return Ok(hit);
        }
        Ok(script.sticky_images.get(template).copied())
    }

    async fn read_text_from_region(&self, region: &SearchRegion) -> Result<String, AutomationError> {
        let mut script = self.script();
        let k = key(region);
        *script.reads.entry(k).or_default() += 1;
        if let Some(text) = script.texts.get_mut(&k).and_then(VecDeque::pop_front) {
            return Ok(text);
        }
        Ok(script.sticky_texts.get(&k).cloned().unwrap_or_default())
    }

    async fn click(&self, point: Point) -> Result<(), AutomationError> {
        self.script().clicks.push(point);
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), AutomationError> {
        self.script().keys.push(key.to_string());
        Ok(())
    }
}
