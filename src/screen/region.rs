//! Rectangular screen areas used for OCR reads and confined template searches

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl SearchRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            name: String::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn full_screen(screen_width: u32, screen_height: u32) -> Self {
        Self::new(0, 0, screen_width, screen_height).named("full_screen")
    }

    /// Region encoded in a template file name, e.g. `help_all-[300,1682,50,50].png`.
    /// Falls back to the whole screen when the name carries none.
    pub fn from_template_name(file_name: &str, screen_width: u32, screen_height: u32) -> Self {
        let parsed = file_name
            .find('[')
            .zip(file_name.find(']'))
            .filter(|(start, end)| end > start)
            .and_then(|(start, end)| Self::parse_coordinates(&file_name[start + 1..end]));

        match parsed {
            Some(region) => region.clip_to(screen_width, screen_height),
            None => Self::full_screen(screen_width, screen_height),
        }
    }

    fn parse_coordinates(raw: &str) -> Option<Self> {
        let values: Vec<u32> = raw
            .split(',')
            .map(|part| part.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .ok()?;
        match values.as_slice() {
            &[x, y, width, height] => Some(Self::new(x, y, width, height)),
            _ => None,
        }
    }

    /// Shrink the region so it lies inside a `screen_width` x `screen_height` frame.
    pub fn clip_to(mut self, screen_width: u32, screen_height: u32) -> Self {
        self.x = self.x.min(screen_width.saturating_sub(1));
        self.y = self.y.min(screen_height.saturating_sub(1));
        self.width = self.width.min(screen_width.saturating_sub(self.x));
        self.height = self.height.min(screen_height.saturating_sub(self.y));
        self
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Short label for log lines.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("[{},{},{},{}]", self.x, self.y, self.width, self.height)
        } else {
            self.name.clone()
        }
    }
}
