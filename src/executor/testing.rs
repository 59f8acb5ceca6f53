//! Test doubles shared by the engine's unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use image::RgbaImage;

use super::driver::{InputDriver, Rect};
use crate::config::MouseButton;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Click(i32, i32, MouseButton, u32),
    Key(String),
    Hotkey(Vec<String>),
    Copy(String),
    Paste,
    Locate,
    Screenshot,
}

/// Records every call; clones share the same log.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingDriver {
    events: Arc<Mutex<Vec<Event>>>,
    /// Answers for successive template lookups; `None` once exhausted.
    locate: Arc<Mutex<VecDeque<Option<Rect>>>>,
    /// Key names whose press fails.
    failing_keys: Vec<String>,
}

impl RecordingDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_key(mut self, key: &str) -> Self {
        self.failing_keys.push(key.to_string());
        self
    }

    pub(crate) fn locate_results(self, results: impl IntoIterator<Item = Option<Rect>>) -> Self {
        self.locate.lock().unwrap().extend(results);
        self
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl InputDriver for RecordingDriver {
    fn click(&mut self, x: i32, y: i32, button: MouseButton, count: u32) -> Result<()> {
        self.push(Event::Click(x, y, button, count));
        Ok(())
    }

    fn key_press(&mut self, key: &str) -> Result<()> {
        self.push(Event::Key(key.to_string()));
        if self.failing_keys.iter().any(|k| k == key) {
            bail!("key '{key}' rejected");
        }
        Ok(())
    }

    fn hotkey(&mut self, keys: &[String]) -> Result<()> {
        self.push(Event::Hotkey(keys.to_vec()));
        Ok(())
    }

    fn clipboard_copy(&mut self, text: &str) -> Result<()> {
        self.push(Event::Copy(text.to_string()));
        Ok(())
    }

    fn paste(&mut self) -> Result<()> {
        self.push(Event::Paste);
        Ok(())
    }

    fn locate_template_on_screen(&mut self, _template: &[u8], _confidence: f32) -> Result<Option<Rect>> {
        self.push(Event::Locate);
        Ok(self.locate.lock().unwrap().pop_front().flatten())
    }

    fn screenshot(&mut self) -> Result<RgbaImage> {
        self.push(Event::Screenshot);
        Ok(RgbaImage::new(2, 2))
    }
}
