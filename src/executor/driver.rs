use anyhow::{Context, Result, anyhow, bail};
use arboard::Clipboard;
use enigo::Keyboard as _;
use enigo::Mouse as _;
use enigo::{Button as EButton, Coordinate, Direction, Enigo, Key, Settings};
use image::RgbaImage;
use tracing::{info, trace};

use super::matching;
use crate::config::MouseButton;

/// A screen-space rectangle (e.g., the bounding box of a located template).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn center(&self) -> (i32, i32) {
        (
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }
}

/// Platform input/screen capabilities used by the engine.
///
/// Every call is made from the worker thread, one at a time.
#[cfg_attr(test, mockall::automock)]
pub trait InputDriver {
    /// Click `count` times at absolute screen position `(x, y)`.
    fn click(&mut self, x: i32, y: i32, button: MouseButton, count: u32) -> Result<()>;

    /// Press and release a single named key (`"enter"`, `"f5"`, `"a"`, ...).
    fn key_press(&mut self, key: &str) -> Result<()>;

    /// Press keys in order, then release them in reverse order.
    fn hotkey(&mut self, keys: &[String]) -> Result<()>;

    fn clipboard_copy(&mut self, text: &str) -> Result<()>;

    /// Send the platform paste shortcut.
    fn paste(&mut self) -> Result<()>;

    /// Find `template` (encoded image bytes) on screen with at least `confidence` similarity.
    fn locate_template_on_screen(&mut self, template: &[u8], confidence: f32)
    -> Result<Option<Rect>>;

    /// Capture the full primary screen.
    fn screenshot(&mut self) -> Result<RgbaImage>;
}

/// Real input through Enigo, clipboard through arboard, screen through xcap.
///
/// Backends are created lazily on first use, on the thread that uses them.
#[derive(Default)]
pub struct EnigoDriver {
    enigo: Option<Enigo>,
    clipboard: Option<Clipboard>,
}

impl EnigoDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_enigo(&mut self) -> Result<&mut Enigo> {
        if self.enigo.is_none() {
            trace!(target: "macroflow::driver", "Initializing Enigo");
            self.enigo =
                Some(Enigo::new(&Settings::default()).context("Failed to initialize Enigo")?);
        }
        self.enigo
            .as_mut()
            .ok_or_else(|| anyhow!("Enigo is not initialized"))
    }

    fn ensure_clipboard(&mut self) -> Result<&mut Clipboard> {
        if self.clipboard.is_none() {
            trace!(target: "macroflow::driver", "Opening clipboard");
            self.clipboard = Some(Clipboard::new().context("Failed to open clipboard")?);
        }
        self.clipboard
            .as_mut()
            .ok_or_else(|| anyhow!("Clipboard is not initialized"))
    }

    fn capture_primary() -> Result<(RgbaImage, i32, i32)> {
        let monitors = xcap::Monitor::all().context("Failed to enumerate monitors")?;
        let mut primary = None;
        for monitor in &monitors {
            if monitor.is_primary().unwrap_or(false) {
                primary = Some(monitor);
                break;
            }
        }
        let monitor = primary
            .or_else(|| monitors.first())
            .ok_or_else(|| anyhow!("No monitor available"))?;
        let image = monitor.capture_image().context("Failed to capture screen")?;
        let x = monitor.x().unwrap_or(0);
        let y = monitor.y().unwrap_or(0);
        Ok((image, x, y))
    }
}

impl InputDriver for EnigoDriver {
    fn click(&mut self, x: i32, y: i32, button: MouseButton, count: u32) -> Result<()> {
        let enigo = self.ensure_enigo()?;
        trace!(target: "macroflow::driver", x, y, button = button.as_str(), count, "click");
        enigo.move_mouse(x, y, Coordinate::Abs)?;
        let btn = map_mouse_button(button);
        for _ in 0..count.max(1) {
            enigo.button(btn, Direction::Click)?;
        }
        Ok(())
    }

    fn key_press(&mut self, key: &str) -> Result<()> {
        let k = parse_key(key)?;
        let enigo = self.ensure_enigo()?;
        trace!(target: "macroflow::driver", %key, "key_press");
        enigo.key(k, Direction::Click)?;
        Ok(())
    }

    fn hotkey(&mut self, keys: &[String]) -> Result<()> {
        let parsed = keys
            .iter()
            .map(|k| parse_key(k))
            .collect::<Result<Vec<_>>>()?;
        let enigo = self.ensure_enigo()?;
        trace!(target: "macroflow::driver", ?keys, "hotkey");
        for k in &parsed {
            enigo.key(*k, Direction::Press)?;
        }
        for k in parsed.iter().rev() {
            enigo.key(*k, Direction::Release)?;
        }
        Ok(())
    }

    fn clipboard_copy(&mut self, text: &str) -> Result<()> {
        let clipboard = self.ensure_clipboard()?;
        trace!(target: "macroflow::driver", len = text.len(), "clipboard_copy");
        clipboard
            .set_text(text.to_owned())
            .context("Failed to write clipboard")?;
        Ok(())
    }

    fn paste(&mut self) -> Result<()> {
        let enigo = self.ensure_enigo()?;
        trace!(target: "macroflow::driver", "paste");
        enigo.key(PASTE_MODIFIER, Direction::Press)?;
        enigo.key(Key::Unicode('v'), Direction::Click)?;
        enigo.key(PASTE_MODIFIER, Direction::Release)?;
        Ok(())
    }

    fn locate_template_on_screen(
        &mut self,
        template: &[u8],
        confidence: f32,
    ) -> Result<Option<Rect>> {
        let needle = image::load_from_memory(template)
            .context("Failed to decode template image")?
            .to_luma8();
        let (screen, offset_x, offset_y) = Self::capture_primary()?;
        let haystack = image::DynamicImage::ImageRgba8(screen).to_luma8();
        let found = matching::locate(&haystack, &needle, confidence).map(|m| Rect {
            x: m.x + offset_x,
            y: m.y + offset_y,
            ..m
        });
        trace!(target: "macroflow::driver", confidence, ?found, "locate_template_on_screen");
        Ok(found)
    }

    fn screenshot(&mut self) -> Result<RgbaImage> {
        let (image, _, _) = Self::capture_primary()?;
        Ok(image)
    }
}

#[cfg(target_os = "macos")]
const PASTE_MODIFIER: Key = Key::Meta;
#[cfg(not(target_os = "macos"))]
const PASTE_MODIFIER: Key = Key::Control;

/// Logs every input instead of performing it. Template lookups never match.
#[derive(Debug, Default)]
pub struct DryRunDriver;

impl DryRunDriver {
    pub fn new() -> Self {
        Self
    }
}

impl InputDriver for DryRunDriver {
    fn click(&mut self, x: i32, y: i32, button: MouseButton, count: u32) -> Result<()> {
        info!(target: "macroflow::driver", x, y, button = button.as_str(), count, "DRY-RUN click");
        Ok(())
    }

    fn key_press(&mut self, key: &str) -> Result<()> {
        parse_key(key)?;
        info!(target: "macroflow::driver", %key, "DRY-RUN key_press");
        Ok(())
    }

    fn hotkey(&mut self, keys: &[String]) -> Result<()> {
        for k in keys {
            parse_key(k)?;
        }
        info!(target: "macroflow::driver", ?keys, "DRY-RUN hotkey");
        Ok(())
    }

    fn clipboard_copy(&mut self, text: &str) -> Result<()> {
        info!(target: "macroflow::driver", %text, "DRY-RUN clipboard_copy");
        Ok(())
    }

    fn paste(&mut self) -> Result<()> {
        info!(target: "macroflow::driver", "DRY-RUN paste");
        Ok(())
    }

    fn locate_template_on_screen(
        &mut self,
        template: &[u8],
        confidence: f32,
    ) -> Result<Option<Rect>> {
        info!(target: "macroflow::driver", len = template.len(), confidence, "DRY-RUN locate_template_on_screen");
        Ok(None)
    }

    fn screenshot(&mut self) -> Result<RgbaImage> {
        info!(target: "macroflow::driver", "DRY-RUN screenshot");
        Ok(RgbaImage::new(1, 1))
    }
}

/// Map a key name (pyautogui-style, case-insensitive) to an Enigo key.
pub fn parse_key(name: &str) -> Result<Key> {
    let lower = name.trim().to_lowercase();
    let key = match lower.as_str() {
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "esc" | "escape" => Key::Escape,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "pgup" => Key::PageUp,
        "pagedown" | "pgdn" => Key::PageDown,
        "ctrl" | "control" | "ctrlleft" | "ctrlright" => Key::Control,
        "shift" | "shiftleft" | "shiftright" => Key::Shift,
        "alt" | "altleft" | "altright" | "option" => Key::Alt,
        "win" | "winleft" | "winright" | "cmd" | "command" | "meta" | "super" => Key::Meta,
        "capslock" => Key::CapsLock,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        _ => {
            let mut chars = lower.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Unicode(c),
                _ => bail!("Unknown key name '{name}'"),
            }
        }
    };
    Ok(key)
}

fn map_mouse_button(btn: MouseButton) -> EButton {
    match btn {
        MouseButton::Left => EButton::Left,
        MouseButton::Middle => EButton::Middle,
        MouseButton::Right => EButton::Right,
    }
}
