use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, trace, warn};

use super::control::RunState;
use super::driver::InputDriver;
use super::error::{MacroError, ResourceKind};
use super::report::Reporter;
use crate::config::{
    Action, ActionKind, AppConfig, ClickCoordParams, MouseButton, ResourceId, Row,
    ScreenshotParams, TypeVariableParams, VarType, WaitImageParams,
};
use crate::providers::{Resources, TemplateImage, cell_to_string};

/// Interval between template lookups in `wait_image`.
pub const WAIT_IMAGE_POLL: Duration = Duration::from_millis(500);

/// Fixed settle delays around synthesized input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Between writing the clipboard and pasting.
    pub clipboard: Duration,
    /// After a key press, hotkey, paste, and around image clicks.
    pub settle: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            clipboard: Duration::from_millis(100),
            settle: Duration::from_millis(200),
        }
    }
}

impl Pacing {
    /// No settle delays at all.
    pub fn none() -> Self {
        Self {
            clipboard: Duration::ZERO,
            settle: Duration::ZERO,
        }
    }
}

/// Runs individual actions against the driver for one flow execution.
pub(crate) struct ActionRunner<'a> {
    pub driver: &'a mut dyn InputDriver,
    pub resources: &'a Resources,
    pub reporter: &'a Reporter,
    pub state: &'a RunState,
    pub pacing: Pacing,
    pub app: &'a AppConfig,
    pub row: Option<&'a Row>,
}

impl ActionRunner<'_> {
    pub(crate) fn run(&mut self, action: &Action) -> Result<(), MacroError> {
        self.reporter
            .log(&format!("  ▶ {}", describe(action, self.resources)));
        trace!(target: "macroflow::actions", id = action.id, kind = action.kind.type_name(), "Executing action");

        match &action.kind {
            ActionKind::ClickCoord(p) => self.click_coord(p),
            ActionKind::ClickImage(p) => self.click_image(p.image_id),
            ActionKind::TypeText(p) => self
                .paste_text(&p.text)
                .context("텍스트 타이핑 실패")
                .map_err(MacroError::from),
            ActionKind::TypeVariable(p) => self.type_variable(p),
            ActionKind::KeyPress(p) => {
                self.driver.key_press(&p.key)?;
                sleep(self.pacing.settle);
                Ok(())
            }
            ActionKind::Hotkey(p) => {
                self.driver.hotkey(&p.keys)?;
                sleep(self.pacing.settle);
                Ok(())
            }
            ActionKind::Paste => {
                self.driver.paste()?;
                sleep(self.pacing.settle);
                Ok(())
            }
            ActionKind::Delay(p) => {
                sleep(seconds(p.seconds));
                Ok(())
            }
            ActionKind::WaitImage(p) => self.wait_image(p),
            ActionKind::Screenshot(p) => self.screenshot(p),
            ActionKind::Memo(_) => Ok(()),
            ActionKind::Unknown { kind, .. } => {
                warn!(target: "macroflow::actions", %kind, "Skipping unknown action type");
                self.reporter
                    .log(&format!("    ⚠️ 알 수 없는 액션 타입: {kind}"));
                Ok(())
            }
        }
    }

    fn click_coord(&mut self, p: &ClickCoordParams) -> Result<(), MacroError> {
        let coord = p
            .coord_id
            .and_then(|id| self.resources.coordinates.get_coordinate(id))
            .ok_or_else(|| MacroError::not_found(ResourceKind::Coordinate, p.coord_id))?;
        sleep(seconds(p.pre_delay));
        self.driver
            .click(coord.x, coord.y, p.click_type, p.click_count)?;
        sleep(seconds(p.post_delay));
        Ok(())
    }

    fn click_image(&mut self, image_id: Option<ResourceId>) -> Result<(), MacroError> {
        let image = self.resolve_image(image_id)?;
        self.reporter
            .log(&format!("    🔍 이미지 '{}' 찾는 중...", image.name));
        let found = self
            .driver
            .locate_template_on_screen(&image.bytes, image.confidence)?;
        let Some(rect) = found else {
            return Err(MacroError::TemplateNotFound {
                name: image.name.clone(),
            });
        };
        let (x, y) = rect.center();
        self.reporter
            .log(&format!("    ✅ 이미지 발견: ({x}, {y})"));
        sleep(self.pacing.settle);
        self.driver.click(x, y, MouseButton::Left, 1)?;
        sleep(self.pacing.settle);
        Ok(())
    }

    fn type_variable(&mut self, p: &TypeVariableParams) -> Result<(), MacroError> {
        let text = match &p.var_type {
            VarType::Excel => self
                .row
                .and_then(|row| row.get(&p.var_name))
                .map(cell_to_string)
                .unwrap_or_default(),
            VarType::Counter => self.state.current_row().to_string(),
            VarType::Timestamp => timestamp(),
            VarType::None | VarType::Other(_) => String::new(),
        };
        debug!(target: "macroflow::actions", var_type = ?p.var_type, var_name = %p.var_name, "Resolved variable");
        self.paste_text(&text)
            .context("변수 타이핑 실패")
            .map_err(MacroError::from)
    }

    fn wait_image(&mut self, p: &WaitImageParams) -> Result<(), MacroError> {
        let image = self.resolve_image(p.image_id)?;
        self.reporter.log(&format!(
            "    ⏳ 이미지 '{}' 대기 중... (최대 {}초)",
            image.name, p.timeout
        ));

        let timeout = seconds(p.timeout);
        let mut started = Instant::now();
        while started.elapsed() < timeout {
            if self.state.should_stop() {
                return Err(MacroError::UserCancelled);
            }
            if self.state.is_paused() {
                // Time spent paused does not count against the timeout.
                let paused_at = Instant::now();
                if !self.state.wait_while_paused() {
                    return Err(MacroError::UserCancelled);
                }
                started += paused_at.elapsed();
                debug!(target: "macroflow::actions", image = %image.name, "Image wait resumed");
            }
            let found = self
                .driver
                .locate_template_on_screen(&image.bytes, image.confidence)?;
            if let Some(rect) = found {
                let (x, y) = rect.center();
                self.reporter.log(&format!(
                    "    ✅ 이미지 발견! ({x}, {y}) - {:.1}초 소요",
                    started.elapsed().as_secs_f64()
                ));
                return Ok(());
            }
            if !self.state.sleep_unless_stopped(WAIT_IMAGE_POLL) {
                return Err(MacroError::UserCancelled);
            }
        }

        Err(MacroError::TimeoutExceeded {
            name: image.name.clone(),
            timeout: p.timeout,
        })
    }

    fn screenshot(&mut self, p: &ScreenshotParams) -> Result<(), MacroError> {
        let filename = p
            .filename
            .as_deref()
            .and_then(|f| Path::new(f).file_name())
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("screenshot_{}.png", timestamp()));
        let dir = self.app.screenshot_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(filename);

        let image = self.driver.screenshot()?;
        image
            .save(&path)
            .with_context(|| format!("Failed to save screenshot {}", path.display()))?;
        self.reporter
            .log(&format!("    💾 스크린샷 저장: {}", path.display()));
        Ok(())
    }

    fn resolve_image(&self, id: Option<ResourceId>) -> Result<Arc<TemplateImage>, MacroError> {
        id.and_then(|id| self.resources.images.get_image(id))
            .ok_or_else(|| MacroError::not_found(ResourceKind::Image, id))
    }

    /// Clipboard + paste, so any script (e.g., Hangul) is typed verbatim.
    fn paste_text(&mut self, text: &str) -> Result<()> {
        self.driver.clipboard_copy(text)?;
        sleep(self.pacing.clipboard);
        self.driver.paste()?;
        sleep(self.pacing.settle);
        Ok(())
    }
}

/// Human-readable one-line summary of an action, resolving resource names.
pub fn describe(action: &Action, resources: &Resources) -> String {
    const UNKNOWN: &str = "알 수 없음";
    match &action.kind {
        ActionKind::ClickCoord(p) => {
            let name = p
                .coord_id
                .and_then(|id| resources.coordinates.get_coordinate(id))
                .map_or_else(|| UNKNOWN.to_string(), |c| c.name);
            format!("[좌표:{name}] {} 클릭", p.click_type.as_str())
        }
        ActionKind::ClickImage(p) => {
            let name = image_name(resources, p.image_id).unwrap_or_else(|| UNKNOWN.into());
            format!("[이미지:{name}] 클릭")
        }
        ActionKind::TypeText(p) => format!("[타이핑] {}...", truncate(&p.text, 30)),
        ActionKind::TypeVariable(p) => format!(
            "[타이핑] {{{}:{}}}",
            String::from(p.var_type.clone()),
            p.var_name
        ),
        ActionKind::KeyPress(p) => format!("[키입력] {}", p.key),
        ActionKind::Hotkey(p) => format!("[단축키] {}", p.keys.join("+")),
        ActionKind::Paste => "[붙여넣기] Ctrl+V".to_string(),
        ActionKind::Delay(p) => format!("[대기] {}초", p.seconds),
        ActionKind::WaitImage(p) => {
            let name = image_name(resources, p.image_id).unwrap_or_else(|| UNKNOWN.into());
            format!("[이미지 대기] {name} (최대 {}초)", p.timeout)
        }
        ActionKind::Screenshot(p) => format!(
            "[스크린샷] {}",
            p.filename.as_deref().unwrap_or("screenshot.png")
        ),
        ActionKind::Memo(p) => format!("[메모] {}...", truncate(&p.text, 50)),
        ActionKind::Unknown { kind, .. } => format!("[알 수 없는 액션] {kind}"),
    }
}

fn image_name(resources: &Resources, id: Option<ResourceId>) -> Option<String> {
    id.and_then(|id| resources.images.get_image(id))
        .map(|img| img.name.clone())
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Local time as `YYYYMMDD_HHMMSS`.
pub fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Seconds from project data; negative or non-finite values mean zero.
fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_default()
}

fn sleep(d: Duration) {
    if !d.is_zero() {
        thread::sleep(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ClickImageParams, Coordinate, DelayParams, KeyPressParams, MemoParams, TypeTextParams,
    };
    use crate::executor::driver::{MockInputDriver, Rect};
    use crate::providers::{CoordinateStore, ImageStore, SheetStore};
    use mockall::predicate::eq;
    use serde_json::json;

    fn resources() -> Resources {
        Resources::new(
            Arc::new(CoordinateStore::new(vec![Coordinate {
                id: 1,
                name: "확인".into(),
                x: 100,
                y: 200,
                description: String::new(),
                thumbnail: None,
            }])),
            Arc::new(ImageStore::new([TemplateImage {
                id: 5,
                name: "logo".into(),
                bytes: vec![1, 2, 3],
                confidence: 0.9,
            }])),
            Arc::new(SheetStore::default()),
        )
    }

    struct Fixture {
        resources: Resources,
        reporter: Reporter,
        state: RunState,
        app: AppConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                resources: resources(),
                reporter: Reporter::default(),
                state: RunState::default(),
                app: AppConfig::new(std::env::temp_dir()),
            }
        }

        fn run(
            &self,
            driver: &mut dyn InputDriver,
            row: Option<&Row>,
            kind: ActionKind,
        ) -> Result<(), MacroError> {
            let mut runner = ActionRunner {
                driver,
                resources: &self.resources,
                reporter: &self.reporter,
                state: &self.state,
                pacing: Pacing::none(),
                app: &self.app,
                row,
            };
            runner.run(&Action::new(1, kind))
        }
    }

    fn click_coord(id: Option<ResourceId>) -> ActionKind {
        ActionKind::ClickCoord(ClickCoordParams {
            coord_id: id,
            click_type: MouseButton::Right,
            click_count: 2,
            pre_delay: 0.0,
            post_delay: 0.0,
        })
    }

    #[test]
    fn test_click_coord_resolves_point() {
        let fx = Fixture::new();
        let mut driver = MockInputDriver::new();
        driver
            .expect_click()
            .with(eq(100), eq(200), eq(MouseButton::Right), eq(2))
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        fx.run(&mut driver, None, click_coord(Some(1))).unwrap();
    }

    #[test]
    fn test_click_coord_unknown_id() {
        let fx = Fixture::new();
        let mut driver = MockInputDriver::new();
        driver.expect_click().never();
        let err = fx.run(&mut driver, None, click_coord(Some(42))).unwrap_err();
        assert!(matches!(
            err,
            MacroError::ResourceNotFound {
                kind: ResourceKind::Coordinate,
                id: Some(42)
            }
        ));
        let err = fx.run(&mut driver, None, click_coord(None)).unwrap_err();
        assert!(matches!(err, MacroError::ResourceNotFound { id: None, .. }));
    }

    #[test]
    fn test_click_image_clicks_center() {
        let fx = Fixture::new();
        let mut driver = MockInputDriver::new();
        driver
            .expect_locate_template_on_screen()
            .withf(|bytes, conf| bytes == [1, 2, 3] && (*conf - 0.9).abs() < 1e-6)
            .times(1)
            .returning(|_, _| {
                Ok(Some(Rect {
                    x: 10,
                    y: 10,
                    width: 20,
                    height: 10,
                }))
            });
        driver
            .expect_click()
            .with(eq(20), eq(15), eq(MouseButton::Left), eq(1))
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        fx.run(
            &mut driver,
            None,
            ActionKind::ClickImage(ClickImageParams { image_id: Some(5) }),
        )
        .unwrap();
    }

    #[test]
    fn test_click_image_not_found_is_single_attempt() {
        let fx = Fixture::new();
        let mut driver = MockInputDriver::new();
        driver
            .expect_locate_template_on_screen()
            .times(1)
            .returning(|_, _| Ok(None));
        driver.expect_click().never();
        let err = fx
            .run(
                &mut driver,
                None,
                ActionKind::ClickImage(ClickImageParams { image_id: Some(5) }),
            )
            .unwrap_err();
        assert!(matches!(err, MacroError::TemplateNotFound { ref name } if name == "logo"));
    }

    #[test]
    fn test_type_text_copies_then_pastes() {
        let fx = Fixture::new();
        let mut driver = MockInputDriver::new();
        let mut seq = mockall::Sequence::new();
        driver
            .expect_clipboard_copy()
            .with(eq("안녕하세요"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        driver
            .expect_paste()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        fx.run(
            &mut driver,
            None,
            ActionKind::TypeText(TypeTextParams {
                text: "안녕하세요".into(),
            }),
        )
        .unwrap();
    }

    #[test]
    fn test_type_text_clipboard_failure() {
        let fx = Fixture::new();
        let mut driver = MockInputDriver::new();
        driver
            .expect_clipboard_copy()
            .returning(|_| Err(anyhow::anyhow!("locked")));
        driver.expect_paste().never();
        let err = fx
            .run(
                &mut driver,
                None,
                ActionKind::TypeText(TypeTextParams { text: "x".into() }),
            )
            .unwrap_err();
        assert!(err.to_string().contains("텍스트 타이핑 실패"));
    }

    fn typed(fx: &Fixture, row: Option<&Row>, var_type: VarType, name: &str) -> String {
        let typed = Arc::new(std::sync::Mutex::new(String::new()));
        let sink = Arc::clone(&typed);
        let mut driver = MockInputDriver::new();
        driver.expect_clipboard_copy().returning(move |t| {
            *sink.lock().unwrap() = t.to_string();
            Ok(())
        });
        driver.expect_paste().returning(|| Ok(()));
        fx.run(
            &mut driver,
            row,
            ActionKind::TypeVariable(TypeVariableParams {
                var_type,
                var_name: name.into(),
            }),
        )
        .unwrap();
        let out = typed.lock().unwrap().clone();
        out
    }

    #[test]
    fn test_type_variable_sources() {
        let fx = Fixture::new();
        let row: Row = serde_json::from_value(json!({"name": "김철수", "age": 31})).unwrap();
        assert_eq!(typed(&fx, Some(&row), VarType::Excel, "name"), "김철수");
        assert_eq!(typed(&fx, Some(&row), VarType::Excel, "age"), "31");
        assert_eq!(typed(&fx, Some(&row), VarType::Excel, "missing"), "");
        assert_eq!(typed(&fx, None, VarType::Excel, "name"), "");

        fx.state.set_current_row(7);
        assert_eq!(typed(&fx, None, VarType::Counter, ""), "7");

        let ts = typed(&fx, None, VarType::Timestamp, "");
        assert_eq!(ts.len(), 15);
        assert_eq!(ts.as_bytes()[8], b'_');
        assert!(ts.chars().filter(|c| *c != '_').all(|c| c.is_ascii_digit()));

        assert_eq!(typed(&fx, None, VarType::Other("x".into()), ""), "");
    }

    #[test]
    fn test_wait_image_found_after_polls() {
        let fx = Fixture::new();
        let mut driver = MockInputDriver::new();
        let mut calls = 0;
        driver
            .expect_locate_template_on_screen()
            .times(2)
            .returning(move |_, _| {
                calls += 1;
                Ok((calls == 2).then_some(Rect {
                    x: 0,
                    y: 0,
                    width: 2,
                    height: 2,
                }))
            });
        let started = Instant::now();
        fx.run(
            &mut driver,
            None,
            ActionKind::WaitImage(WaitImageParams {
                image_id: Some(5),
                timeout: 5.0,
            }),
        )
        .unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= WAIT_IMAGE_POLL);
        assert!(elapsed < Duration::from_secs(3));
    }

    #[test]
    fn test_wait_image_timeout() {
        let fx = Fixture::new();
        let mut driver = MockInputDriver::new();
        driver
            .expect_locate_template_on_screen()
            .returning(|_, _| Ok(None));
        let started = Instant::now();
        let err = fx
            .run(
                &mut driver,
                None,
                ActionKind::WaitImage(WaitImageParams {
                    image_id: Some(5),
                    timeout: 1.0,
                }),
            )
            .unwrap_err();
        assert!(matches!(err, MacroError::TimeoutExceeded { timeout, .. } if timeout == 1.0));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(1) + WAIT_IMAGE_POLL * 2);
    }

    #[test]
    fn test_wait_image_cancelled_by_stop() {
        let fx = Fixture::new();
        fx.state.stop();
        let mut driver = MockInputDriver::new();
        driver.expect_locate_template_on_screen().never();
        let err = fx
            .run(
                &mut driver,
                None,
                ActionKind::WaitImage(WaitImageParams {
                    image_id: Some(5),
                    timeout: 30.0,
                }),
            )
            .unwrap_err();
        assert!(matches!(err, MacroError::UserCancelled));
    }

    #[test]
    fn test_wait_image_timeout_excludes_paused_time() {
        let fx = Fixture::new();
        fx.state.pause();
        let mut driver = MockInputDriver::new();
        driver
            .expect_locate_template_on_screen()
            .times(1)
            .returning(|_, _| Ok(None));
        let started = Instant::now();
        let err = thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(300));
                fx.state.resume();
            });
            fx.run(
                &mut driver,
                None,
                ActionKind::WaitImage(WaitImageParams {
                    image_id: Some(5),
                    timeout: 0.2,
                }),
            )
            .unwrap_err()
        });
        assert!(matches!(err, MacroError::TimeoutExceeded { .. }));
        // 300 ms paused, then one full poll interval of waiting.
        assert!(started.elapsed() >= Duration::from_millis(300) + WAIT_IMAGE_POLL);
    }

    #[test]
    fn test_screenshot_written_to_screenshot_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let mut fx = Fixture::new();
        fx.app = AppConfig::new(tmp.path());
        let mut driver = MockInputDriver::new();
        driver
            .expect_screenshot()
            .returning(|| Ok(image::RgbaImage::new(4, 3)));
        fx.run(
            &mut driver,
            None,
            ActionKind::Screenshot(ScreenshotParams {
                filename: Some("../escape/shot.png".into()),
            }),
        )
        .unwrap();
        assert!(fx.app.screenshot_dir().join("shot.png").is_file());
    }

    #[test]
    fn test_memo_delay_and_unknown_do_not_touch_driver() {
        let fx = Fixture::new();
        let mut driver = MockInputDriver::new();
        fx.run(&mut driver, None, ActionKind::Memo(MemoParams { text: "x".into() }))
            .unwrap();
        fx.run(&mut driver, None, ActionKind::Delay(DelayParams { seconds: -1.0 }))
            .unwrap();
        fx.run(
            &mut driver,
            None,
            ActionKind::Unknown {
                kind: "ocr".into(),
                params: json!({}),
            },
        )
        .unwrap();
    }

    #[test]
    fn test_key_press_failure_propagates() {
        let fx = Fixture::new();
        let mut driver = MockInputDriver::new();
        driver
            .expect_key_press()
            .with(eq("hyper"))
            .returning(|_| Err(anyhow::anyhow!("Unknown key name 'hyper'")));
        let err = fx
            .run(
                &mut driver,
                None,
                ActionKind::KeyPress(KeyPressParams { key: "hyper".into() }),
            )
            .unwrap_err();
        assert!(matches!(err, MacroError::Driver(_)));
    }

    #[test]
    fn test_describe() {
        let res = resources();
        let d = |kind| describe(&Action::new(1, kind), &res);
        assert_eq!(d(click_coord(Some(1))), "[좌표:확인] right 클릭");
        assert_eq!(d(click_coord(Some(9))), "[좌표:알 수 없음] right 클릭");
        assert_eq!(
            d(ActionKind::ClickImage(ClickImageParams { image_id: Some(5) })),
            "[이미지:logo] 클릭"
        );
        assert_eq!(
            d(ActionKind::Hotkey(crate::config::HotkeyParams {
                keys: vec!["ctrl".into(), "s".into()]
            })),
            "[단축키] ctrl+s"
        );
        assert_eq!(
            d(ActionKind::TypeVariable(TypeVariableParams {
                var_type: VarType::Excel,
                var_name: "name".into()
            })),
            "[타이핑] {excel:name}"
        );
        let long = "가".repeat(40);
        assert_eq!(
            d(ActionKind::TypeText(TypeTextParams { text: long })),
            format!("[타이핑] {}...", "가".repeat(30))
        );
        assert_eq!(
            d(ActionKind::WaitImage(WaitImageParams {
                image_id: None,
                timeout: 10.0
            })),
            "[이미지 대기] 알 수 없음 (최대 10초)"
        );
    }
}
