use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_valid::Validate;
use std::collections::BTreeMap;

/// Identifier of a coordinate, image template or spreadsheet source.
pub type ResourceId = u32;

/// One spreadsheet row: column name -> cell value.
pub type Row = BTreeMap<String, Value>;

/// Root project document as saved by the editor.
///
/// Only the parts the execution engine reads are modeled; unknown fields are
/// ignored on load so newer editor versions stay readable.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, Validate)]
pub struct Project {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Recorded screen coordinates.
    #[serde(default)]
    pub coordinates: Vec<Coordinate>,

    /// Image templates used for on-screen matching.
    #[serde(default)]
    #[validate]
    pub images: Vec<ImageTemplate>,

    /// Spreadsheet data sources. The first one drives `excel_loop` mode.
    #[serde(default)]
    pub excel_sources: Vec<ExcelSource>,

    /// The flow: actions in execution order.
    #[serde(default)]
    #[schemars(with = "Vec<RawAction>")]
    pub flow_sequence: Vec<Action>,

    #[serde(default)]
    #[validate]
    pub settings: ProjectSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, Validate)]
pub struct ProjectSettings {
    /// Editor hotkeys (start/pause/stop/focus). Carried through untouched.
    #[serde(default)]
    pub hotkeys: BTreeMap<String, String>,

    #[serde(default)]
    #[validate]
    pub execution: ExecutionSettings,
}

/// How a run is driven.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate, PartialEq)]
pub struct ExecutionSettings {
    /// Looping strategy (default: `excel_loop`, downgraded when no sheet exists).
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Number of repetitions in `flow_repeat` mode.
    #[serde(default = "default_repeat_count")]
    #[validate(minimum = 1)]
    pub repeat_count: u32,

    /// First spreadsheet row to process (1-based, inclusive).
    #[serde(default = "default_start_row")]
    #[validate(minimum = 1)]
    pub excel_start_row: usize,

    /// Row bound (exclusive, 0-based). `None` means "up to the last row".
    #[serde(default)]
    pub excel_end_row: Option<usize>,

    /// Repeat the spreadsheet window until stopped.
    #[serde(default)]
    pub excel_infinite_loop: bool,

    #[serde(default)]
    pub on_error: OnError,

    /// Extra attempts for the `retry` policy.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Attach a screen capture to every error report.
    #[serde(default)]
    pub screenshot_on_error: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            repeat_count: default_repeat_count(),
            excel_start_row: default_start_row(),
            excel_end_row: None,
            excel_infinite_loop: false,
            on_error: OnError::default(),
            retry_count: default_retry_count(),
            screenshot_on_error: false,
        }
    }
}

fn default_repeat_count() -> u32 {
    1
}

fn default_start_row() -> usize {
    1
}

fn default_retry_count() -> u32 {
    3
}

fn default_confidence() -> f32 {
    0.8
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    ExcelLoop,
    FlowRepeat,
    Infinite,
}

/// Failure policy applied to one row or repetition.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    #[default]
    Skip,
    Stop,
    Retry,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Coordinate {
    pub id: ResourceId,
    #[serde(default)]
    pub name: String,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub description: String,
    /// Base64 PNG thumbnail captured around the point (editor only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate, PartialEq)]
pub struct ImageTemplate {
    pub id: ResourceId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Fallback location of the PNG when `data` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Base64 PNG (a `data:image/...;base64,` prefix is accepted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Match threshold in `[0, 1]`.
    #[serde(default = "default_confidence")]
    #[validate(minimum = 0.0)]
    #[validate(maximum = 1.0)]
    pub confidence: f32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ExcelSource {
    pub id: ResourceId,
    #[serde(default)]
    pub name: String,
    /// File name relative to the project's excel directory.
    #[serde(default)]
    pub filepath: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    /// Column projection; empty means every column.
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    /// Rows embedded in the project instead of a sidecar file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
}

/// Serialized shape of an action: `{ "id": 1, "type": "delay", "params": {...} }`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawAction {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Value,
}

/// One step of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub struct Action {
    pub id: u64,
    pub kind: ActionKind,
}

impl Action {
    pub fn new(id: u64, kind: ActionKind) -> Self {
        Self { id, kind }
    }
}

/// Typed action payloads.
///
/// Resource ids are optional on purpose: a flow referencing a deleted
/// coordinate still loads and fails only when that step runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    ClickCoord(ClickCoordParams),
    ClickImage(ClickImageParams),
    TypeText(TypeTextParams),
    TypeVariable(TypeVariableParams),
    KeyPress(KeyPressParams),
    Hotkey(HotkeyParams),
    Paste,
    Delay(DelayParams),
    WaitImage(WaitImageParams),
    Screenshot(ScreenshotParams),
    Memo(MemoParams),
    /// A type this version does not know. Skipped with a warning.
    Unknown { kind: String, params: Value },
}

impl ActionKind {
    /// Wire name of the action type.
    pub fn type_name(&self) -> &str {
        match self {
            Self::ClickCoord(_) => "click_coord",
            Self::ClickImage(_) => "click_image",
            Self::TypeText(_) => "type_text",
            Self::TypeVariable(_) => "type_variable",
            Self::KeyPress(_) => "key_press",
            Self::Hotkey(_) => "hotkey",
            Self::Paste => "paste",
            Self::Delay(_) => "delay",
            Self::WaitImage(_) => "wait_image",
            Self::Screenshot(_) => "screenshot",
            Self::Memo(_) => "memo",
            Self::Unknown { kind, .. } => kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClickCoordParams {
    #[serde(default)]
    pub coord_id: Option<ResourceId>,
    #[serde(default)]
    pub click_type: MouseButton,
    #[serde(default = "default_click_count")]
    pub click_count: u32,
    /// Seconds to wait before clicking.
    #[serde(default = "default_click_delay")]
    pub pre_delay: f64,
    /// Seconds to wait after clicking.
    #[serde(default = "default_click_delay")]
    pub post_delay: f64,
}

fn default_click_count() -> u32 {
    1
}

fn default_click_delay() -> f64 {
    0.2
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClickImageParams {
    #[serde(default)]
    pub image_id: Option<ResourceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeTextParams {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeVariableParams {
    #[serde(default)]
    pub var_type: VarType,
    #[serde(default)]
    pub var_name: String,
}

/// Source of a typed variable. Unrecognized names type an empty string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum VarType {
    Excel,
    Counter,
    Timestamp,
    #[default]
    None,
    Other(String),
}

impl From<String> for VarType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "excel" => Self::Excel,
            "counter" => Self::Counter,
            "timestamp" => Self::Timestamp,
            "" => Self::None,
            _ => Self::Other(s),
        }
    }
}

impl From<VarType> for String {
    fn from(v: VarType) -> Self {
        match v {
            VarType::Excel => "excel".into(),
            VarType::Counter => "counter".into(),
            VarType::Timestamp => "timestamp".into(),
            VarType::None => String::new(),
            VarType::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyPressParams {
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HotkeyParams {
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DelayParams {
    #[serde(default = "default_delay_seconds")]
    pub seconds: f64,
}

fn default_delay_seconds() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaitImageParams {
    #[serde(default)]
    pub image_id: Option<ResourceId>,
    /// Seconds before giving up.
    #[serde(default = "default_wait_timeout")]
    pub timeout: f64,
}

fn default_wait_timeout() -> f64 {
    10.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenshotParams {
    /// Output file name; a timestamped name is generated when absent.
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoParams {
    #[serde(default)]
    pub text: String,
}

impl TryFrom<RawAction> for Action {
    type Error = serde_json::Error;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        // Parameterless actions are saved with `{}` but older files may carry null.
        let params = match raw.params {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other,
        };
        let kind = match raw.kind.as_str() {
            "click_coord" => ActionKind::ClickCoord(serde_json::from_value(params)?),
            "click_image" => ActionKind::ClickImage(serde_json::from_value(params)?),
            "type_text" => ActionKind::TypeText(serde_json::from_value(params)?),
            "type_variable" => ActionKind::TypeVariable(serde_json::from_value(params)?),
            "key_press" => ActionKind::KeyPress(serde_json::from_value(params)?),
            "hotkey" => ActionKind::Hotkey(serde_json::from_value(params)?),
            "paste" => ActionKind::Paste,
            "delay" => ActionKind::Delay(serde_json::from_value(params)?),
            "wait_image" => ActionKind::WaitImage(serde_json::from_value(params)?),
            "screenshot" => ActionKind::Screenshot(serde_json::from_value(params)?),
            "memo" => ActionKind::Memo(serde_json::from_value(params)?),
            _ => ActionKind::Unknown {
                kind: raw.kind,
                params,
            },
        };
        Ok(Self { id: raw.id, kind })
    }
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        let kind = action.kind.type_name().to_string();
        let params = match action.kind {
            ActionKind::ClickCoord(p) => serde_json::to_value(p),
            ActionKind::ClickImage(p) => serde_json::to_value(p),
            ActionKind::TypeText(p) => serde_json::to_value(p),
            ActionKind::TypeVariable(p) => serde_json::to_value(p),
            ActionKind::KeyPress(p) => serde_json::to_value(p),
            ActionKind::Hotkey(p) => serde_json::to_value(p),
            ActionKind::Paste => Ok(Value::Object(serde_json::Map::new())),
            ActionKind::Delay(p) => serde_json::to_value(p),
            ActionKind::WaitImage(p) => serde_json::to_value(p),
            ActionKind::Screenshot(p) => serde_json::to_value(p),
            ActionKind::Memo(p) => serde_json::to_value(p),
            ActionKind::Unknown { params, .. } => Ok(params),
        }
        .unwrap_or_default();
        Self {
            id: action.id,
            kind,
            params,
        }
    }
}

/// Mouse button enumeration.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Middle,
    Right,
}

impl MouseButton {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Middle => "middle",
            Self::Right => "right",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_from_editor_json() {
        let v = json!({
            "name": "demo",
            "coordinates": [{"id": 1, "name": "ok", "x": 10, "y": 20, "thumbnail": null}],
            "images": [{"id": 2, "name": "logo", "data": "aGk=", "confidence": 0.9}],
            "excel_sources": [{"id": 1, "name": "s", "filepath": "a.json", "sheet_name": "Sheet1",
                                "columns": ["name"], "row_count": 3, "preview": []}],
            "flow_sequence": [
                {"id": 1, "type": "click_coord", "params": {"coord_id": 1, "click_type": "right"}},
                {"id": 2, "type": "delay", "params": {"seconds": 0.5}},
                {"id": 3, "type": "paste", "params": {}}
            ],
            "settings": {
                "hotkeys": {"start": "F9"},
                "execution": {"mode": "flow_repeat", "repeat_count": 2, "excel_end_row": null,
                               "on_error": "retry", "retry_count": 1, "speed": "normal"}
            },
            "created_at": "2024-01-01T00:00:00"
        });
        let p: Project = serde_json::from_value(v).unwrap();
        assert_eq!(p.coordinates[0].x, 10);
        assert_eq!(p.images[0].confidence, 0.9);
        assert_eq!(p.settings.execution.mode, ExecutionMode::FlowRepeat);
        assert_eq!(p.settings.execution.on_error, OnError::Retry);
        assert_eq!(p.settings.execution.excel_start_row, 1);
        assert_eq!(p.flow_sequence.len(), 3);
        match &p.flow_sequence[0].kind {
            ActionKind::ClickCoord(c) => {
                assert_eq!(c.coord_id, Some(1));
                assert_eq!(c.click_type, MouseButton::Right);
                assert_eq!(c.click_count, 1);
                assert_eq!(c.pre_delay, 0.2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(p.flow_sequence[2].kind, ActionKind::Paste);
    }

    #[test]
    fn test_execution_defaults_match_editor() {
        let s: ExecutionSettings = serde_json::from_value(json!({})).unwrap();
        assert_eq!(s, ExecutionSettings::default());
        assert_eq!(s.mode, ExecutionMode::ExcelLoop);
        assert_eq!(s.retry_count, 3);
        assert_eq!(s.on_error, OnError::Skip);
    }

    #[test]
    fn test_unknown_action_type_is_kept() {
        let a: Action =
            serde_json::from_value(json!({"id": 7, "type": "ocr_read", "params": {"x": 1}}))
                .unwrap();
        assert_eq!(a.kind.type_name(), "ocr_read");
        let back = serde_json::to_value(&a).unwrap();
        assert_eq!(back, json!({"id": 7, "type": "ocr_read", "params": {"x": 1}}));
    }

    #[test]
    fn test_missing_ids_are_lazy() {
        let a: Action =
            serde_json::from_value(json!({"id": 1, "type": "click_image", "params": null}))
                .unwrap();
        assert_eq!(a.kind, ActionKind::ClickImage(ClickImageParams { image_id: None }));
    }

    #[test]
    fn test_wrongly_typed_params_fail_to_load() {
        let r = serde_json::from_value::<Action>(
            json!({"id": 1, "type": "delay", "params": {"seconds": "soon"}}),
        );
        assert!(r.is_err());
    }

    #[test]
    fn test_var_type_strings() {
        let p: TypeVariableParams =
            serde_json::from_value(json!({"var_type": "counter"})).unwrap();
        assert_eq!(p.var_type, VarType::Counter);
        let p: TypeVariableParams =
            serde_json::from_value(json!({"var_type": "weird", "var_name": "a"})).unwrap();
        assert_eq!(p.var_type, VarType::Other("weird".into()));
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            json!({"var_type": "weird", "var_name": "a"})
        );
    }
}
