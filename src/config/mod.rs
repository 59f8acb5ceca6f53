//! Configuration module for macroflow.
//!
//! Project models as saved by the editor, loading/validation helpers, and the
//! application path layout. Import from here for a convenient, stable API.
//!
//! Example:
//! use macroflow::config::{Project, load_from_path};
//!
//! let project = load_from_path("projects/demo.json")?;

pub mod app;
pub mod loader;
pub mod models;

pub use app::AppConfig;

// Re-export core data models
pub use models::{
    Action, ActionKind, ClickCoordParams, ClickImageParams, Coordinate, DelayParams, ExcelSource,
    ExecutionMode, ExecutionSettings, HotkeyParams, ImageTemplate, KeyPressParams, MemoParams,
    MouseButton, OnError, Project, ProjectSettings, RawAction, ResourceId, Row, ScreenshotParams,
    TypeTextParams, TypeVariableParams, VarType, WaitImageParams,
};

// Re-export loader utilities
pub use loader::{
    generate_schema, load_from_path, load_from_path_async, load_from_reader, load_from_str,
    validate_project, write_schema_to_writer,
};
