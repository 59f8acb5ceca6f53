//! Error types for the macro engine.
//!
//! Messages are shown to the operator through the error callback, so they use
//! the product's UI language.

use std::fmt;

use thiserror::Error;

use crate::config::ResourceId;

/// Kind of resource an action refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Coordinate,
    Image,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coordinate => f.write_str("좌표"),
            Self::Image => f.write_str("이미지"),
        }
    }
}

#[derive(Debug, Error)]
pub enum MacroError {
    /// An action refers to a coordinate or image that does not exist.
    #[error("{kind} ID {}를 찾을 수 없습니다.", display_id(.id))]
    ResourceNotFound {
        kind: ResourceKind,
        id: Option<ResourceId>,
    },

    /// A single template lookup found nothing.
    #[error("이미지 '{name}'을(를) 찾을 수 없습니다.")]
    TemplateNotFound { name: String },

    /// `wait_image` gave up.
    #[error("이미지 '{name}'을(를) {timeout}초 내에 찾을 수 없습니다.")]
    TimeoutExceeded { name: String, timeout: f64 },

    /// Stop was requested during a cancellable wait.
    #[error("사용자가 중지했습니다.")]
    UserCancelled,

    /// A step failed; `index` is 1-based.
    #[error("액션 {index} 실행 오류: {source}")]
    ActionFailed {
        index: usize,
        #[source]
        source: Box<MacroError>,
    },

    /// The input driver (mouse, keyboard, clipboard, screen) failed.
    #[error("{0:#}")]
    Driver(#[from] anyhow::Error),

    #[error("엑셀 데이터 소스가 없습니다.")]
    NoSpreadsheetSource,

    #[error("엑셀 데이터를 로드할 수 없습니다: {0}")]
    Spreadsheet(String),

    #[error("이미 실행 중입니다.")]
    AlreadyRunning,
}

impl MacroError {
    pub fn not_found(kind: ResourceKind, id: Option<ResourceId>) -> Self {
        Self::ResourceNotFound { kind, id }
    }

    /// The innermost error, looking through `ActionFailed` wrappers.
    pub fn root(&self) -> &MacroError {
        match self {
            Self::ActionFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// 1-based index of the failing action, if known.
    pub fn action_index(&self) -> Option<usize> {
        match self {
            Self::ActionFailed { index, .. } => Some(*index),
            _ => None,
        }
    }
}

fn display_id(id: &Option<ResourceId>) -> String {
    id.map_or_else(|| "(없음)".to_string(), |id| id.to_string())
}
