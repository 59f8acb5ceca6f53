/*!
Resource providers consumed by the execution engine.

The engine never reaches into the project document directly; it asks three
independent lookup services:

- `CoordinateProvider` -> recorded screen points by id
- `ImageProvider`      -> decoded template images by id
- `SheetProvider`      -> spreadsheet sources and their rows

Project-backed implementations live in `coordinates.rs`, `images.rs` and
`sheets.rs`. `Resources` bundles one of each so it can be passed around as a
unit.
*/

use std::sync::Arc;

use serde_json::Value;

use crate::config::{AppConfig, Coordinate, Project, ResourceId, Row};

pub mod coordinates;
pub mod images;
pub mod sheets;

pub use coordinates::CoordinateStore;
pub use images::{ImageStore, TemplateImage};
pub use sheets::SheetStore;

/// Lookup of recorded screen coordinates.
pub trait CoordinateProvider: Send + Sync {
    fn get_coordinate(&self, id: ResourceId) -> Option<Coordinate>;
}

/// Lookup of image templates.
pub trait ImageProvider: Send + Sync {
    fn get_image(&self, id: ResourceId) -> Option<Arc<TemplateImage>>;
}

/// Access to spreadsheet data sources.
pub trait SheetProvider: Send + Sync {
    /// Registered source ids, in registration order.
    fn source_ids(&self) -> Vec<ResourceId>;

    /// Load every row of a source, in sheet order.
    fn load_rows(&self, source_id: ResourceId) -> anyhow::Result<Vec<Row>>;

    /// Row count recorded for a source, if known without loading it.
    fn row_count(&self, source_id: ResourceId) -> Option<usize>;

    fn has_sources(&self) -> bool {
        !self.source_ids().is_empty()
    }
}

/// The three providers the engine needs, shared behind `Arc`s.
#[derive(Clone)]
pub struct Resources {
    pub coordinates: Arc<dyn CoordinateProvider>,
    pub images: Arc<dyn ImageProvider>,
    pub sheets: Arc<dyn SheetProvider>,
}

impl Resources {
    pub fn new(
        coordinates: Arc<dyn CoordinateProvider>,
        images: Arc<dyn ImageProvider>,
        sheets: Arc<dyn SheetProvider>,
    ) -> Self {
        Self {
            coordinates,
            images,
            sheets,
        }
    }

    /// Build project-backed providers.
    pub fn from_project(project: &Project, app: &AppConfig) -> Self {
        Self::new(
            Arc::new(CoordinateStore::new(project.coordinates.clone())),
            Arc::new(ImageStore::from_templates(&project.images, app)),
            Arc::new(SheetStore::new(project.excel_sources.clone(), app.excel_dir())),
        )
    }

    /// Providers with no data at all.
    pub fn empty() -> Self {
        Self::new(
            Arc::new(CoordinateStore::default()),
            Arc::new(ImageStore::default()),
            Arc::new(SheetStore::default()),
        )
    }
}

/// Render a spreadsheet cell the way it is typed into the target application:
/// - Strings are returned as-is.
/// - Null (empty cell) becomes an empty string.
/// - Numbers/bools/arrays/objects are rendered as compact JSON.
pub fn cell_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
