use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, warn};

use super::ImageProvider;
use crate::config::{AppConfig, ImageTemplate, ResourceId};

/// A template ready for matching: encoded image bytes plus its threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateImage {
    pub id: ResourceId,
    pub name: String,
    /// Encoded image file contents (PNG as captured by the editor).
    pub bytes: Vec<u8>,
    pub confidence: f32,
}

/// Image templates decoded once at construction.
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    images: HashMap<ResourceId, Arc<TemplateImage>>,
}

impl ImageStore {
    pub fn new(images: impl IntoIterator<Item = TemplateImage>) -> Self {
        Self {
            images: images
                .into_iter()
                .map(|img| (img.id, Arc::new(img)))
                .collect(),
        }
    }

    /// Decode project templates. Templates that cannot be decoded are left
    /// out with a warning, so steps using them fail as "not found".
    pub fn from_templates(templates: &[ImageTemplate], app: &AppConfig) -> Self {
        let mut images = HashMap::with_capacity(templates.len());
        for t in templates {
            match template_bytes(t, app) {
                Ok(bytes) => {
                    debug!(target: "macroflow::providers", id = t.id, name = %t.name, len = bytes.len(), "Template loaded");
                    images.insert(
                        t.id,
                        Arc::new(TemplateImage {
                            id: t.id,
                            name: t.name.clone(),
                            bytes,
                            confidence: t.confidence,
                        }),
                    );
                }
                Err(e) => {
                    warn!(target: "macroflow::providers", id = t.id, name = %t.name, error = %format!("{e:#}"), "Skipping unreadable template");
                }
            }
        }
        Self { images }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl ImageProvider for ImageStore {
    fn get_image(&self, id: ResourceId) -> Option<Arc<TemplateImage>> {
        self.images.get(&id).cloned()
    }
}

/// Bytes of a template: inline base64 first, then the file on disk.
fn template_bytes(t: &ImageTemplate, app: &AppConfig) -> Result<Vec<u8>> {
    if let Some(data) = t.data.as_deref().filter(|d| !d.is_empty()) {
        return decode_base64_image(data);
    }
    if let Some(path) = t.path.as_deref() {
        let resolved = app.resolve(path);
        return fs::read(&resolved)
            .with_context(|| format!("Failed to read template {}", resolved.display()));
    }
    if let Some(filename) = t.filename.as_deref() {
        let resolved = app.images_dir().join(filename);
        return fs::read(&resolved)
            .with_context(|| format!("Failed to read template {}", resolved.display()));
    }
    bail!("template has neither data nor path")
}

/// Decode base64 image data, accepting a `data:image/png;base64,` prefix.
pub fn decode_base64_image(data: &str) -> Result<Vec<u8>> {
    let payload = match data.split_once(',') {
        Some((header, rest)) if header.starts_with("data:image") => rest,
        _ => data,
    };
    STANDARD
        .decode(payload.trim())
        .context("Invalid base64 image data")
}
