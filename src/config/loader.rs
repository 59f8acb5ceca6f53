use anyhow::{Context, Result, anyhow};
use schemars::{Schema, schema_for};
use serde_valid::Validate;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};

use super::models::{ActionKind, Project, ResourceId};

/// Load a project from a string slice.
pub fn load_from_str(s: &str) -> Result<Project> {
    let project: Project =
        serde_json::from_str(s).context("Failed to parse project JSON string")?;
    validate_project(&project)?;
    Ok(project)
}

/// Load a project from any reader (e.g., a file).
pub fn load_from_reader<R: Read>(reader: R) -> Result<Project> {
    let project: Project =
        serde_json::from_reader(reader).context("Failed to parse project JSON from reader")?;
    validate_project(&project)?;
    Ok(project)
}

/// Load a project from a file path synchronously.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Project> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open project file {}", path_ref.display()))?;
    let project = load_from_reader(file)?;
    debug!(target: "macroflow::config", "Loaded project from {}", path_ref.display());
    Ok(project)
}

/// Load a project from a file path asynchronously (Tokio).
pub async fn load_from_path_async<P: AsRef<Path>>(path: P) -> Result<Project> {
    use tokio::fs;
    let path_ref = path.as_ref();
    let bytes = fs::read(path_ref)
        .await
        .with_context(|| format!("Failed to read project file {}", path_ref.display()))?;
    let project: Project = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse project JSON from {}", path_ref.display()))?;
    validate_project(&project)?;
    debug!(target: "macroflow::config", "Loaded project from {}", path_ref.display());
    Ok(project)
}

/// Generate the JSON Schema for the project model.
pub fn generate_schema() -> Schema {
    schema_for!(Project)
}

/// Write the JSON Schema for the project model to any writer (pretty-printed).
pub fn write_schema_to_writer<W: Write>(mut writer: W) -> Result<()> {
    let schema = generate_schema();
    let json = serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?;
    writer
        .write_all(json.as_bytes())
        .context("Failed to write schema to writer")?;
    Ok(())
}

/// Check value constraints and report dangling references.
///
/// Constraint violations (zero repeat count, confidence outside `[0, 1]`, ...)
/// are errors. Actions pointing at missing coordinates or images are only
/// warned about: the editor allows deleting a resource still in use, and such
/// a step fails when it runs.
pub fn validate_project(project: &Project) -> Result<()> {
    project
        .validate()
        .map_err(|e| anyhow!("Invalid project settings: {e}"))?;

    let coords: BTreeSet<ResourceId> = project.coordinates.iter().map(|c| c.id).collect();
    let images: BTreeSet<ResourceId> = project.images.iter().map(|i| i.id).collect();

    for (idx, action) in project.flow_sequence.iter().enumerate() {
        let dangling = match &action.kind {
            ActionKind::ClickCoord(p) => p.coord_id.filter(|id| !coords.contains(id)),
            ActionKind::ClickImage(p) => p.image_id.filter(|id| !images.contains(id)),
            ActionKind::WaitImage(p) => p.image_id.filter(|id| !images.contains(id)),
            _ => None,
        };
        if let Some(id) = dangling {
            warn!(
                target: "macroflow::config",
                step = idx + 1,
                action = action.kind.type_name(),
                id,
                "Action references a missing resource; it will fail at run time"
            );
        }
        if let ActionKind::Unknown { kind, .. } = &action.kind {
            warn!(
                target: "macroflow::config",
                step = idx + 1,
                %kind,
                "Unknown action type; it will be skipped"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const SAMPLE: &str = r#"{
        "name": "sample",
        "coordinates": [{"id": 1, "name": "btn", "x": 5, "y": 6}],
        "flow_sequence": [
            {"id": 1, "type": "click_coord", "params": {"coord_id": 1}},
            {"id": 2, "type": "click_coord", "params": {"coord_id": 99}},
            {"id": 3, "type": "memo", "params": {"text": "note"}}
        ],
        "settings": {"execution": {"mode": "infinite"}}
    }"#;

    #[test]
    fn test_load_from_str_tolerates_dangling_ids() {
        let p = load_from_str(SAMPLE).unwrap();
        assert_eq!(p.flow_sequence.len(), 3);
    }

    #[test]
    fn test_rejects_zero_repeat_count() {
        let err = load_from_str(r#"{"settings": {"execution": {"repeat_count": 0}}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("Invalid project settings"));
    }

    #[test]
    fn test_rejects_confidence_out_of_range() {
        let r = load_from_str(r#"{"images": [{"id": 1, "name": "x", "confidence": 1.5}]}"#);
        assert!(r.is_err());
    }

    #[test]
    fn test_load_from_path() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();
        let p = load_from_path(f.path()).unwrap();
        assert_eq!(p.name, "sample");
        assert!(load_from_path(f.path().with_extension("missing")).is_err());
    }

    #[tokio::test]
    async fn test_load_from_path_async() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();
        let p = load_from_path_async(f.path()).await.unwrap();
        assert_eq!(p.coordinates[0].name, "btn");
    }

    #[test]
    fn test_schema_mentions_flow() {
        let mut out = Vec::new();
        write_schema_to_writer(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("flow_sequence"));
        assert!(text.contains("excel_infinite_loop"));
    }
}
