//! CSV persistence for the per-brand tables.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::error::PipelineError;
use crate::pipeline::Stage;

/// Write rows to `path`, replacing any previous table.
///
/// Rows go to a sibling temp file that is renamed into place, so a failure
/// never leaves a half-written table behind.
pub fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }

    let tmp_path = path.with_extension("csv.tmp");
    let table_err = |source| PipelineError::Table {
        path: path.to_path_buf(),
        source,
    };

    {
        let mut writer = csv::Writer::from_path(&tmp_path).map_err(table_err)?;
        for row in rows {
            writer.serialize(row).map_err(table_err)?;
        }
        writer
            .flush()
            .map_err(|e| PipelineError::io(&tmp_path, e))?;
    }

    std::fs::rename(&tmp_path, path).map_err(|e| PipelineError::io(path, e))?;
    debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Read every row of a table
pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PipelineError> {
    let table_err = |source| PipelineError::Table {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(table_err)?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(table_err)
}

/// Load an upstream table a stage depends on, refusing when it is absent or empty
pub fn require_table<T: DeserializeOwned>(
    stage: Stage,
    what: &'static str,
    producer: Stage,
    path: &Path,
) -> Result<Vec<T>, PipelineError> {
    let missing = || PipelineError::PrerequisiteMissing {
        stage,
        what,
        producer,
        path: path.to_path_buf(),
    };

    if !path.is_file() {
        return Err(missing());
    }

    let rows: Vec<T> = read_table(path)?;
    if rows.is_empty() {
        return Err(missing());
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawComment;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn comment(id: &str, parent: Option<&str>) -> RawComment {
        RawComment {
            comment_id: id.to_string(),
            video_id: "vid1".to_string(),
            video_title: "Unboxing, \"first look\"".to_string(),
            author: "@viewer".to_string(),
            text: "Love it\nbut the price...".to_string(),
            like_count: 3,
            published_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            parent_id: parent.map(str::to_string),
        }
    }

    #[test]
    fn test_table_preserves_quotes_newlines_and_optional_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("brand").join("comments.csv");
        let rows = vec![comment("c1", None), comment("c2", Some("c1"))];

        write_table(&path, &rows).unwrap();
        let loaded: Vec<RawComment> = read_table(&path).unwrap();

        assert_eq!(loaded, rows);
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[test]
    fn test_require_table_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.csv");
        let err = require_table::<RawComment>(
            Stage::Analyze,
            "raw-comments table",
            Stage::Comments,
            &path,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::PrerequisiteMissing { .. }));
    }

    #[test]
    fn test_require_table_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        write_table::<RawComment>(&path, &[]).unwrap();

        let err = require_table::<RawComment>(
            Stage::Analyze,
            "raw-comments table",
            Stage::Comments,
            &path,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
