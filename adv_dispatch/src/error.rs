use std::path::PathBuf;

use thiserror::Error;

use crate::pattern::Pattern;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("row {row} ({pattern}) can never match: row {shadowed_by} already covers it")]
    ShadowedRow {
        row: usize,
        shadowed_by: usize,
        pattern: Pattern,
    },
    #[error("unknown action kind `{0}`")]
    UnknownAction(String),
    #[error("invalid trigger field `{0}`")]
    InvalidField(String),
    #[error("trigger `{input}` needs 4 fields but has {found}")]
    FieldCount { input: String, found: usize },
    #[error("room `{room}` row {row} references unknown handler `{handler}`")]
    UnknownHandler {
        room: String,
        row: usize,
        handler: String,
    },
    #[error("failed to read room script {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("room script parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
