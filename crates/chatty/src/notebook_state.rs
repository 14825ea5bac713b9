//! The live notebook document that kernel replies are appended to.
//!
//! Cells are keyed by the id the router derives from the kernel message id.
//! That key is the only de-duplication key, so inserting a key that already
//! exists is rejected and leaves the document untouched.
//!
//! nbformat cell ids are limited to 64 characters of `[A-Za-z0-9_-]`. A key
//! outside that set is stored under a UUIDv5 of the key, with the key itself
//! kept in the cell's `chatty` metadata.

use anyhow::Result;
use nbformat::v4::{Cell, CellId, CellMetadata, Metadata, Notebook};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Cell metadata entry holding the original key of a remapped cell.
const KEY_METADATA: &str = "chatty";

/// Cell kinds the router can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Markdown,
}

impl std::fmt::Display for CellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellType::Code => write!(f, "code"),
            CellType::Markdown => write!(f, "markdown"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("cell {0} already exists")]
    DuplicateCellId(String),

    #[error("invalid cell id {id:?}: {reason}")]
    InvalidCellId { id: String, reason: String },
}

/// Flattened cell representation for presentation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "cell_type")]
pub enum FrontendCell {
    #[serde(rename = "code")]
    Code {
        id: String,
        source: String,
        execution_count: Option<i32>,
    },
    #[serde(rename = "markdown")]
    Markdown { id: String, source: String },
    #[serde(rename = "raw")]
    Raw { id: String, source: String },
}

impl FrontendCell {
    pub fn id(&self) -> &str {
        match self {
            FrontendCell::Code { id, .. } => id,
            FrontendCell::Markdown { id, .. } => id,
            FrontendCell::Raw { id, .. } => id,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            FrontendCell::Code { source, .. } => source,
            FrontendCell::Markdown { source, .. } => source,
            FrontendCell::Raw { source, .. } => source,
        }
    }
}

fn cell_metadata(cell: &Cell) -> &CellMetadata {
    match cell {
        Cell::Code { metadata, .. } | Cell::Markdown { metadata, .. } | Cell::Raw { metadata, .. } => {
            metadata
        }
    }
}

/// The key a cell was inserted under: the stored key for remapped cells,
/// otherwise the nbformat id.
pub fn cell_key(cell: &Cell) -> &str {
    cell_metadata(cell)
        .additional
        .get(KEY_METADATA)
        .and_then(|v| v.get("key"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or_else(|| cell.id().as_str())
}

pub fn cell_to_frontend(cell: &Cell) -> FrontendCell {
    let id = cell_key(cell).to_string();
    match cell {
        Cell::Code {
            source,
            execution_count,
            ..
        } => FrontendCell::Code {
            id,
            source: source.join(""),
            execution_count: *execution_count,
        },
        Cell::Markdown { source, .. } => FrontendCell::Markdown {
            id,
            source: source.join(""),
        },
        Cell::Raw { source, .. } => FrontendCell::Raw {
            id,
            source: source.join(""),
        },
    }
}

/// Convert source string to nbformat's Vec<String> (lines with newlines).
fn source_to_lines(source: &str) -> Vec<String> {
    if source.is_empty() {
        return Vec::new();
    }
    source.split_inclusive('\n').map(|s| s.to_string()).collect()
}

fn parse_cell_id(id: &str) -> Result<CellId, DocumentError> {
    serde_json::from_value(serde_json::Value::String(id.to_string())).map_err(|e| {
        DocumentError::InvalidCellId {
            id: id.to_string(),
            reason: e.to_string(),
        }
    })
}

pub struct NotebookState {
    pub notebook: Notebook,
    pub path: Option<PathBuf>,
    pub dirty: bool,
}

impl Default for NotebookState {
    fn default() -> Self {
        Self::new_empty()
    }
}

impl NotebookState {
    /// An nbformat 4.5 notebook with no cells.
    pub fn new_empty() -> Self {
        NotebookState {
            notebook: Notebook {
                metadata: Metadata {
                    kernelspec: None,
                    language_info: None,
                    authors: None,
                    additional: HashMap::new(),
                },
                nbformat: 4,
                nbformat_minor: 5,
                cells: Vec::new(),
            },
            path: None,
            dirty: false,
        }
    }

    pub fn from_notebook(notebook: Notebook, path: PathBuf) -> Self {
        NotebookState {
            notebook,
            path: Some(path),
            dirty: false,
        }
    }

    /// Load an `.ipynb` file, upgrading legacy notebooks to v4.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let nb = nbformat::parse_notebook(&content).map_err(|e| anyhow::anyhow!("{}", e))?;
        let nb_v4 = match nb {
            nbformat::Notebook::V4(nb) => nb,
            nbformat::Notebook::Legacy(legacy) => nbformat::upgrade_legacy_notebook(legacy)?,
        };
        Ok(Self::from_notebook(nb_v4, path.to_path_buf()))
    }

    /// Load `path` if it exists, otherwise start an empty notebook bound to it.
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let mut state = Self::new_empty();
            state.path = Some(path.to_path_buf());
            Ok(state)
        }
    }

    pub fn serialize(&self) -> Result<String> {
        let nb = nbformat::Notebook::V4(self.notebook.clone());
        nbformat::serialize_notebook(&nb).map_err(|e| anyhow::anyhow!("{}", e))
    }

    /// Write the notebook to `path` and remember it as the document's path.
    pub fn save_to(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.serialize()?)?;
        self.path = Some(path.to_path_buf());
        self.dirty = false;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.notebook.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notebook.cells.is_empty()
    }

    pub fn cells_for_frontend(&self) -> Vec<FrontendCell> {
        self.notebook.cells.iter().map(cell_to_frontend).collect()
    }

    /// Find a cell by its key or by its nbformat id.
    pub fn find_cell_index(&self, key: &str) -> Option<usize> {
        self.notebook
            .cells
            .iter()
            .position(|c| cell_key(c) == key || c.id().as_str() == key)
    }

    pub fn get_cell_source(&self, cell_id: &str) -> Option<String> {
        self.find_cell_index(cell_id)
            .map(|idx| self.notebook.cells[idx].source().join(""))
    }

    /// Append a cell to the end of the notebook.
    ///
    /// Existing cells are never reordered or edited.
    pub fn insert_cell(
        &mut self,
        key: &str,
        cell_type: CellType,
        source: &str,
    ) -> Result<(), DocumentError> {
        if self.find_cell_index(key).is_some() {
            return Err(DocumentError::DuplicateCellId(key.to_string()));
        }

        let mut metadata = empty_cell_metadata();
        let cell_id = match parse_cell_id(key) {
            Ok(cell_id) => cell_id,
            Err(_) => {
                let mapped = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string();
                if self.find_cell_index(&mapped).is_some() {
                    return Err(DocumentError::DuplicateCellId(key.to_string()));
                }
                metadata
                    .additional
                    .insert(KEY_METADATA.to_string(), serde_json::json!({ "key": key }));
                parse_cell_id(&mapped)?
            }
        };
        let lines = source_to_lines(source);

        let cell = match cell_type {
            CellType::Code => Cell::Code {
                id: cell_id,
                metadata,
                execution_count: None,
                source: lines,
                outputs: Vec::new(),
            },
            CellType::Markdown => Cell::Markdown {
                id: cell_id,
                metadata,
                source: lines,
                attachments: None,
            },
        };

        self.notebook.cells.push(cell);
        self.dirty = true;
        Ok(())
    }
}

fn empty_cell_metadata() -> CellMetadata {
    CellMetadata {
        id: None,
        collapsed: None,
        scrolled: None,
        deletable: None,
        editable: None,
        format: None,
        name: None,
        tags: None,
        jupyter: None,
        execution: None,
        additional: HashMap::new(),
    }
}
