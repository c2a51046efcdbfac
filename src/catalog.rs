//! The schema catalog: every table the assistant knows about.
//!
//! Built once at startup, then shared read-only (usually behind an `Arc`) by
//! every request.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{AssistantError, Result};
use crate::models::TableDescriptor;
use crate::schema;

/// A schema document handed to [`SchemaCatalog::load`]
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    /// Where the document came from, used in error messages
    pub source: String,
    /// Raw document text, possibly holding several tables
    pub content: String,
}

impl SchemaDocument {
    /// Wrap in-memory text
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
        }
    }

    /// Read a document from disk
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::new(path.display().to_string(), content))
    }
}

/// Immutable registry of table descriptors in load order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaCatalog {
    tables: Vec<TableDescriptor>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl SchemaCatalog {
    /// Parse and register every table in `documents`, in order
    pub fn load<I>(documents: I) -> Result<Self>
    where
        I: IntoIterator<Item = SchemaDocument>,
    {
        let mut tables = Vec::new();
        let mut index = HashMap::new();

        for document in documents {
            for table in schema::parse_documents(&document.source, &document.content)? {
                if index.contains_key(&table.name) {
                    return Err(AssistantError::malformed(
                        &document.source,
                        format!("duplicate table '{}'", table.name),
                    ));
                }
                debug!(
                    table = %table.name,
                    columns = table.columns.len(),
                    source = %document.source,
                    "Registered table"
                );
                index.insert(table.name.clone(), tables.len());
                tables.push(table);
            }
        }

        info!(tables = tables.len(), "Schema catalog loaded");
        Ok(Self { tables, index })
    }

    /// Load explicit files, in the given order
    pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let documents = paths
            .iter()
            .map(|p| SchemaDocument::read(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::load(documents)
    }

    /// Load every `*.{extension}` file of a directory in file-name order
    pub fn load_dir(dir: &Path, extension: &str) -> Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == extension))
            .collect();
        paths.sort();

        if paths.is_empty() {
            tracing::warn!(dir = %dir.display(), extension, "No schema documents found");
        }

        Self::load_files(&paths)
    }

    /// Look a table up by exact name
    pub fn lookup(&self, name: &str) -> Result<&TableDescriptor> {
        self.index
            .get(name)
            .map(|&i| &self.tables[i])
            .ok_or_else(|| AssistantError::TableNotFound(name.to_string()))
    }

    /// All tables in load order
    #[must_use]
    pub fn all_tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    /// Table names in load order
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// Number of tables
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// True when no table is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
