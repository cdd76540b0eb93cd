//! Data types for uploads, documents, chunks, and search results.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RagError, Result};

/// The formats accepted at the upload boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Plain UTF-8 text (`.txt`).
    Text,
    /// Markdown, treated as plain text (`.md`, `.markdown`).
    Markdown,
    /// Portable Document Format (`.pdf`).
    Pdf,
    /// Office Open XML word processing (`.docx`).
    Docx,
}

impl DocumentFormat {
    /// Map a file extension (without the dot, any case) to a format.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::UnsupportedFormat`] for anything but
    /// `txt`, `md`, `markdown`, `pdf` and `docx`.
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "txt" => Ok(Self::Text),
            "md" | "markdown" => Ok(Self::Markdown),
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            other => Err(RagError::UnsupportedFormat { extension: other.to_string() }),
        }
    }

    /// Infer the format from a file name's extension.
    pub fn from_file_name(name: &str) -> Result<Self> {
        let extension = Path::new(name).extension().and_then(|e| e.to_str()).unwrap_or("");
        Self::from_extension(extension)
    }

    /// The canonical extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Markdown => "md",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A file as received at the upload boundary, before extraction.
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    /// Generated identifier, carried over to the extracted [`Document`].
    pub id: String,
    /// The file name as uploaded; used as the source label in citations.
    pub name: String,
    /// The declared format.
    pub format: DocumentFormat,
    /// The raw file contents.
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Create an upload, inferring the format from `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::UnsupportedFormat`] if the extension is not accepted.
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let name = name.into();
        let format = DocumentFormat::from_file_name(&name)?;
        Ok(Self::with_format(name, format, bytes))
    }

    /// Create an upload with an explicitly declared format.
    pub fn with_format(
        name: impl Into<String>,
        format: DocumentFormat,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self { id: Uuid::new_v4().to_string(), name: name.into(), format, bytes: bytes.into() }
    }

    /// Read a file from disk. The upload is named after the file name.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::UnsupportedFormat`] for unaccepted extensions
    /// (checked before reading) and [`RagError::CorruptDocument`] if the
    /// file cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let format = DocumentFormat::from_file_name(&name)?;
        let bytes = std::fs::read(path).map_err(|e| RagError::corrupt(&name, e.to_string()))?;
        Ok(Self::with_format(name, format, bytes))
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("format", &self.format)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// The extracted text of one upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Identifier inherited from the [`Upload`].
    pub id: String,
    /// The uploaded file name, used as the citation label.
    pub name: String,
    /// The extracted UTF-8 text.
    pub text: String,
}

impl Document {
    /// Create a document with a fresh identifier.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4().to_string(), name: name.into(), text: text.into() }
    }
}

/// A contiguous slice of a [`Document`]'s text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// `{document_id}_{ordinal}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// The parent document's name.
    pub source: String,
    /// Position of this chunk within its document, starting at 0.
    pub ordinal: usize,
    /// Start of the chunk in the document text, in characters.
    pub offset: usize,
    /// The chunk text.
    pub text: String,
}

impl Chunk {
    pub(crate) fn new(document: &Document, ordinal: usize, offset: usize, text: String) -> Self {
        Self {
            id: format!("{}_{ordinal}", document.id),
            document_id: document.id.clone(),
            source: document.name.clone(),
            ordinal,
            offset,
            text,
        }
    }

    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// The first `max_chars` characters of the text.
    pub fn preview(&self, max_chars: usize) -> &str {
        match self.text.char_indices().nth(max_chars) {
            Some((end, _)) => &self.text[..end],
            None => &self.text,
        }
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query, in `[-1, 1]` (higher is more relevant).
    pub score: f32,
}
