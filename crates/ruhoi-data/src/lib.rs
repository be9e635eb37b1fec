//! # ruhoi-data
//!
//! Dataset side of RuHOI: reads HICO-DET style annotation files and hands
//! out per-image ground truth in the form the interaction head consumes.
//!
//! ## Annotation file
//!
//! A single JSON document with
//!
//! - `filenames` – image file names, position = image id
//! - `annotation` – one record per image id (`boxes_h`, `boxes_o`, `hoi`, …)
//! - `class` – `[hoi_idx, obj_idx, verb_idx]` triples, zero-based
//! - `empty` – ids of images without any interaction instance
//!
//! Images listed in `empty` are skipped when iterating; ids keep pointing
//! into the full `filenames` / `annotation` arrays.

use std::path::PathBuf;
use thiserror::Error;

pub mod hicodet;

pub use hicodet::{Annotation, HicoDet, Sample};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("Failed to read annotation file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed annotation file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Annotation file lists {filenames} file names but {annotations} annotations")]
    LengthMismatch { filenames: usize, annotations: usize },
    #[error("Empty image id {id} is out of range for {total} images")]
    EmptyIdOutOfRange { id: usize, total: usize },
    #[error("Empty image id {0} is listed more than once")]
    DuplicateEmptyId(usize),
}

pub type Result<T> = std::result::Result<T, DataError>;
