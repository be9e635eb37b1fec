//! HICO-DET dataset index.

use crate::{DataError, Result};
use log::info;
use ruhoi_interact::InteractionTarget;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Ground-truth interactions of one image, as stored in the annotation file.
///
/// Fields other than the three the head needs (e.g. `verb`, `object`) are
/// kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub boxes_h: Vec<[f32; 4]>,
    pub boxes_o: Vec<[f32; 4]>,
    pub hoi: Vec<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Annotation {
    pub fn len(&self) -> usize {
        self.hoi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hoi.is_empty()
    }

    pub fn to_target(&self) -> ruhoi_interact::Result<InteractionTarget> {
        InteractionTarget::from_records(&self.boxes_h, &self.boxes_o, &self.hoi)
    }
}

#[derive(Debug, Deserialize)]
struct AnnotationFile {
    filenames: Vec<String>,
    annotation: Vec<Annotation>,
    class: Vec<[usize; 3]>,
    #[serde(default)]
    empty: Vec<usize>,
}

/// One image of the dataset.
#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
    /// Index into the full file list
    pub image_id: usize,
    pub filename: &'a str,
    pub annotation: &'a Annotation,
}

impl Sample<'_> {
    /// Image path under `root`.
    pub fn path(&self, root: &Path) -> PathBuf {
        root.join(self.filename)
    }
}

/// HICO-DET annotations indexed for iteration.
///
/// Image decoding is left to the caller; [`HicoDet::image_path`] gives the
/// file to open.
#[derive(Debug, Clone)]
pub struct HicoDet {
    root: PathBuf,
    anno_file: PathBuf,
    idx: Vec<usize>,
    annotations: Vec<Annotation>,
    filenames: Vec<String>,
    class_corr: Vec<[usize; 3]>,
    empty_idx: Vec<usize>,
}

impl HicoDet {
    /// Read and index `anno_file`; images live under `root`.
    pub fn new(root: impl Into<PathBuf>, anno_file: impl Into<PathBuf>) -> Result<Self> {
        let anno_file = anno_file.into();
        let file = File::open(&anno_file).map_err(|source| DataError::Io {
            path: anno_file.clone(),
            source,
        })?;
        let parsed: AnnotationFile = serde_json::from_reader(BufReader::new(file))?;
        Self::index(root.into(), anno_file, parsed)
    }

    /// Async variant of [`HicoDet::new`].
    pub async fn load(root: impl Into<PathBuf>, anno_file: impl Into<PathBuf>) -> Result<Self> {
        let anno_file = anno_file.into();
        let bytes = tokio::fs::read(&anno_file).await.map_err(|source| DataError::Io {
            path: anno_file.clone(),
            source,
        })?;
        let parsed: AnnotationFile = serde_json::from_slice(&bytes)?;
        Self::index(root.into(), anno_file, parsed)
    }

    fn index(root: PathBuf, anno_file: PathBuf, f: AnnotationFile) -> Result<Self> {
        let total = f.filenames.len();
        if f.annotation.len() != total {
            return Err(DataError::LengthMismatch {
                filenames: total,
                annotations: f.annotation.len(),
            });
        }

        let mut is_empty = vec![false; total];
        for &id in &f.empty {
            match is_empty.get_mut(id) {
                None => return Err(DataError::EmptyIdOutOfRange { id, total }),
                Some(true) => return Err(DataError::DuplicateEmptyId(id)),
                Some(flag) => *flag = true,
            }
        }
        let idx: Vec<usize> = (0..total).filter(|&i| !is_empty[i]).collect();

        info!(
            "Loaded {} images ({} without interactions) and {} classes from {:?}",
            total,
            f.empty.len(),
            f.class.len(),
            anno_file
        );

        Ok(Self {
            root,
            anno_file,
            idx,
            annotations: f.annotation,
            filenames: f.filenames,
            class_corr: f.class,
            empty_idx: f.empty,
        })
    }

    /// Number of images with at least one interaction.
    pub fn len(&self) -> usize {
        self.idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }

    /// The `i`-th non-empty image.
    pub fn get(&self, i: usize) -> Option<Sample<'_>> {
        let image_id = *self.idx.get(i)?;
        Some(Sample {
            image_id,
            filename: &self.filenames[image_id],
            annotation: &self.annotations[image_id],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Sample<'_>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    pub fn image_path(&self, i: usize) -> Option<PathBuf> {
        self.get(i).map(|s| s.path(&self.root))
    }

    /// File name for a raw image id, empty images included.
    pub fn filename(&self, image_id: usize) -> Option<&str> {
        self.filenames.get(image_id).map(String::as_str)
    }

    /// Class correspondence `[hoi_idx, obj_idx, verb_idx]`.
    ///
    /// Returns an owned copy; changing it does not affect the dataset.
    pub fn class_corr(&self) -> Vec<[usize; 3]> {
        self.class_corr.clone()
    }

    pub fn num_classes(&self) -> usize {
        self.class_corr.len()
    }

    pub fn empty_ids(&self) -> &[usize] {
        &self.empty_idx
    }

    pub fn total_images(&self) -> usize {
        self.filenames.len()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn anno_file(&self) -> &Path {
        &self.anno_file
    }
}

impl fmt::Display for HicoDet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dataset: HicoDet")?;
        writeln!(f, "\tNumber of images: {}", self.len())?;
        writeln!(f, "\tImage directory: {}", self.root.display())?;
        writeln!(f, "\tAnnotation file: {}", self.anno_file.display())
    }
}
