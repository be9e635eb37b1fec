// ruhoi-interact/src/lib.rs
// ============================================================
// ruhoi-interact  –  Human-object interaction head for RuHOI
// Pairs up detections, assigns multi-label interaction targets
// and classifies every (human, object) box pair.
// ------------------------------------------------------------
// Pipeline: Detections → BoxPairs → pooled features → logits
//                             └──→ InteractionTarget → labels
// ------------------------------------------------------------
// Public API
//   * pair_up_boxes(dets, human)     – candidate pair generator
//   * assign_targets(pairs, gt, thr) – multi-label target matrix
//   * InteractionHead::forward(..)   – per-batch orchestration
// ------------------------------------------------------------
//   Build notes
//     * `--features parallel` runs the per-image loop on rayon.
// ============================================================

//! RuHOI – interaction layer
//!
//! The upstream detector hands us, per image, a set of boxes with one
//! score vector each.  This crate turns those into every plausible
//! `(human, object)` pair, matches the pairs against ground truth when
//! training and maps pooled pair features to per-class interaction
//! logits.  Feature pooling sits behind the [`BoxPairPooler`] trait so a
//! different pooling strategy can be plugged in without touching the
//! head.
//!
//! Images never share mutable state during a forward pass; the only
//! thing they share is the read-only classifier.

use thiserror::Error;

pub mod assign;
pub mod boxes;
pub mod classifier;
pub mod detection;
pub mod head;
pub mod pairing;
pub mod pooling;

pub use assign::{assign_targets, InteractionTarget, PairSampler};
pub use boxes::{box_area, box_iou, box_iou_matrix};
pub use classifier::{sigmoid, Linear, PairwiseClassifier};
pub use detection::Detections;
pub use head::{
    HeadOutput, HoiInstance, ImageInteractions, ImageTrainingOutput, InteractionHead,
    InteractionHeadConfig, Mode,
};
pub use pairing::{pair_up_boxes, BoxPairs};
pub use pooling::{BoxPairPooler, BoxPairRoiPooler, FeatureMaps, MultiScaleRoiAlign, PairCombine, RoiAlignConfig};

/// Object class index reserved for "human" in the detector vocabulary.
pub const HUMAN_CLASS: usize = 0;

#[derive(Debug, Error)]
pub enum InteractError {
    #[error("Targets must be passed in training mode")]
    MissingTargets,
    #[error("Batch length mismatch: {what} has {got} entries, expected {expected}")]
    BatchMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("Invalid {what} shape: expected {expected}, got {got:?}")]
    InvalidShape {
        what: &'static str,
        expected: String,
        got: Vec<usize>,
    },
    #[error("Interaction class {class} out of range for {num_classes} classes")]
    ClassOutOfRange { class: usize, num_classes: usize },
    #[error("Invalid feature maps: {0}")]
    InvalidFeatures(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, InteractError>;
