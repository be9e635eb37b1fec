//! Ground-truth assignment for candidate box pairs (training only).
//!
//! A pair matches a ground-truth interaction when *both* of its boxes are
//! well localised: `min(IoU(human), IoU(object)) >= fg_iou_thresh`.  Every
//! match sets `labels[pair, hoi]`, so one pair can collect several classes
//! and one ground-truth record can label several pairs.

use crate::boxes::box_iou_matrix;
use crate::pairing::BoxPairs;
use crate::{InteractError, Result};
use log::debug;
use ndarray::{Array2, ArrayView2, Axis, Zip};
use rand::seq::SliceRandom;
use rand::Rng;

/// Ground-truth interactions of one image: `G` parallel records.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionTarget {
    boxes_h: Array2<f32>,
    boxes_o: Array2<f32>,
    hoi: Vec<usize>,
}

impl InteractionTarget {
    pub fn new(boxes_h: Array2<f32>, boxes_o: Array2<f32>, hoi: Vec<usize>) -> Result<Self> {
        for (what, b) in [("boxes_h", &boxes_h), ("boxes_o", &boxes_o)] {
            if b.ncols() != 4 || b.nrows() != hoi.len() {
                return Err(InteractError::InvalidShape {
                    what,
                    expected: format!("[{}, 4]", hoi.len()),
                    got: b.shape().to_vec(),
                });
            }
        }
        Ok(Self {
            boxes_h,
            boxes_o,
            hoi,
        })
    }

    /// Build from per-record box lists, as stored in annotation files.
    pub fn from_records(boxes_h: &[[f32; 4]], boxes_o: &[[f32; 4]], hoi: &[usize]) -> Result<Self> {
        let h = Array2::from_shape_vec((boxes_h.len(), 4), boxes_h.concat())?;
        let o = Array2::from_shape_vec((boxes_o.len(), 4), boxes_o.concat())?;
        Self::new(h, o, hoi.to_vec())
    }

    pub fn len(&self) -> usize {
        self.hoi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hoi.is_empty()
    }

    pub fn boxes_h(&self) -> ArrayView2<'_, f32> {
        self.boxes_h.view()
    }

    pub fn boxes_o(&self) -> ArrayView2<'_, f32> {
        self.boxes_o.view()
    }

    pub fn hoi(&self) -> &[usize] {
        &self.hoi
    }
}

/// Build the `[P, num_classes]` multi-label matrix for one image.
///
/// Entries are `0.0` or `1.0`.  An all-zero row is a negative for every
/// class; there is no background column.
pub fn assign_targets(
    pairs: &BoxPairs,
    target: &InteractionTarget,
    num_classes: usize,
    fg_iou_thresh: f32,
) -> Result<Array2<f32>> {
    if let Some(&class) = target.hoi.iter().find(|&&c| c >= num_classes) {
        return Err(InteractError::ClassOutOfRange { class, num_classes });
    }

    let mut labels = Array2::<f32>::zeros((pairs.len(), num_classes));
    let mut overlap = box_iou_matrix(pairs.human_boxes(), target.boxes_h());
    let iou_o = box_iou_matrix(pairs.object_boxes(), target.boxes_o());
    Zip::from(&mut overlap).and(&iou_o).for_each(|h, &o| *h = (*h).min(o));

    let mut matches = 0usize;
    for ((p, g), &iou) in overlap.indexed_iter() {
        if iou >= fg_iou_thresh {
            labels[[p, target.hoi[g]]] = 1.0;
            matches += 1;
        }
    }
    debug!(
        "assigned {} matches over {} pairs × {} ground-truth records",
        matches,
        pairs.len(),
        target.len()
    );

    Ok(labels)
}

/// Balanced positive/negative subsampling of labelled pairs.
///
/// Positive pairs are rows with at least one label.  Up to
/// `floor(num_pairs × positive_fraction)` positives are drawn, and the
/// remainder of the budget is filled with negatives.  When an image has
/// fewer pairs than the budget every pair is kept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairSampler {
    num_pairs: usize,
    positive_fraction: f32,
}

impl PairSampler {
    pub fn new(num_pairs: usize, positive_fraction: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&positive_fraction) {
            return Err(InteractError::InvalidConfig(format!(
                "positive_fraction must lie in [0, 1], got {positive_fraction}"
            )));
        }
        Ok(Self {
            num_pairs,
            positive_fraction,
        })
    }

    pub fn num_pairs(&self) -> usize {
        self.num_pairs
    }

    pub fn positive_fraction(&self) -> f32 {
        self.positive_fraction
    }

    /// Row indices to keep, ascending.
    pub fn sample<R: Rng + ?Sized>(&self, labels: ArrayView2<f32>, rng: &mut R) -> Vec<usize> {
        let total = labels.nrows();
        if total <= self.num_pairs {
            return (0..total).collect();
        }

        let (mut positives, mut negatives): (Vec<usize>, Vec<usize>) = (0..total)
            .partition(|&p| labels.index_axis(Axis(0), p).iter().any(|&v| v > 0.0));

        let num_pos = positives
            .len()
            .min((self.num_pairs as f32 * self.positive_fraction) as usize)
            .min(self.num_pairs);
        let num_neg = negatives.len().min(self.num_pairs.saturating_sub(num_pos));

        positives.shuffle(rng);
        negatives.shuffle(rng);

        let mut keep: Vec<usize> = positives
            .into_iter()
            .take(num_pos)
            .chain(negatives.into_iter().take(num_neg))
            .collect();
        keep.sort_unstable();
        keep
    }
}
