//! Candidate pair generation: every human detection against every detection.

use crate::detection::Detections;
use ndarray::{s, Array2, ArrayView2, Axis};

/// Candidate `(human, object)` pairs for one image.
///
/// `paired_idx` is `[P, 2]` with indices into the image's detections;
/// `paired_boxes` is `[P, 8]`, the human box followed by the object box.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxPairs {
    pub paired_idx: Array2<usize>,
    pub paired_boxes: Array2<f32>,
}

impl BoxPairs {
    pub fn empty() -> Self {
        Self {
            paired_idx: Array2::zeros((0, 2)),
            paired_boxes: Array2::zeros((0, 8)),
        }
    }

    pub fn len(&self) -> usize {
        self.paired_idx.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-side boxes, `[P, 4]`.
    pub fn human_boxes(&self) -> ArrayView2<'_, f32> {
        self.paired_boxes.slice(s![.., ..4])
    }

    /// Object-side boxes, `[P, 4]`.
    pub fn object_boxes(&self) -> ArrayView2<'_, f32> {
        self.paired_boxes.slice(s![.., 4..])
    }

    /// Keep only the pairs at `rows`, in the given order.
    pub fn select(&self, rows: &[usize]) -> Self {
        Self {
            paired_idx: self.paired_idx.select(Axis(0), rows),
            paired_boxes: self.paired_boxes.select(Axis(0), rows),
        }
    }
}

/// Cross every detection whose arg-max class is `human_class` with all
/// detections of the image, itself included.
///
/// Pairs are ordered human-major: `(h0, 0), (h0, 1), …, (h1, 0), …`.
/// The pair count is always `#humans × N`; no humans gives zero pairs.
pub fn pair_up_boxes(detections: &Detections, human_class: usize) -> BoxPairs {
    let n = detections.len();
    let humans: Vec<usize> = detections
        .labels()
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c == human_class)
        .map(|(i, _)| i)
        .collect();

    let p = humans.len() * n;
    if p == 0 {
        return BoxPairs::empty();
    }

    let boxes = detections.boxes();
    let mut paired_idx = Array2::<usize>::zeros((p, 2));
    let mut paired_boxes = Array2::<f32>::zeros((p, 8));
    for (k, &h) in humans.iter().enumerate() {
        for o in 0..n {
            let row = k * n + o;
            paired_idx[[row, 0]] = h;
            paired_idx[[row, 1]] = o;
            paired_boxes.slice_mut(s![row, ..4]).assign(&boxes.row(h));
            paired_boxes.slice_mut(s![row, 4..]).assign(&boxes.row(o));
        }
    }

    BoxPairs {
        paired_idx,
        paired_boxes,
    }
}
