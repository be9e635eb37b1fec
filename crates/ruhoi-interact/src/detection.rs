//! Detection ingestion: one image's boxes and class scores in a uniform form.

use crate::{InteractError, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Detections for a single image.
///
/// `boxes` is `[N, 4]` at absolute image scale, `scores` is `[N, C]` over
/// the object vocabulary.  `N` may be zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Detections {
    boxes: Array2<f32>,
    scores: Array2<f32>,
}

impl Detections {
    /// Wrap detector output, checking that the two arrays agree.
    ///
    /// Box geometry is not validated; degenerate boxes are matched like
    /// any other.
    pub fn new(boxes: Array2<f32>, scores: Array2<f32>) -> Result<Self> {
        if boxes.ncols() != 4 {
            return Err(InteractError::InvalidShape {
                what: "boxes",
                expected: "[N, 4]".into(),
                got: boxes.shape().to_vec(),
            });
        }
        if scores.ncols() == 0 {
            return Err(InteractError::InvalidShape {
                what: "scores",
                expected: "[N, C] with C > 0".into(),
                got: scores.shape().to_vec(),
            });
        }
        if scores.nrows() != boxes.nrows() {
            return Err(InteractError::InvalidShape {
                what: "scores",
                expected: format!("[{}, C]", boxes.nrows()),
                got: scores.shape().to_vec(),
            });
        }
        Ok(Self { boxes, scores })
    }

    /// An image without detections over a `num_object_classes` vocabulary.
    pub fn empty(num_object_classes: usize) -> Self {
        Self {
            boxes: Array2::zeros((0, 4)),
            scores: Array2::zeros((0, num_object_classes)),
        }
    }

    /// Build from per-detection `(bbox, scores)` records.
    pub fn from_items<'a, I>(num_object_classes: usize, items: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a [f32; 4], &'a [f32])>,
    {
        let mut boxes = Vec::new();
        let mut scores = Vec::new();
        for (bbox, s) in items {
            if s.len() != num_object_classes {
                return Err(InteractError::InvalidShape {
                    what: "score vector",
                    expected: format!("[{num_object_classes}]"),
                    got: vec![s.len()],
                });
            }
            boxes.extend_from_slice(bbox);
            scores.extend_from_slice(s);
        }
        let n = boxes.len() / 4;
        Self::new(
            Array2::from_shape_vec((n, 4), boxes)?,
            Array2::from_shape_vec((n, num_object_classes), scores)?,
        )
    }

    pub fn len(&self) -> usize {
        self.boxes.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_object_classes(&self) -> usize {
        self.scores.ncols()
    }

    pub fn boxes(&self) -> ArrayView2<'_, f32> {
        self.boxes.view()
    }

    pub fn scores(&self) -> ArrayView2<'_, f32> {
        self.scores.view()
    }

    /// Arg-max object class per detection; ties go to the lowest index.
    pub fn labels(&self) -> Array1<usize> {
        self.scores
            .axis_iter(Axis(0))
            .map(|row| {
                let mut best = 0;
                for (c, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = c;
                    }
                }
                best
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn rejects_mismatched_rows() {
        let boxes = array![[0.0f32, 0.0, 1.0, 1.0]];
        let scores = Array2::<f32>::zeros((2, 3));
        assert!(matches!(
            Detections::new(boxes, scores),
            Err(InteractError::InvalidShape { what: "scores", .. })
        ));
    }

    #[test]
    fn rejects_empty_class_vocabulary() {
        let r = Detections::new(Array2::zeros((2, 4)), Array2::zeros((2, 0)));
        assert!(matches!(r, Err(InteractError::InvalidShape { what: "scores", .. })));
        assert!(Detections::from_items(0, std::iter::empty::<(&[f32; 4], &[f32])>()).is_err());
    }

    #[test]
    fn rejects_wrong_box_width() {
        let boxes = Array2::<f32>::zeros((1, 5));
        let scores = Array2::<f32>::zeros((1, 3));
        assert!(Detections::new(boxes, scores).is_err());
    }

    #[test]
    fn labels_take_first_maximum() {
        let dets = Detections::new(
            array![[0.0f32, 0.0, 1.0, 1.0], [0.0, 0.0, 2.0, 2.0]],
            array![[0.4f32, 0.4, 0.2], [0.1, 0.2, 0.7]],
        )
        .unwrap();
        assert_eq!(dets.labels().to_vec(), vec![0, 2]);
    }

    #[test]
    fn from_items_and_empty() {
        let b = [0.0f32, 0.0, 4.0, 4.0];
        let s = [0.9f32, 0.1];
        let dets = Detections::from_items(2, [(&b, &s[..])]).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets.num_object_classes(), 2);

        let bad = [0.9f32];
        assert!(Detections::from_items(2, [(&b, &bad[..])]).is_err());

        let none = Detections::empty(80);
        assert!(none.is_empty());
        assert!(none.labels().is_empty());
    }
}
