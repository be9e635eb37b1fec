//! Axis-aligned box geometry in `[x1, y1, x2, y2]` form.

use ndarray::{Array2, ArrayView2};

/// Area of a box; negative extents count as zero.
pub fn box_area(b: &[f32; 4]) -> f32 {
    (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0)
}

/// Intersection-over-union of two boxes.
///
/// A zero union (two degenerate boxes) gives `0.0`, never NaN.
pub fn box_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);
    let iw = (ix2 - ix1).max(0.0);
    let ih = (iy2 - iy1).max(0.0);
    let inter = iw * ih;
    let union = box_area(a) + box_area(b) - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Pairwise IoU between two box sets: `a [N,4]`, `b [M,4]` → `[N,M]`.
///
/// Both inputs must have four columns.
pub fn box_iou_matrix(a: ArrayView2<f32>, b: ArrayView2<f32>) -> Array2<f32> {
    debug_assert_eq!(a.ncols(), 4);
    debug_assert_eq!(b.ncols(), 4);
    Array2::from_shape_fn((a.nrows(), b.nrows()), |(i, j)| {
        box_iou(&row4(a, i), &row4(b, j))
    })
}

pub(crate) fn row4(m: ArrayView2<f32>, i: usize) -> [f32; 4] {
    [m[[i, 0]], m[[i, 1]], m[[i, 2]], m[[i, 3]]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn identical_boxes_have_unit_iou() {
        let b = [0.0, 0.0, 10.0, 10.0];
        assert_eq!(box_iou(&b, &b), 1.0);
    }

    #[test]
    fn disjoint_boxes_have_zero_iou() {
        assert_eq!(box_iou(&[0.0, 0.0, 10.0, 10.0], &[50.0, 50.0, 60.0, 60.0]), 0.0);
    }

    #[test]
    fn half_overlap() {
        // inter 50, union 150
        let iou = box_iou(&[0.0, 0.0, 10.0, 10.0], &[5.0, 0.0, 15.0, 10.0]);
        assert!((iou - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_boxes_do_not_produce_nan() {
        let p = [3.0, 3.0, 3.0, 3.0];
        assert_eq!(box_iou(&p, &p), 0.0);
        assert_eq!(box_area(&[5.0, 5.0, 1.0, 1.0]), 0.0);
    }

    #[test]
    fn matrix_shape_and_values() {
        let a = array![[0.0f32, 0.0, 10.0, 10.0], [50.0, 50.0, 60.0, 60.0]];
        let b = array![[0.0f32, 0.0, 10.0, 10.0]];
        let m = box_iou_matrix(a.view(), b.view());
        assert_eq!(m.shape(), &[2, 1]);
        assert_eq!(m[[0, 0]], 1.0);
        assert_eq!(m[[1, 0]], 0.0);

        let empty = Array2::<f32>::zeros((0, 4));
        assert_eq!(box_iou_matrix(empty.view(), b.view()).shape(), &[0, 1]);
    }
}
