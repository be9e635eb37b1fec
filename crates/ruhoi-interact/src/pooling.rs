//! Joint feature pooling for box pairs.
//!
//! The head only depends on [`BoxPairPooler`]; [`BoxPairRoiPooler`] is the
//! stock implementation, built on multi-scale RoI-align over a feature
//! pyramid.

use crate::pairing::BoxPairs;
use crate::{InteractError, Result};
use ndarray::{concatenate, Array3, Array4, ArrayView2, ArrayView3, ArrayViewMut3, Axis, Zip};
use serde::{Deserialize, Serialize};

/// Feature pyramid of one image.
///
/// Each level is `[C, H, W]` with its spatial scale (feature size over
/// image size, e.g. `1/4`, `1/8`, …), finest level first.
#[derive(Debug, Clone)]
pub struct FeatureMaps {
    levels: Vec<Array3<f32>>,
    scales: Vec<f32>,
}

impl FeatureMaps {
    pub fn new(levels: Vec<Array3<f32>>, scales: Vec<f32>) -> Result<Self> {
        if levels.is_empty() {
            return Err(InteractError::InvalidFeatures("no feature levels".into()));
        }
        if levels.len() != scales.len() {
            return Err(InteractError::InvalidFeatures(format!(
                "{} levels but {} scales",
                levels.len(),
                scales.len()
            )));
        }
        let channels = levels[0].shape()[0];
        if levels.iter().any(|l| l.shape()[0] != channels) {
            return Err(InteractError::InvalidFeatures("levels disagree on channel count".into()));
        }
        if scales.iter().any(|&s| !(s > 0.0)) {
            return Err(InteractError::InvalidFeatures("spatial scales must be positive".into()));
        }
        if scales.windows(2).any(|w| w[1] >= w[0]) {
            return Err(InteractError::InvalidFeatures(format!(
                "levels must go from finest to coarsest, got scales {:?}",
                scales
            )));
        }
        Ok(Self { levels, scales })
    }

    /// A single-level pyramid.
    pub fn single(map: Array3<f32>, scale: f32) -> Result<Self> {
        Self::new(vec![map], vec![scale])
    }

    pub fn channels(&self) -> usize {
        self.levels[0].shape()[0]
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }
}

/// Turns an image's feature maps and its box pairs into one
/// fixed-shape feature map per pair, `[P, C, H, W]`.
///
/// Zero pairs must yield `[0, C, H, W]`.
pub trait BoxPairPooler: Send + Sync {
    /// `(C, H, W)` of a single pooled pair.
    fn output_shape(&self) -> [usize; 3];

    fn pool(&self, features: &FeatureMaps, pairs: &BoxPairs) -> Result<Array4<f32>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiAlignConfig {
    /// Pooled size `(height, width)`.
    pub output_size: (usize, usize),
    /// Bilinear samples per bin along each axis.
    pub sampling_ratio: usize,
    pub canonical_scale: f32,
    pub canonical_level: f32,
}

impl Default for RoiAlignConfig {
    fn default() -> Self {
        Self {
            output_size: (7, 7),
            sampling_ratio: 2,
            canonical_scale: 224.0,
            canonical_level: 4.0,
        }
    }
}

/// RoI-align over a feature pyramid, picking a level per box by its size.
#[derive(Debug, Clone, Default)]
pub struct MultiScaleRoiAlign {
    config: RoiAlignConfig,
}

impl MultiScaleRoiAlign {
    pub fn new(config: RoiAlignConfig) -> Result<Self> {
        let (h, w) = config.output_size;
        if h == 0 || w == 0 || config.sampling_ratio == 0 {
            return Err(InteractError::InvalidConfig(
                "RoI-align output size and sampling ratio must be non-zero".into(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &RoiAlignConfig {
        &self.config
    }

    /// Pyramid level index for a box at image scale.
    pub fn level_for(&self, features: &FeatureMaps, b: [f32; 4]) -> usize {
        let lvl_min = -features.scales[0].log2().round();
        let lvl_max = -features.scales[features.scales.len() - 1].log2().round();
        let size = ((b[2] - b[0]) * (b[3] - b[1])).max(0.0).sqrt();
        let target = (self.config.canonical_level
            + (size / self.config.canonical_scale).log2()
            + 1e-6)
            .floor();
        // log2(0) is -inf, clamp takes care of it
        let target = if target.is_nan() { lvl_min } else { target.clamp(lvl_min, lvl_max) };
        ((target - lvl_min) as usize).min(features.num_levels() - 1)
    }

    /// Pool `boxes [K, 4]` to `[K, C, out_h, out_w]`.
    pub fn pool(&self, features: &FeatureMaps, boxes: ArrayView2<f32>) -> Array4<f32> {
        let (oh, ow) = self.config.output_size;
        let mut out = Array4::<f32>::zeros((boxes.nrows(), features.channels(), oh, ow));
        for (k, mut dst) in out.outer_iter_mut().enumerate() {
            let b = [boxes[[k, 0]], boxes[[k, 1]], boxes[[k, 2]], boxes[[k, 3]]];
            let lvl = self.level_for(features, b);
            roi_align(
                features.levels[lvl].view(),
                b,
                features.scales[lvl],
                self.config.sampling_ratio,
                dst.view_mut(),
            );
        }
        out
    }
}

/// How the human-side and object-side pooled maps are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairCombine {
    /// Stack along channels: `C' = 2C`.
    Concat,
    Max,
    Mean,
}

/// Pools each side of a pair independently and combines the two maps.
#[derive(Debug, Clone)]
pub struct BoxPairRoiPooler {
    roi: MultiScaleRoiAlign,
    channels: usize,
    combine: PairCombine,
}

impl BoxPairRoiPooler {
    /// `channels` is the channel count of the feature maps this pooler
    /// will be fed.
    pub fn new(channels: usize, config: RoiAlignConfig, combine: PairCombine) -> Result<Self> {
        Ok(Self {
            roi: MultiScaleRoiAlign::new(config)?,
            channels,
            combine,
        })
    }
}

impl BoxPairPooler for BoxPairRoiPooler {
    fn output_shape(&self) -> [usize; 3] {
        let (h, w) = self.roi.config().output_size;
        let c = match self.combine {
            PairCombine::Concat => 2 * self.channels,
            PairCombine::Max | PairCombine::Mean => self.channels,
        };
        [c, h, w]
    }

    fn pool(&self, features: &FeatureMaps, pairs: &BoxPairs) -> Result<Array4<f32>> {
        if features.channels() != self.channels {
            return Err(InteractError::InvalidFeatures(format!(
                "pooler expects {} channels, feature maps have {}",
                self.channels,
                features.channels()
            )));
        }

        let mut h = self.roi.pool(features, pairs.human_boxes());
        let o = self.roi.pool(features, pairs.object_boxes());
        Ok(match self.combine {
            PairCombine::Concat => concatenate(Axis(1), &[h.view(), o.view()])?,
            PairCombine::Max => {
                Zip::from(&mut h).and(&o).for_each(|a, &b| *a = (*a).max(b));
                h
            }
            PairCombine::Mean => {
                Zip::from(&mut h).and(&o).for_each(|a, &b| *a = 0.5 * (*a + b));
                h
            }
        })
    }
}

/// Average of bilinear samples per output bin, non-aligned convention.
fn roi_align(map: ArrayView3<f32>, b: [f32; 4], scale: f32, sampling_ratio: usize, mut out: ArrayViewMut3<f32>) {
    let (ph, pw) = (out.shape()[1], out.shape()[2]);
    let x0 = b[0] * scale;
    let y0 = b[1] * scale;
    let roi_w = (b[2] * scale - x0).max(1.0);
    let roi_h = (b[3] * scale - y0).max(1.0);
    let bin_w = roi_w / pw as f32;
    let bin_h = roi_h / ph as f32;
    let grid = sampling_ratio as f32;
    let count = (sampling_ratio * sampling_ratio) as f32;

    for (c, mut plane) in out.outer_iter_mut().enumerate() {
        let src = map.index_axis(Axis(0), c);
        for by in 0..ph {
            for bx in 0..pw {
                let mut acc = 0.0;
                for iy in 0..sampling_ratio {
                    let y = y0 + by as f32 * bin_h + (iy as f32 + 0.5) * bin_h / grid;
                    for ix in 0..sampling_ratio {
                        let x = x0 + bx as f32 * bin_w + (ix as f32 + 0.5) * bin_w / grid;
                        acc += bilinear(src, y, x);
                    }
                }
                plane[[by, bx]] = acc / count;
            }
        }
    }
}

fn bilinear(src: ArrayView2<f32>, y: f32, x: f32) -> f32 {
    let (h, w) = (src.nrows(), src.ncols());
    if h == 0 || w == 0 || y < -1.0 || y > h as f32 || x < -1.0 || x > w as f32 {
        return 0.0;
    }
    let (y_lo, y_hi, y) = neighbours(y.max(0.0), h);
    let (x_lo, x_hi, x) = neighbours(x.max(0.0), w);

    let ly = y - y_lo as f32;
    let lx = x - x_lo as f32;
    let (hy, hx) = (1.0 - ly, 1.0 - lx);
    hy * hx * src[[y_lo, x_lo]] + hy * lx * src[[y_lo, x_hi]] + ly * hx * src[[y_hi, x_lo]] + ly * lx * src[[y_hi, x_hi]]
}

/// Lower/upper sample index along one axis; past the last cell both
/// collapse onto it.
fn neighbours(v: f32, len: usize) -> (usize, usize, f32) {
    let lo = v as usize;
    if lo >= len - 1 {
        (len - 1, len - 1, (len - 1) as f32)
    } else {
        (lo, lo + 1, v)
    }
}
