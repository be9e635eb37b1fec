//! Pairwise interaction classifier: flatten → FC → ReLU → FC → ReLU → logits.
//!
//! Outputs are independent per-class logits; there is no soft-max across
//! classes since a pair may carry several interactions at once.

use crate::{InteractError, Result};
use ndarray::{Array1, Array2, ArrayView2, ArrayView4};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Fully connected layer, `y = x · Wᵀ + b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LinearParts")]
pub struct Linear {
    /// `[out, in]`
    weight: Array2<f32>,
    /// `[out]`
    bias: Array1<f32>,
}

#[derive(Deserialize)]
struct LinearParts {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl TryFrom<LinearParts> for Linear {
    type Error = InteractError;

    fn try_from(parts: LinearParts) -> Result<Self> {
        Self::from_parts(parts.weight, parts.bias)
    }
}

impl Linear {
    pub fn from_parts(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self> {
        if weight.nrows() != bias.len() {
            return Err(InteractError::InvalidShape {
                what: "bias",
                expected: format!("[{}]", weight.nrows()),
                got: bias.shape().to_vec(),
            });
        }
        Ok(Self { weight, bias })
    }

    /// Uniform initialisation in `±1/√in`.
    pub fn random<R: Rng + ?Sized>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        let k = 1.0 / (in_features.max(1) as f32).sqrt();
        Self {
            weight: Array2::from_shape_fn((out_features, in_features), |_| rng.gen_range(-k..=k)),
            bias: Array1::from_shape_fn(out_features, |_| rng.gen_range(-k..=k)),
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    pub fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        x.dot(&self.weight.t()) + &self.bias
    }
}

/// Shared, read-only weights mapping pooled pair features to logits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ClassifierLayers")]
pub struct PairwiseClassifier {
    fc1: Linear,
    fc2: Linear,
    logistic: Linear,
}

#[derive(Deserialize)]
struct ClassifierLayers {
    fc1: Linear,
    fc2: Linear,
    logistic: Linear,
}

impl TryFrom<ClassifierLayers> for PairwiseClassifier {
    type Error = InteractError;

    fn try_from(layers: ClassifierLayers) -> Result<Self> {
        Self::from_layers(layers.fc1, layers.fc2, layers.logistic)
    }
}

impl PairwiseClassifier {
    /// Randomly initialised classifier for `input_dim` flattened features.
    pub fn new<R: Rng + ?Sized>(
        input_dim: usize,
        representation_size: usize,
        num_classes: usize,
        rng: &mut R,
    ) -> Self {
        Self {
            fc1: Linear::random(input_dim, representation_size, rng),
            fc2: Linear::random(representation_size, representation_size, rng),
            logistic: Linear::random(representation_size, num_classes, rng),
        }
    }

    /// Assemble from trained layers; adjacent layer widths must agree.
    pub fn from_layers(fc1: Linear, fc2: Linear, logistic: Linear) -> Result<Self> {
        if fc1.out_features() != fc2.in_features() || fc2.out_features() != logistic.in_features() {
            return Err(InteractError::InvalidShape {
                what: "classifier layers",
                expected: "matching hidden widths".into(),
                got: vec![
                    fc1.in_features(),
                    fc1.out_features(),
                    fc2.in_features(),
                    fc2.out_features(),
                    logistic.in_features(),
                    logistic.out_features(),
                ],
            });
        }
        Ok(Self { fc1, fc2, logistic })
    }

    pub fn input_dim(&self) -> usize {
        self.fc1.in_features()
    }

    pub fn representation_size(&self) -> usize {
        self.fc1.out_features()
    }

    pub fn num_classes(&self) -> usize {
        self.logistic.out_features()
    }

    /// `pooled [P, C, H, W]` → logits `[P, num_classes]`.
    pub fn forward(&self, pooled: ArrayView4<f32>) -> Result<Array2<f32>> {
        let p = pooled.shape()[0];
        let d: usize = pooled.shape()[1..].iter().product();
        if d != self.input_dim() {
            return Err(InteractError::InvalidShape {
                what: "pooled features",
                expected: format!("[P, ...] with {} elements per pair", self.input_dim()),
                got: pooled.shape().to_vec(),
            });
        }

        let contiguous = pooled.as_standard_layout();
        let flat = contiguous.view().into_shape_with_order((p, d))?;

        let mut x = self.fc1.forward(flat);
        x.mapv_inplace(relu);
        let mut x = self.fc2.forward(x.view());
        x.mapv_inplace(relu);
        Ok(self.logistic.forward(x.view()))
    }
}

fn relu(v: f32) -> f32 {
    v.max(0.0)
}

/// Element-wise logistic function, turning logits into per-class scores.
pub fn sigmoid(logits: ArrayView2<f32>) -> Array2<f32> {
    logits.mapv(|x| 1.0 / (1.0 + (-x).exp()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array4};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn identity(n: usize) -> Linear {
        Linear::from_parts(Array2::eye(n), Array1::zeros(n)).unwrap()
    }

    #[test]
    fn linear_applies_weight_and_bias() {
        let layer = Linear::from_parts(array![[1.0f32, 2.0], [0.0, -1.0]], array![0.5f32, 0.0]).unwrap();
        let y = layer.forward(array![[1.0f32, 1.0]].view());
        assert_eq!(y, array![[3.5f32, -1.0]]);
    }

    #[test]
    fn linear_rejects_bad_bias() {
        assert!(Linear::from_parts(Array2::zeros((2, 3)), Array1::zeros(3)).is_err());
    }

    #[test]
    fn hidden_layers_clip_negatives() {
        let logistic = Linear::from_parts(array![[1.0f32, 1.0]], array![0.0f32]).unwrap();
        let clf = PairwiseClassifier::from_layers(identity(2), identity(2), logistic).unwrap();
        let pooled = Array4::from_shape_vec((1, 2, 1, 1), vec![3.0f32, -5.0]).unwrap();
        let logits = clf.forward(pooled.view()).unwrap();
        assert_eq!(logits, array![[3.0f32]]);
    }

    #[test]
    fn layer_widths_must_chain() {
        let r = PairwiseClassifier::from_layers(identity(2), identity(3), identity(3));
        assert!(r.is_err());
    }

    #[test]
    fn output_shape_and_zero_pairs() {
        let mut rng = StdRng::seed_from_u64(1);
        let clf = PairwiseClassifier::new(4 * 2 * 2, 8, 5, &mut rng);
        assert_eq!(clf.num_classes(), 5);

        let logits = clf.forward(Array4::zeros((3, 4, 2, 2)).view()).unwrap();
        assert_eq!(logits.shape(), &[3, 5]);

        let logits = clf.forward(Array4::zeros((0, 4, 2, 2)).view()).unwrap();
        assert_eq!(logits.shape(), &[0, 5]);

        assert!(clf.forward(Array4::zeros((1, 3, 2, 2)).view()).is_err());
    }

    #[test]
    fn seeded_init_is_reproducible() {
        let a = PairwiseClassifier::new(6, 4, 3, &mut StdRng::seed_from_u64(9));
        let b = PairwiseClassifier::new(6, 4, 3, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn weights_survive_json() {
        let clf = PairwiseClassifier::new(4, 3, 2, &mut StdRng::seed_from_u64(3));
        let json = serde_json::to_string(&clf).unwrap();
        let back: PairwiseClassifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back.input_dim(), 4);
        assert_eq!(back.representation_size(), 3);
        assert_eq!(back.num_classes(), 2);
    }

    fn layer_json(rows: usize, cols: usize) -> serde_json::Value {
        serde_json::to_value(Linear::from_parts(Array2::zeros((rows, cols)), Array1::zeros(rows)).unwrap()).unwrap()
    }

    #[test]
    fn mismatched_weight_file_is_rejected() {
        let json = serde_json::json!({
            "fc1": layer_json(3, 4),
            "fc2": layer_json(2, 5),
            "logistic": layer_json(1, 2),
        });
        let err = serde_json::from_value::<PairwiseClassifier>(json).unwrap_err();
        assert!(err.to_string().contains("classifier layers"));

        let mut bad_bias = layer_json(3, 4);
        bad_bias["bias"] = serde_json::to_value(Array1::<f32>::zeros(2)).unwrap();
        assert!(serde_json::from_value::<Linear>(bad_bias).is_err());
    }

    #[test]
    fn sigmoid_is_independent_per_class() {
        let s = sigmoid(array![[0.0f32, 0.0, 0.0]].view());
        assert!(s.iter().all(|&v| (v - 0.5).abs() < 1e-6));
        assert!((s.sum() - 1.5).abs() < 1e-6);
    }
}
