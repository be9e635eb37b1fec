//! Interaction head: runs pairing, assignment, pooling and classification
//! over a batch of images.
//!
//! The mode is an explicit argument of every forward pass.  Training needs
//! ground truth for every image and returns label/logit matrices for an
//! external multi-label loss; inference returns per-pair class scores.

use crate::assign::{assign_targets, InteractionTarget, PairSampler};
use crate::classifier::{sigmoid, PairwiseClassifier};
use crate::detection::Detections;
use crate::pairing::{pair_up_boxes, BoxPairs};
use crate::pooling::{BoxPairPooler, FeatureMaps};
use crate::{InteractError, Result, HUMAN_CLASS};
use log::{debug, warn};
use ndarray::{Array2, Axis};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Configuration for the interaction head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionHeadConfig {
    /// Object class index treated as human
    pub human_class: usize,
    /// Size of the interaction vocabulary
    pub num_classes: usize,
    /// Width of the two hidden layers
    pub representation_size: usize,
    /// Minimum per-side IoU for a positive match
    pub fg_iou_thresh: f32,
    /// Pair budget per image for `forward_sampled`
    pub num_box_pairs_per_image: usize,
    /// Share of the budget given to positive pairs
    pub positive_fraction: f32,
}

impl Default for InteractionHeadConfig {
    fn default() -> Self {
        Self {
            human_class: HUMAN_CLASS,
            num_classes: 600,
            representation_size: 1024,
            fg_iou_thresh: 0.5,
            num_box_pairs_per_image: 512,
            positive_fraction: 0.25,
        }
    }
}

impl InteractionHeadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 || self.representation_size == 0 {
            return Err(InteractError::InvalidConfig(
                "num_classes and representation_size must be non-zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.fg_iou_thresh) {
            return Err(InteractError::InvalidConfig(format!(
                "fg_iou_thresh must lie in [0, 1], got {}",
                self.fg_iou_thresh
            )));
        }
        self.sampler().map(|_| ())
    }

    pub fn sampler(&self) -> Result<PairSampler> {
        PairSampler::new(self.num_box_pairs_per_image, self.positive_fraction)
    }
}

/// Which path a forward pass takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Training,
    Inference,
}

/// Training result for one image.
#[derive(Debug, Clone)]
pub struct ImageTrainingOutput {
    pub pairs: BoxPairs,
    /// `[P, num_classes]`, entries in `{0, 1}`
    pub labels: Array2<f32>,
    /// `[P, num_classes]`
    pub logits: Array2<f32>,
}

/// Inference result for one image.
#[derive(Debug, Clone)]
pub struct ImageInteractions {
    /// `[P, 2]` indices into the image's detections
    pub paired_idx: Array2<usize>,
    /// `[P, num_classes]` independent per-class scores in `(0, 1)`
    pub scores: Array2<f32>,
}

/// One scored interaction, mapped back onto the image's detections.
#[derive(Debug, Clone, PartialEq)]
pub struct HoiInstance {
    pub human: usize,
    pub object: usize,
    pub hoi: usize,
    pub score: f32,
    pub box_h: [f32; 4],
    pub box_o: [f32; 4],
}

impl ImageInteractions {
    pub fn len(&self) -> usize {
        self.paired_idx.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every `(pair, class)` with a score of at least `min_score`, highest
    /// score first.
    ///
    /// `detections` must be the detections these pairs were built from.
    pub fn instances(&self, detections: &Detections, min_score: f32) -> Result<Vec<HoiInstance>> {
        if self.scores.nrows() != self.paired_idx.nrows() {
            return Err(InteractError::BatchMismatch {
                what: "scores",
                expected: self.paired_idx.nrows(),
                got: self.scores.nrows(),
            });
        }
        if let Some(&max) = self.paired_idx.iter().max() {
            if max >= detections.len() {
                return Err(InteractError::BatchMismatch {
                    what: "detections",
                    expected: max + 1,
                    got: detections.len(),
                });
            }
        }

        let boxes = detections.boxes();
        let corners = |i: usize| [boxes[[i, 0]], boxes[[i, 1]], boxes[[i, 2]], boxes[[i, 3]]];
        let mut out = Vec::new();
        for ((p, hoi), &score) in self.scores.indexed_iter() {
            if score >= min_score {
                let (human, object) = (self.paired_idx[[p, 0]], self.paired_idx[[p, 1]]);
                out.push(HoiInstance {
                    human,
                    object,
                    hoi,
                    score,
                    box_h: corners(human),
                    box_o: corners(object),
                });
            }
        }
        out.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(out)
    }
}

/// Output of [`InteractionHead::forward`], one entry per image.
#[derive(Debug, Clone)]
pub enum HeadOutput {
    Training(Vec<ImageTrainingOutput>),
    Inference(Vec<ImageInteractions>),
}

impl HeadOutput {
    pub fn into_training(self) -> Option<Vec<ImageTrainingOutput>> {
        match self {
            Self::Training(v) => Some(v),
            Self::Inference(_) => None,
        }
    }

    pub fn into_inference(self) -> Option<Vec<ImageInteractions>> {
        match self {
            Self::Inference(v) => Some(v),
            Self::Training(_) => None,
        }
    }
}

/// Box-pair interaction head over a pluggable pooler.
pub struct InteractionHead<P: BoxPairPooler> {
    pooler: P,
    classifier: PairwiseClassifier,
    config: InteractionHeadConfig,
}

impl<P: BoxPairPooler> InteractionHead<P> {
    /// The classifier must accept the pooler's output and produce
    /// `config.num_classes` logits.
    pub fn new(pooler: P, classifier: PairwiseClassifier, config: InteractionHeadConfig) -> Result<Self> {
        config.validate()?;
        let pooled: usize = pooler.output_shape().iter().product();
        if classifier.input_dim() != pooled {
            return Err(InteractError::InvalidConfig(format!(
                "classifier takes {} features, pooler produces {:?}",
                classifier.input_dim(),
                pooler.output_shape()
            )));
        }
        if classifier.num_classes() != config.num_classes {
            return Err(InteractError::InvalidConfig(format!(
                "classifier has {} outputs, config expects {} classes",
                classifier.num_classes(),
                config.num_classes
            )));
        }
        Ok(Self {
            pooler,
            classifier,
            config,
        })
    }

    /// Head with a freshly initialised classifier sized from `config`.
    pub fn with_random_weights<R: Rng + ?Sized>(pooler: P, config: InteractionHeadConfig, rng: &mut R) -> Result<Self> {
        let input_dim = pooler.output_shape().iter().product();
        let classifier = PairwiseClassifier::new(input_dim, config.representation_size, config.num_classes, rng);
        Self::new(pooler, classifier, config)
    }

    pub fn config(&self) -> &InteractionHeadConfig {
        &self.config
    }

    pub fn classifier(&self) -> &PairwiseClassifier {
        &self.classifier
    }

    pub fn pooler(&self) -> &P {
        &self.pooler
    }

    /// Pair up every image's detections and classify the pairs.
    ///
    /// In [`Mode::Training`] `targets` is required, one per image; its
    /// absence is an error raised before any work is done.  Targets passed
    /// in [`Mode::Inference`] are ignored.
    pub fn forward(
        &self,
        features: &[FeatureMaps],
        detections: &[Detections],
        targets: Option<&[InteractionTarget]>,
        mode: Mode,
    ) -> Result<HeadOutput> {
        match mode {
            Mode::Training => {
                let targets = targets.ok_or(InteractError::MissingTargets)?;
                self.check_batch(features, detections, Some(targets))?;
                let outputs = map_images(detections.len(), |i| {
                    let (pairs, labels) = self.pair_and_assign(i, &detections[i], &targets[i])?;
                    let logits = self.classify(&features[i], &pairs)?;
                    Ok(ImageTrainingOutput { pairs, labels, logits })
                })?;
                Ok(HeadOutput::Training(outputs))
            }
            Mode::Inference => {
                if targets.is_some() {
                    debug!("targets given in inference mode are ignored");
                }
                self.check_batch(features, detections, None)?;
                let outputs = map_images(detections.len(), |i| {
                    let pairs = pair_up_boxes(&detections[i], self.config.human_class);
                    debug!("image {}: {} box pairs", i, pairs.len());
                    let logits = self.classify(&features[i], &pairs)?;
                    Ok(ImageInteractions {
                        scores: sigmoid(logits.view()),
                        paired_idx: pairs.paired_idx,
                    })
                })?;
                Ok(HeadOutput::Inference(outputs))
            }
        }
    }

    /// Training pass that keeps at most `num_box_pairs_per_image` pairs per
    /// image, `positive_fraction` of them positive where available.
    ///
    /// Pairs are drawn with `rng` image by image in batch order, so a
    /// seeded generator reproduces the same selection.
    pub fn forward_sampled(
        &self,
        features: &[FeatureMaps],
        detections: &[Detections],
        targets: &[InteractionTarget],
        rng: &mut dyn RngCore,
    ) -> Result<Vec<ImageTrainingOutput>> {
        self.check_batch(features, detections, Some(targets))?;
        let sampler = self.config.sampler()?;

        let assigned = map_images(detections.len(), |i| self.pair_and_assign(i, &detections[i], &targets[i]))?;
        let sampled: Vec<(BoxPairs, Array2<f32>)> = assigned
            .into_iter()
            .map(|(pairs, labels)| {
                let keep = sampler.sample(labels.view(), &mut *rng);
                if keep.len() == pairs.len() {
                    (pairs, labels)
                } else {
                    (pairs.select(&keep), labels.select(Axis(0), &keep))
                }
            })
            .collect();

        let logits = map_images(sampled.len(), |i| self.classify(&features[i], &sampled[i].0))?;
        Ok(sampled
            .into_iter()
            .zip(logits)
            .map(|((pairs, labels), logits)| ImageTrainingOutput { pairs, labels, logits })
            .collect())
    }

    fn check_batch(
        &self,
        features: &[FeatureMaps],
        detections: &[Detections],
        targets: Option<&[InteractionTarget]>,
    ) -> Result<()> {
        let n = detections.len();
        if features.len() != n {
            return Err(InteractError::BatchMismatch {
                what: "features",
                expected: n,
                got: features.len(),
            });
        }
        if let Some(t) = targets {
            if t.len() != n {
                return Err(InteractError::BatchMismatch {
                    what: "targets",
                    expected: n,
                    got: t.len(),
                });
            }
        }
        Ok(())
    }

    fn pair_and_assign(
        &self,
        image: usize,
        detections: &Detections,
        target: &InteractionTarget,
    ) -> Result<(BoxPairs, Array2<f32>)> {
        let pairs = pair_up_boxes(detections, self.config.human_class);
        if pairs.is_empty() && !target.is_empty() {
            warn!(
                "image {}: no human detections, {} ground-truth interactions left unmatched",
                image,
                target.len()
            );
        }
        let labels = assign_targets(&pairs, target, self.config.num_classes, self.config.fg_iou_thresh)?;
        debug!("image {}: {} box pairs, {} positive", image, pairs.len(), positive_rows(&labels));
        Ok((pairs, labels))
    }

    fn classify(&self, features: &FeatureMaps, pairs: &BoxPairs) -> Result<Array2<f32>> {
        let pooled = self.pooler.pool(features, pairs)?;
        self.classifier.forward(pooled.view())
    }
}

fn positive_rows(labels: &Array2<f32>) -> usize {
    labels.rows().into_iter().filter(|r| r.iter().any(|&v| v > 0.0)).count()
}

/// Run `f` for every image index, collecting results in image order.
#[cfg(feature = "parallel")]
fn map_images<T, F>(n: usize, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Send + Sync,
{
    use rayon::prelude::*;
    (0..n).into_par_iter().map(f).collect()
}

#[cfg(not(feature = "parallel"))]
fn map_images<T, F>(n: usize, f: F) -> Result<Vec<T>>
where
    F: Fn(usize) -> Result<T>,
{
    (0..n).map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pooling::{BoxPairRoiPooler, PairCombine, RoiAlignConfig};
    use ndarray::{array, Array3};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_config() -> InteractionHeadConfig {
        InteractionHeadConfig {
            num_classes: 8,
            representation_size: 16,
            ..Default::default()
        }
    }

    fn head() -> InteractionHead<BoxPairRoiPooler> {
        let config = RoiAlignConfig {
            output_size: (2, 2),
            ..Default::default()
        };
        let pooler = BoxPairRoiPooler::new(3, config, PairCombine::Concat).unwrap();
        InteractionHead::with_random_weights(pooler, small_config(), &mut StdRng::seed_from_u64(0)).unwrap()
    }

    fn features() -> FeatureMaps {
        FeatureMaps::single(Array3::from_shape_fn((3, 16, 16), |(c, y, x)| (c + y + x) as f32 / 32.0), 0.25).unwrap()
    }

    fn detections() -> Detections {
        Detections::new(
            array![
                [0.0f32, 0.0, 10.0, 10.0],
                [0.0, 0.0, 10.0, 10.0],
                [50.0, 50.0, 60.0, 60.0]
            ],
            array![[0.9f32, 0.1], [0.2, 0.8], [0.3, 0.7]],
        )
        .unwrap()
    }

    fn target() -> InteractionTarget {
        InteractionTarget::from_records(&[[0.0, 0.0, 10.0, 10.0]], &[[0.0, 0.0, 10.0, 10.0]], &[5]).unwrap()
    }

    #[test]
    fn training_without_targets_fails() {
        let r = head().forward(&[features()], &[detections()], None, Mode::Training);
        assert!(matches!(r, Err(InteractError::MissingTargets)));
    }

    #[test]
    fn training_returns_labels_and_logits() {
        let out = head()
            .forward(&[features()], &[detections()], Some(&[target()]), Mode::Training)
            .unwrap()
            .into_training()
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].labels.shape(), &[3, 8]);
        assert_eq!(out[0].logits.shape(), &[3, 8]);
        assert_eq!(out[0].labels.column(5).to_vec(), vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn inference_scores_are_probabilities() {
        let out = head()
            .forward(&[features()], &[detections()], None, Mode::Inference)
            .unwrap()
            .into_inference()
            .unwrap();
        assert_eq!(out[0].paired_idx, array![[0usize, 0], [0, 1], [0, 2]]);
        assert!(out[0].scores.iter().all(|&s| s > 0.0 && s < 1.0));
    }

    #[test]
    fn images_without_humans_flow_through() {
        let none = Detections::new(array![[0.0f32, 0.0, 4.0, 4.0]], array![[0.0f32, 1.0]]).unwrap();
        let out = head()
            .forward(
                &[features(), features()],
                &[detections(), none],
                Some(&[target(), target()]),
                Mode::Training,
            )
            .unwrap()
            .into_training()
            .unwrap();
        assert_eq!(out[1].labels.shape(), &[0, 8]);
        assert_eq!(out[1].logits.shape(), &[0, 8]);
    }

    #[test]
    fn batch_lengths_must_agree() {
        let h = head();
        assert!(matches!(
            h.forward(&[], &[detections()], None, Mode::Inference),
            Err(InteractError::BatchMismatch { what: "features", .. })
        ));
        assert!(matches!(
            h.forward(&[features()], &[detections()], Some(&[]), Mode::Training),
            Err(InteractError::BatchMismatch { what: "targets", .. })
        ));
    }

    #[test]
    fn classifier_must_fit_pooler() {
        let pooler = BoxPairRoiPooler::new(3, RoiAlignConfig::default(), PairCombine::Concat).unwrap();
        let clf = PairwiseClassifier::new(10, 4, 8, &mut StdRng::seed_from_u64(0));
        assert!(InteractionHead::new(pooler, clf, small_config()).is_err());
    }

    #[test]
    fn sampled_forward_respects_budget() {
        let config = InteractionHeadConfig {
            num_box_pairs_per_image: 2,
            positive_fraction: 0.5,
            ..small_config()
        };
        let pooler = BoxPairRoiPooler::new(3, RoiAlignConfig { output_size: (2, 2), ..Default::default() }, PairCombine::Mean).unwrap();
        let head = InteractionHead::with_random_weights(pooler, config, &mut StdRng::seed_from_u64(0)).unwrap();

        let mut rng = StdRng::seed_from_u64(11);
        let out = head.forward_sampled(&[features()], &[detections()], &[target()], &mut rng).unwrap();
        assert_eq!(out[0].pairs.len(), 2);
        // one positive, one negative: pair 2 is the only negative
        assert_eq!(out[0].labels.sum(), 1.0);
        assert_eq!(out[0].pairs.paired_idx[[1, 1]], 2);
    }

    #[test]
    fn instances_are_sorted_and_filtered() {
        let interactions = ImageInteractions {
            paired_idx: array![[0usize, 1], [0, 2]],
            scores: array![[0.2f32, 0.9], [0.7, 0.1]],
        };
        let found = interactions.instances(&detections(), 0.5).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!((found[0].object, found[0].hoi), (1, 1));
        assert_eq!((found[1].object, found[1].hoi), (2, 0));
        assert_eq!(found[1].box_o, [50.0, 50.0, 60.0, 60.0]);

        let short = Detections::new(array![[0.0f32, 0.0, 1.0, 1.0]], array![[1.0f32, 0.0]]).unwrap();
        assert!(interactions.instances(&short, 0.5).is_err());
    }

    #[test]
    fn instances_need_one_score_row_per_pair() {
        let interactions = ImageInteractions {
            paired_idx: array![[0usize, 1]],
            scores: array![[0.9f32, 0.9], [0.9, 0.9]],
        };
        assert!(matches!(
            interactions.instances(&detections(), 0.5),
            Err(InteractError::BatchMismatch { what: "scores", expected: 1, got: 2 })
        ));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = InteractionHeadConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: InteractionHeadConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);

        let partial: InteractionHeadConfig = serde_json::from_str(r#"{"num_classes": 117}"#).unwrap();
        assert_eq!(partial.num_classes, 117);
        assert_eq!(partial.fg_iou_thresh, 0.5);
    }

    #[test]
    fn config_validation() {
        let bad = InteractionHeadConfig {
            fg_iou_thresh: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = InteractionHeadConfig {
            positive_fraction: -0.1,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
