//! Scoring a query feature vector against the trained model.
//!
//! Four strategies are supported (see [`crate::config::Strategy`]); all of
//! them return a [`RecognitionResult`] carrying the full per-label ranking
//! for diagnostics, and all of them distinguish an explicit rejection
//! (gated out, ambiguous, no exemplars) from an accepted decision that
//! merely has low confidence.
//!
//! Confidence is the relative gap between the best and second-best score,
//! scaled to 0–100 and penalised when the best absolute score is itself
//! poor (a close win against a bad match is not a confident win).

pub mod dtw;

pub use dtw::elastic_distance;

use std::fmt;

use crate::config::{ClassifyConfig, DistanceMetric, Strategy};
use crate::features::FeatureVector;
use crate::model::TrainedModel;

// ---------------------------------------------------------------------------
// RecognitionResult
// ---------------------------------------------------------------------------

/// Why a decision was explicitly rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Gated z-score: every label exceeded a gate threshold.
    GatedOut,
    /// Weighted multi-metric: best did not beat the runner-up by the margin.
    Ambiguous,
    /// Nearest-exemplar: the model holds no exemplar profiles.
    NoExemplars,
    /// The model contains no labels at all.
    EmptyModel,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::GatedOut => "no label within gate thresholds",
            RejectReason::Ambiguous => "best and runner-up too close",
            RejectReason::NoExemplars => "model holds no exemplar profiles",
            RejectReason::EmptyModel => "model holds no labels",
        };
        f.write_str(s)
    }
}

/// Accepted label or explicit rejection.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accepted { label: String },
    Rejected(RejectReason),
}

/// The full result of one classification: outcome, winning score, ranked
/// per-label scores (ascending, lower is better) and a 0–100 confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub outcome: Outcome,
    pub best_score: f32,
    pub ranking: Vec<(String, f32)>,
    pub confidence: f32,
}

impl RecognitionResult {
    fn rejected(reason: RejectReason, ranking: Vec<(String, f32)>) -> Self {
        let best_score = ranking.first().map(|(_, s)| *s).unwrap_or(f32::INFINITY);
        Self {
            outcome: Outcome::Rejected(reason),
            best_score,
            ranking,
            confidence: 0.0,
        }
    }

    /// The accepted label, if any.
    pub fn label(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Accepted { label } => Some(label),
            Outcome::Rejected(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// Relative separation of best vs. second-best, scaled to 0–100 and
/// penalised when the winning score itself is poor.
fn confidence(best: f32, second: Option<f32>) -> f32 {
    let Some(second) = second else {
        // A single-label model wins by default but proves nothing.
        return 0.0;
    };

    let mut score = if second > 1e-6 {
        (second - best) / second * 100.0
    } else {
        0.0
    };

    if best > 0.4 {
        score *= 0.3;
    } else if best > 0.3 {
        score *= 0.5;
    } else if best > 0.2 {
        score *= 0.7;
    }

    score.clamp(0.0, 100.0)
}

// ---------------------------------------------------------------------------
// Distance helpers
// ---------------------------------------------------------------------------

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn manhattan(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

fn unit_l2(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

/// Pearson correlation coefficient; 0.0 when either side has no variance.
fn pearson(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let mean_a: f32 = a[..n].iter().sum::<f32>() / n as f32;
    let mean_b: f32 = b[..n].iter().sum::<f32>() / n as f32;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a[..n].iter().zip(b[..n].iter()) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom > f32::EPSILON {
        cov / denom
    } else {
        0.0
    }
}

/// Sort label scores ascending (lower is better).
fn sort_ranking(ranking: &mut [(String, f32)]) {
    ranking.sort_by(|a, b| a.1.total_cmp(&b.1));
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Strategy-dispatching classifier over a read-only [`TrainedModel`].
pub struct Classifier {
    model: TrainedModel,
    config: ClassifyConfig,
}

impl Classifier {
    pub fn new(model: TrainedModel, config: ClassifyConfig) -> Self {
        Self { model, config }
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    /// Classify a band-energy vector.
    ///
    /// The nearest-exemplar strategy compares temporal profiles, not band
    /// energies; use [`Classifier::decide_with_profile`] for it.  Calling
    /// `decide` under that strategy rejects with
    /// [`RejectReason::NoExemplars`].
    pub fn decide(&self, query: &FeatureVector) -> RecognitionResult {
        debug_assert_eq!(query.params, self.model.params());

        if self.model.is_empty() {
            return RecognitionResult::rejected(RejectReason::EmptyModel, Vec::new());
        }

        match self.config.strategy {
            Strategy::GatedZScore => self.gated_z_score(&query.values),
            Strategy::NearestCentroid => self.nearest_centroid(&query.values),
            Strategy::WeightedMulti => self.weighted_multi(&query.values),
            Strategy::NearestExemplar => {
                log::warn!("nearest-exemplar strategy needs a temporal profile");
                RecognitionResult::rejected(RejectReason::NoExemplars, Vec::new())
            }
        }
    }

    /// Classify with the query's temporal profile available.
    ///
    /// Under the nearest-exemplar strategy the profile is matched against
    /// every stored exemplar; every other strategy ignores it and behaves
    /// like [`Classifier::decide`].
    pub fn decide_with_profile(&self, query: &FeatureVector, profile: &[f32]) -> RecognitionResult {
        if self.config.strategy == Strategy::NearestExemplar {
            if self.model.is_empty() {
                return RecognitionResult::rejected(RejectReason::EmptyModel, Vec::new());
            }
            self.nearest_exemplar(profile)
        } else {
            self.decide(query)
        }
    }

    // ---- strategy (a): gated z-score ---------------------------------------

    fn gated_z_score(&self, q: &[f32]) -> RecognitionResult {
        let floor = self.config.std_floor;
        let mut ranking = Vec::with_capacity(self.model.commands.len());
        let mut survivors: Vec<(String, f32)> = Vec::new();

        for (label, cmd) in &self.model.commands {
            let mut z_sum = 0.0_f32;
            let mut z_max = 0.0_f32;
            for ((&qk, &mk), &sk) in q.iter().zip(&cmd.mean).zip(&cmd.std) {
                let z = (qk - mk).abs() / sk.max(floor);
                z_sum += z;
                z_max = z_max.max(z);
            }
            let z_avg = z_sum / q.len().max(1) as f32;

            ranking.push((label.clone(), z_sum));
            if z_max <= self.config.z_max && z_avg <= self.config.z_avg {
                survivors.push((label.clone(), z_sum));
            }
        }

        sort_ranking(&mut ranking);

        if survivors.is_empty() {
            return RecognitionResult::rejected(RejectReason::GatedOut, ranking);
        }

        survivors.sort_by(|a, b| a.1.total_cmp(&b.1));
        let (label, best) = survivors.remove(0);
        // Runner-up for the confidence gap comes from the surviving set; a
        // gated-out label is not a viable alternative to separate from.
        let second = survivors.first().map(|(_, s)| *s);

        RecognitionResult {
            outcome: Outcome::Accepted { label },
            best_score: best,
            confidence: confidence(best, second),
            ranking,
        }
    }

    // ---- strategy (b): nearest centroid ------------------------------------

    fn nearest_centroid(&self, q: &[f32]) -> RecognitionResult {
        let query = if self.config.unit_normalize {
            unit_l2(q)
        } else {
            q.to_vec()
        };

        let mut ranking = Vec::with_capacity(self.model.commands.len());
        for (label, cmd) in &self.model.commands {
            let mean = if self.config.unit_normalize {
                unit_l2(&cmd.mean)
            } else {
                cmd.mean.clone()
            };
            let d = match self.config.metric {
                DistanceMetric::Euclidean => euclidean(&query, &mean),
                DistanceMetric::Manhattan => manhattan(&query, &mean),
            };
            ranking.push((label.clone(), d));
        }

        sort_ranking(&mut ranking);
        let (label, best) = ranking[0].clone();
        let second = ranking.get(1).map(|(_, s)| *s);

        RecognitionResult {
            outcome: Outcome::Accepted { label },
            best_score: best,
            confidence: confidence(best, second),
            ranking,
        }
    }

    // ---- strategy (c): nearest exemplar ------------------------------------

    fn nearest_exemplar(&self, profile: &[f32]) -> RecognitionResult {
        let mut pairs: Vec<(&str, f32)> = Vec::new();
        for (label, cmd) in &self.model.commands {
            if let Some(patterns) = &cmd.patterns {
                for pattern in patterns {
                    pairs.push((label, elastic_distance(profile, pattern)));
                }
            }
        }

        if pairs.is_empty() {
            return RecognitionResult::rejected(RejectReason::NoExemplars, Vec::new());
        }

        pairs.sort_by(|a, b| a.1.total_cmp(&b.1));
        let k = self.config.knn_k.max(1).min(pairs.len());

        // Majority vote among the k nearest; ties resolve to the label that
        // appears earliest (nearest) in the sorted order.
        let nearest = &pairs[..k];
        let max_votes = |label: &str| nearest.iter().filter(|(l, _)| *l == label).count();
        let top = nearest
            .iter()
            .map(|(l, _)| max_votes(l))
            .max()
            .unwrap_or(0);
        let winner = nearest
            .iter()
            .find(|(l, _)| max_votes(l) == top)
            .map(|(l, _)| l.to_string())
            .unwrap_or_default();

        // Ranking: mean exemplar distance per label, for diagnostics.
        let mut ranking: Vec<(String, f32)> = self
            .model
            .commands
            .keys()
            .map(|label| {
                let dists: Vec<f32> = pairs
                    .iter()
                    .filter(|(l, _)| *l == label.as_str())
                    .map(|(_, d)| *d)
                    .collect();
                let score = if dists.is_empty() {
                    f32::INFINITY
                } else {
                    dists.iter().sum::<f32>() / dists.len() as f32
                };
                (label.clone(), score)
            })
            .collect();
        sort_ranking(&mut ranking);

        let best = ranking
            .iter()
            .find(|(l, _)| *l == winner)
            .map(|(_, s)| *s)
            .unwrap_or(f32::INFINITY);
        let second = ranking
            .iter()
            .find(|(l, _)| *l != winner)
            .map(|(_, s)| *s);

        RecognitionResult {
            outcome: Outcome::Accepted { label: winner },
            best_score: best,
            confidence: confidence(best, second),
            ranking,
        }
    }

    // ---- strategy (d): weighted multi-metric -------------------------------

    fn weighted_multi(&self, q: &[f32]) -> RecognitionResult {
        let floor = self.config.std_floor;
        let labels: Vec<&String> = self.model.commands.keys().collect();

        // Raw per-label metrics: z-sum, Euclidean, Manhattan, 1 − Pearson.
        let mut metrics = [
            Vec::with_capacity(labels.len()),
            Vec::with_capacity(labels.len()),
            Vec::with_capacity(labels.len()),
            Vec::with_capacity(labels.len()),
        ];
        for label in &labels {
            let cmd = &self.model.commands[*label];
            let z_sum: f32 = q
                .iter()
                .zip(&cmd.mean)
                .zip(&cmd.std)
                .map(|((&qk, &mk), &sk)| (qk - mk).abs() / sk.max(floor))
                .sum();
            metrics[0].push(z_sum);
            metrics[1].push(euclidean(q, &cmd.mean));
            metrics[2].push(manhattan(q, &cmd.mean));
            metrics[3].push(1.0 - pearson(q, &cmd.mean));
        }

        // Normalise each metric by its maximum across labels so no single
        // metric's scale dominates the combination.
        for metric in metrics.iter_mut() {
            let max = metric.iter().cloned().fold(0.0_f32, f32::max);
            if max > f32::EPSILON {
                for v in metric.iter_mut() {
                    *v /= max;
                }
            }
        }

        let weights = self.config.weights;
        let mut ranking: Vec<(String, f32)> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let combined: f32 = weights
                    .iter()
                    .zip(metrics.iter())
                    .map(|(w, metric)| w * metric[i])
                    .sum();
                ((*label).clone(), combined)
            })
            .collect();
        sort_ranking(&mut ranking);

        let (label, best) = ranking[0].clone();
        let second = ranking.get(1).map(|(_, s)| *s);

        if let Some(second) = second {
            let separation = if second > 1e-6 {
                (second - best) / second
            } else {
                0.0
            };
            if separation < self.config.margin {
                return RecognitionResult::rejected(RejectReason::Ambiguous, ranking);
            }
        }

        RecognitionResult {
            outcome: Outcome::Accepted { label },
            best_score: best,
            confidence: confidence(best, second),
            ranking,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
