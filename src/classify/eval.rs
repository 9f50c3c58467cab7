use anyhow::{anyhow, bail, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use super::knn::NearestNeighborClassifier;
use super::reference::{ClassLabel, Reference, ReferenceSet};

/// Hold-out evaluation result.
///
/// `confusion[actual][predicted]`, both indexed by position in `labels`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Evaluation {
    pub labels: Vec<ClassLabel>,
    pub confusion: Vec<Vec<usize>>,
    pub samples: usize,
    pub k: usize,
}

impl Evaluation {
    pub fn correct(&self) -> usize {
        (0..self.labels.len()).map(|i| self.confusion[i][i]).sum()
    }

    /// Fraction of samples classified correctly; 0 when there are none.
    pub fn accuracy(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.correct() as f64 / self.samples as f64
    }

    /// Per label: correct predictions over all predictions of that label.
    /// `None` for labels that were never predicted.
    pub fn precision_per_class(&self) -> Vec<Option<f64>> {
        (0..self.labels.len())
            .map(|col| {
                let predicted: usize = self.confusion.iter().map(|row| row[col]).sum();
                if predicted == 0 {
                    None
                } else {
                    Some(self.confusion[col][col] as f64 / predicted as f64)
                }
            })
            .collect()
    }

    fn index_of(&self, label: &ClassLabel) -> Option<usize> {
        self.labels.binary_search(label).ok()
    }
}

/// Classify every sample against `references` and tally the outcome.
pub fn evaluate(references: ReferenceSet, samples: &[Reference], k: usize) -> Result<Evaluation> {
    let mut labels = references.labels();
    labels.extend(samples.iter().map(|s| s.label.clone()));
    labels.sort();
    labels.dedup();

    let classifier = NearestNeighborClassifier::new(references, k)?;
    let mut evaluation = Evaluation {
        confusion: vec![vec![0; labels.len()]; labels.len()],
        labels,
        samples: samples.len(),
        k,
    };

    for sample in samples {
        let predicted = classifier.classify_features(&sample.features)?.label;
        let row = evaluation
            .index_of(&sample.label)
            .ok_or_else(|| anyhow!("unindexed label {}", sample.label))?;
        let col = evaluation
            .index_of(&predicted)
            .ok_or_else(|| anyhow!("unindexed label {}", predicted))?;
        if row != col {
            log::debug!("expected {}, predicted {}", sample.label, predicted);
        }
        evaluation.confusion[row][col] += 1;
    }
    Ok(evaluation)
}

/// Shuffle with a seeded RNG and split off `test_fraction` of the samples.
///
/// Returns `(train, test)`. The test part is rounded to the nearest sample and
/// both parts keep at least one sample when there are two or more.
pub fn split_holdout<T>(mut samples: Vec<T>, test_fraction: f64, seed: u64) -> Result<(Vec<T>, Vec<T>)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        bail!("test fraction must be in (0, 1), got {}", test_fraction);
    }
    if samples.len() < 2 {
        bail!("need at least two samples to split, got {}", samples.len());
    }
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let test_len = ((samples.len() as f64 * test_fraction).round() as usize).clamp(1, samples.len() - 1);
    let test = samples.split_off(samples.len() - test_len);
    Ok((samples, test))
}
