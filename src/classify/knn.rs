use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

use super::features::FeatureVector;
use super::reference::{ClassLabel, ReferenceSet};
use crate::frame::Crop;

/// Outcome of one nearest-neighbour vote.
#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    pub label: ClassLabel,
    /// Neighbours that voted for `label`.
    pub votes: usize,
    /// Neighbours consulted (`min(k, reference count)`).
    pub neighbours: usize,
    /// Sum of the distances of the winning neighbours.
    pub distance: f64,
}

#[derive(Default)]
struct Tally {
    votes: usize,
    distance: f64,
}

/// Brute-force k-nearest-neighbour classifier over raw crop pixels.
///
/// Neighbours are ranked by Euclidean distance with a stable sort, so equal
/// distances keep reference order. The majority label wins; a tied vote goes
/// to the label whose neighbours are closer in total, then to the smaller label.
#[derive(Clone, Debug)]
pub struct NearestNeighborClassifier {
    references: ReferenceSet,
    k: usize,
}

impl NearestNeighborClassifier {
    pub fn new(references: ReferenceSet, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(anyhow!("k must be at least 1"));
        }
        if k > references.len() {
            log::warn!(
                "k={} exceeds the {} references; every reference will vote",
                k,
                references.len()
            );
        }
        Ok(Self { references, k })
    }

    pub fn references(&self) -> &ReferenceSet {
        &self.references
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn classify(&self, crop: &Crop) -> Result<ClassLabel> {
        Ok(self.classify_features(&FeatureVector::from_crop(crop))?.label)
    }

    pub fn classify_features(&self, features: &FeatureVector) -> Result<Classification> {
        if features.len() != self.references.feature_len() {
            return Err(anyhow!(
                "feature vector has {} values, references have {}",
                features.len(),
                self.references.feature_len()
            ));
        }

        let entries = self.references.entries();
        let mut ranked: Vec<(f64, usize)> = entries
            .iter()
            .enumerate()
            .map(|(i, r)| (r.features.squared_distance(features), i))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        let neighbours = self.k.min(ranked.len());
        let mut tally: BTreeMap<&ClassLabel, Tally> = BTreeMap::new();
        for &(squared, i) in &ranked[..neighbours] {
            let t = tally.entry(&entries[i].label).or_default();
            t.votes += 1;
            t.distance += squared.sqrt();
        }

        let (label, best) = tally
            .into_iter()
            .max_by(|(la, a), (lb, b)| {
                a.votes
                    .cmp(&b.votes)
                    .then(b.distance.total_cmp(&a.distance))
                    .then(lb.cmp(la))
            })
            .ok_or_else(|| anyhow!("no neighbours to vote"))?;

        Ok(Classification {
            label: label.clone(),
            votes: best.votes,
            neighbours,
            distance: best.distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::reference::Reference;

    fn point(x: f32, label: &str) -> Reference {
        Reference::new(FeatureVector::new(vec![x, 0.0]), label)
    }

    fn query(x: f32) -> FeatureVector {
        FeatureVector::new(vec![x, 0.0])
    }

    #[test]
    fn majority_of_k_nearest_wins() {
        let refs = ReferenceSet::new(vec![
            point(0.0, "a"),
            point(1.0, "b"),
            point(2.0, "b"),
            point(10.0, "a"),
            point(11.0, "a"),
        ])
        .unwrap();
        let knn = NearestNeighborClassifier::new(refs, 3).unwrap();
        let result = knn.classify_features(&query(1.0)).unwrap();
        assert_eq!(result.label, ClassLabel::from("b"));
        assert_eq!(result.votes, 2);
        assert_eq!(result.neighbours, 3);
    }

    #[test]
    fn tied_vote_goes_to_closer_label() {
        // k=2: one "far" neighbour at distance 1, one "near" at distance 0.5.
        let refs = ReferenceSet::new(vec![point(6.0, "far"), point(4.5, "near"), point(50.0, "x")])
            .unwrap();
        let knn = NearestNeighborClassifier::new(refs, 2).unwrap();
        assert_eq!(
            knn.classify_features(&query(5.0)).unwrap().label,
            ClassLabel::from("near")
        );
    }

    #[test]
    fn exact_tie_goes_to_smaller_label() {
        let refs = ReferenceSet::new(vec![point(6.0, "zeta"), point(4.0, "alpha")]).unwrap();
        let knn = NearestNeighborClassifier::new(refs, 2).unwrap();
        assert_eq!(
            knn.classify_features(&query(5.0)).unwrap().label,
            ClassLabel::from("alpha")
        );
    }

    #[test]
    fn equal_distances_keep_reference_order() {
        // Both at distance 1; k=1 takes the earlier entry.
        let refs = ReferenceSet::new(vec![point(6.0, "first"), point(4.0, "second")]).unwrap();
        let knn = NearestNeighborClassifier::new(refs, 1).unwrap();
        assert_eq!(
            knn.classify_features(&query(5.0)).unwrap().label,
            ClassLabel::from("first")
        );
    }

    #[test]
    fn label_does_not_depend_on_reference_order() {
        let base = vec![
            point(0.0, "a"),
            point(1.5, "b"),
            point(2.2, "b"),
            point(3.1, "a"),
            point(7.0, "c"),
            point(7.7, "c"),
            point(8.4, "c"),
        ];
        for k in 1..=base.len() {
            let mut expected = None;
            for rotation in 0..base.len() {
                let mut entries = base.clone();
                entries.rotate_left(rotation);
                let last = entries.len() - 1;
                entries.swap(0, last);
                let knn =
                    NearestNeighborClassifier::new(ReferenceSet::new(entries).unwrap(), k).unwrap();
                let label = knn.classify_features(&query(2.0)).unwrap().label;
                match &expected {
                    None => expected = Some(label),
                    Some(e) => assert_eq!(&label, e, "k={k}, rotation={rotation}"),
                }
            }
        }
    }

    #[test]
    fn k_larger_than_set_uses_every_reference() {
        let refs = ReferenceSet::new(vec![point(0.0, "a"), point(1.0, "b"), point(2.0, "b")]).unwrap();
        let knn = NearestNeighborClassifier::new(refs, 9).unwrap();
        let result = knn.classify_features(&query(0.0)).unwrap();
        assert_eq!(result.neighbours, 3);
        assert_eq!(result.label, ClassLabel::from("b"));
    }

    #[test]
    fn rejects_zero_k_and_wrong_length() {
        let refs = ReferenceSet::new(vec![point(0.0, "a")]).unwrap();
        assert!(NearestNeighborClassifier::new(refs.clone(), 0).is_err());
        let knn = NearestNeighborClassifier::new(refs, 1).unwrap();
        assert!(knn
            .classify_features(&FeatureVector::new(vec![1.0, 2.0, 3.0]))
            .is_err());
    }
}
