use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use super::features::FeatureVector;
use crate::frame::Crop;
use crate::ingest::{has_image_extension, read_frame};

/// Opaque class identifier (a dataset folder name such as `"50"`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassLabel(String);

impl ClassLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassLabel {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ClassLabel {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One labelled feature vector.
#[derive(Clone, Debug)]
pub struct Reference {
    pub features: FeatureVector,
    pub label: ClassLabel,
}

impl Reference {
    pub fn new(features: FeatureVector, label: impl Into<ClassLabel>) -> Self {
        Self {
            features,
            label: label.into(),
        }
    }
}

/// Immutable, non-empty set of references sharing one vector length.
///
/// Entry order is preserved; it decides between neighbours at equal distance.
#[derive(Clone, Debug)]
pub struct ReferenceSet {
    entries: Vec<Reference>,
    feature_len: usize,
}

impl ReferenceSet {
    pub fn new(entries: Vec<Reference>) -> Result<Self> {
        let first = entries
            .first()
            .ok_or_else(|| anyhow!("reference set is empty"))?;
        let feature_len = first.features.len();
        if feature_len == 0 {
            return Err(anyhow!("reference feature vectors are empty"));
        }
        if let Some((index, bad)) = entries
            .iter()
            .enumerate()
            .find(|(_, r)| r.features.len() != feature_len)
        {
            return Err(anyhow!(
                "reference {} ({}) has {} features, expected {}",
                index,
                bad.label,
                bad.features.len(),
                feature_len
            ));
        }
        Ok(Self {
            entries,
            feature_len,
        })
    }

    /// Load `root/<label>/**/*.{png,jpg,jpeg,bmp}`, resampled to the crop size.
    pub fn load_dir(root: &Path) -> Result<Self> {
        let entries = load_labelled_dir(root)?;
        let set = Self::new(entries)
            .with_context(|| format!("no usable references under {}", root.display()))?;
        let mut per_label: BTreeMap<&ClassLabel, usize> = BTreeMap::new();
        for entry in &set.entries {
            *per_label.entry(&entry.label).or_default() += 1;
        }
        log::info!(
            "loaded {} references from {}: {:?}",
            set.len(),
            root.display(),
            per_label
                .iter()
                .map(|(label, n)| format!("{}={}", label, n))
                .collect::<Vec<_>>()
        );
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    pub fn entries(&self) -> &[Reference] {
        &self.entries
    }

    /// Distinct labels, sorted.
    pub fn labels(&self) -> Vec<ClassLabel> {
        let mut labels: Vec<ClassLabel> = self.entries.iter().map(|e| e.label.clone()).collect();
        labels.sort();
        labels.dedup();
        labels
    }
}

/// Image paths under `root`, labelled by their top-level class directory.
///
/// Class directories and files are visited in sorted order.
pub fn list_labelled_images(root: &Path) -> Result<Vec<(PathBuf, ClassLabel)>> {
    let mut class_dirs = Vec::new();
    for entry in std::fs::read_dir(root)
        .with_context(|| format!("failed to read dataset directory {}", root.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            class_dirs.push(path);
        }
    }
    class_dirs.sort();

    let mut images = Vec::new();
    for dir in class_dirs {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let label = ClassLabel::new(name);
        let mut files = Vec::new();
        collect_images(&dir, &mut files)?;
        files.sort();
        images.extend(files.into_iter().map(|path| (path, label.clone())));
    }
    Ok(images)
}

fn collect_images(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_images(&path, out)?;
        } else if has_image_extension(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// Decode one image and turn it into crop features.
pub fn load_features(path: &Path) -> Result<FeatureVector> {
    let frame = read_frame(path)?;
    Ok(FeatureVector::from_crop(&Crop::from_frame(&frame)))
}

/// Decode every labelled image under `root`.
pub fn load_labelled_dir(root: &Path) -> Result<Vec<Reference>> {
    list_labelled_images(root)?
        .into_iter()
        .map(|(path, label)| Ok(Reference::new(load_features(&path)?, label)))
        .collect()
}
