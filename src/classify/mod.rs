//! Nearest-neighbour sign classification over raw crop pixels.

mod eval;
mod features;
mod knn;
mod reference;

pub use eval::{evaluate, split_holdout, Evaluation};
pub use features::FeatureVector;
pub use knn::{Classification, NearestNeighborClassifier};
pub use reference::{
    list_labelled_images, load_features, load_labelled_dir, ClassLabel, Reference, ReferenceSet,
};
