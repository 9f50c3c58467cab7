mod backend;
mod circle;
mod hough;
mod params;

pub use backend::RegionDetector;
pub use circle::CircleDetector;
pub use hough::Circle;
pub use params::DetectorParams;
