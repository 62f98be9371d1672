pub mod decision;
pub mod moving_average;
pub mod normalizer;
pub mod spectrum;
pub mod split_sensor;
pub mod window;

pub use decision::Decision;
pub use moving_average::MovingAverage;
pub use normalizer::Normalizer;
pub use spectrum::Spectrum;
pub use split_sensor::SplitSensor;
pub use window::{SlidingWindow, WindowBuffer};
