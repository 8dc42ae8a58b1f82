/// HSV color windows and the filter pipeline.
pub mod hsv;
/// Binary morphological operators.
pub mod morphology;
