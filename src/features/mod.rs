/// Feature kinds, sets and display-color resolution.
pub mod measure;
