pub mod classification;
pub mod descriptors;
pub mod events;
pub mod generation;
