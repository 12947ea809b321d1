pub mod comparator;
pub mod recorder;
pub mod recording;
