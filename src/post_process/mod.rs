pub mod merger;

pub use merger::MediaMerger;
