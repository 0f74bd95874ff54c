pub mod assets;
pub mod jobs;
