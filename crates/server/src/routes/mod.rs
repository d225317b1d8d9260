pub mod languages;
pub mod pipeline;
pub mod system;
pub mod transcribe;
pub mod translate;
