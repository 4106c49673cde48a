// ABOUTME: Row transformation pipelines - configuration, transforms and the engine
// ABOUTME: Turns a ChangeEvent into destination write operations

pub mod config;
pub mod engine;
pub mod transforms;
pub mod value;

pub use config::{PipelineConfig, PipelineFile, StageConfig};
pub use engine::{PipelineEngine, PipelineError};
pub use transforms::{StageArgs, TransformError, TransformFn, TransformRegistry};
pub use value::{FieldValue, Row};
