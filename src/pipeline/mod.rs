// Dataset preparation pipeline
// Enumerate sources, sample rows, pick metadata columns, then materialize
// vector and metadata artifacts registered in the projector manifest.

pub mod enumerate;
pub mod materialize;
pub mod metadata;
pub mod sample;
pub mod workflow;

pub use enumerate::{list_collections, list_tables};
pub use materialize::{
    DatasetLayout, MaterializeOutcome, MaterializeRequest, SamplingStrategy, materialize,
};
pub use metadata::{MetadataKey, MetadataKeySet, extract_keys};
pub use sample::{SAMPLE_PAGE_SIZE, sample};
pub use workflow::WorkflowState;
