pub mod aggregate;
pub mod cohort_extraction;
pub mod config;
pub mod error;
pub mod metadata;
pub mod observability;
pub mod orchestrator;
pub mod pipeline;
pub mod result_store;

pub use config::{AppConfig, FileNaming};
pub use error::{PipelineError, Result};
pub use metadata::{MetadataStore, MetricValue};
pub use orchestrator::{FetchSummary, Orchestrator};
pub use pipeline::Pipeline;
pub use result_store::ResultStore;
