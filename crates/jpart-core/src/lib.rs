//! jpart Core - rule-driven partitioning of JSON records
//!
//! Rules turn each record into a partition key built from its field values;
//! the record is appended to one file per (rule, key). A bounded resource
//! cache keeps the number of concurrently open files in check.

pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod hierarchy;
pub mod output;
pub mod pipeline;
pub mod rule;

pub use cache::{
    default_fault_handler, AppendFile, BoxedResource, MemoryResource, Resource, ResourceCache, SharedCache,
    DEFAULT_CAPACITY,
};
pub use config::{validate_config, ConfigError, PartitionConfig};
pub use error::{PartitionError, Result};
pub use filter::{DefaultFilter, Filter, FilterFactory, FilterMappings, FilterRegistry};
pub use hierarchy::{lookup, FieldNotFound};
pub use output::construct_output_filename;
pub use pipeline::{apply_rules, build_rules, load_and_apply, RuleSummary, RunSummary};
pub use rule::{Evaluation, RawPart, Rule, Skip, SkipReason};
