//! Template instantiation and execution for factqa.
//!
//! - `instantiate`: resolve a template pair's placeholders against a
//!   [`FactStore`](factqa_store::FactStore), optionally only keeping choices
//!   that leave the query with an answer (`valid_only`)
//! - `execute`: run an instantiated query, extract the answer set and the
//!   solution trace
//! - `pipeline`: seeded, parallel generation of [`QaRecord`]s

pub mod config;
pub mod error;
pub mod execute;
pub mod instantiate;
pub mod pipeline;
pub mod record;

pub use config::{DifficultyTier, RelationAlias, SamplerConfig};
pub use error::{InstantiationError, SamplerError};
pub use execute::{execute, execute_batch, Execution};
pub use instantiate::{instantiate, InstantiatedQuery, Instantiation};
pub use pipeline::{generate_records, record_seed, sample_record, sample_with_retries};
pub use record::QaRecord;
