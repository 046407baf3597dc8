pub mod census;
pub mod config;
pub mod duck;
pub mod encoder;
pub mod error;
pub mod history;
pub mod process;
pub mod query;
pub mod schema;

pub use census::{Census, ColumnSelector, QueryResult, RunOptions};
pub use encoder::{EncodedItem, Encoder};
pub use error::{CensusError, Result};
pub use query::{QueryBackend, QueryService};
