pub mod collection;
pub mod data;
pub mod types;

pub use collection::{load_collection, ordered_requests};
pub use data::{load_data_rows, load_environment, load_globals};
pub use types::*;
