pub mod bucket;
pub mod statistics;
pub mod transaction;

pub use bucket::Bucket;
pub use statistics::Statistics;
pub use transaction::Transaction;
