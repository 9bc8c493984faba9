pub mod memory;
pub mod metrics;
pub mod repository;

pub use self::memory::InMemoryApplicationStore;
pub use self::metrics::{get_metrics, init_metrics, record_application_event};
pub use self::repository::{ApplicationStore, MongoApplicationStore, ReplaceOutcome};
