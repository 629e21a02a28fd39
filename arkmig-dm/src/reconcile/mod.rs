//! Referential-integrity reconciliation
//!
//! - [`ForeignKeyCleaner`]: nulls dangling foreign-key values
//! - [`ForeignKeyDeleter`]: drops rows with dangling foreign-key values
//! - [`PrimaryKeyAdder`]: adds rows for keys referenced from another table but
//!   never delivered
//!
//! All three share key sets through a [`KeyCache`].

use arkmig_common::MetadataProvider;
use std::sync::Arc;

use crate::logger::MigrationLogger;
use crate::repository::DataRepository;

mod adder;
mod cleaner;
mod deleter;
pub mod key_cache;
mod lookup;

pub use adder::PrimaryKeyAdder;
pub use cleaner::ForeignKeyCleaner;
pub use deleter::ForeignKeyDeleter;
pub use key_cache::{CacheIdentity, KeyCache, KeyCacheConfig, KeySet, WorkerId};

/// Collaborators shared by every reconciliation worker
#[derive(Clone)]
pub struct ReconcileContext {
    pub metadata: Arc<dyn MetadataProvider>,
    pub repository: Arc<dyn DataRepository>,
    pub cache: Arc<KeyCache>,
    pub logger: Arc<dyn MigrationLogger>,
}

impl ReconcileContext {
    pub fn new(
        metadata: Arc<dyn MetadataProvider>,
        repository: Arc<dyn DataRepository>,
        cache: Arc<KeyCache>,
        logger: Arc<dyn MigrationLogger>,
    ) -> Self {
        Self {
            metadata,
            repository,
            cache,
            logger,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::logger::RecordingLogger;
    use crate::manipulator::test_support::{case, case_source, employee};
    use crate::memory::MemoryRepository;
    use arkmig_common::MetadataProvider;
    use std::time::Duration;

    pub struct Fixture {
        pub ctx: ReconcileContext,
        pub repository: Arc<MemoryRepository>,
        pub logger: Arc<RecordingLogger>,
    }

    /// CASES rows reference employees 1, 2, 4 and null; EMPLOYEE holds 1, 2, 3
    pub async fn fixture(point_lookups: bool) -> Fixture {
        let source = Arc::new(case_source());
        let mut repository = MemoryRepository::new(2);
        if point_lookups {
            repository = repository.with_point_lookups();
        }
        let repository = Arc::new(repository);

        let cases = source.data_source().require_table("CASES").unwrap();
        let employees = source.data_source().require_table("EMPLOYEE").unwrap();
        repository
            .load(
                &cases,
                vec![
                    case(10, Some(1), "open"),
                    case(11, Some(2), "open"),
                    case(12, Some(4), "open"),
                    case(13, None, "open"),
                ],
            )
            .await;
        repository
            .load(
                &employees,
                vec![employee(1, "active"), employee(2, "active"), employee(3, "retired")],
            )
            .await;

        let logger = Arc::new(RecordingLogger::new());
        let cache = Arc::new(KeyCache::new(KeyCacheConfig {
            grace_period: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
        }));
        let ctx = ReconcileContext::new(
            source,
            Arc::clone(&repository) as Arc<dyn DataRepository>,
            cache,
            Arc::clone(&logger) as Arc<dyn MigrationLogger>,
        );
        Fixture {
            ctx,
            repository,
            logger,
        }
    }
}
