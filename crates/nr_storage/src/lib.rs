use std::path::Path;
use std::sync::Arc;

use nr_core::{ArticleStore, Error, Result, RunLog, StagingStore};

pub mod backends;

pub use backends::memory::MemoryStorage;
#[cfg(feature = "sqlite")]
pub use backends::sqlite::SqliteStorage;

/// The three store capabilities of one backend, split out so consumers can
/// depend on exactly the trait they need.
pub struct Stores {
    pub staging: Arc<dyn StagingStore>,
    pub articles: Arc<dyn ArticleStore>,
    pub runs: Arc<dyn RunLog>,
}

impl Stores {
    pub fn from_backend<T>(backend: Arc<T>) -> Self
    where
        T: StagingStore + ArticleStore + RunLog + 'static,
    {
        Self {
            staging: backend.clone(),
            articles: backend.clone(),
            runs: backend,
        }
    }
}

/// Backend factory keyed by name, used by the CLI.
pub async fn create_storage(kind: &str, db_path: &Path) -> Result<Stores> {
    tracing::debug!("creating {} storage backend (path {})", kind, db_path.display());
    match kind {
        "memory" => Ok(Stores::from_backend(Arc::new(MemoryStorage::new()))),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Stores::from_backend(Arc::new(
            backends::sqlite::SqliteStorage::open(db_path).await?,
        ))),
        #[cfg(not(feature = "sqlite"))]
        "sqlite" => Err(Error::Storage(
            "this build does not include the sqlite backend (enable the `sqlite` feature)"
                .to_string(),
        )),
        other => Err(Error::Storage(format!("unknown storage backend: {}", other))),
    }
}

pub mod prelude {
    pub use super::{create_storage, Stores};
    pub use nr_core::{ArticleStore, RunLog, StagingStore};
}
