//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::{Arc, Once};

use rand::RngCore;
use tracing_subscriber::filter::LevelFilter;

use veritrail::{Engine, EngineConfig};
use veritrail_core::{ArtifactId, EntityType, Metadata};
use veritrail_store::MemoryStore;

static TRACING: Once = Once::new();

/// Install a test-writer `fmt` subscriber once per process.
///
/// Output is captured by the test harness and only shown for failing tests.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(LevelFilter::DEBUG)
            .try_init();
    });
}

/// Random bytes of the given length.
pub fn random_content(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// A shared engine over a memory store, with ledger difficulty 1.
pub struct TestFixture {
    pub engine: Arc<Engine<MemoryStore>>,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default().with_difficulty(1))
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_tracing();
        let engine = Engine::with_local_ledger(MemoryStore::new(), config)
            .expect("fixture engine");
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Ingest `content` as entity type 1 with no metadata.
    pub async fn ingest(&self, content: &[u8]) -> ArtifactId {
        self.engine
            .ingest_bytes(EntityType(1), content, None, Metadata::new())
            .await
            .expect("fixture ingest")
    }

    /// Ingest `content` and make it the baseline for `reference_id`.
    pub async fn ingest_under(&self, reference_id: &str, content: &[u8]) -> ArtifactId {
        self.engine
            .ingest_under(reference_id, EntityType(1), content, None, Metadata::new())
            .await
            .expect("fixture ingest_under")
    }

    /// `count` fresh artifacts linked `0 -> 1 -> ... -> count-1`.
    pub async fn lineage(&self, count: usize, relation: &str) -> Vec<ArtifactId> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(self.ingest(&random_content(32)).await);
        }
        for pair in ids.windows(2) {
            self.engine
                .create_link(&pair[0], &pair[1], relation)
                .await
                .expect("fixture link");
        }
        ids
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
