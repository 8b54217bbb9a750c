//! Shared fixtures for curio-core integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use curio_common::config::TomlConfig;
use curio_common::db::init_database;
use curio_common::{Database, Result};
use curio_core::provider::{Candidate, SearchProvider};
use curio_core::CurioService;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Provider returning a fixed candidate list
#[derive(Debug, Default)]
pub struct FakeProvider {
    candidates: Mutex<Vec<Candidate>>,
}

impl FakeProvider {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates: Mutex::new(candidates),
        }
    }

    pub fn set(&self, candidates: Vec<Candidate>) {
        *self.candidates.lock().unwrap() = candidates;
    }
}

#[async_trait]
impl SearchProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn search(&self, _query: &str, _image_features: Option<&[f32]>) -> Result<Vec<Candidate>> {
        Ok(self.candidates.lock().unwrap().clone())
    }
}

/// `n` ranked candidates; every fifth is a rug, the rest lamps
pub fn catalog(n: usize) -> Vec<Candidate> {
    (0..n)
        .map(|i| {
            let category = if i % 5 == 4 { "rugs" } else { "lamps" };
            Candidate::new(format!("obj-{:03}", i), i as u32)
                .with_category(category)
                .with_attributes([format!("brand:b{}", i % 3)])
        })
        .collect()
}

pub struct TestContext {
    /// Keeps the temp directory alive for the test's duration
    pub dir: TempDir,
    pub service: Arc<CurioService>,
    pub provider: Arc<FakeProvider>,
    pub config_path: PathBuf,
}

impl TestContext {
    pub async fn db(&self) -> Database {
        self.service.database().await
    }

    pub async fn count(&self, table: &str) -> i64 {
        let db = self.db().await;
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(db.pool())
            .await
            .unwrap()
    }
}

pub async fn setup(candidates: Vec<Candidate>) -> TestContext {
    let dir = TempDir::new().unwrap();
    let db = init_database(&dir.path().join("data").join("curio.db"))
        .await
        .unwrap();

    let config_path = dir.path().join("config").join("config.toml");
    let provider = Arc::new(FakeProvider::new(candidates));
    let service = Arc::new(CurioService::new(
        db,
        provider.clone(),
        &TomlConfig::default(),
        Some(config_path.clone()),
    ));

    TestContext {
        dir,
        service,
        provider,
        config_path,
    }
}
