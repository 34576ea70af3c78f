//! Common test utilities and fixtures for integration tests.
//!
//! This module provides shared test infrastructure including:
//! - TestContext wiring a StudyService to an in-memory store
//! - Scripted and gated grading oracles, and a store with held writes
//! - Helper functions for creating test data

#![allow(dead_code)]

pub mod fixtures;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use recall_core::{Grade, Item, ReviewMetadata};
use recall_study::{
    GradingError, GradingOracle, ItemStore, MemoryStore, StoreError, StudyConfig, StudyService,
};

/// Grader that replays a fixed script of results.
#[derive(Default)]
pub struct ScriptedGrader {
    script: Mutex<VecDeque<Result<Grade, GradingError>>>,
    calls: AtomicUsize,
}

impl ScriptedGrader {
    pub fn new(script: Vec<Result<Grade, GradingError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Grader that returns the given grades in order.
    pub fn grades(grades: &[&str]) -> Self {
        Self::new(grades.iter().map(|g| Ok(Grade::parse(g))).collect())
    }

    pub fn push(&self, result: Result<Grade, GradingError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GradingOracle for ScriptedGrader {
    async fn grade(&self, _question: &str, _expected: &str, _answer: &str) -> Result<Grade, GradingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GradingError::EmptyReply))
    }
}

/// Grader that blocks until released, to hold a grading in flight.
pub struct GatedGrader {
    pub entered: Notify,
    pub release: Notify,
    grade: Grade,
    calls: AtomicUsize,
}

impl GatedGrader {
    pub fn new(grade: Grade) -> Self {
        Self {
            entered: Notify::new(),
            release: Notify::new(),
            grade,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GradingOracle for GatedGrader {
    async fn grade(&self, _question: &str, _expected: &str, _answer: &str) -> Result<Grade, GradingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(self.grade.clone())
    }
}

/// In-memory store whose writes wait until released.
#[derive(Default)]
pub struct GatedStore {
    pub inner: MemoryStore,
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl ItemStore for GatedStore {
    async fn fetch_items_for_collection(&self, collection_id: &str) -> Result<Vec<Item>, StoreError> {
        self.inner.fetch_items_for_collection(collection_id).await
    }

    async fn write_metadata(&self, item_id: &str, metadata: &ReviewMetadata) -> Result<(), StoreError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.write_metadata(item_id, metadata).await
    }
}

/// Test context containing an in-memory store and a service under test.
pub struct TestContext<G> {
    pub store: Arc<MemoryStore>,
    pub grader: Arc<G>,
    pub service: Arc<StudyService>,
}

impl<G: GradingOracle + 'static> TestContext<G> {
    pub fn new(grader: G) -> Self {
        Self::with_config(grader, StudyConfig::default())
    }

    pub fn with_config(grader: G, config: StudyConfig) -> Self {
        recall_study::init_tracing();

        let store = Arc::new(MemoryStore::new());
        let grader = Arc::new(grader);
        let service = Arc::new(StudyService::new(store.clone(), grader.clone(), config));
        Self {
            store,
            grader,
            service,
        }
    }

    /// Put items into a collection.
    pub async fn seed(&self, collection_id: &str, items: Vec<Item>) {
        for item in items {
            self.store.insert(collection_id, item).await;
        }
    }

    /// Id of the item currently presented.
    pub async fn current_id(&self) -> Option<String> {
        self.service.snapshot().await.current_item.map(|item| item.id)
    }
}
