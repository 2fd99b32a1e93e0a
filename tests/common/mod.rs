// Shared helpers for integration tests

#![allow(dead_code)]

use rustmemodb_fixture::{Entity, EntityKey, MemoryServer, MemoryStoreContext, Migration, StoreOptions};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakfastItem {
    pub id: i64,
    pub name: String,
    pub rating: Option<i32>,
}

impl Entity for BreakfastItem {
    const COLLECTION: &'static str = "breakfast_items";

    fn key(&self) -> EntityKey {
        self.id.into()
    }
}

pub fn breakfast_item(id: i64, name: &str, rating: Option<i32>) -> BreakfastItem {
    BreakfastItem {
        id,
        name: name.to_string(),
        rating,
    }
}

pub fn breakfast_options(database: &str) -> StoreOptions {
    StoreOptions::new(&format!("Server=memory;Database={};User Id=tester;Password=hunter2", database))
        .migration(Migration::create_collections("001_breakfast", &["breakfast_items"]))
}

pub fn connect(server: &Arc<MemoryServer>, options: StoreOptions) -> MemoryStoreContext {
    MemoryStoreContext::connect(Arc::clone(server), options).unwrap()
}
