//! Outbox-to-ledger posting engine.
//!
//! Devices append events to a per-tenant outbox; workers turn each event into
//! one canonical document, FEFO lot movements and a balanced USD/LBP journal
//! entry, exactly once per `(device_id, device_seq)`.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod domain;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod services;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::services::allocator::InventoryAllocator;
use crate::services::documents::DocumentService;
use crate::services::event_store::{EventStore, RetryPolicy};
use crate::services::exceptions::ExceptionService;
use crate::services::ops::OpsService;
use crate::services::scheduler::Scheduler;
use crate::services::tenant_locks::TenantLocks;
use crate::services::worker::Worker;

/// Shared state behind the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub store: EventStore,
    pub exceptions: ExceptionService,
    pub documents: DocumentService,
    pub allocator: InventoryAllocator,
    pub scheduler: Scheduler,
    pub ops: OpsService,
    pub locks: TenantLocks,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: AppConfig, locks: TenantLocks) -> Self {
        let posting = &config.posting;
        let allocator = InventoryAllocator::new(db.clone(), posting.shortage_policy);
        Self {
            store: EventStore::new(db.clone(), RetryPolicy::from(posting)),
            exceptions: ExceptionService::new(db.clone(), locks.clone()),
            documents: DocumentService::new(db.clone()),
            scheduler: Scheduler::new(db.clone(), allocator.clone()),
            ops: OpsService::new(db.clone()),
            allocator,
            locks,
            config,
            db,
        }
    }

    /// A worker sharing this state's tenant locks.
    pub fn worker(&self) -> Worker {
        Worker::new(
            self.db.clone(),
            self.config.posting.clone(),
            self.locks.clone(),
        )
    }
}
