// Intake and exactly-once bookkeeping
pub mod event_store;
pub mod idempotency;

// Reference data and stock
pub mod allocator;
pub mod resolver;

// Documents and ledger
pub mod document_builder;
pub mod documents;
pub mod ledger;

// Orchestration
pub mod posting;
pub mod tenant_locks;
pub mod worker;

// Operator surface and background jobs
pub mod exceptions;
pub mod ops;
pub mod scheduler;
