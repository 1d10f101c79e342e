// Outbox and processing bookkeeping
pub mod job_run;
pub mod outbox_event;
pub mod processed_event;
pub mod worker_heartbeat;

// Master data
pub mod account_role_mapping;
pub mod catalog_item;
pub mod customer;
pub mod document_sequence;
pub mod exchange_rate;
pub mod period_lock;
pub mod pos_device;
pub mod tax_code;

// Documents and ledger
pub mod document;
pub mod document_line;
pub mod document_payment;
pub mod journal_entry;
pub mod journal_line;
pub mod stock_move;

// Inventory and shifts
pub mod inventory_batch;
pub mod pos_shift;

// Exceptions and recurring journals
pub mod exception_action;
pub mod exception_item;
pub mod journal_template;
pub mod journal_template_line;
pub mod recurring_journal_rule;
