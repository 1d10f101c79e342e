//! Pure domain types shared by the services: money, events, documents,
//! journals and hold reasons. Nothing here touches the database.

pub mod document;
pub mod event;
pub mod hold;
pub mod journal;
pub mod money;
pub mod roles;

pub use document::{DocumentDraft, DocumentLineDraft, ManualLine, PaymentDraft, StockEffect};
pub use event::{CompanySelector, EventPayload, EventType, PaymentMethod};
pub use hold::{HoldReason, MatchVariance, VarianceKind};
pub use journal::{JournalDraft, JournalLineDraft, RoleLine};
pub use money::{Currency, DualAmount, RoundingLedger};
pub use roles::{AccountRole, AccountRoleMap};
