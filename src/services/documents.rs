//! Document persistence, numbering and read access.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::{LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
    EntityTrait, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::document::DocumentDraft;
use crate::entities::document::{self, DocumentStatus, DocumentType, Entity as Document};
use crate::entities::{
    document_line, document_payment, document_sequence, journal_entry, journal_line, stock_move,
};
use crate::errors::ServiceError;

/// Where a document came from.
#[derive(Debug, Clone)]
pub struct Provenance<'a> {
    pub source_event_id: Uuid,
    pub origin_company_id: Uuid,
    pub device_id: &'a str,
}

/// Next number in the company's sequence for `prefix`, e.g. `SI-000042`.
pub async fn next_doc_no<C>(conn: &C, company_id: Uuid, prefix: &str) -> Result<String, DbErr>
where
    C: ConnectionTrait,
{
    let mut query = document_sequence::Entity::find_by_id((company_id, prefix.to_string()));
    if conn.get_database_backend() == DbBackend::Postgres {
        query = query.lock(LockType::Update);
    }
    let value = match query.one(conn).await? {
        Some(row) => {
            let value = row.next_value;
            let mut active: document_sequence::ActiveModel = row.into();
            active.next_value = Set(value + 1);
            active.update(conn).await?;
            value
        }
        None => {
            document_sequence::ActiveModel {
                company_id: Set(company_id),
                prefix: Set(prefix.to_string()),
                next_value: Set(2),
            }
            .insert(conn)
            .await?;
            1
        }
    };
    Ok(format!("{prefix}-{value:06}"))
}

async fn doc_no_taken<C>(
    conn: &C,
    company_id: Uuid,
    doc_type: DocumentType,
    doc_no: &str,
) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
{
    let count = Document::find()
        .filter(document::Column::CompanyId.eq(company_id))
        .filter(document::Column::DocType.eq(doc_type))
        .filter(document::Column::DocNo.eq(doc_no))
        .count(conn)
        .await?;
    Ok(count > 0)
}

/// Keeps a device-assigned number when it is still free, otherwise draws
/// from the sequence, skipping numbers devices already used.
pub async fn assign_doc_no<C>(
    conn: &C,
    company_id: Uuid,
    doc_type: DocumentType,
    requested: Option<&str>,
) -> Result<String, DbErr>
where
    C: ConnectionTrait,
{
    if let Some(requested) = requested.map(str::trim).filter(|n| !n.is_empty()) {
        if !doc_no_taken(conn, company_id, doc_type, requested).await? {
            return Ok(requested.to_string());
        }
    }
    loop {
        let candidate = next_doc_no(conn, company_id, doc_type.number_prefix()).await?;
        if !doc_no_taken(conn, company_id, doc_type, &candidate).await? {
            return Ok(candidate);
        }
    }
}

/// Writes header, lines, payments and stock moves.
pub async fn persist<C>(
    conn: &C,
    draft: &DocumentDraft,
    provenance: &Provenance<'_>,
    doc_no: &str,
) -> Result<document::Model, DbErr>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let doc = document::ActiveModel {
        id: Set(Uuid::new_v4()),
        company_id: Set(draft.company_id),
        origin_company_id: Set(provenance.origin_company_id),
        source_event_id: Set(provenance.source_event_id),
        doc_type: Set(draft.doc_type),
        doc_no: Set(doc_no.to_string()),
        status: Set(draft.status),
        doc_date: Set(draft.doc_date),
        due_date: Set(draft.due_date),
        exchange_rate: Set(draft.exchange_rate),
        subtotal_usd: Set(draft.subtotal.usd),
        subtotal_lbp: Set(draft.subtotal.lbp),
        tax_usd: Set(draft.tax.usd),
        tax_lbp: Set(draft.tax.lbp),
        total_usd: Set(draft.total.usd),
        total_lbp: Set(draft.total.lbp),
        rounding_usd: Set(draft.rounding.usd),
        rounding_lbp: Set(draft.rounding.lbp),
        cost_usd: Set(draft.cost.usd),
        cost_lbp: Set(draft.cost.lbp),
        customer_id: Set(draft.customer_id),
        warehouse_id: Set(draft.warehouse_id),
        counter_warehouse_id: Set(draft.counter_warehouse_id),
        shift_id: Set(draft.shift_id),
        device_id: Set(Some(provenance.device_id.to_string())),
        reference_document_id: Set(draft.reference_document_id),
        memo: Set(draft.memo.clone()),
        metadata: Set(draft.metadata.clone()),
        created_at: Set(now),
        posted_at: Set((draft.status == DocumentStatus::Posted).then_some(now)),
    }
    .insert(conn)
    .await?;

    for line in &draft.lines {
        document_line::ActiveModel {
            id: Set(Uuid::new_v4()),
            document_id: Set(doc.id),
            line_no: Set(line.line_no),
            item_id: Set(line.item_id),
            sku: Set(line.sku.clone()),
            description: Set(line.description.clone()),
            qty: Set(line.qty),
            unit_price_usd: Set(line.unit_price.usd),
            unit_price_lbp: Set(line.unit_price.lbp),
            discount_pct: Set(line.discount_pct),
            line_total_usd: Set(line.line_total.usd),
            line_total_lbp: Set(line.line_total.lbp),
            tax_usd: Set(line.tax.usd),
            tax_lbp: Set(line.tax.lbp),
            tax_code_id: Set(line.tax_code_id),
            cost_usd: Set(line.cost.usd),
            cost_lbp: Set(line.cost.lbp),
        }
        .insert(conn)
        .await?;
    }

    for payment in &draft.payments {
        document_payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            document_id: Set(doc.id),
            method: Set(payment.method.as_str().to_string()),
            amount_usd: Set(payment.amount.usd),
            amount_lbp: Set(payment.amount.lbp),
        }
        .insert(conn)
        .await?;
    }

    for effect in &draft.stock {
        stock_move::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(draft.company_id),
            document_id: Set(doc.id),
            line_no: Set(effect.line_no),
            item_id: Set(effect.item_id),
            warehouse_id: Set(effect.warehouse_id),
            batch_id: Set(effect.batch_id),
            qty_in: Set(effect.qty_in),
            qty_out: Set(effect.qty_out),
            unit_cost_usd: Set(effect.unit_cost.usd),
            unit_cost_lbp: Set(effect.unit_cost.lbp),
            move_date: Set(draft.doc_date),
            created_at: Set(now),
        }
        .insert(conn)
        .await?;
    }

    Ok(doc)
}

/// Removes a draft produced by a held event so the event can post afresh.
pub async fn discard_draft<C>(conn: &C, source_event_id: Uuid) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
{
    let result = Document::delete_many()
        .filter(document::Column::SourceEventId.eq(source_event_id))
        .filter(document::Column::Status.eq(DocumentStatus::Draft))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalView {
    pub entry: journal_entry::Model,
    pub lines: Vec<journal_line::Model>,
}

/// A document with everything hanging off it.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub document: document::Model,
    pub lines: Vec<document_line::Model>,
    pub payments: Vec<document_payment::Model>,
    pub stock_moves: Vec<stock_move::Model>,
    pub journal: Option<JournalView>,
}

#[derive(Clone)]
pub struct DocumentService {
    db: Arc<DatabaseConnection>,
}

impl DocumentService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: Uuid) -> Result<DocumentView, ServiceError> {
        let document = Document::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("document {id}")))?;
        self.view(document).await
    }

    pub async fn by_event(&self, event_id: Uuid) -> Result<Option<DocumentView>, ServiceError> {
        match Document::find()
            .filter(document::Column::SourceEventId.eq(event_id))
            .one(&*self.db)
            .await?
        {
            Some(document) => Ok(Some(self.view(document).await?)),
            None => Ok(None),
        }
    }

    pub async fn count_for_company(&self, company_id: Uuid) -> Result<u64, ServiceError> {
        Ok(Document::find()
            .filter(document::Column::CompanyId.eq(company_id))
            .count(&*self.db)
            .await?)
    }

    async fn view(&self, document: document::Model) -> Result<DocumentView, ServiceError> {
        let conn = &*self.db;
        let lines = document
            .find_related(document_line::Entity)
            .order_by_asc(document_line::Column::LineNo)
            .all(conn)
            .await?;
        let payments = document
            .find_related(document_payment::Entity)
            .all(conn)
            .await?;
        let stock_moves = stock_move::Entity::find()
            .filter(stock_move::Column::DocumentId.eq(document.id))
            .order_by_asc(stock_move::Column::LineNo)
            .all(conn)
            .await?;
        let journal = match journal_entry::Entity::find()
            .filter(journal_entry::Column::DocumentId.eq(document.id))
            .one(conn)
            .await?
        {
            Some(entry) => {
                let lines = journal_line::Entity::find()
                    .filter(journal_line::Column::EntryId.eq(entry.id))
                    .order_by_asc(journal_line::Column::LineNo)
                    .all(conn)
                    .await?;
                Some(JournalView { entry, lines })
            }
            None => None,
        };
        Ok(DocumentView {
            document,
            lines,
            payments,
            stock_moves,
            journal,
        })
    }
}
