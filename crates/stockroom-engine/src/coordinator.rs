//! # Transaction Coordinator
//!
//! The only component that changes orders, sales and the stock they hold.
//! Every public operation either commits completely or leaves storage
//! exactly as it was.
//!
//! ## Anatomy of One Attempt
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    coordinator.add_line(req)                            │
//! │                                                                         │
//! │  1. Validate input ─────────────────────── Validation (no retry)        │
//! │                                                                         │
//! │  ┌─ with_retry ──────────────────────────────────────────────────────┐  │
//! │  │ 2. Read committed aggregate (pool) ──── NotFound / InvalidState   │  │
//! │  │ 3. Catalog lookup, price snapshot ───── NotFound                  │  │
//! │  │ 4. Build the next aggregate in memory                             │  │
//! │  │ 5. Lock variants (sorted, deduped) ──── Retryable on timeout      │  │
//! │  │ 6. BEGIN                                                          │  │
//! │  │      claim(version) ─────────────────── Conflict → retry          │  │
//! │  │      reserve / release (logged) ─────── InsufficientStock         │  │
//! │  │      write lines + header                                         │  │
//! │  │      append history                                               │  │
//! │  │    COMMIT ───────────────────────────── Busy → retry              │  │
//! │  │    on error: undo log, ROLLBACK                                   │  │
//! │  └───────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  7. Return the committed aggregate                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Statement Order
//! All reads happen before BEGIN. The first statement of every unit of
//! work is a conditional write (a reservation, a version claim, or the
//! cancel guard), so SQLite takes the write lock up front and never
//! upgrades a read snapshot. No pool read is issued while a unit of work
//! holds a connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use stockroom_core::validation::{
    validate_address, validate_declared_total, validate_id, validate_line_count,
    validate_line_quantity, validate_reference, validate_unit_price,
};
use stockroom_core::{
    Aggregate, AggregateKind, AggregateLine, CoreError, HistoryEntry, HistoryEvent, Money,
    OrderStatus, PricingCalculator, Quantity, StockMovement, TransactionState, ValidationError,
};
use stockroom_db::{
    generate_aggregate_id, generate_line_id, AggregateRepository, Database, DbError,
    HistoryRepository, UnitOfWork,
};

use crate::catalog::{Catalog, CatalogVariant, SqliteCatalog};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::locks::VariantLocks;
use crate::request::{AddLine, CreateAggregate, LineRequest, UpdateLine};
use crate::reservations::ReservationLog;
use crate::retry::{with_retry, RetryPolicy};

/// Default page size for [`TransactionCoordinator::list_for_customer`].
pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// Orchestrates all-or-nothing changes to aggregates and inventory.
///
/// Cheap to clone; clones share the pool, the catalog and the lock
/// registry, so hand one to every request handler.
///
/// ## Usage
/// ```rust,ignore
/// let coordinator = TransactionCoordinator::with_sqlite_catalog(db);
///
/// let sale = coordinator
///     .create(CreateAggregate::sale(
///         vec![LineRequest::new("v-1", Quantity::from_units(3))],
///         Money::from_cents(4497),
///     ))
///     .await?;
///
/// coordinator.cancel(&sale.id).await?;
/// ```
#[derive(Clone)]
pub struct TransactionCoordinator {
    db: Database,
    catalog: Arc<dyn Catalog>,
    locks: VariantLocks,
    pricing: PricingCalculator,
    retry: RetryPolicy,
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("locks", &self.locks)
            .field("pricing", &self.pricing)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl TransactionCoordinator {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Creates a coordinator with default pricing, retry and lock settings.
    pub fn new(db: Database, catalog: Arc<dyn Catalog>) -> Self {
        TransactionCoordinator {
            db,
            catalog,
            locks: VariantLocks::default(),
            pricing: PricingCalculator::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Creates a coordinator whose catalog is the local variants table.
    pub fn with_sqlite_catalog(db: Database) -> Self {
        let catalog = Arc::new(SqliteCatalog::new(db.variants()));
        Self::new(db, catalog)
    }

    /// Opens the configured database and builds a coordinator from config.
    pub async fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let db = Database::new(config.to_db_config())
            .await
            .map_err(|e| EngineError::Fatal {
                operation: "open database".to_string(),
                attempts: 1,
                message: e.to_string(),
            })?;

        Ok(Self::with_sqlite_catalog(db)
            .with_pricing(config.pricing())
            .with_retry_policy(config.retry_policy())
            .with_lock_timeout(config.lock_timeout()))
    }

    pub fn with_pricing(mut self, pricing: PricingCalculator) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the lock registry. Clones made earlier keep the old one.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.locks = VariantLocks::new(timeout);
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn pricing(&self) -> &PricingCalculator {
        &self.pricing
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Creates an order or sale, reserving stock for every line.
    ///
    /// ## Errors
    /// - `Validation` for malformed input
    /// - `NotFound` for an unknown variant
    /// - `TotalMismatch` before any stock is touched
    /// - `InsufficientStock` with the offending `line_index`; every
    ///   reservation made so far is released
    #[instrument(
        skip(self, request),
        fields(kind = %request.kind, lines = request.lines.len(), aggregate_id = tracing::field::Empty)
    )]
    pub async fn create(&self, request: CreateAggregate) -> EngineResult<Aggregate> {
        validate_create(&request)?;

        let request = &request;
        with_retry(&self.retry, "create", move || self.try_create(request)).await
    }

    async fn try_create(&self, request: &CreateAggregate) -> EngineResult<Aggregate> {
        let prices = self.snapshot_prices(&request.lines).await?;

        let now = Utc::now();
        let id = generate_aggregate_id();
        tracing::Span::current().record("aggregate_id", id.as_str());

        let lines: Vec<AggregateLine> = request
            .lines
            .iter()
            .zip(prices)
            .enumerate()
            .map(|(position, (line, unit_price))| AggregateLine {
                id: generate_line_id(),
                variant_id: line.variant_id.clone(),
                position: position as i64,
                quantity: line.quantity,
                unit_price,
                line_total: self.pricing.line_total(unit_price, line.quantity),
                created_at: now,
                updated_at: now,
            })
            .collect();

        let total = self.pricing.aggregate_total(lines.iter().map(|l| l.line_total));
        self.pricing.validate_total(request.declared_total, total)?;

        let mut aggregate = Aggregate {
            id,
            kind: request.kind,
            customer_ref: request.customer_ref.as_ref().map(|r| r.trim().to_string()),
            delivery: request.delivery.clone(),
            state: TransactionState::Draft,
            order_status: match request.kind {
                AggregateKind::Order => Some(OrderStatus::Pending),
                AggregateKind::Sale => None,
            },
            total,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            version: 0,
            lines,
        };
        aggregate.state = transition(&aggregate, TransactionState::Committed)?;

        let _guards = self.locks.acquire("create", aggregate.variant_ids()).await?;

        let mut uow = self.db.begin().await?;
        let mut log = ReservationLog::new(&aggregate.id);
        let result = async {
            let ledger = self.db.ledger();
            for (index, line) in aggregate.lines.iter().enumerate() {
                log.reserve(&ledger, uow.conn(), &line.variant_id, line.quantity)
                    .await
                    .map_err(|e| EngineError::from(e).at_line(index))?;
            }
            AggregateRepository::insert(uow.conn(), &aggregate).await?;
            HistoryRepository::append(uow.conn(), &aggregate, HistoryEvent::Created).await?;
            Ok::<_, EngineError>(())
        }
        .await;
        self.finish(uow, log, result).await?;

        info!(
            aggregate_id = %aggregate.id,
            kind = %aggregate.kind,
            total = %aggregate.total,
            lines = aggregate.lines.len(),
            "Aggregate created"
        );
        Ok(aggregate)
    }

    // =========================================================================
    // Line Mutations
    // =========================================================================

    /// Appends a line, reserving its quantity.
    #[instrument(skip(self, request), fields(aggregate_id = %request.aggregate_id, variant_id = %request.variant_id))]
    pub async fn add_line(&self, request: AddLine) -> EngineResult<Aggregate> {
        validate_id("aggregate_id", &request.aggregate_id)?;
        validate_line(&LineRequest {
            variant_id: request.variant_id.clone(),
            quantity: request.quantity,
            unit_price: request.unit_price,
        })?;

        let request = &request;
        with_retry(&self.retry, "add_line", move || self.try_add_line(request)).await
    }

    async fn try_add_line(&self, request: &AddLine) -> EngineResult<Aggregate> {
        let current = self.load_mutable(&request.aggregate_id).await?;
        validate_line_count(current.lines.len() + 1)?;

        let variant = self.lookup_variant(&request.variant_id).await?;
        let unit_price = request.unit_price.unwrap_or(variant.price);

        let now = Utc::now();
        let line = AggregateLine {
            id: generate_line_id(),
            variant_id: variant.id,
            position: current.next_position(),
            quantity: request.quantity,
            unit_price,
            line_total: self.pricing.line_total(unit_price, request.quantity),
            created_at: now,
            updated_at: now,
        };

        let mut next = self.advance(&current, now)?;
        next.lines.push(line.clone());
        next.total = next.computed_total(&self.pricing);

        let _guards = self.locks.acquire("add_line", [line.variant_id.as_str()]).await?;

        let mut uow = self.db.begin().await?;
        let mut log = ReservationLog::new(&next.id);
        let result = async {
            AggregateRepository::claim(uow.conn(), &current.id, current.version, now).await?;
            log.reserve(&self.db.ledger(), uow.conn(), &line.variant_id, line.quantity)
                .await?;
            AggregateRepository::insert_line(uow.conn(), &next.id, &line).await?;
            AggregateRepository::write_header(uow.conn(), &next).await?;
            HistoryRepository::append(uow.conn(), &next, HistoryEvent::LineAdded).await?;
            Ok::<_, EngineError>(())
        }
        .await;
        self.finish(uow, log, result).await?;

        info!(
            aggregate_id = %next.id,
            line_id = %line.id,
            variant_id = %line.variant_id,
            quantity = %line.quantity,
            total = %next.total,
            "Line added"
        );
        Ok(next)
    }

    /// Changes a line's quantity, variant, or both.
    ///
    /// Same variant: only the difference is reserved or released.
    /// New variant: the old quantity is released and the new one reserved
    /// at the new variant's catalog price; if that reservation fails the
    /// old quantity is reserved again, so inventory is unchanged.
    #[instrument(skip(self, request), fields(aggregate_id = %request.aggregate_id, line_id = %request.line_id))]
    pub async fn update_line(&self, request: UpdateLine) -> EngineResult<Aggregate> {
        validate_id("aggregate_id", &request.aggregate_id)?;
        validate_id("line_id", &request.line_id)?;
        if let Some(variant_id) = &request.variant_id {
            validate_id("variant_id", variant_id)?;
        }
        if let Some(quantity) = request.quantity {
            validate_line_quantity(quantity)?;
        }

        let request = &request;
        with_retry(&self.retry, "update_line", move || self.try_update_line(request)).await
    }

    async fn try_update_line(&self, request: &UpdateLine) -> EngineResult<Aggregate> {
        let current = self.load_mutable(&request.aggregate_id).await?;
        let old = current
            .line(&request.line_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("Line", &request.line_id))?;

        let new_variant = request
            .variant_id
            .clone()
            .unwrap_or_else(|| old.variant_id.clone());
        let new_quantity = request.quantity.unwrap_or(old.quantity);
        let swap = new_variant != old.variant_id;

        if !swap && new_quantity == old.quantity {
            debug!(line_id = %old.id, "Update changes nothing");
            return Ok(current);
        }

        // The snapshot only moves when the variant does
        let unit_price = if swap {
            self.lookup_variant(&new_variant).await?.price
        } else {
            old.unit_price
        };

        let now = Utc::now();
        let updated = AggregateLine {
            variant_id: new_variant.clone(),
            quantity: new_quantity,
            unit_price,
            line_total: self.pricing.line_total(unit_price, new_quantity),
            updated_at: now,
            ..old.clone()
        };

        let mut next = self.advance(&current, now)?;
        for line in next.lines.iter_mut().filter(|l| l.id == updated.id) {
            *line = updated.clone();
        }
        next.total = next.computed_total(&self.pricing);

        let _guards = self
            .locks
            .acquire("update_line", [old.variant_id.as_str(), new_variant.as_str()])
            .await?;

        let mut uow = self.db.begin().await?;
        let mut log = ReservationLog::new(&next.id);
        let result = async {
            let ledger = self.db.ledger();
            AggregateRepository::claim(uow.conn(), &current.id, current.version, now).await?;

            if swap {
                log.release(&ledger, uow.conn(), &old.variant_id, old.quantity)
                    .await?;
                log.reserve(&ledger, uow.conn(), &new_variant, new_quantity)
                    .await?;
            } else if new_quantity > old.quantity {
                log.reserve(&ledger, uow.conn(), &new_variant, new_quantity - old.quantity)
                    .await?;
            } else {
                log.release(&ledger, uow.conn(), &new_variant, old.quantity - new_quantity)
                    .await?;
            }

            AggregateRepository::update_line(uow.conn(), &next.id, &updated).await?;
            AggregateRepository::write_header(uow.conn(), &next).await?;
            HistoryRepository::append(uow.conn(), &next, HistoryEvent::LineUpdated).await?;
            Ok::<_, EngineError>(())
        }
        .await;
        self.finish(uow, log, result).await?;

        info!(
            aggregate_id = %next.id,
            line_id = %updated.id,
            variant_id = %updated.variant_id,
            quantity = %updated.quantity,
            total = %next.total,
            "Line updated"
        );
        Ok(next)
    }

    /// Removes a line and releases exactly what it reserved.
    ///
    /// The total is recomputed from the remaining lines, so a stored total
    /// that drifted is corrected rather than trusted.
    #[instrument(skip(self))]
    pub async fn remove_line(&self, aggregate_id: &str, line_id: &str) -> EngineResult<Aggregate> {
        validate_id("aggregate_id", aggregate_id)?;
        validate_id("line_id", line_id)?;

        with_retry(&self.retry, "remove_line", move || {
            self.try_remove_line(aggregate_id, line_id)
        })
        .await
    }

    async fn try_remove_line(&self, aggregate_id: &str, line_id: &str) -> EngineResult<Aggregate> {
        let current = self.load_mutable(aggregate_id).await?;
        let removed = current
            .line(line_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("Line", line_id))?;

        let now = Utc::now();
        let mut next = self.advance(&current, now)?;
        next.lines.retain(|l| l.id != removed.id);
        next.total = next.computed_total(&self.pricing);

        let _guards = self
            .locks
            .acquire("remove_line", [removed.variant_id.as_str()])
            .await?;

        let mut uow = self.db.begin().await?;
        let mut log = ReservationLog::new(&next.id);
        let result = async {
            AggregateRepository::claim(uow.conn(), &current.id, current.version, now).await?;
            log.release(&self.db.ledger(), uow.conn(), &removed.variant_id, removed.quantity)
                .await?;
            AggregateRepository::delete_line(uow.conn(), &next.id, &removed.id).await?;
            AggregateRepository::write_header(uow.conn(), &next).await?;
            HistoryRepository::append(uow.conn(), &next, HistoryEvent::LineRemoved).await?;
            Ok::<_, EngineError>(())
        }
        .await;
        self.finish(uow, log, result).await?;

        if current.total != current.computed_total(&self.pricing) {
            warn!(
                aggregate_id = %next.id,
                stored = %current.total,
                recomputed = %next.total,
                "Stored total had drifted; recomputed from lines"
            );
        }
        info!(
            aggregate_id = %next.id,
            line_id = %removed.id,
            released = %removed.quantity,
            total = %next.total,
            "Line removed"
        );
        Ok(next)
    }

    // =========================================================================
    // Cancel and Status
    // =========================================================================

    /// Releases every line's reservation and marks the aggregate cancelled.
    ///
    /// Idempotent: a repeat or concurrent call finds the aggregate already
    /// cancelled, releases nothing, and returns it.
    #[instrument(skip(self))]
    pub async fn cancel(&self, aggregate_id: &str) -> EngineResult<Aggregate> {
        validate_id("aggregate_id", aggregate_id)?;

        with_retry(&self.retry, "cancel", move || self.try_cancel(aggregate_id)).await
    }

    async fn try_cancel(&self, aggregate_id: &str) -> EngineResult<Aggregate> {
        let current = self.load(aggregate_id).await?;
        if current.is_cancelled() {
            debug!(aggregate_id, "Already cancelled");
            return Ok(current);
        }

        let guards = self.locks.acquire("cancel", current.variant_ids()).await?;
        let now = Utc::now();

        let mut uow = self.db.begin().await?;
        let mut log = ReservationLog::new(aggregate_id);
        let result = async {
            // Guard first: only one caller ever gets past this
            if !AggregateRepository::mark_cancelled(uow.conn(), aggregate_id, now).await? {
                return Ok(None);
            }

            let cancelled = AggregateRepository::load(uow.conn(), aggregate_id)
                .await?
                .ok_or_else(|| EngineError::not_found("Aggregate", aggregate_id))?;

            // A line added after our read may reference a variant we did not lock
            if cancelled.lines.iter().any(|l| !guards.covers(&l.variant_id)) {
                return Err(EngineError::Storage(DbError::conflict("Aggregate", aggregate_id)));
            }

            let ledger = self.db.ledger();
            for line in &cancelled.lines {
                log.release(&ledger, uow.conn(), &line.variant_id, line.quantity)
                    .await?;
            }
            HistoryRepository::append(uow.conn(), &cancelled, HistoryEvent::Cancelled).await?;
            Ok::<_, EngineError>(Some(cancelled))
        }
        .await;

        match self.finish(uow, log, result).await? {
            Some(cancelled) => {
                info!(
                    aggregate_id,
                    released_lines = cancelled.lines.len(),
                    "Aggregate cancelled"
                );
                Ok(cancelled)
            }
            None => {
                debug!(aggregate_id, "Cancelled concurrently by another caller");
                self.load(aggregate_id).await
            }
        }
    }

    /// Moves an order forward through its fulfillment pipeline.
    ///
    /// Skipping ahead is allowed; going back is not. `Cancelled` is handed
    /// to [`cancel`](Self::cancel) so stock is released. Sales have no
    /// status and always fail with `InvalidState`.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        aggregate_id: &str,
        status: OrderStatus,
    ) -> EngineResult<Aggregate> {
        validate_id("aggregate_id", aggregate_id)?;

        if status == OrderStatus::Cancelled {
            let current = self.get(aggregate_id).await?;
            if current.kind == AggregateKind::Sale {
                return Err(EngineError::invalid_state(
                    aggregate_id,
                    "sales have no fulfillment status",
                ));
            }
            return self.cancel(aggregate_id).await;
        }

        with_retry(&self.retry, "update_status", move || {
            self.try_update_status(aggregate_id, status)
        })
        .await
    }

    async fn try_update_status(
        &self,
        aggregate_id: &str,
        status: OrderStatus,
    ) -> EngineResult<Aggregate> {
        let current = self.load(aggregate_id).await?;

        if current.kind == AggregateKind::Sale {
            return Err(EngineError::invalid_state(
                aggregate_id,
                "sales have no fulfillment status",
            ));
        }
        if current.is_cancelled() {
            return Err(EngineError::invalid_state(aggregate_id, "order is cancelled"));
        }

        let from = current.order_status.unwrap_or_default();
        if from == status {
            return Ok(current);
        }
        if !from.can_advance_to(status) {
            return Err(CoreError::InvalidTransition {
                aggregate_id: aggregate_id.to_string(),
                from: from.to_string(),
                to: status.to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let mut next = current.clone();
        next.order_status = Some(status);
        next.version += 1;
        next.updated_at = now;

        let mut uow = self.db.begin().await?;
        let result = async {
            AggregateRepository::claim(uow.conn(), &current.id, current.version, now).await?;
            AggregateRepository::write_header(uow.conn(), &next).await?;
            HistoryRepository::append(uow.conn(), &next, HistoryEvent::StatusChanged).await?;
            Ok::<_, EngineError>(())
        }
        .await;
        self.finish(uow, ReservationLog::new(aggregate_id), result).await?;

        info!(aggregate_id, from = %from, to = %status, "Order status changed");
        Ok(next)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The last committed state of an aggregate.
    pub async fn get(&self, aggregate_id: &str) -> EngineResult<Aggregate> {
        with_retry(&self.retry, "get", move || self.load(aggregate_id)).await
    }

    /// A customer's aggregates, newest first.
    pub async fn list_for_customer(
        &self,
        customer_ref: &str,
        limit: Option<u32>,
    ) -> EngineResult<Vec<Aggregate>> {
        validate_reference("customer_ref", customer_ref)?;
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT);

        with_retry(&self.retry, "list_for_customer", move || async move {
            self.db
                .aggregates()
                .list_for_customer(customer_ref.trim(), limit)
                .await
                .map_err(EngineError::from)
        })
        .await
    }

    /// Every committed change to an aggregate, oldest first.
    pub async fn history(&self, aggregate_id: &str) -> EngineResult<Vec<HistoryEntry>> {
        with_retry(&self.retry, "history", move || async move {
            self.db
                .history()
                .for_aggregate(aggregate_id)
                .await
                .map_err(EngineError::from)
        })
        .await
    }

    /// Advisory available quantity. Takes no locks; never use it to decide
    /// whether a sale can go ahead.
    pub async fn available(&self, variant_id: &str) -> EngineResult<Quantity> {
        with_retry(&self.retry, "available", move || async move {
            self.db
                .ledger()
                .available(variant_id)
                .await
                .map_err(EngineError::from)
        })
        .await
    }

    /// Stock journal for a variant, oldest first.
    pub async fn movements(&self, variant_id: &str) -> EngineResult<Vec<StockMovement>> {
        with_retry(&self.retry, "movements", move || async move {
            self.db
                .ledger()
                .movements(variant_id)
                .await
                .map_err(EngineError::from)
        })
        .await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn load(&self, aggregate_id: &str) -> EngineResult<Aggregate> {
        self.db
            .aggregates()
            .get_by_id(aggregate_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Aggregate", aggregate_id))
    }

    /// Loads an aggregate whose lines may still change.
    async fn load_mutable(&self, aggregate_id: &str) -> EngineResult<Aggregate> {
        let aggregate = self.load(aggregate_id).await?;
        if !aggregate.state.is_mutable() {
            return Err(EngineError::invalid_state(
                aggregate_id,
                format!("{} is {}", aggregate.kind, aggregate.state),
            ));
        }
        Ok(aggregate)
    }

    /// Catalog entry for a variant. A catalog price outside the unit price
    /// limits is refused rather than snapshotted.
    async fn lookup_variant(&self, variant_id: &str) -> EngineResult<CatalogVariant> {
        let variant = self
            .catalog
            .get_variant(variant_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Variant", variant_id))?;
        validate_unit_price(variant.price)?;
        Ok(variant)
    }

    /// Unit price per request line: the client's if given, else the
    /// catalog's. Every variant must exist either way.
    async fn snapshot_prices(&self, lines: &[LineRequest]) -> EngineResult<Vec<Money>> {
        let mut catalog_prices: HashMap<&str, Money> = HashMap::new();
        for line in lines {
            if !catalog_prices.contains_key(line.variant_id.as_str()) {
                let variant = self.lookup_variant(&line.variant_id).await?;
                catalog_prices.insert(line.variant_id.as_str(), variant.price);
            }
        }

        Ok(lines
            .iter()
            .map(|line| {
                line.unit_price
                    .or_else(|| catalog_prices.get(line.variant_id.as_str()).copied())
                    .unwrap_or_default()
            })
            .collect())
    }

    /// Copy of `current` moved to `Modified` with the version the claim
    /// will produce.
    fn advance(&self, current: &Aggregate, now: DateTime<Utc>) -> EngineResult<Aggregate> {
        let mut next = current.clone();
        next.state = transition(current, TransactionState::Modified)?;
        next.version += 1;
        next.updated_at = now;
        Ok(next)
    }

    /// Commits on success. On failure undoes the logged ledger changes,
    /// rolls back, and returns the original error.
    async fn finish<T>(
        &self,
        mut uow: UnitOfWork,
        log: ReservationLog,
        result: EngineResult<T>,
    ) -> EngineResult<T> {
        match result {
            Ok(value) => {
                uow.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if !log.is_empty() {
                    if let Err(e) = log.undo(&self.db.ledger(), uow.conn()).await {
                        warn!(error = %e, "Compensation incomplete; relying on rollback");
                    }
                }
                if let Err(e) = uow.rollback().await {
                    warn!(error = %e, "Rollback failed; transaction discarded on drop");
                }
                Err(err)
            }
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

fn transition(aggregate: &Aggregate, next: TransactionState) -> EngineResult<TransactionState> {
    if aggregate.state.can_transition_to(next) {
        Ok(next)
    } else {
        Err(CoreError::InvalidTransition {
            aggregate_id: aggregate.id.clone(),
            from: aggregate.state.to_string(),
            to: next.to_string(),
        }
        .into())
    }
}

fn validate_line(line: &LineRequest) -> EngineResult<()> {
    validate_id("variant_id", &line.variant_id)?;
    validate_line_quantity(line.quantity)?;
    if let Some(price) = line.unit_price {
        validate_unit_price(price)?;
    }
    Ok(())
}

fn validate_create(request: &CreateAggregate) -> EngineResult<()> {
    validate_line_count(request.lines.len())?;

    match request.kind {
        AggregateKind::Order => {
            let customer_ref =
                request
                    .customer_ref
                    .as_deref()
                    .ok_or_else(|| ValidationError::Required {
                        field: "customer_ref".to_string(),
                    })?;
            validate_reference("customer_ref", customer_ref)?;
        }
        AggregateKind::Sale => {
            if let Some(customer_ref) = &request.customer_ref {
                validate_reference("customer_ref", customer_ref)?;
            }
            if request.delivery.is_some() {
                return Err(EngineError::validation("delivery is only accepted on orders"));
            }
        }
    }

    if let Some(delivery) = &request.delivery {
        validate_address(&delivery.address)?;
    }

    for (index, line) in request.lines.iter().enumerate() {
        validate_line(line).map_err(|e| match e {
            EngineError::Validation(msg) => EngineError::Validation(format!("line {}: {}", index, msg)),
            other => other,
        })?;
    }

    validate_declared_total(request.declared_total)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(variant: &str, units: i64) -> LineRequest {
        LineRequest::new(variant, Quantity::from_units(units))
    }

    #[test]
    fn test_order_requires_customer() {
        let mut req = CreateAggregate::order("CUST-1", vec![line("v-1", 1)], Money::zero());
        assert!(validate_create(&req).is_ok());

        req.customer_ref = None;
        assert!(matches!(validate_create(&req), Err(EngineError::Validation(_))));

        req.customer_ref = Some("   ".into());
        assert!(matches!(validate_create(&req), Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_sale_rejects_delivery() {
        let req = CreateAggregate::sale(vec![line("v-1", 1)], Money::zero()).with_delivery(
            stockroom_core::DeliveryInfo {
                address: "12 Mill Lane, Leeds".into(),
                phone: None,
                notes: None,
            },
        );
        assert!(matches!(validate_create(&req), Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_line_limits() {
        assert!(validate_create(&CreateAggregate::sale(vec![], Money::zero())).is_err());

        let too_many = (0..101).map(|i| line(&format!("v-{}", i), 1)).collect();
        assert!(validate_create(&CreateAggregate::sale(too_many, Money::zero())).is_err());

        let huge = CreateAggregate::sale(vec![line("v-1", 1000)], Money::zero());
        assert!(validate_create(&huge).is_err());

        let zero = CreateAggregate::sale(vec![line("v-1", 0)], Money::zero());
        let err = validate_create(&zero).unwrap_err();
        assert!(err.to_string().contains("line 0"));

        let negative_price = CreateAggregate::sale(
            vec![line("v-1", 1).with_price(Money::from_cents(-1))],
            Money::zero(),
        );
        assert!(validate_create(&negative_price).is_err());
    }

    #[test]
    fn test_cancelled_cannot_be_modified() {
        let now = Utc::now();
        let agg = Aggregate {
            id: "a-1".into(),
            kind: AggregateKind::Sale,
            customer_ref: None,
            delivery: None,
            state: TransactionState::Cancelled,
            order_status: None,
            total: Money::zero(),
            created_at: now,
            updated_at: now,
            cancelled_at: Some(now),
            version: 2,
            lines: vec![],
        };
        let err = transition(&agg, TransactionState::Modified).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));
    }
}
