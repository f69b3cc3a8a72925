//! BOM expansion against live stock, and work-order consumption.

use tracing::{debug, instrument};

use mixledger_core::{DocumentId, Quantity};
use mixledger_inventory::{ChangeEvent, ChangeReason, LedgerEntry, Operator, RelatedDocument};
use mixledger_production::{BomPlanner, BomRequirement, Formula};

use crate::adjustment_engine::{AdjustmentError, InventoryAdjustmentEngine};
use crate::stock_store::{StockStore, StockStoreError, StoreCatalog};

pub struct BomCalculator<'a, S> {
    engine: &'a InventoryAdjustmentEngine<S>,
    planner: &'a BomPlanner,
}

impl<'a, S> BomCalculator<'a, S>
where
    S: StockStore,
{
    pub fn new(engine: &'a InventoryAdjustmentEngine<S>, planner: &'a BomPlanner) -> Self {
        Self { engine, planner }
    }

    /// Requirement list with availability. Read-only.
    #[instrument(skip(self, formula), fields(target = %target_quantity, fragrance = %formula.fragrance), err)]
    pub fn expand(
        &self,
        target_quantity: Quantity,
        formula: &Formula,
    ) -> Result<BomRequirement, AdjustmentError> {
        let store = self.engine.store();
        let catalog = StoreCatalog::new(store);
        let plan = self.planner.plan(target_quantity, formula, &catalog);
        if let Some(err) = catalog.take_failure() {
            return Err(AdjustmentError::Store(err));
        }
        let plan = plan?;

        let mut store_failure = None;
        let requirement = BomRequirement::from_plan(plan, |item| match store.get_stock(item) {
            Ok(stock) => Ok(Some(stock)),
            Err(StockStoreError::NotFound(_)) => Ok(None),
            Err(err) => {
                store_failure.get_or_insert(err);
                Ok(None)
            }
        });
        if let Some(err) = store_failure {
            return Err(AdjustmentError::Store(err));
        }
        let requirement = requirement?;

        debug!(
            lines = requirement.lines.len(),
            shortages = requirement.shortages().count(),
            "bom expanded"
        );
        Ok(requirement)
    }

    /// Deplete the stock a requirement describes (`workorder`).
    ///
    /// Strict: any line that would go below zero aborts the whole work order.
    pub fn consume_for_work_order(
        &self,
        work_order_id: DocumentId,
        operator: &Operator,
        requirement: &BomRequirement,
        remarks: Option<&str>,
    ) -> Result<LedgerEntry, AdjustmentError> {
        let items = requirement.consumption_adjustments()?;
        let mut event = ChangeEvent::new(ChangeReason::WorkOrder, operator.clone(), items)
            .with_related_document(RelatedDocument::work_order(work_order_id));
        if let Some(remarks) = remarks {
            event = event.with_remarks(remarks);
        }
        self.engine.apply_change_event(&event)
    }

    /// Expand, then consume the expansion. The write re-reads stock inside its
    /// own transaction.
    pub fn produce(
        &self,
        work_order_id: DocumentId,
        operator: &Operator,
        target_quantity: Quantity,
        formula: &Formula,
    ) -> Result<LedgerEntry, AdjustmentError> {
        let requirement = self.expand(target_quantity, formula)?;
        self.consume_for_work_order(work_order_id, operator, &requirement, None)
    }
}
