//! Authorized entry point for callers outside the workspace.
//!
//! Every operation asks the [`AccessCheck`] first and touches no stock when the
//! check fails.

use chrono::{DateTime, Utc};
use tracing::warn;

use mixledger_core::{AccessCheck, Capability, DocumentId, Quantity};
use mixledger_inventory::{
    ChangeEvent, ChangeReason, ItemKind, ItemRef, LedgerEntry, Operator, StockAdjustment,
};
use mixledger_production::{BomPlanner, BomRequirement, Formula};

use crate::adjustment_engine::{AdjustmentError, InventoryAdjustmentEngine};
use crate::bom_calculator::BomCalculator;
use crate::correction::{InventoryCorrection, StockCount};
use crate::ledger_query::{
    LedgerFilter, LedgerQuery, LedgerQueryResult, NetChange, Pagination, StockMovement,
};
use crate::receiving::{ReceiptLine, ReceivingPlan, ReceivingProcessor};
use crate::reports::{self, InventoryValuation, LowStockLine};
use crate::stock_store::StockStore;

/// Capability a change event of this reason needs.
pub fn capability_for(reason: ChangeReason) -> Capability {
    match reason {
        ChangeReason::Purchase => Capability::ReceiveGoods,
        ChangeReason::WorkOrder => Capability::ConsumeMaterials,
        ChangeReason::InventoryCheck | ChangeReason::ManualAdjustment => {
            Capability::AdjustInventory
        }
    }
}

pub struct InventoryService<S, A> {
    engine: InventoryAdjustmentEngine<S>,
    access: A,
    planner: BomPlanner,
}

impl<S, A> InventoryService<S, A>
where
    S: StockStore,
    A: AccessCheck,
{
    pub fn new(engine: InventoryAdjustmentEngine<S>, access: A, planner: BomPlanner) -> Self {
        Self {
            engine,
            access,
            planner,
        }
    }

    pub fn engine(&self) -> &InventoryAdjustmentEngine<S> {
        &self.engine
    }

    fn authorize(&self, caller: &Operator, capability: Capability) -> Result<(), AdjustmentError> {
        self.access
            .ensure_authorized(caller.id, capability)
            .map_err(|denied| {
                warn!(operator = %caller.id, %capability, "access denied");
                AdjustmentError::from(denied)
            })
    }

    pub fn apply_change_event(&self, event: &ChangeEvent) -> Result<LedgerEntry, AdjustmentError> {
        self.authorize(&event.operator, capability_for(event.reason))?;
        self.engine.apply_change_event(event)
    }

    pub fn receive(
        &self,
        purchase_order_id: DocumentId,
        operator: &Operator,
        lines: &[ReceiptLine],
        remarks: Option<&str>,
    ) -> Result<LedgerEntry, AdjustmentError> {
        self.authorize(operator, Capability::ReceiveGoods)?;
        ReceivingProcessor::new(&self.engine).receive(purchase_order_id, operator, lines, remarks)
    }

    pub fn receive_plan(
        &self,
        plan: &ReceivingPlan,
        operator: &Operator,
        remarks: Option<&str>,
    ) -> Result<LedgerEntry, AdjustmentError> {
        self.authorize(operator, Capability::ReceiveGoods)?;
        ReceivingProcessor::new(&self.engine).receive_plan(plan, operator, remarks)
    }

    pub fn reconcile_counts(
        &self,
        operator: &Operator,
        counts: &[StockCount],
        remarks: Option<&str>,
    ) -> Result<LedgerEntry, AdjustmentError> {
        self.authorize(operator, Capability::AdjustInventory)?;
        InventoryCorrection::new(&self.engine).reconcile_counts(operator, counts, remarks)
    }

    pub fn manual_adjust(
        &self,
        operator: &Operator,
        items: Vec<StockAdjustment>,
        remarks: Option<&str>,
    ) -> Result<LedgerEntry, AdjustmentError> {
        self.authorize(operator, Capability::AdjustInventory)?;
        InventoryCorrection::new(&self.engine).manual_adjust(operator, items, remarks)
    }

    pub fn expand_bom(
        &self,
        caller: &Operator,
        target_quantity: Quantity,
        formula: &Formula,
    ) -> Result<BomRequirement, AdjustmentError> {
        self.authorize(caller, Capability::ViewInventory)?;
        BomCalculator::new(&self.engine, &self.planner).expand(target_quantity, formula)
    }

    pub fn consume_for_work_order(
        &self,
        work_order_id: DocumentId,
        operator: &Operator,
        requirement: &BomRequirement,
        remarks: Option<&str>,
    ) -> Result<LedgerEntry, AdjustmentError> {
        self.authorize(operator, Capability::ConsumeMaterials)?;
        BomCalculator::new(&self.engine, &self.planner).consume_for_work_order(
            work_order_id,
            operator,
            requirement,
            remarks,
        )
    }

    pub fn low_stock(
        &self,
        caller: &Operator,
        kind: Option<ItemKind>,
    ) -> Result<Vec<LowStockLine>, AdjustmentError> {
        self.authorize(caller, Capability::ViewInventory)?;
        Ok(reports::low_stock(self.engine.store(), kind)?)
    }

    pub fn inventory_valuation(&self, caller: &Operator) -> Result<InventoryValuation, AdjustmentError> {
        self.authorize(caller, Capability::ViewInventory)?;
        Ok(reports::inventory_valuation(self.engine.store())?)
    }

    pub fn current_stock(&self, caller: &Operator, item: &ItemRef) -> Result<Quantity, AdjustmentError> {
        self.authorize(caller, Capability::ViewInventory)?;
        Ok(self.engine.store().get_stock(item)?)
    }
}

impl<S, A> InventoryService<S, A>
where
    S: StockStore + LedgerQuery,
    A: AccessCheck,
{
    pub async fn query_ledger(
        &self,
        caller: &Operator,
        filter: LedgerFilter,
        pagination: Pagination,
    ) -> Result<LedgerQueryResult, AdjustmentError> {
        self.authorize(caller, Capability::ViewInventory)?;
        Ok(self.engine.store().query_entries(filter, pagination).await?)
    }

    pub async fn stock_history(
        &self,
        caller: &Operator,
        item: ItemRef,
        pagination: Option<Pagination>,
    ) -> Result<Vec<StockMovement>, AdjustmentError> {
        self.authorize(caller, Capability::ViewInventory)?;
        Ok(self.engine.store().stock_history(item, pagination).await?)
    }

    pub async fn stock_as_of(
        &self,
        caller: &Operator,
        item: ItemRef,
        at: DateTime<Utc>,
    ) -> Result<Option<Quantity>, AdjustmentError> {
        self.authorize(caller, Capability::ViewInventory)?;
        Ok(self.engine.store().stock_as_of(item, at).await?)
    }

    pub async fn net_change(
        &self,
        caller: &Operator,
        filter: LedgerFilter,
    ) -> Result<Vec<NetChange>, AdjustmentError> {
        self.authorize(caller, Capability::ViewInventory)?;
        Ok(self.engine.store().net_change(filter).await?)
    }
}
