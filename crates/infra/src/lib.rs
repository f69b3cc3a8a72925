//! Infrastructure layer: stock stores, the adjustment engine and the
//! processes built on it (receiving, corrections, BOM consumption), plus ledger
//! queries, reports and configuration.

pub mod adjustment_engine;
pub mod bom_calculator;
pub mod config;
pub mod correction;
pub mod ledger_query;
pub mod receiving;
pub mod reports;
pub mod service;
pub mod stock_store;


pub use adjustment_engine::{AdjustmentError, InventoryAdjustmentEngine, DEFAULT_MAX_COMMIT_ATTEMPTS};
pub use bom_calculator::BomCalculator;
pub use config::LedgerConfig;
pub use correction::{InventoryCorrection, StockCount};
pub use ledger_query::{
    LedgerFilter, LedgerQuery, LedgerQueryResult, NetChange, Pagination, StockMovement,
};
pub use receiving::{PlannedReceipt, ReceiptLine, ReceiptVariance, ReceivingPlan, ReceivingProcessor};
pub use reports::{InventoryValuation, KindValuation, LowStockLine};
pub use service::InventoryService;
pub use stock_store::{InMemoryStockStore, PostgresStockStore, StockStore, StockStoreError, StockTransaction};
