//! Stock reports computed from current catalog quantities.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mixledger_core::Quantity;
use mixledger_inventory::{ItemKind, ItemRef};

use crate::stock_store::{StockStore, StockStoreError};

/// Item at or below its safety stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockLine {
    pub item: ItemRef,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub current_stock: Quantity,
    pub safety_stock_level: Quantity,
    /// `safety - current`, never negative.
    pub shortfall: Quantity,
}

/// Items with `current_stock <= safety_stock_level`, ordered by code.
pub fn low_stock<S>(store: &S, kind: Option<ItemKind>) -> Result<Vec<LowStockLine>, StockStoreError>
where
    S: StockStore + ?Sized,
{
    Ok(store
        .list_items(kind)?
        .into_iter()
        .filter(|i| i.is_below_safety_level())
        .map(|i| LowStockLine {
            item: i.item_ref(),
            shortfall: (i.safety_stock_level - i.current_stock).clamp_non_negative(),
            code: i.code,
            name: i.name,
            unit: i.unit,
            current_stock: i.current_stock,
            safety_stock_level: i.safety_stock_level,
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindValuation {
    pub kind: ItemKind,
    pub item_count: usize,
    /// Items without a unit cost; they count as zero value.
    pub unvalued_items: usize,
    pub total_value: Decimal,
}

/// Stock valuation at unit cost (`sum(stock * cost_per_unit)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryValuation {
    pub by_kind: Vec<KindValuation>,
    pub total_value: Decimal,
}

pub fn inventory_valuation<S>(store: &S) -> Result<InventoryValuation, StockStoreError>
where
    S: StockStore + ?Sized,
{
    let mut by_kind: Vec<KindValuation> = [ItemKind::Material, ItemKind::Fragrance]
        .into_iter()
        .map(|kind| KindValuation {
            kind,
            item_count: 0,
            unvalued_items: 0,
            total_value: Decimal::ZERO,
        })
        .collect();

    for item in store.list_items(None)? {
        if let Some(slot) = by_kind.iter_mut().find(|v| v.kind == item.kind) {
            slot.item_count += 1;
            if item.cost_per_unit.is_zero() {
                slot.unvalued_items += 1;
            }
            slot.total_value += item.stock_value();
        }
    }

    let total_value = by_kind.iter().map(|v| v.total_value).sum();
    Ok(InventoryValuation {
        by_kind,
        total_value,
    })
}
