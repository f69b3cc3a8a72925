//! Authorization seam.
//!
//! Role and permission evaluation lives outside this workspace. Callers hand in
//! an [`AccessCheck`] implementation; the service layer asks it once per
//! operation, before any stock is read or written.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::OperatorId;

/// Operation classes guarded by the access seam.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ReceiveGoods,
    AdjustInventory,
    ConsumeMaterials,
    ViewInventory,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ReceiveGoods => "inventory.receive",
            Capability::AdjustInventory => "inventory.adjust",
            Capability::ConsumeMaterials => "inventory.consume",
            Capability::ViewInventory => "inventory.read",
        }
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("operator {caller} is missing capability '{capability}'")]
pub struct AccessDenied {
    pub caller: OperatorId,
    pub capability: Capability,
}

/// External authorization check.
pub trait AccessCheck: Send + Sync {
    fn ensure_authorized(
        &self,
        caller: OperatorId,
        capability: Capability,
    ) -> Result<(), AccessDenied>;
}

impl<S> AccessCheck for Arc<S>
where
    S: AccessCheck + ?Sized,
{
    fn ensure_authorized(
        &self,
        caller: OperatorId,
        capability: Capability,
    ) -> Result<(), AccessDenied> {
        (**self).ensure_authorized(caller, capability)
    }
}

/// Grants everything. For trusted in-process callers and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessCheck for AllowAll {
    fn ensure_authorized(&self, _caller: OperatorId, _capability: Capability) -> Result<(), AccessDenied> {
        Ok(())
    }
}

/// Fixed capability table, e.g. loaded once from an external policy source.
#[derive(Debug, Default, Clone)]
pub struct StaticGrants {
    grants: HashMap<OperatorId, HashSet<Capability>>,
}

impl StaticGrants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, operator: OperatorId, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.grants.entry(operator).or_default().extend(capabilities);
        self
    }
}

impl AccessCheck for StaticGrants {
    fn ensure_authorized(
        &self,
        caller: OperatorId,
        capability: Capability,
    ) -> Result<(), AccessDenied> {
        let granted = self
            .grants
            .get(&caller)
            .is_some_and(|caps| caps.contains(&capability));

        if granted {
            Ok(())
        } else {
            Err(AccessDenied { caller, capability })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_grants_allow_only_granted_capabilities() {
        let clerk = OperatorId::new();
        let grants = StaticGrants::new().grant(clerk, [Capability::ReceiveGoods]);

        assert!(grants.ensure_authorized(clerk, Capability::ReceiveGoods).is_ok());
        let err = grants
            .ensure_authorized(clerk, Capability::AdjustInventory)
            .unwrap_err();
        assert_eq!(err.capability, Capability::AdjustInventory);
    }

    #[test]
    fn unknown_operator_is_denied() {
        let grants = StaticGrants::new();
        assert!(grants
            .ensure_authorized(OperatorId::new(), Capability::ViewInventory)
            .is_err());
    }
}
