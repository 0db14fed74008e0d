//! Approval rules: which requests need a human approver and who that may be
use crate::error::{Result, WorkflowError};
use crate::types::{CompanyId, GroupId, ProductId, RuleId, WarehouseId};
use std::collections::HashSet;

/// A configured predicate over (providing warehouse, total quantity, company)
/// together with the approval policy applied to requests that match it.
///
/// Rules are ordered by `(sequence, id)`; the first matching rule wins.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovalRule {
    #[n(0)]
    pub id: RuleId,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub active: bool,
    #[n(3)]
    pub sequence: i32,
    #[n(4)]
    pub company: Option<CompanyId>, // None applies to every company
    #[n(5)]
    pub providing_warehouse: WarehouseId,
    #[n(6)]
    pub valid_qty: f64, // 0 means no ceiling
    #[n(7)]
    pub approve_required: bool,
    #[n(8)]
    pub auto_create_transfer: bool,
    #[n(9)]
    pub approver_group: Option<GroupId>,
    #[n(10)]
    pub lines: Vec<ApprovalRuleLine>,
}

/// Per-product quantity ceiling carried by a rule.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovalRuleLine {
    #[n(0)]
    pub product: ProductId,
    #[n(1)]
    pub valid_request_qty: f64, // 0 means no ceiling
}

impl ApprovalRule {
    /// Construct an active rule with the default policy: approval required,
    /// transfer created on approval, no ceiling and no approver group.
    pub fn new(name: impl Into<String>, providing_warehouse: WarehouseId) -> Self {
        Self {
            id: RuleId(0),
            name: name.into(),
            active: true,
            sequence: 10,
            company: None,
            providing_warehouse,
            valid_qty: 0.0,
            approve_required: true,
            auto_create_transfer: true,
            approver_group: None,
            lines: vec![],
        }
    }
    pub fn set_sequence(mut self, sequence: i32) -> Self {
        self.sequence = sequence;
        self
    }
    pub fn set_company(mut self, company: CompanyId) -> Self {
        self.company = Some(company);
        self
    }
    pub fn set_valid_qty(mut self, qty: f64) -> Self {
        self.valid_qty = qty;
        self
    }
    pub fn set_approve_required(mut self, required: bool) -> Self {
        self.approve_required = required;
        self
    }
    pub fn set_auto_create_transfer(mut self, auto: bool) -> Self {
        self.auto_create_transfer = auto;
        self
    }
    pub fn set_approver_group(mut self, group: GroupId) -> Self {
        self.approver_group = Some(group);
        self
    }
    pub fn set_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
    pub fn add_product_ceiling(mut self, product: ProductId, valid_request_qty: f64) -> Self {
        self.lines.push(ApprovalRuleLine {
            product,
            valid_request_qty,
        });
        self
    }

    pub fn matches(&self, warehouse: WarehouseId, total_qty: f64, company: CompanyId) -> bool {
        if !self.active {
            return false;
        }
        if self.company.is_some_and(|c| c != company) {
            return false;
        }
        if self.providing_warehouse != warehouse {
            return false;
        }
        if self.valid_qty > 0.0 && total_qty > self.valid_qty {
            return false;
        }
        true
    }

    /// Ceiling configured for `product`, if any. A zero ceiling is unlimited.
    pub fn product_ceiling(&self, product: ProductId) -> Option<f64> {
        self.lines
            .iter()
            .find(|line| line.product == product)
            .map(|line| line.valid_request_qty)
            .filter(|qty| *qty > 0.0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::Validation("rule name is empty".into()));
        }
        if self.valid_qty < 0.0 || self.valid_qty.is_nan() {
            return Err(WorkflowError::Validation(format!(
                "rule `{}` has a negative quantity ceiling",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for line in &self.lines {
            if line.valid_request_qty < 0.0 || line.valid_request_qty.is_nan() {
                return Err(WorkflowError::Validation(format!(
                    "rule `{}` has a negative ceiling for product {}",
                    self.name, line.product
                )));
            }
            if !seen.insert(line.product) {
                return Err(WorkflowError::Validation(format!(
                    "product {} appears twice in rule `{}`",
                    line.product, self.name
                )));
            }
        }
        Ok(())
    }

    /// Key of the (company, providing warehouse) scope. At most one active
    /// rule may hold a scope.
    pub fn scope_key(&self) -> [u8; 17] {
        let mut key = [0u8; 17];
        if let Some(company) = self.company {
            key[0] = 1;
            key[1..9].copy_from_slice(&company.0.to_be_bytes());
        }
        key[9..].copy_from_slice(&self.providing_warehouse.0.to_be_bytes());
        key
    }
}

/// Picks the first rule, in `(sequence, id)` order, that matches the request totals.
pub fn select_rule(
    rules: &[ApprovalRule],
    warehouse: WarehouseId,
    total_qty: f64,
    company: CompanyId,
) -> Option<&ApprovalRule> {
    let mut ordered: Vec<&ApprovalRule> = rules.iter().collect();
    ordered.sort_by_key(|rule| (rule.sequence, rule.id));
    ordered
        .into_iter()
        .find(|rule| rule.matches(warehouse, total_qty, company))
}
