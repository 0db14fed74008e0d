//! sled backed record storage and audit trail
use crate::config::{SequenceSettings, StoreSettings};
use crate::error::{Result, WorkflowError};
use crate::ports::{AuditSink, PickingCode, PickingType, Product, Repository, Warehouse};
use crate::request::TransportRequest;
use crate::rule::ApprovalRule;
use crate::types::{
    LineId, PickingTypeId, ProductId, RequestId, RuleId, TimeStamp, WarehouseId,
};
use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};
use std::sync::Arc;

const REQUEST_SEQUENCE: &[u8] = b"transport_request";

/// A message posted on a request's history, in posting order.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct AuditNote {
    #[n(0)]
    pub request: RequestId,
    #[n(1)]
    pub posted_at: TimeStamp<Utc>,
    #[n(2)]
    pub message: String,
}

pub struct Store {
    db: Arc<Db>,
    rules: Tree,
    rule_scopes: Tree,
    requests: Tree,
    warehouses: Tree,
    products: Tree,
    picking_types: Tree,
    audit: Tree,
    sequences: Tree,
    sequence: SequenceSettings,
}

impl Store {
    pub fn new(db: Arc<Db>) -> Result<Self> {
        Ok(Self {
            rules: db.open_tree("rules")?,
            rule_scopes: db.open_tree("rule_scopes")?,
            requests: db.open_tree("requests")?,
            warehouses: db.open_tree("warehouses")?,
            products: db.open_tree("products")?,
            picking_types: db.open_tree("picking_types")?,
            audit: db.open_tree("audit")?,
            sequences: db.open_tree("sequences")?,
            sequence: SequenceSettings::default(),
            db,
        })
    }

    /// Opens (or creates) the database described by `settings`.
    pub fn open(settings: &StoreSettings, sequence: &SequenceSettings) -> Result<Self> {
        let db = sled::Config::new()
            .path(&settings.path)
            .temporary(settings.temporary)
            .open()?;
        tracing::info!(path = %settings.path.display(), "opened transport request store");

        Ok(Self::new(Arc::new(db))?.with_sequence(sequence.clone()))
    }

    pub fn with_sequence(mut self, sequence: SequenceSettings) -> Self {
        self.sequence = sequence;
        self
    }

    /// Notes posted on `request`, oldest first.
    pub fn history(&self, request: RequestId) -> Result<Vec<AuditNote>> {
        self.audit
            .scan_prefix(request.0.to_be_bytes())
            .values()
            .map(|raw| -> Result<AuditNote> { Ok(minicbor::decode(&raw?)?) })
            .collect()
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // sled may hand out 0 first, which is reserved for "not stored yet"
    fn next_id(&self) -> Result<u64> {
        Ok(self.db.generate_id()? + 1)
    }

    fn next_reference(&self) -> Result<String> {
        let raw = self
            .sequences
            .update_and_fetch(REQUEST_SEQUENCE, |old| {
                let current = old
                    .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
                    .map(u64::from_be_bytes)
                    .unwrap_or(0);
                Some((current + 1).to_be_bytes().to_vec())
            })?
            .ok_or_else(|| WorkflowError::Configuration("request sequence vanished".into()))?;
        let number = <[u8; 8]>::try_from(raw.as_ref())
            .map(u64::from_be_bytes)
            .map_err(|_| WorkflowError::Configuration("request sequence is corrupt".into()))?;

        Ok(format!(
            "{}{:0width$}",
            self.sequence.prefix,
            number,
            width = self.sequence.padding
        ))
    }

    fn put<T: minicbor::Encode<()>>(tree: &Tree, id: u64, value: &T) -> Result<()> {
        tree.insert(id.to_be_bytes(), minicbor::to_vec(value)?)?;
        Ok(())
    }

    fn get<T>(tree: &Tree, kind: &'static str, id: u64) -> Result<T>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        let raw = tree
            .get(id.to_be_bytes())?
            .ok_or(WorkflowError::NotFound { kind, id })?;
        Ok(minicbor::decode(&raw)?)
    }

    fn scan<T>(tree: &Tree) -> Result<Vec<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        tree.iter()
            .values()
            .map(|raw| -> Result<T> { Ok(minicbor::decode(&raw?)?) })
            .collect()
    }

    // Writes `rule` and moves its scope claim in one transaction, so two
    // writers can never both hold the same (company, warehouse) scope.
    fn write_rule(&self, rule: &ApprovalRule, previous: Option<&ApprovalRule>) -> Result<()> {
        let id = rule.id.0.to_be_bytes();
        let bytes = minicbor::to_vec(rule)?;
        let claim = rule.active.then(|| rule.scope_key());
        let release = previous
            .filter(|prev| prev.active)
            .map(ApprovalRule::scope_key)
            .filter(|key| claim.as_ref() != Some(key));

        (&self.rules, &self.rule_scopes)
            .transaction(|(rules, scopes)| {
                if let Some(key) = &claim {
                    if let Some(holder) = scopes.get(key)? {
                        if holder.as_ref() != id.as_slice() {
                            let holder = <[u8; 8]>::try_from(holder.as_ref())
                                .map(u64::from_be_bytes)
                                .unwrap_or_default();
                            return Err(ConflictableTransactionError::Abort(holder));
                        }
                    }
                    scopes.insert(key.as_slice(), id.as_slice())?;
                }
                if let Some(key) = &release {
                    scopes.remove(key.as_slice())?;
                }
                rules.insert(id.as_slice(), bytes.as_slice())?;
                Ok(())
            })
            .map_err(|err| match err {
                TransactionError::Abort(holder) => WorkflowError::Validation(format!(
                    "approval rule {holder} already covers the company and providing warehouse of `{}`",
                    rule.name
                )),
                TransactionError::Storage(err) => WorkflowError::Storage(err),
            })
    }
}

impl Repository for Store {
    fn insert_rule(&self, mut rule: ApprovalRule) -> Result<ApprovalRule> {
        rule.validate()?;
        rule.id = RuleId(self.next_id()?);
        self.write_rule(&rule, None)?;
        Ok(rule)
    }

    fn update_rule(&self, rule: &ApprovalRule) -> Result<()> {
        rule.validate()?;
        let previous: ApprovalRule = Self::get(&self.rules, "approval rule", rule.id.0)?;
        self.write_rule(rule, Some(&previous))
    }

    fn rule(&self, id: RuleId) -> Result<ApprovalRule> {
        Self::get(&self.rules, "approval rule", id.0)
    }

    fn active_rules(&self, warehouse: Option<WarehouseId>) -> Result<Vec<ApprovalRule>> {
        let mut rules: Vec<ApprovalRule> = Self::scan::<ApprovalRule>(&self.rules)?
            .into_iter()
            .filter(|rule| rule.active)
            .filter(|rule| warehouse.is_none_or(|w| rule.providing_warehouse == w))
            .collect();
        rules.sort_by_key(|rule| (rule.sequence, rule.id));
        Ok(rules)
    }

    fn insert_warehouse(&self, mut warehouse: Warehouse) -> Result<Warehouse> {
        if warehouse.valid_request_qty < 0.0 {
            return Err(WorkflowError::Validation(format!(
                "warehouse `{}` has a negative request ceiling",
                warehouse.code
            )));
        }
        warehouse.id = WarehouseId(self.next_id()?);
        Self::put(&self.warehouses, warehouse.id.0, &warehouse)?;
        Ok(warehouse)
    }

    fn warehouse(&self, id: WarehouseId) -> Result<Warehouse> {
        Self::get(&self.warehouses, "warehouse", id.0)
    }

    fn insert_product(&self, mut product: Product) -> Result<Product> {
        product.id = ProductId(self.next_id()?);
        Self::put(&self.products, product.id.0, &product)?;
        Ok(product)
    }

    fn product(&self, id: ProductId) -> Result<Product> {
        Self::get(&self.products, "product", id.0)
    }

    fn insert_picking_type(&self, mut picking_type: PickingType) -> Result<PickingType> {
        picking_type.id = PickingTypeId(self.next_id()?);
        Self::put(&self.picking_types, picking_type.id.0, &picking_type)?;
        Ok(picking_type)
    }

    fn internal_picking_type(
        &self,
        warehouse: Option<WarehouseId>,
    ) -> Result<Option<PickingType>> {
        Ok(Self::scan::<PickingType>(&self.picking_types)?
            .into_iter()
            .filter(|pt| pt.code == PickingCode::Internal)
            .find(|pt| warehouse.is_none() || pt.warehouse == warehouse))
    }

    fn create_request(&self, mut request: TransportRequest) -> Result<TransportRequest> {
        request.id = RequestId(self.next_id()?);
        request.revision = 0;
        if request.name.is_empty() {
            request.name = self.next_reference()?;
        }
        for line in request.lines.iter_mut() {
            line.id = LineId(self.next_id()?);
        }

        let bytes = minicbor::to_vec(&request)?;
        self.requests
            .compare_and_swap(request.id.0.to_be_bytes(), None::<&[u8]>, Some(bytes))?
            .map_err(|_| WorkflowError::Conflict { id: request.id.0 })?;
        Ok(request)
    }

    fn request(&self, id: RequestId) -> Result<TransportRequest> {
        Self::get(&self.requests, "transport request", id.0)
    }

    fn save_request(&self, request: &TransportRequest) -> Result<TransportRequest> {
        let key = request.id.0.to_be_bytes();
        let current = self
            .requests
            .get(key)?
            .ok_or_else(|| WorkflowError::not_found("transport request", request.id))?;
        let stored: TransportRequest = minicbor::decode(&current)?;
        if stored.revision != request.revision {
            return Err(WorkflowError::Conflict { id: request.id.0 });
        }

        let mut next = request.clone();
        next.revision += 1;
        let bytes = minicbor::to_vec(&next)?;
        self.requests
            .compare_and_swap(key, Some(current), Some(bytes))?
            .map_err(|_| WorkflowError::Conflict { id: request.id.0 })?;
        Ok(next)
    }

    fn next_line_id(&self) -> Result<LineId> {
        Ok(LineId(self.next_id()?))
    }
}

impl AuditSink for Store {
    fn post(&self, request: RequestId, message: &str) {
        tracing::info!(request = request.0, "{}", message);

        let note = AuditNote {
            request,
            posted_at: TimeStamp::new(),
            message: message.to_owned(),
        };
        let stored = self.next_id().and_then(|seq| {
            let mut key = request.0.to_be_bytes().to_vec();
            key.extend_from_slice(&seq.to_be_bytes());
            self.audit.insert(key, minicbor::to_vec(&note)?)?;
            Ok(())
        });
        if let Err(err) = stored {
            tracing::warn!(request = request.0, error = %err, "failed to store audit note");
        }
    }
}
