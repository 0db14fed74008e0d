//! Service layer API for the transport request workflow
use crate::config::WorkflowSettings;
use crate::error::{Result, WorkflowError};
use crate::ports::{
    AuditSink, CreatedTransfer, GroupMembership, Product, Repository, StockLookup, TransferService,
    TransferStatus, UomConverter,
};
use crate::request::{LineChange, NewRequest, RequestLine, RequestState, TransportRequest};
use crate::rule::{ApprovalRule, select_rule};
use crate::store::Store;
use crate::totals::Totals;
use crate::transfer::{self, TransferOutcome};
use crate::types::{CompanyId, LineId, ProductId, RequestId, RuleId, TransferId, UomId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

// re-read and re-link attempts when a concurrent write lands between approval and linking
const LINK_RETRIES: usize = 3;

/// Who performs an operation, and on behalf of which company.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user: UserId,
    pub company: CompanyId,
}

impl Actor {
    pub fn new(user: UserId, company: CompanyId) -> Self {
        Self { user, company }
    }
}

/// External services the engine orchestrates.
#[derive(Clone)]
pub struct Collaborators {
    pub stock: Arc<dyn StockLookup>,
    pub uom: Arc<dyn UomConverter>,
    pub transfers: Arc<dyn TransferService>,
    pub groups: Arc<dyn GroupMembership>,
}

/// A submitted request. Submission itself succeeded even when the chained
/// automatic approval did not.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub request: TransportRequest,
    pub matched_rule: Option<RuleId>,
    /// Shortages and exceeded ceilings, empty unless `need_revision` is set
    pub revision_reasons: Vec<String>,
    /// Present when the matched rule approved the request on the spot
    pub approval: Option<ApprovalOutcome>,
    /// Why the matched rule's automatic approval was refused; the request
    /// then waits in `requested` for a manual approval
    pub approval_error: Option<WorkflowError>,
}

#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub request: TransportRequest,
    pub transfer: TransferOutcome,
}

enum Approver<'a> {
    User,
    Rule(&'a ApprovalRule),
}

pub struct TransportService {
    repo: Arc<dyn Repository>,
    audit: Arc<dyn AuditSink>,
    collaborators: Collaborators,
    settings: WorkflowSettings,
}

impl TransportService {
    /// Service over a sled [`Store`], which also keeps the audit trail.
    pub fn new(store: Arc<Store>, collaborators: Collaborators) -> Self {
        let repo: Arc<dyn Repository> = store.clone();
        let audit: Arc<dyn AuditSink> = store;
        Self::with_parts(repo, audit, collaborators)
    }

    pub fn with_parts(
        repo: Arc<dyn Repository>,
        audit: Arc<dyn AuditSink>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            repo,
            audit,
            collaborators,
            settings: WorkflowSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: WorkflowSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn request(&self, id: RequestId) -> Result<TransportRequest> {
        self.repo.request(id)
    }

    // -- approval rules --------------------------------------------------

    #[instrument(skip(self, rule), fields(name = %rule.name))]
    pub fn create_rule(&self, rule: ApprovalRule) -> Result<ApprovalRule> {
        let rule = self.repo.insert_rule(rule)?;
        info!(id = rule.id.0, "approval rule created");
        Ok(rule)
    }

    #[instrument(skip(self, rule), fields(name = %rule.name))]
    pub fn update_rule(&self, rule: &ApprovalRule) -> Result<()> {
        self.repo.update_rule(rule)
    }

    /// Rules are never deleted, only deactivated.
    #[instrument(skip(self))]
    pub fn archive_rule(&self, id: RuleId) -> Result<ApprovalRule> {
        let mut rule = self.repo.rule(id)?;
        rule.active = false;
        self.repo.update_rule(&rule)?;
        Ok(rule)
    }

    // -- drafts and lines ------------------------------------------------

    #[instrument(skip(self, draft, actor), fields(user = %actor.user))]
    pub fn create_request(&self, draft: NewRequest, actor: &Actor) -> Result<TransportRequest> {
        let mut request = draft.into_draft(actor.company, actor.user);
        for line in &request.lines {
            self.check_line_unit(line.product, line.uom)?;
        }
        self.refresh_totals(&mut request)?;

        let request = self.repo.create_request(request)?;
        self.note(
            &request,
            format!("Transport request {} created by {}", request.name, actor.user),
        );
        Ok(request)
    }

    /// Adds a line to a draft. Without `uom` the product's own unit is used.
    #[instrument(skip(self))]
    pub fn add_line(
        &self,
        id: RequestId,
        product: ProductId,
        qty: f64,
        uom: Option<UomId>,
    ) -> Result<TransportRequest> {
        let mut request = self.repo.request(id)?;
        ensure_draft(&request, "lines can only be added to draft requests")?;

        let uom = match uom {
            Some(uom) => uom,
            None => self.repo.product(product)?.uom,
        };
        self.check_line_unit(product, uom)?;

        let mut line = RequestLine::new(product, qty, uom);
        line.id = self.repo.next_line_id()?;
        request.lines.push(line);

        self.refresh_totals(&mut request)?;
        self.repo.save_request(&request)
    }

    #[instrument(skip(self, change))]
    pub fn update_line(
        &self,
        id: RequestId,
        line_id: LineId,
        change: LineChange,
    ) -> Result<TransportRequest> {
        let mut request = self.repo.request(id)?;
        ensure_draft(&request, "lines can only be changed on draft requests")?;

        let line = request
            .line_mut(line_id)
            .ok_or_else(|| WorkflowError::not_found("request line", line_id))?;
        let product_changed = change.product.is_some_and(|p| p != line.product);
        if let Some(product) = change.product {
            line.product = product;
        }
        if let Some(qty) = change.qty {
            line.qty = qty;
        }
        if let Some(uom) = change.uom {
            line.uom = uom;
        }
        if let Some(date) = change.scheduled_date {
            line.scheduled_date = Some(date);
        }
        if let Some(note) = change.note {
            line.note = note;
        }
        let (product, uom) = (line.product, line.uom);

        // a new product without an explicit unit takes the product's unit
        if product_changed && change.uom.is_none() {
            let canonical = self.repo.product(product)?.uom;
            if let Some(line) = request.line_mut(line_id) {
                line.uom = canonical;
            }
        } else {
            self.check_line_unit(product, uom)?;
        }

        self.refresh_totals(&mut request)?;
        self.repo.save_request(&request)
    }

    #[instrument(skip(self))]
    pub fn remove_line(&self, id: RequestId, line_id: LineId) -> Result<TransportRequest> {
        let mut request = self.repo.request(id)?;
        ensure_draft(&request, "lines can only be removed from draft requests")?;

        let before = request.lines.len();
        request.lines.retain(|line| line.id != line_id);
        if request.lines.len() == before {
            return Err(WorkflowError::not_found("request line", line_id));
        }

        self.refresh_totals(&mut request)?;
        self.repo.save_request(&request)
    }

    /// Free quantity of the line's product in the request's providing warehouse.
    pub fn line_free_qty(&self, id: RequestId, line_id: LineId) -> Result<f64> {
        let request = self.repo.request(id)?;
        let line = request
            .line(line_id)
            .ok_or_else(|| WorkflowError::not_found("request line", line_id))?;
        let warehouse = request.providing_warehouse.ok_or_else(|| {
            WorkflowError::Precondition(format!("{} has no providing warehouse", request.name))
        })?;
        self.collaborators.stock.free_qty(line.product, warehouse)
    }

    // -- lifecycle -------------------------------------------------------

    /// Moves a draft to `requested`, flagging it for revision when stock or
    /// quantity limits are exceeded, and approves it straight away when the
    /// matching rule does not require an approver.
    #[instrument(skip(self, actor), fields(user = %actor.user))]
    pub fn submit(&self, id: RequestId, actor: &Actor) -> Result<SubmitOutcome> {
        let mut request = self.repo.request(id)?;
        if request.state != RequestState::Draft {
            return Err(WorkflowError::Precondition(format!(
                "{} is {}, only draft requests can be submitted",
                request.name, request.state
            )));
        }
        if request.lines.is_empty() {
            return Err(WorkflowError::Precondition(
                "add at least one line before submitting".into(),
            ));
        }
        let (Some(providing), Some(_)) = (request.providing_warehouse, request.requesting_warehouse)
        else {
            return Err(WorkflowError::Precondition(
                "both the requesting and the providing warehouse must be set".into(),
            ));
        };

        request.need_revision = false;
        let products = self.products_of(&request)?;
        let canonical = self.canonical_quantities(&request, &products)?;
        let mut reasons = vec![];

        for (line, qty) in request.lines.iter().zip(&canonical) {
            let product = lookup(&products, line.product)?;
            let free = self.collaborators.stock.free_qty(product.id, providing)?;
            if *qty > free {
                reasons.push(format!(
                    "Insufficient stock for {}: requested {}, available {}",
                    product.name, qty, free
                ));
            }
        }

        let totals = Totals::compute(&request.lines, &products, self.collaborators.uom.as_ref())?;
        request.total_qty = totals.qty;
        request.total_value = totals.value;

        let rules = self.repo.active_rules(Some(providing))?;
        let matched = select_rule(&rules, providing, request.total_qty, request.company);
        match matched {
            Some(rule) => {
                for (line, qty) in request.lines.iter().zip(&canonical) {
                    let Some(ceiling) = rule.product_ceiling(line.product) else {
                        continue;
                    };
                    if *qty > ceiling {
                        let product = lookup(&products, line.product)?;
                        reasons.push(format!(
                            "{} exceeds the {} allowed per request by rule {}",
                            product.name, ceiling, rule.name
                        ));
                    }
                }
            }
            None => {
                let warehouse = self.repo.warehouse(providing)?;
                if warehouse.valid_request_qty > 0.0
                    && request.total_qty > warehouse.valid_request_qty
                {
                    reasons.push(format!(
                        "Total quantity {} exceeds the {} allowed per request from {}",
                        request.total_qty, warehouse.valid_request_qty, warehouse.name
                    ));
                }
            }
        }

        request.need_revision = !reasons.is_empty();
        request.state = RequestState::Requested;
        let request = self.repo.save_request(&request)?;

        let summary = if request.need_revision {
            format!("Request needs revision:\n- {}", reasons.join("\n- "))
        } else {
            match matched {
                Some(rule) if rule.approve_required => {
                    format!("Request requires approval (rule: {})", rule.name)
                }
                Some(rule) => format!("Request submitted under rule {}", rule.name),
                None => "No approval rule matched. Request is waiting for approval.".to_string(),
            }
        };
        self.note(&request, summary);

        let auto_rule = matched.filter(|rule| !request.need_revision && !rule.approve_required);
        let (mut approval, mut approval_error) = (None, None);
        if let Some(rule) = auto_rule {
            let chained = self
                .authorize(Some(rule), actor)
                .and_then(|()| self.approve_as(request.clone(), actor, Approver::Rule(rule)));
            match chained {
                Ok(outcome) => approval = Some(outcome),
                Err(err) => {
                    warn!(request = id.0, rule = %rule.name, error = %err, "automatic approval refused");
                    self.note(
                        &request,
                        format!(
                            "Automatic approval by rule {} did not go through: {err}. Request is waiting for approval.",
                            rule.name
                        ),
                    );
                    approval_error = Some(err);
                }
            }
        }

        let request = match (&approval, &approval_error) {
            (Some(outcome), _) => outcome.request.clone(),
            (None, Some(_)) => self.repo.request(id).unwrap_or(request),
            (None, None) => request,
        };
        Ok(SubmitOutcome {
            request,
            matched_rule: matched.map(|rule| rule.id),
            revision_reasons: reasons,
            approval,
            approval_error,
        })
    }

    /// Approves a requested transport and creates its transfer.
    #[instrument(skip(self, actor), fields(user = %actor.user))]
    pub fn approve(&self, id: RequestId, actor: &Actor) -> Result<ApprovalOutcome> {
        let request = self.repo.request(id)?;
        if request.state != RequestState::Requested {
            return Err(WorkflowError::Precondition(format!(
                "{} is {}, only requested transports can be approved",
                request.name, request.state
            )));
        }
        if request.need_revision {
            return Err(WorkflowError::Precondition(format!(
                "{} exceeds stock or quantity limits, revise it before approving",
                request.name
            )));
        }

        let providing = providing_warehouse(&request)?;
        let rules = self.repo.active_rules(Some(providing))?;
        let matched = select_rule(&rules, providing, request.total_qty, request.company);
        self.authorize(matched, actor)?;

        self.approve_as(request, actor, Approver::User)
    }

    /// Creates the transfer of an approved request that has none yet, e.g.
    /// after an automatic approval that doesn't create transfers or a failed creation.
    #[instrument(skip(self, actor), fields(user = %actor.user))]
    pub fn create_transfer(&self, id: RequestId, actor: &Actor) -> Result<ApprovalOutcome> {
        let request = self.repo.request(id)?;
        if request.state != RequestState::Approved {
            return Err(WorkflowError::Precondition(format!(
                "{} is {}, transfers are only created for approved requests",
                request.name, request.state
            )));
        }
        if !request.transfers.is_empty() {
            return Err(WorkflowError::Precondition(format!(
                "{} already has a transfer",
                request.name
            )));
        }

        match self.spawn_transfer(request)? {
            (_, TransferOutcome::Failed(err)) => Err(err.into()),
            (request, transfer) => Ok(ApprovalOutcome { request, transfer }),
        }
    }

    /// Sends a request back to draft. Confirmed requests stay confirmed, and
    /// a request whose transfers are still open keeps them until every one
    /// of them is cancelled.
    #[instrument(skip(self, actor), fields(user = %actor.user))]
    pub fn reset_to_draft(&self, id: RequestId, actor: &Actor) -> Result<TransportRequest> {
        let mut request = self.repo.request(id)?;
        if request.state == RequestState::Confirmed {
            return Err(WorkflowError::Precondition(format!(
                "{} is confirmed and can no longer be reset",
                request.name
            )));
        }

        for transfer in &request.transfers {
            let status = self.collaborators.transfers.status(*transfer)?;
            if status != TransferStatus::Cancelled {
                return Err(WorkflowError::Precondition(format!(
                    "{} still has open transfer {transfer}, cancel it before resetting",
                    request.name
                )));
            }
        }

        // cancelled transfers are history; a new approval starts from scratch
        request.transfers.clear();
        for line in request.lines.iter_mut() {
            line.linked_move = None;
        }
        request.state = RequestState::Draft;
        request.need_revision = false;
        let request = self.repo.save_request(&request)?;
        self.note(&request, format!("Request reset to draft by {}", actor.user));
        Ok(request)
    }

    #[instrument(skip(self, actor), fields(user = %actor.user))]
    pub fn cancel(&self, id: RequestId, actor: &Actor) -> Result<TransportRequest> {
        let mut request = self.repo.request(id)?;
        match request.state {
            RequestState::Confirmed => {
                return Err(WorkflowError::Precondition(format!(
                    "{} is confirmed and can no longer be cancelled",
                    request.name
                )));
            }
            RequestState::Cancelled => return Ok(request),
            RequestState::Draft | RequestState::Requested | RequestState::Approved => {}
        }

        request.state = RequestState::Cancelled;
        let request = self.repo.save_request(&request)?;
        self.note(&request, format!("Request cancelled by {}", actor.user));
        Ok(request)
    }

    /// Called whenever a linked transfer changes status. Confirms the request
    /// once every linked transfer is done; otherwise does nothing.
    #[instrument(skip(self))]
    pub fn on_transfer_status_changed(
        &self,
        transfer_id: TransferId,
    ) -> Result<Option<TransportRequest>> {
        let Some(id) = self.collaborators.transfers.linked_request(transfer_id)? else {
            debug!("transfer is not linked to a transport request");
            return Ok(None);
        };
        let mut request = self.repo.request(id)?;
        if request.state != RequestState::Approved {
            debug!(state = %request.state, "request is not awaiting its transfers");
            return Ok(None);
        }

        let statuses = request
            .transfers
            .iter()
            .map(|t| self.collaborators.transfers.status(*t))
            .collect::<Result<Vec<_>, _>>()?;
        if !transfer::all_transfers_done(statuses) {
            return Ok(None);
        }

        request.state = RequestState::Confirmed;
        let request = self.repo.save_request(&request)?;
        self.note(
            &request,
            "All transfers are done. Request confirmed.".to_string(),
        );
        Ok(Some(request))
    }

    // -- internals -------------------------------------------------------

    fn approve_as(
        &self,
        mut request: TransportRequest,
        actor: &Actor,
        approver: Approver<'_>,
    ) -> Result<ApprovalOutcome> {
        // configuration problems must surface before the state moves
        let providing = providing_warehouse(&request)?;
        transfer::resolve_picking_type(
            self.repo.as_ref(),
            providing,
            self.settings.fallback_to_any_internal_type,
        )?;

        request.state = RequestState::Approved;
        let request = self.repo.save_request(&request)?;

        let create_transfer = match approver {
            Approver::User => {
                self.note(&request, format!("Request approved by {}", actor.user));
                true
            }
            Approver::Rule(rule) => {
                self.note(
                    &request,
                    format!("Request auto-approved by rule {}", rule.name),
                );
                rule.auto_create_transfer
            }
        };
        if !create_transfer {
            self.note(
                &request,
                "The matching rule does not create transfers. Create the transfer manually."
                    .to_string(),
            );
            return Ok(ApprovalOutcome {
                request,
                transfer: TransferOutcome::Deferred,
            });
        }

        let (request, transfer) = self.spawn_transfer(request)?;
        Ok(ApprovalOutcome { request, transfer })
    }

    fn spawn_transfer(
        &self,
        request: TransportRequest,
    ) -> Result<(TransportRequest, TransferOutcome)> {
        let providing = self.repo.warehouse(providing_warehouse(&request)?)?;
        let requesting_id = request.requesting_warehouse.ok_or_else(|| {
            WorkflowError::Precondition(format!("{} has no requesting warehouse", request.name))
        })?;
        let requesting = self.repo.warehouse(requesting_id)?;
        let picking_type = transfer::resolve_picking_type(
            self.repo.as_ref(),
            providing.id,
            self.settings.fallback_to_any_internal_type,
        )?;

        let order = transfer::build_order(&request, &picking_type, &providing, &requesting);
        let created = match self.collaborators.transfers.create_transfer(&order) {
            Ok(created) => created,
            Err(err) => {
                warn!(request = request.id.0, error = %err, "transfer creation failed");
                self.note(
                    &request,
                    format!("Internal transfer could not be created: {err}"),
                );
                return Ok((request, TransferOutcome::Failed(err)));
            }
        };

        let request = self.link_transfer(request, &created)?;
        let report = transfer::confirm_and_reserve(self.collaborators.transfers.as_ref(), &created);
        for failure in report.failures() {
            warn!(request = request.id.0, transfer = %created.name, error = %failure, "transfer follow-up failed");
            self.note(
                &request,
                format!("Internal transfer {}: {failure}", created.name),
            );
        }
        self.note(
            &request,
            format!("Internal transfer {} created", created.name),
        );
        Ok((request, TransferOutcome::Created(report)))
    }

    fn link_transfer(
        &self,
        mut request: TransportRequest,
        created: &CreatedTransfer,
    ) -> Result<TransportRequest> {
        let mut attempt = 0;
        loop {
            transfer::link(&mut request, created);
            match self.repo.save_request(&request) {
                Err(WorkflowError::Conflict { .. }) if attempt < LINK_RETRIES => {
                    attempt += 1;
                    request = self.repo.request(request.id)?;
                }
                result => return result,
            }
        }
    }

    /// The acting user must belong to the matched rule's approver group, if it has one.
    fn authorize(&self, matched: Option<&ApprovalRule>, actor: &Actor) -> Result<()> {
        let Some(group) = matched.and_then(|rule| rule.approver_group) else {
            return Ok(());
        };
        if self.collaborators.groups.is_member(&actor.user, group) {
            return Ok(());
        }
        warn!(user = %actor.user, group = group.0, "approval refused");
        Err(WorkflowError::Authorization {
            user: actor.user,
            group,
        })
    }

    fn check_line_unit(&self, product: ProductId, uom: UomId) -> Result<()> {
        let product = self.repo.product(product)?;
        if !self.collaborators.uom.compatible(uom, product.uom) {
            return Err(WorkflowError::IncompatibleUnits {
                from: uom.0,
                to: product.uom.0,
            });
        }
        Ok(())
    }

    fn products_of(&self, request: &TransportRequest) -> Result<HashMap<ProductId, Product>> {
        let mut products = HashMap::new();
        for line in &request.lines {
            if !products.contains_key(&line.product) {
                products.insert(line.product, self.repo.product(line.product)?);
            }
        }
        Ok(products)
    }

    fn canonical_quantities(
        &self,
        request: &TransportRequest,
        products: &HashMap<ProductId, Product>,
    ) -> Result<Vec<f64>> {
        request
            .lines
            .iter()
            .map(|line| {
                let product = lookup(products, line.product)?;
                self.collaborators.uom.convert(line.qty, line.uom, product.uom)
            })
            .collect()
    }

    fn refresh_totals(&self, request: &mut TransportRequest) -> Result<()> {
        let products = self.products_of(request)?;
        let totals = Totals::compute(&request.lines, &products, self.collaborators.uom.as_ref())?;
        request.total_qty = totals.qty;
        request.total_value = totals.value;
        Ok(())
    }

    fn note(&self, request: &TransportRequest, message: String) {
        self.audit.post(request.id, &message);
    }
}

fn ensure_draft(request: &TransportRequest, reason: &str) -> Result<()> {
    if request.is_draft() {
        return Ok(());
    }
    Err(WorkflowError::Precondition(format!(
        "{} is {}: {reason}",
        request.name, request.state
    )))
}

fn providing_warehouse(request: &TransportRequest) -> Result<crate::types::WarehouseId> {
    request.providing_warehouse.ok_or_else(|| {
        WorkflowError::Precondition(format!("{} has no providing warehouse", request.name))
    })
}

fn lookup(products: &HashMap<ProductId, Product>, id: ProductId) -> Result<&Product> {
    products
        .get(&id)
        .ok_or_else(|| WorkflowError::not_found("product", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{GroupDirectory, StockLedger, TransferBook, UomTable};
    use crate::ports::{PickingType, TransferStatus, Warehouse};
    use crate::types::{GroupId, LocationId, WarehouseId};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: Arc<Store>,
        stock: Arc<StockLedger>,
        transfers: Arc<TransferBook>,
        service: TransportService,
        actor: Actor,
        main: WarehouseId,
        shop: WarehouseId,
        bolt: ProductId,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("service.db")).unwrap();
        let store = Arc::new(Store::new(Arc::new(db)).unwrap());

        let mut uom = UomTable::new();
        uom.add_unit(UomId(1), "Units", 1, 1.0);
        uom.add_unit(UomId(2), "Dozens", 1, 12.0);
        uom.add_unit(UomId(3), "kg", 2, 1.0);

        let company = CompanyId(1);
        let main = store
            .insert_warehouse(Warehouse::new("Main", "WH", company, LocationId(10)))
            .unwrap()
            .id;
        let shop = store
            .insert_warehouse(Warehouse::new("Shop", "SH", company, LocationId(20)))
            .unwrap()
            .id;
        store
            .insert_picking_type(PickingType::internal("Main internal", Some(main)))
            .unwrap();
        let bolt = store
            .insert_product(Product::new("Bolt", UomId(1), 2.5))
            .unwrap()
            .id;

        let stock = Arc::new(StockLedger::new());
        stock.set_free_qty(bolt, main, 500.0);
        let transfers = Arc::new(TransferBook::new());
        let collaborators = Collaborators {
            stock: stock.clone(),
            uom: Arc::new(uom),
            transfers: transfers.clone(),
            groups: Arc::new(GroupDirectory::new()),
        };

        Fixture {
            _dir: dir,
            service: TransportService::new(store.clone(), collaborators),
            store,
            stock,
            transfers,
            actor: Actor::new(UserId::new(), company),
            main,
            shop,
            bolt,
        }
    }

    impl Fixture {
        fn draft(&self, qty: f64) -> TransportRequest {
            let draft = NewRequest::new()
                .set_requesting_warehouse(self.shop)
                .set_providing_warehouse(self.main)
                .add_line(RequestLine::new(self.bolt, qty, UomId(1)));
            self.service.create_request(draft, &self.actor).unwrap()
        }
    }

    #[test]
    fn line_edits_keep_totals_current() {
        let fx = fixture();
        let request = fx.draft(4.0);
        assert_eq!(request.total_qty, 4.0);
        assert_eq!(request.total_value, 10.0);

        let request = fx
            .service
            .add_line(request.id, fx.bolt, 1.0, Some(UomId(2)))
            .unwrap();
        assert_eq!(request.total_qty, 16.0);

        let second = request.lines[1].id;
        let request = fx
            .service
            .update_line(request.id, second, LineChange::qty(2.0))
            .unwrap();
        assert_eq!(request.total_qty, 28.0);

        let request = fx.service.remove_line(request.id, second).unwrap();
        assert_eq!(request.total_qty, 4.0);
        assert_eq!(request.total_value, 10.0);
    }

    #[test]
    fn line_in_another_unit_category_is_rejected() {
        let fx = fixture();
        let request = fx.draft(1.0);

        let err = fx
            .service
            .add_line(request.id, fx.bolt, 1.0, Some(UomId(3)))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::IncompatibleUnits { .. }));
        assert_eq!(fx.service.request(request.id).unwrap().lines.len(), 1);
    }

    #[test]
    fn free_qty_reads_the_providing_warehouse() {
        let fx = fixture();
        let request = fx.draft(1.0);
        let line = request.lines[0].id;

        assert_eq!(fx.service.line_free_qty(request.id, line).unwrap(), 500.0);
        fx.stock.set_free_qty(fx.bolt, fx.main, 7.0);
        assert_eq!(fx.service.line_free_qty(request.id, line).unwrap(), 7.0);
    }

    #[test]
    fn lines_are_frozen_after_submit() {
        let fx = fixture();
        let request = fx.draft(1.0);
        fx.service.submit(request.id, &fx.actor).unwrap();

        let err = fx
            .service
            .add_line(request.id, fx.bolt, 1.0, None)
            .unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn rule_without_approver_confirms_once_transfer_is_done() {
        let fx = fixture();
        fx.service
            .create_rule(ApprovalRule::new("Small orders", fx.main).set_approve_required(false))
            .unwrap();
        let request = fx.draft(3.0);

        let outcome = fx.service.submit(request.id, &fx.actor).unwrap();
        assert_eq!(outcome.request.state, RequestState::Approved);
        let report = outcome.approval.unwrap().transfer.into_report().unwrap();
        assert!(report.is_reserved());

        fx.transfers
            .set_status(report.transfer, TransferStatus::Done)
            .unwrap();
        let confirmed = fx
            .service
            .on_transfer_status_changed(report.transfer)
            .unwrap()
            .unwrap();
        assert_eq!(confirmed.state, RequestState::Confirmed);
        assert!(
            fx.service
                .on_transfer_status_changed(report.transfer)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn approver_group_is_enforced() {
        let fx = fixture();
        fx.service
            .create_rule(ApprovalRule::new("Managers", fx.main).set_approver_group(GroupId(9)))
            .unwrap();
        let request = fx.draft(3.0);
        fx.service.submit(request.id, &fx.actor).unwrap();

        let err = fx.service.approve(request.id, &fx.actor).unwrap_err();
        assert!(matches!(err, WorkflowError::Authorization { group, .. } if group == GroupId(9)));
        assert_eq!(
            fx.store.request(request.id).unwrap().state,
            RequestState::Requested
        );
    }

    #[test]
    fn automatic_approval_respects_the_approver_group() {
        let fx = fixture();
        fx.service
            .create_rule(
                ApprovalRule::new("Self service", fx.main)
                    .set_approve_required(false)
                    .set_approver_group(GroupId(3)),
            )
            .unwrap();
        let request = fx.draft(2.0);

        let outcome = fx.service.submit(request.id, &fx.actor).unwrap();
        assert!(outcome.approval.is_none());
        assert!(matches!(
            outcome.approval_error,
            Some(WorkflowError::Authorization { group, .. }) if group == GroupId(3)
        ));
        assert_eq!(outcome.request.state, RequestState::Requested);
        assert_eq!(
            fx.store.request(request.id).unwrap().state,
            RequestState::Requested
        );
        assert!(fx.transfers.is_empty());
    }
}
