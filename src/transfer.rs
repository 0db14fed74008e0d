//! Linking requests to the physical transfers they spawn
use crate::error::{Result, TransferError, WorkflowError};
use crate::ports::{
    CreatedTransfer, NewMove, NewTransfer, PickingType, Repository, TransferService,
    TransferStatus, Warehouse,
};
use crate::request::TransportRequest;
use crate::types::{TransferId, WarehouseId};

/// Result of a best-effort follow-up call on a freshly created transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    Failed(TransferError),
}

impl StepOutcome {
    fn from_result(result: Result<(), TransferError>) -> Self {
        match result {
            Ok(()) => StepOutcome::Done,
            Err(err) => StepOutcome::Failed(err),
        }
    }
    pub fn is_done(&self) -> bool {
        matches!(self, StepOutcome::Done)
    }
}

/// What happened when a transfer was created for an approved request.
/// Confirm and reserve failures are recorded here and never undo the approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub transfer: TransferId,
    pub name: String,
    pub confirm: StepOutcome,
    pub reserve: StepOutcome,
}

impl TransferReport {
    pub fn is_reserved(&self) -> bool {
        self.confirm.is_done() && self.reserve.is_done()
    }
    pub fn failures(&self) -> impl Iterator<Item = &TransferError> {
        [&self.confirm, &self.reserve]
            .into_iter()
            .filter_map(|step| match step {
                StepOutcome::Failed(err) => Some(err),
                StepOutcome::Done => None,
            })
    }
}

/// What became of the transfer of a freshly approved request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Created(TransferReport),
    /// The approving rule leaves transfer creation to operators
    Deferred,
    /// The transfer service refused the order; the request stays approved
    Failed(TransferError),
}

impl TransferOutcome {
    pub fn report(&self) -> Option<&TransferReport> {
        match self {
            TransferOutcome::Created(report) => Some(report),
            TransferOutcome::Deferred | TransferOutcome::Failed(_) => None,
        }
    }
    pub fn into_report(self) -> Option<TransferReport> {
        match self {
            TransferOutcome::Created(report) => Some(report),
            TransferOutcome::Deferred | TransferOutcome::Failed(_) => None,
        }
    }
}

/// The internal picking type of `warehouse`, or when allowed any internal type.
pub fn resolve_picking_type(
    repo: &dyn Repository,
    warehouse: WarehouseId,
    fallback_to_any: bool,
) -> Result<PickingType> {
    if let Some(picking_type) = repo.internal_picking_type(Some(warehouse))? {
        return Ok(picking_type);
    }
    if fallback_to_any {
        if let Some(picking_type) = repo.internal_picking_type(None)? {
            return Ok(picking_type);
        }
    }
    Err(WorkflowError::Configuration(format!(
        "no internal picking type is configured for warehouse {warehouse}"
    )))
}

/// One transfer from the providing stock location to the requesting one,
/// with a move per request line.
pub fn build_order(
    request: &TransportRequest,
    picking_type: &PickingType,
    providing: &Warehouse,
    requesting: &Warehouse,
) -> NewTransfer {
    let source = providing.stock_location;
    let destination = requesting.stock_location;

    NewTransfer {
        picking_type: picking_type.id,
        source,
        destination,
        origin: request.name.clone(),
        company: request.company,
        request: request.id,
        moves: request
            .lines
            .iter()
            .map(|line| NewMove {
                line: line.id,
                product: line.product,
                qty: line.qty,
                uom: line.uom,
                source,
                destination,
            })
            .collect(),
    }
}

/// Records the transfer on the request and each move on its line. Safe to re-apply.
pub fn link(request: &mut TransportRequest, created: &CreatedTransfer) {
    if !request.transfers.contains(&created.id) {
        request.transfers.push(created.id);
    }
    for (line_id, move_id) in &created.moves {
        if let Some(line) = request.line_mut(*line_id) {
            line.linked_move = Some(*move_id);
        }
    }
}

pub fn confirm_and_reserve(
    transfers: &dyn TransferService,
    created: &CreatedTransfer,
) -> TransferReport {
    let confirm = StepOutcome::from_result(transfers.confirm_transfer(created.id));
    let reserve = StepOutcome::from_result(transfers.reserve_transfer(created.id));

    TransferReport {
        transfer: created.id,
        name: created.name.clone(),
        confirm,
        reserve,
    }
}

/// True when there is at least one transfer and every one of them is done.
pub fn all_transfers_done(statuses: impl IntoIterator<Item = TransferStatus>) -> bool {
    let mut any = false;
    for status in statuses {
        if status != TransferStatus::Done {
            return false;
        }
        any = true;
    }
    any
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{NewRequest, RequestLine};
    use crate::types::{
        CompanyId, LineId, LocationId, MoveId, PickingTypeId, ProductId, RequestId, UomId, UserId,
    };

    #[test]
    fn completion_needs_every_transfer_done() {
        use TransferStatus::*;
        assert!(!all_transfers_done(Vec::<TransferStatus>::new()));
        assert!(!all_transfers_done([Done, Assigned]));
        assert!(!all_transfers_done([Cancelled]));
        assert!(all_transfers_done([Done, Done]));
    }

    #[test]
    fn order_moves_stock_between_warehouse_locations() {
        let mut request = NewRequest::new()
            .add_line(RequestLine::new(ProductId(1), 3.0, UomId(1)))
            .add_line(RequestLine::new(ProductId(2), 1.0, UomId(2)))
            .into_draft(CompanyId(1), UserId::new());
        request.id = RequestId(10);
        request.name = "STR/00010".into();
        request.lines[0].id = LineId(11);
        request.lines[1].id = LineId(12);

        let providing = Warehouse::new("Main", "WH", CompanyId(1), LocationId(100));
        let requesting = Warehouse::new("Shop", "SH", CompanyId(1), LocationId(200));
        let picking_type = PickingType {
            id: PickingTypeId(4),
            ..PickingType::internal("Internal", None)
        };

        let order = build_order(&request, &picking_type, &providing, &requesting);
        assert_eq!(order.source, LocationId(100));
        assert_eq!(order.destination, LocationId(200));
        assert_eq!(order.origin, "STR/00010");
        assert_eq!(order.moves.len(), 2);
        assert!(order.moves.iter().all(|m| m.source == LocationId(100)));

        let created = CreatedTransfer {
            id: TransferId(1),
            name: "INT/00001".into(),
            moves: vec![(LineId(11), MoveId(5)), (LineId(12), MoveId(6))],
        };
        link(&mut request, &created);
        link(&mut request, &created);
        assert_eq!(request.transfers, vec![TransferId(1)]);
        assert_eq!(request.lines[1].linked_move, Some(MoveId(6)));
    }
}
