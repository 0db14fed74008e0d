//! Transport requests and their lines
use crate::types::{
    CompanyId, LineId, MoveId, ProductId, RequestId, TimeStamp, TransferId, UomId, UserId,
    WarehouseId,
};
use chrono::Utc;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum RequestState {
    #[n(0)]
    Draft,
    #[n(1)]
    Requested,
    #[n(2)]
    Approved,
    #[n(3)]
    Confirmed,
    #[n(4)]
    Cancelled,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Draft => "draft",
            RequestState::Requested => "requested",
            RequestState::Approved => "approved",
            RequestState::Confirmed => "confirmed",
            RequestState::Cancelled => "cancelled",
        }
    }
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Confirmed | RequestState::Cancelled)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct RequestLine {
    #[n(0)]
    pub id: LineId,
    #[n(1)]
    pub product: ProductId,
    #[n(2)]
    pub qty: f64,
    #[n(3)]
    pub uom: UomId,
    #[n(4)]
    pub scheduled_date: Option<TimeStamp<Utc>>,
    #[n(5)]
    pub note: String,
    #[n(6)]
    pub linked_move: Option<MoveId>, // set once a transfer exists
}

impl RequestLine {
    pub fn new(product: ProductId, qty: f64, uom: UomId) -> Self {
        Self {
            id: LineId(0),
            product,
            qty,
            uom,
            scheduled_date: None,
            note: String::new(),
            linked_move: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct TransportRequest {
    #[n(0)]
    pub id: RequestId,
    #[n(1)]
    pub revision: u64,
    #[n(2)]
    pub name: String, // human readable reference, e.g. STR/00042
    #[n(3)]
    pub origin: Option<String>,
    #[n(4)]
    pub requesting_warehouse: Option<WarehouseId>,
    #[n(5)]
    pub providing_warehouse: Option<WarehouseId>,
    #[n(6)]
    pub company: CompanyId,
    #[n(7)]
    pub requested_by: UserId,
    #[n(8)]
    pub requested_at: TimeStamp<Utc>,
    #[n(9)]
    pub lines: Vec<RequestLine>,
    #[n(10)]
    pub transfers: Vec<TransferId>,
    #[n(11)]
    pub need_revision: bool,
    #[n(12)]
    pub state: RequestState,
    #[n(13)]
    pub total_qty: f64,
    #[n(14)]
    pub total_value: f64,
}

impl TransportRequest {
    pub fn line(&self, id: LineId) -> Option<&RequestLine> {
        self.lines.iter().find(|line| line.id == id)
    }
    pub fn line_mut(&mut self, id: LineId) -> Option<&mut RequestLine> {
        self.lines.iter_mut().find(|line| line.id == id)
    }
    pub fn is_draft(&self) -> bool {
        self.state == RequestState::Draft
    }
}

/// Draft builder. The reference and ids are assigned when the request is stored.
#[derive(Debug, Default)]
pub struct NewRequest {
    origin: Option<String>,
    requesting_warehouse: Option<WarehouseId>,
    providing_warehouse: Option<WarehouseId>,
    requested_at: Option<TimeStamp<Utc>>,
    lines: Vec<RequestLine>,
}

impl NewRequest {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
    pub fn set_requesting_warehouse(mut self, warehouse: WarehouseId) -> Self {
        self.requesting_warehouse = Some(warehouse);
        self
    }
    pub fn set_providing_warehouse(mut self, warehouse: WarehouseId) -> Self {
        self.providing_warehouse = Some(warehouse);
        self
    }
    pub fn set_requested_at(mut self, at: TimeStamp<Utc>) -> Self {
        self.requested_at = Some(at);
        self
    }
    pub fn add_line(mut self, line: RequestLine) -> Self {
        self.lines.push(line);
        self
    }

    pub(crate) fn into_draft(self, company: CompanyId, requested_by: UserId) -> TransportRequest {
        TransportRequest {
            id: RequestId(0),
            revision: 0,
            name: String::new(),
            origin: self.origin,
            requesting_warehouse: self.requesting_warehouse,
            providing_warehouse: self.providing_warehouse,
            company,
            requested_by,
            requested_at: self.requested_at.unwrap_or_default(),
            lines: self.lines,
            transfers: vec![],
            need_revision: false,
            state: RequestState::Draft,
            total_qty: 0.0,
            total_value: 0.0,
        }
    }
}

/// Edits applied to an existing draft line; `None` leaves a field untouched.
#[derive(Debug, Default, Clone)]
pub struct LineChange {
    pub product: Option<ProductId>,
    pub qty: Option<f64>,
    pub uom: Option<UomId>,
    pub scheduled_date: Option<TimeStamp<Utc>>,
    pub note: Option<String>,
}

impl LineChange {
    pub fn qty(qty: f64) -> Self {
        Self {
            qty: Some(qty),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_starts_empty_and_clean() {
        let user = UserId::new();
        let draft = NewRequest::new()
            .set_origin("SO042")
            .set_providing_warehouse(WarehouseId(1))
            .into_draft(CompanyId(1), user);

        assert_eq!(draft.state, RequestState::Draft);
        assert!(!draft.need_revision);
        assert_eq!(draft.total_qty, 0.0);
        assert!(draft.requesting_warehouse.is_none());
        assert_eq!(draft.origin.as_deref(), Some("SO042"));
    }

    #[test]
    fn request_roundtrips_through_cbor() {
        let draft = NewRequest::new()
            .set_requesting_warehouse(WarehouseId(2))
            .set_providing_warehouse(WarehouseId(1))
            .add_line(RequestLine::new(ProductId(3), 4.0, UomId(1)))
            .into_draft(CompanyId(1), UserId::new());

        let cbor = minicbor::to_vec(&draft).unwrap();
        let decoded: TransportRequest = minicbor::decode(&cbor).unwrap();

        assert_eq!(draft, decoded);
    }

    #[test]
    fn only_confirmed_and_cancelled_are_terminal() {
        assert!(RequestState::Confirmed.is_terminal());
        assert!(RequestState::Cancelled.is_terminal());
        assert!(!RequestState::Approved.is_terminal());
    }
}
