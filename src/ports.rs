//! Collaborators the workflow engine talks to, and the master data they share
use crate::error::{Result, TransferError};
use crate::request::TransportRequest;
use crate::rule::ApprovalRule;
use crate::types::{
    CompanyId, GroupId, LineId, LocationId, MoveId, PickingTypeId, ProductId, RequestId, RuleId,
    TransferId, UomId, UserId, WarehouseId,
};

#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Warehouse {
    #[n(0)]
    pub id: WarehouseId,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub code: String,
    #[n(3)]
    pub company: CompanyId,
    #[n(4)]
    pub stock_location: LocationId,
    #[n(5)]
    pub valid_request_qty: f64, // fallback ceiling when no rule matches, 0 means none
}

impl Warehouse {
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        company: CompanyId,
        stock_location: LocationId,
    ) -> Self {
        Self {
            id: WarehouseId(0),
            name: name.into(),
            code: code.into(),
            company,
            stock_location,
            valid_request_qty: 0.0,
        }
    }
    pub fn set_valid_request_qty(mut self, qty: f64) -> Self {
        self.valid_request_qty = qty;
        self
    }
}

#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Product {
    #[n(0)]
    pub id: ProductId,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub uom: UomId, // canonical unit
    #[n(3)]
    pub standard_price: f64,
}

impl Product {
    pub fn new(name: impl Into<String>, uom: UomId, standard_price: f64) -> Self {
        Self {
            id: ProductId(0),
            name: name.into(),
            uom,
            standard_price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum PickingCode {
    #[n(0)]
    Internal,
    #[n(1)]
    Incoming,
    #[n(2)]
    Outgoing,
}

/// Operation type used to create transfers.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct PickingType {
    #[n(0)]
    pub id: PickingTypeId,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub code: PickingCode,
    #[n(3)]
    pub warehouse: Option<WarehouseId>,
}

impl PickingType {
    pub fn internal(name: impl Into<String>, warehouse: Option<WarehouseId>) -> Self {
        Self {
            id: PickingTypeId(0),
            name: name.into(),
            code: PickingCode::Internal,
            warehouse,
        }
    }
}

/// Record storage. Records created with a zero id get one assigned on insert.
pub trait Repository: Send + Sync {
    fn insert_rule(&self, rule: ApprovalRule) -> Result<ApprovalRule>;
    fn update_rule(&self, rule: &ApprovalRule) -> Result<()>;
    fn rule(&self, id: RuleId) -> Result<ApprovalRule>;
    /// Active rules ordered by `(sequence, id)`, optionally restricted to one providing warehouse.
    fn active_rules(&self, warehouse: Option<WarehouseId>) -> Result<Vec<ApprovalRule>>;

    fn insert_warehouse(&self, warehouse: Warehouse) -> Result<Warehouse>;
    fn warehouse(&self, id: WarehouseId) -> Result<Warehouse>;

    fn insert_product(&self, product: Product) -> Result<Product>;
    fn product(&self, id: ProductId) -> Result<Product>;

    fn insert_picking_type(&self, picking_type: PickingType) -> Result<PickingType>;
    /// First internal picking type bound to `warehouse`, or to any warehouse when `None`.
    fn internal_picking_type(&self, warehouse: Option<WarehouseId>)
    -> Result<Option<PickingType>>;

    /// Stores a new request, assigning its id, reference and line ids.
    fn create_request(&self, request: TransportRequest) -> Result<TransportRequest>;
    fn request(&self, id: RequestId) -> Result<TransportRequest>;
    /// Writes `request` if nobody else has written since it was read; bumps the revision.
    fn save_request(&self, request: &TransportRequest) -> Result<TransportRequest>;
    fn next_line_id(&self) -> Result<LineId>;
}

pub trait StockLookup: Send + Sync {
    /// Unreserved quantity of `product` in `warehouse`, in the product's canonical unit.
    fn free_qty(&self, product: ProductId, warehouse: WarehouseId) -> Result<f64>;
}

pub trait UomConverter: Send + Sync {
    fn convert(&self, qty: f64, from: UomId, to: UomId) -> Result<f64>;
    /// Whether quantities in `from` can be expressed in `to`.
    fn compatible(&self, from: UomId, to: UomId) -> bool {
        self.convert(1.0, from, to).is_ok()
    }
}

pub trait GroupMembership: Send + Sync {
    fn is_member(&self, user: &UserId, group: GroupId) -> bool;
}

pub trait AuditSink: Send + Sync {
    fn post(&self, request: RequestId, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum TransferStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Confirmed,
    #[n(2)]
    Assigned,
    #[n(3)]
    Done,
    #[n(4)]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTransfer {
    pub picking_type: PickingTypeId,
    pub source: LocationId,
    pub destination: LocationId,
    pub origin: String, // request reference
    pub company: CompanyId,
    pub request: RequestId,
    pub moves: Vec<NewMove>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMove {
    pub line: LineId,
    pub product: ProductId,
    pub qty: f64,
    pub uom: UomId,
    pub source: LocationId,
    pub destination: LocationId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedTransfer {
    pub id: TransferId,
    pub name: String,
    pub moves: Vec<(LineId, MoveId)>,
}

/// The physical transfer subsystem. Transfers keep a back reference to the
/// request that spawned them.
pub trait TransferService: Send + Sync {
    fn create_transfer(&self, transfer: &NewTransfer) -> Result<CreatedTransfer, TransferError>;
    fn confirm_transfer(&self, id: TransferId) -> Result<(), TransferError>;
    fn reserve_transfer(&self, id: TransferId) -> Result<(), TransferError>;
    fn status(&self, id: TransferId) -> Result<TransferStatus, TransferError>;
    fn linked_request(&self, id: TransferId) -> Result<Option<RequestId>, TransferError>;
}
