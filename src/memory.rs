//! In-memory stand-ins for the stock, unit, transfer and group services.
//!
//! These back the walkthrough demo and the test suite. Each one is safe to
//! share behind an `Arc` and exposes a few knobs (stock levels, transfer
//! status changes, injected failures) so workflows can be driven end to end
//! without the real inventory subsystem.
use crate::error::{Result, TransferError, WorkflowError};
use crate::ports::{
    CreatedTransfer, GroupMembership, NewTransfer, StockLookup, TransferService, TransferStatus,
    UomConverter,
};
use crate::types::{
    GroupId, LineId, MoveId, ProductId, RequestId, TransferId, UomId, UserId, WarehouseId,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct StockLedger {
    free: RwLock<HashMap<(ProductId, WarehouseId), f64>>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_free_qty(&self, product: ProductId, warehouse: WarehouseId, qty: f64) {
        self.free
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((product, warehouse), qty);
    }
}

impl StockLookup for StockLedger {
    fn free_qty(&self, product: ProductId, warehouse: WarehouseId) -> Result<f64> {
        let free = self.free.read().unwrap_or_else(PoisonError::into_inner);
        Ok(free.get(&(product, warehouse)).copied().unwrap_or(0.0).max(0.0))
    }
}

#[derive(Debug, Clone)]
struct Unit {
    name: String,
    category: u64,
    ratio: f64, // reference units per one of this unit
}

/// Units grouped by category; conversion only happens within a category.
#[derive(Debug, Default)]
pub struct UomTable {
    units: HashMap<UomId, Unit>,
}

impl UomTable {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add_unit(&mut self, id: UomId, name: impl Into<String>, category: u64, ratio: f64) {
        self.units.insert(
            id,
            Unit {
                name: name.into(),
                category,
                ratio,
            },
        );
    }
    pub fn name(&self, id: UomId) -> Option<&str> {
        self.units.get(&id).map(|unit| unit.name.as_str())
    }
}

impl UomConverter for UomTable {
    fn convert(&self, qty: f64, from: UomId, to: UomId) -> Result<f64> {
        if from == to {
            return Ok(qty);
        }
        let incompatible = || WorkflowError::IncompatibleUnits {
            from: from.0,
            to: to.0,
        };
        let source = self.units.get(&from).ok_or_else(incompatible)?;
        let target = self.units.get(&to).ok_or_else(incompatible)?;
        if source.category != target.category || target.ratio <= 0.0 {
            return Err(incompatible());
        }
        Ok(qty * source.ratio / target.ratio)
    }
}

#[derive(Debug, Default)]
pub struct GroupDirectory {
    members: RwLock<HashMap<GroupId, HashSet<UserId>>>,
}

impl GroupDirectory {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add_member(&self, group: GroupId, user: UserId) {
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(group)
            .or_default()
            .insert(user);
    }
}

impl GroupMembership for GroupDirectory {
    fn is_member(&self, user: &UserId, group: GroupId) -> bool {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&group)
            .is_some_and(|users| users.contains(user))
    }
}

/// A transfer as recorded by [`TransferBook`].
#[derive(Debug, Clone, PartialEq)]
pub struct BookedTransfer {
    pub name: String,
    pub request: RequestId,
    pub status: TransferStatus,
    pub order: NewTransfer,
    pub moves: Vec<MoveId>,
}

#[derive(Debug, Default)]
struct Book {
    next_id: u64,
    transfers: HashMap<TransferId, BookedTransfer>,
    fail_create: Option<String>,
    fail_confirm: Option<String>,
    fail_reserve: Option<String>,
}

#[derive(Debug, Default)]
pub struct TransferBook {
    book: Mutex<Book>,
}

impl TransferBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_book<T>(&self, f: impl FnOnce(&mut Book) -> T) -> T {
        let mut book = self.book.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut book)
    }

    pub fn fail_create_with(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.with_book(|b| b.fail_create = Some(reason));
    }
    pub fn fail_confirm_with(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.with_book(|b| b.fail_confirm = Some(reason));
    }
    pub fn fail_reserve_with(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.with_book(|b| b.fail_reserve = Some(reason));
    }
    pub fn clear_failures(&self) {
        self.with_book(|b| {
            b.fail_create = None;
            b.fail_confirm = None;
            b.fail_reserve = None;
        });
    }

    /// Simulates the warehouse moving a transfer along, e.g. validating it.
    pub fn set_status(&self, id: TransferId, status: TransferStatus) -> Result<(), TransferError> {
        self.with_book(|b| {
            let transfer = b
                .transfers
                .get_mut(&id)
                .ok_or(TransferError::UnknownTransfer(id.0))?;
            transfer.status = status;
            Ok(())
        })
    }
    pub fn transfer(&self, id: TransferId) -> Option<BookedTransfer> {
        self.with_book(|b| b.transfers.get(&id).cloned())
    }
    pub fn transfers_for(&self, request: RequestId) -> Vec<TransferId> {
        self.with_book(|b| {
            let mut ids: Vec<TransferId> = b
                .transfers
                .iter()
                .filter(|(_, t)| t.request == request)
                .map(|(id, _)| *id)
                .collect();
            ids.sort();
            ids
        })
    }
    pub fn len(&self) -> usize {
        self.with_book(|b| b.transfers.len())
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn advance(
        &self,
        id: TransferId,
        failure: impl FnOnce(&Book) -> Option<TransferError>,
        status: TransferStatus,
    ) -> Result<(), TransferError> {
        self.with_book(|b| {
            if let Some(err) = failure(b) {
                return Err(err);
            }
            let transfer = b
                .transfers
                .get_mut(&id)
                .ok_or(TransferError::UnknownTransfer(id.0))?;
            transfer.status = status;
            Ok(())
        })
    }
}

impl TransferService for TransferBook {
    fn create_transfer(&self, order: &NewTransfer) -> Result<CreatedTransfer, TransferError> {
        self.with_book(|b| {
            if let Some(reason) = &b.fail_create {
                return Err(TransferError::Create(reason.clone()));
            }
            b.next_id += 1;
            let id = TransferId(b.next_id);
            let name = format!("INT/{:05}", id.0);
            let moves: Vec<(LineId, MoveId)> = order
                .moves
                .iter()
                .enumerate()
                .map(|(i, m)| (m.line, MoveId(id.0 * 1000 + i as u64 + 1)))
                .collect();

            b.transfers.insert(
                id,
                BookedTransfer {
                    name: name.clone(),
                    request: order.request,
                    status: TransferStatus::Draft,
                    order: order.clone(),
                    moves: moves.iter().map(|(_, m)| *m).collect(),
                },
            );
            Ok(CreatedTransfer { id, name, moves })
        })
    }

    fn confirm_transfer(&self, id: TransferId) -> Result<(), TransferError> {
        self.advance(
            id,
            |b| b.fail_confirm.clone().map(TransferError::Confirm),
            TransferStatus::Confirmed,
        )
    }

    fn reserve_transfer(&self, id: TransferId) -> Result<(), TransferError> {
        self.advance(
            id,
            |b| b.fail_reserve.clone().map(TransferError::Reserve),
            TransferStatus::Assigned,
        )
    }

    fn status(&self, id: TransferId) -> Result<TransferStatus, TransferError> {
        self.with_book(|b| {
            b.transfers
                .get(&id)
                .map(|t| t.status)
                .ok_or(TransferError::UnknownTransfer(id.0))
        })
    }

    fn linked_request(&self, id: TransferId) -> Result<Option<RequestId>, TransferError> {
        self.with_book(|b| Ok(b.transfers.get(&id).map(|t| t.request)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompanyId, LocationId, PickingTypeId};

    #[test]
    fn units_convert_within_a_category_only() {
        let mut units = UomTable::new();
        units.add_unit(UomId(1), "Units", 1, 1.0);
        units.add_unit(UomId(2), "Dozens", 1, 12.0);
        units.add_unit(UomId(3), "kg", 2, 1.0);

        assert_eq!(units.convert(2.0, UomId(2), UomId(1)).unwrap(), 24.0);
        assert_eq!(units.convert(6.0, UomId(1), UomId(2)).unwrap(), 0.5);
        assert!(!units.compatible(UomId(1), UomId(3)));
    }

    #[test]
    fn unknown_stock_is_zero() {
        let ledger = StockLedger::new();
        ledger.set_free_qty(ProductId(1), WarehouseId(1), 5.0);

        assert_eq!(ledger.free_qty(ProductId(1), WarehouseId(1)).unwrap(), 5.0);
        assert_eq!(ledger.free_qty(ProductId(1), WarehouseId(2)).unwrap(), 0.0);
    }

    #[test]
    fn transfer_book_tracks_status_and_failures() {
        let book = TransferBook::new();
        let order = NewTransfer {
            picking_type: PickingTypeId(1),
            source: LocationId(1),
            destination: LocationId(2),
            origin: "STR/00001".into(),
            company: CompanyId(1),
            request: RequestId(7),
            moves: vec![],
        };
        let created = book.create_transfer(&order).unwrap();
        assert_eq!(book.status(created.id).unwrap(), TransferStatus::Draft);

        book.fail_reserve_with("no stock");
        book.confirm_transfer(created.id).unwrap();
        assert!(matches!(
            book.reserve_transfer(created.id),
            Err(TransferError::Reserve(_))
        ));
        assert_eq!(book.status(created.id).unwrap(), TransferStatus::Confirmed);
        assert_eq!(book.linked_request(created.id).unwrap(), Some(RequestId(7)));
        assert_eq!(book.transfers_for(RequestId(7)), vec![created.id]);
    }
}
