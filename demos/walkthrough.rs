//! Drives one transport request from draft to confirmed against a
//! temporary sled store and the in-memory collaborators.
//!
//! cargo run --example walkthrough
use anyhow::Context;
use std::sync::Arc;
use stock_transport::config::{Settings, StoreSettings};
use stock_transport::memory::{GroupDirectory, StockLedger, TransferBook, UomTable};
use stock_transport::ports::{PickingType, Product, Repository, TransferStatus, Warehouse};
use stock_transport::types::{CompanyId, GroupId, LocationId, UomId, UserId};
use stock_transport::{
    Actor, ApprovalRule, Collaborators, NewRequest, RequestLine, Store, TransportService,
    telemetry,
};

fn main() -> anyhow::Result<()> {
    let mut settings = Settings::load(None)?;
    telemetry::init(&settings.logging)?;

    let dir = std::env::temp_dir().join(format!("stock_transport_demo_{}", std::process::id()));
    settings.store = StoreSettings {
        path: dir,
        temporary: true,
    };
    let store = Arc::new(Store::open(&settings.store, &settings.sequence)?);

    let company = CompanyId(1);
    let main = store.insert_warehouse(
        Warehouse::new("Main Warehouse", "WH", company, LocationId(10)).set_valid_request_qty(500.0),
    )?;
    let shop = store.insert_warehouse(Warehouse::new("City Shop", "SH", company, LocationId(20)))?;
    store.insert_picking_type(PickingType::internal("WH: Internal Transfers", Some(main.id)))?;
    let pallet = store.insert_product(Product::new("Pallet", UomId(1), 12.0))?;

    let mut uom = UomTable::new();
    uom.add_unit(UomId(1), "Units", 1, 1.0);
    uom.add_unit(UomId(2), "Dozens", 1, 12.0);
    let line_unit = uom.name(UomId(2)).unwrap_or("units").to_owned();

    let stock = Arc::new(StockLedger::new());
    stock.set_free_qty(pallet.id, main.id, 80.0);
    let transfers = Arc::new(TransferBook::new());
    let groups = Arc::new(GroupDirectory::new());

    let service = TransportService::new(
        store.clone(),
        Collaborators {
            stock,
            uom: Arc::new(uom),
            transfers: transfers.clone(),
            groups: groups.clone(),
        },
    )
    .with_settings(settings.workflow.clone());

    let logistics = GroupId(1);
    let clerk = Actor::new(UserId::new(), company);
    let manager = Actor::new(UserId::new(), company);
    groups.add_member(logistics, manager.user);

    service.create_rule(
        ApprovalRule::new("WH: logistics approval", main.id).set_approver_group(logistics),
    )?;

    let request = service.create_request(
        NewRequest::new()
            .set_origin("weekly restock")
            .set_requesting_warehouse(shop.id)
            .set_providing_warehouse(main.id)
            .add_line(RequestLine::new(pallet.id, 4.0, UomId(2))),
        &clerk,
    )?;
    println!(
        "created {} for 4 {line_unit} ({} units)",
        request.name, request.total_qty
    );

    let submitted = service.submit(request.id, &clerk)?;
    println!(
        "submitted: state={} need_revision={}",
        submitted.request.state, submitted.request.need_revision
    );

    let approved = service
        .approve(request.id, &manager)
        .context("approval failed")?;
    let report = approved
        .transfer
        .into_report()
        .context("no transfer was created")?;
    println!("approved, transfer {} reserved={}", report.name, report.is_reserved());

    transfers.set_status(report.transfer, TransferStatus::Done)?;
    if let Some(confirmed) = service.on_transfer_status_changed(report.transfer)? {
        println!("{} is {}", confirmed.name, confirmed.state);
    }

    for note in store.history(request.id)? {
        println!("  {}", note.message);
    }
    store.flush()?;
    Ok(())
}
