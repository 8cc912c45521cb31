//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! ## Admin routes
//! * `GET  /admin/payouts` with optional `vendor_id`, `order_id`, `status`, `since`, `until`, `offset` and `count`
//! * `GET  /admin/payouts/eligible`
//! * `GET  /admin/payouts/{id}`
//! * `POST /admin/payouts/{id}/force_pay`
//! * `POST /admin/payouts/{id}/retry`
//! * `POST /admin/payouts/{id}/mark_paid` with body `{"note": "..."}`
//! * `GET  /admin/stats`
//! * `GET  /admin/transfer_log` (CSV)
//! * `POST /admin/vendors`
//! * `POST /admin/vendors/{id}/onboard`
//! * `POST /admin/orders`
//! * `POST /admin/orders/{order_id}/refund` with body `{"reason": "..."}`
//! * `POST /admin/settlement/run`
//!
//! ## Vendor routes
//! * `GET /vendors/{id}/earnings`
//! * `GET /vendors/{id}/payouts`
//! * `GET /vendors/{id}/pending_sales`
//!
//! Every handler is async. Long-running work (database access, payment rail calls) must never block the worker
//! thread.
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use payout_engine::{
    db_types::{NewOrder, NewVendor, OrderId},
    payout_objects::Pagination,
    traits::{PaymentRail, PayoutQueries, SettlementDatabase, VendorManagement},
    AdminApi,
    PayoutOutcome,
    RefundApi,
    SettlementApi,
    VendorApi,
};

use crate::{
    data_objects::{
        MarkPaidRequest,
        OrderIntakeResponse,
        PayoutListParams,
        PayoutOutcomeResponse,
        RefundRequest,
        RefundResponse,
        TransferLogParams,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

/// The ledger capabilities needed to register and onboard vendors.
pub trait VendorLedger: SettlementDatabase + VendorManagement {}

impl<T> VendorLedger for T where T: SettlementDatabase + VendorManagement {}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Payouts  ----------------------------------------------------
route!(list_payouts => Get "/admin/payouts" impl PayoutQueries, PaymentRail);
/// Route handler for the payout listing. Results are sorted by sale date, newest first, and paged with `offset` and
/// `count`. The response also carries the total number of matching payouts.
pub async fn list_payouts<B: PayoutQueries, R: PaymentRail>(
    params: web::Query<PayoutListParams>,
    api: web::Data<AdminApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    let params = params.into_inner();
    let filter = params.filter();
    debug!("💻️ GET payouts. {filter}");
    let page = api.list_payouts(filter, params.pagination()).await?;
    Ok(HttpResponse::Ok().json(page))
}

route!(eligible_payouts => Get "/admin/payouts/eligible" impl PayoutQueries, PaymentRail);
/// Pending earnings whose holding period is over, i.e. what the next settlement run will pick up.
pub async fn eligible_payouts<B: PayoutQueries, R: PaymentRail>(
    pagination: web::Query<Pagination>,
    api: web::Data<AdminApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET eligible payouts");
    let page = api.eligible_payouts(pagination.into_inner()).await?;
    Ok(HttpResponse::Ok().json(page))
}

route!(payout_by_id => Get "/admin/payouts/{id}" impl PayoutQueries, PaymentRail);
pub async fn payout_by_id<B: PayoutQueries, R: PaymentRail>(
    path: web::Path<i64>,
    api: web::Data<AdminApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    let payout_id = path.into_inner();
    debug!("💻️ GET payout #{payout_id}");
    let payout = api
        .payout_by_id(payout_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Payout #{payout_id}")))?;
    Ok(HttpResponse::Ok().json(payout))
}

route!(force_pay => Post "/admin/payouts/{id}/force_pay" impl SettlementDatabase, PaymentRail);
/// Pays a pending payout now, ignoring the holding period.
pub async fn force_pay<B: SettlementDatabase, R: PaymentRail>(
    path: web::Path<i64>,
    api: web::Data<AdminApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    let payout_id = path.into_inner();
    info!("💻️ POST force_pay for payout #{payout_id}");
    let outcome = api.force_pay(payout_id).await?;
    outcome_response(outcome)
}

route!(retry => Post "/admin/payouts/{id}/retry" impl SettlementDatabase, PaymentRail);
/// Tries a failed payout again. If an earlier attempt did reach the payment rail, that transfer is recorded and no
/// new money is sent.
pub async fn retry<B: SettlementDatabase, R: PaymentRail>(
    path: web::Path<i64>,
    api: web::Data<AdminApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    let payout_id = path.into_inner();
    info!("💻️ POST retry for payout #{payout_id}");
    let outcome = api.retry(payout_id).await?;
    outcome_response(outcome)
}

fn outcome_response(outcome: PayoutOutcome) -> Result<HttpResponse, ServerError> {
    match PayoutOutcomeResponse::try_from_outcome(outcome) {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err((payout, reason)) => {
            info!("💻️ Payout #{} failed. {reason}", payout.id);
            Err(ServerError::RailError(format!("Payout #{} failed: {reason}", payout.id)))
        },
    }
}

route!(mark_paid => Post "/admin/payouts/{id}/mark_paid" impl SettlementDatabase, PaymentRail);
/// Records that a pending payout was settled outside the payment rail. A non-empty `note` is required.
pub async fn mark_paid<B: SettlementDatabase, R: PaymentRail>(
    path: web::Path<i64>,
    body: web::Json<MarkPaidRequest>,
    api: web::Data<AdminApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    let payout_id = path.into_inner();
    info!("💻️ POST mark_paid for payout #{payout_id}");
    let settlement = api.mark_paid_without_transfer(payout_id, &body.note).await?;
    Ok(HttpResponse::Ok().json(settlement))
}

//----------------------------------------------   Reporting  ----------------------------------------------------
route!(payment_stats => Get "/admin/stats" impl PayoutQueries, PaymentRail);
pub async fn payment_stats<B: PayoutQueries, R: PaymentRail>(
    api: web::Data<AdminApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET payment stats");
    let stats = api.payment_stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}

route!(transfer_log => Get "/admin/transfer_log" impl PayoutQueries, PaymentRail);
/// The transfer log as CSV, oldest entry first. Filter with `vendor_id`, `payout_id`, `since` and `until`.
pub async fn transfer_log<B: PayoutQueries, R: PaymentRail>(
    params: web::Query<TransferLogParams>,
    api: web::Data<AdminApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET transfer log");
    let csv = api.export_transfer_log(params.into_inner().into()).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(("Content-Disposition", "attachment; filename=\"transfer_log.csv\""))
        .body(csv))
}

//----------------------------------------------   Vendors  ----------------------------------------------------
route!(register_vendor => Post "/admin/vendors" impl VendorLedger, PaymentRail);
pub async fn register_vendor<B: VendorLedger, R: PaymentRail>(
    body: web::Json<NewVendor>,
    api: web::Data<AdminApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    let vendor = body.into_inner();
    if vendor.name.trim().is_empty() {
        return Err(ServerError::InvalidRequestBody("A vendor name is required".into()));
    }
    info!("💻️ POST new vendor {}", vendor.name);
    let vendor = api.register_vendor(vendor).await?;
    Ok(HttpResponse::Created().json(vendor))
}

route!(onboard_vendor => Post "/admin/vendors/{id}/onboard" impl VendorLedger, PaymentRail);
/// Creates the vendor's destination account on the payment rail. Idempotent.
pub async fn onboard_vendor<B: VendorLedger, R: PaymentRail>(
    path: web::Path<i64>,
    api: web::Data<AdminApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    let vendor_id = path.into_inner();
    info!("💻️ POST onboard vendor #{vendor_id}");
    let vendor = api.onboard_vendor(vendor_id).await?;
    Ok(HttpResponse::Ok().json(vendor))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(intake_order => Post "/admin/orders" impl SettlementDatabase, PaymentRail);
/// Paid-order intake. Creates one pending payout per vendor in the order.
pub async fn intake_order<B: SettlementDatabase, R: PaymentRail>(
    body: web::Json<NewOrder>,
    api: web::Data<SettlementApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    let order = body.into_inner();
    info!("💻️ POST paid order {}", order.order_id);
    let (order, payouts, breakdown) = api.process_paid_order(order).await?;
    Ok(HttpResponse::Created().json(OrderIntakeResponse { order, payouts, breakdown }))
}

route!(refund_order => Post "/admin/orders/{order_id}/refund" impl SettlementDatabase);
pub async fn refund_order<B: SettlementDatabase>(
    path: web::Path<String>,
    body: web::Json<RefundRequest>,
    api: web::Data<RefundApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    info!("💻️ POST refund for order {order_id}");
    let result = api.refund_order(&order_id, &body.reason).await?;
    Ok(HttpResponse::Ok().json(RefundResponse::from(result)))
}

//----------------------------------------------   Settlement  ----------------------------------------------------
route!(run_settlement => Post "/admin/settlement/run" impl SettlementDatabase, PaymentRail);
/// Runs the settlement scheduler once, right now, and returns the run summary.
pub async fn run_settlement<B: SettlementDatabase, R: PaymentRail>(
    api: web::Data<AdminApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    info!("💻️ POST settlement run");
    let summary = api.run_settlement_now().await?;
    Ok(HttpResponse::Ok().json(summary))
}

//----------------------------------------------   Vendor views  ----------------------------------------------------
route!(vendor_earnings => Get "/vendors/{id}/earnings" impl PayoutQueries);
pub async fn vendor_earnings<B: PayoutQueries>(
    path: web::Path<i64>,
    api: web::Data<VendorApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let vendor_id = path.into_inner();
    debug!("💻️ GET earnings for vendor #{vendor_id}");
    let summary = api.earnings_summary(vendor_id).await.map_err(ServerError::for_vendor)?;
    Ok(HttpResponse::Ok().json(summary))
}

route!(vendor_payouts => Get "/vendors/{id}/payouts" impl PayoutQueries);
/// The vendor's payout history, newest sale first, paged with `offset` and `count`.
pub async fn vendor_payouts<B: PayoutQueries>(
    path: web::Path<i64>,
    pagination: web::Query<Pagination>,
    api: web::Data<VendorApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let vendor_id = path.into_inner();
    debug!("💻️ GET payouts for vendor #{vendor_id}");
    let page = api.payout_history(vendor_id, pagination.into_inner()).await.map_err(ServerError::for_vendor)?;
    Ok(HttpResponse::Ok().json(page))
}

route!(vendor_pending_sales => Get "/vendors/{id}/pending_sales" impl PayoutQueries);
pub async fn vendor_pending_sales<B: PayoutQueries>(
    path: web::Path<i64>,
    api: web::Data<VendorApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let vendor_id = path.into_inner();
    debug!("💻️ GET pending sales for vendor #{vendor_id}");
    let sales = api.pending_sales(vendor_id).await.map_err(ServerError::for_vendor)?;
    Ok(HttpResponse::Ok().json(sales))
}
