use std::{path::Path, sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use payout_engine::{
    events::EventProducers,
    helpers::{Clock, SimulatedRail, SystemClock},
    notifications::create_notifier_event_handlers,
    AdminApi,
    RefundApi,
    SettlementApi,
    SqliteDatabase,
    VendorApi,
};
use rail_tools::{RailApi, RailConfig};

use crate::{
    config::{RailMode, ServerConfig},
    errors::ServerError,
    integrations::{ConfiguredRail, LogNotifier, WebhookNotifier},
    routes::{
        health,
        EligiblePayoutsRoute,
        ForcePayRoute,
        IntakeOrderRoute,
        ListPayoutsRoute,
        MarkPaidRoute,
        OnboardVendorRoute,
        PaymentStatsRoute,
        PayoutByIdRoute,
        RefundOrderRoute,
        RegisterVendorRoute,
        RetryRoute,
        RunSettlementRoute,
        TransferLogRoute,
        VendorEarningsRoute,
        VendorPayoutsRoute,
        VendorPendingSalesRoute,
    },
    settlement_worker::start_settlement_worker,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    ensure_database_dir(&config.database_url)?;
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let rail = configure_rail(&config)?;
    info!("🚀️ Using the {} payment rail", config.rail_mode);

    let handlers = match &config.alert_webhook_url {
        Some(url) => {
            info!("🚀️ Notifications will be posted to {url}");
            let notifier = WebhookNotifier::new(url.as_str()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
            create_notifier_event_handlers(notifier)
        },
        None => create_notifier_event_handlers(LogNotifier),
    };
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let settlement =
        SettlementApi::new(db.clone(), rail.clone(), producers.clone(), config.settlement_config(), clock.clone());
    let _worker =
        start_settlement_worker(settlement, config.settlement_interval, config.run_settlement_on_startup);

    let srv = create_server_instance(config, db, rail, producers, clock)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    rail: ConfiguredRail,
    producers: EventProducers,
    clock: Arc<dyn Clock>,
) -> Result<Server, ServerError> {
    let settlement_config = config.settlement_config();
    let srv = HttpServer::new(move || {
        let settlement_api = SettlementApi::new(
            db.clone(),
            rail.clone(),
            producers.clone(),
            settlement_config.clone(),
            clock.clone(),
        );
        let admin_api = AdminApi::new(settlement_api.clone());
        let refund_api = RefundApi::new(db.clone(), producers.clone(), clock.clone());
        let vendor_api = VendorApi::new(db.clone(), settlement_config.holding_period, clock.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("vps::access_log"))
            .app_data(web::Data::new(settlement_api))
            .app_data(web::Data::new(admin_api))
            .app_data(web::Data::new(refund_api))
            .app_data(web::Data::new(vendor_api))
            .service(health)
            // "eligible" must be registered before the "{id}" route
            .service(EligiblePayoutsRoute::<SqliteDatabase, ConfiguredRail>::new())
            .service(ListPayoutsRoute::<SqliteDatabase, ConfiguredRail>::new())
            .service(PayoutByIdRoute::<SqliteDatabase, ConfiguredRail>::new())
            .service(ForcePayRoute::<SqliteDatabase, ConfiguredRail>::new())
            .service(RetryRoute::<SqliteDatabase, ConfiguredRail>::new())
            .service(MarkPaidRoute::<SqliteDatabase, ConfiguredRail>::new())
            .service(PaymentStatsRoute::<SqliteDatabase, ConfiguredRail>::new())
            .service(TransferLogRoute::<SqliteDatabase, ConfiguredRail>::new())
            .service(RegisterVendorRoute::<SqliteDatabase, ConfiguredRail>::new())
            .service(OnboardVendorRoute::<SqliteDatabase, ConfiguredRail>::new())
            .service(IntakeOrderRoute::<SqliteDatabase, ConfiguredRail>::new())
            .service(RefundOrderRoute::<SqliteDatabase>::new())
            .service(RunSettlementRoute::<SqliteDatabase, ConfiguredRail>::new())
            .service(VendorEarningsRoute::<SqliteDatabase>::new())
            .service(VendorPayoutsRoute::<SqliteDatabase>::new())
            .service(VendorPendingSalesRoute::<SqliteDatabase>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

fn configure_rail(config: &ServerConfig) -> Result<ConfiguredRail, ServerError> {
    match config.rail_mode {
        RailMode::Rest => {
            let rail_config = RailConfig::new_from_env_or_default();
            if rail_config.currency != config.currency {
                return Err(ServerError::ConfigurationError(format!(
                    "The payment rail is configured for {}, but payouts are settled in {}",
                    rail_config.currency, config.currency
                )));
            }
            let api = RailApi::new(rail_config).map_err(|e| ServerError::InitializeError(e.to_string()))?;
            Ok(ConfiguredRail::Rest(api))
        },
        RailMode::Simulated => {
            warn!(
                "🚨️ Running against the simulated payment rail. No money will move. Set VPS_RAIL_MODE=rest for \
                 production."
            );
            Ok(ConfiguredRail::Simulated(SimulatedRail::new(config.simulated_rail_balance)))
        },
    }
}

/// SQLite creates the database file if it is missing, but not the directory it lives in.
fn ensure_database_dir(url: &str) -> Result<(), ServerError> {
    let path = url.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
    if path.is_empty() || path.starts_with(':') {
        return Ok(());
    }
    let path = path.split('?').next().unwrap_or(path);
    match Path::new(path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => {
            info!("🚀️ Creating database directory {}", dir.display());
            std::fs::create_dir_all(dir)?;
            Ok(())
        },
        _ => Ok(()),
    }
}
