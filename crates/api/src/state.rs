//! Service wiring for each role.

use std::sync::Arc;

use axum::http::HeaderValue;
use inventory::{
    CartStore, FinalizationEngine, InMemoryLedger, InventoryError, Ledger, PostgresLedger,
    Product, ReservationEngine,
};
use saga::{
    FinalizationService, HttpClient, HttpFinalizationService, HttpNotificationService,
    HttpPaymentService, HttpReservationService, InMemoryNotificationService,
    InMemoryPaymentService, NotificationService, PaymentService, ReservationService, RetryPolicy,
    SagaCoordinator,
};
use saga_log::{InMemorySagaLog, PostgresSagaLog, SagaLog};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use crate::config::{Config, Role};

pub type DynLedger = Arc<dyn Ledger>;

/// The orchestrator as served over HTTP, with every collaborator behind a
/// trait object so in-process and remote wiring share one type.
pub type Coordinator = SagaCoordinator<
    Arc<dyn SagaLog>,
    Arc<dyn ReservationService>,
    Arc<dyn PaymentService>,
    Arc<dyn NotificationService>,
    Arc<dyn FinalizationService>,
>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid ALLOWED_ORIGIN '{0}'")]
    InvalidOrigin(String),

    #[error("role '{0}' shares its ledger with other processes and needs DATABASE_URL")]
    DatabaseRequired(Role),

    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("inventory setup failed: {0}")]
    Inventory(#[from] InventoryError),

    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// The inventory engines, sharing one ledger.
pub struct InventoryServices {
    pub reservation: ReservationEngine<DynLedger>,
    pub finalization: FinalizationEngine<DynLedger>,
    pub cart: CartStore<DynLedger>,
}

impl InventoryServices {
    pub fn new(ledger: DynLedger) -> Self {
        Self {
            reservation: ReservationEngine::new(ledger.clone()),
            finalization: FinalizationEngine::new(ledger.clone()),
            cart: CartStore::new(ledger),
        }
    }
}

/// Everything a process serves. Services a role does not serve are None.
#[derive(Clone)]
pub struct Services {
    pub role: Role,
    pub allowed_origin: HeaderValue,
    pub coordinator: Option<Arc<Coordinator>>,
    pub inventory: Option<Arc<InventoryServices>>,
    pub payment: Option<Arc<dyn PaymentService>>,
    pub notification: Option<Arc<dyn NotificationService>>,
}

impl Services {
    /// Connects the backends the configured role needs and wires its
    /// services. Migrations run when a database is configured.
    pub async fn build(config: &Config) -> Result<Self, StartupError> {
        let role = config.role;
        let allowed_origin = parse_origin(&config.allowed_origin)?;
        if matches!(role, Role::Reservation | Role::Finalization) && config.database_url.is_none() {
            return Err(StartupError::DatabaseRequired(role));
        }

        let pool = match &config.database_url {
            Some(url) if role.uses_ledger() || role.runs_orchestrator() => {
                let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
                PostgresLedger::new(pool.clone()).run_migrations().await?;
                tracing::info!("connected to Postgres, migrations applied");
                Some(pool)
            }
            _ => None,
        };

        let ledger: Option<DynLedger> = role.uses_ledger().then(|| match &pool {
            Some(pool) => Arc::new(PostgresLedger::new(pool.clone())) as DynLedger,
            None => Arc::new(InMemoryLedger::new()) as DynLedger,
        });
        if let Some(ledger) = &ledger {
            seed_products(ledger.as_ref(), &config.products).await?;
        }
        let log: Arc<dyn SagaLog> = match &pool {
            Some(pool) => Arc::new(PostgresSagaLog::new(pool.clone())),
            None => Arc::new(InMemorySagaLog::new()),
        };

        let mut services = match role {
            Role::All => {
                let ledger = ledger.unwrap_or_else(|| Arc::new(InMemoryLedger::new()));
                Self::in_process(ledger, log, config.retry_policy())
            }
            Role::Orchestrator => {
                let coordinator = remote_coordinator(config, log)?;
                Self::empty(role).with_coordinator(coordinator)
            }
            Role::Reservation | Role::Finalization => Self {
                inventory: ledger.map(|ledger| Arc::new(InventoryServices::new(ledger))),
                ..Self::empty(role)
            },
            Role::Payment => Self {
                payment: Some(Arc::new(InMemoryPaymentService::new())),
                ..Self::empty(role)
            },
            Role::Notification => Self {
                notification: Some(Arc::new(InMemoryNotificationService::new())),
                ..Self::empty(role)
            },
        };
        services.allowed_origin = allowed_origin;
        Ok(services)
    }

    /// Wires every service in one process: the orchestrator calls the
    /// inventory engines directly and uses the reference payment and
    /// notification services.
    pub fn in_process(ledger: DynLedger, log: Arc<dyn SagaLog>, retry: RetryPolicy) -> Self {
        let payment: Arc<dyn PaymentService> = Arc::new(InMemoryPaymentService::new());
        let notification: Arc<dyn NotificationService> =
            Arc::new(InMemoryNotificationService::new());

        let coordinator = SagaCoordinator::new(
            log,
            Arc::new(ReservationEngine::new(ledger.clone())) as Arc<dyn ReservationService>,
            payment.clone(),
            notification.clone(),
            Arc::new(FinalizationEngine::new(ledger.clone())) as Arc<dyn FinalizationService>,
        )
        .with_retry_policy(retry);

        Self {
            coordinator: Some(Arc::new(coordinator)),
            inventory: Some(Arc::new(InventoryServices::new(ledger))),
            payment: Some(payment),
            notification: Some(notification),
            ..Self::empty(Role::All)
        }
    }

    fn empty(role: Role) -> Self {
        Self {
            role,
            allowed_origin: HeaderValue::from_static("http://localhost:9003"),
            coordinator: None,
            inventory: None,
            payment: None,
            notification: None,
        }
    }

    fn with_coordinator(mut self, coordinator: Coordinator) -> Self {
        self.coordinator = Some(Arc::new(coordinator));
        self
    }

    pub fn with_allowed_origin(mut self, origin: &str) -> Result<Self, StartupError> {
        self.allowed_origin = parse_origin(origin)?;
        Ok(self)
    }
}

/// Sets the configured stock levels.
async fn seed_products(ledger: &dyn Ledger, products: &[Product]) -> Result<(), StartupError> {
    for product in products {
        ledger.put_product(*product).await?;
    }
    if !products.is_empty() {
        tracing::info!(count = products.len(), "product stock seeded");
    }
    Ok(())
}

fn parse_origin(origin: &str) -> Result<HeaderValue, StartupError> {
    HeaderValue::from_str(origin).map_err(|_| StartupError::InvalidOrigin(origin.to_string()))
}

/// Builds an orchestrator whose steps are HTTP calls to the configured
/// services.
fn remote_coordinator(config: &Config, log: Arc<dyn SagaLog>) -> Result<Coordinator, StartupError> {
    let client = reqwest::Client::builder().build()?;
    let endpoint = |url: &str| HttpClient::new(client.clone(), url, config.step_timeout);

    Ok(SagaCoordinator::new(
        log,
        Arc::new(HttpReservationService::new(endpoint(&config.reservation_url)))
            as Arc<dyn ReservationService>,
        Arc::new(HttpPaymentService::new(endpoint(&config.payment_url))) as Arc<dyn PaymentService>,
        Arc::new(HttpNotificationService::new(endpoint(&config.notification_url)))
            as Arc<dyn NotificationService>,
        Arc::new(HttpFinalizationService::new(endpoint(&config.finalization_url)))
            as Arc<dyn FinalizationService>,
    )
    .with_retry_policy(config.retry_policy()))
}
