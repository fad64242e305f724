//! Infrastructure layer: the document store, configuration and the services
//! that drive trips, memos and wage settlement against it.

pub mod cascade;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod memos;
pub mod retry;
pub mod sequence;
pub mod store;
pub mod trips;
pub mod wages;


use std::sync::Arc;

use tracing::info;

pub use cascade::{CascadeReport, CascadeRouter};
pub use collaborators::{
    BusNotifier, LedgerService, Notifier, NotifyError, OrderService, StoreLedgerService,
    StoreOrderService,
};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use memos::{MemoOutcome, MemoService};
pub use sequence::SequenceIssuer;
pub use store::{InMemoryDocumentStore, PostgresDocumentStore, SharedStore};
pub use trips::{StatusUpdate, TripService};
pub use wages::{NewTripWage, WageService};

/// Every service, wired to one store.
#[derive(Clone)]
pub struct Engine {
    pub store: SharedStore,
    pub sequence: SequenceIssuer,
    pub orders: Arc<dyn OrderService>,
    pub ledger: Arc<dyn LedgerService>,
    pub memos: MemoService,
    pub cascade: CascadeRouter,
    pub trips: TripService,
    pub wages: WageService,
}

impl Engine {
    pub fn new(config: &EngineConfig, store: SharedStore, notifier: Arc<dyn Notifier>) -> Self {
        let attempts = config.max_transaction_attempts;
        let orders: Arc<dyn OrderService> = Arc::new(StoreOrderService::new(store.clone(), attempts));
        let ledger: Arc<dyn LedgerService> =
            Arc::new(StoreLedgerService::new(store.clone(), attempts));
        let memos = MemoService::new(store.clone(), orders.clone(), attempts);
        let cascade = CascadeRouter::new(
            store.clone(),
            orders.clone(),
            ledger.clone(),
            notifier,
            memos.clone(),
            attempts,
        );

        Self {
            sequence: SequenceIssuer::new(store.clone(), attempts),
            trips: TripService::new(store.clone(), cascade.clone(), attempts),
            wages: WageService::new(store.clone(), ledger.clone(), config.batch_write_limit, attempts),
            orders,
            ledger,
            memos,
            cascade,
            store,
        }
    }

    /// Build against Postgres when `database_url` is set, otherwise in memory.
    pub async fn connect(config: &EngineConfig, notifier: Arc<dyn Notifier>) -> EngineResult<Self> {
        let store: SharedStore = match &config.database_url {
            Some(url) => {
                let pg = PostgresDocumentStore::connect(url)
                    .await?
                    .with_write_limit(config.batch_write_limit);
                pg.ensure_schema().await?;
                info!("using postgres document store");
                Arc::new(pg)
            }
            None => {
                info!("using in-memory document store");
                Arc::new(InMemoryDocumentStore::with_write_limit(config.batch_write_limit))
            }
        };
        Ok(Self::new(config, store, notifier))
    }
}
