//! Service layer for Polycast
//!
//! `PolycastService` wires the pieces of the orchestrator together and is the
//! one entry point the binaries use:
//!
//! - `PublishingService`: accepts publish requests, reads posts back,
//!   reprocesses failures
//! - `ConnectionService`: links and unlinks platform accounts
//! - `PublishWorker`: the per-platform job, run by the job queue
//! - `EventBus`: progress events from running jobs
//!
//! # Example
//!
//! ```no_run
//! use libpolycast::service::PolycastService;
//! use libpolycast::service::publishing::PublishRequest;
//!
//! # async fn example() -> libpolycast::Result<()> {
//! let service = PolycastService::new().await?;
//!
//! let request = PublishRequest {
//!     user_id: 1,
//!     platforms: vec!["x".to_string(), "instagram".to_string()],
//!     media_urls: vec!["https://cdn.example.com/launch.jpg".to_string()],
//!     caption: "Launch day".to_string(),
//!     settings: None,
//! };
//!
//! let response = service.publishing().create_post(request).await?;
//! println!("Queued {} posts", response.posts.len());
//!
//! service.wait_idle().await;
//! # Ok(())
//! # }
//! ```

pub mod connections;
pub mod events;
pub mod publishing;
pub mod worker;

use std::sync::Arc;
use tracing::debug;

use self::connections::ConnectionService;
use self::events::{EventBus, EventReceiver};
use self::publishing::PublishingService;
use self::worker::PublishWorker;
use crate::config::{Config, PublishingConfig};
use crate::dispatch::{JobQueue, TaskQueue};
use crate::error::{ConfigError, Result};
use crate::registry::PlatformRegistry;
use crate::tokens::TokenManager;
use crate::Database;

const EVENT_CAPACITY: usize = 100;

/// Main service facade
///
/// Every sub-service shares the same `Arc<Database>`, registry and event bus.
pub struct PolycastService {
    db: Arc<Database>,
    registry: PlatformRegistry,
    queue: Arc<dyn JobQueue>,
    publishing: PublishingService,
    connections: ConnectionService,
    event_bus: EventBus,
}

impl PolycastService {
    /// Create a service from the configuration file at the default location
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration cannot be loaded
    /// - A configured platform adapter cannot be built
    /// - Database cannot be initialized
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Create a service from a pre-built `Config`
    pub async fn from_config(config: Config) -> Result<Self> {
        let db_path = crate::config::resolve_db_path(Some(&config.database.path))?;
        let db_path_str = db_path
            .to_str()
            .ok_or_else(|| ConfigError::MissingField("Invalid database path".to_string()))?;
        let db = Database::new(db_path_str).await?;
        let registry = PlatformRegistry::from_config(&config)?;

        Ok(Self::with_registry(Arc::new(db), registry, &config.publishing))
    }

    /// Assemble the service around an existing database and registry.
    ///
    /// Tests use this to drive the orchestrator with mock adapters.
    pub fn with_registry(
        db: Arc<Database>,
        registry: PlatformRegistry,
        publishing: &PublishingConfig,
    ) -> Self {
        let event_bus = EventBus::new(EVENT_CAPACITY);
        let tokens = TokenManager::new(db.clone(), publishing.refresh_lookahead());

        let worker = PublishWorker::new(
            db.clone(),
            db.clone(),
            registry.clone(),
            tokens,
            event_bus.clone(),
            publishing,
        );
        let queue: Arc<dyn JobQueue> = Arc::new(TaskQueue::new(Arc::new(worker)));

        let publishing =
            PublishingService::new(db.clone(), db.clone(), queue.clone(), event_bus.clone());
        let connections = ConnectionService::new(db.clone(), db.clone(), registry.clone());

        debug!(platforms = ?registry.platforms(), "Polycast service assembled");

        Self {
            db,
            registry,
            queue,
            publishing,
            connections,
            event_bus,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    pub fn publishing(&self) -> &PublishingService {
        &self.publishing
    }

    pub fn connections(&self) -> &ConnectionService {
        &self.connections
    }

    /// Subscribe to job progress events
    ///
    /// Only events emitted after this call are received.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    /// Jobs accepted but not yet finished
    pub fn jobs_in_flight(&self) -> usize {
        self.queue.in_flight()
    }

    /// Resolve once every queued job has reached a terminal state
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }
}
