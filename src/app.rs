use crate::catalog::OperationCatalog;
use crate::config::Settings;
use crate::errors::AdapterError;
use crate::services::backends::BackendRegistry;
use crate::services::client_factory::{ClientFactory, HttpClientFactory};
use crate::services::dispatcher::Dispatcher;
use crate::services::logger::Logger;
use serde_json::{json, Value};
use std::sync::Arc;

/// Process-wide wiring. Everything here is immutable after `initialize`.
pub struct App {
    pub settings: Settings,
    pub logger: Logger,
    pub catalog: Arc<OperationCatalog>,
    pub dispatcher: Dispatcher,
}

impl App {
    pub fn initialize(settings: Settings) -> Result<Self, AdapterError> {
        let logger = Logger::with_level("buildot", settings.log_level);
        let factory = Arc::new(HttpClientFactory::new(logger.clone()));
        Self::with_factory(settings, logger, factory)
    }

    /// Same wiring with a caller-chosen transport.
    pub fn with_factory(
        settings: Settings,
        logger: Logger,
        factory: Arc<dyn ClientFactory>,
    ) -> Result<Self, AdapterError> {
        settings.validate()?;
        let catalog = Arc::new(OperationCatalog::builtin()?);
        let registry = Arc::new(BackendRegistry::from_settings(&settings)?);
        let dispatcher = Dispatcher::new(catalog.clone(), registry, factory, logger.clone())?;
        logger.info(
            "initialized",
            Some(&json!({
                "operations": catalog.len(),
                "backends": dispatcher.registry().ids(),
                "tls_verify": settings.tls_verify,
            })),
        );
        Ok(Self {
            settings,
            logger,
            catalog,
            dispatcher,
        })
    }

    pub fn health(&self) -> Value {
        json!({
            "ok": true,
            "api_base": self.settings.data_api_base,
            "ems_base": self.settings.ems_api_base,
            "operations": self.catalog.len(),
            "active_clients": self.dispatcher.active_clients(),
            "version": env!("CARGO_PKG_VERSION"),
            "log": self.logger.stats(),
        })
    }
}
