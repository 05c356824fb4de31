use crate::catalog::OperationCatalog;
use crate::constants::limits::{LOG_STRING_BYTES, UPSTREAM_BODY_EXCERPT_BYTES};
use crate::errors::AdapterError;
use crate::services::backends::BackendRegistry;
use crate::services::client_factory::{ClientFactory, UpstreamRequest};
use crate::services::credential;
use crate::services::logger::Logger;
use crate::services::normalizer::normalize;
use crate::services::transform::transform;
use crate::utils::redact::{mask_secrets, redact_object};
use crate::utils::text::truncate_utf8_prefix;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Turns `(operation, args, credential)` into exactly one upstream call.
#[derive(Clone)]
pub struct Dispatcher {
    catalog: Arc<OperationCatalog>,
    registry: Arc<BackendRegistry>,
    factory: Arc<dyn ClientFactory>,
    logger: Logger,
}

impl Dispatcher {
    /// Fails when a catalog entry names a backend the registry does not know.
    pub fn new(
        catalog: Arc<OperationCatalog>,
        registry: Arc<BackendRegistry>,
        factory: Arc<dyn ClientFactory>,
        logger: Logger,
    ) -> Result<Self, AdapterError> {
        let mut dangling = Vec::new();
        for op in catalog.iter() {
            if registry.get(&op.backend_id).is_none() {
                dangling.push(format!("{} -> {}", op.name, op.backend_id));
            }
        }
        if !dangling.is_empty() {
            return Err(AdapterError::configuration(format!(
                "operations reference unknown backends: {}",
                dangling.join(", ")
            )));
        }
        Ok(Self {
            catalog,
            registry,
            factory,
            logger: logger.child("dispatcher"),
        })
    }

    pub fn catalog(&self) -> &OperationCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn active_clients(&self) -> usize {
        self.factory.active()
    }

    pub async fn invoke(
        &self,
        operation: &str,
        args: &Map<String, Value>,
        extension: Option<&Map<String, Value>>,
        credential: Option<&str>,
    ) -> Result<Value, AdapterError> {
        let call_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let result = self
            .dispatch(&call_id, operation, args, extension, credential)
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => self.logger.info(
                "invoke completed",
                Some(&json!({
                    "operation": operation,
                    "call_id": call_id,
                    "duration_ms": duration_ms,
                })),
            ),
            Err(err) => {
                let mut meta = json!({
                    "operation": operation,
                    "call_id": call_id,
                    "duration_ms": duration_ms,
                    "kind": err.kind(),
                    "code": err.code(),
                });
                if let (Some(status), Value::Object(map)) = (err.status(), &mut meta) {
                    map.insert("status".to_string(), Value::from(status));
                }
                self.logger.warn("invoke failed", Some(&meta));
            }
        }
        result
    }

    async fn dispatch(
        &self,
        call_id: &str,
        operation: &str,
        args: &Map<String, Value>,
        extension: Option<&Map<String, Value>>,
        credential: Option<&str>,
    ) -> Result<Value, AdapterError> {
        let descriptor = self.catalog.resolve(operation)?;
        let credential = credential::require(credential)?;

        self.catalog.validate_args(operation, args)?;
        let backend = self.registry.require(&descriptor.backend_id)?;
        let normalized = normalize(descriptor, args, extension)?;

        self.logger.debug(
            "invoke started",
            Some(&json!({
                "operation": operation,
                "backend": backend.id,
                "call_id": call_id,
                "args": redact_object(&Value::Object(args.clone()), LOG_STRING_BYTES, None),
            })),
        );

        let response = {
            let mut client = self.factory.open(backend, &credential)?;
            client
                .send(UpstreamRequest {
                    method: descriptor.http_method,
                    path: descriptor.path.clone(),
                    query: normalized.query,
                    body: normalized.body,
                })
                .await?
        };

        self.logger.debug(
            "upstream responded",
            Some(&json!({
                "operation": operation,
                "call_id": call_id,
                "status": response.status,
                "bytes": response.body.len(),
            })),
        );

        if !response.is_success() {
            let text = String::from_utf8_lossy(&response.body);
            let scrubbed = mask_secrets(&text, &[credential.expose().to_string()]);
            return Err(AdapterError::Upstream {
                status: response.status,
                body: truncate_utf8_prefix(&scrubbed, UPSTREAM_BODY_EXCERPT_BYTES),
            });
        }

        transform(&response, descriptor.response_kind)
    }
}
