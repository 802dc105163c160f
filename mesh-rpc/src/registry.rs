use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use mesh_primitives::{MeshError, MethodEntry, MethodParams};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, MeshError>> + Send>>;
pub type Handler = Arc<dyn Fn(MethodParams) -> HandlerFuture + Send + Sync>;

/// `path -> handler` dispatch table (spec.md §4.4 "Registry"). Owned by
/// the application context, never a module-level global — two contexts in
/// the same process (as in tests) don't share entries.
#[derive(Default)]
pub struct MethodRegistry {
    entries: RwLock<HashMap<String, (MethodEntry, Handler)>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    /// Registers `handler` at `service/method`. Re-registration of an
    /// existing path logs a warning and overwrites — this is how hot
    /// reload replaces a service's methods in place (spec.md §3
    /// `MethodEntry` invariant).
    pub fn register(
        &self,
        service: &str,
        method: &str,
        public: bool,
        description: impl Into<String>,
        handler: Handler,
    ) {
        let path = MethodEntry::path_for(service, method);
        let entry = MethodEntry { path: path.clone(), public, description: description.into() };
        let mut entries = self.entries.write();
        if entries.contains_key(&path) {
            warn!(path = %path, "overwriting existing registry entry");
        }
        entries.insert(path, (entry, handler));
    }

    /// Removes every entry registered under `service`, used by hot reload
    /// before re-registering the reloaded module's methods.
    pub fn unregister_service(&self, service: &str) {
        let prefix = format!("{service}/");
        self.entries.write().retain(|path, _| !path.starts_with(&prefix));
    }

    pub fn entry(&self, path: &str) -> Option<MethodEntry> {
        self.entries.read().get(path).map(|(entry, _)| entry.clone())
    }

    pub async fn dispatch(&self, path: &str, params: MethodParams) -> Result<Value, MeshError> {
        let handler = {
            let entries = self.entries.read();
            entries.get(path).map(|(_, handler)| handler.clone())
        };
        match handler {
            Some(handler) => handler(params).await,
            None => Err(MeshError::NotFound(format!("no such method: {path}"))),
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_handler() -> Handler {
        Arc::new(|params: MethodParams| {
            Box::pin(async move {
                match params {
                    MethodParams::Positional(values) => Ok(json!(values)),
                    MethodParams::Named(map) => Ok(json!(map)),
                }
            })
        })
    }

    #[tokio::test]
    async fn register_then_dispatch_roundtrips() {
        let registry = MethodRegistry::new();
        registry.register("echo", "ping", true, "ping handler", echo_handler());
        let result = registry
            .dispatch("echo/ping", MethodParams::Positional(vec![json!(1)]))
            .await
            .unwrap();
        assert_eq!(result, json!([1]));
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let registry = MethodRegistry::new();
        let err = registry.dispatch("nope/nope", MethodParams::Positional(vec![])).await;
        assert!(matches!(err, Err(MeshError::NotFound(_))));
    }

    #[test]
    fn reregistration_overwrites() {
        let registry = MethodRegistry::new();
        registry.register("echo", "ping", true, "v1", echo_handler());
        registry.register("echo", "ping", true, "v2", echo_handler());
        assert_eq!(registry.entry("echo/ping").unwrap().description, "v2");
    }

    #[test]
    fn unregister_service_drops_all_its_paths() {
        let registry = MethodRegistry::new();
        registry.register("echo", "ping", true, "v1", echo_handler());
        registry.register("echo", "pong", true, "v1", echo_handler());
        registry.unregister_service("echo");
        assert!(registry.entry("echo/ping").is_none());
        assert!(registry.entry("echo/pong").is_none());
    }
}
