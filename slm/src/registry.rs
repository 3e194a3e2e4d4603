use alayasiki_core::error::{AlayasikiError, ErrorCode};
use query::{Generator, RankedChunk};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("generator backend not found: {0}")]
    BackendNotFound(String),
    #[error("generator backend already registered: {0}")]
    BackendAlreadyExists(String),
    #[error("no active generator backend has been selected")]
    NoActiveBackend,
}

impl AlayasikiError for RegistryError {
    fn error_code(&self) -> ErrorCode {
        match self {
            RegistryError::BackendNotFound(_) => ErrorCode::NotFound,
            RegistryError::BackendAlreadyExists(_) => ErrorCode::InvalidArgument,
            RegistryError::NoActiveBackend => ErrorCode::InvalidArgument,
        }
    }
}

/// Selects between the subprocess worker backend and an in-process backend
/// (used for tests and for deployments without a worker binary available).
/// Narrowed from a full versioned-rollback model registry down to the two
/// backends the generation layer actually needs.
#[derive(Default)]
pub struct GeneratorBackendRegistry {
    backends: HashMap<String, Arc<dyn Generator>>,
    active: Option<String>,
}

impl GeneratorBackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        backend: Arc<dyn Generator>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.backends.contains_key(&name) {
            return Err(RegistryError::BackendAlreadyExists(name));
        }
        let is_first = self.backends.is_empty();
        self.backends.insert(name.clone(), backend);
        if is_first {
            info!(backend = %name, "registered first generator backend, activating it");
            self.active = Some(name);
        } else {
            info!(backend = %name, "registered generator backend");
        }
        Ok(())
    }

    pub fn activate(&mut self, name: &str) -> Result<(), RegistryError> {
        if !self.backends.contains_key(name) {
            return Err(RegistryError::BackendNotFound(name.to_string()));
        }
        info!(backend = %name, "activating generator backend");
        self.active = Some(name.to_string());
        Ok(())
    }

    pub fn active(&self) -> Result<Arc<dyn Generator>, RegistryError> {
        let name = self.active.as_ref().ok_or(RegistryError::NoActiveBackend)?;
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::BackendNotFound(name.clone()))
    }
}

#[async_trait::async_trait]
impl Generator for GeneratorBackendRegistry {
    async fn generate(
        &self,
        query: &str,
        chunks: &[RankedChunk],
        conversation_context: &[(String, String)],
    ) -> Result<String, String> {
        let backend = self.active().map_err(|e| e.to_string())?;
        backend.generate(query, chunks, conversation_context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticGenerator(&'static str);

    #[async_trait::async_trait]
    impl Generator for StaticGenerator {
        async fn generate(
            &self,
            _query: &str,
            _chunks: &[RankedChunk],
            _conversation_context: &[(String, String)],
        ) -> Result<String, String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn first_registered_backend_becomes_active() {
        let mut registry = GeneratorBackendRegistry::new();
        registry
            .register("subprocess", Arc::new(StaticGenerator("from subprocess")))
            .unwrap();
        assert!(registry.active().is_ok());
    }

    #[test]
    fn activate_switches_the_active_backend() {
        let mut registry = GeneratorBackendRegistry::new();
        registry
            .register("subprocess", Arc::new(StaticGenerator("a")))
            .unwrap();
        registry
            .register("inprocess", Arc::new(StaticGenerator("b")))
            .unwrap();

        registry.activate("inprocess").unwrap();
        assert_eq!(registry.activate("missing"), Err(RegistryError::BackendNotFound("missing".into())));
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = GeneratorBackendRegistry::new();
        registry
            .register("subprocess", Arc::new(StaticGenerator("a")))
            .unwrap();
        let err = registry
            .register("subprocess", Arc::new(StaticGenerator("a")))
            .unwrap_err();
        assert_eq!(err, RegistryError::BackendAlreadyExists("subprocess".into()));
    }

    #[tokio::test]
    async fn no_active_backend_surfaces_as_an_error() {
        let registry = GeneratorBackendRegistry::new();
        let err = registry.generate("q", &[], &[]).await.unwrap_err();
        assert!(err.contains("no active generator backend"));
    }
}
