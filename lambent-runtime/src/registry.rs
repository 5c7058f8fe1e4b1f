//! Handler registration and cold-start resolution
//!
//! Modules are registered under names, each behind a one-shot initializer.
//! The configured `<module>.<export>` identifier is resolved exactly once,
//! at cold start; the registry is consumed by resolution so nothing can
//! re-resolve mid-flight.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use lambent_core::{ErrorEnvelope, ErrorKind};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::handler::Handler;

/// Why cold-start resolution failed. Always fatal.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("bad handler identifier '{0}': expected <module>.<export>")]
    MalformedId(String),

    #[error("module does not exist: {0}")]
    ModuleNotFound(String),

    #[error("module '{module}' failed to initialize: {cause:#}")]
    InitFailed { module: String, cause: anyhow::Error },

    #[error("module '{module}' has no default export and no export named '{export}'")]
    ExportNotFound { module: String, export: String },

    #[error("export '{export}' of module '{module}' is not a handler")]
    ExportNotCallable { module: String, export: String },
}

impl ResolveError {
    /// Classify for the init-error report.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        let kind = match self {
            Self::MalformedId(_) => ErrorKind::Config,
            Self::ModuleNotFound(_) => ErrorKind::FileDoesNotExist,
            Self::InitFailed { .. } => ErrorKind::Init,
            Self::ExportNotFound { .. } => ErrorKind::MethodDoesNotExist,
            Self::ExportNotCallable { .. } => ErrorKind::MethodIsNotAFunction,
        };
        ErrorEnvelope::new(kind, self.to_string())
    }
}

enum Export {
    Handler(Arc<dyn Handler>),
    Value(Value),
}

/// One registered module: an optional default export plus named exports.
#[derive(Default)]
pub struct HandlerModule {
    default: Option<Arc<dyn Handler>>,
    exports: HashMap<String, Export>,
}

impl HandlerModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default export. Resolution prefers this over any named
    /// export.
    pub fn default_export(mut self, handler: impl Handler + 'static) -> Self {
        self.default = Some(Arc::new(handler));
        self
    }

    /// Add a named handler export.
    pub fn export(mut self, name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.exports
            .insert(name.into(), Export::Handler(Arc::new(handler)));
        self
    }

    /// Add a named non-callable export.
    pub fn export_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.exports.insert(name.into(), Export::Value(value));
        self
    }
}

type ModuleInit = Box<dyn FnOnce() -> anyhow::Result<HandlerModule> + Send>;

/// Registry of handler modules available to this process.
#[derive(Default)]
pub struct HandlerRegistry {
    modules: HashMap<String, ModuleInit>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. The initializer runs at most once, if and when
    /// resolution selects the module.
    pub fn module<F>(mut self, name: impl Into<String>, init: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<HandlerModule> + Send + 'static,
    {
        self.modules.insert(name.into(), Box::new(init));
        self
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Resolve the configured `<module>.<export>` identifier into a handler
    /// capability.
    ///
    /// Consumes the registry: the capability is fixed for the lifetime of
    /// the process. The module's default export wins over the named one.
    pub fn resolve(
        mut self,
        handler_id: &str,
        task_root: &Path,
    ) -> Result<Arc<dyn Handler>, ResolveError> {
        let (module_name, export_name) = split_handler_id(handler_id)
            .ok_or_else(|| ResolveError::MalformedId(handler_id.to_string()))?;

        let init = self.modules.remove(module_name).ok_or_else(|| {
            ResolveError::ModuleNotFound(task_root.join(module_name).display().to_string())
        })?;

        let module = init().map_err(|cause| ResolveError::InitFailed {
            module: module_name.to_string(),
            cause,
        })?;

        if let Some(handler) = module.default {
            info!(module = %module_name, "Resolved default export");
            return Ok(handler);
        }

        let mut exports = module.exports;
        match exports.remove(export_name) {
            Some(Export::Handler(handler)) => {
                info!(module = %module_name, export = %export_name, "Resolved named export");
                Ok(handler)
            }
            Some(Export::Value(_)) => Err(ResolveError::ExportNotCallable {
                module: module_name.to_string(),
                export: export_name.to_string(),
            }),
            None => Err(ResolveError::ExportNotFound {
                module: module_name.to_string(),
                export: export_name.to_string(),
            }),
        }
    }
}

/// Split `<module>.<export>` on the last dot.
fn split_handler_id(handler_id: &str) -> Option<(&str, &str)> {
    let (module, export) = handler_id.rsplit_once('.')?;
    if module.is_empty() || export.is_empty() {
        return None;
    }
    Some((module, export))
}
