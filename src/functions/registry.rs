//! Remotely validated function registry.
//!
//! Lookups read an [`ArcSwap`] snapshot and never block; registration builds a
//! new map and publishes it under a writer lock.

use super::generator::{FunctionSchemaGenerator, ToolSchema};
use super::invoke::ToolFunction;
use crate::transport::HttpTransport;
use crate::{Error, Result};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const VALIDATE_PATH: &str = "functions/validate";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_location: Option<String>,
}

/// Verdict of the validation endpoint on one schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub message: String,
    #[serde(
        default,
        rename = "json_ai_rules_version",
        skip_serializing_if = "Option::is_none"
    )]
    pub rules_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ValidationIssue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<ValidationIssue>>,
}

impl ValidationResult {
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings.as_ref().is_some_and(|w| !w.is_empty())
    }

    pub fn is_correct(&self) -> bool {
        !self.has_errors()
    }
}

/// Checks a schema against the remote rules.
///
/// A structured rejection is an `Ok` result with errors; `Err` means the check
/// itself could not be carried out.
#[async_trait]
pub trait SchemaValidator: Send + Sync {
    async fn validate(
        &self,
        schema: &ToolSchema,
        cancel: &CancellationToken,
    ) -> Result<ValidationResult>;
}

/// Validator backed by the `functions/validate` endpoint.
pub struct HttpSchemaValidator {
    transport: Arc<HttpTransport>,
}

impl HttpSchemaValidator {
    pub fn new(transport: Arc<HttpTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SchemaValidator for HttpSchemaValidator {
    async fn validate(
        &self,
        schema: &ToolSchema,
        cancel: &CancellationToken,
    ) -> Result<ValidationResult> {
        self.transport
            .post_json::<_, ValidationResult>(VALIDATE_PATH, schema, cancel)
            .await
            .map_err(|e| match e {
                Error::Cancelled => Error::Cancelled,
                Error::Remote { status, message } => Error::RemoteValidation {
                    function: schema.name.clone(),
                    status: Some(status),
                    message,
                },
                other => Error::RemoteValidation {
                    function: schema.name.clone(),
                    status: None,
                    message: other.to_string(),
                },
            })
    }
}

/// A function that passed validation. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct RegisteredFunction {
    pub name: String,
    pub description: Option<String>,
    pub validation: ValidationResult,
    pub function: ToolFunction,
    pub schema: ToolSchema,
    /// Native parameter name to schema property name.
    pub args_map: Vec<(String, String)>,
}

impl RegisteredFunction {
    pub(crate) fn new(function: ToolFunction, schema: ToolSchema, validation: ValidationResult) -> Self {
        Self {
            name: schema.name.clone(),
            description: schema.description.clone(),
            args_map: function.descriptor().args_map(),
            validation,
            function,
            schema,
        }
    }
}

pub struct FunctionRegistry {
    validator: Arc<dyn SchemaValidator>,
    functions: ArcSwap<HashMap<String, Arc<RegisteredFunction>>>,
    write_lock: Mutex<()>,
}

impl FunctionRegistry {
    pub fn new(validator: Arc<dyn SchemaValidator>) -> Self {
        Self {
            validator,
            functions: ArcSwap::from_pointee(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Generate the schema of `function` and have it validated remotely.
    pub async fn validate(
        &self,
        function: &ToolFunction,
        cancel: &CancellationToken,
    ) -> Result<ValidationResult> {
        let schema = FunctionSchemaGenerator::generate(function.descriptor())?;
        self.validator.validate(&schema, cancel).await
    }

    /// Validate and store `function` under its schema name, replacing any
    /// function registered under the same name.
    pub async fn register(
        &self,
        function: ToolFunction,
        cancel: &CancellationToken,
    ) -> Result<Arc<RegisteredFunction>> {
        let schema = FunctionSchemaGenerator::generate(function.descriptor())?;
        let validation = self.validator.validate(&schema, cancel).await?;

        if validation.has_errors() {
            warn!(
                function = schema.name.as_str(),
                errors = validation.errors.as_ref().map_or(0, Vec::len),
                "function rejected by validation"
            );
            return Err(Error::FunctionRejected {
                schema: Box::new(schema),
                validation,
            });
        }
        if let Some(warnings) = validation.warnings.as_ref().filter(|w| !w.is_empty()) {
            for w in warnings {
                warn!(
                    function = schema.name.as_str(),
                    location = w.schema_location.as_deref().unwrap_or(""),
                    "validation warning: {}",
                    w.description
                );
            }
        }

        let registered = Arc::new(RegisteredFunction::new(function, schema, validation));

        let _guard = self.write_lock.lock().await;
        let current = self.functions.load();
        let mut next = HashMap::with_capacity(current.len() + 1);
        for (k, v) in current.iter() {
            next.insert(k.clone(), v.clone());
        }
        let replaced = next
            .insert(registered.name.clone(), registered.clone())
            .is_some();
        self.functions.store(Arc::new(next));

        info!(
            function = registered.name.as_str(),
            replaced,
            rules_version = registered.validation.rules_version.as_deref().unwrap_or(""),
            "function registered"
        );
        Ok(registered)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<RegisteredFunction>> {
        self.functions.load().get(name).cloned()
    }

    /// Schemas of every registered function, ordered by name.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let snapshot = self.functions.load();
        let mut schemas: Vec<ToolSchema> = snapshot.values().map(|f| f.schema.clone()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.load().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.load().is_empty()
    }
}
