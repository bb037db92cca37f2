use crate::functions::{ToolSchema, ValidationResult};
use crate::transport::TransportError;
use thiserror::Error;

/// Boxed failure produced by a host function.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path that caused the error (e.g., "parameters.unit", "choices[0].delta")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "schema_builder", "sse_decoder")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the chat client and its function-calling runtime.
///
/// Nothing here is retried automatically; every variant carries enough detail
/// (schema, raw arguments, validation report) for the caller to diagnose it.
#[derive(Debug, Error)]
pub enum Error {
    /// A type or function descriptor has a shape that cannot be rendered as a schema.
    #[error("Schema generation error: {message}{}", format_context(.context))]
    SchemaGeneration {
        message: String,
        context: ErrorContext,
    },

    /// The validation endpoint could not be reached or answered with garbage.
    #[error("Remote validation of function '{function}' failed: {message}")]
    RemoteValidation {
        function: String,
        status: Option<u16>,
        message: String,
    },

    /// The validation endpoint rejected the schema with structured errors.
    #[error("Function '{}' rejected: {}", .schema.name, describe_rejection(.validation))]
    FunctionRejected {
        schema: Box<ToolSchema>,
        validation: ValidationResult,
    },

    #[error("Cannot convert argument '{parameter}' of function '{function}': {message}")]
    ArgumentConversion {
        function: String,
        parameter: String,
        arguments: serde_json::Value,
        message: String,
    },

    #[error("Function '{function}' failed: {source}")]
    FunctionInvocation {
        function: String,
        arguments: serde_json::Value,
        #[source]
        source: BoxError,
    },

    #[error("Function '{0}' is not registered")]
    FunctionNotFound(String),

    #[error("Protocol error: {message}{}", format_context(.context))]
    Protocol {
        message: String,
        context: ErrorContext,
    },

    #[error("Authentication error: {message}")]
    Authentication { message: String },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Remote error: HTTP {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

fn describe_rejection(validation: &ValidationResult) -> String {
    let issues: Vec<String> = validation
        .errors
        .iter()
        .flatten()
        .map(|issue| match &issue.schema_location {
            Some(location) => format!("{} at {}", issue.description, location),
            None => issue.description.clone(),
        })
        .collect();
    if issues.is_empty() {
        validation.message.clone()
    } else {
        format!("{} [{}]", validation.message, issues.join("; "))
    }
}

impl Error {
    pub fn schema(msg: impl Into<String>) -> Self {
        Error::SchemaGeneration {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn schema_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::SchemaGeneration {
            message: msg.into(),
            context,
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn protocol_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Protocol {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Error::Authentication {
            message: msg.into(),
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::SchemaGeneration { context, .. }
            | Error::Protocol { context, .. }
            | Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Failures a model can react to when they are reported back as a function result.
    pub fn is_invocation_failure(&self) -> bool {
        matches!(
            self,
            Error::ArgumentConversion { .. }
                | Error::FunctionInvocation { .. }
                | Error::FunctionNotFound(_)
        )
    }
}
