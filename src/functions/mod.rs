//! Function calling: describing host functions, generating and validating their
//! schemas, and invoking them with model-supplied arguments.
//!
//! ```rust
//! use chatfn::functions::{
//!     FunctionDescriptor, FunctionSchemaGenerator, ParameterDescriptor, ToolFunction,
//! };
//!
//! let descriptor = FunctionDescriptor::new("get_trip_distance")
//!     .description("Distance between two places in kilometres")
//!     .param(ParameterDescriptor::new::<String>("start"))
//!     .param(ParameterDescriptor::new::<String>("end"));
//!
//! let tool = ToolFunction::new(descriptor, |start: String, end: String| {
//!     Ok::<_, chatfn::BoxError>(serde_json::json!({ "distance": start.len() + end.len() }))
//! })?;
//! let schema = FunctionSchemaGenerator::generate(tool.descriptor())?;
//! assert_eq!(schema.required_parameters, ["start", "end"]);
//! # Ok::<(), chatfn::Error>(())
//! ```

pub mod descriptor;
pub mod generator;
pub mod invoke;
pub mod marshal;
pub mod registry;
pub mod schema;

pub use descriptor::{
    EnumDescriptor, Example, FieldDescriptor, FunctionDescriptor, IntegerWidth, NumberWidth,
    ObjectDescriptor, ParameterDescriptor, ToolAnnotation, ToolType, TypeDescriptor,
};
pub use generator::{FunctionSchemaGenerator, ToolSchema};
pub use invoke::{Callable, Handler, Invoker, ToolFunction};
pub use marshal::{ArgumentMarshaller, Arguments, NativeValue};
pub use registry::{
    FunctionRegistry, HttpSchemaValidator, RegisteredFunction, SchemaValidator, ValidationIssue,
    ValidationResult,
};
pub use schema::{SchemaKind, TypeSchema, TypeSchemaBuilder};
