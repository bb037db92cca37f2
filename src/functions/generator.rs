//! Tool schemas for host functions.

use super::descriptor::{Example, FunctionDescriptor};
use super::schema::{pointer_segment, SchemaKind, TypeSchema, TypeSchemaBuilder};
use crate::{Error, ErrorContext, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashSet;
use tracing::debug;

/// Complete description of one callable as advertised to the model.
///
/// Regenerating it from the same descriptor yields an identical value; property
/// order follows parameter declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: Option<String>,
    /// Always an object schema.
    pub parameters: TypeSchema,
    pub return_schema: TypeSchema,
    pub required_parameters: Vec<String>,
    pub examples: Vec<Example>,
}

impl ToolSchema {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for ToolSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", &self.name)?;
        if let Some(d) = &self.description {
            map.serialize_entry("description", d)?;
        }
        map.serialize_entry("parameters", &self.parameters)?;
        map.serialize_entry("return_parameters", &self.return_schema)?;
        if !self.examples.is_empty() {
            map.serialize_entry("few_shot_examples", &WireExamples(&self.examples))?;
        }
        map.end()
    }
}

struct WireExamples<'a>(&'a [Example]);

impl Serialize for WireExamples<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for example in self.0 {
            seq.serialize_element(&WireExample(example))?;
        }
        seq.end()
    }
}

struct WireExample<'a>(&'a Example);

impl Serialize for WireExample<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("request", &self.0.request)?;
        map.serialize_entry("params", &WireParams(&self.0.params))?;
        map.end()
    }
}

struct WireParams<'a>(&'a [(String, String)]);

impl Serialize for WireParams<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

pub struct FunctionSchemaGenerator;

impl FunctionSchemaGenerator {
    pub fn generate(function: &FunctionDescriptor) -> Result<ToolSchema> {
        let name = function.schema_name().to_string();
        if name.is_empty() {
            return Err(Error::schema("function name must not be empty"));
        }

        let mut seen = HashSet::new();
        let mut properties = Vec::with_capacity(function.parameters.len());
        let mut required = Vec::new();

        for param in &function.parameters {
            let (param_name, description) = param.describe();
            if !seen.insert(param_name.to_string()) {
                return Err(Error::schema_with_context(
                    format!("duplicate parameter name '{}'", param_name),
                    ErrorContext::new()
                        .with_field_path(format!("{}.parameters", name))
                        .with_source("schema_generator"),
                ));
            }
            let pointer = format!("#/properties/{}", pointer_segment(param_name));
            let schema = TypeSchemaBuilder::build_at(&param.ty, &pointer)
                .map_err(|e| annotate(e, &name, "parameters"))?
                .with_description(description);
            if param.is_required() {
                required.push(param_name.to_string());
            }
            properties.push((param_name.to_string(), schema));
        }

        let return_schema = TypeSchemaBuilder::build(&function.returns)
            .map_err(|e| annotate(e, &name, "return_parameters"))?;

        debug!(
            function = name.as_str(),
            parameters = properties.len(),
            required = required.len(),
            "generated tool schema"
        );

        Ok(ToolSchema {
            description: function.schema_description().map(str::to_string),
            parameters: TypeSchema::new(SchemaKind::Object {
                title: None,
                properties,
                required: required.clone(),
                additional: None,
            }),
            return_schema,
            required_parameters: required,
            examples: function.examples.clone(),
            name,
        })
    }
}

/// Prefix the failing JSON pointer with the function and schema section it came from.
fn annotate(err: Error, function: &str, section: &str) -> Error {
    match err {
        Error::SchemaGeneration { message, context } => {
            let path = match &context.field_path {
                Some(p) => format!("{}.{}{}", function, section, p.trim_start_matches('#')),
                None => format!("{}.{}", function, section),
            };
            Error::SchemaGeneration {
                message,
                context: ErrorContext {
                    field_path: Some(path),
                    ..context
                },
            }
        }
        other => other,
    }
}
