//! JSON Schema nodes derived from [`TypeDescriptor`]s.

use super::descriptor::{ObjectDescriptor, TypeDescriptor};
use crate::{Error, ErrorContext, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};

#[derive(Debug, Clone, PartialEq)]
pub struct TypeSchema {
    pub kind: SchemaKind,
    pub nullable: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    String {
        format: Option<&'static str>,
    },
    Integer {
        format: Option<&'static str>,
    },
    Number {
        format: Option<&'static str>,
    },
    Boolean,
    Enum {
        values: Vec<String>,
    },
    Array {
        items: Box<TypeSchema>,
    },
    Object {
        title: Option<String>,
        /// Declaration order.
        properties: Vec<(String, TypeSchema)>,
        required: Vec<String>,
        /// Value schema of a string-keyed map.
        additional: Option<Box<TypeSchema>>,
    },
    /// Back-edge to an enclosing object that is still being expanded.
    Reference {
        name: String,
        pointer: String,
    },
}

impl TypeSchema {
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            nullable: false,
            description: None,
        }
    }

    pub fn with_description(mut self, description: Option<&str>) -> Self {
        if let Some(d) = description {
            self.description = Some(d.to_string());
        }
        self
    }

    pub fn empty_object() -> Self {
        Self::new(SchemaKind::Object {
            title: None,
            properties: Vec::new(),
            required: Vec::new(),
            additional: None,
        })
    }

    pub fn property(&self, name: &str) -> Option<&TypeSchema> {
        match &self.kind {
            SchemaKind::Object { properties, .. } => {
                properties.iter().find(|(n, _)| n == name).map(|(_, s)| s)
            }
            _ => None,
        }
    }

    pub fn required(&self) -> &[String] {
        match &self.kind {
            SchemaKind::Object { required, .. } => required,
            _ => &[],
        }
    }

    /// Number of reference nodes in this subtree.
    pub fn reference_count(&self) -> usize {
        match &self.kind {
            SchemaKind::Reference { .. } => 1,
            SchemaKind::Array { items } => items.reference_count(),
            SchemaKind::Object {
                properties,
                additional,
                ..
            } => {
                properties
                    .iter()
                    .map(|(_, s)| s.reference_count())
                    .sum::<usize>()
                    + additional.as_ref().map_or(0, |a| a.reference_count())
            }
            _ => 0,
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        // Serializing into a Value cannot fail: keys are strings and there are no floats.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for TypeSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match &self.kind {
            SchemaKind::String { format } => {
                map.serialize_entry("type", "string")?;
                if let Some(f) = format {
                    map.serialize_entry("format", f)?;
                }
            }
            SchemaKind::Integer { format } => {
                map.serialize_entry("type", "integer")?;
                if let Some(f) = format {
                    map.serialize_entry("format", f)?;
                }
            }
            SchemaKind::Number { format } => {
                map.serialize_entry("type", "number")?;
                if let Some(f) = format {
                    map.serialize_entry("format", f)?;
                }
            }
            SchemaKind::Boolean => map.serialize_entry("type", "boolean")?,
            SchemaKind::Enum { values } => {
                map.serialize_entry("type", "string")?;
                map.serialize_entry("enum", values)?;
            }
            SchemaKind::Array { items } => {
                map.serialize_entry("type", "array")?;
                map.serialize_entry("items", items)?;
            }
            SchemaKind::Object {
                title,
                properties,
                required,
                additional,
            } => {
                map.serialize_entry("type", "object")?;
                if let Some(t) = title {
                    map.serialize_entry("title", t)?;
                }
                if additional.is_none() || !properties.is_empty() {
                    map.serialize_entry("properties", &OrderedProperties(properties))?;
                }
                if !required.is_empty() {
                    map.serialize_entry("required", required)?;
                }
                if let Some(a) = additional {
                    map.serialize_entry("additionalProperties", a)?;
                }
            }
            SchemaKind::Reference { pointer, .. } => {
                map.serialize_entry("$ref", pointer)?;
            }
        }
        if let Some(d) = &self.description {
            map.serialize_entry("description", d)?;
        }
        if self.nullable {
            map.serialize_entry("nullable", &true)?;
        }
        map.end()
    }
}

struct OrderedProperties<'a>(&'a [(String, TypeSchema)]);

impl Serialize for OrderedProperties<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, schema) in self.0 {
            map.serialize_entry(name, schema)?;
        }
        map.end()
    }
}

/// Escape one JSON pointer segment (RFC 6901).
pub(crate) fn pointer_segment(raw: &str) -> String {
    raw.replace('~', "~0").replace('/', "~1")
}

/// Maps type descriptors to schemas.
///
/// Objects currently being expanded are tracked on a stack; meeting one of them
/// again yields a [`SchemaKind::Reference`] to where it is being expanded, so
/// recursive types terminate. The stack is scoped to one top-level call.
#[derive(Debug, Default)]
pub struct TypeSchemaBuilder {
    expanding: Vec<(String, String)>,
}

impl TypeSchemaBuilder {
    pub fn build(ty: &TypeDescriptor) -> Result<TypeSchema> {
        Self::build_at(ty, "#")
    }

    /// Build with `pointer` as the location of the resulting node inside the
    /// enclosing document; reference nodes point relative to it.
    pub fn build_at(ty: &TypeDescriptor, pointer: &str) -> Result<TypeSchema> {
        Self::default().visit(ty, pointer)
    }

    fn visit(&mut self, ty: &TypeDescriptor, pointer: &str) -> Result<TypeSchema> {
        let schema = match ty {
            TypeDescriptor::Nullable(inner) => {
                let mut schema = self.visit(inner, pointer)?;
                schema.nullable = true;
                return Ok(schema);
            }
            TypeDescriptor::Enum(e) => {
                if e.variants.is_empty() {
                    return Err(Error::schema_with_context(
                        format!("enum '{}' has no variants", e.name),
                        ErrorContext::new()
                            .with_field_path(pointer)
                            .with_source("schema_builder"),
                    ));
                }
                TypeSchema::new(SchemaKind::Enum {
                    values: e.variants.clone(),
                })
            }
            TypeDescriptor::String => TypeSchema::new(SchemaKind::String { format: None }),
            TypeDescriptor::DateTime => TypeSchema::new(SchemaKind::String {
                format: Some("date-time"),
            }),
            TypeDescriptor::Uuid => TypeSchema::new(SchemaKind::String {
                format: Some("uuid"),
            }),
            TypeDescriptor::Duration => TypeSchema::new(SchemaKind::String {
                format: Some("duration"),
            }),
            TypeDescriptor::Integer(w) => TypeSchema::new(SchemaKind::Integer {
                format: Some(w.format()),
            }),
            TypeDescriptor::Number(w) => TypeSchema::new(SchemaKind::Number {
                format: Some(w.format()),
            }),
            TypeDescriptor::Boolean => TypeSchema::new(SchemaKind::Boolean),
            TypeDescriptor::Array { item, .. } | TypeDescriptor::Iterable(item) => {
                let items = self.visit(item, &format!("{}/items", pointer))?;
                TypeSchema::new(SchemaKind::Array {
                    items: Box::new(items),
                })
            }
            TypeDescriptor::Map { key, value } => {
                if !is_string_like(key.non_null()) {
                    return Err(Error::schema_with_context(
                        "map keys must be strings",
                        ErrorContext::new()
                            .with_field_path(pointer)
                            .with_details(format!("{:?}", key))
                            .with_source("schema_builder"),
                    ));
                }
                let value = self.visit(value, &format!("{}/additionalProperties", pointer))?;
                TypeSchema::new(SchemaKind::Object {
                    title: None,
                    properties: Vec::new(),
                    required: Vec::new(),
                    additional: Some(Box::new(value)),
                })
            }
            TypeDescriptor::Object(obj) => self.visit_object(obj, pointer)?,
            TypeDescriptor::Any => TypeSchema::empty_object(),
        };
        Ok(schema)
    }

    fn visit_object(&mut self, obj: &ObjectDescriptor, pointer: &str) -> Result<TypeSchema> {
        if obj.name.is_empty() {
            return Err(Error::schema_with_context(
                "structured types need a name",
                ErrorContext::new()
                    .with_field_path(pointer)
                    .with_source("schema_builder"),
            ));
        }
        if let Some((_, at)) = self.expanding.iter().find(|(name, _)| *name == obj.name) {
            return Ok(TypeSchema::new(SchemaKind::Reference {
                name: obj.name.clone(),
                pointer: at.clone(),
            }));
        }

        self.expanding.push((obj.name.clone(), pointer.to_string()));
        let mut properties = Vec::with_capacity(obj.fields.len());
        let mut required = Vec::new();
        for field in &obj.fields {
            let field_ty = (field.ty)();
            let field_pointer = format!("{}/properties/{}", pointer, pointer_segment(&field.name));
            let schema = match self.visit(&field_ty, &field_pointer) {
                Ok(s) => s.with_description(field.description.as_deref()),
                Err(e) => {
                    self.expanding.pop();
                    return Err(e);
                }
            };
            if field.is_required() {
                required.push(field.name.clone());
            }
            properties.push((field.name.clone(), schema));
        }
        self.expanding.pop();

        Ok(TypeSchema::new(SchemaKind::Object {
            title: Some(obj.name.clone()),
            properties,
            required,
            additional: None,
        })
        .with_description(obj.description.as_deref()))
    }
}

fn is_string_like(ty: &TypeDescriptor) -> bool {
    matches!(
        ty,
        TypeDescriptor::String
            | TypeDescriptor::Uuid
            | TypeDescriptor::Enum(_)
    )
}
