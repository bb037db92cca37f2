//! Host-side descriptions of native types and callables.
//!
//! Rust has no runtime reflection, so everything exposed to the model is described
//! explicitly: scalar and collection types through [`ToolType`], structs through
//! [`ObjectDescriptor`], functions through [`FunctionDescriptor`].

use crate::{Error, ErrorContext, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, LinkedList, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerWidth {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl IntegerWidth {
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            IntegerWidth::I8 | IntegerWidth::I16 | IntegerWidth::I32 | IntegerWidth::I64
        )
    }

    pub(crate) fn format(self) -> &'static str {
        match self {
            IntegerWidth::I64 | IntegerWidth::U32 | IntegerWidth::U64 => "int64",
            _ => "int32",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberWidth {
    F32,
    F64,
}

impl NumberWidth {
    pub(crate) fn format(self) -> &'static str {
        match self {
            NumberWidth::F32 => "float",
            NumberWidth::F64 => "double",
        }
    }
}

/// Description of a native type.
#[derive(Debug, Clone)]
pub enum TypeDescriptor {
    String,
    Integer(IntegerWidth),
    Number(NumberWidth),
    Boolean,
    DateTime,
    Uuid,
    Duration,
    Enum(EnumDescriptor),
    Nullable(Box<TypeDescriptor>),
    /// Ordered sequence; `len` is set for fixed-size arrays.
    Array {
        item: Box<TypeDescriptor>,
        len: Option<usize>,
    },
    /// Any other homogeneous collection (sets, linked lists).
    Iterable(Box<TypeDescriptor>),
    Map {
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
    Object(ObjectDescriptor),
    /// Arbitrary JSON.
    Any,
}

impl TypeDescriptor {
    pub fn nullable(inner: TypeDescriptor) -> Self {
        TypeDescriptor::Nullable(Box::new(inner))
    }

    pub fn array(item: TypeDescriptor) -> Self {
        TypeDescriptor::Array {
            item: Box::new(item),
            len: None,
        }
    }

    pub fn enumeration<I, S>(name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TypeDescriptor::Enum(EnumDescriptor {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        })
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, TypeDescriptor::Nullable(_))
    }

    /// Strip every `Nullable` layer.
    pub fn non_null(&self) -> &TypeDescriptor {
        match self {
            TypeDescriptor::Nullable(inner) => inner.non_null(),
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    pub name: String,
    /// Variant names exactly as they appear on the wire.
    pub variants: Vec<String>,
}

impl EnumDescriptor {
    /// Canonical variant matching `raw`, ignoring ASCII case.
    pub fn resolve(&self, raw: &str) -> Option<&str> {
        self.variants
            .iter()
            .find(|v| v.eq_ignore_ascii_case(raw))
            .map(String::as_str)
    }
}

/// Field of a structured type. The type is produced lazily so that
/// self-referential structs can be described.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub ty: fn() -> TypeDescriptor,
    pub required: Option<bool>,
}

impl FieldDescriptor {
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or_else(|| !(self.ty)().is_nullable())
    }
}

#[derive(Debug, Clone)]
pub struct ObjectDescriptor {
    /// Type name; also the identity used for cycle detection.
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<FieldDescriptor>,
}

impl ObjectDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field<T: ToolType>(self, name: impl Into<String>) -> Self {
        self.push_field(name.into(), None, T::descriptor, None)
    }

    pub fn field_described<T: ToolType>(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.push_field(name.into(), Some(description.into()), T::descriptor, None)
    }

    /// Field whose required-ness is declared instead of inferred.
    pub fn field_with<T: ToolType>(
        self,
        name: impl Into<String>,
        description: Option<String>,
        required: bool,
    ) -> Self {
        self.push_field(name.into(), description, T::descriptor, Some(required))
    }

    fn push_field(
        mut self,
        name: String,
        description: Option<String>,
        ty: fn() -> TypeDescriptor,
        required: Option<bool>,
    ) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            description,
            ty,
            required,
        });
        self
    }

    pub fn build(self) -> TypeDescriptor {
        TypeDescriptor::Object(self)
    }
}

/// Native types that can appear in a function signature.
///
/// Implement it for your own structs with [`ObjectDescriptor`] and for plain
/// enums with [`TypeDescriptor::enumeration`]. The descriptor must agree with
/// the type's serde representation.
pub trait ToolType {
    fn descriptor() -> TypeDescriptor;
}

macro_rules! scalar_tool_type {
    ($($ty:ty => $desc:expr),* $(,)?) => {
        $(
            impl ToolType for $ty {
                fn descriptor() -> TypeDescriptor {
                    $desc
                }
            }
        )*
    };
}

scalar_tool_type! {
    String => TypeDescriptor::String,
    str => TypeDescriptor::String,
    char => TypeDescriptor::String,
    bool => TypeDescriptor::Boolean,
    i8 => TypeDescriptor::Integer(IntegerWidth::I8),
    i16 => TypeDescriptor::Integer(IntegerWidth::I16),
    i32 => TypeDescriptor::Integer(IntegerWidth::I32),
    i64 => TypeDescriptor::Integer(IntegerWidth::I64),
    isize => TypeDescriptor::Integer(IntegerWidth::I64),
    u8 => TypeDescriptor::Integer(IntegerWidth::U8),
    u16 => TypeDescriptor::Integer(IntegerWidth::U16),
    u32 => TypeDescriptor::Integer(IntegerWidth::U32),
    u64 => TypeDescriptor::Integer(IntegerWidth::U64),
    usize => TypeDescriptor::Integer(IntegerWidth::U64),
    f32 => TypeDescriptor::Number(NumberWidth::F32),
    f64 => TypeDescriptor::Number(NumberWidth::F64),
    chrono::DateTime<chrono::Utc> => TypeDescriptor::DateTime,
    uuid::Uuid => TypeDescriptor::Uuid,
    std::time::Duration => TypeDescriptor::Duration,
    serde_json::Value => TypeDescriptor::Any,
}

impl<T: ToolType> ToolType for Option<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::nullable(T::descriptor())
    }
}

impl<T: ToolType + ?Sized> ToolType for Box<T> {
    fn descriptor() -> TypeDescriptor {
        T::descriptor()
    }
}

impl<T: ToolType> ToolType for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::array(T::descriptor())
    }
}

impl<T: ToolType> ToolType for VecDeque<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::array(T::descriptor())
    }
}

impl<T: ToolType, const N: usize> ToolType for [T; N] {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Array {
            item: Box::new(T::descriptor()),
            len: Some(N),
        }
    }
}

impl<T: ToolType> ToolType for HashSet<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Iterable(Box::new(T::descriptor()))
    }
}

impl<T: ToolType> ToolType for BTreeSet<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Iterable(Box::new(T::descriptor()))
    }
}

impl<T: ToolType> ToolType for LinkedList<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Iterable(Box::new(T::descriptor()))
    }
}

impl<K: ToolType, V: ToolType> ToolType for HashMap<K, V> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Map {
            key: Box::new(K::descriptor()),
            value: Box::new(V::descriptor()),
        }
    }
}

impl<K: ToolType, V: ToolType> ToolType for BTreeMap<K, V> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Map {
            key: Box::new(K::descriptor()),
            value: Box::new(V::descriptor()),
        }
    }
}

/// One parameter of a host function.
#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    /// Name as declared in the host function.
    pub name: String,
    /// Name exposed to the model, when it differs from `name`.
    pub rename: Option<String>,
    pub description: Option<String>,
    pub ty: TypeDescriptor,
    pub default: Option<serde_json::Value>,
    /// Declared required-ness; inferred from the type when absent.
    pub required: Option<bool>,
}

impl ParameterDescriptor {
    pub fn new<T: ToolType>(name: impl Into<String>) -> Self {
        Self::with_type(name, T::descriptor())
    }

    pub fn with_type(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            rename: None,
            description: None,
            ty,
            default: None,
            required: None,
        }
    }

    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.rename = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    /// Externally visible name and description.
    pub fn describe(&self) -> (&str, Option<&str>) {
        (self.schema_name(), self.description.as_deref())
    }

    pub fn schema_name(&self) -> &str {
        self.rename.as_deref().unwrap_or(&self.name)
    }

    /// A declared default or a nullable type makes a parameter optional.
    /// An explicit declaration wins over inference for everything else.
    pub fn is_required(&self) -> bool {
        if self.default.is_some() || self.ty.is_nullable() {
            return false;
        }
        self.required.unwrap_or(true)
    }
}

/// Few-shot example attached to a function schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    pub request: String,
    /// Parameter name/value pairs in declaration order.
    pub params: Vec<(String, String)>,
}

impl Example {
    /// Each entry is `"name:value"`, split on the first colon.
    pub fn parse<I, S>(request: impl Into<String>, params: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let request = request.into();
        let params = params
            .into_iter()
            .map(|entry| {
                let entry = entry.as_ref();
                entry
                    .split_once(':')
                    .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                    .ok_or_else(|| {
                        Error::schema_with_context(
                            format!("example parameter '{}' is not in name:value form", entry),
                            ErrorContext::new()
                                .with_field_path("few_shot_examples")
                                .with_details(request.clone()),
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { request, params })
    }
}

/// Explicit tool annotation: overrides any other naming source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolAnnotation {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Everything the schema generator needs to know about a host function.
#[derive(Debug, Clone)]
pub struct FunctionDescriptor {
    /// The callable's own name.
    pub name: String,
    pub tool: Option<ToolAnnotation>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub parameters: Vec<ParameterDescriptor>,
    pub returns: TypeDescriptor,
    pub examples: Vec<Example>,
}

impl FunctionDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tool: None,
            display_name: None,
            description: None,
            parameters: Vec::new(),
            returns: TypeDescriptor::Any,
            examples: Vec::new(),
        }
    }

    pub fn tool(mut self, name: Option<&str>, description: Option<&str>) -> Self {
        self.tool = Some(ToolAnnotation {
            name: name.map(str::to_string),
            description: description.map(str::to_string),
        });
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn param(mut self, param: ParameterDescriptor) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn returns<T: ToolType>(mut self) -> Self {
        self.returns = T::descriptor();
        self
    }

    pub fn example(mut self, example: Example) -> Self {
        self.examples.push(example);
        self
    }

    /// Schema name: tool annotation, then display name, then the callable name.
    pub fn schema_name(&self) -> &str {
        self.tool
            .as_ref()
            .and_then(|t| t.name.as_deref())
            .or(self.display_name.as_deref())
            .unwrap_or(&self.name)
    }

    pub fn schema_description(&self) -> Option<&str> {
        self.tool
            .as_ref()
            .and_then(|t| t.description.as_deref())
            .or(self.description.as_deref())
    }

    /// Native parameter name to schema property name.
    pub fn args_map(&self) -> Vec<(String, String)> {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.schema_name().to_string()))
            .collect()
    }
}
