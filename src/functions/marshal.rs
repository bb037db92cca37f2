//! Conversion of model-supplied JSON arguments into native values.

use super::descriptor::{IntegerWidth, NumberWidth, ParameterDescriptor, TypeDescriptor};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// A marshalled argument, typed according to its descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Uuid(Uuid),
    Duration(Duration),
    /// Canonical variant name.
    Enum(String),
    List(Vec<NativeValue>),
    /// Struct fields or map entries, in declaration / arrival order.
    Object(Vec<(String, NativeValue)>),
    /// Untyped JSON for `Any` parameters.
    Json(Value),
}

impl NativeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, NativeValue::Null)
    }

    /// JSON in the shape serde expects for the native type.
    pub fn to_json(&self) -> Value {
        match self {
            NativeValue::Null => Value::Null,
            NativeValue::Bool(b) => Value::Bool(*b),
            NativeValue::Int(i) => Value::from(*i),
            NativeValue::UInt(u) => Value::from(*u),
            NativeValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            NativeValue::String(s) | NativeValue::Enum(s) => Value::String(s.clone()),
            NativeValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            NativeValue::Uuid(u) => Value::String(u.to_string()),
            NativeValue::Duration(d) => {
                serde_json::json!({"secs": d.as_secs(), "nanos": d.subsec_nanos()})
            }
            NativeValue::List(items) => Value::Array(items.iter().map(NativeValue::to_json).collect()),
            NativeValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
            NativeValue::Json(v) => v.clone(),
        }
    }
}

/// Positional arguments for one invocation.
#[derive(Debug, Clone)]
pub struct Arguments {
    function: String,
    names: Vec<String>,
    values: Vec<NativeValue>,
    raw: Value,
}

impl Arguments {
    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[NativeValue] {
        &self.values
    }

    /// Arguments exactly as the model sent them.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn value(&self, index: usize) -> Option<&NativeValue> {
        self.values.get(index)
    }

    /// Extract the argument at `index` as `T`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let parameter = self
            .names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("#{}", index));
        let value = self.values.get(index).ok_or_else(|| Error::ArgumentConversion {
            function: self.function.clone(),
            parameter: parameter.clone(),
            arguments: self.raw.clone(),
            message: format!("no argument at position {}", index),
        })?;
        serde_json::from_value(value.to_json()).map_err(|e| Error::ArgumentConversion {
            function: self.function.clone(),
            parameter,
            arguments: self.raw.clone(),
            message: e.to_string(),
        })
    }
}

pub struct ArgumentMarshaller;

impl ArgumentMarshaller {
    /// Convert `arguments` into one native value per declared parameter.
    ///
    /// `args_map` maps native parameter names to schema property names. A missing
    /// or null argument takes the parameter's default, else the type's zero value.
    pub fn marshal(
        function: &str,
        arguments: &Value,
        parameters: &[ParameterDescriptor],
        args_map: &[(String, String)],
    ) -> Result<Arguments> {
        let object = normalize(function, arguments)?;
        let ctx = Ctx {
            function,
            raw: &object,
        };
        let fields = object.as_object();

        let mut values = Vec::with_capacity(parameters.len());
        for param in parameters {
            let property = args_map
                .iter()
                .find(|(native, _)| *native == param.name)
                .map(|(_, schema)| schema.as_str())
                .unwrap_or_else(|| param.schema_name());

            let supplied = fields.and_then(|f| f.get(property)).filter(|v| !v.is_null());
            let value = match (supplied, &param.default) {
                (Some(v), _) => ctx.convert(v, &param.ty, property)?,
                (None, Some(default)) => ctx.convert(default, &param.ty, property)?,
                (None, None) => zero_value(&param.ty),
            };
            values.push(value);
        }

        debug!(function, arguments = values.len(), "marshalled arguments");
        Ok(Arguments {
            function: function.to_string(),
            names: parameters.iter().map(|p| p.schema_name().to_string()).collect(),
            values,
            raw: object,
        })
    }
}

/// Arguments arrive as an object, occasionally as a JSON-encoded string of one.
fn normalize(function: &str, arguments: &Value) -> Result<Value> {
    match arguments {
        Value::Object(_) => Ok(arguments.clone()),
        Value::Null => Ok(Value::Object(Map::new())),
        Value::String(s) if s.trim().is_empty() => Ok(Value::Object(Map::new())),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v @ Value::Object(_)) => Ok(v),
            _ => Err(not_an_object(function, arguments)),
        },
        _ => Err(not_an_object(function, arguments)),
    }
}

fn not_an_object(function: &str, arguments: &Value) -> Error {
    Error::ArgumentConversion {
        function: function.to_string(),
        parameter: "arguments".to_string(),
        arguments: arguments.clone(),
        message: "arguments must be a JSON object".to_string(),
    }
}

/// Value used for an absent argument without a default.
fn zero_value(ty: &TypeDescriptor) -> NativeValue {
    zero_value_within(ty, &mut Vec::new())
}

/// `expanding` holds the objects being zeroed; a recursive field stays null.
fn zero_value_within(ty: &TypeDescriptor, expanding: &mut Vec<String>) -> NativeValue {
    match ty {
        TypeDescriptor::Integer(w) if w.is_signed() => NativeValue::Int(0),
        TypeDescriptor::Integer(_) => NativeValue::UInt(0),
        TypeDescriptor::Number(_) => NativeValue::Float(0.0),
        TypeDescriptor::Boolean => NativeValue::Bool(false),
        TypeDescriptor::String => NativeValue::String(String::new()),
        TypeDescriptor::DateTime => NativeValue::DateTime(DateTime::<Utc>::default()),
        TypeDescriptor::Uuid => NativeValue::Uuid(Uuid::nil()),
        TypeDescriptor::Duration => NativeValue::Duration(Duration::ZERO),
        TypeDescriptor::Enum(e) => e
            .variants
            .first()
            .map_or(NativeValue::Null, |v| NativeValue::Enum(v.clone())),
        TypeDescriptor::Array { item, len: Some(n) } => {
            NativeValue::List((0..*n).map(|_| zero_value_within(item, expanding)).collect())
        }
        TypeDescriptor::Array { len: None, .. } | TypeDescriptor::Iterable(_) => {
            NativeValue::List(Vec::new())
        }
        TypeDescriptor::Map { .. } => NativeValue::Object(Vec::new()),
        TypeDescriptor::Object(obj) if !expanding.contains(&obj.name) => {
            expanding.push(obj.name.clone());
            let fields = obj
                .fields
                .iter()
                .map(|f| (f.name.clone(), zero_value_within(&(f.ty)(), expanding)))
                .collect();
            expanding.pop();
            NativeValue::Object(fields)
        }
        TypeDescriptor::Nullable(_) | TypeDescriptor::Object(_) | TypeDescriptor::Any => {
            NativeValue::Null
        }
    }
}

struct Ctx<'a> {
    function: &'a str,
    raw: &'a Value,
}

impl Ctx<'_> {
    fn fail(&self, path: &str, message: impl Into<String>) -> Error {
        Error::ArgumentConversion {
            function: self.function.to_string(),
            parameter: path.to_string(),
            arguments: self.raw.clone(),
            message: message.into(),
        }
    }

    fn mismatch(&self, path: &str, expected: &str, got: &Value) -> Error {
        self.fail(path, format!("expected {}, got {}", expected, kind_of(got)))
    }

    fn convert(&self, value: &Value, ty: &TypeDescriptor, path: &str) -> Result<NativeValue> {
        if value.is_null() {
            return Ok(match ty {
                TypeDescriptor::Nullable(_) | TypeDescriptor::Any => NativeValue::Null,
                other => zero_value(other),
            });
        }

        match ty {
            TypeDescriptor::Nullable(inner) => self.convert(value, inner, path),
            TypeDescriptor::Any => Ok(NativeValue::Json(value.clone())),
            TypeDescriptor::String => value
                .as_str()
                .map(|s| NativeValue::String(s.to_string()))
                .ok_or_else(|| self.mismatch(path, "string", value)),
            TypeDescriptor::Boolean => value
                .as_bool()
                .map(NativeValue::Bool)
                .ok_or_else(|| self.mismatch(path, "boolean", value)),
            TypeDescriptor::Integer(width) => match value {
                Value::Number(n) => Ok(narrow_integer(n, *width)),
                _ => Err(self.mismatch(path, "integer", value)),
            },
            TypeDescriptor::Number(width) => match value.as_f64() {
                Some(f) => Ok(NativeValue::Float(match width {
                    NumberWidth::F32 => f as f32 as f64,
                    NumberWidth::F64 => f,
                })),
                None => Err(self.mismatch(path, "number", value)),
            },
            TypeDescriptor::DateTime => {
                let s = value
                    .as_str()
                    .ok_or_else(|| self.mismatch(path, "date-time string", value))?;
                parse_date_time(s)
                    .map(NativeValue::DateTime)
                    .ok_or_else(|| self.fail(path, format!("'{}' is not a date-time", s)))
            }
            TypeDescriptor::Uuid => {
                let s = value
                    .as_str()
                    .ok_or_else(|| self.mismatch(path, "uuid string", value))?;
                Uuid::parse_str(s)
                    .map(NativeValue::Uuid)
                    .map_err(|e| self.fail(path, e.to_string()))
            }
            TypeDescriptor::Duration => parse_duration(value)
                .map(NativeValue::Duration)
                .ok_or_else(|| self.fail(path, format!("{} is not a duration", value))),
            TypeDescriptor::Enum(e) => {
                let s = value
                    .as_str()
                    .ok_or_else(|| self.mismatch(path, "enum name", value))?;
                e.resolve(s)
                    .map(|v| NativeValue::Enum(v.to_string()))
                    .ok_or_else(|| {
                        self.fail(
                            path,
                            format!("'{}' is not one of {}: {:?}", s, e.name, e.variants),
                        )
                    })
            }
            TypeDescriptor::Array { item, len } => {
                let items = value
                    .as_array()
                    .ok_or_else(|| self.mismatch(path, "array", value))?;
                if let Some(expected) = len {
                    if items.len() != *expected {
                        return Err(self.fail(
                            path,
                            format!("expected {} elements, got {}", expected, items.len()),
                        ));
                    }
                }
                self.convert_items(items, item, path)
            }
            TypeDescriptor::Iterable(item) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| self.mismatch(path, "array", value))?;
                self.convert_items(items, item, path)
            }
            TypeDescriptor::Map { value: value_ty, .. } => {
                let entries = value
                    .as_object()
                    .ok_or_else(|| self.mismatch(path, "object", value))?;
                entries
                    .iter()
                    .map(|(k, v)| {
                        self.convert(v, value_ty, &format!("{}.{}", path, k))
                            .map(|nv| (k.clone(), nv))
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(NativeValue::Object)
            }
            TypeDescriptor::Object(obj) => {
                let entries = value
                    .as_object()
                    .ok_or_else(|| self.mismatch(path, "object", value))?;
                let mut fields = Vec::with_capacity(obj.fields.len());
                for field in &obj.fields {
                    let field_ty = (field.ty)();
                    let field_path = format!("{}.{}", path, field.name);
                    let converted = match entries.get(&field.name) {
                        Some(v) => self.convert(v, &field_ty, &field_path)?,
                        None => zero_value(&field_ty),
                    };
                    fields.push((field.name.clone(), converted));
                }
                Ok(NativeValue::Object(fields))
            }
        }
    }

    fn convert_items(&self, items: &[Value], item: &TypeDescriptor, path: &str) -> Result<NativeValue> {
        items
            .iter()
            .enumerate()
            .map(|(i, v)| self.convert(v, item, &format!("{}[{}]", path, i)))
            .collect::<Result<Vec<_>>>()
            .map(NativeValue::List)
    }
}

/// Native `as` semantics: fractions truncate, out-of-range values wrap.
fn narrow_integer(n: &Number, width: IntegerWidth) -> NativeValue {
    let signed = n
        .as_i64()
        .or_else(|| n.as_u64().map(|u| u as i64))
        .or_else(|| n.as_f64().map(|f| f as i64))
        .unwrap_or_default();
    let unsigned = n
        .as_u64()
        .or_else(|| n.as_i64().map(|i| i as u64))
        .or_else(|| n.as_f64().map(|f| f as u64))
        .unwrap_or_default();
    match width {
        IntegerWidth::I8 => NativeValue::Int(signed as i8 as i64),
        IntegerWidth::I16 => NativeValue::Int(signed as i16 as i64),
        IntegerWidth::I32 => NativeValue::Int(signed as i32 as i64),
        IntegerWidth::I64 => NativeValue::Int(signed),
        IntegerWidth::U8 => NativeValue::UInt(unsigned as u8 as u64),
        IntegerWidth::U16 => NativeValue::UInt(unsigned as u16 as u64),
        IntegerWidth::U32 => NativeValue::UInt(unsigned as u32 as u64),
        IntegerWidth::U64 => NativeValue::UInt(unsigned),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn parse_date_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// `[d.]hh:mm:ss[.fffffff]`
static CLOCK_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d+)\.)?(\d{1,2}):(\d{2}):(\d{2})(?:\.(\d{1,9}))?$")
        .expect("fail to create the clock duration pattern")
});

/// ISO 8601 `PnDTnHnMnS`
static ISO_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$")
        .expect("fail to create the iso duration pattern")
});

fn parse_duration(value: &Value) -> Option<Duration> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .and_then(|f| Duration::try_from_secs_f64(f).ok()),
        Value::Object(o) => {
            let secs = o.get("secs")?.as_u64()?;
            let nanos = o.get("nanos").and_then(Value::as_u64).unwrap_or(0);
            Duration::from_secs(secs).checked_add(Duration::from_nanos(nanos))
        }
        Value::String(s) => parse_duration_str(s.trim()),
        _ => None,
    }
}

fn parse_duration_str(s: &str) -> Option<Duration> {
    let num = |m: Option<regex::Match<'_>>| -> Option<u64> {
        m.map_or(Some(0), |m| m.as_str().parse().ok())
    };

    if let Some(c) = CLOCK_DURATION.captures(s) {
        let (days, hours, minutes, seconds) = (
            num(c.get(1))?,
            num(c.get(2))?,
            num(c.get(3))?,
            num(c.get(4))?,
        );
        if minutes > 59 || seconds > 59 {
            return None;
        }
        let nanos = match c.get(5) {
            Some(frac) => {
                let digits = frac.as_str();
                let padded = format!("{:0<9}", digits);
                padded.parse::<u32>().ok()?
            }
            None => 0,
        };
        let secs = clock_seconds(days, hours, minutes)?.checked_add(seconds)?;
        return Some(Duration::new(secs, nanos));
    }

    if let Some(c) = ISO_DURATION.captures(s) {
        if s == "P" || s.ends_with('T') {
            return None;
        }
        let whole = clock_seconds(num(c.get(1))?, num(c.get(2))?, num(c.get(3))?)?;
        let fractional = match c.get(4) {
            Some(m) => Duration::try_from_secs_f64(m.as_str().parse::<f64>().ok()?).ok()?,
            None => Duration::ZERO,
        };
        return Duration::from_secs(whole).checked_add(fractional);
    }

    None
}

/// Days, hours and minutes in seconds; `None` on overflow.
fn clock_seconds(days: u64, hours: u64, minutes: u64) -> Option<u64> {
    days.checked_mul(86_400)?
        .checked_add(hours.checked_mul(3_600)?)?
        .checked_add(minutes.checked_mul(60)?)
}
