//! Structural parameter schemas for actions.
//!
//! A [`Schema`] validates an untyped JSON value, fills in declared defaults and strips
//! keys an object schema does not know about. Object fields may carry the
//! [`Field::locator`] capability: such fields hold a free-text target description that
//! is exempt from structural validation (see [`normalize_params`]).

use serde_json::{json, Map, Value};

use crate::errors::{ScriptError, ScriptResult};

/// Value substituted for locator fields while the rest of an object is validated.
const LOCATOR_PLACEHOLDER: &str = "__locator_placeholder__";

/// Preprocessing step applied to a present value before the wrapped schema runs.
pub type Preprocess = fn(Value) -> Value;

#[derive(Debug, Clone)]
pub enum Schema {
    String,
    Number,
    /// Whole number, never negative
    Integer,
    Boolean,
    /// Accepts any present value unchanged
    Any,
    /// Closed set of legal string values
    Enum(Vec<String>),
    Array(Box<Schema>),
    Object(Vec<Field>),
    /// Free-form target description: a prompt string or a prompt object
    Locator,
    Optional(Box<Schema>),
    Nullable(Box<Schema>),
    Default(Box<Schema>, Value),
    Effect(Box<Schema>, Preprocess),
    Pipeline(Box<Schema>, Box<Schema>),
    Union(Vec<Schema>),
}

/// One named field of an object schema.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
    pub description: Option<String>,
    /// Marks the field as a locatable target, exempt from structural validation
    pub locatable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            description: None,
            locatable: false,
        }
    }

    /// A field carrying an element location prompt.
    pub fn locator(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: Schema::Locator,
            description: None,
            locatable: true,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.schema = self.schema.optional();
        self
    }
}

impl Schema {
    pub fn string() -> Self {
        Self::String
    }

    pub fn number() -> Self {
        Self::Number
    }

    pub fn integer() -> Self {
        Self::Integer
    }

    pub fn boolean() -> Self {
        Self::Boolean
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(values.into_iter().map(Into::into).collect())
    }

    pub fn array(item: Schema) -> Self {
        Self::Array(Box::new(item))
    }

    pub fn object(fields: impl IntoIterator<Item = Field>) -> Self {
        Self::Object(fields.into_iter().collect())
    }

    pub fn union(members: impl IntoIterator<Item = Schema>) -> Self {
        Self::Union(members.into_iter().collect())
    }

    pub fn optional(self) -> Self {
        Self::Optional(Box::new(self))
    }

    pub fn nullable(self) -> Self {
        Self::Nullable(Box::new(self))
    }

    pub fn default_value(self, value: Value) -> Self {
        Self::Default(Box::new(self), value)
    }

    pub fn preprocess(self, f: Preprocess) -> Self {
        Self::Effect(Box::new(self), f)
    }

    pub fn pipe(self, next: Schema) -> Self {
        Self::Pipeline(Box::new(self), Box::new(next))
    }

    /// Validate `value`, returning the normalized value.
    ///
    /// `None` stands for an absent value; the result is `None` only when the schema
    /// legitimately allows absence and supplies no default.
    pub fn parse(&self, value: Option<&Value>, path: &str) -> ScriptResult<Option<Value>> {
        match self {
            Schema::Optional(inner) => match value {
                None | Some(Value::Null) => Ok(None),
                Some(_) => inner.parse(value, path),
            },
            Schema::Nullable(inner) => match value {
                Some(Value::Null) => Ok(Some(Value::Null)),
                _ => inner.parse(value, path),
            },
            Schema::Default(inner, default) => match value {
                None => inner.parse(Some(default), path),
                Some(_) => inner.parse(value, path),
            },
            Schema::Effect(inner, f) => match value {
                None => inner.parse(None, path),
                Some(v) => {
                    let processed = f(v.clone());
                    inner.parse(Some(&processed), path)
                }
            },
            Schema::Pipeline(first, second) => {
                let intermediate = first.parse(value, path)?;
                second.parse(intermediate.as_ref(), path)
            }
            Schema::Union(members) => {
                let mut last_error = None;
                for member in members {
                    match member.parse(value, path) {
                        Ok(parsed) => return Ok(parsed),
                        Err(e) => last_error = Some(e),
                    }
                }
                Err(last_error.unwrap_or_else(|| {
                    ScriptError::validation(path, "no union member matched")
                }))
            }
            _ => {
                let value = value.ok_or_else(|| ScriptError::validation(path, "Required"))?;
                self.parse_leaf(value, path).map(Some)
            }
        }
    }

    fn parse_leaf(&self, value: &Value, path: &str) -> ScriptResult<Value> {
        match self {
            Schema::String => match value {
                Value::String(_) => Ok(value.clone()),
                other => Err(type_mismatch(path, "string", other)),
            },
            Schema::Number => match value {
                Value::Number(_) => Ok(value.clone()),
                other => Err(type_mismatch(path, "number", other)),
            },
            Schema::Integer => match value {
                Value::Number(n) if n.is_u64() => Ok(value.clone()),
                other => Err(type_mismatch(path, "non-negative integer", other)),
            },
            Schema::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                other => Err(type_mismatch(path, "boolean", other)),
            },
            Schema::Any => Ok(value.clone()),
            Schema::Enum(allowed) => {
                let s = value
                    .as_str()
                    .ok_or_else(|| type_mismatch(path, "string", value))?;
                if allowed.iter().any(|a| a == s) {
                    Ok(value.clone())
                } else {
                    Err(ScriptError::validation(
                        path,
                        format!("expected one of {allowed:?}, received '{s}'"),
                    ))
                }
            }
            Schema::Array(item) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| type_mismatch(path, "array", value))?;
                let mut out = Vec::with_capacity(items.len());
                for (i, v) in items.iter().enumerate() {
                    let parsed = item.parse(Some(v), &format!("{path}[{i}]"))?;
                    out.push(parsed.unwrap_or(Value::Null));
                }
                Ok(Value::Array(out))
            }
            Schema::Object(fields) => {
                let obj = value
                    .as_object()
                    .ok_or_else(|| type_mismatch(path, "object", value))?;
                let mut out = Map::new();
                for field in fields {
                    let field_path = join_path(path, &field.name);
                    if let Some(parsed) = field.schema.parse(obj.get(&field.name), &field_path)? {
                        out.insert(field.name.clone(), parsed);
                    }
                }
                Ok(Value::Object(out))
            }
            Schema::Locator => match value {
                Value::String(_) | Value::Object(_) => Ok(value.clone()),
                other => Err(type_mismatch(path, "locator prompt", other)),
            },
            // wrappers are handled in `parse`
            _ => self.parse(Some(value), path).map(|v| v.unwrap_or(Value::Null)),
        }
    }

    /// Whether the underlying leaf type of this schema accepts a bare string.
    ///
    /// Optional, nullable, default, effect and pipeline layers are looked through; a
    /// union is string-accepting only if every member is.
    pub fn accepts_bare_string(&self) -> bool {
        match self {
            Schema::String | Schema::Enum(_) => true,
            Schema::Optional(inner)
            | Schema::Nullable(inner)
            | Schema::Default(inner, _)
            | Schema::Effect(inner, _)
            | Schema::Pipeline(inner, _) => inner.accepts_bare_string(),
            Schema::Union(members) => {
                !members.is_empty() && members.iter().all(Schema::accepts_bare_string)
            }
            _ => false,
        }
    }

    /// The object fields behind any wrapper layers, if this is an object schema.
    pub fn object_fields(&self) -> Option<&[Field]> {
        match self {
            Schema::Object(fields) => Some(fields),
            Schema::Optional(inner)
            | Schema::Nullable(inner)
            | Schema::Default(inner, _)
            | Schema::Effect(inner, _)
            | Schema::Pipeline(inner, _) => inner.object_fields(),
            _ => None,
        }
    }

    /// Names of all fields marked as locatable.
    pub fn locator_fields(&self) -> Vec<&str> {
        self.object_fields()
            .map(|fields| {
                fields
                    .iter()
                    .filter(|f| f.locatable)
                    .map(|f| f.name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Render the schema as a JSON-Schema-like document for tool listings.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Schema::String => json!({ "type": "string" }),
            Schema::Number => json!({ "type": "number" }),
            Schema::Integer => json!({ "type": "integer", "minimum": 0 }),
            Schema::Boolean => json!({ "type": "boolean" }),
            Schema::Any => json!({}),
            Schema::Enum(values) => json!({ "type": "string", "enum": values }),
            Schema::Array(item) => json!({ "type": "array", "items": item.to_json_schema() }),
            Schema::Locator => json!({ "type": "locator" }),
            Schema::Object(fields) => {
                let mut properties = Map::new();
                let mut required = Vec::new();
                for field in fields {
                    let mut rendered = field.schema.to_json_schema();
                    if let (Some(desc), Some(obj)) = (&field.description, rendered.as_object_mut())
                    {
                        obj.insert("description".to_string(), json!(desc));
                    }
                    if field.schema.is_required() {
                        required.push(field.name.clone());
                    }
                    properties.insert(field.name.clone(), rendered);
                }
                json!({ "type": "object", "properties": properties, "required": required })
            }
            Schema::Optional(inner) | Schema::Effect(inner, _) | Schema::Pipeline(inner, _) => {
                inner.to_json_schema()
            }
            Schema::Nullable(inner) => {
                let mut rendered = inner.to_json_schema();
                if let Some(obj) = rendered.as_object_mut() {
                    obj.insert("nullable".to_string(), json!(true));
                }
                rendered
            }
            Schema::Default(inner, default) => {
                let mut rendered = inner.to_json_schema();
                if let Some(obj) = rendered.as_object_mut() {
                    obj.insert("default".to_string(), default.clone());
                }
                rendered
            }
            Schema::Union(members) => {
                json!({ "anyOf": members.iter().map(Schema::to_json_schema).collect::<Vec<_>>() })
            }
        }
    }

    fn is_required(&self) -> bool {
        match self {
            Schema::Optional(_) | Schema::Default(_, _) => false,
            Schema::Effect(inner, _) | Schema::Pipeline(inner, _) | Schema::Nullable(inner) => {
                inner.is_required()
            }
            _ => true,
        }
    }
}

/// Validate action parameters while exempting locator fields.
///
/// Every present locator field is swapped for a placeholder so the remaining fields are
/// type-checked and defaulted; the original locator values are then put back untouched.
pub fn normalize_params(schema: &Schema, value: &Value) -> ScriptResult<Value> {
    let locator_fields = schema.locator_fields();
    let Some(obj) = value.as_object().filter(|_| !locator_fields.is_empty()) else {
        return Ok(schema.parse(Some(value), "")?.unwrap_or(Value::Null));
    };

    let mut substituted = obj.clone();
    let mut originals = Vec::new();
    for name in locator_fields {
        if let Some(original) = obj.get(name).filter(|v| !v.is_null()) {
            originals.push((name.to_string(), original.clone()));
            substituted.insert(
                name.to_string(),
                json!({ "prompt": LOCATOR_PLACEHOLDER }),
            );
        }
    }

    let mut validated = schema
        .parse(Some(&Value::Object(substituted)), "")?
        .unwrap_or(Value::Null);
    if let Some(out) = validated.as_object_mut() {
        for (name, original) in originals {
            out.insert(name, original);
        }
    }
    Ok(validated)
}

fn join_path(parent: &str, field: &str) -> String {
    if parent.is_empty() {
        field.to_string()
    } else {
        format!("{parent}.{field}")
    }
}

fn type_mismatch(path: &str, expected: &str, received: &Value) -> ScriptError {
    let received = match received {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    let path = if path.is_empty() { "<root>" } else { path };
    ScriptError::validation(path, format!("expected {expected}, received {received}"))
}

/// Preprocess step turning numbers and booleans into their string form.
pub fn stringify_scalar(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        other => other,
    }
}
