//! Shaping loose invocation parameters to a tool's declared input schema.

use serde_json::{Map, Value};

use crate::error::McpError;

/// Key used when a scalar has no obvious home in the schema.
pub const FALLBACK_INPUT_KEY: &str = "input";

/// Read-only view over a tool's JSON Schema.
#[derive(Debug, Clone, Copy)]
pub struct ToolSchema<'a> {
    schema: &'a Value,
}

impl<'a> ToolSchema<'a> {
    pub fn new(schema: &'a Value) -> Self {
        Self { schema }
    }

    pub fn properties(&self) -> Option<&'a Map<String, Value>> {
        self.schema.get("properties").and_then(Value::as_object)
    }

    pub fn required(&self) -> Vec<&'a str> {
        self.schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Declared `type` of a property, if any.
    pub fn property_type(&self, name: &str) -> Option<&'a str> {
        self.properties()
            .and_then(|props| props.get(name))
            .and_then(|prop| prop.get("type"))
            .and_then(Value::as_str)
    }

    /// Where a bare scalar goes: the only required property, else `input`.
    fn scalar_key(&self) -> String {
        match self.required().as_slice() {
            [only] => only.to_string(),
            _ => FALLBACK_INPUT_KEY.to_string(),
        }
    }

    /// Shape `parameters` into an argument object for this schema.
    ///
    /// Scalars are wrapped, string values are coerced to declared
    /// integer/number/boolean types (and scalars to declared strings), and
    /// missing required properties are reported.
    pub fn marshal(&self, parameters: Value) -> Result<Value, McpError> {
        let mut arguments = match parameters {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            scalar => {
                let mut map = Map::new();
                map.insert(self.scalar_key(), scalar);
                map
            }
        };

        for (name, value) in arguments.iter_mut() {
            if let Some(declared) = self.property_type(name) {
                coerce(value, declared);
            }
        }

        let missing: Vec<&str> = self
            .required()
            .into_iter()
            .filter(|name| !arguments.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            return Err(McpError::InvalidArguments(format!(
                "missing required {}: {}",
                if missing.len() == 1 { "property" } else { "properties" },
                missing.join(", ")
            )));
        }

        Ok(Value::Object(arguments))
    }
}

fn coerce(value: &mut Value, declared: &str) {
    let coerced = match (declared, &*value) {
        ("integer", Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        ("number", Value::String(s)) => s.trim().parse::<f64>().ok().map(Value::from),
        ("boolean", Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        ("string", Value::Number(n)) => Some(Value::String(n.to_string())),
        ("string", Value::Bool(b)) => Some(Value::String(b.to_string())),
        _ => None,
    };
    if let Some(coerced) = coerced {
        *value = coerced;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn search_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "jql": {"type": "string"},
                "maxResults": {"type": "integer"},
                "fields": {"type": "array"}
            },
            "required": ["jql"]
        })
    }

    #[test]
    fn test_scalar_goes_to_single_required_property() {
        let schema = search_schema();
        let args = ToolSchema::new(&schema).marshal(json!("project = KAN")).unwrap();
        assert_eq!(args, json!({"jql": "project = KAN"}));
    }

    #[test]
    fn test_scalar_without_single_required_uses_input() {
        let schema = json!({"type": "object", "properties": {}});
        let args = ToolSchema::new(&schema).marshal(json!(42)).unwrap();
        assert_eq!(args, json!({"input": 42}));
    }

    #[test]
    fn test_string_values_are_coerced() {
        let schema = json!({
            "type": "object",
            "properties": {
                "maxResults": {"type": "integer"},
                "ratio": {"type": "number"},
                "archived": {"type": "boolean"},
                "issueIdOrKey": {"type": "string"}
            }
        });
        let args = ToolSchema::new(&schema)
            .marshal(json!({
                "maxResults": "20",
                "ratio": "0.5",
                "archived": "false",
                "issueIdOrKey": 7,
                "extra": "kept"
            }))
            .unwrap();
        assert_eq!(
            args,
            json!({
                "maxResults": 20,
                "ratio": 0.5,
                "archived": false,
                "issueIdOrKey": "7",
                "extra": "kept"
            })
        );
    }

    #[test]
    fn test_unparseable_values_are_left_alone() {
        let schema = search_schema();
        let args = ToolSchema::new(&schema)
            .marshal(json!({"jql": "x", "maxResults": "lots"}))
            .unwrap();
        assert_eq!(args["maxResults"], "lots");
    }

    #[test]
    fn test_missing_required_is_reported() {
        let schema = search_schema();
        let err = ToolSchema::new(&schema).marshal(Value::Null).unwrap_err();
        assert!(matches!(err, McpError::InvalidArguments(_)));
        assert!(err.to_string().contains("jql"));
    }
}
