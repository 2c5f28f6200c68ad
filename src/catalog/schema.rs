use serde_json::{Map, Value};

/// Rewrites parameter property schemas before they are embedded in a tool payload
pub trait PropertyCaster: Send + Sync {
    fn cast(&self, properties: Map<String, Value>) -> Map<String, Value>;
}

/// Leaves properties untouched
pub struct Verbatim;

impl PropertyCaster for Verbatim {
    fn cast(&self, properties: Map<String, Value>) -> Map<String, Value> {
        properties
    }
}

/// Maps loose, language-flavoured type names onto OpenAPI schema types
pub struct OpenApiCaster;

impl PropertyCaster for OpenApiCaster {
    fn cast(&self, properties: Map<String, Value>) -> Map<String, Value> {
        cast_properties(properties)
    }
}

const FLOAT_NOTE: &str = " This is a float type value.";

fn openapi_type(loose: &str) -> &'static str {
    match loose {
        "integer" | "byte" | "short" | "long" | "Bigint" => "integer",
        "number" | "float" | "double" => "number",
        "boolean" | "bool" => "boolean",
        "array" | "list" | "tuple" | "ArrayList" | "Array" | "Queue" | "Stack" => "array",
        "object" | "dict" | "HashMap" | "Hashtable" => "object",
        // string, char, any, Any and everything unknown
        _ => "string",
    }
}

fn cast_properties(properties: Map<String, Value>) -> Map<String, Value> {
    properties
        .into_iter()
        .map(|(key, schema)| (key, cast_schema(schema)))
        .collect()
}

fn cast_schema(schema: Value) -> Value {
    let Value::Object(mut schema) = schema else {
        return schema;
    };

    let loose = schema
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let mapped = match loose.as_deref() {
        Some("float") => {
            schema.insert("format".into(), Value::String("float".into()));
            match schema.get_mut("description") {
                Some(Value::String(description)) => description.push_str(FLOAT_NOTE),
                _ => {
                    schema.insert(
                        "description".into(),
                        Value::String(FLOAT_NOTE.trim_start().into()),
                    );
                }
            }
            "number"
        }
        Some(loose) => openapi_type(loose),
        None => "string",
    };
    schema.insert("type".into(), Value::String(mapped.into()));

    if mapped == "array" || mapped == "object" {
        if let Some(Value::Object(nested)) = schema.get_mut("properties") {
            *nested = cast_properties(std::mem::take(nested));
        } else if let Some(items) = schema.get_mut("items") {
            *items = cast_schema(items.take());
        }
    }

    Value::Object(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cast(value: Value) -> Value {
        let Value::Object(properties) = value else {
            panic!("expected object");
        };
        Value::Object(OpenApiCaster.cast(properties))
    }

    #[test]
    fn test_cast_dict_and_missing_type() {
        let result = cast(json!({
            "options": {"type": "dict", "description": "Options"},
            "label": {"description": "No type given"}
        }));
        assert_eq!(result["options"]["type"], "object");
        assert_eq!(result["label"]["type"], "string");
    }

    #[test]
    fn test_cast_float_adds_format_and_note() {
        let result = cast(json!({
            "ratio": {"type": "float", "description": "Mixing ratio."}
        }));
        assert_eq!(result["ratio"]["type"], "number");
        assert_eq!(result["ratio"]["format"], "float");
        assert_eq!(
            result["ratio"]["description"],
            "Mixing ratio. This is a float type value."
        );
    }

    #[test]
    fn test_cast_nested_items_and_properties() {
        let result = cast(json!({
            "points": {"type": "tuple", "items": {"type": "list", "items": {"type": "double"}}},
            "config": {"type": "HashMap", "properties": {"depth": {"type": "long"}}}
        }));
        assert_eq!(result["points"]["type"], "array");
        assert_eq!(result["points"]["items"]["type"], "array");
        assert_eq!(result["points"]["items"]["items"]["type"], "number");
        assert_eq!(result["config"]["type"], "object");
        assert_eq!(result["config"]["properties"]["depth"]["type"], "integer");
    }

    #[test]
    fn test_cast_unknown_type_becomes_string() {
        let result = cast(json!({"when": {"type": "LocalDate"}}));
        assert_eq!(result["when"]["type"], "string");
    }

    #[test]
    fn test_verbatim_keeps_properties() {
        let properties = json!({"n": {"type": "float"}});
        let Value::Object(map) = properties.clone() else {
            panic!("expected object");
        };
        assert_eq!(Value::Object(Verbatim.cast(map)), properties);
    }
}
