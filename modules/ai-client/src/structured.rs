use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

/// Trait for types that can be requested as schema-validated structured output.
///
/// Automatically implemented for any type that implements `JsonSchema +
/// DeserializeOwned`. Both provider backends need the same normalized shape:
/// `additionalProperties: false`, every property (including `Option<T>`
/// ones) listed in `required`, and no `$ref` indirection — so the schema
/// massaging lives here once instead of per-provider.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    fn json_schema() -> serde_json::Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        fix_object_schemas(&mut value);
        inline_refs(&mut value);

        if let serde_json::Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        value
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn fix_object_schemas(value: &mut serde_json::Value) {
    if let serde_json::Value::Object(map) = value {
        if map.get("type") == Some(&serde_json::Value::String("object".to_string())) {
            map.insert("additionalProperties".to_string(), serde_json::Value::Bool(false));

            if let Some(serde_json::Value::Object(props)) = map.get("properties") {
                let all_keys: Vec<serde_json::Value> =
                    props.keys().map(|k| serde_json::Value::String(k.clone())).collect();
                map.insert("required".to_string(), serde_json::Value::Array(all_keys));
            }
        }

        for (_, v) in map.iter_mut() {
            fix_object_schemas(v);
        }
    } else if let serde_json::Value::Array(arr) = value {
        for item in arr.iter_mut() {
            fix_object_schemas(item);
        }
    }
}

fn inline_refs(value: &mut serde_json::Value) {
    let definitions = if let serde_json::Value::Object(map) = value {
        map.get("definitions").cloned()
    } else {
        None
    };

    if let Some(defs) = definitions {
        inline_refs_recursive(value, &defs);
    }
}

fn inline_refs_recursive(value: &mut serde_json::Value, definitions: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(ref_path)) = map.get("$ref").cloned() {
                if ref_path.starts_with("#/definitions/") {
                    let type_name = ref_path.trim_start_matches("#/definitions/");
                    if let Some(def) = definitions.get(type_name) {
                        *value = def.clone();
                        inline_refs_recursive(value, definitions);
                        return;
                    }
                }
            }

            if let Some(serde_json::Value::Array(all_of)) = map.get("allOf").cloned() {
                if all_of.len() == 1 {
                    *value = all_of.into_iter().next().unwrap();
                    inline_refs_recursive(value, definitions);
                    return;
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs_recursive(v, definitions);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                inline_refs_recursive(item, definitions);
            }
        }
        _ => {}
    }
}

/// A repair instruction appended to the user message on the one retry
/// `complete_structured` gets after an invalid/unparseable first response.
pub(crate) fn repair_instruction(type_name: &str, parse_error: &str) -> String {
    format!(
        "Your previous response could not be parsed as valid `{type_name}` JSON \
         ({parse_error}). Respond again with ONLY a JSON object matching the \
         required schema — no prose, no markdown fences."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct Contact {
        phone: Option<String>,
        email: Option<String>,
        name: String,
    }

    #[test]
    fn all_properties_required_including_optional() {
        let schema = Contact::json_schema();
        let obj = schema.as_object().unwrap();
        assert!(!obj.contains_key("definitions"));

        let required: Vec<&str> = obj
            .get("required")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(required.contains(&"phone"));
        assert!(required.contains(&"email"));
        assert!(required.contains(&"name"));
    }

    #[derive(Deserialize, JsonSchema)]
    struct Inner {
        value: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    struct Outer {
        inner: Inner,
        title: String,
    }

    #[test]
    fn nested_struct_is_inlined_not_refd() {
        let schema = Outer::json_schema();
        let obj = schema.as_object().unwrap();
        assert!(!obj.contains_key("definitions"));

        let properties = obj.get("properties").unwrap().as_object().unwrap();
        let inner = properties.get("inner").unwrap().as_object().unwrap();
        assert!(!inner.contains_key("$ref"));
        assert_eq!(
            inner.get("type"),
            Some(&serde_json::Value::String("object".to_string()))
        );
    }
}
