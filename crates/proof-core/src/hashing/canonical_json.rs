//! Canonical JSON de manifests: forma normal determinista previa al hashing.
//!
//! Reglas:
//! - Todo string (valor) se normaliza a NFC, recursivamente.
//! - Las claves de objetos se ordenan por code point y se usan tal cual.
//! - El orden de los arrays se conserva: es semánticamente significativo.
//! - Sin espacios entre tokens; números, booleanos y null sin cambios.
//!   Los números conservan su texto original (serde_json con
//!   `arbitrary_precision`): enteros fuera del rango de f64 no colisionan.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use unicode_normalization::UnicodeNormalization;

/// Serializa un `Value` a su representación canónica (ver reglas del módulo).
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(&nfc(s)),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let mut tree = BTreeMap::new();
            for (k, v) in map {
                tree.insert(k, to_canonical_json(v));
            }
            let items: Vec<String> = tree
                .into_iter()
                .map(|(k, v)| format!("{}:{}", quote(k), v))
                .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

/// Bytes UTF-8 de la forma canónica; es el input exacto del digest.
pub fn canonicalize(value: &Value) -> Vec<u8> {
    to_canonical_json(value).into_bytes()
}

/// `true` si ambos documentos comparten forma canónica byte a byte.
pub fn canonical_equal(a: &Value, b: &Value) -> bool {
    canonicalize(a) == canonicalize(b)
}

/// Copia del documento con strings normalizados a NFC (no reordena nada).
/// El input no se modifica.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(nfc(s)),
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize).collect()),
        Value::Object(map) => {
            let out: Map<String, Value> = map.iter().map(|(k, v)| (k.clone(), sanitize(v))).collect();
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn nfc(s: &str) -> String {
    s.nfc().collect()
}

// Escapado JSON mínimo (el mismo de serde_json): sin escapar no-ASCII.
fn quote(s: &str) -> String {
    Value::String(s.to_owned()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primitives() {
        assert_eq!(to_canonical_json(&json!(null)), "null");
        assert_eq!(to_canonical_json(&json!(true)), "true");
        assert_eq!(to_canonical_json(&json!(123)), "123");
        assert_eq!(to_canonical_json(&json!(-4.5)), "-4.5");
        assert_eq!(to_canonical_json(&json!("hola")), "\"hola\"");
    }

    #[test]
    fn test_array_order_preserved() {
        let val = json!([3, "a", false]);
        assert_eq!(to_canonical_json(&val), "[3,\"a\",false]");
        assert_ne!(canonicalize(&json!({"x": [1, 2]})), canonicalize(&json!({"x": [2, 1]})));
    }

    #[test]
    fn test_object_sorted_keys() {
        let val = json!({ "b": 2, "a": 1 });
        assert_eq!(to_canonical_json(&val), "{\"a\":1,\"b\":2}");
    }

    #[test]
    fn test_nested() {
        let val = json!({ "z": [ { "y": "yes" }, null ], "a": { "x": 10 } });
        assert_eq!(to_canonical_json(&val), "{\"a\":{\"x\":10},\"z\":[{\"y\":\"yes\"},null]}");
    }

    #[test]
    fn decomposed_and_composed_accents_canonicalize_identically() {
        let decomposed = json!({"b": ["e\u{0301}", "x"], "a": "cafe\u{0301}"});
        let composed = json!({"a": "caf\u{e9}", "b": ["\u{e9}", "x"]});
        assert_eq!(canonicalize(&decomposed), canonicalize(&composed));
        assert!(canonical_equal(&decomposed, &composed));
        assert_eq!(to_canonical_json(&composed), "{\"a\":\"café\",\"b\":[\"é\",\"x\"]}");
    }

    #[test]
    fn control_chars_are_escaped_non_ascii_kept() {
        assert_eq!(to_canonical_json(&json!("a\nb\u{1}ñ")), "\"a\\nb\\u0001ñ\"");
    }

    #[test]
    fn sanitize_does_not_mutate_input() {
        let input = json!({"k": "cafe\u{0301}"});
        let before = input.clone();
        let out = sanitize(&input);
        assert_eq!(input, before);
        assert_eq!(out, json!({"k": "caf\u{e9}"}));
    }
}
