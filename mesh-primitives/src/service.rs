use serde_json::Value;

/// Parameters passed to an RPC method: positional (JSON array) or named
/// (JSON object), mirroring the wire shape `{method, params, id}`.
#[derive(Debug, Clone)]
pub enum MethodParams {
    Positional(Vec<Value>),
    Named(serde_json::Map<String, Value>),
}

impl MethodParams {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => MethodParams::Positional(items),
            Value::Object(map) => MethodParams::Named(map),
            other => MethodParams::Positional(vec![other]),
        }
    }
}

/// A registered entry in the method registry: `path = service/method`.
///
/// Invariant: paths are unique; re-registering an existing path (hot
/// reload) logs a warning and overwrites the previous handler.
#[derive(Clone)]
pub struct MethodEntry {
    pub path: String,
    pub public: bool,
    pub description: String,
}

impl MethodEntry {
    pub fn path_for(service: &str, method: &str) -> String {
        format!("{service}/{method}")
    }
}
