use serde_json::Value;

/// A looked-up setting with an explicit absent variant, so call sites
/// never have to probe for property existence themselves.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Absent,
    Scalar(String),
    Json(Value),
}

impl SettingValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, SettingValue::Absent)
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            SettingValue::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

/// Resolve a dotted path (`"editor.font.size"`) inside a JSON document.
pub fn lookup_path(root: &Value, path: &str) -> SettingValue {
    let mut current = root;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return SettingValue::Absent,
        }
    }
    match current {
        Value::Null => SettingValue::Absent,
        Value::String(s) => SettingValue::Scalar(s.clone()),
        Value::Bool(b) => SettingValue::Scalar(b.to_string()),
        Value::Number(n) => SettingValue::Scalar(n.to_string()),
        other => SettingValue::Json(other.clone()),
    }
}

/// Set a dotted path, creating intermediate objects. Non-object
/// intermediates are replaced; this is a write-wins editor surface.
pub fn set_path(root: &mut Value, path: &str, value: Value) {
    let mut current = root;
    let segments: Vec<&str> = path.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        let map = current.as_object_mut().expect("just ensured object");
        if i == segments.len() - 1 {
            map.insert((*segment).to_string(), value);
            return;
        }
        current = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}

/// Remove a dotted path. Returns whether anything was removed; removing an
/// absent path is a no-op.
pub fn remove_path(root: &mut Value, path: &str) -> bool {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = root;
    for segment in &segments[..segments.len() - 1] {
        match current.get_mut(*segment) {
            Some(next) => current = next,
            None => return false,
        }
    }
    current
        .as_object_mut()
        .map(|map| map.remove(segments[segments.len() - 1]).is_some())
        .unwrap_or(false)
}
