//! 自由格式元数据的敏感字段脱敏

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// 被脱敏值的替代标记
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// 敏感字段名匹配（大小写不敏感，子串匹配）
static SENSITIVE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|passwd|secret|token|authorization|auth|api[_-]?key|card|ssn)")
        .expect("sensitive key pattern is valid")
});

/// 键名是否指向不允许落库的字段
pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEY.is_match(key)
}

/// 递归地将敏感键的值替换为 [`REDACTION_MARKER`]，数组逐元素处理
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::with_capacity(map.len());
            for (key, item) in map {
                let item = if is_sensitive_key(key) {
                    Value::String(REDACTION_MARKER.to_string())
                } else {
                    redact(item)
                };
                redacted.insert(key.clone(), item);
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}
