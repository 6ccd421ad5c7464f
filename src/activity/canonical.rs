//! 规范化 JSON 序列化
//!
//! 输出即每条活动记录的哈希输入，写入与校验必须共用同一个函数。
//! 各层对象键按 UTF-8 字节序排序，数组保持原顺序，标量沿用 serde_json
//! 的格式（与区域设置无关），不输出多余空白。

use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;

/// 序列化为规范形式
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// 先转成 JSON 值再规范化
pub fn canonicalize_serialize<T: Serialize>(value: &T) -> Result<String, AppError> {
    let value = serde_json::to_value(value)?;
    Ok(canonicalize(&value))
}

/// 超过该量级的浮点数由 serde_json 以指数形式输出
const EXPONENT_THRESHOLD: f64 = 1e16;

/// 规整浮点数，使其经 JSONB 存取后文本不变
///
/// JSONB 没有负零，`-0.0` 读回为 `0.0`；指数形式的整值浮点数读回为整数。
/// 两者在哈希前统一改写为整数。
pub fn normalize_numbers(value: Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => normalize_float(f).unwrap_or(Value::Number(n)),
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| (key, normalize_numbers(item)))
                .collect(),
        ),
        other => other,
    }
}

fn normalize_float(f: f64) -> Option<Value> {
    if f == 0.0 {
        return f.is_sign_negative().then(|| Value::from(0));
    }
    if f.fract() != 0.0 || f.abs() < EXPONENT_THRESHOLD {
        return None;
    }
    // 只改写整数类型能精确表示的范围，更大的值读回后仍是同一个 f64
    if f > 0.0 && f < 18_446_744_073_709_551_616.0 {
        Some(Value::from(f as u64))
    } else if f < 0.0 && f >= -9_223_372_036_854_775_808.0 {
        Some(Value::from(f as i64))
    } else {
        None
    }
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // serde_json 的 Map 在开启 preserve_order 时保留插入顺序，这里显式排序
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(item, out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    // 字符串转义沿用 serde_json，保证与标准 JSON 编码一致
    out.push_str(&serde_json::to_string(s).unwrap_or_default());
}
