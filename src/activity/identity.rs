//! 标识符归一化
//!
//! 规范标识符为带连字符分组的十六进制（UUID 文本形式）。
//! 其余输入映射为基于名称的 UUID（MD5 派生），同一原始字符串总得到同一标识符。
//! 用于跨子系统关联记录足够，但 MD5 不抗碰撞，派生 id 不可作为凭据使用。

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

static CANONICAL_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("canonical id pattern is valid")
});

/// 非规范输入派生标识符所用的命名空间
pub const DERIVED_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_2c8a_4b3e_4d7f_9a10_5e2b_c3d4_e5f6);

pub fn is_canonical(id: &str) -> bool {
    CANONICAL_ID.is_match(id)
}

/// 映射为规范标识符，规范输入原样返回
pub fn normalize(id: &str) -> String {
    if is_canonical(id) {
        return id.to_string();
    }
    Uuid::new_v3(&DERIVED_ID_NAMESPACE, id.as_bytes()).to_string()
}

pub fn normalize_opt(id: Option<&str>) -> Option<String> {
    id.map(normalize)
}
