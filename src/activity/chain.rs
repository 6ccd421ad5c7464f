//! 哈希链：记录哈希与链接校验
//!
//! `hash_self = sha256(canonicalize(payload))`，payload 为除 `id`、`at`、
//! `hash_prev`、`hash_self` 之外的全部字段。链接只靠 `hash_prev`：
//! 按 `(at, id)` 顺序，每条记录保存前一条的 `hash_self`，首条为空。

use sha2::{Digest, Sha256};

use crate::{
    activity::canonical::canonicalize_serialize,
    error::AppError,
    models::activity::{ActivityEvent, ActivityPayload},
};

/// 规范化 payload 的 SHA-256（小写十六进制）
pub fn hash_payload(payload: &ActivityPayload) -> Result<String, AppError> {
    let canonical = canonicalize_serialize(payload)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

/// 校验失败原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Divergence {
    /// 重新计算的哈希与存储的 `hash_self` 不一致
    SelfHash { expected: String, stored: String },
    /// `hash_prev` 未指向前一条记录
    Linkage { expected: Option<String>, stored: Option<String> },
}

/// 增量校验器，按 `(at, id)` 升序逐条输入
#[derive(Debug, Default)]
pub struct ChainWalker {
    expected_prev: Option<String>,
    checked: i64,
}

impl ChainWalker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已通过的记录数
    pub fn checked(&self) -> i64 {
        self.checked
    }

    /// 校验下一条记录。通过则前进；失败时保持原位，
    /// `checked()` 即分叉位置
    pub fn check(&mut self, event: &ActivityEvent) -> Result<Option<Divergence>, AppError> {
        let recomputed = hash_payload(&event.payload())?;
        if recomputed != event.hash_self {
            return Ok(Some(Divergence::SelfHash {
                expected: recomputed,
                stored: event.hash_self.clone(),
            }));
        }

        if event.hash_prev != self.expected_prev {
            return Ok(Some(Divergence::Linkage {
                expected: self.expected_prev.clone(),
                stored: event.hash_prev.clone(),
            }));
        }

        self.expected_prev = Some(event.hash_self.clone());
        self.checked += 1;
        Ok(None)
    }
}
