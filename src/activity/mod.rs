//! 活动日志完整性原语
//! 规范化序列化、脱敏、标识符归一化与哈希链

pub mod canonical;
pub mod chain;
pub mod identity;
pub mod redact;

pub use canonical::{canonicalize, normalize_numbers};
pub use chain::{hash_payload, ChainWalker, Divergence};
pub use identity::normalize;
pub use redact::{redact, REDACTION_MARKER};
