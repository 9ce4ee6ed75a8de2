pub mod attention;

pub use attention::{AttentionConfig, KvCache, SelfAttention};
