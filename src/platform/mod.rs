pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

use crate::event::{InlineAnswer, Reply};

/// Outbound delivery seam. Failures are reported to the caller and not
/// retried here; retry policy, if any, lives behind the implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_reply(&self, reply: &Reply) -> Result<()>;

    async fn answer_inline_query(&self, answer: &InlineAnswer) -> Result<()>;
}
