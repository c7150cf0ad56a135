use async_trait::async_trait;

use crate::view::Turn;

use super::types::{SummarizerError, SummarizerTurn};

/// The external collaborator driven by the compaction worker. One async
/// method, following the `#[async_trait]`-on-a-trait shape used across this
/// corpus for provider adapters with a single request/response method.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce one turn of the distillation protocol.
    ///
    /// `tools` names the operations available this turn (`create_distillation`,
    /// `finish_distillation`); `history_turns` is the current view, exactly as
    /// it would be replayed to the agent.
    async fn generate_distillation_turn(
        &self,
        system_prompt: &str,
        history_turns: &[Turn],
        tools: &[&str],
    ) -> Result<SummarizerTurn, SummarizerError>;
}
