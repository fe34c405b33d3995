use crate::config::ProgramConfig;
use crate::types::{ChainEvent, CompiledInstruction, Discriminator};

/// Decides whether a transaction is a mint event of the monitored program
#[derive(Debug, Clone)]
pub struct ProgramMatcher {
    log_signatures: Vec<String>,
    discriminators: Vec<Discriminator>,
}

impl ProgramMatcher {
    pub fn new(config: &ProgramConfig) -> Self {
        Self {
            log_signatures: config.log_signatures.clone(),
            discriminators: config.discriminators.clone(),
        }
    }

    /// True if the instruction data starts with a configured discriminator
    pub fn matches_instruction(&self, ix: &CompiledInstruction) -> bool {
        ix.data.len() >= 8
            && self
                .discriminators
                .iter()
                .any(|disc| ix.data[..8] == disc[..])
    }

    /// First instruction carrying a configured discriminator
    pub fn find_instruction<'a>(
        &self,
        instructions: &'a [CompiledInstruction],
    ) -> Option<&'a CompiledInstruction> {
        instructions.iter().find(|ix| self.matches_instruction(ix))
    }

    /// True if any log line equals a configured signature exactly
    pub fn matches_logs<S: AsRef<str>>(&self, logs: &[S]) -> bool {
        logs.iter()
            .any(|log| self.log_signatures.iter().any(|sig| sig == log.as_ref()))
    }

    /// Either check is sufficient
    pub fn matches(&self, event: &ChainEvent) -> bool {
        self.find_instruction(&event.instructions).is_some() || self.matches_logs(&event.logs)
    }
}
