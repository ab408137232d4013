//! Engine configuration

/// Resource ceilings for execution. Exceeding either traps with
/// [`TrapKind::CallStackExhausted`](super::TrapKind::CallStackExhausted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of active call frames
    pub max_call_depth: usize,
    /// Maximum number of values on the operand stack, across all frames
    pub max_operand_stack: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_call_depth: 10_000,
            max_operand_stack: 1_048_576,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_operand_stack(mut self, values: usize) -> Self {
        self.max_operand_stack = values;
        self
    }
}
