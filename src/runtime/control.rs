//! Labels for structured control flow
//!
//! A label is pushed when execution enters a `block`, `loop` or `if`, and
//! records where a branch to it continues and how much of the operand
//! stack survives. Branching truncates the stack to the label's height and
//! re-pushes the label's arity worth of values.

/// Type of label construct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    /// Branches target the end of the block
    Block,
    /// Branches target the beginning of the loop and keep the label
    Loop,
    /// Either arm of an `if`; behaves like a block
    If,
}

/// A label on the label stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    pub kind: LabelKind,
    /// Values carried by a branch: the block's results, or a loop's params
    pub arity: usize,
    /// Operand stack height below the block's parameters
    pub height: usize,
    /// Instruction a branch to this label continues at
    pub continuation: usize,
}

impl Label {
    pub fn new(kind: LabelKind, arity: usize, height: usize, continuation: usize) -> Self {
        Label {
            kind,
            arity,
            height,
            continuation,
        }
    }

    /// A branch to a loop re-enters it, so its label stays in place
    pub fn kept_on_branch(&self) -> bool {
        self.kind == LabelKind::Loop
    }
}
