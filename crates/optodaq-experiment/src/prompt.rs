//! Operator confirmation contract.

/// Confirmation points of a prompted start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    /// Before the blank reference is captured
    InsertBlank,
    /// After the blank, before the run is started
    ContinueWhenReady,
}

impl PromptKind {
    /// Dialog title.
    pub fn title(self) -> &'static str {
        match self {
            PromptKind::InsertBlank => "Blank",
            PromptKind::ContinueWhenReady => "Continue",
        }
    }

    /// Text shown to the operator.
    pub fn message(self) -> &'static str {
        match self {
            PromptKind::InsertBlank => "Please insert blank",
            PromptKind::ContinueWhenReady => "Continue when ready",
        }
    }
}

impl std::fmt::Display for PromptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

/// Operator's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptResponse {
    /// OK
    Proceed,
    /// Cancel
    Cancel,
}

/// Blocking OK/Cancel dialog provided by the presentation layer.
pub trait OperatorPrompt {
    /// Show `prompt` and wait for the operator.
    fn confirm(&self, prompt: PromptKind) -> PromptResponse;
}

/// Answers every prompt with [`PromptResponse::Proceed`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl OperatorPrompt for AutoConfirm {
    fn confirm(&self, _prompt: PromptKind) -> PromptResponse {
        PromptResponse::Proceed
    }
}
