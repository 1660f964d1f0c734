//! Apply context passed to reconciler operations.

use crate::diagnostics::Diagnostics;
use crate::value::State;
use linode_api::CancelToken;

/// Context passed to reconciler operations.
///
/// Carries the cancellation token for every outbound call, a collector for
/// warnings, and an optional checkpoint sink that persists partial state.
pub struct ApplyContext<'a> {
    /// Cancellation and deadline for this operation
    pub cancel: CancelToken,
    /// Warnings and errors raised along the way
    pub diags: Diagnostics,
    checkpoint: Option<&'a mut dyn FnMut(&State)>,
}

impl<'a> ApplyContext<'a> {
    /// Create a context without a checkpoint sink
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            diags: Diagnostics::new(),
            checkpoint: None,
        }
    }

    /// Create a context that reports checkpoints to `sink`
    pub fn with_checkpoint(cancel: CancelToken, sink: &'a mut dyn FnMut(&State)) -> Self {
        Self {
            cancel,
            diags: Diagnostics::new(),
            checkpoint: Some(sink),
        }
    }

    /// Persist partial state.
    ///
    /// Create implementations call this with the new ID as soon as the cloud
    /// has assigned one, so a later failure cannot orphan the resource.
    pub fn checkpoint(&mut self, state: &State) {
        log::debug!("Checkpointing state with id {:?}", state.str("id"));
        if let Some(sink) = self.checkpoint.as_mut() {
            sink(state);
        }
    }

    /// Record a warning
    pub fn warn(&mut self, summary: impl Into<String>) {
        let summary = summary.into();
        log::warn!("{summary}");
        self.diags.warning(summary);
    }

    /// Take the collected diagnostics
    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_reaches_sink() {
        let mut seen = Vec::new();
        let mut sink = |state: &State| seen.push(state.str("id").map(ToString::to_string));
        {
            let mut ctx = ApplyContext::with_checkpoint(CancelToken::new(), &mut sink);
            ctx.checkpoint(&State::new().with("id", "42"));
        }
        assert_eq!(seen, vec![Some("42".to_string())]);
    }

    #[test]
    fn test_checkpoint_without_sink_is_noop() {
        let mut ctx = ApplyContext::new(CancelToken::new());
        ctx.checkpoint(&State::new().with("id", "1"));
        assert!(ctx.diags.is_empty());
    }

    #[test]
    fn test_warn_collects() {
        let mut ctx = ApplyContext::new(CancelToken::new());
        ctx.warn("something odd");
        let diags = ctx.take_diagnostics();
        assert_eq!(diags.len(), 1);
        assert!(ctx.diags.is_empty());
    }
}
