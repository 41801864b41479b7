//! Per-call logging context
//!
//! Carries the optional trace id and component name that decorate each log line.

use uuid::Uuid;

/// Caller-supplied context for a log call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogContext {
    trace_id: Option<String>,
    component: Option<String>,
}

impl LogContext {
    /// Create an empty context (no trace id, default component)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with a freshly generated trace id
    pub fn new_trace() -> Self {
        Self::new().with_trace_id(Uuid::new_v4().to_string())
    }

    /// Set the trace id
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Set the component name
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Trace id, if present and non-empty
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref().filter(|t| !t.is_empty())
    }

    /// Component name, if present and non-empty
    pub fn component(&self) -> Option<&str> {
        self.component.as_deref().filter(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context() {
        let ctx = LogContext::new();
        assert_eq!(ctx.trace_id(), None);
        assert_eq!(ctx.component(), None);
    }

    #[test]
    fn test_new_trace_generates_unique_ids() {
        let a = LogContext::new_trace();
        let b = LogContext::new_trace();
        assert!(a.trace_id().is_some());
        assert_ne!(a.trace_id(), b.trace_id());
    }

    #[test]
    fn test_empty_strings_are_absent() {
        let ctx = LogContext::new().with_trace_id("").with_component("");
        assert_eq!(ctx.trace_id(), None);
        assert_eq!(ctx.component(), None);
    }

    #[test]
    fn test_builder() {
        let ctx = LogContext::new().with_trace_id("T1").with_component("C1");
        assert_eq!(ctx.trace_id(), Some("T1"));
        assert_eq!(ctx.component(), Some("C1"));
    }
}
