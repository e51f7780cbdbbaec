//! Pattern registry
//!
//! An explicit, priority-ordered list of patterns built once at startup
//! and handed to the [`Matcher`](super::Matcher) by reference.

use tracing::debug;

use crate::error::{OnnxResult, TransformError};

use super::matcher::Pattern;
use super::patterns::{
    AttentionPattern, ConvBnPattern, ConvTransposeBnPattern, LayerNormPattern, LogDivPattern,
};

/// Patterns sorted by descending priority; ties keep registration order
#[derive(Debug, Default)]
pub struct PatternRegistry {
    patterns: Vec<Box<dyn Pattern>>,
}

impl PatternRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in pattern
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let defaults: [Box<dyn Pattern>; 5] = [
            Box::new(ConvBnPattern::new()),
            Box::new(ConvTransposeBnPattern::new()),
            Box::new(LayerNormPattern::new()),
            Box::new(AttentionPattern::new()),
            Box::new(LogDivPattern::new()),
        ];
        for pattern in defaults {
            registry.insert(pattern);
        }
        registry
    }

    /// Add a pattern; names must be unique
    pub fn register(&mut self, pattern: impl Pattern + 'static) -> OnnxResult<()> {
        if self.get(pattern.name()).is_some() {
            return Err(TransformError::Internal(format!(
                "pattern '{}' is already registered",
                pattern.name()
            )));
        }
        self.insert(Box::new(pattern));
        Ok(())
    }

    fn insert(&mut self, pattern: Box<dyn Pattern>) {
        debug!(
            pattern = pattern.name(),
            priority = pattern.priority(),
            "Registered pattern"
        );
        self.patterns.push(pattern);
        // Stable: equal priorities keep registration order.
        self.patterns.sort_by_key(|p| std::cmp::Reverse(p.priority()));
    }

    /// Patterns in match order
    pub fn patterns(&self) -> &[Box<dyn Pattern>] {
        &self.patterns
    }

    /// Number of registered patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no pattern is registered
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Pattern by name
    pub fn get(&self, name: &str) -> Option<&dyn Pattern> {
        self.patterns
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, NodeId};
    use crate::pattern::constraint::Constraint;
    use crate::pattern::{ops, MatchResult};

    #[derive(Debug)]
    struct Dummy(&'static str, i32);

    impl Pattern for Dummy {
        fn name(&self) -> &str {
            self.0
        }
        fn priority(&self) -> i32 {
            self.1
        }
        fn constraints(&self) -> &[Box<dyn Constraint>] {
            &[]
        }
        fn trace(&self, _graph: &Graph, _anchor: NodeId) -> Option<MatchResult> {
            None
        }
    }

    #[test]
    fn test_sorted_by_priority_then_registration() {
        let mut registry = PatternRegistry::new();
        registry.register(Dummy("a", 1)).unwrap();
        registry.register(Dummy("b", 5)).unwrap();
        registry.register(Dummy("c", 1)).unwrap();
        registry.register(Dummy("d", 5)).unwrap();

        let names: Vec<_> = registry.patterns().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = PatternRegistry::new();
        registry.register(Dummy("a", 1)).unwrap();
        assert!(registry.register(Dummy("a", 2)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_defaults() {
        let registry = PatternRegistry::with_defaults();
        assert_eq!(registry.len(), 5);
        for name in [
            ops::CONV_BN,
            ops::CONV_TRANSPOSE_BN,
            ops::LAYER_NORM,
            ops::CUSTOM_ATTENTION,
            ops::LOG_DIV,
        ] {
            assert!(registry.get(name).is_some(), "missing {}", name);
        }
        assert!(registry.get("nope").is_none());
    }
}
