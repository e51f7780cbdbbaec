//! Anchor constraints
//!
//! A constraint is a pure predicate over a candidate node. A pattern's
//! constraints all have to hold before its trace runs; the first one names
//! the anchor operator type.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::TransformError;
use crate::graph::{AttrValue, Graph, Node};

/// Predicate gating a pattern's anchor node
pub trait Constraint: Send + Sync + fmt::Debug {
    /// Whether `node` satisfies the constraint
    fn check(&self, node: &Node, graph: &Graph) -> bool;
}

/// Node's operator type equals a fixed tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpTypeConstraint {
    op_type: String,
}

impl OpTypeConstraint {
    /// Require operator type `op_type`
    pub fn new(op_type: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
        }
    }

    /// The required operator type
    pub fn op_type(&self) -> &str {
        &self.op_type
    }
}

impl Constraint for OpTypeConstraint {
    fn check(&self, node: &Node, _graph: &Graph) -> bool {
        node.is_op(&self.op_type)
    }
}

/// Comparison applied by [`AttrConstraint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
}

impl Comparator {
    /// Apply to an ordering; `None` (incomparable) never satisfies
    pub fn holds(self, ordering: Option<Ordering>) -> bool {
        let Some(ord) = ordering else {
            return false;
        };
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Ne => ord != Ordering::Equal,
            Self::Gt => ord == Ordering::Greater,
            Self::Lt => ord == Ordering::Less,
            Self::Ge => ord != Ordering::Less,
            Self::Le => ord != Ordering::Greater,
        }
    }

    /// Operator symbol
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }
}

impl FromStr for Comparator {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            ">=" => Ok(Self::Ge),
            "<=" => Ok(Self::Le),
            other => Err(TransformError::Internal(format!(
                "unsupported comparator '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named attribute compares against a literal.
///
/// An absent attribute fails the check instead of erroring.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrConstraint {
    name: String,
    value: AttrValue,
    comparator: Comparator,
}

impl AttrConstraint {
    /// Require `attr <comparator> value`
    pub fn new(name: impl Into<String>, comparator: Comparator, value: impl Into<AttrValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            comparator,
        }
    }

    /// Require `attr == value`
    pub fn equals(name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        Self::new(name, Comparator::Eq, value)
    }
}

impl Constraint for AttrConstraint {
    fn check(&self, node: &Node, _graph: &Graph) -> bool {
        match node.attr(&self.name) {
            Some(actual) => self.comparator.holds(actual.compare(&self.value)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(group: i64) -> Node {
        Node::new("ConvTranspose", "deconv")
            .with_attr("group", group)
            .with_attr("auto_pad", "NOTSET")
    }

    #[test]
    fn test_op_type() {
        let g = Graph::new("g");
        assert!(OpTypeConstraint::new("ConvTranspose").check(&conv(1), &g));
        assert!(!OpTypeConstraint::new("Conv").check(&conv(1), &g));
    }

    #[test]
    fn test_every_comparator() {
        let g = Graph::new("g");
        let node = conv(2);
        let cases = [
            ("==", 2, true),
            ("==", 1, false),
            ("!=", 1, true),
            (">", 1, true),
            (">", 2, false),
            ("<", 3, true),
            (">=", 2, true),
            ("<=", 1, false),
        ];
        for (op, literal, expected) in cases {
            let cmp: Comparator = op.parse().unwrap();
            let c = AttrConstraint::new("group", cmp, literal as i64);
            assert_eq!(c.check(&node, &g), expected, "group {} {}", op, literal);
        }
    }

    #[test]
    fn test_absent_attribute_is_false_not_error() {
        let g = Graph::new("g");
        let c = AttrConstraint::new("dilations", Comparator::Ne, 1i64);
        assert!(!c.check(&conv(1), &g));
    }

    #[test]
    fn test_incomparable_kinds_fail() {
        let g = Graph::new("g");
        assert!(AttrConstraint::equals("auto_pad", "NOTSET").check(&conv(1), &g));
        assert!(!AttrConstraint::new("auto_pad", Comparator::Ne, 0i64).check(&conv(1), &g));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!("=~".parse::<Comparator>().is_err());
        assert_eq!(" >= ".parse::<Comparator>().unwrap(), Comparator::Ge);
        assert_eq!(Comparator::Le.to_string(), "<=");
    }
}
