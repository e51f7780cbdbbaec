//! Nodes and typed attributes
//!
//! [`Node`] is the decoded form of a `NodeProto`: attributes become
//! [`AttrValue`]s in an ordered map so lookups are typed and export keeps
//! the original attribute order.

use std::cmp::Ordering;
use std::fmt;

use indexmap::{IndexMap, IndexSet};

use crate::proto::attribute_proto::AttributeType;
use crate::proto::{AttributeProto, GraphProto, NodeProto, StringStringEntryProto, TensorProto};

/// Stable handle to a node in a [`Graph`](super::Graph) arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Arena slot
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Typed attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Scalar float
    Float(f32),
    /// Scalar int
    Int(i64),
    /// UTF-8 string
    String(String),
    /// Dense constant tensor
    Tensor(Box<TensorProto>),
    /// Float list
    Floats(Vec<f32>),
    /// Int list
    Ints(Vec<i64>),
    /// Anything else (subgraphs, string lists, non-UTF-8 strings), kept
    /// verbatim for export
    Other(Box<AttributeProto>),
}

impl AttrValue {
    /// Decode an attribute, honouring its declared type
    pub fn from_proto(attr: &AttributeProto) -> Self {
        match attr.kind() {
            AttributeType::Float => Self::Float(attr.f),
            AttributeType::Int => Self::Int(attr.i),
            AttributeType::String => match std::str::from_utf8(&attr.s) {
                Ok(s) => Self::String(s.to_string()),
                Err(_) => Self::Other(Box::new(attr.clone())),
            },
            AttributeType::Tensor => match &attr.t {
                Some(t) => Self::Tensor(Box::new(t.clone())),
                None => Self::Other(Box::new(attr.clone())),
            },
            AttributeType::Floats => Self::Floats(attr.floats.clone()),
            AttributeType::Ints => Self::Ints(attr.ints.clone()),
            _ => Self::Other(Box::new(attr.clone())),
        }
    }

    /// Encode under `name`
    pub fn to_proto(&self, name: &str) -> AttributeProto {
        match self {
            Self::Float(v) => AttributeProto::new_float(name, *v),
            Self::Int(v) => AttributeProto::new_int(name, *v),
            Self::String(v) => AttributeProto::new_string(name, v),
            Self::Tensor(t) => AttributeProto::new_tensor(name, (**t).clone()),
            Self::Floats(v) => AttributeProto::new_floats(name, v.clone()),
            Self::Ints(v) => AttributeProto::new_ints(name, v.clone()),
            Self::Other(a) => AttributeProto {
                name: name.to_string(),
                ..(**a).clone()
            },
        }
    }

    /// Order two values of compatible kinds.
    ///
    /// Int and Float compare numerically with each other; lists compare
    /// lexicographically. Incompatible kinds, tensors and NaN yield `None`.
    pub fn compare(&self, other: &AttrValue) -> Option<Ordering> {
        use AttrValue::*;
        match (self, other) {
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(&f64::from(*b)),
            (Float(a), Int(b)) => f64::from(*a).partial_cmp(&(*b as f64)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (String(a), String(b)) => Some(a.cmp(b)),
            (Ints(a), Ints(b)) => Some(a.cmp(b)),
            (Floats(a), Floats(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        Self::Ints(v)
    }
}

impl From<TensorProto> for AttrValue {
    fn from(v: TensorProto) -> Self {
        Self::Tensor(Box::new(v))
    }
}

/// One operator instance
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    /// Node name, unique within a graph
    pub name: String,
    /// Operator type tag
    pub op_type: String,
    /// Operator domain, empty for the default ONNX domain
    pub domain: String,
    /// Positional input tensor names; empty strings mark omitted optionals
    pub inputs: Vec<String>,
    /// Positional output tensor names
    pub outputs: Vec<String>,
    /// Attributes in declaration order
    pub attributes: IndexMap<String, AttrValue>,
    /// Free-form documentation carried through export
    pub doc_string: String,
    /// Function overload selector
    pub overload: String,
    /// Key/value metadata carried through export
    pub metadata_props: Vec<StringStringEntryProto>,
}

impl Node {
    /// Create a node with no edges
    pub fn new(op_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the input tensors
    pub fn with_inputs<S: AsRef<str>>(mut self, inputs: &[S]) -> Self {
        self.inputs = inputs.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Set the output tensors
    pub fn with_outputs<S: AsRef<str>>(mut self, outputs: &[S]) -> Self {
        self.outputs = outputs.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Add or replace an attribute
    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Set the operator domain
    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_string();
        self
    }

    /// Decode from protobuf
    pub fn from_proto(proto: &NodeProto) -> Self {
        Self {
            name: proto.name.clone(),
            op_type: proto.op_type.clone(),
            domain: proto.domain.clone(),
            inputs: proto.input.clone(),
            outputs: proto.output.clone(),
            attributes: proto
                .attribute
                .iter()
                .map(|a| (a.name.clone(), AttrValue::from_proto(a)))
                .collect(),
            doc_string: proto.doc_string.clone(),
            overload: proto.overload.clone(),
            metadata_props: proto.metadata_props.clone(),
        }
    }

    /// Encode to protobuf
    pub fn to_proto(&self) -> NodeProto {
        NodeProto {
            name: self.name.clone(),
            op_type: self.op_type.clone(),
            domain: self.domain.clone(),
            input: self.inputs.clone(),
            output: self.outputs.clone(),
            attribute: self
                .attributes
                .iter()
                .map(|(k, v)| v.to_proto(k))
                .collect(),
            doc_string: self.doc_string.clone(),
            overload: self.overload.clone(),
            metadata_props: self.metadata_props.clone(),
        }
    }

    /// Whether this node has operator type `op_type`
    pub fn is_op(&self, op_type: &str) -> bool {
        self.op_type == op_type
    }

    /// Input at `slot`, `None` if absent or omitted
    pub fn input(&self, slot: usize) -> Option<&str> {
        self.inputs.get(slot).map(String::as_str).filter(|s| !s.is_empty())
    }

    /// Output at `slot`, `None` if absent or omitted
    pub fn output(&self, slot: usize) -> Option<&str> {
        self.outputs.get(slot).map(String::as_str).filter(|s| !s.is_empty())
    }

    /// Tensors read from the enclosing graph by subgraph attributes
    /// (`If` branches, `Loop`/`Scan` bodies), in first-use order
    pub fn implicit_inputs(&self) -> Vec<&str> {
        let mut refs = IndexSet::new();
        for value in self.attributes.values() {
            if let AttrValue::Other(attr) = value {
                for body in attr.g.iter().chain(&attr.graphs) {
                    outer_references(body, &mut refs);
                }
            }
        }
        refs.into_iter().collect()
    }

    /// Every tensor this node reads, explicit inputs first, each listed once
    pub fn consumed_tensors(&self) -> Vec<&str> {
        let mut all: IndexSet<&str> = self
            .inputs
            .iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        all.extend(self.implicit_inputs());
        all.into_iter().collect()
    }

    /// Non-empty outputs
    pub fn live_outputs(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(String::as_str).filter(|s| !s.is_empty())
    }

    /// Attribute by name
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// Integer attribute
    pub fn attr_int(&self, name: &str) -> Option<i64> {
        match self.attr(name)? {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float attribute
    pub fn attr_float(&self, name: &str) -> Option<f32> {
        match self.attr(name)? {
            AttrValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Int list attribute
    pub fn attr_ints(&self, name: &str) -> Option<&[i64]> {
        match self.attr(name)? {
            AttrValue::Ints(v) => Some(v),
            _ => None,
        }
    }

    /// Tensor attribute
    pub fn attr_tensor(&self, name: &str) -> Option<&TensorProto> {
        match self.attr(name)? {
            AttrValue::Tensor(t) => Some(t),
            _ => None,
        }
    }
}

/// Collect names `body` reads without defining them itself.
///
/// Nested subgraphs are walked too; their free names resolve against
/// `body` first.
fn outer_references<'a>(body: &'a GraphProto, refs: &mut IndexSet<&'a str>) {
    let mut local: IndexSet<&str> = IndexSet::new();
    local.extend(body.input.iter().map(|vi| vi.name.as_str()));
    local.extend(body.initializer.iter().map(|t| t.name.as_str()));
    local.extend(
        body.sparse_initializer
            .iter()
            .filter_map(|sp| sp.values.as_ref())
            .map(|t| t.name.as_str()),
    );
    local.extend(body.node.iter().flat_map(|n| n.output.iter().map(String::as_str)));

    let mut free: IndexSet<&str> = IndexSet::new();
    for node in &body.node {
        free.extend(node.input.iter().map(String::as_str));
        for attr in &node.attribute {
            for nested in attr.g.iter().chain(&attr.graphs) {
                outer_references(nested, &mut free);
            }
        }
    }
    free.extend(body.output.iter().map(|vi| vi.name.as_str()));

    refs.extend(
        free.into_iter()
            .filter(|name| !name.is_empty() && !local.contains(name)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::extensions::make_node;

    #[test]
    fn test_node_proto_round_trip() {
        let mut proto = make_node("ConvTranspose", &["X", "W", ""], &["Y"], "deconv_0");
        proto.attribute.push(AttributeProto::new_int("group", 2));
        proto.attribute.push(AttributeProto::new_ints("strides", vec![2, 2]));
        proto.attribute.push(AttributeProto::new_string("auto_pad", "NOTSET"));

        let node = Node::from_proto(&proto);
        assert_eq!(node.attr_int("group"), Some(2));
        assert_eq!(node.attr_ints("strides"), Some(&[2, 2][..]));
        assert_eq!(node.attr("auto_pad"), Some(&AttrValue::String("NOTSET".to_string())));
        assert_eq!(node.input(2), None);
        assert_eq!(node.to_proto(), proto);
    }

    #[test]
    fn test_typed_lookup_does_not_coerce() {
        let node = Node::new("LayerNormalization", "ln").with_attr("epsilon", 1e-5f32);
        assert_eq!(node.attr_float("epsilon"), Some(1e-5));
        assert_eq!(node.attr_int("epsilon"), None);
        assert_eq!(node.attr_int("axis"), None);
    }

    #[test]
    fn test_compare_mixed_numeric() {
        let two = AttrValue::Int(2);
        assert_eq!(two.compare(&AttrValue::Float(2.0)), Some(Ordering::Equal));
        assert_eq!(two.compare(&AttrValue::Int(3)), Some(Ordering::Less));
        assert_eq!(two.compare(&AttrValue::from("2")), None);
        assert_eq!(AttrValue::Float(f32::NAN).compare(&AttrValue::Float(1.0)), None);
    }

    #[test]
    fn test_other_attribute_survives_export() {
        let attr = AttributeProto {
            name: "body".to_string(),
            r#type: AttributeType::Graph as i32,
            g: Some(Default::default()),
            ..Default::default()
        };
        let value = AttrValue::from_proto(&attr);
        assert!(matches!(value, AttrValue::Other(_)));
        assert_eq!(value.to_proto("body"), attr);
    }

    fn branch(name: &str, reads: &str, local_input: Option<&str>) -> GraphProto {
        let mut body = GraphProto {
            name: name.to_string(),
            node: vec![make_node("Identity", &[reads], &["r"], "id")],
            output: vec![crate::proto::make_tensor_value_info("r", 1, &[1])],
            ..Default::default()
        };
        if let Some(input) = local_input {
            body.input
                .push(crate::proto::make_tensor_value_info(input, 1, &[1]));
        }
        body
    }

    fn graph_attr(name: &str, body: GraphProto) -> AttributeProto {
        AttributeProto {
            name: name.to_string(),
            r#type: AttributeType::Graph as i32,
            g: Some(body),
            ..Default::default()
        }
    }

    #[test]
    fn test_implicit_inputs_from_branches() {
        let mut proto = make_node("If", &["cond"], &["y"], "if_0");
        proto.attribute.push(graph_attr("then_branch", branch("then", "t", None)));
        proto.attribute.push(graph_attr("else_branch", branch("else", "t", None)));
        let node = Node::from_proto(&proto);

        assert_eq!(node.implicit_inputs(), vec!["t"]);
        assert_eq!(node.consumed_tensors(), vec!["cond", "t"]);
    }

    #[test]
    fn test_subgraph_locals_are_not_implicit() {
        let mut proto = make_node("Loop", &["n", "", "s0"], &["s"], "loop_0");
        let mut body = branch("body", "iter_in", Some("iter_in"));
        // A nested If reading both a body local and an outer tensor.
        let mut nested = make_node("If", &["c"], &["z"], "inner");
        nested
            .attribute
            .push(graph_attr("then_branch", branch("then", "iter_in", None)));
        nested
            .attribute
            .push(graph_attr("else_branch", branch("else", "outer", None)));
        body.node.push(nested);
        proto.attribute.push(graph_attr("body", body));

        let node = Node::from_proto(&proto);
        assert_eq!(node.implicit_inputs(), vec!["c", "outer"]);
    }

    #[test]
    fn test_non_utf8_string_kept_verbatim() {
        let attr = AttributeProto {
            name: "blob".to_string(),
            r#type: AttributeType::String as i32,
            s: vec![0xff, 0xfe, b'a'],
            ..Default::default()
        };
        let value = AttrValue::from_proto(&attr);
        assert!(matches!(value, AttrValue::Other(_)));
        assert_eq!(value.to_proto("blob"), attr);
    }

    #[test]
    fn test_node_metadata_round_trip() {
        let mut proto = make_node("Relu", &["x"], &["y"], "relu");
        proto.overload = "v2".to_string();
        proto.metadata_props.push(StringStringEntryProto {
            key: "origin".to_string(),
            value: "export".to_string(),
        });
        assert_eq!(Node::from_proto(&proto).to_proto(), proto);
    }
}
