//! Extension methods for ONNX protobuf types
//!
//! Provides constructors and typed accessors over the raw messages.

use super::onnx::*;

// ============================================================================
// ModelProto extensions
// ============================================================================

impl ModelProto {
    /// Get the opset version for the default domain
    pub fn opset_version(&self) -> Option<i64> {
        self.opset_import
            .iter()
            .find(|op| op.domain.is_empty() || op.domain == "ai.onnx")
            .map(|op| op.version)
    }
}

// ============================================================================
// ValueInfoProto extensions
// ============================================================================

impl ValueInfoProto {
    /// Shape dimensions, `None` for each dimension that is symbolic or unset.
    ///
    /// Returns `None` overall when no shape is recorded.
    pub fn dims(&self) -> Option<Vec<Option<i64>>> {
        let shape = self.tensor_type()?.shape.as_ref()?;
        Some(
            shape
                .dim
                .iter()
                .map(|d| match &d.value {
                    Some(tensor_shape_proto::dimension::Value::DimValue(v)) if *v >= 0 => Some(*v),
                    _ => None,
                })
                .collect(),
        )
    }

    /// Get the element type if this is a tensor type
    pub fn elem_type(&self) -> Option<i32> {
        Some(self.tensor_type()?.elem_type)
    }

    fn tensor_type(&self) -> Option<&type_proto::Tensor> {
        match self.r#type.as_ref()?.value.as_ref()? {
            type_proto::Value::TensorType(tensor) => Some(tensor),
            _ => None,
        }
    }
}

// ============================================================================
// AttributeProto extensions
// ============================================================================

impl AttributeProto {
    /// Create a new integer attribute
    pub fn new_int(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            i: value,
            r#type: attribute_proto::AttributeType::Int as i32,
            ..Default::default()
        }
    }

    /// Create a new float attribute
    pub fn new_float(name: &str, value: f32) -> Self {
        Self {
            name: name.to_string(),
            f: value,
            r#type: attribute_proto::AttributeType::Float as i32,
            ..Default::default()
        }
    }

    /// Create a new string attribute
    pub fn new_string(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            s: value.as_bytes().to_vec(),
            r#type: attribute_proto::AttributeType::String as i32,
            ..Default::default()
        }
    }

    /// Create a new ints attribute
    pub fn new_ints(name: &str, values: Vec<i64>) -> Self {
        Self {
            name: name.to_string(),
            ints: values,
            r#type: attribute_proto::AttributeType::Ints as i32,
            ..Default::default()
        }
    }

    /// Create a new floats attribute
    pub fn new_floats(name: &str, values: Vec<f32>) -> Self {
        Self {
            name: name.to_string(),
            floats: values,
            r#type: attribute_proto::AttributeType::Floats as i32,
            ..Default::default()
        }
    }

    /// Create a new tensor attribute
    pub fn new_tensor(name: &str, value: TensorProto) -> Self {
        Self {
            name: name.to_string(),
            t: Some(value),
            r#type: attribute_proto::AttributeType::Tensor as i32,
            ..Default::default()
        }
    }

    /// Attribute kind, inferring it from the populated field when `type` is unset.
    ///
    /// Older exporters leave `type` at zero.
    pub fn kind(&self) -> attribute_proto::AttributeType {
        use attribute_proto::AttributeType as A;
        match A::try_from(self.r#type) {
            Ok(A::Undefined) | Err(_) => {
                if self.t.is_some() {
                    A::Tensor
                } else if self.g.is_some() {
                    A::Graph
                } else if self.sparse_tensor.is_some() {
                    A::SparseTensor
                } else if self.tp.is_some() {
                    A::TypeProto
                } else if !self.tensors.is_empty() {
                    A::Tensors
                } else if !self.graphs.is_empty() {
                    A::Graphs
                } else if !self.floats.is_empty() {
                    A::Floats
                } else if !self.ints.is_empty() {
                    A::Ints
                } else if !self.strings.is_empty() {
                    A::Strings
                } else if !self.s.is_empty() {
                    A::String
                } else if self.f != 0.0 {
                    A::Float
                } else {
                    A::Int
                }
            }
            Ok(kind) => kind,
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Create a new ValueInfoProto for a tensor; negative dims become symbolic
pub fn make_tensor_value_info(name: &str, elem_type: i32, shape: &[i64]) -> ValueInfoProto {
    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type,
                shape: Some(TensorShapeProto {
                    dim: shape
                        .iter()
                        .map(|&d| tensor_shape_proto::Dimension {
                            value: Some(if d >= 0 {
                                tensor_shape_proto::dimension::Value::DimValue(d)
                            } else {
                                tensor_shape_proto::dimension::Value::DimParam("N".to_string())
                            }),
                            denotation: String::new(),
                        })
                        .collect(),
                }),
            })),
            denotation: String::new(),
        }),
        ..Default::default()
    }
}

/// Create a new NodeProto
pub fn make_node(op_type: &str, inputs: &[&str], outputs: &[&str], name: &str) -> NodeProto {
    NodeProto {
        op_type: op_type.to_string(),
        input: inputs.iter().map(|s| s.to_string()).collect(),
        output: outputs.iter().map(|s| s.to_string()).collect(),
        name: name.to_string(),
        ..Default::default()
    }
}

/// Wrap `graph` in a model importing the default domain at `opset`
pub fn make_model(graph: GraphProto, opset: i64) -> ModelProto {
    ModelProto {
        ir_version: 8,
        producer_name: "onnx-fuser".to_string(),
        producer_version: crate::VERSION.to_string(),
        graph: Some(graph),
        opset_import: vec![OperatorSetIdProto {
            domain: String::new(),
            version: opset,
        }],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_tensor_value_info_symbolic() {
        let vi = make_tensor_value_info("x", 1, &[-1, 128, 64]);
        assert_eq!(vi.dims(), Some(vec![None, Some(128), Some(64)]));
        assert_eq!(vi.elem_type(), Some(1));
    }

    #[test]
    fn test_non_tensor_value_info_has_no_shape() {
        let seq = ValueInfoProto {
            name: "xs".to_string(),
            r#type: Some(TypeProto {
                value: Some(type_proto::Value::SequenceType(type_proto::Sequence {
                    elem_type: Some(Box::new(
                        make_tensor_value_info("x", 1, &[4]).r#type.unwrap(),
                    )),
                })),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(seq.dims(), None);
        assert_eq!(seq.elem_type(), None);
    }

    #[test]
    fn test_attribute_kind_inference() {
        let legacy = AttributeProto {
            name: "axes".to_string(),
            ints: vec![-1],
            ..Default::default()
        };
        assert_eq!(legacy.kind(), attribute_proto::AttributeType::Ints);
        assert_eq!(
            AttributeProto::new_float("epsilon", 1e-5).kind(),
            attribute_proto::AttributeType::Float
        );
    }

    #[test]
    fn test_opset_version() {
        let model = make_model(GraphProto::default(), 13);
        assert_eq!(model.opset_version(), Some(13));
        assert_eq!(ModelProto::default().opset_version(), None);
    }
}
