//! ONNX Protocol Buffer types
//!
//! The message definitions live in `onnx`; `extensions` adds the
//! constructors and accessors the rest of the crate leans on.

pub mod onnx;

// Re-export commonly used types at module level
pub use onnx::{
    AttributeProto, FunctionProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto,
    SparseTensorProto, StringStringEntryProto, TensorAnnotation, TensorProto, TensorShapeProto,
    TrainingInfoProto, TypeProto, ValueInfoProto,
};

// Re-export submodules for nested types
pub use onnx::attribute_proto;
pub use onnx::tensor_proto;
pub use onnx::tensor_shape_proto;
pub use onnx::type_proto;

/// Extension methods for ONNX protobuf types
pub mod extensions;

pub use extensions::{make_model, make_node, make_tensor_value_info};

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_model_proto_default() {
        let model = ModelProto::default();
        assert_eq!(model.ir_version, 0);
        assert!(model.graph.is_none());
    }

    #[test]
    fn test_wire_round_trip_keeps_attributes() {
        let mut node = make_node("Softmax", &["logits"], &["probs"], "softmax_0");
        node.attribute.push(AttributeProto::new_int("axis", -1));
        let graph = GraphProto {
            node: vec![node],
            name: "g".to_string(),
            ..Default::default()
        };
        let model = make_model(graph, 13);

        let bytes = model.encode_to_vec();
        let decoded = ModelProto::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, model);

        let node = &decoded.graph.as_ref().unwrap().node[0];
        let axis = node.attribute.iter().find(|a| a.name == "axis").unwrap();
        assert_eq!(axis.i, -1);
        assert_eq!(axis.kind(), attribute_proto::AttributeType::Int);
    }
}
