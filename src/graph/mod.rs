//! Graph manipulation module for ONNX models
//!
//! This module provides the core infrastructure for rewriting ONNX graphs:
//!
//! - [`Graph`]: node arena plus dependency index with O(1) edge lookups
//! - [`Node`] / [`AttrValue`]: decoded operators and typed attributes
//! - [`maps`]: type definitions for the dependency index
//!
//! # Example
//!
//! ```ignore
//! use onnx_fuser::graph::Graph;
//!
//! let mut graph = Graph::from_proto(&model.graph.unwrap())?;
//!
//! // Traverse graph
//! let producer = graph.producer_of("conv_out");
//! let consumers = graph.consumers_of("conv_out");
//!
//! // Rewrite, then restore the invariants
//! graph.remove_node(id);
//! graph.cleanup();
//! graph.resort();
//! ```
//!
//! # Maps
//!
//! | Map | Description |
//! |-----|-------------|
//! | `producer_map` | tensor_name → producing node |
//! | `consumer_map` | tensor_name → consuming nodes |
//! | `name_map` | node_name → node |
//! | `initializers` | name → TensorProto |
//! | `value_info` | name → ValueInfoProto |

pub mod accessors;
pub mod context;
pub mod maps;
pub mod mutators;
pub mod node;
pub mod topo;

// Re-export main types
pub use accessors::Neighbors;
pub use context::Graph;
pub use maps::{ConsumerMap, InitializerMap, NameMap, ProducerMap, ValueInfoMap};
pub use mutators::CleanupStats;
pub use node::{AttrValue, Node, NodeId};
