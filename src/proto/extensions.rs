//! Extension methods for ONNX protobuf types
//!
//! Convenience accessors and constructors used by the ONNX codec.

use super::onnx::*;

// ============================================================================
// ModelProto extensions
// ============================================================================

impl ModelProto {
    /// Get the opset version imported for a domain ("" is the default domain)
    pub fn opset_version(&self, domain: &str) -> Option<i64> {
        self.opset_import
            .iter()
            .find(|op| op.domain == domain)
            .map(|op| op.version)
    }

    /// Get mutable reference to graph, creating if necessary
    pub fn graph_mut(&mut self) -> &mut GraphProto {
        self.graph.get_or_insert_with(GraphProto::default)
    }
}

// ============================================================================
// NodeProto extensions
// ============================================================================

impl NodeProto {
    /// Get attribute by name
    pub fn get_attribute(&self, name: &str) -> Option<&AttributeProto> {
        self.attribute.iter().find(|attr| attr.name == name)
    }

    /// Get integer attribute value with default
    pub fn get_attribute_int(&self, name: &str, default: i64) -> i64 {
        self.get_attribute(name).map(|a| a.i).unwrap_or(default)
    }

    /// Check if this node belongs to the default ONNX domain
    pub fn is_default_domain(&self) -> bool {
        self.domain.is_empty() || self.domain == "ai.onnx"
    }
}

// ============================================================================
// ValueInfoProto extensions
// ============================================================================

impl ValueInfoProto {
    /// Get the shape dimensions if available (-1 for symbolic dimensions)
    pub fn get_shape(&self) -> Option<Vec<i64>> {
        match self.r#type.as_ref()?.value.as_ref()? {
            type_proto::Value::TensorType(tensor) => tensor.shape.as_ref().map(|s| {
                s.dim
                    .iter()
                    .map(|d| match &d.value {
                        Some(tensor_shape_proto::dimension::Value::DimValue(v)) => *v,
                        Some(tensor_shape_proto::dimension::Value::DimParam(_)) => -1,
                        None => -1,
                    })
                    .collect()
            }),
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

    /// Create a new string attribute
    pub fn new_string(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            s: value.as_bytes().to_vec(),
            r#type: attribute_proto::AttributeType::String as i32,
            ..Default::default()
        }
    }

    /// Attribute type enum value
    pub fn attribute_type(&self) -> attribute_proto::AttributeType {
        attribute_proto::AttributeType::try_from(self.r#type)
            .unwrap_or(attribute_proto::AttributeType::Undefined)
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Create a new ValueInfoProto for a tensor
///
/// Negative dimensions become symbolic `dim_param` entries.
pub fn make_tensor_value_info(name: &str, elem_type: i32, shape: &[i64]) -> ValueInfoProto {
    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type,
                shape: Some(TensorShapeProto {
                    dim: shape
                        .iter()
                        .enumerate()
                        .map(|(i, &d)| tensor_shape_proto::Dimension {
                            value: Some(if d < 0 {
                                tensor_shape_proto::dimension::Value::DimParam(format!(
                                    "{}_dim{}",
                                    name, i
                                ))
                            } else {
                                tensor_shape_proto::dimension::Value::DimValue(d)
                            }),
                            denotation: String::new(),
                        })
                        .collect(),
                }),
            })),
            denotation: String::new(),
        }),
        doc_string: String::new(),
    }
}

/// Create a ValueInfoProto without shape information
pub fn make_unshaped_value_info(name: &str, elem_type: i32) -> ValueInfoProto {
    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type,
                shape: None,
            })),
            denotation: String::new(),
        }),
        doc_string: String::new(),
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

/// Create an opset import entry
pub fn make_opset(domain: &str, version: i64) -> OperatorSetIdProto {
    OperatorSetIdProto {
        domain: domain.to_string(),
        version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_get_attribute() {
        let mut node = NodeProto::default();
        node.attribute.push(AttributeProto::new_int("axis", 1));

        assert_eq!(node.get_attribute_int("axis", 0), 1);
        assert_eq!(node.get_attribute_int("missing", 99), 99);
    }

    #[test]
    fn test_make_tensor_value_info() {
        let vi = make_tensor_value_info("test", 1, &[1, 3, 224, 224]);
        assert_eq!(vi.name, "test");
        assert_eq!(vi.get_shape(), Some(vec![1, 3, 224, 224]));
    }

    #[test]
    fn test_dynamic_dims_become_symbolic() {
        let vi = make_tensor_value_info("x", 1, &[-1, 8]);
        assert_eq!(vi.get_shape(), Some(vec![-1, 8]));
    }

    #[test]
    fn test_unshaped_value_info() {
        let vi = make_unshaped_value_info("y", 1);
        assert_eq!(vi.get_shape(), None);
    }

    #[test]
    fn test_opset_version() {
        let model = ModelProto {
            opset_import: vec![make_opset("", 13), make_opset("custom", 1)],
            ..Default::default()
        };
        assert_eq!(model.opset_version(""), Some(13));
        assert_eq!(model.opset_version("custom"), Some(1));
        assert_eq!(model.opset_version("missing"), None);
    }

    #[test]
    fn test_string_attribute() {
        let attr = AttributeProto::new_string("mode", "linear");
        assert_eq!(attr.s, b"linear");
        assert_eq!(attr.attribute_type(), attribute_proto::AttributeType::String);
    }
}
