//! Model writers
//!
//! Save graphs in the native format and ONNX models to files or bytes.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use prost::Message;

use crate::error::{SplitError, SplitResult};
use crate::graph::GraphModel;
use crate::proto::ModelProto;

use super::reader::NativeModel;

/// Save a graph as a native model file
pub fn save_graph<P: AsRef<Path>>(graph: &GraphModel, path: P) -> SplitResult<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &NativeModel::from_graph(graph)).map_err(|source| {
        SplitError::Json {
            path: path.to_path_buf(),
            source,
        }
    })?;
    writer.flush()?;
    Ok(())
}

/// Save an ONNX model to a file
pub fn save_onnx<P: AsRef<Path>>(model: &ModelProto, path: P) -> SplitResult<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    writer.write_all(&model.encode_to_vec())?;
    writer.flush()?;
    Ok(())
}

/// Size of a file in megabytes
pub fn file_size_mb<P: AsRef<Path>>(path: P) -> SplitResult<f64> {
    let bytes = std::fs::metadata(path.as_ref())?.len();
    Ok(bytes as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{InitializerMap, Node, TensorRef};
    use crate::io::reader::{load_onnx, read_graph};
    use crate::proto::{GraphProto, NodeProto};

    fn create_test_model() -> ModelProto {
        ModelProto {
            ir_version: 8,
            producer_name: "test".to_string(),
            graph: Some(GraphProto {
                name: "test_graph".to_string(),
                node: vec![NodeProto {
                    op_type: "Relu".to_string(),
                    name: "relu_0".to_string(),
                    input: vec!["X".to_string()],
                    output: vec!["Y".to_string()],
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_save_and_load_onnx() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");

        save_onnx(&create_test_model(), &path).unwrap();
        let loaded = load_onnx(&path).unwrap();
        assert_eq!(loaded.ir_version, 8);
        assert_eq!(loaded.producer_name, "test");
        assert!(file_size_mb(&path).unwrap() > 0.0);
    }

    #[test]
    fn test_save_graph_round_trip() {
        let graph = GraphModel::new(
            "chain",
            vec![
                Node::new("Relu", "a", &["x"], &["h"]),
                Node::new("Tanh", "b", &["h"], &["y"]),
            ],
            vec![TensorRef::new("x", Some(vec![1, 3]))],
            vec![TensorRef::new("y", Some(vec![1, 3]))],
            InitializerMap::new(),
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.mgraph");
        save_graph(&graph, &path).unwrap();

        let loaded = read_graph(&path).unwrap();
        assert_eq!(loaded.node_count(), 2);
        assert_eq!(loaded.tensor_shape("y"), Some(&[1, 3][..]));
        assert_eq!(loaded.tensor_shape("x"), Some(&[1, 3][..]));
    }
}
