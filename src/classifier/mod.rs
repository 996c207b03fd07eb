// Text classification: trait-based abstraction over the model runtime.
//
// The TextClassifier trait defines the per-batch interface; OnnxClassifier
// implements it with local ONNX exports. Workers get their models through a
// ModelLoader so each one builds a private copy on its own thread.

pub mod download;
pub mod onnx;
pub mod traits;
