//! # BOM Graph
//!
//! BOM 樹的具體化、層序走訪與循環偵測

pub mod recursion;
pub mod tree;

// Re-export 主要類型
pub use recursion::{ChildrenCache, CycleDetector, InMemoryChildrenCache};
pub use tree::{BomTree, TreeBuilder};
