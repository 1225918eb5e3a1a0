//! モデル定義
//!
//! コンテナグループの実行設定を表すデータモデル。

mod arguments;
mod container;
mod group;
mod network;
mod port;
mod resource;
mod volume;
mod wait;

// Re-exports
pub use arguments::*;
pub use container::*;
pub use group::*;
pub use network::*;
pub use port::*;
pub use resource::*;
pub use volume::*;
pub use wait::*;
