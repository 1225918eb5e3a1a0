//! Shipyard のコンテナ実行設定モデル
//!
//! コンテナグループの定義（[`ContainerSpec`]）、設定ファイルのロード、
//! properties 形式ファイルの読み書きを提供します。

pub mod error;
pub mod loader;
pub mod model;
pub mod properties;

pub use error::*;
pub use loader::*;
pub use model::*;
