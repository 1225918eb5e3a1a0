//! 起動順序のための依存グラフ（petgraph）

use crate::error::{ContainerError, Result};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use shipyard_core::ContainerGroup;
use std::collections::HashMap;

/// コンテナ間の依存グラフ
///
/// 辺は依存先から依存元へ向く。トポロジカル順では依存先が先に来る。
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// グループの有効なコンテナからグラフを作る
    ///
    /// スキップされたコンテナへの依存は満たされているものとして辺を張らない。
    pub fn from_group(group: &ContainerGroup) -> Self {
        let mut graph = Self::new();
        for spec in group.active() {
            graph.add_container(&spec.alias);
        }
        for spec in group.active() {
            for dependency in &spec.depends_on {
                graph.add_dependency(&spec.alias, dependency);
            }
        }
        graph
    }

    pub fn add_container(&mut self, alias: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(alias) {
            return *idx;
        }
        let idx = self.graph.add_node(alias.to_string());
        self.index.insert(alias.to_string(), idx);
        idx
    }

    /// `dependent` が `dependency` に依存する（未登録の側は無視）
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) {
        if let (Some(&from), Some(&to)) = (self.index.get(dependency), self.index.get(dependent)) {
            self.graph.update_edge(from, to, ());
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// 依存先が先に来る起動順
    ///
    /// 循環があれば、循環に含まれる全てのエイリアスを持つ
    /// [`ContainerError::CyclicDependency`] を返す。
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        self.sorted_indices().map(|indices| {
            indices
                .into_iter()
                .map(|idx| self.graph[idx].clone())
                .collect()
        })
    }

    /// 並列に起動できる段階ごとのエイリアス
    ///
    /// 段階 n のコンテナは段階 n 未満のコンテナにだけ依存する。
    /// 同じ段階の中は定義順。
    pub fn levels(&self) -> Result<Vec<Vec<String>>> {
        let order = self.sorted_indices()?;
        let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
        for &idx in &order {
            let level = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .filter_map(|dep| depth.get(&dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(idx, level);
        }

        let count = depth.values().max().map_or(0, |max| max + 1);
        let mut levels: Vec<Vec<NodeIndex>> = vec![Vec::new(); count];
        for (idx, level) in depth {
            levels[level].push(idx);
        }
        Ok(levels
            .into_iter()
            .map(|mut level| {
                level.sort();
                level
                    .into_iter()
                    .map(|idx| self.graph[idx].clone())
                    .collect()
            })
            .collect())
    }

    fn sorted_indices(&self) -> Result<Vec<NodeIndex>> {
        petgraph::algo::toposort(&self.graph, None).map_err(|_| ContainerError::CyclicDependency {
            aliases: self.cycle_members(),
        })
    }

    fn cycle_members(&self) -> Vec<String> {
        let mut members: Vec<String> = petgraph::algo::tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.iter().any(|&n| self.graph.contains_edge(n, n))
            })
            .flatten()
            .map(|idx| self.graph[idx].clone())
            .collect();
        members.sort();
        members
    }
}
