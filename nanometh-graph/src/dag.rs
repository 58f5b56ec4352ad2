use crate::{ToDot, ToMermaid};

use color_eyre::eyre::{eyre, Report, Result};
use itertools::Itertools;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{EdgeIndex, Graph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef, Reversed};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// A [`Dag`] of nodes (`N`), where each edge runs from an input to the node derived from it.
///
/// ## Introduction
///
/// - Nodes are looked up by value, so `N` must be hashable and unique within the graph.
/// - The order in which inputs were declared is preserved, see [`Dag::get_inputs`].
/// - Adding an edge that would close a cycle is an error, the graph is left unchanged.
///
/// ## Examples
///
/// ```rust
/// let mut dag = nanometh_graph::Dag::new();
/// dag.add_edge("reads", "alignment")?;
/// dag.add_edge("reference", "alignment")?;
/// dag.add_edge("alignment", "calls")?;
///
/// assert_eq!(dag.get_inputs(&"alignment")?, [&"reads", &"reference"]);
/// assert!(dag.add_edge("calls", "reads").is_err());
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
#[derive(Clone, Debug)]
pub struct Dag<N> {
    /// Directed graph of inputs and the nodes derived from them.
    pub graph: Graph<N, ()>,
    /// Lookup of node values to their index in the graph.
    index: HashMap<N, NodeIndex>,
}

impl<N> Default for Dag<N>
where
    N: Clone + Debug + Display + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<N> Dag<N>
where
    N: Clone + Debug + Display + Eq + Hash,
{
    /// Returns a new empty [`Dag`].
    pub fn new() -> Self {
        Dag { graph: Graph::new(), index: HashMap::new() }
    }

    /// Adds a node (`N`) if it is not already present, and returns its [`NodeIndex`].
    ///
    /// ```rust
    /// let mut dag = nanometh_graph::Dag::new();
    /// let a = dag.add_node("A");
    /// assert_eq!(a, dag.add_node("A"));
    /// assert_eq!(dag.len(), 1);
    /// ```
    pub fn add_node(&mut self, node: N) -> NodeIndex {
        match self.index.get(&node) {
            Some(node_index) => *node_index,
            None => {
                let node_index = self.graph.add_node(node.clone());
                self.index.insert(node, node_index);
                node_index
            }
        }
    }

    /// Creates an edge from `input` to `output` and returns the [`EdgeIndex`].
    ///
    /// - Nodes that don't exist yet are created.
    /// - An existing edge between the two nodes is reused.
    /// - If the new edge would create a cycle, returns an Error.
    pub fn add_edge(&mut self, input: N, output: N) -> Result<EdgeIndex, Report> {
        let input_index = self.add_node(input.clone());
        let output_index = self.add_node(output.clone());

        if input_index == output_index
            || has_path_connecting(&self.graph, output_index, input_index, None)
        {
            return Err(eyre!("New edge between {input} and {output} introduced a cycle."));
        }

        Ok(self.graph.update_edge(input_index, output_index, ()))
    }

    pub fn contains(&self, node: &N) -> bool {
        self.index.contains_key(node)
    }

    pub fn get_node(&self, node_index: &NodeIndex) -> Result<&N, Report> {
        self.graph
            .node_weight(*node_index)
            .ok_or_else(|| eyre!("Failed to get node data for node index {node_index:?}"))
    }

    pub fn get_node_index(&self, node: &N) -> Result<NodeIndex, Report> {
        self.index.get(node).copied().ok_or_else(|| eyre!("Failed to get node index of node {node}"))
    }

    /// Returns every node, in the order it was added.
    pub fn get_nodes(&self) -> Vec<&N> {
        self.graph.node_weights().collect()
    }

    /// Returns the input indices of a node, in the order they were declared.
    pub fn get_input_indices(&self, node_index: NodeIndex) -> Vec<NodeIndex> {
        // neighbors are yielded last added to first added, reverse this
        let mut inputs: Vec<_> =
            self.graph.neighbors_directed(node_index, Direction::Incoming).collect();
        inputs.reverse();
        inputs
    }

    /// Returns the direct inputs of a node, in the order they were declared.
    pub fn get_inputs(&self, node: &N) -> Result<Vec<&N>, Report> {
        let node_index = self.get_node_index(node)?;
        self.get_input_indices(node_index).iter().map(|i| self.get_node(i)).collect()
    }

    /// Returns the nodes directly derived from a node, in the order they were declared.
    pub fn get_dependent_indices(&self, node_index: NodeIndex) -> Vec<NodeIndex> {
        let mut dependents: Vec<_> =
            self.graph.neighbors_directed(node_index, Direction::Outgoing).collect();
        dependents.reverse();
        dependents
    }

    /// Returns every node transitively derived from a node, excluding itself.
    ///
    /// ```rust
    /// let mut dag = nanometh_graph::Dag::new();
    /// dag.add_edge("A", "B")?;
    /// dag.add_edge("B", "C")?;
    /// dag.add_edge("X", "C")?;
    /// let mut observed = dag.get_descendants(&"A")?;
    /// observed.sort();
    /// assert_eq!(observed, [&"B", &"C"]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn get_descendants(&self, node: &N) -> Result<Vec<&N>, Report> {
        let node_index = self.get_node_index(node)?;
        let mut dfs = Dfs::new(&self.graph, node_index);
        let mut descendants = Vec::new();
        while let Some(i) = dfs.next(&self.graph) {
            if i != node_index {
                descendants.push(self.get_node(&i)?);
            }
        }
        Ok(descendants)
    }

    /// Returns every node a node is transitively derived from, excluding itself.
    pub fn get_ancestors(&self, node: &N) -> Result<Vec<&N>, Report> {
        let node_index = self.get_node_index(node)?;
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, node_index);
        let mut ancestors = Vec::new();
        while let Some(i) = dfs.next(reversed) {
            if i != node_index {
                ancestors.push(self.get_node(&i)?);
            }
        }
        Ok(ancestors)
    }

    /// Returns the targets and all of their ancestors in depth-first post-order.
    ///
    /// Inputs are visited in declaration order, and each node appears once, after all of
    /// its inputs. This is the order a recursive, memoized resolution would visit nodes.
    ///
    /// ```rust
    /// let mut dag = nanometh_graph::Dag::new();
    /// dag.add_edge("index", "align")?;
    /// dag.add_edge("align", "call")?;
    /// dag.add_edge("model", "call")?;
    /// let call = dag.get_node_index(&"call")?;
    /// let order = dag.post_order(&[call]).iter().map(|i| dag.get_node(i)).collect::<Result<Vec<_>, _>>()?;
    /// assert_eq!(order, [&"index", &"align", &"model", &"call"]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn post_order(&self, targets: &[NodeIndex]) -> Vec<NodeIndex> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        targets.iter().for_each(|target| self.visit_post_order(*target, &mut visited, &mut order));
        order
    }

    fn visit_post_order(
        &self,
        node_index: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        order: &mut Vec<NodeIndex>,
    ) {
        if !visited.insert(node_index) {
            return;
        }
        for input in self.get_input_indices(node_index) {
            self.visit_post_order(input, visited, order);
        }
        order.push(node_index);
    }

    /// Returns all nodes in a topological order (inputs before the nodes derived from them).
    pub fn topological_order(&self) -> Result<Vec<NodeIndex>, Report> {
        toposort(&self.graph, None).map_err(|cycle| {
            let node = self.get_node(&cycle.node_id()).map(|n| n.to_string()).unwrap_or_default();
            eyre!("Graph contains a cycle at node {node}.")
        })
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }
}

impl<N> ToDot for Dag<N>
where
    N: Clone + Debug + Display + Eq + Hash,
{
    /// ```rust
    /// use nanometh_graph::{Dag, ToDot};
    /// let mut dag = Dag::new();
    /// dag.add_edge("A", "B")?;
    /// assert!(dag.to_dot()?.contains("0 -> 1"));
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    fn to_dot(&self) -> Result<String, Report> {
        let nodes = self
            .graph
            .node_indices()
            .map(|i| {
                let label = self.get_node(&i)?.to_string().replace('"', "'");
                Ok(format!("    {} [ label=\"{label}\" ]", i.index()))
            })
            .collect::<Result<Vec<_>, Report>>()?;
        let edges = self
            .graph
            .edge_references()
            .map(|e| format!("    {} -> {}", e.source().index(), e.target().index()))
            .collect_vec();

        let dot = format!(
            "digraph {{\n    rankdir=\"LR\"\n{}\n{}\n}}\n",
            nodes.join("\n"),
            edges.join("\n")
        );
        Ok(dot)
    }
}

impl<N> ToMermaid for Dag<N>
where
    N: Clone + Debug + Display + Eq + Hash,
{
    fn to_mermaid(&self) -> Result<String, Report> {
        let mut mermaid = String::from("graph LR;\n");
        for edge in self.graph.edge_references() {
            let source = self.get_node(&edge.source())?.to_string().replace('"', "'");
            let target = self.get_node(&edge.target())?.to_string().replace('"', "'");
            mermaid.push_str(&format!(
                "  {}[\"{source}\"]-->{}[\"{target}\"];\n",
                edge.source().index(),
                edge.target().index()
            ));
        }
        // nodes with no connections
        self.graph
            .node_indices()
            .filter(|i| self.graph.neighbors_undirected(*i).next().is_none())
            .try_for_each(|i| {
                let label = self.get_node(&i)?.to_string().replace('"', "'");
                mermaid.push_str(&format!("  {}[\"{label}\"];\n", i.index()));
                Ok::<(), Report>(())
            })?;
        Ok(mermaid)
    }
}
