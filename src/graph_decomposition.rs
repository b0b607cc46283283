//! Functional-graph decomposition engine for iterated evaluation.
//!
//! The graph of a self-map splits into cycles with trees of transients
//! hanging off them. Preprocessing cuts the graph into contiguous segments
//! (nodes): one node per cycle, plus transient nodes, each of which ends by
//! flowing into a position of an earlier node (its child). Every element is
//! recorded by a header naming its node and its offset in that node.
//!
//! A query walks from node to child, consuming the rest of each segment,
//! until the remaining step count lands inside a segment; on a cycle node the
//! final index is taken modulo the cycle length.
//!
//! Transient nodes are grown from leaves in decreasing depth order, so the
//! longest chains become single segments. Queries cost one hop per segment
//! crossed. That is O(1) on shallow graphs, but there is no general
//! O(log i) bound: a long chain of short segments forces many hops.
//! [`DecompositionStats::max_chain_depth`] reports the worst case for a given
//! map.

use std::cmp::Reverse;

use tracing::debug;

use crate::engine::{snapshot_images, IterationEngine, QueryCost};
use crate::error::{IterationError, Result};
use crate::function_map::SelfMap;

/// Stable index of a node in a [`NodeArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u32);

impl NodeHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// The segment is a whole cycle in walk order.
    Cycle,
    /// The last element of the segment maps to position `entry` of `child`.
    Transient { child: NodeHandle, entry: usize },
}

#[derive(Clone, Debug)]
pub struct Node {
    segment: Vec<usize>,
    kind: NodeKind,
}

impl Node {
    pub fn segment(&self) -> &[usize] {
        &self.segment
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self.kind, NodeKind::Cycle)
    }
}

/// Owns every node of a decomposition.
#[derive(Clone, Debug, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    fn alloc(&mut self, node: Node) -> Result<NodeHandle> {
        let index = u32::try_from(self.nodes.len()).map_err(|_| {
            IterationError::InvariantViolation("node arena exceeds u32 handles".to_string())
        })?;
        self.nodes.push(node);
        Ok(NodeHandle(index))
    }

    /// `None` for a handle that was not allocated by this arena.
    pub fn get(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeHandle(index as u32), node))
    }
}

/// Location of a domain element inside the decomposition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub node: NodeHandle,
    pub position: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecompositionStats {
    pub nodes: usize,
    pub cycles: usize,
    pub longest_segment: usize,
    /// Most child links any query can follow.
    pub max_chain_depth: usize,
}

pub struct GraphDecompositionEngine {
    arena: NodeArena,
    headers: Vec<Header>,
    max_chain_depth: usize,
}

impl GraphDecompositionEngine {
    pub fn header(&self, x: usize) -> Result<Header> {
        self.check_element(x)?;
        Ok(self.headers[x])
    }

    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
        self.arena.get(handle)
    }

    pub fn stats(&self) -> DecompositionStats {
        DecompositionStats {
            nodes: self.arena.len(),
            cycles: self.arena.iter().filter(|(_, node)| node.is_cycle()).count(),
            longest_segment: self.arena.iter().map(|(_, node)| node.segment.len()).max().unwrap_or(0),
            max_chain_depth: self.max_chain_depth,
        }
    }
}

struct Builder<'a> {
    images: &'a [usize],
    headers: Vec<Option<Header>>,
    seen: Vec<bool>,
    arena: NodeArena,
}

impl<'a> Builder<'a> {
    fn new(images: &'a [usize]) -> Self {
        Self {
            images,
            headers: vec![None; images.len()],
            seen: vec![false; images.len()],
            arena: NodeArena::default(),
        }
    }

    /// Tortoise-and-hare from `start`. Returns without allocating when the
    /// orbit runs into an element seen by an earlier search, since its cycle
    /// is already materialised.
    fn discover_cycle(&mut self, start: usize) -> Result<()> {
        let f = self.images;
        let mut tortoise = f[start];
        let mut hare = f[tortoise];
        loop {
            if self.seen[tortoise] {
                return Ok(());
            }
            if tortoise == hare {
                break;
            }
            tortoise = f[tortoise];
            hare = f[f[hare]];
        }

        tortoise = start;
        while tortoise != hare {
            self.seen[tortoise] = true;
            tortoise = f[tortoise];
            hare = f[hare];
        }

        let mut segment = vec![tortoise];
        self.seen[tortoise] = true;
        let mut walker = f[tortoise];
        while walker != tortoise {
            self.seen[walker] = true;
            segment.push(walker);
            walker = f[walker];
        }

        self.push_node(segment, NodeKind::Cycle)
    }

    fn push_node(&mut self, segment: Vec<usize>, kind: NodeKind) -> Result<()> {
        let handle = self.arena.alloc(Node { segment, kind })?;
        for (position, &x) in self.arena.nodes[handle.index()].segment.iter().enumerate() {
            self.headers[x] = Some(Header { node: handle, position });
        }
        Ok(())
    }

    /// Leaves (elements without preimages), deepest first. Depth is the
    /// number of steps to the first element that already has a header,
    /// memoised across walks.
    fn leaves_by_depth(&self) -> Result<Vec<usize>> {
        let size = self.images.len();
        let mut in_degree = vec![0usize; size];
        for &y in self.images {
            in_degree[y] += 1;
        }

        let mut depth: Vec<Option<usize>> =
            self.headers.iter().map(|header| header.map(|_| 0)).collect();
        let mut stack = Vec::new();
        let mut leaves = Vec::new();

        for leaf in (0..size).filter(|&x| in_degree[x] == 0) {
            let mut current = leaf;
            let mut d = loop {
                match depth[current] {
                    Some(d) => break d,
                    None if stack.len() >= size => {
                        return Err(IterationError::InvariantViolation(format!(
                            "walk from leaf {} never reaches a cycle",
                            leaf
                        )));
                    }
                    None => {
                        stack.push(current);
                        current = self.images[current];
                    }
                }
            };
            while let Some(x) = stack.pop() {
                d += 1;
                depth[x] = Some(d);
            }
            leaves.push((d, leaf));
        }

        leaves.sort_unstable_by_key(|&entry| Reverse(entry));
        Ok(leaves.into_iter().map(|(_, leaf)| leaf).collect())
    }

    /// Grows a transient node from `leaf` until it reaches an element that
    /// already belongs to a node, which becomes the child.
    fn construct_transient(&mut self, leaf: usize) -> Result<()> {
        let mut segment = Vec::new();
        let mut current = leaf;
        let owner = loop {
            match self.headers[current] {
                Some(header) => break header,
                None => {
                    segment.push(current);
                    current = self.images[current];
                }
            }
        };

        if segment.is_empty() {
            return Ok(());
        }
        let kind = NodeKind::Transient { child: owner.node, entry: owner.position };
        self.push_node(segment, kind)
    }

    fn finish(self) -> Result<GraphDecompositionEngine> {
        let headers = self
            .headers
            .into_iter()
            .enumerate()
            .map(|(x, header)| {
                header.ok_or_else(|| {
                    IterationError::InvariantViolation(format!(
                        "element {} has no header after preprocessing",
                        x
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // Children are always allocated before their parents, so handles
        // strictly decrease along every chain and every chain ends at a cycle.
        let mut chain_depth = vec![0usize; self.arena.len()];
        for (handle, node) in self.arena.iter() {
            if let NodeKind::Transient { child, .. } = node.kind {
                if child >= handle {
                    return Err(IterationError::InvariantViolation(format!(
                        "node {} links to node {} which is not an earlier node",
                        handle.index(),
                        child.index()
                    )));
                }
                chain_depth[handle.index()] = chain_depth[child.index()] + 1;
            }
        }
        let max_chain_depth = chain_depth.into_iter().max().unwrap_or(0);

        Ok(GraphDecompositionEngine { arena: self.arena, headers, max_chain_depth })
    }
}

impl IterationEngine for GraphDecompositionEngine {
    const NAME: &'static str = "graph-decomposition";

    fn construct<M: SelfMap + ?Sized>(map: &M) -> Result<Self> {
        let images = snapshot_images(map)?;
        let mut builder = Builder::new(&images);

        for x in 0..images.len() {
            if builder.headers[x].is_none() {
                builder.discover_cycle(x)?;
            }
        }
        let cycles = builder.arena.len();

        for leaf in builder.leaves_by_depth()? {
            builder.construct_transient(leaf)?;
        }

        let engine = builder.finish()?;
        debug!(
            size = engine.headers.len(),
            cycles,
            nodes = engine.arena.len(),
            max_chain_depth = engine.max_chain_depth,
            "graph decomposition preprocessing complete"
        );
        Ok(engine)
    }

    fn domain_size(&self) -> usize {
        self.headers.len()
    }

    fn eval_with_cost(&self, x: usize, i: u64) -> Result<(usize, QueryCost)> {
        self.check_element(x)?;
        let Header { mut node, mut position } = self.headers[x];
        let mut remaining = i;
        let mut crossed = 0;

        loop {
            let current = self.arena.get(node).ok_or_else(|| {
                IterationError::InvariantViolation(format!(
                    "query from {} reached unknown node {}",
                    x,
                    node.index()
                ))
            })?;
            let len = current.segment.len();
            let cost = QueryCost { segments_crossed: crossed, ..QueryCost::default() };

            match current.kind {
                NodeKind::Transient { child, entry } if remaining >= (len - position) as u64 => {
                    remaining -= (len - position) as u64;
                    node = child;
                    position = entry;
                    crossed += 1;
                    if crossed > self.arena.len() {
                        return Err(IterationError::InvariantViolation(format!(
                            "query from {} crossed more segments than exist",
                            x
                        )));
                    }
                }
                NodeKind::Transient { .. } => {
                    // remaining < len - position
                    return Ok((current.segment[position + remaining as usize], cost));
                }
                NodeKind::Cycle => {
                    let index = ((remaining % len as u64) as usize + position) % len;
                    return Ok((current.segment[index], cost));
                }
            }
        }
    }
}
