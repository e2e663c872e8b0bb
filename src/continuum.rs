// MIT License

// Copyright (c) 2016 Jerome Froelich

// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:

// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! The continuum: an immutable, sorted table of virtual nodes.
//!
//! Each node is expanded into `REPLICAS_PER_NODE` virtual nodes whose
//! positions are derived from the node's canonical address. A key is routed
//! to the owner of the first virtual node at or after the key's hash,
//! wrapping to the start of the table when the hash is past the last
//! position.

use {
    crate::{
        hash::{vnode_position, DefaultKeyHasher, KeyHasher},
        range::{PositionRange, RING_SIZE},
        Error,
        Node,
    },
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Number of virtual nodes per node (160 points, 4 per md5 in libketama).
pub const REPLICAS_PER_NODE: usize = 160 * 4;

/// A position on the ring owned by one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualNode {
    position: u32,
    node: usize,
}

impl VirtualNode {
    /// Position on the ring.
    #[inline]
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Index of the owning node in `Continuum::nodes()`.
    #[inline]
    pub fn node_index(&self) -> usize {
        self.node
    }
}

impl fmt::Display for VirtualNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VNode(position={:#010x}, node={})", self.position, self.node)
    }
}

/// How the continuum is searched for a key's position. Both strategies
/// always select the same node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    #[default]
    Binary,
    Sequential,
}

/// A built ring. Never mutated after construction; membership changes build
/// a new one.
#[derive(Clone)]
pub struct Continuum<S: KeyHasher = DefaultKeyHasher> {
    hasher: S,
    nodes: Vec<Node>,
    vnodes: Vec<VirtualNode>,
}

impl Continuum {
    /// Builds a continuum from server identifiers using the default key
    /// hasher.
    pub fn build<I, T>(identifiers: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self::build_with_hasher(identifiers, DefaultKeyHasher)
    }
}

impl<S: KeyHasher + Default> Default for Continuum<S> {
    fn default() -> Self {
        Self::empty(S::default())
    }
}

impl<S: KeyHasher> Continuum<S> {
    /// Creates a continuum with no nodes. Every lookup on it fails with
    /// `Error::EmptyRing`.
    pub fn empty(hasher: S) -> Self {
        Continuum {
            hasher,
            nodes: Vec::new(),
            vnodes: Vec::new(),
        }
    }

    /// Builds a continuum from server identifiers, hashing keys with
    /// `hasher`.
    ///
    /// Identifiers are resolved in order; the first one that fails to
    /// resolve aborts the build. Identifiers that resolve to an address
    /// already seen are skipped, so every node owns exactly
    /// `REPLICAS_PER_NODE` positions.
    pub fn build_with_hasher<I, T>(identifiers: I, hasher: S) -> Result<Self, Error>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut nodes: Vec<Node> = Vec::new();

        for identifier in identifiers {
            let identifier = identifier.as_ref();
            let node = Node::resolve(identifier)?;

            if nodes.contains(&node) {
                tracing::warn!(
                    identifier,
                    node = %node,
                    "duplicate server identifier ignored"
                );
                continue;
            }

            nodes.push(node);
        }

        let mut vnodes = Vec::with_capacity(nodes.len() * REPLICAS_PER_NODE);

        // No weights: all nodes are equal.
        for (index, node) in nodes.iter().enumerate() {
            for replica in 0..REPLICAS_PER_NODE {
                vnodes.push(VirtualNode {
                    position: vnode_position(node.as_str(), replica),
                    node: index,
                });
            }
        }

        let continuum = Self::assemble(hasher, nodes, vnodes);

        tracing::debug!(
            nodes = continuum.nodes.len(),
            vnodes = continuum.vnodes.len(),
            "built continuum"
        );

        Ok(continuum)
    }

    fn assemble(hasher: S, nodes: Vec<Node>, mut vnodes: Vec<VirtualNode>) -> Self {
        // Stable: colliding positions keep insertion order.
        vnodes.sort_by_key(|vnode| vnode.position);

        Continuum {
            hasher,
            nodes,
            vnodes,
        }
    }

    /// Number of nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the continuum has no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in resolved order.
    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Virtual nodes, sorted ascending by position.
    #[inline]
    pub fn vnodes(&self) -> &[VirtualNode] {
        &self.vnodes
    }

    /// Returns the node owning `vnode`.
    #[inline]
    pub fn owner(&self, vnode: &VirtualNode) -> &Node {
        &self.nodes[vnode.node]
    }

    #[inline]
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Hashes `key` onto the ring.
    #[inline]
    pub fn key_position<K: AsRef<[u8]>>(&self, key: K) -> u32 {
        self.hasher.hash_key(key.as_ref())
    }

    /// Returns the node responsible for `key`, or `Error::EmptyRing`.
    #[inline]
    pub fn pick<K: AsRef<[u8]>>(&self, key: K) -> Result<&Node, Error> {
        self.locate(self.key_position(key))
    }

    /// Same as `pick()`, but walks the table from the start instead of
    /// bisecting it.
    #[inline]
    pub fn pick_sequential<K: AsRef<[u8]>>(&self, key: K) -> Result<&Node, Error> {
        self.locate_sequential(self.key_position(key))
    }

    /// Returns the node responsible for `key` using the given strategy.
    pub fn pick_with<K: AsRef<[u8]>>(
        &self,
        key: K,
        strategy: SearchStrategy,
    ) -> Result<&Node, Error> {
        match strategy {
            SearchStrategy::Binary => self.pick(key),
            SearchStrategy::Sequential => self.pick_sequential(key),
        }
    }

    /// Returns the owner of the first virtual node at or after `position`,
    /// wrapping to the first virtual node.
    pub fn locate(&self, position: u32) -> Result<&Node, Error> {
        let index = self.search_binary(position)?;
        Ok(self.owner(&self.vnodes[index]))
    }

    /// Same as `locate()`, using a linear scan.
    pub fn locate_sequential(&self, position: u32) -> Result<&Node, Error> {
        let index = self.search_sequential(position)?;
        Ok(self.owner(&self.vnodes[index]))
    }

    /// Calls `visit` on every node in resolved order, stopping at and
    /// returning the first error.
    pub fn each_node<E, F>(&self, visit: F) -> Result<(), E>
    where
        F: FnMut(&Node) -> Result<(), E>,
    {
        self.nodes.iter().try_for_each(visit)
    }

    /// Returns the arcs of the ring routed to `node`, in ascending order of
    /// their end position. Empty if the node is not on the ring.
    pub fn ranges(&self, node: &Node) -> Vec<PositionRange> {
        let Some(index) = self.nodes.iter().position(|n| n == node) else {
            return Vec::new();
        };

        let last = self.vnodes.len().saturating_sub(1);

        self.vnodes
            .iter()
            .enumerate()
            .filter(|(i, vnode)| {
                // A vnode colliding with its predecessor never wins a lookup.
                vnode.node == index
                    && (*i == 0 || self.vnodes[i - 1].position != vnode.position)
            })
            .map(|(i, vnode)| {
                let previous = if i == 0 { last } else { i - 1 };
                PositionRange::owned(self.vnodes[previous].position, vnode.position)
            })
            .collect()
    }

    /// Fraction of the ring routed to `node`, between 0 and 1.
    pub fn share(&self, node: &Node) -> f64 {
        let covered: u64 = self.ranges(node).iter().map(PositionRange::size).sum();
        covered as f64 / RING_SIZE as f64
    }

    /// Index of the first virtual node with position `>= position`, or 0 if
    /// there is none.
    fn search_binary(&self, position: u32) -> Result<usize, Error> {
        if self.vnodes.is_empty() {
            return Err(Error::EmptyRing);
        }

        let mut low = 0;
        let mut high = self.vnodes.len();

        while low < high {
            let mid = low + (high - low) / 2;
            if self.vnodes[mid].position < position {
                low = mid + 1;
            } else {
                high = mid;
            }
        }

        Ok(self.wrap_index(low))
    }

    fn search_sequential(&self, position: u32) -> Result<usize, Error> {
        if self.vnodes.is_empty() {
            return Err(Error::EmptyRing);
        }

        let index = self
            .vnodes
            .iter()
            .position(|vnode| vnode.position >= position)
            .unwrap_or(self.vnodes.len());

        Ok(self.wrap_index(index))
    }

    #[inline]
    fn wrap_index(&self, index: usize) -> usize {
        if index == self.vnodes.len() {
            0
        } else {
            index
        }
    }
}

impl<S: KeyHasher> fmt::Debug for Continuum<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuum")
            .field("nodes", &self.nodes)
            .field("vnodes", &self.vnodes.len())
            .finish_non_exhaustive()
    }
}
