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

//! Ketama-style consistent hashing for selecting a server for a key, as done
//! by memcached clients. Adding or removing a server only remaps the keys
//! that server owned (or will own); every other key keeps its server.
//!
//! Each server is placed on a 32-bit ring at `REPLICAS_PER_NODE` positions
//! derived from the md5 of its address. A key belongs to the server owning
//! the first position at or after the key's hash, wrapping around at the top
//! of the ring. All servers are weighted equally.
//!
//! `Continuum` is the immutable ring itself. `HashRing` wraps it for use from
//! many threads: lookups run against a snapshot and `reconfigure()` swaps in
//! a freshly built ring in one step.
//!
//! ## Example
//!
//! ``` rust
//! use ketama::HashRing;
//!
//! let ring = HashRing::new(["10.0.0.1:11211", "10.0.0.2:11211", "10.0.0.3:11211"]).unwrap();
//!
//! let server = ring.pick("foo").unwrap();
//! println!("foo lives on {}", server);
//!
//! // 10.0.0.2 went away; only its keys move.
//! ring.reconfigure(["10.0.0.1:11211", "10.0.0.3:11211"]).unwrap();
//! assert_ne!(ring.pick("foo").unwrap().as_str(), "10.0.0.2:11211");
//! ```

use {
    parking_lot::{Mutex, RwLock},
    std::sync::Arc,
};

pub mod config;
pub mod continuum;
pub mod hash;
pub mod node;
pub mod range;

pub use {
    config::RingConfig,
    continuum::{Continuum, SearchStrategy, VirtualNode, REPLICAS_PER_NODE},
    hash::{DefaultKeyHasher, KeyHasher},
    node::{Host, Node, NodeAddr},
    range::PositionRange,
};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress {
        address: String,
        reason: &'static str,
    },

    #[error("Ring is empty")]
    EmptyRing,
}

/// Hash Ring
///
/// A consistent hash ring shared between threads. Lookups never block each
/// other and always observe a complete ring: either the one before or the
/// one after a concurrent `reconfigure()`.
pub struct HashRing<S: KeyHasher = DefaultKeyHasher> {
    hasher: S,
    strategy: SearchStrategy,
    current: RwLock<Arc<Continuum<S>>>,
    reconfigure_lock: Mutex<()>,
}

impl HashRing {
    /// Creates a `HashRing` from server identifiers.
    pub fn new<I, T>(identifiers: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self::with_hasher(identifiers, DefaultKeyHasher)
    }

    /// Creates a `HashRing` from a `RingConfig`.
    pub fn from_config(config: &RingConfig) -> Result<Self, Error> {
        Ok(Self::new(&config.servers)?.with_strategy(config.search))
    }
}

impl Default for HashRing {
    fn default() -> Self {
        Self::from_continuum(Continuum::default())
    }
}

impl<S: KeyHasher> HashRing<S> {
    /// Creates a `HashRing` which will hash keys with `hasher`.
    pub fn with_hasher<I, T>(identifiers: I, hasher: S) -> Result<Self, Error>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let continuum = Continuum::build_with_hasher(identifiers, hasher)?;
        Ok(Self::from_continuum(continuum))
    }

    /// Wraps an already built continuum.
    pub fn from_continuum(continuum: Continuum<S>) -> Self {
        HashRing {
            hasher: continuum.hasher().clone(),
            strategy: SearchStrategy::default(),
            current: RwLock::new(Arc::new(continuum)),
            reconfigure_lock: Mutex::new(()),
        }
    }

    /// Sets the search strategy used by `pick()`.
    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[inline]
    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    /// Returns the current ring. The snapshot is unaffected by later
    /// reconfigurations.
    #[inline]
    pub fn snapshot(&self) -> Arc<Continuum<S>> {
        Arc::clone(&self.current.read())
    }

    /// Get the number of nodes in the hash ring.
    #[inline]
    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    /// Returns true if the ring has no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Returns the nodes in resolved order.
    pub fn nodes(&self) -> Vec<Node> {
        self.snapshot().nodes().to_vec()
    }

    /// Returns the node responsible for `key`, or `Error::EmptyRing` if no
    /// nodes are configured.
    pub fn pick<K: AsRef<[u8]>>(&self, key: K) -> Result<Node, Error> {
        self.snapshot().pick_with(key, self.strategy).cloned()
    }

    /// Replaces the ring with one built from `identifiers`. On error the
    /// current ring stays in place.
    pub fn reconfigure<I, T>(&self, identifiers: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let _guard = self.reconfigure_lock.lock();

        let next = match Continuum::build_with_hasher(identifiers, self.hasher.clone()) {
            Ok(next) => next,
            Err(err) => {
                tracing::warn!(error = %err, "ring reconfiguration rejected");
                return Err(err);
            }
        };

        let nodes = next.len();
        let previous = std::mem::replace(&mut *self.current.write(), Arc::new(next));

        tracing::info!(from = previous.len(), to = nodes, "ring reconfigured");

        Ok(())
    }

    /// Calls `visit` on every node in resolved order, stopping at and
    /// returning the first error.
    pub fn each_node<E, F>(&self, visit: F) -> Result<(), E>
    where
        F: FnMut(&Node) -> Result<(), E>,
    {
        self.snapshot().each_node(visit)
    }
}

impl<S: KeyHasher> std::fmt::Debug for HashRing<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashRing")
            .field("strategy", &self.strategy)
            .field("continuum", &*self.current.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::thread};

    const SERVERS: [&str; 3] = ["localhost:11211", "localhost:11212", "localhost:11213"];

    fn keys(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("key{}", i)).collect()
    }

    #[test]
    fn new_ring() {
        let ring = HashRing::new(SERVERS).unwrap();

        assert_eq!(ring.len(), 3);
        assert!(!ring.is_empty());
        assert_eq!(ring.snapshot().vnodes().len(), 1920);

        let node = ring.pick("key1").unwrap();
        assert!(SERVERS.contains(&node.as_str()));
        assert_eq!(ring.pick("key1").unwrap(), node);
    }

    #[test]
    fn empty_ring() {
        let ring = HashRing::new(Vec::<&str>::new()).unwrap();

        assert!(ring.is_empty());
        for key in keys(10) {
            assert_eq!(ring.pick(&key), Err(Error::EmptyRing));
        }

        let ring = HashRing::default();
        assert_eq!(ring.pick("key1"), Err(Error::EmptyRing));
    }

    #[test]
    fn invalid_address() {
        let result = HashRing::new(["not a valid address!!"]);
        assert!(matches!(result, Err(Error::InvalidAddress { .. })));
    }

    #[test]
    fn load_balance() {
        let ring = HashRing::new(SERVERS).unwrap();

        let mut counts = [0usize; 3];
        for key in keys(10_000) {
            let node = ring.pick(&key).unwrap();
            let index = SERVERS.iter().position(|s| *s == node.as_str()).unwrap();
            counts[index] += 1;
        }

        println!("{:?}", counts);
        assert!(counts.iter().all(|count| *count > 3_000));
    }

    #[test]
    fn removing_a_node_only_moves_its_keys() {
        let ring = HashRing::new(SERVERS).unwrap();
        let removed = Node::resolve(SERVERS[0]).unwrap();

        let before = keys(1_000)
            .into_iter()
            .map(|key| {
                let node = ring.pick(&key).unwrap();
                (key, node)
            })
            .collect::<Vec<_>>();

        ring.reconfigure(&SERVERS[1..]).unwrap();
        assert_eq!(ring.len(), 2);

        let mut moved = 0;
        for (key, node) in &before {
            let after = ring.pick(key).unwrap();
            if *node == removed {
                assert_ne!(after, removed);
                moved += 1;
            } else {
                assert_eq!(&after, node, "{} moved", key);
            }
        }
        assert!(moved > 0);
    }

    #[test]
    fn adding_a_node_only_takes_keys() {
        let ring = HashRing::new(SERVERS).unwrap();
        let before = keys(1_000)
            .iter()
            .map(|key| ring.pick(key).unwrap())
            .collect::<Vec<_>>();

        let added = Node::resolve("localhost:11214").unwrap();
        ring.reconfigure(SERVERS.iter().copied().chain(["localhost:11214"]))
            .unwrap();

        for (key, node) in keys(1_000).iter().zip(&before) {
            let after = ring.pick(key).unwrap();
            assert!(after == *node || after == added);
        }
    }

    #[test]
    fn failed_reconfigure_keeps_ring() {
        let ring = HashRing::new(SERVERS).unwrap();
        let snapshot = ring.snapshot();

        let result = ring.reconfigure(["localhost:11211", "localhost:nope"]);
        assert!(matches!(result, Err(Error::InvalidAddress { .. })));

        assert!(Arc::ptr_eq(&snapshot, &ring.snapshot()));
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn reconfigure_to_empty() {
        let ring = HashRing::new(SERVERS).unwrap();
        ring.reconfigure(Vec::<String>::new()).unwrap();

        assert!(ring.is_empty());
        assert_eq!(ring.pick("key1"), Err(Error::EmptyRing));

        ring.reconfigure(SERVERS).unwrap();
        assert!(ring.pick("key1").is_ok());
    }

    #[test]
    fn snapshots_outlive_reconfiguration() {
        let ring = HashRing::new(SERVERS).unwrap();
        let old = ring.snapshot();

        ring.reconfigure(["/tmp/memcached.sock"]).unwrap();

        assert_eq!(old.len(), 3);
        assert_eq!(ring.snapshot().len(), 1);
        assert_eq!(ring.pick("key1").unwrap().as_str(), "/tmp/memcached.sock");
    }

    #[test]
    fn from_config() {
        let config = RingConfig::new(SERVERS).with_search(SearchStrategy::Sequential);
        let ring = HashRing::from_config(&config).unwrap();

        assert_eq!(ring.strategy(), SearchStrategy::Sequential);
        assert_eq!(ring.len(), 3);

        let binary = HashRing::new(SERVERS).unwrap();
        for key in keys(500) {
            assert_eq!(ring.pick(&key).unwrap(), binary.pick(&key).unwrap());
        }
    }

    #[test]
    fn each_node() {
        let ring = HashRing::new(SERVERS).unwrap();

        let mut seen = Vec::new();
        ring.each_node(|node| {
            seen.push(node.clone());
            Ok::<_, ()>(())
        })
        .unwrap();
        assert_eq!(seen, ring.nodes());

        let result = ring.each_node(|node| Err(node.to_string()));
        assert_eq!(result, Err(SERVERS[0].to_owned()));
    }

    #[test]
    fn concurrent_picks_see_whole_rings() {
        let small = ["localhost:11211", "localhost:11212"];
        let ring = HashRing::new(SERVERS).unwrap();

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for i in 0..2_000 {
                        let snapshot = ring.snapshot();
                        let nodes = snapshot.len();
                        assert!(nodes == 2 || nodes == 3);
                        assert_eq!(snapshot.vnodes().len(), nodes * REPLICAS_PER_NODE);

                        let node = ring.pick(format!("key{}", i)).unwrap();
                        assert!(SERVERS.contains(&node.as_str()));
                    }
                });
            }

            scope.spawn(|| {
                for i in 0..50 {
                    if i % 2 == 0 {
                        ring.reconfigure(small).unwrap();
                    } else {
                        ring.reconfigure(SERVERS).unwrap();
                    }
                }
            });
        });
    }
}
