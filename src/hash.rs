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

//! Hash functions used by the ring.
//!
//! Two independent hashes are involved. Ring positions are derived from md5,
//! as in libketama, so that the position of every virtual node is stable
//! across processes and versions. Keys are hashed with a `KeyHasher`, which
//! defaults to SipHash-1-3 with fixed keys. Each hash only has to agree with
//! itself: changing either one remaps keys.

use {
    md5::{Digest, Md5},
    siphasher::sip::SipHasher13,
    std::hash::{BuildHasher, Hasher},
};

/// Returns the ring position of virtual node `replica` of the node whose
/// canonical address is `canonical`.
///
/// The position is the first four bytes, little-endian, of
/// `md5("<canonical>-<replica>")`.
pub fn vnode_position(canonical: &str, replica: usize) -> u32 {
    let label = format!("{}-{}", canonical, replica);
    let digest = Md5::digest(label.as_bytes());

    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Maps request keys onto the 32-bit ring.
///
/// Implementations must be deterministic: the same bytes always hash to the
/// same position, independent of process or platform.
pub trait KeyHasher: Clone + Send + Sync {
    fn hash_key(&self, key: &[u8]) -> u32;
}

/// Default key hasher. SipHash-1-3 with zero keys, truncated to the low 32
/// bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyHasher;

impl BuildHasher for DefaultKeyHasher {
    type Hasher = SipHasher13;

    fn build_hasher(&self) -> Self::Hasher {
        SipHasher13::new()
    }
}

impl KeyHasher for DefaultKeyHasher {
    #[inline]
    fn hash_key(&self, key: &[u8]) -> u32 {
        let mut hasher = self.build_hasher();
        hasher.write(key);
        hasher.finish() as u32
    }
}
