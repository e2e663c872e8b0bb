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

//! Server addresses.
//!
//! A server identifier is either a `host:port` pair or, when it contains a
//! `/`, the path of a local (unix domain) socket. Resolution is purely
//! syntactic: hostnames are validated and lowercased but never looked up.

use {
    crate::Error,
    serde::{Deserialize, Serialize},
    std::{
        fmt,
        hash::{Hash, Hasher},
        net::{IpAddr, SocketAddr},
        path::{Path, PathBuf},
        str::FromStr,
    },
};

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Host part of a TCP address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Host {
    Ip(IpAddr),
    Name(String),
}

/// Structured form of a resolved server address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeAddr {
    Tcp { host: Host, port: u16 },
    Unix(PathBuf),
}

/// A server on the ring.
///
/// Identity is the canonical address string: two nodes are equal iff their
/// canonical strings are equal, so `LOCALHOST:11211` and `localhost:11211`
/// are the same node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Node {
    addr: NodeAddr,
    canonical: String,
}

impl Node {
    /// Resolves a server identifier into a `Node`, or returns
    /// `Error::InvalidAddress` if it is neither a valid `host:port` pair nor
    /// a socket path.
    pub fn resolve(identifier: &str) -> Result<Self, Error> {
        if identifier.contains('/') {
            resolve_unix(identifier)
        } else {
            resolve_tcp(identifier)
        }
    }

    /// Returns the structured address.
    #[inline]
    pub fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    /// Returns the canonical address string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Returns true if the node is a local socket.
    #[inline]
    pub fn is_unix(&self) -> bool {
        matches!(self.addr, NodeAddr::Unix(_))
    }

    /// Returns the socket address if the node's host is an IP literal.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match &self.addr {
            NodeAddr::Tcp {
                host: Host::Ip(ip),
                port,
            } => Some(SocketAddr::new(*ip, *port)),
            _ => None,
        }
    }

    /// Returns the socket path if the node is a local socket.
    pub fn path(&self) -> Option<&Path> {
        match &self.addr {
            NodeAddr::Unix(path) => Some(path),
            NodeAddr::Tcp { .. } => None,
        }
    }
}

fn invalid(identifier: &str, reason: &'static str) -> Error {
    Error::InvalidAddress {
        address: identifier.to_owned(),
        reason,
    }
}

fn resolve_unix(identifier: &str) -> Result<Node, Error> {
    if identifier.contains('\0') {
        return Err(invalid(identifier, "socket path contains a NUL byte"));
    }

    Ok(Node {
        addr: NodeAddr::Unix(PathBuf::from(identifier)),
        canonical: identifier.to_owned(),
    })
}

fn resolve_tcp(identifier: &str) -> Result<Node, Error> {
    // IP literals, including bracketed IPv6.
    if let Ok(addr) = identifier.parse::<SocketAddr>() {
        return Ok(Node {
            addr: NodeAddr::Tcp {
                host: Host::Ip(addr.ip()),
                port: addr.port(),
            },
            canonical: addr.to_string(),
        });
    }

    let Some((host, port)) = identifier.rsplit_once(':') else {
        return Err(invalid(identifier, "missing port"));
    };

    // `u16::from_str` accepts a leading `+`.
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(identifier, "malformed port"));
    }

    let port = port
        .parse::<u16>()
        .map_err(|_| invalid(identifier, "malformed port"))?;

    if host.is_empty() {
        return Err(invalid(identifier, "missing host"));
    }

    if host.contains(':') || host.starts_with('[') {
        return Err(invalid(identifier, "malformed IPv6 address"));
    }

    // A fully qualified name and its relative form are the same host.
    let host = host.strip_suffix('.').unwrap_or(host);

    // Anything numeric here failed to parse as an IP literal above.
    if is_numeric_host(host) {
        return Err(invalid(identifier, "malformed IPv4 address"));
    }

    if !is_valid_hostname(host) {
        return Err(invalid(identifier, "malformed hostname"));
    }

    let host = host.to_ascii_lowercase();
    let canonical = format!("{}:{}", host, port);

    Ok(Node {
        addr: NodeAddr::Tcp {
            host: Host::Name(host),
            port,
        },
        canonical,
    })
}

/// Top-level labels are never all-numeric (RFC 1123 §2.1).
fn is_numeric_host(host: &str) -> bool {
    host.rsplit('.')
        .next()
        .is_some_and(|label| !label.is_empty() && label.bytes().all(|b| b.is_ascii_digit()))
}

fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_HOSTNAME_LEN {
        return false;
    }

    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    })
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl AsRef<str> for Node {
    fn as_ref(&self) -> &str {
        &self.canonical
    }
}

impl FromStr for Node {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Node::resolve(s)
    }
}

impl TryFrom<String> for Node {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Node::resolve(&value)
    }
}

impl From<Node> for String {
    fn from(node: Node) -> Self {
        node.canonical
    }
}
