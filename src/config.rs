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

use {
    crate::continuum::SearchStrategy,
    serde::{Deserialize, Serialize},
};

/// Settings for a `HashRing`, typically read from the client's config file.
///
/// ```json
/// { "servers": ["10.0.0.1:11211", "/var/run/memcached.sock"], "search": "binary" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RingConfig {
    /// Server identifiers, `host:port` or a socket path.
    pub servers: Vec<String>,
    pub search: SearchStrategy,
}

impl RingConfig {
    pub fn new<I, T>(servers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        RingConfig {
            servers: servers.into_iter().map(Into::into).collect(),
            search: SearchStrategy::default(),
        }
    }

    pub fn with_search(mut self, search: SearchStrategy) -> Self {
        self.search = search;
        self
    }
}
