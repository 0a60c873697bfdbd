// Copyright 2025 The Lakota Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Content digests and their filesystem-friendly hashed paths.

use std::fmt::{Debug, Display, Error, Formatter};

use sha1::{Digest as _, Sha1};

/// Number of raw bytes in a [`Digest`].
pub const DIGEST_LEN: usize = 20;

/// Number of hex characters used by the two-level path prefix.
const PATH_DEPTH: usize = 2;

/// SHA-1 digest of an encoded payload. Everything immutable in the store
/// (segments, commit payloads) is keyed by one of these.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// The all-zero digest, reserved for the phi sentinel.
    pub const ZERO: Digest = Digest([0; DIGEST_LEN]);

    /// Hashes `data` in one go.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Digest(hasher.finalize().into())
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let bytes = hex::decode(hex).ok()?;
        let bytes: [u8; DIGEST_LEN] = bytes.try_into().ok()?;
        Some(Digest(bytes))
    }

    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.debug_tuple("Digest").field(&self.hex()).finish()
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.hex())
    }
}

/// Splits a digest into a two-level prefix directory plus a remainder
/// filename: `ab/cd/ef…`. Keeps directory fan-out bounded on filesystem
/// back-ends.
pub fn hashed_path(digest: &Digest) -> (String, String) {
    let hex = digest.hex();
    let mut folder = String::with_capacity(PATH_DEPTH * 3);
    let mut rest = hex.as_str();
    for level in 0..PATH_DEPTH {
        let (prefix, tail) = rest.split_at(2);
        if level > 0 {
            folder.push('/');
        }
        folder.push_str(prefix);
        rest = tail;
    }
    (folder, rest.to_string())
}

/// Full relative path of a digest under a segment root.
pub fn segment_path(digest: &Digest) -> String {
    let (folder, filename) = hashed_path(digest);
    format!("{folder}/{filename}")
}

/// Inverse of [`segment_path`]: flattens a walked path back into a digest.
/// Returns `None` for paths that are not digest-shaped (changelog files,
/// archive subtrees, …).
pub fn digest_from_path(path: &str) -> Option<Digest> {
    let flat: String = path.split('/').collect();
    Digest::from_hex(&flat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_hex_round_trip() {
        let digest = Digest::of(b"ham");
        let hex = digest.hex();
        assert_eq!(hex.len(), DIGEST_LEN * 2);
        assert_eq!(Digest::from_hex(&hex), Some(digest));
        assert_eq!(Digest::from_hex("zz"), None);
    }

    #[test]
    fn test_hashed_path_splits_prefixes() {
        let digest = Digest::of(b"spam");
        let (folder, filename) = hashed_path(&digest);
        let hex = digest.hex();
        assert_eq!(folder, format!("{}/{}", &hex[..2], &hex[2..4]));
        assert_eq!(filename, &hex[4..]);
        assert_eq!(digest_from_path(&segment_path(&digest)), Some(digest));
        assert_eq!(digest_from_path("archive/ab/cd"), None);
    }
}
