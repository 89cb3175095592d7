// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Pure mapping from logical `(domain, relative path)` pairs to paths in
//! the coordination namespace and in the physical backend. No state, no
//! I/O. Two logically-equal paths always normalize to the same string, so
//! they hash and compare equal everywhere downstream.

use crate::domain::Container;

/// Builds coordination and backend paths for one mounted filesystem.
#[derive(Debug, Clone, PartialEq)]
pub struct PathBuilder {
    base_path: String,
    fs_name: String,
}

impl PathBuilder {
    pub fn new(base_path: &str, fs_name: &str) -> Self {
        Self {
            base_path: normalize(base_path),
            fs_name: fs_name.to_string(),
        }
    }

    /// Root of this filesystem inside the coordination namespace.
    pub fn fs_root(&self) -> String {
        if self.base_path.is_empty() {
            format!("/{}", self.fs_name)
        } else {
            format!("/{}/{}", self.base_path, self.fs_name)
        }
    }

    /// Coordination path of a domain's root node.
    pub fn domain_root(&self, domain: &str) -> String {
        format!("{}/{}", self.fs_root(), encode_segment(domain))
    }

    /// Coordination path for a relative logical path within a domain. Each
    /// segment is re-encoded to strip characters the namespace forbids.
    pub fn coord_path(&self, domain: &str, relative: &str) -> String {
        let mut out = self.domain_root(domain);
        for segment in segments(relative) {
            out.push('/');
            out.push_str(&encode_segment(segment));
        }
        out
    }

    /// Recover the relative logical path from a coordination path, or
    /// `None` when the path lies outside the given domain.
    pub fn relative_from_coord(&self, domain: &str, coord_path: &str) -> Option<String> {
        let root = self.domain_root(domain);
        if coord_path == root {
            return Some(String::new());
        }
        let rest = coord_path.strip_prefix(&root)?.strip_prefix('/')?;
        let decoded: Vec<String> = rest.split('/').map(decode_segment).collect();
        Some(decoded.join("/"))
    }

    /// Physical path for a relative logical path within a container.
    pub fn backend_path(container: &Container, relative: &str) -> String {
        let root = container.backend_root.trim_end_matches('/');
        let rel = normalize(relative);
        if rel.is_empty() {
            root.to_string()
        } else {
            format!("{root}/{rel}")
        }
    }

    /// Recover the relative logical path from a backend path, or `None`
    /// when the path lies outside the container's root.
    pub fn relative_from_backend(container: &Container, backend_path: &str) -> Option<String> {
        let root = container.backend_root.trim_end_matches('/');
        if backend_path == root {
            return Some(String::new());
        }
        backend_path
            .strip_prefix(root)?
            .strip_prefix('/')
            .map(str::to_string)
    }
}

/// Collapse duplicate separators and strip leading/trailing ones, so that
/// logically-equal paths are textually equal.
pub fn normalize(relative: &str) -> String {
    segments(relative).collect::<Vec<_>>().join("/")
}

/// The non-empty segments of a relative path.
pub fn segments(relative: &str) -> impl Iterator<Item = &str> {
    relative.split('/').filter(|s| !s.is_empty() && *s != ".")
}

/// Join a relative directory path and a child name.
pub fn join_relative(dir: &str, name: &str) -> String {
    let dir = normalize(dir);
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Split a relative path into its parent directory and final name.
/// The parent of a top-level name is the empty (root) path.
pub fn split_relative(relative: &str) -> Option<(String, String)> {
    let rel = normalize(relative);
    if rel.is_empty() {
        return None;
    }
    match rel.rfind('/') {
        Some(idx) => Some((rel[..idx].to_string(), rel[idx + 1..].to_string())),
        None => Some((String::new(), rel)),
    }
}

const fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~')
}

/// Percent-encode one path segment so it is legal as a coordination
/// namespace node name. Idempotence comes from always decoding with
/// [`decode_segment`], never re-encoding an encoded segment.
pub fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push_str(&format!("{b:02X}"));
        }
    }
    out
}

/// Reverse of [`encode_segment`]. Malformed escapes pass through verbatim.
pub fn decode_segment(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> Container {
        Container {
            domain: "docs".to_string(),
            backend_root: "/data/docs".to_string(),
            default: true,
        }
    }

    fn builder() -> PathBuilder {
        PathBuilder::new("/millpond", "main")
    }

    #[test]
    fn normalization_is_deterministic() {
        assert_eq!(normalize("a//b/"), "a/b");
        assert_eq!(normalize("/a/b"), "a/b");
        assert_eq!(normalize("a/./b"), "a/b");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("///"), "");
        // logically-equal paths compare equal after normalization
        assert_eq!(normalize("reports//q1.pdf/"), normalize("/reports/q1.pdf"));
    }

    #[test]
    fn coordination_path_round_trip() {
        let b = builder();
        for p in ["reports/q1.pdf", "a/b/c", "one segment/with space", "x"] {
            let coord = b.coord_path("docs", p);
            assert_eq!(
                b.relative_from_coord("docs", &coord).as_deref(),
                Some(normalize(p).as_str()),
            );
        }
        assert_eq!(b.relative_from_coord("docs", &b.domain_root("docs")), Some(String::new()));
        assert_eq!(b.relative_from_coord("docs", "/elsewhere/x"), None);
    }

    #[test]
    fn backend_path_round_trip() {
        let c = container();
        for p in ["reports/q1.pdf", "a/b/c", "x"] {
            let backend = PathBuilder::backend_path(&c, p);
            assert_eq!(
                PathBuilder::relative_from_backend(&c, &backend).as_deref(),
                Some(p),
            );
        }
        assert_eq!(PathBuilder::backend_path(&c, ""), "/data/docs");
    }

    #[test]
    fn segments_are_encoded_for_the_namespace() {
        let b = builder();
        let coord = b.coord_path("docs", "with space/and%percent");
        assert_eq!(coord, "/millpond/main/docs/with%20space/and%25percent");
        assert_eq!(
            b.relative_from_coord("docs", &coord).as_deref(),
            Some("with space/and%percent"),
        );
    }

    #[test]
    fn encode_decode_segment_round_trip() {
        for s in ["plain", "with space", "sla/sh", "per%cent", "ünïcode"] {
            assert_eq!(decode_segment(&encode_segment(s)), s);
        }
    }

    #[test]
    fn split_and_join() {
        assert_eq!(
            split_relative("reports/q1.pdf"),
            Some(("reports".to_string(), "q1.pdf".to_string()))
        );
        assert_eq!(split_relative("top"), Some((String::new(), "top".to_string())));
        assert_eq!(split_relative(""), None);
        assert_eq!(join_relative("", "top"), "top");
        assert_eq!(join_relative("reports", "q1.pdf"), "reports/q1.pdf");
    }
}
