//! Composite identifiers for association-only resources.
//!
//! An association has no remote id of its own; its id is `<left>/<right>`.
//! Components must not contain the separator (remote ids never do).

use crate::error::{ProviderError, ProviderResult};

pub const SEPARATOR: char = '/';

pub fn pack(left: &str, right: &str) -> String {
    let mut id = String::with_capacity(left.len() + right.len() + 1);
    id.push_str(left);
    id.push(SEPARATOR);
    id.push_str(right);
    id
}

/// Split on the first separator. Empty components are accepted here.
pub fn unpack(id: &str) -> ProviderResult<(&str, &str)> {
    CompositeId::new("composite", "left", "right").unpack(id)
}

/// Codec labelled with the resource kind and component names, so decode
/// failures point at the offending resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeId {
    pub kind: &'static str,
    pub left: &'static str,
    pub right: &'static str,
}

impl CompositeId {
    pub const fn new(kind: &'static str, left: &'static str, right: &'static str) -> Self {
        Self { kind, left, right }
    }

    pub fn pack(&self, left: &str, right: &str) -> String {
        pack(left, right)
    }

    pub fn unpack<'a>(&self, id: &'a str) -> ProviderResult<(&'a str, &'a str)> {
        id.split_once(SEPARATOR).ok_or_else(|| ProviderError::MalformedIdentifier {
            kind: self.kind,
            id: id.to_string(),
            expected: self.expected(),
        })
    }

    pub fn expected(&self) -> String {
        format!("<{}>{}<{}>", self.left, SEPARATOR, self.right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_then_unpack_yields_components() {
        for (l, r) in [("user-1", "team-1"), ("", "team-2"), ("user-3", ""), ("u", "t")] {
            let id = pack(l, r);
            assert_eq!(unpack(&id).unwrap(), (l, r));
        }
    }

    #[test]
    fn unpack_splits_on_first_separator_only() {
        assert_eq!(unpack("a/b/c").unwrap(), ("a", "b/c"));
    }

    #[test]
    fn missing_separator_is_malformed() {
        let err = unpack("no-separator-here").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedIdentifier { ref id, .. } if id == "no-separator-here"));
    }

    #[test]
    fn labelled_codec_reports_expected_shape() {
        let codec = CompositeId::new("iam user membership", "user_id", "team_id");
        let msg = codec.unpack("user-1").unwrap_err().to_string();
        assert_eq!(msg, "invalid iam user membership ID format: user-1 (expected <user_id>/<team_id>)");
        assert_eq!(codec.pack("user-1", "team-1"), "user-1/team-1");
    }
}
