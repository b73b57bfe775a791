//! Name resolution, AmigaDOS glob matching, and directory-tree construction
//! over a [`crate::fs::FileSystem`].
//!
//! Patterns are split on `/` and each component is compiled independently
//! into a small token list (`*` = any run, `?` = any single byte, everything
//! else literal) rather than handed to a general-purpose regex engine —
//! there's nothing in this crate's dependency stack that wants one, and a
//! hand-rolled backtracking matcher over a 30-byte BCPL name is plenty fast.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cmp::Ordering;

use crate::error::{AffsError, Result};
use crate::volume::fold_upper;

#[derive(Debug, Clone, Copy)]
enum GlobToken {
    Char(u8),
    AnyChar,
    AnyRun,
}

fn compile_component(bytes: &[u8]) -> Vec<GlobToken> {
    bytes
        .iter()
        .map(|&c| match c {
            b'*' => GlobToken::AnyRun,
            b'?' => GlobToken::AnyChar,
            c => GlobToken::Char(c),
        })
        .collect()
}

fn match_tokens(tokens: &[GlobToken], name: &[u8], intl: bool) -> bool {
    match tokens.split_first() {
        None => name.is_empty(),
        Some((GlobToken::AnyRun, rest)) => {
            if match_tokens(rest, name, intl) {
                return true;
            }
            match name.split_first() {
                Some((_, tail)) => match_tokens(tokens, tail, intl),
                None => false,
            }
        }
        Some((GlobToken::AnyChar, rest)) => match name.split_first() {
            Some((_, tail)) => match_tokens(rest, tail, intl),
            None => false,
        },
        Some((GlobToken::Char(c), rest)) => match name.split_first() {
            Some((&n, tail)) if fold_upper(*c, intl) == fold_upper(n, intl) => match_tokens(rest, tail, intl),
            _ => false,
        },
    }
}

/// A compiled AmigaDOS glob, split on `/` into independently-matched path
/// components (`*` matches any run of bytes, `?` matches exactly one).
#[derive(Debug, Clone)]
pub struct Pattern {
    absolute: bool,
    components: Vec<Vec<GlobToken>>,
}

impl Pattern {
    /// Compile `pattern`. A leading `/` anchors the match at the volume
    /// root rather than the search's starting directory. Empty components
    /// (`a//b`, a trailing `/`) are dropped.
    pub fn compile(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(AffsError::InvalidRegex);
        }
        let bytes = pattern.as_bytes();
        let absolute = bytes[0] == b'/';
        let body = if absolute { &bytes[1..] } else { bytes };
        let components: Vec<Vec<GlobToken>> =
            body.split(|&b| b == b'/').filter(|c| !c.is_empty()).map(compile_component).collect();
        if components.is_empty() {
            return Err(AffsError::InvalidRegex);
        }
        Ok(Self { absolute, components })
    }

    /// Whether this pattern is anchored at the volume root.
    #[inline]
    pub const fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Number of path components in this pattern.
    #[inline]
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// Whether `name` matches the component at `index`.
    pub fn component_matches(&self, index: usize, name: &[u8], intl: bool) -> bool {
        self.components.get(index).is_some_and(|tokens| match_tokens(tokens, name, intl))
    }
}

/// Options controlling [`crate::fs::FileSystem::build_tree`].
pub struct FsOpt {
    /// Maximum recursion depth below the starting directory (`0` = just the
    /// starting entry itself, no children). Defaults to unbounded.
    pub depth: u32,
    /// Optional predicate; an entry (and, if a directory, everything under
    /// it) is skipped entirely when this returns `false`.
    pub accept: Option<Box<dyn Fn(u32) -> bool>>,
    /// Optional comparator used to order siblings by name before recursing.
    pub sort: Option<Box<dyn Fn(&str, &str) -> Ordering>>,
}

impl Default for FsOpt {
    fn default() -> Self {
        Self { depth: u32::MAX, accept: None, sort: None }
    }
}

/// One node of a tree built by [`crate::fs::FileSystem::build_tree`]: a
/// block number plus its already-visited children, in sibling order.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// This node's block number.
    pub nr: u32,
    /// Child nodes, present only when `nr` is a directory.
    pub children: Vec<TreeNode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_splits_on_slash() {
        let p = Pattern::compile("foo/*.txt").unwrap();
        assert!(!p.is_absolute());
        assert_eq!(p.depth(), 2);
    }

    #[test]
    fn test_compile_absolute() {
        let p = Pattern::compile("/s/startup-sequence").unwrap();
        assert!(p.is_absolute());
        assert_eq!(p.depth(), 2);
    }

    #[test]
    fn test_compile_rejects_empty() {
        assert!(Pattern::compile("").is_err());
    }

    #[test]
    fn test_star_matches_any_run() {
        let p = Pattern::compile("*.info").unwrap();
        assert!(p.component_matches(0, b"Disk.info", false));
        assert!(p.component_matches(0, b".info", false));
        assert!(!p.component_matches(0, b"Disk.infoo", false));
    }

    #[test]
    fn test_question_matches_one_byte() {
        let p = Pattern::compile("a?c").unwrap();
        assert!(p.component_matches(0, b"abc", false));
        assert!(!p.component_matches(0, b"ac", false));
        assert!(!p.component_matches(0, b"abbc", false));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let p = Pattern::compile("STARTUP-SEQUENCE").unwrap();
        assert!(p.component_matches(0, b"startup-sequence", false));
    }
}
