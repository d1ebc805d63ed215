//! Label sets, label builders, and selector matchers
//!
//! A [`Labels`] value is an ordered, deduplicated mapping from label name to
//! label value. The special label `__name__` carries the metric name.
//!
//! Label sets admit a stable 64-bit hash and byte canonicalizations
//! restricted to (or excluding) a named subset of labels; binary operators
//! use those to compute join signatures.

use std::fmt;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// The label name carrying the metric name
pub const METRIC_NAME: &str = "__name__";

/// Separator byte between names and values in canonical label bytes
///
/// 0xff cannot occur inside valid UTF-8 label names or values, so the
/// canonical form is unambiguous.
const SEP: u8 = 0xff;

/// A single name/value pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label {
    /// Label name
    pub name: String,
    /// Label value
    pub value: String,
}

impl Label {
    /// Create a new label
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An ordered, deduplicated label set
///
/// Labels are kept sorted by name with unique names. Construction through
/// [`Labels::from_pairs`] or [`LabelsBuilder`] maintains the invariant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Labels(Vec<Label>);

impl Labels {
    /// The empty label set
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Build a label set from name/value pairs
    ///
    /// Pairs are sorted by name; a repeated name keeps the first value.
    pub fn from_pairs<N, V>(pairs: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        let mut labels: Vec<Label> = pairs
            .into_iter()
            .map(|(n, v)| Label::new(n, v))
            .collect();
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        labels.dedup_by(|a, b| a.name == b.name);
        Self(labels)
    }

    /// Number of labels in the set
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the set has no labels
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value of the named label, if present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|i| self.0[i].value.as_str())
    }

    /// True if the named label is present
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate over labels in name order
    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.0.iter()
    }

    /// Stable 64-bit hash of the full label set
    pub fn hash(&self) -> u64 {
        let mut buf = Vec::with_capacity(self.0.len() * 16);
        for l in &self.0 {
            buf.extend_from_slice(l.name.as_bytes());
            buf.push(SEP);
            buf.extend_from_slice(l.value.as_bytes());
            buf.push(SEP);
        }
        xxh3_64(&buf)
    }

    /// Canonical bytes of the labels named in `names`, written into `buf`
    ///
    /// `names` must be sorted. The returned slice borrows `buf`.
    pub fn bytes_with_labels<'a>(&self, buf: &'a mut Vec<u8>, names: &[String]) -> &'a [u8] {
        buf.clear();
        for l in &self.0 {
            if names.binary_search_by(|n| n.as_str().cmp(&l.name)).is_ok() {
                buf.extend_from_slice(l.name.as_bytes());
                buf.push(SEP);
                buf.extend_from_slice(l.value.as_bytes());
                buf.push(SEP);
            }
        }
        buf.as_slice()
    }

    /// Canonical bytes of all labels except those named in `names`
    ///
    /// `names` must be sorted. The returned slice borrows `buf`.
    pub fn bytes_without_labels<'a>(&self, buf: &'a mut Vec<u8>, names: &[String]) -> &'a [u8] {
        buf.clear();
        for l in &self.0 {
            if names.binary_search_by(|n| n.as_str().cmp(&l.name)).is_err() {
                buf.extend_from_slice(l.name.as_bytes());
                buf.push(SEP);
                buf.extend_from_slice(l.value.as_bytes());
                buf.push(SEP);
            }
        }
        buf.as_slice()
    }

    /// Copy of this set without the `__name__` label
    pub fn drop_metric_name(&self) -> Labels {
        Self(
            self.0
                .iter()
                .filter(|l| l.name != METRIC_NAME)
                .cloned()
                .collect(),
        )
    }

    /// Copy restricted to the labels named in `names`
    pub fn with_labels(&self, names: &[String]) -> Labels {
        Self(
            self.0
                .iter()
                .filter(|l| names.iter().any(|n| n == &l.name))
                .cloned()
                .collect(),
        )
    }

    /// Copy excluding the labels named in `names` and `__name__`
    pub fn without_labels(&self, names: &[String]) -> Labels {
        Self(
            self.0
                .iter()
                .filter(|l| l.name != METRIC_NAME && !names.iter().any(|n| n == &l.name))
                .cloned()
                .collect(),
        )
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, l) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", l.name, l.value)?;
        }
        write!(f, "}}")
    }
}

impl<'a> IntoIterator for &'a Labels {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Join signature function over label sets
///
/// Hashes either the matching labels only (`on`) or everything except the
/// matching labels and `__name__` (`ignoring`). Holds a scratch buffer so
/// repeated signature computation does not allocate.
pub struct SignatureFunc {
    on: bool,
    names: Vec<String>,
    buf: Vec<u8>,
}

impl SignatureFunc {
    /// Create a signature function for the given matching mode and labels
    pub fn new(on: bool, names: &[String]) -> Self {
        let mut names: Vec<String> = names.to_vec();
        if !on {
            names.push(METRIC_NAME.to_string());
        }
        names.sort();
        names.dedup();
        Self {
            on,
            names,
            buf: Vec::with_capacity(256),
        }
    }

    /// Signature of the label set under this matching mode
    pub fn signature(&mut self, labels: &Labels) -> u64 {
        let bytes = if self.on {
            labels.bytes_with_labels(&mut self.buf, &self.names)
        } else {
            labels.bytes_without_labels(&mut self.buf, &self.names)
        };
        xxh3_64(bytes)
    }
}

/// Incremental label-set builder
///
/// Mirrors the mutation surface binary operators need: `reset` to a base
/// set, `set`/`del` individual labels, `keep` a subset, then `labels()` to
/// materialize the result.
#[derive(Debug, Default)]
pub struct LabelsBuilder {
    base: Labels,
    add: Vec<Label>,
    del: Vec<String>,
}

impl LabelsBuilder {
    /// Create a builder over the empty label set
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard pending mutations and start over from `base`
    pub fn reset(&mut self, base: &Labels) -> &mut Self {
        self.base = base.clone();
        self.add.clear();
        self.del.clear();
        self
    }

    /// Set a label; an empty value deletes it
    pub fn set(&mut self, name: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            return self.del(name);
        }
        self.del.retain(|n| n != name);
        if let Some(l) = self.add.iter_mut().find(|l| l.name == name) {
            l.value = value.to_string();
        } else {
            self.add.push(Label::new(name, value));
        }
        self
    }

    /// Delete a label
    pub fn del(&mut self, name: &str) -> &mut Self {
        self.add.retain(|l| l.name != name);
        if !self.del.iter().any(|n| n == name) {
            self.del.push(name.to_string());
        }
        self
    }

    /// Delete several labels
    pub fn del_all(&mut self, names: &[String]) -> &mut Self {
        for n in names {
            self.del(n);
        }
        self
    }

    /// Keep only the named labels, deleting everything else
    pub fn keep(&mut self, names: &[String]) -> &mut Self {
        let to_delete: Vec<String> = self
            .base
            .iter()
            .filter(|l| !names.iter().any(|n| n == &l.name))
            .map(|l| l.name.clone())
            .collect();
        for n in &to_delete {
            self.del(n);
        }
        self.add.retain(|l| names.iter().any(|n| n == &l.name));
        self
    }

    /// Materialize the resulting label set
    pub fn labels(&self) -> Labels {
        let mut out: Vec<Label> = self
            .base
            .iter()
            .filter(|l| !self.del.iter().any(|n| n == &l.name))
            .filter(|l| !self.add.iter().any(|a| a.name == l.name))
            .cloned()
            .collect();
        out.extend(self.add.iter().cloned());
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Labels(out)
    }
}

/// Matcher comparison mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    /// Exact equality
    Equal,
    /// Exact inequality
    NotEqual,
    /// Regular expression match
    Regex,
    /// Negated regular expression match
    NotRegex,
}

/// A label selector matcher, as carried by vector/matrix selectors
///
/// The execution core only inspects matchers to synthesize the output
/// series of `absent`; actual series selection happens in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    /// Label name to match against
    pub name: String,
    /// Value or pattern to match
    pub value: String,
    /// Comparison mode
    pub op: MatchOp,
}

impl Matcher {
    /// Equality matcher
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            op: MatchOp::Equal,
        }
    }

    /// Inequality matcher
    pub fn not_equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            op: MatchOp::NotEqual,
        }
    }

    /// Regex matcher
    pub fn regex(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            op: MatchOp::Regex,
        }
    }
}
