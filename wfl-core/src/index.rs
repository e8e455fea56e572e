//! Symbolic tensor indices and multi-indices.
//!
//! Tensor-valued expressions are subscripted with tuples mixing three kinds of entries: symbolic
//! indices ([`Index`]) that may be free or become summation indices when repeated, fixed integer
//! components ([`FixedIndex`](IndexBase::Fixed)), and the full-slice wildcard
//! ([`Axis`](IndexBase::Axis)) standing for "take the whole range of this dimension".
//!
//! An [`Index`] is identified by a process-wide monotonically increasing count, never by its
//! optional display name: two indices created with the same name are still distinct, and two
//! handles carrying the same count are the same index wherever they appear.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Identity source for [`Index`]. Counts are never reused or decremented.
static INDEX_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// An index tuple that cannot be applied to the expression it subscripts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedIndexError {
    #[error("found more than one ellipsis in index tuple")]
    DuplicateEllipsis,

    #[error("index tuple of length {given} does not fit an expression of rank {rank}")]
    RankMismatch { given: usize, rank: usize },

    #[error("too many repetitions of index {index} in ({indices})")]
    TooManyRepetitions { index: String, indices: String },
}

/// A symbolic tensor index, identified by a process-wide count.
#[derive(Debug, Clone, Eq)]
pub struct Index {
    name: Option<String>,
    count: usize,
}

impl Index {
    /// Creates a fresh index with the next unused identity.
    pub fn new() -> Self {
        Self {
            name: None,
            count: INDEX_COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Creates a fresh index with a display name. The name does not take part in identity.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new()
        }
    }

    /// Creates an index with an explicit identity, raising the global counter above it so the
    /// identity can never be handed out again by [`Index::new`].
    pub fn with_count(count: usize) -> Self {
        INDEX_COUNTER.fetch_max(count + 1, Ordering::Relaxed);
        Self { name: None, count }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity is the count alone; the name is cosmetic.
impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count
    }
}

impl std::hash::Hash for Index {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.count.hash(state);
    }
}

impl PartialOrd for Index {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Index {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.count.cmp(&other.count)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i_{}", self.count)
    }
}

/// One resolved entry of a [`MultiIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexBase {
    /// A symbolic index.
    Index(Index),

    /// A concrete component.
    Fixed(usize),

    /// The full range of this dimension.
    Axis,
}

impl fmt::Display for IndexBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Fixed(v) => write!(f, "{v}"),
            Self::Axis => write!(f, ":"),
        }
    }
}

/// One entry of an index tuple as written by the user, before ellipsis expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexItem {
    Index(Index),
    Fixed(usize),
    /// A full slice, `:`.
    Full,
    /// `...`; expands to as many [`IndexBase::Axis`] entries as the rank requires.
    Ellipsis,
}

/// An ordered tuple of index entries whose length equals the rank of the subscripted expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MultiIndex {
    indices: Vec<IndexBase>,
}

impl MultiIndex {
    /// Builds a multi-index for an expression of the given rank.
    ///
    /// At most one [`IndexItem::Ellipsis`] is accepted; it expands into the number of
    /// [`IndexBase::Axis`] entries needed to reach `rank`. Without an ellipsis the item count
    /// must equal `rank` exactly. A symbolic index may appear at most twice (a repeated index
    /// denotes summation).
    pub fn new(items: Vec<IndexItem>, rank: usize) -> Result<Self, MalformedIndexError> {
        let mut pre = Vec::new();
        let mut post = Vec::new();
        let mut seen_ellipsis = false;
        for item in items {
            match item {
                IndexItem::Ellipsis => {
                    if seen_ellipsis {
                        return Err(MalformedIndexError::DuplicateEllipsis);
                    }
                    seen_ellipsis = true;
                }
                IndexItem::Index(i) => {
                    let target = if seen_ellipsis { &mut post } else { &mut pre };
                    target.push(IndexBase::Index(i));
                }
                IndexItem::Fixed(v) => {
                    let target = if seen_ellipsis { &mut post } else { &mut pre };
                    target.push(IndexBase::Fixed(v));
                }
                IndexItem::Full => {
                    let target = if seen_ellipsis { &mut post } else { &mut pre };
                    target.push(IndexBase::Axis);
                }
            }
        }

        let given = pre.len() + post.len();
        if given > rank || (!seen_ellipsis && given != rank) {
            return Err(MalformedIndexError::RankMismatch { given, rank });
        }

        let mut indices = pre;
        indices.extend(std::iter::repeat(IndexBase::Axis).take(rank - given));
        indices.extend(post);

        let multi_index = Self { indices };
        // Rejects more than two occurrences of the same symbolic index.
        extract_indices(&multi_index)?;
        Ok(multi_index)
    }

    /// Builds a multi-index from already-resolved entries, validating repetitions only.
    pub fn from_indices(indices: Vec<IndexBase>) -> Result<Self, MalformedIndexError> {
        let multi_index = Self { indices };
        extract_indices(&multi_index)?;
        Ok(multi_index)
    }

    pub fn indices(&self) -> &[IndexBase] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

impl fmt::Display for MultiIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.indices.iter();
        if let Some(i) = iter.next() {
            write!(f, "{i}")?;
            for i in iter {
                write!(f, ", {i}")?;
            }
        }
        Ok(())
    }
}

/// The classification of a multi-index's entries produced by [`extract_indices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedIndices {
    /// `(position, component)` pairs of the fixed entries.
    pub fixed: Vec<(usize, usize)>,

    /// Symbolic indices occurring exactly once, in first-occurrence order.
    pub free: Vec<Index>,

    /// Symbolic indices occurring exactly twice (summation indices), in first-occurrence order.
    pub repeated: Vec<Index>,

    /// Number of [`IndexBase::Axis`] entries.
    pub axes: usize,
}

/// Classifies the entries of a multi-index into fixed, free, repeated and axis entries.
///
/// Fails if any symbolic index occurs more than twice. On success the bookkeeping identity
/// `fixed + free + 2 * repeated + axes == len` holds.
pub fn extract_indices(multi_index: &MultiIndex) -> Result<ExtractedIndices, MalformedIndexError> {
    let mut fixed = Vec::new();
    let mut axes = 0;
    let mut counts: Vec<(Index, usize)> = Vec::new();

    for (position, entry) in multi_index.indices().iter().enumerate() {
        match entry {
            IndexBase::Fixed(v) => fixed.push((position, *v)),
            IndexBase::Axis => axes += 1,
            IndexBase::Index(i) => {
                if let Some(slot) = counts.iter_mut().find(|(seen, _)| seen == i) {
                    slot.1 += 1;
                } else {
                    counts.push((i.clone(), 1));
                }
            }
        }
    }

    if let Some((index, _)) = counts.iter().find(|(_, n)| *n > 2) {
        return Err(MalformedIndexError::TooManyRepetitions {
            index: index.to_string(),
            indices: multi_index.to_string(),
        });
    }

    let free = counts
        .iter()
        .filter(|(_, n)| *n == 1)
        .map(|(i, _)| i.clone())
        .collect::<Vec<_>>();
    let repeated = counts
        .iter()
        .filter(|(_, n)| *n == 2)
        .map(|(i, _)| i.clone())
        .collect::<Vec<_>>();

    debug_assert_eq!(
        fixed.len() + free.len() + 2 * repeated.len() + axes,
        multi_index.len(),
    );

    Ok(ExtractedIndices { fixed, free, repeated, axes })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use super::*;

    #[test]
    fn fresh_indices_are_distinct() {
        let a = Index::named("i");
        let b = Index::named("i");
        assert_ne!(a, b);
        assert!(b.count() > a.count());
    }

    #[test]
    fn explicit_count_raises_counter() {
        let reused = Index::with_count(INDEX_COUNTER.load(Ordering::Relaxed) + 100);
        let fresh = Index::new();
        assert!(fresh.count() > reused.count());
    }

    #[test]
    fn ellipsis_expands_to_axes() {
        let i = Index::new();
        let mi = MultiIndex::new(
            vec![IndexItem::Index(i.clone()), IndexItem::Ellipsis],
            3,
        )
        .unwrap();
        assert_eq!(
            mi.indices(),
            &[IndexBase::Index(i), IndexBase::Axis, IndexBase::Axis],
        );
    }

    #[test]
    fn duplicate_ellipsis_is_rejected() {
        let err = MultiIndex::new(vec![IndexItem::Ellipsis, IndexItem::Ellipsis], 2).unwrap_err();
        assert_eq!(err, MalformedIndexError::DuplicateEllipsis);
    }

    #[test]
    fn tuple_longer_than_rank_is_rejected() {
        let err = MultiIndex::new(vec![IndexItem::Fixed(0), IndexItem::Fixed(1)], 1).unwrap_err();
        assert_eq!(err, MalformedIndexError::RankMismatch { given: 2, rank: 1 });
    }

    #[test]
    fn triple_repetition_is_rejected() {
        let i = Index::new();
        let items = vec![
            IndexItem::Index(i.clone()),
            IndexItem::Index(i.clone()),
            IndexItem::Index(i),
        ];
        assert!(matches!(
            MultiIndex::new(items, 3),
            Err(MalformedIndexError::TooManyRepetitions { .. }),
        ));
    }

    #[test]
    fn extract_indices_classifies_entries() {
        let i = Index::new();
        let j = Index::new();
        let mi = MultiIndex::from_indices(vec![
            IndexBase::Index(i.clone()),
            IndexBase::Fixed(1),
            IndexBase::Index(j.clone()),
            IndexBase::Index(j.clone()),
            IndexBase::Axis,
        ])
        .unwrap();

        let extracted = extract_indices(&mi).unwrap();
        assert_eq!(extracted.fixed, vec![(1, 1)]);
        assert_eq!(extracted.free, vec![i]);
        assert_eq!(extracted.repeated, vec![j]);
        assert_eq!(extracted.axes, 1);
    }
}
