//! Purpose: Merge sorted object streams through a balanced tree of two-way mergers.
//! Exports: `MergingObjectSource`, `MergeNode`, `Comparator`, `merge`, `merge_by_key`, `merge_natural`.
//! Role: Recombines independently sorted partitions into one global order.
//! Invariants: Once primed, a head is `None` only when its child is exhausted.
//! Invariants: Ties go to the left child.
use std::cmp::Ordering;
use std::sync::Arc;

use tracing::trace;

use crate::core::error::{close_all, Error, Result};
use crate::core::source::ObjectSource;

pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// One position in a merge tree.
pub enum MergeNode<T, S> {
    Empty,
    Leaf(S),
    Branch(Box<MergingObjectSource<T, S>>),
}

impl<T, S> MergeNode<T, S> {
    pub fn is_empty_node(&self) -> bool {
        matches!(self, MergeNode::Empty)
    }

    /// Edges on the longest path to a leaf.
    pub fn max_height(&self) -> usize {
        match self {
            MergeNode::Empty | MergeNode::Leaf(_) => 0,
            MergeNode::Branch(branch) => branch.max_height(),
        }
    }

    pub fn min_height(&self) -> usize {
        match self {
            MergeNode::Empty | MergeNode::Leaf(_) => 0,
            MergeNode::Branch(branch) => branch.min_height(),
        }
    }

    pub fn is_balanced(&self) -> bool {
        match self {
            MergeNode::Empty | MergeNode::Leaf(_) => true,
            MergeNode::Branch(branch) => branch.is_balanced(),
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            MergeNode::Empty => 0,
            MergeNode::Leaf(_) => 1,
            MergeNode::Branch(branch) => branch.leaf_count(),
        }
    }

    pub fn tree_string(&self) -> String {
        let mut out = String::new();
        self.write_tree(&mut out);
        out
    }

    fn write_tree(&self, out: &mut String) {
        match self {
            MergeNode::Empty => out.push_str("empty"),
            MergeNode::Leaf(_) => out.push_str("leaf"),
            MergeNode::Branch(branch) => branch.write_tree(out),
        }
    }
}

impl<T, S: ObjectSource<T>> ObjectSource<T> for MergeNode<T, S> {
    fn has_next(&mut self) -> Result<bool> {
        match self {
            MergeNode::Empty => Ok(false),
            MergeNode::Leaf(source) => source.has_next(),
            MergeNode::Branch(branch) => branch.has_next(),
        }
    }

    fn read(&mut self) -> Result<T> {
        match self {
            MergeNode::Empty => Err(Error::exhausted("source is empty")),
            MergeNode::Leaf(source) => source.read(),
            MergeNode::Branch(branch) => branch.read(),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self {
            MergeNode::Empty => Ok(()),
            MergeNode::Leaf(source) => source.close(),
            MergeNode::Branch(branch) => branch.close(),
        }
    }

    fn is_open(&self) -> bool {
        match self {
            MergeNode::Empty => false,
            MergeNode::Leaf(source) => source.is_open(),
            MergeNode::Branch(branch) => branch.is_open(),
        }
    }
}

/// Two-way merge of sorted children, primed lazily on first use.
pub struct MergingObjectSource<T, S> {
    comparator: Comparator<T>,
    left: MergeNode<T, S>,
    right: MergeNode<T, S>,
    left_head: Option<T>,
    right_head: Option<T>,
    left_primed: bool,
    right_primed: bool,
}

impl<T, S> MergingObjectSource<T, S> {
    pub fn new(comparator: Comparator<T>, left: MergeNode<T, S>, right: MergeNode<T, S>) -> Self {
        Self {
            comparator,
            left,
            right,
            left_head: None,
            right_head: None,
            left_primed: false,
            right_primed: false,
        }
    }

    pub fn left(&self) -> &MergeNode<T, S> {
        &self.left
    }

    pub fn right(&self) -> &MergeNode<T, S> {
        &self.right
    }

    pub fn max_height(&self) -> usize {
        1 + self.left.max_height().max(self.right.max_height())
    }

    pub fn min_height(&self) -> usize {
        1 + self.left.min_height().min(self.right.min_height())
    }

    /// Sibling heights differ by at most one at every branch.
    pub fn is_balanced(&self) -> bool {
        self.left.max_height().abs_diff(self.right.max_height()) <= 1
            && self.left.is_balanced()
            && self.right.is_balanced()
    }

    pub fn leaf_count(&self) -> usize {
        self.left.leaf_count() + self.right.leaf_count()
    }

    pub fn tree_string(&self) -> String {
        let mut out = String::new();
        self.write_tree(&mut out);
        out
    }

    fn write_tree(&self, out: &mut String) {
        out.push('(');
        self.left.write_tree(out);
        out.push(' ');
        self.right.write_tree(out);
        out.push(')');
    }
}

impl<T, S: ObjectSource<T>> MergingObjectSource<T, S> {
    // Each side is primed once; a failed pop leaves that side to retry.
    fn initialise(&mut self) -> Result<()> {
        if self.left_primed && self.right_primed {
            return Ok(());
        }
        if !self.left_primed {
            self.left_head = pop(&mut self.left)?;
            self.left_primed = true;
        }
        if !self.right_primed {
            self.right_head = pop(&mut self.right)?;
            self.right_primed = true;
        }
        trace!(
            left = self.left_head.is_some(),
            right = self.right_head.is_some(),
            "primed merge node"
        );
        Ok(())
    }

    fn take_left(&mut self) -> Result<T> {
        let next = pop(&mut self.left)?;
        std::mem::replace(&mut self.left_head, next)
            .ok_or_else(|| Error::exhausted("left merge head is empty"))
    }

    fn take_right(&mut self) -> Result<T> {
        let next = pop(&mut self.right)?;
        std::mem::replace(&mut self.right_head, next)
            .ok_or_else(|| Error::exhausted("right merge head is empty"))
    }
}

fn pop<T, S: ObjectSource<T>>(node: &mut MergeNode<T, S>) -> Result<Option<T>> {
    if node.has_next()? {
        Ok(Some(node.read()?))
    } else {
        Ok(None)
    }
}

impl<T, S: ObjectSource<T>> ObjectSource<T> for MergingObjectSource<T, S> {
    fn has_next(&mut self) -> Result<bool> {
        self.initialise()?;
        Ok(self.left_head.is_some() || self.right_head.is_some())
    }

    fn read(&mut self) -> Result<T> {
        self.initialise()?;
        let from_left = match (&self.left_head, &self.right_head) {
            (Some(left), Some(right)) => (self.comparator)(left, right) != Ordering::Greater,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return Err(Error::exhausted("source is empty")),
        };
        if from_left {
            self.take_left()
        } else {
            self.take_right()
        }
    }

    fn close(&mut self) -> Result<()> {
        self.left_head = None;
        self.right_head = None;
        close_all([self.left.close(), self.right.close()])
    }

    fn is_open(&self) -> bool {
        self.left.is_open() || self.right.is_open()
    }
}

/// Build a balanced merge tree over `sources`, pairing neighbours level by
/// level. An odd trailing node is rotated to the front of the next level.
pub fn merge<T, S: ObjectSource<T>>(comparator: Comparator<T>, sources: Vec<S>) -> MergeNode<T, S> {
    let leaves = sources.len();
    let mut level: Vec<MergeNode<T, S>> = sources.into_iter().map(MergeNode::Leaf).collect();
    while level.len() > 1 {
        let odd = level.len() % 2 == 1;
        let mut nodes = level.into_iter();
        let carried = if odd { nodes.next_back() } else { None };

        let mut next = Vec::with_capacity(nodes.len() / 2 + 1);
        while let (Some(left), Some(right)) = (nodes.next(), nodes.next()) {
            next.push(MergeNode::Branch(Box::new(MergingObjectSource::new(
                Arc::clone(&comparator),
                left,
                right,
            ))));
        }
        if let Some(carried) = carried {
            let first = std::mem::replace(&mut next[0], carried);
            next.push(first);
        }
        level = next;
    }

    let root = level.pop().unwrap_or(MergeNode::Empty);
    trace!(leaves, height = root.max_height(), "built merge tree");
    root
}

pub fn merge_by_key<T, S, K, F>(key: F, sources: Vec<S>) -> MergeNode<T, S>
where
    T: 'static,
    S: ObjectSource<T>,
    K: Ord,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    merge(Arc::new(move |a: &T, b: &T| key(a).cmp(&key(b))), sources)
}

pub fn merge_natural<T, S>(sources: Vec<S>) -> MergeNode<T, S>
where
    T: Ord + 'static,
    S: ObjectSource<T>,
{
    merge(Arc::new(|a: &T, b: &T| a.cmp(b)), sources)
}
