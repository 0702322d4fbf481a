//! Depth-first traversal of the part tree.
//!
//! Body extraction and attachment discovery both walk the same tree. They
//! plug in a [`PartVisitor`] instead of recursing themselves.

use tracing::warn;

use crate::model::part::MessagePart;

/// Maximum nesting depth followed (to prevent stack overflow on adversarial input).
///
/// Real messages rarely nest deeper than four or five levels.
pub const MAX_DEPTH: usize = 64;

/// Called once for every node, parents before children, siblings in order.
pub trait PartVisitor {
    fn visit(&mut self, part: &MessagePart, depth: usize);
}

impl<F> PartVisitor for F
where
    F: FnMut(&MessagePart, usize),
{
    fn visit(&mut self, part: &MessagePart, depth: usize) {
        self(part, depth)
    }
}

/// Visit every node of the tree rooted at `root`.
///
/// Subtrees below [`MAX_DEPTH`] are not visited.
pub fn walk<V: PartVisitor + ?Sized>(root: &MessagePart, visitor: &mut V) {
    walk_at(root, 0, visitor);
}

fn walk_at<V: PartVisitor + ?Sized>(part: &MessagePart, depth: usize, visitor: &mut V) {
    if depth > MAX_DEPTH {
        warn!(
            part_id = %part.part_id,
            max_depth = MAX_DEPTH,
            "Part tree too deep, ignoring subtree"
        );
        return;
    }
    visitor.visit(part, depth);
    for child in &part.parts {
        walk_at(child, depth + 1, visitor);
    }
}
