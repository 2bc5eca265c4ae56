use crate::node::NodeId;
use std::fmt;

/// Unordered pair of nodes between which a hop delay is attributed
///
/// The pair is canonical: for all nodes `n1` and `n2` the pair
/// `(n1, n2)` is the same as the pair `(n2, n1)`. Every delay
/// attribution and every entry of the [`MeasurementStore`] is keyed
/// on this canonical form.
///
/// [`MeasurementStore`]: crate::store::MeasurementStore
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePair {
    smaller_id: NodeId,
    larger_id: NodeId,
}

impl NodePair {
    /// create the canonical pair from the given node tuple.
    ///
    /// ```
    /// # use hoptrace_core::{NodePair, NodeId};
    /// let pair = NodePair::new((NodeId::new(2), NodeId::new(1)));
    /// assert_eq!(pair.into_nodes(), (NodeId::new(1), NodeId::new(2)));
    /// ```
    pub fn new((a, b): (NodeId, NodeId)) -> Self {
        if a < b {
            Self {
                smaller_id: a,
                larger_id: b,
            }
        } else {
            Self {
                smaller_id: b,
                larger_id: a,
            }
        }
    }

    /// get the [`NodeId`]s that compose this pair
    ///
    /// # Note
    ///
    /// The smaller identifier always comes first, whatever the order
    /// used at construction.
    #[inline]
    pub fn into_nodes(self) -> (NodeId, NodeId) {
        (self.smaller_id, self.larger_id)
    }

    #[inline]
    pub fn first(&self) -> NodeId {
        self.smaller_id
    }

    #[inline]
    pub fn second(&self) -> NodeId {
        self.larger_id
    }
}

impl From<(NodeId, NodeId)> for NodePair {
    fn from(nodes: (NodeId, NodeId)) -> Self {
        Self::new(nodes)
    }
}

impl fmt::Display for NodePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.smaller_id, self.larger_id)
    }
}
