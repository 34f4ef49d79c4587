//! Octree over body positions, answering range and nearest-neighbour
//! queries.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
    hash::Hash,
};

use nalgebra::Vector3;
use ordered_float::OrderedFloat;
use tracing::{debug, trace};

use crate::error::{OrbitError, Result};

pub const DEFAULT_LEAF_CAPACITY: usize = 8;
pub const DEFAULT_MAX_DEPTH: u32 = 24;
/// Half-width of the root cube of an empty tree (m).
const INITIAL_HALF: f64 = 1.0;

/// Axis-aligned cube.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub centre: Vector3<f64>,
    pub half: f64,
}

impl Aabb {
    pub fn contains(&self, p: &Vector3<f64>) -> bool {
        (p - self.centre).iter().all(|d| d.abs() <= self.half)
    }

    fn octant(&self, p: &Vector3<f64>) -> usize {
        usize::from(p.x >= self.centre.x)
            | usize::from(p.y >= self.centre.y) << 1
            | usize::from(p.z >= self.centre.z) << 2
    }

    fn child(&self, octant: usize) -> Aabb {
        let q = self.half / 2.0;
        let offset = |bit: usize| if octant & bit != 0 { q } else { -q };
        Aabb {
            centre: self.centre + Vector3::new(offset(1), offset(2), offset(4)),
            half: q,
        }
    }

    /// Squared distance from `p` to the cube, zero inside. The cube is
    /// padded by a relative epsilon so rounding in child bounds never
    /// prunes a point lying on a face.
    fn distance_squared(&self, p: &Vector3<f64>) -> f64 {
        let half = self.half * (1.0 + 1e-9);
        (p - self.centre)
            .iter()
            .map(|d| (d.abs() - half).max(0.0).powi(2))
            .sum()
    }
}

#[derive(Clone, Debug)]
enum Kind<Id> {
    Leaf(Vec<Id>),
    Branch([usize; 8]),
}

#[derive(Clone, Debug)]
struct Node<Id> {
    bounds: Aabb,
    parent: Option<usize>,
    /// Entries in this subtree.
    count: usize,
    kind: Kind<Id>,
}

impl<Id> Node<Id> {
    fn leaf(bounds: Aabb, parent: Option<usize>) -> Self {
        Self {
            bounds,
            parent,
            count: 0,
            kind: Kind::Leaf(Vec::new()),
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Entry {
    position: Vector3<f64>,
    leaf: usize,
}

/// A point octree keyed by ids.
///
/// Nodes live in one vector and refer to each other by index; freed nodes
/// are recycled. Leaves split once they hold more than `leaf_capacity`
/// entries (unless at `max_depth`), and a branch whose subtree drops to
/// `leaf_capacity` entries collapses back into a leaf. The root cube grows
/// by doubling to cover any finite position.
#[derive(Clone, Debug)]
pub struct Octree<Id> {
    nodes: Vec<Node<Id>>,
    free: Vec<usize>,
    root: usize,
    entries: HashMap<Id, Entry>,
    leaf_capacity: usize,
    max_depth: u32,
}

impl<Id: Copy + Eq + Hash + Ord> Default for Octree<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: Copy + Eq + Hash + Ord> Octree<Id> {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_LEAF_CAPACITY, DEFAULT_MAX_DEPTH)
    }

    pub fn with_params(leaf_capacity: usize, max_depth: u32) -> Self {
        Self {
            nodes: vec![Node::leaf(
                Aabb {
                    centre: Vector3::zeros(),
                    half: INITIAL_HALF,
                },
                None,
            )],
            free: Vec::new(),
            root: 0,
            entries: HashMap::new(),
            leaf_capacity: leaf_capacity.max(1),
            max_depth,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bounds(&self) -> Aabb {
        self.nodes[self.root].bounds
    }

    /// Live nodes, leaves and branches.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn position_of(&self, id: Id) -> Option<Vector3<f64>> {
        self.entries.get(&id).map(|e| e.position)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id, Vector3<f64>)> + '_ {
        self.entries.iter().map(|(id, e)| (*id, e.position))
    }

    pub fn clear(&mut self) {
        *self = Self::with_params(self.leaf_capacity, self.max_depth);
    }

    /// Replace the contents with `items`.
    pub fn rebuild(&mut self, items: impl IntoIterator<Item = (Id, Vector3<f64>)>) -> Result<()> {
        self.clear();
        for (id, position) in items {
            self.insert(id, position)?;
        }
        debug!(
            entries = self.len(),
            nodes = self.node_count(),
            half = self.bounds().half,
            "rebuilt octree"
        );
        Ok(())
    }

    /// Insert `id` at `position`, moving it if already present.
    pub fn insert(&mut self, id: Id, position: Vector3<f64>) -> Result<()> {
        if !position.iter().all(|x| x.is_finite()) {
            return Err(OrbitError::NonFinite("position"));
        }

        if let Some(entry) = self.entries.get(&id).copied() {
            if self.bounds().contains(&position) && self.locate(&position) == entry.leaf {
                self.entries.insert(
                    id,
                    Entry {
                        position,
                        leaf: entry.leaf,
                    },
                );
                return Ok(());
            }
            self.remove(id);
        }

        if self.entries.is_empty() {
            self.nodes = vec![Node::leaf(
                Aabb {
                    centre: position,
                    half: INITIAL_HALF,
                },
                None,
            )];
            self.free.clear();
            self.root = 0;
        }
        self.grow_to(&position);

        let leaf = self.descend_counting(&position);
        if let Kind::Leaf(ids) = &mut self.nodes[leaf].kind {
            ids.push(id);
        }
        self.entries.insert(id, Entry { position, leaf });
        self.split_if_full(leaf);
        Ok(())
    }

    /// Remove `id`, returning its last position.
    pub fn remove(&mut self, id: Id) -> Option<Vector3<f64>> {
        let entry = self.entries.remove(&id)?;
        if let Kind::Leaf(ids) = &mut self.nodes[entry.leaf].kind {
            if let Some(i) = ids.iter().position(|x| *x == id) {
                ids.swap_remove(i);
            }
        }

        // collapse the topmost branch that now fits in a single leaf
        let mut collapse_at = None;
        let mut cur = Some(entry.leaf);
        while let Some(idx) = cur {
            let node = &mut self.nodes[idx];
            node.count = node.count.saturating_sub(1);
            if matches!(node.kind, Kind::Branch(_)) && node.count <= self.leaf_capacity {
                collapse_at = Some(idx);
            }
            cur = node.parent;
        }
        if let Some(idx) = collapse_at {
            self.collapse(idx);
        }
        Some(entry.position)
    }

    /// Ids within `radius` of `point`, sorted by id.
    pub fn query_range(&self, point: &Vector3<f64>, radius: f64) -> Vec<Id> {
        let mut found = Vec::new();
        if radius.is_nan() || radius < 0.0 {
            return found;
        }
        let r2 = radius * radius;
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if node.count == 0 || node.bounds.distance_squared(point) > r2 {
                continue;
            }
            match &node.kind {
                Kind::Leaf(ids) => found.extend(ids.iter().copied().filter(|id| {
                    self.entries
                        .get(id)
                        .is_some_and(|e| (e.position - point).norm_squared() <= r2)
                })),
                Kind::Branch(children) => stack.extend(children.iter().copied()),
            }
        }
        found.sort_unstable();
        found
    }

    /// The `k` ids closest to `point`, nearest first. Equal distances are
    /// ordered by id.
    pub fn query_nearest(&self, point: &Vector3<f64>, k: usize) -> Vec<Id> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }

        // max-heap of the best candidates so far, worst on top
        let mut best: BinaryHeap<(OrderedFloat<f64>, Id)> = BinaryHeap::with_capacity(k + 1);
        let mut frontier = BinaryHeap::new();
        frontier.push(Reverse((
            OrderedFloat(self.bounds().distance_squared(point)),
            self.root,
        )));

        while let Some(Reverse((OrderedFloat(d), idx))) = frontier.pop() {
            if best.len() == k && best.peek().is_some_and(|(worst, _)| d > worst.0) {
                break;
            }
            match &self.nodes[idx].kind {
                Kind::Leaf(ids) => {
                    for &id in ids {
                        let Some(entry) = self.entries.get(&id) else {
                            continue;
                        };
                        let key = (OrderedFloat((entry.position - point).norm_squared()), id);
                        if best.len() < k {
                            best.push(key);
                        } else if best.peek().is_some_and(|top| key < *top) {
                            best.pop();
                            best.push(key);
                        }
                    }
                }
                Kind::Branch(children) => {
                    for &child in children {
                        let node = &self.nodes[child];
                        if node.count > 0 {
                            frontier.push(Reverse((
                                OrderedFloat(node.bounds.distance_squared(point)),
                                child,
                            )));
                        }
                    }
                }
            }
        }

        best.into_sorted_vec().into_iter().map(|(_, id)| id).collect()
    }

    fn alloc(&mut self, node: Node<Id>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn depth(&self, mut idx: usize) -> u32 {
        let mut depth = 0;
        while let Some(parent) = self.nodes[idx].parent {
            depth += 1;
            idx = parent;
        }
        depth
    }

    /// Leaf the descent for `p` ends in.
    fn locate(&self, p: &Vector3<f64>) -> usize {
        let mut idx = self.root;
        loop {
            let node = &self.nodes[idx];
            idx = match &node.kind {
                Kind::Leaf(_) => return idx,
                Kind::Branch(children) => children[node.bounds.octant(p)],
            };
        }
    }

    fn descend_counting(&mut self, p: &Vector3<f64>) -> usize {
        let mut idx = self.root;
        loop {
            let node = &mut self.nodes[idx];
            node.count += 1;
            idx = match &node.kind {
                Kind::Leaf(_) => return idx,
                Kind::Branch(children) => children[node.bounds.octant(p)],
            };
        }
    }

    /// Double the root cube towards `p` until it is covered. The old root
    /// becomes one octant of the new one.
    fn grow_to(&mut self, p: &Vector3<f64>) {
        while !self.bounds().contains(p) {
            let old = self.bounds();
            let dir = (p - old.centre).map(|d| if d >= 0.0 { 1.0 } else { -1.0 });
            let bounds = Aabb {
                centre: old.centre + dir * old.half,
                half: 2.0 * old.half,
            };

            let root = self.root;
            if matches!(self.nodes[root].kind, Kind::Leaf(_)) {
                self.nodes[root].bounds = bounds;
                continue;
            }

            let mut new_root = Node::leaf(bounds, None);
            new_root.count = self.nodes[root].count;
            let new_root = self.alloc(new_root);
            let home = bounds.octant(&old.centre);
            let mut children = [0; 8];
            for (octant, child) in children.iter_mut().enumerate() {
                *child = if octant == home {
                    root
                } else {
                    self.alloc(Node::leaf(bounds.child(octant), Some(new_root)))
                };
            }
            self.nodes[root].parent = Some(new_root);
            self.nodes[new_root].kind = Kind::Branch(children);
            self.root = new_root;
        }
    }

    fn split_if_full(&mut self, leaf: usize) {
        let mut stack = vec![leaf];
        while let Some(idx) = stack.pop() {
            if self.depth(idx) >= self.max_depth {
                continue;
            }
            let bounds = self.nodes[idx].bounds;
            let ids = match &mut self.nodes[idx].kind {
                Kind::Leaf(ids) if ids.len() > self.leaf_capacity => std::mem::take(ids),
                _ => continue,
            };

            let mut buckets: [Vec<Id>; 8] = Default::default();
            for id in ids {
                let p = self.entries.get(&id).map_or(bounds.centre, |e| e.position);
                buckets[bounds.octant(&p)].push(id);
            }

            let mut children = [0; 8];
            for (octant, bucket) in buckets.into_iter().enumerate() {
                let count = bucket.len();
                let child = self.alloc(Node {
                    bounds: bounds.child(octant),
                    parent: Some(idx),
                    count,
                    kind: Kind::Leaf(bucket),
                });
                if let Kind::Leaf(ids) = &self.nodes[child].kind {
                    for id in ids {
                        if let Some(entry) = self.entries.get_mut(id) {
                            entry.leaf = child;
                        }
                    }
                }
                children[octant] = child;
                if count > self.leaf_capacity {
                    stack.push(child);
                }
            }
            self.nodes[idx].kind = Kind::Branch(children);
        }
    }

    fn collapse(&mut self, idx: usize) {
        let mut stack = match &self.nodes[idx].kind {
            Kind::Branch(children) => children.to_vec(),
            Kind::Leaf(_) => return,
        };
        let mut ids = Vec::new();
        while let Some(child) = stack.pop() {
            match std::mem::replace(&mut self.nodes[child].kind, Kind::Leaf(Vec::new())) {
                Kind::Leaf(mut leaf) => ids.append(&mut leaf),
                Kind::Branch(grandchildren) => stack.extend(grandchildren),
            }
            self.free.push(child);
        }
        for id in &ids {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.leaf = idx;
            }
        }
        trace!(node = idx, entries = ids.len(), "collapsed octree branch");
        self.nodes[idx].kind = Kind::Leaf(ids);
    }
}
