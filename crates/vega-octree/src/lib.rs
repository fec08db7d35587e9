//! Bounded octree used to index scene primitives and lights for visibility
//! and shadow-caster gathering.
//!
//! Elements live in the deepest node whose child octant fully contains their
//! bounds, so large objects sit near the root and small ones sink toward the
//! leaves. Queries walk the node tree with an explicit stack and hand every
//! element of each intersecting node to the caller, which applies its own
//! finer per-element tests.

use glam::Vec3;

use vega_math::{Aabb, BoxSphereBounds, ConvexVolume};

/// A leaf splits once it holds more elements than this.
pub const MAX_ELEMENTS_PER_LEAF: usize = 16;

/// Nodes at this depth never split, regardless of element count.
pub const MAX_NODE_DEPTH: u8 = 12;

const INVALID_NODE: u32 = u32::MAX;

/// Stable handle to an element in the octree.
///
/// Handles are generational: removing an element invalidates its id even if
/// the underlying slot is later reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OctreeElementId {
    index: u32,
    generation: u32,
}

struct Node {
    center: Vec3,
    extent: f32,
    depth: u8,
    /// Index of the first of eight consecutive children, or `INVALID_NODE`
    /// for a leaf.
    children: u32,
    elements: Vec<u32>,
}

impl Node {
    fn new(center: Vec3, extent: f32, depth: u8) -> Self {
        Self {
            center,
            extent,
            depth,
            children: INVALID_NODE,
            elements: Vec::new(),
        }
    }

    fn is_leaf(&self) -> bool {
        self.children == INVALID_NODE
    }

    fn octant_center(&self, octant: usize) -> Vec3 {
        let half = self.extent * 0.5;
        Vec3::new(
            self.center.x + if octant & 1 != 0 { half } else { -half },
            self.center.y + if octant & 2 != 0 { half } else { -half },
            self.center.z + if octant & 4 != 0 { half } else { -half },
        )
    }

    fn octant_box(&self, octant: usize) -> Aabb {
        let half = Vec3::splat(self.extent * 0.5);
        let center = self.octant_center(octant);
        Aabb::new(center - half, center + half)
    }
}

struct Slot<T> {
    generation: u32,
    entry: Option<Entry<T>>,
}

struct Entry<T> {
    value: T,
    bounds: BoxSphereBounds,
    node: u32,
}

/// Octree over elements of type `T`, each carrying [`BoxSphereBounds`].
pub struct Octree<T> {
    nodes: Vec<Node>,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Octree<T> {
    /// Create an octree spanning the cube centered at `origin` with
    /// half-size `extent` on each axis.
    pub fn new(origin: Vec3, extent: f32) -> Self {
        Self {
            nodes: vec![Node::new(origin, extent, 0)],
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of elements currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert an element and return its handle.
    ///
    /// Elements whose bounds escape the root volume are kept at the root
    /// rather than rejected.
    pub fn add(&mut self, value: T, bounds: BoxSphereBounds) -> OctreeElementId {
        let aabb = bounds.aabb();
        let node = self.descend_for_insert(aabb);

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.slots[index as usize].entry = Some(Entry {
            value,
            bounds,
            node,
        });
        self.nodes[node as usize].elements.push(index);
        self.len += 1;

        let id = OctreeElementId {
            index,
            generation: self.slots[index as usize].generation,
        };
        self.maybe_split(node);
        id
    }

    /// Remove an element by handle and return its value.
    ///
    /// # Panics
    ///
    /// Panics if the id is stale or was never issued by this octree. A stale
    /// id means the caller's bookkeeping has already diverged from the tree,
    /// which is not recoverable.
    pub fn remove(&mut self, id: OctreeElementId) -> T {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation);
        let Some(slot) = slot else {
            panic!("octree element id {id:?} is stale or foreign");
        };
        let entry = slot
            .entry
            .take()
            .unwrap_or_else(|| panic!("octree element id {id:?} is stale or foreign"));
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;

        let node = &mut self.nodes[entry.node as usize];
        let position = node
            .elements
            .iter()
            .position(|&e| e == id.index)
            .expect("element missing from its home node");
        node.elements.swap_remove(position);
        entry.value
    }

    /// Replace an element's bounds, migrating it to the right node.
    ///
    /// The old id is consumed; callers must adopt the returned one.
    pub fn update(&mut self, id: OctreeElementId, bounds: BoxSphereBounds) -> OctreeElementId {
        let value = self.remove(id);
        self.add(value, bounds)
    }

    /// Immutable access to an element by handle.
    pub fn get(&self, id: OctreeElementId) -> Option<&T> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_ref())
            .map(|e| &e.value)
    }

    /// Bounds the element was inserted with.
    pub fn bounds(&self, id: OctreeElementId) -> Option<&BoxSphereBounds> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_ref())
            .map(|e| &e.bounds)
    }

    /// Visit every element whose node intersects `volume`.
    ///
    /// Node-level rejection only; the visitor receives each candidate's
    /// stored bounds and applies whatever per-element test it needs.
    pub fn query_volume(&self, volume: &ConvexVolume, mut visit: impl FnMut(&T, &BoxSphereBounds)) {
        let mut stack = vec![0u32];
        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index as usize];
            if !volume.intersects_box(node.center, Vec3::splat(node.extent)) {
                continue;
            }
            for &element in &node.elements {
                let entry = self.slots[element as usize]
                    .entry
                    .as_ref()
                    .expect("node references a freed element");
                visit(&entry.value, &entry.bounds);
            }
            if !node.is_leaf() {
                for octant in 0..8 {
                    stack.push(node.children + octant);
                }
            }
        }
    }

    /// Visit every element whose node intersects the box.
    pub fn query_box(&self, query: &Aabb, mut visit: impl FnMut(&T, &BoxSphereBounds)) {
        let mut stack = vec![0u32];
        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index as usize];
            let half = Vec3::splat(node.extent);
            let node_box = Aabb::new(node.center - half, node.center + half);
            if !node_box.intersects(query) {
                continue;
            }
            for &element in &node.elements {
                let entry = self.slots[element as usize]
                    .entry
                    .as_ref()
                    .expect("node references a freed element");
                visit(&entry.value, &entry.bounds);
            }
            if !node.is_leaf() {
                for octant in 0..8 {
                    stack.push(node.children + octant);
                }
            }
        }
    }

    /// Visit every element in the tree.
    pub fn iter(&self) -> impl Iterator<Item = (&T, &BoxSphereBounds)> {
        self.slots
            .iter()
            .filter_map(|s| s.entry.as_ref())
            .map(|e| (&e.value, &e.bounds))
    }

    /// Find the deepest existing node whose octant fully contains `aabb`,
    /// splitting full leaves along the way.
    fn descend_for_insert(&mut self, aabb: Aabb) -> u32 {
        let mut current = 0u32;
        loop {
            self.maybe_split(current);
            let node = &self.nodes[current as usize];
            if node.is_leaf() {
                return current;
            }
            let mut next = None;
            for octant in 0..8 {
                if node.octant_box(octant).contains_box(&aabb) {
                    next = Some(node.children + octant as u32);
                    break;
                }
            }
            match next {
                Some(child) => current = child,
                None => return current,
            }
        }
    }

    /// Split a leaf that exceeded its element budget, pushing down every
    /// element that fits entirely inside one octant.
    fn maybe_split(&mut self, node_index: u32) {
        let node = &self.nodes[node_index as usize];
        if !node.is_leaf()
            || node.elements.len() <= MAX_ELEMENTS_PER_LEAF
            || node.depth >= MAX_NODE_DEPTH
        {
            return;
        }

        let first_child = self.nodes.len() as u32;
        let (extent, depth) = {
            let node = &self.nodes[node_index as usize];
            (node.extent, node.depth)
        };
        for octant in 0..8 {
            let child_center = self.nodes[node_index as usize].octant_center(octant);
            self.nodes
                .push(Node::new(child_center, extent * 0.5, depth + 1));
        }
        self.nodes[node_index as usize].children = first_child;

        let elements = std::mem::take(&mut self.nodes[node_index as usize].elements);
        for element in elements {
            let aabb = self.slots[element as usize]
                .entry
                .as_ref()
                .expect("node references a freed element")
                .bounds
                .aabb();
            let mut target = node_index;
            for octant in 0..8 {
                if self.nodes[node_index as usize]
                    .octant_box(octant)
                    .contains_box(&aabb)
                {
                    target = first_child + octant as u32;
                    break;
                }
            }
            self.nodes[target as usize].elements.push(element);
            self.slots[element as usize]
                .entry
                .as_mut()
                .expect("node references a freed element")
                .node = target;
        }
    }
}
