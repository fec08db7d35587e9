//! The light-primitive interaction arena.
//!
//! An interaction is an edge in the light-primitive bipartite graph, created
//! when a light's influence overlaps a primitive's bounds. Each edge sits on
//! two intrusive doubly-linked lists at once, one rooted at the light and
//! one at the primitive. The arena owns every record; lights and primitives
//! hold only head indices, so there is no ownership cycle and removal is
//! O(1) unlink-by-index.

use crate::light::LightId;
use crate::types::PrimitiveId;

/// Index of an interaction record in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InteractionId(u32);

impl InteractionId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One light-primitive edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightPrimitiveInteraction {
    pub light: LightId,
    pub primitive: PrimitiveId,
    /// The primitive casts a dynamic shadow from this light.
    pub has_shadow: bool,
    /// The primitive wants static lighting from this light but none has
    /// been built, so it is lit dynamically for now.
    pub uncached_static_lighting: bool,
    /// Which of the light's two lists this edge lives on.
    pub on_static_light_list: bool,
}

struct Node {
    data: LightPrimitiveInteraction,
    prev_on_light: Option<InteractionId>,
    next_on_light: Option<InteractionId>,
    prev_on_primitive: Option<InteractionId>,
    next_on_primitive: Option<InteractionId>,
}

/// Pool of interaction records.
#[derive(Default)]
pub struct InteractionArena {
    nodes: Vec<Option<Node>>,
    free: Vec<u32>,
    len: usize,
}

impl InteractionArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, id: InteractionId) -> &LightPrimitiveInteraction {
        &self.node(id).data
    }

    /// Create an edge and push it onto the front of both lists.
    pub fn link(
        &mut self,
        data: LightPrimitiveInteraction,
        light_head: &mut Option<InteractionId>,
        primitive_head: &mut Option<InteractionId>,
    ) -> InteractionId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.nodes.push(None);
                (self.nodes.len() - 1) as u32
            }
        };
        let id = InteractionId(index);
        self.nodes[index as usize] = Some(Node {
            data,
            prev_on_light: None,
            next_on_light: *light_head,
            prev_on_primitive: None,
            next_on_primitive: *primitive_head,
        });

        if let Some(old_head) = *light_head {
            self.node_mut(old_head).prev_on_light = Some(id);
        }
        *light_head = Some(id);
        if let Some(old_head) = *primitive_head {
            self.node_mut(old_head).prev_on_primitive = Some(id);
        }
        *primitive_head = Some(id);

        self.len += 1;
        id
    }

    /// Unlink an edge from both lists and free its record.
    ///
    /// The caller passes the heads the edge actually lives on; panics if the
    /// id does not reference a live record.
    pub fn unlink(
        &mut self,
        id: InteractionId,
        light_head: &mut Option<InteractionId>,
        primitive_head: &mut Option<InteractionId>,
    ) -> LightPrimitiveInteraction {
        let node = self.nodes[id.index()]
            .take()
            .unwrap_or_else(|| panic!("interaction {id:?} is not live"));

        match node.prev_on_light {
            Some(prev) => self.node_mut(prev).next_on_light = node.next_on_light,
            None => *light_head = node.next_on_light,
        }
        if let Some(next) = node.next_on_light {
            self.node_mut(next).prev_on_light = node.prev_on_light;
        }

        match node.prev_on_primitive {
            Some(prev) => self.node_mut(prev).next_on_primitive = node.next_on_primitive,
            None => *primitive_head = node.next_on_primitive,
        }
        if let Some(next) = node.next_on_primitive {
            self.node_mut(next).prev_on_primitive = node.prev_on_primitive;
        }

        self.free.push(id.0);
        self.len -= 1;
        node.data
    }

    /// Walk a light's list.
    pub fn iter_light_list(
        &self,
        head: Option<InteractionId>,
    ) -> impl Iterator<Item = (InteractionId, &LightPrimitiveInteraction)> {
        let mut cursor = head;
        std::iter::from_fn(move || {
            let id = cursor?;
            let node = self.node(id);
            cursor = node.next_on_light;
            Some((id, &node.data))
        })
    }

    /// Walk a primitive's list.
    pub fn iter_primitive_list(
        &self,
        head: Option<InteractionId>,
    ) -> impl Iterator<Item = (InteractionId, &LightPrimitiveInteraction)> {
        let mut cursor = head;
        std::iter::from_fn(move || {
            let id = cursor?;
            let node = self.node(id);
            cursor = node.next_on_primitive;
            Some((id, &node.data))
        })
    }

    fn node(&self, id: InteractionId) -> &Node {
        self.nodes[id.index()]
            .as_ref()
            .unwrap_or_else(|| panic!("interaction {id:?} is not live"))
    }

    fn node_mut(&mut self, id: InteractionId) -> &mut Node {
        self.nodes[id.index()]
            .as_mut()
            .unwrap_or_else(|| panic!("interaction {id:?} is not live"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(light: u32, primitive: u32) -> LightPrimitiveInteraction {
        LightPrimitiveInteraction {
            light: LightId(light),
            primitive: PrimitiveId(primitive),
            has_shadow: true,
            uncached_static_lighting: false,
            on_static_light_list: false,
        }
    }

    #[test]
    fn test_link_appears_on_both_lists() {
        let mut arena = InteractionArena::new();
        let mut light_head = None;
        let mut primitive_head = None;
        let id = arena.link(edge(1, 2), &mut light_head, &mut primitive_head);

        let on_light: Vec<_> = arena.iter_light_list(light_head).map(|(i, _)| i).collect();
        let on_primitive: Vec<_> = arena
            .iter_primitive_list(primitive_head)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(on_light, vec![id]);
        assert_eq!(on_primitive, vec![id]);
    }

    #[test]
    fn test_unlink_middle_of_list() {
        let mut arena = InteractionArena::new();
        let mut light_head = None;
        // Three edges from one light to different primitives; all on the
        // same light list, each on its own primitive list.
        let mut heads = [None, None, None];
        let a = arena.link(edge(1, 0), &mut light_head, &mut heads[0]);
        let b = arena.link(edge(1, 1), &mut light_head, &mut heads[1]);
        let c = arena.link(edge(1, 2), &mut light_head, &mut heads[2]);

        arena.unlink(b, &mut light_head, &mut heads[1]);
        let remaining: Vec<_> = arena.iter_light_list(light_head).map(|(i, _)| i).collect();
        assert_eq!(remaining, vec![c, a]);
        assert_eq!(heads[1], None);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_unlink_head_updates_head() {
        let mut arena = InteractionArena::new();
        let mut light_head = None;
        let mut p0 = None;
        let mut p1 = None;
        let a = arena.link(edge(1, 0), &mut light_head, &mut p0);
        let b = arena.link(edge(1, 1), &mut light_head, &mut p1);
        assert_eq!(light_head, Some(b));

        arena.unlink(b, &mut light_head, &mut p1);
        assert_eq!(light_head, Some(a));
    }

    #[test]
    #[should_panic(expected = "not live")]
    fn test_unlink_twice_panics() {
        let mut arena = InteractionArena::new();
        let mut light_head = None;
        let mut primitive_head = None;
        let id = arena.link(edge(1, 2), &mut light_head, &mut primitive_head);
        arena.unlink(id, &mut light_head, &mut primitive_head);
        arena.unlink(id, &mut light_head, &mut primitive_head);
    }

    #[test]
    fn test_slot_reuse() {
        let mut arena = InteractionArena::new();
        let mut light_head = None;
        let mut primitive_head = None;
        let a = arena.link(edge(1, 2), &mut light_head, &mut primitive_head);
        arena.unlink(a, &mut light_head, &mut primitive_head);
        let b = arena.link(edge(3, 4), &mut light_head, &mut primitive_head);
        assert_eq!(arena.get(b).light, LightId(3));
        assert_eq!(arena.len(), 1);
    }
}
