//! Sorted static draw lists.
//!
//! One list per pass type. Entries are grouped by policy equality so shared
//! state binds once per group; within a group, elements stay in insertion
//! order. Groups live in stable slots with a separate sorted order, so
//! removal by slot id never shifts other handles.

use glam::Mat4;

use vega_gpu::{CommandSink, MaterialId, MeshElementId};
use vega_scene::{Bitset, StaticMeshId};

use crate::policy::DrawPolicy;

/// Handle to one mesh entry in a draw list, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawListSlot(u32);

struct Element {
    slot: u32,
    mesh: StaticMeshId,
    element: MeshElementId,
    material: MaterialId,
    local_to_world: Mat4,
}

struct PolicyGroup {
    policy: DrawPolicy,
    elements: Vec<Element>,
}

struct SlotRecord {
    group: u32,
}

/// A per-pass container of static mesh draws, grouped and sorted by policy.
#[derive(Default)]
pub struct StaticDrawList {
    groups: Vec<Option<PolicyGroup>>,
    /// Group indices ordered by policy; the draw traversal order.
    order: Vec<u32>,
    slots: Vec<Option<SlotRecord>>,
    slot_free: Vec<u32>,
}

impl StaticDrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order
            .iter()
            .map(|&g| self.groups[g as usize].as_ref().map_or(0, |group| group.elements.len()))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a mesh under the given policy, creating a group if no existing
    /// one matches.
    pub fn add_mesh(
        &mut self,
        mesh: StaticMeshId,
        element: MeshElementId,
        material: MaterialId,
        local_to_world: Mat4,
        policy: DrawPolicy,
    ) -> DrawListSlot {
        let group_index = match self
            .order
            .binary_search_by(|&g| self.groups[g as usize].as_ref().unwrap().policy.cmp(&policy))
        {
            Ok(position) => self.order[position],
            Err(position) => {
                let group_index = self.groups.len() as u32;
                self.groups.push(Some(PolicyGroup {
                    policy,
                    elements: Vec::new(),
                }));
                self.order.insert(position, group_index);
                log::trace!("draw list grew to {} policy groups", self.order.len());
                group_index
            }
        };

        let slot = match self.slot_free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(SlotRecord { group: group_index });
                slot
            }
            None => {
                self.slots.push(Some(SlotRecord { group: group_index }));
                (self.slots.len() - 1) as u32
            }
        };

        self.groups[group_index as usize]
            .as_mut()
            .unwrap()
            .elements
            .push(Element {
                slot,
                mesh,
                element,
                material,
                local_to_world,
            });
        DrawListSlot(slot)
    }

    /// Remove a previously added mesh.
    ///
    /// # Panics
    ///
    /// Panics on a stale slot; the draw lists and the scene's static mesh
    /// registry must stay in lockstep.
    pub fn remove_mesh(&mut self, slot: DrawListSlot) {
        let record = self.slots[slot.0 as usize]
            .take()
            .unwrap_or_else(|| panic!("draw list slot {slot:?} is not live"));
        self.slot_free.push(slot.0);

        let group = self.groups[record.group as usize]
            .as_mut()
            .expect("slot references a freed policy group");
        let position = group
            .elements
            .iter()
            .position(|e| e.slot == slot.0)
            .expect("slot missing from its policy group");
        group.elements.remove(position);

        if group.elements.is_empty() {
            self.groups[record.group as usize] = None;
            self.order.retain(|&g| g != record.group);
        }
    }

    /// Draw every element whose static mesh bit is set.
    ///
    /// Shared policy state binds once per group with any visible element;
    /// groups with none are skipped entirely. Returns whether anything was
    /// drawn.
    pub fn draw_visible(&self, sink: &mut dyn CommandSink, visibility: &Bitset) -> bool {
        let mut dirty = false;
        for &group_index in &self.order {
            let group = self.groups[group_index as usize]
                .as_ref()
                .expect("ordered group was freed");
            let mut shared_bound = false;
            for element in &group.elements {
                if !visibility.get(element.mesh.index()) {
                    continue;
                }
                if !shared_bound {
                    group.policy.set_shared_state(sink);
                    shared_bound = true;
                }
                group
                    .policy
                    .draw(sink, element.element, element.material, element.local_to_world);
                dirty = true;
            }
        }
        dirty
    }

    /// Draw every element regardless of visibility (shadow depth passes
    /// pass an explicit subject list instead of a bitset).
    pub fn draw_all(&self, sink: &mut dyn CommandSink) -> bool {
        let mut dirty = false;
        for &group_index in &self.order {
            let group = self.groups[group_index as usize]
                .as_ref()
                .expect("ordered group was freed");
            if group.elements.is_empty() {
                continue;
            }
            group.policy.set_shared_state(sink);
            for element in &group.elements {
                group
                    .policy
                    .draw(sink, element.element, element.material, element.local_to_world);
                dirty = true;
            }
        }
        dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vega_gpu::{RecordingSink, ShaderProgramId, VertexFormatId};

    fn policy(vertex_format: u64, program: u64) -> DrawPolicy {
        DrawPolicy::DepthOnly {
            vertex_format: VertexFormatId(vertex_format),
            program: ShaderProgramId(program),
        }
    }

    fn add(list: &mut StaticDrawList, mesh: u32, policy: DrawPolicy) -> DrawListSlot {
        list.add_mesh(
            StaticMeshId(mesh),
            MeshElementId(mesh as u64),
            MaterialId(1),
            Mat4::IDENTITY,
            policy,
        )
    }

    fn visibility(len: usize, set: &[usize]) -> Bitset {
        let mut bits = Bitset::new();
        bits.reset(len);
        for &index in set {
            bits.set(index);
        }
        bits
    }

    #[test]
    fn test_empty_bitset_draws_nothing_and_is_clean() {
        let mut list = StaticDrawList::new();
        add(&mut list, 0, policy(1, 1));
        add(&mut list, 1, policy(1, 1));

        let mut sink = RecordingSink::new();
        let dirty = list.draw_visible(&mut sink, &visibility(2, &[]));
        assert!(!dirty);
        assert_eq!(sink.draw_count(), 0);
        assert_eq!(sink.shared_state_count(), 0);
    }

    #[test]
    fn test_matching_policies_share_one_state_bind() {
        let mut list = StaticDrawList::new();
        add(&mut list, 0, policy(1, 1));
        add(&mut list, 1, policy(1, 1));
        add(&mut list, 2, policy(2, 1));

        let mut sink = RecordingSink::new();
        let dirty = list.draw_visible(&mut sink, &visibility(3, &[0, 1, 2]));
        assert!(dirty);
        assert_eq!(sink.draw_count(), 3);
        assert_eq!(sink.shared_state_count(), 2);
    }

    #[test]
    fn test_hidden_elements_skipped_within_group() {
        let mut list = StaticDrawList::new();
        add(&mut list, 0, policy(1, 1));
        add(&mut list, 1, policy(1, 1));

        let mut sink = RecordingSink::new();
        list.draw_visible(&mut sink, &visibility(2, &[1]));
        assert_eq!(sink.draw_count(), 1);
        assert_eq!(sink.shared_state_count(), 1);
    }

    #[test]
    fn test_groups_draw_in_policy_order() {
        let mut list = StaticDrawList::new();
        // Inserted out of order; vertex format 1 must draw first.
        add(&mut list, 0, policy(2, 1));
        add(&mut list, 1, policy(1, 1));

        let mut sink = RecordingSink::new();
        list.draw_visible(&mut sink, &visibility(2, &[0, 1]));
        let binds: Vec<_> = sink
            .commands()
            .iter()
            .filter_map(|c| match c {
                vega_gpu::SinkCommand::SetSharedState { vertex_format, .. } => Some(*vertex_format),
                _ => None,
            })
            .collect();
        assert_eq!(binds, vec![VertexFormatId(1), VertexFormatId(2)]);
    }

    #[test]
    fn test_remove_mesh_drops_entry_and_reuses_slot() {
        let mut list = StaticDrawList::new();
        let slot = add(&mut list, 0, policy(1, 1));
        add(&mut list, 1, policy(1, 1));
        list.remove_mesh(slot);
        assert_eq!(list.len(), 1);

        let mut sink = RecordingSink::new();
        list.draw_visible(&mut sink, &visibility(2, &[0, 1]));
        assert_eq!(sink.draw_count(), 1);

        let reused = add(&mut list, 2, policy(1, 1));
        assert_eq!(reused, slot);
    }

    #[test]
    #[should_panic(expected = "not live")]
    fn test_remove_stale_slot_panics() {
        let mut list = StaticDrawList::new();
        let slot = add(&mut list, 0, policy(1, 1));
        list.remove_mesh(slot);
        list.remove_mesh(slot);
    }

    #[test]
    fn test_empty_group_removed_when_last_element_leaves() {
        let mut list = StaticDrawList::new();
        let slot = add(&mut list, 0, policy(1, 1));
        list.remove_mesh(slot);
        assert!(list.is_empty());

        let mut sink = RecordingSink::new();
        assert!(!list.draw_all(&mut sink));
    }
}
