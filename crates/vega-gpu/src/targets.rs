//! Render-target registry.
//!
//! Offscreen surfaces (scene color, scene depth, shadow depth, and friends)
//! are registered here once and addressed by id thereafter. Allocation only
//! ever grows a surface; a pass that asks for less than the current size is
//! served the existing surface, so per-frame size oscillation never causes
//! reallocation churn.

use rustc_hash::FxHashMap;

/// Handle to a registered render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetId(pub u32);

/// The offscreen surfaces the pass pipeline works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTargetKind {
    SceneColor,
    SceneDepth,
    /// Per-light attenuation buffer written by light functions and shadow
    /// projection.
    LightAttenuation,
    /// Shadow depth buffer, shared by every projected shadow in a frame.
    ShadowDepth,
    Velocity,
    /// The swapchain surface the final post-process effect writes.
    Presentation,
}

#[derive(Debug)]
struct Target {
    kind: RenderTargetKind,
    width: u32,
    height: u32,
    /// False until the device-side surface exists; cleared on growth and on
    /// device reset, and rebuilt lazily on next acquire.
    device_live: bool,
}

/// Registry of offscreen render targets, owned by the renderer context.
#[derive(Debug, Default)]
pub struct RenderTargets {
    targets: Vec<Target>,
    by_kind: FxHashMap<RenderTargetKind, RenderTargetId>,
}

impl RenderTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or grow the surface for `kind`, returning its stable id.
    ///
    /// The surface never shrinks: a request smaller than the current size
    /// keeps the existing extent.
    pub fn allocate(&mut self, kind: RenderTargetKind, min_x: u32, min_y: u32) -> RenderTargetId {
        if let Some(&id) = self.by_kind.get(&kind) {
            let target = &mut self.targets[id.0 as usize];
            if min_x > target.width || min_y > target.height {
                target.width = target.width.max(min_x);
                target.height = target.height.max(min_y);
                target.device_live = false;
                log::debug!(
                    "render target {:?} grown to {}x{}",
                    kind,
                    target.width,
                    target.height
                );
            }
            return id;
        }

        let id = RenderTargetId(self.targets.len() as u32);
        self.targets.push(Target {
            kind,
            width: min_x,
            height: min_y,
            device_live: false,
        });
        self.by_kind.insert(kind, id);
        log::debug!("render target {:?} registered at {}x{}", kind, min_x, min_y);
        id
    }

    /// Id of an already-registered kind.
    pub fn get(&self, kind: RenderTargetKind) -> Option<RenderTargetId> {
        self.by_kind.get(&kind).copied()
    }

    /// Current extent of a target.
    pub fn size(&self, id: RenderTargetId) -> (u32, u32) {
        let target = &self.targets[id.0 as usize];
        (target.width, target.height)
    }

    pub fn kind(&self, id: RenderTargetId) -> RenderTargetKind {
        self.targets[id.0 as usize].kind
    }

    /// Make a target usable, (re)creating the device surface if it was lost
    /// or grown. Returns true if a creation happened.
    pub fn acquire(&mut self, id: RenderTargetId) -> bool {
        let target = &mut self.targets[id.0 as usize];
        if target.device_live {
            return false;
        }
        target.device_live = true;
        log::debug!(
            "render target {:?} device surface created at {}x{}",
            target.kind,
            target.width,
            target.height
        );
        true
    }

    /// Device reset: every cached device surface is gone and will be rebuilt
    /// on next acquire.
    pub fn device_reset(&mut self) {
        for target in &mut self.targets {
            target.device_live = false;
        }
        log::warn!("device reset, {} render targets invalidated", self.targets.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_registers_once_per_kind() {
        let mut targets = RenderTargets::new();
        let a = targets.allocate(RenderTargetKind::SceneColor, 1280, 720);
        let b = targets.allocate(RenderTargetKind::SceneColor, 640, 360);
        assert_eq!(a, b);
        assert_eq!(targets.size(a), (1280, 720));
    }

    #[test]
    fn test_allocate_grows_but_never_shrinks() {
        let mut targets = RenderTargets::new();
        let id = targets.allocate(RenderTargetKind::SceneDepth, 800, 600);
        targets.allocate(RenderTargetKind::SceneDepth, 1920, 400);
        assert_eq!(targets.size(id), (1920, 600));
        targets.allocate(RenderTargetKind::SceneDepth, 100, 100);
        assert_eq!(targets.size(id), (1920, 600));
    }

    #[test]
    fn test_acquire_creates_lazily_once() {
        let mut targets = RenderTargets::new();
        let id = targets.allocate(RenderTargetKind::ShadowDepth, 512, 512);
        assert!(targets.acquire(id));
        assert!(!targets.acquire(id));
    }

    #[test]
    fn test_growth_invalidates_device_surface() {
        let mut targets = RenderTargets::new();
        let id = targets.allocate(RenderTargetKind::SceneColor, 800, 600);
        targets.acquire(id);
        targets.allocate(RenderTargetKind::SceneColor, 1600, 1200);
        assert!(targets.acquire(id), "grown target must be recreated");
    }

    #[test]
    fn test_device_reset_invalidates_everything() {
        let mut targets = RenderTargets::new();
        let color = targets.allocate(RenderTargetKind::SceneColor, 800, 600);
        let depth = targets.allocate(RenderTargetKind::SceneDepth, 800, 600);
        targets.acquire(color);
        targets.acquire(depth);

        targets.device_reset();
        assert!(targets.acquire(color));
        assert!(targets.acquire(depth));
    }
}
