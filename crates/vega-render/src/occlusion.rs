//! Persistent occlusion state per camera.
//!
//! Occlusion query results arrive frames after they are issued, so each
//! camera keeps a [`ViewState`] across frames: a history entry per primitive
//! holding the in-flight query and the last time the primitive was actually
//! seen, plus the previous camera transform for large-movement detection.

use glam::{Mat4, Vec3};
use rustc_hash::FxHashMap;

use vega_config::OcclusionSettings;
use vega_gpu::{CommandSink, OcclusionQueryId, OcclusionQueryPool};
use vega_math::BoxSphereBounds;
use vega_scene::{LightId, PrimitiveId};

/// Query bounds are expanded so a primitive cannot occlude its own query
/// proxy.
pub const OCCLUSION_BOUNDS_SCALE: f32 = 1.1;
pub const OCCLUSION_BOUNDS_OFFSET: f32 = 1.1;

/// What the occlusion test concluded for one primitive this frame.
#[derive(Debug, Clone, Copy)]
pub struct OcclusionVerdict {
    pub visible: bool,
    /// True only when an actual query result (not an assumption) confirmed
    /// visibility, or the primitive skips queries entirely.
    pub definitely_unoccluded: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingQuery {
    id: OcclusionQueryId,
    issue_time: f32,
}

#[derive(Debug)]
struct OcclusionHistory {
    pending: Option<PendingQuery>,
    last_visible_time: f32,
    last_considered_time: f32,
}

#[derive(Debug, Default)]
struct ShadowOcclusion {
    pending: Option<OcclusionQueryId>,
    occluded: bool,
}

/// Whether the camera moved far enough since last frame that prior query
/// results no longer describe what it sees.
pub fn is_large_camera_movement(
    previous_view: &Mat4,
    current_view: &Mat4,
    previous_origin: Vec3,
    current_origin: Vec3,
    rotation_threshold_degrees: f32,
    translation_threshold: f32,
) -> bool {
    let cos_threshold = rotation_threshold_degrees.to_radians().cos();
    for axis in 0..3 {
        let previous = previous_view.col(axis).truncate().normalize_or_zero();
        let current = current_view.col(axis).truncate().normalize_or_zero();
        if previous.dot(current) < cos_threshold {
            return true;
        }
    }
    previous_origin.distance_squared(current_origin) > translation_threshold * translation_threshold
}

/// Cross-frame occlusion state for one camera.
#[derive(Default)]
pub struct ViewState {
    histories: FxHashMap<PrimitiveId, OcclusionHistory>,
    /// Per-shadow occlusion, keyed by (light, subject); `None` subject is
    /// the light's whole-scene shadow.
    shadow_occlusion: FxHashMap<(LightId, Option<PrimitiveId>), ShadowOcclusion>,
    previous_view: Option<(Mat4, Vec3)>,
    camera_cut: bool,
    /// Queries allocated this frame, waiting for their bounds proxies to be
    /// drawn during the occlusion-test stage.
    pending_issues: Vec<(OcclusionQueryId, BoxSphereBounds)>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the last `begin_frame` detected a camera cut.
    pub fn camera_cut(&self) -> bool {
        self.camera_cut
    }

    /// Start a frame: detect large camera movement and, on a cut, throw away
    /// every in-flight query and assume everything visible.
    pub fn begin_frame(
        &mut self,
        view_matrix: &Mat4,
        view_origin: Vec3,
        settings: &OcclusionSettings,
        pool: &mut OcclusionQueryPool,
        time: f32,
    ) {
        self.camera_cut = match self.previous_view {
            Some((previous_matrix, previous_origin)) => is_large_camera_movement(
                &previous_matrix,
                view_matrix,
                previous_origin,
                view_origin,
                settings.camera_rotation_threshold_degrees,
                settings.camera_translation_threshold,
            ),
            None => true,
        };
        self.previous_view = Some((*view_matrix, view_origin));

        if self.camera_cut {
            log::debug!("camera cut, discarding {} occlusion histories' queries", self.histories.len());
            for history in self.histories.values_mut() {
                if let Some(pending) = history.pending.take() {
                    pool.release(pending.id);
                }
                history.last_visible_time = time;
            }
            for shadow in self.shadow_occlusion.values_mut() {
                if let Some(query) = shadow.pending.take() {
                    pool.release(query);
                }
                shadow.occluded = false;
            }
        }
    }

    /// Run the occlusion state machine for one primitive.
    ///
    /// `screen_radius` sizes the occluded-pixel threshold; `near_plane_hit`
    /// marks bounds whose expanded proxy would clip the camera, which cannot
    /// be queried and are definitely unoccluded.
    #[allow(clippy::too_many_arguments)]
    pub fn update_primitive(
        &mut self,
        id: PrimitiveId,
        bounds: &BoxSphereBounds,
        always_visible: bool,
        view_origin: Vec3,
        screen_radius: f32,
        settings: &OcclusionSettings,
        queries_disabled: bool,
        sink: &mut dyn CommandSink,
        pool: &mut OcclusionQueryPool,
        time: f32,
    ) -> OcclusionVerdict {
        if always_visible || queries_disabled {
            return OcclusionVerdict {
                visible: true,
                definitely_unoccluded: true,
            };
        }

        let expanded = bounds.expanded(OCCLUSION_BOUNDS_SCALE, OCCLUSION_BOUNDS_OFFSET);
        if view_origin.distance(expanded.origin) < expanded.radius {
            // Camera inside the query proxy; the proxy would be clipped and
            // report zero pixels for a visible primitive.
            if let Some(history) = self.histories.get_mut(&id) {
                history.last_visible_time = time;
                history.last_considered_time = time;
            }
            return OcclusionVerdict {
                visible: true,
                definitely_unoccluded: true,
            };
        }

        let history = self.histories.entry(id).or_insert_with(|| OcclusionHistory {
            pending: None,
            // New primitives start visible until a query says otherwise.
            last_visible_time: time,
            last_considered_time: time,
        });
        history.last_considered_time = time;

        // A primitive counts occluded when fewer than this many of its
        // projected pixels survived the depth test.
        let pixel_threshold =
            settings.max_occluded_pixels_fraction * std::f32::consts::PI * screen_radius * screen_radius;

        let mut definitely_unoccluded = false;
        if let Some(pending) = history.pending {
            match sink.poll_occlusion_query(pending.id) {
                Some(pixels) => {
                    pool.release(pending.id);
                    history.pending = None;
                    if pixels as f32 > pixel_threshold {
                        history.last_visible_time = time;
                        definitely_unoccluded = true;
                    }
                }
                None => {
                    let age = time - pending.issue_time;
                    if age > settings.probably_visible_time {
                        // Too stale to wait for; discard and re-issue.
                        // Visibility falls back to recency below.
                        pool.release(pending.id);
                        history.pending = None;
                    }
                }
            }
        }

        if history.pending.is_none() {
            let query = pool.allocate();
            history.pending = Some(PendingQuery {
                id: query,
                issue_time: time,
            });
            self.pending_issues.push((query, expanded));
        }

        let visible = history.last_visible_time + settings.probably_visible_time >= time;
        OcclusionVerdict {
            visible,
            definitely_unoccluded,
        }
    }

    /// Poll or issue the occlusion query covering one whole shadow. Returns
    /// true when the previous frame's query said the shadow's receiver
    /// volume produced no visible pixels.
    pub fn update_shadow(
        &mut self,
        light: LightId,
        subject: Option<PrimitiveId>,
        bounds: &BoxSphereBounds,
        queries_disabled: bool,
        sink: &mut dyn CommandSink,
        pool: &mut OcclusionQueryPool,
    ) -> bool {
        if queries_disabled {
            return false;
        }
        let state = self.shadow_occlusion.entry((light, subject)).or_default();
        if let Some(query) = state.pending {
            if let Some(pixels) = sink.poll_occlusion_query(query) {
                pool.release(query);
                state.pending = None;
                state.occluded = pixels == 0;
            }
        }
        if state.pending.is_none() {
            let query = pool.allocate();
            state.pending = Some(query);
            self.pending_issues.push((query, *bounds));
        }
        state.occluded
    }

    /// Queries allocated this frame whose bounds proxies still need to be
    /// drawn. Drained once per frame by the occlusion-test stage.
    pub fn take_pending_issues(&mut self) -> Vec<(OcclusionQueryId, BoxSphereBounds)> {
        std::mem::take(&mut self.pending_issues)
    }

    /// Drop histories that have not been considered recently.
    pub fn trim(&mut self, time: f32, keep_time: f32, pool: &mut OcclusionQueryPool) {
        self.histories.retain(|_, history| {
            let keep = history.last_considered_time + keep_time >= time;
            if !keep {
                if let Some(pending) = history.pending.take() {
                    pool.release(pending.id);
                }
            }
            keep
        });
    }

    pub fn history_count(&self) -> usize {
        self.histories.len()
    }
}
