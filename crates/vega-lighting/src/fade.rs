//! Shadow fade heuristics.

/// Fades at or below this alpha skip the shadow entirely; the modulation
/// would round to zero in an 8-bit target anyway.
pub const SHADOW_FADE_SKIP_THRESHOLD: f32 = 1.0 / 256.0;

/// Resolution-based fade alpha.
///
/// 0 at or below `min_resolution`, 1 at or above `fade_resolution`, and a
/// power curve between. Monotonically non-decreasing in `resolution`.
pub fn shadow_fade_alpha(
    resolution: f32,
    fade_resolution: u32,
    min_resolution: u32,
    exponent: f32,
) -> f32 {
    let fade_resolution = fade_resolution as f32;
    let min_resolution = min_resolution as f32;
    if resolution <= min_resolution {
        0.0
    } else if resolution >= fade_resolution {
        1.0
    } else {
        let fraction = (resolution - min_resolution) / (fade_resolution - min_resolution);
        fraction.powf(exponent)
    }
}

/// Shadow depth resolution for a subject covering `screen_radius` pixels,
/// clamped to the configured range less the filter border.
pub fn shadow_resolution(
    screen_radius: f32,
    texels_per_pixel: f32,
    max_resolution: u32,
    border: u32,
) -> u32 {
    let unclamped = (screen_radius * texels_per_pixel) as u32;
    unclamped.min(max_resolution.saturating_sub(border * 2))
}

/// Which way a modulated shadow's time fade is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowFadeState {
    FadingIn,
    FadingOut,
}

/// Time-based modulated shadow fade.
///
/// Fade-in uses the reciprocal exponent of fade-out, so a shadow snaps in
/// quickly and lingers out. `start_percent` is the persisted fade fraction
/// from the last direction change, which keeps the curve continuous when
/// visibility flips mid-fade.
///
/// Returns `(alpha, current_percent)`; the caller persists
/// `current_percent` on the subject for the next direction change.
pub fn mod_shadow_time_fade(
    seconds_since_change: f32,
    fade_time: f32,
    exponent: f32,
    state: ShadowFadeState,
    start_percent: f32,
) -> (f32, f32) {
    if fade_time <= 0.0 {
        return match state {
            ShadowFadeState::FadingIn => (1.0, 1.0),
            ShadowFadeState::FadingOut => (0.0, 1.0),
        };
    }
    let percent = (start_percent + seconds_since_change / fade_time).clamp(0.0, 1.0);
    let alpha = match state {
        ShadowFadeState::FadingIn => percent.powf(1.0 / exponent),
        ShadowFadeState::FadingOut => (1.0 - percent).powf(exponent),
    };
    (alpha, percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_alpha_zero_at_or_below_min() {
        assert_eq!(shadow_fade_alpha(32.0, 64, 32, 0.25), 0.0);
        assert_eq!(shadow_fade_alpha(10.0, 64, 32, 0.25), 0.0);
    }

    #[test]
    fn test_fade_alpha_one_at_or_above_fade_resolution() {
        assert_eq!(shadow_fade_alpha(64.0, 64, 32, 0.25), 1.0);
        assert_eq!(shadow_fade_alpha(512.0, 64, 32, 0.25), 1.0);
    }

    #[test]
    fn test_fade_alpha_monotonic_between() {
        let mut previous = 0.0;
        for resolution in 33..64 {
            let alpha = shadow_fade_alpha(resolution as f32, 64, 32, 0.25);
            assert!(alpha > 0.0 && alpha < 1.0);
            assert!(alpha >= previous, "fade must not decrease with resolution");
            previous = alpha;
        }
    }

    #[test]
    fn test_fade_alpha_boundary_is_not_negative_or_nan() {
        let alpha = shadow_fade_alpha(32.0 + f32::EPSILON, 64, 32, 0.25);
        assert!(alpha.is_finite());
        assert!(alpha >= 0.0);
    }

    #[test]
    fn test_resolution_clamps_to_max_less_border() {
        assert_eq!(shadow_resolution(10_000.0, 1.27324, 512, 5), 502);
        assert_eq!(shadow_resolution(100.0, 1.0, 512, 5), 100);
    }

    #[test]
    fn test_time_fade_in_reaches_one() {
        let (alpha, percent) = mod_shadow_time_fade(1.0, 1.0, 3.0, ShadowFadeState::FadingIn, 0.0);
        assert_eq!(alpha, 1.0);
        assert_eq!(percent, 1.0);
    }

    #[test]
    fn test_time_fade_asymmetry() {
        // Halfway through, fade-in is further along than fade-out has
        // decayed, because of the reciprocal exponent.
        let (fade_in, _) = mod_shadow_time_fade(0.5, 1.0, 3.0, ShadowFadeState::FadingIn, 0.0);
        let (fade_out, _) = mod_shadow_time_fade(0.5, 1.0, 3.0, ShadowFadeState::FadingOut, 0.0);
        assert!(fade_in > 0.5);
        assert!(fade_out < 0.5);
    }

    #[test]
    fn test_time_fade_resumes_from_persisted_percent() {
        let (_, percent) = mod_shadow_time_fade(0.25, 1.0, 3.0, ShadowFadeState::FadingIn, 0.0);
        let (resumed_alpha, _) =
            mod_shadow_time_fade(0.0, 1.0, 3.0, ShadowFadeState::FadingIn, percent);
        let (fresh_alpha, _) =
            mod_shadow_time_fade(0.25, 1.0, 3.0, ShadowFadeState::FadingIn, 0.0);
        assert!((resumed_alpha - fresh_alpha).abs() < 1e-6);
    }

    #[test]
    fn test_zero_fade_time_is_instant() {
        assert_eq!(
            mod_shadow_time_fade(0.0, 0.0, 3.0, ShadowFadeState::FadingIn, 0.0).0,
            1.0
        );
        assert_eq!(
            mod_shadow_time_fade(0.0, 0.0, 3.0, ShadowFadeState::FadingOut, 0.0).0,
            0.0
        );
    }
}
