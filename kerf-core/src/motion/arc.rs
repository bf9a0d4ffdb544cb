//! Arc interpolation
//!
//! Arcs are approximated by chords short enough that no chord strays more
//! than the arc tolerance from the true arc. Each chord end is found by
//! rotating the radius vector with a small-angle approximation; the
//! accumulated error is removed every `correction_interval` segments by
//! recomputing the vector exactly.

use core::f32::consts::PI;

use super::control::MotionControl;
use super::position::Position;
use crate::gcode::modal::PlaneAxes;
use crate::planner::{PlanLineData, Planner};

/// Number of chords needed for an arc of `angular_travel` (rad) and `radius`
pub fn arc_segment_count(angular_travel: f32, radius: f32, tolerance: f32) -> u32 {
    let chord = libm::sqrtf(tolerance * (2.0 * radius - tolerance));
    if !(chord > 0.0) {
        return 0;
    }
    libm::floorf(libm::fabsf(0.5 * angular_travel * radius) / chord) as u32
}

/// Signed angle swept from `start` to `end` around the center, in the
/// direction of travel
pub fn arc_angular_travel(start: [f32; 2], end: [f32; 2], clockwise: bool, epsilon: f32) -> f32 {
    let mut travel = libm::atan2f(
        start[0] * end[1] - start[1] * end[0],
        start[0] * end[0] + start[1] * end[1],
    );
    if clockwise {
        if travel >= -epsilon {
            travel -= 2.0 * PI;
        }
    } else if travel <= epsilon {
        travel += 2.0 * PI;
    }
    travel
}

impl<P: Planner> MotionControl<'_, P> {
    /// Plan an arc from `position` to `target` around `position + offset`.
    ///
    /// `offset` is the center relative to the start, indexed by plane axis.
    /// The linear axis moves in proportion along the arc. Returns false if
    /// an abort ended the arc early.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_arc_move(
        &mut self,
        target: &Position,
        data: &PlanLineData,
        position: &Position,
        offset: &[f32; 3],
        radius: f32,
        plane: PlaneAxes,
        clockwise: bool,
    ) -> bool {
        let (axis_0, axis_1, linear) = (plane.axis_0, plane.axis_1, plane.linear);
        let center = [
            position[axis_0] + offset[axis_0],
            position[axis_1] + offset[axis_1],
        ];
        let mut r = [-offset[axis_0], -offset[axis_1]];
        let rt = [target[axis_0] - center[0], target[axis_1] - center[1]];

        let arc = &self.settings.arc;
        let angular_travel = arc_angular_travel(r, rt, clockwise, arc.angular_epsilon);
        let segments = arc_segment_count(angular_travel, radius, arc.tolerance);

        let mut data = *data;
        let mut position = *position;

        if segments > 0 {
            // Inverse time applies to the whole arc; each chord gets its share
            if data.condition.inverse_time {
                data.feed_rate *= segments as f32;
                data.condition.inverse_time = false;
            }

            let theta_per_segment = angular_travel / segments as f32;
            let linear_per_segment = (target[linear] - position[linear]) / segments as f32;

            // cos ≈ 1 - θ²/2, sin ≈ θ(1 - θ²/6)
            let mut cos_t = 2.0 - theta_per_segment * theta_per_segment;
            let sin_t = theta_per_segment * 0.166_666_67 * (cos_t + 4.0);
            cos_t *= 0.5;

            let correction_interval = u32::from(arc.correction_interval.max(1));
            let mut count = 0;

            for i in 1..segments {
                if count < correction_interval {
                    let r_axis_i = r[0] * sin_t + r[1] * cos_t;
                    r[0] = r[0] * cos_t - r[1] * sin_t;
                    r[1] = r_axis_i;
                    count += 1;
                } else {
                    let angle = i as f32 * theta_per_segment;
                    let cos_ti = libm::cosf(angle);
                    let sin_ti = libm::sinf(angle);
                    r[0] = -offset[axis_0] * cos_ti + offset[axis_1] * sin_ti;
                    r[1] = -offset[axis_0] * sin_ti - offset[axis_1] * cos_ti;
                    count = 0;
                }

                position[axis_0] = center[0] + r[0];
                position[axis_1] = center[1] + r[1];
                position[linear] += linear_per_segment;

                self.submit_linear_move(&position, &data);
                if self.sys.is_aborted() {
                    return false;
                }
            }
        }

        self.submit_linear_move(target, &data);
        !self.sys.is_aborted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_arc_direction() {
        // Start at +X, end at +Y around the origin
        let cw = arc_angular_travel([1.0, 0.0], [0.0, 1.0], true, 5e-7);
        let ccw = arc_angular_travel([1.0, 0.0], [0.0, 1.0], false, 5e-7);
        assert!((ccw - PI / 2.0).abs() < 1e-5);
        assert!((cw + 3.0 * PI / 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_full_circle_when_endpoints_match() {
        let cw = arc_angular_travel([1.0, 0.0], [1.0, 0.0], true, 5e-7);
        let ccw = arc_angular_travel([1.0, 0.0], [1.0, 0.0], false, 5e-7);
        assert!((cw + 2.0 * PI).abs() < 1e-5);
        assert!((ccw - 2.0 * PI).abs() < 1e-5);
    }

    #[test]
    fn test_segment_count_follows_tolerance() {
        // r = 10, quarter turn, tolerance 0.002
        let n = arc_segment_count(PI / 2.0, 10.0, 0.002);
        let expected = libm::floorf((0.5 * PI / 2.0 * 10.0) / libm::sqrtf(0.002 * (20.0 - 0.002)));
        assert_eq!(n, expected as u32);
        assert!(n > 30);
        // A looser tolerance needs fewer chords
        assert!(arc_segment_count(PI / 2.0, 10.0, 0.1) < n);
    }

    #[test]
    fn test_tiny_radius_has_no_segments() {
        assert_eq!(arc_segment_count(PI, 0.0005, 0.002), 0);
    }
}
