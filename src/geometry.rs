//! Planar frame utilities: polar coordinates, relative velocities and rigid transforms.
//!
//! All angles are radians. "Base" frames are SE(2) poses; a point expressed in a
//! base frame has its x-axis along the base heading.

use std::f64::consts::PI;

use crate::types::{Point2, Pose};

/// Wrap an angle into [-pi, pi)
pub fn wrap_around(x: f64) -> f64 {
    let wrapped = (x + PI).rem_euclid(2.0 * PI) - PI;
    // rem_euclid can round up to exactly 2*pi for tiny negative inputs
    if wrapped >= PI {
        wrapped - 2.0 * PI
    } else {
        wrapped
    }
}

pub fn cartesian_to_polar(xy: Point2) -> (f64, f64) {
    (xy[0].hypot(xy[1]), xy[1].atan2(xy[0]))
}

/// Global point into the base frame
pub fn transform_2d(vec: Point2, theta_base: f64, xy_base: Point2) -> Point2 {
    let (s, c) = theta_base.sin_cos();
    let dx = vec[0] - xy_base[0];
    let dy = vec[1] - xy_base[1];
    [c * dx + s * dy, -s * dx + c * dy]
}

/// Base-frame point into the global frame
pub fn transform_2d_inv(vec: Point2, theta_base: f64, xy_base: Point2) -> Point2 {
    let (s, c) = theta_base.sin_cos();
    [
        c * vec[0] - s * vec[1] + xy_base[0],
        s * vec[0] + c * vec[1] + xy_base[1],
    ]
}

/// Compose two rigid transforms: `local` expressed in `frame`, returned in the global frame
pub fn compose(frame: &Pose, local: &Pose) -> Pose {
    let xy = transform_2d_inv(local.xy(), frame.theta, frame.xy());
    Pose::new(xy[0], xy[1], wrap_around(frame.theta + local.theta))
}

/// Range and bearing of `xy_target` seen from the base pose
pub fn relative_distance_polar(xy_target: Point2, xy_base: Point2, theta_base: f64) -> (f64, f64) {
    cartesian_to_polar(transform_2d(xy_target, theta_base, xy_base))
}

/// Range rate and bearing rate of a moving target seen from a moving unicycle base.
///
/// `vxy_target` is the target velocity in the global frame, `(v_base, w_base)` the
/// base's linear and angular speed. Returns `(0, 0)` when the target sits on the base.
pub fn relative_velocity_polar(
    xy_target: Point2,
    vxy_target: Point2,
    xy_base: Point2,
    theta_base: f64,
    v_base: f64,
    w_base: f64,
) -> (f64, f64) {
    let xy_b = transform_2d(xy_target, theta_base, xy_base);
    let v_b = transform_2d(vxy_target, theta_base, [0.0, 0.0]);
    let (r, alpha) = cartesian_to_polar(xy_b);
    if r < 1e-9 {
        return (0.0, 0.0);
    }
    let (sa, ca) = alpha.sin_cos();
    let r_dot = v_b[0] * ca + v_b[1] * sa - v_base * ca;
    let alpha_dot = (-v_b[0] * sa + v_b[1] * ca + v_base * sa) / r - w_base;
    (r_dot, alpha_dot)
}

/// Relative polar velocity of an SE(2) target moving with `(v, w)` along its heading
pub fn relative_velocity_polar_se2(
    target: &Pose,
    target_vw: (f64, f64),
    base: &Pose,
    base_vw: (f64, f64),
) -> (f64, f64) {
    let (s, c) = target.theta.sin_cos();
    let vxy = [target_vw.0 * c, target_vw.0 * s];
    relative_velocity_polar(target.xy(), vxy, base.xy(), base.theta, base_vw.0, base_vw.1)
}

/// Euclidean distance
pub fn distance(a: Point2, b: Point2) -> f64 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_wrap_around() {
        assert!((wrap_around(3.0 * PI / 2.0) + PI / 2.0).abs() < EPS);
        assert!((wrap_around(-3.0 * PI / 2.0) - PI / 2.0).abs() < EPS);
        assert!((wrap_around(PI) + PI).abs() < EPS);
        assert!((wrap_around(0.3) - 0.3).abs() < EPS);
        assert!((wrap_around(7.0 * PI) + PI).abs() < 1e-6);
    }

    #[test]
    fn test_transform_round_trip() {
        let p = [3.0, -1.5];
        let base = [1.0, 2.0];
        let local = transform_2d(p, 0.7, base);
        let back = transform_2d_inv(local, 0.7, base);
        assert!((back[0] - p[0]).abs() < EPS);
        assert!((back[1] - p[1]).abs() < EPS);
    }

    #[test]
    fn test_relative_distance_polar() {
        // Target straight ahead of a base facing +y
        let (r, alpha) = relative_distance_polar([0.0, 5.0], [0.0, 0.0], PI / 2.0);
        assert!((r - 5.0).abs() < EPS);
        assert!(alpha.abs() < EPS);

        // Target to the left
        let (r, alpha) = relative_distance_polar([-2.0, 0.0], [0.0, 0.0], PI / 2.0);
        assert!((r - 2.0).abs() < EPS);
        assert!((alpha - PI / 2.0).abs() < EPS);
    }

    #[test]
    fn test_relative_velocity_static_target() {
        // Base drives straight at a static target: range shrinks at base speed
        let (r_dot, alpha_dot) =
            relative_velocity_polar([4.0, 0.0], [0.0, 0.0], [0.0, 0.0], 0.0, 2.0, 0.0);
        assert!((r_dot + 2.0).abs() < EPS);
        assert!(alpha_dot.abs() < EPS);

        // Base spins in place: bearing rate is minus the spin rate
        let (r_dot, alpha_dot) =
            relative_velocity_polar([4.0, 0.0], [0.0, 0.0], [0.0, 0.0], 0.0, 0.0, 0.5);
        assert!(r_dot.abs() < EPS);
        assert!((alpha_dot + 0.5).abs() < EPS);
    }

    #[test]
    fn test_relative_velocity_matches_finite_difference() {
        let dt = 1e-6;
        let target = [3.0, 2.0];
        let vt = [0.4, -0.3];
        let (v, w) = (1.2, 0.25);
        let base = Pose::new(0.5, -0.5, 0.3);
        let (r0, a0) = relative_distance_polar(target, base.xy(), base.theta);
        let target1 = [target[0] + vt[0] * dt, target[1] + vt[1] * dt];
        let base1 = Pose::new(
            base.x + v * base.theta.cos() * dt,
            base.y + v * base.theta.sin() * dt,
            base.theta + w * dt,
        );
        let (r1, a1) = relative_distance_polar(target1, base1.xy(), base1.theta);
        let (r_dot, alpha_dot) =
            relative_velocity_polar(target, vt, base.xy(), base.theta, v, w);
        assert!(((r1 - r0) / dt - r_dot).abs() < 1e-4);
        assert!(((a1 - a0) / dt - alpha_dot).abs() < 1e-4);
    }

    #[test]
    fn test_compose() {
        let frame = Pose::new(1.0, 1.0, PI / 2.0);
        let local = Pose::new(2.0, 0.0, 0.0);
        let global = compose(&frame, &local);
        assert!((global.x - 1.0).abs() < EPS);
        assert!((global.y - 3.0).abs() < EPS);
        assert!((global.theta - PI / 2.0).abs() < EPS);
    }
}
