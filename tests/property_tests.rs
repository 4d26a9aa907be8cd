#[cfg(test)]
mod property_tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use std::f64::consts::PI;
    use tracksim::belief::{range_bearing_noise, BeliefFilter, KalmanBelief, Se2Model, UnscentedBelief};
    use tracksim::compose::{MapAugmentation, ObstacleFeatures, StateLayout, TargetFeatures, VelocityFeatures};
    use tracksim::geometry::{distance, wrap_around};
    use tracksim::linalg::cholesky;
    use tracksim::map::GridMap;
    use tracksim::motion::{double_integrator_noise, double_integrator_transition, se2_noise};
    use tracksim::observation::Sensor;
    use tracksim::sampler::InitPoseSampler;
    use tracksim::types::{Pose, SimRng, StateLimits};

    fn limits4() -> StateLimits {
        StateLimits::new(vec![-50.0, -50.0, -1.0, -1.0], vec![50.0, 50.0, 1.0, 1.0])
    }

    // A step is either a prediction or a range-bearing measurement
    fn step_strategy() -> impl Strategy<Value = Option<(f64, f64)>> {
        prop::option::of((0.5f64..15.0, -PI / 2.0..PI / 2.0))
    }

    proptest! {
        #[test]
        fn test_kalman_covariance_stays_positive_definite(
            steps in prop::collection::vec(step_strategy(), 1..40),
            seed in any::<u64>(),
        ) {
            let map = GridMap::empty([-50.0, -50.0], [50.0, 50.0], 1.0).unwrap();
            let mut rng = SimRng::seed_from_u64(seed);
            let mut belief = KalmanBelief::new(
                double_integrator_transition(4, 0.5),
                double_integrator_noise(4, 0.5, 0.01),
                range_bearing_noise(0.2, 0.01),
                limits4(),
            ).unwrap();
            belief.reset(ndarray::array![5.0, 0.0, 0.0, 0.0], 30.0);
            let agent = Pose::new(0.0, 0.0, 0.0);
            for step in steps {
                match step {
                    None => belief.predict(&mut rng).unwrap(),
                    Some((r, b)) => belief.update([r, b], &agent, &map).unwrap(),
                }
                prop_assert!(cholesky(belief.cov()).is_some());
                prop_assert!(belief.log_det_cov().unwrap().is_finite());
            }
        }

        #[test]
        fn test_unscented_covariance_stays_positive_definite(
            steps in prop::collection::vec(prop::option::of((3.0f64..8.0, -0.5f64..0.5)), 1..25),
            seed in any::<u64>(),
        ) {
            let map = GridMap::empty([-50.0, -50.0], [50.0, 50.0], 1.0).unwrap();
            let mut rng = SimRng::seed_from_u64(seed);
            let limits = StateLimits::new(vec![-50.0, -50.0, -PI], vec![50.0, 50.0, PI]);
            let mut belief = UnscentedBelief::new(
                Se2Model::Pose,
                0.5,
                se2_noise(3, 0.5, 0.01),
                range_bearing_noise(0.2, 0.01),
                limits,
            ).unwrap();
            belief.reset(ndarray::array![5.0, 0.0, 0.0], 0.5);
            let agent = Pose::new(0.0, 0.0, 0.0);
            for step in steps {
                match step {
                    None => belief.predict(&mut rng).unwrap(),
                    Some((r, b)) => belief.update([r, b], &agent, &map).unwrap(),
                }
                prop_assert!(cholesky(belief.cov()).is_some());
            }
        }

        #[test]
        fn test_random_pose_respects_linear_range(
            lo in 0.0f64..10.0,
            width in 0.0f64..10.0,
            x in -20.0f64..20.0,
            y in -20.0f64..20.0,
            theta in -PI..PI,
            seed in any::<u64>(),
        ) {
            let map = GridMap::empty([-50.0, -50.0], [50.0, 50.0], 1.0).unwrap();
            let sampler = InitPoseSampler::new(&map);
            let mut rng = SimRng::seed_from_u64(seed);
            let frame = Pose::new(x, y, theta);
            let (valid, pose) = sampler.gen_rand_pose(&frame, (lo, lo + width), (-PI, PI), None, &mut rng);
            prop_assert!(valid);
            let d = distance(pose.xy(), frame.xy());
            prop_assert!(d >= lo - 1e-9 && d <= lo + width + 1e-9);
        }

        #[test]
        fn test_detection_monotone_in_range(
            tx in -20.0f64..20.0,
            ty in -20.0f64..20.0,
            range in 1.0f64..15.0,
            extra in 0.0f64..10.0,
        ) {
            let map = GridMap::empty([-50.0, -50.0], [50.0, 50.0], 1.0).unwrap();
            let agent = Pose::new(0.0, 0.0, 0.3);
            let near = Sensor { range, fov: 2.0, range_sd: 0.2, bearing_sd: 0.01 };
            let far = Sensor { range: range + extra, ..near };
            if near.in_view(&agent, [tx, ty], &map).is_some() {
                prop_assert!(far.in_view(&agent, [tx, ty], &map).is_some());
            }
        }

        #[test]
        fn test_wrap_around_range(x in -100.0f64..100.0) {
            let w = wrap_around(x);
            prop_assert!(w >= -PI && w < PI);
            let turns = (x - w) / (2.0 * PI);
            prop_assert!((turns - turns.round()).abs() < 1e-9);
        }

        #[test]
        fn test_compose_decode_recovers_features(
            r in 0.0f64..600.0,
            alpha in -PI..PI,
            r_dot in -5.0f64..5.0,
            alpha_dot in -5.0f64..5.0,
            logdet in -50.0f64..50.0,
            observed in any::<bool>(),
            blocked in any::<bool>(),
        ) {
            let layout = StateLayout {
                num_targets: 2,
                velocity: VelocityFeatures::Cartesian,
                belief_blocked: true,
                front_range: true,
                map: MapAugmentation::None,
                im_size: 1,
                sensor_r: 10.0,
                rel_speed_limit: 4.0,
            };
            let t = TargetFeatures { r, alpha, r_dot, alpha_dot, logdet, observed, blocked };
            let state = layout
                .compose(&[], &[TargetFeatures::default(), t], &ObstacleFeatures::default())
                .unwrap();
            prop_assert_eq!(state.len(), layout.len());
            prop_assert_eq!(layout.decode_target(&state, 1), t);
        }
    }
}
