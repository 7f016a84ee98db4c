#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{ensure, Result};
    use nalgebra::{DVector, Point3};
    use rayon::prelude::*;

    use crate::data_collector::DataCollector;
    use crate::geometry::{GeometryData, GeometryModel};
    use crate::kinematic_traits::{FrameIndex, ReferenceFrame};
    use crate::multibody_robots::{obstacle_scene, planar_arm_with_obstacle, Topology};
    use crate::numdiff::NumDiff;
    use crate::residual_error::ResidualError;
    use crate::residual_fly_high::FlyHighResidual;
    use crate::residual_traits::{EvaluationStage, Residual, ResidualData, ResidualModel};
    use crate::residual_vel_collision::{ObstacleMotion, SeparationScaling, VelocityCollisionOptions,
                                        VelocityCollisionResidual};
    use crate::state::StateMultibody;
    use crate::tests::test_utils::{ensure_close, random_state, random_vector3, rng};

    const REFERENCES: [ReferenceFrame; 2] = [ReferenceFrame::Local, ReferenceFrame::LocalWorldAligned];
    const SCALINGS: [SeparationScaling; 2] = [SeparationScaling::Unit, SeparationScaling::Raw];

    fn scene(topology: Topology) -> (StateMultibody, Arc<GeometryModel>, FrameIndex) {
        let (model, geometry, tip) = obstacle_scene(topology);
        (StateMultibody::new(Arc::new(model)), Arc::new(geometry), tip)
    }

    fn evaluate<R: Residual>(residual: &R, x: &DVector<f64>, u: &DVector<f64>) -> Result<R::Data> {
        let shared = DataCollector::for_state(residual.state().model(), x)?;
        let mut data = residual.create_data(&shared)?;
        residual.calc(&mut data, &shared, x, u)?;
        residual.calc_diff(&mut data, &shared, x, u)?;
        Ok(data)
    }

    fn check_against_numdiff<R: Residual>(what: &str, residual: &R, x: &DVector<f64>, u: &DVector<f64>)
                                          -> Result<()> {
        let numdiff = NumDiff::default();
        let data = evaluate(residual, x, u)?;
        let outputs = data.as_ref();
        ensure_close(&format!("{} rx", what), &outputs.rx, &numdiff.residual_rx(residual, x, u)?,
                     numdiff.tolerance())?;
        ensure_close(&format!("{} ru", what), &outputs.ru, &numdiff.residual_ru(residual, x, u)?,
                     numdiff.tolerance())?;
        Ok(())
    }

    #[test]
    fn test_derivatives_match_numdiff_for_all_pairs() -> Result<()> {
        let mut rng = rng();
        for topology in Topology::ALL {
            let (state, geometry, tip) = scene(topology);
            for pair_id in 0..geometry.collision_pairs().len() {
                for reference in REFERENCES {
                    for scaling in SCALINGS {
                        let options = VelocityCollisionOptions { scaling, ..Default::default() };
                        let residual = VelocityCollisionResidual::with_options(
                            state.clone(), 2, geometry.clone(), pair_id, tip, reference, 0.7, options)?;
                        let x = random_state(&state, &mut rng);
                        let u = DVector::from_vec(vec![0.1, -0.2]);
                        check_against_numdiff(
                            &format!("{:?} pair {} {:?} {:?}", topology, pair_id, reference, scaling),
                            &residual, &x, &u)?;
                    }
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_derivatives_match_numdiff_with_moving_obstacle() -> Result<()> {
        let mut rng = rng();
        for topology in [Topology::SixAxis, Topology::BranchedTorso] {
            let (state, geometry, tip) = scene(topology);
            for reference in REFERENCES {
                let options = VelocityCollisionOptions {
                    obstacle: ObstacleMotion::ConstantVelocity(random_vector3(&mut rng)),
                    ..Default::default()
                };
                let residual = VelocityCollisionResidual::with_options(
                    state.clone(), 0, geometry.clone(), 0, tip, reference, 1.3, options)?;
                let x = random_state(&state, &mut rng);
                check_against_numdiff(&format!("{:?} {:?}", topology, reference), &residual, &x,
                                      &DVector::zeros(0))?;
            }
        }
        Ok(())
    }

    #[test]
    fn test_derivatives_match_numdiff_on_capsule_edge() -> Result<()> {
        // The nearest point of the forearm capsule slides along its segment.
        let (model, geometry, tip) = planar_arm_with_obstacle(Point3::new(1.4, 0.35, 0.0));
        let state = StateMultibody::new(Arc::new(model));
        let geometry = Arc::new(geometry);
        for reference in REFERENCES {
            for scaling in SCALINGS {
                let options = VelocityCollisionOptions { scaling, ..Default::default() };
                let residual = VelocityCollisionResidual::with_options(
                    state.clone(), 1, geometry.clone(), 0, tip, reference, 1.0, options)?;
                let x = DVector::from_vec(vec![0.05, -0.1, 0.8, -0.4]);
                let data = evaluate(&residual, &x, &DVector::zeros(1))?;
                ensure!(data.separation_norm > 0.05 && data.separation_norm < 0.2);
                check_against_numdiff(&format!("edge {:?} {:?}", reference, scaling), &residual, &x,
                                      &DVector::zeros(1))?;
            }
        }
        Ok(())
    }

    #[test]
    fn test_reference_frames_agree_on_value() -> Result<()> {
        let mut rng = rng();
        for topology in Topology::ALL {
            let (state, geometry, tip) = scene(topology);
            let x = random_state(&state, &mut rng);
            let u = DVector::zeros(0);
            let local = VelocityCollisionResidual::new(
                state.clone(), 0, geometry.clone(), 1, tip, ReferenceFrame::Local, 1.0)?;
            let aligned = VelocityCollisionResidual::new(
                state.clone(), 0, geometry.clone(), 1, tip, ReferenceFrame::LocalWorldAligned, 1.0)?;
            let local = evaluate(&local, &x, &u)?;
            let aligned = evaluate(&aligned, &x, &u)?;
            ensure!((local.outputs.r[0] - aligned.outputs.r[0]).abs() < 1e-12);
            ensure!((&local.outputs.rx - &aligned.outputs.rx).amax() < 1e-10);
        }
        Ok(())
    }

    #[test]
    fn test_separation_agrees_with_parry() -> Result<()> {
        let mut rng = rng();
        for topology in Topology::ALL {
            let (state, geometry, _) = scene(topology);
            let x = random_state(&state, &mut rng);
            let shared = DataCollector::for_state(state.model(), &x)?;
            let mut data = GeometryData::new(&geometry);
            data.update_placements(&geometry, shared.multibody()?)?;
            for pair_id in 0..geometry.collision_pairs().len() {
                let signed = data.compute_distance(&geometry, pair_id)?.signed_distance();
                let separation = data.distance_result(pair_id).map(|r| r.separation.norm()).unwrap_or(-1.0);
                let reference = data.parry_distance(&geometry, pair_id)?;
                ensure!(signed > 0.0, "{:?} pair {} intersects", topology, pair_id);
                ensure!((signed - reference).abs() < 1e-6,
                    "{:?} pair {}: {} against parry {}", topology, pair_id, signed, reference);
                ensure!((separation - reference).abs() < 1e-6);
            }
        }
        Ok(())
    }

    #[test]
    fn test_parallel_rollouts_match_sequential() -> Result<()> {
        let (state, geometry, tip) = scene(Topology::BranchedTorso);
        let model = Arc::new(ResidualModel::from(VelocityCollisionResidual::new(
            state.clone(), 0, geometry, 2, tip, ReferenceFrame::Local, 0.5)?));
        let mut rng = rng();
        let states: Vec<DVector<f64>> = (0..32).map(|_| random_state(&state, &mut rng)).collect();
        let u = DVector::zeros(0);

        let rollout = |x: &DVector<f64>| -> Result<(DVector<f64>, nalgebra::DMatrix<f64>), ResidualError> {
            let shared = DataCollector::for_state(model.state().model(), x)?;
            let mut data = model.create_data(&shared)?;
            model.calc(&mut data, &shared, x, &u)?;
            model.calc_diff(&mut data, &shared, x, &u)?;
            let outputs = data.as_ref();
            Ok((outputs.r.clone(), outputs.rx.clone()))
        };
        let parallel = states.par_iter().map(rollout).collect::<Result<Vec<_>, _>>()?;
        let sequential = states.iter().map(rollout).collect::<Result<Vec<_>, _>>()?;
        ensure!(parallel == sequential);
        Ok(())
    }

    #[test]
    fn test_residual_model_rejects_foreign_data() -> Result<()> {
        let (state, geometry, tip) = scene(Topology::SixAxis);
        let collision = ResidualModel::from(VelocityCollisionResidual::new(
            state.clone(), 0, geometry, 0, tip, ReferenceFrame::Local, 1.0)?);
        let fly_high = ResidualModel::from(FlyHighResidual::new(state.clone(), tip, 2.0, 0)?);
        ensure!(collision.nr() == 3 && fly_high.nr() == 2);

        let x = random_state(&state, &mut rng());
        let u = DVector::zeros(0);
        let shared = DataCollector::for_state(state.model(), &x)?;
        let mut fly_data = fly_high.create_data(&shared)?;
        ensure!(matches!(fly_data, ResidualData::FlyHigh(_)));
        let error = collision.calc(&mut fly_data, &shared, &x, &u).unwrap_err();
        ensure!(error == ResidualError::InvalidDataKind { expected: "velocity collision", found: "fly high" });
        ensure!(fly_data.as_ref().stage() == EvaluationStage::Uninitialized);

        let mut collision_data = collision.create_data(&shared)?;
        collision.calc(&mut collision_data, &shared, &x, &u)?;
        collision.calc_diff(&mut collision_data, &shared, &x, &u)?;
        ensure!(collision_data.as_ref().stage() == EvaluationStage::DerivativesValid);
        ensure!(collision.create_data(&DataCollector::Abstract).is_err());
        Ok(())
    }

    #[test]
    fn test_fly_high_derivatives_match_numdiff() -> Result<()> {
        let mut rng = rng();
        for topology in Topology::ALL {
            let (state, _, tip) = scene(topology);
            let residual = ResidualModel::from(FlyHighResidual::new(state.clone(), tip, 1.5, 2)?);
            let x = random_state(&state, &mut rng);
            check_against_numdiff(&format!("fly high {:?}", topology), &residual, &x,
                                  &DVector::from_vec(vec![0.3, 0.3]))?;
        }
        Ok(())
    }

    #[test]
    fn test_separation_scales_with_beta_everywhere() -> Result<()> {
        let mut rng = rng();
        let (state, geometry, tip) = scene(Topology::SixAxis);
        let x = random_state(&state, &mut rng);
        let u = DVector::zeros(0);
        let unit = evaluate(&VelocityCollisionResidual::new(
            state.clone(), 0, geometry.clone(), 0, tip, ReferenceFrame::Local, 1.0)?, &x, &u)?;
        let triple = evaluate(&VelocityCollisionResidual::new(
            state, 0, geometry, 0, tip, ReferenceFrame::Local, 3.0)?, &x, &u)?;
        ensure!((triple.outputs.r[0] - 3.0 * unit.outputs.r[0]).abs() < 1e-12);
        ensure!((&triple.outputs.rx - &unit.outputs.rx * 3.0).amax() < 1e-10);
        ensure!(unit.separation_direction.norm() > 0.0 && (unit.separation_direction.norm() - 1.0).abs() < 1e-12);
        Ok(())
    }

    fn first_pair_only(geometry: &GeometryModel) -> Result<GeometryModel> {
        let pair = geometry.collision_pairs()[0];
        let mut smaller = GeometryModel::new();
        let first = smaller.add_geometry_object(geometry.objects()[pair.first].clone());
        let second = smaller.add_geometry_object(geometry.objects()[pair.second].clone());
        smaller.add_collision_pair(first, second)?;
        Ok(smaller)
    }

    #[test]
    fn test_data_sized_for_other_geometry_rejected() -> Result<()> {
        let (state, geometry, tip) = scene(Topology::SixAxis);
        let smaller = Arc::new(first_pair_only(&geometry)?);
        let scene_residual = VelocityCollisionResidual::new(
            state.clone(), 0, geometry.clone(), 2, tip, ReferenceFrame::Local, 1.0)?;
        let pair_residual = VelocityCollisionResidual::new(
            state.clone(), 0, smaller.clone(), 0, tip, ReferenceFrame::Local, 1.0)?;

        let x = random_state(&state, &mut rng());
        let u = DVector::zeros(0);
        let shared = DataCollector::for_state(state.model(), &x)?;
        let mut small_data = pair_residual.create_data(&shared)?;
        let mut scene_data = scene_residual.create_data(&shared)?;

        let error = scene_residual.calc(&mut small_data, &shared, &x, &u).unwrap_err();
        ensure!(matches!(error, ResidualError::DimensionMismatch { what: "geometry placements", .. }), "{}", error);
        ensure!(pair_residual.calc(&mut scene_data, &shared, &x, &u).is_err());
        ensure!(small_data.outputs.stage() == EvaluationStage::Uninitialized);

        pair_residual.calc(&mut small_data, &shared, &x, &u)?;
        ensure!(scene_residual.calc_diff(&mut small_data, &shared, &x, &u).is_err());
        pair_residual.calc_diff(&mut small_data, &shared, &x, &u)?;

        let mut geometry_data = GeometryData::new(&smaller);
        ensure!(geometry_data.update_placements(&geometry, shared.multibody()?).is_err());
        ensure!(geometry_data.compute_distance(&geometry, 2).is_err());
        Ok(())
    }

    #[test]
    fn test_data_sized_for_other_controls_rejected() -> Result<()> {
        let (state, _, tip) = scene(Topology::BranchedTorso);
        let actuated = FlyHighResidual::new(state.clone(), tip, 1.0, 2)?;
        let passive = FlyHighResidual::new(state.clone(), tip, 1.0, 0)?;
        let x = random_state(&state, &mut rng());
        let shared = DataCollector::for_state(state.model(), &x)?;
        let mut data = actuated.create_data(&shared)?;
        let error = passive.calc(&mut data, &shared, &x, &DVector::zeros(0)).unwrap_err();
        ensure!(error == ResidualError::DimensionMismatch { what: "ru", expected: (2, 0), found: (2, 2) });
        actuated.calc(&mut data, &shared, &x, &DVector::zeros(2))?;
        ensure!(passive.calc_diff(&mut data, &shared, &x, &DVector::zeros(0)).is_err());
        Ok(())
    }
}
