//! Velocity-aware collision avoidance residual.
//!
//! For a collision pair made of a robot geometry and a static (or uniformly moving) obstacle,
//! the residual is the relative velocity of the robot frame projected on the separation
//! `e = p1 - p2` between the witness points, scaled by `beta`:
//!
//! `s = beta * (v_frame - v_obstacle) . R^T e / |e|`
//!
//! where `R` is the frame rotation for `ReferenceFrame::Local` and the identity for
//! `ReferenceFrame::LocalWorldAligned`. The value is negative while the robot approaches the
//! obstacle. The residual keeps three components; the signal is in the first, the other two
//! are always zero.

extern crate nalgebra as na;

use std::sync::Arc;
use na::{DVector, Matrix3, Matrix6xX, Vector3};
use crate::data_collector::DataCollector;
use crate::geometry::{GeometryData, GeometryModel};
use crate::kinematic_traits::{FrameIndex, JointIndex, KinematicsProvider, Motion, PairIndex, ReferenceFrame,
                              UNIVERSE};
use crate::residual_error::{check_matrix_shape, ResidualError};
use crate::residual_traits::{Residual, ResidualOutputs};
use crate::state::StateMultibody;

const NR: usize = 3;

/// How the separation enters the projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeparationScaling {
    /// Project on `e / |e|`: the residual is a velocity.
    #[default]
    Unit,
    /// Project on `e` itself: the residual grows with the distance.
    Raw,
}

/// Motion of the obstacle, world frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ObstacleMotion {
    #[default]
    Static,
    /// The obstacle translates with this velocity. The geometry model still places it by its
    /// registered placement, so this only affects the relative velocity.
    ConstantVelocity(Vector3<f64>),
}

impl ObstacleMotion {
    pub fn velocity(&self) -> Vector3<f64> {
        match self {
            ObstacleMotion::Static => Vector3::zeros(),
            ObstacleMotion::ConstantVelocity(velocity) => *velocity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityCollisionOptions {
    pub scaling: SeparationScaling,
    pub obstacle: ObstacleMotion,
    /// Separations shorter than this have no usable direction; residual and derivatives
    /// are then zero.
    pub distance_floor: f64,
}

impl Default for VelocityCollisionOptions {
    fn default() -> Self {
        VelocityCollisionOptions {
            scaling: SeparationScaling::Unit,
            obstacle: ObstacleMotion::Static,
            distance_floor: 1e-9,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VelocityCollisionResidual {
    state: StateMultibody,
    nu: usize,
    geometry: Arc<GeometryModel>,
    pair_id: PairIndex,
    joint_id: JointIndex,
    frame_id: FrameIndex,
    reference: ReferenceFrame,
    beta: f64,
    options: VelocityCollisionOptions,
}

#[derive(Debug, Clone)]
pub struct VelocityCollisionData {
    pub geometry: GeometryData,
    /// `p1 - p2`, world frame.
    pub separation: Vector3<f64>,
    /// Unit or raw separation depending on the scaling, zero when below the distance floor.
    pub separation_direction: Vector3<f64>,
    pub separation_norm: f64,
    pub frame_jacobian: Matrix6xX<f64>,
    pub frame_velocity: Motion,
    /// `[dV/dq | dV/dv]` of the frame velocity.
    pub frame_velocity_dx: Matrix6xX<f64>,
    pub outputs: ResidualOutputs,
}

impl AsRef<ResidualOutputs> for VelocityCollisionData {
    fn as_ref(&self) -> &ResidualOutputs {
        &self.outputs
    }
}

impl VelocityCollisionResidual {
    /// Residual with default options. `frame_id` is the robot frame whose velocity is
    /// projected; the first object of the pair must be attached to the parent joint of this
    /// frame and the second one to the universe.
    pub fn new(state: StateMultibody, nu: usize, geometry: Arc<GeometryModel>, pair_id: PairIndex,
               frame_id: FrameIndex, reference: ReferenceFrame, beta: f64) -> Result<Self, ResidualError> {
        Self::with_options(state, nu, geometry, pair_id, frame_id, reference, beta,
                           VelocityCollisionOptions::default())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_options(state: StateMultibody, nu: usize, geometry: Arc<GeometryModel>, pair_id: PairIndex,
                        frame_id: FrameIndex, reference: ReferenceFrame, beta: f64,
                        options: VelocityCollisionOptions) -> Result<Self, ResidualError> {
        let joint_id = state.model().frame(frame_id)?.parent;
        check_pair(&geometry, pair_id, joint_id)?;
        Ok(VelocityCollisionResidual {
            state,
            nu,
            geometry,
            pair_id,
            joint_id,
            frame_id,
            reference,
            beta,
            options,
        })
    }

    pub fn geometry(&self) -> &Arc<GeometryModel> {
        &self.geometry
    }

    pub fn pair_id(&self) -> PairIndex {
        self.pair_id
    }

    /// Re-targets the residual to another pair of the same geometry model.
    pub fn set_pair_id(&mut self, pair_id: PairIndex) -> Result<(), ResidualError> {
        check_pair(&self.geometry, pair_id, self.joint_id)?;
        self.pair_id = pair_id;
        Ok(())
    }

    pub fn joint_id(&self) -> JointIndex {
        self.joint_id
    }

    pub fn frame_id(&self) -> FrameIndex {
        self.frame_id
    }

    pub fn reference(&self) -> ReferenceFrame {
        self.reference
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn options(&self) -> &VelocityCollisionOptions {
        &self.options
    }

    /// `R^T` for the local frame, identity otherwise.
    fn to_reference(&self, kinematics: &dyn KinematicsProvider) -> Matrix3<f64> {
        match self.reference {
            ReferenceFrame::Local => kinematics.frame_placement(self.frame_id).rotation
                .to_rotation_matrix().into_inner().transpose(),
            ReferenceFrame::LocalWorldAligned => Matrix3::identity(),
        }
    }
}

fn check_pair(geometry: &GeometryModel, pair_id: PairIndex, joint_id: JointIndex) -> Result<(), ResidualError> {
    let pair = geometry.pair(pair_id)?;
    geometry.check_pair_supported(pair_id)?;
    let robot = &geometry.objects()[pair.first];
    if robot.parent_joint != joint_id {
        return Err(ResidualError::InvalidModel(format!(
            "geometry {} is attached to joint {}, the frame to joint {}", robot.name, robot.parent_joint, joint_id)));
    }
    let obstacle = &geometry.objects()[pair.second];
    if obstacle.parent_joint != UNIVERSE {
        return Err(ResidualError::InvalidModel(format!(
            "obstacle {} must be attached to the universe", obstacle.name)));
    }
    Ok(())
}

impl Residual for VelocityCollisionResidual {
    type Data = VelocityCollisionData;

    fn state(&self) -> &StateMultibody {
        &self.state
    }

    fn nr(&self) -> usize {
        NR
    }

    fn nu(&self) -> usize {
        self.nu
    }

    fn create_data(&self, shared: &DataCollector) -> Result<VelocityCollisionData, ResidualError> {
        shared.multibody()?;
        let nv = self.state.nv();
        Ok(VelocityCollisionData {
            geometry: GeometryData::new(&self.geometry),
            separation: Vector3::zeros(),
            separation_direction: Vector3::zeros(),
            separation_norm: 0.0,
            frame_jacobian: Matrix6xX::zeros(nv),
            frame_velocity: Motion::zero(),
            frame_velocity_dx: Matrix6xX::zeros(2 * nv),
            outputs: ResidualOutputs::new(NR, self.state.ndx(), self.nu),
        })
    }

    fn check_data(&self, data: &VelocityCollisionData) -> Result<(), ResidualError> {
        data.outputs.check_shape(NR, self.state.ndx(), self.nu)?;
        check_matrix_shape("frame_velocity_dx", data.frame_velocity_dx.shape(), (6, self.state.ndx()))?;
        data.geometry.check_model(&self.geometry)
    }

    fn calc(&self, data: &mut VelocityCollisionData, shared: &DataCollector, x: &DVector<f64>, u: &DVector<f64>)
            -> Result<(), ResidualError> {
        self.check_arguments(x, u)?;
        self.check_data(data)?;
        let kinematics = shared.multibody()?;

        data.geometry.update_placements(&self.geometry, kinematics)?;
        let separation = data.geometry.compute_distance(&self.geometry, self.pair_id)?.separation;
        data.separation = separation;
        data.separation_norm = separation.norm();
        data.frame_velocity = kinematics.frame_velocity(self.frame_id, self.reference);
        data.frame_jacobian = kinematics.frame_jacobian(self.frame_id, self.reference);

        data.outputs.r.fill(0.0);
        if data.separation_norm < self.options.distance_floor {
            tracing::debug!("pair {}: separation {:e} below floor, no direction", self.pair_id, data.separation_norm);
            data.separation_direction = Vector3::zeros();
        } else {
            data.separation_direction = match self.options.scaling {
                SeparationScaling::Unit => separation / data.separation_norm,
                SeparationScaling::Raw => separation,
            };
            let rt = self.to_reference(kinematics);
            let direction = rt * data.separation_direction;
            let relative = data.frame_velocity.linear - rt * self.options.obstacle.velocity();
            data.outputs.r[0] = self.beta * relative.dot(&direction);
        }
        data.outputs.guard.calc_done(x);
        tracing::trace!("pair {}: distance {:.6}, residual {:.6}", self.pair_id, data.separation_norm, data.outputs.r[0]);
        Ok(())
    }

    fn calc_diff(&self, data: &mut VelocityCollisionData, shared: &DataCollector, x: &DVector<f64>,
                 u: &DVector<f64>) -> Result<(), ResidualError> {
        self.check_arguments(x, u)?;
        self.check_data(data)?;
        data.outputs.guard.check_diff(x)?;
        let kinematics = shared.multibody()?;
        let nv = self.state.nv();

        let (dv_dq, dv_dv) = kinematics.frame_velocity_derivatives(self.frame_id, self.reference);
        data.frame_velocity_dx.columns_mut(0, nv).copy_from(&dv_dq);
        data.frame_velocity_dx.columns_mut(nv, nv).copy_from(&dv_dv);

        data.outputs.rx.fill(0.0);
        data.outputs.ru.fill(0.0);
        if data.separation_norm >= self.options.distance_floor {
            let de_dq = data.geometry.separation_jacobian(self.pair_id, self.joint_id, kinematics)?;
            let direction_world = data.separation_direction;
            let dw_dq = match self.options.scaling {
                SeparationScaling::Unit => {
                    let projector = Matrix3::identity() - direction_world * direction_world.transpose();
                    projector * de_dq / data.separation_norm
                }
                SeparationScaling::Raw => de_dq,
            };

            let rt = self.to_reference(kinematics);
            let direction = rt * direction_world;
            let ddirection_dq = rt * dw_dq
                + kinematics.frame_vector_derivative(self.frame_id, self.reference, &direction_world);

            let obstacle_velocity = self.options.obstacle.velocity();
            let relative = data.frame_velocity.linear - rt * obstacle_velocity;
            let drelative_dq = dv_dq.fixed_rows::<3>(0)
                - kinematics.frame_vector_derivative(self.frame_id, self.reference, &obstacle_velocity);

            let ds_dq = (ddirection_dq.transpose() * relative + drelative_dq.transpose() * direction) * self.beta;
            let ds_dv = dv_dv.fixed_rows::<3>(0).transpose() * direction * self.beta;
            for j in 0..nv {
                data.outputs.rx[(0, j)] = ds_dq[j];
                data.outputs.rx[(0, nv + j)] = ds_dv[j];
            }
        }
        data.outputs.guard.diff_done();
        Ok(())
    }
}
