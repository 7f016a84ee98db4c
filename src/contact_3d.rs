//! Rigid point contact constraining the three translations of a frame.
//!
//! The constraint is written at the acceleration level, `Jc a + a0 = 0`, with the
//! Baumgarte-stabilized drift
//!
//! `a0 = a_frame + kp (p - p_ref) + kd v_frame`
//!
//! where `a_frame` is the classical (not spatial) acceleration of the frame origin. Everything
//! is expressed in the configured reference frame.

extern crate nalgebra as na;

use na::{DMatrix, DVector, Matrix3, Vector3};
use crate::contact_traits::{Contact, ContactData};
use crate::kinematic_traits::{FrameIndex, Force, KinematicsProvider, ReferenceFrame};
use crate::residual_error::{check_matrix_shape, check_vector_len, ResidualError};
use crate::residual_traits::{EvaluationStage, ForceStage};
use crate::state::StateMultibody;

const ALL_ROWS: [usize; 3] = [0, 1, 2];

#[derive(Debug, Clone)]
pub struct Contact3d {
    state: StateMultibody,
    frame_id: FrameIndex,
    reference_position: Vector3<f64>,
    nu: usize,
    /// Proportional and derivative Baumgarte gains.
    gains: [f64; 2],
    reference: ReferenceFrame,
}

impl Contact3d {
    pub fn new(state: StateMultibody, frame_id: FrameIndex, reference_position: Vector3<f64>, nu: usize,
               gains: [f64; 2], reference: ReferenceFrame) -> Result<Self, ResidualError> {
        state.model().frame(frame_id)?;
        Ok(Contact3d { state, frame_id, reference_position, nu, gains, reference })
    }

    pub fn reference_position(&self) -> &Vector3<f64> {
        &self.reference_position
    }

    pub fn set_reference_position(&mut self, reference_position: Vector3<f64>) {
        self.reference_position = reference_position;
    }

    pub fn gains(&self) -> [f64; 2] {
        self.gains
    }

    pub fn reference(&self) -> ReferenceFrame {
        self.reference
    }

    fn rotation_transposed(data: &ContactData) -> Matrix3<f64> {
        data.placement.rotation.to_rotation_matrix().into_inner().transpose()
    }

    /// World-aligned drift before the projection to the reference frame.
    fn world_drift(&self, kinematics: &dyn KinematicsProvider) -> Vector3<f64> {
        let [kp, kd] = self.gains;
        let position = kinematics.frame_placement(self.frame_id).translation.vector;
        let velocity = kinematics.frame_velocity(self.frame_id, ReferenceFrame::LocalWorldAligned).linear;
        kinematics.frame_classical_acceleration(self.frame_id, ReferenceFrame::LocalWorldAligned)
            + (position - self.reference_position) * kp
            + velocity * kd
    }

    /// Fills `full_jc`, `full_a0` and the cached placement.
    pub(crate) fn calc_full(&self, data: &mut ContactData, kinematics: &dyn KinematicsProvider,
                            x: &DVector<f64>) -> Result<(), ResidualError> {
        check_vector_len("x", x.len(), self.state.nx())?;
        data.placement = *kinematics.frame_placement(self.frame_id);
        let jacobian = kinematics.frame_jacobian(self.frame_id, self.reference);
        data.full_jc.copy_from(&jacobian.fixed_rows::<3>(0));
        let drift = self.world_drift(kinematics);
        data.full_a0 = match self.reference {
            ReferenceFrame::LocalWorldAligned => drift,
            ReferenceFrame::Local => Self::rotation_transposed(data) * drift,
        };
        data.guard_mut().calc_done(x);
        Ok(())
    }

    /// Fills `full_da0_dx`.
    pub(crate) fn calc_diff_full(&self, data: &mut ContactData, kinematics: &dyn KinematicsProvider,
                                 x: &DVector<f64>) -> Result<(), ResidualError> {
        check_vector_len("x", x.len(), self.state.nx())?;
        data.guard().check_diff(x)?;
        let nv = self.state.nv();
        let [kp, kd] = self.gains;
        let world = ReferenceFrame::LocalWorldAligned;

        let jacobian = kinematics.frame_jacobian(self.frame_id, world);
        let (velocity_dq, _) = kinematics.frame_velocity_derivatives(self.frame_id, world);
        let (acceleration_dq, acceleration_dv) =
            kinematics.frame_classical_acceleration_derivatives(self.frame_id, world);

        let linear_jacobian = jacobian.fixed_rows::<3>(0);
        let mut da0_dq = acceleration_dq + linear_jacobian * kp + velocity_dq.fixed_rows::<3>(0) * kd;
        let mut da0_dv = acceleration_dv + linear_jacobian * kd;
        if self.reference == ReferenceFrame::Local {
            let rt = Self::rotation_transposed(data);
            let drift = self.world_drift(kinematics);
            da0_dq = rt * da0_dq + kinematics.frame_vector_derivative(self.frame_id, self.reference, &drift);
            da0_dv = rt * da0_dv;
        }
        data.full_da0_dx.columns_mut(0, nv).copy_from(&da0_dq);
        data.full_da0_dx.columns_mut(nv, nv).copy_from(&da0_dv);
        data.guard_mut().diff_done();
        Ok(())
    }

    /// Stores the 3-D force, given in the reference frame, and its spatial counterpart on the
    /// parent joint. World-aligned forces need the frame rotation cached by `calc`.
    pub(crate) fn store_force(&self, data: &mut ContactData, force: Vector3<f64>) -> Result<(), ResidualError> {
        let local = match self.reference {
            ReferenceFrame::Local => force,
            ReferenceFrame::LocalWorldAligned => {
                if data.stage() == EvaluationStage::Uninitialized {
                    tracing::warn!("world-aligned force on frame {} stored before calc", self.frame_id);
                    return Err(ResidualError::ForceBeforeCalc);
                }
                Self::rotation_transposed(data) * force
            }
        };
        let joint_m_frame = &self.state.model().frames()[self.frame_id].placement;
        data.f = force;
        data.fext = Force::act(joint_m_frame, &Force { linear: local, angular: Vector3::zeros() });
        data.force_stage = ForceStage::ForceValid;
        Ok(())
    }
}

impl Contact for Contact3d {
    fn state(&self) -> &StateMultibody {
        &self.state
    }

    fn nc(&self) -> usize {
        3
    }

    fn nu(&self) -> usize {
        self.nu
    }

    fn frame_id(&self) -> FrameIndex {
        self.frame_id
    }

    fn calc(&self, data: &mut ContactData, kinematics: &dyn KinematicsProvider, x: &DVector<f64>)
            -> Result<(), ResidualError> {
        self.check_data(data)?;
        self.calc_full(data, kinematics, x)?;
        data.select_kinematics(&ALL_ROWS);
        Ok(())
    }

    fn calc_diff(&self, data: &mut ContactData, kinematics: &dyn KinematicsProvider, x: &DVector<f64>)
                 -> Result<(), ResidualError> {
        self.check_data(data)?;
        self.calc_diff_full(data, kinematics, x)?;
        data.select_derivatives(&ALL_ROWS);
        Ok(())
    }

    fn update_force(&self, data: &mut ContactData, force: &DVector<f64>) -> Result<(), ResidualError> {
        self.check_data(data)?;
        check_vector_len("force", force.len(), 3)?;
        self.store_force(data, Vector3::new(force[0], force[1], force[2]))
    }

    fn update_force_diff(&self, data: &mut ContactData, df_dx: &DMatrix<f64>, df_du: &DMatrix<f64>)
                         -> Result<(), ResidualError> {
        self.check_data(data)?;
        check_matrix_shape("df_dx", df_dx.shape(), (3, self.state.ndx()))?;
        check_matrix_shape("df_du", df_du.shape(), (3, self.nu))?;
        data.df_dx.copy_from(df_dx);
        data.df_du.copy_from(df_du);
        data.force_stage = ForceStage::ForceDerivativesValid;
        Ok(())
    }
}
