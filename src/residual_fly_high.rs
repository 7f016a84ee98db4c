//! Residual that penalizes horizontal motion of a frame close to the ground.
//!
//! `r = exp(-slope * z) * v_xy`, with `z` the height of the frame and `v_xy` its horizontal
//! velocity, both in the world. Far above the ground the residual vanishes.

extern crate nalgebra as na;

use na::DVector;
use crate::data_collector::DataCollector;
use crate::kinematic_traits::{FrameIndex, KinematicsProvider, ReferenceFrame};
use crate::residual_error::ResidualError;
use crate::residual_traits::{Residual, ResidualOutputs};
use crate::state::StateMultibody;

const NR: usize = 2;

#[derive(Debug, Clone)]
pub struct FlyHighResidual {
    state: StateMultibody,
    frame_id: FrameIndex,
    slope: f64,
    nu: usize,
}

#[derive(Debug, Clone)]
pub struct FlyHighData {
    /// `exp(-slope * z)` of the last `calc`.
    pub height_factor: f64,
    pub outputs: ResidualOutputs,
}

impl AsRef<ResidualOutputs> for FlyHighData {
    fn as_ref(&self) -> &ResidualOutputs {
        &self.outputs
    }
}

impl FlyHighResidual {
    pub fn new(state: StateMultibody, frame_id: FrameIndex, slope: f64, nu: usize) -> Result<Self, ResidualError> {
        state.model().frame(frame_id)?;
        Ok(FlyHighResidual { state, frame_id, slope, nu })
    }

    pub fn frame_id(&self) -> FrameIndex {
        self.frame_id
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn set_slope(&mut self, slope: f64) {
        self.slope = slope;
    }
}

impl Residual for FlyHighResidual {
    type Data = FlyHighData;

    fn state(&self) -> &StateMultibody {
        &self.state
    }

    fn nr(&self) -> usize {
        NR
    }

    fn nu(&self) -> usize {
        self.nu
    }

    fn create_data(&self, shared: &DataCollector) -> Result<FlyHighData, ResidualError> {
        shared.multibody()?;
        Ok(FlyHighData {
            height_factor: 0.0,
            outputs: ResidualOutputs::new(NR, self.state.ndx(), self.nu),
        })
    }

    fn calc(&self, data: &mut FlyHighData, shared: &DataCollector, x: &DVector<f64>, u: &DVector<f64>)
            -> Result<(), ResidualError> {
        self.check_arguments(x, u)?;
        self.check_data(data)?;
        let kinematics = shared.multibody()?;
        let height = kinematics.frame_placement(self.frame_id).translation.z;
        let velocity = kinematics.frame_velocity(self.frame_id, ReferenceFrame::LocalWorldAligned).linear;
        data.height_factor = (-self.slope * height).exp();
        data.outputs.r[0] = data.height_factor * velocity.x;
        data.outputs.r[1] = data.height_factor * velocity.y;
        data.outputs.guard.calc_done(x);
        Ok(())
    }

    fn calc_diff(&self, data: &mut FlyHighData, shared: &DataCollector, x: &DVector<f64>, u: &DVector<f64>)
                 -> Result<(), ResidualError> {
        self.check_arguments(x, u)?;
        self.check_data(data)?;
        data.outputs.guard.check_diff(x)?;
        let kinematics = shared.multibody()?;
        let nv = self.state.nv();
        let jacobian = kinematics.frame_jacobian(self.frame_id, ReferenceFrame::LocalWorldAligned);
        let (dv_dq, dv_dv) = kinematics.frame_velocity_derivatives(self.frame_id, ReferenceFrame::LocalWorldAligned);

        // d/dq [f(z) v] = f(z) dv/dq - slope * v * f(z) dz/dq
        let factor = data.height_factor;
        for row in 0..NR {
            let residual = data.outputs.r[row];
            for j in 0..nv {
                data.outputs.rx[(row, j)] = factor * dv_dq[(row, j)] - self.slope * residual * jacobian[(2, j)];
                data.outputs.rx[(row, nv + j)] = factor * dv_dv[(row, j)];
            }
        }
        data.outputs.guard.diff_done();
        Ok(())
    }
}
