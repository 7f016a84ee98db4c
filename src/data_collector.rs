//! Shared evaluation context handed to every residual of one time step.
//!
//! The host fills it once per step (kinematics are computed only once) and every residual
//! reads from it. Residuals that need multibody quantities check the kind when their data is
//! created and again when they evaluate, failing with a tagged error instead of panicking.

extern crate nalgebra as na;

use std::sync::Arc;
use na::DVector;
use crate::kinematics_impl::MultibodyData;
use crate::multibody::MultibodyModel;
use crate::residual_error::ResidualError;

#[derive(Debug, Clone)]
pub enum DataCollector {
    /// Context without any robot quantities, e.g. for pure control residuals.
    Abstract,
    /// Context carrying the kinematics of the robot for the current state.
    Multibody(MultibodyData),
}

impl DataCollector {
    /// Multibody context with the kinematics updated for `x = [q; v]` at zero joint acceleration.
    pub fn for_state(model: &Arc<MultibodyModel>, x: &DVector<f64>) -> Result<Self, ResidualError> {
        let mut data = MultibodyData::new(model);
        data.update_state(x)?;
        Ok(DataCollector::Multibody(data))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DataCollector::Abstract => "abstract",
            DataCollector::Multibody(_) => "multibody",
        }
    }

    /// Capability check for the multibody variant.
    pub fn multibody(&self) -> Result<&MultibodyData, ResidualError> {
        match self {
            DataCollector::Multibody(data) => Ok(data),
            other => {
                tracing::warn!("shared data of kind {} where multibody data is required", other.kind());
                Err(ResidualError::InvalidSharedData { expected: "multibody", found: other.kind() })
            }
        }
    }

    /// Mutable access, used to move the kinematics of a reused context to the next state.
    pub fn multibody_mut(&mut self) -> Result<&mut MultibodyData, ResidualError> {
        let kind = self.kind();
        match self {
            DataCollector::Multibody(data) => Ok(data),
            _ => {
                tracing::warn!("shared data of kind {} where multibody data is required", kind);
                Err(ResidualError::InvalidSharedData { expected: "multibody", found: kind })
            }
        }
    }
}

impl From<MultibodyData> for DataCollector {
    fn from(data: MultibodyData) -> Self {
        DataCollector::Multibody(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematic_traits::KinematicsProvider;
    use crate::multibody_robots::planar_two_link_arm;

    #[test]
    fn test_capability_check() {
        let (model, _) = planar_two_link_arm(1.0, 1.0);
        let shared: DataCollector = MultibodyData::new(&Arc::new(model)).into();
        assert!(shared.multibody().is_ok());
        assert_eq!(
            DataCollector::Abstract.multibody().unwrap_err(),
            ResidualError::InvalidSharedData { expected: "multibody", found: "abstract" }
        );
    }

    #[test]
    fn test_reused_context_follows_new_state() {
        let (model, tip) = planar_two_link_arm(1.0, 0.5);
        let model = Arc::new(model);
        let mut shared = DataCollector::for_state(&model, &DVector::zeros(4)).unwrap();
        let x = DVector::from_vec(vec![std::f64::consts::FRAC_PI_2, 0.0, 0.0, 0.0]);
        shared.multibody_mut().unwrap().update_state(&x).unwrap();
        let tip = shared.multibody().unwrap().frame_placement(tip).translation.vector;
        assert!(tip.x.abs() < 1e-12 && (tip.y - 1.5).abs() < 1e-12);
        assert!(DataCollector::Abstract.multibody_mut().is_err());
    }
}
