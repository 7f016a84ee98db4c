//! Multibody model: a kinematic tree of revolute joints with operational frames.
//!
//! The model is immutable once built and is shared between rollouts through `Arc`.
//! Joints are numbered in the order they are added, the parent of each joint must
//! already exist, so the parent index is always smaller than the child index. Joint 0 is
//! the universe.

extern crate nalgebra as na;

use na::{Isometry3, Unit, UnitQuaternion, Vector3};
use crate::kinematic_traits::{FrameIndex, JointIndex, UNIVERSE};
use crate::residual_error::ResidualError;

/// Single revolute joint.
#[derive(Debug, Clone)]
pub struct JointModel {
    pub name: String,
    pub parent: JointIndex,
    /// Placement of this joint relative to the parent joint frame when the joint is at zero.
    pub placement: Isometry3<f64>,
    /// Rotation axis in the joint frame.
    pub axis: Unit<Vector3<f64>>,
}

impl JointModel {
    /// Transform of the joint motion itself for the given angle.
    pub fn motion(&self, angle: f64) -> Isometry3<f64> {
        Isometry3::from_parts(na::Translation3::identity(), UnitQuaternion::from_axis_angle(&self.axis, angle))
    }
}

/// Operational frame rigidly attached to a joint (end effector, foot sole, tool).
#[derive(Debug, Clone)]
pub struct FrameModel {
    pub name: String,
    pub parent: JointIndex,
    /// Placement of the frame relative to the parent joint frame.
    pub placement: Isometry3<f64>,
}

#[derive(Debug, Clone)]
pub struct MultibodyModel {
    pub name: String,
    joints: Vec<JointModel>,
    frames: Vec<FrameModel>,
    /// For every joint, the ordered list of moving joints from the root down to it, inclusive.
    supports: Vec<Vec<JointIndex>>,
}

impl MultibodyModel {
    /// Creates the model containing only the universe joint.
    pub fn new(name: &str) -> Self {
        let universe = JointModel {
            name: "universe".to_string(),
            parent: UNIVERSE,
            placement: Isometry3::identity(),
            axis: Vector3::z_axis(),
        };
        MultibodyModel {
            name: name.to_string(),
            joints: vec![universe],
            frames: Vec::new(),
            supports: vec![Vec::new()],
        }
    }

    /// Appends the revolute joint to the tree.
    pub fn add_joint(&mut self, parent: JointIndex, name: &str, placement: Isometry3<f64>,
                     axis: Vector3<f64>) -> Result<JointIndex, ResidualError> {
        if parent >= self.joints.len() {
            return Err(ResidualError::IndexOutOfRange { what: "parent joint", index: parent, len: self.joints.len() });
        }
        if axis.norm() == 0.0 || !axis.iter().all(|c| c.is_finite()) {
            return Err(ResidualError::InvalidModel(format!("joint {} has no valid axis", name)));
        }
        let index = self.joints.len();
        let mut support = self.supports[parent].clone();
        support.push(index);
        self.joints.push(JointModel {
            name: name.to_string(),
            parent,
            placement,
            axis: Unit::new_normalize(axis),
        });
        self.supports.push(support);
        Ok(index)
    }

    /// Attaches the operational frame to the joint.
    pub fn add_frame(&mut self, name: &str, parent: JointIndex, placement: Isometry3<f64>)
                     -> Result<FrameIndex, ResidualError> {
        if parent >= self.joints.len() {
            return Err(ResidualError::IndexOutOfRange { what: "parent joint", index: parent, len: self.joints.len() });
        }
        self.frames.push(FrameModel { name: name.to_string(), parent, placement });
        Ok(self.frames.len() - 1)
    }

    /// Number of position variables; equals `nv` as all joints are revolute.
    pub fn nq(&self) -> usize {
        self.joints.len() - 1
    }

    pub fn nv(&self) -> usize {
        self.joints.len() - 1
    }

    pub fn njoints(&self) -> usize {
        self.joints.len()
    }

    pub fn nframes(&self) -> usize {
        self.frames.len()
    }

    pub fn joints(&self) -> &[JointModel] {
        &self.joints
    }

    pub fn frames(&self) -> &[FrameModel] {
        &self.frames
    }

    pub fn frame(&self, frame: FrameIndex) -> Result<&FrameModel, ResidualError> {
        self.frames.get(frame)
            .ok_or(ResidualError::IndexOutOfRange { what: "frame", index: frame, len: self.frames.len() })
    }

    pub fn frame_id(&self, name: &str) -> Option<FrameIndex> {
        self.frames.iter().position(|f| f.name == name)
    }

    pub fn joint_id(&self, name: &str) -> Option<JointIndex> {
        self.joints.iter().position(|j| j.name == name)
    }

    /// Moving joints between the root and the given joint, in ascending order.
    pub fn support(&self, joint: JointIndex) -> &[JointIndex] {
        &self.supports[joint]
    }

    /// Column of the joint in velocity-sized vectors and Jacobians.
    #[inline]
    pub fn idx_v(joint: JointIndex) -> usize {
        debug_assert!(joint != UNIVERSE, "universe has no velocity");
        joint - 1
    }
}
