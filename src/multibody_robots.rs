//! Hardcoded multibody models for a few robot topologies, and obstacle scenes around them

extern crate nalgebra as na;

use na::{Isometry3, Vector3};
use crate::kinematic_traits::{FrameIndex, UNIVERSE};
use crate::multibody::MultibodyModel;

#[cfg(feature = "collisions")]
use na::Point3;
#[cfg(feature = "collisions")]
use parry3d_f64::shape::{Ball, Capsule, HalfSpace};
#[cfg(feature = "collisions")]
use crate::geometry::{GeometryModel, GeometryObject, GeometryShape};

/// Name of the end effector frame in all preset models.
pub const TIP: &str = "tip";

/// Planar arm with two revolute joints about the world Z axis. Link lengths are along the
/// joint X axis; the returned frame is the tip of the second link.
pub fn planar_two_link_arm(l1: f64, l2: f64) -> (MultibodyModel, FrameIndex) {
    let mut model = MultibodyModel::new("planar_two_link_arm");
    let shoulder = model.add_joint(UNIVERSE, "shoulder", Isometry3::identity(), Vector3::z())
        .expect("static model");
    let elbow = model.add_joint(shoulder, "elbow", Isometry3::translation(l1, 0.0, 0.0), Vector3::z())
        .expect("static model");
    let tip = model.add_frame(TIP, elbow, Isometry3::translation(l2, 0.0, 0.0))
        .expect("static model");
    (model, tip)
}

/// Six axis arm with offsets and mixed joint axes, loosely shaped like an industrial robot.
/// The tip frame is rotated relative to the last joint so that local and world-aligned
/// quantities differ.
pub fn six_axis_arm() -> (MultibodyModel, FrameIndex) {
    let mut model = MultibodyModel::new("six_axis_arm");
    let links: [(Isometry3<f64>, Vector3<f64>); 6] = [
        (Isometry3::translation(0.0, 0.0, 0.3), Vector3::z()),
        (Isometry3::translation(0.1, 0.0, 0.25), Vector3::y()),
        (Isometry3::translation(0.0, 0.05, 0.6), Vector3::y()),
        (Isometry3::translation(0.15, 0.0, 0.1), Vector3::x()),
        (Isometry3::translation(0.45, 0.0, 0.0), Vector3::y()),
        (Isometry3::translation(0.08, 0.0, 0.0), Vector3::new(1.0, 0.2, 0.1)),
    ];
    let mut parent = UNIVERSE;
    for (i, (placement, axis)) in links.into_iter().enumerate() {
        parent = model.add_joint(parent, &format!("j{}", i + 1), placement, axis)
            .expect("static model");
    }
    let tool = Isometry3::new(Vector3::new(0.05, 0.02, 0.12), Vector3::new(0.3, -0.2, 0.5));
    let tip = model.add_frame(TIP, parent, tool).expect("static model");
    (model, tip)
}

/// Torso with a yaw joint carrying two three-joint arms. The returned frame is the left hand,
/// the right hand is available as `right_tip`.
pub fn branched_torso() -> (MultibodyModel, FrameIndex) {
    let mut model = MultibodyModel::new("branched_torso");
    let torso = model.add_joint(UNIVERSE, "torso", Isometry3::translation(0.0, 0.0, 1.0), Vector3::z())
        .expect("static model");

    let arm = |model: &mut MultibodyModel, side: &str, sign: f64| -> FrameIndex {
        let shoulder = model.add_joint(torso, &format!("{}_shoulder", side),
                                       Isometry3::translation(0.0, sign * 0.25, 0.3), Vector3::y())
            .expect("static model");
        let roll = model.add_joint(shoulder, &format!("{}_roll", side),
                                   Isometry3::translation(0.0, sign * 0.05, 0.0), Vector3::x())
            .expect("static model");
        let elbow = model.add_joint(roll, &format!("{}_elbow", side),
                                    Isometry3::translation(0.0, 0.0, -0.3), Vector3::y())
            .expect("static model");
        let name = if sign > 0.0 { TIP.to_string() } else { format!("{}_{}", side, TIP) };
        model.add_frame(&name, elbow,
                        Isometry3::new(Vector3::new(0.0, 0.0, -0.25), Vector3::new(0.0, 0.4, 0.0)))
            .expect("static model")
    };
    let left = arm(&mut model, "left", 1.0);
    arm(&mut model, "right", -1.0);
    (model, left)
}

/// Topologies exercised by the property tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    PlanarTwoLink,
    SixAxis,
    BranchedTorso,
}

impl Topology {
    pub const ALL: [Topology; 3] = [Topology::PlanarTwoLink, Topology::SixAxis, Topology::BranchedTorso];

    pub fn build(self) -> (MultibodyModel, FrameIndex) {
        match self {
            Topology::PlanarTwoLink => planar_two_link_arm(1.0, 0.5),
            Topology::SixAxis => six_axis_arm(),
            Topology::BranchedTorso => branched_torso(),
        }
    }
}

/// Planar two-link arm (links 1.0 and 0.5) with a capsule of radius 0.05 covering the second
/// link and a static ball of radius 0.2 centered at `obstacle_center`. Pair 0 is capsule
/// against ball, pair 1 is capsule against a floor at `z = -0.5`.
#[cfg(feature = "collisions")]
pub fn planar_arm_with_obstacle(obstacle_center: Point3<f64>) -> (MultibodyModel, GeometryModel, FrameIndex) {
    let (model, tip) = planar_two_link_arm(1.0, 0.5);
    let elbow = model.frames()[tip].parent;
    let mut geometry = GeometryModel::new();
    let link = geometry.add_geometry_object(GeometryObject {
        name: "forearm".into(),
        parent_joint: elbow,
        placement: Isometry3::translation(0.25, 0.0, 0.0),
        shape: GeometryShape::Capsule(Capsule::new_x(0.25, 0.05)),
    });
    let ball = geometry.add_geometry_object(GeometryObject {
        name: "obstacle".into(),
        parent_joint: UNIVERSE,
        placement: Isometry3::translation(obstacle_center.x, obstacle_center.y, obstacle_center.z),
        shape: GeometryShape::Ball(Ball::new(0.2)),
    });
    let floor = geometry.add_geometry_object(GeometryObject {
        name: "floor".into(),
        parent_joint: UNIVERSE,
        placement: Isometry3::translation(0.0, 0.0, -0.5),
        shape: GeometryShape::HalfSpace(HalfSpace::new(Vector3::z_axis())),
    });
    geometry.add_collision_pair(link, ball).expect("static scene");
    geometry.add_collision_pair(link, floor).expect("static scene");
    (model, geometry, tip)
}

/// Obstacles placed outside the reach of every preset topology, so that separations stay
/// well away from zero for any configuration. Pairs, in order: hand ball against obstacle
/// ball, hand capsule against obstacle ball, hand ball against obstacle capsule, hand
/// capsule against the floor.
#[cfg(feature = "collisions")]
pub fn obstacle_scene(topology: Topology) -> (MultibodyModel, GeometryModel, FrameIndex) {
    let (model, tip) = topology.build();
    let frame = &model.frames()[tip];
    let mut geometry = GeometryModel::new();
    let hand_ball = geometry.add_geometry_object(GeometryObject {
        name: "hand_ball".into(),
        parent_joint: frame.parent,
        placement: frame.placement,
        shape: GeometryShape::Ball(Ball::new(0.05)),
    });
    let hand_capsule = geometry.add_geometry_object(GeometryObject {
        name: "hand_capsule".into(),
        parent_joint: frame.parent,
        placement: frame.placement * Isometry3::translation(0.0, 0.0, 0.1),
        shape: GeometryShape::Capsule(Capsule::new_z(0.1, 0.03)),
    });
    let ball = geometry.add_geometry_object(GeometryObject {
        name: "boulder".into(),
        parent_joint: UNIVERSE,
        placement: Isometry3::translation(4.0, 1.0, 0.5),
        shape: GeometryShape::Ball(Ball::new(0.5)),
    });
    let pole = geometry.add_geometry_object(GeometryObject {
        name: "pole".into(),
        parent_joint: UNIVERSE,
        placement: Isometry3::translation(-4.0, 0.0, 1.0),
        shape: GeometryShape::Capsule(Capsule::new_y(3.0, 0.2)),
    });
    let floor = geometry.add_geometry_object(GeometryObject {
        name: "floor".into(),
        parent_joint: UNIVERSE,
        placement: Isometry3::translation(0.0, 0.0, -3.0),
        shape: GeometryShape::HalfSpace(HalfSpace::new(Vector3::z_axis())),
    });
    for (first, second) in [(hand_ball, ball), (hand_capsule, ball), (hand_ball, pole), (hand_capsule, floor)] {
        geometry.add_collision_pair(first, second).expect("static scene");
    }
    (model, geometry, tip)
}
