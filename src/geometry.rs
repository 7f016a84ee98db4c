//! Geometry registry and nearest-point queries between a robot primitive and an obstacle.
//!
//! Shapes are parry primitives. Every supported shape reduces to a core (point, segment or
//! plane) inflated by a radius, which gives closed-form witness points and closed-form
//! derivatives of the separation `e = p1 - p2` with respect to the configuration.
//! The first object of a pair is the robot side, the second is the obstacle.

extern crate nalgebra as na;

use na::{Isometry3, Matrix3, Matrix3xX, Point3, Vector3};
use parry3d_f64::query;
use parry3d_f64::shape::{Ball, Capsule, HalfSpace, Segment, SegmentPointLocation, Shape};
use crate::kinematic_traits::{GeometryIndex, JointIndex, KinematicsProvider, PairIndex};
use crate::residual_error::{check_vector_len, ResidualError};

/// Below this distance between cores (centers, segment points) the separation direction is
/// not defined and the separation is reported as zero.
pub const CORE_DISTANCE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone)]
pub enum GeometryShape {
    Ball(Ball),
    Capsule(Capsule),
    HalfSpace(HalfSpace),
}

impl GeometryShape {
    pub fn name(&self) -> &'static str {
        match self {
            GeometryShape::Ball(_) => "ball",
            GeometryShape::Capsule(_) => "capsule",
            GeometryShape::HalfSpace(_) => "half space",
        }
    }

    pub fn as_shape(&self) -> &dyn Shape {
        match self {
            GeometryShape::Ball(ball) => ball,
            GeometryShape::Capsule(capsule) => capsule,
            GeometryShape::HalfSpace(half_space) => half_space,
        }
    }

    fn core(&self, placement: &Isometry3<f64>) -> Core {
        match self {
            GeometryShape::Ball(ball) => Core::Point {
                center: Point3::from(placement.translation.vector),
                radius: ball.radius,
            },
            GeometryShape::Capsule(capsule) => Core::Segment {
                segment: Segment::new(placement * capsule.segment.a, placement * capsule.segment.b),
                radius: capsule.radius,
            },
            GeometryShape::HalfSpace(half_space) => Core::Plane {
                origin: Point3::from(placement.translation.vector),
                normal: placement.rotation * half_space.normal.into_inner(),
            },
        }
    }
}

/// Shape reduced to its core in world coordinates.
enum Core {
    Point { center: Point3<f64>, radius: f64 },
    Segment { segment: Segment, radius: f64 },
    Plane { origin: Point3<f64>, normal: Vector3<f64> },
}

#[derive(Debug, Clone)]
pub struct GeometryObject {
    pub name: String,
    /// Joint carrying the object, `UNIVERSE` for the environment.
    pub parent_joint: JointIndex,
    /// Placement relative to the parent joint frame.
    pub placement: Isometry3<f64>,
    pub shape: GeometryShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionPair {
    pub first: GeometryIndex,
    pub second: GeometryIndex,
}

/// Immutable registry of geometry objects and collision pairs, shared across rollouts.
#[derive(Debug, Clone, Default)]
pub struct GeometryModel {
    objects: Vec<GeometryObject>,
    pairs: Vec<CollisionPair>,
}

impl GeometryModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_geometry_object(&mut self, object: GeometryObject) -> GeometryIndex {
        self.objects.push(object);
        self.objects.len() - 1
    }

    pub fn add_collision_pair(&mut self, first: GeometryIndex, second: GeometryIndex)
                              -> Result<PairIndex, ResidualError> {
        for index in [first, second] {
            if index >= self.objects.len() {
                return Err(ResidualError::IndexOutOfRange {
                    what: "geometry object", index, len: self.objects.len(),
                });
            }
        }
        if first == second {
            return Err(ResidualError::InvalidModel("collision pair of an object with itself".into()));
        }
        self.pairs.push(CollisionPair { first, second });
        Ok(self.pairs.len() - 1)
    }

    pub fn objects(&self) -> &[GeometryObject] {
        &self.objects
    }

    pub fn collision_pairs(&self) -> &[CollisionPair] {
        &self.pairs
    }

    pub fn pair(&self, pair_id: PairIndex) -> Result<&CollisionPair, ResidualError> {
        self.pairs.get(pair_id)
            .ok_or(ResidualError::IndexOutOfRange { what: "collision pair", index: pair_id, len: self.pairs.len() })
    }

    /// Checks that closed-form witness derivatives exist for the pair: robot side a ball or a
    /// capsule, obstacle side a ball, capsule or half space, never two capsules.
    pub fn check_pair_supported(&self, pair_id: PairIndex) -> Result<(), ResidualError> {
        let pair = self.pair(pair_id)?;
        let first = &self.objects[pair.first].shape;
        let second = &self.objects[pair.second].shape;
        let supported = matches!(
            (first, second),
            (GeometryShape::Ball(_), _)
                | (GeometryShape::Capsule(_), GeometryShape::Ball(_))
                | (GeometryShape::Capsule(_), GeometryShape::HalfSpace(_))
        );
        if supported {
            Ok(())
        } else {
            Err(ResidualError::UnsupportedPair { first: first.name(), second: second.name() })
        }
    }
}

/// Which point of the robot core is the nearest one.
#[derive(Debug, Clone, Copy, PartialEq)]
enum RobotFeature {
    /// Point rigidly attached to the robot (ball center or capsule end).
    Point(Point3<f64>),
    /// Interior point of the capsule segment, `c = a + t (b - a)`.
    Edge { a: Point3<f64>, b: Point3<f64>, t: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ObstacleFeature {
    Point,
    /// Interior of a static segment with the given direction `b - a`.
    Edge(Vector3<f64>),
    Plane(Vector3<f64>),
}

/// Nearest points of one collision pair at the current placements.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceResult {
    /// Witness point on the first (robot) and on the second (obstacle) object.
    pub nearest_points: [Point3<f64>; 2],
    /// `p1 - p2`, world frame.
    pub separation: Vector3<f64>,
    /// Cores coincide, separation direction is not defined.
    pub degenerate: bool,
    core_points: [Point3<f64>; 2],
    radii: [f64; 2],
    robot: RobotFeature,
    obstacle: ObstacleFeature,
}

impl DistanceResult {
    /// Signed distance along the separation: negative when the shapes interpenetrate.
    pub fn signed_distance(&self) -> f64 {
        match self.obstacle {
            ObstacleFeature::Plane(normal) => self.separation.dot(&normal),
            _ => {
                let cores = self.core_points[0] - self.core_points[1];
                cores.norm() - self.radii[0] - self.radii[1]
            }
        }
    }
}

/// Per-rollout geometry buffers, sized to the geometry model.
#[derive(Debug, Clone)]
pub struct GeometryData {
    /// Object placements in the world.
    pub placements: Vec<Isometry3<f64>>,
    /// Latest result for every collision pair, `None` until computed.
    pub distance_results: Vec<Option<DistanceResult>>,
}

impl GeometryData {
    pub fn new(model: &GeometryModel) -> Self {
        GeometryData {
            placements: vec![Isometry3::identity(); model.objects.len()],
            distance_results: vec![None; model.pairs.len()],
        }
    }

    /// Fails with `DimensionMismatch` unless the buffers were sized for `model`.
    pub fn check_model(&self, model: &GeometryModel) -> Result<(), ResidualError> {
        check_vector_len("geometry placements", self.placements.len(), model.objects.len())?;
        check_vector_len("distance results", self.distance_results.len(), model.pairs.len())
    }

    /// Places every object from the joint placements of the kinematics provider.
    pub fn update_placements(&mut self, model: &GeometryModel, kinematics: &dyn KinematicsProvider)
                             -> Result<(), ResidualError> {
        self.check_model(model)?;
        for (placement, object) in self.placements.iter_mut().zip(model.objects.iter()) {
            *placement = kinematics.joint_placement(object.parent_joint) * object.placement;
        }
        Ok(())
    }

    /// Computes witness points of the pair from the current placements.
    pub fn compute_distance(&mut self, model: &GeometryModel, pair_id: PairIndex)
                            -> Result<&DistanceResult, ResidualError> {
        self.check_model(model)?;
        model.check_pair_supported(pair_id)?;
        let pair = model.pairs[pair_id];
        let robot = model.objects[pair.first].shape.core(&self.placements[pair.first]);
        let obstacle = model.objects[pair.second].shape.core(&self.placements[pair.second]);

        let result = match (robot, obstacle) {
            (Core::Point { center, radius }, Core::Point { center: other, radius: other_radius }) =>
                round_points(center, other, [radius, other_radius],
                             RobotFeature::Point(center), ObstacleFeature::Point),
            (Core::Segment { segment, radius }, Core::Point { center, radius: other_radius }) => {
                let location = locate_on_segment(&segment, &center);
                let nearest = segment.point_at(&location);
                let feature = match location {
                    SegmentPointLocation::OnEdge([_, t]) => RobotFeature::Edge { a: segment.a, b: segment.b, t },
                    SegmentPointLocation::OnVertex(_) => RobotFeature::Point(nearest),
                };
                round_points(nearest, center, [radius, other_radius], feature, ObstacleFeature::Point)
            }
            (Core::Point { center, radius }, Core::Segment { segment, radius: other_radius }) => {
                let location = locate_on_segment(&segment, &center);
                let nearest = segment.point_at(&location);
                let feature = match location {
                    SegmentPointLocation::OnEdge(_) => ObstacleFeature::Edge(segment.b - segment.a),
                    SegmentPointLocation::OnVertex(_) => ObstacleFeature::Point,
                };
                round_points(center, nearest, [radius, other_radius], RobotFeature::Point(center), feature)
            }
            (Core::Point { center, radius }, Core::Plane { origin, normal }) =>
                round_plane(center, radius, origin, normal),
            (Core::Segment { segment, radius }, Core::Plane { origin, normal }) => {
                // Lower end wins, ties go to the first end.
                let height_a = normal.dot(&(segment.a - origin));
                let height_b = normal.dot(&(segment.b - origin));
                let lowest = if height_a <= height_b { segment.a } else { segment.b };
                round_plane(lowest, radius, origin, normal)
            }
            _ => unreachable!("pair support checked above"),
        };
        if result.degenerate {
            tracing::debug!("pair {} has coincident cores, separation set to zero", pair_id);
        }
        Ok(self.distance_results[pair_id].insert(result))
    }

    pub fn distance_result(&self, pair_id: PairIndex) -> Option<&DistanceResult> {
        self.distance_results.get(pair_id).and_then(|r| r.as_ref())
    }

    /// Derivative of the separation `p1 - p2` with respect to `q` (3 x nv). The obstacle is
    /// static; the robot object moves with `joint`. Requires `compute_distance` for the pair.
    pub fn separation_jacobian(&self, pair_id: PairIndex, joint: JointIndex,
                               kinematics: &dyn KinematicsProvider) -> Result<Matrix3xX<f64>, ResidualError> {
        let result = self.distance_result(pair_id).ok_or(ResidualError::CalcDiffBeforeCalc)?;
        let nv = kinematics.nv();
        if result.degenerate {
            return Ok(Matrix3xX::zeros(nv));
        }

        let core_jacobian = match result.robot {
            RobotFeature::Point(point) => kinematics.point_jacobian(joint, &point),
            RobotFeature::Edge { a, b, t } => {
                let ja = kinematics.point_jacobian(joint, &a);
                let jb = kinematics.point_jacobian(joint, &b);
                let du = &jb - &ja;
                let u = b - a;
                let w = result.core_points[1] - a;
                let l2 = u.norm_squared();
                let wu = w.dot(&u);
                // t = (w . u) / |u|^2 with w = c2 - a, u = b - a
                let dt = (ja.transpose() * (-u) + du.transpose() * w) / l2
                    - du.transpose() * u * (2.0 * wu / (l2 * l2));
                ja + &du * t + u * dt.transpose()
            }
        };

        let separation_jacobian = match result.obstacle {
            ObstacleFeature::Plane(normal) => normal * normal.transpose() * core_jacobian,
            ObstacleFeature::Point | ObstacleFeature::Edge(_) => {
                let core_jacobian = match result.obstacle {
                    ObstacleFeature::Edge(u) => {
                        (Matrix3::identity() - u * u.transpose() / u.norm_squared()) * core_jacobian
                    }
                    _ => core_jacobian,
                };
                let d = result.core_points[0] - result.core_points[1];
                let delta = d.norm();
                let rho = result.radii[0] + result.radii[1];
                let m = Matrix3::identity() * (1.0 - rho / delta) + d * d.transpose() * (rho / delta.powi(3));
                m * core_jacobian
            }
        };
        Ok(separation_jacobian)
    }

    /// Distance between the pair computed by parry for the current placements (zero when
    /// intersecting). Independent of the closed-form witness points.
    pub fn parry_distance(&self, model: &GeometryModel, pair_id: PairIndex) -> Result<f64, ResidualError> {
        self.check_model(model)?;
        let pair = model.pair(pair_id)?;
        let first = &model.objects[pair.first];
        let second = &model.objects[pair.second];
        query::distance(
            &self.placements[pair.first], first.shape.as_shape(),
            &self.placements[pair.second], second.shape.as_shape(),
        ).map_err(|_| ResidualError::UnsupportedPair { first: first.shape.name(), second: second.shape.name() })
    }
}

/// Voronoi classification of the projection of `point` on the segment.
fn locate_on_segment(segment: &Segment, point: &Point3<f64>) -> SegmentPointLocation {
    let ab = segment.b - segment.a;
    let ap = point - segment.a;
    let ab_ap = ab.dot(&ap);
    let sqnab = ab.norm_squared();
    if ab_ap <= 0.0 || sqnab == 0.0 {
        SegmentPointLocation::OnVertex(0)
    } else if ab_ap >= sqnab {
        SegmentPointLocation::OnVertex(1)
    } else {
        let t = ab_ap / sqnab;
        SegmentPointLocation::OnEdge([1.0 - t, t])
    }
}

fn round_points(c1: Point3<f64>, c2: Point3<f64>, radii: [f64; 2],
                robot: RobotFeature, obstacle: ObstacleFeature) -> DistanceResult {
    let d = c1 - c2;
    let delta = d.norm();
    if delta < CORE_DISTANCE_EPSILON {
        return DistanceResult {
            nearest_points: [c1, c1],
            separation: Vector3::zeros(),
            degenerate: true,
            core_points: [c1, c2],
            radii,
            robot,
            obstacle,
        };
    }
    let direction = d / delta;
    let p1 = c1 - direction * radii[0];
    let p2 = c2 + direction * radii[1];
    DistanceResult {
        nearest_points: [p1, p2],
        separation: p1 - p2,
        degenerate: false,
        core_points: [c1, c2],
        radii,
        robot,
        obstacle,
    }
}

fn round_plane(c1: Point3<f64>, radius: f64, origin: Point3<f64>, normal: Vector3<f64>) -> DistanceResult {
    let height = normal.dot(&(c1 - origin));
    let p1 = c1 - normal * radius;
    let p2 = c1 - normal * height;
    DistanceResult {
        nearest_points: [p1, p2],
        separation: p1 - p2,
        degenerate: false,
        core_points: [c1, p2],
        radii: [radius, 0.0],
        robot: RobotFeature::Point(c1),
        obstacle: ObstacleFeature::Plane(normal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematic_traits::UNIVERSE;

    fn two_balls(distance: f64) -> (GeometryModel, GeometryData) {
        let mut model = GeometryModel::new();
        let a = model.add_geometry_object(GeometryObject {
            name: "a".into(),
            parent_joint: UNIVERSE,
            placement: Isometry3::identity(),
            shape: GeometryShape::Ball(Ball::new(0.5)),
        });
        let b = model.add_geometry_object(GeometryObject {
            name: "b".into(),
            parent_joint: UNIVERSE,
            placement: Isometry3::translation(distance, 0.0, 0.0),
            shape: GeometryShape::Ball(Ball::new(0.25)),
        });
        model.add_collision_pair(a, b).unwrap();
        let mut data = GeometryData::new(&model);
        data.placements = model.objects().iter().map(|o| o.placement).collect();
        (model, data)
    }

    #[test]
    fn test_ball_ball_witness_points() {
        let (model, mut data) = two_balls(2.0);
        let result = data.compute_distance(&model, 0).unwrap().clone();
        assert!((result.nearest_points[0] - Point3::new(0.5, 0.0, 0.0)).norm() < 1e-12);
        assert!((result.nearest_points[1] - Point3::new(1.75, 0.0, 0.0)).norm() < 1e-12);
        // Sign convention: p1 - p2 points from the obstacle toward the robot.
        assert!((result.separation - Vector3::new(-1.25, 0.0, 0.0)).norm() < 1e-12);
        assert!((result.signed_distance() - 1.25).abs() < 1e-12);
        assert!((data.parry_distance(&model, 0).unwrap() - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_coincident_centers_are_degenerate() {
        let (model, mut data) = two_balls(0.0);
        let result = data.compute_distance(&model, 0).unwrap();
        assert!(result.degenerate);
        assert_eq!(result.separation, Vector3::zeros());
    }

    #[test]
    fn test_capsule_against_plane_prefers_first_end_on_tie() {
        let mut model = GeometryModel::new();
        let capsule = model.add_geometry_object(GeometryObject {
            name: "capsule".into(),
            parent_joint: UNIVERSE,
            placement: Isometry3::translation(0.0, 0.0, 1.0),
            shape: GeometryShape::Capsule(Capsule::new_x(0.5, 0.1)),
        });
        let floor = model.add_geometry_object(GeometryObject {
            name: "floor".into(),
            parent_joint: UNIVERSE,
            placement: Isometry3::identity(),
            shape: GeometryShape::HalfSpace(HalfSpace::new(Vector3::z_axis())),
        });
        model.add_collision_pair(capsule, floor).unwrap();
        let mut data = GeometryData::new(&model);
        data.placements = model.objects().iter().map(|o| o.placement).collect();
        let result = data.compute_distance(&model, 0).unwrap();
        assert!((result.nearest_points[0] - Point3::new(-0.5, 0.0, 0.9)).norm() < 1e-12);
        assert!((result.nearest_points[1] - Point3::new(-0.5, 0.0, 0.0)).norm() < 1e-12);
        assert!((result.signed_distance() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_capsule_pair_is_unsupported() {
        let mut model = GeometryModel::new();
        let shape = GeometryShape::Capsule(Capsule::new_z(0.2, 0.05));
        let a = model.add_geometry_object(GeometryObject {
            name: "a".into(), parent_joint: UNIVERSE, placement: Isometry3::identity(), shape: shape.clone(),
        });
        let b = model.add_geometry_object(GeometryObject {
            name: "b".into(), parent_joint: UNIVERSE, placement: Isometry3::identity(), shape,
        });
        let pair = model.add_collision_pair(a, b).unwrap();
        assert_eq!(
            model.check_pair_supported(pair),
            Err(ResidualError::UnsupportedPair { first: "capsule", second: "capsule" })
        );
        assert!(model.add_collision_pair(a, 5).is_err());
        assert!(model.add_collision_pair(a, a).is_err());
    }

    #[test]
    fn test_segment_location() {
        let segment = Segment::new(Point3::origin(), Point3::new(2.0, 0.0, 0.0));
        assert_eq!(locate_on_segment(&segment, &Point3::new(-1.0, 1.0, 0.0)), SegmentPointLocation::OnVertex(0));
        assert_eq!(locate_on_segment(&segment, &Point3::new(3.0, 1.0, 0.0)), SegmentPointLocation::OnVertex(1));
        assert_eq!(locate_on_segment(&segment, &Point3::new(0.5, 1.0, 0.0)), SegmentPointLocation::OnEdge([0.75, 0.25]));
    }
}
