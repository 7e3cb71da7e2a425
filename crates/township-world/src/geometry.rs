//! Pure geometry helpers: distances, directions, path interpolation.
//!
//! Nothing here holds state. Paths are slices of [`PathComponent`] samples
//! ordered by time; between two samples a player moves in a straight line
//! at constant speed.

use township_types::{PathComponent, Point, Vector};

/// Tolerance used when comparing sub-tile coordinates.
pub const EPSILON: f64 = 0.0001;

/// Where a player is along a path at a given time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSample {
    /// Interpolated position.
    pub position: Point,
    /// Facing of the segment being walked.
    pub facing: Vector,
    /// Speed along the segment in tiles per second (0 at rest).
    pub velocity: f64,
}

/// Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

/// Manhattan (taxicab) distance between two points.
pub fn manhattan_distance(a: Point, b: Point) -> f64 {
    (b.x - a.x).abs() + (b.y - a.y).abs()
}

/// Whether two points coincide within [`EPSILON`].
pub fn points_equal(a: Point, b: Point) -> bool {
    distance(a, b) < EPSILON
}

/// The displacement from `from` to `to`.
pub fn vector(from: Point, to: Point) -> Vector {
    Vector::new(to.x - from.x, to.y - from.y)
}

/// Length of a vector.
pub fn vector_length(v: Vector) -> f64 {
    v.dx.hypot(v.dy)
}

/// The unit vector pointing along `v`, or `None` for a (near) zero vector.
pub fn normalize(v: Vector) -> Option<Vector> {
    let len = vector_length(v);
    if len < EPSILON {
        return None;
    }
    Some(Vector::new(v.dx / len, v.dy / len))
}

/// Orientation of a vector in degrees, clockwise from east, in `[0, 360)`.
///
/// Returns `None` for a zero vector, which has no orientation.
pub fn orientation_degrees(v: Vector) -> Option<f64> {
    if vector_length(v) < EPSILON {
        return None;
    }
    let radians = v.dy.atan2(v.dx).rem_euclid(std::f64::consts::TAU);
    Some(radians.to_degrees())
}

/// Convert a duration in seconds to whole milliseconds, rounding to the
/// nearest millisecond. Negative and non-finite inputs yield zero.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub fn secs_to_millis(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    }
}

/// Interpolate a path at `time`.
///
/// Returns `None` when the path has fewer than two samples or `time`
/// precedes its first sample. After the last sample the player is at rest
/// on the final position.
pub fn path_position(path: &[PathComponent], time: u64) -> Option<PathSample> {
    if path.len() < 2 {
        return None;
    }
    let first = path.first()?;
    let last = path.last()?;
    if time < first.t {
        return None;
    }
    if time >= last.t {
        return Some(PathSample {
            position: last.position,
            facing: last.facing,
            velocity: 0.0,
        });
    }

    for pair in path.windows(2) {
        let [start, end] = pair else {
            continue;
        };
        if start.t <= time && time <= end.t {
            let span = end.t.saturating_sub(start.t);
            if span == 0 {
                continue;
            }
            let elapsed = time.saturating_sub(start.t);
            let interp = elapsed as f64 / span as f64;
            let position = Point::new(
                interp.mul_add(end.position.x - start.position.x, start.position.x),
                interp.mul_add(end.position.y - start.position.y, start.position.y),
            );
            let velocity = distance(start.position, end.position) * 1000.0 / span as f64;
            return Some(PathSample {
                position,
                facing: start.facing,
                velocity,
            });
        }
    }
    None
}

/// Drop samples that continue in the same direction as the previous one.
///
/// Because speed is constant, linear interpolation between the remaining
/// samples yields the same positions as the dense path.
pub fn compress_path(dense: &[PathComponent]) -> Vec<PathComponent> {
    let mut compressed = Vec::with_capacity(dense.len());
    let Some(&first) = dense.first() else {
        return compressed;
    };
    compressed.push(first);

    for window in dense.windows(3) {
        let [prev, mid, next] = window else {
            continue;
        };
        let incoming = normalize(vector(prev.position, mid.position));
        let outgoing = normalize(vector(mid.position, next.position));
        let straight = match (incoming, outgoing) {
            (Some(a), Some(b)) => vector_length(vector_between(a, b)) < EPSILON,
            _ => false,
        };
        if !straight {
            compressed.push(*mid);
        }
    }

    if dense.len() > 1 {
        if let Some(&last) = dense.last() {
            compressed.push(last);
        }
    }
    compressed
}

fn vector_between(a: Vector, b: Vector) -> Vector {
    Vector::new(b.dx - a.dx, b.dy - a.dy)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn sample(x: f64, y: f64, dx: f64, dy: f64, t: u64) -> PathComponent {
        PathComponent {
            position: Point::new(x, y),
            facing: Vector::new(dx, dy),
            t,
        }
    }

    fn straight_path() -> Vec<PathComponent> {
        vec![
            sample(2.0, 2.0, 1.0, 0.0, 1_000),
            sample(8.0, 2.0, 1.0, 0.0, 7_000),
        ]
    }

    #[test]
    fn distances() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((distance(a, b) - 5.0).abs() < EPSILON);
        assert!((manhattan_distance(a, b) - 7.0).abs() < EPSILON);
        assert!(points_equal(b, Point::new(3.000_01, 4.0)));
    }

    #[test]
    fn orientation_is_clockwise_from_east() {
        assert_eq!(orientation_degrees(Vector::new(1.0, 0.0)), Some(0.0));
        let south = orientation_degrees(Vector::new(0.0, 1.0)).unwrap();
        assert!((south - 90.0).abs() < EPSILON);
        let north = orientation_degrees(Vector::new(0.0, -1.0)).unwrap();
        assert!((north - 270.0).abs() < EPSILON);
        assert_eq!(orientation_degrees(Vector::new(0.0, 0.0)), None);
    }

    #[test]
    fn interpolates_midpoint() {
        let path = straight_path();
        let mid = path_position(&path, 4_000).unwrap();
        assert!(points_equal(mid.position, Point::new(5.0, 2.0)));
        assert!((mid.velocity - 1.0).abs() < EPSILON);
        assert_eq!(mid.facing, Vector::new(1.0, 0.0));
    }

    #[test]
    fn before_start_is_out_of_range() {
        assert!(path_position(&straight_path(), 999).is_none());
        assert!(path_position(&straight_path()[..1], 1_000).is_none());
    }

    #[test]
    fn after_end_rests_on_last_sample() {
        let end = path_position(&straight_path(), 60_000).unwrap();
        assert!(points_equal(end.position, Point::new(8.0, 2.0)));
        assert_eq!(end.velocity, 0.0);
    }

    #[test]
    fn progress_never_decreases() {
        let path = vec![
            sample(0.0, 0.0, 1.0, 0.0, 0),
            sample(3.0, 0.0, 0.0, 1.0, 3_000),
            sample(3.0, 4.0, 0.0, 1.0, 7_000),
        ];
        let progress = |t: u64| {
            let p = path_position(&path, t).unwrap().position;
            // Along this L-shaped path cumulative progress is x + y.
            p.x + p.y
        };
        let mut previous = progress(0);
        for t in (0..=8_000).step_by(137) {
            let current = progress(t);
            assert!(current + EPSILON >= previous, "regressed at t={t}");
            previous = current;
        }
    }

    #[test]
    fn compress_keeps_corners_only() {
        let dense = vec![
            sample(0.0, 0.0, 1.0, 0.0, 0),
            sample(1.0, 0.0, 1.0, 0.0, 1_000),
            sample(2.0, 0.0, 0.0, 1.0, 2_000),
            sample(2.0, 1.0, 0.0, 1.0, 3_000),
            sample(2.0, 2.0, 0.0, 1.0, 4_000),
        ];
        let compressed = compress_path(&dense);
        let positions: Vec<Point> = compressed.iter().map(|c| c.position).collect();
        assert_eq!(
            positions,
            vec![Point::new(0.0, 0.0), Point::new(2.0, 0.0), Point::new(2.0, 2.0)]
        );
        let quarter = path_position(&compressed, 3_000).unwrap();
        assert!(points_equal(quarter.position, Point::new(2.0, 1.0)));
    }
}
