use nalgebra::Vector3;

use crate::datatypes::{BoundingBox, BoundingRegion, Space};

/// Relative slack applied to box faces so that points computed on a face
/// (triangle quadrature on a planar boundary) are not lost to rounding
pub const SNAP_TOLERANCE: f64 = 1e-10;

fn axis_tolerance(bbox: &BoundingBox, axis: usize) -> f64 {
    let scale = 1.0_f64
        .max(bbox.lower[axis].abs())
        .max(bbox.upper[axis].abs());
    SNAP_TOLERANCE * scale
}

fn box_contains_point(bbox: &BoundingBox, point: &Vector3<f64>) -> bool {
    (0..3).all(|axis| {
        let tol = axis_tolerance(bbox, axis);
        point[axis] >= bbox.lower[axis] - tol && point[axis] <= bbox.upper[axis] + tol
    })
}

/// Tests if a point lies inside the region's box of the given space
///
/// # Arguments
/// * `region` - The region to test against
/// * `point` - The point, expressed in `space`
/// * `space` - Which of the region's boxes to use
///
/// # Returns
/// True if every coordinate lies within `[lower, upper]`, bounds included
pub fn contains_point(region: &BoundingRegion, point: &Vector3<f64>, space: Space) -> bool {
    box_contains_point(region.get(space), point)
}

/// Tests if a box lies entirely inside the region's box of the given space
pub fn contains_box(region: &BoundingRegion, bbox: &BoundingBox, space: Space) -> bool {
    let target = region.get(space);
    box_contains_point(target, &bbox.lower) && box_contains_point(target, &bbox.upper)
}

/// A point passes only if it lies inside the region in both spaces
pub fn contains_in_both(
    region: &BoundingRegion,
    physical: &Vector3<f64>,
    parametric: &Vector3<f64>,
) -> bool {
    contains_point(region, physical, Space::Physical)
        && contains_point(region, parametric, Space::Parametric)
}

fn box_intersection(a: &BoundingBox, b: &BoundingBox) -> Option<BoundingBox> {
    let lower = a.lower.sup(&b.lower);
    let mut upper = a.upper.inf(&b.upper);
    for axis in 0..3 {
        if lower[axis] > upper[axis] {
            let tol = axis_tolerance(a, axis).max(axis_tolerance(b, axis));
            if lower[axis] > upper[axis] + tol {
                return None;
            }
            // faces touching within the slack leave a flat intersection
            upper[axis] = lower[axis];
        }
    }
    Some(BoundingBox { lower, upper })
}

/// Intersects two regions space by space
///
/// # Returns
/// `None` if the regions are disjoint in either space
pub fn intersection(a: &BoundingRegion, b: &BoundingRegion) -> Option<BoundingRegion> {
    let physical = box_intersection(&a.physical, &b.physical)?;
    let parametric = box_intersection(&a.parametric, &b.parametric)?;
    Some(BoundingRegion::new(physical, parametric))
}

/// Maps a physical point into the parametric box through the affine map
/// between the region's two boxes. Flat physical axes map to the lower
/// parametric bound.
pub fn to_parametric(bounds: &BoundingRegion, point: &Vector3<f64>) -> Vector3<f64> {
    remap(&bounds.physical, &bounds.parametric, point)
}

/// Inverse of `to_parametric`
pub fn to_physical(bounds: &BoundingRegion, point: &Vector3<f64>) -> Vector3<f64> {
    remap(&bounds.parametric, &bounds.physical, point)
}

fn remap(from: &BoundingBox, to: &BoundingBox, point: &Vector3<f64>) -> Vector3<f64> {
    Vector3::from_fn(|axis, _| {
        let width = from.upper[axis] - from.lower[axis];
        if width == 0.0 {
            return to.lower[axis];
        }
        let t = (point[axis] - from.lower[axis]) / width;
        to.lower[axis] + t * (to.upper[axis] - to.lower[axis])
    })
}
