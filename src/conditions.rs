use nalgebra::Vector3;

use crate::{
    backend::UnknownSet,
    classifier::{contains_in_both, intersection, to_parametric},
    datatypes::{BoundingRegion, ConditionValues, FiniteElementCondition},
    engine::{ConditionGeometry, GeometryEngine},
    error::EmbedfemError,
    mesh::BoundaryIntegrationPoint,
    settings::{ConditionDescriptor, ConditionKind},
};

/// A boundary integration point inside a condition region, in both spaces
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionPoint {
    pub point: BoundaryIntegrationPoint,
    pub parametric: Vector3<f64>,
}

/// Generates the boundary integration points of a condition surface and
/// keeps those inside the condition region in both spaces. Points of
/// zero-area triangles are dropped.
///
/// The region is first clipped to the domain bounds. Parametric coordinates
/// come from the affine map through the domain bounds.
///
/// # Arguments
/// * `geometry` - The resolved condition geometry
/// * `domain_bounds` - The background grid bounds
/// * `order` - Triangle quadrature order
///
/// # Returns
/// The kept points, possibly none
pub fn collect_condition_points(
    geometry: &ConditionGeometry,
    domain_bounds: &BoundingRegion,
    order: usize,
) -> Result<Vec<ConditionPoint>, EmbedfemError> {
    let region = match intersection(&geometry.region, domain_bounds) {
        Some(r) => r,
        None => return Ok(Vec::new()),
    };

    let mut kept: Vec<ConditionPoint> = Vec::new();
    for triangle_id in 0..geometry.mesh.num_triangles() {
        for point in geometry.mesh.integration_points(triangle_id, order)? {
            // degenerate triangles contribute nothing
            if point.weight <= 0.0 {
                continue;
            }
            let parametric = to_parametric(domain_bounds, &point.position);
            if contains_in_both(&region, &point.position, &parametric) {
                kept.push(ConditionPoint { point, parametric });
            }
        }
    }

    Ok(kept)
}

fn condition_values(kind: &ConditionKind, point: &BoundaryIntegrationPoint) -> ConditionValues {
    match *kind {
        ConditionKind::SurfaceLoad { modulus, direction } => ConditionValues::PointLoad {
            load: direction.normalize() * modulus * point.weight,
        },
        // positive modulus pushes against the outward normal
        ConditionKind::PressureLoad { modulus } => ConditionValues::PointLoad {
            load: -point.normal * modulus * point.weight,
        },
        ConditionKind::LagrangeSupport { value } => ConditionValues::LagrangeSupport {
            displacement: value,
        },
        ConditionKind::PenaltySupport {
            value,
            penalty_factor,
        } => ConditionValues::PenaltySupport {
            penalty_factor,
            displacement: value,
        },
    }
}

/// Turns condition descriptors into finite element conditions
///
/// Emits one condition per boundary integration point that lies in the
/// descriptor's region in both spaces. Ids are dense from 1 across all
/// descriptors.
///
/// # Arguments
/// * `descriptors` - The condition descriptors, in settings order
/// * `engine` - Resolves each descriptor's geometry
/// * `domain_bounds` - The background grid bounds
/// * `declared` - Unknowns already declared on the domain
///
/// # Returns
/// The conditions, or a configuration error naming the first descriptor
/// that cannot be attached
pub fn dispatch(
    descriptors: &[ConditionDescriptor],
    engine: &mut dyn GeometryEngine,
    domain_bounds: &BoundingRegion,
    declared: &UnknownSet,
) -> Result<Vec<FiniteElementCondition>, EmbedfemError> {
    let mut conditions: Vec<FiniteElementCondition> = Vec::new();

    for (index, descriptor) in descriptors.iter().enumerate() {
        if descriptor.kind.requires_multipliers() && !declared.includes(&UnknownSet::multipliers())
        {
            return Err(EmbedfemError::Configuration(format!(
                "{descriptor} requires Lagrange multiplier unknowns, which are not declared on the domain"
            )));
        }

        let geometry = engine.resolve_condition_geometry(descriptor, domain_bounds)?;
        let points = collect_condition_points(&geometry, domain_bounds, descriptor.integration_order)?;
        if points.is_empty() {
            return Err(EmbedfemError::Configuration(format!(
                "{descriptor} matches no boundary integration points inside the domain"
            )));
        }

        let area: f64 = points.iter().map(|p| p.point.weight).sum();
        log::info!(
            "attached {} with {} integration points over area {:.6}",
            descriptor,
            points.len(),
            area
        );

        for ConditionPoint { point, parametric } in points {
            conditions.push(FiniteElementCondition {
                id: conditions.len() + 1,
                descriptor: index,
                kind_tag: descriptor.kind.backend_tag(),
                position: point.position,
                parametric,
                weight: point.weight,
                normal: point.normal,
                values: condition_values(&descriptor.kind, &point),
            });
        }
    }

    Ok(conditions)
}
