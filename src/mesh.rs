use nalgebra::Vector3;

use crate::{datatypes::BoundingBox, error::EmbedfemError};

/// Highest supported quadrature order on a triangle
pub const MAX_TRIANGLE_ORDER: usize = 4;

/// Integration point on a boundary surface. Carries the outward normal of
/// the triangle it was generated on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryIntegrationPoint {
    pub position: Vector3<f64>,
    pub weight: f64,
    pub normal: Vector3<f64>,
}

/// Triangulated surface with one outward normal per triangle
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    vertices: Vec<Vector3<f64>>,
    triangles: Vec<[usize; 3]>,
    normals: Vec<Vector3<f64>>,
}

impl TriangleMesh {
    pub fn new() -> TriangleMesh {
        TriangleMesh::default()
    }

    pub fn add_vertex(&mut self, vertex: Vector3<f64>) -> usize {
        self.vertices.push(vertex);
        self.vertices.len() - 1
    }

    /// Adds a triangle. A zero `normal` is replaced by the normal of the
    /// vertex winding.
    ///
    /// # Arguments
    /// * `vertex_ids` - Indices of three previously added vertices
    /// * `normal` - The outward normal, or zero to compute it
    pub fn add_triangle(
        &mut self,
        vertex_ids: [usize; 3],
        normal: Vector3<f64>,
    ) -> Result<usize, EmbedfemError> {
        if let Some(id) = vertex_ids.iter().find(|&&id| id >= self.vertices.len()) {
            return Err(EmbedfemError::Mesh(format!(
                "Triangle references vertex {id} but mesh has {} vertices",
                self.vertices.len()
            )));
        }

        let normal = if normal.norm() > 0.0 {
            normal.normalize()
        } else {
            compute_normal(
                &self.vertices[vertex_ids[0]],
                &self.vertices[vertex_ids[1]],
                &self.vertices[vertex_ids[2]],
            )
        };

        self.triangles.push(vertex_ids);
        self.normals.push(normal);
        Ok(self.triangles.len() - 1)
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn vertices(&self) -> &[Vector3<f64>] {
        &self.vertices
    }

    pub fn vertex_ids(&self, triangle_id: usize) -> [usize; 3] {
        self.triangles[triangle_id]
    }

    /// Corner positions of a triangle
    pub fn corners(&self, triangle_id: usize) -> [Vector3<f64>; 3] {
        let [a, b, c] = self.triangles[triangle_id];
        [self.vertices[a], self.vertices[b], self.vertices[c]]
    }

    pub fn normal(&self, triangle_id: usize) -> Vector3<f64> {
        self.normals[triangle_id]
    }

    pub fn center(&self, triangle_id: usize) -> Vector3<f64> {
        let [p1, p2, p3] = self.corners(triangle_id);
        (p1 + p2 + p3) / 3.0
    }

    /// Area of a triangle from Heron's formula. Degenerate triangles have
    /// zero area.
    pub fn area(&self, triangle_id: usize) -> f64 {
        let [p1, p2, p3] = self.corners(triangle_id);
        let a = (p1 - p2).norm();
        let b = (p2 - p3).norm();
        let c = (p3 - p1).norm();

        let s = (a + b + c) / 2.0;
        let radicand = s * (s - a) * (s - b) * (s - c);
        if radicand <= 0.0 {
            return 0.0;
        }
        radicand.sqrt()
    }

    pub fn total_area(&self) -> f64 {
        (0..self.num_triangles()).map(|id| self.area(id)).sum()
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.vertices)
    }

    /// Appends all triangles of `other`, re-indexing its vertices
    pub fn append(&mut self, other: &TriangleMesh) {
        let offset = self.vertices.len();
        self.vertices.extend_from_slice(&other.vertices);
        self.triangles.extend(
            other
                .triangles
                .iter()
                .map(|[a, b, c]| [a + offset, b + offset, c + offset]),
        );
        self.normals.extend_from_slice(&other.normals);
    }

    /// Gauss points of one triangle in global coordinates. The weights of a
    /// triangle sum to its area.
    ///
    /// # Arguments
    /// * `triangle_id` - The triangle to integrate over
    /// * `order` - Quadrature order, 1 to `MAX_TRIANGLE_ORDER`
    pub fn integration_points(
        &self,
        triangle_id: usize,
        order: usize,
    ) -> Result<Vec<BoundaryIntegrationPoint>, EmbedfemError> {
        let rule = triangle_rule(order)?;
        let [p1, p2, p3] = self.corners(triangle_id);
        let area = self.area(triangle_id);
        let normal = self.normal(triangle_id);

        Ok(rule
            .iter()
            .map(|&(xi, eta, w)| BoundaryIntegrationPoint {
                position: p1 * (1.0 - xi - eta) + p2 * xi + p3 * eta,
                weight: w * area,
                normal,
            })
            .collect())
    }
}

/// Unit normal of the triangle `p1, p2, p3` following the right-hand rule.
/// Zero for degenerate triangles.
pub fn compute_normal(p1: &Vector3<f64>, p2: &Vector3<f64>, p3: &Vector3<f64>) -> Vector3<f64> {
    let cross = (p2 - p1).cross(&(p3 - p1));
    let norm = cross.norm();
    if norm == 0.0 {
        return Vector3::zeros();
    }
    cross / norm
}

const RULE_1: [(f64, f64, f64); 1] = [(1.0 / 3.0, 1.0 / 3.0, 1.0)];

const RULE_2: [(f64, f64, f64); 3] = [
    (1.0 / 6.0, 1.0 / 6.0, 1.0 / 3.0),
    (2.0 / 3.0, 1.0 / 6.0, 1.0 / 3.0),
    (1.0 / 6.0, 2.0 / 3.0, 1.0 / 3.0),
];

const RULE_3: [(f64, f64, f64); 6] = [
    (0.445948490915965, 0.445948490915965, 0.223381589678011),
    (0.108103018168070, 0.445948490915965, 0.223381589678011),
    (0.445948490915965, 0.108103018168070, 0.223381589678011),
    (0.091576213509771, 0.091576213509771, 0.109951743655322),
    (0.816847572980459, 0.091576213509771, 0.109951743655322),
    (0.091576213509771, 0.816847572980459, 0.109951743655322),
];

const RULE_4: [(f64, f64, f64); 12] = [
    (0.249286745170910, 0.249286745170910, 0.116786275726379),
    (0.501426509658179, 0.249286745170910, 0.116786275726379),
    (0.249286745170910, 0.501426509658179, 0.116786275726379),
    (0.063089014491502, 0.063089014491502, 0.050844906370207),
    (0.873821971016996, 0.063089014491502, 0.050844906370207),
    (0.063089014491502, 0.873821971016996, 0.050844906370207),
    (0.310352451033784, 0.636502499121399, 0.082851075618374),
    (0.636502499121399, 0.053145049844817, 0.082851075618374),
    (0.053145049844817, 0.310352451033784, 0.082851075618374),
    (0.636502499121399, 0.310352451033784, 0.082851075618374),
    (0.310352451033784, 0.053145049844817, 0.082851075618374),
    (0.053145049844817, 0.636502499121399, 0.082851075618374),
];

/// Reference rules as `(xi, eta, weight)`, weights normalized to sum to one
fn triangle_rule(order: usize) -> Result<&'static [(f64, f64, f64)], EmbedfemError> {
    match order {
        1 => Ok(&RULE_1),
        2 => Ok(&RULE_2),
        3 => Ok(&RULE_3),
        4 => Ok(&RULE_4),
        _ => Err(EmbedfemError::Configuration(format!(
            "Triangle integration order {order} not supported. Use 1 to {MAX_TRIANGLE_ORDER}"
        ))),
    }
}
