use nalgebra::Vector3;

use crate::error::EmbedfemError;

/// A single quadrature sample produced by the geometry engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub weight: f64,
}

impl IntegrationPoint {
    pub fn new(x: f64, y: f64, z: f64, weight: f64) -> IntegrationPoint {
        IntegrationPoint { x, y, z, weight }
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

/// One background-grid cell as classified by the geometry engine
#[derive(Debug, Clone)]
pub struct Element {
    pub trimmed: bool,
    pub integration_points: Vec<IntegrationPoint>,
}

/// Coordinate space used for membership tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    Physical,
    Parametric,
}

/// Axis-aligned box with `lower[i] <= upper[i]` on every axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lower: Vector3<f64>,
    pub upper: Vector3<f64>,
}

impl BoundingBox {
    /// Creates a box, rejecting inverted axes
    ///
    /// # Arguments
    /// * `lower` - The lower corner
    /// * `upper` - The upper corner
    ///
    /// # Returns
    /// The box, or a configuration error naming the first inverted axis
    pub fn new(lower: Vector3<f64>, upper: Vector3<f64>) -> Result<BoundingBox, EmbedfemError> {
        for axis in 0..3 {
            if lower[axis] > upper[axis] {
                return Err(EmbedfemError::Configuration(format!(
                    "Bounding box has lower bound {} greater than upper bound {} on axis {}",
                    lower[axis], upper[axis], axis
                )));
            }
        }
        Ok(BoundingBox { lower, upper })
    }

    /// Smallest box enclosing all `points`. `None` if there are no points.
    pub fn from_points<'a, I>(points: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = &'a Vector3<f64>>,
    {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut lower = *first;
        let mut upper = *first;
        for point in points {
            lower = lower.inf(point);
            upper = upper.sup(point);
        }
        Some(BoundingBox { lower, upper })
    }

    /// True if the box is flat along at least one axis
    pub fn is_degenerate(&self) -> bool {
        (0..3).any(|axis| self.lower[axis] == self.upper[axis])
    }
}

/// Paired physical (XYZ) and parametric (UVW) boxes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingRegion {
    pub physical: BoundingBox,
    pub parametric: BoundingBox,
}

impl BoundingRegion {
    pub fn new(physical: BoundingBox, parametric: BoundingBox) -> BoundingRegion {
        BoundingRegion {
            physical,
            parametric,
        }
    }

    pub fn get(&self, space: Space) -> &BoundingBox {
        match space {
            Space::Physical => &self.physical,
            Space::Parametric => &self.parametric,
        }
    }
}

/// A finite element ready to be handed to the backend
#[derive(Debug, Clone, PartialEq)]
pub struct FiniteElementQuadrature {
    pub id: usize,
    pub points: Vec<IntegrationPoint>,
}

impl FiniteElementQuadrature {
    pub fn total_weight(&self) -> f64 {
        self.points.iter().map(|p| p.weight).sum()
    }
}

/// Values a condition carries into the backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConditionValues {
    PenaltySupport {
        penalty_factor: f64,
        displacement: Vector3<f64>,
    },
    LagrangeSupport {
        displacement: Vector3<f64>,
    },
    PointLoad {
        load: Vector3<f64>,
    },
}

/// One boundary integration point that passed classification, with the
/// values of the descriptor it came from
#[derive(Debug, Clone, PartialEq)]
pub struct FiniteElementCondition {
    pub id: usize,
    /// Position of the source descriptor in the settings
    pub descriptor: usize,
    pub kind_tag: &'static str,
    pub position: Vector3<f64>,
    pub parametric: Vector3<f64>,
    pub weight: f64,
    pub normal: Vector3<f64>,
    pub values: ConditionValues,
}

impl FiniteElementCondition {
    /// The point as handed to the backend, in parametric coordinates
    pub fn integration_point(&self) -> IntegrationPoint {
        IntegrationPoint::new(
            self.parametric.x,
            self.parametric.y,
            self.parametric.z,
            self.weight,
        )
    }
}
