use std::collections::{BTreeMap, BTreeSet};

use crate::{
    datatypes::{BoundingRegion, ConditionValues, IntegrationPoint},
    error::EmbedfemError,
    settings::BackgroundGrid,
};

pub type GeometryId = usize;

/// Solution variables known to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Variable {
    DisplacementX,
    DisplacementY,
    DisplacementZ,
    ReactionX,
    ReactionY,
    ReactionZ,
    LagrangeMultiplierX,
    LagrangeMultiplierY,
    LagrangeMultiplierZ,
    LagrangeMultiplierReactionX,
    LagrangeMultiplierReactionY,
    LagrangeMultiplierReactionZ,
}

impl Variable {
    pub fn name(&self) -> &'static str {
        match self {
            Variable::DisplacementX => "DISPLACEMENT_X",
            Variable::DisplacementY => "DISPLACEMENT_Y",
            Variable::DisplacementZ => "DISPLACEMENT_Z",
            Variable::ReactionX => "REACTION_X",
            Variable::ReactionY => "REACTION_Y",
            Variable::ReactionZ => "REACTION_Z",
            Variable::LagrangeMultiplierX => "VECTOR_LAGRANGE_MULTIPLIER_X",
            Variable::LagrangeMultiplierY => "VECTOR_LAGRANGE_MULTIPLIER_Y",
            Variable::LagrangeMultiplierZ => "VECTOR_LAGRANGE_MULTIPLIER_Z",
            Variable::LagrangeMultiplierReactionX => "VECTOR_LAGRANGE_MULTIPLIER_REACTION_X",
            Variable::LagrangeMultiplierReactionY => "VECTOR_LAGRANGE_MULTIPLIER_REACTION_Y",
            Variable::LagrangeMultiplierReactionZ => "VECTOR_LAGRANGE_MULTIPLIER_REACTION_Z",
        }
    }
}

/// A degree of freedom: the primary unknown and its reaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dof {
    pub primary: Variable,
    pub dual: Variable,
}

impl Dof {
    pub const fn new(primary: Variable, dual: Variable) -> Dof {
        Dof { primary, dual }
    }
}

const DISPLACEMENT_DOFS: [Dof; 3] = [
    Dof::new(Variable::DisplacementX, Variable::ReactionX),
    Dof::new(Variable::DisplacementY, Variable::ReactionY),
    Dof::new(Variable::DisplacementZ, Variable::ReactionZ),
];

const MULTIPLIER_DOFS: [Dof; 3] = [
    Dof::new(
        Variable::LagrangeMultiplierX,
        Variable::LagrangeMultiplierReactionX,
    ),
    Dof::new(
        Variable::LagrangeMultiplierY,
        Variable::LagrangeMultiplierReactionY,
    ),
    Dof::new(
        Variable::LagrangeMultiplierZ,
        Variable::LagrangeMultiplierReactionZ,
    ),
];

/// Ordered set of degrees of freedom, without duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownSet {
    dofs: Vec<Dof>,
}

impl UnknownSet {
    pub fn new() -> UnknownSet {
        UnknownSet::default()
    }

    /// Displacement/reaction pairs on all three axes
    pub fn displacement() -> UnknownSet {
        UnknownSet {
            dofs: DISPLACEMENT_DOFS.to_vec(),
        }
    }

    /// Lagrange multiplier/reaction pairs on all three axes
    pub fn multipliers() -> UnknownSet {
        UnknownSet {
            dofs: MULTIPLIER_DOFS.to_vec(),
        }
    }

    /// The unknowns a run needs: displacements, plus multipliers if any
    /// condition enforces its constraint through them
    pub fn for_analysis(requires_multipliers: bool) -> UnknownSet {
        let mut unknowns = UnknownSet::displacement();
        if requires_multipliers {
            unknowns.extend(&UnknownSet::multipliers());
        }
        unknowns
    }

    pub fn insert(&mut self, dof: Dof) -> bool {
        if self.dofs.contains(&dof) {
            return false;
        }
        self.dofs.push(dof);
        true
    }

    pub fn extend(&mut self, other: &UnknownSet) {
        for dof in &other.dofs {
            self.insert(*dof);
        }
    }

    pub fn contains(&self, dof: &Dof) -> bool {
        self.dofs.contains(dof)
    }

    /// True if every dof of `other` is in this set
    pub fn includes(&self, other: &UnknownSet) -> bool {
        other.dofs.iter().all(|dof| self.contains(dof))
    }

    pub fn dofs(&self) -> &[Dof] {
        &self.dofs
    }

    /// Primary and dual variables of every dof
    pub fn variables(&self) -> impl Iterator<Item = Variable> + '_ {
        self.dofs.iter().flat_map(|dof| [dof.primary, dof.dual])
    }

    pub fn len(&self) -> usize {
        self.dofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dofs.is_empty()
    }
}

/// The finite element backend as seen by the assembly
///
/// Implementors own the domain representation. The assembly only clears and
/// fills its element and condition collections and declares unknowns.
pub trait FemBackend {
    /// Registers solution variables so that dofs may later be declared on them
    fn register_variables(&mut self, unknowns: &UnknownSet);

    /// Builds one geometry from quadrature points on the parent geometry
    fn create_composite_geometry(
        &mut self,
        parent: GeometryId,
        integration_order: usize,
        points: &[IntegrationPoint],
    ) -> Result<GeometryId, EmbedfemError>;

    fn create_element(
        &mut self,
        kind_tag: &str,
        id: usize,
        geometry: GeometryId,
        material: usize,
    ) -> Result<(), EmbedfemError>;

    fn create_condition(
        &mut self,
        kind_tag: &str,
        id: usize,
        geometry: GeometryId,
        material: usize,
        values: &ConditionValues,
    ) -> Result<(), EmbedfemError>;

    fn declare_unknown(&mut self, dof: Dof) -> Result<(), EmbedfemError>;

    fn declared_unknowns(&self) -> &UnknownSet;

    fn remove_all_elements(&mut self);

    fn remove_all_conditions(&mut self);
}

/// Spline volume spanning the background grid
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundGeometry {
    pub name: String,
    pub bounds: BoundingRegion,
    pub polynomial_order: [usize; 3],
    pub number_of_elements: [usize; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeGeometry {
    pub parent: GeometryId,
    pub integration_order: usize,
    pub points: Vec<IntegrationPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelElement {
    pub kind_tag: String,
    pub geometry: GeometryId,
    pub material: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelCondition {
    pub kind_tag: String,
    pub geometry: GeometryId,
    pub material: usize,
    pub values: ConditionValues,
}

/// In-memory domain representation
#[derive(Debug, Clone, Default)]
pub struct ModelPart {
    pub name: String,
    backgrounds: BTreeMap<GeometryId, BackgroundGeometry>,
    geometries: BTreeMap<GeometryId, CompositeGeometry>,
    next_geometry_id: GeometryId,
    elements: BTreeMap<usize, ModelElement>,
    conditions: BTreeMap<usize, ModelCondition>,
    variables: BTreeSet<Variable>,
    unknowns: UnknownSet,
}

impl ModelPart {
    pub fn new(name: &str) -> ModelPart {
        ModelPart {
            name: name.to_string(),
            next_geometry_id: 1,
            ..Default::default()
        }
    }

    fn next_geometry(&mut self) -> GeometryId {
        let id = self.next_geometry_id;
        self.next_geometry_id += 1;
        id
    }

    /// Adds the spline volume the quadrature geometries are attached to
    ///
    /// # Arguments
    /// * `name` - Geometry name
    /// * `grid` - The background grid settings
    ///
    /// # Returns
    /// The id of the new parent geometry
    pub fn create_background_volume(&mut self, name: &str, grid: &BackgroundGrid) -> GeometryId {
        let id = self.next_geometry();
        self.backgrounds.insert(
            id,
            BackgroundGeometry {
                name: name.to_string(),
                bounds: grid.bounds,
                polynomial_order: grid.polynomial_order,
                number_of_elements: grid.number_of_elements,
            },
        );
        log::debug!("created background volume '{}' with id {}", name, id);
        id
    }

    pub fn background(&self, id: GeometryId) -> Option<&BackgroundGeometry> {
        self.backgrounds.get(&id)
    }

    pub fn geometry(&self, id: GeometryId) -> Option<&CompositeGeometry> {
        self.geometries.get(&id)
    }

    pub fn elements(&self) -> impl Iterator<Item = (&usize, &ModelElement)> {
        self.elements.iter()
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&usize, &ModelCondition)> {
        self.conditions.iter()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn num_conditions(&self) -> usize {
        self.conditions.len()
    }

    pub fn num_geometries(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_registered(&self, variable: Variable) -> bool {
        self.variables.contains(&variable)
    }

    /// Quadrature points of an element's geometry
    pub fn element_points(&self, id: usize) -> Option<&[IntegrationPoint]> {
        let element = self.elements.get(&id)?;
        Some(&self.geometries.get(&element.geometry)?.points)
    }

    /// Quadrature points of a condition's geometry
    pub fn condition_points(&self, id: usize) -> Option<&[IntegrationPoint]> {
        let condition = self.conditions.get(&id)?;
        Some(&self.geometries.get(&condition.geometry)?.points)
    }

    fn check_geometry(&self, geometry: GeometryId, owner: &str, id: usize) -> Result<(), EmbedfemError> {
        if !self.geometries.contains_key(&geometry) {
            return Err(EmbedfemError::Backend(format!(
                "{owner} {id} references unknown geometry {geometry}"
            )));
        }
        let in_use = self.elements.values().any(|e| e.geometry == geometry)
            || self.conditions.values().any(|c| c.geometry == geometry);
        if in_use {
            return Err(EmbedfemError::Backend(format!(
                "{owner} {id} reuses geometry {geometry}"
            )));
        }
        Ok(())
    }
}

impl FemBackend for ModelPart {
    fn register_variables(&mut self, unknowns: &UnknownSet) {
        self.variables.extend(unknowns.variables());
    }

    fn create_composite_geometry(
        &mut self,
        parent: GeometryId,
        integration_order: usize,
        points: &[IntegrationPoint],
    ) -> Result<GeometryId, EmbedfemError> {
        if !self.backgrounds.contains_key(&parent) {
            return Err(EmbedfemError::Backend(format!(
                "Parent geometry {parent} does not exist in model part '{}'",
                self.name
            )));
        }
        if points.is_empty() {
            return Err(EmbedfemError::Backend(
                "Cannot create a quadrature geometry without points".to_owned(),
            ));
        }

        let id = self.next_geometry();
        self.geometries.insert(
            id,
            CompositeGeometry {
                parent,
                integration_order,
                points: points.to_vec(),
            },
        );
        Ok(id)
    }

    fn create_element(
        &mut self,
        kind_tag: &str,
        id: usize,
        geometry: GeometryId,
        material: usize,
    ) -> Result<(), EmbedfemError> {
        if self.elements.contains_key(&id) {
            return Err(EmbedfemError::Backend(format!(
                "Element {id} already exists in model part '{}'",
                self.name
            )));
        }
        self.check_geometry(geometry, "Element", id)?;
        self.elements.insert(
            id,
            ModelElement {
                kind_tag: kind_tag.to_string(),
                geometry,
                material,
            },
        );
        Ok(())
    }

    fn create_condition(
        &mut self,
        kind_tag: &str,
        id: usize,
        geometry: GeometryId,
        material: usize,
        values: &ConditionValues,
    ) -> Result<(), EmbedfemError> {
        if self.conditions.contains_key(&id) {
            return Err(EmbedfemError::Backend(format!(
                "Condition {id} already exists in model part '{}'",
                self.name
            )));
        }
        if matches!(values, ConditionValues::LagrangeSupport { .. })
            && !self.unknowns.includes(&UnknownSet::multipliers())
        {
            return Err(EmbedfemError::Backend(format!(
                "Condition {id} needs Lagrange multiplier dofs, which are not declared"
            )));
        }
        self.check_geometry(geometry, "Condition", id)?;
        self.conditions.insert(
            id,
            ModelCondition {
                kind_tag: kind_tag.to_string(),
                geometry,
                material,
                values: *values,
            },
        );
        Ok(())
    }

    fn declare_unknown(&mut self, dof: Dof) -> Result<(), EmbedfemError> {
        for variable in [dof.primary, dof.dual] {
            if !self.variables.contains(&variable) {
                return Err(EmbedfemError::Backend(format!(
                    "Variable {} is not registered in model part '{}'",
                    variable.name(),
                    self.name
                )));
            }
        }
        self.unknowns.insert(dof);
        Ok(())
    }

    fn declared_unknowns(&self) -> &UnknownSet {
        &self.unknowns
    }

    fn remove_all_elements(&mut self) {
        let elements = std::mem::take(&mut self.elements);
        for element in elements.values() {
            self.geometries.remove(&element.geometry);
        }
    }

    fn remove_all_conditions(&mut self) {
        let conditions = std::mem::take(&mut self.conditions);
        for condition in conditions.values() {
            self.geometries.remove(&condition.geometry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::BoundingBox;
    use nalgebra::Vector3;

    fn grid() -> BackgroundGrid {
        let bbox = BoundingBox::new(Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0)).unwrap();
        BackgroundGrid {
            bounds: BoundingRegion::new(bbox, bbox),
            polynomial_order: [2, 2, 2],
            number_of_elements: [4, 4, 4],
        }
    }

    fn points() -> Vec<IntegrationPoint> {
        vec![IntegrationPoint::new(0.5, 0.5, 0.5, 1.0)]
    }

    #[test]
    fn unknown_sets() {
        let base = UnknownSet::for_analysis(false);
        assert_eq!(base.len(), 3);
        assert!(!base.includes(&UnknownSet::multipliers()));

        let extended = UnknownSet::for_analysis(true);
        assert_eq!(extended.len(), 6);
        assert!(extended.includes(&UnknownSet::displacement()));
        assert!(extended.includes(&UnknownSet::multipliers()));

        let mut set = UnknownSet::new();
        assert!(set.insert(DISPLACEMENT_DOFS[0]));
        assert!(!set.insert(DISPLACEMENT_DOFS[0]));
        assert_eq!(set.variables().count(), 2);
    }

    #[test]
    fn unknowns_require_registered_variables() {
        let mut model_part = ModelPart::new("NurbsMesh");
        assert!(model_part.declare_unknown(MULTIPLIER_DOFS[0]).is_err());

        model_part.register_variables(&UnknownSet::multipliers());
        assert!(model_part.is_registered(Variable::LagrangeMultiplierReactionY));
        model_part.declare_unknown(MULTIPLIER_DOFS[0]).unwrap();
        assert!(model_part.declared_unknowns().contains(&MULTIPLIER_DOFS[0]));
    }

    #[test]
    fn geometries_need_a_parent() {
        let mut model_part = ModelPart::new("NurbsMesh");
        assert!(model_part.create_composite_geometry(1, 2, &points()).is_err());

        let parent = model_part.create_background_volume("NurbsVolume", &grid());
        assert_eq!(model_part.background(parent).unwrap().name, "NurbsVolume");
        assert!(model_part.create_composite_geometry(parent, 2, &[]).is_err());
        let geometry = model_part.create_composite_geometry(parent, 2, &points()).unwrap();
        assert_eq!(model_part.geometry(geometry).unwrap().points, points());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut model_part = ModelPart::new("NurbsMesh");
        let parent = model_part.create_background_volume("NurbsVolume", &grid());
        let g1 = model_part.create_composite_geometry(parent, 2, &points()).unwrap();
        let g2 = model_part.create_composite_geometry(parent, 2, &points()).unwrap();

        model_part.create_element("SmallDisplacementElement3D8N", 1, g1, 1).unwrap();
        assert!(model_part.create_element("SmallDisplacementElement3D8N", 1, g2, 1).is_err());
        assert!(model_part.create_element("SmallDisplacementElement3D8N", 2, g1, 1).is_err());
        assert!(model_part.create_element("SmallDisplacementElement3D8N", 3, 99, 1).is_err());
    }

    #[test]
    fn lagrange_conditions_need_declared_multipliers() {
        let mut model_part = ModelPart::new("NurbsMesh");
        let parent = model_part.create_background_volume("NurbsVolume", &grid());
        let geometry = model_part.create_composite_geometry(parent, 2, &points()).unwrap();
        let values = ConditionValues::LagrangeSupport {
            displacement: Vector3::zeros(),
        };

        assert!(model_part
            .create_condition("SupportLagrangeCondition", 1, geometry, 1, &values)
            .is_err());

        model_part.register_variables(&UnknownSet::multipliers());
        for dof in UnknownSet::multipliers().dofs() {
            model_part.declare_unknown(*dof).unwrap();
        }
        model_part
            .create_condition("SupportLagrangeCondition", 1, geometry, 1, &values)
            .unwrap();
        assert_eq!(model_part.num_conditions(), 1);
    }

    #[test]
    fn removal_drops_owned_geometries() {
        let mut model_part = ModelPart::new("NurbsMesh");
        let parent = model_part.create_background_volume("NurbsVolume", &grid());
        let g1 = model_part.create_composite_geometry(parent, 2, &points()).unwrap();
        let g2 = model_part.create_composite_geometry(parent, 2, &points()).unwrap();
        model_part.create_element("SmallDisplacementElement3D8N", 1, g1, 1).unwrap();
        let values = ConditionValues::PointLoad {
            load: Vector3::new(0.0, 0.0, -1.0),
        };
        model_part.create_condition("LoadCondition", 1, g2, 1, &values).unwrap();
        assert_eq!(model_part.element_points(1).unwrap().len(), 1);
        assert_eq!(model_part.condition_points(1).unwrap().len(), 1);

        model_part.remove_all_elements();
        assert_eq!(model_part.num_elements(), 0);
        assert_eq!(model_part.num_geometries(), 1);

        model_part.remove_all_conditions();
        assert_eq!(model_part.num_conditions(), 0);
        assert_eq!(model_part.num_geometries(), 0);
        assert!(model_part.background(parent).is_some());
    }
}
