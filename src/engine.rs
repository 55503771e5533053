use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use json::JsonValue;

use crate::{
    classifier::{contains_point, to_parametric},
    datatypes::{BoundingBox, BoundingRegion, Element, IntegrationPoint, Space},
    error::EmbedfemError,
    mesh::TriangleMesh,
    settings::{ConditionDescriptor, Settings},
    stl::{read_stl, write_stl, StlFormat},
};

/// Extent of a boundary condition: its region in both spaces plus the
/// surface mesh the boundary integration points are generated on
#[derive(Debug, Clone)]
pub struct ConditionGeometry {
    pub region: BoundingRegion,
    pub mesh: TriangleMesh,
}

/// The cut-cell geometry engine
pub trait GeometryEngine {
    /// Classifies the background grid against the embedded surface
    ///
    /// # Arguments
    /// * `domain_bounds` - The background grid bounds
    /// * `embedded_mesh` - The closed surface bounding the physical domain
    ///
    /// # Returns
    /// One element per grid cell, in grid order
    fn classify_elements(
        &mut self,
        domain_bounds: &BoundingRegion,
        embedded_mesh: &TriangleMesh,
    ) -> Result<Vec<Element>, EmbedfemError>;

    /// Resolves the geometric extent of one condition descriptor
    fn resolve_condition_geometry(
        &mut self,
        descriptor: &ConditionDescriptor,
        domain_bounds: &BoundingRegion,
    ) -> Result<ConditionGeometry, EmbedfemError>;
}

/// Embedded surface together with the named sub-surfaces conditions are
/// applied on
#[derive(Debug, Clone, Default)]
pub struct EmbeddedModel {
    pub mesh: TriangleMesh,
    pub sub_meshes: BTreeMap<String, TriangleMesh>,
}

/// Extracts the sub-mesh name of a condition file: the file name without
/// its `.stl`/`.STL` extension
///
/// # Arguments
/// * `filename` - The condition's input filename
///
/// # Returns
/// The name, or a filename format error
pub fn condition_mesh_name(filename: &str) -> Result<String, EmbedfemError> {
    let path = Path::new(filename);
    let extension = path.extension().and_then(|e| e.to_str());
    let stem = path.file_stem().and_then(|s| s.to_str());

    match (extension, stem) {
        (Some("stl") | Some("STL"), Some(stem)) if !stem.is_empty() => Ok(stem.to_string()),
        _ => Err(EmbedfemError::FilenameFormat(format!(
            "Condition file '{filename}' must have a .stl or .STL extension"
        ))),
    }
}

/// Writes the files the geometry engine reads: the embedded mesh to the
/// general input file, and each sub-mesh whose name matches a condition
/// file to that file
///
/// # Arguments
/// * `model` - The embedded surface and its sub-surfaces
/// * `settings` - The analysis settings
pub fn write_engine_input(model: &EmbeddedModel, settings: &Settings) -> Result<(), EmbedfemError> {
    write_stl(&model.mesh, &settings.general.input_filename, StlFormat::Binary)?;

    let mut targets: BTreeMap<String, &str> = BTreeMap::new();
    for descriptor in &settings.conditions {
        let name = condition_mesh_name(&descriptor.input_filename)?;
        targets.insert(name, descriptor.input_filename.as_str());
    }

    let mut written = 0;
    for (name, sub_mesh) in &model.sub_meshes {
        if let Some(filename) = targets.get(name) {
            write_stl(sub_mesh, filename, StlFormat::Binary)?;
            written += 1;
        }
    }

    log::info!(
        "wrote engine input {} and {} condition mesh(es)",
        settings.general.input_filename,
        written
    );
    if written < targets.len() {
        log::warn!(
            "{} condition file(s) have no matching sub-mesh",
            targets.len() - written
        );
    }

    Ok(())
}

/// Geometry engine backed by files: imports an element classification
/// exported by the external engine and reads condition surfaces from STL
///
/// Imported integration points are in parametric coordinates, as the
/// backend's quadrature geometries expect them.
#[derive(Debug, Clone)]
pub struct FileEngine {
    elements_file: PathBuf,
}

impl FileEngine {
    pub fn new<P: AsRef<Path>>(elements_file: P) -> FileEngine {
        FileEngine {
            elements_file: elements_file.as_ref().to_path_buf(),
        }
    }
}

fn parse_point(point_json: &JsonValue, context: &str) -> Result<IntegrationPoint, EmbedfemError> {
    if !point_json.is_array() || point_json.len() != 4 {
        return Err(EmbedfemError::Input(format!(
            "{context} must be an array [x, y, z, weight]"
        )));
    }

    let mut values = [0.0; 4];
    for (i, member) in point_json.members().enumerate() {
        values[i] = match member.as_f64() {
            Some(v) => v,
            None => {
                return Err(EmbedfemError::Input(format!(
                    "Non-float value in {context}"
                )))
            }
        };
    }

    Ok(IntegrationPoint::new(values[0], values[1], values[2], values[3]))
}

fn parse_element(element_json: &JsonValue, index: usize) -> Result<Element, EmbedfemError> {
    let context = format!("element {index}");

    if !element_json.has_key("trimmed") {
        return Err(EmbedfemError::Input(format!(
            "{context} is missing trimmed field"
        )));
    }
    let trimmed = match element_json["trimmed"].as_bool() {
        Some(t) => t,
        None => {
            return Err(EmbedfemError::Input(format!(
                "Bad value for trimmed in {context}. Expected a bool"
            )))
        }
    };

    if !element_json.has_key("integration_points")
        || !element_json["integration_points"].is_array()
    {
        return Err(EmbedfemError::Input(format!(
            "{context} is missing integration_points array"
        )));
    }

    let integration_points = element_json["integration_points"]
        .members()
        .enumerate()
        .map(|(i, p)| parse_point(p, &format!("integration point {i} of {context}")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Element {
        trimmed,
        integration_points,
    })
}

/// Parses an exported element classification
///
/// # Arguments
/// * `contents` - The classification as a json string
pub fn parse_elements(contents: &str) -> Result<Vec<Element>, EmbedfemError> {
    let elements_json = match json::parse(contents) {
        Ok(j) => j,
        Err(err) => {
            return Err(EmbedfemError::Input(format!(
                "Error in elements json: {err}"
            )))
        }
    };

    if !elements_json.has_key("elements") || !elements_json["elements"].is_array() {
        return Err(EmbedfemError::Input(
            "Elements json missing elements array".to_owned(),
        ));
    }

    elements_json["elements"]
        .members()
        .enumerate()
        .map(|(index, element_json)| parse_element(element_json, index))
        .collect()
}

impl GeometryEngine for FileEngine {
    fn classify_elements(
        &mut self,
        domain_bounds: &BoundingRegion,
        embedded_mesh: &TriangleMesh,
    ) -> Result<Vec<Element>, EmbedfemError> {
        let contents = match std::fs::read_to_string(&self.elements_file) {
            Ok(c) => c,
            Err(_err) => {
                return Err(EmbedfemError::Input(format!(
                    "Unable to open elements file {}",
                    self.elements_file.display()
                )))
            }
        };
        let elements = parse_elements(&contents)?;

        let outside = elements
            .iter()
            .flat_map(|e| e.integration_points.iter())
            .filter(|p| !contains_point(domain_bounds, &p.position(), Space::Parametric))
            .count();
        if outside > 0 {
            log::warn!(
                "{} imported integration point(s) lie outside the parametric domain",
                outside
            );
        }

        log::info!(
            "imported {} elements ({} trimmed) for an embedded surface of area {:.6}",
            elements.len(),
            elements.iter().filter(|e| e.trimmed).count(),
            embedded_mesh.total_area()
        );

        Ok(elements)
    }

    fn resolve_condition_geometry(
        &mut self,
        descriptor: &ConditionDescriptor,
        domain_bounds: &BoundingRegion,
    ) -> Result<ConditionGeometry, EmbedfemError> {
        condition_mesh_name(&descriptor.input_filename)?;
        let mesh = read_stl(&descriptor.input_filename)?;

        let physical = match mesh.bounding_box() {
            Some(b) => b,
            None => {
                return Err(EmbedfemError::Configuration(format!(
                    "{descriptor} has an empty surface mesh"
                )))
            }
        };
        // the affine map may flip an axis
        let a = to_parametric(domain_bounds, &physical.lower);
        let b = to_parametric(domain_bounds, &physical.upper);
        let parametric = BoundingBox {
            lower: a.inf(&b),
            upper: a.sup(&b),
        };

        Ok(ConditionGeometry {
            region: BoundingRegion::new(physical, parametric),
            mesh,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ConditionKind;
    use nalgebra::Vector3;

    fn unit_square(z: f64) -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        let a = mesh.add_vertex(Vector3::new(0.0, 0.0, z));
        let b = mesh.add_vertex(Vector3::new(1.0, 0.0, z));
        let c = mesh.add_vertex(Vector3::new(1.0, 1.0, z));
        let d = mesh.add_vertex(Vector3::new(0.0, 1.0, z));
        mesh.add_triangle([a, b, c], Vector3::zeros()).unwrap();
        mesh.add_triangle([a, c, d], Vector3::zeros()).unwrap();
        mesh
    }

    fn bounds() -> BoundingRegion {
        let physical = BoundingBox::new(Vector3::zeros(), Vector3::new(2.0, 2.0, 2.0)).unwrap();
        let parametric =
            BoundingBox::new(Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0)).unwrap();
        BoundingRegion::new(physical, parametric)
    }

    #[test]
    fn mesh_names_need_stl_extension() {
        assert_eq!(condition_mesh_name("data/N1.stl").unwrap(), "N1");
        assert_eq!(condition_mesh_name("queso/data/D1.STL").unwrap(), "D1");
        assert_eq!(condition_mesh_name("support.stl").unwrap(), "support");
        for bad in ["data/N1.obj", "data/N1", "data/.stl", ""] {
            assert!(matches!(
                condition_mesh_name(bad),
                Err(EmbedfemError::FilenameFormat(_))
            ));
        }
    }

    #[test]
    fn parses_exported_elements() {
        let contents = r#"{
            "elements": [
                { "trimmed": false, "integration_points": [[0.1, 0.2, 0.3, 0.5]] },
                { "trimmed": true, "integration_points": [[0.4, 0.5, 0.6, -0.1], [0.7, 0.8, 0.9, 0.2]] }
            ]
        }"#;
        let elements = parse_elements(contents).unwrap();
        assert_eq!(elements.len(), 2);
        assert!(!elements[0].trimmed);
        assert_eq!(
            elements[1].integration_points[1],
            IntegrationPoint::new(0.7, 0.8, 0.9, 0.2)
        );
    }

    #[test]
    fn malformed_elements_are_input_errors() {
        for bad in [
            "[]",
            r#"{"elements": [{"integration_points": []}]}"#,
            r#"{"elements": [{"trimmed": true, "integration_points": [[1.0, 2.0]]}]}"#,
            r#"{"elements": [{"trimmed": "yes", "integration_points": []}]}"#,
        ] {
            assert!(matches!(parse_elements(bad), Err(EmbedfemError::Input(_))));
        }
    }

    #[test]
    fn file_engine_reads_classification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elements.json");
        std::fs::write(
            &path,
            r#"{"elements": [{"trimmed": false, "integration_points": [[0.5, 0.5, 0.5, 1.0]]}]}"#,
        )
        .unwrap();

        let mut engine = FileEngine::new(&path);
        let elements = engine.classify_elements(&bounds(), &unit_square(1.0)).unwrap();
        assert_eq!(elements.len(), 1);

        let mut missing = FileEngine::new(dir.path().join("missing.json"));
        assert!(matches!(
            missing.classify_elements(&bounds(), &unit_square(1.0)),
            Err(EmbedfemError::Input(_))
        ));
    }

    #[test]
    fn imported_points_stay_parametric() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elements.json");
        std::fs::write(
            &path,
            r#"{"elements": [{"trimmed": true, "integration_points": [[0.5, 0.25, 0.75, 0.5]]}]}"#,
        )
        .unwrap();

        // physical box far from the unit parametric box
        let shifted = BoundingRegion::new(
            BoundingBox::new(Vector3::new(10.0, 10.0, 10.0), Vector3::new(12.0, 12.0, 12.0))
                .unwrap(),
            BoundingBox::new(Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0)).unwrap(),
        );
        let point = IntegrationPoint::new(0.5, 0.25, 0.75, 0.5);
        assert!(contains_point(&shifted, &point.position(), Space::Parametric));
        assert!(!contains_point(&shifted, &point.position(), Space::Physical));

        let elements = FileEngine::new(&path)
            .classify_elements(&shifted, &unit_square(1.0))
            .unwrap();
        assert_eq!(elements[0].integration_points, vec![point]);
    }

    #[test]
    fn condition_region_is_mapped_to_parametric_space() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("top.stl");
        write_stl(&unit_square(2.0), &path, StlFormat::Ascii).unwrap();

        let descriptor = ConditionDescriptor {
            kind: ConditionKind::PressureLoad { modulus: 1.0 },
            input_filename: path.display().to_string(),
            integration_order: 1,
        };
        let geometry = FileEngine::new(dir.path().join("elements.json"))
            .resolve_condition_geometry(&descriptor, &bounds())
            .unwrap();

        assert_eq!(geometry.mesh.num_triangles(), 2);
        assert_eq!(geometry.region.physical.lower, Vector3::new(0.0, 0.0, 2.0));
        assert_eq!(geometry.region.parametric.lower, Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(geometry.region.parametric.upper, Vector3::new(0.5, 0.5, 1.0));
    }

    #[test]
    fn engine_input_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("model.stl");
        let support = dir.path().join("D1.stl");
        let settings_json = format!(
            r#"{{
                "general_settings": {{ "input_filename": "{}" }},
                "background_grid_settings": {{
                    "lower_bound_xyz": [0.0, 0.0, 0.0], "upper_bound_xyz": [2.0, 2.0, 2.0],
                    "lower_bound_uvw": [0.0, 0.0, 0.0], "upper_bound_uvw": [1.0, 1.0, 1.0],
                    "polynomial_order": [2, 2, 2], "number_of_elements": [2, 2, 2]
                }},
                "conditions_settings_list": [
                    {{ "condition_type": "PenaltySupportCondition", "input_filename": "{}",
                       "value": [0.0, 0.0, 0.0], "penalty_factor": 1e10 }}
                ]
            }}"#,
            input.display(),
            support.display()
        );
        let settings = crate::settings::parse_settings(&settings_json).unwrap();

        let mut model = EmbeddedModel {
            mesh: unit_square(0.0),
            ..Default::default()
        };
        model.mesh.append(&unit_square(2.0));
        model.sub_meshes.insert("D1".to_string(), unit_square(0.0));
        model.sub_meshes.insert("unused".to_string(), unit_square(2.0));

        write_engine_input(&model, &settings).unwrap();

        assert_eq!(read_stl(&input).unwrap().num_triangles(), 4);
        assert_eq!(read_stl(&support).unwrap().num_triangles(), 2);
        assert!(!dir.path().join("unused.stl").exists());
    }
}
