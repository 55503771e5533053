use std::fmt::Display;

use json::JsonValue;
use nalgebra::Vector3;

use crate::{
    datatypes::{BoundingBox, BoundingRegion},
    error::EmbedfemError,
    mesh::MAX_TRIANGLE_ORDER,
};

#[derive(Debug, Clone, PartialEq)]
pub struct GeneralSettings {
    pub input_filename: String,
    pub echo_level: usize,
}

/// Background grid of the analysis: domain bounds in both spaces plus the
/// spline discretization handed to the domain setup
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundGrid {
    pub bounds: BoundingRegion,
    pub polynomial_order: [usize; 3],
    pub number_of_elements: [usize; 3],
}

/// Condition type with its payload, resolved once from the
/// `condition_type` tag
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConditionKind {
    SurfaceLoad {
        modulus: f64,
        direction: Vector3<f64>,
    },
    PressureLoad {
        modulus: f64,
    },
    LagrangeSupport {
        value: Vector3<f64>,
    },
    PenaltySupport {
        value: Vector3<f64>,
        penalty_factor: f64,
    },
}

impl ConditionKind {
    /// The `condition_type` tag used in settings files
    pub fn type_name(&self) -> &'static str {
        match self {
            ConditionKind::SurfaceLoad { .. } => "SurfaceLoadCondition",
            ConditionKind::PressureLoad { .. } => "PressureLoadCondition",
            ConditionKind::LagrangeSupport { .. } => "LagrangeSupportCondition",
            ConditionKind::PenaltySupport { .. } => "PenaltySupportCondition",
        }
    }

    /// The condition type the backend instantiates
    pub fn backend_tag(&self) -> &'static str {
        match self {
            ConditionKind::SurfaceLoad { .. } | ConditionKind::PressureLoad { .. } => {
                "LoadCondition"
            }
            ConditionKind::LagrangeSupport { .. } => "SupportLagrangeCondition",
            ConditionKind::PenaltySupport { .. } => "SupportPenaltyCondition",
        }
    }

    pub fn requires_multipliers(&self) -> bool {
        matches!(self, ConditionKind::LagrangeSupport { .. })
    }
}

/// One row of the boundary condition settings
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionDescriptor {
    pub kind: ConditionKind,
    pub input_filename: String,
    pub integration_order: usize,
}

impl Display for ConditionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}'", self.kind.type_name(), self.input_filename)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub general: GeneralSettings,
    pub grid: BackgroundGrid,
    pub conditions: Vec<ConditionDescriptor>,
}

impl Settings {
    /// True if any condition needs Lagrange multiplier unknowns
    pub fn requires_multipliers(&self) -> bool {
        self.conditions
            .iter()
            .any(|condition| condition.kind.requires_multipliers())
    }
}

fn read_f64(value: &JsonValue, key: &str, context: &str) -> Result<f64, EmbedfemError> {
    if !value.has_key(key) {
        return Err(EmbedfemError::Input(format!(
            "{context} is missing {key} field"
        )));
    }
    value[key]
        .as_f64()
        .ok_or_else(|| EmbedfemError::Input(format!("Bad value for {key} in {context}")))
}

fn read_string(value: &JsonValue, key: &str, context: &str) -> Result<String, EmbedfemError> {
    if !value.has_key(key) {
        return Err(EmbedfemError::Input(format!(
            "{context} is missing {key} field"
        )));
    }
    match value[key].as_str() {
        Some(s) => Ok(s.to_string()),
        None => Err(EmbedfemError::Input(format!(
            "Bad value for {key} in {context}. Expected a string"
        ))),
    }
}

fn read_vector(value: &JsonValue, key: &str, context: &str) -> Result<Vector3<f64>, EmbedfemError> {
    if !value.has_key(key) {
        return Err(EmbedfemError::Input(format!(
            "{context} is missing {key} field"
        )));
    }
    let array = &value[key];
    if !array.is_array() || array.len() != 3 {
        return Err(EmbedfemError::Input(format!(
            "{key} in {context} must be an array of 3 numbers"
        )));
    }

    let mut vector = Vector3::zeros();
    for (i, member) in array.members().enumerate() {
        vector[i] = member.as_f64().ok_or_else(|| {
            EmbedfemError::Input(format!("Non-float value in {key} of {context}"))
        })?;
    }
    Ok(vector)
}

fn read_counts(value: &JsonValue, key: &str, context: &str) -> Result<[usize; 3], EmbedfemError> {
    let vector = read_vector(value, key, context)?;
    let mut counts = [0usize; 3];
    for i in 0..3 {
        if vector[i] < 1.0 || vector[i].fract() != 0.0 {
            return Err(EmbedfemError::Configuration(format!(
                "{key} in {context} must hold positive integers, found {}",
                vector[i]
            )));
        }
        counts[i] = vector[i] as usize;
    }
    Ok(counts)
}

fn parse_general(input_json: &JsonValue) -> Result<GeneralSettings, EmbedfemError> {
    let context = "general_settings";
    let section = &input_json[context];

    let echo_level = if section.has_key("echo_level") {
        section["echo_level"].as_usize().ok_or_else(|| {
            EmbedfemError::Input("Bad value for echo_level in general_settings".to_owned())
        })?
    } else {
        0
    };

    Ok(GeneralSettings {
        input_filename: read_string(section, "input_filename", context)?,
        echo_level,
    })
}

fn parse_grid(input_json: &JsonValue) -> Result<BackgroundGrid, EmbedfemError> {
    let context = "background_grid_settings";
    let section = &input_json[context];

    let physical = BoundingBox::new(
        read_vector(section, "lower_bound_xyz", context)?,
        read_vector(section, "upper_bound_xyz", context)?,
    )
    .map_err(|err| EmbedfemError::Configuration(format!("{context} xyz bounds: {err}")))?;
    let parametric = BoundingBox::new(
        read_vector(section, "lower_bound_uvw", context)?,
        read_vector(section, "upper_bound_uvw", context)?,
    )
    .map_err(|err| EmbedfemError::Configuration(format!("{context} uvw bounds: {err}")))?;

    Ok(BackgroundGrid {
        bounds: BoundingRegion::new(physical, parametric),
        polynomial_order: read_counts(section, "polynomial_order", context)?,
        number_of_elements: read_counts(section, "number_of_elements", context)?,
    })
}

/// Parses one entry of `conditions_settings_list`
///
/// # Arguments
/// * `condition_json` - The condition entry
/// * `index` - Position in the list, used in messages
fn parse_condition(
    condition_json: &JsonValue,
    index: usize,
) -> Result<ConditionDescriptor, EmbedfemError> {
    let context = format!("condition {index}");
    let condition_type = read_string(condition_json, "condition_type", &context)?;
    let context = format!("condition {index} ({condition_type})");

    let kind = match condition_type.as_str() {
        "SurfaceLoadCondition" => {
            let direction = read_vector(condition_json, "direction", &context)?;
            if direction.norm() == 0.0 {
                return Err(EmbedfemError::Configuration(format!(
                    "{context} has a zero load direction"
                )));
            }
            ConditionKind::SurfaceLoad {
                modulus: read_f64(condition_json, "modulus", &context)?,
                direction,
            }
        }
        "PressureLoadCondition" => ConditionKind::PressureLoad {
            modulus: read_f64(condition_json, "modulus", &context)?,
        },
        "LagrangeSupportCondition" => ConditionKind::LagrangeSupport {
            value: read_vector(condition_json, "value", &context)?,
        },
        "PenaltySupportCondition" => {
            let penalty_factor = read_f64(condition_json, "penalty_factor", &context)?;
            if penalty_factor <= 0.0 {
                return Err(EmbedfemError::Configuration(format!(
                    "{context} has non-positive penalty_factor {penalty_factor}"
                )));
            }
            ConditionKind::PenaltySupport {
                value: read_vector(condition_json, "value", &context)?,
                penalty_factor,
            }
        }
        other => {
            return Err(EmbedfemError::Configuration(format!(
                "Unrecognized condition_type '{other}' in condition {index}"
            )))
        }
    };

    let integration_order = if condition_json.has_key("integration_order") {
        condition_json["integration_order"]
            .as_usize()
            .ok_or_else(|| {
                EmbedfemError::Input(format!("Bad value for integration_order in {context}"))
            })?
    } else {
        1
    };
    if integration_order == 0 || integration_order > MAX_TRIANGLE_ORDER {
        return Err(EmbedfemError::Configuration(format!(
            "{context} has integration_order {integration_order}. Use 1 to {MAX_TRIANGLE_ORDER}"
        )));
    }

    Ok(ConditionDescriptor {
        kind,
        input_filename: read_string(condition_json, "input_filename", &context)?,
        integration_order,
    })
}

/// Parses a settings document
///
/// # Arguments
/// * `contents` - The settings as a json string
///
/// # Returns
/// Validated settings
pub fn parse_settings(contents: &str) -> Result<Settings, EmbedfemError> {
    let input_json = match json::parse(contents) {
        Ok(j) => j,
        Err(err) => {
            return Err(EmbedfemError::Input(format!(
                "Error in settings json: {err}"
            )))
        }
    };

    for section in [
        "general_settings",
        "background_grid_settings",
        "conditions_settings_list",
    ] {
        if !input_json.has_key(section) {
            return Err(EmbedfemError::Input(format!(
                "Settings json missing {section} field"
            )));
        }
    }
    if !input_json["conditions_settings_list"].is_array() {
        return Err(EmbedfemError::Input(
            "conditions_settings_list must be an array".to_owned(),
        ));
    }

    let general = parse_general(&input_json)?;
    let grid = parse_grid(&input_json)?;
    let conditions = input_json["conditions_settings_list"]
        .members()
        .enumerate()
        .map(|(index, condition_json)| parse_condition(condition_json, index))
        .collect::<Result<Vec<_>, _>>()?;

    log::info!("loaded {} condition(s) from settings", conditions.len());

    Ok(Settings {
        general,
        grid,
        conditions,
    })
}

/// Reads and parses a settings file
pub fn load_settings(settings_file: &str) -> Result<Settings, EmbedfemError> {
    let contents = match std::fs::read_to_string(settings_file) {
        Ok(c) => c,
        Err(_err) => {
            return Err(EmbedfemError::Input(format!(
                "Unable to open settings file {}",
                settings_file
            )))
        }
    };
    parse_settings(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = r#"{
        "general_settings": {
            "input_filename": "data/steering_knuckle.stl",
            "echo_level": 1
        },
        "background_grid_settings": {
            "lower_bound_xyz": [-130.0, -110.0, -110.0],
            "upper_bound_xyz": [20.0, 190.0, 190.0],
            "lower_bound_uvw": [-130.0, -110.0, -110.0],
            "upper_bound_uvw": [20.0, 190.0, 190.0],
            "polynomial_order": [2, 2, 2],
            "number_of_elements": [5, 5, 5]
        },
        "conditions_settings_list": [
            {
                "condition_type": "SurfaceLoadCondition",
                "input_filename": "data/N1.stl",
                "modulus": 5.0,
                "direction": [-1.0, 2.0, 3.0]
            },
            {
                "condition_type": "PressureLoadCondition",
                "input_filename": "data/N2.stl",
                "modulus": 2.0,
                "integration_order": 2
            },
            {
                "condition_type": "LagrangeSupportCondition",
                "input_filename": "data/N3.stl",
                "value": [0.0, 0.3, 0.0]
            },
            {
                "condition_type": "PenaltySupportCondition",
                "input_filename": "data/D1.stl",
                "value": [0.0, 0.0, 0.0],
                "penalty_factor": 1e10
            }
        ]
    }"#;

    #[test]
    fn parses_all_sections() {
        let settings = parse_settings(SETTINGS).unwrap();

        assert_eq!(settings.general.input_filename, "data/steering_knuckle.stl");
        assert_eq!(settings.general.echo_level, 1);
        assert_eq!(
            settings.grid.bounds.physical.lower,
            Vector3::new(-130.0, -110.0, -110.0)
        );
        assert_eq!(
            settings.grid.bounds.parametric.upper,
            Vector3::new(20.0, 190.0, 190.0)
        );
        assert_eq!(settings.grid.polynomial_order, [2, 2, 2]);
        assert_eq!(settings.grid.number_of_elements, [5, 5, 5]);

        assert_eq!(settings.conditions.len(), 4);
        assert_eq!(
            settings.conditions[0].kind,
            ConditionKind::SurfaceLoad {
                modulus: 5.0,
                direction: Vector3::new(-1.0, 2.0, 3.0)
            }
        );
        assert_eq!(settings.conditions[0].integration_order, 1);
        assert_eq!(settings.conditions[1].integration_order, 2);
        assert_eq!(
            settings.conditions[3].kind,
            ConditionKind::PenaltySupport {
                value: Vector3::zeros(),
                penalty_factor: 1e10
            }
        );
        assert!(settings.requires_multipliers());
    }

    #[test]
    fn multipliers_only_with_lagrange_support() {
        let without = SETTINGS.replace("LagrangeSupportCondition", "PenaltySupportCondition")
            .replace(
                "\"value\": [0.0, 0.3, 0.0]",
                "\"value\": [0.0, 0.3, 0.0], \"penalty_factor\": 1.0",
            );
        let settings = parse_settings(&without).unwrap();
        assert!(!settings.requires_multipliers());
    }

    #[test]
    fn unknown_condition_type_is_configuration_error() {
        let bad = SETTINGS.replace("PressureLoadCondition", "TemperatureCondition");
        match parse_settings(&bad) {
            Err(EmbedfemError::Configuration(msg)) => {
                assert!(msg.contains("TemperatureCondition"));
                assert!(msg.contains("condition 1"));
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn inverted_bounds_are_configuration_error() {
        let bad = SETTINGS.replace(
            "\"upper_bound_uvw\": [20.0, 190.0, 190.0]",
            "\"upper_bound_uvw\": [20.0, -190.0, 190.0]",
        );
        assert!(matches!(
            parse_settings(&bad),
            Err(EmbedfemError::Configuration(_))
        ));
    }

    #[test]
    fn missing_fields_are_input_errors() {
        let bad = SETTINGS.replace("\"modulus\": 2.0,", "");
        match parse_settings(&bad) {
            Err(EmbedfemError::Input(msg)) => assert!(msg.contains("modulus")),
            other => panic!("expected input error, got {:?}", other),
        }

        assert!(matches!(
            parse_settings("{ \"general_settings\": {} }"),
            Err(EmbedfemError::Input(_))
        ));
        assert!(matches!(parse_settings("not json"), Err(EmbedfemError::Input(_))));
    }

    #[test]
    fn integration_order_is_bounded() {
        let bad = SETTINGS.replace("\"integration_order\": 2", "\"integration_order\": 9");
        assert!(matches!(
            parse_settings(&bad),
            Err(EmbedfemError::Configuration(_))
        ));
    }

    #[test]
    fn zero_load_direction_is_rejected() {
        let bad = SETTINGS.replace("[-1.0, 2.0, 3.0]", "[0.0, 0.0, 0.0]");
        assert!(matches!(
            parse_settings(&bad),
            Err(EmbedfemError::Configuration(_))
        ));
    }
}
