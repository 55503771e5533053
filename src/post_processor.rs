use std::{io::Write, path::Path};

use crate::{backend::ModelPart, datatypes::ConditionValues, error::EmbedfemError};

fn create(path: &Path) -> Result<std::fs::File, EmbedfemError> {
    match std::fs::File::create(path) {
        Ok(f) => Ok(f),
        Err(err) => Err(EmbedfemError::PostProcessor(format!(
            "Failed to create {}: {err}",
            path.display()
        ))),
    }
}

fn write_line(file: &mut std::fs::File, path: &Path, line: String) -> Result<(), EmbedfemError> {
    match file.write_all(line.as_bytes()) {
        Ok(()) => Ok(()),
        Err(err) => Err(EmbedfemError::PostProcessor(format!(
            "Failed to write {}: {err}",
            path.display()
        ))),
    }
}

/// Writes the assembled model to two CSV files
///
/// `elements.csv` holds one row per element with its point count and total
/// weight. `conditions.csv` holds one row per condition with its parametric
/// point, weight and values. `value_x..z` is the load for load conditions
/// and the prescribed displacement for supports.
///
/// # Arguments
/// * `model_part` - The assembled model part
/// * `output_dir` - Directory the files are written to
pub fn csv_output(model_part: &ModelPart, output_dir: &Path) -> Result<(), EmbedfemError> {
    let elements_output = output_dir.join("elements.csv");
    let conditions_output = output_dir.join("conditions.csv");
    let mut elements_file = create(&elements_output)?;
    let mut conditions_file = create(&conditions_output)?;

    write_line(
        &mut elements_file,
        &elements_output,
        "id,type,points,weight\n".to_string(),
    )?;
    for (id, element) in model_part.elements() {
        let points = model_part.element_points(*id).unwrap_or(&[]);
        let weight: f64 = points.iter().map(|p| p.weight).sum();
        write_line(
            &mut elements_file,
            &elements_output,
            format!(
                "{id},{kind},{n},{weight}\n",
                kind = element.kind_tag,
                n = points.len(),
            ),
        )?;
    }

    write_line(
        &mut conditions_file,
        &conditions_output,
        "id,type,u,v,w,weight,value_x,value_y,value_z,penalty_factor\n".to_string(),
    )?;
    for (id, condition) in model_part.conditions() {
        let point = match model_part.condition_points(*id).and_then(|p| p.first()) {
            Some(p) => *p,
            None => {
                return Err(EmbedfemError::PostProcessor(format!(
                    "Condition {id} has no integration point"
                )))
            }
        };
        let (value, penalty) = match condition.values {
            ConditionValues::PointLoad { load } => (load, String::new()),
            ConditionValues::LagrangeSupport { displacement } => (displacement, String::new()),
            ConditionValues::PenaltySupport {
                penalty_factor,
                displacement,
            } => (displacement, penalty_factor.to_string()),
        };
        write_line(
            &mut conditions_file,
            &conditions_output,
            format!(
                "{id},{kind},{u},{v},{w},{weight},{vx},{vy},{vz},{penalty}\n",
                kind = condition.kind_tag,
                u = point.x,
                v = point.y,
                w = point.z,
                weight = point.weight,
                vx = value.x,
                vy = value.y,
                vz = value.z,
            ),
        )?;
    }

    log::info!(
        "wrote output to {} and {}",
        elements_output.display(),
        conditions_output.display()
    );

    Ok(())
}
