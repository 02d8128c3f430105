use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::estimation::measurement::{Measurement, MeasurementPlan};
use crate::io::pandapower::NetworkFileError;

/// Writes measurement plans in pandapower's measurement table layout, so a
/// plan can be handed to an engine binding as a plain file.

#[derive(Serialize)]
struct MeasurementRecord<'a> {
    name: String,
    measurement_type: &'a str,
    element_type: &'a str,
    element: i64,
    value: f64,
    std_dev: f64,
    side: Option<&'a str>,
}

impl<'a> From<&'a Measurement> for MeasurementRecord<'a> {
    fn from(m: &'a Measurement) -> Self {
        let name = match m.side {
            Some(side) => format!(
                "{}_{}_{}_{}",
                m.kind.as_str(),
                m.element.as_str(),
                m.index,
                side.as_str()
            ),
            None => format!("{}_{}_{}", m.kind.as_str(), m.element.as_str(), m.index),
        };
        Self {
            name,
            measurement_type: m.kind.as_str(),
            element_type: m.element.as_str(),
            element: m.index,
            value: m.value,
            std_dev: m.std_dev,
            side: m.side.map(|s| s.as_str()),
        }
    }
}

/// Serializes the plan as CSV into any writer.
pub fn write_measurements_csv<W: Write>(
    plan: &MeasurementPlan,
    writer: W,
) -> Result<(), NetworkFileError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for m in plan.iter() {
        wtr.serialize(MeasurementRecord::from(m))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Saves the plan as a CSV file.
pub fn save_measurements_csv<P: AsRef<Path>>(
    plan: &MeasurementPlan,
    path: P,
) -> Result<(), NetworkFileError> {
    let file = File::create(path)?;
    write_measurements_csv(plan, file)
}

/// Saves the plan as a JSON array of measurement records.
pub fn save_measurements_json<P: AsRef<Path>>(
    plan: &MeasurementPlan,
    path: P,
) -> Result<(), NetworkFileError> {
    let records: Vec<MeasurementRecord> = plan.iter().map(MeasurementRecord::from).collect();
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, &records)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::measurement::{MeasuredElement, MeasurementKind, MeasurementSide};

    fn sample_plan() -> MeasurementPlan {
        let mut plan = MeasurementPlan::default();
        plan.push(Measurement::bus(MeasurementKind::V, 5, 1.2534, 0.025));
        plan.push(Measurement::branch(
            MeasurementKind::P,
            MeasuredElement::Line,
            0,
            MeasurementSide::From,
            71.95,
            0.025,
        ));
        plan
    }

    #[test]
    fn test_csv_layout() {
        let mut buf = Vec::new();
        write_measurements_csv(&sample_plan(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "name,measurement_type,element_type,element,value,std_dev,side"
        );
        assert_eq!(lines.next().unwrap(), "v_bus_5,v,bus,5,1.2534,0.025,");
        assert_eq!(
            lines.next().unwrap(),
            "p_line_0_from,p,line,0,71.95,0.025,from"
        );
    }

    #[test]
    fn test_branch_records_carry_side() {
        let plan = sample_plan();
        let rec = MeasurementRecord::from(&plan[1]);
        assert_eq!(rec.side, Some("from"));
        assert_eq!(rec.name, "p_line_0_from");
    }
}
