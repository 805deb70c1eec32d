use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};

use crate::circuit::Circuit;
use crate::cli::OutputFormat;

/// Sampled readings from a traced simulation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationTrace {
    pub circuit: String,
    pub timestep: f64,
    pub time_points: Vec<f64>,
    /// Component id -> `current_value()` per sample
    pub component_values: BTreeMap<String, Vec<f64>>,
    /// Component id -> type tag
    pub component_types: BTreeMap<String, String>,
    /// Node id -> voltage per sample
    pub node_voltages: BTreeMap<String, Vec<f64>>,
}

impl SimulationTrace {
    pub fn new(circuit: &str, timestep: f64) -> Self {
        SimulationTrace {
            circuit: circuit.to_string(),
            timestep,
            ..Default::default()
        }
    }

    /// Append one sample of every component reading and node voltage
    pub fn record(&mut self, time: f64, circuit: &Circuit) {
        self.time_points.push(time);

        for component in circuit.components() {
            let component = component.borrow();
            self.component_values
                .entry(component.id().to_string())
                .or_default()
                .push(component.current_value());
            self.component_types
                .entry(component.id().to_string())
                .or_insert_with(|| component.type_tag().to_string());
        }

        for node in circuit.nodes() {
            let node = node.borrow();
            self.node_voltages
                .entry(node.id().to_string())
                .or_default()
                .push(node.voltage());
        }
    }

    pub fn len(&self) -> usize {
        self.time_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_points.is_empty()
    }

    pub fn time_points(&self) -> &[f64] {
        &self.time_points
    }

    pub fn component_series(&self, id: &str) -> Option<&[f64]> {
        self.component_values.get(id).map(Vec::as_slice)
    }

    pub fn node_series(&self, id: &str) -> Option<&[f64]> {
        self.node_voltages.get(id).map(Vec::as_slice)
    }

    /// Final reading of every component
    pub fn final_values(&self) -> BTreeMap<&str, f64> {
        self.component_values
            .iter()
            .filter_map(|(id, values)| values.last().map(|v| (id.as_str(), *v)))
            .collect()
    }

    /// Export the trace to file
    pub fn export<P: AsRef<Path>>(&self, path: P, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Csv => self.export_csv(path.as_ref()),
            OutputFormat::Json => self.export_json(path.as_ref()),
        }
    }

    fn export_csv(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        let mut header = vec!["time".to_string()];
        for node_id in self.node_voltages.keys() {
            header.push(format!("V({})", node_id));
        }
        for component_id in self.component_values.keys() {
            header.push(format!("{}({})", self.value_label(component_id), component_id));
        }
        writer.write_record(&header)?;

        for (i, &time) in self.time_points.iter().enumerate() {
            let mut record = vec![time.to_string()];
            for voltages in self.node_voltages.values() {
                record.push(voltages.get(i).unwrap_or(&0.0).to_string());
            }
            for values in self.component_values.values() {
                record.push(values.get(i).unwrap_or(&0.0).to_string());
            }
            writer.write_record(&record)?;
        }

        writer.flush()?;
        info!("Trace exported to CSV: {}", path.display());
        Ok(())
    }

    fn export_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        info!("Trace exported to JSON: {}", path.display());
        Ok(())
    }

    // Capacitors report a voltage, everything else a current
    fn value_label(&self, component_id: &str) -> &'static str {
        match self.component_types.get(component_id).map(String::as_str) {
            Some(crate::devices::CAPACITOR) => "V",
            _ => "I",
        }
    }
}
