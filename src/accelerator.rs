//! Interface to an optional numeric batch accelerator.
//!
//! The simulation core never depends on an accelerator being present.
//! [`CpuAccelerator`] answers every query on the host: it reports no device
//! but still solves and evaluates, so callers can use one code path.

use anyhow::{anyhow, Result};
use log::debug;
use nalgebra::{DMatrix, DVector};

/// Batch numeric service an accelerator device may provide
pub trait Accelerator {
    /// Whether an accelerator device is present
    fn is_available(&self) -> bool;

    fn device_count(&self) -> usize;

    /// Human-readable description of a device
    fn device_info(&self, device: usize) -> String;

    /// Solve `matrix * x = rhs` for a square system
    fn solve_linear_system(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> Result<Vec<f64>>;

    /// Ohm's law over the first `count` voltage/resistance pairs
    fn simulate_components(
        &self,
        voltages: &[f64],
        resistances: &[f64],
        timestep: f64,
        count: usize,
    ) -> Result<Vec<f64>>;
}

/// Host fallback used when no accelerator device exists
#[derive(Debug, Clone)]
pub struct CpuAccelerator {
    /// Residual norm above which a solve is reported as failed
    pub tolerance: f64,
}

impl CpuAccelerator {
    pub fn new() -> Self {
        CpuAccelerator { tolerance: 1e-9 }
    }
}

impl Default for CpuAccelerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accelerator for CpuAccelerator {
    fn is_available(&self) -> bool {
        false
    }

    fn device_count(&self) -> usize {
        0
    }

    fn device_info(&self, _device: usize) -> String {
        "No accelerator device available".to_string()
    }

    fn solve_linear_system(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> Result<Vec<f64>> {
        let n = matrix.len();
        if matrix.iter().any(|row| row.len() != n) {
            return Err(anyhow!("Matrix must be square"));
        }
        if n != rhs.len() {
            return Err(anyhow!("Matrix and RHS dimensions don't match"));
        }

        let a = DMatrix::from_fn(n, n, |i, j| matrix[i][j]);
        let b = DVector::from_column_slice(rhs);

        let solution = a
            .clone()
            .lu()
            .solve(&b)
            .ok_or_else(|| anyhow!("LU decomposition failed - matrix may be singular"))?;

        let residual_norm = (&a * &solution - &b).norm();
        if residual_norm > self.tolerance * b.norm().max(1.0) {
            return Err(anyhow!(
                "Linear solve did not converge: residual norm {:.3e}",
                residual_norm
            ));
        }
        debug!("Solved {}x{} system on host, residual {:.3e}", n, n, residual_norm);

        Ok(solution.as_slice().to_vec())
    }

    fn simulate_components(
        &self,
        voltages: &[f64],
        resistances: &[f64],
        _timestep: f64,
        count: usize,
    ) -> Result<Vec<f64>> {
        if voltages.len() < count || resistances.len() < count {
            return Err(anyhow!(
                "Batch of {} components needs {} voltages and resistances, got {} and {}",
                count,
                count,
                voltages.len(),
                resistances.len()
            ));
        }

        Ok(voltages[..count]
            .iter()
            .zip(&resistances[..count])
            .map(|(&v, &r)| if r > 0.0 { v / r } else { 0.0 })
            .collect())
    }
}
