//! Report generation port trait.

use std::path::Path;

use crate::domain::backtest::SimulationResult;
use crate::domain::error::BotsimError;

/// Port for writing simulation reports.
pub trait ReportPort {
    fn write(&self, result: &SimulationResult, output_dir: &Path) -> Result<(), BotsimError>;

    /// Default implementation: one subdirectory per strategy.
    fn write_many(&self, results: &[SimulationResult], output_dir: &Path) -> Result<(), BotsimError> {
        for result in results {
            self.write(result, &output_dir.join(result.strategy.as_str()))?;
        }
        Ok(())
    }
}
