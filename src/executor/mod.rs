#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

/*!
Macro execution engine.

This module wires together:
- `runtime`: `MacroExecutor`, the looping strategies (spreadsheet rows, fixed
  repetitions, endless) and the per-run error policy
- `actions`: one handler per action type, run against an `InputDriver`
- `driver`: the platform capability trait plus the Enigo and dry-run drivers
- `control`: run state shared with the controlling thread (pause/resume/stop)
- `report`: log/progress/error callbacks
- `matching`: grayscale template search used by the Enigo driver
- `error`: `MacroError`

Typical usage:
```no_run
use macroflow::config::{self, AppConfig};
use macroflow::executor::{DryRunDriver, MacroExecutor};
use macroflow::providers::Resources;

# fn main() -> anyhow::Result<()> {
let app = AppConfig::from_current_dir()?;
let project = config::load_from_path("projects/demo.json")?;
let resources = Resources::from_project(&project, &app);
let mut exec = MacroExecutor::new(&project, resources, Box::new(DryRunDriver::new()), app);
let handle = exec.handle(); // give this to another thread to pause/stop
let report = exec.start()?;
println!("{} executions, {} errors", report.flow_executions, report.errors);
# drop(handle);
# Ok(())
# }
```
*/

pub mod actions;
pub mod control;
pub mod driver;
pub mod error;
pub mod matching;
pub mod report;
pub mod runtime;

#[cfg(test)]
pub(crate) mod testing;

pub use actions::{Pacing, describe};
pub use control::{ExecutorHandle, RunState};
pub use driver::{DryRunDriver, EnigoDriver, InputDriver, Rect};
pub use error::{MacroError, ResourceKind};
pub use report::{ErrorCallback, INDETERMINATE, LogCallback, ProgressCallback};
pub use runtime::{MacroExecutor, RunReport};
