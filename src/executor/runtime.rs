use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::actions::{ActionRunner, Pacing};
use super::control::{ExecutorHandle, RunState};
use super::driver::InputDriver;
use super::error::MacroError;
use super::report::{ErrorCallback, INDETERMINATE, LogCallback, ProgressCallback, Reporter};
use crate::config::{Action, AppConfig, ExecutionMode, ExecutionSettings, OnError, Project, Row};
use crate::providers::Resources;

/// Pause between two passes of an endless spreadsheet loop.
const PASS_INTERVAL: Duration = Duration::from_millis(500);

/// Summary of one `start()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Mode actually executed, after any fallback.
    pub mode: ExecutionMode,
    /// `excel_loop` was requested without a spreadsheet source.
    pub fell_back: bool,
    /// Flow executions attempted, retries included.
    pub flow_executions: usize,
    /// Errors reported through the error callback.
    pub errors: usize,
    pub stopped: bool,
    /// The run ended early because of an error.
    pub aborted: bool,
}

impl RunReport {
    fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            fell_back: false,
            flow_executions: 0,
            errors: 0,
            stopped: false,
            aborted: false,
        }
    }
}

enum Outcome {
    Continue,
    Abort,
}

/// Clears `is_running` on every exit path of `start`.
struct RunningGuard<'a>(&'a RunState);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Drives one flow through the configured looping strategy.
///
/// The executor itself lives on the worker thread; other threads control it
/// through an [`ExecutorHandle`] obtained from [`MacroExecutor::handle`] or
/// injected with [`MacroExecutor::with_handle`].
pub struct MacroExecutor {
    flow: Arc<[Action]>,
    settings: ExecutionSettings,
    resources: Resources,
    driver: Box<dyn InputDriver>,
    app: AppConfig,
    pacing: Pacing,
    reporter: Reporter,
    handle: ExecutorHandle,
    report: RunReport,
}

impl MacroExecutor {
    /// Snapshot the project's flow and execution settings.
    pub fn new(
        project: &Project,
        resources: Resources,
        driver: Box<dyn InputDriver>,
        app: AppConfig,
    ) -> Self {
        Self::from_parts(
            project.flow_sequence.clone(),
            project.settings.execution.clone(),
            resources,
            driver,
            app,
        )
    }

    pub fn from_parts(
        flow: Vec<Action>,
        settings: ExecutionSettings,
        resources: Resources,
        driver: Box<dyn InputDriver>,
        app: AppConfig,
    ) -> Self {
        let report = RunReport::new(settings.mode);
        Self {
            flow: flow.into(),
            settings,
            resources,
            driver,
            app,
            pacing: Pacing::default(),
            reporter: Reporter::default(),
            handle: ExecutorHandle::new(),
            report,
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Share run state with a handle created before the executor.
    pub fn with_handle(mut self, handle: ExecutorHandle) -> Self {
        self.handle = handle;
        self
    }

    pub fn handle(&self) -> ExecutorHandle {
        self.handle.clone()
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    pub fn flow(&self) -> &[Action] {
        &self.flow
    }

    /// Install observers. Every callback is optional and runs on the worker thread.
    pub fn set_callbacks(
        &mut self,
        log: Option<LogCallback>,
        progress: Option<ProgressCallback>,
        error: Option<ErrorCallback>,
    ) {
        self.reporter.set(log, progress, error);
    }

    pub fn pause(&self) {
        self.handle.pause();
    }

    pub fn resume(&self) {
        self.handle.resume();
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// Run to completion, stop, or abort.
    ///
    /// Only `AlreadyRunning` is returned as an error; every other failure is
    /// reported through the error callback and reflected in the report.
    pub fn start(&mut self) -> Result<RunReport, MacroError> {
        let handle = self.handle.clone();
        let state = handle.state();
        state.begin()?;
        let _running = RunningGuard(state);

        self.report = RunReport::new(self.settings.mode);
        info!(
            target: "macroflow::runtime",
            mode = ?self.settings.mode,
            actions = self.flow.len(),
            on_error = ?self.settings.on_error,
            "Run started"
        );
        self.reporter.log("🚀 매크로 실행 시작");

        let settings = self.effective_settings();
        self.report.mode = settings.mode;

        let result = match settings.mode {
            ExecutionMode::ExcelLoop => self.run_excel_loop(&settings, state),
            ExecutionMode::FlowRepeat => self.run_flow_repeat(&settings, state),
            ExecutionMode::Infinite => self.run_infinite(&settings, state),
        };
        match result {
            Ok(()) => self.reporter.log("✅ 매크로 실행 완료"),
            Err(e) => {
                self.report.aborted = true;
                self.report_error(&format!("실행 중 오류 발생: {e}"));
            }
        }

        self.report.stopped = state.should_stop();
        info!(
            target: "macroflow::runtime",
            executions = self.report.flow_executions,
            errors = self.report.errors,
            stopped = self.report.stopped,
            aborted = self.report.aborted,
            "Run finished"
        );
        Ok(self.report.clone())
    }

    /// Copy of the settings with the no-spreadsheet fallback applied.
    fn effective_settings(&mut self) -> ExecutionSettings {
        let mut settings = self.settings.clone();
        if settings.mode == ExecutionMode::ExcelLoop && !self.resources.sheets.has_sources() {
            warn!(target: "macroflow::runtime", "No spreadsheet source; falling back to flow_repeat x1");
            self.reporter
                .log("⚠️ 엑셀 데이터가 없어 단순 플로우 반복 모드로 전환합니다.");
            settings.mode = ExecutionMode::FlowRepeat;
            settings.repeat_count = 1;
            self.report.fell_back = true;
        }
        settings
    }

    fn run_excel_loop(
        &mut self,
        settings: &ExecutionSettings,
        state: &RunState,
    ) -> Result<(), MacroError> {
        let source_id = self
            .resources
            .sheets
            .source_ids()
            .first()
            .copied()
            .ok_or(MacroError::NoSpreadsheetSource)?;
        let rows = self
            .resources
            .sheets
            .load_rows(source_id)
            .map_err(|e| MacroError::Spreadsheet(format!("{e:#}")))?;

        let (start, end) = row_window(settings, rows.len());
        let total = end - start;
        let infinite = settings.excel_infinite_loop;
        debug!(target: "macroflow::runtime", source_id, rows = rows.len(), start, end, infinite, "Spreadsheet window");

        if infinite {
            self.reporter.log(&format!(
                "📊 엑셀 무한반복 모드: {}행 ~ {end}행 (중지할 때까지 반복)",
                start + 1
            ));
        } else {
            self.reporter.log(&format!(
                "📊 엑셀 행 반복 모드: {}행 ~ {end}행 (총 {total}행)",
                start + 1
            ));
        }
        if total == 0 {
            self.reporter.log("⚠️ 처리할 행이 없습니다.");
            return Ok(());
        }

        let mut pass = 0usize;
        loop {
            pass += 1;
            if infinite {
                self.reporter
                    .log(&format!("🔄 === 반복 {pass}회차 시작 ==="));
            }

            for (offset, row) in rows[start..end].iter().enumerate() {
                let row_no = start + offset + 1;
                if state.should_stop() {
                    self.reporter
                        .log(&format!("⏹️ 중지됨 (반복 {pass}회차, 행 {row_no})"));
                    return Ok(());
                }
                state.set_current_row(row_no);
                self.reporter
                    .log(&format!("--- 행 {row_no} 처리 시작 ---"));

                let status = if infinite {
                    format!("반복 {pass}회차 - 행 {row_no}/{end} 처리 중")
                } else {
                    format!("행 {row_no} 처리 중")
                };
                self.reporter.progress(offset + 1, total as i64, &status);

                if let Outcome::Abort =
                    self.run_guarded(&format!("행 {row_no}"), Some(row), settings, state)
                {
                    return Ok(());
                }
            }

            if !infinite {
                return Ok(());
            }
            self.reporter.log(&format!(
                "✅ 반복 {pass}회차 완료. 처음부터 다시 시작합니다..."
            ));
            if !state.sleep_unless_stopped(PASS_INTERVAL) {
                self.reporter
                    .log(&format!("⏹️ 중지됨 (반복 {pass}회차 완료 후)"));
                return Ok(());
            }
        }
    }

    fn run_flow_repeat(
        &mut self,
        settings: &ExecutionSettings,
        state: &RunState,
    ) -> Result<(), MacroError> {
        let count = settings.repeat_count as usize;
        self.reporter
            .log(&format!("🔁 플로우 반복 모드: {count}회"));

        for i in 1..=count {
            if state.should_stop() {
                self.reporter
                    .log(&format!("⏹️ 중지됨 (반복 {i}/{count})"));
                break;
            }
            state.set_current_row(i);
            self.reporter.log(&format!("--- 반복 {i}/{count} ---"));
            self.reporter
                .progress(i, count as i64, &format!("반복 {i} 실행 중"));

            if let Outcome::Abort = self.run_guarded(&format!("반복 {i}"), None, settings, state) {
                break;
            }
        }
        Ok(())
    }

    fn run_infinite(
        &mut self,
        settings: &ExecutionSettings,
        state: &RunState,
    ) -> Result<(), MacroError> {
        self.reporter.log("♾️ 무한 반복 모드 (중지할 때까지 계속)");

        for i in 1.. {
            if state.should_stop() {
                self.reporter.log(&format!("⏹️ 중지됨 (반복 {i})"));
                break;
            }
            state.set_current_row(i);
            self.reporter.log(&format!("--- 반복 {i} ---"));
            self.reporter
                .progress(i, INDETERMINATE, &format!("반복 {i} 실행 중"));

            if let Outcome::Abort = self.run_guarded(&format!("반복 {i}"), None, settings, state) {
                break;
            }
        }
        Ok(())
    }

    /// Execute the flow once and apply the error policy to a failure.
    fn run_guarded(
        &mut self,
        label: &str,
        row: Option<&Row>,
        settings: &ExecutionSettings,
        state: &RunState,
    ) -> Outcome {
        let err = match self.execute_flow(row) {
            Ok(()) => return Outcome::Continue,
            Err(e) => e,
        };
        if matches!(err.root(), MacroError::UserCancelled) {
            self.report_error(&format!("⏹️ {label}: {err}"));
            return Outcome::Abort;
        }

        match settings.on_error {
            OnError::Stop => {
                self.report_error(&format!("{label}에서 오류 발생. 중지합니다: {err}"));
                self.report.aborted = true;
                Outcome::Abort
            }
            OnError::Skip => {
                self.report_error(&format!("{label}에서 오류 발생. 건너뜁니다: {err}"));
                Outcome::Continue
            }
            OnError::Retry => self.retry(label, row, settings.retry_count, err, state),
        }
    }

    /// Re-run the whole flow up to `retries` more times. Reports once, on exhaustion.
    fn retry(
        &mut self,
        label: &str,
        row: Option<&Row>,
        retries: u32,
        mut last: MacroError,
        state: &RunState,
    ) -> Outcome {
        for attempt in 1..=retries {
            if state.should_stop() {
                break;
            }
            debug!(target: "macroflow::runtime", %label, attempt, retries, error = %last, "Retrying flow");
            self.reporter
                .log(&format!("재시도 {attempt}/{retries}"));
            match self.execute_flow(row) {
                Ok(()) => return Outcome::Continue,
                Err(e) if matches!(e.root(), MacroError::UserCancelled) => {
                    self.report_error(&format!("⏹️ {label}: {e}"));
                    return Outcome::Abort;
                }
                Err(e) => last = e,
            }
        }
        self.report_error(&format!("{label} 재시도 실패. 건너뜁니다: {last}"));
        Outcome::Continue
    }

    /// Run every action of the flow once, in order.
    ///
    /// Stops early, successfully, when a stop is requested; blocks at action
    /// boundaries while paused. A failing action is wrapped with its 1-based index.
    pub fn execute_flow(&mut self, row: Option<&Row>) -> Result<(), MacroError> {
        let handle = self.handle.clone();
        let state = handle.state();
        let flow = Arc::clone(&self.flow);
        self.report.flow_executions += 1;

        let mut runner = ActionRunner {
            driver: &mut *self.driver,
            resources: &self.resources,
            reporter: &self.reporter,
            state,
            pacing: self.pacing,
            app: &self.app,
            row,
        };

        for (idx, action) in flow.iter().enumerate() {
            let was_paused = state.is_paused();
            if was_paused {
                runner.reporter.log("⏸️ 일시정지");
            }
            if !state.wait_while_paused() {
                debug!(target: "macroflow::runtime", action = idx + 1, "Stop observed; ending flow");
                break;
            }
            if was_paused {
                runner.reporter.log("▶️ 재개");
            }

            let index = idx + 1;
            state.set_current_action(index);
            runner
                .run(action)
                .map_err(|e| MacroError::ActionFailed {
                    index,
                    source: Box::new(e),
                })?;
        }
        Ok(())
    }

    fn report_error(&mut self, message: &str) {
        self.report.errors += 1;
        let capture = if self.settings.screenshot_on_error {
            match self.driver.screenshot() {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!(target: "macroflow::runtime", error = %e, "Error screenshot failed");
                    None
                }
            }
        } else {
            None
        };
        self.reporter.error(message, capture.as_ref());
    }
}

/// `[start, end)` indices of the rows to process, clamped to the table.
fn row_window(settings: &ExecutionSettings, len: usize) -> (usize, usize) {
    let end = settings.excel_end_row.map_or(len, |e| e.min(len));
    let start = settings.excel_start_row.saturating_sub(1).min(end);
    (start, end)
}
