// Writes the SDR white level through the external `set_sdrwhite.exe` helper.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::ApplyError;

pub const HELPER_EXE: &str = "set_sdrwhite.exe";

/// Hard ceiling on one helper run; the UI thread waits for it.
pub const HELPER_TIMEOUT: Duration = Duration::from_secs(3);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// SDR white level in nits for a 0–100 slider value (80..=480).
pub fn percent_to_nits(percent: u8) -> u32 {
    80 + u32::from(percent.min(100)) * 4
}

/// Where the brightness actually gets written. Production runs the helper
/// process; tests record calls.
pub trait Helper {
    fn invoke(&mut self, percent: u8) -> Result<(), ApplyError>;
}

/// Runs `set_sdrwhite.exe 0 <nits>`, searching the usual install locations.
pub struct ProcessHelper {
    search_dirs: Vec<PathBuf>,
    timeout: Duration,
}

impl ProcessHelper {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            search_dirs,
            timeout: HELPER_TIMEOUT,
        }
    }

    /// Search next to the executable first, then the per-user data dir,
    /// each with an optional `tools` subfolder.
    pub fn with_default_dirs() -> Self {
        Self::new(vec![crate::config::app_dir(), crate::config::data_dir()])
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    pub fn locate(&self) -> Option<PathBuf> {
        locate_helper(&self.search_dirs)
    }
}

pub fn locate_helper(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|d| [d.join(HELPER_EXE), d.join("tools").join(HELPER_EXE)])
        .find(|p| p.is_file())
}

impl Helper for ProcessHelper {
    fn invoke(&mut self, percent: u8) -> Result<(), ApplyError> {
        let exe = self.locate().ok_or(ApplyError::HelperMissing)?;
        let nits = percent_to_nits(percent);
        run_with_timeout(&exe, &["0".to_string(), nits.to_string()], self.timeout)
    }
}

fn run_with_timeout(exe: &Path, args: &[String], timeout: Duration) -> Result<(), ApplyError> {
    let mut cmd = Command::new(exe);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    let mut child = cmd.spawn().map_err(ApplyError::HelperSpawn)?;
    let started = Instant::now();
    loop {
        match child.try_wait().map_err(ApplyError::HelperSpawn)? {
            Some(status) if status.success() => return Ok(()),
            Some(status) => return Err(ApplyError::HelperFailed { code: status.code() }),
            None if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ApplyError::HelperTimeout(timeout));
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    }
}

/// Outcome of a successful [`BrightnessApplier::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Written,
    /// Value equals the last one written; helper not run.
    Unchanged,
}

/// Wraps a [`Helper`] and skips writes that would not change anything.
pub struct BrightnessApplier<H> {
    helper: H,
    last_applied: Option<u8>,
}

impl<H: Helper> BrightnessApplier<H> {
    pub fn new(helper: H) -> Self {
        Self {
            helper,
            last_applied: None,
        }
    }

    pub fn last_applied(&self) -> Option<u8> {
        self.last_applied
    }

    pub fn helper(&self) -> &H {
        &self.helper
    }

    pub fn apply(&mut self, percent: u8) -> Result<Applied, ApplyError> {
        let percent = percent.min(100);
        if self.last_applied == Some(percent) {
            return Ok(Applied::Unchanged);
        }
        self.write(percent)
    }

    /// Write even if the value matches the last one (display reconnects can
    /// reset the OS slider behind our back).
    pub fn force_apply(&mut self, percent: u8) -> Result<Applied, ApplyError> {
        self.write(percent.min(100))
    }

    fn write(&mut self, percent: u8) -> Result<Applied, ApplyError> {
        tracing::info!(percent, nits = percent_to_nits(percent), "apply invoked");
        match self.helper.invoke(percent) {
            Ok(()) => {
                self.last_applied = Some(percent);
                Ok(Applied::Written)
            }
            Err(e) => {
                tracing::error!(percent, error = %e, "apply failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every value it is asked to write; can be told to fail.
    #[derive(Clone, Default)]
    pub struct RecordingHelper {
        pub calls: Rc<RefCell<Vec<u8>>>,
        pub fail_with: Rc<RefCell<Option<fn() -> ApplyError>>>,
    }

    impl RecordingHelper {
        pub fn calls(&self) -> Vec<u8> {
            self.calls.borrow().clone()
        }

        pub fn fail(&self, make: fn() -> ApplyError) {
            *self.fail_with.borrow_mut() = Some(make);
        }

        pub fn recover(&self) {
            *self.fail_with.borrow_mut() = None;
        }
    }

    impl Helper for RecordingHelper {
        fn invoke(&mut self, percent: u8) -> Result<(), ApplyError> {
            if let Some(make) = *self.fail_with.borrow() {
                return Err(make());
            }
            self.calls.borrow_mut().push(percent);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingHelper;
    use super::*;

    #[test]
    fn nits_mapping() {
        assert_eq!(percent_to_nits(0), 80);
        assert_eq!(percent_to_nits(50), 280);
        assert_eq!(percent_to_nits(100), 480);
        assert_eq!(percent_to_nits(200), 480);
    }

    #[test]
    fn repeated_value_runs_helper_once() {
        for v in 0..=100u8 {
            let helper = RecordingHelper::default();
            let mut applier = BrightnessApplier::new(helper.clone());
            assert_eq!(applier.apply(v).unwrap(), Applied::Written);
            assert_eq!(applier.apply(v).unwrap(), Applied::Unchanged);
            assert_eq!(helper.calls(), vec![v]);
        }
    }

    #[test]
    fn force_apply_bypasses_dedupe() {
        let helper = RecordingHelper::default();
        let mut applier = BrightnessApplier::new(helper.clone());
        applier.apply(40).unwrap();
        applier.force_apply(40).unwrap();
        assert_eq!(helper.calls(), vec![40, 40]);
    }

    #[test]
    fn failure_keeps_last_applied() {
        let helper = RecordingHelper::default();
        let mut applier = BrightnessApplier::new(helper.clone());
        applier.apply(30).unwrap();
        helper.fail(|| ApplyError::HelperFailed { code: Some(1) });
        assert!(applier.apply(60).is_err());
        assert_eq!(applier.last_applied(), Some(30));

        helper.recover();
        assert_eq!(applier.apply(60).unwrap(), Applied::Written);
        assert_eq!(helper.calls(), vec![30, 60]);
    }

    #[test]
    fn missing_helper_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut helper = ProcessHelper::new(vec![dir.path().to_path_buf()]);
        assert!(matches!(helper.invoke(50), Err(ApplyError::HelperMissing)));
    }

    #[test]
    fn locate_checks_tools_subfolder() {
        let dir = tempfile::tempdir().unwrap();
        let tools = dir.path().join("tools");
        std::fs::create_dir_all(&tools).unwrap();
        std::fs::write(tools.join(HELPER_EXE), b"MZ").unwrap();
        let found = locate_helper(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(found, tools.join(HELPER_EXE));
    }

    #[cfg(unix)]
    #[test]
    fn slow_helper_is_killed_at_the_timeout() {
        let started = Instant::now();
        let err = run_with_timeout(Path::new("sleep"), &["5".to_string()], Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, ApplyError::HelperTimeout(t) if t == Duration::from_millis(200)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_a_failure() {
        let err = run_with_timeout(Path::new("false"), &[], HELPER_TIMEOUT).unwrap_err();
        assert!(matches!(err, ApplyError::HelperFailed { code: Some(1) }));
        assert_eq!(err.kind(), "failed");
    }

    #[cfg(unix)]
    #[test]
    fn zero_exit_is_success() {
        run_with_timeout(Path::new("true"), &[], HELPER_TIMEOUT).unwrap();
    }
}
