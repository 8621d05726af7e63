//! Application core.
//!
//! Every OS callback is turned into an [`AppEvent`] by the tray controller
//! and fed to [`App::handle`], which updates state and returns the
//! [`Effect`]s the controller must carry out (show the popup, pop a balloon,
//! install the hook, ...). `App` itself never talks to Win32, so the whole
//! state machine runs under test with a fake helper and a settable clock.

use std::time::Instant;

use crate::brightness::{Applied, BrightnessApplier, Helper};
use crate::config::{clamp_percent, Config, ConfigStore, Theme};
use crate::error::{ApplyError, InputRegistrationError};
use crate::geometry::{Point, Rect};
use crate::input::{InputRouter, Routed, WheelEvent, WheelOrigin};
use crate::schedule::{Clock, ScheduleEdit, ScheduleMode, Scheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    OpenSlider,
    ApplyNow,
    ToggleAuto,
    ToggleAutostart,
    SetTheme(Theme),
    EditSchedule,
    Exit,
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Shortly after launch, once the tray is up.
    Started,
    HotkeyPressed,
    TrayClicked,
    TrayHover {
        point: Option<Point>,
        at: Instant,
    },
    WheelScrolled {
        wheel: WheelEvent,
        tray_rect: Option<Rect>,
    },
    SliderDragged(u8),
    SliderReleased(u8),
    PopupDismissed,
    MenuActionSelected(MenuAction),
    TimerTick,
    ProbeElapsed(Instant),
    InputArmed(WheelOrigin, Instant),
    InputRegistrationFailed {
        error: InputRegistrationError,
        at: Instant,
    },
    TaskbarRecreated,
    HelperInstalled,
    HelperDownloadDeclined,
    ScheduleEdited(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ShowPopup { value: u8 },
    UpdatePopup { value: u8 },
    HidePopup,
    Notify { title: String, message: String },
    OfferHelperDownload,
    /// Set up (or re-set up) one wheel delivery mechanism.
    ArmInput(WheelOrigin),
    ToggleAutostart,
    ApplyTheme(Theme),
    EditSchedule { current: String },
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrightnessSource {
    Manual,
    Scheduled,
}

/// What the display is currently set to, as far as we know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrightnessState {
    pub value: u8,
    pub source: BrightnessSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HelperPrompt {
    NotAsked,
    Offered,
    Declined,
}

pub struct App<H, C> {
    store: ConfigStore,
    applier: BrightnessApplier<H>,
    scheduler: Scheduler,
    router: InputRouter,
    clock: C,
    state: BrightnessState,
    popup_open: bool,
    pending_drag: Option<u8>,
    prompt: HelperPrompt,
    last_error_kind: Option<&'static str>,
    pending_value: Option<u8>,
}

impl<H: Helper, C: Clock> App<H, C> {
    pub fn new(store: ConfigStore, helper: H, clock: C) -> Self {
        let scheduler = Scheduler::from_config(store.config());
        let state = match scheduler.tick(clock.now(), store.config()) {
            Some(value) => BrightnessState {
                value,
                source: BrightnessSource::Scheduled,
            },
            None => BrightnessState {
                value: store.config().manual,
                source: BrightnessSource::Manual,
            },
        };
        tracing::info!(config = %store.config(), "app-start");
        Self {
            store,
            applier: BrightnessApplier::new(helper),
            scheduler,
            router: InputRouter::new(),
            clock,
            state,
            popup_open: false,
            pending_drag: None,
            prompt: HelperPrompt::NotAsked,
            last_error_kind: None,
            pending_value: None,
        }
    }

    pub fn config(&self) -> &Config {
        self.store.config()
    }

    pub fn state(&self) -> BrightnessState {
        self.state
    }

    pub fn schedule_mode(&self) -> ScheduleMode {
        self.scheduler.mode()
    }

    pub fn popup_open(&self) -> bool {
        self.popup_open
    }

    pub fn applier(&self) -> &BrightnessApplier<H> {
        &self.applier
    }

    pub fn router(&self) -> &InputRouter {
        &self.router
    }

    pub fn handle(&mut self, event: AppEvent) -> Vec<Effect> {
        let mut fx = Vec::new();
        match event {
            AppEvent::Started => {
                let target = self.current_target();
                self.apply(target, false, &mut fx);
            }
            AppEvent::TimerTick => self.run_schedule(&mut fx),
            AppEvent::HotkeyPressed
            | AppEvent::TrayClicked
            | AppEvent::MenuActionSelected(MenuAction::OpenSlider) => {
                tracing::info!("slider-open requested");
                self.popup_open = true;
                fx.push(Effect::ShowPopup {
                    value: self.state.value,
                });
            }
            AppEvent::TrayHover { point, at } => self.router.mark_hover(point, at),
            AppEvent::WheelScrolled { wheel, tray_rect } => {
                self.router.set_tray_rect(tray_rect);
                if let Routed::Step(step) = self.router.accept(wheel) {
                    self.on_wheel_step(step, wheel.delta, &mut fx);
                }
            }
            AppEvent::SliderDragged(value) => {
                let value = value.min(100);
                self.pending_drag = Some(value);
                if self.apply(value, false, &mut fx) {
                    self.state.value = value;
                }
            }
            AppEvent::SliderReleased(value) => {
                self.pending_drag = None;
                self.commit_manual(value.min(100), &mut fx);
                self.close_popup(&mut fx);
            }
            AppEvent::PopupDismissed => {
                if let Some(value) = self.pending_drag.take() {
                    self.commit_manual(value, &mut fx);
                }
                self.close_popup(&mut fx);
            }
            AppEvent::MenuActionSelected(action) => self.on_menu(action, &mut fx),
            AppEvent::ProbeElapsed(now) => {
                if let Some(origin) = self.router.next_fallback(now) {
                    tracing::info!(origin = origin.label(), "wheel-setup probe-expired");
                    fx.push(Effect::ArmInput(origin));
                }
            }
            AppEvent::InputArmed(origin, at) => self.router.arm(origin, at),
            AppEvent::InputRegistrationFailed { error, at } => {
                self.router.mark_failed(&error);
                if let Some(origin) = self.router.next_fallback(at) {
                    fx.push(Effect::ArmInput(origin));
                }
            }
            AppEvent::TaskbarRecreated => {
                tracing::info!("wheel-taskbarcreated received");
                self.router.reset(WheelOrigin::TrayNotification);
                fx.push(Effect::ArmInput(WheelOrigin::TrayNotification));
            }
            AppEvent::HelperInstalled => {
                self.last_error_kind = None;
                if let Some(value) = self.pending_value.take() {
                    self.apply(value, true, &mut fx);
                }
            }
            AppEvent::HelperDownloadDeclined => {
                self.prompt = HelperPrompt::Declined;
                fx.push(Effect::Notify {
                    title: "SDR brightness unchanged".into(),
                    message: "set_sdrwhite.exe is missing. Use \"Apply now\" to download it later."
                        .into(),
                });
            }
            AppEvent::ScheduleEdited(text) => match ScheduleEdit::parse(&text) {
                Ok(edit) => {
                    tracing::info!(schedule = %edit, "schedule edited");
                    let _ = self.store.update(|c| edit.apply_to(c));
                    self.run_schedule(&mut fx);
                }
                Err(e) => fx.push(Effect::Notify {
                    title: "Schedule not changed".into(),
                    message: e.to_string(),
                }),
            },
        }
        fx
    }

    fn on_menu(&mut self, action: MenuAction, fx: &mut Vec<Effect>) {
        match action {
            MenuAction::OpenSlider => {}
            MenuAction::ApplyNow => {
                // An explicit retry re-arms the download prompt and balloons.
                if self.prompt == HelperPrompt::Declined {
                    self.prompt = HelperPrompt::NotAsked;
                }
                self.last_error_kind = None;
                let target = self.current_target();
                self.apply(target, true, fx);
            }
            MenuAction::ToggleAuto => match self.scheduler.mode() {
                ScheduleMode::Auto => {
                    self.scheduler.enter_manual_override();
                    let _ = self.store.update(|c| c.auto_enabled = false);
                }
                ScheduleMode::ManualOverride => {
                    self.scheduler.resume_auto();
                    let _ = self.store.update(|c| c.auto_enabled = true);
                    self.run_schedule(fx);
                }
            },
            MenuAction::ToggleAutostart => fx.push(Effect::ToggleAutostart),
            MenuAction::SetTheme(theme) => {
                if self.config().theme != theme {
                    let _ = self.store.update(|c| c.theme = theme);
                }
                fx.push(Effect::ApplyTheme(theme));
            }
            MenuAction::EditSchedule => fx.push(Effect::EditSchedule {
                current: ScheduleEdit::from_config(self.config()).to_string(),
            }),
            MenuAction::Exit => {
                tracing::info!("app-quit requested");
                fx.push(Effect::Quit);
            }
        }
    }

    fn current_target(&self) -> u8 {
        self.scheduler
            .tick(self.clock.now(), self.config())
            .unwrap_or(self.config().manual)
    }

    fn run_schedule(&mut self, fx: &mut Vec<Effect>) {
        let Some(target) = self.scheduler.tick(self.clock.now(), self.config()) else {
            return;
        };
        if self.apply(target, false, fx) {
            self.state = BrightnessState {
                value: target,
                source: BrightnessSource::Scheduled,
            };
            if self.popup_open {
                fx.push(Effect::UpdatePopup { value: target });
            }
        }
    }

    fn on_wheel_step(&mut self, step: i32, delta: i32, fx: &mut Vec<Effect>) {
        let old = self.state.value;
        let target = clamp_percent(i64::from(old) + i64::from(step));
        if target == old {
            tracing::info!(old, target, "wheel-apply skipped");
            return;
        }
        let ok = self.commit_manual(target, fx);
        tracing::info!(delta, old, target, ok, "wheel-apply");
        if self.popup_open {
            fx.push(Effect::UpdatePopup { value: target });
        }
    }

    /// A value the user chose: leave the schedule, remember and apply it.
    fn commit_manual(&mut self, value: u8, fx: &mut Vec<Effect>) -> bool {
        self.scheduler.enter_manual_override();
        let _ = self.store.update(|c| {
            c.manual = value;
            c.auto_enabled = false;
        });
        let ok = self.apply(value, false, fx);
        if ok {
            self.state = BrightnessState {
                value,
                source: BrightnessSource::Manual,
            };
        }
        ok
    }

    fn close_popup(&mut self, fx: &mut Vec<Effect>) {
        if self.popup_open {
            self.popup_open = false;
            fx.push(Effect::HidePopup);
        }
    }

    /// Returns true when the display now shows `value`.
    fn apply(&mut self, value: u8, force: bool, fx: &mut Vec<Effect>) -> bool {
        let result = if force {
            self.applier.force_apply(value)
        } else {
            self.applier.apply(value)
        };
        match result {
            Ok(Applied::Written) | Ok(Applied::Unchanged) => {
                self.last_error_kind = None;
                true
            }
            Err(ApplyError::HelperMissing) => {
                self.pending_value = Some(value);
                if self.prompt == HelperPrompt::NotAsked {
                    self.prompt = HelperPrompt::Offered;
                    fx.push(Effect::OfferHelperDownload);
                }
                false
            }
            Err(e) => {
                if self.last_error_kind != Some(e.kind()) {
                    self.last_error_kind = Some(e.kind());
                    fx.push(Effect::Notify {
                        title: "SDR brightness not applied".into(),
                        message: e.to_string(),
                    });
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brightness::testing::RecordingHelper;
    use chrono::NaiveTime;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Clone)]
    struct TestClock(Rc<Cell<NaiveTime>>);

    impl TestClock {
        fn at(h: u32, m: u32) -> Self {
            Self(Rc::new(Cell::new(NaiveTime::from_hms_opt(h, m, 0).unwrap())))
        }

        fn set(&self, h: u32, m: u32) {
            self.0.set(NaiveTime::from_hms_opt(h, m, 0).unwrap());
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> NaiveTime {
            self.0.get()
        }
    }

    struct Harness {
        app: App<RecordingHelper, TestClock>,
        helper: RecordingHelper,
        clock: TestClock,
        _dir: tempfile::TempDir,
        path: std::path::PathBuf,
    }

    fn harness(h: u32, m: u32) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        let helper = RecordingHelper::default();
        let clock = TestClock::at(h, m);
        let app = App::new(ConfigStore::open(&path), helper.clone(), clock.clone());
        Harness {
            app,
            helper,
            clock,
            _dir: dir,
            path,
        }
    }

    fn on_disk(h: &Harness) -> Config {
        crate::config::load_config(&h.path)
    }

    #[test]
    fn startup_applies_schedule() {
        let mut h = harness(12, 0);
        h.app.handle(AppEvent::Started);
        assert_eq!(h.helper.calls(), vec![70]);
        assert_eq!(h.app.state().source, BrightnessSource::Scheduled);
    }

    #[test]
    fn ticks_only_write_on_period_change() {
        let mut h = harness(12, 0);
        h.app.handle(AppEvent::Started);
        h.app.handle(AppEvent::TimerTick);
        h.clock.set(19, 59);
        h.app.handle(AppEvent::TimerTick);
        h.clock.set(20, 0);
        h.app.handle(AppEvent::TimerTick);
        h.app.handle(AppEvent::TimerTick);
        assert_eq!(h.helper.calls(), vec![70, 30]);
    }

    #[test]
    fn slider_release_enters_manual_override() {
        let mut h = harness(12, 0);
        h.app.handle(AppEvent::Started);
        h.app.handle(AppEvent::HotkeyPressed);
        h.app.handle(AppEvent::SliderDragged(60));
        let fx = h.app.handle(AppEvent::SliderReleased(64));

        assert_eq!(fx, vec![Effect::HidePopup]);
        assert_eq!(h.app.schedule_mode(), ScheduleMode::ManualOverride);
        let saved = on_disk(&h);
        assert_eq!(saved.manual, 64);
        assert!(!saved.auto_enabled);

        h.clock.set(23, 0);
        h.app.handle(AppEvent::TimerTick);
        assert_eq!(h.helper.calls(), vec![70, 60, 64]);
    }

    #[test]
    fn dismissing_mid_drag_commits_the_value() {
        let mut h = harness(12, 0);
        h.app.handle(AppEvent::TrayClicked);
        h.app.handle(AppEvent::SliderDragged(15));
        let fx = h.app.handle(AppEvent::PopupDismissed);
        assert_eq!(fx, vec![Effect::HidePopup]);
        assert_eq!(on_disk(&h).manual, 15);
        assert!(!h.app.popup_open());
    }

    #[test]
    fn menu_toggle_resumes_schedule_immediately() {
        let mut h = harness(23, 0);
        h.app.handle(AppEvent::SliderReleased(90));
        let fx = h.app.handle(AppEvent::MenuActionSelected(MenuAction::ToggleAuto));
        assert!(fx.is_empty());
        assert_eq!(h.app.schedule_mode(), ScheduleMode::Auto);
        assert!(on_disk(&h).auto_enabled);
        assert_eq!(h.helper.calls(), vec![90, 30]);
    }

    #[test]
    fn wheel_steps_from_current_value_and_updates_popup() {
        let mut h = harness(12, 0);
        h.app.handle(AppEvent::Started);
        h.app.handle(AppEvent::HotkeyPressed);
        let wheel = WheelEvent {
            delta: 120,
            origin: WheelOrigin::TrayNotification,
            at: Instant::now(),
            point: None,
        };
        let fx = h.app.handle(AppEvent::WheelScrolled {
            wheel,
            tray_rect: None,
        });
        assert_eq!(fx, vec![Effect::UpdatePopup { value: 72 }]);
        assert_eq!(h.app.schedule_mode(), ScheduleMode::ManualOverride);
        assert_eq!(on_disk(&h).manual, 72);
    }

    #[test]
    fn wheel_at_the_limit_is_a_no_op() {
        let mut h = harness(12, 0);
        h.app.handle(AppEvent::SliderReleased(100));
        let wheel = WheelEvent {
            delta: 120,
            origin: WheelOrigin::TrayNotification,
            at: Instant::now(),
            point: None,
        };
        h.app.handle(AppEvent::WheelScrolled {
            wheel,
            tray_rect: None,
        });
        assert_eq!(h.helper.calls(), vec![100]);
    }

    #[test]
    fn duplicate_wheel_reports_move_once() {
        let mut h = harness(12, 0);
        h.app.handle(AppEvent::SliderReleased(50));
        let rect = Some(Rect::new(0, 0, 20, 20));
        let t0 = Instant::now();
        for (origin, dt, point) in [
            (WheelOrigin::RawInput, 0, Some(Point::new(5, 5))),
            (WheelOrigin::TrayNotification, 4, None),
            (WheelOrigin::LowLevelHook, 9, Some(Point::new(5, 5))),
        ] {
            h.app.handle(AppEvent::WheelScrolled {
                wheel: WheelEvent {
                    delta: -120,
                    origin,
                    at: t0 + Duration::from_millis(dt),
                    point,
                },
                tray_rect: rect,
            });
        }
        assert_eq!(h.app.state().value, 48);
        assert_eq!(h.helper.calls(), vec![50, 48]);
    }

    #[test]
    fn missing_helper_prompts_once_then_applies_after_install() {
        let mut h = harness(12, 0);
        h.helper.fail(|| ApplyError::HelperMissing);
        let fx = h.app.handle(AppEvent::Started);
        assert_eq!(fx, vec![Effect::OfferHelperDownload]);
        let fx = h.app.handle(AppEvent::SliderDragged(40));
        assert!(fx.is_empty());

        h.helper.recover();
        h.app.handle(AppEvent::HelperInstalled);
        assert_eq!(h.helper.calls(), vec![40]);
    }

    #[test]
    fn declined_download_notifies_and_apply_now_reoffers() {
        let mut h = harness(12, 0);
        h.helper.fail(|| ApplyError::HelperMissing);
        h.app.handle(AppEvent::Started);
        let fx = h.app.handle(AppEvent::HelperDownloadDeclined);
        assert!(matches!(fx.as_slice(), [Effect::Notify { .. }]));
        assert_eq!(h.app.state().value, 70);
        assert!(h.app.applier().last_applied().is_none());

        let fx = h.app.handle(AppEvent::MenuActionSelected(MenuAction::ApplyNow));
        assert_eq!(fx, vec![Effect::OfferHelperDownload]);
    }

    #[test]
    fn helper_failures_balloon_once_per_kind() {
        let mut h = harness(12, 0);
        h.helper.fail(|| ApplyError::HelperFailed { code: Some(2) });
        let first = h.app.handle(AppEvent::SliderDragged(10));
        let second = h.app.handle(AppEvent::SliderDragged(11));
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        h.helper.fail(|| ApplyError::HelperTimeout(Duration::from_secs(3)));
        assert_eq!(h.app.handle(AppEvent::SliderDragged(12)).len(), 1);
    }

    #[test]
    fn probe_arms_hook_when_nothing_delivered() {
        let mut h = harness(12, 0);
        let t0 = Instant::now();
        h.app.handle(AppEvent::InputArmed(WheelOrigin::TrayNotification, t0));
        h.app.handle(AppEvent::InputArmed(WheelOrigin::RawInput, t0));
        let fx = h.app.handle(AppEvent::ProbeElapsed(t0 + crate::input::PROBE_WINDOW));
        assert_eq!(fx, vec![Effect::ArmInput(WheelOrigin::LowLevelHook)]);
    }

    #[test]
    fn schedule_edit_is_validated_and_applied() {
        let mut h = harness(21, 0);
        h.app.handle(AppEvent::Started);
        let fx = h.app.handle(AppEvent::ScheduleEdited("nonsense".into()));
        assert!(matches!(fx.as_slice(), [Effect::Notify { .. }]));

        h.app.handle(AppEvent::ScheduleEdited("08:00,22:00,55,20".into()));
        let saved = on_disk(&h);
        assert_eq!((saved.day, saved.night), (55, 20));
        assert_eq!(h.helper.calls(), vec![30, 55]);
    }

    #[test]
    fn theme_change_is_persisted() {
        let mut h = harness(12, 0);
        let fx = h
            .app
            .handle(AppEvent::MenuActionSelected(MenuAction::SetTheme(Theme::Light)));
        assert_eq!(fx, vec![Effect::ApplyTheme(Theme::Light)]);
        assert_eq!(on_disk(&h).theme, Theme::Light);
    }
}
