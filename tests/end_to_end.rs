use std::cell::RefCell;
use std::rc::Rc;

use chrono::NaiveTime;
use hdr_sdr_brightness::app::{App, AppEvent, BrightnessSource, Effect, MenuAction};
use hdr_sdr_brightness::brightness::Helper;
use hdr_sdr_brightness::config::{load_config, ConfigStore};
use hdr_sdr_brightness::error::ApplyError;
use hdr_sdr_brightness::schedule::{Clock, ScheduleMode};

#[derive(Clone, Default)]
struct FakeHelper {
    calls: Rc<RefCell<Vec<u8>>>,
    missing: Rc<RefCell<bool>>,
}

impl Helper for FakeHelper {
    fn invoke(&mut self, percent: u8) -> Result<(), ApplyError> {
        if *self.missing.borrow() {
            return Err(ApplyError::HelperMissing);
        }
        self.calls.borrow_mut().push(percent);
        Ok(())
    }
}

struct Noon;

impl Clock for Noon {
    fn now(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(12, 0, 0).unwrap()
    }
}

#[test]
fn fresh_install_drag_and_release_persists_manual_value() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.ini");
    assert!(!path.exists());

    let defaults = load_config(&path);
    assert_eq!((defaults.manual, defaults.day, defaults.night), (50, 70, 30));
    assert!(defaults.auto_enabled);

    let helper = FakeHelper::default();
    let mut app = App::new(ConfigStore::open(&path), helper.clone(), Noon);

    app.handle(AppEvent::Started);
    assert_eq!(*helper.calls.borrow(), vec![70]);

    let fx = app.handle(AppEvent::HotkeyPressed);
    assert_eq!(fx, vec![Effect::ShowPopup { value: 70 }]);

    app.handle(AppEvent::SliderDragged(80));
    let fx = app.handle(AppEvent::SliderReleased(80));
    assert!(fx.contains(&Effect::HidePopup));
    assert!(!app.popup_open());

    assert_eq!(app.state().value, 80);
    assert_eq!(app.state().source, BrightnessSource::Manual);
    assert_eq!(app.schedule_mode(), ScheduleMode::ManualOverride);
    // Dragging already applied 80; releasing on the same value is a no-op.
    assert_eq!(*helper.calls.borrow(), vec![70, 80]);

    let saved = load_config(&path);
    assert_eq!(saved.manual, 80);
    assert!(!saved.auto_enabled);
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("Manual = 80"));
    assert!(text.contains("Enabled = 0"));

    // The schedule stays out of the way until the user turns it back on.
    app.handle(AppEvent::TimerTick);
    assert_eq!(*helper.calls.borrow(), vec![70, 80]);

    app.handle(AppEvent::MenuActionSelected(MenuAction::ToggleAuto));
    assert_eq!(app.schedule_mode(), ScheduleMode::Auto);
    assert_eq!(app.state().value, 70);
    assert!(load_config(&path).auto_enabled);
}

#[test]
fn missing_helper_is_offered_once_then_recovered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.ini");
    let helper = FakeHelper::default();
    *helper.missing.borrow_mut() = true;
    let mut app = App::new(ConfigStore::open(&path), helper.clone(), Noon);

    let fx = app.handle(AppEvent::Started);
    assert_eq!(fx, vec![Effect::OfferHelperDownload]);

    let fx = app.handle(AppEvent::HelperDownloadDeclined);
    assert!(matches!(fx.as_slice(), [Effect::Notify { .. }]));

    // Declined: ticks stay quiet.
    assert!(app.handle(AppEvent::TimerTick).is_empty());

    // "Apply now" asks again; this time the download succeeds.
    let fx = app.handle(AppEvent::MenuActionSelected(MenuAction::ApplyNow));
    assert_eq!(fx, vec![Effect::OfferHelperDownload]);
    *helper.missing.borrow_mut() = false;
    app.handle(AppEvent::HelperInstalled);

    assert_eq!(*helper.calls.borrow(), vec![70]);
}
