//! F12 emergency stop, read straight from the keyboard devices so it works
//! whichever window has focus (including while the loop is typing into the
//! game).

use log::{error, info, warn};
use tokio::sync::mpsc;

use crate::game_loop::LoopController;

/// Watch every keyboard for F12 and stop the loop when it is pressed.
pub fn spawn_emergency_stop(controller: LoopController) {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    let watched = watch_keyboards(tx);
    if watched == 0 {
        warn!("F12 emergency stop unavailable: no readable keyboard devices");
        return;
    }
    info!("F12 emergency stop armed on {watched} device(s)");

    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            if !controller.is_running().await {
                continue;
            }
            warn!("F12 pressed, stopping loop");
            if let Err(err) = controller.stop().await {
                error!("Emergency stop failed: {err:#}");
            }
        }
    });
}

#[cfg(target_os = "linux")]
fn watch_keyboards(tx: mpsc::UnboundedSender<()>) -> usize {
    use evdev::Key;

    let mut watched = 0;
    for (path, mut device) in evdev::enumerate() {
        let has_f12 = device
            .supported_keys()
            .map_or(false, |keys| keys.contains(Key::KEY_F12));
        if !has_f12 {
            continue;
        }

        let name = device.name().unwrap_or("?").to_string();
        let tx = tx.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("hotkey-{}", path.display()))
            .spawn(move || loop {
                match device.fetch_events() {
                    Ok(events) => {
                        for event in events {
                            if is_stop_press(&event) && tx.send(()).is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        warn!("Stopped watching {name} for F12: {err}");
                        return;
                    }
                }
            });
        match spawned {
            Ok(_) => watched += 1,
            Err(err) => warn!("Could not spawn hotkey thread for {}: {err}", path.display()),
        }
    }
    watched
}

#[cfg(target_os = "linux")]
fn is_stop_press(event: &evdev::InputEvent) -> bool {
    // value 1 is the initial press; 2 (autorepeat) and 0 (release) are ignored
    event.event_type() == evdev::EventType::KEY
        && event.code() == evdev::Key::KEY_F12.code()
        && event.value() == 1
}

#[cfg(not(target_os = "linux"))]
fn watch_keyboards(_tx: mpsc::UnboundedSender<()>) -> usize {
    0
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use evdev::{EventType, InputEvent, Key};

    #[test]
    fn only_f12_press_stops() {
        let press = InputEvent::new(EventType::KEY, Key::KEY_F12.code(), 1);
        let repeat = InputEvent::new(EventType::KEY, Key::KEY_F12.code(), 2);
        let other = InputEvent::new(EventType::KEY, Key::KEY_F11.code(), 1);
        assert!(is_stop_press(&press));
        assert!(!is_stop_press(&repeat));
        assert!(!is_stop_press(&other));
    }
}
