use crate::errors::ClickError;
use crate::input::{DeviceFactory, InputSource};
use std::sync::Arc;

#[cfg(feature = "native-input")]
pub use native::EnigoPointer;

/// Process-wide input source. The first call starts the listener thread.
pub fn native_input() -> Result<Arc<dyn InputSource>, ClickError> {
    #[cfg(feature = "native-input")]
    {
        native::hub()
    }
    #[cfg(not(feature = "native-input"))]
    {
        Err(unavailable())
    }
}

pub fn native_pointer_factory() -> DeviceFactory {
    #[cfg(feature = "native-input")]
    {
        Box::new(|| {
            native::EnigoPointer::new()
                .map(|pointer| Box::new(pointer) as Box<dyn crate::input::PointerDevice>)
        })
    }
    #[cfg(not(feature = "native-input"))]
    {
        Box::new(|| Err(unavailable()))
    }
}

/// Pointer position as seen by the listener. rdev only reports coordinates on
/// move events, so until the first one arrives `locate` is asked instead.
#[cfg_attr(not(feature = "native-input"), allow(dead_code))]
pub(crate) struct PointerTracker<F> {
    last_move: Option<(i32, i32)>,
    locate: F,
}

#[cfg_attr(not(feature = "native-input"), allow(dead_code))]
impl<F: FnMut() -> Option<(i32, i32)>> PointerTracker<F> {
    pub(crate) fn new(locate: F) -> Self {
        Self {
            last_move: None,
            locate,
        }
    }

    pub(crate) fn moved(&mut self, x: f64, y: f64) {
        self.last_move = Some((x.round() as i32, y.round() as i32));
    }

    pub(crate) fn position(&mut self) -> (i32, i32) {
        match self.last_move {
            Some(position) => position,
            None => (self.locate)().unwrap_or((0, 0)),
        }
    }
}

#[cfg(not(feature = "native-input"))]
fn unavailable() -> ClickError {
    ClickError::InputUnavailable(
        "clickloop was built without the `native-input` feature".to_string(),
    )
}

#[cfg(feature = "native-input")]
mod native {
    use crate::errors::ClickError;
    use crate::input::{
        InputEvent, InputHandler, InputSource, Key, PointerButton, PointerDevice,
        SubscriberList, Subscription,
    };
    use super::PointerTracker;
    use crate::routine::MouseButton;
    use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};
    use rdev::{EventType, Key as RawKey};
    use std::sync::mpsc::{self, RecvTimeoutError};
    use std::sync::{Arc, OnceLock};
    use std::time::Duration;

    /// `rdev::listen` reports setup failures almost immediately.
    const LISTENER_STARTUP_GRACE: Duration = Duration::from_millis(250);

    static HUB: OnceLock<Result<Arc<RdevHub>, ClickError>> = OnceLock::new();

    /// `rdev::listen` never returns once running, so a single listener thread
    /// serves every subscriber for the life of the process.
    struct RdevHub {
        subscribers: Arc<SubscriberList>,
    }

    impl InputSource for RdevHub {
        fn subscribe(&self, handler: InputHandler) -> Result<Subscription, ClickError> {
            Ok(self.subscribers.add(handler))
        }
    }

    pub(super) fn hub() -> Result<Arc<dyn InputSource>, ClickError> {
        HUB.get_or_init(start_hub)
            .clone()
            .map(|hub| hub as Arc<dyn InputSource>)
    }

    fn start_hub() -> Result<Arc<RdevHub>, ClickError> {
        let subscribers = Arc::new(SubscriberList::default());
        let dispatch = Arc::clone(&subscribers);
        let (err_tx, err_rx) = mpsc::channel::<String>();

        std::thread::Builder::new()
            .name("clickloop-input".to_string())
            .spawn(move || {
                let locator = Enigo::new(&Settings::default()).ok();
                let mut tracker =
                    PointerTracker::new(move || locator.as_ref()?.location().ok());
                let callback = move |event: rdev::Event| {
                    let translated = match event.event_type {
                        EventType::MouseMove { x, y } => {
                            tracker.moved(x, y);
                            None
                        }
                        EventType::ButtonPress(button) => {
                            let (x, y) = tracker.position();
                            Some(InputEvent::ButtonPress {
                                button: map_button(button),
                                x,
                                y,
                            })
                        }
                        EventType::ButtonRelease(button) => {
                            let (x, y) = tracker.position();
                            Some(InputEvent::ButtonRelease {
                                button: map_button(button),
                                x,
                                y,
                            })
                        }
                        EventType::KeyPress(key) => Some(InputEvent::KeyPress(map_key(key))),
                        _ => None,
                    };
                    if let Some(event) = translated {
                        dispatch.dispatch(&event);
                    }
                };
                if let Err(err) = rdev::listen(callback) {
                    let _ = err_tx.send(format!("{err:?}"));
                }
            })
            .map_err(|e| ClickError::InputUnavailable(e.to_string()))?;

        match err_rx.recv_timeout(LISTENER_STARTUP_GRACE) {
            Ok(reason) => Err(ClickError::InputUnavailable(reason)),
            Err(RecvTimeoutError::Timeout) => Ok(Arc::new(RdevHub { subscribers })),
            Err(RecvTimeoutError::Disconnected) => Err(ClickError::InputUnavailable(
                "input listener exited during startup".to_string(),
            )),
        }
    }

    fn map_button(button: rdev::Button) -> PointerButton {
        match button {
            rdev::Button::Left => PointerButton::Left,
            rdev::Button::Right => PointerButton::Right,
            rdev::Button::Middle => PointerButton::Middle,
            rdev::Button::Unknown(_) => PointerButton::Other,
        }
    }

    const CHAR_KEYS: [(RawKey, char); 36] = [
        (RawKey::KeyA, 'a'),
        (RawKey::KeyB, 'b'),
        (RawKey::KeyC, 'c'),
        (RawKey::KeyD, 'd'),
        (RawKey::KeyE, 'e'),
        (RawKey::KeyF, 'f'),
        (RawKey::KeyG, 'g'),
        (RawKey::KeyH, 'h'),
        (RawKey::KeyI, 'i'),
        (RawKey::KeyJ, 'j'),
        (RawKey::KeyK, 'k'),
        (RawKey::KeyL, 'l'),
        (RawKey::KeyM, 'm'),
        (RawKey::KeyN, 'n'),
        (RawKey::KeyO, 'o'),
        (RawKey::KeyP, 'p'),
        (RawKey::KeyQ, 'q'),
        (RawKey::KeyR, 'r'),
        (RawKey::KeyS, 's'),
        (RawKey::KeyT, 't'),
        (RawKey::KeyU, 'u'),
        (RawKey::KeyV, 'v'),
        (RawKey::KeyW, 'w'),
        (RawKey::KeyX, 'x'),
        (RawKey::KeyY, 'y'),
        (RawKey::KeyZ, 'z'),
        (RawKey::Num0, '0'),
        (RawKey::Num1, '1'),
        (RawKey::Num2, '2'),
        (RawKey::Num3, '3'),
        (RawKey::Num4, '4'),
        (RawKey::Num5, '5'),
        (RawKey::Num6, '6'),
        (RawKey::Num7, '7'),
        (RawKey::Num8, '8'),
        (RawKey::Num9, '9'),
    ];

    fn map_key(key: RawKey) -> Key {
        match key {
            RawKey::Escape => Key::Escape,
            RawKey::F1 => Key::F(1),
            RawKey::F2 => Key::F(2),
            RawKey::F3 => Key::F(3),
            RawKey::F4 => Key::F(4),
            RawKey::F5 => Key::F(5),
            RawKey::F6 => Key::F(6),
            RawKey::F7 => Key::F(7),
            RawKey::F8 => Key::F(8),
            RawKey::F9 => Key::F(9),
            RawKey::F10 => Key::F(10),
            RawKey::F11 => Key::F(11),
            RawKey::F12 => Key::F(12),
            RawKey::Space => Key::Space,
            RawKey::Return => Key::Enter,
            RawKey::Tab => Key::Tab,
            RawKey::Backspace => Key::Backspace,
            RawKey::Delete => Key::Delete,
            RawKey::Insert => Key::Insert,
            RawKey::Home => Key::Home,
            RawKey::End => Key::End,
            RawKey::PageUp => Key::PageUp,
            RawKey::PageDown => Key::PageDown,
            RawKey::UpArrow => Key::Up,
            RawKey::DownArrow => Key::Down,
            RawKey::LeftArrow => Key::Left,
            RawKey::RightArrow => Key::Right,
            RawKey::Pause => Key::Pause,
            RawKey::ScrollLock => Key::ScrollLock,
            RawKey::PrintScreen => Key::PrintScreen,
            RawKey::CapsLock => Key::CapsLock,
            RawKey::ShiftLeft | RawKey::ShiftRight => Key::Shift,
            RawKey::ControlLeft | RawKey::ControlRight => Key::Ctrl,
            RawKey::Alt | RawKey::AltGr => Key::Alt,
            RawKey::MetaLeft | RawKey::MetaRight => Key::Cmd,
            other => CHAR_KEYS
                .iter()
                .find(|(raw, _)| *raw == other)
                .map(|(_, c)| Key::Char(*c))
                .unwrap_or(Key::Unknown),
        }
    }

    pub struct EnigoPointer {
        enigo: Enigo,
    }

    impl EnigoPointer {
        pub fn new() -> Result<Self, ClickError> {
            let enigo = Enigo::new(&Settings::default())
                .map_err(|e| ClickError::Device(format!("cannot open pointer device: {e:?}")))?;
            Ok(Self { enigo })
        }
    }

    fn to_enigo(button: MouseButton) -> Button {
        match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
        }
    }

    fn device_error(e: enigo::InputError) -> ClickError {
        ClickError::Device(format!("{e:?}"))
    }

    impl PointerDevice for EnigoPointer {
        fn move_to(&mut self, x: i32, y: i32) -> Result<(), ClickError> {
            self.enigo
                .move_mouse(x, y, Coordinate::Abs)
                .map_err(device_error)
        }

        fn press(&mut self, button: MouseButton) -> Result<(), ClickError> {
            self.enigo
                .button(to_enigo(button), Direction::Press)
                .map_err(device_error)
        }

        fn release(&mut self, button: MouseButton) -> Result<(), ClickError> {
            self.enigo
                .button(to_enigo(button), Direction::Release)
                .map_err(device_error)
        }
    }
}
