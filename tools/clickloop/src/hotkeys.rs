use crate::errors::ClickError;
use crate::input::{InputEvent, InputSource, Key, PointerButton, Subscription};
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

pub const DEFAULT_PLAY_KEY: Key = Key::F(9);
pub const DEFAULT_EXIT_KEY: Key = Key::Escape;
pub const DEFAULT_STOP_TRIGGER: Trigger = Trigger::MiddleButton;

/// What ends a recording: the middle mouse button or a keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    MiddleButton,
    Key(Key),
}

impl Trigger {
    /// Config spelling, accepted back by `parse_trigger`.
    pub fn name(self) -> String {
        match self {
            Self::MiddleButton => "middle".to_string(),
            Self::Key(key) => key.name(),
        }
    }

    /// Wording for status lines.
    pub fn describe(self) -> String {
        match self {
            Self::MiddleButton => "Middle Click".to_string(),
            Self::Key(key) => key.name(),
        }
    }

    pub fn matches(self, event: &InputEvent) -> bool {
        match (self, event) {
            (
                Self::MiddleButton,
                InputEvent::ButtonPress {
                    button: PointerButton::Middle,
                    ..
                },
            ) => true,
            (Self::Key(expected), InputEvent::KeyPress(key)) => expected == *key,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    TogglePlay,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyBinding {
    pub trigger: Trigger,
    pub action: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyBindings {
    pub play_pause: Key,
    pub exit: Key,
    pub stop_record: Trigger,
}

impl Default for HotkeyBindings {
    fn default() -> Self {
        Self {
            play_pause: DEFAULT_PLAY_KEY,
            exit: DEFAULT_EXIT_KEY,
            stop_record: DEFAULT_STOP_TRIGGER,
        }
    }
}

impl HotkeyBindings {
    pub fn bindings(&self) -> Vec<HotkeyBinding> {
        vec![
            HotkeyBinding {
                trigger: Trigger::Key(self.play_pause),
                action: "play/pause",
            },
            HotkeyBinding {
                trigger: Trigger::Key(self.exit),
                action: "exit",
            },
            HotkeyBinding {
                trigger: self.stop_record,
                action: "stop recording",
            },
        ]
    }

    pub fn controls_legend(&self) -> String {
        format_bindings("Keys: ", &self.bindings())
    }

    pub fn action_for_key(&self, key: Key) -> Option<HotkeyAction> {
        if key == self.play_pause {
            Some(HotkeyAction::TogglePlay)
        } else if key == self.exit {
            Some(HotkeyAction::Exit)
        } else {
            None
        }
    }
}

fn format_bindings(prefix: &str, bindings: &[HotkeyBinding]) -> String {
    let parts = bindings
        .iter()
        .map(|binding| format!("{} {}", binding.trigger.name(), binding.action))
        .collect::<Vec<_>>();
    format!("{prefix}{}", parts.join("  "))
}

/// Parses a key name such as `f8`, `esc`, `page_up` or a single character.
pub fn parse_key(input: &str) -> Option<Key> {
    let s = input.trim().to_ascii_lowercase();
    let key = match s.as_str() {
        "esc" | "escape" => Key::Escape,
        "space" => Key::Space,
        "enter" | "return" => Key::Enter,
        "tab" => Key::Tab,
        "backspace" => Key::Backspace,
        "delete" => Key::Delete,
        "insert" => Key::Insert,
        "home" => Key::Home,
        "end" => Key::End,
        "page_up" | "pageup" => Key::PageUp,
        "page_down" | "pagedown" => Key::PageDown,
        "up" => Key::Up,
        "down" => Key::Down,
        "left" => Key::Left,
        "right" => Key::Right,
        "pause" => Key::Pause,
        "scroll_lock" => Key::ScrollLock,
        "print_screen" => Key::PrintScreen,
        "caps_lock" => Key::CapsLock,
        "shift" => Key::Shift,
        "ctrl" => Key::Ctrl,
        "alt" => Key::Alt,
        "cmd" => Key::Cmd,
        other => {
            if let Some(n) = other.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                if (1..=24).contains(&n) {
                    return Some(Key::F(n));
                }
                return None;
            }
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Char(c),
                _ => return None,
            }
        }
    };
    Some(key)
}

pub fn parse_hotkey(input: &str, default: Key) -> Key {
    parse_key(input).unwrap_or(default)
}

/// Like `parse_key`, plus `middle` for the middle mouse button.
pub fn parse_trigger(input: &str) -> Option<Trigger> {
    if input.trim().eq_ignore_ascii_case("middle") {
        return Some(Trigger::MiddleButton);
    }
    parse_key(input).map(Trigger::Key)
}

/// Forwards bound key presses over a channel; dropping it unsubscribes.
pub struct HotkeyListener {
    subscription: Subscription,
}

impl HotkeyListener {
    pub fn start(
        source: &dyn InputSource,
        bindings: HotkeyBindings,
    ) -> Result<(Self, Receiver<HotkeyAction>), ClickError> {
        let (tx, rx) = mpsc::channel();
        let subscription = source.subscribe(Box::new(move |event| {
            if let InputEvent::KeyPress(key) = event {
                if let Some(action) = bindings.action_for_key(*key) {
                    let _ = tx.send(action);
                }
            }
        }))?;
        Ok((Self { subscription }, rx))
    }

    pub fn stop(&self) {
        self.subscription.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }
}

/// Waits for the next key press (or middle click when `allow_mouse`).
/// `Ok(None)` means nothing arrived before `timeout`.
pub fn capture_next_trigger(
    source: &dyn InputSource,
    allow_mouse: bool,
    timeout: Duration,
) -> Result<Option<Trigger>, ClickError> {
    let (tx, rx) = mpsc::channel();
    let subscription = source.subscribe(Box::new(move |event| {
        let captured = match *event {
            InputEvent::KeyPress(Key::Unknown) => None,
            InputEvent::KeyPress(key) => Some(Trigger::Key(key)),
            InputEvent::ButtonPress {
                button: PointerButton::Middle,
                ..
            } if allow_mouse => Some(Trigger::MiddleButton),
            _ => None,
        };
        if let Some(trigger) = captured {
            let _ = tx.send(trigger);
        }
    }))?;
    let captured = rx.recv_timeout(timeout).ok();
    subscription.cancel();
    Ok(captured)
}
