use crate::errors::ClickError;
use crate::routine::MouseButton;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
    Other,
}

impl PointerButton {
    /// Buttons the recorder turns into events.
    pub fn actionable(self) -> Option<MouseButton> {
        match self {
            Self::Left => Some(MouseButton::Left),
            Self::Right => Some(MouseButton::Right),
            Self::Middle | Self::Other => None,
        }
    }
}

impl From<MouseButton> for PointerButton {
    fn from(value: MouseButton) -> Self {
        match value {
            MouseButton::Left => Self::Left,
            MouseButton::Right => Self::Right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Escape,
    F(u8),
    Space,
    Enter,
    Tab,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    Pause,
    ScrollLock,
    PrintScreen,
    CapsLock,
    Shift,
    Ctrl,
    Alt,
    Cmd,
    Char(char),
    Unknown,
}

impl Key {
    pub fn name(self) -> String {
        let fixed = match self {
            Self::Escape => "esc",
            Self::F(n) => return format!("f{n}"),
            Self::Space => "space",
            Self::Enter => "enter",
            Self::Tab => "tab",
            Self::Backspace => "backspace",
            Self::Delete => "delete",
            Self::Insert => "insert",
            Self::Home => "home",
            Self::End => "end",
            Self::PageUp => "page_up",
            Self::PageDown => "page_down",
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
            Self::Pause => "pause",
            Self::ScrollLock => "scroll_lock",
            Self::PrintScreen => "print_screen",
            Self::CapsLock => "caps_lock",
            Self::Shift => "shift",
            Self::Ctrl => "ctrl",
            Self::Alt => "alt",
            Self::Cmd => "cmd",
            Self::Char(c) => return c.to_string(),
            Self::Unknown => "unknown",
        };
        fixed.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    ButtonPress { button: PointerButton, x: i32, y: i32 },
    ButtonRelease { button: PointerButton, x: i32, y: i32 },
    KeyPress(Key),
}

pub type InputHandler = Box<dyn FnMut(&InputEvent) + Send>;

/// A live registration with an `InputSource`. Dropping it stops delivery.
#[derive(Debug)]
pub struct Subscription {
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn cancel(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// A handle that can end the subscription from inside its own handler.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            active: Arc::clone(&self.active),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Debug, Clone)]
pub struct CancelHandle {
    active: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

pub trait InputSource: Send + Sync {
    fn subscribe(&self, handler: InputHandler) -> Result<Subscription, ClickError>;
}

/// Not required to be `Send`; see `DeviceFactory`.
pub trait PointerDevice {
    fn move_to(&mut self, x: i32, y: i32) -> Result<(), ClickError>;
    fn press(&mut self, button: MouseButton) -> Result<(), ClickError>;
    fn release(&mut self, button: MouseButton) -> Result<(), ClickError>;
}

/// Builds the pointer device on the thread that will drive it.
pub type DeviceFactory = Box<dyn FnOnce() -> Result<Box<dyn PointerDevice>, ClickError> + Send>;

type Entry = (Arc<AtomicBool>, InputHandler);

/// Fan-out list shared by input sources. Handlers may cancel themselves or
/// subscribe new handlers while an event is being dispatched.
#[derive(Default)]
pub struct SubscriberList {
    entries: Mutex<Vec<Entry>>,
}

impl SubscriberList {
    pub fn add(&self, handler: InputHandler) -> Subscription {
        let active = Arc::new(AtomicBool::new(true));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((Arc::clone(&active), handler));
        Subscription { active }
    }

    pub fn dispatch(&self, event: &InputEvent) {
        let mut taken =
            std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner));
        for (active, handler) in taken.iter_mut() {
            if active.load(Ordering::SeqCst) {
                handler(event);
            }
        }
        taken.retain(|(active, _)| active.load(Ordering::SeqCst));

        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let added = std::mem::take(&mut *guard);
        *guard = taken;
        guard.extend(added);
    }

    pub fn active_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(active, _)| active.load(Ordering::SeqCst))
            .count()
    }
}

#[derive(Default, Clone)]
pub struct FakeInputSource {
    subscribers: Arc<SubscriberList>,
    fail_next: Arc<Mutex<Option<ClickError>>>,
}

impl FakeInputSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_next(&self, error: ClickError) {
        *self.fail_next.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    pub fn emit(&self, event: InputEvent) {
        self.subscribers.dispatch(&event);
    }

    pub fn press(&self, button: PointerButton, x: i32, y: i32) {
        self.emit(InputEvent::ButtonPress { button, x, y });
    }

    pub fn release(&self, button: PointerButton, x: i32, y: i32) {
        self.emit(InputEvent::ButtonRelease { button, x, y });
    }

    pub fn key(&self, key: Key) {
        self.emit(InputEvent::KeyPress(key));
    }

    pub fn active_subscribers(&self) -> usize {
        self.subscribers.active_count()
    }
}

impl InputSource for FakeInputSource {
    fn subscribe(&self, handler: InputHandler) -> Result<Subscription, ClickError> {
        if let Some(err) = self
            .fail_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(err);
        }
        Ok(self.subscribers.add(handler))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    MoveTo(i32, i32),
    Press(MouseButton),
    Release(MouseButton),
}

type MoveHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Pointer that records every call. Clones share the same log.
#[derive(Default, Clone)]
pub struct FakePointer {
    actions: Arc<Mutex<Vec<PointerAction>>>,
    calls: Arc<AtomicUsize>,
    on_move: Option<MoveHook>,
    fail_on_call: Option<usize>,
}

impl FakePointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `hook(n)` after the n-th (1-based) successful move.
    pub fn with_move_hook(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_move = Some(Arc::new(hook));
        self
    }

    /// Makes the n-th (1-based) device call fail.
    pub fn failing_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub fn actions(&self) -> Vec<PointerAction> {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn presses(&self) -> usize {
        self.actions()
            .iter()
            .filter(|a| matches!(a, PointerAction::Press(_)))
            .count()
    }

    pub fn releases(&self) -> usize {
        self.actions()
            .iter()
            .filter(|a| matches!(a, PointerAction::Release(_)))
            .count()
    }

    pub fn factory(&self) -> DeviceFactory {
        let device = self.clone();
        Box::new(move || Ok(Box::new(device) as Box<dyn PointerDevice>))
    }

    fn record(&self, action: PointerAction) -> Result<usize, ClickError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(ClickError::Device(format!("injected failure on {action:?}")));
        }
        let mut actions = self.actions.lock().unwrap_or_else(PoisonError::into_inner);
        actions.push(action);
        Ok(actions
            .iter()
            .filter(|a| matches!(a, PointerAction::MoveTo(..)))
            .count())
    }
}

impl PointerDevice for FakePointer {
    fn move_to(&mut self, x: i32, y: i32) -> Result<(), ClickError> {
        let moves = self.record(PointerAction::MoveTo(x, y))?;
        if let Some(hook) = &self.on_move {
            hook(moves);
        }
        Ok(())
    }

    fn press(&mut self, button: MouseButton) -> Result<(), ClickError> {
        self.record(PointerAction::Press(button)).map(|_| ())
    }

    fn release(&mut self, button: MouseButton) -> Result<(), ClickError> {
        self.record(PointerAction::Release(button)).map(|_| ())
    }
}
