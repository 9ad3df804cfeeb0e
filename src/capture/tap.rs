//! CGEventTap capture backend.
//!
//! Each handle owns a session-level listen-only tap on a dedicated thread
//! with its own CFRunLoop. The tap callback translates keyboard events into
//! [`RawKeyEvent`]s and forwards them to the shared capture callback without
//! blocking. Enable, disable, and health checks go through the tap's mach
//! port, so they work from any thread while the run loop keeps spinning.

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use core_foundation::base::TCFType;
use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
    EventField,
};
use tracing::{error, info, warn};

use super::{CaptureHandle, EventCallback};
use crate::error::{KeychordError, Result};
use crate::event::{KeyEventKind, Modifiers, RawKeyEvent};
use crate::keymap;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventTapIsEnabled(tap: *mut c_void) -> bool;
    fn CGEventTapEnable(tap: *mut c_void, enable: bool);
}

const NSEVENT_FLAG_SHIFT: u64 = 1 << 17;
const NSEVENT_FLAG_CONTROL: u64 = 1 << 18;
const NSEVENT_FLAG_ALT: u64 = 1 << 19;
const NSEVENT_FLAG_COMMAND: u64 = 1 << 20;

fn modifiers_from_flags(flags: u64) -> Modifiers {
    let mut mods = Modifiers::empty();
    if flags & NSEVENT_FLAG_SHIFT != 0 {
        mods |= Modifiers::SHIFT;
    }
    if flags & NSEVENT_FLAG_CONTROL != 0 {
        mods |= Modifiers::CONTROL;
    }
    if flags & NSEVENT_FLAG_ALT != 0 {
        mods |= Modifiers::ALT;
    }
    if flags & NSEVENT_FLAG_COMMAND != 0 {
        mods |= Modifiers::META;
    }
    mods
}

pub struct EventTapHandle {
    label: &'static str,
    /// CFMachPortRef of the installed tap. Written once by the tap thread.
    port: AtomicUsize,
    /// Mirrors tap health as seen by the callback, so a timeout-disable is
    /// visible to health checks immediately.
    believed_enabled: Arc<AtomicBool>,
}

impl EventTapHandle {
    /// Spawn the tap thread and wait for the tap to install. Fails when the
    /// tap cannot be created, usually for missing Accessibility permission.
    pub fn install(label: &'static str, callback: EventCallback) -> Result<Arc<Self>> {
        let handle = Arc::new(EventTapHandle {
            label,
            port: AtomicUsize::new(0),
            believed_enabled: Arc::new(AtomicBool::new(false)),
        });

        let (ready_tx, ready_rx) = mpsc::channel::<Result<usize>>();
        let believed = Arc::clone(&handle.believed_enabled);
        thread::Builder::new()
            .name(format!("capture-{label}"))
            .spawn(move || run_tap_thread(label, callback, believed, ready_tx))
            .map_err(|e| KeychordError::Capture(format!("{label}: spawn failed: {e}")))?;

        let port = ready_rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| KeychordError::Capture(format!("{label}: install timed out")))??;
        handle.port.store(port, Ordering::Release);
        info!(handle = label, "Event tap installed");
        Ok(handle)
    }

    fn port_ptr(&self) -> Option<*mut c_void> {
        let port = self.port.load(Ordering::Acquire);
        (port != 0).then_some(port as *mut c_void)
    }
}

impl CaptureHandle for EventTapHandle {
    fn enable(&self) -> Result<()> {
        let port = self
            .port_ptr()
            .ok_or_else(|| KeychordError::Capture(format!("{}: tap not installed", self.label)))?;
        unsafe { CGEventTapEnable(port, true) };
        if unsafe { CGEventTapIsEnabled(port) } {
            self.believed_enabled.store(true, Ordering::Release);
            Ok(())
        } else {
            Err(KeychordError::Capture(format!(
                "{}: tap refused to re-enable",
                self.label
            )))
        }
    }

    fn disable(&self) {
        if let Some(port) = self.port_ptr() {
            unsafe { CGEventTapEnable(port, false) };
        }
        self.believed_enabled.store(false, Ordering::Release);
    }

    fn is_enabled(&self) -> bool {
        // A timeout-disable seen by the callback short-circuits here without
        // touching the mach port.
        if !self.believed_enabled.load(Ordering::Acquire) {
            return false;
        }
        match self.port_ptr() {
            Some(port) => unsafe { CGEventTapIsEnabled(port) },
            None => false,
        }
    }

    fn label(&self) -> &'static str {
        self.label
    }
}

fn run_tap_thread(
    label: &'static str,
    callback: EventCallback,
    believed_enabled: Arc<AtomicBool>,
    ready_tx: mpsc::Sender<Result<usize>>,
) {
    let believed_in_cb = Arc::clone(&believed_enabled);
    // Tap callback: translate and forward, nothing else. Character comes
    // from the fixed physical table; layout-aware lookup is not safe here.
    let tap_callback = move |_proxy: core_graphics::event::CGEventTapProxy,
                             event_type: CGEventType,
                             event: &CGEvent|
          -> Option<CGEvent> {
        match event_type {
            CGEventType::KeyDown | CGEventType::KeyUp | CGEventType::FlagsChanged => {
                let keycode =
                    event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
                let modifiers = modifiers_from_flags(event.get_flags().bits());
                let kind = match event_type {
                    CGEventType::KeyDown => KeyEventKind::Down,
                    CGEventType::KeyUp => KeyEventKind::Up,
                    _ => KeyEventKind::FlagsChanged,
                };
                let character =
                    keymap::physical_char(keycode, modifiers.contains(Modifiers::SHIFT));
                (callback)(RawKeyEvent {
                    kind,
                    keycode,
                    character,
                    modifiers,
                });
            }
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                warn!(handle = label, "Event tap disabled by the system");
                believed_in_cb.store(false, Ordering::Release);
            }
            _ => {}
        }
        Some(event.clone())
    };

    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![
            CGEventType::KeyDown,
            CGEventType::KeyUp,
            CGEventType::FlagsChanged,
        ],
        tap_callback,
    ) {
        Ok(tap) => tap,
        Err(_) => {
            error!(
                handle = label,
                "Could not create event tap, check Accessibility permission"
            );
            let _ = ready_tx.send(Err(KeychordError::Capture(format!(
                "{label}: event tap creation failed"
            ))));
            return;
        }
    };

    let source = match tap.mach_port.create_runloop_source(0) {
        Ok(source) => source,
        Err(_) => {
            let _ = ready_tx.send(Err(KeychordError::Capture(format!(
                "{label}: run loop source creation failed"
            ))));
            return;
        }
    };
    unsafe {
        CFRunLoop::get_current().add_source(&source, kCFRunLoopCommonModes);
    }

    let port = tap.mach_port.as_concrete_TypeRef() as usize;
    believed_enabled.store(false, Ordering::Release);
    if ready_tx.send(Ok(port)).is_err() {
        return;
    }

    // The tap stays installed for the life of the process; enable state is
    // toggled externally through the mach port.
    loop {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, Duration::from_millis(250), true);
        }
    }
}
