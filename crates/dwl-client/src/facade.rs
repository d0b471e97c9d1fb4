//! Component H — Update-State Facade wiring.
//!
//! [`dwl_core::event::UpdateStateFacade`] is the pure state-folding logic;
//! this module is the thin host-facing wrapper around it that also owns
//! the "Execute on update resource" action, which the core itself never
//! auto-advances past DOWNLOADED.

use std::sync::Mutex;

use dwl_core::event::{Event, EventSink, UpdateStateFacade};
use dwl_core::wire::{UpdateResult, UpdateState};

/// Delegate for the platform-specific apply/reboot step. The core never
/// observes its outcome beyond what the hook reports back through
/// [`PlatformUpdateHook::execute`] — it does not re-enter DOWNLOADING or
/// VERIFYING on its own.
pub trait PlatformUpdateHook: Send + Sync {
    fn execute(&self) -> Result<(), String>;
}

/// A hook that always fails, for hosts with no platform apply step wired
/// up yet.
pub struct UnimplementedUpdateHook;

impl PlatformUpdateHook for UnimplementedUpdateHook {
    fn execute(&self) -> Result<(), String> {
        Err("no platform update hook configured".to_string())
    }
}

/// Owns the facade and the platform hook, and implements [`EventSink`] so
/// the download controller can feed it events directly.
pub struct FacadeHost {
    facade: Mutex<UpdateStateFacade>,
    hook: Box<dyn PlatformUpdateHook>,
}

impl FacadeHost {
    pub fn new(hook: Box<dyn PlatformUpdateHook>) -> Self {
        Self { facade: Mutex::new(UpdateStateFacade::default()), hook }
    }

    pub fn snapshot(&self) -> UpdateStateFacade {
        self.facade.lock().expect("facade mutex poisoned").clone()
    }

    /// A write to the `package_uri` resource: starts or resets a download.
    pub fn initiate(&self, uri: String) {
        self.facade.lock().expect("facade mutex poisoned").initiate(uri);
    }

    /// Execute on the `update` resource (§4.H): transitions to UPDATING
    /// and delegates to the platform hook. Only valid from DOWNLOADED;
    /// any other state is a no-op that reports `UnsupportedType` so the
    /// caller can tell the execute was rejected, not silently ignored.
    pub fn execute_update(&self) -> UpdateResult {
        {
            let mut facade = self.facade.lock().expect("facade mutex poisoned");
            if facade.state != UpdateState::Downloaded {
                return UpdateResult::UnsupportedType;
            }
        }
        self.on_event(&Event::UpdateStarted);

        match self.hook.execute() {
            Ok(()) => {
                self.on_event(&Event::UpdateFinished);
                UpdateResult::Success
            }
            Err(_) => {
                let reason = UpdateResult::UpdateFailed;
                self.on_event(&Event::UpdateFailed { reason });
                reason
            }
        }
    }
}

impl EventSink for FacadeHost {
    fn on_event(&self, event: &Event) {
        self.facade.lock().expect("facade mutex poisoned").apply(event);
    }
}
