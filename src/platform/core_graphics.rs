//! macOS backend over CoreGraphics display services.
//!
//! The frameworks are loaded at runtime, so this module builds on every target
//! and fails with [`EngineError::LibraryLoad`] where CoreGraphics is absent.

use crate::display::{
    DisplayBackend, DisplayId, ListenerToken, ReconfigurationEvent, ReconfigurationHandler,
    ReconfigurationPhase,
};
use crate::error::EngineError;
use crate::tables::{GammaTables, TABLE_SIZE};

use libloading::{Library, Symbol};
use log::{debug, trace};
use std::cell::{Cell, RefCell};
use std::ffi::c_void;

const CORE_GRAPHICS_PATH: &str = "/System/Library/Frameworks/CoreGraphics.framework/CoreGraphics";
const CORE_FOUNDATION_PATH: &str =
    "/System/Library/Frameworks/CoreFoundation.framework/CoreFoundation";

/// `kCGDisplayBeginConfigurationFlag`
const BEGIN_CONFIGURATION_FLAG: u32 = 1 << 0;

const CG_SUCCESS: i32 = 0;

type CGDirectDisplayID = u32;
type CGError = i32;
type CFStringRef = *const c_void;
type ReconfigurationCallback = unsafe extern "C" fn(CGDirectDisplayID, u32, *mut c_void);

type GetOnlineDisplayListFn =
    unsafe extern "C" fn(u32, *mut CGDirectDisplayID, *mut u32) -> CGError;
type SetDisplayTransferByTableFn =
    unsafe extern "C" fn(CGDirectDisplayID, u32, *const f32, *const f32, *const f32) -> CGError;
type RestoreColorSyncSettingsFn = unsafe extern "C" fn();
type ReconfigurationCallbackFn =
    unsafe extern "C" fn(ReconfigurationCallback, *mut c_void) -> CGError;
type RunLoopRunInModeFn = unsafe extern "C" fn(CFStringRef, f64, u8) -> i32;

impl ReconfigurationPhase {
    fn from_cg_flags(flags: u32) -> Self {
        if flags & BEGIN_CONFIGURATION_FLAG != 0 {
            Self::Begin
        } else {
            Self::End
        }
    }
}

unsafe extern "C" fn reconfiguration_callback(
    display: CGDirectDisplayID,
    flags: u32,
    user_info: *mut c_void,
) {
    if user_info.is_null() {
        return;
    }
    // Safety: user_info is the boxed handler registered below; it is freed only
    // after CoreGraphics has removed the callback.
    let handler = unsafe { &*(user_info as *const ReconfigurationHandler) };
    handler(ReconfigurationEvent {
        display: DisplayId::new(u64::from(display)),
        phase: ReconfigurationPhase::from_cg_flags(flags),
    });
}

struct Registration {
    token: ListenerToken,
    handler: *mut ReconfigurationHandler,
}

/// Display backend for macOS.
///
/// Reconfiguration callbacks are delivered through the current thread's run
/// loop, which [`dispatch_pending`](DisplayBackend::dispatch_pending) pumps.
/// Keep this backend on the thread that runs the engine.
pub struct CoreGraphicsDisplays {
    core_graphics: Library,
    core_foundation: Library,
    registrations: RefCell<Vec<Registration>>,
    next_token: Cell<u64>,
}

impl CoreGraphicsDisplays {
    /// Load CoreGraphics and CoreFoundation.
    ///
    /// # Errors
    /// [`EngineError::LibraryLoad`] if either framework cannot be loaded.
    pub fn load() -> Result<Self, EngineError> {
        let (core_graphics, core_foundation) = unsafe {
            (
                Library::new(CORE_GRAPHICS_PATH)?,
                Library::new(CORE_FOUNDATION_PATH)?,
            )
        };
        debug!("loaded CoreGraphics display services");

        Ok(Self {
            core_graphics,
            core_foundation,
            registrations: RefCell::new(Vec::new()),
            next_token: Cell::new(0),
        })
    }

    fn remove_callback(&self, handler: *mut ReconfigurationHandler) -> Result<(), EngineError> {
        let code = unsafe {
            let remove: Symbol<ReconfigurationCallbackFn> = self
                .core_graphics
                .get(b"CGDisplayRemoveReconfigurationCallback")?;
            remove(reconfiguration_callback, handler as *mut c_void)
        };
        if code != CG_SUCCESS {
            return Err(EngineError::RegistrationFailed(code));
        }
        // Safety: CoreGraphics no longer holds the pointer.
        drop(unsafe { Box::from_raw(handler) });
        Ok(())
    }
}

impl DisplayBackend for CoreGraphicsDisplays {
    fn online_displays(&self) -> Result<Vec<DisplayId>, EngineError> {
        unsafe {
            let list: Symbol<GetOnlineDisplayListFn> =
                self.core_graphics.get(b"CGGetOnlineDisplayList")?;

            let mut count = 0u32;
            let code = list(0, std::ptr::null_mut(), &mut count);
            if code != CG_SUCCESS {
                return Err(EngineError::EnumerationFailed(code));
            }
            if count == 0 {
                return Ok(Vec::new());
            }

            let mut displays: Vec<CGDirectDisplayID> = vec![0; count as usize];
            let code = list(count, displays.as_mut_ptr(), &mut count);
            if code != CG_SUCCESS {
                return Err(EngineError::EnumerationFailed(code));
            }
            displays.truncate(count as usize);

            Ok(displays
                .into_iter()
                .map(|id| DisplayId::new(u64::from(id)))
                .collect())
        }
    }

    fn set_transfer_table(
        &self,
        display: DisplayId,
        tables: &GammaTables,
    ) -> Result<(), EngineError> {
        let code = unsafe {
            let set: Symbol<SetDisplayTransferByTableFn> =
                self.core_graphics.get(b"CGSetDisplayTransferByTable")?;
            set(
                display.raw() as CGDirectDisplayID,
                TABLE_SIZE as u32,
                tables.red.as_ptr(),
                tables.green.as_ptr(),
                tables.blue.as_ptr(),
            )
        };
        if code != CG_SUCCESS {
            return Err(EngineError::TablePushRejected { display, code });
        }
        Ok(())
    }

    fn restore_color_settings(&self) -> Result<(), EngineError> {
        unsafe {
            let restore: Symbol<RestoreColorSyncSettingsFn> =
                self.core_graphics.get(b"CGDisplayRestoreColorSyncSettings")?;
            restore();
        }
        Ok(())
    }

    fn register_reconfiguration(
        &self,
        handler: ReconfigurationHandler,
    ) -> Result<ListenerToken, EngineError> {
        let handler = Box::into_raw(Box::new(handler));
        let registered = unsafe {
            self.core_graphics
                .get::<ReconfigurationCallbackFn>(b"CGDisplayRegisterReconfigurationCallback")
                .map(|register| register(reconfiguration_callback, handler as *mut c_void))
        };

        let code = match registered {
            Ok(code) => code,
            Err(e) => {
                drop(unsafe { Box::from_raw(handler) });
                return Err(e.into());
            }
        };
        if code != CG_SUCCESS {
            drop(unsafe { Box::from_raw(handler) });
            return Err(EngineError::RegistrationFailed(code));
        }

        self.next_token.set(self.next_token.get() + 1);
        let token = ListenerToken::new(self.next_token.get());
        self.registrations
            .borrow_mut()
            .push(Registration { token, handler });
        Ok(token)
    }

    fn unregister_reconfiguration(&self, token: ListenerToken) -> Result<(), EngineError> {
        let handler = {
            let mut registrations = self.registrations.borrow_mut();
            match registrations.iter().position(|r| r.token == token) {
                Some(index) => registrations.remove(index).handler,
                None => return Ok(()),
            }
        };
        self.remove_callback(handler)
    }

    fn dispatch_pending(&self) {
        let result = unsafe {
            self.core_foundation
                .get::<RunLoopRunInModeFn>(b"CFRunLoopRunInMode")
                .and_then(|run| {
                    let mode: Symbol<*const CFStringRef> =
                        self.core_foundation.get(b"kCFRunLoopDefaultMode")?;
                    Ok(run(**mode, 0.0, 1))
                })
        };
        if let Err(e) = result {
            trace!("run loop pump unavailable: {}", e);
        }
    }

    fn needs_event_pump(&self) -> bool {
        true
    }
}

impl Drop for CoreGraphicsDisplays {
    fn drop(&mut self) {
        let registrations = std::mem::take(self.registrations.get_mut());
        for registration in registrations {
            if let Err(e) = self.remove_callback(registration.handler) {
                debug!("leaking reconfiguration handler: {}", e);
            }
        }
    }
}
