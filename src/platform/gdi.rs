//! Windows backend over GDI device gamma ramps.
//!
//! Windows has no global color-sync restore and no display reconfiguration
//! callback outside a window procedure. Restoring pushes the identity ramp.
//! Registration reports [`EngineError::ReconfigurationUnsupported`], so the
//! recurring reapplication alone covers topology changes.
//!
//! Stock drivers refuse ramps far from identity, so the inverted red channel
//! may be rejected outright; the engine warns when a pass is incomplete.

use crate::display::{DisplayBackend, DisplayId, ListenerToken, ReconfigurationHandler};
use crate::error::EngineError;
use crate::tables::GammaTables;

use log::debug;
use std::ffi::c_void;
use windows_sys::Win32::{
    Foundation::{GetLastError, LPARAM, RECT},
    Graphics::Gdi::{
        CreateDCW, DeleteDC, EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFO,
        MONITORINFOEXW,
    },
    UI::ColorSystem::SetDeviceGammaRamp,
};

unsafe extern "system" fn collect_monitor(
    monitor: HMONITOR,
    _hdc: HDC,
    _rect: *mut RECT,
    data: LPARAM,
) -> i32 {
    // Safety: data is the &mut Vec passed to EnumDisplayMonitors below.
    let monitors = unsafe { &mut *(data as *mut Vec<HMONITOR>) };
    monitors.push(monitor);
    1
}

/// Display backend for Windows.
#[derive(Debug, Default)]
pub struct GdiDisplays;

impl GdiDisplays {
    /// Create the backend. GDI needs no setup.
    pub fn new() -> Self {
        Self
    }

    fn device_name(monitor: HMONITOR) -> Option<[u16; 32]> {
        let mut info: MONITORINFOEXW = unsafe { std::mem::zeroed() };
        info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;
        let ok = unsafe {
            GetMonitorInfoW(monitor, &mut info as *mut MONITORINFOEXW as *mut MONITORINFO)
        };
        (ok != 0).then_some(info.szDevice)
    }

    fn push_ramps(&self, display: DisplayId, ramps: &[[u16; 256]; 3]) -> Result<(), EngineError> {
        let monitor = display.raw() as usize as HMONITOR;
        let device =
            Self::device_name(monitor).ok_or_else(|| EngineError::TablePushRejected {
                display,
                code: unsafe { GetLastError() } as i32,
            })?;

        unsafe {
            let hdc = CreateDCW(
                std::ptr::null(),
                device.as_ptr(),
                std::ptr::null(),
                std::ptr::null(),
            );
            if hdc.is_null() {
                return Err(EngineError::TablePushRejected {
                    display,
                    code: GetLastError() as i32,
                });
            }

            let ok = SetDeviceGammaRamp(hdc, ramps.as_ptr() as *const c_void);
            let code = GetLastError() as i32;
            DeleteDC(hdc);

            if ok == 0 {
                return Err(EngineError::TablePushRejected { display, code });
            }
        }
        Ok(())
    }
}

impl DisplayBackend for GdiDisplays {
    fn online_displays(&self) -> Result<Vec<DisplayId>, EngineError> {
        let mut monitors: Vec<HMONITOR> = Vec::new();
        let ok = unsafe {
            EnumDisplayMonitors(
                std::ptr::null_mut(),
                std::ptr::null(),
                Some(collect_monitor),
                &mut monitors as *mut Vec<HMONITOR> as LPARAM,
            )
        };
        if ok == 0 {
            return Err(EngineError::EnumerationFailed(unsafe { GetLastError() } as i32));
        }

        Ok(monitors
            .into_iter()
            .map(|monitor| DisplayId::new(monitor as usize as u64))
            .collect())
    }

    fn set_transfer_table(
        &self,
        display: DisplayId,
        tables: &GammaTables,
    ) -> Result<(), EngineError> {
        self.push_ramps(display, &tables.to_u16_ramps())
    }

    fn restore_color_settings(&self) -> Result<(), EngineError> {
        let identity = GammaTables::identity().to_u16_ramps();
        let mut last_error = None;
        for display in self.online_displays()? {
            if let Err(e) = self.push_ramps(display, &identity) {
                debug!("restore skipped display {}: {}", display, e);
                last_error = Some(e);
            }
        }
        match last_error {
            Some(EngineError::TablePushRejected { code, .. }) => {
                Err(EngineError::RestoreFailed(code))
            }
            _ => Ok(()),
        }
    }

    fn register_reconfiguration(
        &self,
        _handler: ReconfigurationHandler,
    ) -> Result<ListenerToken, EngineError> {
        Err(EngineError::ReconfigurationUnsupported)
    }

    fn unregister_reconfiguration(&self, _token: ListenerToken) -> Result<(), EngineError> {
        Ok(())
    }
}
