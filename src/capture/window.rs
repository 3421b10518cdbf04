//! Window discovery for the game process.

use anyhow::{anyhow, Result};
use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;

use windows::Win32::Foundation::{BOOL, HWND, LPARAM, POINT, RECT, TRUE};
use windows::Win32::Graphics::Gdi::ClientToScreen;
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClientRect, GetWindowTextLengthW, GetWindowThreadProcessId, IsWindow,
    IsWindowVisible,
};

use super::WindowGeometry;
use crate::geometry::Rect as GeoRect;

/// The exact process name to match (case-insensitive).
const GAME_PROCESS_NAME: &str = "gta5.exe";

/// Finds the main window of the game by enumerating visible windows and
/// matching the owning process's executable name.
pub fn find_game_window() -> Result<HWND> {
    struct EnumData {
        hwnd: Option<HWND>,
    }

    unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        unsafe {
            let data = &mut *(lparam.0 as *mut EnumData);

            if !IsWindowVisible(hwnd).as_bool() {
                return TRUE;
            }
            // Untitled windows are never the game's main window.
            if GetWindowTextLengthW(hwnd) == 0 {
                return TRUE;
            }

            let mut process_id: u32 = 0;
            GetWindowThreadProcessId(hwnd, Some(&mut process_id));
            if process_id == 0 {
                return TRUE;
            }

            let Ok(process_handle) =
                OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id)
            else {
                return TRUE;
            };

            let mut name_buf: Vec<u16> = vec![0; 1024];
            let mut len = name_buf.len() as u32;
            let result = QueryFullProcessImageNameW(
                process_handle,
                PROCESS_NAME_WIN32,
                windows::core::PWSTR(name_buf.as_mut_ptr()),
                &mut len,
            );
            let _ = windows::Win32::Foundation::CloseHandle(process_handle);

            if result.is_err() || len == 0 {
                return TRUE;
            }

            let full_path = OsString::from_wide(&name_buf[..len as usize])
                .to_string_lossy()
                .to_string();
            let process_name = full_path.rsplit('\\').next().unwrap_or(&full_path);

            if process_name.eq_ignore_ascii_case(GAME_PROCESS_NAME) {
                data.hwnd = Some(hwnd);
                return BOOL(0); // Stop enumeration
            }
            TRUE
        }
    }

    let mut data = EnumData { hwnd: None };
    unsafe {
        // EnumWindows returns FALSE when the callback stops it early, which
        // is the success path here, not an error.
        let _ = EnumWindows(Some(enum_callback), LPARAM(&mut data as *mut _ as isize));
    }

    data.hwnd
        .ok_or_else(|| anyhow!("could not find the {GAME_PROCESS_NAME} window"))
}

/// Client-area rectangle of `hwnd` in screen coordinates.
pub fn client_rect_on_screen(hwnd: HWND) -> Result<GeoRect> {
    let mut client = RECT::default();
    unsafe { GetClientRect(hwnd, &mut client)? };

    let mut origin = POINT { x: 0, y: 0 };
    unsafe {
        if !ClientToScreen(hwnd, &mut origin).as_bool() {
            return Err(anyhow!("ClientToScreen failed"));
        }
    }
    Ok(GeoRect::new(
        origin.x,
        origin.y,
        client.right - client.left,
        client.bottom - client.top,
    ))
}

/// Cached window lookup implementing `WindowGeometry`.
///
/// Re-runs the window search only when the cached handle goes stale.
#[derive(Default)]
pub struct GameWindow {
    hwnd: Option<HWND>,
}

// HWND is a plain handle; Windows window handles are process-global.
unsafe impl Send for GameWindow {}

impl GameWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hwnd(&mut self) -> Option<HWND> {
        if let Some(hwnd) = self.hwnd {
            if unsafe { IsWindow(hwnd) }.as_bool() {
                return Some(hwnd);
            }
            self.hwnd = None;
        }
        match find_game_window() {
            Ok(hwnd) => {
                self.hwnd = Some(hwnd);
                Some(hwnd)
            }
            Err(e) => {
                log::debug!("{e:#}");
                None
            }
        }
    }
}

impl WindowGeometry for GameWindow {
    fn window_rect(&mut self) -> Option<GeoRect> {
        let hwnd = self.hwnd()?;
        match client_rect_on_screen(hwnd) {
            Ok(rect) => Some(rect),
            Err(e) => {
                log::debug!("client rect lookup failed: {e:#}");
                self.hwnd = None;
                None
            }
        }
    }
}
