//! Hardware-level input via `SendInput`.
//!
//! Scan-code keyboard events and absolute-coordinate mouse events, with
//! short settle delays between down/up halves. The delays satisfy the
//! game's input timing expectations and are part of the tick's critical
//! path by design.

use std::time::Duration;

use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYEVENTF_KEYUP,
    KEYEVENTF_SCANCODE, MOUSEEVENTF_ABSOLUTE, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP,
    MOUSEEVENTF_MOVE, MOUSEINPUT,
};
use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

use super::InputSynthesizer;

/// Settle delay between the halves of a tap or click.
const SETTLE: Duration = Duration::from_millis(30);

/// `SendInput`-backed synthesizer.
#[derive(Default)]
pub struct SendInputSynthesizer;

impl SendInputSynthesizer {
    pub fn new() -> Self {
        Self
    }

    fn send_key(scan: u16, up: bool) {
        let mut flags = KEYEVENTF_SCANCODE;
        if up {
            flags |= KEYEVENTF_KEYUP;
        }
        let input = INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wScan: scan,
                    dwFlags: flags,
                    ..Default::default()
                },
            },
        };
        unsafe {
            SendInput(&[input], std::mem::size_of::<INPUT>() as i32);
        }
    }

    fn send_mouse(norm_x: i32, norm_y: i32, flags: windows::Win32::UI::Input::KeyboardAndMouse::MOUSE_EVENT_FLAGS) {
        let input = INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx: norm_x,
                    dy: norm_y,
                    dwFlags: flags | MOUSEEVENTF_ABSOLUTE,
                    ..Default::default()
                },
            },
        };
        unsafe {
            SendInput(&[input], std::mem::size_of::<INPUT>() as i32);
        }
    }
}

impl InputSynthesizer for SendInputSynthesizer {
    fn key_down(&mut self, scan: u16) {
        Self::send_key(scan, false);
    }

    fn key_up(&mut self, scan: u16) {
        Self::send_key(scan, true);
    }

    fn tap(&mut self, scan: u16) {
        Self::send_key(scan, false);
        std::thread::sleep(SETTLE);
        Self::send_key(scan, true);
    }

    fn click_at(&mut self, screen_x: i32, screen_y: i32) {
        let screen_w = unsafe { GetSystemMetrics(SM_CXSCREEN) }.max(1);
        let screen_h = unsafe { GetSystemMetrics(SM_CYSCREEN) }.max(1);
        // MOUSEEVENTF_ABSOLUTE wants 0..65535 normalized coordinates.
        let norm_x = ((screen_x as i64 * 65535) / screen_w as i64) as i32;
        let norm_y = ((screen_y as i64 * 65535) / screen_h as i64) as i32;

        Self::send_mouse(norm_x, norm_y, MOUSEEVENTF_MOVE);
        std::thread::sleep(SETTLE);
        Self::send_mouse(norm_x, norm_y, MOUSEEVENTF_LEFTDOWN | MOUSEEVENTF_MOVE);
        std::thread::sleep(SETTLE);
        Self::send_mouse(norm_x, norm_y, MOUSEEVENTF_LEFTUP | MOUSEEVENTF_MOVE);
    }
}
