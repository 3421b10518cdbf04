//! Synthetic keyboard and mouse input.
//!
//! The phase machine talks to an `InputSynthesizer` trait so tests can
//! record emitted events instead of moving the real cursor. Keyboard input
//! uses DirectInput scan codes because the game's input layer ignores
//! plain virtual-key messages.

#[cfg(windows)]
pub mod sendinput;

#[cfg(windows)]
pub use sendinput::SendInputSynthesizer;

/// DirectInput scan codes for the keys the minigame uses.
pub const SC_SPACE: u16 = 0x39;
pub const SC_A: u16 = 0x1E;
pub const SC_D: u16 = 0x20;

/// Display name of a scan code for logs.
pub fn scan_name(code: u16) -> &'static str {
    match code {
        SC_SPACE => "SPACE",
        SC_A => "A",
        SC_D => "D",
        _ => "?",
    }
}

/// Low-level input emission. Fire-and-forget: OS-level failures are not
/// distinguished from success.
pub trait InputSynthesizer: Send {
    fn key_down(&mut self, scan: u16);
    fn key_up(&mut self, scan: u16);
    fn tap(&mut self, scan: u16);
    /// Left click at absolute screen coordinates.
    fn click_at(&mut self, screen_x: i32, screen_y: i32);
}
