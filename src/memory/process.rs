//! Windows process memory access via ToolHelp and `ReadProcessMemory`.

use anyhow::{anyhow, Context, Result};

use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Module32FirstW, Process32FirstW, Process32NextW, MODULEENTRY32W,
    PROCESSENTRY32W, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Threading::{
    OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
};

use super::ProcessMemory;

/// The game executable whose memory is read.
pub const GAME_PROCESS_NAME: &str = "GTA5.exe";

/// An open handle to the game process.
pub struct GameProcess {
    handle: HANDLE,
    module_base: u64,
    module_size: usize,
}

// HANDLE is a plain kernel object reference, valid across threads.
unsafe impl Send for GameProcess {}

impl GameProcess {
    /// Opens the game process and records its main module bounds.
    pub fn open() -> Result<Self> {
        let pid = find_process_id(GAME_PROCESS_NAME)?;
        let (module_base, module_size) = find_main_module(pid, GAME_PROCESS_NAME)?;

        let handle = unsafe {
            OpenProcess(PROCESS_VM_READ | PROCESS_QUERY_INFORMATION, false, pid)
        }
        .with_context(|| format!("opening process {pid}"))?;

        log::info!(
            "Opened {} (pid {}): module 0x{:X} + 0x{:X}",
            GAME_PROCESS_NAME,
            pid,
            module_base,
            module_size
        );
        Ok(Self {
            handle,
            module_base,
            module_size,
        })
    }
}

impl Drop for GameProcess {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

impl ProcessMemory for GameProcess {
    fn module_image(&mut self) -> Result<(u64, Vec<u8>)> {
        let mut image = vec![0u8; self.module_size];
        self.read_bytes(self.module_base, &mut image)?;
        Ok((self.module_base, image))
    }

    fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let mut read = 0usize;
        unsafe {
            ReadProcessMemory(
                self.handle,
                addr as *const std::ffi::c_void,
                buf.as_mut_ptr() as *mut std::ffi::c_void,
                buf.len(),
                Some(&mut read),
            )
        }
        .with_context(|| format!("reading {} bytes at 0x{addr:X}", buf.len()))?;
        if read != buf.len() {
            return Err(anyhow!(
                "short read at 0x{addr:X}: {read} of {} bytes",
                buf.len()
            ));
        }
        Ok(())
    }
}

fn wide_to_string(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

/// Finds the process id of `name` (case-insensitive exact match).
fn find_process_id(name: &str) -> Result<u32> {
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
        .context("creating process snapshot")?;

    let mut entry = PROCESSENTRY32W {
        dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };

    let result = (|| {
        unsafe { Process32FirstW(snapshot, &mut entry) }?;
        loop {
            if wide_to_string(&entry.szExeFile).eq_ignore_ascii_case(name) {
                return Ok(entry.th32ProcessID);
            }
            unsafe { Process32NextW(snapshot, &mut entry) }?;
        }
    })();

    unsafe {
        let _ = CloseHandle(snapshot);
    }
    result.map_err(|_: windows::core::Error| {
        anyhow!("{name} is not running")
    })
}

/// Base address and size of the process's main module.
fn find_main_module(pid: u32, name: &str) -> Result<(u64, usize)> {
    let snapshot =
        unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid) }
            .context("creating module snapshot")?;

    let mut entry = MODULEENTRY32W {
        dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
        ..Default::default()
    };

    let result = unsafe { Module32FirstW(snapshot, &mut entry) };
    unsafe {
        let _ = CloseHandle(snapshot);
    }
    result.with_context(|| format!("reading main module of {name}"))?;

    Ok((entry.modBaseAddr as u64, entry.modBaseSize as usize))
}
