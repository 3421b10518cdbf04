//! Out-of-process memory interpretation.
//!
//! The reader locates two structures inside the game's module image via
//! byte-signature scans: the locally controlled entity (heading, position)
//! and the camera/viewport (basis vectors, position). Both are dereferenced
//! through pointer hops and re-read every poll; nothing read here is ever
//! retained beyond one tick.
//!
//! The offsets and signatures are empirical constants for one game build.
//! There is no version detection: on a mismatched build reads return
//! garbage, which callers bound-check instead of trusting.

pub mod scan;

#[cfg(windows)]
pub mod process;

use anyhow::Result;

pub use scan::{find_signature, Signature};

/// Entity offset of the forward vector (f32 x, y, z).
pub const ENTITY_FORWARD: u64 = 0x70;
/// Entity offset of the world position (f32 x, y, z).
pub const ENTITY_POSITION: u64 = 0x90;
/// Viewport offsets of the camera basis rows and position.
pub const CAMERA_RIGHT: u64 = 0x20;
pub const CAMERA_FORWARD: u64 = 0x30;
pub const CAMERA_UP: u64 = 0x40;
pub const CAMERA_POSITION: u64 = 0x50;

/// Smallest address accepted as a resolved structure pointer.
const MIN_PLAUSIBLE_PTR: u64 = 0x10000;
/// Largest magnitude accepted for a unit-vector component; larger values
/// mean the offsets do not match the running build.
const MAX_UNIT_COMPONENT: f64 = 1.5;

/// Signature resolving the entity factory: `mov rax, [rip+disp]` followed by
/// `mov rcx, [rax+8]`. The factory's +8 slot holds the local entity.
pub const ENTITY_SIG: Signature = Signature {
    prefix: &[0x48, 0x8B, 0x05],
    suffix: &[0x48, 0x8B, 0x48, 0x08],
};

/// Signature resolving the viewport pointer: `mov rcx, [rip+disp]` followed
/// by a null test.
pub const CAMERA_SIG: Signature = Signature {
    prefix: &[0x48, 0x8B, 0x0D],
    suffix: &[0x48, 0x85, 0xC9],
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Entity snapshot: world position plus orientation angles in degrees.
#[derive(Clone, Copy, Debug)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
    pub pitch: f64,
}

/// Camera snapshot used for world-to-screen projection by the overlay.
#[derive(Clone, Copy, Debug)]
pub struct CameraFrame {
    pub position: Vec3,
    pub right: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

/// Raw access to another process's address space.
pub trait ProcessMemory: Send {
    /// The main module's base address and a copy of its image bytes.
    fn module_image(&mut self) -> Result<(u64, Vec<u8>)>;

    fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<()>;

    fn read_u64(&self, addr: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_bytes(addr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_f32(&self, addr: u64) -> Result<f32> {
        let mut buf = [0u8; 4];
        self.read_bytes(addr, &mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }
}

/// Minimal yaw feed consumed by the heading tracker.
pub trait YawSource: Send {
    fn connected(&self) -> bool;
    fn connect(&mut self) -> bool;
    /// Entity yaw in degrees, or `None` when unreadable.
    fn read_yaw(&mut self) -> Option<f64>;
}

/// Resolved pointers into the game process.
///
/// Connected only while both structures are resolved and the most recent
/// read succeeded; any read error discards the pointers, forcing a fresh
/// signature scan on the next connect.
pub struct MemoryHandle<M: ProcessMemory> {
    mem: M,
    entity: u64,
    camera: u64,
}

impl<M: ProcessMemory> MemoryHandle<M> {
    pub fn new(mem: M) -> Self {
        Self {
            mem,
            entity: 0,
            camera: 0,
        }
    }

    pub fn connected(&self) -> bool {
        self.entity != 0 && self.camera != 0
    }

    /// Scans the module image and resolves both structures.
    pub fn connect(&mut self) -> bool {
        self.entity = 0;
        self.camera = 0;
        let (base, image) = match self.mem.module_image() {
            Ok(v) => v,
            Err(e) => {
                log::debug!("Module image unavailable: {e:#}");
                return false;
            }
        };

        for addr in find_signature(&image, base, &ENTITY_SIG) {
            let resolved = self
                .mem
                .read_u64(addr)
                .and_then(|factory| self.mem.read_u64(factory + 8));
            if let Ok(entity) = resolved {
                if entity > MIN_PLAUSIBLE_PTR {
                    self.entity = entity;
                    break;
                }
            }
        }

        for addr in find_signature(&image, base, &CAMERA_SIG) {
            if let Ok(camera) = self.mem.read_u64(addr) {
                if camera > MIN_PLAUSIBLE_PTR {
                    self.camera = camera;
                    break;
                }
            }
        }

        if self.connected() {
            log::info!(
                "Memory connected: entity=0x{:X} camera=0x{:X}",
                self.entity,
                self.camera
            );
            true
        } else {
            self.entity = 0;
            self.camera = 0;
            false
        }
    }

    pub fn disconnect(&mut self) {
        self.entity = 0;
        self.camera = 0;
    }

    fn read_vec3(&self, addr: u64) -> Result<Vec3> {
        Ok(Vec3 {
            x: self.mem.read_f32(addr)? as f64,
            y: self.mem.read_f32(addr + 4)? as f64,
            z: self.mem.read_f32(addr + 8)? as f64,
        })
    }

    /// Runs a read, demoting to disconnected on any failure.
    fn guarded<T>(&mut self, read: impl FnOnce(&Self) -> Result<T>) -> Option<T> {
        if !self.connected() {
            return None;
        }
        match read(self) {
            Ok(v) => Some(v),
            Err(e) => {
                log::debug!("Memory read failed, disconnecting: {e:#}");
                self.disconnect();
                None
            }
        }
    }

    /// Entity yaw in degrees from the forward vector.
    pub fn read_yaw(&mut self) -> Option<f64> {
        let entity = self.entity;
        let fwd = self.guarded(|m| {
            Ok((
                m.mem.read_f32(entity + ENTITY_FORWARD)? as f64,
                m.mem.read_f32(entity + ENTITY_FORWARD + 4)? as f64,
            ))
        })?;
        if fwd.0.abs() > MAX_UNIT_COMPONENT || fwd.1.abs() > MAX_UNIT_COMPONENT {
            // Build mismatch: readable but implausible. Stay connected,
            // report nothing.
            return None;
        }
        Some(fwd.0.atan2(fwd.1).to_degrees())
    }

    /// Entity position and orientation.
    pub fn read_pose(&mut self) -> Option<Pose> {
        let entity = self.entity;
        let (pos, fwd) = self.guarded(|m| {
            Ok((
                m.read_vec3(entity + ENTITY_POSITION)?,
                m.read_vec3(entity + ENTITY_FORWARD)?,
            ))
        })?;
        if fwd.x.abs() > MAX_UNIT_COMPONENT || fwd.y.abs() > MAX_UNIT_COMPONENT {
            return None;
        }
        Some(Pose {
            x: pos.x,
            y: pos.y,
            z: pos.z,
            yaw: fwd.x.atan2(fwd.y).to_degrees(),
            pitch: fwd.z.clamp(-1.0, 1.0).asin().to_degrees(),
        })
    }

    /// Camera basis vectors and position.
    pub fn read_camera(&mut self) -> Option<CameraFrame> {
        let camera = self.camera;
        self.guarded(|m| {
            Ok(CameraFrame {
                right: m.read_vec3(camera + CAMERA_RIGHT)?,
                forward: m.read_vec3(camera + CAMERA_FORWARD)?,
                up: m.read_vec3(camera + CAMERA_UP)?,
                position: m.read_vec3(camera + CAMERA_POSITION)?,
            })
        })
    }

    /// Camera yaw/pitch in degrees, with asin input clamped against float
    /// error in the forward vector.
    pub fn read_camera_angles(&mut self) -> Option<(f64, f64)> {
        let cam = self.read_camera()?;
        let yaw = cam.forward.x.atan2(cam.forward.y).to_degrees();
        let pitch = cam.forward.z.clamp(-1.0, 1.0).asin().to_degrees();
        Some((yaw, pitch))
    }
}

impl<M: ProcessMemory> YawSource for MemoryHandle<M> {
    fn connected(&self) -> bool {
        MemoryHandle::connected(self)
    }

    fn connect(&mut self) -> bool {
        MemoryHandle::connect(self)
    }

    fn read_yaw(&mut self) -> Option<f64> {
        MemoryHandle::read_yaw(self)
    }
}
