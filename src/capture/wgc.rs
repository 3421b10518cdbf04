//! Continuous frame capture using the Windows Graphics Capture API.
//!
//! A capture thread owns the D3D11 device and capture session, converts
//! each arriving frame to RGBA cropped to the client area, and overwrites
//! the single shared slot. Consumers only ever see the most recent frame.

use anyhow::{anyhow, Context, Result};
use image::{ImageBuffer, Rgba};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use windows::core::Interface;
use windows::Foundation::TypedEventHandler;
use windows::Graphics::Capture::{Direct3D11CaptureFramePool, GraphicsCaptureItem};
use windows::Graphics::DirectX::DirectXPixelFormat;
use windows::Win32::Foundation::{HWND, POINT, RECT};
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Resource, ID3D11Texture2D,
    D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAP_READ, D3D11_SDK_VERSION,
    D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Gdi::ClientToScreen;
use windows::Win32::System::WinRT::Direct3D11::CreateDirect3D11DeviceFromDXGIDevice;
use windows::Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop;
use windows::Win32::UI::WindowsAndMessaging::{GetClientRect, GetWindowRect};

use super::window::find_game_window;
use super::FrameSource;
use crate::detect::Frame;

/// Idle delay between frame polls on the capture thread.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shared single-slot frame source backed by a capture thread.
pub struct CaptureSource {
    slot: Arc<Mutex<Option<Frame>>>,
    running: Arc<AtomicBool>,
}

impl CaptureSource {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for CaptureSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for CaptureSource {
    fn ensure_running(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let slot = self.slot.clone();
        let running = self.running.clone();
        std::thread::spawn(move || {
            if let Err(e) = run_capture_thread(&slot, &running) {
                log::warn!("Capture thread stopped: {e:#}");
            }
            running.store(false, Ordering::SeqCst);
        });
    }

    fn latest_frame(&mut self) -> Option<Frame> {
        self.slot.lock().ok()?.clone()
    }
}

fn run_capture_thread(
    slot: &Arc<Mutex<Option<Frame>>>,
    running: &Arc<AtomicBool>,
) -> Result<()> {
    let hwnd = find_game_window()?;
    let (crop_x, crop_y, crop_w, crop_h) = client_crop(hwnd)?;

    let (device, context) = create_d3d11_device()?;
    let d3d_device = create_direct3d_device(&device)?;
    let item = create_capture_item(hwnd)?;
    let size = item.Size()?;

    let frame_pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
        &d3d_device,
        DirectXPixelFormat::B8G8R8A8UIntNormalized,
        2,
        size,
    )?;
    let session = frame_pool.CreateCaptureSession(&item)?;

    let frame_ready = Arc::new(AtomicBool::new(false));
    let frame_ready_clone = frame_ready.clone();
    frame_pool.FrameArrived(&TypedEventHandler::new(
        move |_pool: &Option<Direct3D11CaptureFramePool>, _| {
            frame_ready_clone.store(true, Ordering::SeqCst);
            Ok(())
        },
    ))?;

    session.StartCapture()?;
    log::info!("Capture started: {}x{}", size.Width, size.Height);

    while running.load(Ordering::SeqCst) {
        if !frame_ready.swap(false, Ordering::SeqCst) {
            std::thread::sleep(POLL_INTERVAL);
            continue;
        }
        let frame = frame_pool.TryGetNextFrame()?;
        let img = copy_frame(&device, &context, &frame, crop_x, crop_y, crop_w, crop_h)?;
        if let Ok(mut guard) = slot.lock() {
            *guard = Some(img);
        }
    }

    session.Close()?;
    frame_pool.Close()?;
    Ok(())
}

/// Crop parameters mapping the captured window surface to the client area.
fn client_crop(hwnd: HWND) -> Result<(u32, u32, u32, u32)> {
    let mut client = RECT::default();
    unsafe { GetClientRect(hwnd, &mut client)? };

    let mut origin = POINT { x: 0, y: 0 };
    unsafe {
        if !ClientToScreen(hwnd, &mut origin).as_bool() {
            return Err(anyhow!("ClientToScreen failed"));
        }
    }
    let mut window = RECT::default();
    unsafe { GetWindowRect(hwnd, &mut window)? };

    Ok((
        (origin.x - window.left) as u32,
        (origin.y - window.top) as u32,
        (client.right - client.left) as u32,
        (client.bottom - client.top) as u32,
    ))
}

/// Maps one captured surface and converts it to a cropped RGBA image.
fn copy_frame(
    device: &ID3D11Device,
    context: &ID3D11DeviceContext,
    frame: &windows::Graphics::Capture::Direct3D11CaptureFrame,
    crop_x: u32,
    crop_y: u32,
    crop_w: u32,
    crop_h: u32,
) -> Result<Frame> {
    let surface = frame.Surface()?;
    let access: windows::Win32::System::WinRT::Direct3D11::IDirect3DDxgiInterfaceAccess =
        surface.cast()?;
    let texture: ID3D11Texture2D = unsafe { access.GetInterface()? };

    let mut desc = D3D11_TEXTURE2D_DESC::default();
    unsafe { texture.GetDesc(&mut desc) };

    let staging_desc = D3D11_TEXTURE2D_DESC {
        Width: desc.Width,
        Height: desc.Height,
        MipLevels: 1,
        ArraySize: 1,
        Format: desc.Format,
        SampleDesc: desc.SampleDesc,
        Usage: D3D11_USAGE_STAGING,
        BindFlags: Default::default(),
        CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
        MiscFlags: Default::default(),
    };

    let staging = unsafe {
        let mut staging: Option<ID3D11Texture2D> = None;
        device.CreateTexture2D(&staging_desc, None, Some(&mut staging))?;
        staging.ok_or_else(|| anyhow!("failed to create staging texture"))?
    };

    unsafe {
        context.CopyResource(
            &staging.cast::<ID3D11Resource>()?,
            &texture.cast::<ID3D11Resource>()?,
        );
    }

    let mapped = unsafe {
        let mut mapped = Default::default();
        context.Map(
            &staging.cast::<ID3D11Resource>()?,
            0,
            D3D11_MAP_READ,
            0,
            Some(&mut mapped),
        )?;
        mapped
    };

    let src = unsafe {
        std::slice::from_raw_parts(
            mapped.pData as *const u8,
            (mapped.RowPitch * desc.Height) as usize,
        )
    };
    let row_pitch = mapped.RowPitch as usize;

    let mut img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::new(crop_w, crop_h);
    for y in 0..crop_h {
        let src_y = (crop_y + y) as usize;
        if src_y >= desc.Height as usize {
            break;
        }
        for x in 0..crop_w {
            let src_x = (crop_x + x) as usize;
            if src_x >= desc.Width as usize {
                break;
            }
            let offset = src_y * row_pitch + src_x * 4;
            // BGRA -> RGBA
            img.put_pixel(
                x,
                y,
                Rgba([src[offset + 2], src[offset + 1], src[offset], src[offset + 3]]),
            );
        }
    }

    unsafe {
        context.Unmap(&staging.cast::<ID3D11Resource>()?, 0);
    }
    Ok(img)
}

fn create_d3d11_device() -> Result<(ID3D11Device, ID3D11DeviceContext)> {
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;

    unsafe {
        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            None,
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            None,
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )?;
    }

    Ok((
        device.ok_or_else(|| anyhow!("failed to create D3D11 device"))?,
        context.ok_or_else(|| anyhow!("failed to create D3D11 context"))?,
    ))
}

fn create_direct3d_device(
    device: &ID3D11Device,
) -> Result<windows::Graphics::DirectX::Direct3D11::IDirect3DDevice> {
    let dxgi_device: windows::Win32::Graphics::Dxgi::IDXGIDevice = device.cast()?;
    let inspectable = unsafe { CreateDirect3D11DeviceFromDXGIDevice(&dxgi_device)? };
    inspectable
        .cast()
        .context("failed to cast to IDirect3DDevice")
}

fn create_capture_item(hwnd: HWND) -> Result<GraphicsCaptureItem> {
    let class_name = windows::core::h!("Windows.Graphics.Capture.GraphicsCaptureItem");
    let interop: IGraphicsCaptureItemInterop = unsafe {
        windows::Win32::System::WinRT::RoGetActivationFactory(class_name)
            .context("failed to get IGraphicsCaptureItemInterop")?
    };
    unsafe {
        interop
            .CreateForWindow(hwnd)
            .context("failed to create capture item for window")
    }
}
