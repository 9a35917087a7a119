//! Level Zero runtime binding
//!
//! Opens the Level Zero loader (`libze_loader.so.1`) with `libloading` and
//! resolves the handful of entry points the prober needs:
//!
//! - `zeInit` (GPU drivers only)
//! - `zeDriverGet` / `zeDeviceGet` / `zeDeviceGetProperties` to enumerate GPUs
//! - `zeContextCreate` / `zeContextDestroy` for the smoke test
//!
//! # Safety
//!
//! Every FFI call goes through the function prototypes declared below, which
//! mirror `ze_api.h` (Level Zero 1.x). Handles are opaque pointers owned by
//! the loader and are only passed back into it.

use std::ffi::{CStr, c_char, c_void};
use std::ptr;

use libloading::{Library, Symbol};
use parking_lot::Mutex;
use tracing::debug;

use crate::core::device::{AcceleratorRuntime, ProbeError};

type ZeResult = u32;
type RawHandle = *mut c_void;

const ZE_RESULT_SUCCESS: ZeResult = 0;
const ZE_INIT_FLAG_GPU_ONLY: u32 = 1;
const ZE_DEVICE_TYPE_GPU: u32 = 1;
const ZE_STRUCTURE_TYPE_DEVICE_PROPERTIES: u32 = 0x3;
const ZE_STRUCTURE_TYPE_CONTEXT_DESC: u32 = 0xd;
const ZE_MAX_DEVICE_NAME: usize = 256;

/// `ze_device_properties_t`
#[repr(C)]
#[allow(dead_code)]
struct ZeDeviceProperties {
    stype: u32,
    p_next: *mut c_void,
    device_type: u32,
    vendor_id: u32,
    device_id: u32,
    flags: u32,
    subdevice_id: u32,
    core_clock_rate: u32,
    max_mem_alloc_size: u64,
    max_hardware_contexts: u32,
    max_command_queue_priority: u32,
    num_threads_per_eu: u32,
    physical_eu_simd_width: u32,
    num_eus_per_subslice: u32,
    num_subslices_per_slice: u32,
    num_slices: u32,
    timer_resolution: u64,
    timestamp_valid_bits: u32,
    kernel_timestamp_valid_bits: u32,
    uuid: [u8; 16],
    name: [c_char; ZE_MAX_DEVICE_NAME],
}

impl ZeDeviceProperties {
    fn request() -> Self {
        Self {
            stype: ZE_STRUCTURE_TYPE_DEVICE_PROPERTIES,
            p_next: ptr::null_mut(),
            device_type: 0,
            vendor_id: 0,
            device_id: 0,
            flags: 0,
            subdevice_id: 0,
            core_clock_rate: 0,
            max_mem_alloc_size: 0,
            max_hardware_contexts: 0,
            max_command_queue_priority: 0,
            num_threads_per_eu: 0,
            physical_eu_simd_width: 0,
            num_eus_per_subslice: 0,
            num_subslices_per_slice: 0,
            num_slices: 0,
            timer_resolution: 0,
            timestamp_valid_bits: 0,
            kernel_timestamp_valid_bits: 0,
            uuid: [0; 16],
            name: [0; ZE_MAX_DEVICE_NAME],
        }
    }
}

impl ZeDeviceProperties {
    fn max_mem_alloc_mib(&self) -> u64 {
        self.max_mem_alloc_size / (1024 * 1024)
    }
}

/// `ze_context_desc_t`
#[repr(C)]
#[allow(dead_code)]
struct ZeContextDesc {
    stype: u32,
    p_next: *const c_void,
    flags: u32,
}

type ZeInitFn = unsafe extern "C" fn(u32) -> ZeResult;
type ZeDriverGetFn = unsafe extern "C" fn(*mut u32, *mut RawHandle) -> ZeResult;
type ZeDeviceGetFn = unsafe extern "C" fn(RawHandle, *mut u32, *mut RawHandle) -> ZeResult;
type ZeDeviceGetPropertiesFn =
    unsafe extern "C" fn(RawHandle, *mut ZeDeviceProperties) -> ZeResult;
type ZeContextCreateFn =
    unsafe extern "C" fn(RawHandle, *const ZeContextDesc, *mut RawHandle) -> ZeResult;
type ZeContextDestroyFn = unsafe extern "C" fn(RawHandle) -> ZeResult;

/// A GPU together with the driver that exposes it.
struct GpuDevice {
    driver: RawHandle,
    device: RawHandle,
    name: String,
}

// SAFETY: Level Zero handles are thread-safe opaque tokens; the loader owns
// the objects behind them for the lifetime of the library.
unsafe impl Send for GpuDevice {}
unsafe impl Sync for GpuDevice {}

struct Loaded {
    library: Library,
    devices: Option<Vec<GpuDevice>>,
}

/// Accelerator runtime backed by the Level Zero loader library.
pub struct LevelZeroRuntime {
    library: String,
    loaded: Mutex<Option<Loaded>>,
}

impl LevelZeroRuntime {
    pub fn new(library: impl Into<String>) -> Self {
        Self {
            library: library.into(),
            loaded: Mutex::new(None),
        }
    }

    /// Loader library name this runtime opens.
    pub fn library(&self) -> &str {
        &self.library
    }

    fn with_devices<T>(
        &self,
        f: impl FnOnce(&Library, &[GpuDevice]) -> Result<T, ProbeError>,
    ) -> Result<T, ProbeError> {
        let mut guard = self.loaded.lock();
        let loaded = guard.as_mut().ok_or_else(|| {
            ProbeError::ExtensionUnavailable(format!("{} is not loaded", self.library))
        })?;
        if loaded.devices.is_none() {
            loaded.devices = Some(enumerate_gpus(&loaded.library)?);
        }
        let devices = loaded.devices.as_deref().unwrap_or_default();
        f(&loaded.library, devices)
    }
}

impl AcceleratorRuntime for LevelZeroRuntime {
    fn load(&self) -> Result<(), ProbeError> {
        let mut guard = self.loaded.lock();
        if guard.is_some() {
            return Ok(());
        }

        // SAFETY: the loader is a plain C library whose initialisers have no
        // preconditions on the host process.
        let library = unsafe { Library::new(&self.library) }.map_err(|e| {
            ProbeError::ExtensionUnavailable(format!("{}: {e}", self.library))
        })?;

        {
            let init = symbol::<ZeInitFn>(&library, b"zeInit\0")?;
            // SAFETY: prototype matches `ze_result_t zeInit(ze_init_flags_t)`.
            check("zeInit", unsafe { init(ZE_INIT_FLAG_GPU_ONLY) })?;
        }
        debug!(library = %self.library, "Level Zero initialised");

        *guard = Some(Loaded {
            library,
            devices: None,
        });
        Ok(())
    }

    fn device_count(&self) -> Result<usize, ProbeError> {
        self.with_devices(|_, devices| Ok(devices.len()))
    }

    fn device_name(&self, index: usize) -> Result<String, ProbeError> {
        self.with_devices(|_, devices| {
            devices
                .get(index)
                .map(|gpu| gpu.name.clone())
                .ok_or(ProbeError::NoDevice)
        })
    }

    fn smoke_test(&self, index: usize) -> Result<(), ProbeError> {
        self.with_devices(|library, devices| {
            let gpu = devices.get(index).ok_or(ProbeError::NoDevice)?;
            let create = symbol::<ZeContextCreateFn>(library, b"zeContextCreate\0")?;
            let destroy = symbol::<ZeContextDestroyFn>(library, b"zeContextDestroy\0")?;

            let desc = ZeContextDesc {
                stype: ZE_STRUCTURE_TYPE_CONTEXT_DESC,
                p_next: ptr::null(),
                flags: 0,
            };
            let mut context: RawHandle = ptr::null_mut();
            // SAFETY: `desc` and `context` outlive the call; the driver handle
            // came from zeDriverGet on this library.
            check("zeContextCreate", unsafe {
                create(gpu.driver, &desc, &mut context)
            })
            .map_err(|e| ProbeError::SmokeTest(e.to_string()))?;
            // SAFETY: `context` was just created by zeContextCreate.
            check("zeContextDestroy", unsafe { destroy(context) })
                .map_err(|e| ProbeError::SmokeTest(e.to_string()))?;

            debug!(device = ?gpu.device, "Level Zero context round-trip succeeded");
            Ok(())
        })
    }
}

fn symbol<'lib, T>(library: &'lib Library, name: &[u8]) -> Result<Symbol<'lib, T>, ProbeError> {
    // SAFETY: callers pair each symbol name with its `ze_api.h` prototype.
    unsafe { library.get::<T>(name) }.map_err(|e| {
        ProbeError::Runtime(format!(
            "missing symbol {}: {e}",
            String::from_utf8_lossy(name).trim_end_matches('\0')
        ))
    })
}

fn check(call: &str, result: ZeResult) -> Result<(), ProbeError> {
    if result == ZE_RESULT_SUCCESS {
        Ok(())
    } else {
        Err(ProbeError::Runtime(format!("{call} returned 0x{result:08x}")))
    }
}

fn enumerate_gpus(library: &Library) -> Result<Vec<GpuDevice>, ProbeError> {
    let driver_get = symbol::<ZeDriverGetFn>(library, b"zeDriverGet\0")?;
    let device_get = symbol::<ZeDeviceGetFn>(library, b"zeDeviceGet\0")?;
    let get_properties = symbol::<ZeDeviceGetPropertiesFn>(library, b"zeDeviceGetProperties\0")?;

    let mut driver_count = 0u32;
    // SAFETY: count query with a null output array, as documented.
    check("zeDriverGet", unsafe {
        driver_get(&mut driver_count, ptr::null_mut())
    })?;
    let mut drivers: Vec<RawHandle> = vec![ptr::null_mut(); driver_count as usize];
    // SAFETY: `drivers` holds exactly `driver_count` slots.
    check("zeDriverGet", unsafe {
        driver_get(&mut driver_count, drivers.as_mut_ptr())
    })?;
    drivers.truncate(driver_count as usize);

    let mut gpus = Vec::new();
    for driver in drivers {
        let mut device_count = 0u32;
        // SAFETY: count query with a null output array.
        check("zeDeviceGet", unsafe {
            device_get(driver, &mut device_count, ptr::null_mut())
        })?;
        let mut devices: Vec<RawHandle> = vec![ptr::null_mut(); device_count as usize];
        // SAFETY: `devices` holds exactly `device_count` slots.
        check("zeDeviceGet", unsafe {
            device_get(driver, &mut device_count, devices.as_mut_ptr())
        })?;
        devices.truncate(device_count as usize);

        for device in devices {
            let mut props = ZeDeviceProperties::request();
            // SAFETY: `props` is a properly tagged ze_device_properties_t.
            check("zeDeviceGetProperties", unsafe {
                get_properties(device, &mut props)
            })?;
            if props.device_type != ZE_DEVICE_TYPE_GPU {
                continue;
            }
            let name = device_name_from_raw(&props.name);
            debug!(
                vendor_id = props.vendor_id,
                device_id = props.device_id,
                max_mem_alloc_mib = props.max_mem_alloc_mib(),
                name = %name,
                "Found Level Zero GPU"
            );
            gpus.push(GpuDevice {
                driver,
                device,
                name,
            });
        }
    }

    Ok(gpus)
}

/// Decode the fixed-size, NUL-terminated device name buffer.
fn device_name_from_raw(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw.iter().map(|&c| c as u8).collect();
    match CStr::from_bytes_until_nul(&bytes) {
        Ok(name) => name.to_string_lossy().trim().to_string(),
        Err(_) => String::from_utf8_lossy(&bytes).trim().to_string(),
    }
}
