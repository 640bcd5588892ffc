//! GenTL vendor transport-layer ABI, loaded dynamically via `libloading`.
//!
//! GenTL producers ship as a shared library (`.cti` on Linux) exposing a C
//! ABI defined by the GenICam standard. We `dlopen` it at runtime rather
//! than link against it, handing opaque pointers across a boundary whose
//! lifetime we don't control on the other side — here the "other side"
//! is the vendor's library instead of a managed runtime.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int};

use libloading::{Library, Symbol};

use crate::error::{GenicamError, Result};

pub type GcError = c_int;
pub const GC_ERR_SUCCESS: GcError = 0;
pub const GC_ERR_NO_DATA: GcError = -1003;

/// `GenTL::EVENT_TYPE::EVENT_NEW_BUFFER` — the event kind a data stream's
/// event handle reports once a queued buffer has been filled.
pub const EVENT_NEW_BUFFER: c_int = 3;

/// `GenTL::DS_FLUSH_QUEUE_TYPE::DS_FLUSH_ALL_DISCARD` — drop every buffer
/// in every queue. What `stop_stream` uses to reclaim outstanding buffers.
pub const DS_FLUSH_ALL_DISCARD: c_int = 1;

pub type DevHandle = *mut c_void;
pub type PortHandle = *mut c_void;
pub type DsHandle = *mut c_void;
pub type EventHandle = *mut c_void;
pub type TlHandle = *mut c_void;
pub type IfHandle = *mut c_void;

type GcInitLibFn = unsafe extern "C" fn() -> GcError;
type GcCloseLibFn = unsafe extern "C" fn() -> GcError;
type TlOpenFn = unsafe extern "C" fn(*mut TlHandle) -> GcError;
type TlCloseFn = unsafe extern "C" fn(TlHandle) -> GcError;
type TlUpdateInterfaceListFn = unsafe extern "C" fn(TlHandle, *mut c_int, u64) -> GcError;
type TlGetInterfaceIdFn = unsafe extern "C" fn(TlHandle, u32, *mut c_char, *mut usize) -> GcError;
type IfOpenDeviceFn = unsafe extern "C" fn(IfHandle, *const c_char, c_int, *mut DevHandle) -> GcError;
type DevGetPortFn = unsafe extern "C" fn(DevHandle, *mut PortHandle) -> GcError;
type DevCloseFn = unsafe extern "C" fn(DevHandle) -> GcError;
type GcGetPortUrlFn = unsafe extern "C" fn(PortHandle, *mut c_char, *mut usize) -> GcError;
type GcReadPortFn = unsafe extern "C" fn(PortHandle, u64, *mut c_void, *mut usize) -> GcError;
type GcWritePortFn = unsafe extern "C" fn(PortHandle, u64, *const c_void, *mut usize) -> GcError;
type DevOpenDataStreamFn = unsafe extern "C" fn(DevHandle, *const c_char, *mut DsHandle) -> GcError;
type DsAnnounceBufferFn = unsafe extern "C" fn(DsHandle, *mut c_void, usize, *mut c_void, *mut u64) -> GcError;
type DsQueueBufferFn = unsafe extern "C" fn(DsHandle, u64) -> GcError;
type DsStartAcquisitionFn = unsafe extern "C" fn(DsHandle, c_int, i64) -> GcError;
type DsStopAcquisitionFn = unsafe extern "C" fn(DsHandle, c_int) -> GcError;
type DsFlushQueueFn = unsafe extern "C" fn(DsHandle, c_int) -> GcError;
type DsRevokeBufferFn = unsafe extern "C" fn(DsHandle, u64, *mut *mut c_void, *mut *mut c_void) -> GcError;
type GcRegisterEventFn = unsafe extern "C" fn(DevHandle, c_int, *mut EventHandle) -> GcError;
type EventGetDataFn = unsafe extern "C" fn(EventHandle, *mut c_void, *mut usize, u64) -> GcError;
type GcEventKillFn = unsafe extern "C" fn(EventHandle) -> GcError;

/// The subset of the GenTL C ABI this crate actually calls, resolved by
/// symbol name out of the vendor's shared library. Fields are `Option` so
/// a producer missing an optional entry point (event notification is not
/// universally implemented) degrades instead of failing to load.
pub struct GenTl {
    _lib: Library,
    pub gc_init_lib: GcInitLibFn,
    pub gc_close_lib: GcCloseLibFn,
    pub tl_open: TlOpenFn,
    pub tl_close: TlCloseFn,
    pub tl_update_interface_list: TlUpdateInterfaceListFn,
    pub tl_get_interface_id: TlGetInterfaceIdFn,
    pub if_open_device: IfOpenDeviceFn,
    pub dev_get_port: DevGetPortFn,
    pub dev_close: DevCloseFn,
    pub gc_get_port_url: GcGetPortUrlFn,
    pub gc_read_port: GcReadPortFn,
    pub gc_write_port: GcWritePortFn,
    pub dev_open_data_stream: DevOpenDataStreamFn,
    pub ds_announce_buffer: DsAnnounceBufferFn,
    pub ds_queue_buffer: DsQueueBufferFn,
    pub ds_start_acquisition: DsStartAcquisitionFn,
    pub ds_stop_acquisition: DsStopAcquisitionFn,
    pub ds_flush_queue: DsFlushQueueFn,
    pub ds_revoke_buffer: DsRevokeBufferFn,
    pub gc_register_event: Option<GcRegisterEventFn>,
    pub event_get_data: Option<EventGetDataFn>,
    pub gc_event_kill: Option<GcEventKillFn>,
}

macro_rules! load_symbol {
    ($lib:expr, $name:literal) => {
        unsafe {
            let sym: Symbol<'_, _> = $lib
                .get($name)
                .map_err(|e| GenicamError::ModuleLoad(format!("missing symbol {}: {e}", $name)))?;
            *sym
        }
    };
}

macro_rules! load_symbol_opt {
    ($lib:expr, $name:literal) => {
        unsafe { $lib.get::<_>($name).ok().map(|sym: Symbol<'_, _>| *sym) }
    };
}

impl GenTl {
    /// Load a producer module from `path` (a `.cti`/`.so` on disk) and
    /// resolve every required entry point. Fails the whole module rather
    /// than loading partially, per the "module-disable on load failure"
    /// policy.
    ///
    /// # Safety
    /// The loaded library is assumed to implement the GenTL ABI correctly;
    /// we trust its exported symbols' signatures because there is no way
    /// to verify them beyond name matching.
    pub unsafe fn load(path: &str) -> Result<GenTl> {
        let lib = Library::new(path).map_err(|e| GenicamError::ModuleLoad(format!("{path}: {e}")))?;
        Ok(GenTl {
            gc_init_lib: load_symbol!(lib, b"GCInitLib"),
            gc_close_lib: load_symbol!(lib, b"GCCloseLib"),
            tl_open: load_symbol!(lib, b"TLOpen"),
            tl_close: load_symbol!(lib, b"TLClose"),
            tl_update_interface_list: load_symbol!(lib, b"TLUpdateInterfaceList"),
            tl_get_interface_id: load_symbol!(lib, b"TLGetInterfaceID"),
            if_open_device: load_symbol!(lib, b"IFOpenDevice"),
            dev_get_port: load_symbol!(lib, b"DevGetPort"),
            dev_close: load_symbol!(lib, b"DevClose"),
            gc_get_port_url: load_symbol!(lib, b"GCGetPortURL"),
            gc_read_port: load_symbol!(lib, b"GCReadPort"),
            gc_write_port: load_symbol!(lib, b"GCWritePort"),
            dev_open_data_stream: load_symbol!(lib, b"DevOpenDataStream"),
            ds_announce_buffer: load_symbol!(lib, b"DSAnnounceBuffer"),
            ds_queue_buffer: load_symbol!(lib, b"DSQueueBuffer"),
            ds_start_acquisition: load_symbol!(lib, b"DSStartAcquisition"),
            ds_stop_acquisition: load_symbol!(lib, b"DSStopAcquisition"),
            ds_flush_queue: load_symbol!(lib, b"DSFlushQueue"),
            ds_revoke_buffer: load_symbol!(lib, b"DSRevokeBuffer"),
            gc_register_event: load_symbol_opt!(lib, b"GCRegisterEvent"),
            event_get_data: load_symbol_opt!(lib, b"EventGetData"),
            gc_event_kill: load_symbol_opt!(lib, b"GCEventKill"),
            _lib: lib,
        })
    }

    /// Read `len` bytes from `port` at `address`. `GC_ERR_NO_DATA` is
    /// surfaced as [`GenicamError::NoData`] rather than an I/O error, since
    /// register nodes treat it as a valid (if unusual) read result.
    ///
    /// # Safety
    /// `port` must be a handle returned by a successful `dev_get_port` call
    /// that hasn't since been closed.
    pub unsafe fn read_port(&self, port: PortHandle, address: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut actual = len;
        let err = (self.gc_read_port)(port, address, buf.as_mut_ptr() as *mut c_void, &mut actual);
        match err {
            GC_ERR_SUCCESS => {
                buf.truncate(actual);
                Ok(buf)
            }
            GC_ERR_NO_DATA => Err(GenicamError::NoData),
            other => Err(GenicamError::Transport(format!("GCReadPort failed: {other}"))),
        }
    }

    /// # Safety
    /// Same precondition as [`Self::read_port`].
    pub unsafe fn write_port(&self, port: PortHandle, address: u64, data: &[u8]) -> Result<()> {
        let mut len = data.len();
        let err = (self.gc_write_port)(port, address, data.as_ptr() as *const c_void, &mut len);
        match err {
            GC_ERR_SUCCESS => Ok(()),
            other => Err(GenicamError::Transport(format!("GCWritePort failed: {other}"))),
        }
    }

    /// Fetch the port's bootstrap URL (a `local:<address>;<size>` or file
    /// reference pointing at the zipped XML register map).
    ///
    /// # Safety
    /// Same precondition as [`Self::read_port`].
    pub unsafe fn port_url(&self, port: PortHandle) -> Result<String> {
        let mut len = 0usize;
        let err = (self.gc_get_port_url)(port, std::ptr::null_mut(), &mut len);
        if err != GC_ERR_SUCCESS && err != GC_ERR_NO_DATA {
            return Err(GenicamError::Transport(format!("GCGetPortURL (size query) failed: {err}")));
        }
        let mut buf = vec![0i8; len];
        let err = (self.gc_get_port_url)(port, buf.as_mut_ptr(), &mut len);
        if err != GC_ERR_SUCCESS {
            return Err(GenicamError::Transport(format!("GCGetPortURL failed: {err}")));
        }
        let cstr = unsafe { CStr::from_ptr(buf.as_ptr()) };
        Ok(cstr.to_string_lossy().into_owned())
    }

    /// # Safety
    /// `device` must be an open device handle.
    pub unsafe fn get_port(&self, device: DevHandle) -> Result<PortHandle> {
        let mut port: PortHandle = std::ptr::null_mut();
        let err = (self.dev_get_port)(device, &mut port);
        if err != GC_ERR_SUCCESS {
            return Err(GenicamError::Transport(format!("DevGetPort failed: {err}")));
        }
        Ok(port)
    }

    /// # Safety
    /// `iface` must be a valid, open interface handle; `device_id` must be
    /// NUL-terminatable (no interior NUL bytes).
    pub unsafe fn open_device(&self, iface: IfHandle, device_id: &str) -> Result<DevHandle> {
        let cid = CString::new(device_id)
            .map_err(|_| GenicamError::Transport("device id contains NUL byte".into()))?;
        let mut dev: DevHandle = std::ptr::null_mut();
        let err = (self.if_open_device)(iface, cid.as_ptr(), 0, &mut dev);
        if err != GC_ERR_SUCCESS {
            return Err(GenicamError::Transport(format!("IFOpenDevice failed: {err}")));
        }
        Ok(dev)
    }

    /// Open the device's (only, for the producers this targets) data
    /// stream.
    ///
    /// # Safety
    /// `device` must be a valid, open device handle.
    pub unsafe fn open_data_stream(&self, device: DevHandle, stream_id: &str) -> Result<DsHandle> {
        let cid = CString::new(stream_id)
            .map_err(|_| GenicamError::Transport("stream id contains NUL byte".into()))?;
        let mut ds: DsHandle = std::ptr::null_mut();
        let err = (self.dev_open_data_stream)(device, cid.as_ptr(), &mut ds);
        if err != GC_ERR_SUCCESS {
            return Err(GenicamError::Transport(format!("DevOpenDataStream failed: {err}")));
        }
        Ok(ds)
    }

    /// Hand a buffer to the producer. `private_data` tags the announced
    /// buffer so the acquisition loop can map a delivered buffer id back to
    /// its backing allocation.
    ///
    /// # Safety
    /// `buffer` must stay valid and unmoved until revoked; `len` must not
    /// exceed its allocation.
    pub unsafe fn announce_buffer(&self, stream: DsHandle, buffer: &mut [u8], private_data: *mut c_void) -> Result<u64> {
        let mut buffer_handle: u64 = 0;
        let err = (self.ds_announce_buffer)(
            stream,
            buffer.as_mut_ptr() as *mut c_void,
            buffer.len(),
            private_data,
            &mut buffer_handle,
        );
        if err != GC_ERR_SUCCESS {
            return Err(GenicamError::Transport(format!("DSAnnounceBuffer failed: {err}")));
        }
        Ok(buffer_handle)
    }

    /// Queue an announced buffer for the producer to fill.
    ///
    /// # Safety
    /// `buffer_handle` must come from a prior [`Self::announce_buffer`] on
    /// the same stream.
    pub unsafe fn queue_buffer(&self, stream: DsHandle, buffer_handle: u64) -> Result<()> {
        let err = (self.ds_queue_buffer)(stream, buffer_handle);
        if err != GC_ERR_SUCCESS {
            return Err(GenicamError::Transport(format!("DSQueueBuffer failed: {err}")));
        }
        Ok(())
    }

    /// # Safety
    /// `stream` must be a valid, open data stream handle with buffers
    /// already queued.
    pub unsafe fn start_acquisition(&self, stream: DsHandle) -> Result<()> {
        // ACQ_START_FLAGS_DEFAULT, unbounded frame count.
        let err = (self.ds_start_acquisition)(stream, 0, -1);
        if err != GC_ERR_SUCCESS {
            return Err(GenicamError::Transport(format!("DSStartAcquisition failed: {err}")));
        }
        Ok(())
    }

    /// # Safety
    /// `stream` must be a valid, open data stream handle.
    pub unsafe fn stop_acquisition(&self, stream: DsHandle) -> Result<()> {
        let err = (self.ds_stop_acquisition)(stream, 0);
        if err != GC_ERR_SUCCESS {
            return Err(GenicamError::Transport(format!("DSStopAcquisition failed: {err}")));
        }
        Ok(())
    }

    /// Discard every buffer queued on `stream`, part of `stop_stream`'s
    /// teardown sequence after the acquisition thread has been joined.
    ///
    /// # Safety
    /// `stream` must be a valid, open data stream handle.
    pub unsafe fn flush_queue(&self, stream: DsHandle) -> Result<()> {
        let err = (self.ds_flush_queue)(stream, DS_FLUSH_ALL_DISCARD);
        if err != GC_ERR_SUCCESS {
            return Err(GenicamError::Transport(format!("DSFlushQueue failed: {err}")));
        }
        Ok(())
    }

    /// Hand a previously announced buffer back from the producer. Part of
    /// `stop_stream`'s teardown, after acquisition has stopped and the
    /// queue has been flushed — the backing allocation is only safe to
    /// free once this returns.
    ///
    /// # Safety
    /// `buffer_handle` must come from a prior [`Self::announce_buffer`] on
    /// `stream`, not currently queued.
    pub unsafe fn revoke_buffer(&self, stream: DsHandle, buffer_handle: u64) -> Result<()> {
        let mut base: *mut c_void = std::ptr::null_mut();
        let mut private_data: *mut c_void = std::ptr::null_mut();
        let err = (self.ds_revoke_buffer)(stream, buffer_handle, &mut base, &mut private_data);
        if err != GC_ERR_SUCCESS {
            return Err(GenicamError::Transport(format!("DSRevokeBuffer failed: {err}")));
        }
        Ok(())
    }

    /// Register for `EVENT_NEW_BUFFER` notifications on `stream`'s event
    /// source. Returns `None` if the producer doesn't implement event
    /// notification, in which case the acquisition loop must poll instead.
    ///
    /// # Safety
    /// `stream` must be a valid, open data stream handle, used here as the
    /// event source (GenTL allows registering events against several
    /// module handle kinds; data streams are the one this crate uses).
    pub unsafe fn register_new_buffer_event(&self, stream: DsHandle) -> Result<Option<EventHandle>> {
        let Some(register) = self.gc_register_event else { return Ok(None) };
        let mut event: EventHandle = std::ptr::null_mut();
        let err = register(stream, EVENT_NEW_BUFFER, &mut event);
        if err != GC_ERR_SUCCESS {
            return Err(GenicamError::Transport(format!("GCRegisterEvent failed: {err}")));
        }
        Ok(Some(event))
    }

    /// Block until a new-buffer event arrives (or `timeout_ms` elapses) and
    /// return the delivered buffer handle, which `EVENT_NEW_BUFFER` payloads
    /// carry as their first 8 bytes.
    ///
    /// # Safety
    /// `event` must come from [`Self::register_new_buffer_event`] on a
    /// still-open stream.
    pub unsafe fn wait_new_buffer_event(&self, event: EventHandle, timeout_ms: u64) -> Result<u64> {
        let Some(get_data) = self.event_get_data else {
            return Err(GenicamError::Transport("producer has no EventGetData".into()));
        };
        let mut buf = [0u8; 8];
        let mut size = buf.len();
        let err = get_data(event, buf.as_mut_ptr() as *mut c_void, &mut size, timeout_ms);
        match err {
            GC_ERR_SUCCESS => Ok(u64::from_ne_bytes(buf)),
            GC_ERR_NO_DATA => Err(GenicamError::NoData),
            other => Err(GenicamError::Transport(format!("EventGetData failed: {other}"))),
        }
    }

    /// Unblock a thread parked in [`Self::wait_new_buffer_event`] — the
    /// first step of `stop_stream`'s teardown sequence.
    ///
    /// # Safety
    /// `event` must come from [`Self::register_new_buffer_event`].
    pub unsafe fn kill_event(&self, event: EventHandle) -> Result<()> {
        let Some(kill) = self.gc_event_kill else { return Ok(()) };
        let err = kill(event);
        if err != GC_ERR_SUCCESS {
            return Err(GenicamError::Transport(format!("GCEventKill failed: {err}")));
        }
        Ok(())
    }
}

// SAFETY: the loaded function pointers are plain data once resolved, and
// the vendor .cti modules this targets are documented to tolerate calls
// from any thread as long as they're serialized — callers are expected to
// hold the device behind a single-owner handle (see `bootstrap.rs`).
unsafe impl Send for GenTl {}
unsafe impl Sync for GenTl {}
