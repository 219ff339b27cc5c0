//! IOKit port: all unsafe FFI for the AppleSMC user client lives here,
//! behind the [`SmcPort`] seam. Every `unsafe` block carries a SAFETY
//! note; no raw pointer escapes this module.
//!
//! On platforms without IOKit the port still exists but `open` fails
//! with `ServiceNotFound`, so the rest of the crate builds and tests
//! everywhere.

#[cfg(not(target_os = "macos"))]
use crate::error::SmcError;
#[cfg(not(target_os = "macos"))]
use crate::session::{SmcKeyData, SmcPort, Selector};

#[cfg(target_os = "macos")]
mod ffi {
    use std::ffi::{c_char, c_void};

    pub type KernReturn = i32;
    pub type MachPort = u32;
    pub type IoObject = u32;
    pub type IoConnect = u32;
    pub type IoService = u32;

    pub const KERN_SUCCESS: KernReturn = 0;
    pub const MASTER_PORT_DEFAULT: MachPort = 0;

    #[link(name = "IOKit", kind = "framework")]
    unsafe extern "C" {
        pub fn IOServiceMatching(name: *const c_char) -> *mut c_void;
        pub fn IOServiceGetMatchingService(master: MachPort, matching: *mut c_void) -> IoService;
        pub fn IOServiceOpen(
            service: IoService,
            owning_task: MachPort,
            conn_type: u32,
            connect: *mut IoConnect,
        ) -> KernReturn;
        pub fn IOServiceClose(connect: IoConnect) -> KernReturn;
        pub fn IOObjectRelease(object: IoObject) -> KernReturn;
        pub fn IOConnectCallStructMethod(
            connection: IoConnect,
            selector: u32,
            input: *const c_void,
            input_size: usize,
            output: *mut c_void,
            output_size: *mut usize,
        ) -> KernReturn;
    }
}

#[cfg(target_os = "macos")]
pub use macos::IoKitPort;

#[cfg(target_os = "macos")]
mod macos {
    use std::ffi::c_void;
    use std::mem;

    use tracing::warn;

    use super::ffi;
    use crate::error::SmcError;
    use crate::session::{KERNEL_INDEX_SMC, SmcKeyData, SmcPort, Selector};

    /// Handle to the AppleSMC user client.
    pub struct IoKitPort {
        connection: ffi::IoConnect,
    }

    impl IoKitPort {
        pub fn new() -> Self {
            IoKitPort { connection: 0 }
        }
    }

    impl Default for IoKitPort {
        fn default() -> Self {
            IoKitPort::new()
        }
    }

    impl SmcPort for IoKitPort {
        fn open(&mut self) -> Result<(), SmcError> {
            // SAFETY: IOServiceMatching copies the C string; the returned
            // dictionary is consumed by IOServiceGetMatchingService, and
            // the service object is released after IOServiceOpen.
            unsafe {
                let matching = ffi::IOServiceMatching(c"AppleSMC".as_ptr());
                if matching.is_null() {
                    return Err(SmcError::ServiceNotFound);
                }
                let service =
                    ffi::IOServiceGetMatchingService(ffi::MASTER_PORT_DEFAULT, matching);
                if service == 0 {
                    return Err(SmcError::ServiceNotFound);
                }
                let mut connection: ffi::IoConnect = 0;
                let kr = ffi::IOServiceOpen(
                    service,
                    libc::mach_task_self(),
                    0,
                    &mut connection,
                );
                ffi::IOObjectRelease(service);
                if kr != ffi::KERN_SUCCESS {
                    warn!("IOServiceOpen failed with status {kr:#010x}");
                    return Err(SmcError::Kernel { code: kr });
                }
                self.connection = connection;
                Ok(())
            }
        }

        fn call(&mut self, _selector: Selector, input: &SmcKeyData) -> Result<SmcKeyData, SmcError> {
            let mut output = SmcKeyData::default();
            let mut output_size = mem::size_of::<SmcKeyData>();
            // SAFETY: input and output are #[repr(C)] structures of the
            // exact size the user client expects; both live on the stack
            // for the duration of the call.
            let kr = unsafe {
                ffi::IOConnectCallStructMethod(
                    self.connection,
                    KERNEL_INDEX_SMC,
                    input as *const SmcKeyData as *const c_void,
                    mem::size_of::<SmcKeyData>(),
                    &mut output as *mut SmcKeyData as *mut c_void,
                    &mut output_size,
                )
            };
            if kr != ffi::KERN_SUCCESS {
                return Err(SmcError::Kernel { code: kr });
            }
            Ok(output)
        }

        fn close(&mut self) {
            if self.connection != 0 {
                // SAFETY: the connection was obtained from IOServiceOpen
                // and is closed exactly once.
                unsafe {
                    ffi::IOServiceClose(self.connection);
                }
                self.connection = 0;
            }
        }
    }
}

/// Stub port for platforms without the SMC service.
#[cfg(not(target_os = "macos"))]
pub struct IoKitPort;

#[cfg(not(target_os = "macos"))]
impl IoKitPort {
    pub fn new() -> Self {
        IoKitPort
    }
}

#[cfg(not(target_os = "macos"))]
impl Default for IoKitPort {
    fn default() -> Self {
        IoKitPort::new()
    }
}

#[cfg(not(target_os = "macos"))]
impl SmcPort for IoKitPort {
    fn open(&mut self) -> Result<(), SmcError> {
        Err(SmcError::ServiceNotFound)
    }

    fn call(&mut self, _selector: Selector, _input: &SmcKeyData) -> Result<SmcKeyData, SmcError> {
        Err(SmcError::NotOpen)
    }

    fn close(&mut self) {}
}
