//! User and group name lookup through the host identity database.

use crate::RuntimeError;
use std::ffi::CString;

const MAX_BUF: usize = 1 << 20;

fn c_name(kind: &str, name: &str) -> Result<CString, RuntimeError> {
    CString::new(name).map_err(|_| RuntimeError::UnknownIdentity(format!("{kind} '{name}'")))
}

#[allow(unsafe_code)]
pub fn lookup_user(name: &str) -> Result<u32, RuntimeError> {
    let c_name = c_name("user", name)?;
    let mut buf: Vec<libc::c_char> = vec![0; 1024];
    loop {
        // SAFETY: an all-zero passwd is a valid out-parameter; getpwnam_r fills it.
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        // SAFETY: every pointer refers to a live local and buf.len() is the
        // true capacity of buf.
        let rc = unsafe {
            libc::getpwnam_r(
                c_name.as_ptr(),
                &raw mut pwd,
                buf.as_mut_ptr(),
                buf.len(),
                &raw mut result,
            )
        };
        if rc == libc::ERANGE && buf.len() < MAX_BUF {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 {
            return Err(RuntimeError::Io(std::io::Error::from_raw_os_error(rc)));
        }
        if result.is_null() {
            return Err(RuntimeError::UnknownIdentity(format!("user '{name}'")));
        }
        return Ok(pwd.pw_uid);
    }
}

#[allow(unsafe_code)]
pub fn lookup_group(name: &str) -> Result<u32, RuntimeError> {
    let c_name = c_name("group", name)?;
    let mut buf: Vec<libc::c_char> = vec![0; 1024];
    loop {
        // SAFETY: an all-zero group is a valid out-parameter; getgrnam_r fills it.
        let mut grp: libc::group = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::group = std::ptr::null_mut();
        // SAFETY: every pointer refers to a live local and buf.len() is the
        // true capacity of buf.
        let rc = unsafe {
            libc::getgrnam_r(
                c_name.as_ptr(),
                &raw mut grp,
                buf.as_mut_ptr(),
                buf.len(),
                &raw mut result,
            )
        };
        if rc == libc::ERANGE && buf.len() < MAX_BUF {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 {
            return Err(RuntimeError::Io(std::io::Error::from_raw_os_error(rc)));
        }
        if result.is_null() {
            return Err(RuntimeError::UnknownIdentity(format!("group '{name}'")));
        }
        return Ok(grp.gr_gid);
    }
}
