use std::ffi::CStr;
use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context};
use tracing::debug;

pub const DEFAULT_NODE_ID_FILE: &str = "/etc/nne-nodeid";

/// The node number identifies the measurement node. It is read from the node ID file if
///  possible, and derived from the host name otherwise.
pub fn resolve_node_number(node_id_file: &Path) -> anyhow::Result<u32> {
    match read_node_id_file(node_id_file) {
        Ok(node_number) => return Ok(node_number),
        Err(e) => debug!("no node number from {:?}, trying host name: {:#}", node_id_file, e),
    }

    let hostname = hostname()?;
    node_number_from_hostname(&hostname)
        .ok_or_else(|| anyhow!("can not determine node number: no valid node ID file {:?}, and host name {:?} has no node number", node_id_file, hostname))
}

pub fn read_node_id_file(path: &Path) -> anyhow::Result<u32> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("error reading {:?}", path))?;
    let content = content.trim();
    content.parse()
        .with_context(|| format!("invalid node number {:?} in {:?}", content, path))
}

/// Host names of measurement nodes consist of a three-letter prefix followed by the node number,
///  e.g. `nne412` or `nne412.example.org`
pub fn node_number_from_hostname(hostname: &str) -> Option<u32> {
    let host = hostname.split('.').next()?;
    if host.len() <= 3 || !host.is_char_boundary(3) {
        return None;
    }

    let (prefix, digits) = host.split_at(3);
    if !prefix.chars().all(|c| c.is_ascii_alphabetic()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn hostname() -> anyhow::Result<String> {
    let mut buf = [0u8; 256];

    // SAFETY: the buffer is valid for its full length
    if unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) } != 0 {
        return Err(io::Error::last_os_error()).context("error getting host name");
    }

    let name = CStr::from_bytes_until_nul(&buf)
        .map_err(|_| anyhow!("host name is not terminated"))?;
    Ok(name.to_string_lossy().into_owned())
}
