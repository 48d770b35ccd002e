use std::ffi::CStr;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6};

use anyhow::{anyhow, bail, Context};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressFamily {
    V4,
    V6,
}
impl AddressFamily {
    pub fn of(addr: &SocketAddr) -> AddressFamily {
        match addr {
            SocketAddr::V4(_) => AddressFamily::V4,
            SocketAddr::V6(_) => AddressFamily::V6,
        }
    }

    fn matches(&self, addr: &SocketAddr) -> bool {
        AddressFamily::of(addr) == *self
    }
}


/// Looks up the address a probing socket binds to. Interfaces come and go on the nodes this
///  runs on, so this is called anew for every session.
#[cfg_attr(test, mockall::automock)]
pub trait InterfaceResolver: Send + Sync {
    /// The first address of the given family on the interface (port 0). Fails if the interface
    ///  does not exist (right now), or if it has no address of that family.
    fn interface_address(&self, interface: &str, family: AddressFamily) -> anyhow::Result<SocketAddr>;
}


/// Resolves interface addresses from the operating system's current interface list
pub struct SystemInterfaces;

impl InterfaceResolver for SystemInterfaces {
    fn interface_address(&self, interface: &str, family: AddressFamily) -> anyhow::Result<SocketAddr> {
        let addresses = interface_addresses()?;

        if !addresses.iter().any(|(name, _)| name == interface) {
            bail!("interface {} does not exist", interface);
        }

        addresses.into_iter()
            .find(|(name, addr)| name == interface && family.matches(addr))
            .map(|(_, addr)| addr)
            .ok_or_else(|| anyhow!("interface {} has no {:?} address", interface, family))
    }
}

fn interface_addresses() -> anyhow::Result<Vec<(String, SocketAddr)>> {
    let mut ifap: *mut libc::ifaddrs = std::ptr::null_mut();

    // SAFETY: ifap is a valid out pointer; the list is freed below
    if unsafe { libc::getifaddrs(&mut ifap) } != 0 {
        return Err(io::Error::last_os_error()).context("error listing network interfaces");
    }

    let mut result = Vec::new();
    let mut cur = ifap;
    while !cur.is_null() {
        // SAFETY: cur is a non-null element of the list returned by getifaddrs
        let entry = unsafe { &*cur };

        if !entry.ifa_name.is_null() && !entry.ifa_addr.is_null() {
            // SAFETY: both pointers are non-null and owned by the list
            let name = unsafe { CStr::from_ptr(entry.ifa_name) }.to_string_lossy().into_owned();
            if let Some(addr) = unsafe { to_socket_addr(entry.ifa_addr) } {
                result.push((name, addr));
            }
        }
        cur = entry.ifa_next;
    }

    // SAFETY: ifap was returned by getifaddrs and is not used after this
    unsafe { libc::freeifaddrs(ifap) };
    Ok(result)
}

/// SAFETY: `sa` must point to a valid sockaddr whose actual size matches its address family
unsafe fn to_socket_addr(sa: *const libc::sockaddr) -> Option<SocketAddr> {
    match (*sa).sa_family as libc::c_int {
        libc::AF_INET => {
            let sin = &*(sa as *const libc::sockaddr_in);
            let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
            Some(SocketAddr::new(IpAddr::V4(ip), 0))
        }
        libc::AF_INET6 => {
            let sin6 = &*(sa as *const libc::sockaddr_in6);
            let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
            Some(SocketAddr::V6(SocketAddrV6::new(ip, 0, 0, sin6.sin6_scope_id)))
        }
        _ => None,
    }
}
