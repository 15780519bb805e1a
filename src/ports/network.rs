use std::net::IpAddr;

/// One address bound to a host network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub addr: IpAddr,
    /// Loopback / host-internal address
    pub internal: bool,
}

impl NetworkInterface {
    pub fn new(name: impl Into<String>, addr: IpAddr) -> Self {
        Self {
            name: name.into(),
            internal: addr.is_loopback(),
            addr,
        }
    }
}

/// InterfaceSource defines the port for enumerating the host's network interfaces
pub trait InterfaceSource: Send + Sync + 'static {
    /// List interface addresses in the order the operating system reports them.
    /// Enumeration failures yield an empty list; callers fall back to loopback.
    fn interfaces(&self) -> Vec<NetworkInterface>;
}
