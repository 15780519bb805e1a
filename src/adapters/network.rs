use local_ip_address::list_afinet_netifas;

use crate::ports::{InterfaceSource, NetworkInterface};

/// Interface listing from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> Vec<NetworkInterface> {
        match list_afinet_netifas() {
            Ok(list) => list
                .into_iter()
                .map(|(name, addr)| NetworkInterface::new(name, addr))
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to enumerate network interfaces: {}", e);
                Vec::new()
            }
        }
    }
}
