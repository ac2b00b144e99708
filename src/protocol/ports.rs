use serialport::{SerialPortInfo, SerialPortType};
use std::collections::HashSet;

/// Return the list of available serial ports, USB adapters first.
pub fn available_ports_sorted() -> Vec<SerialPortInfo> {
    let raw_ports = serialport::available_ports().unwrap_or_default();
    sort_and_dedup_ports(raw_ports)
}

pub(crate) fn sort_and_dedup_ports(raw_ports: Vec<SerialPortInfo>) -> Vec<SerialPortInfo> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut ports: Vec<SerialPortInfo> = raw_ports
        .into_iter()
        .filter(|p| seen.insert(p.port_name.to_lowercase()))
        .collect();

    // Wi-SUN dongles enumerate as USB serial (ttyUSB / ttyACM)
    fn priority(port: &SerialPortInfo) -> i32 {
        let n = port.port_name.to_lowercase();
        if matches!(port.port_type, SerialPortType::UsbPort(_)) || n.contains("usb") {
            0
        } else if n.contains("acm") {
            1
        } else {
            2
        }
    }

    ports.sort_by(|a, b| {
        priority(a)
            .cmp(&priority(b))
            .then_with(|| a.port_name.cmp(&b.port_name))
    });
    ports
}

/// One-line human description of a port.
pub fn describe_port(port: &SerialPortInfo) -> String {
    match &port.port_type {
        SerialPortType::UsbPort(info) => format!(
            "{} (USB vid:{:04x} pid:{:04x}{})",
            port.port_name,
            info.vid,
            info.pid,
            info.product
                .as_deref()
                .map(|p| format!(" {p}"))
                .unwrap_or_default()
        ),
        SerialPortType::PciPort => format!("{} (PCI)", port.port_name),
        SerialPortType::BluetoothPort => format!("{} (Bluetooth)", port.port_name),
        SerialPortType::Unknown => port.port_name.clone(),
    }
}
