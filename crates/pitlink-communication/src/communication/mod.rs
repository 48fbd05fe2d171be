//! Physical link layer: serial ports and the threaded device links built
//! on top of them.

pub mod link;
pub mod serial;

pub use link::{DeviceLink, FrameSink, Link};
pub use serial::{list_ports, RealSerialPort, SerialPort, SerialPortInfo};
