// src/io/serial/mod.rs
//
// Serial link support.
//
// - framer: line accumulator turning read chunks into records
// - reader: blocking serial port thread with a transmit channel

pub mod framer;
pub mod reader;

pub use framer::LineAccumulator;
pub use reader::{
    list_serial_ports, SerialConfig, SerialEvent, SerialPortInfo, SerialReader, SerialTransmitter,
};
