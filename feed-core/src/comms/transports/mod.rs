pub mod memory;
pub mod zmq;
