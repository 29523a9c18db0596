pub mod opcodes;
pub mod transport;

pub use opcodes::decode;
pub use transport::SimulatedTransport;
