/**
 * Command Module
 *
 * Remote operator channel: one UTF-8 text command per datagram, decoded
 * into exactly one DriftCompensator call.
 */

pub mod protocol;
pub mod server;

pub use protocol::Command;
pub use server::CommandServer;
