pub mod command;
pub mod jsonrpc;
pub mod legacy;
