pub mod apps;
pub mod channel;
pub mod config;
pub mod logger;
pub mod message;
pub mod node;
pub mod nodes;
pub mod pipeline;
pub mod remoteadmin;
pub mod schema;
pub mod settings;
pub mod store;
