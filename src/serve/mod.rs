//! Dev server and browser reload push.

pub mod reload;
pub mod server;

pub use reload::ReloadHub;
pub use server::DevServer;
