// Handler modules
pub mod scan;
pub mod server;

// Re-export all handler functions
pub use scan::{build_options, handle_scan};
pub use server::handle_server;
