mod handlers;
mod route;
mod server;

pub use handlers::ServiceInfo;
pub use route::{Route, RESERVED_PATHS};
pub use server::HttpComponent;
