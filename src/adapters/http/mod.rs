//! HTTP surface: SSE analysis stream, insights and document endpoints.

pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ErrorResponse, UserId, USER_ID_HEADER};
pub use server::{build_router, AuditHttpServer};
pub use state::AppState;
