pub mod handlers;
pub mod model;
pub mod service;
pub mod store;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::otp_routes()
}
