use actix_web::{error, web, HttpResponse};
use log::warn;

use super::handlers::{self, ErrorResponse};

/// JSON extractor settings: a body that fails to decode becomes a 400 with
/// an error message instead of the default plain-text reply
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let message = format!("Invalid request body: {}", err);
        warn!("{}", message);
        let response = HttpResponse::BadRequest().json(ErrorResponse { error: message });
        error::InternalError::from_response(err, response).into()
    })
}

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/transaction/new", web::post().to(handlers::new_transaction))
        .route("/mine", web::get().to(handlers::mine_block))
        .route("/chain", web::get().to(handlers::get_chain))
        .route("/transactions/pending", web::get().to(handlers::get_pending_transactions))
        .route("/validate", web::get().to(handlers::validate_chain));
}
