use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use pow_ledger::config::Config;
use pow_ledger::{api, ledger};

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::get_pending_transactions,
        api::handlers::new_transaction,
        api::handlers::mine_block,
        api::handlers::validate_chain
    ),
    components(
        schemas(
            ledger::Block,
            ledger::Transaction,
            api::handlers::ErrorResponse,
            api::handlers::ChainResponse,
            api::handlers::TransactionRequest,
            api::handlers::TransactionResponse,
            api::handlers::ValidateResponse
        )
    ),
    tags(
        (name = "ledger", description = "Proof-of-work ledger endpoints")
    ),
    info(
        title = "Ledger API",
        version = "0.1.0",
        description = "A minimal proof-of-work ledger",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::parse();

    let ledger = ledger::Ledger::new(config.difficulty)
        .context("failed to create the ledger")?;
    let state = web::Data::new(api::AppState::new(ledger, config.mine_timeout()));

    info!(
        "Running ledger server at http://{}:{} (difficulty {}, mine timeout {:?})",
        config.host,
        config.port,
        config.difficulty,
        config.mine_timeout()
    );

    // Start HTTP server
    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .run()
    .await
    .context("HTTP server stopped with an error")?;

    Ok(())
}
