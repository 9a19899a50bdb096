use std::time::Duration;

use actix_web::{web, HttpResponse, Responder};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ledger::{Block, BlockchainError, CancelToken, Ledger};

/// Shared state handed to every handler
pub struct AppState {
    pub ledger: Ledger,

    /// Longest a single /mine request may search
    pub mine_timeout: Duration,
}

impl AppState {
    pub fn new(ledger: Ledger, mine_timeout: Duration) -> Self {
        AppState {
            ledger,
            mine_timeout,
        }
    }
}

/// Data structure for the ledger state
pub type LedgerData = web::Data<AppState>;

/// Error body returned by every failing endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// The length of the chain
    pub length: usize,
}

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The sender's identifier
    pub sender: String,

    /// The recipient's identifier
    pub recipient: String,

    /// The amount to transfer
    pub amount: i64,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    /// The message
    pub message: String,

    /// 1-based position of the transaction within the next block
    pub position: usize,

    /// The index of the block expected to include this transaction
    pub block_index: u64,
}

/// Response for the validate endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
    pub length: usize,

    /// First problem found, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<String>,
}

/// Maps a ledger error to its HTTP response
fn error_response(err: &BlockchainError) -> HttpResponse {
    let body = ErrorResponse {
        error: err.to_string(),
    };

    match err {
        BlockchainError::InvalidInput(_) => HttpResponse::BadRequest().json(body),
        BlockchainError::MiningInProgress => HttpResponse::Conflict().json(body),
        BlockchainError::MiningCancelled => HttpResponse::ServiceUnavailable().json(body),
        BlockchainError::Serialization(_)
        | BlockchainError::EmptyChain
        | BlockchainError::InvalidDifficulty(_)
        | BlockchainError::SystemError(_) => {
            error!("Ledger failure: {}", err);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

/// Get the full chain
///
/// Returns every sealed block and the chain length
#[utoipa::path(
    get,
    path = "/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_chain(state: LedgerData) -> impl Responder {
    match state.ledger.chain() {
        Ok(chain) => HttpResponse::Ok().json(ChainResponse {
            length: chain.len(),
            chain,
        }),
        Err(err) => error_response(&err),
    }
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<crate::ledger::Transaction>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_pending_transactions(state: LedgerData) -> impl Responder {
    match state.ledger.pending_transactions() {
        Ok(transactions) => HttpResponse::Ok().json(transactions),
        Err(err) => error_response(&err),
    }
}

/// Create a new transaction
///
/// Adds a new transaction to the pending pool
#[utoipa::path(
    post,
    path = "/transaction/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction queued", body = TransactionResponse),
        (status = 400, description = "Invalid transaction data", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn new_transaction(
    state: LedgerData,
    transaction_req: web::Json<TransactionRequest>,
) -> impl Responder {
    let TransactionRequest {
        sender,
        recipient,
        amount,
    } = transaction_req.into_inner();

    let position = match state.ledger.submit(sender, recipient, amount) {
        Ok(position) => position,
        Err(err) => return error_response(&err),
    };

    match state.ledger.last_block() {
        Ok(last_block) => {
            let block_index = last_block.index() + 1;
            HttpResponse::Created().json(TransactionResponse {
                message: format!("Transaction will be added to Block {}", block_index),
                position,
                block_index,
            })
        }
        Err(err) => error_response(&err),
    }
}

/// Mine a new block
///
/// Seals all pending transactions into a new block. A request arriving
/// while another block is being mined is answered with 409.
#[utoipa::path(
    get,
    path = "/mine",
    responses(
        (status = 200, description = "Block mined successfully", body = Block),
        (status = 409, description = "Another mining request is in progress", body = ErrorResponse),
        (status = 503, description = "Mining was cancelled or timed out", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn mine_block(state: LedgerData) -> impl Responder {
    let cancel = CancelToken::new();
    let ledger = state.ledger.clone();
    let worker_cancel = cancel.clone();
    let search = web::block(move || ledger.try_mine(&worker_cancel));
    tokio::pin!(search);

    let outcome = match tokio::time::timeout(state.mine_timeout, &mut search).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!("Mining timed out after {:?}", state.mine_timeout);
            // The worker sees the token on its next attempt, unless it has
            // already sealed; either way its own result is the answer.
            cancel.cancel();
            search.await
        }
    };

    match outcome {
        Ok(Ok(block)) => HttpResponse::Ok().json(block),
        Ok(Err(err)) => error_response(&err),
        Err(err) => {
            error!("Mining worker failed: {}", err);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: format!("Mining worker failed: {}", err),
            })
        }
    }
}

/// Check if the chain is valid
///
/// Validates links and proofs of the entire chain
#[utoipa::path(
    get,
    path = "/validate",
    responses(
        (status = 200, description = "Chain validation status", body = ValidateResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn validate_chain(state: LedgerData) -> impl Responder {
    let chain = match state.ledger.chain() {
        Ok(chain) => chain,
        Err(err) => return error_response(&err),
    };

    let violation = state.ledger.validate(&chain).err();
    HttpResponse::Ok().json(ValidateResponse {
        valid: violation.is_none(),
        length: chain.len(),
        violation: violation.map(|v| v.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::Value;
    use std::thread;

    fn state(difficulty: u8, mine_timeout: Duration) -> LedgerData {
        web::Data::new(AppState::new(
            Ledger::new(difficulty).unwrap(),
            mine_timeout,
        ))
    }

    #[actix_web::test]
    async fn test_new_transaction() {
        let state = state(1, Duration::from_secs(5));
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/transaction/new")
            .set_json(serde_json::json!({ "sender": "alice", "recipient": "bob", "amount": 50 }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["position"], 1);
        assert_eq!(body["blockIndex"], 2);
        assert_eq!(state.ledger.pending_transactions().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_new_transaction_rejects_blank_sender() {
        let state = state(1, Duration::from_secs(5));
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/transaction/new")
            .set_json(serde_json::json!({ "sender": "", "recipient": "bob", "amount": 50 }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("sender"));
        assert!(state.ledger.pending_transactions().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_malformed_body_is_a_bad_request() {
        let state = state(1, Duration::from_secs(5));
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/transaction/new")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"sender\": \"alice\", \"amount\": \"lots\"}")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn test_mine_and_get_chain() {
        let state = state(1, Duration::from_secs(5));
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_routes),
        )
        .await;
        state.ledger.submit("alice", "bob", 50).unwrap();
        state.ledger.submit("bob", "carol", 20).unwrap();

        let req = test::TestRequest::get().uri("/mine").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let block: Value = test::read_body_json(resp).await;
        assert_eq!(block["index"], 2);
        assert_eq!(block["transactions"].as_array().unwrap().len(), 2);
        assert_eq!(block["transactions"][0]["sender"], "alice");
        assert!(block["previousHash"].is_string());
        assert!(block["proof"].is_u64());
        assert!(block["timestamp"].is_i64());

        let req = test::TestRequest::get().uri("/chain").to_request();
        let chain: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(chain["length"], 2);
        assert_eq!(chain["chain"][1], block);

        let req = test::TestRequest::get().uri("/validate").to_request();
        let validation: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(validation["valid"], true);
        assert!(validation.get("violation").is_none());

        let req = test::TestRequest::get().uri("/transactions/pending").to_request();
        let pending: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(pending, serde_json::json!([]));
    }

    #[actix_web::test]
    async fn test_concurrent_mine_is_a_conflict() {
        let state = state(64, Duration::from_secs(5));
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_routes),
        )
        .await;

        let cancel = CancelToken::new();
        let background = {
            let ledger = state.ledger.clone();
            let cancel = cancel.clone();
            thread::spawn(move || ledger.mine_with_cancel(&cancel))
        };

        // Wait until the background miner owns the miner guard.
        let stopped = CancelToken::new();
        stopped.cancel();
        let mut busy = false;
        for _ in 0..200 {
            if let Err(BlockchainError::MiningInProgress) = state.ledger.try_mine(&stopped) {
                busy = true;
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(busy);

        let req = test::TestRequest::get().uri("/mine").to_request();
        let resp = test::call_service(&app, req).await;
        cancel.cancel();

        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert!(matches!(
            background.join().unwrap(),
            Err(BlockchainError::MiningCancelled)
        ));
    }

    #[actix_web::test]
    async fn test_mine_timeout_keeps_pending() {
        let state = state(64, Duration::from_millis(50));
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_routes),
        )
        .await;
        state.ledger.submit("alice", "bob", 50).unwrap();

        let req = test::TestRequest::get().uri("/mine").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.ledger.chain().unwrap().len(), 1);
        assert_eq!(state.ledger.pending_transactions().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_mine_timeout_answers_with_the_worker_result() {
        for _ in 0..10 {
            let state = state(0, Duration::ZERO);
            let app = test::init_service(
                App::new()
                    .app_data(state.clone())
                    .configure(configure_routes),
            )
            .await;
            state.ledger.submit("alice", "bob", 50).unwrap();

            let req = test::TestRequest::get().uri("/mine").to_request();
            let resp = test::call_service(&app, req).await;

            let chain_len = state.ledger.chain().unwrap().len();
            let pending_len = state.ledger.pending_transactions().unwrap().len();
            match resp.status() {
                StatusCode::OK => {
                    assert_eq!(chain_len, 2);
                    assert_eq!(pending_len, 0);
                }
                StatusCode::SERVICE_UNAVAILABLE => {
                    assert_eq!(chain_len, 1);
                    assert_eq!(pending_len, 1);
                }
                other => panic!("unexpected status {}", other),
            }
        }
    }
}
