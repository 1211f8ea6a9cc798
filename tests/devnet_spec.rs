//! Devnet JSON-RPC router tests.
//!
//! Tests are organized by method: health, batch execution, object reads,
//! history queries, and protocol-level errors.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use universe_builder::devnet::{create_router, AuthConfig};
use universe_builder::ledger::*;
use universe_builder::models::*;
use universe_builder::plan::*;

fn target() -> MoveTarget {
    MoveTarget::new(ObjectId::from_u128(0x2a), "universe")
}

fn setup_with(auth: AuthConfig) -> (Arc<MemoryLedger>, TestServer) {
    let ledger = Arc::new(MemoryLedger::new(target()));
    let app = create_router(ledger.clone(), auth);
    let server = TestServer::new(app).expect("Failed to create test server");
    (ledger, server)
}

fn setup() -> (Arc<MemoryLedger>, TestServer) {
    setup_with(AuthConfig::disabled())
}

async fn call(server: &TestServer, method: &str, params: Value) -> Value {
    let response = server
        .post("/")
        .json(&json!({ "jsonrpc": "2.0", "id": 7, "method": method, "params": params }))
        .await;
    response.assert_status_ok();
    response.json::<Value>()
}

fn sender() -> Address {
    Address::from_u128(0xa11ce)
}

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_ok() {
        let (_, server) = setup();
        let body = server.get("/health").await.json::<Value>();
        assert_eq!(body["status"], "ok");
    }
}

mod execute_batch {
    use super::*;

    #[tokio::test]
    async fn commits_and_returns_receipt() {
        let (ledger, server) = setup();
        let seq = Planner::new(target())
            .build(UniverseRef::New, GalaxyDef::new("G").with_star(StarDef::new("S", 2)))
            .unwrap();

        let body = call(&server, "universe_executeBatch", json!([sender(), seq])).await;

        assert_eq!(body["id"], 7);
        let receipt: ExecutionReceipt = serde_json::from_value(body["result"].clone()).unwrap();
        assert_eq!(receipt.object_changes.len(), 3);
        assert_eq!(ledger.universe_ids().len(), 1);
    }

    #[tokio::test]
    async fn rejects_forward_references_as_invalid_params() {
        let (ledger, server) = setup();
        let bad = json!({
            "root": "new",
            "operations": [{
                "package": ObjectId::from_u128(0x2a),
                "module": "universe",
                "function": "add_galaxy_on_universe",
                "arguments": [{"Result": 3}, {"Result": 4}]
            }]
        });

        let body = call(&server, "universe_executeBatch", json!([sender(), bad])).await;

        assert_eq!(body["error"]["code"], -32602);
        assert_eq!(ledger.history_len(), 0);
    }

    #[tokio::test]
    async fn reports_ledger_rejection_as_server_error() {
        let (ledger, server) = setup();
        ledger.reject_next("insufficient gas");
        let seq = Planner::new(target()).build_universe().unwrap();

        let body = call(&server, "universe_executeBatch", json!([sender(), seq])).await;

        assert_eq!(body["error"]["code"], -32000);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("insufficient gas"));
    }
}

mod get_object {
    use super::*;

    #[tokio::test]
    async fn returns_field_wrapped_content() {
        let (ledger, server) = setup();
        let seq = Planner::new(target())
            .build(UniverseRef::New, GalaxyDef::new("Andromeda"))
            .unwrap();
        ledger.execute(&sender(), &seq).await.unwrap();
        let id = ledger.universe_ids()[0].clone();

        let body = call(&server, "sui_getObject", json!([id, { "showContent": true }])).await;

        let content = &body["result"]["data"]["content"];
        assert_eq!(content["dataType"], "moveObject");
        assert_eq!(content["type"], target().universe_type());
        assert_eq!(
            content["fields"]["galaxies"][0]["fields"]["name"],
            "Andromeda"
        );
    }

    #[tokio::test]
    async fn reports_missing_objects_in_band() {
        let (_, server) = setup();
        let body = call(&server, "sui_getObject", json!([ObjectId::from_u128(5)])).await;
        assert_eq!(body["result"]["error"]["code"], "notExists");
    }
}

mod query_transactions {
    use super::*;

    #[tokio::test]
    async fn pages_by_sender() {
        let (ledger, server) = setup();
        let planner = Planner::new(target());
        for _ in 0..3 {
            ledger.execute(&sender(), &planner.build_universe().unwrap()).await.unwrap();
        }
        ledger
            .execute(&Address::from_u128(0xb0b), &planner.build_universe().unwrap())
            .await
            .unwrap();

        let body = call(
            &server,
            "suix_queryTransactionBlocks",
            json!([{ "filter": { "FromAddress": sender() } }, null, 2, false]),
        )
        .await;
        let page: TransactionPage = serde_json::from_value(body["result"].clone()).unwrap();
        assert_eq!(page.data.len(), 2);
        assert!(page.has_next_page);

        let body = call(
            &server,
            "suix_queryTransactionBlocks",
            json!([{ "filter": { "FromAddress": sender() } }, page.next_cursor, 2, false]),
        )
        .await;
        let page: TransactionPage = serde_json::from_value(body["result"].clone()).unwrap();
        assert_eq!(page.data.len(), 1);
        assert!(!page.has_next_page);
    }

    #[tokio::test]
    async fn rejects_unsupported_filters() {
        let (_, server) = setup();
        let body = call(
            &server,
            "suix_queryTransactionBlocks",
            json!([{ "filter": { "InputObject": "0x1" } }]),
        )
        .await;
        assert_eq!(body["error"]["code"], -32602);
    }
}

mod protocol {
    use super::*;

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let (_, server) = setup();
        let body = call(&server, "sui_getCoins", json!([])).await;
        assert_eq!(body["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn unparseable_body_is_a_parse_error() {
        let (_, server) = setup();
        let response = server.post("/").text("{not json").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn requires_bearer_token_when_configured() {
        let (_, server) = setup_with(AuthConfig::with_api_key("secret"));
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sui_getObject",
            "params": ["0x1"]
        });

        server
            .post("/")
            .json(&request)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .post("/")
            .authorization_bearer("wrong")
            .json(&request)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .post("/")
            .authorization_bearer("secret")
            .json(&request)
            .await
            .assert_status_ok();

        // Health stays open.
        server.get("/health").await.assert_status_ok();
    }
}
