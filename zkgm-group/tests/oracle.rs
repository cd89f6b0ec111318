use axum::{routing::post, Json, Router};
use serde_json::{json, Value};
use zkgm_common::parse_fr_decimal;
use zkgm_group::{
    oracle::group_call, ContractOracle, GroupError, GroupReconstructor, MembershipOracle,
};
use zkgm_test_fixtures::numbered_records;

/// Poseidon(1, 2) with the circom parameters: the root of the group `[1, 2]`.
const KNOWN_ROOT: &str =
    "7853200120776062878684798364095072458815029376092732009249414926327459813530";

fn word(value: &str) -> String {
    let n = parse_fr_decimal(value).unwrap();
    let hex = format!("{:0>64}", zkgm_common::fr_to_biguint(&n).to_str_radix(16));
    format!("0x{}", hex)
}

async fn rpc(Json(request): Json<Value>, root: String, size: u64) -> Json<Value> {
    let id = request["id"].clone();
    let data = request["params"][0]["data"]
        .as_str()
        .or_else(|| request["params"][0]["input"].as_str())
        .unwrap_or_default()
        .to_string();

    let root_call = format!("0x{}", hex::encode(group_call("getMerkleTreeRoot(uint256)", 1)));
    let size_call = format!("0x{}", hex::encode(group_call("getMerkleTreeSize(uint256)", 1)));

    let result = if data == root_call {
        word(&root)
    } else if data == size_call {
        word(&size.to_string())
    } else {
        return Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32000, "message": "execution reverted" }
        }));
    };
    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

async fn serve_rpc(root: &str, size: u64) -> String {
    let root = root.to_string();
    let app = Router::new().route(
        "/",
        post(move |body: Json<Value>| rpc(body, root.clone(), size)),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

struct StaticFeed(Vec<zkgm_common::MembershipRecord>);

#[async_trait::async_trait]
impl zkgm_group::MembershipFeed for StaticFeed {
    async fn fetch_members(
        &self,
        _group_id: u64,
    ) -> zkgm_group::Result<Vec<zkgm_common::MembershipRecord>> {
        Ok(self.0.clone())
    }
}

const CONTRACT: &str = "0x1000000000000000000000000000000000000001";

#[tokio::test]
async fn contract_oracle_reads_root_and_size() {
    let url = serve_rpc(KNOWN_ROOT, 2).await;
    let oracle = ContractOracle::new(&url, CONTRACT).unwrap();

    assert_eq!(
        oracle.merkle_root(1).await.unwrap(),
        parse_fr_decimal(KNOWN_ROOT).unwrap()
    );
    assert_eq!(oracle.merkle_size(1).await.unwrap(), 2);
}

#[tokio::test]
async fn reconstructed_root_matches_known_onchain_root() {
    let url = serve_rpc(KNOWN_ROOT, 2).await;
    let oracle = ContractOracle::new(&url, CONTRACT).unwrap();
    let reconstructor = GroupReconstructor::new(StaticFeed(numbered_records(2)));

    let group = reconstructor.build_verified(1, &oracle).await.unwrap();
    assert_eq!(group.root(), parse_fr_decimal(KNOWN_ROOT).unwrap());
}

#[tokio::test]
async fn diverging_feed_is_a_root_mismatch() {
    let url = serve_rpc(KNOWN_ROOT, 3).await;
    let oracle = ContractOracle::new(&url, CONTRACT).unwrap();
    let reconstructor = GroupReconstructor::new(StaticFeed(numbered_records(3)));

    match reconstructor.build_verified(1, &oracle).await {
        Err(GroupError::RootMismatch { onchain, .. }) => assert_eq!(onchain, KNOWN_ROOT),
        other => panic!("expected root mismatch, got {:?}", other.map(|g| g.root())),
    }
}

#[tokio::test]
async fn reverted_call_is_an_oracle_error() {
    let url = serve_rpc(KNOWN_ROOT, 2).await;
    let oracle = ContractOracle::new(&url, CONTRACT).unwrap();
    assert!(matches!(
        oracle.merkle_root(2).await,
        Err(GroupError::Oracle(_))
    ));
}

#[test]
fn rejects_bad_contract_address() {
    assert!(matches!(
        ContractOracle::new("http://127.0.0.1:8545", "not-an-address"),
        Err(GroupError::Oracle(_))
    ));
}
