use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{extract::State, routing::post, Json, Router};
use proptest::prelude::*;
use serde_json::Value;
use zkgm_common::{Fr, MembershipRecord};
use zkgm_group::{
    Group, GroupError, GroupReconstructor, MembershipFeed, MerkleTree, SubgraphFeed,
};
use zkgm_test_fixtures::{
    numbered_records, sample_records, subgraph_missing_group, subgraph_response,
};

#[derive(Clone)]
struct SubgraphState {
    records: Arc<Vec<MembershipRecord>>,
    requests: Arc<AtomicUsize>,
    missing: bool,
}

async fn graphql(State(state): State<SubgraphState>, Json(body): Json<Value>) -> Json<Value> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if state.missing {
        return Json(subgraph_missing_group());
    }
    let first = body["variables"]["first"].as_u64().unwrap_or(100) as usize;
    let skip = body["variables"]["skip"].as_u64().unwrap_or(0) as usize;
    let page: Vec<MembershipRecord> = state
        .records
        .iter()
        .skip(skip)
        .take(first)
        .cloned()
        .collect();
    Json(subgraph_response(&page))
}

async fn serve_subgraph(records: Vec<MembershipRecord>, missing: bool) -> (String, Arc<AtomicUsize>) {
    let requests = Arc::new(AtomicUsize::new(0));
    let state = SubgraphState {
        records: Arc::new(records),
        requests: requests.clone(),
        missing,
    };
    let app = Router::new().route("/graphql", post(graphql)).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/graphql", addr), requests)
}

#[tokio::test]
async fn subgraph_feed_walks_every_page() {
    let records = numbered_records(25);
    let (url, requests) = serve_subgraph(records.clone(), false).await;
    let feed = SubgraphFeed::new(url).with_page_size(10);

    let fetched = feed.fetch_members(1).await.unwrap();
    assert_eq!(fetched, records);
    assert_eq!(requests.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn missing_group_is_empty() {
    let (url, _) = serve_subgraph(vec![], true).await;
    let reconstructor = GroupReconstructor::new(SubgraphFeed::new(url));
    let group = reconstructor.build(404).await.unwrap();
    assert_eq!(group.size(), 0);
    assert_eq!(group.root(), Fr::from(0u64));
}

#[tokio::test]
async fn removed_member_scenario_over_http() {
    let (url, _) = serve_subgraph(sample_records(), false).await;
    let reconstructor = GroupReconstructor::new(SubgraphFeed::new(url));

    let group = reconstructor.build(1).await.unwrap();
    assert_eq!(group.size(), 3);

    let proof = reconstructor.prove_membership(1, &Fr::from(9u64)).await.unwrap();
    assert_eq!(group.index_of(&Fr::from(9u64)).unwrap(), 2);
    assert_eq!(proof.root, group.root());
    assert!(MerkleTree::verify_proof(&proof).unwrap());

    assert!(matches!(
        reconstructor.prove_membership(1, &Fr::from(0u64)).await,
        Err(GroupError::MemberNotFound)
    ));
}

#[tokio::test]
async fn unreachable_feed_is_reported() {
    let feed = SubgraphFeed::new("http://127.0.0.1:9/graphql");
    assert!(matches!(
        feed.fetch_members(1).await,
        Err(GroupError::FeedUnavailable(_))
    ));
}

proptest! {
    #[test]
    fn root_is_independent_of_feed_order(
        shuffled in (1u64..40).prop_flat_map(|n| Just(numbered_records(n)).prop_shuffle())
    ) {
        let ordered = Group::from_records(1, numbered_records(shuffled.len() as u64)).unwrap();
        let group = Group::from_records(1, shuffled).unwrap();
        prop_assert_eq!(group.root(), ordered.root());
    }

    #[test]
    fn every_member_proof_verifies(size in 1u64..24, removed in prop::collection::vec(any::<bool>(), 24)) {
        let records: Vec<MembershipRecord> = numbered_records(size)
            .into_iter()
            .map(|mut r| {
                if removed[r.index as usize] {
                    r.commitment = Fr::from(0u64);
                }
                r
            })
            .collect();
        let group = Group::from_records(1, records.clone()).unwrap();
        for record in records.iter().filter(|r| !r.is_removed()) {
            let proof = group.merkle_proof(&record.commitment).unwrap();
            prop_assert_eq!(proof.leaf, record.commitment);
            prop_assert!(MerkleTree::verify_proof(&proof).unwrap());
        }
    }
}
