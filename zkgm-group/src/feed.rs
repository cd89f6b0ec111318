//! Membership feed: the indexing service that lists group members.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use zkgm_common::MembershipRecord;

use crate::error::{GroupError, Result};

/// Source of membership records for a group.
///
/// Implementations may return records in any order; the reconstructor sorts
/// them by index.
#[async_trait]
pub trait MembershipFeed: Send + Sync {
    async fn fetch_members(&self, group_id: u64) -> Result<Vec<MembershipRecord>>;
}

#[async_trait]
impl<T: MembershipFeed + ?Sized> MembershipFeed for &T {
    async fn fetch_members(&self, group_id: u64) -> Result<Vec<MembershipRecord>> {
        (**self).fetch_members(group_id).await
    }
}

#[async_trait]
impl<T: MembershipFeed + ?Sized> MembershipFeed for Box<T> {
    async fn fetch_members(&self, group_id: u64) -> Result<Vec<MembershipRecord>> {
        (**self).fetch_members(group_id).await
    }
}

const MEMBERS_QUERY: &str = r#"
    query($id: ID!, $first: Int!, $skip: Int!) {
        group(id: $id) {
            members(orderBy: index, orderDirection: asc, first: $first, skip: $skip) {
                index
                identityCommitment
            }
        }
    }
"#;

/// Page size for member queries; subgraphs cap `first` at 1000.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<MembersData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct MembersData {
    group: Option<GroupMembers>,
}

#[derive(Debug, Deserialize)]
struct GroupMembers {
    members: Vec<MembershipRecord>,
}

/// GraphQL subgraph client.
#[derive(Clone, Debug)]
pub struct SubgraphFeed {
    client: reqwest::Client,
    url: String,
    page_size: usize,
}

impl SubgraphFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn fetch_page(&self, group_id: u64, skip: usize) -> Result<Option<Vec<MembershipRecord>>> {
        let body = serde_json::json!({
            "query": MEMBERS_QUERY,
            "variables": {
                "id": group_id.to_string(),
                "first": self.page_size,
                "skip": skip,
            }
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GroupError::FeedUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GroupError::FeedUnavailable(format!(
                "subgraph returned HTTP {}",
                status
            )));
        }

        let parsed: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| GroupError::MalformedFeed(e.to_string()))?;

        if !parsed.errors.is_empty() {
            let messages: Vec<String> = parsed.errors.into_iter().map(|e| e.message).collect();
            return Err(GroupError::FeedUnavailable(messages.join("; ")));
        }

        let data = parsed
            .data
            .ok_or_else(|| GroupError::MalformedFeed("response has no data".into()))?;
        Ok(data.group.map(|group| group.members))
    }
}

#[async_trait]
impl MembershipFeed for SubgraphFeed {
    async fn fetch_members(&self, group_id: u64) -> Result<Vec<MembershipRecord>> {
        let mut members = Vec::new();
        loop {
            let page = match self.fetch_page(group_id, members.len()).await? {
                Some(page) => page,
                None => {
                    debug!(group_id, "group not indexed, treating as empty");
                    break;
                }
            };
            let page_len = page.len();
            members.extend(page);
            if page_len < self.page_size {
                break;
            }
        }
        debug!(group_id, count = members.len(), "fetched membership records");
        Ok(members)
    }
}
