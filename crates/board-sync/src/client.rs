//! GraphQL client for the GitHub Projects API.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::DEFAULT_API_URL;
use crate::error::{Result, SyncError};
use crate::models::{ItemsPage, ProjectItem};

/// Items requested per page (GitHub maximum).
const PAGE_SIZE: u32 = 100;

const PROJECT_ITEMS_QUERY: &str = r"
    query ProjectItems($org: String!, $number: Int!, $first: Int!, $after: String) {
        organization(login: $org) {
            projectV2(number: $number) {
                items(first: $first, after: $after) {
                    pageInfo {
                        hasNextPage
                        endCursor
                    }
                    nodes {
                        content {
                            __typename
                            ... on Issue {
                                number
                                title
                                body
                                url
                                state
                                labels(first: 50) {
                                    nodes {
                                        name
                                    }
                                }
                                parent {
                                    number
                                    title
                                    url
                                }
                                subIssues(first: 100) {
                                    nodes {
                                        number
                                        title
                                        url
                                    }
                                }
                                projectItems(first: 20) {
                                    nodes {
                                        project {
                                            number
                                        }
                                        fieldValues(first: 50) {
                                            nodes {
                                                __typename
                                                ... on ProjectV2ItemFieldSingleSelectValue {
                                                    name
                                                    field { ... on ProjectV2FieldCommon { name } }
                                                }
                                                ... on ProjectV2ItemFieldIterationValue {
                                                    title
                                                    startDate
                                                    duration
                                                    field { ... on ProjectV2FieldCommon { name } }
                                                }
                                                ... on ProjectV2ItemFieldTextValue {
                                                    text
                                                    field { ... on ProjectV2FieldCommon { name } }
                                                }
                                                ... on ProjectV2ItemFieldNumberValue {
                                                    number
                                                    field { ... on ProjectV2FieldCommon { name } }
                                                }
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
";

/// GitHub GraphQL client
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
}

/// GraphQL request body
#[derive(Debug, Serialize)]
struct GraphQLRequest<V: Serialize> {
    query: &'static str,
    variables: V,
}

/// GraphQL response wrapper
#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLError>>,
}

/// GraphQL error
#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

impl GitHubClient {
    /// Create a client for the public GitHub API.
    ///
    /// # Errors
    /// Returns error if the token is not a valid header value or the HTTP
    /// client cannot be built.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_url(token, DEFAULT_API_URL)
    }

    /// Create a client for another endpoint (GitHub Enterprise, tests).
    pub fn with_url(token: &str, api_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|_| SyncError::Config("access token is not a valid header value".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("board-sync/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
        })
    }

    /// Execute a GraphQL query.
    ///
    /// `NOT_FOUND` errors that come with data are not fatal here: the
    /// affected node is null in the data and the caller decides.
    async fn execute<V: Serialize, R: DeserializeOwned>(
        &self,
        query: &'static str,
        variables: V,
    ) -> Result<R> {
        let request = GraphQLRequest { query, variables };

        let response = self.client.post(&self.api_url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Transport {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let gql_response: GraphQLResponse<R> = serde_json::from_str(&body)
            .map_err(|e| SyncError::GraphQl(format!("malformed response: {e}")))?;

        if let Some(errors) = gql_response.errors.filter(|errors| !errors.is_empty()) {
            let only_not_found = errors
                .iter()
                .all(|e| e.kind.as_deref() == Some("NOT_FOUND"));
            if !(only_not_found && gql_response.data.is_some()) {
                let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
                return Err(SyncError::GraphQl(messages.join(", ")));
            }
            debug!(errors = errors.len(), "Ignoring NOT_FOUND errors with partial data");
        }

        gql_response
            .data
            .ok_or_else(|| SyncError::GraphQl("No data in GraphQL response".to_string()))
    }

    /// Fetch every item of an organization project, following the cursor
    /// until the last page.
    ///
    /// # Errors
    /// [`SyncError::ProjectNotFound`] if the organization or project is
    /// missing; transport and GraphQL failures otherwise.
    #[instrument(skip(self))]
    pub async fn fetch_project_items(
        &self,
        organization: &str,
        number: u64,
    ) -> Result<Vec<ProjectItem>> {
        #[derive(Serialize)]
        struct Variables<'a> {
            org: &'a str,
            number: u64,
            first: u32,
            after: Option<String>,
        }

        let mut items = Vec::new();
        let mut after = None;
        let mut page = 0_u32;

        loop {
            page += 1;
            let response: ItemsPage = self
                .execute(
                    PROJECT_ITEMS_QUERY,
                    Variables {
                        org: organization,
                        number,
                        first: PAGE_SIZE,
                        after: after.take(),
                    },
                )
                .await?;

            let project = response
                .organization
                .and_then(|org| org.project_v2)
                .ok_or_else(|| SyncError::ProjectNotFound {
                    organization: organization.to_string(),
                    number,
                })?;

            let page_info = project.items.page_info.clone();
            let page_items = project.items.into_items();
            debug!(page, count = page_items.len(), "Fetched page");
            items.extend(page_items);

            if !page_info.has_next_page {
                break;
            }
            match page_info.end_cursor {
                Some(cursor) => after = Some(cursor),
                None => {
                    warn!(page, "hasNextPage without endCursor, stopping pagination");
                    break;
                }
            }
        }

        info!(organization, number, pages = page, items = items.len(), "Fetched project items");
        Ok(items)
    }
}
