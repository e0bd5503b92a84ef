//! Crate for interacting with the GitLab REST API (v4).
//!
//! This crate provides a thin, token-authenticated client covering the calls needed to
//! reconcile group and project memberships, project sharing, CI/CD variables and user
//! accounts. All requests are paced by a rate limiter and retried with backoff while GitLab
//! answers `429 Too Many Requests`.
//!
//! The [`GitLabApi`] trait is the seam the rest of the workspace depends on, so that callers
//! can be tested against an in-memory implementation.

use async_trait::async_trait;
use reqwest::{header::HeaderMap, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::{debug, instrument};
use url::{form_urlencoded, Url};

pub mod errors;
pub use errors::Error;

pub mod models;
pub use models::Page;

pub mod transport;
pub use transport::{Backoff, RateLimiter};

use transport::{check_status, Transport};

// Reference the tests module in the separate file
#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Number of items requested per page.
pub const PER_PAGE: u32 = 100;

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const TOTAL_PAGES_HEADER: &str = "x-total-pages";
const NEXT_PAGE_HEADER: &str = "x-next-page";

/// Settings needed to build a [`GitLabClient`].
#[derive(Debug)]
pub struct ClientConfig {
    /// The API root, e.g. `https://gitlab.example.com/api/v4/`
    pub base_url: String,
    /// Personal or service account token sent as `PRIVATE-TOKEN`
    pub token: SecretString,
    /// Upper bound on requests sent per second
    pub requests_per_second: u32,
    /// Retry policy applied to rate limited requests
    pub backoff: Backoff,
}

impl ClientConfig {
    /// Creates a config with the default pacing (10 requests per second) and backoff.
    pub fn new(base_url: impl Into<String>, token: SecretString) -> Self {
        Self {
            base_url: base_url.into(),
            token,
            requests_per_second: 10,
            backoff: Backoff::default(),
        }
    }
}

/// Read and write operations against a GitLab instance.
///
/// Groups and projects are addressed by their full path; the implementation takes care of
/// encoding it. Users and groups given access are addressed by numeric ID.
#[async_trait]
pub trait GitLabApi: Send + Sync {
    /// Returns the user the token belongs to.
    async fn current_user(&self) -> Result<models::User, Error>;

    async fn list_users(&self, page: u32) -> Result<Page<models::User>, Error>;

    async fn list_groups(&self, page: u32) -> Result<Page<models::Group>, Error>;

    async fn list_projects(&self, page: u32) -> Result<Page<models::Project>, Error>;

    /// Returns a single group. Unlike the listing, this includes the groups it is shared with.
    async fn get_group(&self, group_id: u64) -> Result<models::Group, Error>;

    /// Looks a group up by full path.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` when no such group is visible to the token.
    async fn get_group_by_path(&self, fullpath: &str) -> Result<models::Group, Error>;

    /// Looks a project up by full path.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` when no such project is visible to the token.
    async fn get_project(&self, fullpath: &str) -> Result<models::Project, Error>;

    /// Looks a user up by username, returning `None` when there is no such account.
    async fn find_user(&self, username: &str) -> Result<Option<models::User>, Error>;

    async fn list_group_members(
        &self,
        group: &str,
        page: u32,
    ) -> Result<Page<models::Member>, Error>;

    async fn list_project_members(
        &self,
        project: &str,
        page: u32,
    ) -> Result<Page<models::Member>, Error>;

    /// Returns every variable of the group, following pagination.
    ///
    /// # Errors
    ///
    /// Returns `Error::Forbidden` when the token may not read the variables.
    async fn list_group_variables(&self, group: &str) -> Result<Vec<models::Variable>, Error>;

    /// Returns every variable of the project, following pagination.
    async fn list_project_variables(&self, project: &str)
        -> Result<Vec<models::Variable>, Error>;

    async fn add_group_member(
        &self,
        group: &str,
        user_id: u64,
        access_level: u8,
    ) -> Result<(), Error>;

    async fn edit_group_member(
        &self,
        group: &str,
        user_id: u64,
        access_level: u8,
    ) -> Result<(), Error>;

    async fn remove_group_member(&self, group: &str, user_id: u64) -> Result<(), Error>;

    async fn add_project_member(
        &self,
        project: &str,
        user_id: u64,
        access_level: u8,
    ) -> Result<(), Error>;

    async fn edit_project_member(
        &self,
        project: &str,
        user_id: u64,
        access_level: u8,
    ) -> Result<(), Error>;

    async fn remove_project_member(&self, project: &str, user_id: u64) -> Result<(), Error>;

    async fn share_project_with_group(
        &self,
        project: &str,
        group_id: u64,
        access_level: u8,
    ) -> Result<(), Error>;

    async fn unshare_project_with_group(&self, project: &str, group_id: u64)
        -> Result<(), Error>;

    async fn create_group_variable(&self, group: &str, key: &str, value: &str)
        -> Result<(), Error>;

    async fn update_group_variable(&self, group: &str, key: &str, value: &str)
        -> Result<(), Error>;

    async fn create_project_variable(
        &self,
        project: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error>;

    async fn update_project_variable(
        &self,
        project: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error>;

    async fn block_user(&self, user_id: u64) -> Result<(), Error>;

    async fn unblock_user(&self, user_id: u64) -> Result<(), Error>;

    async fn set_admin(&self, user_id: u64, admin: bool) -> Result<(), Error>;

    async fn create_user(&self, user: &models::NewUser) -> Result<models::User, Error>;

    async fn update_user_email(&self, user_id: u64, email: &str) -> Result<(), Error>;

    async fn list_user_emails(&self, user_id: u64) -> Result<Vec<models::Email>, Error>;

    async fn delete_user_email(&self, user_id: u64, email_id: u64) -> Result<(), Error>;
}

/// A client for the GitLab REST API authenticated with a private token.
#[derive(Debug)]
pub struct GitLabClient {
    base_url: Url,
    token: SecretString,
    transport: Transport,
}

impl GitLabClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBaseUrl` if `config.base_url` is not an absolute URL, or
    /// `Error::Http` if the underlying HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let mut base_url =
            Url::parse(&config.base_url).map_err(|e| Error::InvalidBaseUrl {
                url: config.base_url.clone(),
                reason: e.to_string(),
            })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("acl-warden/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url,
            token: config.token,
            transport: Transport::new(
                http,
                RateLimiter::per_second(config.requests_per_second),
                config.backoff,
            ),
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, Error> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| Error::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(self
            .transport
            .http()
            .request(method, url)
            .header(TOKEN_HEADER, self.token.expose_secret()))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response, Error> {
        let response = self.transport.send(request).await?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let response = self.execute(self.request(Method::GET, path)?).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        page: u32,
        extra_query: &[(&str, &str)],
    ) -> Result<Page<T>, Error> {
        let request = self
            .request(Method::GET, path)?
            .query(&[("page", page), ("per_page", PER_PAGE)])
            .query(extra_query);
        let response = self.execute(request).await?;
        let total_pages = total_pages(response.headers(), page);
        let body = response.text().await?;
        let items: Vec<T> = serde_json::from_str(&body)?;

        debug!(
            path = path,
            page = page,
            total_pages = total_pages,
            items = items.len(),
            "Fetched page"
        );

        Ok(Page {
            items,
            page,
            total_pages,
        })
    }

    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, Error> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let current: Page<T> = self.get_page(path, page, &[]).await?;
            let last = current.is_last();
            all.extend(current.items);
            if last {
                return Ok(all);
            }
            page += 1;
        }
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, Error> {
        self.execute(self.request(method, path)?.json(body)).await
    }

    async fn delete(&self, path: &str) -> Result<(), Error> {
        self.execute(self.request(Method::DELETE, path)?).await?;
        Ok(())
    }
}

/// Encodes a full path (or any identifier) so it can be used as a single URL segment.
pub fn encode_id(id: &str) -> String {
    form_urlencoded::byte_serialize(id.as_bytes()).collect()
}

/// Reads the page count from the response headers.
///
/// GitLab omits `X-Total-Pages` on very large listings; in that case the presence of
/// `X-Next-Page` tells whether another page follows.
fn total_pages(headers: &HeaderMap, page: u32) -> u32 {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .and_then(|v| v.parse::<u32>().ok())
    };

    match header(TOTAL_PAGES_HEADER) {
        Some(total) => total,
        None => match header(NEXT_PAGE_HEADER) {
            Some(next) if next > page => next,
            _ => page,
        },
    }
}

#[async_trait]
impl GitLabApi for GitLabClient {
    #[instrument(skip(self))]
    async fn current_user(&self) -> Result<models::User, Error> {
        self.get_json("user").await
    }

    #[instrument(skip(self))]
    async fn list_users(&self, page: u32) -> Result<Page<models::User>, Error> {
        self.get_page("users", page, &[]).await
    }

    #[instrument(skip(self))]
    async fn list_groups(&self, page: u32) -> Result<Page<models::Group>, Error> {
        self.get_page("groups", page, &[("all_available", "true")])
            .await
    }

    #[instrument(skip(self))]
    async fn list_projects(&self, page: u32) -> Result<Page<models::Project>, Error> {
        self.get_page("projects", page, &[]).await
    }

    #[instrument(skip(self))]
    async fn get_group(&self, group_id: u64) -> Result<models::Group, Error> {
        self.get_json(&format!("groups/{group_id}")).await
    }

    #[instrument(skip(self))]
    async fn get_group_by_path(&self, fullpath: &str) -> Result<models::Group, Error> {
        self.get_json(&format!("groups/{}", encode_id(fullpath))).await
    }

    #[instrument(skip(self))]
    async fn get_project(&self, fullpath: &str) -> Result<models::Project, Error> {
        self.get_json(&format!("projects/{}", encode_id(fullpath)))
            .await
    }

    #[instrument(skip(self))]
    async fn find_user(&self, username: &str) -> Result<Option<models::User>, Error> {
        let page: Page<models::User> = self
            .get_page("users", 1, &[("username", username)])
            .await?;
        Ok(page.items.into_iter().find(|u| u.username == username))
    }

    #[instrument(skip(self), fields(group = %group))]
    async fn list_group_members(
        &self,
        group: &str,
        page: u32,
    ) -> Result<Page<models::Member>, Error> {
        let path = format!("groups/{}/members", encode_id(group));
        self.get_page(&path, page, &[]).await
    }

    #[instrument(skip(self), fields(project = %project))]
    async fn list_project_members(
        &self,
        project: &str,
        page: u32,
    ) -> Result<Page<models::Member>, Error> {
        let path = format!("projects/{}/members", encode_id(project));
        self.get_page(&path, page, &[]).await
    }

    #[instrument(skip(self), fields(group = %group))]
    async fn list_group_variables(&self, group: &str) -> Result<Vec<models::Variable>, Error> {
        self.get_all(&format!("groups/{}/variables", encode_id(group)))
            .await
    }

    #[instrument(skip(self), fields(project = %project))]
    async fn list_project_variables(
        &self,
        project: &str,
    ) -> Result<Vec<models::Variable>, Error> {
        self.get_all(&format!("projects/{}/variables", encode_id(project)))
            .await
    }

    #[instrument(skip(self), fields(group = %group))]
    async fn add_group_member(
        &self,
        group: &str,
        user_id: u64,
        access_level: u8,
    ) -> Result<(), Error> {
        let path = format!("groups/{}/members", encode_id(group));
        let body = json!({ "user_id": user_id, "access_level": access_level });
        self.send_json(Method::POST, &path, &body).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(group = %group))]
    async fn edit_group_member(
        &self,
        group: &str,
        user_id: u64,
        access_level: u8,
    ) -> Result<(), Error> {
        let path = format!("groups/{}/members/{user_id}", encode_id(group));
        let body = json!({ "access_level": access_level });
        self.send_json(Method::PUT, &path, &body).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(group = %group))]
    async fn remove_group_member(&self, group: &str, user_id: u64) -> Result<(), Error> {
        self.delete(&format!("groups/{}/members/{user_id}", encode_id(group)))
            .await
    }

    #[instrument(skip(self), fields(project = %project))]
    async fn add_project_member(
        &self,
        project: &str,
        user_id: u64,
        access_level: u8,
    ) -> Result<(), Error> {
        let path = format!("projects/{}/members", encode_id(project));
        let body = json!({ "user_id": user_id, "access_level": access_level });
        self.send_json(Method::POST, &path, &body).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(project = %project))]
    async fn edit_project_member(
        &self,
        project: &str,
        user_id: u64,
        access_level: u8,
    ) -> Result<(), Error> {
        let path = format!("projects/{}/members/{user_id}", encode_id(project));
        let body = json!({ "access_level": access_level });
        self.send_json(Method::PUT, &path, &body).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(project = %project))]
    async fn remove_project_member(&self, project: &str, user_id: u64) -> Result<(), Error> {
        self.delete(&format!(
            "projects/{}/members/{user_id}",
            encode_id(project)
        ))
        .await
    }

    #[instrument(skip(self), fields(project = %project))]
    async fn share_project_with_group(
        &self,
        project: &str,
        group_id: u64,
        access_level: u8,
    ) -> Result<(), Error> {
        let path = format!("projects/{}/share", encode_id(project));
        let body = json!({ "group_id": group_id, "group_access": access_level });
        self.send_json(Method::POST, &path, &body).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(project = %project))]
    async fn unshare_project_with_group(
        &self,
        project: &str,
        group_id: u64,
    ) -> Result<(), Error> {
        self.delete(&format!("projects/{}/share/{group_id}", encode_id(project)))
            .await
    }

    #[instrument(skip(self, value), fields(group = %group))]
    async fn create_group_variable(
        &self,
        group: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        let path = format!("groups/{}/variables", encode_id(group));
        let body = json!({ "key": key, "value": value });
        self.send_json(Method::POST, &path, &body).await?;
        Ok(())
    }

    #[instrument(skip(self, value), fields(group = %group))]
    async fn update_group_variable(
        &self,
        group: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        let path = format!("groups/{}/variables/{}", encode_id(group), encode_id(key));
        let body = json!({ "value": value });
        self.send_json(Method::PUT, &path, &body).await?;
        Ok(())
    }

    #[instrument(skip(self, value), fields(project = %project))]
    async fn create_project_variable(
        &self,
        project: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        let path = format!("projects/{}/variables", encode_id(project));
        let body = json!({ "key": key, "value": value });
        self.send_json(Method::POST, &path, &body).await?;
        Ok(())
    }

    #[instrument(skip(self, value), fields(project = %project))]
    async fn update_project_variable(
        &self,
        project: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        let path = format!(
            "projects/{}/variables/{}",
            encode_id(project),
            encode_id(key)
        );
        let body = json!({ "value": value });
        self.send_json(Method::PUT, &path, &body).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn block_user(&self, user_id: u64) -> Result<(), Error> {
        self.execute(self.request(Method::POST, &format!("users/{user_id}/block"))?)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unblock_user(&self, user_id: u64) -> Result<(), Error> {
        self.execute(self.request(Method::POST, &format!("users/{user_id}/unblock"))?)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_admin(&self, user_id: u64, admin: bool) -> Result<(), Error> {
        let body = json!({ "admin": admin });
        self.send_json(Method::PUT, &format!("users/{user_id}"), &body)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn create_user(&self, user: &models::NewUser) -> Result<models::User, Error> {
        let response = self.send_json(Method::POST, "users", user).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    #[instrument(skip(self))]
    async fn update_user_email(&self, user_id: u64, email: &str) -> Result<(), Error> {
        let body = json!({ "email": email, "skip_reconfirmation": true });
        self.send_json(Method::PUT, &format!("users/{user_id}"), &body)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_user_emails(&self, user_id: u64) -> Result<Vec<models::Email>, Error> {
        self.get_all(&format!("users/{user_id}/emails")).await
    }

    #[instrument(skip(self))]
    async fn delete_user_email(&self, user_id: u64, email_id: u64) -> Result<(), Error> {
        self.delete(&format!("users/{user_id}/emails/{email_id}"))
            .await
    }
}
