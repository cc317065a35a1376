use serde::{de::DeserializeOwned, Serialize};

use crate::{ApiClient, ApiRequest, Result};

/// Collection paths served by the two dashboard back-ends.
pub mod resources {
    // SpendWise
    pub const WALLETS: &str = "/api/wallets";
    pub const SHARED_WALLETS: &str = "/api/shared-wallets";
    pub const TRANSACTIONS: &str = "/api/transactions";
    pub const RECURRING_TRANSACTIONS: &str = "/api/recurring-transactions";
    pub const BUDGETS: &str = "/api/budgets";
    pub const CATEGORIES: &str = "/api/categories";
    pub const REPORTS: &str = "/api/reports";
    pub const NOTIFICATIONS: &str = "/api/notifications";
    pub const CURRENT_USER: &str = "/users/me";

    // TaskFlow
    pub const PROJECTS: &str = "/projects";
    pub const TASKS: &str = "/tasks";
    pub const COMMENTS: &str = "/comments";
    pub const COLLABORATORS: &str = "/collaborators";
}

/// JSON CRUD over one collection path.
///
/// ```no_run
/// # async fn demo(api: &dashapi_http::ApiClient) -> dashapi_http::Result<()> {
/// use dashapi_http::resources;
///
/// let wallets: Vec<serde_json::Value> = api.resource(resources::WALLETS).list().await?;
/// let tasks = api.resource(resources::PROJECTS).nested(7, "tasks");
/// let created: serde_json::Value = tasks.create(&serde_json::json!({ "title": "Ship" })).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Resource<'a> {
    client: &'a ApiClient,
    path: String,
}

impl<'a> Resource<'a> {
    pub(crate) fn new(client: &'a ApiClient, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = path.trim_end_matches('/').to_owned();
        Self { client, path }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Child collection of one item: `/projects` + `(7, "tasks")` → `/projects/7/tasks`.
    pub fn nested(&self, id: impl std::fmt::Display, child: &str) -> Resource<'a> {
        Resource::new(
            self.client,
            format!("{}/{id}/{}", self.path, child.trim_matches('/')),
        )
    }

    pub async fn list<T: DeserializeOwned>(&self) -> Result<T> {
        self.client.send(&ApiRequest::get(self.path.clone())).await?.json()
    }

    /// `GET` on the collection with filter parameters, e.g. `[("wallet", 3)]`.
    pub async fn list_with_query<T, K, V>(
        &self,
        query: impl IntoIterator<Item = (K, V)>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        K: Into<String>,
        V: ToString,
    {
        let request = query
            .into_iter()
            .fold(ApiRequest::get(self.path.clone()), |request, (key, value)| {
                request.query(key, value)
            });
        self.client.send(&request).await?.json()
    }

    pub async fn get<T: DeserializeOwned>(&self, id: impl std::fmt::Display) -> Result<T> {
        self.client.send(&ApiRequest::get(self.item(id))).await?.json()
    }

    pub async fn create<B, T>(&self, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::post(self.path.clone()).json(body)?;
        self.client.send(&request).await?.json()
    }

    /// Full replacement (`PUT`).
    pub async fn update<B, T>(&self, id: impl std::fmt::Display, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::put(self.item(id)).json(body)?;
        self.client.send(&request).await?.json()
    }

    /// Partial update (`PATCH`).
    pub async fn patch<B, T>(&self, id: impl std::fmt::Display, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::patch(self.item(id)).json(body)?;
        self.client.send(&request).await?.json()
    }

    /// Deletes one item. The response body, if any, is ignored.
    pub async fn delete(&self, id: impl std::fmt::Display) -> Result<()> {
        self.client.send(&ApiRequest::delete(self.item(id))).await?;
        Ok(())
    }

    fn item(&self, id: impl std::fmt::Display) -> String {
        format!("{}/{id}", self.path)
    }
}
