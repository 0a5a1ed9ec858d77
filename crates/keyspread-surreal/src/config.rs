/// Connection settings for [`crate::Surreal2Store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurrealConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Rows fetched per round trip while scanning.
    pub page_size: usize,
}

impl SurrealConfig {
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Embedded engines have no users to sign in as.
    pub fn is_embedded(&self) -> bool {
        self.endpoint.starts_with("mem://")
    }
}

impl Default for SurrealConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".to_string(),
            namespace: "keyspread".to_string(),
            database: "keyspread".to_string(),
            username: "root".to_string(),
            password: "root".to_string(),
            page_size: 100,
        }
    }
}
