use crate::execution::OrderManager;
use crate::logger::Logger;
use crate::models::Credential;
use crate::Result;
use std::collections::HashMap;
use std::path::Path;

/// Result of one entry in a batch connect. A missing credential name is
/// reported here as well as logged; the batch itself never aborts.
pub enum ConnectOutcome {
    Connected(OrderManager),
    NotFound,
}

impl ConnectOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectOutcome::Connected(_))
    }
}

/// Named API credentials, loaded once from a JSON file of
/// `{ "<backend>": { "key": ..., "secret": ... } }`.
pub struct CredentialStore {
    credentials: HashMap<String, Credential>,
}

impl CredentialStore {
    /// Parse the credential file. Key format is not validated; a bad key
    /// surfaces later as a venue auth failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let credentials: HashMap<String, Credential> = serde_json::from_str(&contents)?;
        Ok(Self { credentials })
    }

    pub fn get(&self, name: &str) -> Option<&Credential> {
        self.credentials.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.credentials.keys().map(String::as_str)
    }

    /// Construct an order manager for each named backend that has a stored
    /// credential. Every name gets an outcome: present names log a success
    /// and yield a connected manager, absent names log a not-found line.
    pub async fn connect(
        &self,
        names: &[&str],
        logger: &Logger,
    ) -> Vec<(String, ConnectOutcome)> {
        let mut outcomes = Vec::with_capacity(names.len());

        for &name in names {
            let outcome = match self.credentials.get(name) {
                Some(credential) => {
                    logger
                        .log(&format!(
                            "Connecting to {} with key: {}... Successful",
                            name, credential.key
                        ))
                        .await;
                    ConnectOutcome::Connected(OrderManager::connect(
                        name,
                        credential,
                        logger.clone(),
                    ))
                }
                None => {
                    logger
                        .log(&format!("API keys for {} not found.", name))
                        .await;
                    ConnectOutcome::NotFound
                }
            };
            outcomes.push((name.to_string(), outcome));
        }

        outcomes
    }
}
