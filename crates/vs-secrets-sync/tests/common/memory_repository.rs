//! In-memory repository for engine tests

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use vs_secrets_core::RepositoryType;
use vs_secrets_sync::repository::{RemoteBundle, RemoteRecord, RepositoryError, RepositoryResult};
use vs_secrets_sync::{SecretRepository, Solution};

#[derive(Default)]
struct State {
    bundles: BTreeMap<String, (Solution, Vec<RemoteRecord>)>,
    pushes: usize,
}

/// Bundles keyed by solution description. Clones share state, so a test can
/// keep a handle while the context owns another.
#[derive(Clone)]
pub struct MemoryRepository {
    state: Arc<Mutex<State>>,
    encrypt_on_client: bool,
    reject_auth: bool,
    /// 1-based push attempt that fails with a server error
    failing_push: Option<usize>,
    authorizations: Arc<AtomicUsize>,
}

impl MemoryRepository {
    /// Behaves like the gist backend: content encrypted on the client
    pub fn client_encrypted() -> Self {
        Self {
            state: Arc::default(),
            encrypt_on_client: true,
            reject_auth: false,
            failing_push: None,
            authorizations: Arc::default(),
        }
    }

    /// Behaves like the Key Vault backend: content stored as-is
    pub fn server_encrypted() -> Self {
        Self {
            encrypt_on_client: false,
            ..Self::client_encrypted()
        }
    }

    /// Every authorization fails
    pub fn rejecting() -> Self {
        Self {
            reject_auth: true,
            ..Self::client_encrypted()
        }
    }

    /// Fail the `attempt`-th push (counting every push made through any clone)
    pub fn failing_push(mut self, attempt: usize) -> Self {
        self.failing_push = Some(attempt);
        self
    }

    pub fn records(&self, solution: &Solution) -> Vec<RemoteRecord> {
        self.state
            .lock()
            .unwrap()
            .bundles
            .get(&solution.description())
            .map(|(_, records)| records.clone())
            .unwrap_or_default()
    }

    pub fn set_records(&self, solution: &Solution, records: Vec<RemoteRecord>) {
        self.state
            .lock()
            .unwrap()
            .bundles
            .insert(solution.description(), (solution.clone(), records));
    }

    pub fn push_count(&self) -> usize {
        self.state.lock().unwrap().pushes
    }

    pub fn authorization_count(&self) -> usize {
        self.authorizations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretRepository for MemoryRepository {
    fn repository_type(&self) -> RepositoryType {
        if self.encrypt_on_client {
            RepositoryType::GitHub
        } else {
            RepositoryType::AzureKeyVault
        }
    }

    fn encrypt_on_client(&self) -> bool {
        self.encrypt_on_client
    }

    async fn is_ready(&self) -> bool {
        !self.reject_auth
    }

    async fn authorize(&self, _batch_mode: bool) -> RepositoryResult<()> {
        self.authorizations.fetch_add(1, Ordering::SeqCst);
        if self.reject_auth {
            return Err(RepositoryError::authentication("token rejected"));
        }
        Ok(())
    }

    async fn push_files(
        &self,
        solution: &Solution,
        records: &[RemoteRecord],
    ) -> RepositoryResult<()> {
        let mut state = self.state.lock().unwrap();
        state.pushes += 1;
        if self.failing_push == Some(state.pushes) {
            return Err(RepositoryError::Status {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        state
            .bundles
            .insert(solution.description(), (solution.clone(), records.to_vec()));
        Ok(())
    }

    async fn pull_files(&self, solution: &Solution) -> RepositoryResult<Vec<RemoteRecord>> {
        Ok(self.records(solution))
    }

    async fn pull_all_secrets(&self) -> RepositoryResult<Vec<RemoteBundle>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .bundles
            .values()
            .map(|(solution, records)| RemoteBundle {
                solution: solution.clone(),
                records: records.clone(),
            })
            .collect())
    }
}
