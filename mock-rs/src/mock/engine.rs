//! Expectation-driven mock engine
//!
//! The engine owns one [`Contract`] plus two tables shared by every request
//! handler:
//! - expectations: (resource pattern, method) -> FIFO queue of armed pairs
//! - recordings: case name -> invocations since the last read
//!
//! Both live behind a single mutex so that consuming an expectation and
//! counting the invocation happen as one step.

use crate::archive::{self, TAR_CONTENT_TYPE};
use crate::contract::{Contract, Pair};
use crate::errors::{MockError, Result};
use crate::server::ServerHandle;
use axum::body::Bytes;
use axum::http::Method;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Invocation count returned by the recordings route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub count: u64,
}

/// Queued intent that the next matching request is answered by `pair`
#[derive(Debug, Clone)]
struct Expectation {
    pair: Arc<Pair>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ExpectationKey {
    pattern: String,
    method: Method,
}

#[derive(Debug, Default)]
struct MockState {
    expectations: HashMap<ExpectationKey, VecDeque<Expectation>>,
    recordings: HashMap<String, u64>,
}

/// Mock for one contract and one examples directory
#[derive(Debug)]
pub struct MockEngine {
    contract: Contract,
    dir: PathBuf,
    state: Mutex<MockState>,
    reload: Option<ServerHandle>,
}

impl MockEngine {
    pub fn new<P: AsRef<Path>>(contract: Contract, dir: P) -> Self {
        Self {
            contract,
            dir: dir.as_ref().to_path_buf(),
            state: Mutex::new(MockState::default()),
            reload: None,
        }
    }

    /// Let the control routes request a reload of the owning server
    pub fn with_reload_handle(mut self, handle: ServerHandle) -> Self {
        self.reload = Some(handle);
        self
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn reload_handle(&self) -> Option<&ServerHandle> {
        self.reload.as_ref()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the examples directory with the contents of a tar archive
    ///
    /// Does not rebuild the contract; the owning server must be reloaded.
    ///
    /// # Errors
    ///
    /// - `MockError::InvalidInput` if `content_type` is not `application/x-tar`
    /// - `MockError::Io` / `MockError::Archive` if clearing or extracting fails
    pub async fn upload_examples(&self, content_type: Option<&str>, body: Bytes) -> Result<()> {
        if content_type != Some(TAR_CONTENT_TYPE) {
            return Err(MockError::InvalidInput(format!(
                "Expected Content-Type '{}', received: '{}'",
                TAR_CONTENT_TYPE,
                content_type.unwrap_or("")
            )));
        }

        let dir = self.dir.clone();
        let size = body.len();
        tokio::task::spawn_blocking(move || archive::replace_dir_contents(&dir, &body))
            .await
            .map_err(|e| MockError::Server(format!("Upload task failed: {}", e)))??;

        info!(dir = %self.dir.display(), bytes = size, "Replaced examples from upload");
        Ok(())
    }

    /// Queue the pair named `case` behind its resource pattern and method
    pub fn arm_expectation(&self, case: &str) -> Result<()> {
        let (resource, action, pair) = self
            .contract
            .find_case(case)
            .ok_or_else(|| MockError::NotFound(format!("Could not find case with name '{}'", case)))?;

        let key = ExpectationKey {
            pattern: resource.pattern().to_string(),
            method: action.method().clone(),
        };

        let mut state = self.state();
        let queue = state.expectations.entry(key).or_default();
        queue.push_back(Expectation { pair: Arc::clone(pair) });

        debug!(case, pattern = resource.pattern(), method = %action.method(), queued = queue.len(), "Armed expectation");
        Ok(())
    }

    /// Consume the head expectation for (pattern, method) and count it
    ///
    /// # Errors
    ///
    /// `MockError::NotExpected` when nothing was ever armed for the pair, or
    /// when everything armed has already been consumed.
    pub fn dispatch(&self, pattern: &str, method: &Method) -> Result<Arc<Pair>> {
        let key = ExpectationKey {
            pattern: pattern.to_string(),
            method: method.clone(),
        };

        let mut state = self.state();
        let queue = state.expectations.get_mut(&key).ok_or_else(|| {
            MockError::NotExpected(format!("Didn't expect resource '{}' to be requested", pattern))
        })?;

        let expectation = queue.pop_front().ok_or_else(|| {
            MockError::NotExpected(format!(
                "Didn't expect (any more) '{}' actions on resource '{}'",
                method, pattern
            ))
        })?;

        *state
            .recordings
            .entry(expectation.pair.name().to_string())
            .or_insert(0) += 1;

        Ok(expectation.pair)
    }

    /// Return the count for `case` and reset it to zero
    pub fn read_and_reset_recording(&self, case: &str) -> Result<Recording> {
        let mut state = self.state();
        let count = state
            .recordings
            .get_mut(case)
            .ok_or_else(|| MockError::NotFound(format!("No recordings for case '{}'", case)))?;

        Ok(Recording {
            count: std::mem::take(count),
        })
    }

    /// Expectations still queued for (pattern, method)
    pub fn pending_expectations(&self, pattern: &str, method: &Method) -> usize {
        let key = ExpectationKey {
            pattern: pattern.to_string(),
            method: method.clone(),
        };
        self.state().expectations.get(&key).map_or(0, VecDeque::len)
    }
}
