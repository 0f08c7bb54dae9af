use super::*;
use crate::config::{CAPABILITY_CANDIDATE, CAPABILITY_CONFIRMED_COMMIT, CAPABILITY_CONFIRMED_COMMIT_1_0};
use crate::rpc::require;

/// One phase of a configuration transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum TxStep {
    Lock,
    Edit { index: usize },
    Validate,
    Commit,
}

/// Edits applied to the candidate datastore and committed as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigTransaction {
    /// Logical name used in logs.
    pub name: String,
    /// `<config>` contents, sent as one edit-config each, in order.
    pub edits: Vec<Element>,
    pub default_operation: Option<DefaultOperation>,
    /// Validate the candidate before committing.
    pub validate: bool,
    /// Commit with `<confirmed/>`.
    pub confirmed: bool,
    /// Confirm timeout in seconds for a confirmed commit.
    pub confirm_timeout: Option<u32>,
    /// Hold the candidate lock for the duration of the transaction.
    pub lock: bool,
}

/// Outcome of a configuration transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TxResult {
    /// Input transaction name.
    pub name: String,
    /// True when the commit succeeded.
    pub committed: bool,
    /// First failed step, if any.
    pub failed_step: Option<TxStep>,
    /// Number of edits the server accepted.
    pub applied_edits: usize,
    pub validated: bool,
    /// Whether discard-changes succeeded after a failure.
    pub discarded: bool,
    /// Whether the candidate lock was released.
    pub unlocked: bool,
    /// Failure summary for the forward phase.
    pub failure_reason: Option<String>,
    /// Errors raised while discarding or unlocking.
    pub cleanup_errors: Vec<String>,
}

impl ConfigTransaction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            edits: Vec::new(),
            default_operation: None,
            validate: false,
            confirmed: false,
            confirm_timeout: None,
            lock: true,
        }
    }

    pub fn edit(mut self, config: Element) -> Self {
        self.edits.push(config);
        self
    }

    pub fn default_operation(mut self, op: DefaultOperation) -> Self {
        self.default_operation = Some(op);
        self
    }

    pub fn validate_before_commit(mut self) -> Self {
        self.validate = true;
        self
    }

    pub fn confirmed(mut self, timeout_secs: Option<u32>) -> Self {
        self.confirmed = true;
        self.confirm_timeout = timeout_secs;
        self
    }

    pub fn without_lock(mut self) -> Self {
        self.lock = false;
        self
    }

    /// Checks the transaction shape without contacting a device.
    pub fn validate(&self) -> Result<(), NetconfError> {
        if self.name.trim().is_empty() {
            return Err(NetconfError::InvalidRequest(
                "transaction name must not be empty".to_string(),
            ));
        }
        if self.edits.is_empty() {
            return Err(NetconfError::InvalidRequest(format!(
                "transaction '{}' has no edits",
                self.name
            )));
        }
        if let Some(index) = self.edits.iter().position(Element::is_empty) {
            return Err(NetconfError::InvalidRequest(format!(
                "transaction '{}' edit {index} is empty",
                self.name
            )));
        }
        if self.confirm_timeout.is_some() && !self.confirmed {
            return Err(NetconfError::InvalidRequest(
                "confirm timeout requires a confirmed commit".to_string(),
            ));
        }
        if self.confirm_timeout == Some(0) {
            return Err(NetconfError::InvalidRequest(
                "confirm timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds every request up front so capability errors surface before
    /// any I/O.
    fn plan(&self, capabilities: &Capabilities) -> Result<TxPlan, NetconfError> {
        require(capabilities, &[CAPABILITY_CANDIDATE])?;
        if self.confirmed {
            require(
                capabilities,
                &[CAPABILITY_CONFIRMED_COMMIT, CAPABILITY_CONFIRMED_COMMIT_1_0],
            )?;
        }

        let lock = self
            .lock
            .then(|| Lock::new(Datastore::Candidate).build(capabilities))
            .transpose()?;
        let unlock = self
            .lock
            .then(|| Unlock::new(Datastore::Candidate).build(capabilities))
            .transpose()?;
        let edits = self
            .edits
            .iter()
            .map(|config| {
                let mut request = EditConfig::new(Datastore::Candidate, config.clone());
                if let Some(op) = self.default_operation {
                    request = request.default_operation(op);
                }
                request.build(capabilities)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let validate = self
            .validate
            .then(|| Validate::datastore(Datastore::Candidate).build(capabilities))
            .transpose()?;
        let commit = if self.confirmed {
            Commit::confirmed(self.confirm_timeout)
        } else {
            Commit::new()
        }
        .build(capabilities)?;

        Ok(TxPlan {
            lock,
            edits,
            validate,
            commit,
            unlock,
            discard: DiscardChanges.build(capabilities)?,
        })
    }
}

struct TxPlan {
    lock: Option<Element>,
    edits: Vec<Element>,
    validate: Option<Element>,
    commit: Element,
    unlock: Option<Element>,
    discard: Element,
}

impl TxResult {
    fn started(name: &str) -> Self {
        Self {
            name: name.to_string(),
            committed: false,
            failed_step: None,
            applied_edits: 0,
            validated: false,
            discarded: false,
            unlocked: false,
            failure_reason: None,
            cleanup_errors: Vec::new(),
        }
    }
}

impl Session {
    /// Runs lock, edit-config(s), validate and commit on the candidate
    /// datastore. On failure the candidate is discarded; the lock is always
    /// released.
    ///
    /// Rejected steps are reported in the returned [`TxResult`]; an `Err`
    /// means the transaction was refused before anything was sent.
    pub async fn execute_transaction(&self, tx: &ConfigTransaction) -> Result<TxResult, NetconfError> {
        tx.validate()?;
        let plan = tx.plan(self.capabilities())?;
        let mut result = TxResult::started(&tx.name);
        debug!(
            "session {} transaction '{}' with {} edits",
            self.session_id(),
            tx.name,
            plan.edits.len()
        );

        let locked = match plan.lock.as_ref() {
            Some(lock) => match self.tx_step(lock).await {
                Ok(()) => true,
                Err(reason) => {
                    result.failed_step = Some(TxStep::Lock);
                    result.failure_reason = Some(reason);
                    return Ok(result);
                }
            },
            None => false,
        };

        if let Err((step, reason)) = self.tx_forward(&plan, &mut result).await {
            debug!("transaction '{}' failed at {step:?}: {reason}", tx.name);
            result.failed_step = Some(step);
            result.failure_reason = Some(reason);
            match self.tx_step(&plan.discard).await {
                Ok(()) => result.discarded = true,
                Err(reason) => result
                    .cleanup_errors
                    .push(format!("discard-changes failed: {reason}")),
            }
        }

        if locked && let Some(unlock) = plan.unlock.as_ref() {
            match self.tx_step(unlock).await {
                Ok(()) => result.unlocked = true,
                Err(reason) => result.cleanup_errors.push(format!("unlock failed: {reason}")),
            }
        }

        Ok(result)
    }

    async fn tx_forward(&self, plan: &TxPlan, result: &mut TxResult) -> Result<(), (TxStep, String)> {
        for (index, edit) in plan.edits.iter().enumerate() {
            self.tx_step(edit)
                .await
                .map_err(|reason| (TxStep::Edit { index }, reason))?;
            result.applied_edits += 1;
        }
        if let Some(validate) = plan.validate.as_ref() {
            self.tx_step(validate)
                .await
                .map_err(|reason| (TxStep::Validate, reason))?;
            result.validated = true;
        }
        self.tx_step(&plan.commit)
            .await
            .map_err(|reason| (TxStep::Commit, reason))?;
        result.committed = true;
        Ok(())
    }

    async fn tx_step(&self, operation: &Element) -> Result<(), String> {
        self.call(operation, self.config().request_timeout())
            .await
            .and_then(RpcReply::into_result)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
