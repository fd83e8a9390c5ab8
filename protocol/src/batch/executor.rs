//! Task execution for `batchExecute` and `executeTasks`.

use std::collections::BTreeSet;

use tracing::{debug, error, info};

use super::event::{BatchEvent, TaskResponse};
use super::preimage;
use crate::config::{BatchConflictPolicy, BATCH_EVENT_NAME};
use crate::context::TxContext;
use crate::envelope::UnsignedEnvelope;
use crate::error::{LedgerError, LedgerResult};
use crate::pipeline::{Chaincode, Contract};
use crate::router::{MethodKind, Param, Proto, Route};
use crate::stub::{CachedStub, ChaincodeStub, WriteSet};
use crate::types::proto::{BatchRequest, ExecuteTasksRequest, Task};
use crate::types::AccountRef;

const WRITE_CONFLICT: &str = "write conflict with an earlier task in this batch";

enum TaskSource {
    Queued(String),
    Inline(Task),
}

impl TaskSource {
    fn id(&self) -> &str {
        match self {
            TaskSource::Queued(id) => id,
            TaskSource::Inline(task) => &task.id,
        }
    }
}

/// A task ready to run: route, decoded context inputs and arguments.
struct Prepared<'r, C> {
    route: &'r Route<C>,
    tx_id: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    sender: Option<AccountRef>,
    args: Vec<Vec<u8>>,
}

/// Accepts the request as JSON or binary protobuf.
fn decode_request<T>(rest: &[Vec<u8>], method: &str) -> LedgerResult<T>
where
    T: prost::Message + serde::de::DeserializeOwned + Default,
{
    if rest.len() != 1 {
        return Err(LedgerError::WrongArgumentCount {
            method: method.to_string(),
            expected: 1,
            got: rest.len(),
        });
    }
    <Proto<T> as Param>::decode(&rest[0])
        .map(|Proto(request)| request)
        .map_err(|reason| LedgerError::Malformed(format!("{}: {}", method, reason)))
}

fn strings_to_bytes(args: &[String]) -> Vec<Vec<u8>> {
    args.iter().map(|a| a.clone().into_bytes()).collect()
}

impl<C: Contract> Chaincode<C> {
    pub(crate) fn batch_execute(
        &self,
        stub: &mut dyn ChaincodeStub,
        rest: &[Vec<u8>],
    ) -> LedgerResult<Vec<u8>> {
        if !self.env.settings.is_relay(stub.creator()) {
            return Err(LedgerError::Unauthorized);
        }
        let request: BatchRequest = decode_request(rest, crate::config::FN_BATCH_EXECUTE)?;
        let sources = request.tx_ids.into_iter().map(TaskSource::Queued).collect();
        self.run_batch(stub, sources)
    }

    pub(crate) fn execute_tasks(
        &self,
        stub: &mut dyn ChaincodeStub,
        rest: &[Vec<u8>],
    ) -> LedgerResult<Vec<u8>> {
        if !self.env.settings.is_relay(stub.creator()) {
            return Err(LedgerError::Unauthorized);
        }
        let request: ExecuteTasksRequest = decode_request(rest, crate::config::FN_EXECUTE_TASKS)?;
        let sources = request.tasks.into_iter().map(TaskSource::Inline).collect();
        self.run_batch(stub, sources)
    }

    fn run_batch(
        &self,
        stub: &mut dyn ChaincodeStub,
        sources: Vec<TaskSource>,
    ) -> LedgerResult<Vec<u8>> {
        let batch_id = stub.tx_id().to_string();
        let policy = self.env.settings.conflict_policy;
        let mut written: BTreeSet<String> = BTreeSet::new();
        let mut responses = Vec::with_capacity(sources.len());

        for source in &sources {
            let id = source.id();
            let outcome = self
                .prepare(stub, source)
                .and_then(|prepared| self.run_task(stub, prepared));
            match outcome {
                Ok((payload, mut write_set)) => {
                    let collides = policy == BatchConflictPolicy::RejectCollisions
                        && write_set.intersects(&written);
                    if collides {
                        debug!(%batch_id, task_id = id, "write set collides with an earlier task");
                        responses.push(TaskResponse::failure(
                            id,
                            &LedgerError::domain(WRITE_CONFLICT),
                        ));
                        continue;
                    }
                    written.extend(write_set.writes.keys().cloned());
                    write_set.event = None;
                    write_set.apply_to(stub)?;
                    responses.push(TaskResponse::success(id, &payload));
                }
                Err(e) if e.is_fatal_for_batch() => {
                    error!(%batch_id, task_id = id, error = %e, "batch aborted");
                    return Err(e);
                }
                Err(e) => {
                    debug!(%batch_id, task_id = id, error = %e, "task failed");
                    responses.push(TaskResponse::failure(id, &e));
                }
            }
        }

        let event = BatchEvent {
            batch_id: batch_id.clone(),
            responses,
        };
        let payload = event.to_bytes()?;
        stub.set_event(BATCH_EVENT_NAME, payload.clone())?;
        info!(%batch_id, tasks = event.responses.len(), failed = event.failed(), "batch executed");
        Ok(payload)
    }

    /// Resolves a task to its route and inputs. Queued preimages are
    /// deleted here, before anything can fail.
    fn prepare<'r>(
        &'r self,
        stub: &mut dyn ChaincodeStub,
        source: &TaskSource,
    ) -> LedgerResult<Prepared<'r, C>> {
        match source {
            TaskSource::Queued(id) => {
                let pending = preimage::load(&*stub, id)?
                    .ok_or_else(|| LedgerError::domain(format!("transaction {} not found", id)))?;
                preimage::delete(stub, id)?;
                let route = self.deferred_route(&pending.method)?;
                Ok(Prepared {
                    route,
                    tx_id: id.clone(),
                    timestamp: preimage::timestamp_of(&pending)?,
                    sender: preimage::sender_of(&pending)?,
                    args: strings_to_bytes(&pending.args),
                })
            }
            TaskSource::Inline(task) => {
                let route = self.deferred_route(&task.method)?;
                let rest = strings_to_bytes(&task.args);
                let (sender, args) = match route.kind() {
                    MethodKind::InvokeTx => {
                        let signed = self.authorize_signed(stub, route, &task.method, &rest)?;
                        (Some(signed.sender), strings_to_bytes(&signed.envelope.args))
                    }
                    _ => {
                        let envelope = UnsignedEnvelope::parse(&task.method, &rest, route.arity())?;
                        envelope.check_target(stub.channel_id(), stub.chaincode_name())?;
                        (None, strings_to_bytes(&envelope.args))
                    }
                };
                Ok(Prepared {
                    route,
                    tx_id: task.id.clone(),
                    timestamp: stub.tx_timestamp(),
                    sender,
                    args,
                })
            }
        }
    }

    fn deferred_route(&self, method: &str) -> LedgerResult<&Route<C>> {
        let route = self.router.lookup(method)?;
        if !route.kind().is_deferred() {
            return Err(LedgerError::Malformed(format!(
                "{} is a {} method and cannot run in a batch",
                method,
                route.kind()
            )));
        }
        Ok(route)
    }

    fn run_task(
        &self,
        stub: &mut dyn ChaincodeStub,
        task: Prepared<'_, C>,
    ) -> LedgerResult<(Vec<u8>, WriteSet)> {
        let mut cached = CachedStub::new(stub);
        let payload = {
            let mut ctx =
                TxContext::new(&mut cached, &self.env, task.tx_id, task.timestamp, task.sender);
            task.route.call(&self.contract, &mut ctx, &task.args)?
        };
        Ok((payload, cached.into_write_set()))
    }
}

/// Builds the `executeTasks` argument for `tasks`.
pub fn tasks_argument(tasks: Vec<Task>) -> LedgerResult<Vec<u8>> {
    Ok(serde_json::to_vec(&ExecuteTasksRequest { tasks })?)
}

/// Builds the `batchExecute` argument for `tx_ids`.
pub fn batch_argument(tx_ids: Vec<String>) -> LedgerResult<Vec<u8>> {
    Ok(serde_json::to_vec(&BatchRequest { tx_ids })?)
}
