use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{CancelSignal, Oracle, OracleResponse, TokenBucket};
use crate::error::{OracleError, OracleResult};

/// Concurrent dispatcher to the configured oracles.
///
/// Each call fans out to one child task per oracle, every child with its own
/// timeout, and joins them all before returning. Children belong to the
/// call: dropping the call (or the investigation's cancel signal firing)
/// aborts whatever is still in flight.
#[derive(Clone)]
pub struct OracleGateway {
    oracles: Vec<Arc<dyn Oracle>>,
    rate_limiter: Arc<TokenBucket>,
    default_timeout: Duration,
}

impl OracleGateway {
    /// Create a gateway over `oracles`; their order is the consensus order.
    pub fn new(
        oracles: Vec<Arc<dyn Oracle>>,
        rate_limiter: Arc<TokenBucket>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            oracles,
            rate_limiter,
            default_timeout,
        }
    }

    /// Names of the configured oracles, in order.
    pub fn oracle_names(&self) -> Vec<String> {
        self.oracles.iter().map(|o| o.name().to_string()).collect()
    }

    pub fn oracle_count(&self) -> usize {
        self.oracles.len()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// The shared provider rate-limit guard.
    pub fn rate_limiter(&self) -> &Arc<TokenBucket> {
        &self.rate_limiter
    }

    /// Query every configured oracle with the default timeout.
    pub async fn query(
        &self,
        prompt: &str,
        context: &serde_json::Value,
        cancel: &CancelSignal,
    ) -> OracleResult<Vec<OracleResponse>> {
        self.query_oracles(prompt, context, None, self.default_timeout, cancel)
            .await
    }

    /// Fan a prompt out to `oracle_set` (all oracles when `None`).
    ///
    /// Failed, timed-out and cancelled oracles are dropped from the sample.
    /// Fails with `AllOraclesFailed` only when nothing succeeded, or with
    /// `Cancelled` when the signal fired before any answer arrived. The
    /// per-oracle timeout covers the call itself, not the wait for a
    /// rate-limit token.
    pub async fn query_oracles(
        &self,
        prompt: &str,
        context: &serde_json::Value,
        oracle_set: Option<&[String]>,
        timeout: Duration,
        cancel: &CancelSignal,
    ) -> OracleResult<Vec<OracleResponse>> {
        if cancel.is_cancelled() {
            return Err(OracleError::Cancelled);
        }

        let selected: Vec<(usize, Arc<dyn Oracle>)> = self
            .oracles
            .iter()
            .enumerate()
            .filter(|(_, oracle)| {
                oracle_set.map_or(true, |set| set.iter().any(|name| name == oracle.name()))
            })
            .map(|(index, oracle)| (index, Arc::clone(oracle)))
            .collect();

        let attempted = selected.len();
        if attempted == 0 {
            warn!(requested = ?oracle_set, "No configured oracle matches the requested set");
            return Err(OracleError::AllOraclesFailed { attempted });
        }

        debug!(oracles = attempted, timeout_ms = timeout.as_millis(), "Dispatching oracle query");
        let started = Instant::now();
        let timeout_ms = timeout.as_millis() as u64;

        let mut join_set = JoinSet::new();
        for (index, oracle) in selected {
            let prompt = prompt.to_string();
            let context = context.clone();
            let limiter = Arc::clone(&self.rate_limiter);
            let cancel = cancel.clone();

            join_set.spawn(async move {
                let name = oracle.name().to_string();
                let call_name = name.clone();
                let call = async move {
                    let call_start = Instant::now();
                    let reply = oracle.query(&prompt, &context).await?;
                    let latency_ms = call_start.elapsed().as_millis() as u64;
                    Ok::<_, OracleError>(OracleResponse::from_reply(&call_name, reply, latency_ms))
                };
                // The timeout starts once a token is held.
                let limited = async move {
                    limiter.acquire().await;
                    tokio::time::timeout(timeout, call).await
                };

                let outcome = tokio::select! {
                    _ = cancel.cancelled() => Err(OracleError::Cancelled),
                    result = limited => match result {
                        Ok(inner) => inner,
                        Err(_) => Err(OracleError::Timeout {
                            oracle: name.clone(),
                            timeout_ms,
                        }),
                    },
                };
                (index, name, outcome)
            });
        }

        let mut responses: Vec<(usize, OracleResponse)> = Vec::with_capacity(attempted);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, _, Ok(response))) => responses.push((index, response)),
                Ok((_, name, Err(e))) => {
                    warn!(oracle = %name, error = %e, "Oracle call failed, dropping from sample");
                }
                Err(e) => {
                    warn!(error = %e, "Oracle task aborted");
                }
            }
        }

        responses.sort_by_key(|(index, _)| *index);
        let responses: Vec<OracleResponse> = responses.into_iter().map(|(_, r)| r).collect();

        if responses.is_empty() {
            if cancel.is_cancelled() {
                return Err(OracleError::Cancelled);
            }
            return Err(OracleError::AllOraclesFailed { attempted });
        }

        info!(
            succeeded = responses.len(),
            attempted,
            latency_ms = started.elapsed().as_millis(),
            "Oracle fan-out complete"
        );
        Ok(responses)
    }
}

impl std::fmt::Debug for OracleGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleGateway")
            .field("oracles", &self.oracle_names())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
