//! Expert panel executor
//!
//! Fans one event out to N concurrent estimator calls. Every call gets its
//! own seed, races a per-call timeout, and is parsed as soon as it returns.
//! The panel as a whole races the overall deadline; calls still outstanding
//! when it fires are aborted and recorded as timed out. The executor never
//! fails: it always hands back one opinion per dispatched call.

use crate::agent::{Estimator, ResponseParser};
use crate::config::ForecastConfig;
use crate::domain::{EventContext, ExpertOpinion, OpinionStatus, Side};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Aborts the expert task when the executor lets go of it
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs one panel of expert calls
#[derive(Clone)]
pub struct ExpertPanelExecutor {
    estimator: Arc<dyn Estimator>,
    per_call_timeout: Duration,
    overall_deadline: Duration,
}

impl ExpertPanelExecutor {
    pub fn new(
        estimator: Arc<dyn Estimator>,
        per_call_timeout: Duration,
        overall_deadline: Duration,
    ) -> Self {
        Self {
            estimator,
            per_call_timeout,
            overall_deadline,
        }
    }

    pub fn from_config(estimator: Arc<dyn Estimator>, config: &ForecastConfig) -> Self {
        Self::new(estimator, config.per_call_timeout(), config.overall_deadline())
    }

    /// Dispatch `count` expert calls for `target` and wait until all settle
    /// or the overall deadline passes.
    ///
    /// Each opinion is also pushed to `sink` as it settles, so a caller can
    /// expose partial results while the panel is still running.
    pub async fn run(
        &self,
        event: Arc<EventContext>,
        target: Side,
        count: usize,
        sink: Option<mpsc::UnboundedSender<ExpertOpinion>>,
    ) -> Vec<ExpertOpinion> {
        let started = Instant::now();
        let deadline = started + self.overall_deadline;
        let parser = Arc::new(ResponseParser::new(&event, target));

        let seeds: Vec<u64> = (0..count).map(|_| rand::random::<u64>()).collect();
        let mut guards = Vec::with_capacity(count);
        let mut pending = FuturesUnordered::new();

        for (idx, &seed) in seeds.iter().enumerate() {
            let estimator = Arc::clone(&self.estimator);
            let event = Arc::clone(&event);
            let parser = Arc::clone(&parser);
            let per_call_timeout = self.per_call_timeout;

            let handle = tokio::spawn(async move {
                call_expert(estimator, event, parser, target, idx, seed, per_call_timeout).await
            });
            guards.push(AbortOnDrop(handle.abort_handle()));
            pending.push(async move { (idx, handle.await) });
        }

        debug!(count, "expert panel dispatched");

        let mut settled = vec![false; count];
        let mut opinions = Vec::with_capacity(count);

        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                next = pending.next() => {
                    let Some((idx, joined)) = next else { break };
                    let opinion = match joined {
                        Ok(opinion) => opinion,
                        Err(e) => ExpertOpinion::failed(
                            idx,
                            seeds[idx],
                            target,
                            OpinionStatus::Errored,
                            format!("expert task failed: {}", e),
                            started.elapsed(),
                        ),
                    };
                    settled[idx] = true;
                    emit(&sink, &opinion);
                    opinions.push(opinion);
                }
                _ = &mut sleep => {
                    let outstanding = settled.iter().filter(|s| !**s).count();
                    warn!(outstanding, "overall deadline elapsed, abandoning expert calls");
                    for (idx, _) in settled.iter().enumerate().filter(|(_, s)| !**s) {
                        let opinion = ExpertOpinion::failed(
                            idx,
                            seeds[idx],
                            target,
                            OpinionStatus::TimedOut,
                            format!(
                                "overall deadline of {}ms elapsed",
                                self.overall_deadline.as_millis()
                            ),
                            started.elapsed(),
                        );
                        emit(&sink, &opinion);
                        opinions.push(opinion);
                    }
                    break;
                }
            }
        }

        // Outstanding tasks are aborted here
        drop(guards);

        let ok = opinions
            .iter()
            .filter(|o| o.status == OpinionStatus::Ok)
            .count();
        info!(
            requested = count,
            ok,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "expert panel settled"
        );

        opinions
    }
}

fn emit(sink: &Option<mpsc::UnboundedSender<ExpertOpinion>>, opinion: &ExpertOpinion) {
    if let Some(tx) = sink {
        // Receiver gone means nobody is watching progress any more
        let _ = tx.send(opinion.clone());
    }
}

/// One estimator call, timed and parsed
async fn call_expert(
    estimator: Arc<dyn Estimator>,
    event: Arc<EventContext>,
    parser: Arc<ResponseParser>,
    target: Side,
    idx: usize,
    seed: u64,
    per_call_timeout: Duration,
) -> ExpertOpinion {
    let started = Instant::now();
    let result = tokio::time::timeout(per_call_timeout, estimator.estimate(&event, target, seed)).await;
    let latency = started.elapsed();

    match result {
        Err(_) => {
            debug!(expert = idx, "expert call timed out");
            ExpertOpinion::failed(
                idx,
                seed,
                target,
                OpinionStatus::TimedOut,
                format!("per-call timeout of {}ms elapsed", per_call_timeout.as_millis()),
                latency,
            )
        }
        Ok(Err(e)) => {
            warn!(expert = idx, error = %e, "expert call failed");
            ExpertOpinion::failed(idx, seed, target, OpinionStatus::Errored, e.to_string(), latency)
        }
        Ok(Ok(text)) => match parser.parse(&text) {
            Ok(parsed) => {
                debug!(
                    expert = idx,
                    probability = parsed.probability,
                    stated_side = %parsed.stated_side,
                    latency_ms = latency.as_millis() as u64,
                    "expert opinion parsed"
                );
                ExpertOpinion::ok(
                    idx,
                    seed,
                    target,
                    parsed.probability,
                    parsed.confidence,
                    parsed.rationale,
                    latency,
                )
            }
            Err(failure) => {
                debug!(expert = idx, %failure, "expert response unparseable");
                ExpertOpinion::failed(
                    idx,
                    seed,
                    target,
                    OpinionStatus::ParseFailed,
                    failure.to_string(),
                    latency,
                )
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MockEstimator;
    use crate::domain::Odds;
    use crate::error::{ForecastError, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event() -> Arc<EventContext> {
        Arc::new(
            EventContext::new("Lakers", "Celtics", Odds::American(-150), Odds::American(130))
                .unwrap(),
        )
    }

    fn executor(estimator: impl Estimator + 'static) -> ExpertPanelExecutor {
        ExpertPanelExecutor::new(
            Arc::new(estimator),
            Duration::from_secs(10),
            Duration::from_secs(30),
        )
    }

    /// Answers call n after `delays[n]`; calls past the script hang
    struct SlowEstimator {
        delays: Vec<Duration>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Estimator for SlowEstimator {
        fn name(&self) -> &str {
            "slow"
        }

        async fn estimate(&self, _event: &EventContext, _target: Side, _seed: u64) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays.get(n).copied().unwrap_or(Duration::from_secs(3600));
            tokio::time::sleep(delay).await;
            Ok("Lakers win probability: 60%".to_string())
        }
    }

    #[tokio::test]
    async fn test_all_experts_succeed() {
        let mut mock = MockEstimator::new();
        mock.expect_estimate()
            .times(4)
            .returning(|_, _, _| Ok("Lakers win probability: 62%".to_string()));

        let opinions = executor(mock).run(event(), Side::A, 4, None).await;

        assert_eq!(opinions.len(), 4);
        assert!(opinions.iter().all(|o| o.status == OpinionStatus::Ok));
        assert!(opinions.iter().all(|o| o.probability == Some(0.62)));
        let mut indices: Vec<_> = opinions.iter().map(|o| o.expert_index).collect();
        indices.sort();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_seeds_vary_between_experts() {
        let mut mock = MockEstimator::new();
        mock.expect_estimate()
            .returning(|_, _, seed| Ok(format!("Lakers win probability: 50% (seat {})", seed)));

        let opinions = executor(mock).run(event(), Side::A, 5, None).await;

        let mut seeds: Vec<_> = opinions.iter().map(|o| o.seed).collect();
        seeds.sort();
        seeds.dedup();
        assert_eq!(seeds.len(), 5);
    }

    #[tokio::test]
    async fn test_errors_and_parse_failures_are_recorded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut mock = MockEstimator::new();
        mock.expect_estimate().times(3).returning(move |_, _, _| {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Ok("Celtics win probability: 35%".to_string()),
                1 => Ok("I would rather not say.".to_string()),
                _ => Err(ForecastError::Estimator("rate limited".to_string())),
            }
        });

        let opinions = executor(mock).run(event(), Side::A, 3, None).await;

        let count = |status| opinions.iter().filter(|o| o.status == status).count();
        assert_eq!(count(OpinionStatus::Ok), 1);
        assert_eq!(count(OpinionStatus::ParseFailed), 1);
        assert_eq!(count(OpinionStatus::Errored), 1);

        let ok = opinions.iter().find(|o| o.status == OpinionStatus::Ok).unwrap();
        assert!((ok.probability.unwrap() - 0.65).abs() < 1e-12);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_timeout() {
        let estimator = SlowEstimator {
            delays: vec![Duration::from_secs(1), Duration::from_secs(20)],
            calls: AtomicUsize::new(0),
        };

        let started = Instant::now();
        let opinions = executor(estimator).run(event(), Side::A, 2, None).await;

        assert_eq!(opinions.len(), 2);
        let timed_out: Vec<_> = opinions
            .iter()
            .filter(|o| o.status == OpinionStatus::TimedOut)
            .collect();
        assert_eq!(timed_out.len(), 1);
        assert!(timed_out[0].rationale.contains("per-call"));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overall_deadline_abandons_outstanding_calls() {
        let estimator = SlowEstimator {
            delays: vec![Duration::from_secs(1)],
            calls: AtomicUsize::new(0),
        };
        let executor = ExpertPanelExecutor::new(
            Arc::new(estimator),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = Instant::now();
        let opinions = executor.run(event(), Side::A, 3, Some(tx)).await;

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(opinions.len(), 3);
        let deadline_hits = opinions
            .iter()
            .filter(|o| o.status == OpinionStatus::TimedOut && o.rationale.contains("overall"))
            .count();
        assert_eq!(deadline_hits, 2);

        let mut streamed = 0;
        while rx.recv().await.is_some() {
            streamed += 1;
        }
        assert_eq!(streamed, 3);
    }
}
