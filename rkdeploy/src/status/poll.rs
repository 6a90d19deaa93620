//! Per-resource rollout polling and error classification.
//!
//! One [`PollTask`] runs per discovered resource. It queries the rollout
//! status on a fixed period, classifies what it sees through the tables
//! in [`codes`](super::codes), attaches pod diagnostics on every
//! non-success poll, and stops on success, on a fatal code, on its
//! deadline, or on cancellation. Progress and completion are reported to
//! the orchestrator over an event channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::debug;

use crate::diag::Diagnose;
use crate::kube::RolloutStatus;

use super::codes::{ActionableErr, StatusCode};
use super::resource::Resource;

/// Canonical message for cluster connectivity failures, kept stable so
/// repeated connection errors dedup to a single progress line.
pub(crate) const MSG_KUBECTL_CONNECTION: &str = "kubectl connection error";

const MSG_CANCELLED: &str = "status check cancelled";

/// Side channel from pollers to the orchestrator, carrying the index of
/// the resource in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    /// The resource's status changed since it was last reported.
    Changed(usize),
    /// The resource reached a terminal state; sent exactly once.
    Done(usize),
}

pub(crate) struct PollTask {
    pub rollout: Arc<dyn RolloutStatus>,
    pub diagnose: Arc<dyn Diagnose>,
    pub label_key: String,
    pub label_value: String,
    pub period: Duration,
}

impl PollTask {
    pub(crate) async fn run(
        self,
        idx: usize,
        resource: Arc<RwLock<Resource>>,
        mut cancel: watch::Receiver<bool>,
        events: mpsc::UnboundedSender<Event>,
    ) {
        let (namespace, name, deadline) = {
            let res = resource.read().await;
            (
                res.namespace().to_string(),
                res.name().to_string(),
                res.deadline(),
            )
        };

        let started = Instant::now();
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cancel_open = true;

        loop {
            tokio::select! {
                changed = cancel.changed(), if cancel_open => {
                    match changed {
                        Ok(()) if *cancel.borrow() => {
                            debug!(deployment = %name, "rollout watch cancelled");
                            self.finish(
                                idx,
                                &resource,
                                ActionableErr::new(StatusCode::UserCancelled, MSG_CANCELLED),
                                &events,
                            )
                            .await;
                            return;
                        }
                        Ok(()) => {}
                        Err(_) => cancel_open = false,
                    }
                }
                _ = ticker.tick() => {
                    if started.elapsed() > deadline {
                        debug!(deployment = %name, deadline_secs = deadline.as_secs(), "rollout deadline exceeded");
                        self.finish(
                            idx,
                            &resource,
                            ActionableErr::new(
                                StatusCode::DeadlineExceeded,
                                format!(
                                    "deployment rollout did not stabilize within the {}s deadline",
                                    deadline.as_secs()
                                ),
                            ),
                            &events,
                        )
                        .await;
                        return;
                    }

                    let ae = match self.rollout.rollout_status(&namespace, &name).await {
                        Ok(output) => parse_rollout_output(&output),
                        Err(err) => classify_query_error(&err),
                    };
                    let code = ae.code;

                    if code == StatusCode::Success {
                        self.finish(idx, &resource, ae, &events).await;
                        return;
                    }

                    let transitioned = resource.write().await.update_status(ae.clone());

                    // Latest pod diagnostics are refreshed on every
                    // unhealthy poll, including while retrying.
                    let fatal_pod = self.attach_diagnostics(&resource, &namespace).await;

                    if code.is_fatal() {
                        self.finish(idx, &resource, ae, &events).await;
                        return;
                    }
                    if let Some(pod_ae) = fatal_pod {
                        debug!(deployment = %name, code = %pod_ae.code, "fatal pod error; stopping rollout watch");
                        self.finish(idx, &resource, pod_ae, &events).await;
                        return;
                    }

                    // One event per distinct status value, even while the
                    // orchestrator has not printed yet.
                    if transitioned {
                        let _ = events.send(Event::Changed(idx));
                    }
                }
            }
        }
    }

    /// Fetches pod outcomes for this resource's run label and attaches
    /// them. Returns the first fatal pod outcome, if any. Diagnostics
    /// failures are logged and ignored; they never fail the poll.
    async fn attach_diagnostics(
        &self,
        resource: &Arc<RwLock<Resource>>,
        namespace: &str,
    ) -> Option<ActionableErr> {
        match self
            .diagnose
            .diagnose(namespace, &self.label_key, &self.label_value)
            .await
        {
            Ok(pods) => {
                let fatal = pods
                    .iter()
                    .find(|pod| pod.ae.code.is_fatal())
                    .map(|pod| pod.ae.clone());
                resource.write().await.set_pod_statuses(pods);
                fatal
            }
            Err(err) => {
                debug!(namespace, error = %err, "pod diagnostics unavailable");
                None
            }
        }
    }

    async fn finish(
        &self,
        idx: usize,
        resource: &Arc<RwLock<Resource>>,
        ae: ActionableErr,
        events: &mpsc::UnboundedSender<Event>,
    ) {
        let mut res = resource.write().await;
        res.update_status(ae);
        res.mark_complete();
        drop(res);
        let _ = events.send(Event::Done(idx));
    }
}

/// Classifies the text a successful rollout query returned.
pub(crate) fn parse_rollout_output(output: &str) -> ActionableErr {
    if output.contains("successfully rolled out") {
        ActionableErr::success()
    } else {
        ActionableErr::new(StatusCode::RolloutPending, output.trim_end())
    }
}

/// Classifies a failed rollout query. Connectivity failures get the
/// stable connection code/message; anything else is unknown and retried
/// until the deadline.
pub(crate) fn classify_query_error(err: &anyhow::Error) -> ActionableErr {
    let text = err.to_string();
    if text.contains("Unable to connect to the server") {
        ActionableErr::new(StatusCode::KubectlConnectionErr, MSG_KUBECTL_CONNECTION)
    } else {
        ActionableErr::new(StatusCode::Unknown, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::PodOutcome;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a scripted sequence of rollout responses, repeating the
    /// last one once the script is exhausted.
    struct ScriptedRollout {
        script: Mutex<VecDeque<Result<String, String>>>,
        last: Mutex<Option<Result<String, String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedRollout {
        fn new(script: Vec<Result<&str, &str>>) -> Arc<Self> {
            Arc::new(ScriptedRollout {
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RolloutStatus for ScriptedRollout {
        async fn rollout_status(&self, _namespace: &str, _name: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            let response = match next {
                Some(response) => {
                    *self.last.lock().unwrap() = Some(response.clone());
                    response
                }
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .expect("script must not start empty"),
            };
            response.map_err(|msg| anyhow!(msg))
        }
    }

    /// Replays pod diagnostic runs, repeating the last run afterwards.
    struct ScriptedDiagnose {
        runs: Mutex<(usize, Vec<Vec<PodOutcome>>)>,
    }

    impl ScriptedDiagnose {
        fn new(runs: Vec<Vec<PodOutcome>>) -> Arc<Self> {
            Arc::new(ScriptedDiagnose {
                runs: Mutex::new((0, runs)),
            })
        }

        fn none() -> Arc<Self> {
            Self::new(vec![Vec::new()])
        }
    }

    #[async_trait]
    impl Diagnose for ScriptedDiagnose {
        async fn diagnose(
            &self,
            _namespace: &str,
            _label_key: &str,
            _label_value: &str,
        ) -> anyhow::Result<Vec<PodOutcome>> {
            let mut guard = self.runs.lock().unwrap();
            let (iteration, runs) = &mut *guard;
            if *iteration < runs.len() {
                *iteration += 1;
            }
            Ok(runs[*iteration - 1].clone())
        }
    }

    fn pod(name: &str, code: StatusCode, message: &str) -> PodOutcome {
        PodOutcome::new(name, "test", "Pending", ActionableErr::new(code, message))
    }

    fn task(rollout: Arc<ScriptedRollout>, diagnose: Arc<ScriptedDiagnose>) -> PollTask {
        PollTask {
            rollout,
            diagnose,
            label_key: crate::label::RUN_ID_LABEL.to_string(),
            label_value: "test-run".to_string(),
            period: Duration::from_millis(100),
        }
    }

    async fn run_to_completion(
        poll: PollTask,
        resource: Resource,
    ) -> (Resource, Vec<Event>, watch::Sender<bool>) {
        let resource = Arc::new(RwLock::new(resource));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(poll.run(0, Arc::clone(&resource), cancel_rx, events_tx));

        let mut events = Vec::new();
        while let Some(event) = events_rx.recv().await {
            let done = matches!(event, Event::Done(_));
            events.push(event);
            if done {
                break;
            }
        }
        handle.await.expect("poller task panicked");

        let resource = resource.read().await.clone();
        (resource, events, cancel_tx)
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_from_retryable_errors_and_succeeds() {
        let rollout = ScriptedRollout::new(vec![
            Err("Unable to connect to the server"),
            Ok("deployment \"web\" successfully rolled out"),
        ]);
        let diagnose = ScriptedDiagnose::new(vec![
            vec![pod("web-abc", StatusCode::NodeDiskPressure, "node disk pressure")],
            Vec::new(),
        ]);
        let resource = Resource::new("web", "test", Duration::from_secs(10));

        let (resource, events, _cancel) =
            run_to_completion(task(Arc::clone(&rollout), diagnose), resource).await;

        assert_eq!(resource.status().code, StatusCode::Success);
        assert!(resource.is_complete());
        assert_eq!(rollout.calls(), 2);
        assert_eq!(events, vec![Event::Changed(0), Event::Done(0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_pod_error_stops_after_one_poll() {
        let rollout = ScriptedRollout::new(vec![Ok("Waiting for replicas to be available")]);
        let diagnose = ScriptedDiagnose::new(vec![vec![pod(
            "web-abc",
            StatusCode::ContainerTerminated,
            "container app terminated with exit code 1 (Error)",
        )]]);
        let resource = Resource::new("web", "test", Duration::from_secs(60));

        let (resource, events, _cancel) =
            run_to_completion(task(Arc::clone(&rollout), diagnose), resource).await;

        assert_eq!(resource.status().code, StatusCode::ContainerTerminated);
        assert_eq!(rollout.calls(), 1, "fatal errors must not be re-polled");
        assert_eq!(events, vec![Event::Done(0)]);
        assert_eq!(resource.pod_statuses().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sticky_retryable_error_becomes_deadline_exceeded() {
        let rollout = ScriptedRollout::new(vec![Err("Unable to connect to the server")]);
        let resource = Resource::new("web", "test", Duration::from_millis(300));

        let (resource, _events, _cancel) =
            run_to_completion(task(rollout, ScriptedDiagnose::none()), resource).await;

        assert_eq!(resource.status().code, StatusCode::DeadlineExceeded);
        assert!(resource.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_identical_status_reports_one_change() {
        let rollout = ScriptedRollout::new(vec![
            Ok("Waiting for replicas to be available"),
            Ok("Waiting for replicas to be available"),
            Ok("Waiting for replicas to be available"),
            Ok("Waiting for replicas to be available"),
            Ok("Waiting for replicas to be available"),
            Ok("deployment \"web\" successfully rolled out"),
        ]);
        let resource = Resource::new("web", "test", Duration::from_secs(10));

        let (resource, events, _cancel) =
            run_to_completion(task(rollout, ScriptedDiagnose::none()), resource).await;

        let changes = events
            .iter()
            .filter(|e| matches!(e, Event::Changed(_)))
            .count();
        assert_eq!(changes, 1, "five identical polls must report once");
        assert_eq!(resource.status().code, StatusCode::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_marks_resource_cancelled() {
        let rollout = ScriptedRollout::new(vec![Ok("Waiting for replicas to be available")]);
        let resource = Arc::new(RwLock::new(Resource::new(
            "web",
            "test",
            Duration::from_secs(600),
        )));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(task(rollout, ScriptedDiagnose::none()).run(
            0,
            Arc::clone(&resource),
            cancel_rx,
            events_tx,
        ));

        cancel_tx.send(true).expect("cancel");
        handle.await.expect("poller task panicked");

        let res = resource.read().await;
        assert_eq!(res.status().code, StatusCode::UserCancelled);
        assert!(res.is_complete());
        drop(res);

        let mut saw_done = false;
        while let Ok(event) = events_rx.try_recv() {
            saw_done |= matches!(event, Event::Done(0));
        }
        assert!(saw_done);
    }

    #[test]
    fn rollout_output_parsing() {
        let ae = parse_rollout_output("deployment \"web\" successfully rolled out\n");
        assert_eq!(ae.code, StatusCode::Success);

        let ae = parse_rollout_output("Waiting for deployment \"web\" rollout to finish\n");
        assert_eq!(ae.code, StatusCode::RolloutPending);
        assert_eq!(ae.message, "Waiting for deployment \"web\" rollout to finish");
    }

    #[test]
    fn query_error_classification() {
        let ae = classify_query_error(&anyhow!(
            "Unable to connect to the server: dial tcp 127.0.0.1:6443"
        ));
        assert_eq!(ae.code, StatusCode::KubectlConnectionErr);
        assert_eq!(ae.message, MSG_KUBECTL_CONNECTION);

        let ae = classify_query_error(&anyhow!("something else went wrong"));
        assert_eq!(ae.code, StatusCode::Unknown);
        assert_eq!(ae.message, "something else went wrong");
    }
}
