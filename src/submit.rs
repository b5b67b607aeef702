//! The job submitter step: secret, client, job specification, run, wait.

use crate::client::{ClientError, JobService};
use crate::config::{RunEnvironment, SubmitArgs};
use crate::error::{StepError, StepErrorKind};
use crate::job::{JobSpec, Library, NewCluster, NotebookTask, Run};
use crate::poll::wait_for_termination;
use crate::vault::{Secret, SecretStore};

use std::collections::BTreeMap;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Package installed on the cluster so MLflow tracking goes to AzureML.
pub const TRACKING_LIBRARY: &str = "azureml-mlflow";
pub const OUTPUT_FOLDER_PARAMETER: &str = "output_folder";

/// Build the run request for this pipeline run.
pub fn build_job_spec(args: &SubmitArgs, env: &RunEnvironment) -> JobSpec {
    let mut spark_env_vars = BTreeMap::new();
    for (name, value) in &env.tracking {
        match value {
            Some(value) => {
                spark_env_vars.insert(name.to_string(), value.clone());
            }
            None => warn!("{name} is not set, it will not be forwarded to the cluster"),
        }
    }

    JobSpec {
        name: env.run_id.clone(),
        new_cluster: NewCluster {
            spark_version: args.spark_version.clone(),
            node_type_id: args.node_type_id.clone(),
            num_workers: args.num_workers,
            spark_env_vars,
        },
        notebook_task: NotebookTask {
            notebook_path: args.notebook_path.clone(),
            base_parameters: BTreeMap::from([(
                OUTPUT_FOLDER_PARAMETER.to_string(),
                env.output_folder(),
            )]),
        },
        libraries: vec![Library::pypi(TRACKING_LIBRARY)],
    }
}

/// Fetch the Databricks token, submit the notebook run and wait for it.
///
/// `connect` turns the token into a job service; it is only called once the
/// secret has been read. Nothing is retried: the first failure is returned.
///
/// `cancel` is honoured at every await. Once it fires, no further request is
/// started; a run that was already submitted keeps running on the cluster.
pub async fn submit_and_wait<S, J, F>(
    args: &SubmitArgs,
    env: &RunEnvironment,
    secrets: &S,
    connect: F,
    cancel: &CancellationToken,
) -> Result<Run, StepError>
where
    S: SecretStore,
    J: JobService,
    F: FnOnce(&Secret) -> Result<J, ClientError>,
{
    info!("getting secret from key vault...");
    let secret = unless_cancelled(
        cancel,
        "getting the secret from key vault",
        secrets.get_secret(&args.keyvault_secret_name),
    )
    .await??;
    info!("getting secret from key vault... done");

    info!("creating databricks api client...");
    let jobs = connect(&secret)?;
    info!("creating databricks api client... done");

    let spec = build_job_spec(args, env);

    info!("submitting databricks run...");
    let run_id = unless_cancelled(cancel, "submitting the run", jobs.submit_run(&spec)).await??;
    info!(%run_id, "submitting databricks run... done");

    let run = wait_for_termination(&jobs, run_id, &args.poll_options(), cancel).await?;

    match (&run.state.result_state, &run.run_page_url) {
        (Some(result), Some(url)) => info!(%run_id, %result, "run {run_id} finished: {url}"),
        (Some(result), None) => info!(%run_id, %result, "run {run_id} finished"),
        (None, _) => info!(%run_id, state = %run.state.life_cycle_state, "run {run_id} finished"),
    }

    Ok(run)
}

async fn unless_cancelled<T>(
    cancel: &CancellationToken,
    stage: &'static str,
    step: impl Future<Output = T>,
) -> Result<T, StepError> {
    tokio::select! {
        // an already cancelled token wins over a ready step
        biased;
        _ = cancel.cancelled() => Err(StepError::new(StepErrorKind::Cancelled { stage })),
        output = step => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::error::ClientErrorKind;
    use crate::config::{RUN_ID_VAR, TRACKING_VARS};
    use crate::job::{LifeCycleState, RunId, RunState};
    use crate::vault::VaultError;
    use crate::vault::error::VaultErrorKind;

    use clap::Parser;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::{Instant, sleep};
    use tokio_test::{assert_err, assert_ok};

    fn args() -> SubmitArgs {
        SubmitArgs::try_parse_from([
            "databricks-control",
            "--databricks-host", "https://adb-1.2.azuredatabricks.net",
            "--notebook_path", "/Shared/train",
            "--keyvault-url", "https://kv.vault.azure.net/",
            "--keyvault-secret-name", "dbx-token",
            "--num-workers", "2",
            "--node-type-id", "Standard_DS3_v2",
            "--spark-version", "13.3.x-scala2.12",
        ])
        .unwrap()
    }

    fn environment(vars: &[(&str, &str)]) -> RunEnvironment {
        RunEnvironment::from_lookup(|name| {
            vars.iter().find(|(k, _)| *k == name).map(|(_, v)| v.to_string())
        })
        .unwrap()
    }

    fn full_environment() -> RunEnvironment {
        environment(&[
            (RUN_ID_VAR, "run-42"),
            ("MLFLOW_TRACKING_URI", "azureml://tracking"),
            ("MLFLOW_EXPERIMENT_ID", "exp-1"),
            ("MLFLOW_TRACKING_TOKEN", "tok"),
            ("MLFLOW_RUN_ID", "run-42"),
            ("MLFLOW_EXPERIMENT_NAME", "experiment"),
        ])
    }

    struct StaticSecret(Result<&'static str, ()>);

    impl SecretStore for StaticSecret {
        async fn get_secret(&self, _name: &str) -> Result<Secret, VaultError> {
            match self.0 {
                Ok(value) => Ok(Secret::new(value)),
                Err(()) => Err(VaultError::new(VaultErrorKind::CredentialUnavailable(vec![
                    "ManagedIdentityCredential: unavailable".to_string(),
                ]))),
            }
        }
    }

    /// A vault that never answers.
    struct HangingSecret;

    impl SecretStore for HangingSecret {
        async fn get_secret(&self, _name: &str) -> Result<Secret, VaultError> {
            std::future::pending().await
        }
    }

    /// Records every call; submissions fail when `submit_fails` is set.
    struct RecordingJobs {
        submit_fails: bool,
        states: Mutex<VecDeque<&'static str>>,
        submitted: Mutex<Vec<JobSpec>>,
        gets: AtomicUsize,
    }

    impl RecordingJobs {
        fn new(submit_fails: bool, states: &[&'static str]) -> Self {
            RecordingJobs {
                submit_fails,
                states: Mutex::new(states.iter().copied().collect()),
                submitted: Mutex::new(vec![]),
                gets: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.submitted.lock().unwrap().len() + self.gets.load(Ordering::SeqCst)
        }
    }

    impl JobService for &RecordingJobs {
        async fn submit_run(&self, spec: &JobSpec) -> Result<RunId, ClientError> {
            self.submitted.lock().unwrap().push(spec.clone());
            if self.submit_fails {
                return Err(ClientError::new(ClientErrorKind::Status {
                    status: http::StatusCode::BAD_REQUEST,
                    endpoint: "runs/submit".to_string(),
                    body: "{\"error_code\":\"INVALID_PARAMETER_VALUE\"}".to_string(),
                }));
            }
            Ok(RunId(1001))
        }

        async fn get_run(&self, run_id: RunId) -> Result<Run, ClientError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            let state = self.states.lock().unwrap().pop_front().unwrap_or("TERMINATED");
            Ok(Run {
                run_id,
                state: RunState {
                    life_cycle_state: LifeCycleState::from(state),
                    result_state: None,
                    state_message: None,
                },
                run_page_url: None,
            })
        }
    }

    #[test]
    fn test_job_spec_name_and_output_folder() {
        let spec = build_job_spec(&args(), &full_environment());

        assert_eq!(spec.name, "run-42");
        assert_eq!(
            spec.notebook_task.base_parameters[OUTPUT_FOLDER_PARAMETER],
            "azureml/run-42/output_path"
        );
        assert_eq!(spec.notebook_task.base_parameters.len(), 1);
        assert_eq!(spec.notebook_task.notebook_path.as_deref(), Some("/Shared/train"));
        assert_eq!(spec.libraries, vec![Library::pypi("azureml-mlflow")]);
    }

    #[test]
    fn test_job_spec_cluster() {
        let spec = build_job_spec(&args(), &full_environment());

        assert_eq!(spec.new_cluster.spark_version.as_deref(), Some("13.3.x-scala2.12"));
        assert_eq!(spec.new_cluster.node_type_id.as_deref(), Some("Standard_DS3_v2"));
        assert_eq!(spec.new_cluster.num_workers, Some(2));

        let names: Vec<&str> = spec.new_cluster.spark_env_vars.keys().map(String::as_str).collect();
        let mut expected = TRACKING_VARS.to_vec();
        expected.sort();
        assert_eq!(names, expected);
        assert_eq!(spec.new_cluster.spark_env_vars["AZUREML_RUN_ID"], "run-42");
        assert_eq!(spec.new_cluster.spark_env_vars["MLFLOW_TRACKING_TOKEN"], "tok");
    }

    #[test]
    fn test_unset_tracking_vars_are_not_forwarded() {
        let spec = build_job_spec(&args(), &environment(&[(RUN_ID_VAR, "run-7")]));

        assert_eq!(spec.new_cluster.spark_env_vars.len(), 1);
        assert_eq!(spec.new_cluster.spark_env_vars[RUN_ID_VAR], "run-7");
        assert_eq!(
            spec.notebook_task.base_parameters[OUTPUT_FOLDER_PARAMETER],
            "azureml/run-7/output_path"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_submits_then_polls_until_terminated() {
        let jobs = RecordingJobs::new(false, &["RUNNING", "RUNNING", "TERMINATED"]);
        let mut token = None;

        let run = submit_and_wait(
            &args(),
            &full_environment(),
            &StaticSecret(Ok("dapi-secret")),
            |secret| {
                token = Some(secret.value().to_string());
                Ok(&jobs)
            },
            &CancellationToken::new(),
        )
        .await;

        let run = assert_ok!(run);
        assert_eq!(run.run_id, RunId(1001));
        assert_eq!(token.as_deref(), Some("dapi-secret"));
        assert_eq!(jobs.submitted.lock().unwrap().len(), 1);
        assert_eq!(jobs.submitted.lock().unwrap()[0].name, "run-42");
        assert_eq!(jobs.gets.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_secret_failure_makes_no_job_calls() {
        let jobs = RecordingJobs::new(false, &[]);
        let mut connected = false;

        let err = assert_err!(
            submit_and_wait(
                &args(),
                &full_environment(),
                &StaticSecret(Err(())),
                |_| {
                    connected = true;
                    Ok(&jobs)
                },
                &CancellationToken::new(),
            )
            .await
        );

        assert!(matches!(err.kind, StepErrorKind::Vault(_)));
        assert!(!connected);
        assert_eq!(jobs.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_failure_never_polls() {
        let jobs = RecordingJobs::new(true, &["TERMINATED"]);

        let err = assert_err!(
            submit_and_wait(
                &args(),
                &full_environment(),
                &StaticSecret(Ok("dapi-secret")),
                |_| Ok(&jobs),
                &CancellationToken::new(),
            )
            .await
        );

        assert!(matches!(err.kind, StepErrorKind::Client(_)));
        assert_eq!(jobs.submitted.lock().unwrap().len(), 1);
        assert_eq!(jobs.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_construction_failure_stops_before_submit() {
        let jobs = RecordingJobs::new(false, &[]);

        let err = assert_err!(
            submit_and_wait(
                &args(),
                &full_environment(),
                &StaticSecret(Ok("dapi-secret")),
                |_| {
                    Err::<&RecordingJobs, _>(ClientError::new(ClientErrorKind::InvalidHost {
                        source: None,
                        host: String::new(),
                        msg: "the host must not be empty".to_string(),
                    }))
                },
                &CancellationToken::new(),
            )
            .await
        );

        assert!(matches!(err.kind, StepErrorKind::Client(_)));
        assert_eq!(jobs.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_submits_nothing() {
        let jobs = RecordingJobs::new(false, &["TERMINATED"]);
        let mut connected = false;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = assert_err!(
            submit_and_wait(
                &args(),
                &full_environment(),
                &StaticSecret(Ok("dapi-secret")),
                |_| {
                    connected = true;
                    Ok(&jobs)
                },
                &cancel,
            )
            .await
        );

        assert!(matches!(err.kind, StepErrorKind::Cancelled { .. }));
        assert!(!connected);
        assert_eq!(jobs.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_a_hanging_secret_fetch() {
        let jobs = RecordingJobs::new(false, &["TERMINATED"]);
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let err = assert_err!(
            submit_and_wait(&args(), &full_environment(), &HangingSecret, |_| Ok(&jobs), &cancel).await
        );

        match err.kind {
            StepErrorKind::Cancelled { stage } => assert!(stage.contains("key vault")),
            other => panic!("unexpected error kind: {other:?}"),
        }
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert_eq!(jobs.calls(), 0);
    }
}
