use clap::Parser;
use databricks_step::config::{RunEnvironment, SubmitArgs};
use databricks_step::{DefaultCredential, JobsClientBuilder, KeyVaultClient, logging, submit_and_wait};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let args = SubmitArgs::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", logging::error_chain(e.as_ref()));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: SubmitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let env = RunEnvironment::from_env()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping; a submitted run keeps running on the cluster");
            on_interrupt.cancel();
        }
    });

    let secrets = KeyVaultClient::new(&args.keyvault_url, DefaultCredential::from_env()?)?;

    submit_and_wait(
        &args,
        &env,
        &secrets,
        |secret| {
            JobsClientBuilder::new(&args.databricks_host)?
                .token(secret.value())
                .build()
        },
        &cancel,
    )
    .await?;

    Ok(())
}
