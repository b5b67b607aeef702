use clap::Parser;
use databricks_step::config::LoaderArgs;
use databricks_step::{load_table, logging};
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    logging::init();

    let args = LoaderArgs::parse();

    let rendered = load_table(&args.input).and_then(|table| {
        info!(rows = table.num_rows(), columns = table.num_columns(), "loaded {}", args.input.display());
        table.render()
    });

    match rendered {
        Ok(rendered) => {
            println!("{rendered}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", logging::error_chain(&e));
            ExitCode::FAILURE
        }
    }
}
