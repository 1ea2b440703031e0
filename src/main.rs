mod args;
mod etl;

use clap::Parser;
use log::{debug, info};
use snafu::ErrorCompat;

use crate::args::Args;

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
    debug!("args: {:?}", args);

    let options = etl::RunOptions {
        out: args.out.clone(),
        reference: args.reference.clone(),
        output_dir: args.output_dir.clone(),
        skip_database: args.skip_database,
    };

    match etl::run_pipeline(&args.config, &options) {
        Ok(summary) => {
            info!(
                "Done: {} results in {} seccionales",
                summary.records, summary.seccionales
            );
            info!("Clean dataset: {}", summary.clean_csv.display());
            info!("Seccionales: {}", summary.seccionales_geojson.display());
            if let Some(db) = summary.database {
                info!("Database: {}", db.display());
            }
        }
        Err(e) => {
            eprintln!("An error occured: {}", e);
            if let Some(bt) = ErrorCompat::backtrace(&e) {
                eprintln!("{}", bt);
            }
            std::process::exit(1);
        }
    }
}
