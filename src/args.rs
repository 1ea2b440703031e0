use clap::Parser;

/// This is the ETL program for the per-seccional election results.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON configuration of the run: electoral sources, boundaries, mapping tables and outputs.
    /// For more information about the file format, read the documentation of the manual module.
    #[clap(short, long, value_parser)]
    pub config: String,
    /// (file path) A reference summary in JSON format. If provided, seccionales will
    /// check that the summary of this run matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the run will be written in JSON format to the given
    /// location. Setting this option overrides the summary path that may be specified in the configuration.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (directory or empty) If specified, overrides the output directory of the configuration.
    #[clap(long, value_parser)]
    pub output_dir: Option<String>,

    /// If passed as an argument, the SQLite database is not written.
    #[clap(long, takes_value = false)]
    pub skip_database: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
