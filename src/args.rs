use clap::Parser;

/// Builds the hierarchical tables of an economic census export: national, state,
/// municipal and regional tables, proportional weights and percentages.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON configuration of the run: input, geography, periods and rules.
    /// For more information about the file format, read the documentation of the
    /// census_tables::manual module.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (directory, optional) A directory holding the outputs of a previous run. If provided,
    /// every written table is compared with the file at the same place, and the run fails
    /// when one of them differs.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (directory, optional) The output directory. Setting this option overrides the
    /// outputDirectory setting of the configuration.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path, optional) The census export to read. Setting this option overrides the
    /// filePath setting of the configuration.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// If passed as an argument, the output directory is removed before the run.
    #[clap(long, takes_value = false)]
    pub clear: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
