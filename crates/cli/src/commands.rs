use clap::{Args, Subcommand};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull the source into the raw structures table
    Fetch(RunArgs),

    /// Project the raw table into the destination table
    Transform(RunArgs),

    /// Show the stored version of the fetch and transform datasets
    Status {
        #[arg(
            long,
            help = "If set, prints the version rows as JSON instead of a table"
        )]
        json: bool,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    #[arg(long, help = "Number of concurrent workers")]
    pub workers: Option<usize>,

    #[arg(long, help = "Page size for paginated sources and transforms")]
    pub batch_size: Option<u64>,

    #[arg(long, help = "Item or row offset to start from")]
    pub offset: Option<u64>,

    #[arg(long, help = "Raw structures table")]
    pub table_name: Option<String>,

    #[arg(long, help = "Destination table of the transform")]
    pub dest_table_name: Option<String>,
}
