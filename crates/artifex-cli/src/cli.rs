use clap::{ArgAction, Parser, Subcommand, ValueHint};

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}",
    arg_required_else_help = true
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as json
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Disable progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Provide custom config file
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<String>,

    /// Set proxy
    #[arg(required = false, long, short = 'P', global = true)]
    pub proxy: Option<String>,

    /// Set request headers, as `Name: value`
    #[arg(required = false, long, short = 'H', global = true)]
    pub header: Option<Vec<String>>,

    /// Set user agent
    #[arg(required = false, long, short = 'A', global = true)]
    pub user_agent: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download artifacts
    ///
    /// Accepts github:, huggingface:// (hf://), oci://, ollama://, file:// and http(s)
    /// locations.
    #[command(arg_required_else_help = true)]
    #[clap(name = "get", visible_alias = "dl")]
    Get {
        /// Artifacts to download
        #[arg(required = true)]
        identifiers: Vec<String>,

        /// Output path. A directory (or a path ending in `/`) keeps the remote file names
        #[arg(required = false, short, long, value_hint = ValueHint::AnyPath)]
        output: Option<String>,

        /// Expected checksum, as `sha256:<hex>`, `blake3:<hex>` or bare hex
        #[arg(required = false, short = 's', long)]
        checksum: Option<String>,

        /// Keep archives as they are
        #[arg(required = false, long)]
        no_extract: bool,

        /// Ask the model hub to scan the repository first
        #[arg(required = false, long)]
        scan: bool,

        /// Directory local `file://` sources must live in
        #[arg(required = false, long, value_hint = ValueHint::DirPath)]
        trusted_root: Option<String>,
    },

    /// Print an artifact to stdout
    #[command(arg_required_else_help = true)]
    Cat {
        /// Artifact to print
        identifier: String,

        /// Directory local `file://` sources must live in
        #[arg(required = false, long, value_hint = ValueHint::DirPath)]
        trusted_root: Option<String>,

        /// Treat the identifier as an image URL or data URI and print it as base64
        #[arg(required = false, long, conflicts_with = "trusted_root")]
        base64: bool,
    },

    /// Show where identifiers point without downloading anything
    #[command(arg_required_else_help = true)]
    Resolve {
        /// Identifiers to normalize
        #[arg(required = true)]
        identifiers: Vec<String>,
    },

    /// Check model hub repositories for unsafe files
    #[command(arg_required_else_help = true)]
    Scan {
        /// Model hub identifiers
        #[arg(required = true)]
        identifiers: Vec<String>,
    },

    /// Print the configuration file to stdout
    Config,

    /// Generate a documented default config
    #[clap(name = "defconfig")]
    DefConfig,
}
