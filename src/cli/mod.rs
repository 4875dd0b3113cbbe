use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pptpilot", version, about = "Edit PowerPoint decks by having an LLM rewrite their XML members")]
pub struct Args {
    /// TOML config; defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// KEY=VALUE file with OPENAI_API_KEY / GEMINI_API_KEY.
    #[arg(long, global = true, default_value = "credentials.env")]
    pub credentials: PathBuf,

    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply one natural-language edit to a package.
    Edit(EditArgs),
    /// Extract the markup members of a package, or inspect its members.
    Extract(ExtractArgs),
    /// Run a corpus of instructions against a directory of decks.
    Bench(BenchArgs),
}

#[derive(ClapArgs, Debug)]
pub struct EditArgs {
    #[arg(long)]
    pub package: PathBuf,

    #[arg(long)]
    pub prompt: String,

    /// Model identifier; the config's model when omitted.
    #[arg(long)]
    pub model: Option<String>,

    /// Pre-built JSON summary of the deck.
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Rendered slide image, in slide order. Repeatable.
    #[arg(long = "image")]
    pub images: Vec<PathBuf>,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct ExtractArgs {
    #[arg(long)]
    pub package: PathBuf,

    /// Defaults to `<scratch_dir>/<package name>_xml`.
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// Print one member instead of extracting.
    #[arg(long, conflicts_with = "list")]
    pub member: Option<String>,

    /// List every member, binary ones included, instead of extracting.
    #[arg(long, default_value_t = false)]
    pub list: bool,
}

#[derive(ClapArgs, Debug)]
pub struct BenchArgs {
    /// JSON object mapping id to instruction.
    #[arg(long)]
    pub corpus: PathBuf,

    /// Directory holding `slide_<id>.pptx` decks.
    #[arg(long)]
    pub decks: PathBuf,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long)]
    pub max_prompts: Option<usize>,

    #[arg(long)]
    pub runs_dir: Option<PathBuf>,
}
