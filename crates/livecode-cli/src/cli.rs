use clap::{Args as ClapArgs, Parser, Subcommand};
use livecode::ImageMode;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "livecode",
    version,
    about = "Run code in the livecode sandbox and render its shapes as SVG"
)]
pub(crate) struct Args {
    #[arg(long, default_value = "config/livecode.toml")]
    pub(crate) config: PathBuf,
    #[arg(long, default_value = "logs")]
    pub(crate) log_dir: PathBuf,
    #[arg(long, default_value_t = false)]
    pub(crate) log_to_stderr: bool,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Execute a file and print the result as JSON.
    Exec {
        file: PathBuf,
        #[arg(long)]
        sketch: bool,
        #[command(flatten)]
        context: ContextArgs,
    },
    /// Render a file to SVG, reusing cached renders.
    Render {
        file: PathBuf,
        #[arg(long)]
        sketch: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Rasterize a sketch preview to PNG, reusing cached previews.
    Png {
        file: PathBuf,
        /// Sketch name, e.g. `SKETCH-12`.
        #[arg(long)]
        name: String,
        /// `s` for the 300x300 square, `w` for the 550x300 wide preview.
        #[arg(long, default_value = "s", value_parser = parse_mode)]
        mode: ImageMode,
        #[arg(long)]
        sketch: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the websocket endpoint derived from the config.
    Endpoint,
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Command::Exec { .. } => "exec",
            Command::Render { .. } => "render",
            Command::Png { .. } => "png",
            Command::Endpoint => "endpoint",
        }
    }
}

fn parse_mode(value: &str) -> Result<ImageMode, String> {
    ImageMode::from_suffix(value)
        .ok_or_else(|| format!("unknown image mode `{value}`, expected s or w"))
}

#[derive(ClapArgs, Debug, Default)]
pub(crate) struct ContextArgs {
    #[arg(long)]
    pub(crate) course: Option<String>,
    #[arg(long)]
    pub(crate) lesson: Option<String>,
    #[arg(long)]
    pub(crate) batch: Option<String>,
    #[arg(long = "sketch-name")]
    pub(crate) sketch_name: Option<String>,
    #[arg(long)]
    pub(crate) exercise: Option<String>,
    #[arg(long)]
    pub(crate) example: Option<String>,
}

impl ContextArgs {
    pub(crate) fn into_context(self) -> livecode::RunContext {
        livecode::RunContext {
            course: self.course,
            lesson: self.lesson,
            batch: self.batch,
            sketch: self.sketch_name,
            exercise: self.exercise,
            example: self.example,
        }
    }
}
